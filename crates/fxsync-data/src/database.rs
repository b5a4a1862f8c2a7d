//! PostgreSQL 연결 풀 관리.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{DataError, Result};

/// 연결 풀 설정.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl DatabaseConfig {
    /// 상시 실행 데몬용 설정 (작은 풀, 짧은 획득 대기).
    ///
    /// 획득 대기 시간이 워터마크 조회 한 번의 최대 지연 시간이 됩니다.
    pub fn for_daemon(url: String) -> Self {
        Self {
            url,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }

    /// 일회성 CLI 명령용 설정.
    pub fn for_cli(url: String) -> Self {
        Self {
            url,
            max_connections: 4,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }
}

/// DB 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 연결 풀 생성.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "DB 연결 풀 생성 완료"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `SELECT 1`로 연결 확인.
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    /// 캔들 테이블 생성 (이미 있으면 무시).
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE SCHEMA IF NOT EXISTS market_data",
            r#"
            CREATE TABLE IF NOT EXISTS market_data.candles (
                symbol_id    INTEGER      NOT NULL,
                timeframe_id INTEGER      NOT NULL,
                timestamp    TIMESTAMPTZ  NOT NULL,
                open         NUMERIC(20, 10) NOT NULL,
                high         NUMERIC(20, 10) NOT NULL,
                low          NUMERIC(20, 10) NOT NULL,
                close        NUMERIC(20, 10) NOT NULL,
                volume       BIGINT       NOT NULL DEFAULT 0,
                CONSTRAINT candles_natural_key UNIQUE (symbol_id, timeframe_id, timestamp)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_latest
                ON market_data.candles (symbol_id, timeframe_id, timestamp DESC)
            "#,
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| DataError::SchemaError(e.to_string()))?;
        }

        info!("market_data.candles 스키마 확인 완료");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
