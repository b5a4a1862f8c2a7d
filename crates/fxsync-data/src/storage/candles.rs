//! PostgreSQL 캔들 저장소.
//!
//! `market_data.candles` 테이블에 대한 [`CandleStore`] 구현입니다.
//!
//! # 동작 방식
//!
//! 1. 워터마크는 매번 `MAX(timestamp)`로 다시 조회 (메모리 캐시 없음)
//! 2. 저장은 단일 트랜잭션 안에서 UNNEST 배열 바인딩으로 일괄 삽입
//! 3. 키 충돌은 `ON CONFLICT`로 처리 (무시 또는 변경분만 갱신)
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use fxsync_data::PgCandleStore;
//!
//! let store = PgCandleStore::new(db.pool().clone());
//! let inserted = store.upsert_candles(&candles, ConflictPolicy::Ignore).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxsync_core::{Candle, CandleStore, ConflictPolicy, StorageError};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use crate::error::DataError;

/// 한 INSERT 문에 담는 최대 행 수.
pub const UPSERT_PAGE_SIZE: usize = 1000;

const INSERT_IGNORE_SQL: &str = r#"
    INSERT INTO market_data.candles
        (symbol_id, timeframe_id, timestamp, open, high, low, close, volume)
    SELECT * FROM UNNEST(
        $1::int4[], $2::int4[], $3::timestamptz[],
        $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[], $8::int8[]
    )
    ON CONFLICT (symbol_id, timeframe_id, timestamp) DO NOTHING
"#;

// 값이 달라진 행만 갱신해서 rows_affected가 실제 변경 수가 되도록 함
const INSERT_UPDATE_SQL: &str = r#"
    INSERT INTO market_data.candles AS c
        (symbol_id, timeframe_id, timestamp, open, high, low, close, volume)
    SELECT * FROM UNNEST(
        $1::int4[], $2::int4[], $3::timestamptz[],
        $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[], $8::int8[]
    )
    ON CONFLICT (symbol_id, timeframe_id, timestamp) DO UPDATE SET
        open = EXCLUDED.open,
        high = EXCLUDED.high,
        low = EXCLUDED.low,
        close = EXCLUDED.close,
        volume = EXCLUDED.volume
    WHERE (c.open, c.high, c.low, c.close, c.volume)
        IS DISTINCT FROM (EXCLUDED.open, EXCLUDED.high, EXCLUDED.low, EXCLUDED.close, EXCLUDED.volume)
"#;

/// 캔들 DB 레코드.
#[derive(Debug, Clone, FromRow)]
struct CandleRecord {
    symbol_id: i32,
    timeframe_id: i32,
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: i64,
}

impl From<CandleRecord> for Candle {
    fn from(r: CandleRecord) -> Self {
        Candle {
            symbol_id: r.symbol_id,
            timeframe_id: r.timeframe_id,
            timestamp: r.timestamp,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

/// PostgreSQL 캔들 저장소.
#[derive(Clone)]
pub struct PgCandleStore {
    pool: PgPool,
}

impl PgCandleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleStore for PgCandleStore {
    #[instrument(skip(self))]
    async fn last_timestamp(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let last: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MAX(timestamp) FROM market_data.candles
            WHERE symbol_id = $1 AND timeframe_id = $2
            "#,
        )
        .bind(symbol_id)
        .bind(timeframe_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        Ok(last)
    }

    /// 동일 키가 배치 안에 두 번 나오면 `Update` 정책에서 PostgreSQL이
    /// 에러를 반환하므로 호출 측에서 중복을 제거해야 합니다.
    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert_candles(
        &self,
        rows: &[Candle],
        policy: ConflictPolicy,
    ) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = match policy {
            ConflictPolicy::Ignore => INSERT_IGNORE_SQL,
            ConflictPolicy::Update => INSERT_UPDATE_SQL,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;
        let mut affected: u64 = 0;

        for page in rows.chunks(UPSERT_PAGE_SIZE) {
            let symbol_ids: Vec<i32> = page.iter().map(|c| c.symbol_id).collect();
            let timeframe_ids: Vec<i32> = page.iter().map(|c| c.timeframe_id).collect();
            let timestamps: Vec<DateTime<Utc>> = page.iter().map(|c| c.timestamp).collect();
            let opens: Vec<Decimal> = page.iter().map(|c| c.open).collect();
            let highs: Vec<Decimal> = page.iter().map(|c| c.high).collect();
            let lows: Vec<Decimal> = page.iter().map(|c| c.low).collect();
            let closes: Vec<Decimal> = page.iter().map(|c| c.close).collect();
            let volumes: Vec<i64> = page.iter().map(|c| c.volume).collect();

            let result = sqlx::query(sql)
                .bind(&symbol_ids)
                .bind(&timeframe_ids)
                .bind(&timestamps)
                .bind(&opens)
                .bind(&highs)
                .bind(&lows)
                .bind(&closes)
                .bind(&volumes)
                .execute(&mut *tx)
                .await
                .map_err(|e| DataError::InsertError(e.to_string()))?;

            affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

        if affected > 0 {
            info!(
                rows = rows.len(),
                affected = affected,
                policy = ?policy,
                "캔들 저장 완료"
            );
        } else {
            debug!(rows = rows.len(), "신규 캔들 없음 (모두 충돌)");
        }

        Ok(affected)
    }

    #[instrument(skip(self))]
    async fn count_candles(&self, symbol_id: i32, timeframe_id: i32) -> Result<i64, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM market_data.candles
            WHERE symbol_id = $1 AND timeframe_id = $2
            "#,
        )
        .bind(symbol_id)
        .bind(timeframe_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn candles_range(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StorageError> {
        let records: Vec<CandleRecord> = sqlx::query_as(
            r#"
            SELECT symbol_id, timeframe_id, timestamp, open, high, low, close, volume
            FROM market_data.candles
            WHERE symbol_id = $1 AND timeframe_id = $2 AND timestamp >= $3 AND timestamp < $4
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol_id)
        .bind(timeframe_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DataError::QueryError(e.to_string()))?;

        Ok(records.into_iter().map(Candle::from).collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// 테스트
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sql_conflict_targets() {
        assert!(INSERT_IGNORE_SQL.contains("DO NOTHING"));
        assert!(INSERT_UPDATE_SQL.contains("DO UPDATE"));
        for sql in [INSERT_IGNORE_SQL, INSERT_UPDATE_SQL] {
            assert!(sql.contains("ON CONFLICT (symbol_id, timeframe_id, timestamp)"));
        }
    }

    #[test]
    fn test_data_error_maps_to_storage_error() {
        let write: StorageError = DataError::InsertError("boom".to_string()).into();
        assert!(matches!(write, StorageError::WriteFailed(_)));

        let read: StorageError = DataError::QueryError("down".to_string()).into();
        assert!(matches!(read, StorageError::Unavailable(_)));
    }
}
