//! 에러 타입 정의.

use std::fmt;

use fxsync_core::{FetchError, StorageError};
use fxsync_data::DataError;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 데이터베이스 에러
    Database(sqlx::Error),
    /// 저장소 에러 (연결 불가, 쓰기 실패)
    Storage(String),
    /// 설정 에러
    Config(String),
    /// 데이터 소스 에러 (OANDA, 터미널)
    DataSource(String),
    /// 스케줄링 에러
    Scheduling(String),
    /// 재시도 한도 소진
    RetryExhausted { attempts: u32 },
    /// 일반 에러
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::DataSource(msg) => write!(f, "Data source error: {}", msg),
            Self::Scheduling(msg) => write!(f, "Scheduling error: {}", msg),
            Self::RetryExhausted { attempts } => {
                write!(f, "Retry budget exhausted after {} failed cycles", attempts)
            }
            Self::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<sqlx::Error> for CollectorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<DataError> for CollectorError {
    fn from(err: DataError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<StorageError> for CollectorError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<FetchError> for CollectorError {
    fn from(err: FetchError) -> Self {
        Self::DataSource(err.to_string())
    }
}

impl From<std::env::VarError> for CollectorError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CollectorError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err)
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
