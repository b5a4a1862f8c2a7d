//! 데이터 계층 에러.

use fxsync_core::StorageError;
use thiserror::Error;

/// 데이터 계층 에러.
#[derive(Debug, Error)]
pub enum DataError {
    /// DB 연결 에러
    #[error("DB 연결 실패: {0}")]
    ConnectionError(String),

    /// 조회 에러
    #[error("조회 실패: {0}")]
    QueryError(String),

    /// 삽입 에러
    #[error("삽입 실패: {0}")]
    InsertError(String),

    /// 스키마 생성 에러
    #[error("스키마 생성 실패: {0}")]
    SchemaError(String),
}

impl From<DataError> for StorageError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::InsertError(msg) => StorageError::WriteFailed(msg),
            other => StorageError::Unavailable(other.to_string()),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, DataError>;
