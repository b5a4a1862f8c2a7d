//! 캔들 저장소 추상화.
//!
//! 자연 키 `(symbol_id, timeframe_id, timestamp)`에 대한 유니크 제약과
//! 충돌 정책(무시/갱신)을 갖춘 저장소 계약입니다. 여러 프로세스가 같은
//! 테이블에 동시에 쓰더라도 충돌 무시 upsert가 유일한 동시성 안전 장치입니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::Candle;

/// 키 충돌 시 처리 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// `ON CONFLICT DO NOTHING`. 실시간 동기화는 항상 이 정책
    #[default]
    Ignore,
    /// `ON CONFLICT DO UPDATE`. 백필 재조정 전용
    Update,
}

/// 저장소 에러.
#[derive(Debug, Error)]
pub enum StorageError {
    /// 연결 불가, 조회 실패
    #[error("저장소 사용 불가: {0}")]
    Unavailable(String),

    /// 쓰기 트랜잭션 실패
    #[error("저장 실패: {0}")]
    WriteFailed(String),
}

/// 캔들 저장소 trait.
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// 마지막 저장 캔들 시각 (`MAX(timestamp)`). 데이터가 없으면 `None`.
    async fn last_timestamp(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// 캔들 일괄 저장. 단일 트랜잭션으로 처리하며 실제로 삽입(또는 갱신)된
    /// 행 수를 반환합니다.
    ///
    /// # Errors
    ///
    /// 트랜잭션 실패 시 `StorageError::WriteFailed`. 이 경우 배치의 어떤 행도
    /// 저장되지 않습니다.
    async fn upsert_candles(
        &self,
        rows: &[Candle],
        policy: ConflictPolicy,
    ) -> Result<u64, StorageError>;

    /// 저장된 캔들 수.
    async fn count_candles(&self, symbol_id: i32, timeframe_id: i32) -> Result<i64, StorageError>;

    /// `[from, to)` 구간의 캔들 (시간순).
    async fn candles_range(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StorageError>;

    /// 연결 확인.
    async fn ping(&self) -> Result<(), StorageError>;
}
