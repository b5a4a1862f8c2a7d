//! 메모리 캔들 저장소.
//!
//! PostgreSQL 저장소와 같은 충돌 정책을 따르는 프로세스 내 구현입니다.
//! 테스트와 dry-run에서 사용하며, 장애 주입을 지원합니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxsync_core::{Candle, CandleKey, CandleStore, ConflictPolicy, StorageError};
use tokio::sync::RwLock;

/// 메모리 캔들 저장소.
#[derive(Debug, Default)]
pub struct MemoryCandleStore {
    rows: RwLock<BTreeMap<CandleKey, Candle>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_calls: AtomicUsize,
}

impl MemoryCandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 조회 장애 주입.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 쓰기 장애 주입.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// `upsert_candles` 호출 횟수 (빈 배치 제외).
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// 전체 행 수.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// 특정 작업 단위의 저장 시각 목록 (오름차순).
    pub async fn timestamps(&self, symbol_id: i32, timeframe_id: i32) -> Vec<DateTime<Utc>> {
        self.rows
            .read()
            .await
            .keys()
            .filter(|k| k.symbol_id == symbol_id && k.timeframe_id == timeframe_id)
            .map(|k| k.timestamp)
            .collect()
    }

    fn check_reads(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("주입된 조회 장애".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn last_timestamp(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.check_reads()?;
        Ok(self
            .rows
            .read()
            .await
            .keys()
            .filter(|k| k.symbol_id == symbol_id && k.timeframe_id == timeframe_id)
            .map(|k| k.timestamp)
            .max())
    }

    async fn upsert_candles(
        &self,
        rows: &[Candle],
        policy: ConflictPolicy,
    ) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed("주입된 쓰기 장애".to_string()));
        }

        // 쓰기 락을 잡은 채 전체 배치를 반영하므로 부분 가시성이 없음
        let mut table = self.rows.write().await;
        let mut affected = 0;

        for candle in rows {
            match table.get_mut(&candle.key()) {
                None => {
                    table.insert(candle.key(), candle.clone());
                    affected += 1;
                }
                Some(existing) => {
                    if policy == ConflictPolicy::Update && existing != candle {
                        *existing = candle.clone();
                        affected += 1;
                    }
                }
            }
        }

        Ok(affected)
    }

    async fn count_candles(&self, symbol_id: i32, timeframe_id: i32) -> Result<i64, StorageError> {
        self.check_reads()?;
        Ok(self
            .rows
            .read()
            .await
            .keys()
            .filter(|k| k.symbol_id == symbol_id && k.timeframe_id == timeframe_id)
            .count() as i64)
    }

    async fn candles_range(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, StorageError> {
        self.check_reads()?;
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|c| {
                c.symbol_id == symbol_id
                    && c.timeframe_id == timeframe_id
                    && c.timestamp >= from
                    && c.timestamp < to
            })
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check_reads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(minute: u32, close: rust_decimal::Decimal) -> Candle {
        Candle {
            symbol_id: 7,
            timeframe_id: 4,
            timestamp: Utc.with_ymd_and_hms(2025, 7, 1, 0, minute, 0).unwrap(),
            open: dec!(1.10),
            high: dec!(1.20),
            low: dec!(1.00),
            close,
            volume: 10,
        }
    }

    #[tokio::test]
    async fn test_ignore_policy_is_idempotent() {
        let store = MemoryCandleStore::new();
        let batch = vec![candle(0, dec!(1.1)), candle(15, dec!(1.1))];

        assert_eq!(store.upsert_candles(&batch, ConflictPolicy::Ignore).await.unwrap(), 2);
        assert_eq!(store.upsert_candles(&batch, ConflictPolicy::Ignore).await.unwrap(), 0);
        assert_eq!(store.count_candles(7, 4).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_policy_counts_changed_rows_only() {
        let store = MemoryCandleStore::new();
        store
            .upsert_candles(&[candle(0, dec!(1.1)), candle(15, dec!(1.1))], ConflictPolicy::Ignore)
            .await
            .unwrap();

        let revised = vec![candle(0, dec!(1.15)), candle(15, dec!(1.1))];
        assert_eq!(store.upsert_candles(&revised, ConflictPolicy::Update).await.unwrap(), 1);

        let rows = store
            .candles_range(7, 4, candle(0, dec!(0)).timestamp, candle(30, dec!(0)).timestamp)
            .await
            .unwrap();
        assert_eq!(rows[0].close, dec!(1.15));
    }

    #[tokio::test]
    async fn test_last_timestamp_and_failures() {
        let store = MemoryCandleStore::new();
        assert_eq!(store.last_timestamp(7, 4).await.unwrap(), None);

        store
            .upsert_candles(&[candle(30, dec!(1.1)), candle(15, dec!(1.1))], ConflictPolicy::Ignore)
            .await
            .unwrap();
        assert_eq!(
            store.last_timestamp(7, 4).await.unwrap(),
            Some(candle(30, dec!(1.1)).timestamp)
        );

        store.set_fail_reads(true);
        assert!(matches!(
            store.last_timestamp(7, 4).await,
            Err(StorageError::Unavailable(_))
        ));

        store.set_fail_writes(true);
        assert!(store
            .upsert_candles(&[candle(45, dec!(1.1))], ConflictPolicy::Ignore)
            .await
            .is_err());
    }
}
