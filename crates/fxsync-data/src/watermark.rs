//! 워터마크 추적기.
//!
//! 작업 단위별 마지막 저장 캔들 시각을 저장소에서 매번 다시 읽습니다.
//! 메모리에 캐시하지 않으므로 여러 프로세스가 같은 테이블을 갱신하거나
//! 프로세스가 재시작되어도 재개 지점이 어긋나지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxsync_core::{CandleStore, StorageError};
use tracing::warn;

/// 조회 실패 후 재시도 전 기본 대기 시간.
const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(500);

/// 워터마크 추적기.
#[derive(Clone)]
pub struct WatermarkTracker {
    store: Arc<dyn CandleStore>,
    retry_pause: Duration,
}

impl WatermarkTracker {
    pub fn new(store: Arc<dyn CandleStore>) -> Self {
        Self {
            store,
            retry_pause: DEFAULT_RETRY_PAUSE,
        }
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// 마지막 저장 캔들 시각 조회.
    ///
    /// 첫 조회가 실패하면 `retry_pause` 후 한 번 더 시도합니다. 두 번째도
    /// 실패하면 `StorageError::Unavailable`을 반환하며, 절대 `None`으로
    /// 대체하지 않습니다 (`None`은 "데이터 없음"만 의미).
    pub async fn get_watermark(
        &self,
        symbol_id: i32,
        timeframe_id: i32,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        match self.store.last_timestamp(symbol_id, timeframe_id).await {
            Ok(ts) => Ok(ts),
            Err(e) => {
                warn!(
                    symbol_id,
                    timeframe_id,
                    error = %e,
                    pause_ms = self.retry_pause.as_millis() as u64,
                    "워터마크 조회 실패, 재시도"
                );
                tokio::time::sleep(self.retry_pause).await;

                self.store
                    .last_timestamp(symbol_id, timeframe_id)
                    .await
                    .map_err(|e| match e {
                        StorageError::Unavailable(msg) => StorageError::Unavailable(msg),
                        other => StorageError::Unavailable(other.to_string()),
                    })
            }
        }
    }

    /// 내부 저장소 참조.
    pub fn store(&self) -> &Arc<dyn CandleStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCandleStore;
    use chrono::TimeZone;
    use fxsync_core::{Candle, ConflictPolicy};
    use rust_decimal_macros::dec;

    fn candle_at(hour: u32) -> Candle {
        Candle {
            symbol_id: 7,
            timeframe_id: 5,
            timestamp: Utc.with_ymd_and_hms(2025, 7, 1, hour, 0, 0).unwrap(),
            open: dec!(1.1),
            high: dec!(1.2),
            low: dec!(1.0),
            close: dec!(1.1),
            volume: 1,
        }
    }

    #[tokio::test]
    async fn test_watermark_none_when_empty() {
        let tracker = WatermarkTracker::new(Arc::new(MemoryCandleStore::new()));
        assert_eq!(tracker.get_watermark(7, 5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_watermark_is_max_timestamp() {
        let store = Arc::new(MemoryCandleStore::new());
        store
            .upsert_candles(&[candle_at(3), candle_at(1), candle_at(2)], ConflictPolicy::Ignore)
            .await
            .unwrap();

        let tracker = WatermarkTracker::new(store);
        assert_eq!(
            tracker.get_watermark(7, 5).await.unwrap(),
            Some(candle_at(3).timestamp)
        );
        // 다른 타임프레임은 영향 없음
        assert_eq!(tracker.get_watermark(7, 6).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watermark_unavailable_after_retry() {
        let store = Arc::new(MemoryCandleStore::new());
        store.set_fail_reads(true);

        let tracker = WatermarkTracker::new(store.clone()).with_retry_pause(Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let result = tracker.get_watermark(7, 5).await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
