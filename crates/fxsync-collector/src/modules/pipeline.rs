//! 캔들 수집 파이프라인.
//!
//! 한 작업 단위에 대해 다음 순서로 처리합니다.
//!
//! 1. 업스트림 조회 (`fetch_timeout` 적용), 미완성 봉 제외
//! 2. 캔들 검증, 잘못된 캔들 제외
//! 3. 배치 내 중복 제거 및 시간순 정렬
//! 4. `timestamp > watermark` 필터
//! 5. 단일 트랜잭션 upsert (남은 캔들이 없으면 쓰기 없음)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxsync_core::{
    CandleStore, CandleValidator, ConflictPolicy, DeduplicationFilter, FetchError, FetchRequest,
    FetchWindow, FetchWindowPlanner, RawCandle, UpstreamFetcher, WorkUnit,
};
use fxsync_data::WatermarkTracker;
use thiserror::Error;
use tracing::instrument;

use crate::config::SyncConfig;

/// 단계별 처리 결과.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestResult {
    /// 업스트림에서 받은 캔들 수
    pub fetched: usize,
    /// 미완성 봉
    pub incomplete: usize,
    /// 검증 실패
    pub invalid: usize,
    /// 배치 내 중복
    pub duplicates: usize,
    /// 워터마크 이하
    pub stale: usize,
    /// 저장소 키 충돌
    pub conflicts: usize,
    /// 실제 저장(또는 갱신)된 행 수
    pub inserted_count: u64,
    /// 이번 배치의 마지막 캔들 시각
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl IngestResult {
    /// 저장되지 않은 캔들 수
    pub fn skipped_count(&self) -> usize {
        self.incomplete + self.invalid + self.duplicates + self.stale + self.conflicts
    }

    /// 구간별 결과 누적 (백필)
    pub fn merge(&mut self, other: &IngestResult) {
        self.fetched += other.fetched;
        self.incomplete += other.incomplete;
        self.invalid += other.invalid;
        self.duplicates += other.duplicates;
        self.stale += other.stale;
        self.conflicts += other.conflicts;
        self.inserted_count += other.inserted_count;
        self.last_timestamp = self.last_timestamp.max(other.last_timestamp);
    }
}

/// 파이프라인 에러.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("업스트림 조회 실패: {0}")]
    FetchFailed(#[from] FetchError),

    /// 배치의 모든 캔들이 검증 실패
    #[error("배치 전체 검증 실패 ({rejected}개)")]
    ValidationExhausted { rejected: usize },

    #[error("캔들 저장 실패: {0}")]
    StorageWriteFailed(String),

    #[error("저장소 사용 불가: {0}")]
    StorageUnavailable(String),
}

/// 업스트림 → 저장소 파이프라인. 공급자와 무관합니다.
pub struct IngestionPipeline {
    fetcher: Arc<dyn UpstreamFetcher>,
    store: Arc<dyn CandleStore>,
    watermarks: WatermarkTracker,
    planner: FetchWindowPlanner,
    validator: CandleValidator,
    dedup: DeduplicationFilter,
    fetch_timeout: Duration,
    max_count: Option<u32>,
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn UpstreamFetcher>,
        store: Arc<dyn CandleStore>,
        planner: FetchWindowPlanner,
    ) -> Self {
        Self {
            watermarks: WatermarkTracker::new(store.clone()),
            fetcher,
            store,
            planner,
            validator: CandleValidator::new(),
            dedup: DeduplicationFilter::new(),
            fetch_timeout: Duration::from_secs(30),
            max_count: None,
        }
    }

    /// 동기화 설정으로 생성 (룩백, 요청당 캔들 수, 타임아웃).
    pub fn from_config(
        fetcher: Arc<dyn UpstreamFetcher>,
        store: Arc<dyn CandleStore>,
        config: &SyncConfig,
    ) -> Self {
        let planner =
            FetchWindowPlanner::new(config.lookback()).with_max_candles(config.candles_per_fetch);
        Self::new(fetcher, store, planner)
            .with_fetch_timeout(config.fetch_timeout())
            .with_max_count(config.candles_per_fetch)
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_count(mut self, max_count: u32) -> Self {
        self.max_count = (max_count > 0).then_some(max_count);
        self
    }

    pub fn with_watermark_retry_pause(mut self, pause: Duration) -> Self {
        self.watermarks = self.watermarks.with_retry_pause(pause);
        self
    }

    pub fn planner(&self) -> &FetchWindowPlanner {
        &self.planner
    }

    pub fn store(&self) -> &Arc<dyn CandleStore> {
        &self.store
    }

    pub fn fetcher_name(&self) -> &str {
        self.fetcher.name()
    }

    /// 실시간 동기화 한 번: 워터마크 조회 → 구간 계획 → 수집.
    ///
    /// 구간에 워터마크 이후의 완결 봉이 없으면 (주말, 휴장, 거래 정지)
    /// 그 구간의 끝에서 다음 구간을 계획해 신규 캔들이 나오거나 `now`에
    /// 도달할 때까지 이어서 요청합니다. 빈 구간에 머무르지 않습니다.
    pub async fn sync_unit(
        &self,
        unit: &WorkUnit,
        now: DateTime<Utc>,
    ) -> Result<IngestResult, IngestError> {
        let watermark = self
            .watermarks
            .get_watermark(unit.symbol_id, unit.timeframe_id())
            .await
            .map_err(|e| IngestError::StorageUnavailable(e.to_string()))?;

        let mut total = IngestResult::default();
        let mut cursor = watermark;
        let mut windows = 0usize;

        while let Some(window) = self.planner.plan(cursor, now, unit.timeframe) {
            let result = self.ingest(unit, &window, watermark).await?;
            total.merge(&result);
            windows += 1;

            if result.last_timestamp.is_some() || window.to() >= now {
                break;
            }

            tracing::debug!(unit = %unit, window = %window, "구간에 신규 캔들 없음, 다음 구간 요청");
            cursor = Some(window.to());
        }

        if windows == 0 {
            tracing::debug!(unit = %unit, "요청할 구간 없음");
        } else if windows > 1 {
            tracing::info!(
                unit = %unit,
                windows,
                inserted = total.inserted_count,
                "빈 구간을 건너뛰고 동기화"
            );
        }

        Ok(total)
    }

    /// 충돌 무시 정책으로 구간 수집.
    pub async fn ingest(
        &self,
        unit: &WorkUnit,
        window: &FetchWindow,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<IngestResult, IngestError> {
        self.ingest_with_policy(unit, window, watermark, ConflictPolicy::Ignore)
            .await
    }

    #[instrument(
        name = "ingest",
        skip(self, unit, window, watermark),
        fields(symbol = %unit.symbol, timeframe = %unit.timeframe, window = %window)
    )]
    pub async fn ingest_with_policy(
        &self,
        unit: &WorkUnit,
        window: &FetchWindow,
        watermark: Option<DateTime<Utc>>,
        policy: ConflictPolicy,
    ) -> Result<IngestResult, IngestError> {
        let raw = self.fetch(unit, window).await?;
        let mut result = IngestResult {
            fetched: raw.len(),
            ..Default::default()
        };

        let (complete, incomplete): (Vec<RawCandle>, Vec<RawCandle>) =
            raw.into_iter().partition(|c| c.complete);
        result.incomplete = incomplete.len();

        let candles = complete
            .into_iter()
            .map(|c| c.into_candle(unit.symbol_id, unit.timeframe_id()))
            .collect();

        let validation = self.validator.partition(candles);
        result.invalid = validation.rejected.len();
        for (candle, issue) in &validation.rejected {
            tracing::debug!(timestamp = %candle.timestamp, issue = %issue, "캔들 검증 실패");
        }
        if validation.is_exhausted() {
            tracing::warn!(rejected = result.invalid, "배치의 모든 캔들이 검증에 실패했습니다");
            return Err(IngestError::ValidationExhausted {
                rejected: result.invalid,
            });
        }

        let dedup = self.dedup.apply(validation.valid);
        result.duplicates = dedup.removed;

        let mut survivors = dedup.unique;
        if let Some(watermark) = watermark {
            let before = survivors.len();
            survivors.retain(|c| c.timestamp > watermark);
            result.stale = before - survivors.len();
        }

        if survivors.is_empty() {
            tracing::debug!(
                fetched = result.fetched,
                skipped = result.skipped_count(),
                "저장할 신규 캔들 없음"
            );
            return Ok(result);
        }

        let inserted = self
            .store
            .upsert_candles(&survivors, policy)
            .await
            .map_err(|e| IngestError::StorageWriteFailed(e.to_string()))?;

        result.inserted_count = inserted;
        result.conflicts = survivors.len().saturating_sub(inserted as usize);
        result.last_timestamp = survivors.last().map(|c| c.timestamp);

        tracing::debug!(
            fetched = result.fetched,
            inserted = result.inserted_count,
            skipped = result.skipped_count(),
            "캔들 저장 완료"
        );

        Ok(result)
    }

    async fn fetch(
        &self,
        unit: &WorkUnit,
        window: &FetchWindow,
    ) -> Result<Vec<RawCandle>, IngestError> {
        let mut request = FetchRequest::for_window(unit, window);
        if let Some(max_count) = self.max_count {
            request = request.with_max_count(max_count);
        }

        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_candles(&request)).await
        {
            Ok(Ok(candles)) => Ok(candles),
            Ok(Err(e)) => {
                tracing::warn!(provider = self.fetcher.name(), error = %e, "업스트림 조회 실패");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(
                    provider = self.fetcher.name(),
                    timeout_secs = self.fetch_timeout.as_secs(),
                    "업스트림 조회 타임아웃"
                );
                Err(FetchError::Timeout(self.fetch_timeout).into())
            }
        }
    }
}
