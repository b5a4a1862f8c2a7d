//! 과거 구간 백필과 초기 히스토리 다운로드.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxsync_core::{ConflictPolicy, WorkUnit};
use tokio_util::sync::CancellationToken;

use crate::modules::concurrency::{ConcurrencyScheduler, UnitJob};
use crate::modules::pipeline::{IngestError, IngestResult, IngestionPipeline};
use crate::stats::CycleReport;

/// `[start, end]` 구간을 청크 단위로 나눠 수집하는 작업.
///
/// 워터마크 필터 없이 저장소 충돌 정책으로 중복을 처리합니다.
/// 빈 구간이나 전체 검증 실패 구간은 건너뛰고, 조회/저장 에러는
/// 해당 작업 단위를 중단합니다.
pub struct BackfillJob {
    pipeline: Arc<IngestionPipeline>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    policy: ConflictPolicy,
    window_delay: Duration,
}

impl BackfillJob {
    pub fn new(pipeline: Arc<IngestionPipeline>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            pipeline,
            start,
            end,
            policy: ConflictPolicy::Ignore,
            window_delay: Duration::from_millis(100),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_window_delay(mut self, delay: Duration) -> Self {
        self.window_delay = delay;
        self
    }
}

#[async_trait]
impl UnitJob for BackfillJob {
    async fn run(&self, unit: &WorkUnit) -> Result<IngestResult, IngestError> {
        let mut total = IngestResult::default();
        let windows = self
            .pipeline
            .planner()
            .backfill_windows(self.start, self.end, unit.timeframe);

        for (idx, window) in windows.enumerate() {
            if idx > 0 && !self.window_delay.is_zero() {
                tokio::time::sleep(self.window_delay).await;
            }

            match self
                .pipeline
                .ingest_with_policy(unit, &window, None, self.policy)
                .await
            {
                Ok(result) => total.merge(&result),
                Err(IngestError::ValidationExhausted { rejected }) => {
                    tracing::warn!(unit = %unit, window = %window, rejected, "구간 전체 검증 실패, 다음 구간 진행");
                    total.invalid += rejected;
                }
                Err(e) => {
                    tracing::error!(unit = %unit, window = %window, error = %e, "백필 중단");
                    return Err(e);
                }
            }
        }

        tracing::info!(
            symbol = %unit.symbol,
            timeframe = %unit.timeframe,
            fetched = total.fetched,
            inserted = total.inserted_count,
            "백필 완료"
        );
        Ok(total)
    }

    fn label(&self) -> &str {
        "backfill"
    }
}

/// 저장된 캔들이 없는 작업 단위만 최근 `days`일 다운로드.
///
/// 실패는 로그로만 남기며 호출자를 중단시키지 않습니다.
/// 다운로드할 작업 단위가 없으면 `None`.
pub async fn download_initial_history(
    pipeline: Arc<IngestionPipeline>,
    scheduler: &ConcurrencyScheduler,
    units: &[WorkUnit],
    days: i64,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Option<CycleReport> {
    if days <= 0 {
        tracing::debug!("초기 히스토리 다운로드 비활성화");
        return None;
    }

    let mut empty_units = Vec::new();
    for unit in units.iter().filter(|u| u.enabled) {
        match pipeline
            .store()
            .count_candles(unit.symbol_id, unit.timeframe_id())
            .await
        {
            Ok(0) => empty_units.push(unit.clone()),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(unit = %unit, error = %e, "캔들 수 조회 실패, 초기 다운로드 건너뜀");
            }
        }
    }

    if empty_units.is_empty() {
        tracing::info!("모든 작업 단위에 데이터가 있어 초기 다운로드 생략");
        return None;
    }

    tracing::info!(units = empty_units.len(), days, "초기 히스토리 다운로드 시작");
    let job = BackfillJob::new(pipeline, now - chrono::Duration::days(days), now);
    let report = scheduler.run_cycle(empty_units, Arc::new(job), cancel).await;
    report.log_summary("초기 히스토리 다운로드");
    Some(report)
}
