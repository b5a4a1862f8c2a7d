//! 작업 단위 동시 실행.
//!
//! 병렬 모드는 `Semaphore`로 동시 작업 수를 제한하고 완료되는 순서대로
//! 결과를 모읍니다. 순차 모드는 우선순위 순으로 하나씩 실행합니다.
//! 작업 하나의 실패(패닉 포함)는 다른 작업에 영향을 주지 않습니다.
//! 단, 저장소 사용 불가는 사이클 전체에 치명적이므로 남은 작업은 시작하지
//! 않고 `Cancelled`로 보고합니다.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use fxsync_core::WorkUnit;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::modules::clock::Clock;
use crate::modules::pipeline::{IngestError, IngestResult, IngestionPipeline};
use crate::stats::{CycleReport, FailureKind, UnitOutcome, UnitReport};

/// 작업 단위마다 실행할 작업.
#[async_trait]
pub trait UnitJob: Send + Sync + 'static {
    async fn run(&self, unit: &WorkUnit) -> Result<IngestResult, IngestError>;

    /// 로그용 이름
    fn label(&self) -> &str;
}

/// 실시간 증분 동기화 작업.
pub struct LiveSyncJob {
    pipeline: Arc<IngestionPipeline>,
    clock: Arc<dyn Clock>,
}

impl LiveSyncJob {
    pub fn new(pipeline: Arc<IngestionPipeline>, clock: Arc<dyn Clock>) -> Self {
        Self { pipeline, clock }
    }
}

#[async_trait]
impl UnitJob for LiveSyncJob {
    async fn run(&self, unit: &WorkUnit) -> Result<IngestResult, IngestError> {
        self.pipeline.sync_unit(unit, self.clock.now()).await
    }

    fn label(&self) -> &str {
        "live-sync"
    }
}

/// 실행 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 최대 `max_workers`개 동시 실행, 시작 간격 `stagger`
    Parallel { max_workers: usize, stagger: Duration },
    /// 우선순위 순 하나씩, 작업 간 `delay`
    Sequential { delay: Duration },
}

/// 작업 단위 스케줄러.
#[derive(Debug, Clone)]
pub struct ConcurrencyScheduler {
    mode: Mode,
}

impl ConcurrencyScheduler {
    pub fn new(mode: Mode) -> Self {
        Self { mode }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        let mode = if config.parallel {
            Mode::Parallel {
                max_workers: config.max_workers.max(1),
                stagger: config.stagger(),
            }
        } else {
            Mode::Sequential {
                delay: config.sequential_delay(),
            }
        };
        Self::new(mode)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// 작업 단위 목록을 한 사이클로 실행.
    ///
    /// `cancel`이 발동되면 새 작업은 시작하지 않고 실행 중인 작업만 마칩니다.
    /// 시작하지 못한 작업은 `Cancelled`로 보고됩니다.
    pub async fn run_cycle(
        &self,
        units: Vec<WorkUnit>,
        job: Arc<dyn UnitJob>,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let started = Instant::now();
        tracing::debug!(job = job.label(), units = units.len(), mode = ?self.mode, "사이클 실행");

        // 종료 신호 또는 저장소 사용 불가 시 발동
        let cycle_cancel = cancel.child_token();

        let reports = match self.mode {
            Mode::Parallel {
                max_workers,
                stagger,
            } => run_parallel(units, job, &cycle_cancel, max_workers, stagger).await,
            Mode::Sequential { delay } => run_sequential(units, job, &cycle_cancel, delay).await,
        };

        let report = CycleReport::new(reports, started.elapsed());
        if cycle_cancel.is_cancelled() && !cancel.is_cancelled() {
            tracing::error!(
                failed = report.failed_units,
                not_started = report.cancelled_units,
                "저장소 사용 불가로 사이클 중단"
            );
        }
        report
    }
}

async fn run_parallel(
    units: Vec<WorkUnit>,
    job: Arc<dyn UnitJob>,
    cancel: &CancellationToken,
    max_workers: usize,
    stagger: Duration,
) -> Vec<UnitReport> {
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut in_flight = FuturesUnordered::new();
    let mut reports = Vec::with_capacity(units.len());

    for (idx, unit) in units.into_iter().enumerate() {
        if cancel.is_cancelled() {
            reports.push(UnitReport::cancelled(unit));
            continue;
        }

        if idx > 0 && !stagger.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    reports.push(UnitReport::cancelled(unit));
                    continue;
                }
                _ = tokio::time::sleep(stagger) => {}
            }
        }

        // 동시 실행 수 제한 (permit 획득까지 대기)
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                reports.push(UnitReport::cancelled(unit));
                continue;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    reports.push(UnitReport {
                        unit,
                        outcome: UnitOutcome::Failed {
                            kind: FailureKind::Internal,
                            message: format!("세마포어 획득 실패: {}", e),
                        },
                        elapsed: Duration::ZERO,
                    });
                    continue;
                }
            },
        };

        let unit_started = Instant::now();
        let report_unit = unit.clone();
        let job = job.clone();
        let abort = cancel.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let result = job.run(&unit).await;
            if matches!(result, Err(IngestError::StorageUnavailable(_))) {
                abort.cancel();
            }
            result
        });

        in_flight.push(async move {
            let outcome = match handle.await {
                Ok(result) => UnitOutcome::from_result(result),
                Err(e) => {
                    tracing::error!(unit = %report_unit, error = %e, "작업 패닉");
                    UnitOutcome::Failed {
                        kind: FailureKind::Internal,
                        message: format!("작업 패닉: {}", e),
                    }
                }
            };
            UnitReport {
                unit: report_unit,
                outcome,
                elapsed: unit_started.elapsed(),
            }
        });
    }

    while let Some(report) = in_flight.next().await {
        log_unit(&report);
        reports.push(report);
    }

    reports
}

async fn run_sequential(
    units: Vec<WorkUnit>,
    job: Arc<dyn UnitJob>,
    cancel: &CancellationToken,
    delay: Duration,
) -> Vec<UnitReport> {
    let mut reports = Vec::with_capacity(units.len());

    for (idx, unit) in units.into_iter().enumerate() {
        if cancel.is_cancelled() {
            reports.push(UnitReport::cancelled(unit));
            continue;
        }

        if idx > 0 && !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    reports.push(UnitReport::cancelled(unit));
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let unit_started = Instant::now();
        let outcome = match AssertUnwindSafe(job.run(&unit)).catch_unwind().await {
            Ok(result) => UnitOutcome::from_result(result),
            Err(_) => {
                tracing::error!(unit = %unit, "작업 패닉");
                UnitOutcome::Failed {
                    kind: FailureKind::Internal,
                    message: "작업 패닉".to_string(),
                }
            }
        };

        if matches!(
            outcome,
            UnitOutcome::Failed {
                kind: FailureKind::StorageUnavailable,
                ..
            }
        ) {
            cancel.cancel();
        }

        let report = UnitReport {
            unit,
            outcome,
            elapsed: unit_started.elapsed(),
        };
        log_unit(&report);
        reports.push(report);
    }

    reports
}

fn log_unit(report: &UnitReport) {
    match &report.outcome {
        UnitOutcome::Synced(result) => tracing::debug!(
            symbol = %report.unit.symbol,
            timeframe = %report.unit.timeframe,
            inserted = result.inserted_count,
            skipped = result.skipped_count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "작업 완료"
        ),
        UnitOutcome::Degraded { rejected } => tracing::warn!(
            symbol = %report.unit.symbol,
            timeframe = %report.unit.timeframe,
            rejected = rejected,
            "검증 실패로 저장 없음"
        ),
        UnitOutcome::Skipped { reason } => tracing::warn!(
            symbol = %report.unit.symbol,
            timeframe = %report.unit.timeframe,
            reason = %reason,
            "업스트림 거부, 이번 사이클 건너뜀"
        ),
        UnitOutcome::Failed { kind, message } => tracing::debug!(
            symbol = %report.unit.symbol,
            timeframe = %report.unit.timeframe,
            kind = kind.as_str(),
            error = %message,
            "작업 실패"
        ),
        UnitOutcome::Cancelled => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxsync_core::{CurrencyPair, FetchError, Timeframe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 실행 순서와 최대 동시 실행 수를 기록하는 작업.
    #[derive(Default)]
    struct RecordingJob {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
        work: Duration,
    }

    #[async_trait]
    impl UnitJob for RecordingJob {
        async fn run(&self, unit: &WorkUnit) -> Result<IngestResult, IngestError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().unwrap().push(unit.symbol.clone());

            tokio::time::sleep(self.work).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            match unit.symbol.as_str() {
                "PANIC" => panic!("boom"),
                "BAD" => Err(IngestError::FetchFailed(FetchError::Rejected(
                    "HTTP 400".to_string(),
                ))),
                "DBDOWN" => Err(IngestError::StorageUnavailable(
                    "connection refused".to_string(),
                )),
                _ => Ok(IngestResult {
                    inserted_count: 1,
                    ..Default::default()
                }),
            }
        }

        fn label(&self) -> &str {
            "recording"
        }
    }

    fn units(symbols: &[&str]) -> Vec<WorkUnit> {
        symbols
            .iter()
            .enumerate()
            .map(|(i, s)| WorkUnit::new(&CurrencyPair::new(*s, i as i32 + 1), Timeframe::M15))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_respects_max_workers() {
        let job = Arc::new(RecordingJob {
            work: Duration::from_secs(1),
            ..Default::default()
        });
        let scheduler = ConcurrencyScheduler::new(Mode::Parallel {
            max_workers: 2,
            stagger: Duration::from_millis(200),
        });

        let report = scheduler
            .run_cycle(
                units(&["A", "B", "C", "D", "E"]),
                job.clone(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.successful_units, 5);
        assert_eq!(report.total_inserted, 5);
        assert_eq!(job.peak.load(Ordering::SeqCst), 2);
        // 제출 순서는 우선순위 순
        assert_eq!(*job.order.lock().unwrap(), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_internal_failure() {
        let job = Arc::new(RecordingJob::default());

        for mode in [
            Mode::Parallel {
                max_workers: 3,
                stagger: Duration::ZERO,
            },
            Mode::Sequential {
                delay: Duration::ZERO,
            },
        ] {
            let report = ConcurrencyScheduler::new(mode)
                .run_cycle(units(&["A", "PANIC", "BAD"]), job.clone(), &CancellationToken::new())
                .await;

            assert_eq!(report.successful_units, 1);
            assert_eq!(report.skipped_units, 1);
            assert_eq!(report.failed_units, 1);
            let panicked = report
                .units
                .iter()
                .find(|u| u.unit.symbol == "PANIC")
                .unwrap();
            assert!(matches!(
                panicked.outcome,
                UnitOutcome::Failed {
                    kind: FailureKind::Internal,
                    ..
                }
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_unavailable_aborts_rest_of_cycle() {
        for mode in [
            Mode::Parallel {
                max_workers: 1,
                stagger: Duration::ZERO,
            },
            Mode::Sequential {
                delay: Duration::ZERO,
            },
        ] {
            let job = Arc::new(RecordingJob {
                work: Duration::from_secs(1),
                ..Default::default()
            });
            let cancel = CancellationToken::new();

            let report = ConcurrencyScheduler::new(mode)
                .run_cycle(units(&["A", "DBDOWN", "B", "C"]), job.clone(), &cancel)
                .await;

            assert_eq!(report.successful_units, 1, "{:?}", mode);
            assert_eq!(report.failed_units, 1, "{:?}", mode);
            assert_eq!(report.cancelled_units, 2, "{:?}", mode);
            assert!(!report.success());
            // B, C는 시작되지 않음
            assert_eq!(*job.order.lock().unwrap(), vec!["A", "DBDOWN"]);
            // 사이클 중단이 종료 신호로 번지지 않음
            assert!(!cancel.is_cancelled());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_runs_one_at_a_time() {
        let job = Arc::new(RecordingJob {
            work: Duration::from_millis(50),
            ..Default::default()
        });
        let report = ConcurrencyScheduler::new(Mode::Sequential {
            delay: Duration::from_millis(100),
        })
        .run_cycle(units(&["A", "B", "C"]), job.clone(), &CancellationToken::new())
        .await;

        assert!(report.success());
        assert_eq!(job.peak.load(Ordering::SeqCst), 1);
        let order: Vec<_> = report.units.iter().map(|u| u.unit.symbol.clone()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_new_submissions() {
        let job = Arc::new(RecordingJob {
            work: Duration::from_secs(1),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let scheduler = ConcurrencyScheduler::new(Mode::Parallel {
            max_workers: 1,
            stagger: Duration::ZERO,
        });

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let report = scheduler
            .run_cycle(units(&["A", "B", "C"]), job.clone(), &cancel)
            .await;

        // A는 실행 중이었으므로 완료, 나머지는 취소
        assert_eq!(report.successful_units, 1);
        assert_eq!(report.cancelled_units, 2);
        assert!(report.success());
    }
}
