//! 동기화 통계 구조체.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxsync_core::{FetchError, WorkUnit};
use uuid::Uuid;

use crate::modules::pipeline::{IngestError, IngestResult};

/// 실패 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 네트워크, 타임아웃, 한도 초과, 파싱 오류
    Transient,
    /// 업스트림 인증 실패
    Unauthorized,
    /// 저장소 연결/조회 불가
    StorageUnavailable,
    /// 저장 트랜잭션 실패
    StorageWrite,
    /// 작업 패닉 등 내부 오류
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::StorageUnavailable => "storage_unavailable",
            FailureKind::StorageWrite => "storage_write",
            FailureKind::Internal => "internal",
        }
    }
}

/// 작업 단위 처리 결과
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// 정상 처리
    Synced(IngestResult),
    /// 배치 전체 검증 실패 (실패로 집계하지 않음)
    Degraded { rejected: usize },
    /// 업스트림 거부 (이번 사이클만 건너뜀)
    Skipped { reason: String },
    /// 실패
    Failed { kind: FailureKind, message: String },
    /// 취소되어 시작하지 않음
    Cancelled,
}

impl UnitOutcome {
    /// 파이프라인 결과 분류
    pub fn from_result(result: Result<IngestResult, IngestError>) -> Self {
        match result {
            Ok(result) => UnitOutcome::Synced(result),
            Err(IngestError::ValidationExhausted { rejected }) => UnitOutcome::Degraded { rejected },
            Err(IngestError::FetchFailed(FetchError::Rejected(reason))) => {
                UnitOutcome::Skipped { reason }
            }
            Err(e @ IngestError::FetchFailed(FetchError::Unauthorized(_))) => UnitOutcome::Failed {
                kind: FailureKind::Unauthorized,
                message: e.to_string(),
            },
            Err(e @ IngestError::FetchFailed(_)) => UnitOutcome::Failed {
                kind: FailureKind::Transient,
                message: e.to_string(),
            },
            Err(e @ IngestError::StorageUnavailable(_)) => UnitOutcome::Failed {
                kind: FailureKind::StorageUnavailable,
                message: e.to_string(),
            },
            Err(e @ IngestError::StorageWriteFailed(_)) => UnitOutcome::Failed {
                kind: FailureKind::StorageWrite,
                message: e.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, UnitOutcome::Failed { .. })
    }

    pub fn inserted(&self) -> u64 {
        match self {
            UnitOutcome::Synced(result) => result.inserted_count,
            _ => 0,
        }
    }
}

/// 작업 단위 보고
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit: WorkUnit,
    pub outcome: UnitOutcome,
    pub elapsed: Duration,
}

impl UnitReport {
    pub fn cancelled(unit: WorkUnit) -> Self {
        Self {
            unit,
            outcome: UnitOutcome::Cancelled,
            elapsed: Duration::ZERO,
        }
    }
}

/// 사이클 보고
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 사이클 ID
    pub cycle_id: Uuid,
    /// 작업 단위별 결과 (완료 순)
    pub units: Vec<UnitReport>,
    /// 신규 저장 캔들 수
    pub total_inserted: u64,
    /// 정상 처리
    pub successful_units: usize,
    /// 실패
    pub failed_units: usize,
    /// 검증 실패로 저장 없음
    pub degraded_units: usize,
    /// 업스트림 거부
    pub skipped_units: usize,
    /// 취소
    pub cancelled_units: usize,
    /// 소요 시간
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn new(units: Vec<UnitReport>, elapsed: Duration) -> Self {
        let mut report = Self {
            cycle_id: Uuid::new_v4(),
            units: Vec::new(),
            total_inserted: 0,
            successful_units: 0,
            failed_units: 0,
            degraded_units: 0,
            skipped_units: 0,
            cancelled_units: 0,
            elapsed,
        };
        units.into_iter().for_each(|u| report.push(u));
        report
    }

    fn push(&mut self, unit: UnitReport) {
        self.total_inserted += unit.outcome.inserted();
        match &unit.outcome {
            UnitOutcome::Synced(_) => self.successful_units += 1,
            UnitOutcome::Degraded { .. } => self.degraded_units += 1,
            UnitOutcome::Skipped { .. } => self.skipped_units += 1,
            UnitOutcome::Failed { .. } => self.failed_units += 1,
            UnitOutcome::Cancelled => self.cancelled_units += 1,
        }
        self.units.push(unit);
    }

    /// 같은 사이클의 다른 그룹 결과 합치기
    pub fn absorb(&mut self, other: CycleReport) {
        other.units.into_iter().for_each(|u| self.push(u));
        self.elapsed += other.elapsed;
    }

    /// 실패한 작업 단위가 없으면 성공
    pub fn success(&self) -> bool {
        self.failed_units == 0
    }

    pub fn total(&self) -> usize {
        self.units.len()
    }

    /// 성공률 계산 (%)
    ///
    /// skipped/cancelled는 분모에서 제외.
    pub fn success_rate(&self) -> f64 {
        let attempted = self
            .total()
            .saturating_sub(self.skipped_units + self.cancelled_units);
        if attempted == 0 {
            0.0
        } else {
            ((self.successful_units + self.degraded_units) as f64 / attempted as f64) * 100.0
        }
    }

    /// 보고에 포함된 타임프레임 (정렬, 중복 제거)
    pub fn timeframes(&self) -> Vec<String> {
        let mut timeframes: Vec<_> = self.units.iter().map(|u| u.unit.timeframe).collect();
        timeframes.sort();
        timeframes.dedup();
        timeframes.iter().map(|tf| tf.to_string()).collect()
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        for report in &self.units {
            if let UnitOutcome::Failed { kind, message } = &report.outcome {
                tracing::warn!(
                    symbol = %report.unit.symbol,
                    timeframe = %report.unit.timeframe,
                    kind = kind.as_str(),
                    error = %message,
                    "작업 단위 실패"
                );
            }
        }

        tracing::info!(
            operation = operation,
            cycle_id = %self.cycle_id,
            total = self.total(),
            success = self.successful_units,
            failed = self.failed_units,
            degraded = self.degraded_units,
            skipped = self.skipped_units,
            cancelled = self.cancelled_units,
            new_candles = self.total_inserted,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "사이클 완료"
        );
    }
}

/// 통화쌍·타임프레임별 누적 통계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairStats {
    pub total_candles: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub errors: u64,
}

/// 프로세스 수명 통계
#[derive(Debug, Clone)]
pub struct LifetimeStats {
    pub started_at: DateTime<Utc>,
    pub total_cycles: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub total_candles: u64,
    pub total_errors: u64,
    /// "EUR_USD_M15" 형식 키
    pub pair_stats: BTreeMap<String, PairStats>,
    /// (완료 시각, 저장 수). 최근 1시간만 유지
    recent: VecDeque<(DateTime<Utc>, u64)>,
}

impl LifetimeStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total_cycles: 0,
            successful_cycles: 0,
            failed_cycles: 0,
            total_candles: 0,
            total_errors: 0,
            pair_stats: BTreeMap::new(),
            recent: VecDeque::new(),
        }
    }

    pub fn record(&mut self, report: &CycleReport, now: DateTime<Utc>) {
        self.total_cycles += 1;
        if report.success() {
            self.successful_cycles += 1;
        } else {
            self.failed_cycles += 1;
        }
        self.total_candles += report.total_inserted;
        self.total_errors += report.failed_units as u64;

        for unit in &report.units {
            let stats = self.pair_stats.entry(unit.unit.key()).or_default();
            match &unit.outcome {
                UnitOutcome::Synced(result) => {
                    stats.total_candles += result.inserted_count;
                    stats.last_update = Some(now);
                }
                UnitOutcome::Failed { .. } => stats.errors += 1,
                _ => {}
            }
        }

        self.recent.push_back((now, report.total_inserted));
        let cutoff = now - chrono::Duration::hours(1);
        while self.recent.front().is_some_and(|(at, _)| *at < cutoff) {
            self.recent.pop_front();
        }
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    pub fn candles_last_hour(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = now - chrono::Duration::hours(1);
        self.recent
            .iter()
            .filter(|(at, _)| *at >= cutoff)
            .map(|(_, inserted)| inserted)
            .sum()
    }

    /// 한 번 이상 동기화에 성공한 통화쌍 수
    pub fn active_pairs(&self) -> usize {
        self.pair_stats
            .iter()
            .filter(|(_, stats)| stats.last_update.is_some())
            .filter_map(|(key, _)| key.rsplit_once('_').map(|(symbol, _)| symbol))
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fxsync_core::{CurrencyPair, Timeframe};

    fn unit(symbol: &str, id: i32, tf: Timeframe) -> WorkUnit {
        WorkUnit::new(&CurrencyPair::new(symbol, id), tf)
    }

    fn synced(unit: WorkUnit, inserted: u64) -> UnitReport {
        UnitReport {
            unit,
            outcome: UnitOutcome::Synced(IngestResult {
                inserted_count: inserted,
                ..Default::default()
            }),
            elapsed: Duration::from_millis(10),
        }
    }

    fn failed(unit: WorkUnit) -> UnitReport {
        UnitReport {
            unit,
            outcome: UnitOutcome::Failed {
                kind: FailureKind::Transient,
                message: "timeout".to_string(),
            },
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_outcome_classification() {
        let rejected = UnitOutcome::from_result(Err(IngestError::FetchFailed(
            FetchError::Rejected("HTTP 400".to_string()),
        )));
        assert!(matches!(rejected, UnitOutcome::Skipped { .. }));
        assert!(!rejected.is_failure());

        let degraded =
            UnitOutcome::from_result(Err(IngestError::ValidationExhausted { rejected: 3 }));
        assert_eq!(degraded, UnitOutcome::Degraded { rejected: 3 });

        let unauthorized = UnitOutcome::from_result(Err(IngestError::FetchFailed(
            FetchError::Unauthorized("HTTP 401".to_string()),
        )));
        assert!(matches!(
            unauthorized,
            UnitOutcome::Failed {
                kind: FailureKind::Unauthorized,
                ..
            }
        ));
        assert!(unauthorized.is_failure());

        let network = UnitOutcome::from_result(Err(IngestError::FetchFailed(
            FetchError::Network("reset".to_string()),
        )));
        assert!(matches!(
            network,
            UnitOutcome::Failed {
                kind: FailureKind::Transient,
                ..
            }
        ));

        let storage =
            UnitOutcome::from_result(Err(IngestError::StorageUnavailable("down".to_string())));
        assert!(matches!(
            storage,
            UnitOutcome::Failed {
                kind: FailureKind::StorageUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn test_cycle_report_counts() {
        let report = CycleReport::new(
            vec![
                synced(unit("EUR_USD", 7, Timeframe::M15), 3),
                synced(unit("GBP_USD", 6, Timeframe::M15), 2),
                failed(unit("AUD_USD", 8, Timeframe::H1)),
                UnitReport::cancelled(unit("USD_CAD", 9, Timeframe::H1)),
            ],
            Duration::from_secs(2),
        );

        assert_eq!(report.total_inserted, 5);
        assert_eq!(report.failed_units, 1);
        assert_eq!(report.cancelled_units, 1);
        assert!(!report.success());
        assert!((report.success_rate() - 66.66).abs() < 0.1);
        assert_eq!(report.timeframes(), vec!["M15", "H1"]);
    }

    #[test]
    fn test_absorb_keeps_cycle_id() {
        let mut report = CycleReport::new(
            vec![synced(unit("EUR_USD", 7, Timeframe::M5), 1)],
            Duration::from_secs(1),
        );
        let id = report.cycle_id;
        report.absorb(CycleReport::new(
            vec![synced(unit("EUR_USD", 7, Timeframe::H1), 4)],
            Duration::from_secs(1),
        ));

        assert_eq!(report.cycle_id, id);
        assert_eq!(report.total(), 2);
        assert_eq!(report.total_inserted, 5);
        assert_eq!(report.elapsed, Duration::from_secs(2));
    }

    #[test]
    fn test_lifetime_stats_rolling_hour() {
        let start = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let mut stats = LifetimeStats::new(start);

        let first = CycleReport::new(
            vec![
                synced(unit("EUR_USD", 7, Timeframe::M15), 4),
                synced(unit("EUR_USD", 7, Timeframe::H1), 1),
                failed(unit("GBP_USD", 6, Timeframe::M15)),
            ],
            Duration::from_secs(1),
        );
        stats.record(&first, start + chrono::Duration::minutes(10));

        let second = CycleReport::new(
            vec![synced(unit("GBP_USD", 6, Timeframe::M15), 2)],
            Duration::from_secs(1),
        );
        stats.record(&second, start + chrono::Duration::minutes(80));

        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.successful_cycles, 1);
        assert_eq!(stats.failed_cycles, 1);
        assert_eq!(stats.total_candles, 7);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.active_pairs(), 2);
        assert_eq!(stats.pair_stats["GBP_USD_M15"].errors, 1);
        assert_eq!(stats.pair_stats["EUR_USD_M15"].total_candles, 4);

        let now = start + chrono::Duration::minutes(80);
        assert_eq!(stats.candles_last_hour(now), 2);
        assert_eq!(stats.uptime(now), Duration::from_secs(80 * 60));
    }
}
