//! 사이클 스케줄러 상태 머신.
//!
//! `Idle → RunningCycle → Waiting → RunningCycle → ... → Stopped` 순서로
//! 전이합니다. 대기와 현재 시각은 [`Clock`]으로 주입되므로 테스트에서는
//! 실제로 잠들지 않고 전이를 검증할 수 있습니다.
//!
//! - 고정 주기: 성공한 사이클 사이에 `update_interval` 대기
//! - 경계 기반: 다음 타임프레임 경계까지 대기 후 그 경계에 해당하는
//!   타임프레임 그룹만 순서대로 동기화
//! - 실패 사이클: [`RetryGovernor`]의 백오프만큼 대기, 한도 소진 시 종료

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fxsync_core::WorkUnit;
use fxsync_notification::{Notification, NotificationEvent, NotificationManager};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::CollectorConfig;
use crate::modules::clock::Clock;
use crate::modules::concurrency::{ConcurrencyScheduler, UnitJob};
use crate::modules::retry::{RetryDecision, RetryGovernor};
use crate::modules::schedule::SmartSchedule;
use crate::stats::{CycleReport, LifetimeStats};

/// 대기 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitReason {
    /// 고정 주기
    Interval,
    /// 다음 타임프레임 경계
    NextTick { tick: DateTime<Utc> },
    /// 실패 후 백오프
    Backoff { attempt: u32 },
}

/// 종료 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 종료 신호
    Cancelled,
    /// 연속 실패 한도 소진
    RetryBudgetExhausted { attempts: u32 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "종료 신호 수신"),
            StopReason::RetryBudgetExhausted { attempts } => {
                write!(f, "연속 {}회 사이클 실패로 재시도 한도 소진", attempts)
            }
        }
    }
}

/// 스케줄러 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    RunningCycle,
    Waiting { delay: Duration, reason: WaitReason },
    Stopped(StopReason),
}

/// 사이클 간격 정책
#[derive(Debug, Clone)]
pub enum SchedulePolicy {
    Fixed { interval: Duration },
    Smart(SmartSchedule),
}

/// 스케줄러 실행 설정
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub policy: SchedulePolicy,
    /// 경계 기반 모드에서 타임프레임 그룹 간 대기
    pub group_delay: Duration,
    pub heartbeat_interval: Duration,
    pub notify_cycles: bool,
}

impl CycleSettings {
    pub fn from_config(config: &CollectorConfig) -> Self {
        let policy = if config.sync.smart_schedule {
            SchedulePolicy::Smart(SmartSchedule::new(
                config.universe.schedules.clone(),
                config.sync.schedule_second,
            ))
        } else {
            SchedulePolicy::Fixed {
                interval: config.sync.update_interval(),
            }
        };

        Self {
            policy,
            group_delay: config.sync.group_delay(),
            heartbeat_interval: config.monitoring.heartbeat_interval(),
            notify_cycles: config.monitoring.notify_cycles,
        }
    }
}

/// 사이클 스케줄러.
pub struct CycleScheduler {
    units: Vec<WorkUnit>,
    concurrency: ConcurrencyScheduler,
    job: Arc<dyn UnitJob>,
    governor: RetryGovernor,
    clock: Arc<dyn Clock>,
    settings: CycleSettings,
    notifier: Option<Arc<NotificationManager>>,
    state: watch::Sender<SchedulerState>,
    stats: LifetimeStats,
    last_heartbeat: DateTime<Utc>,
}

impl CycleScheduler {
    pub fn new(
        units: Vec<WorkUnit>,
        concurrency: ConcurrencyScheduler,
        job: Arc<dyn UnitJob>,
        governor: RetryGovernor,
        clock: Arc<dyn Clock>,
        settings: CycleSettings,
    ) -> Self {
        let now = clock.now();
        let (state, _) = watch::channel(SchedulerState::Idle);

        Self {
            units,
            concurrency,
            job,
            governor,
            clock,
            settings,
            notifier: None,
            state,
            stats: LifetimeStats::new(now),
            last_heartbeat: now,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<NotificationManager>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 현재 상태
    pub fn state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }

    /// 상태 변경 구독
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> &LifetimeStats {
        &self.stats
    }

    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    fn set_state(&self, state: SchedulerState) {
        match &state {
            SchedulerState::Waiting { delay, reason } => tracing::debug!(
                delay_ms = delay.as_millis() as u64,
                reason = ?reason,
                "다음 사이클 대기"
            ),
            SchedulerState::Stopped(reason) => tracing::info!(reason = %reason, "스케줄러 종료"),
            other => tracing::debug!(state = ?other, "스케줄러 상태 전이"),
        }
        self.state.send_replace(state);
    }

    /// 모든 작업 단위로 한 사이클 실행 (재시도 없음).
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> CycleReport {
        self.set_state(SchedulerState::RunningCycle);
        let report = self
            .concurrency
            .run_cycle(self.units.clone(), self.job.clone(), cancel)
            .await;
        let now = self.clock.now();
        self.finish_cycle(&report, now).await;
        self.set_state(SchedulerState::Idle);
        report
    }

    /// 종료 신호나 재시도 한도 소진까지 사이클 반복.
    pub async fn run(&mut self, cancel: CancellationToken) -> StopReason {
        self.set_state(SchedulerState::Idle);
        tracing::info!(units = self.units.len(), policy = ?self.settings.policy, "사이클 스케줄러 시작");

        // 경계 기반 모드에서 대기 목표였던 경계. 첫 사이클과 실패 후 사이클은 전체 실행
        let mut pending_tick: Option<DateTime<Utc>> = None;

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            self.set_state(SchedulerState::RunningCycle);
            let report = self.execute(pending_tick.take(), &cancel).await;
            let now = self.clock.now();

            let (delay, wait_reason) = match report {
                Some(report) => {
                    self.finish_cycle(&report, now).await;

                    if report.success() {
                        self.governor.record_success();
                        self.next_wait(now, &mut pending_tick)
                    } else {
                        match self.governor.record_failure() {
                            RetryDecision::Retry { attempt, delay } => {
                                (delay, WaitReason::Backoff { attempt })
                            }
                            RetryDecision::Exhausted { attempts } => {
                                self.notify(NotificationEvent::SystemError {
                                    component: "cycle-scheduler".to_string(),
                                    message: format!(
                                        "연속 {}회 사이클 실패, 동기화를 중단합니다 (마지막 사이클 실패 {}건)",
                                        attempts, report.failed_units
                                    ),
                                })
                                .await;
                                break StopReason::RetryBudgetExhausted { attempts };
                            }
                        }
                    }
                }
                None => {
                    tracing::debug!("이번 경계에 실행할 타임프레임 없음");
                    self.next_wait(now, &mut pending_tick)
                }
            };

            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            self.maybe_heartbeat(now).await;

            self.set_state(SchedulerState::Waiting {
                delay,
                reason: wait_reason,
            });
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StopReason::Cancelled,
                _ = self.clock.sleep(delay) => {}
            }
        };

        self.set_state(SchedulerState::Stopped(reason.clone()));
        reason
    }

    /// 사이클 실행. 경계 기반 모드에서 활성 타임프레임이 없으면 `None`.
    async fn execute(
        &self,
        tick: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Option<CycleReport> {
        let (schedule, tick) = match (&self.settings.policy, tick) {
            (SchedulePolicy::Smart(schedule), Some(tick)) => (schedule, tick),
            _ => {
                return Some(
                    self.concurrency
                        .run_cycle(self.units.clone(), self.job.clone(), cancel)
                        .await,
                )
            }
        };

        let groups: Vec<Vec<WorkUnit>> = schedule
            .active_timeframes_at(tick)
            .into_iter()
            .map(|tf| {
                self.units
                    .iter()
                    .filter(|u| u.timeframe == tf)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|group| !group.is_empty())
            .collect();

        let mut combined: Option<CycleReport> = None;
        for (idx, group) in groups.into_iter().enumerate() {
            if idx > 0 && !self.settings.group_delay.is_zero() && !cancel.is_cancelled() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = self.clock.sleep(self.settings.group_delay) => {}
                }
            }

            let report = self
                .concurrency
                .run_cycle(group, self.job.clone(), cancel)
                .await;
            match combined.as_mut() {
                Some(total) => total.absorb(report),
                None => combined = Some(report),
            }
        }

        combined
    }

    fn next_wait(
        &self,
        now: DateTime<Utc>,
        pending_tick: &mut Option<DateTime<Utc>>,
    ) -> (Duration, WaitReason) {
        match &self.settings.policy {
            SchedulePolicy::Fixed { interval } => (*interval, WaitReason::Interval),
            SchedulePolicy::Smart(schedule) => {
                let tick = schedule.next_tick_after(now);
                *pending_tick = Some(tick);
                (
                    SmartSchedule::wait_until(now, tick),
                    WaitReason::NextTick { tick },
                )
            }
        }
    }

    async fn finish_cycle(&mut self, report: &CycleReport, now: DateTime<Utc>) {
        report.log_summary("실시간 동기화");
        self.stats.record(report, now);

        if self.settings.notify_cycles {
            self.notify(NotificationEvent::CycleCompleted {
                duration_ms: report.elapsed.as_millis() as u64,
                new_candles: report.total_inserted,
                successful_units: report.successful_units,
                failed_units: report.failed_units,
                timeframes: report.timeframes(),
            })
            .await;
        }
    }

    async fn maybe_heartbeat(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_heartbeat).to_std().unwrap_or_default();
        if elapsed < self.settings.heartbeat_interval {
            return;
        }
        self.last_heartbeat = now;

        let uptime = self.stats.uptime(now);
        tracing::info!(
            uptime_secs = uptime.as_secs(),
            cycles = self.stats.total_cycles,
            successful_cycles = self.stats.successful_cycles,
            candles_last_hour = self.stats.candles_last_hour(now),
            active_pairs = self.stats.active_pairs(),
            "상태 보고"
        );

        self.notify(NotificationEvent::Heartbeat {
            uptime_secs: uptime.as_secs(),
            cycles: self.stats.total_cycles,
            successful_cycles: self.stats.successful_cycles,
            candles_last_hour: self.stats.candles_last_hour(now),
            active_pairs: self.stats.active_pairs(),
        })
        .await;
    }

    async fn notify(&self, event: NotificationEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(&Notification::new(event)).await;
        }
    }
}
