//! 타임프레임 경계 기반 스케줄.
//!
//! 각 타임프레임은 자신의 봉이 마감되는 경계(예: M15는 매 15분)에서
//! `schedule_second`초 뒤에 동기화됩니다. 업스트림이 봉을 확정할 시간을
//! 주기 위해 경계 직후가 아닌 몇 초 뒤에 실행합니다.

use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use fxsync_core::Timeframe;
use tracing::debug;

/// 하루 = 1440분. 이 안에 경계가 없으면 다음 분으로 폴백.
const MAX_SCAN_MINUTES: i64 = 1440;

/// 타임프레임별 스케줄.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeframeSchedule {
    pub timeframe: Timeframe,
    /// 실행 주기 (분)
    pub interval_minutes: u32,
    pub enabled: bool,
}

impl TimeframeSchedule {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            interval_minutes: timeframe.minutes() as u32,
            enabled: true,
        }
    }

    /// 주기가 1시간 또는 하루를 나누어떨어지게 하는지.
    ///
    /// 경계는 매시/자정 기준 나머지로 계산하므로 90분처럼 나누어떨어지지
    /// 않는 주기는 다른 주기로 해석됩니다.
    pub fn has_valid_interval(&self) -> bool {
        match self.interval_minutes {
            0 => false,
            m if m < 60 => 60 % m == 0,
            m if m < 1440 => m % 60 == 0 && 24 % (m / 60) == 0,
            m => m == 1440,
        }
    }

    /// 분 단위 시각(초 무시)이 이 스케줄의 경계인지.
    fn is_boundary(&self, tick: DateTime<Utc>) -> bool {
        let interval = self.interval_minutes.max(1);
        let (hour, minute) = (tick.hour(), tick.minute());

        if interval >= 1440 {
            hour == 0 && minute == 0
        } else if interval >= 60 {
            hour % (interval / 60) == 0 && minute == 0
        } else {
            minute % interval == 0
        }
    }
}

/// 기본 스케줄: 각 타임프레임의 주기, M30은 비활성.
pub fn default_schedules() -> Vec<TimeframeSchedule> {
    Timeframe::ALL
        .iter()
        .map(|tf| TimeframeSchedule {
            enabled: *tf != Timeframe::M30,
            ..TimeframeSchedule::new(*tf)
        })
        .collect()
}

/// 경계 기반 스케줄러.
#[derive(Debug, Clone)]
pub struct SmartSchedule {
    schedules: Vec<TimeframeSchedule>,
    schedule_second: u32,
}

impl SmartSchedule {
    pub fn new(schedules: Vec<TimeframeSchedule>, schedule_second: u32) -> Self {
        Self {
            schedules,
            schedule_second: schedule_second.min(59),
        }
    }

    pub fn schedule_second(&self) -> u32 {
        self.schedule_second
    }

    pub fn schedules(&self) -> &[TimeframeSchedule] {
        &self.schedules
    }

    fn enabled(&self) -> impl Iterator<Item = &TimeframeSchedule> {
        self.schedules.iter().filter(|s| s.enabled)
    }

    /// 해당 시각에 실행할 타임프레임 목록 (정렬됨).
    ///
    /// `schedule_second`가 아닌 시각에는 항상 빈 목록입니다.
    pub fn active_timeframes_at(&self, tick: DateTime<Utc>) -> Vec<Timeframe> {
        if tick.second() != self.schedule_second {
            return Vec::new();
        }

        let mut active: Vec<Timeframe> = self
            .enabled()
            .filter(|s| s.is_boundary(tick))
            .map(|s| s.timeframe)
            .collect();
        active.sort();
        active.dedup();
        active
    }

    /// `now` 이후 가장 가까운 실행 시각.
    pub fn next_tick_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let minute_start = now
            .duration_trunc(Duration::minutes(1))
            .unwrap_or(now);
        let mut first = minute_start + Duration::seconds(self.schedule_second as i64);
        if first <= now {
            first += Duration::minutes(1);
        }

        if self.enabled().next().is_none() {
            return first;
        }

        for offset in 0..=MAX_SCAN_MINUTES {
            let candidate = first + Duration::minutes(offset);
            if self.enabled().any(|s| s.is_boundary(candidate)) {
                return candidate;
            }
        }

        debug!("하루 안에 실행할 경계가 없어 다음 분으로 대체");
        first
    }

    /// 다음 실행까지 대기 시간. 최소 1초.
    pub fn wait_until(now: DateTime<Utc>, tick: DateTime<Utc>) -> std::time::Duration {
        let millis = (tick - now).num_milliseconds().max(1000) as u64;
        std::time::Duration::from_millis(millis)
    }

    /// 스케줄 상태 요약
    pub fn status_summary(&self, now: DateTime<Utc>) -> String {
        let mut lines = vec!["=== 스케줄 상태 ===".to_string()];

        for schedule in &self.schedules {
            lines.push(format!(
                "{:<4} 주기 {:>5}분 {}",
                schedule.timeframe.as_str(),
                schedule.interval_minutes,
                if schedule.enabled { "활성" } else { "비활성" }
            ));
        }

        let next = self.next_tick_after(now);
        let names: Vec<&str> = self
            .active_timeframes_at(next)
            .iter()
            .map(|tf| tf.as_str())
            .collect();
        lines.push(format!(
            "다음 실행: {} [{}]",
            next.format("%Y-%m-%d %H:%M:%S UTC"),
            names.join(", ")
        ));

        lines.join("\n")
    }
}
