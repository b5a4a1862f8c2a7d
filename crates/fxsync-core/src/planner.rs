//! 요청 구간 계획.
//!
//! 워터마크와 현재 시각으로 다음 요청 구간을 계산합니다.
//!
//! - 워터마크가 없으면 `now - default_lookback`부터 시작
//! - 워터마크가 있으면 워터마크 시각부터 시작 (포함). 이미 저장된 캔들은
//!   파이프라인의 `timestamp > watermark` 필터가 제외합니다.
//! - 끝은 `min(start + width, now)`
//!
//! 구간은 입력만으로 결정되는 순수 함수이므로 백필 도중 중단되어도
//! 같은 입력으로 다시 시작할 수 있습니다.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{FetchWindow, Timeframe};

/// 요청 구간 계획기.
#[derive(Debug, Clone, Copy)]
pub struct FetchWindowPlanner {
    default_lookback: Duration,
    max_candles: Option<u32>,
}

impl FetchWindowPlanner {
    /// 워터마크가 없을 때 `default_lookback`만큼 과거부터 요청하는 계획기.
    pub fn new(default_lookback: Duration) -> Self {
        Self {
            default_lookback,
            max_candles: None,
        }
    }

    /// 요청당 캔들 수 상한 설정. 구간 폭이 `period × n`으로 추가 제한됩니다.
    pub fn with_max_candles(mut self, max_candles: u32) -> Self {
        self.max_candles = (max_candles > 0).then_some(max_candles);
        self
    }

    pub fn default_lookback(&self) -> Duration {
        self.default_lookback
    }

    /// 타임프레임별 최대 구간 폭. 항상 `chunk_size` 이하.
    pub fn width(&self, timeframe: Timeframe) -> Duration {
        let chunk = timeframe.chunk_size();
        match self.max_candles {
            Some(n) => chunk.min(timeframe.period() * n as i32),
            None => chunk,
        }
    }

    /// 다음 요청 구간 계산. 요청할 구간이 없으면 `None`.
    pub fn plan(
        &self,
        watermark: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Option<FetchWindow> {
        let start = watermark.unwrap_or(now - self.default_lookback);
        let end = (start + self.width(timeframe)).min(now);
        FetchWindow::new(start, end)
    }

    /// `[start, end]` 구간을 청크 단위로 나누는 지연 이터레이터.
    pub fn backfill_windows(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> BackfillWindows {
        BackfillWindows {
            planner: *self,
            next_start: Some(start),
            end,
            timeframe,
        }
    }
}

/// 백필 구간 이터레이터.
///
/// 각 구간은 직전 구간의 끝에서 시작하며 `start >= end`가 되면 종료됩니다.
#[derive(Debug, Clone)]
pub struct BackfillWindows {
    planner: FetchWindowPlanner,
    next_start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
    timeframe: Timeframe,
}

impl Iterator for BackfillWindows {
    type Item = FetchWindow;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        match self.planner.plan(Some(start), self.end, self.timeframe) {
            Some(window) => {
                self.next_start = Some(window.to());
                Some(window)
            }
            None => {
                self.next_start = None;
                None
            }
        }
    }
}
