//! 요청 구간.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 업스트림 요청 구간 `[from, to]`. 항상 `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl FetchWindow {
    /// `from < to`가 아니면 `None`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<Self> {
        (from < to).then_some(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn width(&self) -> Duration {
        self.to - self.from
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant <= self.to
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            self.from.format("%Y-%m-%dT%H:%M:%SZ"),
            self.to.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_rejects_empty_range() {
        let t = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert!(FetchWindow::new(t, t).is_none());
        assert!(FetchWindow::new(t, t - Duration::minutes(1)).is_none());

        let w = FetchWindow::new(t, t + Duration::hours(1)).unwrap();
        assert_eq!(w.width(), Duration::hours(1));
        assert!(w.contains(t));
        assert!(w.contains(t + Duration::hours(1)));
    }
}
