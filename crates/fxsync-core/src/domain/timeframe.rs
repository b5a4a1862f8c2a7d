//! 캔들 타임프레임 정의.
//!
//! 각 타임프레임은 DB 식별자, 분 단위 주기, 업스트림별 코드,
//! 한 번에 요청 가능한 최대 구간(청크)을 함께 가집니다.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// 동기화 대상 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// 지원하는 전체 타임프레임 (짧은 주기부터).
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// `market_data.candles.timeframe_id` 값.
    pub fn id(&self) -> i32 {
        match self {
            Timeframe::M5 => 3,
            Timeframe::M15 => 4,
            Timeframe::H1 => 5,
            Timeframe::H4 => 6,
            Timeframe::D1 => 7,
            Timeframe::M30 => 8,
        }
    }

    /// DB 식별자로 타임프레임 조회.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|tf| tf.id() == id)
    }

    /// 분 단위 주기.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// 캔들 한 개의 기간.
    pub fn period(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// OANDA `granularity` 파라미터 값.
    pub fn oanda_granularity(&self) -> &'static str {
        match self {
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D",
        }
    }

    /// 트레이딩 터미널 타임프레임 코드.
    pub fn terminal_code(&self) -> u32 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 16385,
            Timeframe::H4 => 16388,
            Timeframe::D1 => 16408,
        }
    }

    /// 한 번의 요청으로 가져올 최대 일수.
    ///
    /// 주기가 길수록 크거나 같아야 합니다 (업스트림 응답 크기 제한).
    pub fn chunk_days(&self) -> i64 {
        match self {
            Timeframe::M5 => 7,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 120,
            Timeframe::D1 => 365,
        }
    }

    /// 요청 청크 크기.
    pub fn chunk_size(&self) -> Duration {
        Duration::days(self.chunk_days())
    }

    /// 주어진 시각이 속한 캔들의 시작 시각 (UTC 자정 기준 내림).
    pub fn floor(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        // 분 단위 주기는 모두 하루를 나누어 떨어지므로 epoch 기준 내림과 동일
        instant
            .duration_trunc(self.period())
            .unwrap_or(instant)
    }

    /// 주어진 시각이 속한 캔들의 (시작, 끝).
    pub fn boundaries(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.floor(instant);
        (start, start + self.period())
    }

    /// 다음 캔들 경계까지 남은 초.
    pub fn seconds_until_next(&self, instant: DateTime<Utc>) -> i64 {
        let (_, end) = self.boundaries(instant);
        (end - instant).num_seconds()
    }

    /// 표준 이름 (예: "M15").
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "M5" | "5M" => Ok(Timeframe::M5),
            "M15" | "15M" => Ok(Timeframe::M15),
            "M30" | "30M" => Ok(Timeframe::M30),
            "H1" | "1H" | "60M" => Ok(Timeframe::H1),
            "H4" | "4H" => Ok(Timeframe::H4),
            "D1" | "D" | "1D" => Ok(Timeframe::D1),
            other => Err(format!("알 수 없는 타임프레임: {}", other)),
        }
    }
}
