//! 캔들(OHLCV) 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 캔들의 자연 키 `(symbol_id, timeframe_id, timestamp)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol_id: i32,
    pub timeframe_id: i32,
    pub timestamp: DateTime<Utc>,
}

/// 저장 단위 캔들.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol_id: i32,
    pub timeframe_id: i32,
    /// 캔들 시작 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl Candle {
    pub fn key(&self) -> CandleKey {
        CandleKey {
            symbol_id: self.symbol_id,
            timeframe_id: self.timeframe_id,
            timestamp: self.timestamp,
        }
    }
}

/// 업스트림이 반환한 원본 캔들.
///
/// `complete == false`인 캔들은 아직 진행 중이므로 저장 대상이 아닙니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandle {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub complete: bool,
}

impl RawCandle {
    /// 작업 단위 식별자를 붙여 저장 단위 캔들로 변환.
    pub fn into_candle(self, symbol_id: i32, timeframe_id: i32) -> Candle {
        Candle {
            symbol_id,
            timeframe_id,
            timestamp: self.time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
