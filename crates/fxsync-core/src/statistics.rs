//! 캔들 묶음 요약 통계.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::Candle;

/// 캔들 요약 통계.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CandleStatistics {
    pub count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub avg_volume: f64,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl CandleStatistics {
    pub fn from_candles(candles: &[Candle]) -> Self {
        if candles.is_empty() {
            return Self::default();
        }

        let total_volume: i64 = candles.iter().map(|c| c.volume).sum();

        Self {
            count: candles.len(),
            first: candles.iter().map(|c| c.timestamp).min(),
            last: candles.iter().map(|c| c.timestamp).max(),
            avg_volume: total_volume as f64 / candles.len() as f64,
            min_price: candles.iter().map(|c| c.low.min(c.open).min(c.close)).min(),
            max_price: candles.iter().map(|c| c.high.max(c.open).max(c.close)).max(),
        }
    }

    /// 최고가 - 최저가.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.max_price? - self.min_price?)
    }

    /// 첫 캔들부터 마지막 캔들까지 시간 (시간 단위).
    pub fn duration_hours(&self) -> f64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => (last - first).num_seconds() as f64 / 3600.0,
            _ => 0.0,
        }
    }
}
