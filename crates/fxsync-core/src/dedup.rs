//! 배치 내 중복 캔들 제거.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::{Candle, CandleKey};

/// 중복 제거 결과.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// 시간순 정렬된 고유 캔들
    pub unique: Vec<Candle>,
    /// 제거된 중복 수
    pub removed: usize,
}

/// `(symbol_id, timeframe_id, timestamp)` 기준 중복 제거기.
///
/// 같은 키가 여러 번 나오면 처음 나온 캔들을 유지합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeduplicationFilter;

impl DeduplicationFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, candles: Vec<Candle>) -> DedupOutcome {
        let total = candles.len();
        let mut seen: HashSet<CandleKey> = HashSet::with_capacity(total);

        let mut unique: Vec<Candle> = candles
            .into_iter()
            .filter(|c| seen.insert(c.key()))
            .collect();
        // 업스트림이 보장하는 순서를 신뢰하지 않고 다시 정렬 (stable)
        unique.sort_by_key(|c| c.timestamp);

        let removed = total - unique.len();
        if removed > 0 {
            debug!(
                original = total,
                unique = unique.len(),
                removed = removed,
                "중복 캔들 제거"
            );
        }

        DedupOutcome { unique, removed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle_at(minute: u32, close: rust_decimal::Decimal) -> Candle {
        Candle {
            symbol_id: 7,
            timeframe_id: 4,
            timestamp: Utc.with_ymd_and_hms(2025, 7, 1, 0, minute, 0).unwrap(),
            open: dec!(1.1),
            high: dec!(1.2),
            low: dec!(1.0),
            close,
            volume: 1,
        }
    }

    #[test]
    fn test_first_occurrence_wins() {
        let batch = vec![
            candle_at(0, dec!(1.10)),
            candle_at(15, dec!(1.11)),
            candle_at(15, dec!(1.19)),
            candle_at(30, dec!(1.12)),
        ];

        let outcome = DeduplicationFilter::new().apply(batch);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.unique.len(), 3);
        assert_eq!(outcome.unique[1].close, dec!(1.11));
    }

    #[test]
    fn test_output_sorted() {
        let batch = vec![candle_at(30, dec!(1.1)), candle_at(0, dec!(1.1))];
        let outcome = DeduplicationFilter::new().apply(batch);
        assert!(outcome.unique[0].timestamp < outcome.unique[1].timestamp);
        assert_eq!(outcome.removed, 0);
    }

    #[test]
    fn test_different_timeframes_are_distinct() {
        let a = candle_at(0, dec!(1.1));
        let mut b = a.clone();
        b.timeframe_id = 5;
        let outcome = DeduplicationFilter::new().apply(vec![a, b]);
        assert_eq!(outcome.unique.len(), 2);
    }
}
