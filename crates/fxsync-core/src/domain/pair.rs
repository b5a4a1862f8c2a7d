//! 통화쌍 정의 및 기본 유니버스.

use serde::{Deserialize, Serialize};

/// 동기화 대상 통화쌍.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// OANDA 형식 심볼 (예: "EUR_USD")
    pub symbol: String,
    /// `market_data.candles.symbol_id` 값
    pub symbol_id: i32,
    /// 실시간 동기화 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 우선순위 (낮을수록 먼저 처리)
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// 설명
    #[serde(default)]
    pub description: String,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    1
}

impl CurrencyPair {
    pub fn new(symbol: impl Into<String>, symbol_id: i32) -> Self {
        Self {
            symbol: symbol.into(),
            symbol_id,
            enabled: true,
            priority: 1,
            description: String::new(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 트레이딩 터미널 심볼 (구분자 제거, 예: "EURUSD").
    pub fn terminal_symbol(&self) -> String {
        to_terminal_symbol(&self.symbol)
    }
}

/// OANDA 심볼을 터미널 심볼로 변환.
pub fn to_terminal_symbol(symbol: &str) -> String {
    symbol.replace('_', "").to_uppercase()
}

/// 기본 통화쌍 목록.
pub fn default_pairs() -> Vec<CurrencyPair> {
    let table: [(&str, i32, bool, u32, &str); 16] = [
        ("EUR_USD", 7, true, 1, "Euro / US Dollar"),
        ("GBP_USD", 6, true, 1, "British Pound / US Dollar"),
        ("AUD_USD", 8, true, 2, "Australian Dollar / US Dollar"),
        ("USD_CAD", 9, true, 1, "US Dollar / Canadian Dollar"),
        ("USD_CHF", 10, true, 1, "US Dollar / Swiss Franc"),
        ("NZD_USD", 11, false, 5, "New Zealand Dollar / US Dollar"),
        ("EUR_GBP", 12, true, 2, "Euro / British Pound"),
        ("EUR_JPY", 13, false, 6, "Euro / Japanese Yen"),
        ("GBP_CHF", 14, false, 6, "British Pound / Swiss Franc"),
        ("CHF_JPY", 15, false, 7, "Swiss Franc / Japanese Yen"),
        ("AUD_NZD", 16, false, 7, "Australian Dollar / New Zealand Dollar"),
        ("EUR_AUD", 17, true, 3, "Euro / Australian Dollar"),
        ("GBP_AUD", 18, true, 3, "British Pound / Australian Dollar"),
        ("USD_TRY", 19, false, 8, "US Dollar / Turkish Lira"),
        ("USD_ZAR", 20, false, 8, "US Dollar / South African Rand"),
        ("USD_SGD", 21, false, 8, "US Dollar / Singapore Dollar"),
    ];

    table
        .into_iter()
        .map(|(symbol, id, enabled, priority, description)| {
            CurrencyPair::new(symbol, id)
                .with_enabled(enabled)
                .with_priority(priority)
                .with_description(description)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_symbol() {
        assert_eq!(to_terminal_symbol("EUR_USD"), "EURUSD");
        assert_eq!(CurrencyPair::new("gbp_jpy", 1).terminal_symbol(), "GBPJPY");
    }

    #[test]
    fn test_default_pairs_unique() {
        let pairs = default_pairs();
        let mut ids: Vec<i32> = pairs.iter().map(|p| p.symbol_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), pairs.len());
        assert!(pairs.iter().any(|p| p.enabled));
    }
}
