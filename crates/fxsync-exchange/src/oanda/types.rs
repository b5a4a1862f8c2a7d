//! OANDA v20 API 응답 타입.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use fxsync_core::{FetchError, RawCandle};
use rust_decimal::Decimal;
use serde::Deserialize;

/// `GET /v3/instruments/{instrument}/candles` 응답.
#[derive(Debug, Deserialize)]
pub struct OandaCandlesResponse {
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub granularity: Option<String>,
    #[serde(default)]
    pub candles: Vec<OandaCandle>,
}

/// OANDA 캔들.
#[derive(Debug, Deserialize)]
pub struct OandaCandle {
    /// RFC3339 (나노초 정밀도, 예: "2025-07-01T00:15:00.000000000Z")
    pub time: String,
    #[serde(default)]
    pub volume: i64,
    /// 누락 시 완성된 캔들로 간주
    #[serde(default = "default_complete")]
    pub complete: bool,
    pub mid: Option<OandaPrice>,
}

/// 중간가 OHLC (문자열 인코딩 숫자).
#[derive(Debug, Deserialize)]
pub struct OandaPrice {
    pub o: String,
    pub h: String,
    pub l: String,
    pub c: String,
}

/// OANDA 에러 응답 본문.
#[derive(Debug, Deserialize)]
pub struct OandaErrorBody {
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

fn default_complete() -> bool {
    true
}

fn parse_price(field: &str, value: &str) -> Result<Decimal, FetchError> {
    Decimal::from_str(value)
        .map_err(|e| FetchError::Parse(format!("가격 필드 {} 파싱 실패 ({}): {}", field, value, e)))
}

/// OANDA 시각 문자열 파싱.
pub fn parse_oanda_time(value: &str) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FetchError::Parse(format!("시각 파싱 실패 ({}): {}", value, e)))
}

impl TryFrom<OandaCandle> for RawCandle {
    type Error = FetchError;

    fn try_from(candle: OandaCandle) -> Result<Self, Self::Error> {
        let mid = candle
            .mid
            .ok_or_else(|| FetchError::Parse(format!("mid 가격 누락: {}", candle.time)))?;

        Ok(RawCandle {
            time: parse_oanda_time(&candle.time)?,
            open: parse_price("o", &mid.o)?,
            high: parse_price("h", &mid.h)?,
            low: parse_price("l", &mid.l)?,
            close: parse_price("c", &mid.c)?,
            volume: candle.volume,
            complete: candle.complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_candles_response() {
        let body = r#"{
            "instrument": "EUR_USD",
            "granularity": "M15",
            "candles": [
                {"complete": true, "volume": 312, "time": "2025-07-01T00:15:00.000000000Z",
                 "mid": {"o": "1.17852", "h": "1.17901", "l": "1.17833", "c": "1.17890"}},
                {"complete": false, "volume": 40, "time": "2025-07-01T00:30:00.000000000Z",
                 "mid": {"o": "1.17890", "h": "1.17895", "l": "1.17880", "c": "1.17884"}}
            ]
        }"#;

        let response: OandaCandlesResponse = serde_json::from_str(body).unwrap();
        let candles: Vec<RawCandle> = response
            .candles
            .into_iter()
            .map(RawCandle::try_from)
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[0].time,
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 15, 0).unwrap()
        );
        assert_eq!(candles[0].high, dec!(1.17901));
        assert_eq!(candles[0].volume, 312);
        assert!(!candles[1].complete);
    }

    #[test]
    fn test_missing_mid_is_parse_error() {
        let candle = OandaCandle {
            time: "2025-07-01T00:15:00Z".to_string(),
            volume: 1,
            complete: true,
            mid: None,
        };
        assert!(matches!(RawCandle::try_from(candle), Err(FetchError::Parse(_))));
    }
}
