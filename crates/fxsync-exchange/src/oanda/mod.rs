//! OANDA v20 REST 공급자.
//!
//! `GET /v3/instruments/{instrument}/candles`로 중간가 캔들을 조회합니다.

mod client;
mod types;

pub use client::{OandaConfig, OandaFetcher};
pub use types::{parse_oanda_time, OandaCandle, OandaCandlesResponse, OandaPrice};
