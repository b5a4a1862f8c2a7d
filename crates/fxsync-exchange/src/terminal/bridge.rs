//! 트레이딩 터미널 동기 API 경계.
//!
//! 터미널 네이티브 클라이언트는 스레드 안전하지 않으므로 모든 메서드가
//! `&mut self`를 받습니다. 구현체는 [`TerminalHandle`](super::TerminalHandle)
//! 전용 스레드 안에서만 사용됩니다.

use chrono::{DateTime, TimeZone, Utc};
use fxsync_core::{FetchError, RawCandle, Timeframe};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 터미널 봉 데이터 (가격은 부동소수점).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalRate {
    /// 봉 시작 시각 (Unix 초)
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
}

/// 터미널 에러.
#[derive(Debug, Clone, Error)]
pub enum TerminalError {
    /// 터미널 미연결 또는 초기화 실패
    #[error("터미널 연결 실패: {0}")]
    NotConnected(String),

    /// 알 수 없는 심볼
    #[error("알 수 없는 심볼: {0}")]
    UnknownSymbol(String),

    /// 호출 실패
    #[error("터미널 호출 실패: {0}")]
    Call(String),

    /// 브리지 스레드 종료
    #[error("터미널 브리지 스레드가 종료됨")]
    Disconnected,
}

impl From<TerminalError> for FetchError {
    fn from(err: TerminalError) -> Self {
        match err {
            TerminalError::UnknownSymbol(symbol) => {
                FetchError::Rejected(format!("알 수 없는 터미널 심볼: {}", symbol))
            }
            other => FetchError::Network(other.to_string()),
        }
    }
}

/// 터미널 동기 API.
pub trait TerminalBridge: Send + 'static {
    /// 심볼을 시장 감시 목록에 추가. 없는 심볼이면 `UnknownSymbol`.
    fn select_symbol(&mut self, symbol: &str) -> Result<(), TerminalError>;

    /// `[from, to]` 구간의 봉 조회.
    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe_code: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TerminalRate>, TerminalError>;

    /// 최신 봉 기준 `start_pos`부터 `count`개 조회 (0 = 진행 중인 봉).
    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe_code: u32,
        start_pos: u32,
        count: u32,
    ) -> Result<Vec<TerminalRate>, TerminalError>;
}

/// 터미널 봉을 공통 캔들로 변환.
///
/// 터미널은 완성 여부를 알려주지 않으므로 `time + period <= now`이면 완성된
/// 봉으로 표시합니다.
pub fn rates_to_candles(
    rates: Vec<TerminalRate>,
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> Result<Vec<RawCandle>, FetchError> {
    rates
        .into_iter()
        .map(|rate| {
            let time = Utc
                .timestamp_opt(rate.time, 0)
                .single()
                .ok_or_else(|| FetchError::Parse(format!("잘못된 봉 시각: {}", rate.time)))?;

            Ok(RawCandle {
                time,
                open: to_decimal("open", rate.open)?,
                high: to_decimal("high", rate.high)?,
                low: to_decimal("low", rate.low)?,
                close: to_decimal("close", rate.close)?,
                volume: rate.tick_volume,
                complete: time + timeframe.period() <= now,
            })
        })
        .collect()
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal, FetchError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(10).normalize())
        .ok_or_else(|| FetchError::Parse(format!("{} 가격 변환 실패: {}", field, value)))
}
