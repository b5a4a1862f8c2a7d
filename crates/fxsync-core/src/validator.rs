//! 캔들 구조 검증.
//!
//! 개별 캔들의 가격 순서와 거래량을 검사합니다. 검증 실패 캔들은
//! 배치에서 제거될 뿐 배치 전체를 실패시키지 않습니다.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::domain::Candle;

/// 캔들 검증 실패 사유.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("0 이하 가격: o={open} h={high} l={low} c={close}")]
    NonPositivePrice {
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    },

    #[error("고가가 저가보다 낮음: h={high} l={low}")]
    HighBelowLow { high: Decimal, low: Decimal },

    #[error("시가가 고저 범위 밖: o={open} h={high} l={low}")]
    OpenOutOfRange {
        open: Decimal,
        high: Decimal,
        low: Decimal,
    },

    #[error("종가가 고저 범위 밖: c={close} h={high} l={low}")]
    CloseOutOfRange {
        close: Decimal,
        high: Decimal,
        low: Decimal,
    },

    #[error("음수 거래량: {0}")]
    NegativeVolume(i64),
}

/// 배치 검증 결과.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<Candle>,
    pub rejected: Vec<(Candle, ValidationIssue)>,
}

impl ValidationOutcome {
    /// 입력이 있었으나 모두 거부되었는지.
    pub fn is_exhausted(&self) -> bool {
        self.valid.is_empty() && !self.rejected.is_empty()
    }
}

/// 캔들 검증기.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleValidator;

impl CandleValidator {
    pub fn new() -> Self {
        Self
    }

    /// 단일 캔들 검증.
    pub fn validate(&self, candle: &Candle) -> Result<(), ValidationIssue> {
        let Candle {
            open,
            high,
            low,
            close,
            volume,
            ..
        } = *candle;

        if [open, high, low, close].iter().any(|p| *p <= Decimal::ZERO) {
            return Err(ValidationIssue::NonPositivePrice {
                open,
                high,
                low,
                close,
            });
        }
        if high < low {
            return Err(ValidationIssue::HighBelowLow { high, low });
        }
        if open < low || open > high {
            return Err(ValidationIssue::OpenOutOfRange { open, high, low });
        }
        if close < low || close > high {
            return Err(ValidationIssue::CloseOutOfRange { close, high, low });
        }
        if volume < 0 {
            return Err(ValidationIssue::NegativeVolume(volume));
        }
        Ok(())
    }

    /// 배치를 유효/거부로 분리. 입력 순서는 유지됩니다.
    pub fn partition(&self, candles: Vec<Candle>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();

        for candle in candles {
            match self.validate(&candle) {
                Ok(()) => outcome.valid.push(candle),
                Err(issue) => {
                    warn!(
                        symbol_id = candle.symbol_id,
                        timeframe_id = candle.timeframe_id,
                        timestamp = %candle.timestamp,
                        reason = %issue,
                        "비정상 캔들 제외"
                    );
                    outcome.rejected.push((candle, issue));
                }
            }
        }

        outcome
    }
}
