//! 동기화 작업 단위 (통화쌍 × 타임프레임).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CurrencyPair, Timeframe};

/// 한 사이클에서 동기화할 (심볼, 타임프레임) 조합.
///
/// 영속화되지 않으며 매 사이클 설정으로부터 다시 생성됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkUnit {
    pub symbol: String,
    pub symbol_id: i32,
    pub timeframe: Timeframe,
    pub priority: u32,
    pub enabled: bool,
}

impl WorkUnit {
    pub fn new(pair: &CurrencyPair, timeframe: Timeframe) -> Self {
        Self {
            symbol: pair.symbol.clone(),
            symbol_id: pair.symbol_id,
            timeframe,
            priority: pair.priority,
            enabled: pair.enabled,
        }
    }

    pub fn timeframe_id(&self) -> i32 {
        self.timeframe.id()
    }

    /// 통계/로그용 키 (예: "EUR_USD_M15").
    pub fn key(&self) -> String {
        format!("{}_{}", self.symbol, self.timeframe)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.timeframe)
    }
}

/// 통화쌍과 타임프레임으로 작업 단위 목록 생성.
///
/// `include_disabled`가 false면 비활성 통화쌍은 제외합니다.
/// 결과는 우선순위 → 심볼 → 타임프레임 순으로 정렬됩니다.
pub fn build_work_units(
    pairs: &[CurrencyPair],
    timeframes: &[Timeframe],
    include_disabled: bool,
) -> Vec<WorkUnit> {
    let mut units: Vec<WorkUnit> = pairs
        .iter()
        .filter(|p| include_disabled || p.enabled)
        .flat_map(|p| timeframes.iter().map(move |tf| WorkUnit::new(p, *tf)))
        .collect();

    units.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.timeframe.cmp(&b.timeframe))
    });
    units
}
