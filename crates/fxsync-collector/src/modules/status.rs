//! 작업 단위별 저장 현황.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fxsync_core::{CandleStatistics, CandleStore, WorkUnit};

use crate::error::Result;

/// 작업 단위 저장 현황
#[derive(Debug, Clone)]
pub struct UnitStatus {
    pub unit: WorkUnit,
    pub count: i64,
    pub watermark: Option<DateTime<Utc>>,
    /// 워터마크 이후 지난 완결 봉 수. 데이터가 없으면 `None`
    pub lag_periods: Option<i64>,
    /// 최근 24시간 요약 (`--detail`)
    pub recent: Option<CandleStatistics>,
}

/// 워터마크부터 현재까지 완결된 봉 수.
pub fn lag_periods(unit: &WorkUnit, watermark: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let minutes = (now - watermark).num_minutes();
    (minutes / unit.timeframe.minutes() - 1).max(0)
}

/// 모든 작업 단위 현황 수집.
///
/// 한 작업 단위의 조회 실패는 전체를 중단시킵니다.
pub async fn collect_status(
    store: &Arc<dyn CandleStore>,
    units: &[WorkUnit],
    now: DateTime<Utc>,
    detail: bool,
) -> Result<Vec<UnitStatus>> {
    let mut statuses = Vec::with_capacity(units.len());

    for unit in units {
        let tf_id = unit.timeframe_id();
        let count = store.count_candles(unit.symbol_id, tf_id).await?;
        let watermark = store.last_timestamp(unit.symbol_id, tf_id).await?;

        let recent = if detail {
            let candles = store
                .candles_range(unit.symbol_id, tf_id, now - chrono::Duration::hours(24), now)
                .await?;
            Some(CandleStatistics::from_candles(&candles))
        } else {
            None
        };

        statuses.push(UnitStatus {
            unit: unit.clone(),
            count,
            watermark,
            lag_periods: watermark.map(|wm| lag_periods(unit, wm, now)),
            recent,
        });
    }

    Ok(statuses)
}

/// 현황 표 출력
pub fn print_status(statuses: &[UnitStatus]) {
    println!("\n📋 동기화 현황");
    println!("{:-<80}", "");
    println!(
        "{:<10} {:<4} {:>10} {:<22} {:>8} {:>8}",
        "심볼", "TF", "캔들 수", "워터마크", "지연", "활성"
    );
    println!("{:-<80}", "");

    for status in statuses {
        let watermark = status
            .watermark
            .map(|wm| wm.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let lag = status
            .lag_periods
            .map(|lag| lag.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<10} {:<4} {:>10} {:<22} {:>8} {:>8}",
            status.unit.symbol,
            status.unit.timeframe.as_str(),
            status.count,
            watermark,
            lag,
            if status.unit.enabled { "✅" } else { "⏸" }
        );

        if let Some(stats) = &status.recent {
            if stats.count > 0 {
                println!(
                    "    └ 24h: {}봉, 평균 거래량 {:.1}, 가격 범위 {} ~ {} (스프레드 {})",
                    stats.count,
                    stats.avg_volume,
                    stats.min_price.map(|p| p.to_string()).unwrap_or_default(),
                    stats.max_price.map(|p| p.to_string()).unwrap_or_default(),
                    stats.spread().map(|p| p.to_string()).unwrap_or_default(),
                );
            } else {
                println!("    └ 24h: 데이터 없음");
            }
        }
    }

    println!("{:-<80}", "");
    let stale = statuses
        .iter()
        .filter(|s| s.lag_periods.map_or(true, |lag| lag > 0))
        .count();
    println!("📊 작업 단위 {}개, 지연 또는 데이터 없음 {}개", statuses.len(), stale);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fxsync_core::{ConflictPolicy, CurrencyPair, RawCandle, Timeframe};
    use fxsync_data::MemoryCandleStore;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_lag_periods() {
        let unit = WorkUnit::new(&CurrencyPair::new("EUR_USD", 7), Timeframe::M15);

        // 10:00 봉은 10:15에 완결, 10:20 기준 지연 없음
        assert_eq!(lag_periods(&unit, at(10, 0), at(10, 20)), 0);
        // 10:15, 10:30 봉이 완결되었지만 저장되지 않음
        assert_eq!(lag_periods(&unit, at(10, 0), at(10, 45)), 2);
        assert_eq!(lag_periods(&unit, at(10, 0), at(9, 0)), 0);
    }

    #[tokio::test]
    async fn test_collect_status() {
        let memory = Arc::new(MemoryCandleStore::new());
        let candles: Vec<_> = (0..4)
            .map(|i| {
                RawCandle {
                    time: at(10, 0) + chrono::Duration::minutes(15 * i),
                    open: dec!(1.1000),
                    high: dec!(1.1010),
                    low: dec!(1.0990),
                    close: dec!(1.1005),
                    volume: 10,
                    complete: true,
                }
                .into_candle(7, Timeframe::M15.id())
            })
            .collect();
        memory
            .upsert_candles(&candles, ConflictPolicy::Ignore)
            .await
            .unwrap();

        let store: Arc<dyn CandleStore> = memory;
        let units = vec![
            WorkUnit::new(&CurrencyPair::new("EUR_USD", 7), Timeframe::M15),
            WorkUnit::new(&CurrencyPair::new("EUR_USD", 7), Timeframe::H1),
        ];

        let statuses = collect_status(&store, &units, at(11, 10), true).await.unwrap();

        assert_eq!(statuses[0].count, 4);
        assert_eq!(statuses[0].watermark, Some(at(10, 45)));
        assert_eq!(statuses[0].lag_periods, Some(0));
        assert_eq!(statuses[0].recent.as_ref().unwrap().count, 4);
        assert_eq!(statuses[1].count, 0);
        assert_eq!(statuses[1].lag_periods, None);
    }
}
