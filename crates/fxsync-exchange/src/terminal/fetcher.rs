//! 트레이딩 터미널 캔들 공급자.

use async_trait::async_trait;
use chrono::Utc;
use fxsync_core::{to_terminal_symbol, FetchError, FetchRequest, RawCandle, UpstreamFetcher};
use tracing::debug;

use super::actor::{RateQuery, TerminalHandle};
use super::bridge::rates_to_candles;

/// `to` 없이 요청할 때 기본 조회 개수.
const DEFAULT_LATEST_COUNT: u32 = 1000;

/// 터미널 액터를 통한 [`UpstreamFetcher`] 구현.
#[derive(Clone)]
pub struct TerminalFetcher {
    handle: TerminalHandle,
}

impl TerminalFetcher {
    pub fn new(handle: TerminalHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl UpstreamFetcher for TerminalFetcher {
    async fn fetch_candles(&self, request: &FetchRequest) -> Result<Vec<RawCandle>, FetchError> {
        let symbol = to_terminal_symbol(&request.symbol);
        let query = match request.to {
            Some(to) => RateQuery::Range {
                from: request.from,
                to,
            },
            None => RateQuery::Latest {
                count: request.max_count.unwrap_or(DEFAULT_LATEST_COUNT),
            },
        };

        let rates = self
            .handle
            .fetch_rates(&symbol, request.timeframe.terminal_code(), query)
            .await?;

        let mut candles = rates_to_candles(rates, request.timeframe, Utc::now())?;
        // 최신 N개 조회는 요청 시작 시각 이전 봉도 포함할 수 있음
        candles.retain(|c| c.time >= request.from);

        debug!(
            symbol = %symbol,
            timeframe = %request.timeframe,
            count = candles.len(),
            "터미널 캔들 수신"
        );

        Ok(candles)
    }

    fn name(&self) -> &str {
        "terminal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::bridge::{TerminalBridge, TerminalError, TerminalRate};
    use chrono::{DateTime, Duration, TimeZone};
    use fxsync_core::Timeframe;
    use std::sync::{Arc, Mutex};

    /// 호출 기록을 남기는 가짜 브리지.
    struct FakeBridge {
        calls: Arc<Mutex<Vec<String>>>,
        known: Vec<&'static str>,
    }

    impl TerminalBridge for FakeBridge {
        fn select_symbol(&mut self, symbol: &str) -> Result<(), TerminalError> {
            self.calls.lock().unwrap().push(format!("select {}", symbol));
            if self.known.contains(&symbol) {
                Ok(())
            } else {
                Err(TerminalError::UnknownSymbol(symbol.to_string()))
            }
        }

        fn copy_rates_range(
            &mut self,
            symbol: &str,
            timeframe_code: u32,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<TerminalRate>, TerminalError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("range {} {}", symbol, timeframe_code));
            let step = 900;
            Ok((from.timestamp()..=to.timestamp())
                .step_by(step)
                .map(|time| TerminalRate {
                    time,
                    open: 1.1,
                    high: 1.2,
                    low: 1.0,
                    close: 1.1,
                    tick_volume: 1,
                })
                .collect())
        }

        fn copy_rates_from_pos(
            &mut self,
            _symbol: &str,
            _timeframe_code: u32,
            _start_pos: u32,
            _count: u32,
        ) -> Result<Vec<TerminalRate>, TerminalError> {
            Ok(Vec::new())
        }
    }

    async fn fetcher(calls: Arc<Mutex<Vec<String>>>) -> TerminalFetcher {
        let (handle, _join) = TerminalHandle::spawn(move || {
            Ok(FakeBridge {
                calls,
                known: vec!["EURUSD"],
            })
        })
        .await
        .unwrap();
        TerminalFetcher::new(handle)
    }

    #[tokio::test]
    async fn test_fetch_through_actor_selects_symbol_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = fetcher(calls.clone()).await;

        let from = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let request = FetchRequest {
            symbol: "EUR_USD".to_string(),
            timeframe: Timeframe::M15,
            from,
            to: Some(from + Duration::hours(1)),
            max_count: None,
        };

        let candles = fetcher.fetch_candles(&request).await.unwrap();
        assert_eq!(candles.len(), 5);
        assert!(candles.iter().all(|c| c.complete));

        fetcher.fetch_candles(&request).await.unwrap();
        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["select EURUSD", "range EURUSD 15", "range EURUSD 15"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_handle() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let fetcher = fetcher(calls.clone()).await;
        let from = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let fetcher = fetcher.clone();
            tasks.push(tokio::spawn(async move {
                let request = FetchRequest {
                    symbol: "EUR_USD".to_string(),
                    timeframe: Timeframe::H1,
                    from,
                    to: Some(from + Duration::hours(2)),
                    max_count: None,
                };
                fetcher.fetch_candles(&request).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_symbol_rejected() {
        let fetcher = fetcher(Arc::new(Mutex::new(Vec::new()))).await;
        let request = FetchRequest::from_count(
            "USD_XXX",
            Timeframe::M5,
            Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
            10,
        );

        let err = fetcher.fetch_candles(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_bridge_connect_failure() {
        let result = TerminalHandle::spawn(|| -> Result<FakeBridge, TerminalError> {
            Err(TerminalError::NotConnected("terminal not running".to_string()))
        })
        .await;
        assert!(matches!(result, Err(TerminalError::NotConnected(_))));
    }
}
