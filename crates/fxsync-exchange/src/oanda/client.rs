//! OANDA REST 캔들 공급자.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use fxsync_core::{FetchError, FetchRequest, RawCandle, UpstreamFetcher};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::types::{OandaCandlesResponse, OandaErrorBody};

// ============================================================================
// 설정
// ============================================================================

/// OANDA 연결 설정.
#[derive(Clone)]
pub struct OandaConfig {
    /// 예: "https://api-fxpractice.oanda.com"
    pub api_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
    /// 요청마다 적용하는 지연 (API 한도 준수)
    pub rate_limit_delay: Duration,
}

impl std::fmt::Debug for OandaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OandaConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"***")
            .field("request_timeout", &self.request_timeout)
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish()
    }
}

impl OandaConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            request_timeout: Duration::from_secs(30),
            rate_limit_delay: Duration::from_millis(100),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }
}

// ============================================================================
// OANDA 클라이언트
// ============================================================================

/// OANDA v20 REST 캔들 공급자.
///
/// `reqwest::Client`는 내부적으로 동기화되어 있으므로 여러 작업 단위가
/// 동시에 호출해도 됩니다.
pub struct OandaFetcher {
    client: Client,
    config: OandaConfig,
}

impl OandaFetcher {
    pub fn new(config: OandaConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn candles_url(&self, symbol: &str) -> String {
        format!(
            "{}/v3/instruments/{}/candles",
            self.config.api_url.trim_end_matches('/'),
            symbol
        )
    }

    /// 요청 파라미터 구성.
    ///
    /// OANDA는 `from`/`to`/`count`를 동시에 받지 않으므로 `to`가 있으면
    /// `count`는 생략합니다.
    fn query_params(request: &FetchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("granularity", request.timeframe.oanda_granularity().to_string()),
            ("price", "M".to_string()),
            (
                "from",
                request.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ];

        match (request.to, request.max_count) {
            (Some(to), _) => params.push(("to", to.to_rfc3339_opts(SecondsFormat::Secs, true))),
            (None, Some(count)) => params.push(("count", count.to_string())),
            (None, None) => {}
        }

        params
    }

    async fn send(&self, request: &FetchRequest) -> Result<Vec<RawCandle>, FetchError> {
        let response = self
            .client
            .get(self.candles_url(&request.symbol))
            .bearer_auth(&self.config.api_key)
            .query(&Self::query_params(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.config.request_timeout)
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<OandaErrorBody>(&text)
                .ok()
                .and_then(|b| b.error_message)
                .unwrap_or(text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    FetchError::Unauthorized(format!("HTTP {}: {}", status.as_u16(), message))
                }
                StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                    FetchError::Rejected(format!("HTTP {}: {}", status.as_u16(), message))
                }
                _ => FetchError::Network(format!("HTTP {}: {}", status.as_u16(), message)),
            });
        }

        let body: OandaCandlesResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        body.candles.into_iter().map(RawCandle::try_from).collect()
    }
}

#[async_trait]
impl UpstreamFetcher for OandaFetcher {
    async fn fetch_candles(&self, request: &FetchRequest) -> Result<Vec<RawCandle>, FetchError> {
        let result = self.send(request).await;

        // 성공 여부와 무관하게 요청 간 간격 유지
        if !self.config.rate_limit_delay.is_zero() {
            tokio::time::sleep(self.config.rate_limit_delay).await;
        }

        match &result {
            Ok(candles) => debug!(
                symbol = %request.symbol,
                timeframe = %request.timeframe,
                count = candles.len(),
                "OANDA 캔들 수신"
            ),
            Err(e) => warn!(
                symbol = %request.symbol,
                timeframe = %request.timeframe,
                error = %e,
                "OANDA 요청 실패"
            ),
        }

        result
    }

    fn name(&self) -> &str {
        "oanda"
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fxsync_core::Timeframe;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn fetcher(url: &str) -> OandaFetcher {
        let config = OandaConfig::new(url, "test-key").with_rate_limit_delay(Duration::ZERO);
        OandaFetcher::new(config).unwrap()
    }

    fn window_request() -> FetchRequest {
        FetchRequest {
            symbol: "EUR_USD".to_string(),
            timeframe: Timeframe::M15,
            from: Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap(),
            to: Some(Utc.with_ymd_and_hms(2025, 7, 1, 1, 0, 0).unwrap()),
            max_count: Some(1000),
        }
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = OandaConfig::new("https://api-fxpractice.oanda.com", "secret-token");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret-token"));
    }

    #[test]
    fn test_query_prefers_to_over_count() {
        let params = OandaFetcher::query_params(&window_request());
        assert!(params.iter().any(|(k, v)| *k == "to" && v == "2025-07-01T01:00:00Z"));
        assert!(params.iter().all(|(k, _)| *k != "count"));

        let mut count_only = window_request();
        count_only.to = None;
        let params = OandaFetcher::query_params(&count_only);
        assert!(params.iter().any(|(k, v)| *k == "count" && v == "1000"));
    }

    #[tokio::test]
    async fn test_fetch_candles_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v3/instruments/EUR_USD/candles")
            .match_header("authorization", "Bearer test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("granularity".into(), "M15".into()),
                Matcher::UrlEncoded("from".into(), "2025-07-01T00:00:00Z".into()),
                Matcher::UrlEncoded("to".into(), "2025-07-01T01:00:00Z".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"instrument":"EUR_USD","granularity":"M15","candles":[
                    {"complete":true,"volume":10,"time":"2025-07-01T00:15:00.000000000Z",
                     "mid":{"o":"1.1000","h":"1.1010","l":"1.0990","c":"1.1005"}}
                ]}"#,
            )
            .create_async()
            .await;

        let candles = fetcher(&server.url())
            .fetch_candles(&window_request())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, dec!(1.1005));
        assert!(candles[0].complete);
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/instruments/EUR_USD/candles")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let err = fetcher(&server.url())
            .fetch_candles(&window_request())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/instruments/EUR_USD/candles")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"errorMessage":"Invalid value specified for 'instrument'"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v3/instruments/GBP_USD/candles")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = fetcher(&server.url());

        let rejected = client.fetch_candles(&window_request()).await.unwrap_err();
        assert!(matches!(rejected, FetchError::Rejected(ref m) if m.contains("instrument")));
        assert!(!rejected.is_transient());

        let mut other = window_request();
        other.symbol = "GBP_USD".to_string();
        let unavailable = client.fetch_candles(&other).await.unwrap_err();
        assert!(matches!(unavailable, FetchError::Network(_)));
        assert!(unavailable.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_key_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v3/instruments/EUR_USD/candles")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"errorMessage":"Insufficient authorization to perform request."}"#)
            .create_async()
            .await;

        let err = fetcher(&server.url())
            .fetch_candles(&window_request())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Unauthorized(ref m) if m.contains("HTTP 401")));
        assert!(!err.is_transient());
    }
}
