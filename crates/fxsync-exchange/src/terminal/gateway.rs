//! HTTP 게이트웨이 기반 터미널 브리지.
//!
//! 터미널이 설치된 호스트에서 동작하는 게이트웨이 프로세스에 동기 HTTP로
//! 요청합니다. 브리지 스레드 안에서만 호출되므로 `reqwest::blocking`을 사용합니다.
//!
//! | 동작 | 요청 |
//! |------|------|
//! | 연결 확인 | `GET {base}/health` |
//! | 심볼 선택 | `POST {base}/symbols/{symbol}/select` |
//! | 구간 조회 | `GET {base}/rates/{symbol}?timeframe=..&from=..&to=..` |
//! | 최신 조회 | `GET {base}/rates/{symbol}?timeframe=..&start_pos=..&count=..` |

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use super::bridge::{TerminalBridge, TerminalError, TerminalRate};

/// 게이트웨이 설정.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// HTTP 게이트웨이 브리지.
pub struct GatewayBridge {
    client: Client,
    base_url: String,
}

impl GatewayBridge {
    /// 클라이언트 생성 후 `/health`로 연결 확인.
    pub fn connect(config: &GatewayConfig) -> Result<Self, TerminalError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TerminalError::NotConnected(e.to_string()))?;

        let bridge = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        };

        let response = bridge
            .client
            .get(format!("{}/health", bridge.base_url))
            .send()
            .map_err(|e| TerminalError::NotConnected(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TerminalError::NotConnected(format!(
                "HTTP {}",
                response.status().as_u16()
            )));
        }

        Ok(bridge)
    }

    fn check(symbol: &str, response: Response) -> Result<Response, TerminalError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TerminalError::UnknownSymbol(symbol.to_string()));
        }
        if !status.is_success() {
            let text = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TerminalError::Call(format!("HTTP {}: {}", status.as_u16(), text)));
        }
        Ok(response)
    }

    fn get_rates(
        &self,
        symbol: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<TerminalRate>, TerminalError> {
        let response = self
            .client
            .get(format!("{}/rates/{}", self.base_url, symbol))
            .query(params)
            .send()
            .map_err(|e| TerminalError::Call(e.to_string()))?;

        Self::check(symbol, response)?
            .json::<Vec<TerminalRate>>()
            .map_err(|e| TerminalError::Call(format!("응답 파싱 실패: {}", e)))
    }
}

impl TerminalBridge for GatewayBridge {
    fn select_symbol(&mut self, symbol: &str) -> Result<(), TerminalError> {
        let response = self
            .client
            .post(format!("{}/symbols/{}/select", self.base_url, symbol))
            .send()
            .map_err(|e| TerminalError::Call(e.to_string()))?;
        Self::check(symbol, response)?;
        Ok(())
    }

    fn copy_rates_range(
        &mut self,
        symbol: &str,
        timeframe_code: u32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TerminalRate>, TerminalError> {
        self.get_rates(
            symbol,
            &[
                ("timeframe", timeframe_code.to_string()),
                ("from", from.timestamp().to_string()),
                ("to", to.timestamp().to_string()),
            ],
        )
    }

    fn copy_rates_from_pos(
        &mut self,
        symbol: &str,
        timeframe_code: u32,
        start_pos: u32,
        count: u32,
    ) -> Result<Vec<TerminalRate>, TerminalError> {
        self.get_rates(
            symbol,
            &[
                ("timeframe", timeframe_code.to_string()),
                ("start_pos", start_pos.to_string()),
                ("count", count.to_string()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_gateway_rates_and_unknown_symbol() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/health").with_status(200).create();
        server
            .mock("POST", "/symbols/EURUSD/select")
            .with_status(200)
            .create();
        server
            .mock("POST", "/symbols/XXXYYY/select")
            .with_status(404)
            .create();
        server
            .mock("GET", "/rates/EURUSD")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeframe".into(), "16385".into()),
                Matcher::UrlEncoded("count".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"time":1751328000,"open":1.1,"high":1.2,"low":1.0,"close":1.15,"tick_volume":5},
                    {"time":1751331600,"open":1.15,"high":1.2,"low":1.1,"close":1.12,"tick_volume":3}]"#,
            )
            .create();

        let mut bridge = GatewayBridge::connect(&GatewayConfig::new(server.url())).unwrap();

        bridge.select_symbol("EURUSD").unwrap();
        let rates = bridge.copy_rates_from_pos("EURUSD", 16385, 0, 2).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[1].tick_volume, 3);

        assert!(matches!(
            bridge.select_symbol("XXXYYY"),
            Err(TerminalError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_gateway_down_is_not_connected() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/health").with_status(503).create();

        assert!(matches!(
            GatewayBridge::connect(&GatewayConfig::new(server.url())),
            Err(TerminalError::NotConnected(_))
        ));
    }
}
