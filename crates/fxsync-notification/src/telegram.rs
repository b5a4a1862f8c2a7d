//! 텔레그램 알림 서비스.
//!
//! Bot API `sendMessage`로 포럼 토픽(스레드)별 HTML 메시지를 전송합니다.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::retry::{with_retry, RetryConfig};
use crate::types::{
    Notification, NotificationError, NotificationEvent, NotificationResult, NotificationSender,
    Topic,
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// 토픽별 포럼 스레드 ID. 0이면 스레드 없이 전송.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicIds {
    pub system: i64,
    pub trades: i64,
    pub analysis: i64,
    pub pending_orders: i64,
}

impl Default for TopicIds {
    fn default() -> Self {
        Self {
            system: 1528,
            trades: 223,
            analysis: 222,
            pending_orders: 1662,
        }
    }
}

impl TopicIds {
    pub fn thread_id(&self, topic: Topic) -> Option<i64> {
        let id = match topic {
            Topic::System => self.system,
            Topic::Trades => self.trades,
            Topic::Analysis => self.analysis,
            Topic::PendingOrders => self.pending_orders,
        };
        (id != 0).then_some(id)
    }
}

/// 텔레그램 전송 설정.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub topics: TopicIds,
    pub retry: RetryConfig,
    pub enabled: bool,
    /// Bot API 주소 (테스트에서 교체)
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .field("topics", &self.topics)
            .field("enabled", &self.enabled)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramConfig {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            topics: TopicIds::default(),
            retry: RetryConfig::default(),
            enabled: true,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_topics(mut self, topics: TopicIds) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// 환경 변수에서 설정을 생성합니다. 토큰이나 채팅 ID가 없으면 `None`.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        let defaults = TopicIds::default();
        let topic = |key: &str, default: i64| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        Some(Self {
            topics: TopicIds {
                system: topic("TELEGRAM_TOPIC_SYSTEM", defaults.system),
                trades: topic("TELEGRAM_TOPIC_TRADES", defaults.trades),
                analysis: topic("TELEGRAM_TOPIC_ANALYSIS", defaults.analysis),
                pending_orders: topic("TELEGRAM_TOPIC_PENDING_ORDERS", defaults.pending_orders),
            },
            enabled,
            ..Self::new(bot_token, chat_id)
        })
    }
}

/// 텔레그램 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    /// 알림을 HTML 메시지로 포맷합니다.
    pub fn format_message(&self, notification: &Notification) -> String {
        let timestamp = notification.timestamp.format("%Y-%m-%d %H:%M:%S UTC");

        match &notification.event {
            NotificationEvent::SystemStarted {
                mode,
                pairs,
                timeframes,
                units,
            } => format!(
                "🚀 <b>동기화 시작</b>\n🕐 {}\n💱 통화쌍: {}\n📊 타임프레임: {}\n🔢 작업 단위: {}\n⚡ 모드: {}",
                timestamp,
                escape_html(&pairs.join(", ")),
                escape_html(&timeframes.join(", ")),
                units,
                escape_html(mode)
            ),

            NotificationEvent::SystemStopped {
                uptime_secs,
                cycles,
                successful_cycles,
                total_candles,
                errors,
                reason,
            } => format!(
                "🛑 <b>동기화 종료</b>\n🕐 {}\n⏱ 가동 시간: {}\n🔄 사이클: {} (성공 {})\n📈 저장 캔들: {}\n❌ 에러: {}\n📝 사유: {}",
                timestamp,
                format_uptime(*uptime_secs),
                cycles,
                successful_cycles,
                total_candles,
                errors,
                escape_html(reason)
            ),

            NotificationEvent::CycleCompleted {
                duration_ms,
                new_candles,
                successful_units,
                failed_units,
                timeframes,
            } => {
                let icon = if *failed_units == 0 { "✅" } else { "⚠️" };
                format!(
                    "{} <b>사이클 완료</b> [{}]\n📈 신규 캔들: {}\n✔️ 성공: {} / ❌ 실패: {}\n⏱ {:.1}초",
                    icon,
                    escape_html(&timeframes.join(", ")),
                    new_candles,
                    successful_units,
                    failed_units,
                    *duration_ms as f64 / 1000.0
                )
            }

            NotificationEvent::Heartbeat {
                uptime_secs,
                cycles,
                successful_cycles,
                candles_last_hour,
                active_pairs,
            } => format!(
                "💓 <b>상태 보고</b>\n🕐 {}\n⏱ 가동 시간: {}\n🔄 사이클: {} (성공 {})\n📈 최근 1시간 캔들: {}\n💱 활성 통화쌍: {}",
                timestamp,
                format_uptime(*uptime_secs),
                cycles,
                successful_cycles,
                candles_last_hour,
                active_pairs
            ),

            NotificationEvent::SystemError { component, message } => format!(
                "🚨 <b>시스템 오류</b>\n🧩 구성 요소: {}\n📝 {}\n🕐 {}",
                escape_html(component),
                escape_html(message),
                timestamp
            ),

            NotificationEvent::BackfillCompleted {
                units,
                new_candles,
                failed_units,
                duration_ms,
            } => format!(
                "📦 <b>백필 완료</b>\n🔢 작업 단위: {} (실패 {})\n📈 신규 캔들: {}\n⏱ {:.1}초",
                units,
                failed_units,
                new_candles,
                *duration_ms as f64 / 1000.0
            ),

            NotificationEvent::Text(text) => escape_html(text),
        }
    }

    /// 토픽을 지정해 메시지 전송 (재시도 포함).
    pub async fn send_message(&self, text: &str, topic: Topic) -> NotificationResult<()> {
        if self.config.bot_token.is_empty() || self.config.chat_id.is_empty() {
            return Err(NotificationError::NotConfigured(
                "TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID".to_string(),
            ));
        }

        let mut payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(thread_id) = self.config.topics.thread_id(topic) {
            payload["message_thread_id"] = json!(thread_id);
        }

        with_retry(&self.config.retry, || self.post(&payload)).await?;
        debug!(topic = %topic, length = text.len(), "텔레그램 메시지 전송 완료");
        Ok(())
    }

    async fn post(&self, payload: &serde_json::Value) -> NotificationResult<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        );

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(NotificationError::NetworkError)?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            let retry_after = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["parameters"]["retry_after"].as_u64())
                .unwrap_or(60);
            warn!(retry_after, "텔레그램 요청 한도 초과");
            return Err(NotificationError::RateLimited(retry_after));
        }

        error!("텔레그램 전송 실패: {} - {}", status, body);
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }

    /// 테스트 메시지를 전송합니다.
    pub async fn send_test(&self) -> NotificationResult<()> {
        self.send_message(
            "✓ <b>텔레그램 알림 설정 완료</b>\nFX 캔들 동기화 알림을 이 채널로 받습니다.",
            Topic::System,
        )
        .await?;
        info!("텔레그램 테스트 메시지 전송 완료");
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, notification: &Notification) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("텔레그램 알림이 비활성화되어 있습니다");
            return Ok(());
        }

        let text = self.format_message(notification);
        self.send_message(&text, notification.topic).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours >= 24 {
        format!("{}일 {}시간", hours / 24, hours % 24)
    } else {
        format!("{}시간 {}분", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn sender(api_base: &str) -> TelegramSender {
        let retry = RetryConfig {
            max_delay: Duration::from_millis(5),
            add_jitter: false,
            ..Default::default()
        };
        TelegramSender::new(
            TelegramConfig::new("123:abc".to_string(), "-100200".to_string())
                .with_api_base(api_base)
                .with_retry(retry),
        )
    }

    #[test]
    fn test_topic_thread_ids() {
        let topics = TopicIds::default();
        assert_eq!(topics.thread_id(Topic::System), Some(1528));
        assert_eq!(topics.thread_id(Topic::PendingOrders), Some(1662));

        let no_thread = TopicIds {
            analysis: 0,
            ..TopicIds::default()
        };
        assert_eq!(no_thread.thread_id(Topic::Analysis), None);
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = TelegramConfig::new("123:secret".to_string(), "-100".to_string());
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_format_messages() {
        let sender = sender("http://localhost");

        let cycle = Notification::new(NotificationEvent::CycleCompleted {
            duration_ms: 2500,
            new_candles: 12,
            successful_units: 8,
            failed_units: 0,
            timeframes: vec!["M15".to_string()],
        });
        let text = sender.format_message(&cycle);
        assert!(text.contains("사이클 완료"));
        assert!(text.contains("2.5초"));

        let error = Notification::new(NotificationEvent::SystemError {
            component: "storage".to_string(),
            message: "a < b".to_string(),
        });
        assert!(sender.format_message(&error).contains("a &lt; b"));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(3_660), "1시간 1분");
        assert_eq!(format_uptime(90_000), "1일 1시간");
    }

    #[tokio::test]
    async fn test_send_to_topic_thread() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": "-100200",
                "parse_mode": "HTML",
                "message_thread_id": 222,
            })))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        sender(&server.url())
            .send_message("hello", Topic::Analysis)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(429)
            .with_body(r#"{"ok":false,"parameters":{"retry_after":3}}"#)
            .expect(3)
            .create_async()
            .await;

        let err = sender(&server.url())
            .send_message("hello", Topic::System)
            .await
            .unwrap_err();

        assert!(matches!(err, NotificationError::RateLimited(3)));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_request_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = sender(&server.url())
            .send_message("hello", Topic::System)
            .await
            .unwrap_err();

        assert!(matches!(err, NotificationError::SendFailed(_)));
        mock.assert_async().await;
    }
}
