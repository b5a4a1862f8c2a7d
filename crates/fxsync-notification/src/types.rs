//! 알림 공통 타입.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// 토픽
// =============================================================================

/// 알림 토픽 (텔레그램 포럼 스레드).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    #[default]
    System,
    Trades,
    Analysis,
    PendingOrders,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::System => "system",
            Topic::Trades => "trades",
            Topic::Analysis => "analysis",
            Topic::PendingOrders => "pending_orders",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// 이벤트
// =============================================================================

/// 알림 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationEvent {
    /// 동기화 시스템 시작
    SystemStarted {
        mode: String,
        pairs: Vec<String>,
        timeframes: Vec<String>,
        units: usize,
    },

    /// 동기화 시스템 종료 (수명 통계 포함)
    SystemStopped {
        uptime_secs: u64,
        cycles: u64,
        successful_cycles: u64,
        total_candles: u64,
        errors: u64,
        reason: String,
    },

    /// 사이클 완료
    CycleCompleted {
        duration_ms: u64,
        new_candles: u64,
        successful_units: usize,
        failed_units: usize,
        timeframes: Vec<String>,
    },

    /// 주기 상태 보고
    Heartbeat {
        uptime_secs: u64,
        cycles: u64,
        successful_cycles: u64,
        candles_last_hour: u64,
        active_pairs: usize,
    },

    /// 시스템 에러
    SystemError { component: String, message: String },

    /// 백필 완료
    BackfillCompleted {
        units: usize,
        new_candles: u64,
        failed_units: usize,
        duration_ms: u64,
    },

    /// 자유 형식 텍스트
    Text(String),
}

/// 알림.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub topic: Topic,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 시스템 토픽 알림 생성.
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            event,
            topic: Topic::System,
            timestamp: Utc::now(),
        }
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = topic;
        self
    }
}

// =============================================================================
// 에러
// =============================================================================

/// 알림 전송 에러.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("네트워크 에러: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// 요청 한도 초과 (재시도 대기 초)
    #[error("요청 한도 초과 ({0}초 후 재시도)")]
    RateLimited(u64),

    #[error("전송 실패: {0}")]
    SendFailed(String),

    #[error("설정 누락: {0}")]
    NotConfigured(String),
}

impl NotificationError {
    /// 재시도할 만한 에러인지.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotificationError::NetworkError(_) | NotificationError::RateLimited(_)
        )
    }

    /// 에러가 지정한 재시도 대기 시간.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            NotificationError::RateLimited(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

pub type NotificationResult<T> = Result<T, NotificationError>;

// =============================================================================
// 전송기 Trait
// =============================================================================

/// 알림 전송기.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: &Notification) -> NotificationResult<()>;

    fn is_enabled(&self) -> bool;

    fn name(&self) -> &str;
}
