//! 알림 전송.
//!
//! - [`TelegramSender`]: 텔레그램 포럼 토픽별 HTML 메시지
//! - [`NotificationManager`]: 등록된 전송기로 알림을 보내는 fire-and-forget 파사드
//! - [`retry`]: 전송 재시도 유틸리티

pub mod manager;
pub mod retry;
pub mod telegram;
pub mod types;

pub use manager::NotificationManager;
pub use retry::RetryConfig;
pub use telegram::{TelegramConfig, TelegramSender, TopicIds};
pub use types::{
    Notification, NotificationError, NotificationEvent, NotificationResult, NotificationSender,
    Topic,
};
