//! 알림 매니저.
//!
//! 등록된 전송기 모두에 알림을 보내고 실패는 로그로만 남깁니다. 알림 실패가
//! 동기화 흐름을 멈추지 않도록 에러를 호출 측에 전파하지 않습니다.

use tracing::{debug, warn};

use crate::types::{Notification, NotificationEvent, NotificationSender, Topic};

/// 알림 매니저.
#[derive(Default)]
pub struct NotificationManager {
    senders: Vec<Box<dyn NotificationSender>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sender<S: NotificationSender + 'static>(&mut self, sender: S) {
        debug!(sender = sender.name(), "알림 전송기 등록");
        self.senders.push(Box::new(sender));
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    /// 활성화된 전송기가 하나라도 있는지.
    pub fn has_enabled_senders(&self) -> bool {
        self.senders.iter().any(|s| s.is_enabled())
    }

    /// 알림 전송. 활성 전송기 중 하나라도 성공하면 `true`.
    pub async fn notify(&self, notification: &Notification) -> bool {
        let mut delivered = false;

        for sender in self.senders.iter().filter(|s| s.is_enabled()) {
            match sender.send(notification).await {
                Ok(()) => delivered = true,
                Err(e) => warn!(
                    sender = sender.name(),
                    topic = %notification.topic,
                    error = %e,
                    "알림 전송 실패"
                ),
            }
        }

        delivered
    }

    /// 텍스트 알림 전송.
    pub async fn notify_text(&self, message: impl Into<String>, topic: Topic) -> bool {
        let notification = Notification::new(NotificationEvent::Text(message.into())).with_topic(topic);
        self.notify(&notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationError, NotificationResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockSender {
        enabled: bool,
        fail: bool,
        sent: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NotificationSender for MockSender {
        async fn send(&self, _notification: &Notification) -> NotificationResult<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotificationError::SendFailed("HTTP 500".to_string()))
            } else {
                Ok(())
            }
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_notify_without_senders() {
        let manager = NotificationManager::new();
        assert!(!manager.notify_text("hello", Topic::System).await);
    }

    #[tokio::test]
    async fn test_notify_skips_disabled_and_tolerates_failure() {
        let sent = Arc::new(AtomicUsize::new(0));
        let mut manager = NotificationManager::new();
        manager.add_sender(MockSender {
            enabled: false,
            fail: false,
            sent: sent.clone(),
        });
        manager.add_sender(MockSender {
            enabled: true,
            fail: true,
            sent: sent.clone(),
        });
        assert!(!manager.notify_text("hello", Topic::System).await);
        assert_eq!(sent.load(Ordering::SeqCst), 1);

        manager.add_sender(MockSender {
            enabled: true,
            fail: false,
            sent: sent.clone(),
        });
        assert!(manager.notify_text("hello", Topic::Analysis).await);
        assert_eq!(manager.sender_count(), 3);
    }
}
