//! 시간 추상화.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 현재 시각과 대기를 제공하는 시계. 테스트에서 수동 시계로 교체합니다.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// 실제 시스템 시계.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
