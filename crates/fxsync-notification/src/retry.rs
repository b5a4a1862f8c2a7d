//! 알림 전송 재시도 유틸리티.
//!
//! 네트워크 오류, 요청 한도 초과 등 일시적인 오류에 대해 자동 재시도를 수행합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use fxsync_notification::retry::{RetryConfig, with_retry};
//!
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     sender.send_message("hello", Topic::System).await
//! }).await;
//! ```

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::{debug, warn};

use crate::types::NotificationError;

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 기본 대기 시간 (에러에 지정된 대기 시간이 없을 때 사용).
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 지수 백오프 사용 여부.
    pub use_exponential_backoff: bool,
    /// 백오프 배수.
    pub backoff_multiplier: f64,
    /// 지터(±25%) 추가 여부.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    /// 초기 1회 + 재시도 2회, 1초부터 2배씩 증가.
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 대기 시간 계산.
    fn calculate_delay(&self, attempt: u32, error: &NotificationError) -> Duration {
        // 에러에 지정된 대기 시간이 있으면 우선 사용
        let base = error.retry_delay().unwrap_or(self.base_delay);

        let delay = if self.use_exponential_backoff && attempt > 0 {
            let multiplier = self.backoff_multiplier.powi(attempt as i32);
            Duration::from_secs_f64(base.as_secs_f64() * multiplier)
        } else {
            base
        };

        let delay = delay.min(self.max_delay);

        if self.add_jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = rand::thread_rng().gen_range(-1.0..=1.0) * jitter_range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }
}

/// 재시도가 포함된 비동기 전송 실행.
///
/// 재시도 불가능한 에러는 즉시, 재시도 가능한 에러는 `max_retries` 소진 후
/// 마지막 에러를 반환합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, NotificationError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, NotificationError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "재시도 후 전송 성공");
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() {
                    debug!(error = %e, "재시도 불가능한 에러, 즉시 실패 반환");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "최대 재시도 횟수 초과"
                    );
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt, &e);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "재시도 대기 중"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    fn quick() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
            use_exponential_backoff: false,
            add_jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_on_rate_limit() {
        let config = RetryConfig {
            max_delay: Duration::from_millis(5),
            ..quick()
        };
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(NotificationError::RateLimited(30))
                } else {
                    Ok("sent")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "sent");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_send_failed() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&quick(), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(NotificationError::SendFailed("HTTP 400".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let config = RetryConfig {
            max_delay: Duration::from_millis(5),
            ..quick()
        };

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(NotificationError::RateLimited(1))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let config = RetryConfig {
            add_jitter: false,
            max_delay: Duration::from_secs(3),
            ..Default::default()
        };
        let err = NotificationError::SendFailed(String::new());

        assert_eq!(config.calculate_delay(0, &err), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1, &err), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2, &err), Duration::from_secs(3));
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
    }
}
