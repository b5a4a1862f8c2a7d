//! 사이클 단위 재시도 관리.
//!
//! 한 사이클 안에서는 재시도하지 않고, 실패한 사이클 다음 사이클까지의
//! 대기 시간을 늘립니다. 실패 카운터는 작업 단위별이 아닌 전역입니다.

use std::time::Duration;

use tracing::{info, warn};

/// 실패 사이클 이후 결정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// `delay` 대기 후 다시 사이클 실행
    Retry { attempt: u32, delay: Duration },
    /// 재시도 한도 소진
    Exhausted { attempts: u32 },
}

/// 연속 실패 사이클 카운터.
#[derive(Debug, Clone)]
pub struct RetryGovernor {
    retry_interval: Duration,
    backoff_cap: u32,
    max_retries: u32,
    consecutive_failures: u32,
}

impl RetryGovernor {
    pub fn new(retry_interval: Duration, max_retries: u32) -> Self {
        Self {
            retry_interval,
            backoff_cap: 5,
            max_retries,
            consecutive_failures: 0,
        }
    }

    pub fn with_backoff_cap(mut self, cap: u32) -> Self {
        self.backoff_cap = cap.max(1);
        self
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                failures = self.consecutive_failures,
                "사이클 복구, 실패 카운터 초기화"
            );
        }
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures >= self.max_retries {
            warn!(
                attempts = self.consecutive_failures,
                max_retries = self.max_retries,
                "재시도 한도 소진"
            );
            return RetryDecision::Exhausted {
                attempts: self.consecutive_failures,
            };
        }

        let multiplier = self.consecutive_failures.min(self.backoff_cap);
        let delay = self.retry_interval * multiplier;
        warn!(
            attempt = self.consecutive_failures,
            max_retries = self.max_retries,
            delay_secs = delay.as_secs(),
            "사이클 실패, 재시도 대기"
        );

        RetryDecision::Retry {
            attempt: self.consecutive_failures,
            delay,
        }
    }
}
