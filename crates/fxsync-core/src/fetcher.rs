//! 업스트림 캔들 공급자 추상화.
//!
//! REST API, 트레이딩 터미널 등 데이터 소스와 무관하게 캔들을 조회하기 위한
//! 인터페이스를 제공합니다. 수집 파이프라인은 이 trait에만 의존합니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{FetchWindow, RawCandle, Timeframe, WorkUnit};

// =============================================================================
// 요청 타입
// =============================================================================

/// 캔들 조회 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// OANDA 형식 심볼 (예: "EUR_USD")
    pub symbol: String,
    pub timeframe: Timeframe,
    /// 시작 시각 (포함)
    pub from: DateTime<Utc>,
    /// 종료 시각. `None`이면 `max_count`개까지
    pub to: Option<DateTime<Utc>>,
    /// 최대 캔들 수 힌트
    pub max_count: Option<u32>,
}

impl FetchRequest {
    /// 작업 단위와 요청 구간으로 요청 생성.
    pub fn for_window(unit: &WorkUnit, window: &FetchWindow) -> Self {
        Self {
            symbol: unit.symbol.clone(),
            timeframe: unit.timeframe,
            from: window.from(),
            to: Some(window.to()),
            max_count: None,
        }
    }

    /// 시작 시각부터 `count`개를 요청.
    pub fn from_count(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        count: u32,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            from,
            to: None,
            max_count: Some(count),
        }
    }

    pub fn with_max_count(mut self, count: u32) -> Self {
        self.max_count = Some(count);
        self
    }
}

// =============================================================================
// 에러 타입
// =============================================================================

/// 업스트림 조회 에러.
#[derive(Debug, Error)]
pub enum FetchError {
    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("요청 타임아웃 ({0:?})")]
    Timeout(Duration),

    /// 요청 한도 초과
    #[error("요청 한도 초과 (재시도 대기 {retry_after_secs:?}초)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 응답 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 업스트림이 요청 자체를 거부 (잘못된 심볼/타임프레임 조합)
    #[error("요청 거부: {0}")]
    Rejected(String),

    /// 인증 실패 (만료되었거나 잘못된 API 키, 권한 없음)
    #[error("인증 실패: {0}")]
    Unauthorized(String),
}

impl FetchError {
    /// 다음 사이클에서 다시 시도할 만한 일시적 에러인지.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Rejected(_) | FetchError::Unauthorized(_))
    }
}

// =============================================================================
// UpstreamFetcher Trait
// =============================================================================

/// 캔들 데이터 공급자 trait.
///
/// 응답 안의 캔들은 시간순이어야 하지만 중복이나 누락이 없다는 보장은
/// 하지 않습니다. 진행 중인 캔들은 `complete == false`로 표시해야 합니다.
///
/// # 구현 예시
///
/// ```ignore
/// pub struct MyFetcher {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl UpstreamFetcher for MyFetcher {
///     async fn fetch_candles(&self, request: &FetchRequest) -> Result<Vec<RawCandle>, FetchError> {
///         // API 호출 및 변환
///     }
///
///     fn name(&self) -> &str {
///         "my-fetcher"
///     }
/// }
/// ```
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// 캔들 조회.
    ///
    /// # Errors
    ///
    /// - 네트워크/타임아웃/한도 초과: 일시적 에러
    /// - 잘못된 심볼 등: `FetchError::Rejected`
    async fn fetch_candles(&self, request: &FetchRequest) -> Result<Vec<RawCandle>, FetchError>;

    /// 공급자 이름 (로그용).
    fn name(&self) -> &str;
}
