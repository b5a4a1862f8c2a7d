//! FX 캔들 동기화 핵심 타입과 순수 컴포넌트.
//!
//! 이 crate는 다음을 제공합니다:
//! - 도메인 타입 (타임프레임, 통화쌍, 캔들, 작업 단위, 요청 구간)
//! - 캔들 검증기와 배치 중복 제거기
//! - 워터마크 기반 요청 구간 계획기
//! - 업스트림 공급자 및 저장소 경계 trait
//!
//! # 예제
//!
//! ```rust,ignore
//! use fxsync_core::{FetchWindowPlanner, Timeframe};
//!
//! let planner = FetchWindowPlanner::new(chrono::Duration::hours(24));
//! let window = planner.plan(watermark, Utc::now(), Timeframe::M15);
//! ```

pub mod dedup;
pub mod domain;
pub mod fetcher;
pub mod planner;
pub mod statistics;
pub mod storage;
pub mod validator;

// 주요 타입 재내보내기
pub use dedup::{DedupOutcome, DeduplicationFilter};
pub use domain::{
    build_work_units, default_pairs, to_terminal_symbol, Candle, CandleKey, CurrencyPair,
    FetchWindow, RawCandle, Timeframe, WorkUnit,
};
pub use fetcher::{FetchError, FetchRequest, UpstreamFetcher};
pub use planner::{BackfillWindows, FetchWindowPlanner};
pub use statistics::CandleStatistics;
pub use storage::{CandleStore, ConflictPolicy, StorageError};
pub use validator::{CandleValidator, ValidationIssue, ValidationOutcome};
