//! FX 캔들 증분 동기화 수집기.
//!
//! 업스트림 공급자에서 완결된 캔들만 가져와 검증, 중복 제거 후 저장소에
//! 멱등 저장합니다. 저장소의 마지막 캔들 시각(워터마크)이 재개 지점이므로
//! 재시작이나 다른 프로세스와의 동시 실행에도 빈 구간 없이 이어집니다.

pub mod config;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::{CollectorConfig, UpstreamProvider};
pub use error::{CollectorError, Result};
pub use stats::{CycleReport, FailureKind, LifetimeStats, UnitOutcome};
