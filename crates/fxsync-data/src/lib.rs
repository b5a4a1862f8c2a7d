//! FX 캔들 데이터 계층.
//!
//! - [`Database`]: PostgreSQL 연결 풀과 스키마 관리
//! - [`PgCandleStore`]: `market_data.candles` 기반 저장소
//! - [`MemoryCandleStore`]: 테스트용 메모리 저장소
//! - [`WatermarkTracker`]: 작업 단위별 마지막 저장 시각 조회

pub mod database;
pub mod error;
pub mod storage;
pub mod watermark;

pub use database::{Database, DatabaseConfig};
pub use error::{DataError, Result};
pub use storage::{MemoryCandleStore, PgCandleStore, UPSERT_PAGE_SIZE};
pub use watermark::WatermarkTracker;
