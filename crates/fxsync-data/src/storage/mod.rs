//! 캔들 저장소 구현.

pub mod candles;
pub mod memory;

pub use candles::{PgCandleStore, UPSERT_PAGE_SIZE};
pub use memory::MemoryCandleStore;
