//! 트레이딩 터미널 공급자.
//!
//! 터미널 네이티브 API는 단일 스레드 전용이므로 전용 스레드 액터로 감쌉니다.
//!
//! ```text
//! TerminalFetcher ──mpsc──▶ [terminal-bridge 스레드: TerminalBridge]
//!        ▲                              │
//!        └──────────── oneshot ─────────┘
//! ```

mod actor;
mod bridge;
mod fetcher;
mod gateway;

pub use actor::{RateQuery, TerminalHandle};
pub use bridge::{rates_to_candles, TerminalBridge, TerminalError, TerminalRate};
pub use fetcher::TerminalFetcher;
pub use gateway::{GatewayBridge, GatewayConfig};
