//! 업스트림 캔들 공급자.
//!
//! - [`OandaFetcher`]: OANDA v20 REST API
//! - [`TerminalFetcher`]: 트레이딩 터미널 (전용 스레드 액터 + 게이트웨이 브리지)
//!
//! 두 구현 모두 [`fxsync_core::UpstreamFetcher`]를 구현하므로 수집 파이프라인은
//! 공급자 종류와 무관하게 동작합니다.

pub mod oanda;
pub mod terminal;

pub use oanda::{OandaConfig, OandaFetcher};
pub use terminal::{
    GatewayBridge, GatewayConfig, RateQuery, TerminalBridge, TerminalError, TerminalFetcher,
    TerminalHandle, TerminalRate,
};
