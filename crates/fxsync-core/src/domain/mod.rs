//! 도메인 타입.

mod candle;
mod pair;
mod timeframe;
mod window;
mod work_unit;

pub use candle::{Candle, CandleKey, RawCandle};
pub use pair::{default_pairs, to_terminal_symbol, CurrencyPair};
pub use timeframe::Timeframe;
pub use window::FetchWindow;
pub use work_unit::{build_work_units, WorkUnit};
