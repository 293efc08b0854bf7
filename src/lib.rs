pub mod core;
pub mod exchanges;
pub mod sync;
pub mod trade;
pub mod utils;

// 选择性导出，避免命名冲突
pub use crate::core::{
    config::*, envelope::ResultEnvelope, error::*, exchange::*, risk::*, types::*,
};
pub use crate::exchanges::{
    build_exchange, HttpPredictionSource, HyperliquidExchange, PaperExchange,
};
pub use crate::sync::{CockpitSession, ConnectionStatus, InitialAggregator, PeriodicFetcher};
pub use crate::trade::{TradeLogStore, TradeSubmissionPipeline};
