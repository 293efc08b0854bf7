// 核心模块 - 只包含核心业务逻辑
pub mod config;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod risk;
pub mod types;

pub use config::*;
pub use envelope::ResultEnvelope;
pub use error::*;
pub use exchange::{Exchange, PredictionSource};
pub use risk::{RiskCalculator, RiskEstimate, RiskInputs, RiskTracker};
pub use types::{
    AccountInfo, Direction, PlacedOrder, Position, Prediction, Quote, Result, TradeLogEntry,
    TradeOrderRequest, TradeStatus,
};
