// 交易所与数据源实现
pub mod hyperliquid;
pub mod paper;
pub mod predictions;

pub use hyperliquid::HyperliquidExchange;
pub use paper::PaperExchange;
pub use predictions::HttpPredictionSource;

use std::sync::Arc;

use crate::core::config::ExchangeConfig;
use crate::core::exchange::Exchange;
use crate::core::types::Result;

/// 按配置构建交易所：模拟模式下用 PaperExchange 包装只读客户端
pub fn build_exchange(config: &ExchangeConfig) -> Result<Arc<dyn Exchange>> {
    let live: Arc<dyn Exchange> = Arc::new(HyperliquidExchange::new(config)?);
    if config.paper_trading {
        log::info!("🧪 模拟交易模式已启用");
        Ok(Arc::new(PaperExchange::new(live)))
    } else {
        Ok(live)
    }
}
