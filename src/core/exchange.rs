use crate::core::types::{
    AccountInfo, PlacedOrder, Position, Prediction, Quote, Result, TradeOrderRequest,
};
use async_trait::async_trait;

/// 交易所协作方接口
///
/// 驾驶舱只依赖这几项能力，撮合与执行逻辑在交易所一侧。
#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取交易所名称
    fn name(&self) -> &str;

    /// 获取账户概览
    async fn fetch_account_info(&self) -> Result<AccountInfo>;

    /// 获取当前持仓
    async fn fetch_positions(&self) -> Result<Vec<Position>>;

    /// 获取最新报价
    async fn fetch_current_price(&self, symbol: &str) -> Result<Quote>;

    /// 检查下单所需的API配置是否就绪
    async fn check_api_config(&self) -> bool;

    /// 市价下单，被拒单时返回交易所错误
    async fn place_market_order(&self, request: &TradeOrderRequest) -> Result<PlacedOrder>;
}

/// 行情预测数据源
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>>;
}
