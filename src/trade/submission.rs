//! 下单流程
//! 校验 → 检查API配置 → 获取报价 → 市价下单 → 无论成败都写交易日志

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::envelope::ResultEnvelope;
use crate::core::error::{CockpitError, ExchangeError};
use crate::core::exchange::Exchange;
use crate::core::types::{
    PlacedOrder, TradeLogEntry, TradeOrderRequest, TradeStatus, MAX_LEVERAGE, MIN_LEVERAGE,
};
use crate::trade::log_store::{TradeLogInput, TradeLogStore};

/// 一次交易尝试的完整结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub status: String,
    pub order: Option<PlacedOrder>,
    pub entry_price: Decimal,
    pub error_message: Option<String>,
    /// 已写入的交易日志
    pub log_entry: Option<TradeLogEntry>,
    /// 写日志本身失败时的原因，与交易结果分开汇报
    pub log_error: Option<String>,
}

/// 下单前校验
///
/// 交易开关关闭、交易对为空、数量不为正、杠杆超出 `[1, 40]` 都视为校验失败。
pub fn validate_request(
    request: &TradeOrderRequest,
    trade_switch_enabled: bool,
) -> Result<(), CockpitError> {
    if !trade_switch_enabled {
        return Err(CockpitError::validation("tradeSwitchEnabled", "交易开关已关闭"));
    }
    if request.symbol.trim().is_empty() {
        return Err(CockpitError::validation("symbol", "交易对不能为空"));
    }
    if !request.is_submittable() {
        return Err(CockpitError::validation("size", "下单数量必须大于0"));
    }
    if request.leverage < MIN_LEVERAGE || request.leverage > MAX_LEVERAGE {
        return Err(CockpitError::validation(
            "leverage",
            format!(
                "杠杆必须在 {} 到 {} 之间，当前为 {}",
                MIN_LEVERAGE, MAX_LEVERAGE, request.leverage
            ),
        ));
    }
    Ok(())
}

/// 交易提交流水线
pub struct TradeSubmissionPipeline {
    exchange: Arc<dyn Exchange>,
    log_store: Arc<TradeLogStore>,
    trade_switch_enabled: bool,
}

impl TradeSubmissionPipeline {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        log_store: Arc<TradeLogStore>,
        trade_switch_enabled: bool,
    ) -> Self {
        Self {
            exchange,
            log_store,
            trade_switch_enabled,
        }
    }

    /// 执行一次交易尝试，交易结果与日志写入结果都放进返回的信封
    pub async fn submit(&self, request: TradeOrderRequest) -> ResultEnvelope<SubmissionReport> {
        log::info!(
            "📝 提交订单: {} {} 数量 {} 杠杆 {}x{}",
            request.symbol,
            request.direction,
            request.size,
            request.leverage,
            request
                .template
                .as_deref()
                .map(|t| format!(" 模板 {}", t))
                .unwrap_or_default()
        );

        let (outcome, entry_price) = self.execute(&request).await;

        let (status, order, error) = match outcome {
            Ok(order) => (TradeStatus::Success, Some(order), None),
            Err(err) => (TradeStatus::Failed, None, Some(err)),
        };
        let error_message = error.as_ref().map(CockpitError::reason);

        let log_input = TradeLogInput::new(
            request.symbol.clone(),
            request.direction.as_str(),
            request.size,
            entry_price,
            status.as_str(),
        )
        .with_order_id(order.as_ref().map(|o| o.order_id.clone()))
        .with_error_message(error_message.clone());

        let (log_entry, log_error) = match self.log_store.try_create(log_input).await {
            Ok(entry) => (Some(entry), None),
            Err(e) => {
                log::error!("❌ 交易日志写入失败（不影响交易结果）: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let report = SubmissionReport {
            status: status.as_str().to_string(),
            order,
            entry_price,
            error_message,
            log_entry,
            log_error,
        };

        match error {
            None => {
                log::info!(
                    "✅ 下单成功: {} 订单号 {}",
                    request.symbol,
                    report
                        .order
                        .as_ref()
                        .map(|o| o.order_id.as_str())
                        .unwrap_or_default()
                );
                ResultEnvelope::success("下单成功", report)
            }
            Some(err) => {
                log::warn!("⚠️ 下单失败: {} - {}", request.symbol, err);
                ResultEnvelope::failure_with_data(
                    err.user_message(),
                    format!("{}: {}", err.kind().as_str(), err.reason()),
                    report,
                )
            }
        }
    }

    /// 返回下单结果与用于记录的成交价
    async fn execute(
        &self,
        request: &TradeOrderRequest,
    ) -> (Result<PlacedOrder, CockpitError>, Decimal) {
        if let Err(e) = validate_request(request, self.trade_switch_enabled) {
            return (Err(e), Decimal::ZERO);
        }

        if !self.exchange.check_api_config().await {
            let err = ExchangeError::AuthError("交易所API配置未就绪".to_string());
            return (Err(err.into()), Decimal::ZERO);
        }

        // 报价只用于记录成交价，失败不阻止下单
        let quoted = match self.exchange.fetch_current_price(&request.symbol).await {
            Ok(quote) => quote.price,
            Err(e) => {
                log::warn!("⚠️ 获取 {} 报价失败: {}", request.symbol, e);
                Decimal::ZERO
            }
        };

        match self.exchange.place_market_order(request).await {
            Ok(order) => {
                let price = order.avg_price.unwrap_or(quoted);
                (Ok(order), price)
            }
            Err(e) => (Err(e.into()), quoted),
        }
    }
}
