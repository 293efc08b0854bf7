//! 下单风险估算
//! 根据数量、杠杆、价格与方向估算所需保证金和强平价格

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::types::Direction;

/// 强平估算中的维持系数（简化模型，并非交易所精确算法）
const LIQUIDATION_FACTOR: Decimal = dec!(0.9);

/// 风险估算结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskEstimate {
    pub required_margin: Decimal,
    pub liquidation_price: Decimal,
    pub valid: bool,
}

impl RiskEstimate {
    pub fn invalid() -> Self {
        Self {
            required_margin: Decimal::ZERO,
            liquidation_price: Decimal::ZERO,
            valid: false,
        }
    }
}

/// 纯函数风险计算器
pub struct RiskCalculator;

impl RiskCalculator {
    /// 计算所需保证金与强平价格
    ///
    /// `size`、`leverage`、`price` 任一不为正时返回 `valid=false`。
    /// 强平价格仅为估算值：`offset = price * (1 - 0.9 / leverage)`，
    /// 多头 `price - offset`，空头 `price + offset`。
    pub fn compute(
        size: Decimal,
        leverage: Decimal,
        price: Decimal,
        direction: Direction,
    ) -> RiskEstimate {
        if size <= Decimal::ZERO || leverage <= Decimal::ZERO || price <= Decimal::ZERO {
            return RiskEstimate::invalid();
        }

        let (Some(notional), Some(inverse_leverage)) =
            (size.checked_mul(price), Decimal::ONE.checked_div(leverage))
        else {
            return RiskEstimate::invalid();
        };
        let Some(required_margin) = notional.checked_div(leverage) else {
            return RiskEstimate::invalid();
        };

        // 极端价格下任何一步溢出都视为无效输入
        let offset = inverse_leverage
            .checked_mul(LIQUIDATION_FACTOR)
            .and_then(|scaled| Decimal::ONE.checked_sub(scaled))
            .and_then(|ratio| price.checked_mul(ratio));
        let liquidation_price = offset.and_then(|offset| match direction {
            Direction::Long => price.checked_sub(offset),
            Direction::Short => price.checked_add(offset),
        });
        let Some(liquidation_price) = liquidation_price else {
            return RiskEstimate::invalid();
        };

        RiskEstimate {
            required_margin,
            liquidation_price,
            valid: true,
        }
    }
}

/// 风险输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    pub size: Decimal,
    pub leverage: Decimal,
    pub price: Decimal,
    pub direction: Direction,
}

/// 保留最近一次有效估算
///
/// 输入无效时不会把已有的有效估算清零。
#[derive(Debug, Clone, Default)]
pub struct RiskTracker {
    last_valid: Option<RiskEstimate>,
    last_inputs: Option<RiskInputs>,
}

impl RiskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 输入变化时重算，返回本次计算结果
    pub fn update(&mut self, inputs: RiskInputs) -> RiskEstimate {
        let estimate =
            RiskCalculator::compute(inputs.size, inputs.leverage, inputs.price, inputs.direction);
        if estimate.valid {
            self.last_valid = Some(estimate);
            self.last_inputs = Some(inputs);
        } else {
            log::debug!("风险输入无效，保留上次估算: {:?}", inputs);
        }
        estimate
    }

    /// 当前展示的估算
    pub fn current(&self) -> Option<RiskEstimate> {
        self.last_valid
    }

    pub fn last_inputs(&self) -> Option<RiskInputs> {
        self.last_inputs
    }
}
