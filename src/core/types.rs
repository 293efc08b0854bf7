use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 驾驶舱核心流程共享的数据结构
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ExchangeError;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// 开仓方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// 是否为买入方向
    pub fn is_buy(&self) -> bool {
        matches!(self, Direction::Long)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Direction::Long),
            "SHORT" | "SELL" => Ok(Direction::Short),
            other => Err(format!("无效的方向: {}", other)),
        }
    }
}

// ============= 账户与行情 =============

/// 账户概览（对应 clearinghouseState.marginSummary）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub account_value: Decimal,
    pub total_margin_used: Decimal,
    pub total_notional_position: Decimal,
    pub withdrawable: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// 永续合约持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    /// 带符号的持仓数量，负数表示空头
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
    pub position_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub margin_used: Decimal,
}

impl Position {
    pub fn direction(&self) -> Direction {
        if self.size.is_sign_negative() {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

/// 最新报价
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// 行情预测条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub symbol: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ============= 下单相关 =============

/// 杠杆下限
pub const MIN_LEVERAGE: Decimal = Decimal::ONE;
/// 杠杆上限
pub const MAX_LEVERAGE: Decimal = Decimal::from_parts(40, 0, 0, false, 0);

/// 市价下单请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub size: Decimal,
    pub leverage: Decimal,
    #[serde(default)]
    pub template: Option<String>,
}

impl TradeOrderRequest {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        size: Decimal,
        leverage: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            size,
            leverage,
            template: None,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// 提交按钮是否可用：只取决于数量是否为正
    pub fn is_submittable(&self) -> bool {
        self.size > Decimal::ZERO
    }
}

/// 交易所返回的下单结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: String,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
}

// ============= 交易日志 =============

/// 交易尝试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Success,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Success => "SUCCESS",
            TradeStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已持久化的交易日志（id 与 timestamp 由持久化层生成）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub direction: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub status: String,
    pub hyperliquid_order_id: Option<String>,
    pub error_message: Option<String>,
}
