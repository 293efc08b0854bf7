//! 交易日志存储
//! 校验、规整并持久化每一次交易尝试，按时间倒序列出

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::envelope::ResultEnvelope;
use crate::core::error::CockpitError;
use crate::core::types::TradeLogEntry;
use crate::trade::repository::{NewTradeLogRecord, RepositoryError, TradeLogRepository};

/// 默认列表条数
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// 写入请求，字段保持宽松类型以便在存储层统一校验
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLogInput {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub entry_price: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hyperliquid_order_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TradeLogInput {
    pub fn new(
        symbol: impl Into<String>,
        direction: impl Into<String>,
        size: Decimal,
        entry_price: Decimal,
        status: impl Into<String>,
    ) -> Self {
        Self {
            symbol: Some(symbol.into()),
            direction: Some(direction.into()),
            size: Some(Value::String(size.to_string())),
            entry_price: Some(Value::String(entry_price.to_string())),
            status: Some(status.into()),
            hyperliquid_order_id: None,
            error_message: None,
        }
    }

    pub fn with_order_id(mut self, order_id: Option<String>) -> Self {
        self.hyperliquid_order_id = order_id;
        self
    }

    pub fn with_error_message(mut self, error_message: Option<String>) -> Self {
        self.error_message = error_message;
        self
    }

    /// 校验必填字段与数值类型，并把可选字段规整为 None
    pub fn validate(self) -> Result<NewTradeLogRecord, CockpitError> {
        let symbol = required_text("symbol", self.symbol)?;
        let direction = required_text("direction", self.direction)?;
        let status = required_text("status", self.status)?;

        let size = match self.size {
            Some(value) => parse_numeric("size", &value)?,
            None => return Err(CockpitError::validation("size", "size 必须是数值")),
        };
        // 执行前就失败的尝试没有成交价，允许缺省为0，只校验类型不校验正负
        let entry_price = match self.entry_price {
            None | Some(Value::Null) => Decimal::ZERO,
            Some(value) => parse_numeric("entryPrice", &value)?,
        };

        Ok(NewTradeLogRecord {
            symbol,
            direction,
            size,
            entry_price,
            status,
            hyperliquid_order_id: normalize_optional(self.hyperliquid_order_id),
            error_message: normalize_optional(self.error_message),
        })
    }
}

fn required_text(field: &str, value: Option<String>) -> Result<String, CockpitError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(CockpitError::validation(
            field,
            format!("{} 不能为空", field),
        )),
    }
}

fn parse_numeric(field: &str, value: &Value) -> Result<Decimal, CockpitError> {
    let parsed = match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CockpitError::validation(field, format!("{} 必须是数值", field)))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 非正整数的条数一律按默认值处理
pub fn normalize_limit(limit: Option<f64>) -> usize {
    match limit {
        Some(n) if n.is_finite() && n >= 1.0 && n.fract() == 0.0 && n <= usize::MAX as f64 => {
            n as usize
        }
        _ => DEFAULT_LIST_LIMIT,
    }
}

/// 交易日志存储服务，所有操作都返回结果信封
pub struct TradeLogStore {
    repository: Arc<dyn TradeLogRepository>,
}

impl TradeLogStore {
    pub fn new(repository: Arc<dyn TradeLogRepository>) -> Self {
        Self { repository }
    }

    /// 校验并写入，失败时返回分类后的错误
    pub async fn try_create(&self, input: TradeLogInput) -> Result<TradeLogEntry, CockpitError> {
        let record = input.validate()?;
        self.repository
            .insert(record)
            .await
            .map_err(map_repository_error)
    }

    pub async fn create(&self, input: TradeLogInput) -> ResultEnvelope<TradeLogEntry> {
        match self.try_create(input).await {
            Ok(entry) => {
                log::debug!("交易日志已保存: {} {}", entry.id, entry.status);
                ResultEnvelope::success("交易日志已保存", entry)
            }
            Err(e) => {
                log::error!("❌ 保存交易日志失败: {}", e);
                ResultEnvelope::from_error(&e)
            }
        }
    }

    /// 按时间倒序列出最近的记录
    pub async fn list(&self, limit: Option<f64>) -> ResultEnvelope<Vec<TradeLogEntry>> {
        let limit = normalize_limit(limit);
        match self.repository.list_recent(limit).await {
            Ok(entries) => {
                ResultEnvelope::success(format!("共 {} 条交易日志", entries.len()), entries)
            }
            Err(e) => {
                let err = map_repository_error(e);
                log::error!("❌ 读取交易日志失败: {}", err);
                ResultEnvelope::from_error(&err)
            }
        }
    }
}

fn map_repository_error(err: RepositoryError) -> CockpitError {
    match err {
        RepositoryError::Known { code, message } => CockpitError::Persistence { code, message },
        RepositoryError::Other(message) => CockpitError::Unknown(message),
    }
}
