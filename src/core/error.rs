use thiserror::Error;

/// 交易所协作方错误
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("认证错误: {0}")]
    AuthError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("{0}")]
    OrderRejected(String),

    #[error("交易对未找到: {0}")]
    SymbolNotFound(String),

    #[error("数据解析错误: {0}")]
    ParseError(String),

    #[error("超时错误: 操作 '{operation}' 超时 ({timeout_seconds}秒)")]
    TimeoutError {
        operation: String,
        timeout_seconds: u64,
    },

    #[error("不支持的功能: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// 判断错误是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::TimeoutError { .. } => true,
            ExchangeError::ApiError { code, .. } => *code >= 500 && *code < 600,
            _ => false,
        }
    }

    /// 获取用户友好的错误描述
    pub fn user_friendly_message(&self) -> String {
        match self {
            ExchangeError::NetworkError(_) => "网络连接问题，请检查网络状态".to_string(),
            ExchangeError::AuthError(_) => "API认证失败，请检查钱包配置".to_string(),
            ExchangeError::SymbolNotFound(symbol) => {
                format!("交易对{}不存在或未开放交易", symbol)
            }
            // 交易所拒单原因原样透出，日志与界面需要看到真实原因
            ExchangeError::OrderRejected(reason) => reason.clone(),
            _ => self.to_string(),
        }
    }
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Persistence,
    Exchange,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Persistence => "PersistenceError",
            ErrorKind::Exchange => "ExchangeError",
            ErrorKind::Unknown => "UnknownError",
        }
    }
}

/// 驾驶舱核心错误
///
/// 所有面向调用方的操作都不会直接抛出该错误，而是折叠进 [`ResultEnvelope`](crate::core::envelope::ResultEnvelope)。
#[derive(Error, Debug)]
pub enum CockpitError {
    /// 参数缺失或格式错误，在任何外部调用之前发现
    #[error("参数验证错误: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// 持久化层的已知错误，携带引擎错误码
    #[error("持久化错误 [{code}]: {message}")]
    Persistence { code: String, message: String },

    #[error("交易所错误: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl CockpitError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CockpitError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CockpitError::Validation { .. } => ErrorKind::Validation,
            CockpitError::Persistence { .. } => ErrorKind::Persistence,
            CockpitError::Exchange(_) => ErrorKind::Exchange,
            CockpitError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// 面向用户的说明，不包含引擎内部细节
    pub fn user_message(&self) -> String {
        match self {
            CockpitError::Validation { reason, .. } => reason.clone(),
            CockpitError::Persistence { .. } => "交易日志保存失败，请稍后重试".to_string(),
            CockpitError::Exchange(e) => e.user_friendly_message(),
            CockpitError::Unknown(msg) => msg.clone(),
        }
    }

    /// 写入交易日志 errorMessage 字段的原因文本
    pub fn reason(&self) -> String {
        match self {
            CockpitError::Validation { reason, .. } => reason.clone(),
            CockpitError::Persistence { message, .. } => message.clone(),
            CockpitError::Exchange(e) => e.user_friendly_message(),
            CockpitError::Unknown(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let err = CockpitError::validation("size", "数量必须大于0");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.reason(), "数量必须大于0");

        let err = CockpitError::from(ExchangeError::OrderRejected("insufficient margin".into()));
        assert_eq!(err.kind(), ErrorKind::Exchange);
        assert_eq!(err.reason(), "insufficient margin");
    }

    #[test]
    fn test_persistence_message_hides_engine_code() {
        let err = CockpitError::Persistence {
            code: "SQLITE_2067".to_string(),
            message: "UNIQUE constraint failed".to_string(),
        };
        assert!(!err.user_message().contains("SQLITE"));
        assert!(err.to_string().contains("SQLITE_2067"));
    }

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::ApiError {
            code: 502,
            message: "bad gateway".into()
        }
        .is_retryable());
        assert!(!ExchangeError::OrderRejected("no".into()).is_retryable());
    }
}
