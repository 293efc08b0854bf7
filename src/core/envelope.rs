//! 结果信封
//! 核心流程与调用方（CLI、界面层）之间唯一的返回契约

use serde::{Deserialize, Serialize};

use crate::core::error::CockpitError;

/// `{isSuccess, message, data?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope<T> {
    pub is_success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            data: None,
            error: Some(error.into()),
        }
    }

    /// 失败但仍附带数据（例如交易失败时返回已写入的日志）
    pub fn failure_with_data(
        message: impl Into<String>,
        error: impl Into<String>,
        data: T,
    ) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            data: Some(data),
            error: Some(error.into()),
        }
    }

    pub fn from_error(err: &CockpitError) -> Self {
        Self::failure(err.user_message(), format!("{}: {}", err.kind().as_str(), err))
    }

    /// 提取可读的错误说明：优先显式的 error，其次 message
    pub fn error_text(&self) -> Option<String> {
        if self.is_success {
            return None;
        }
        self.error
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| Some(self.message.as_str()).filter(|m| !m.trim().is_empty()))
            .map(str::to_string)
    }

    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        if self.is_success {
            Ok(self.data)
        } else {
            Err(self.error_text().unwrap_or_else(|| "未知错误".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_camel_case() {
        let env = ResultEnvelope::success("ok", 3);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["isSuccess"], true);
        assert_eq!(json["data"], 3);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_text_prefers_explicit_error() {
        let env: ResultEnvelope<()> = ResultEnvelope::failure("保存失败", "disk full");
        assert_eq!(env.error_text().as_deref(), Some("disk full"));

        let env: ResultEnvelope<()> = ResultEnvelope {
            is_success: false,
            message: "保存失败".to_string(),
            data: None,
            error: Some("  ".to_string()),
        };
        assert_eq!(env.error_text().as_deref(), Some("保存失败"));
    }

    #[test]
    fn test_from_error_carries_kind() {
        let err = CockpitError::validation("symbol", "交易对不能为空");
        let env: ResultEnvelope<()> = ResultEnvelope::from_error(&err);
        assert!(!env.is_success);
        assert_eq!(env.message, "交易对不能为空");
        assert!(env.error.unwrap().starts_with("ValidationError"));
    }
}
