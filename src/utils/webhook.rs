//! Webhook通知模块
//! 连接中断时推送告警到企业微信等平台

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Webhook配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// webhook地址
    pub url: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最小推送级别
    #[serde(default = "default_min_level")]
    pub min_level: String,
    /// 推送间隔限制（秒）
    #[serde(default = "default_rate_limit")]
    pub rate_limit_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_min_level() -> String {
    "warning".to_string()
}

fn default_rate_limit() -> u64 {
    300
}

/// 消息级别
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl MessageLevel {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "info" => Self::Info,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Info,
        }
    }

    pub fn emoji(&self) -> &str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// 告警出口
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 某个数据源进入 error 状态
    async fn connectivity_lost(&self, feed: &str, error: &str);
}

/// 只写日志的告警出口
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn connectivity_lost(&self, feed: &str, error: &str) {
        log::error!("🚨 [{}] 连接中断: {}", feed, error);
    }
}

/// 企业微信消息格式
#[derive(Debug, Serialize)]
struct WeChatWorkMessage {
    msgtype: String,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    content: String,
}

/// 单次推送的超时时间（秒）
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Webhook通知器
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: Client,
    /// 上次发送时间记录（用于限流）
    last_send_times: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl WebhookNotifier {
    /// 创建新的通知器
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|e| {
                    warn!("创建Webhook客户端失败，使用默认客户端: {}", e);
                    Client::new()
                }),
            last_send_times: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 发送通用事件通知
    pub async fn send_event(
        &self,
        feed: &str,
        title: &str,
        body: &str,
        level: MessageLevel,
    ) -> Result<(), reqwest::Error> {
        if !self.config.enabled {
            return Ok(());
        }

        let min_level = MessageLevel::parse(&self.config.min_level);
        if level < min_level {
            return Ok(());
        }

        let key = format!("{}::{}", feed, title);
        if !self.check_rate_limit(&key).await {
            debug!("跳过推送，限流中: {}", key);
            return Ok(());
        }

        let content = build_event_message(feed, title, body, &level, Utc::now());
        self.send_markdown(content).await
    }

    /// 检查限流
    async fn check_rate_limit(&self, key: &str) -> bool {
        let mut times = self.last_send_times.write().await;
        let now = Utc::now();

        if let Some(last_time) = times.get(key) {
            let elapsed = now.signed_duration_since(*last_time);
            if elapsed < Duration::seconds(self.config.rate_limit_seconds as i64) {
                return false;
            }
        }

        times.insert(key.to_string(), now);
        true
    }

    async fn send_markdown(&self, content: String) -> Result<(), reqwest::Error> {
        let message = WeChatWorkMessage {
            msgtype: "markdown".to_string(),
            markdown: MarkdownContent { content },
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&message)
            .send()
            .await?;

        if response.status().is_success() {
            info!("成功发送Webhook通知");
        } else {
            warn!("Webhook发送失败: {}", response.status());
        }

        Ok(())
    }
}

#[async_trait]
impl AlertSink for WebhookNotifier {
    async fn connectivity_lost(&self, feed: &str, error: &str) {
        log::error!("🚨 [{}] 连接中断: {}", feed, error);
        let body = format!("```\n{}\n```", error);
        if let Err(e) = self
            .send_event(feed, "连接中断", &body, MessageLevel::Error)
            .await
        {
            warn!("Webhook发送失败: {}", e);
        }
    }
}

fn build_event_message(
    feed: &str,
    title: &str,
    body: &str,
    level: &MessageLevel,
    now: DateTime<Utc>,
) -> String {
    format!(
        r#"## {} {}

**数据源**: {}
**级别**: {:?}
**时间**: {}

{}"#,
        level.emoji(),
        title,
        feed,
        level,
        now.format("%Y-%m-%d %H:%M:%S UTC"),
        body
    )
}

/// 根据设置构建告警出口；告警关闭时返回 None
pub fn build_alert_sink(
    alerts_enabled: bool,
    webhook: Option<&WebhookConfig>,
) -> Option<Arc<dyn AlertSink>> {
    if !alerts_enabled {
        return None;
    }
    match webhook {
        Some(config) if config.enabled && !config.url.is_empty() => {
            Some(Arc::new(WebhookNotifier::new(config.clone())))
        }
        _ => Some(Arc::new(LogAlertSink)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WebhookConfig {
        WebhookConfig {
            url: "http://127.0.0.1:9/hook".to_string(),
            enabled: true,
            min_level: "warning".to_string(),
            rate_limit_seconds: 60,
        }
    }

    #[test]
    fn test_alerts_disabled_yields_no_sink() {
        assert!(build_alert_sink(false, Some(&config())).is_none());
        assert!(build_alert_sink(true, None).is_some());
        assert!(build_alert_sink(true, Some(&config())).is_some());
    }

    #[test]
    fn test_level_ordering() {
        assert!(MessageLevel::parse("error") > MessageLevel::parse("warn"));
        assert_eq!(MessageLevel::parse("whatever"), MessageLevel::Info);
    }

    #[test]
    fn test_message_format() {
        let msg = build_event_message(
            "positions",
            "连接中断",
            "timeout",
            &MessageLevel::Error,
            Utc::now(),
        );
        assert!(msg.contains("**数据源**: positions"));
        assert!(msg.starts_with("## ❌ 连接中断"));
    }

    #[tokio::test]
    async fn test_rate_limit_per_key() {
        let notifier = WebhookNotifier::new(config());
        assert!(notifier.check_rate_limit("account::连接中断").await);
        assert!(!notifier.check_rate_limit("account::连接中断").await);
        assert!(notifier.check_rate_limit("positions::连接中断").await);
    }

    #[tokio::test]
    async fn test_below_min_level_is_not_sent() {
        let notifier = WebhookNotifier::new(config());
        // Info 低于 warning，不会发起网络请求
        notifier
            .send_event("account", "恢复", "ok", MessageLevel::Info)
            .await
            .unwrap();
        assert!(notifier.last_send_times.read().await.is_empty());
    }
}
