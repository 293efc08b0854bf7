// 工具模块 - 日志与告警
pub mod logger;
pub mod webhook;

pub use logger::init_logger;
pub use webhook::{build_alert_sink, AlertSink, LogAlertSink, WebhookConfig, WebhookNotifier};
