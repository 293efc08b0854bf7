//! 日志初始化
//! 基于 env_logger，RUST_LOG 优先，其次使用配置中的级别

use chrono::Local;
use std::io::Write;

use crate::core::config::LogConfig;

/// 将配置中的级别名（INFO / warning 等）规范为 env_logger 过滤串
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// 初始化全局日志，重复调用时保留第一次的设置
pub fn init_logger(config: &LogConfig) {
    let filter = normalize_level(&config.level);
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if result.is_err() {
        log::debug!("日志系统已初始化，忽略重复初始化");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("INFO"), "info");
        assert_eq!(normalize_level("Warning"), "warn");
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("verbose"), "info");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        init_logger(&config);
        init_logger(&config);
    }
}
