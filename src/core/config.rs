use crate::core::error::ExchangeError;
use crate::utils::webhook::WebhookConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// ============= 用户设置 =============

pub const KEY_PREDICTION_REFRESH_INTERVAL: &str = "predictionRefreshInterval";
pub const KEY_ACCOUNT_REFRESH_INTERVAL: &str = "accountRefreshInterval";
pub const KEY_ALERTS_ENABLED: &str = "alertsEnabled";
pub const KEY_TRADE_SWITCH_ENABLED: &str = "tradeSwitchEnabled";

pub const DEFAULT_PREDICTION_REFRESH_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_ACCOUNT_REFRESH_INTERVAL_MS: u64 = 30_000;

/// 键值设置存储，值统一以字符串保存
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), ExchangeError>;
}

/// 内存设置存储
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ExchangeError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| ExchangeError::ConfigError("设置存储锁已损坏".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 基于YAML文件的设置存储，每次显式修改都会整体回写
pub struct YamlSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl YamlSettingsStore {
    /// 打开设置文件，文件不存在时视为空存储
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExchangeError> {
        let path = path.as_ref().to_path_buf();
        let mut values = BTreeMap::new();

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| ExchangeError::ConfigError(format!("读取设置文件失败: {}", e)))?;
            if !contents.trim().is_empty() {
                let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&contents)
                    .map_err(|e| ExchangeError::ConfigError(format!("解析设置文件失败: {}", e)))?;
                for (key, value) in raw {
                    if let Some(text) = yaml_scalar_to_string(&value) {
                        values.insert(key, text);
                    }
                }
            }
        }

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), ExchangeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ExchangeError::ConfigError(format!("创建设置目录失败: {}", e))
                })?;
            }
        }
        let text = serde_yaml::to_string(values)
            .map_err(|e| ExchangeError::ConfigError(format!("序列化设置失败: {}", e)))?;
        fs::write(&self.path, text)
            .map_err(|e| ExchangeError::ConfigError(format!("写入设置文件失败: {}", e)))
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SettingsStore for YamlSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ExchangeError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| ExchangeError::ConfigError("设置存储锁已损坏".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

/// 驾驶舱用户设置
///
/// 会话开始时读取一次，之后只在用户显式修改时回写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CockpitSettings {
    #[serde(rename = "predictionRefreshInterval")]
    pub prediction_refresh_interval_ms: u64,
    #[serde(rename = "accountRefreshInterval")]
    pub account_refresh_interval_ms: u64,
    pub alerts_enabled: bool,
    pub trade_switch_enabled: bool,
}

impl Default for CockpitSettings {
    fn default() -> Self {
        Self {
            prediction_refresh_interval_ms: DEFAULT_PREDICTION_REFRESH_INTERVAL_MS,
            account_refresh_interval_ms: DEFAULT_ACCOUNT_REFRESH_INTERVAL_MS,
            alerts_enabled: true,
            trade_switch_enabled: true,
        }
    }
}

impl CockpitSettings {
    /// 从存储读取，缺失或无法解析的值回落到默认值
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            prediction_refresh_interval_ms: read_interval(
                store,
                KEY_PREDICTION_REFRESH_INTERVAL,
                defaults.prediction_refresh_interval_ms,
            ),
            account_refresh_interval_ms: read_interval(
                store,
                KEY_ACCOUNT_REFRESH_INTERVAL,
                defaults.account_refresh_interval_ms,
            ),
            alerts_enabled: read_bool(store, KEY_ALERTS_ENABLED, defaults.alerts_enabled),
            trade_switch_enabled: read_bool(
                store,
                KEY_TRADE_SWITCH_ENABLED,
                defaults.trade_switch_enabled,
            ),
        }
    }

    /// 修改单个设置并写回存储
    pub fn update(
        &mut self,
        store: &dyn SettingsStore,
        key: &str,
        value: &str,
    ) -> Result<(), ExchangeError> {
        match key {
            KEY_PREDICTION_REFRESH_INTERVAL => {
                self.prediction_refresh_interval_ms = parse_interval(key, value)?;
            }
            KEY_ACCOUNT_REFRESH_INTERVAL => {
                self.account_refresh_interval_ms = parse_interval(key, value)?;
            }
            KEY_ALERTS_ENABLED => self.alerts_enabled = parse_bool(key, value)?,
            KEY_TRADE_SWITCH_ENABLED => self.trade_switch_enabled = parse_bool(key, value)?,
            _ => {
                return Err(ExchangeError::ConfigError(format!("未知设置项: {}", key)));
            }
        }
        store.set(key, value.trim())?;
        log::info!("⚙️ 设置已更新: {} = {}", key, value.trim());
        Ok(())
    }
}

fn read_interval(store: &dyn SettingsStore, key: &str, default: u64) -> u64 {
    match store.get(key) {
        Some(raw) => parse_interval(key, &raw).unwrap_or_else(|e| {
            log::warn!("⚠️ {}，使用默认值 {}ms", e, default);
            default
        }),
        None => default,
    }
}

fn read_bool(store: &dyn SettingsStore, key: &str, default: bool) -> bool {
    match store.get(key) {
        Some(raw) => parse_bool(key, &raw).unwrap_or_else(|e| {
            log::warn!("⚠️ {}，使用默认值 {}", e, default);
            default
        }),
        None => default,
    }
}

fn parse_interval(key: &str, raw: &str) -> Result<u64, ExchangeError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ExchangeError::ConfigError(format!(
            "设置项 {} 的值无效: {}",
            key, raw
        ))),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ExchangeError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ExchangeError::ConfigError(format!(
            "设置项 {} 的值无效: {}",
            key, raw
        ))),
    }
}

// ============= 应用配置 =============

/// 交易所连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default)]
    pub testnet: bool,
    /// 覆盖默认的API地址
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// 模拟成交，不向交易所发送订单
    #[serde(default = "default_true")]
    pub paper_trading: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            base_url: None,
            wallet_address: None,
            paper_trading: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// 全局配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub predictions_url: Option<String>,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    #[serde(default = "default_symbol")]
    pub default_symbol: String,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            predictions_url: None,
            database_path: default_database_path(),
            settings_path: default_settings_path(),
            default_symbol: default_symbol(),
            log: LogConfig::default(),
            webhook: None,
        }
    }
}

impl AppConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self, ExchangeError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ExchangeError> {
        serde_yaml::from_str(contents)
            .map_err(|e| ExchangeError::ConfigError(format!("解析配置文件失败: {}", e)))
    }

    /// 加载配置并合并环境变量；文件不存在时使用默认配置
    pub fn load(path: &str) -> Result<Self, ExchangeError> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            log::warn!("⚠️ 配置文件 {} 不存在，使用默认配置", path);
            Self::default()
        };

        if config.exchange.wallet_address.is_none() {
            config.exchange.wallet_address = std::env::var("HYPERLIQUID_WALLET_ADDRESS").ok();
        }
        if config.predictions_url.is_none() {
            config.predictions_url = std::env::var("PREDICTIONS_URL").ok();
        }

        Ok(config)
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_database_path() -> String {
    "data/trade_logs.db".to_string()
}

fn default_settings_path() -> String {
    "config/settings.yml".to_string()
}

fn default_symbol() -> String {
    "BTC-PERP".to_string()
}
