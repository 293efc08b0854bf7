use crate::core::config::ExchangeConfig;
use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const MAINNET_URL: &str = "https://api.hyperliquid.xyz";
const TESTNET_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Hyperliquid交易所实现（info接口，只读）
///
/// 下单需要钱包签名，本客户端不持有私钥，`place_market_order` 总是返回不支持。
pub struct HyperliquidExchange {
    client: Client,
    wallet_address: Option<String>,
    base_url: String,
}

impl HyperliquidExchange {
    /// 创建新的Hyperliquid交易所实例
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let base_url = match &config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if config.testnet => TESTNET_URL.to_string(),
            None => MAINNET_URL.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            wallet_address: config
                .wallet_address
                .clone()
                .filter(|addr| !addr.trim().is_empty()),
            base_url,
        })
    }

    fn wallet(&self) -> Result<&str> {
        self.wallet_address
            .as_deref()
            .ok_or_else(|| ExchangeError::ConfigError("未配置钱包地址".to_string()))
    }

    /// 发送info请求
    async fn info_request<T: for<'de> Deserialize<'de>>(
        &self,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/info", self.base_url);
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: error_text,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn clearinghouse_state(&self) -> Result<ClearinghouseState> {
        let user = self.wallet()?;
        self.info_request(serde_json::json!({
            "type": "clearinghouseState",
            "user": user,
        }))
        .await
    }
}

/// 标准格式 "BTC-PERP" / "BTC/USDC" 转换为Hyperliquid的币种名 "BTC"
pub fn to_hyperliquid_coin(symbol: &str) -> String {
    let symbol = symbol.trim().to_uppercase();
    symbol
        .trim_end_matches("-PERP")
        .trim_end_matches("/USDC")
        .trim_end_matches("/USDT")
        .to_string()
}

/// 币种名转换为驾驶舱使用的 "BTC-PERP"
pub fn from_hyperliquid_coin(coin: &str) -> String {
    format!("{}-PERP", coin)
}

// ============= info接口响应 =============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarginSummary {
    account_value: Decimal,
    total_ntl_pos: Decimal,
    total_margin_used: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearinghouseState {
    margin_summary: MarginSummary,
    #[serde(default)]
    withdrawable: Decimal,
    #[serde(default)]
    asset_positions: Vec<AssetPosition>,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AssetPosition {
    position: RawPosition,
}

#[derive(Debug, Deserialize)]
struct RawLeverage {
    value: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    coin: String,
    szi: Decimal,
    #[serde(default)]
    entry_px: Option<Decimal>,
    position_value: Decimal,
    unrealized_pnl: Decimal,
    #[serde(default)]
    leverage: Option<RawLeverage>,
    #[serde(default)]
    liquidation_px: Option<Decimal>,
    margin_used: Decimal,
}

impl ClearinghouseState {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now)
    }

    fn account_info(&self) -> AccountInfo {
        AccountInfo {
            account_value: self.margin_summary.account_value,
            total_margin_used: self.margin_summary.total_margin_used,
            total_notional_position: self.margin_summary.total_ntl_pos,
            withdrawable: self.withdrawable,
            timestamp: self.timestamp(),
        }
    }

    fn positions(self) -> Vec<Position> {
        self.asset_positions
            .into_iter()
            .map(|asset| asset.position)
            .filter(|p| !p.szi.is_zero())
            .map(|p| Position {
                symbol: from_hyperliquid_coin(&p.coin),
                size: p.szi,
                entry_price: p.entry_px,
                position_value: p.position_value,
                unrealized_pnl: p.unrealized_pnl,
                leverage: p.leverage.map(|l| l.value),
                liquidation_price: p.liquidation_px,
                margin_used: p.margin_used,
            })
            .collect()
    }
}

fn mid_price(mids: &HashMap<String, Decimal>, symbol: &str) -> Result<Quote> {
    let coin = to_hyperliquid_coin(symbol);
    let price = mids
        .get(&coin)
        .copied()
        .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;
    Ok(Quote {
        symbol: symbol.to_string(),
        price,
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl Exchange for HyperliquidExchange {
    fn name(&self) -> &str {
        "hyperliquid"
    }

    async fn fetch_account_info(&self) -> Result<AccountInfo> {
        let state = self.clearinghouse_state().await?;
        Ok(state.account_info())
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        let state = self.clearinghouse_state().await?;
        Ok(state.positions())
    }

    async fn fetch_current_price(&self, symbol: &str) -> Result<Quote> {
        let mids: HashMap<String, Decimal> = self
            .info_request(serde_json::json!({ "type": "allMids" }))
            .await?;
        mid_price(&mids, symbol)
    }

    async fn check_api_config(&self) -> bool {
        self.wallet_address.is_some()
    }

    async fn place_market_order(&self, request: &TradeOrderRequest) -> Result<PlacedOrder> {
        log::warn!(
            "⚠️ Hyperliquid客户端为只读模式，拒绝下单: {} {}",
            request.symbol,
            request.direction
        );
        Err(ExchangeError::NotSupported(
            "当前客户端为只读模式，下单需要签名钱包".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const STATE_JSON: &str = r#"{
        "marginSummary": {
            "accountValue": "1520.55",
            "totalNtlPos": "650.0",
            "totalRawUsd": "870.55",
            "totalMarginUsed": "65.0"
        },
        "withdrawable": "1455.55",
        "assetPositions": [
            {
                "type": "oneWay",
                "position": {
                    "coin": "BTC",
                    "szi": "0.01",
                    "entryPx": "65000.0",
                    "positionValue": "650.0",
                    "unrealizedPnl": "0.0",
                    "leverage": { "type": "cross", "value": 10 },
                    "liquidationPx": null,
                    "marginUsed": "65.0"
                }
            },
            {
                "type": "oneWay",
                "position": {
                    "coin": "ETH",
                    "szi": "0.0",
                    "entryPx": null,
                    "positionValue": "0.0",
                    "unrealizedPnl": "0.0",
                    "marginUsed": "0.0"
                }
            }
        ],
        "time": 1718000000000
    }"#;

    #[test]
    fn test_symbol_conversion() {
        assert_eq!(to_hyperliquid_coin("BTC-PERP"), "BTC");
        assert_eq!(to_hyperliquid_coin("eth/usdc"), "ETH");
        assert_eq!(to_hyperliquid_coin("SOL"), "SOL");
        assert_eq!(from_hyperliquid_coin("BTC"), "BTC-PERP");
    }

    #[test]
    fn test_parse_clearinghouse_state() {
        let state: ClearinghouseState = serde_json::from_str(STATE_JSON).unwrap();
        let info = state.account_info();
        assert_eq!(info.account_value, dec!(1520.55));
        assert_eq!(info.total_margin_used, dec!(65));
        assert_eq!(info.withdrawable, dec!(1455.55));
        assert_eq!(info.timestamp.timestamp_millis(), 1718000000000);

        let positions = state.positions();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BTC-PERP");
        assert_eq!(positions[0].leverage, Some(dec!(10)));
        assert_eq!(positions[0].liquidation_price, None);
        assert_eq!(positions[0].direction(), Direction::Long);
    }

    #[test]
    fn test_mid_price_lookup() {
        let mids: HashMap<String, Decimal> =
            serde_json::from_str(r#"{"BTC":"65000.5","ETH":"3100.25"}"#).unwrap();
        assert_eq!(mid_price(&mids, "BTC-PERP").unwrap().price, dec!(65000.5));
        assert!(matches!(
            mid_price(&mids, "DOGE-PERP"),
            Err(ExchangeError::SymbolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_read_only_client() {
        let exchange = HyperliquidExchange::new(&ExchangeConfig::default()).unwrap();
        assert!(!exchange.check_api_config().await);
        assert!(matches!(
            exchange.fetch_account_info().await,
            Err(ExchangeError::ConfigError(_))
        ));

        let request = TradeOrderRequest::new("BTC-PERP", Direction::Long, dec!(1), dec!(5));
        assert!(matches!(
            exchange.place_market_order(&request).await,
            Err(ExchangeError::NotSupported(_))
        ));
    }
}
