//! 驾驶舱会话
//! 为账户、持仓、预测三个数据源各启动一个拉取器和一个状态订阅

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::CockpitSettings;
use crate::core::exchange::{Exchange, PredictionSource};
use crate::core::types::{AccountInfo, Position, Prediction};
use crate::sync::periodic_fetcher::PeriodicFetcher;
use crate::sync::status::{ConnectionStatus, StatusDeriver, StatusWatcher};
use crate::utils::webhook::AlertSink;

pub const FEED_ACCOUNT: &str = "accountInfo";
pub const FEED_POSITIONS: &str = "positions";
pub const FEED_PREDICTIONS: &str = "predictions";

/// 三个数据源的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatuses {
    pub account_info: ConnectionStatus,
    pub positions: ConnectionStatus,
    pub predictions: ConnectionStatus,
}

pub struct CockpitSession {
    account: PeriodicFetcher<AccountInfo>,
    positions: PeriodicFetcher<Vec<Position>>,
    predictions: PeriodicFetcher<Vec<Prediction>>,
    account_status: StatusWatcher,
    positions_status: StatusWatcher,
    predictions_status: StatusWatcher,
}

impl CockpitSession {
    /// 按设置中的刷新间隔启动轮询，账户与持仓共用账户刷新间隔
    pub fn start(
        exchange: Arc<dyn Exchange>,
        prediction_source: Arc<dyn PredictionSource>,
        settings: &CockpitSettings,
        alerts: Option<Arc<dyn AlertSink>>,
    ) -> Self {
        let account_exchange = Arc::clone(&exchange);
        let account = PeriodicFetcher::start(
            FEED_ACCOUNT,
            move || {
                let exchange = Arc::clone(&account_exchange);
                async move { exchange.fetch_account_info().await }
            },
            settings.account_refresh_interval_ms,
        );

        let positions_exchange = Arc::clone(&exchange);
        let positions = PeriodicFetcher::start(
            FEED_POSITIONS,
            move || {
                let exchange = Arc::clone(&positions_exchange);
                async move { exchange.fetch_positions().await }
            },
            settings.account_refresh_interval_ms,
        );

        let predictions = PeriodicFetcher::start(
            FEED_PREDICTIONS,
            move || {
                let source = Arc::clone(&prediction_source);
                async move { source.fetch_predictions().await }
            },
            settings.prediction_refresh_interval_ms,
        );

        let account_status =
            StatusDeriver::spawn(FEED_ACCOUNT, account.subscribe(), alerts.clone());
        let positions_status =
            StatusDeriver::spawn(FEED_POSITIONS, positions.subscribe(), alerts.clone());
        let predictions_status =
            StatusDeriver::spawn(FEED_PREDICTIONS, predictions.subscribe(), alerts);

        Self {
            account,
            positions,
            predictions,
            account_status,
            positions_status,
            predictions_status,
        }
    }

    pub fn account(&self) -> &PeriodicFetcher<AccountInfo> {
        &self.account
    }

    pub fn positions(&self) -> &PeriodicFetcher<Vec<Position>> {
        &self.positions
    }

    pub fn predictions(&self) -> &PeriodicFetcher<Vec<Prediction>> {
        &self.predictions
    }

    pub fn statuses(&self) -> FeedStatuses {
        FeedStatuses {
            account_info: self.account_status.current(),
            positions: self.positions_status.current(),
            predictions: self.predictions_status.current(),
        }
    }

    /// 用户手动刷新全部数据源
    pub fn refresh_all(&self) {
        self.account.refresh();
        self.positions.refresh();
        self.predictions.refresh();
    }

    pub fn stop(&self) {
        self.account.stop();
        self.positions.stop();
        self.predictions.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ExchangeError;
    use crate::core::types::{PlacedOrder, Quote, Result as ExchangeResult, TradeOrderRequest};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FlakyExchange {
        account_calls: AtomicUsize,
    }

    #[async_trait]
    impl Exchange for FlakyExchange {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_account_info(&self) -> ExchangeResult<AccountInfo> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccountInfo {
                account_value: Decimal::ONE_HUNDRED,
                total_margin_used: Decimal::ZERO,
                total_notional_position: Decimal::ZERO,
                withdrawable: Decimal::ONE_HUNDRED,
                timestamp: Utc::now(),
            })
        }

        async fn fetch_positions(&self) -> ExchangeResult<Vec<Position>> {
            Err(ExchangeError::Other("positions 502".to_string()))
        }

        async fn fetch_current_price(&self, symbol: &str) -> ExchangeResult<Quote> {
            Err(ExchangeError::SymbolNotFound(symbol.to_string()))
        }

        async fn check_api_config(&self) -> bool {
            true
        }

        async fn place_market_order(
            &self,
            _request: &TradeOrderRequest,
        ) -> ExchangeResult<PlacedOrder> {
            Err(ExchangeError::NotSupported("read only".to_string()))
        }
    }

    struct EmptyPredictions;

    #[async_trait]
    impl PredictionSource for EmptyPredictions {
        async fn fetch_predictions(&self) -> ExchangeResult<Vec<Prediction>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_feeds_are_independent() {
        let exchange = Arc::new(FlakyExchange {
            account_calls: AtomicUsize::new(0),
        });
        let settings = CockpitSettings {
            account_refresh_interval_ms: 5_000,
            ..CockpitSettings::default()
        };
        let session = CockpitSession::start(
            exchange.clone(),
            Arc::new(EmptyPredictions),
            &settings,
            None,
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let statuses = session.statuses();
        assert_eq!(statuses.account_info, ConnectionStatus::Connected);
        assert_eq!(statuses.positions, ConnectionStatus::Error);
        assert_eq!(statuses.predictions, ConnectionStatus::Connected);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        assert_eq!(exchange.account_calls.load(Ordering::SeqCst), 2);

        session.stop();
        tokio::time::sleep(Duration::from_millis(20_000)).await;
        assert_eq!(exchange.account_calls.load(Ordering::SeqCst), 2);
        assert!(session.account().is_stopped());
    }
}
