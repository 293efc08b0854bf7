//! 模拟成交交易所
//! 行情与账户读取委托给真实数据源，市价单按当前报价模拟成交

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::error::ExchangeError;
use crate::core::exchange::Exchange;
use crate::core::types::*;

pub struct PaperExchange {
    inner: Arc<dyn Exchange>,
}

impl PaperExchange {
    pub fn new(inner: Arc<dyn Exchange>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn name(&self) -> &str {
        "paper"
    }

    async fn fetch_account_info(&self) -> Result<AccountInfo> {
        self.inner.fetch_account_info().await
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>> {
        self.inner.fetch_positions().await
    }

    async fn fetch_current_price(&self, symbol: &str) -> Result<Quote> {
        self.inner.fetch_current_price(symbol).await
    }

    async fn check_api_config(&self) -> bool {
        true
    }

    async fn place_market_order(&self, request: &TradeOrderRequest) -> Result<PlacedOrder> {
        let quote = self.inner.fetch_current_price(&request.symbol).await?;
        if quote.price <= rust_decimal::Decimal::ZERO {
            return Err(ExchangeError::OrderRejected(format!(
                "{} 当前无有效报价",
                request.symbol
            )));
        }

        let order_id = format!("paper-{}", uuid::Uuid::new_v4().simple());
        log::info!(
            "🧪 模拟成交: {} {} 数量 {} @ {} 订单号 {}",
            request.symbol,
            request.direction,
            request.size,
            quote.price,
            order_id
        );
        Ok(PlacedOrder {
            order_id,
            avg_price: Some(quote.price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FixedQuote(Decimal);

    #[async_trait]
    impl Exchange for FixedQuote {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_account_info(&self) -> Result<AccountInfo> {
            Err(ExchangeError::Other("unused".to_string()))
        }

        async fn fetch_positions(&self) -> Result<Vec<Position>> {
            Ok(Vec::new())
        }

        async fn fetch_current_price(&self, symbol: &str) -> Result<Quote> {
            Ok(Quote {
                symbol: symbol.to_string(),
                price: self.0,
                timestamp: Utc::now(),
            })
        }

        async fn check_api_config(&self) -> bool {
            false
        }

        async fn place_market_order(&self, _request: &TradeOrderRequest) -> Result<PlacedOrder> {
            Err(ExchangeError::NotSupported("read only".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fills_at_live_quote() {
        let paper = PaperExchange::new(Arc::new(FixedQuote(dec!(65000))));
        assert!(paper.check_api_config().await);

        let request = TradeOrderRequest::new("BTC-PERP", Direction::Short, dec!(0.01), dec!(5));
        let order = paper.place_market_order(&request).await.unwrap();
        assert!(order.order_id.starts_with("paper-"));
        assert_eq!(order.avg_price, Some(dec!(65000)));

        let second = paper.place_market_order(&request).await.unwrap();
        assert_ne!(order.order_id, second.order_id);
    }

    #[tokio::test]
    async fn test_rejects_without_quote() {
        let paper = PaperExchange::new(Arc::new(FixedQuote(Decimal::ZERO)));
        let request = TradeOrderRequest::new("BTC-PERP", Direction::Long, dec!(1), dec!(1));
        assert!(matches!(
            paper.place_market_order(&request).await,
            Err(ExchangeError::OrderRejected(_))
        ));
    }
}
