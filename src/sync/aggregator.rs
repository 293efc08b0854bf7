//! 首屏聚合
//! 并发拉取多个互相独立的数据源，逐个收集成功或失败，单个失败不影响其他数据源

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::core::envelope::ResultEnvelope;
use crate::core::exchange::{Exchange, PredictionSource};
use crate::core::types::{AccountInfo, Position, Prediction, TradeLogEntry};
use crate::trade::log_store::TradeLogStore;

/// 无法提取错误说明时的兜底文本
const FALLBACK_ERROR: &str = "加载失败";

/// 单个数据源的结果，`data` 与 `error` 至多一个非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> SourceOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            data: None,
            error: Some(if error.trim().is_empty() {
                FALLBACK_ERROR.to_string()
            } else {
                error
            }),
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// 可以折叠为数据源结果的返回值：普通 `Result` 或失败的结果信封
pub trait IntoOutcome<T> {
    fn into_outcome(self) -> SourceOutcome<T>;
}

impl<T, E: fmt::Display> IntoOutcome<T> for Result<T, E> {
    fn into_outcome(self) -> SourceOutcome<T> {
        match self {
            Ok(data) => SourceOutcome::ok(data),
            Err(e) => SourceOutcome::failed(e.to_string()),
        }
    }
}

impl<T> IntoOutcome<T> for ResultEnvelope<T> {
    fn into_outcome(self) -> SourceOutcome<T> {
        if self.is_success {
            match self.data {
                Some(data) => SourceOutcome::ok(data),
                None => SourceOutcome::empty(),
            }
        } else {
            SourceOutcome::failed(self.error_text().unwrap_or_default())
        }
    }
}

/// 等待单个数据源完成，异常退出也折叠为错误
pub async fn settle<T, F>(source: &str, request: F) -> SourceOutcome<T>
where
    F: Future,
    F::Output: IntoOutcome<T>,
{
    match AssertUnwindSafe(request).catch_unwind().await {
        Ok(output) => {
            let outcome = output.into_outcome();
            if let Some(error) = &outcome.error {
                log::warn!("⚠️ 首屏数据源 {} 加载失败: {}", source, error);
            }
            outcome
        }
        Err(_) => {
            log::error!("❌ 首屏数据源 {} 异常退出", source);
            SourceOutcome::failed(format!("{}异常退出", source))
        }
    }
}

/// 同类型数据源的批量聚合，按名称返回每个数据源的结果
pub async fn settle_all<'a, T: Send + 'a>(
    sources: Vec<(String, BoxFuture<'a, Result<T, String>>)>,
) -> BTreeMap<String, SourceOutcome<T>> {
    let settled = join_all(sources.into_iter().map(|(name, request)| async move {
        let outcome = settle(&name, request).await;
        (name, outcome)
    }))
    .await;
    settled.into_iter().collect()
}

/// 首屏快照，每个字段独立成败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedSnapshot {
    pub account_info: SourceOutcome<AccountInfo>,
    pub positions: SourceOutcome<Vec<Position>>,
    pub predictions: SourceOutcome<Vec<Prediction>>,
    pub logs: SourceOutcome<Vec<TradeLogEntry>>,
}

impl AggregatedSnapshot {
    pub fn failed_sources(&self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.account_info.is_ok() {
            failed.push("accountInfo");
        }
        if !self.positions.is_ok() {
            failed.push("positions");
        }
        if !self.predictions.is_ok() {
            failed.push("predictions");
        }
        if !self.logs.is_ok() {
            failed.push("logs");
        }
        failed
    }
}

/// 首屏聚合器，一次性、无重试
pub struct InitialAggregator {
    exchange: Arc<dyn Exchange>,
    predictions: Arc<dyn PredictionSource>,
    log_store: Arc<TradeLogStore>,
}

impl InitialAggregator {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        predictions: Arc<dyn PredictionSource>,
        log_store: Arc<TradeLogStore>,
    ) -> Self {
        Self {
            exchange,
            predictions,
            log_store,
        }
    }

    /// 并发拉取四个数据源并等待全部完成
    pub async fn load(&self) -> AggregatedSnapshot {
        let (account_info, positions, predictions, logs) = tokio::join!(
            settle("accountInfo", self.exchange.fetch_account_info()),
            settle("positions", self.exchange.fetch_positions()),
            settle("predictions", self.predictions.fetch_predictions()),
            settle("logs", self.log_store.list(None)),
        );

        let snapshot = AggregatedSnapshot {
            account_info,
            positions,
            predictions,
            logs,
        };
        let failed = snapshot.failed_sources();
        if failed.is_empty() {
            log::info!("✅ 首屏数据加载完成");
        } else {
            log::warn!("⚠️ 首屏数据部分失败: {:?}", failed);
        }
        snapshot
    }
}
