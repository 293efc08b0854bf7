//! HTTP行情预测数据源

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::core::error::ExchangeError;
use crate::core::exchange::PredictionSource;
use crate::core::types::{Prediction, Result};

/// 预测接口可能返回裸数组、`{predictions: [...]}` 或结果信封
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionPayload {
    List(Vec<Prediction>),
    Wrapped { predictions: Vec<Prediction> },
    Envelope {
        #[serde(rename = "isSuccess")]
        is_success: bool,
        #[serde(default)]
        message: String,
        #[serde(default)]
        data: Option<Vec<Prediction>>,
        #[serde(default)]
        error: Option<String>,
    },
}

fn parse_predictions(text: &str) -> Result<Vec<Prediction>> {
    match serde_json::from_str::<PredictionPayload>(text)? {
        PredictionPayload::List(list) => Ok(list),
        PredictionPayload::Wrapped { predictions } => Ok(predictions),
        PredictionPayload::Envelope {
            is_success: true,
            data,
            ..
        } => Ok(data.unwrap_or_default()),
        PredictionPayload::Envelope { message, error, .. } => Err(ExchangeError::Other(
            error.filter(|e| !e.is_empty()).unwrap_or(message),
        )),
    }
}

pub struct HttpPredictionSource {
    client: Client,
    url: Option<String>,
}

impl HttpPredictionSource {
    /// 未配置地址时每次拉取都返回配置错误，对应数据源显示为 error
    pub fn new(url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }
}

#[async_trait]
impl PredictionSource for HttpPredictionSource {
    async fn fetch_predictions(&self) -> Result<Vec<Prediction>> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ExchangeError::ConfigError("未配置预测数据源地址".to_string()))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: error_text,
            });
        }

        let text = response.text().await?;
        parse_predictions(&text)
    }
}
