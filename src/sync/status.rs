//! 连接状态推导
//! 消费一个拉取器的状态流，输出带粘滞偏置的连接状态

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sync::periodic_fetcher::FetchState;
use crate::utils::webhook::AlertSink;

/// 连接状态，只推导不持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(text)
    }
}

/// 状态机
///
/// 首次成功之前：加载中 → connecting，有错误 → error，有数据 → connected，否则 idle。
/// 首次成功之后：有错误 → error，否则一律 connected，后台刷新不会回退到 connecting。
#[derive(Debug, Clone)]
pub struct StatusDeriver {
    ever_succeeded: bool,
    status: ConnectionStatus,
}

impl Default for StatusDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusDeriver {
    pub fn new() -> Self {
        Self {
            ever_succeeded: false,
            status: ConnectionStatus::Idle,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn ever_succeeded(&self) -> bool {
        self.ever_succeeded
    }

    /// 根据最新的拉取状态推进状态机
    pub fn observe<T>(&mut self, state: &FetchState<T>) -> ConnectionStatus {
        let has_error = state.error.is_some();
        // data 只会被成功的响应写入，watch 合并掉成功帧时仍能据此认定曾经成功
        if !self.ever_succeeded && state.data.is_some() {
            self.ever_succeeded = true;
        }

        self.status = if self.ever_succeeded {
            if has_error {
                ConnectionStatus::Error
            } else {
                ConnectionStatus::Connected
            }
        } else if state.is_loading {
            ConnectionStatus::Connecting
        } else if has_error {
            ConnectionStatus::Error
        } else if state.data.is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Idle
        };
        self.status
    }

    /// 在后台订阅拉取器状态流，发布推导出的连接状态
    ///
    /// 进入 error 时若提供了告警出口则推送告警。
    pub fn spawn<T>(
        feed: impl Into<String>,
        mut states: watch::Receiver<FetchState<T>>,
        alerts: Option<Arc<dyn AlertSink>>,
    ) -> StatusWatcher
    where
        T: Clone + Send + Sync + 'static,
    {
        let feed = feed.into();
        let mut deriver = StatusDeriver::new();
        let initial = {
            let state = states.borrow_and_update();
            deriver.observe(&state)
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let (previous, next, error) = {
                    let state = states.borrow_and_update();
                    let previous = deriver.status();
                    let next = deriver.observe(&state);
                    (previous, next, state.error.clone())
                };

                if previous == next {
                    continue;
                }
                match next {
                    ConnectionStatus::Error => {
                        log::error!("❌ [{}] 连接状态: {} -> {}", feed, previous, next)
                    }
                    _ => log::info!("📡 [{}] 连接状态: {} -> {}", feed, previous, next),
                }
                let _ = status_tx.send(next);

                // 告警在独立任务中投递，慢速出口不阻塞状态推导
                if next == ConnectionStatus::Error {
                    if let Some(sink) = alerts.as_ref() {
                        let sink = Arc::clone(sink);
                        let feed = feed.clone();
                        let reason = error.unwrap_or_else(|| "未知错误".to_string());
                        tokio::spawn(async move {
                            sink.connectivity_lost(&feed, &reason).await;
                        });
                    }
                }
            }
            log::debug!("[{}] 状态流已关闭", feed);
        });

        StatusWatcher {
            status: status_rx,
            handle,
        }
    }
}

/// 后台状态订阅的句柄，释放时停止订阅
pub struct StatusWatcher {
    status: watch::Receiver<ConnectionStatus>,
    handle: JoinHandle<()>,
}

impl StatusWatcher {
    pub fn current(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
