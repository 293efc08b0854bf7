//! 周期拉取引擎
//! 包装一个无参异步数据源，按固定间隔轮询并通过 watch 通道发布状态

use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// 最小轮询间隔
pub const MIN_INTERVAL_MS: u64 = 1_000;

const SOURCE_PANICKED: &str = "数据源异常退出";

/// 单个数据源的拉取状态
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    pub data: Option<T>,
    pub error: Option<String>,
    pub is_loading: bool,
    /// 已应用的最新请求序号
    pub sequence: u64,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            sequence: 0,
        }
    }
}

type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;
type FetchFn<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

struct FetcherShared<T> {
    name: String,
    fetch_fn: FetchFn<T>,
    state_tx: watch::Sender<FetchState<T>>,
    /// 最近一次发出的请求序号
    issued: AtomicU64,
    in_flight: AtomicUsize,
    stopped: AtomicBool,
}

impl<T> FetcherShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 发起一次请求，响应在独立任务中处理
    fn issue(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_modify(|state| state.is_loading = true);

        let shared = Arc::clone(self);
        // 数据源在返回 future 之前就 panic 时，同样折叠为一次失败的请求
        let request = std::panic::catch_unwind(AssertUnwindSafe(|| (self.fetch_fn)()))
            .unwrap_or_else(|_| {
                Box::pin(async { Err(SOURCE_PANICKED.to_string()) }) as FetchFuture<T>
            });
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(request).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(SOURCE_PANICKED.to_string()),
            };
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            shared.apply(sequence, outcome);
        });
    }

    /// 只有比已应用序号更新的响应才会写入状态
    fn apply(&self, sequence: u64, outcome: Result<T, String>) {
        if self.stopped.load(Ordering::SeqCst) {
            log::debug!("[{}] 已停止，忽略请求 #{} 的响应", self.name, sequence);
            return;
        }

        let latest_issued = self.issued.load(Ordering::SeqCst);
        let name = &self.name;
        let stopped = &self.stopped;
        self.state_tx.send_if_modified(|state| {
            // 与 stop() 的屏障配合：持有写锁期间再确认一次
            if stopped.load(Ordering::SeqCst) {
                return false;
            }
            if sequence <= state.sequence {
                log::debug!(
                    "[{}] 丢弃过期响应 #{} (已应用 #{})",
                    name,
                    sequence,
                    state.sequence
                );
                return false;
            }

            state.sequence = sequence;
            match outcome {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                }
                Err(message) => {
                    // 保留上一次成功的数据用于展示
                    log::warn!("⚠️ [{}] 拉取失败: {}", name, message);
                    state.error = Some(message);
                }
            }
            state.is_loading = sequence < latest_issued;
            true
        });
    }
}

/// 可取消的周期拉取器
///
/// 同一实例同一时刻最多只有一个定时请求在途，定时触发时若上一个请求未返回则跳过本次。
/// `refresh()` 会立即发起新请求，由序号保证最后发起的请求生效。
/// 调用 `stop()` 或释放实例后，在途响应不再修改状态。
pub struct PeriodicFetcher<T> {
    shared: Arc<FetcherShared<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T> PeriodicFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// 立即发起首次请求，之后每隔 `interval_ms` 重新拉取
    pub fn start<F, Fut, E>(name: impl Into<String>, fetch_fn: F, interval_ms: u64) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let name = name.into();
        let interval_ms = if interval_ms < MIN_INTERVAL_MS {
            log::warn!(
                "⚠️ [{}] 轮询间隔 {}ms 过小，调整为 {}ms",
                name,
                interval_ms,
                MIN_INTERVAL_MS
            );
            MIN_INTERVAL_MS
        } else {
            interval_ms
        };

        let fetch_fn: FetchFn<T> = Arc::new(move || {
            let request = fetch_fn();
            Box::pin(async move { request.await.map_err(|e| error_message(&e)) }) as FetchFuture<T>
        });
        let (state_tx, _) = watch::channel(FetchState::default());

        let shared = Arc::new(FetcherShared {
            name: name.clone(),
            fetch_fn,
            state_tx,
            issued: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        });

        shared.issue();

        let period = Duration::from_millis(interval_ms);
        let timer_shared = Arc::clone(&shared);
        let timer = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if timer_shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                if timer_shared.in_flight.load(Ordering::SeqCst) > 0 {
                    log::debug!("[{}] 上一次请求未返回，跳过本次轮询", timer_shared.name);
                    continue;
                }
                timer_shared.issue();
            }
        });

        log::info!("🔄 [{}] 轮询已启动，间隔 {}ms", name, interval_ms);

        Self {
            shared,
            timer: Mutex::new(Some(timer)),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 订阅状态流
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.shared.state_tx.subscribe()
    }

    /// 当前状态快照
    pub fn state(&self) -> FetchState<T> {
        self.shared.state_tx.borrow().clone()
    }

    /// 手动刷新，不受在途请求限制
    pub fn refresh(&self) {
        self.shared.issue();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// 停止定时器，之后到达的响应全部忽略
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // 等待正在写入的响应完成，返回后状态不再变化
        self.shared.state_tx.send_if_modified(|_| false);
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
        log::info!("⏹️ [{}] 轮询已停止", self.shared.name);
    }
}

impl<T> Drop for PeriodicFetcher<T> {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}

fn error_message<E: fmt::Display>(err: &E) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        "请求失败".to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "account",
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42u32)
                }
            },
            30_000,
        );

        assert!(fetcher.state().is_loading);
        sleep(Duration::from_millis(10)).await;

        let state = fetcher.state();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.data, Some(42));
        assert_eq!(state.error, None);
        assert!(!state.is_loading);
        assert_eq!(state.sequence, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_last_good_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "positions",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(vec![1, 2, 3])
                    } else {
                        Err("timeout".to_string())
                    }
                }
            },
            1_000,
        );

        sleep(Duration::from_millis(1_500)).await;

        let state = fetcher.state();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.data, Some(vec![1, 2, 3]));
        assert_eq!(state.error.as_deref(), Some("timeout"));
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "predictions",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("boom".to_string())
                    } else {
                        Ok("fresh")
                    }
                }
            },
            1_000,
        );

        sleep(Duration::from_millis(10)).await;
        assert_eq!(fetcher.state().error.as_deref(), Some("boom"));
        assert_eq!(fetcher.state().data, None);

        sleep(Duration::from_millis(1_000)).await;
        let state = fetcher.state();
        assert_eq!(state.data, Some("fresh"));
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skipped_while_request_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let (c, a, m) = (calls.clone(), active.clone(), max_active.clone());
        let fetcher = PeriodicFetcher::start(
            "slow",
            move || {
                let (c, a, m) = (c.clone(), a.clone(), m.clone());
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    m.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(2_500)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            },
            1_000,
        );

        // t=0 发起，t=1000/2000 跳过，t=3000 再次发起
        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        drop(fetcher);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "race",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        sleep(Duration::from_millis(500)).await;
                        Ok("slow")
                    } else {
                        sleep(Duration::from_millis(10)).await;
                        Ok::<_, String>("fast")
                    }
                }
            },
            60_000,
        );

        fetcher.refresh();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(fetcher.state().data, Some("fast"));
        assert_eq!(fetcher.state().sequence, 2);

        sleep(Duration::from_millis(1_000)).await;
        let state = fetcher.state();
        assert_eq!(state.data, Some("fast"));
        assert_eq!(state.sequence, 2);
        assert!(!state.is_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ignores_in_flight_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "teardown",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    sleep(Duration::from_millis(100)).await;
                    Ok::<_, String>(7)
                }
            },
            1_000,
        );
        let mut rx = fetcher.subscribe();
        rx.borrow_and_update();

        fetcher.stop();
        assert!(fetcher.is_stopped());

        sleep(Duration::from_millis(5_000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.state().data, None);
        assert!(!rx.has_changed().unwrap_or(false));

        fetcher.refresh();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_source_becomes_error() {
        let fetcher = PeriodicFetcher::start(
            "panic",
            || async {
                if true {
                    panic!("source exploded");
                }
                Ok::<u8, String>(0)
            },
            1_000,
        );

        sleep(Duration::from_millis(10)).await;
        let state = fetcher.state();
        assert_eq!(state.error.as_deref(), Some(SOURCE_PANICKED));

        // 在途计数已归还，下一次轮询照常发起
        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(fetcher.state().sequence, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_panicking_before_future_keeps_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetcher = PeriodicFetcher::start(
            "eager-panic",
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("failed while building request");
                }
                async { Ok::<_, String>(5u8) }
            },
            1_000,
        );

        sleep(Duration::from_millis(10)).await;
        let state = fetcher.state();
        assert_eq!(state.error.as_deref(), Some(SOURCE_PANICKED));
        assert_eq!(state.sequence, 1);

        sleep(Duration::from_millis(1_000)).await;
        let state = fetcher.state();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.data, Some(5));
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_response_after_stop_never_lands() {
        let fetcher = PeriodicFetcher::start(
            "late",
            || async { Ok::<_, String>(1u8) },
            60_000,
        );
        sleep(Duration::from_millis(20)).await;
        assert_eq!(fetcher.state().data, Some(1));

        let mut rx = fetcher.subscribe();
        rx.borrow_and_update();
        fetcher.stop();

        // 模拟 stop() 返回后才到达的响应
        fetcher.shared.apply(99, Ok(2));
        assert_eq!(fetcher.state().data, Some(1));
        assert_eq!(fetcher.state().sequence, 1);
        assert!(!rx.has_changed().unwrap_or(false));
    }
}
