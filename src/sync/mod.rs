// 数据同步模块 - 轮询、连接状态与首屏聚合
pub mod aggregator;
pub mod periodic_fetcher;
pub mod session;
pub mod status;

pub use aggregator::{settle, settle_all, AggregatedSnapshot, InitialAggregator, SourceOutcome};
pub use periodic_fetcher::{FetchState, PeriodicFetcher};
pub use session::{CockpitSession, FeedStatuses};
pub use status::{ConnectionStatus, StatusDeriver, StatusWatcher};
