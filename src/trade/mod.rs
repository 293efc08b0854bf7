// 交易模块 - 下单流程与交易日志
pub mod log_store;
pub mod repository;
pub mod submission;

pub use log_store::{TradeLogInput, TradeLogStore, DEFAULT_LIST_LIMIT};
pub use repository::{
    InMemoryTradeLogRepository, RepositoryError, SqliteTradeLogRepository, TradeLogRepository,
};
pub use submission::{validate_request, SubmissionReport, TradeSubmissionPipeline};
