//! 交易日志持久化
//! 持久化层负责生成 id 与 timestamp，并按时间倒序列出记录

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::types::TradeLogEntry;

/// 待写入的交易日志（已通过校验与规整）
#[derive(Debug, Clone, PartialEq)]
pub struct NewTradeLogRecord {
    pub symbol: String,
    pub direction: String,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub status: String,
    pub hyperliquid_order_id: Option<String>,
    pub error_message: Option<String>,
}

impl NewTradeLogRecord {
    fn into_entry(self, id: String, timestamp: DateTime<Utc>) -> TradeLogEntry {
        TradeLogEntry {
            id,
            timestamp,
            symbol: self.symbol,
            direction: self.direction,
            size: self.size,
            entry_price: self.entry_price,
            status: self.status,
            hyperliquid_order_id: self.hyperliquid_order_id,
            error_message: self.error_message,
        }
    }
}

/// 持久化层错误
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 引擎返回的已知错误，携带引擎错误码
    #[error("[{code}] {message}")]
    Known { code: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// 交易日志存储接口
#[async_trait]
pub trait TradeLogRepository: Send + Sync {
    /// 写入一条记录，返回带 id 与 timestamp 的完整记录
    async fn insert(&self, record: NewTradeLogRecord) -> Result<TradeLogEntry, RepositoryError>;

    /// 按 timestamp 倒序返回最近 `limit` 条
    async fn list_recent(&self, limit: usize) -> Result<Vec<TradeLogEntry>, RepositoryError>;
}

// ============= 内存实现 =============

/// 内存存储，进程退出即丢失
#[derive(Default)]
pub struct InMemoryTradeLogRepository {
    entries: RwLock<Vec<TradeLogEntry>>,
}

impl InMemoryTradeLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeLogRepository for InMemoryTradeLogRepository {
    async fn insert(&self, record: NewTradeLogRecord) -> Result<TradeLogEntry, RepositoryError> {
        let entry = record.into_entry(Uuid::new_v4().to_string(), Utc::now());
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<TradeLogEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        // 先按写入顺序倒排，稳定排序后同一时间戳的记录仍是后写入的在前
        let mut recent: Vec<TradeLogEntry> = entries.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }
}

// ============= SQLite实现 =============

/// SQLite存储
pub struct SqliteTradeLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTradeLogRepository {
    /// 打开数据库文件，必要时创建目录和表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RepositoryError::Other(format!("创建数据目录失败: {}", e)))?;
            }
        }
        let conn = Connection::open(path).map_err(map_sqlite_error)?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))
            .map_err(map_sqlite_error)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        initialize_schema(&conn).map_err(map_sqlite_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池中执行数据库操作
    async fn with_conn<R, F>(&self, op: F) -> Result<R, RepositoryError>
    where
        R: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| RepositoryError::Other("数据库连接锁已损坏".to_string()))?;
            op(&guard).map_err(map_sqlite_error)
        })
        .await
        .map_err(|e| RepositoryError::Other(format!("数据库任务异常: {}", e)))?
    }
}

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS trade_logs (
            id TEXT PRIMARY KEY,
            timestamp_us INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            direction TEXT NOT NULL,
            size TEXT NOT NULL,
            entry_price TEXT NOT NULL,
            status TEXT NOT NULL,
            hyperliquid_order_id TEXT,
            error_message TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_trade_logs_timestamp ON trade_logs(timestamp_us DESC)",
        [],
    )?;
    Ok(())
}

fn map_sqlite_error(err: rusqlite::Error) -> RepositoryError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => RepositoryError::Known {
            code: format!("SQLITE_{}", failure.extended_code),
            message: message.unwrap_or_else(|| failure.to_string()),
        },
        other => RepositoryError::Other(other.to_string()),
    }
}

fn parse_decimal(index: usize, raw: String) -> rusqlite::Result<Decimal> {
    Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeLogEntry> {
    let timestamp_us: i64 = row.get(1)?;
    let timestamp = DateTime::from_timestamp_micros(timestamp_us).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(1, timestamp_us)
    })?;
    Ok(TradeLogEntry {
        id: row.get(0)?,
        timestamp,
        symbol: row.get(2)?,
        direction: row.get(3)?,
        size: parse_decimal(4, row.get(4)?)?,
        entry_price: parse_decimal(5, row.get(5)?)?,
        status: row.get(6)?,
        hyperliquid_order_id: row.get(7)?,
        error_message: row.get(8)?,
    })
}

#[async_trait]
impl TradeLogRepository for SqliteTradeLogRepository {
    async fn insert(&self, record: NewTradeLogRecord) -> Result<TradeLogEntry, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let timestamp_us = Utc::now().timestamp_micros();
        let timestamp = DateTime::from_timestamp_micros(timestamp_us)
            .ok_or_else(|| RepositoryError::Other("时间戳越界".to_string()))?;
        let entry = record.into_entry(id, timestamp);

        let row = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trade_logs (id, timestamp_us, symbol, direction, size, entry_price,
                    status, hyperliquid_order_id, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    row.id,
                    timestamp_us,
                    row.symbol,
                    row.direction,
                    row.size.to_string(),
                    row.entry_price.to_string(),
                    row.status,
                    row.hyperliquid_order_id,
                    row.error_message,
                ],
            )
        })
        .await?;

        Ok(entry)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<TradeLogEntry>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp_us, symbol, direction, size, entry_price, status,
                        hyperliquid_order_id, error_message
                 FROM trade_logs
                 ORDER BY timestamp_us DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], read_entry)?;
            let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, status: &str) -> NewTradeLogRecord {
        NewTradeLogRecord {
            symbol: symbol.to_string(),
            direction: "LONG".to_string(),
            size: dec!(0.01),
            entry_price: dec!(65000.5),
            status: status.to_string(),
            hyperliquid_order_id: None,
            error_message: Some("insufficient margin".to_string()),
        }
    }

    #[tokio::test]
    async fn test_in_memory_orders_most_recent_first() {
        let repo = InMemoryTradeLogRepository::new();
        for symbol in ["BTC-PERP", "ETH-PERP", "SOL-PERP"] {
            repo.insert(record(symbol, "FAILED")).await.unwrap();
        }

        let recent = repo.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].symbol, "SOL-PERP");
        assert_eq!(recent[1].symbol, "ETH-PERP");
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_list() {
        let repo = SqliteTradeLogRepository::open_in_memory().unwrap();
        let first = repo.insert(record("BTC-PERP", "SUCCESS")).await.unwrap();
        let second = repo.insert(record("ETH-PERP", "FAILED")).await.unwrap();
        assert_ne!(first.id, second.id);

        let recent = repo.list_recent(50).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], second);
        assert_eq!(recent[1], first);
        assert_eq!(recent[1].entry_price, dec!(65000.5));
        assert_eq!(recent[1].hyperliquid_order_id, None);
    }

    #[tokio::test]
    async fn test_sqlite_engine_error_carries_code() {
        let repo = SqliteTradeLogRepository::open_in_memory().unwrap();
        let entry = repo.insert(record("BTC-PERP", "SUCCESS")).await.unwrap();

        let duplicate_id = entry.id.clone();
        let err = repo
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO trade_logs (id, timestamp_us, symbol, direction, size, entry_price, status)
                     VALUES (?1, 0, 'X', 'LONG', '1', '0', 'FAILED')",
                    params![duplicate_id],
                )
            })
            .await
            .unwrap_err();

        match err {
            RepositoryError::Known { code, .. } => assert!(code.starts_with("SQLITE_")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
