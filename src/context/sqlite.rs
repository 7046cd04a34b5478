//! SQLite 上下文存储（rusqlite）
//!
//! 表 `contexts` 只追加不修改。rusqlite 的 Connection 不是 Sync，所有读写经由同一把互斥锁，
//! 在 spawn_blocking 线程上执行；写入因此天然按键串行。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::context::{ContextLimits, ContextRecord, ContextStore, Turn};
use crate::core::ContextError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    conversation_id TEXT NOT NULL,
    user_input TEXT,
    agent_response TEXT,
    timestamp TEXT NOT NULL,
    response_type TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contexts_key ON contexts(topic, conversation_id);
";

#[derive(Clone)]
pub struct SqliteContextStore {
    conn: Arc<Mutex<Connection>>,
    limits: ContextLimits,
}

impl SqliteContextStore {
    /// 打开（或创建）数据库并建表
    pub fn open(path: impl AsRef<Path>, limits: ContextLimits) -> Result<Self, ContextError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn, limits)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory(limits: ContextLimits) -> Result<Self, ContextError> {
        Self::with_connection(Connection::open_in_memory()?, limits)
    }

    fn with_connection(conn: Connection, limits: ContextLimits) -> Result<Self, ContextError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            limits,
        })
    }

    /// 在阻塞线程上持锁执行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, ContextError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| ContextError::Join("context connection lock poisoned".to_string()))?;
            f(&guard).map_err(ContextError::from)
        })
        .await
        .map_err(|e| ContextError::Join(e.to_string()))?
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn save(&self, topic: &str, conversation_id: &str, turn: Turn) -> Result<(), ContextError> {
        let record = ContextRecord::new(turn);
        let (topic, conversation_id) = (topic.to_string(), conversation_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO contexts (topic, conversation_id, user_input, agent_response, timestamp, response_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    topic,
                    conversation_id,
                    record.user_input,
                    record.agent_response,
                    record.timestamp,
                    record.response_type
                ],
            )
            .map(|_| ())
        })
        .await
    }

    async fn turns(
        &self,
        topic: &str,
        conversation_id: &str,
        exclude_main_model: bool,
    ) -> Result<Vec<ContextRecord>, ContextError> {
        let (topic, conversation_id) = (topic.to_string(), conversation_id.to_string());
        let window = self.limits.window as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_input, agent_response, timestamp, response_type FROM contexts
                 WHERE topic = ?1 AND conversation_id = ?2
                   AND (?3 = 0 OR response_type != 'main_model')
                 ORDER BY id DESC LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![topic, conversation_id, exclude_main_model, window],
                |row| {
                    Ok(ContextRecord {
                        user_input: row.get(0)?,
                        agent_response: row.get(1)?,
                        timestamp: row.get(2)?,
                        response_type: row.get(3)?,
                    })
                },
            )?;
            let mut records = rows.collect::<Result<Vec<_>, _>>()?;
            records.reverse();
            Ok(records)
        })
        .await
    }

    async fn last_user_query(
        &self,
        topic: &str,
        conversation_id: &str,
    ) -> Result<Option<String>, ContextError> {
        let (topic, conversation_id) = (topic.to_string(), conversation_id.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_input FROM contexts
                 WHERE topic = ?1 AND conversation_id = ?2 AND response_type = 'user'
                 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![topic, conversation_id])?;
            match rows.next()? {
                Some(row) => row.get(0),
                None => Ok(None),
            }
        })
        .await
    }

    fn limits(&self) -> ContextLimits {
        self.limits
    }

    async fn ping(&self) -> Result<(), ContextError> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(()))).await
    }
}
