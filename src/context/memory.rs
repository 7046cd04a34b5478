//! 内存上下文存储：与 SQLite 版同一契约，用于测试与无盘运行

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::context::{ContextLimits, ContextRecord, ContextStore, Turn};
use crate::core::ContextError;

type Key = (String, String);

#[derive(Debug, Default)]
pub struct MemoryContextStore {
    rows: Mutex<HashMap<Key, Vec<ContextRecord>>>,
    limits: ContextLimits,
}

impl MemoryContextStore {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// 某个会话已写入的总行数（不受窗口限制）
    pub fn len(&self, topic: &str, conversation_id: &str) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.get(&key(topic, conversation_id)).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn poisoned() -> ContextError {
        ContextError::Join("context store lock poisoned".to_string())
    }
}

fn key(topic: &str, conversation_id: &str) -> Key {
    (topic.to_string(), conversation_id.to_string())
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn save(&self, topic: &str, conversation_id: &str, turn: Turn) -> Result<(), ContextError> {
        let mut rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        rows.entry(key(topic, conversation_id))
            .or_default()
            .push(ContextRecord::new(turn));
        Ok(())
    }

    async fn turns(
        &self,
        topic: &str,
        conversation_id: &str,
        exclude_main_model: bool,
    ) -> Result<Vec<ContextRecord>, ContextError> {
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        let Some(all) = rows.get(&key(topic, conversation_id)) else {
            return Ok(Vec::new());
        };
        let mut recent: Vec<ContextRecord> = all
            .iter()
            .rev()
            .filter(|r| !exclude_main_model || r.response_type != "main_model")
            .take(self.limits.window)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn last_user_query(
        &self,
        topic: &str,
        conversation_id: &str,
    ) -> Result<Option<String>, ContextError> {
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        Ok(rows.get(&key(topic, conversation_id)).and_then(|all| {
            all.iter()
                .rev()
                .find(|r| r.response_type == "user")
                .and_then(|r| r.user_input.clone())
        }))
    }

    fn limits(&self) -> ContextLimits {
        self.limits
    }
}
