//! 会话状态持久化
//!
//! 将一轮结束时的 ConversationTurnState 写入 JSON 文件、按会话 id 加载，用于跨进程恢复对话（可选使用）。

use std::path::{Path, PathBuf};

use crate::core::ConversationTurnState;

/// 会话状态存储
pub trait TurnStateStore: Send + Sync {
    /// 不存在时返回 Ok(None)
    fn load(&self, session_id: &str) -> anyhow::Result<Option<ConversationTurnState>>;

    fn save(&self, session_id: &str, state: &ConversationTurnState) -> anyhow::Result<()>;
}

/// 每个会话一个 JSON 文件：{dir}/{session_id}.json
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 会话 id 只保留字母数字、'-'、'_'，防止路径穿越
    fn path_for(&self, session_id: &str) -> anyhow::Result<PathBuf> {
        let safe: String = session_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if safe.is_empty() {
            anyhow::bail!("invalid session id: {session_id:?}");
        }
        Ok(self.dir.join(format!("{safe}.json")))
    }
}

impl TurnStateStore for JsonFileStateStore {
    fn load(&self, session_id: &str) -> anyhow::Result<Option<ConversationTurnState>> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// 父目录不存在时自动创建
    fn save(&self, session_id: &str, state: &ConversationTurnState) -> anyhow::Result<()> {
        let path = self.path_for(session_id)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("sessions"));
        assert!(store.load("s1").unwrap().is_none());

        let mut state = ConversationTurnState::new("user_123", "req_1");
        state.messages.push(Message::user("hello"));
        state.final_answer = Some("hi".into());
        store.save("s1", &state).unwrap();

        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.messages, state.messages);
        assert_eq!(loaded.final_answer.as_deref(), Some("hi"));
    }

    #[test]
    fn test_session_id_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path());
        let state = ConversationTurnState::new("u", "r");
        store.save("../../etc/passwd", &state).unwrap();
        assert!(dir.path().join("etcpasswd.json").exists());
        assert!(store.save("../..", &state).is_err());
    }
}
