//! 记忆层：对话消息、上下文裁剪、会话状态持久化

pub mod conversation;
pub mod persistence;
pub mod trimming;

pub use conversation::{Message, Role, ToolLink};
pub use persistence::{JsonFileStateStore, TurnStateStore};
pub use trimming::trim_history;
