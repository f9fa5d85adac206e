//! 对话消息
//!
//! 角色与 LLM API 一致，另加 Tool：工具观察结果，通过 [`ToolLink`] 关联到提出它的调用。

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 工具观察与工具调用的关联
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLink {
    pub call_id: String,
    pub tool: String,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_link: Option<ToolLink>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_link: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// 工具观察（成功输出或结构化错误的 JSON 文本）
    pub fn tool(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_link: Some(ToolLink {
                call_id: call_id.into(),
                tool: tool.into(),
            }),
        }
    }

    /// 发给只认 system/user/assistant 的后端时的文本形式
    pub fn prompt_text(&self) -> String {
        match (&self.role, &self.tool_link) {
            (Role::Tool, Some(link)) => format!(
                "Observation from {} (call {}): {}",
                link.tool, link.call_id, self.content
            ),
            (Role::Tool, None) => format!("Observation: {}", self.content),
            _ => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_prompt_text() {
        let m = Message::tool("c1", "track_shipment", r#"{"status":"in_transit"}"#);
        assert_eq!(m.role, Role::Tool);
        assert_eq!(
            m.prompt_text(),
            r#"Observation from track_shipment (call c1): {"status":"in_transit"}"#
        );
        assert_eq!(Message::user("hi").prompt_text(), "hi");
    }

    #[test]
    fn test_serde_skips_empty_link() {
        let v = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(v["role"], "user");
        assert!(v.get("tool_link").is_none());
    }
}
