//! 工具层共享类型：工具名白名单、调用上下文、调用请求与错误分类
//!
//! 工具是安全边界：名字是封闭枚举，参数在进入 handler 前必须经过校验，
//! 错误只分四类（NotFound / Validation / Policy / Transient），由网关统一处理。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 允许执行的工具名（封闭集合，运行期不可扩展）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetOrderStatus,
    TrackShipment,
    IssueRefund,
    UpdateContact,
    InitiatePasswordReset,
    SearchKnowledgeBase,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::GetOrderStatus,
        ToolName::TrackShipment,
        ToolName::IssueRefund,
        ToolName::UpdateContact,
        ToolName::InitiatePasswordReset,
        ToolName::SearchKnowledgeBase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetOrderStatus => "get_order_status",
            ToolName::TrackShipment => "track_shipment",
            ToolName::IssueRefund => "issue_refund",
            ToolName::UpdateContact => "update_contact",
            ToolName::InitiatePasswordReset => "initiate_password_reset",
            ToolName::SearchKnowledgeBase => "search_knowledge_base",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| ToolError::NotFound(format!("Tool not registered: {s}")))
    }
}

/// 调用方身份
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Agent,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::Customer => "customer",
            Actor::Agent => "agent",
            Actor::System => "system",
        }
    }
}

/// 每个请求一份的只读身份上下文（整轮对话内不变）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContext {
    user_id: String,
    request_id: String,
    actor: Actor,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, request_id: impl Into<String>, actor: Actor) -> Self {
        Self {
            user_id: user_id.into(),
            request_id: request_id.into(),
            actor,
        }
    }

    pub fn customer(user_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(user_id, request_id, Actor::Customer)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }
}

/// 推理步骤提出的工具调用；只能经由网关执行
///
/// `Unrecognized` 保留模型给出的原始名字与参数，网关会将其拒绝为 NotFound 或 ValidationError。
#[derive(Clone, Debug, PartialEq)]
pub enum ToolCall {
    Known {
        name: ToolName,
        args: Map<String, Value>,
    },
    Unrecognized {
        name: String,
        args: Value,
    },
}

impl ToolCall {
    pub fn new(name: ToolName, args: Value) -> Self {
        Self::from_parts(name.as_str(), args)
    }

    /// 由模型输出的 (name, args) 构造；null 参数视为空对象
    pub fn from_parts(name: &str, args: Value) -> Self {
        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        match (name.parse::<ToolName>(), args) {
            (Ok(name), Value::Object(args)) => ToolCall::Known { name, args },
            (_, args) => ToolCall::Unrecognized {
                name: name.to_string(),
                args,
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolCall::Known { name, .. } => name.as_str(),
            ToolCall::Unrecognized { name, .. } => name,
        }
    }

    pub fn args_value(&self) -> Value {
        match self {
            ToolCall::Known { args, .. } => Value::Object(args.clone()),
            ToolCall::Unrecognized { args, .. } => args.clone(),
        }
    }
}

/// 错误分类（写入审计与 Observation）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    NotFound,
    ValidationError,
    PolicyError,
    TransientError,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::ValidationError => "validation_error",
            ToolErrorKind::PolicyError => "policy_error",
            ToolErrorKind::TransientError => "transient_error",
        }
    }
}

/// 工具错误：只有 Transient 可重试
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Policy(String),

    #[error("{0}")]
    Transient(String),
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::NotFound(_) => ToolErrorKind::NotFound,
            ToolError::Validation(_) => ToolErrorKind::ValidationError,
            ToolError::Policy(_) => ToolErrorKind::PolicyError,
            ToolError::Transient(_) => ToolErrorKind::TransientError,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Transient(_))
    }

    /// 序列化为喂回推理步骤的 Observation
    pub fn to_observation(&self) -> Value {
        serde_json::json!({
            "error": self.kind().as_str(),
            "message": self.to_string(),
        })
    }
}
