//! 编排层错误类型
//!
//! 工具错误（ToolError）不在这里：它们被序列化成 Observation 交回推理步骤。
//! AgentError 只描述推理循环自身无法继续的情况，由编排器转入 Recovery。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Iteration limit reached ({0})")]
    IterationLimit(usize),

    #[error("Config error: {0}")]
    Config(String),
}
