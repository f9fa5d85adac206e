//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient：complete（非流式）。
//! 编排层所有调用都经由 [`complete_within`] 加上请求超时。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM output parse error: {0}")]
    Parse(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 带超时的一次完成；超时归为 LlmError::Timeout
pub async fn complete_within(
    llm: &dyn LlmClient,
    messages: &[Message],
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, llm.complete(messages)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}
