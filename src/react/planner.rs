//! Planner：推理步骤与回复解析
//!
//! 推理服务只能回复两种形式：纯文本（最终回答），或一个 JSON 对象
//! `{"tool_calls": [{"id", "name", "args"}]}` / `{"answer": "..."}`。
//! 以 JSON 开头（对象或 ```json 代码块）却不符合上述结构的回复是解析失败，由编排器转入 Recovery。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::{complete_within, extract_json, LlmClient};
use crate::memory::Message;
use crate::tools::ToolCall;

/// 推理步骤提出的一次调用（带模型给出的 id，用于关联观察）
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedCall {
    pub id: String,
    pub call: ToolCall,
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Final(String),
    /// 需要执行工具（按提出顺序）
    ToolCalls(Vec<ProposedCall>),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReply {
    ToolCalls { tool_calls: Vec<RawCall> },
    Answer { answer: String },
}

fn looks_like_json(text: &str) -> bool {
    text.starts_with('{') || text.starts_with("```json") || text.starts_with("```\n{")
}

/// 解析推理回复
pub fn parse_planner_reply(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();
    if !looks_like_json(trimmed) {
        return Ok(PlannerOutput::Final(trimmed.to_string()));
    }

    let json_str = extract_json(trimmed)
        .ok_or_else(|| AgentError::JsonParseError(format!("unterminated JSON: {trimmed}")))?;
    let reply: RawReply = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json_str)))?;

    match reply {
        RawReply::Answer { answer } => Ok(PlannerOutput::Final(answer.trim().to_string())),
        RawReply::ToolCalls { tool_calls } if tool_calls.is_empty() => Err(
            AgentError::JsonParseError("tool_calls must not be empty".to_string()),
        ),
        RawReply::ToolCalls { tool_calls } => Ok(PlannerOutput::ToolCalls(
            tool_calls
                .into_iter()
                .enumerate()
                .map(|(i, raw)| ProposedCall {
                    id: raw
                        .id
                        .filter(|id| !id.trim().is_empty())
                        .unwrap_or_else(|| format!("call_{}", i + 1)),
                    call: ToolCall::from_parts(&raw.name, raw.args),
                })
                .collect(),
        )),
    }
}

/// 默认基础指令（可被 config/prompts/system.md 覆盖）
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful customer service assistant for an e-commerce store.
Use the provided tools to assist with orders, refunds, shipment tracking, contact details and password resets.
Never guess order, shipment or refund facts: look them up with a tool.
If you have Reference Material, use it to answer questions. Cite sources like [1].
If a tool returns an error, explain it to the customer in plain language.
If you cannot help, politely decline.";

/// 拼接完整 system prompt：基础指令 + 回复协议与工具定义 + 参考资料
pub fn build_system_prompt(base: &str, tool_schema: &str, reference_material: &str) -> String {
    let mut prompt = format!(
        "{base}\n\n## Reply format\n\
         Reply with plain text when you have the final answer for the customer.\n\
         To use tools, reply with ONLY one JSON object and nothing else:\n\
         {{\"tool_calls\": [{{\"id\": \"c1\", \"name\": \"<tool name>\", \"args\": {{...}}}}]}}\n\
         Independent calls may be listed together. Tool results come back as observations.\n\n\
         ## Tools (args must match the JSON Schema in \"parameters\")\n```json\n{tool_schema}\n```"
    );
    if !reference_material.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(reference_material);
    }
    prompt
}

/// Planner：持有 LLM 与请求超时，plan(system, history) 调用一次推理服务
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan(&self, system: &str, history: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = vec![Message::system(system.to_string())];
        full_messages.extend(history.iter().cloned());
        Ok(complete_within(self.llm.as_ref(), &full_messages, self.timeout).await?)
    }
}
