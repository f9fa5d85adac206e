//! Confidence Scorer：对最终回答的独立评审
//!
//! 另起一次 LLM 调用（可配置独立的 judge 模型，避免自我认同），要求返回
//! `{"confidence", "needs_human", "reasons"}`。回复无法解析时给出保守分数：
//! 有证据 0.4，无证据 0.2，并强制 needs_human。打分器从不向外抛错。

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::EvidenceItem;
use crate::llm::{complete_within, parse_structured, schema_instruction, LlmClient, LlmError};
use crate::memory::Message;
use crate::retrieval::truncate_chars;

/// 每条观察在评审 prompt 中的最大字符数
const OBSERVATION_CHARS: usize = 800;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfidenceResult {
    /// 0.0 ..= 1.0
    pub confidence: f64,
    pub needs_human: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl ConfidenceResult {
    /// 评审失败时的保守分数
    pub fn fallback(has_evidence: bool) -> Self {
        Self {
            confidence: if has_evidence { 0.4 } else { 0.2 },
            needs_human: true,
            reasons: vec!["Judge parsing failed; falling back to conservative score.".to_string()],
        }
    }
}

/// 把证据链压成评审 prompt 用的文本
pub fn summarize_evidence(evidence: &[EvidenceItem]) -> String {
    if evidence.is_empty() {
        return "[no evidence collected]".to_string();
    }
    let mut lines = Vec::new();
    for (i, item) in evidence.iter().enumerate() {
        match item {
            EvidenceItem::KnowledgeSnippet { n, citation, text } => {
                lines.push(format!("{}. kb [{n}] source={citation}", i + 1));
                lines.push(format!("   snippet={}", truncate_chars(text, OBSERVATION_CHARS)));
            }
            EvidenceItem::ToolObservation(obs) => {
                lines.push(format!("{}. tool={} input={}", i + 1, obs.tool, obs.args));
                lines.push(format!(
                    "   observation={}",
                    truncate_chars(&obs.content, OBSERVATION_CHARS)
                ));
            }
        }
    }
    lines.join("\n")
}

fn judge_prompt(user_message: &str, answer: &str, evidence: &str) -> String {
    let schema = schema_instruction::<ConfidenceResult>();
    [
        "You are evaluating a customer support assistant answer for reliability.",
        schema.as_str(),
        "",
        "User message:",
        user_message,
        "",
        "Assistant answer:",
        answer,
        "",
        "Evidence (tool observations / KB snippets):",
        evidence,
        "",
        "Guidelines:",
        "- High confidence ONLY if answer is supported by evidence.",
        "- If tools errored or evidence is missing, lower confidence.",
        "- If the answer contains guessed specifics (dates, amounts, status), lower confidence.",
        "- needs_human=true if uncertain or user requests sensitive action.",
    ]
    .join("\n")
}

pub struct ConfidenceScorer {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl ConfidenceScorer {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn score(
        &self,
        user_message: &str,
        answer: &str,
        evidence: &[EvidenceItem],
    ) -> ConfidenceResult {
        let prompt = judge_prompt(user_message, answer, &summarize_evidence(evidence));
        let messages = vec![Message::system(prompt)];

        let judged = complete_within(self.llm.as_ref(), &messages, self.timeout)
            .await
            .and_then(|reply| parse_structured::<ConfidenceResult>(&reply))
            .and_then(|r| {
                if (0.0..=1.0).contains(&r.confidence) {
                    Ok(r)
                } else {
                    Err(LlmError::Parse(format!("confidence out of range: {}", r.confidence)))
                }
            });

        match judged {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Confidence judge failed: {}", e);
                ConfidenceResult::fallback(!evidence.is_empty())
            }
        }
    }
}
