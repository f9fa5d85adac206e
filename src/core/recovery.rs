//! Recovery Finalizer：推理循环未收敛时，仅基于已收集的证据合成回答
//!
//! 触发条件：回答为空，或是轮次上限标记。证据块中结构化观察美化输出，其余截断原文；
//! 推理服务失败或返回空时给出固定的澄清问题，绝不编造订单 / 物流 / 退款事实。

use std::sync::Arc;
use std::time::Duration;

use crate::core::EvidenceItem;
use crate::llm::{complete_within, LlmClient};
use crate::memory::Message;
use crate::retrieval::truncate_chars;

/// 轮次用尽时循环给出的内部标记
pub const ITERATION_LIMIT_MARKER: &str = "Agent stopped due to iteration limit or time limit.";

const STOP_PHRASES: [&str; 2] = [
    "Agent stopped due to iteration limit or time limit",
    "stopped due to iteration limit",
];

/// 每条证据在 prompt 中的最大字符数
const EVIDENCE_CHARS: usize = 2000;

/// 推理服务也无法给出回答时的澄清问题
pub const CLARIFYING_FALLBACK: &str = "I wasn't able to confirm the details needed to answer that yet. \
Could you share your order ID (or tracking number) and a short description of what you need help with?";

/// 回答是否需要进入 Recovery
pub fn needs_recovery(answer: &str) -> bool {
    let a = answer.trim();
    if a.is_empty() {
        return true;
    }
    let lower = a.to_lowercase();
    STOP_PHRASES.iter().any(|p| lower.contains(&p.to_lowercase()))
}

fn render_output(lines: &mut Vec<String>, text: &str) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(v) if v.is_object() || v.is_array() => {
            let pretty = serde_json::to_string_pretty(&v).unwrap_or_else(|_| text.to_string());
            lines.push("   OUTPUT(JSON):".to_string());
            lines.push(truncate_chars(&pretty, EVIDENCE_CHARS));
        }
        _ => {
            lines.push("   OUTPUT:".to_string());
            lines.push(truncate_chars(text, EVIDENCE_CHARS));
        }
    }
}

/// 证据块：工具观察与知识库片段，按证据链顺序编号
pub fn evidence_block(evidence: &[EvidenceItem]) -> String {
    if evidence.is_empty() {
        return "[no tool evidence collected]".to_string();
    }
    let mut lines = Vec::new();
    for (i, item) in evidence.iter().enumerate() {
        match item {
            EvidenceItem::ToolObservation(obs) => {
                lines.push(format!("{}. TOOL: {}", i + 1, obs.tool));
                lines.push(format!("   INPUT: {}", obs.args));
                render_output(&mut lines, &obs.content);
            }
            EvidenceItem::KnowledgeSnippet { n, citation, text } => {
                lines.push(format!("{}. KB [{n}] (Source: {citation})", i + 1));
                lines.push(truncate_chars(text, EVIDENCE_CHARS));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n").trim().to_string()
}

fn recovery_prompt(user_message: &str, evidence: &str) -> String {
    [
        "You are a customer service assistant.",
        "You must answer the user's question using ONLY the evidence below.",
        "",
        "RULES:",
        "- If evidence is insufficient, say what you still need and ask 1-2 clarifying questions.",
        "- Do not invent order status, shipment details, dates, or refund eligibility.",
        "- If evidence includes KB snippets with numbers [1], [2], cite them like [1] in the answer.",
        "",
        "USER QUESTION:",
        user_message,
        "",
        "EVIDENCE (tool outputs and KB snippets):",
        evidence,
        "",
        "Write a concise, helpful final answer:",
    ]
    .join("\n")
}

pub struct RecoveryFinalizer {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl RecoveryFinalizer {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 从证据合成回答；从不失败
    pub async fn recover(&self, user_message: &str, evidence: &[EvidenceItem]) -> String {
        let prompt = recovery_prompt(user_message, &evidence_block(evidence));
        let messages = vec![Message::system(prompt)];
        match complete_within(self.llm.as_ref(), &messages, self.timeout).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Recovery produced an empty answer");
                CLARIFYING_FALLBACK.to_string()
            }
            Err(e) => {
                tracing::warn!("Recovery failed: {}", e);
                CLARIFYING_FALLBACK.to_string()
            }
        }
    }
}
