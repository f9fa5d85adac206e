//! 一轮对话的状态与结果
//!
//! ConversationTurnState 在一轮开始时创建，由编排器每一步修改，结束时丢弃或交给 TurnStateStore。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::Message;
use crate::react::Intent;
use crate::retrieval::RetrievedSnippet;

/// 一次工具执行的观察（成功输出或结构化错误）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolObservation {
    pub call_id: String,
    pub tool: String,
    pub args: Value,
    pub ok: bool,
    /// 序列化后的 JSON 文本
    pub content: String,
}

/// 证据链中的一项：给打分与 Recovery 使用
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceItem {
    KnowledgeSnippet {
        n: usize,
        citation: String,
        text: String,
    },
    ToolObservation(ToolObservation),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurnState {
    pub messages: Vec<Message>,
    pub user_id: String,
    pub request_id: String,
    pub intent: Intent,
    pub retrieved_evidence: Vec<RetrievedSnippet>,
    pub observations: Vec<ToolObservation>,
    pub confidence: Option<f64>,
    pub needs_human: bool,
    pub reasons: Vec<String>,
    pub final_answer: Option<String>,
}

impl ConversationTurnState {
    pub fn new(user_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            user_id: user_id.into(),
            request_id: request_id.into(),
            intent: Intent::General,
            retrieved_evidence: Vec::new(),
            observations: Vec::new(),
            confidence: None,
            needs_human: false,
            reasons: Vec::new(),
            final_answer: None,
        }
    }

    /// 在上一轮保存的状态上开启新一轮：保留消息，清空本轮字段
    pub fn next_turn(previous: ConversationTurnState, request_id: impl Into<String>) -> Self {
        Self {
            messages: previous.messages,
            ..Self::new(previous.user_id, request_id)
        }
    }

    /// 检索片段（按编号）+ 工具观察（按提出顺序）
    pub fn evidence_trail(&self) -> Vec<EvidenceItem> {
        self.retrieved_evidence
            .iter()
            .enumerate()
            .map(|(i, s)| EvidenceItem::KnowledgeSnippet {
                n: i + 1,
                citation: s.citation.clone(),
                text: s.text.clone(),
            })
            .chain(
                self.observations
                    .iter()
                    .cloned()
                    .map(EvidenceItem::ToolObservation),
            )
            .collect()
    }
}

/// 对外返回的一轮结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub answer: String,
    pub confidence: f64,
    pub needs_human: bool,
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evidence_trail_orders_snippets_before_observations() {
        let mut state = ConversationTurnState::new("user_123", "req_1");
        state.retrieved_evidence.push(RetrievedSnippet {
            text: "Refunds within 30 days.".into(),
            citation: "refund_policy.md".into(),
            score: 0.9,
        });
        state.observations.push(ToolObservation {
            call_id: "c1".into(),
            tool: "get_order_status".into(),
            args: json!({"order_id": "ord_XYZ78901"}),
            ok: true,
            content: "{}".into(),
        });
        let trail = state.evidence_trail();
        assert_eq!(trail.len(), 2);
        assert!(matches!(trail[0], EvidenceItem::KnowledgeSnippet { n: 1, .. }));
        assert!(matches!(trail[1], EvidenceItem::ToolObservation(_)));
    }

    #[test]
    fn test_next_turn_keeps_messages_only() {
        let mut prev = ConversationTurnState::new("user_123", "req_1");
        prev.messages.push(Message::user("hi"));
        prev.final_answer = Some("hello".into());
        prev.needs_human = true;
        let next = ConversationTurnState::next_turn(prev, "req_2");
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.request_id, "req_2");
        assert!(next.final_answer.is_none());
        assert!(!next.needs_human);
    }
}
