//! 一轮处理中的过程事件：供 CLI / 前端展示意图、检索、工具调用、观察与结果

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 意图分类结果
    Intent { intent: String },
    /// 检索到的片段数
    Retrieval { snippets: usize },
    /// 推理轮次（从 1 开始）
    Iteration { iteration: usize, max_iterations: usize },
    /// 提出的工具调用
    ToolCall {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        call_id: String,
        tool: String,
        ok: bool,
        preview: String,
    },
    /// 进入 Recovery
    Recovery { reason: String },
    /// 打分结果
    Confidence { confidence: f64, needs_human: bool },
    /// 最终回复
    Final { answer: String, needs_human: bool },
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
