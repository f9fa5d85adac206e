//! 推理 / 工具循环
//!
//! Plan -> 解析 -> （工具调用则经网关执行并写回观察）-> 下一轮 Plan，直到得到纯文本回答或轮次用尽。
//! 同一轮提出的多个调用并发执行（受 TaskScheduler 信号量限制）；审计序号在执行前按提出顺序预留，
//! 观察按提出顺序写回，与完成先后无关。
//! 推理失败（LLM 错误、超时、回复解析失败）不在这里重试：返回空回答并附带原因，由编排器转入 Recovery。

use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::recovery::ITERATION_LIMIT_MARKER;
use crate::core::{ConversationTurnState, TaskScheduler, ToolObservation};
use crate::memory::{trim_history, Message};
use crate::react::events::send_event;
use crate::react::{parse_planner_reply, Planner, PlannerOutput, ProposedCall, TurnEvent};
use crate::retrieval::truncate_chars;
use crate::tools::{ToolContext, ToolError, ToolExecutor, ToolOutput};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 循环结果：answer 为空或为轮次上限标记时需要 Recovery
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub answer: String,
    pub iterations: usize,
    /// 推理失败原因（LLM 错误 / 解析失败）
    pub failure: Option<String>,
}

/// 工具循环配置
pub struct ToolLoop<'a> {
    planner: &'a Planner,
    executor: &'a ToolExecutor,
    scheduler: &'a TaskScheduler,
    max_iterations: usize,
    history_window: usize,
    event_tx: Option<&'a UnboundedSender<TurnEvent>>,
}

impl<'a> ToolLoop<'a> {
    pub fn new(planner: &'a Planner, executor: &'a ToolExecutor, scheduler: &'a TaskScheduler) -> Self {
        Self {
            planner,
            executor,
            scheduler,
            max_iterations: 6,
            history_window: 12,
            event_tx: None,
        }
    }

    pub fn with_limits(mut self, max_iterations: usize, history_window: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self.history_window = history_window.max(1);
        self
    }

    pub fn with_event_tx(mut self, tx: Option<&'a UnboundedSender<TurnEvent>>) -> Self {
        self.event_tx = tx;
        self
    }

    pub async fn run(
        &self,
        ctx: &ToolContext,
        system_prompt: &str,
        state: &mut ConversationTurnState,
    ) -> LoopOutcome {
        for iteration in 1..=self.max_iterations {
            send_event(
                self.event_tx,
                TurnEvent::Iteration {
                    iteration,
                    max_iterations: self.max_iterations,
                },
            );

            let history = trim_history(&state.messages, self.history_window);
            let parsed = match self.planner.plan(system_prompt, &history).await {
                Ok(reply) => parse_planner_reply(&reply).map(|out| (reply, out)),
                Err(e) => Err(e),
            };

            let (reply, output) = match parsed {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(request_id = %ctx.request_id(), iteration, "Reasoning step failed: {}", e);
                    return LoopOutcome {
                        answer: String::new(),
                        iterations: iteration,
                        failure: Some(e.to_string()),
                    };
                }
            };

            match output {
                PlannerOutput::Final(answer) => {
                    state.messages.push(Message::assistant(answer.clone()));
                    return LoopOutcome {
                        answer,
                        iterations: iteration,
                        failure: None,
                    };
                }
                PlannerOutput::ToolCalls(calls) => {
                    tracing::debug!(
                        request_id = %ctx.request_id(),
                        iteration,
                        calls = calls.len(),
                        "Executing proposed tool calls"
                    );
                    state.messages.push(Message::assistant(reply.trim().to_string()));
                    for p in &calls {
                        send_event(
                            self.event_tx,
                            TurnEvent::ToolCall {
                                call_id: p.id.clone(),
                                tool: p.call.name().to_string(),
                                args: p.call.args_value(),
                            },
                        );
                    }

                    let results = self.execute_calls(ctx, &calls).await;
                    for (p, result) in calls.iter().zip(results) {
                        self.record_observation(state, p, result);
                    }
                }
            }
        }

        tracing::warn!(
            request_id = %ctx.request_id(),
            max_iterations = self.max_iterations,
            "Reasoning loop hit iteration limit"
        );
        LoopOutcome {
            answer: ITERATION_LIMIT_MARKER.to_string(),
            iterations: self.max_iterations,
            failure: None,
        }
    }

    /// 并发执行；返回结果与 calls 一一对应
    async fn execute_calls(
        &self,
        ctx: &ToolContext,
        calls: &[ProposedCall],
    ) -> Vec<Result<ToolOutput, ToolError>> {
        let sequences: Vec<u64> = calls.iter().map(|_| self.executor.reserve_sequence()).collect();
        let runs = calls.iter().zip(sequences).map(|(p, sequence)| async move {
            // 工具并发限制：从 TaskScheduler 获取许可后再执行
            let _permit = self.scheduler.acquire_tool().await;
            self.executor.execute_sequenced(ctx, &p.call, sequence).await
        });
        join_all(runs).await
    }

    fn record_observation(
        &self,
        state: &mut ConversationTurnState,
        p: &ProposedCall,
        result: Result<ToolOutput, ToolError>,
    ) {
        let (ok, content) = match result {
            Ok(out) => (true, out.to_json().to_string()),
            Err(e) => (false, e.to_observation().to_string()),
        };
        let tool = p.call.name().to_string();

        send_event(
            self.event_tx,
            TurnEvent::Observation {
                call_id: p.id.clone(),
                tool: tool.clone(),
                ok,
                preview: truncate_chars(&content, OBSERVATION_PREVIEW_CHARS),
            },
        );

        state
            .messages
            .push(Message::tool(p.id.clone(), tool.clone(), content.clone()));
        state.observations.push(ToolObservation {
            call_id: p.id.clone(),
            tool,
            args: p.call.args_value(),
            ok,
            content,
        });
    }
}
