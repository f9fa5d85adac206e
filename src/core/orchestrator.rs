//! 编排器：一轮对话的状态机
//!
//! Triage -> (Retrieval) -> Reasoning ⇄ ToolExecution -> (Recovery) -> Confidence 闸门 -> 结果。
//! 每轮独立运行，不共享可变编排状态；挂起点只有推理服务、检索与工具调用。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::recovery::needs_recovery;
use crate::core::{ConversationTurnState, RecoveryFinalizer, TaskScheduler, TurnOutcome};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{Message, Role, TurnStateStore};
use crate::react::events::send_event;
use crate::react::{
    build_system_prompt, ConfidenceResult, ConfidenceScorer, Intent, Planner, ToolLoop, Triage,
    TurnEvent,
};
use crate::retrieval::{format_reference_material, KnowledgeRetriever};
use crate::tools::{SharedExecutor, ToolContext, ToolName};

/// 一轮处理用到的配置项
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub max_iterations: usize,
    pub history_window_size: usize,
    pub confidence_threshold: f64,
    pub safe_fallback_message: String,
    pub snippet_chars: usize,
}

impl From<&AppConfig> for TurnSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.agent.max_iterations,
            history_window_size: cfg.app.history_window_size,
            confidence_threshold: cfg.agent.confidence_threshold,
            safe_fallback_message: cfg.agent.safe_fallback_message.clone(),
            snippet_chars: cfg.retrieval.snippet_chars,
        }
    }
}

/// 置信度闸门：低于阈值时用安全兜底回复覆盖答案并强制转人工，不看打分器自己的 needs_human
pub fn apply_confidence_gate(
    answer: String,
    judged: ConfidenceResult,
    threshold: f64,
    safe_fallback: &str,
) -> TurnOutcome {
    if judged.confidence < threshold {
        let mut reasons = judged.reasons;
        reasons.push(format!(
            "Confidence {:.2} below threshold {:.2}; escalated to a human.",
            judged.confidence, threshold
        ));
        TurnOutcome {
            answer: safe_fallback.to_string(),
            confidence: judged.confidence,
            needs_human: true,
            reasons,
        }
    } else {
        TurnOutcome {
            answer,
            confidence: judged.confidence,
            needs_human: judged.needs_human,
            reasons: judged.reasons,
        }
    }
}

/// 根据配置与环境变量选择推理后端（OpenAI 兼容 / Mock）
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    create_client(cfg, &cfg.llm.model)
}

/// 打分用的后端：judge_model 未设置时沿用 model
pub(crate) fn create_judge_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let model = cfg.llm.judge_model.as_deref().unwrap_or(&cfg.llm.model);
    create_client(cfg, model)
}

fn create_client(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "mock" {
        tracing::info!("Using offline Mock LLM");
        return Arc::new(MockLlmClient);
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) => {
            let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), model, Some(&key));
            tracing::info!("Using OpenAI-compatible LLM ({})", client.model());
            Arc::new(client)
        }
        Err(_) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 编排器（由 OrchestratorBuilder 组装）
pub struct Orchestrator {
    pub(crate) triage: Triage,
    pub(crate) planner: Planner,
    pub(crate) scorer: ConfidenceScorer,
    pub(crate) recovery: RecoveryFinalizer,
    pub(crate) executor: SharedExecutor,
    pub(crate) scheduler: TaskScheduler,
    pub(crate) retriever: Arc<dyn KnowledgeRetriever>,
    pub(crate) state_store: Option<Arc<dyn TurnStateStore>>,
    pub(crate) system_prompt: String,
    pub(crate) settings: TurnSettings,
}

impl Orchestrator {
    pub fn executor(&self) -> &SharedExecutor {
        &self.executor
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// 单轮入口
    pub async fn run_turn(&self, user_id: &str, request_id: &str, user_message: &str) -> TurnOutcome {
        self.run_turn_with_events(user_id, request_id, user_message, None)
            .await
    }

    /// 单轮入口，过程事件发往 event_tx（前端展示用）
    pub async fn run_turn_with_events(
        &self,
        user_id: &str,
        request_id: &str,
        user_message: &str,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> TurnOutcome {
        let mut state = ConversationTurnState::new(user_id, request_id);
        self.process(&mut state, user_message, event_tx).await
    }

    /// 带会话恢复的一轮：加载上一轮快照（同一用户才沿用），结束后写回；存储失败只记日志
    pub async fn run_session_turn(
        &self,
        session_id: &str,
        user_id: &str,
        request_id: &str,
        user_message: &str,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> TurnOutcome {
        let previous = match &self.state_store {
            Some(store) => store.load(session_id).unwrap_or_else(|e| {
                tracing::warn!(session_id, "Failed to restore session state: {}", e);
                None
            }),
            None => None,
        };
        let mut state = match previous {
            Some(prev) if prev.user_id == user_id => ConversationTurnState::next_turn(prev, request_id),
            Some(_) => {
                tracing::warn!(session_id, "Session belongs to another user, starting fresh");
                ConversationTurnState::new(user_id, request_id)
            }
            None => ConversationTurnState::new(user_id, request_id),
        };

        let outcome = self.process(&mut state, user_message, event_tx).await;

        if let Some(store) = &self.state_store {
            if let Err(e) = store.save(session_id, &state) {
                tracing::warn!(session_id, "Failed to save session state: {}", e);
            }
        }
        outcome
    }

    async fn process(
        &self,
        state: &mut ConversationTurnState,
        user_message: &str,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> TurnOutcome {
        let request_id = state.request_id.clone();
        tracing::info!(request_id = %request_id, user_id = %state.user_id, "Turn started");
        state.messages.push(Message::user(user_message));

        // Triage
        state.intent = self.triage.classify(user_message).await;
        send_event(
            event_tx,
            TurnEvent::Intent {
                intent: state.intent.to_string(),
            },
        );

        // Retrieval：只对政策类问题
        if state.intent == Intent::PolicyQuery {
            match self.retriever.retrieve(user_message).await {
                Ok(snippets) => state.retrieved_evidence = snippets,
                Err(e) => tracing::warn!(request_id = %request_id, "Retrieval failed: {}", e),
            }
            send_event(
                event_tx,
                TurnEvent::Retrieval {
                    snippets: state.retrieved_evidence.len(),
                },
            );
        }

        let system_prompt = self.system_prompt_for(state);

        // Reasoning ⇄ ToolExecution
        let ctx = ToolContext::customer(state.user_id.clone(), request_id.clone());
        let outcome = ToolLoop::new(&self.planner, &self.executor, &self.scheduler)
            .with_limits(self.settings.max_iterations, self.settings.history_window_size)
            .with_event_tx(event_tx)
            .run(&ctx, &system_prompt, state)
            .await;

        let evidence = state.evidence_trail();
        let recovered = needs_recovery(&outcome.answer);
        let answer = if recovered {
            let reason = outcome.failure.clone().unwrap_or_else(|| {
                if outcome.answer.trim().is_empty() {
                    "empty answer".to_string()
                } else {
                    "iteration limit".to_string()
                }
            });
            tracing::info!(request_id = %request_id, reason = %reason, "Routing turn to recovery");
            send_event(event_tx, TurnEvent::Recovery { reason });
            self.recovery.recover(user_message, &evidence).await
        } else {
            outcome.answer
        };

        // Finalize
        let judged = self.scorer.score(user_message, &answer, &evidence).await;
        send_event(
            event_tx,
            TurnEvent::Confidence {
                confidence: judged.confidence,
                needs_human: judged.needs_human,
            },
        );
        let result = apply_confidence_gate(
            answer,
            judged,
            self.settings.confidence_threshold,
            &self.settings.safe_fallback_message,
        );

        // 历史中保留最终给用户的文本
        match state.messages.last_mut() {
            Some(last) if !recovered && last.role == Role::Assistant => {
                last.content = result.answer.clone();
            }
            _ => state.messages.push(Message::assistant(result.answer.clone())),
        }
        state.confidence = Some(result.confidence);
        state.needs_human = result.needs_human;
        state.reasons = result.reasons.clone();
        state.final_answer = Some(result.answer.clone());

        send_event(
            event_tx,
            TurnEvent::Final {
                answer: result.answer.clone(),
                needs_human: result.needs_human,
            },
        );
        tracing::info!(
            request_id = %request_id,
            intent = %state.intent,
            iterations = outcome.iterations,
            confidence = result.confidence,
            needs_human = result.needs_human,
            "Turn finished"
        );
        result
    }

    /// 有检索片段时不再暴露 search_knowledge_base，参考资料直接进 prompt
    fn system_prompt_for(&self, state: &ConversationTurnState) -> String {
        let registry = self.executor.registry();
        let (schema, reference) = if state.retrieved_evidence.is_empty() {
            (registry.to_schema_json(), String::new())
        } else {
            (
                registry.to_schema_json_filtered(|n| n != ToolName::SearchKnowledgeBase),
                format_reference_material(&state.retrieved_evidence, self.settings.snippet_chars),
            )
        };
        build_system_prompt(&self.system_prompt, &schema, &reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: &str = "Let me connect you with a human agent.";

    fn judged(confidence: f64, needs_human: bool) -> ConfidenceResult {
        ConfidenceResult {
            confidence,
            needs_human,
            reasons: vec!["judge".to_string()],
        }
    }

    #[test]
    fn test_low_confidence_forces_fallback() {
        let out = apply_confidence_gate("Shipped.".into(), judged(0.3, false), 0.75, FALLBACK);
        assert_eq!(out.answer, FALLBACK);
        assert!(out.needs_human);
        assert_eq!(out.confidence, 0.3);
        assert_eq!(out.reasons.len(), 2);
    }

    #[test]
    fn test_confident_answer_kept_with_judge_verdict() {
        let out = apply_confidence_gate("Shipped.".into(), judged(0.9, true), 0.75, FALLBACK);
        assert_eq!(out.answer, "Shipped.");
        assert!(out.needs_human);

        let out = apply_confidence_gate("Shipped.".into(), judged(0.75, false), 0.75, FALLBACK);
        assert_eq!(out.answer, "Shipped.");
        assert!(!out.needs_human);
        assert_eq!(out.reasons, vec!["judge".to_string()]);
    }

    #[test]
    fn test_mock_provider_selected() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        let llm = create_llm_from_config(&cfg);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }
}
