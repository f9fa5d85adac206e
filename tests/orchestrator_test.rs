//! 编排器端到端测试：推理 / 工具循环、置信度闸门、Recovery、会话恢复

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use concierge::config::AppConfig;
    use concierge::core::{Orchestrator, OrchestratorBuilder};
    use concierge::llm::{LlmClient, MockLlmClient, ScriptedLlmClient};
    use concierge::memory::{JsonFileStateStore, Role, TurnStateStore};
    use concierge::react::TurnEvent;
    use concierge::tools::{AuditLogger, AuditStatus, InMemoryAuditSink, RecordStore, ToolErrorKind};
    use tokio::sync::mpsc;

    const QUESTION: &str = "Where is my order ord_XYZ78901?";
    const TRACK_CALL: &str = r#"{"tool_calls": [{"id": "c1", "name": "track_shipment", "args": {"order_id": "ord_XYZ78901"}}]}"#;
    const CONFIDENT: &str = r#"{"confidence": 0.9, "needs_human": false, "reasons": ["grounded in tool output"]}"#;

    fn orchestrator(
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
    ) -> (Orchestrator, Arc<RecordStore>, InMemoryAuditSink) {
        let store = Arc::new(RecordStore::seeded());
        let sink = InMemoryAuditSink::default();
        let orchestrator = OrchestratorBuilder::new(cfg)
            .with_llm(llm)
            .with_store(store.clone())
            .with_audit(AuditLogger::new(Arc::new(sink.clone())))
            .build();
        (orchestrator, store, sink)
    }

    fn scripted(replies: &[&str]) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::new(replies.iter().copied()))
    }

    #[tokio::test]
    async fn test_owner_gets_tool_derived_answer() {
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            TRACK_CALL,
            "Your order is in transit with UPS (tracking trk_ABC12345).",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(AppConfig::default(), llm.clone());

        let out = orch.run_turn("user_123", "req_1", QUESTION).await;
        assert_eq!(out.answer, "Your order is in transit with UPS (tracking trk_ABC12345).");
        assert!(!out.needs_human);
        assert_eq!(out.confidence, 0.9);

        // 第二次推理看到了工具观察
        let calls = llm.calls();
        assert_eq!(calls.len(), 4);
        let observation = calls[2]
            .iter()
            .find(|m| m.role == Role::Tool)
            .expect("observation message");
        assert!(observation.content.contains("in_transit"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool_name, "track_shipment");
        assert_eq!(events[0].status, AuditStatus::Success);
        assert_eq!(events[0].user_id, "user_123");
    }

    #[tokio::test]
    async fn test_other_user_gets_policy_refusal() {
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            TRACK_CALL,
            "Sorry, I can't share details about that order from this account.",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(AppConfig::default(), llm.clone());

        let out = orch.run_turn("user_999", "req_2", QUESTION).await;
        assert!(!out.answer.contains("in_transit"));
        assert!(!out.answer.contains("UPS"));

        let observation = llm.calls()[2]
            .iter()
            .find(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        assert!(observation.contains("policy_error"));
        assert!(!observation.contains("trk_ABC12345"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error_kind, Some(ToolErrorKind::PolicyError));
    }

    #[tokio::test]
    async fn test_other_user_tracking_number_is_refused() {
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            r#"{"tool_calls": [{"id": "c1", "name": "track_shipment", "args": {"tracking_id": "trk_ABC12345"}}]}"#,
            "Sorry, I can't share details about that shipment from this account.",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(AppConfig::default(), llm.clone());

        let out = orch
            .run_turn("user_999", "req_2b", "Where is trk_ABC12345?")
            .await;
        assert!(!out.answer.contains("UPS"));

        let observation = llm.calls()[2]
            .iter()
            .find(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        assert!(observation.contains("policy_error"));
        assert!(!observation.contains("UPS"));
        assert!(!observation.contains("in_transit"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error_kind, Some(ToolErrorKind::PolicyError));
    }

    #[tokio::test]
    async fn test_offline_mock_end_to_end() {
        let (orch, _store, _sink) = orchestrator(AppConfig::default(), Arc::new(MockLlmClient));

        let owner = orch.run_turn("user_123", "req_3", QUESTION).await;
        assert!(owner.answer.contains("in_transit"), "{}", owner.answer);

        let stranger = orch.run_turn("user_999", "req_4", QUESTION).await;
        assert!(
            stranger.answer.contains("can't share or change details for that order"),
            "{}",
            stranger.answer
        );
        assert!(!stranger.answer.contains("policy_error"));
        assert!(!stranger.answer.contains("in_transit"));
    }

    #[tokio::test]
    async fn test_low_confidence_overrides_answer() {
        let llm = scripted(&[
            r#"{"intent": "general"}"#,
            "Your order will arrive tomorrow.",
            r#"{"confidence": 0.3, "needs_human": false, "reasons": ["guessed date"]}"#,
        ]);
        let cfg = AppConfig::default();
        let fallback = cfg.agent.safe_fallback_message.clone();
        let (orch, _store, _sink) = orchestrator(cfg, llm);

        let out = orch.run_turn("user_123", "req_5", "When will it arrive?").await;
        assert_eq!(out.answer, fallback);
        assert!(out.needs_human);
        assert_eq!(out.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_unparseable_judge_is_conservative() {
        let llm = scripted(&[r#"{"intent": "general"}"#, "Hello! How can I help?", "great answer"]);
        let (orch, _store, _sink) = orchestrator(AppConfig::default(), llm);

        let out = orch.run_turn("user_123", "req_6", "hi").await;
        assert_eq!(out.confidence, 0.2);
        assert!(out.needs_human);
    }

    #[tokio::test]
    async fn test_malformed_reply_routes_to_recovery() {
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            r#"{"tool_calls": [{"name": "track_shipment""#,
            "Could you confirm your order ID so I can look it up?",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(AppConfig::default(), llm.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let out = orch
            .run_turn_with_events("user_123", "req_7", QUESTION, Some(&tx))
            .await;
        drop(tx);
        assert_eq!(out.answer, "Could you confirm your order ID so I can look it up?");
        assert!(sink.events().is_empty());
        assert!(llm.calls()[2][0].content.contains("using ONLY the evidence below"));

        let mut saw_recovery = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, TurnEvent::Recovery { .. }) {
                saw_recovery = true;
            }
        }
        assert!(saw_recovery);
    }

    #[tokio::test]
    async fn test_slow_llm_times_out_into_recovery() {
        let mut cfg = AppConfig::default();
        cfg.llm.timeouts.request = 1;
        let fallback = cfg.agent.safe_fallback_message.clone();
        let llm = Arc::new(
            ScriptedLlmClient::new([r#"{"intent": "account_action"}"#, TRACK_CALL, CONFIDENT])
                .with_delay(Duration::from_secs(3)),
        );
        let (orch, _store, sink) = orchestrator(cfg, llm.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let out = tokio::time::timeout(
            Duration::from_secs(30),
            orch.run_turn_with_events("user_123", "req_7b", QUESTION, Some(&tx)),
        )
        .await
        .expect("turn finished instead of hanging");
        drop(tx);

        // Recovery 与评审同样超时：澄清回答被置信度闸门替换为安全回复
        assert_eq!(out.answer, fallback);
        assert!(out.needs_human);
        assert_eq!(out.confidence, 0.2);
        assert!(sink.events().is_empty());
        // 超时的请求没有消费回复
        assert_eq!(llm.remaining(), 3);

        let mut saw_recovery = false;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, TurnEvent::Recovery { .. }) {
                saw_recovery = true;
            }
        }
        assert!(saw_recovery);
    }

    #[tokio::test]
    async fn test_iteration_limit_routes_to_recovery_with_evidence() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_iterations = 2;
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            TRACK_CALL,
            TRACK_CALL,
            "Your package is in transit [per tracking].",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(cfg, llm.clone());

        let out = orch.run_turn("user_123", "req_8", QUESTION).await;
        assert_eq!(out.answer, "Your package is in transit [per tracking].");
        assert_eq!(sink.events().len(), 2);

        let recovery_prompt = &llm.calls()[3][0].content;
        assert!(recovery_prompt.contains("TOOL: track_shipment"));
        assert!(recovery_prompt.contains("in_transit"));
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_parallel_calls_observed_in_proposal_order() {
        let llm = scripted(&[
            r#"{"intent": "account_action"}"#,
            r#"{"tool_calls": [
                {"id": "a", "name": "get_order_status", "args": {"order_id": "ord_XYZ78901"}},
                {"id": "b", "name": "track_shipment", "args": {"tracking_id": "trk_ABC12345"}}
            ]}"#,
            "Your order has shipped and is in transit.",
            CONFIDENT,
        ]);
        let (orch, _store, sink) = orchestrator(AppConfig::default(), llm.clone());
        orch.run_turn("user_123", "req_9", "Status of ord_XYZ78901 please").await;

        let tool_ids: Vec<String> = llm.calls()[2]
            .iter()
            .filter_map(|m| m.tool_link.as_ref().map(|l| l.call_id.clone()))
            .collect();
        assert_eq!(tool_ids, vec!["a".to_string(), "b".to_string()]);

        let mut events = sink.events();
        events.sort_by_key(|e| e.sequence);
        assert_eq!(events[0].tool_name, "get_order_status");
        assert_eq!(events[1].tool_name, "track_shipment");
    }

    #[tokio::test]
    async fn test_policy_query_injects_reference_material() {
        let llm = scripted(&[
            r#"{"intent": "policy_query"}"#,
            "Refunds are available within 30 days of purchase [1].",
            CONFIDENT,
        ]);
        let (orch, _store, _sink) = orchestrator(AppConfig::default(), llm.clone());
        let out = orch
            .run_turn("user_123", "req_10", "What is the refund policy for damaged items?")
            .await;
        assert!(out.answer.contains("[1]"));

        let system = &llm.calls()[1][0].content;
        assert!(system.contains("REFERENCE MATERIAL"));
        assert!(system.contains("refund_policy.md"));
        assert!(!system.contains("\"search_knowledge_base\""));
    }

    #[tokio::test]
    async fn test_session_state_restored_between_turns() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStateStore::new(dir.path()));
        let llm = scripted(&[
            r#"{"intent": "general"}"#,
            "Hello! How can I help?",
            CONFIDENT,
            r#"{"intent": "general"}"#,
            "Sure, happy to help with that.",
            CONFIDENT,
        ]);
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(llm.clone())
            .with_audit(AuditLogger::new(Arc::new(InMemoryAuditSink::default())))
            .with_state_store(store.clone())
            .build();

        orch.run_session_turn("sess_1", "user_123", "req_a", "hi there", None)
            .await;
        orch.run_session_turn("sess_1", "user_123", "req_b", "can you help me?", None)
            .await;

        let second_plan = &llm.calls()[4];
        assert!(second_plan.iter().any(|m| m.content == "hi there"));
        assert!(second_plan
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == "Hello! How can I help?"));

        let saved = store.load("sess_1").unwrap().expect("saved state");
        assert_eq!(saved.request_id, "req_b");
        assert_eq!(saved.messages.len(), 4);
        assert_eq!(saved.final_answer.as_deref(), Some("Sure, happy to help with that."));
    }
}
