//! 编排器构建器：统一的初始化逻辑
//!
//! CLI 与测试共用同一套组装：推理后端、记录存储、知识库、审计、会话快照都可替换，未指定时按配置创建默认实现。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::orchestrator::{create_judge_llm_from_config, create_llm_from_config, TurnSettings};
use crate::core::{Orchestrator, RecoveryFinalizer, TaskScheduler};
use crate::llm::LlmClient;
use crate::memory::{JsonFileStateStore, TurnStateStore};
use crate::react::{ConfidenceScorer, Planner, Triage, DEFAULT_SYSTEM_PROMPT};
use crate::retrieval::{InMemoryKnowledgeBase, KnowledgeRetriever};
use crate::tools::{build_executor, AuditLogger, RecordStore};

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    system_prompt: String,
    llm: Option<Arc<dyn LlmClient>>,
    judge_llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<RecordStore>>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    audit: Option<AuditLogger>,
    state_store: Option<Arc<dyn TurnStateStore>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            llm: None,
            judge_llm: None,
            store: None,
            retriever: None,
            audit: None,
            state_store: None,
        }
    }

    /// 设置系统提示词
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// 从文件加载系统提示词；找不到时保留当前值
    pub fn with_system_prompt_from_file(mut self) -> Self {
        if let Some(prompt) = ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .filter(|p| !p.trim().is_empty())
        {
            self.system_prompt = prompt;
        }
        self
    }

    /// 推理后端；未设置 judge 时打分也用它
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_judge_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.judge_llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn TurnStateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// 获取配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> Orchestrator {
        let cfg = &self.config;
        let timeout = Duration::from_secs(cfg.llm.timeouts.request.max(1));

        let (llm, judge_llm) = match (self.llm, self.judge_llm) {
            (Some(llm), Some(judge)) => (llm, judge),
            (Some(llm), None) => (llm.clone(), llm),
            (None, Some(judge)) => (create_llm_from_config(cfg), judge),
            (None, None) => (create_llm_from_config(cfg), create_judge_llm_from_config(cfg)),
        };

        let store = self.store.unwrap_or_else(|| Arc::new(RecordStore::seeded()));
        let retriever = self
            .retriever
            .unwrap_or_else(|| Arc::new(InMemoryKnowledgeBase::seeded(cfg.retrieval.top_k)));
        let audit = self
            .audit
            .unwrap_or_else(|| AuditLogger::jsonl(cfg.audit.path()));
        let state_store = self.state_store.or_else(|| {
            cfg.app
                .state_dir
                .as_ref()
                .map(|dir| Arc::new(JsonFileStateStore::new(dir)) as Arc<dyn TurnStateStore>)
        });

        let executor = build_executor(cfg, store, retriever.clone(), audit);

        Orchestrator {
            triage: Triage::new(llm.clone(), timeout),
            planner: Planner::new(llm.clone(), timeout),
            scorer: ConfidenceScorer::new(judge_llm, timeout),
            recovery: RecoveryFinalizer::new(llm, timeout),
            executor,
            scheduler: TaskScheduler::new(cfg.agent.max_concurrent_tools),
            retriever,
            state_store,
            system_prompt: self.system_prompt,
            settings: TurnSettings::from(cfg),
        }
    }
}

/// 便捷函数：加载配置（失败时用默认值）并从默认路径读取系统提示词
pub fn create_orchestrator_builder(config_path: Option<PathBuf>) -> OrchestratorBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    OrchestratorBuilder::new(config).with_system_prompt_from_file()
}
