pub mod account;
pub mod audit;
pub mod executor;
pub mod knowledge;
pub mod orders;
pub mod policy;
pub mod refund;
pub mod registry;
pub mod schema;
pub mod store;
pub mod types;

use std::sync::Arc;

pub use account::{InitiatePasswordResetTool, UpdateContactTool};
pub use audit::{AuditEvent, AuditLogger, AuditSink, AuditStatus, InMemoryAuditSink, JsonlAuditSink};
pub use executor::{RetryPolicy, SharedExecutor, ToolExecutor};
pub use knowledge::SearchKnowledgeBaseTool;
pub use orders::{GetOrderStatusTool, TrackShipmentTool};
pub use policy::PolicyLimits;
pub use refund::IssueRefundTool;
pub use registry::{RegisteredTool, Tool, ToolHandler, ToolRegistry};
pub use schema::ToolOutput;
pub use store::RecordStore;
pub use types::{Actor, ToolCall, ToolContext, ToolError, ToolErrorKind, ToolName};

use crate::config::AppConfig;
use crate::retrieval::KnowledgeRetriever;

/// 注册全部业务工具（启动时调用一次）
pub fn build_tool_registry(
    cfg: &AppConfig,
    store: Arc<RecordStore>,
    retriever: Arc<dyn KnowledgeRetriever>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(GetOrderStatusTool::new(store.clone()));
    registry.register(TrackShipmentTool::new(store.clone()));
    registry.register(IssueRefundTool::new(
        store.clone(),
        PolicyLimits::from(&cfg.policy),
    ));
    registry.register(UpdateContactTool::new(store.clone()));
    registry.register(InitiatePasswordResetTool::new(store));
    registry.register(SearchKnowledgeBaseTool::new(
        retriever,
        cfg.retrieval.snippet_chars,
    ));
    registry
}

/// 注册表 + 重试策略 + 审计记录器 组装成执行网关
pub fn build_executor(
    cfg: &AppConfig,
    store: Arc<RecordStore>,
    retriever: Arc<dyn KnowledgeRetriever>,
    audit: AuditLogger,
) -> SharedExecutor {
    let registry = build_tool_registry(cfg, store, retriever);
    tracing::info!(tools = registry.len(), "Tool registry ready");
    Arc::new(ToolExecutor::new(
        registry,
        RetryPolicy::from_config(&cfg.tools),
        audit,
    ))
}
