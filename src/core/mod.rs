//! 核心编排层：错误、轮次状态、Recovery、工具并发调度、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;
pub mod task_scheduler;

pub use builder::{create_orchestrator_builder, OrchestratorBuilder};
pub use error::AgentError;
pub use orchestrator::{apply_confidence_gate, Orchestrator, TurnSettings};
pub use recovery::{needs_recovery, RecoveryFinalizer, ITERATION_LIMIT_MARKER};
pub use state::{ConversationTurnState, EvidenceItem, ToolObservation, TurnOutcome};
pub use task_scheduler::TaskScheduler;
