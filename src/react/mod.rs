//! 认知层：意图分类、Planner、推理 / 工具循环、答案打分、过程事件

pub mod confidence;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod triage;

pub use confidence::{ConfidenceResult, ConfidenceScorer};
pub use events::TurnEvent;
pub use loop_::{LoopOutcome, ToolLoop};
pub use planner::{
    build_system_prompt, parse_planner_reply, Planner, PlannerOutput, ProposedCall,
    DEFAULT_SYSTEM_PROMPT,
};
pub use triage::{Intent, Triage};
