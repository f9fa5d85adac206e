//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）、结构化输出

pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use structured::{complete_structured, extract_json, parse_structured, schema_instruction};
pub use traits::{complete_within, LlmClient, LlmError};
