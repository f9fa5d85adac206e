//! Concierge - Rust 客服编排与工具执行网关
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器状态机、轮次状态、Recovery、工具并发调度
//! - **llm**: 推理服务客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 对话消息、历史裁剪、会话快照
//! - **observability**: 日志初始化
//! - **react**: 意图分类、Planner、推理 / 工具循环、置信度打分
//! - **retrieval**: 知识库检索抽象与内存实现
//! - **tools**: 工具白名单、参数校验、策略引擎、执行网关与审计

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod retrieval;
pub mod tools;
