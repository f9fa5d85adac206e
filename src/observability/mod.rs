//! 可观测性：结构化日志
//!
//! 默认级别由调用方给出，RUST_LOG 可覆盖。审计事件另外以 `audit` 字段写一条 info 日志。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（如测试中）时忽略
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
