//! 工具执行网关
//!
//! 唯一的工具执行入口：白名单解析 -> 参数校验 -> 超时内调用 handler -> 仅对 Transient 指数退避重试 ->
//! 整个尝试序列结束后写一条审计事件（脱敏），并输出一行结构化 tracing 审计日志。
//! 网关本身不加全局锁；修改记录的 handler 自己负责单记录原子更新。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;

use crate::config::ToolsSection;
use crate::tools::audit::{AuditEvent, AuditLogger, AuditStatus};
use crate::tools::schema::ToolOutput;
use crate::tools::{RegisteredTool, ToolCall, ToolContext, ToolError, ToolRegistry};

/// 重试与超时参数
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &ToolsSection) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.tool_timeout_ms),
            max_retries: cfg.tool_max_retries,
            min_delay: Duration::from_millis(cfg.retry_min_delay_ms),
            max_delay: Duration::from_millis(cfg.retry_max_delay_ms.max(cfg.retry_min_delay_ms)),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }

    /// 第 attempt 次失败后的等待时间：min_delay * 2^(attempt-1)，截断到 max_delay
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ToolsSection::default())
    }
}

/// 一次执行的结果与尝试次数（供审计）
struct Attempted {
    result: Result<ToolOutput, ToolError>,
    attempts: u32,
}

/// 工具执行网关：持有注册表、重试策略与审计记录器
pub struct ToolExecutor {
    registry: ToolRegistry,
    policy: RetryPolicy,
    audit: AuditLogger,
    next_sequence: AtomicU64,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, policy: RetryPolicy, audit: AuditLogger) -> Self {
        Self {
            registry,
            policy,
            audit,
            next_sequence: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 预留一个审计序号；并发执行前按提出顺序调用，保证审计顺序可解释
    pub fn reserve_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// 执行一次工具调用（自动分配审计序号）
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let sequence = self.reserve_sequence();
        self.execute_sequenced(ctx, call, sequence).await
    }

    /// 使用预留序号执行
    pub async fn execute_sequenced(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
        sequence: u64,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();

        let attempted = match self.resolve(call) {
            Ok(tool) => self.run_with_controls(tool, ctx, call).await,
            Err(e) => Attempted {
                result: Err(e),
                attempts: 0,
            },
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.record(ctx, call, sequence, &attempted, duration_ms);
        attempted.result
    }

    /// 白名单解析：未知名字为 NotFound；已知名字但参数不是对象为 ValidationError
    fn resolve(&self, call: &ToolCall) -> Result<&RegisteredTool, ToolError> {
        match call {
            ToolCall::Known { name, .. } => self.registry.get(*name),
            ToolCall::Unrecognized { name, .. } => {
                let name = name.parse()?;
                self.registry.get(name)?;
                Err(ToolError::Validation(
                    "Invalid arguments: args must be a JSON object".to_string(),
                ))
            }
        }
    }

    async fn run_with_controls(
        &self,
        tool: &RegisteredTool,
        ctx: &ToolContext,
        call: &ToolCall,
    ) -> Attempted {
        let args = call.args_value();
        if let Err(e) = tool.handler.validate(&args) {
            return Attempted {
                result: Err(e),
                attempts: 0,
            };
        }

        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.policy.timeout, tool.handler.invoke(ctx, &args)).await {
                Ok(r) => r,
                Err(_) => Err(ToolError::Transient("Tool execution timed out.".to_string())),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::debug!(
                        tool = %tool.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient tool failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                result => {
                    return Attempted {
                        result,
                        attempts: attempt,
                    }
                }
            }
        }
    }

    fn record(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
        sequence: u64,
        attempted: &Attempted,
        duration_ms: u64,
    ) {
        let (status, error_kind, error_message) = match &attempted.result {
            Ok(_) => (AuditStatus::Success, None, None),
            Err(e) => (AuditStatus::Error, Some(e.kind()), Some(e.to_string())),
        };

        let event = AuditEvent {
            sequence,
            timestamp: Utc::now(),
            request_id: ctx.request_id().to_string(),
            user_id: ctx.user_id().to_string(),
            actor: ctx.actor().as_str().to_string(),
            tool_name: call.name().to_string(),
            redacted_args: call.args_value(),
            status,
            error_kind,
            error_message,
            attempts: attempted.attempts,
            duration_ms,
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "sequence": sequence,
            "request_id": ctx.request_id(),
            "tool": call.name(),
            "ok": status == AuditStatus::Success,
            "error_kind": error_kind.map(|k| k.as_str()),
            "attempts": attempted.attempts,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        self.audit.log(event);
    }
}

/// 便于多处共享的网关句柄
pub type SharedExecutor = Arc<ToolExecutor>;
