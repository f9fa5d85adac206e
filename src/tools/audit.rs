//! 工具审计日志
//!
//! 每次工具执行（整个重试序列）恰好一条事件：谁、什么、何时、参数、结果、耗时。
//! 追加写 JSONL，便于后续投递到 ELK / Datadog。写日志失败只告警，不影响工具调用结果。
//! 参数在落盘前脱敏（邮箱 / 手机号），递归处理嵌套对象与数组。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolErrorKind;

const EMAIL_KEYS: [&str; 2] = ["email", "new_email"];
const PHONE_KEYS: [&str; 3] = ["phone", "new_phone_e164", "phone_e164"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Error,
}

/// 审计事件；`sequence` 为逻辑序号（按提出顺序分配），与实际完成先后无关
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub user_id: String,
    pub actor: String,
    pub tool_name: String,
    pub redacted_args: Value,
    pub status: AuditStatus,
    pub error_kind: Option<ToolErrorKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// 邮箱：保留本地部分前两个字符 + 域名
pub fn mask_email(email: &str) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "***".to_string();
    };
    if local.chars().count() <= 2 {
        return format!("***@{domain}");
    }
    let head: String = local.chars().take(2).collect();
    format!("{head}***@{domain}")
}

/// 手机号：保留国家码（前两位）与末两位
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() < 6 {
        return "***".to_string();
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}

/// 递归脱敏：对象按键名识别 PII 字段，数组逐项处理
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let lk = k.to_lowercase();
                let masked = match v {
                    Value::String(s) if EMAIL_KEYS.contains(&lk.as_str()) => {
                        Value::String(mask_email(s))
                    }
                    Value::String(s) if PHONE_KEYS.contains(&lk.as_str()) => {
                        Value::String(mask_phone(s))
                    }
                    other => redact(other),
                };
                out.insert(k.clone(), masked);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// 审计落地接口：只追加
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> anyhow::Result<()>;
}

/// JSONL 文件 sink：每个事件一行，写入串行化
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, event: &AuditEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(event)?;
        let _guard = match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// 内存 sink（测试与嵌入式使用）
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, event: &AuditEvent) -> anyhow::Result<()> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

/// 审计记录器：脱敏后写入 sink；失败只记 warn，永不向上抛
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn jsonl(path: impl AsRef<Path>) -> Self {
        Self::new(Arc::new(JsonlAuditSink::new(path)))
    }

    pub fn log(&self, mut event: AuditEvent) {
        event.redacted_args = redact(&event.redacted_args);
        if let Err(e) = self.sink.append(&event) {
            tracing::warn!(
                request_id = %event.request_id,
                tool = %event.tool_name,
                "Audit write failed: {}",
                e
            );
        }
    }
}
