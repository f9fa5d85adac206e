//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONCIERGE__*` 覆盖（双下划线表示嵌套，如 `CONCIERGE__AGENT__MAX_ITERATIONS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
}

/// [app] 段：应用名、对话历史窗口、会话快照目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 推理时保留的历史消息条数（system 消息不计）
    #[serde(default = "default_history_window_size")]
    pub history_window_size: usize,
    /// 会话状态快照目录；未设置时不持久化
    pub state_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window_size: default_history_window_size(),
            state_dir: None,
        }
    }
}

fn default_history_window_size() -> usize {
    12
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 打分用的模型；未设置时与 model 相同
    pub judge_model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            judge_model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：推理循环上限、置信度闸门、工具并发
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Reasoning ⇄ ToolExecution 最大轮数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 低于此分数时用安全兜底回复覆盖答案
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// 同一推理步内工具并发上限
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
    #[serde(default = "default_safe_fallback_message")]
    pub safe_fallback_message: String,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            confidence_threshold: default_confidence_threshold(),
            max_concurrent_tools: default_max_concurrent_tools(),
            safe_fallback_message: default_safe_fallback_message(),
        }
    }
}

fn default_max_iterations() -> usize {
    6
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn default_max_concurrent_tools() -> usize {
    3
}

fn default_safe_fallback_message() -> String {
    "I want to make sure you get an accurate answer, so I'm passing this conversation to a \
     member of our support team. Could you share any extra details (such as your order ID) \
     while they take a look?"
        .to_string()
}

/// [tools] 段：单次调用超时与重试退避
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（毫秒）
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// 仅对 TransientError 重试；总尝试次数 = 1 + tool_max_retries
    #[serde(default = "default_tool_max_retries")]
    pub tool_max_retries: u32,
    #[serde(default = "default_retry_min_delay_ms")]
    pub retry_min_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_ms: default_tool_timeout_ms(),
            tool_max_retries: default_tool_max_retries(),
            retry_min_delay_ms: default_retry_min_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_tool_timeout_ms() -> u64 {
    8_000
}

fn default_tool_max_retries() -> u32 {
    2
}

fn default_retry_min_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    2_000
}

/// [policy] 段：退款时间窗与单笔上限（美元）
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySection {
    #[serde(default = "default_refund_window_days")]
    pub refund_window_days: i64,
    #[serde(default = "default_refund_max_amount")]
    pub refund_max_amount: f64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            refund_window_days: default_refund_window_days(),
            refund_max_amount: default_refund_max_amount(),
        }
    }
}

fn default_refund_window_days() -> i64 {
    30
}

fn default_refund_max_amount() -> f64 {
    100.0
}

/// [audit] 段：JSONL 审计日志位置
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_audit_file_name")]
    pub file_name: String,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            dir: default_audit_dir(),
            file_name: default_audit_file_name(),
        }
    }
}

impl AuditSection {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("data/audit")
}

fn default_audit_file_name() -> String {
    "tool_calls.jsonl".to_string()
}

/// [retrieval] 段：知识库检索条数与片段截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_snippet_chars() -> usize {
    400
}

/// 从 config 目录加载配置，环境变量 CONCIERGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONCIERGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONCIERGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
