//! Triage：意图分类
//!
//! 结构化输出 {"intent": ...}；任何失败（请求错误、超时、解析失败）都回退为 General，不中断本轮。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{complete_structured, LlmClient};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PolicyQuery,
    AccountAction,
    #[default]
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PolicyQuery => "policy_query",
            Intent::AccountAction => "account_action",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TriageOutput {
    /// 用户意图分类
    intent: Intent,
}

const TRIAGE_PROMPT: &str = "You are a triage expert for a customer service bot.

Classify the user's intent into one of these categories:
- 'policy_query': Questions about refunds, shipping times, rules, 'how to', or info.
- 'account_action': Requests to DO something: check order, refund, update email, track package.
- 'general': Greetings, thank yous, or out-of-scope chatter.

User Message: {message}";

pub struct Triage {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Triage {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn classify(&self, user_message: &str) -> Intent {
        let prompt = TRIAGE_PROMPT.replace("{message}", user_message);
        match complete_structured::<TriageOutput>(self.llm.as_ref(), &prompt, self.timeout).await {
            Ok(out) => out.intent,
            Err(e) => {
                tracing::warn!("Triage failed, defaulting to general: {}", e);
                Intent::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn triage(replies: &[&str]) -> Triage {
        Triage::new(
            Arc::new(ScriptedLlmClient::new(replies.iter().copied())),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_classifies_structured_reply() {
        let t = triage(&[r#"{"intent": "policy_query"}"#]);
        assert_eq!(t.classify("What is your refund policy?").await, Intent::PolicyQuery);
    }

    #[tokio::test]
    async fn test_bad_reply_defaults_to_general() {
        assert_eq!(triage(&["policy, probably"]).classify("?").await, Intent::General);
        assert_eq!(triage(&[r#"{"intent": "billing"}"#]).classify("?").await, Intent::General);
        assert_eq!(triage(&[]).classify("?").await, Intent::General);
    }
}
