//! 结构化输出：把 JSON Schema 注入 prompt，并从回复中提取、解析 JSON
//!
//! 回复可能是纯 JSON，也可能包在 ```json 代码块里，或前后夹带少量文字。

use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::llm::{complete_within, LlmClient, LlmError};
use crate::memory::Message;

/// 从回复中截取 JSON 文本：优先 ```json 代码块，其次第一个 '{' 到最后一个 '}'
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(end) = rest.find("```") {
            let inner = rest[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为目标类型；找不到 JSON 或字段不符都是 LlmError::Parse
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let json = extract_json(text)
        .ok_or_else(|| LlmError::Parse(format!("no JSON object in reply: {}", text.trim())))?;
    serde_json::from_str(json).map_err(|e| LlmError::Parse(format!("{e}: {json}")))
}

/// 要求模型只输出符合 T 的 JSON 的说明文字
pub fn schema_instruction<T: JsonSchema>() -> String {
    let schema = serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Return ONLY a JSON object (no prose, no Markdown) that matches this JSON Schema:\n{schema}"
    )
}

/// 一次结构化调用：prompt 末尾附加 schema 说明，回复解析为 T
pub async fn complete_structured<T: DeserializeOwned + JsonSchema>(
    llm: &dyn LlmClient,
    prompt: &str,
    timeout: Duration,
) -> Result<T, LlmError> {
    let messages = vec![
        Message::system(prompt.to_string()),
        Message::user(schema_instruction::<T>()),
    ];
    let reply = complete_within(llm, &messages, timeout).await?;
    if reply.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    parse_structured(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Verdict {
        ok: bool,
    }

    #[test]
    fn test_extract_plain_and_fenced() {
        assert_eq!(extract_json(r#"{"ok": true}"#), Some(r#"{"ok": true}"#));
        assert_eq!(
            extract_json("Here:\n```json\n{\"ok\": false}\n```\nthanks"),
            Some("{\"ok\": false}")
        );
        assert_eq!(extract_json("```\n{\"ok\": true}\n```"), Some("{\"ok\": true}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_structured() {
        let v: Verdict = parse_structured("sure {\"ok\": true} done").unwrap();
        assert_eq!(v, Verdict { ok: true });
        assert!(matches!(
            parse_structured::<Verdict>("{\"nope\": 1}"),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_schema_instruction_mentions_fields() {
        let s = schema_instruction::<Verdict>();
        assert!(s.contains("\"ok\""));
    }
}
