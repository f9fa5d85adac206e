//! 知识检索：策略 / FAQ 片段
//!
//! 编排层只依赖 [`KnowledgeRetriever`]：`retrieve(query)` 返回按相关度排序的片段
//! （文本、引用、分数），同一索引同一查询结果确定。真实部署可接混合检索引擎；
//! 这里提供按关键词重叠打分的内存实现，附带几条默认政策文档。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub text: String,
    pub citation: String,
    pub score: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Knowledge base unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// 返回最多 top_k 条，按分数降序
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedSnippet>, RetrievalError>;
}

/// 空检索器：未配置知识库时使用
#[derive(Clone, Default)]
pub struct NoopRetriever;

#[async_trait]
impl KnowledgeRetriever for NoopRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        Ok(Vec::new())
    }
}

const STOP_WORDS: [&str; 16] = [
    "the", "is", "are", "my", "an", "of", "to", "for", "and", "or", "in", "on", "can", "do",
    "what", "how",
];

/// 小写、按非字母数字切分、去停用词
fn tokenize(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

struct Doc {
    citation: String,
    text: String,
    tokens: HashSet<String>,
}

/// 内存知识库：分数 = 查询词命中数 / 查询词数
pub struct InMemoryKnowledgeBase {
    docs: RwLock<Vec<Doc>>,
    top_k: usize,
}

impl InMemoryKnowledgeBase {
    pub fn new(top_k: usize) -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            top_k: top_k.max(1),
        }
    }

    /// 带默认政策文档
    pub fn seeded(top_k: usize) -> Self {
        let kb = Self::new(top_k);
        for (citation, text) in SEED_DOCS {
            kb.add(citation, text);
        }
        kb
    }

    pub fn add(&self, citation: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let doc = Doc {
            citation: citation.to_string(),
            text: text.to_string(),
            tokens: tokenize(text),
        };
        match self.docs.write() {
            Ok(mut docs) => docs.push(doc),
            Err(poisoned) => poisoned.into_inner().push(doc),
        }
    }

    pub fn len(&self) -> usize {
        match self.docs.read() {
            Ok(docs) => docs.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeRetriever for InMemoryKnowledgeBase {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let docs = match self.docs.read() {
            Ok(docs) => docs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut scored: Vec<RetrievedSnippet> = docs
            .iter()
            .filter_map(|doc| {
                let hits = query_tokens.intersection(&doc.tokens).count();
                (hits > 0).then(|| RetrievedSnippet {
                    text: doc.text.clone(),
                    citation: doc.citation.clone(),
                    score: hits as f64 / query_tokens.len() as f64,
                })
            })
            .collect();
        // 稳定排序：同分按入库顺序，保证结果确定
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.top_k);
        Ok(scored)
    }
}

/// 截断到 max_chars 个字符，被截断时追加 "..."
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

/// 拼接推理 prompt 中的参考资料块：`[n] 片段 (Source: 引用)`
pub fn format_reference_material(snippets: &[RetrievedSnippet], snippet_chars: usize) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "[{}] {} (Source: {})",
                i + 1,
                truncate_chars(&s.text, snippet_chars),
                s.citation
            )
        })
        .collect();
    format!("REFERENCE MATERIAL:\n{}", lines.join("\n\n"))
}

const SEED_DOCS: [(&str, &str); 6] = [
    (
        "refund_policy.md#eligibility",
        "Refund policy: refunds are available for orders that have shipped or been delivered, \
         within 30 days of purchase. Orders still processing can be cancelled instead of refunded. \
         Cancelled orders cannot be refunded.",
    ),
    (
        "refund_policy.md#limits",
        "Refund limits: a single refund issued by support is capped at $100.00. The total refunded \
         for an order can never exceed the order total. Larger refunds are reviewed by a human agent.",
    ),
    (
        "shipping_faq.md#tracking",
        "Shipping and tracking: once an order ships you receive a tracking id. Shipments in transit \
         usually arrive within 2 to 5 business days. Contact support if the estimated delivery date \
         has passed.",
    ),
    (
        "shipping_faq.md#damaged",
        "Damaged or missing items: report damaged items within 30 days of delivery. Support can issue \
         a partial refund for the damaged item once the order is shipped or delivered.",
    ),
    (
        "account_faq.md#password",
        "Password reset: a reset link is sent to the email address on file. Support can only start \
         a password reset for the account owner's email address. Reset links expire after 1 hour.",
    ),
    (
        "account_faq.md#contact",
        "Updating contact details: customers can change their email address and phone number. Phone \
         numbers must be in international E.164 format, for example +14155552671.",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_refund_query_ranks_policy_first() {
        let kb = InMemoryKnowledgeBase::seeded(3);
        let hits = kb.retrieve("What is the refund window for shipped orders?").await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.len() <= 3);
        assert_eq!(hits[0].citation, "refund_policy.md#eligibility");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let kb = InMemoryKnowledgeBase::seeded(5);
        let a = kb.retrieve("refund damaged item").await.unwrap();
        let b = kb.retrieve("refund damaged item").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_stop_words_only_query_is_empty() {
        let kb = InMemoryKnowledgeBase::seeded(5);
        assert!(kb.retrieve("what is the").await.unwrap().is_empty());
        assert!(NoopRetriever.retrieve("refund").await.unwrap().is_empty());
    }

    #[test]
    fn test_reference_material_format() {
        let snippets = vec![RetrievedSnippet {
            text: "abcdefghij".into(),
            citation: "doc.md".into(),
            score: 1.0,
        }];
        let block = format_reference_material(&snippets, 4);
        assert_eq!(block, "REFERENCE MATERIAL:\n[1] abcd... (Source: doc.md)");
        assert_eq!(format_reference_material(&[], 4), "");
    }
}
