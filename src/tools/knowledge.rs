//! 知识库检索工具：返回带编号的片段，回答中以 [n] 引用

use std::sync::Arc;

use async_trait::async_trait;

use crate::retrieval::{truncate_chars, KnowledgeRetriever};
use crate::tools::schema::{KnowledgeHit, SearchKnowledgeBaseInput, SearchKnowledgeBaseOutput};
use crate::tools::{Tool, ToolContext, ToolError, ToolName};

pub struct SearchKnowledgeBaseTool {
    retriever: Arc<dyn KnowledgeRetriever>,
    snippet_chars: usize,
}

impl SearchKnowledgeBaseTool {
    pub fn new(retriever: Arc<dyn KnowledgeRetriever>, snippet_chars: usize) -> Self {
        Self {
            retriever,
            snippet_chars,
        }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeBaseTool {
    type Input = SearchKnowledgeBaseInput;
    type Output = SearchKnowledgeBaseOutput;

    fn name(&self) -> ToolName {
        ToolName::SearchKnowledgeBase
    }

    fn description(&self) -> &str {
        "Search the policy/FAQ knowledge base. Returns numbered snippets to cite as [n]. \
         Args: {\"query\": \"...\"}"
    }

    async fn run(&self, _ctx: &ToolContext, input: Self::Input) -> Result<Self::Output, ToolError> {
        // 检索服务不可用视为瞬时故障，交给网关重试
        let snippets = self
            .retriever
            .retrieve(&input.query)
            .await
            .map_err(|e| ToolError::Transient(e.to_string()))?;

        let results = snippets
            .into_iter()
            .enumerate()
            .map(|(i, s)| KnowledgeHit {
                n: i + 1,
                citation: s.citation,
                snippet: truncate_chars(&s.text, self.snippet_chars),
                score: (s.score * 10_000.0).round() / 10_000.0,
            })
            .collect();

        Ok(SearchKnowledgeBaseOutput { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{InMemoryKnowledgeBase, RetrievalError, RetrievedSnippet};

    struct DownRetriever;

    #[async_trait]
    impl KnowledgeRetriever for DownRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedSnippet>, RetrievalError> {
            Err(RetrievalError::Unavailable("index offline".into()))
        }
    }

    #[tokio::test]
    async fn test_hits_are_numbered_from_one() {
        let tool = SearchKnowledgeBaseTool::new(Arc::new(InMemoryKnowledgeBase::seeded(5)), 40);
        let ctx = ToolContext::customer("user_123", "req_1");
        let out = tool
            .run(&ctx, SearchKnowledgeBaseInput { query: "refund policy cap".into() })
            .await
            .unwrap();
        assert!(!out.results.is_empty());
        for (i, hit) in out.results.iter().enumerate() {
            assert_eq!(hit.n, i + 1);
            assert!(hit.snippet.chars().count() <= 43);
        }
    }

    #[tokio::test]
    async fn test_retriever_failure_is_transient() {
        let tool = SearchKnowledgeBaseTool::new(Arc::new(DownRetriever), 40);
        let ctx = ToolContext::customer("user_123", "req_1");
        let err = tool
            .run(&ctx, SearchKnowledgeBaseInput { query: "refund".into() })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
