use std::sync::Arc;

use tracing::info;

use super::{ChainError, ChainOutput, prompt};
use crate::llm::ChatModel;
use crate::retriever::Retriever;

pub struct RetrievalQaChain {
    llm: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    return_source_documents: bool,
}

impl RetrievalQaChain {
    pub fn new(llm: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            llm,
            retriever,
            return_source_documents: false,
        }
    }

    /// Include the retrieved documents in the output.
    #[must_use]
    pub fn with_source_documents(mut self, enabled: bool) -> Self {
        self.return_source_documents = enabled;
        self
    }

    pub async fn call(&self, query: &str) -> Result<ChainOutput, ChainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChainError::EmptyQuery);
        }

        let documents = self.retriever.retrieve(query).await?;
        info!(
            "Asking {} with {} context documents",
            self.llm.model_name(),
            documents.len()
        );

        let messages = prompt::build_messages(&documents, query);
        let text = self.llm.chat(&messages).await?;

        Ok(ChainOutput {
            text,
            source_documents: self.return_source_documents.then_some(documents),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::llm::{ChatError, ChatMessage, Role};
    use crate::retriever::RetrieverError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedRetriever(Vec<Document>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, RetrieverError> {
            Ok(self.0.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<Document>, RetrieverError> {
            Err(RetrieverError::Failed("index unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok("Task decomposition breaks a task into smaller subgoals.".to_string())
        }
    }

    fn retriever() -> Arc<dyn Retriever> {
        Arc::new(FixedRetriever(vec![
            Document::new("Task decomposition uses chain of thought.").with_metadata("source", "a"),
            Document::new("Subgoals make large tasks manageable.").with_metadata("source", "b"),
        ]))
    }

    #[tokio::test]
    async fn test_call_stuffs_context() {
        let model = Arc::new(RecordingModel::default());
        let chain = RetrievalQaChain::new(model.clone(), retriever());

        let output = chain.call("What is task decomposition?").await.unwrap();

        assert_eq!(output.text, "Task decomposition breaks a task into smaller subgoals.");
        assert!(output.source_documents.is_none());

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].role, Role::System);
        assert!(seen[0][0].content.contains("chain of thought.\n\nSubgoals make"));
        assert_eq!(seen[0][1].content, "What is task decomposition?");
    }

    #[tokio::test]
    async fn test_call_returns_sources() {
        let chain = RetrievalQaChain::new(Arc::new(RecordingModel::default()), retriever())
            .with_source_documents(true);

        let output = chain.call("What is task decomposition?").await.unwrap();

        let sources = output.source_documents.as_ref().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].source(), Some("b"));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["source_documents"][0]["metadata"]["source"], "a");
    }

    #[tokio::test]
    async fn test_output_serializes_as_text_only() {
        let chain = RetrievalQaChain::new(Arc::new(RecordingModel::default()), retriever());
        let output = chain.call("q").await.unwrap();
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "text": "Task decomposition breaks a task into smaller subgoals." })
        );
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let model = Arc::new(RecordingModel::default());
        let chain = RetrievalQaChain::new(model.clone(), retriever());

        assert!(matches!(chain.call("   ").await, Err(ChainError::EmptyQuery)));
        assert!(model.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_failure() {
        let model = Arc::new(RecordingModel::default());
        let chain = RetrievalQaChain::new(model.clone(), Arc::new(FailingRetriever));

        let err = chain.call("question").await.unwrap_err();
        assert!(matches!(err, ChainError::Retrieval(_)));
        assert_eq!(err.to_string(), "retrieval failed: index unavailable");
        assert!(model.seen.lock().unwrap().is_empty());
    }
}
