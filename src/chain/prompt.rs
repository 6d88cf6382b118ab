//! "Stuff documents" QA prompt: every retrieved chunk goes into one system
//! message, followed by the user's question.
use crate::document::Document;
use crate::llm::ChatMessage;

pub const QA_SYSTEM_TEMPLATE: &str = "Use the following pieces of context to answer the users question.
If you don't know the answer, just say that you don't know, don't try to make up an answer.
----------------
{context}";

pub const DOCUMENT_SEPARATOR: &str = "\n\n";

pub fn format_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| d.page_content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

pub fn build_messages(documents: &[Document], question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(QA_SYSTEM_TEMPLATE.replace("{context}", &format_context(documents))),
        ChatMessage::user(question),
    ]
}
