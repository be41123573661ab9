//! Retrieval chain: embed the question, fetch the nearest chunks, and ask
//! the chat model with those chunks as context.
//!
//! Only the latest user message is embedded for retrieval. Earlier turns
//! reach the model as ordinary chat messages after the system prompt.

use anyhow::Result;
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::llm::ChatModel;
use crate::models::{Message, RetrievedChunk};
use crate::vector_store::VectorStore;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about the user's documents. \
Use the pieces of context below to answer the question. If the context does not contain the answer, \
use the conversation so far; if you still do not know, say so instead of making up an answer.";

const NO_CONTEXT: &str = "(no matching documents were found)";

/// An answer and the chunks it was conditioned on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

impl Answer {
    /// Distinct source paths, in retrieval order.
    pub fn source_paths(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for chunk in &self.sources {
            if let Some(source) = chunk.source.as_deref() {
                if !seen.contains(&source) {
                    seen.push(source);
                }
            }
        }
        seen
    }
}

pub struct RetrievalChain {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl RetrievalChain {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        model: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            model,
            top_k,
        }
    }

    /// Name of the chat model that writes the answers.
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        let chunks = self.store.query(&vector, self.top_k).await?;
        tracing::debug!(
            embedder = self.embedder.model_name(),
            top_k = self.top_k,
            found = chunks.len(),
            "retrieved context"
        );
        Ok(chunks)
    }

    /// Answer `question` given the prior `conversation` (oldest first).
    pub async fn answer(
        &self,
        question: &str,
        conversation: &[Message],
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<Answer> {
        let sources = self.retrieve(question).await?;
        let messages = build_messages(question, conversation, &sources);
        let text = self.model.complete(&messages, on_token).await?;
        Ok(Answer { text, sources })
    }
}

/// System prompt with context, then the conversation, then the question.
pub fn build_messages(
    question: &str,
    conversation: &[Message],
    context: &[RetrievedChunk],
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(conversation.len() + 2);
    messages.push(Message::system(format!(
        "{}\n\nContext:\n{}",
        SYSTEM_PROMPT,
        format_context(context)
    )));
    messages.extend(conversation.iter().cloned());
    messages.push(Message::user(question));
    messages
}

fn format_context(context: &[RetrievedChunk]) -> String {
    let blocks: Vec<String> = context
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| match &c.source {
            Some(source) => format!("[source: {}]\n{}", source, c.text),
            None => c.text.clone(),
        })
        .collect();
    if blocks.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        blocks.join("\n\n---\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, Role};

    fn chunk(text: &str, source: Option<&str>) -> RetrievedChunk {
        RetrievedChunk {
            id: "id".to_string(),
            score: 0.9,
            text: text.to_string(),
            source: source.map(|s| s.to_string()),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn messages_put_context_first_and_question_last() {
        let conversation = vec![Message::user("earlier"), Message::assistant("reply")];
        let msgs = build_messages(
            "What is the refund window?",
            &conversation,
            &[chunk("Refunds within 30 days.", Some("policy.pdf"))],
        );
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("[source: policy.pdf]\nRefunds within 30 days."));
        assert_eq!(msgs[1], Message::user("earlier"));
        assert_eq!(msgs[2], Message::assistant("reply"));
        assert_eq!(msgs[3], Message::user("What is the refund window?"));
    }

    #[test]
    fn empty_context_is_stated() {
        let msgs = build_messages("hi", &[], &[]);
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].content.ends_with(NO_CONTEXT));
    }

    #[test]
    fn source_paths_are_distinct_in_order() {
        let answer = Answer {
            text: String::new(),
            sources: vec![
                chunk("a", Some("b.txt")),
                chunk("b", Some("a.txt")),
                chunk("c", Some("b.txt")),
                chunk("d", None),
            ],
        };
        assert_eq!(answer.source_paths(), vec!["b.txt", "a.txt"]);
    }
}
