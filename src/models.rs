//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, vector records and
//! conversation turns that flow through ingestion and chat.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata attached to documents, chunks and vector records.
pub type Metadata = Map<String, Value>;

/// Text extracted from one source file (or one row/sheet of it).
#[derive(Debug, Clone)]
pub struct Document {
    pub source: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    /// Build a document whose metadata starts with `source` and `file_type`.
    pub fn new(source: impl Into<String>, file_type: &str, text: impl Into<String>) -> Self {
        let source = source.into();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), Value::String(source.clone()));
        metadata.insert("file_type".to_string(), Value::String(file_type.to_string()));
        Self {
            source,
            text: text.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A bounded, overlapping slice of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Copy of the parent document's metadata.
    pub metadata: Metadata,
}

/// A chunk ready to be written to the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// A chunk returned by a similarity query, best match first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub source: Option<String>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn (or prompt message sent to the chat model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
