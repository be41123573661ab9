//! # docqa
//!
//! Document question answering over a managed vector index.
//!
//! docqa ingests a directory of files (PDF, Word, PowerPoint, CSV, Excel and
//! plain text in any common encoding), splits them into overlapping
//! character chunks, embeds the chunks with OpenAI and stores them in a
//! Pinecone serverless index. A chat front-end then answers questions by
//! retrieving the closest chunks and handing them to a hosted chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Loaders │──▶│ Chunk+Embed  │──▶│ Pinecone  │
//! │ pdf/csv… │   │   (OpenAI)   │   │  index    │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │ query
//!                 ┌──────────┐      ┌─────▼─────┐
//!                 │   chat   │◀─────│ Retrieval │
//!                 │  (REPL)  │      │   chain   │
//!                 └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export PINECONE_API_KEY=... PINECONE_INDEX=handbook OPENAI_API_KEY=...
//! docqa ingest ./data          # load, chunk, embed, upsert
//! docqa chat                   # interactive session
//! docqa ask "What is the refund window?" --show-sources
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`discover`] | Recursive file discovery |
//! | [`loader`] | File-type dispatch into documents |
//! | [`extract`] | PDF and OOXML text extraction |
//! | [`chunk`] | Fixed-size overlapping character chunker |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Vector store abstraction and index opening |
//! | [`pinecone`] | Pinecone control and data plane client |
//! | [`llm`] | Chat model abstraction and streaming client |
//! | [`retrieval`] | Retrieval-augmented answer chain |
//! | [`session`] | Bounded conversation state |
//! | [`ingest`] | Ingestion pipeline |
//! | [`chat`] | Interactive and one-shot chat commands |
//! | [`progress`] | Ingest progress reporting |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod discover;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod pinecone;
pub mod progress;
pub mod retrieval;
pub mod session;
pub mod vector_store;
