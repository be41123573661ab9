//! `docqa chat` and `docqa ask`.
//!
//! The chat command is a line-oriented terminal session: one prompt, a
//! scrolling transcript and streamed answers. `/exit`, `/quit` or EOF
//! ends it. A failed turn is reported and the session carries on.

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::llm::OpenAIChat;
use crate::retrieval::{Answer, RetrievalChain};
use crate::session::ChatSession;
use crate::vector_store::open_index;

/// Connect the embedder, index and chat model described by `config`.
pub async fn build_chain(config: &Config) -> Result<RetrievalChain> {
    let embedder = Arc::new(OpenAIEmbedder::from_config(config)?);
    let model = Arc::new(OpenAIChat::from_config(config)?);
    let ensured = open_index(config, embedder.dims()).await?;
    Ok(RetrievalChain::new(
        embedder,
        Arc::new(ensured.index),
        model,
        config.chat.top_k,
    ))
}

pub async fn run_chat(config: &Config, show_sources: bool) -> Result<()> {
    let chain = build_chain(config).await?;
    let mut session = ChatSession::new(config.chat.history_cap());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Chatting with {} over index '{}'. Type /exit to quit.",
        chain.model_name(),
        config.pinecone.index.as_deref().unwrap_or_default()
    );

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "/exit" | "/quit") {
            break;
        }

        match session.submit(&chain, input, &mut print_token).await {
            Ok(answer) => {
                println!();
                if show_sources {
                    print_sources(&answer);
                }
            }
            Err(e) => {
                println!();
                eprintln!("Error: {:#}", e);
            }
        }
    }

    Ok(())
}

/// Answer one question and exit.
pub async fn run_ask(config: &Config, question: &str, show_sources: bool) -> Result<()> {
    let chain = build_chain(config).await?;
    let mut session = ChatSession::new(config.chat.history_cap());
    let answer = session.submit(&chain, question, &mut print_token).await?;
    println!();
    if show_sources {
        print_sources(&answer);
    }
    Ok(())
}

fn print_token(token: &str) {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(token.as_bytes());
    let _ = out.flush();
}

fn print_sources(answer: &Answer) {
    if answer.sources.is_empty() {
        println!("Sources: none");
        return;
    }
    println!("Sources:");
    for chunk in &answer.sources {
        println!(
            "  {:.3}  {}",
            chunk.score,
            chunk.source.as_deref().unwrap_or("(unknown)")
        );
    }
}
