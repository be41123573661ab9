//! Conversation state for one chat session.
//!
//! A [`ChatSession`] is owned by whoever drives the conversation and is
//! passed by `&mut` into each turn, so at most one turn is in flight.
//! Whether a turn is in flight can be watched from elsewhere (a token
//! callback, a UI task) through a [`TurnStatus`] handle.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::Message;
use crate::retrieval::{Answer, RetrievalChain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Answering,
}

/// Shared view of a session's [`TurnState`].
#[derive(Debug, Clone, Default)]
pub struct TurnStatus(Arc<AtomicBool>);

impl TurnStatus {
    pub fn get(&self) -> TurnState {
        if self.0.load(Ordering::Acquire) {
            TurnState::Answering
        } else {
            TurnState::Idle
        }
    }

    fn set(&self, state: TurnState) {
        self.0.store(state == TurnState::Answering, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct ChatSession {
    history: VecDeque<Message>,
    cap: Option<usize>,
    status: TurnStatus,
}

impl ChatSession {
    /// `cap` bounds the number of retained turns; `None` keeps everything.
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            history: VecDeque::new(),
            cap,
            status: TurnStatus::default(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn state(&self) -> TurnState {
        self.status.get()
    }

    /// A handle that keeps reporting this session's state.
    pub fn status(&self) -> TurnStatus {
        self.status.clone()
    }

    /// Append a turn, evicting the oldest ones beyond the cap.
    pub fn push(&mut self, message: Message) {
        self.history.push_back(message);
        if let Some(cap) = self.cap {
            while self.history.len() > cap {
                self.history.pop_front();
            }
        }
    }

    /// Run one question/answer turn.
    ///
    /// The user turn is recorded before the request is made and stays in
    /// history if the turn fails. The assistant turn is recorded only on
    /// success.
    pub async fn submit(
        &mut self,
        chain: &RetrievalChain,
        input: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
    ) -> Result<Answer> {
        let question = input.trim();
        if question.is_empty() {
            bail!("Empty message");
        }

        let prior: Vec<Message> = self.history.iter().cloned().collect();
        self.push(Message::user(question));

        let result = {
            let _answering = Answering::enter(&self.status);
            chain.answer(question, &prior, on_token).await
        };

        let answer = result?;
        self.push(Message::assistant(answer.text.clone()));
        Ok(answer)
    }
}

/// Holds the session in `Answering` until dropped.
struct Answering<'a> {
    status: &'a TurnStatus,
}

impl<'a> Answering<'a> {
    fn enter(status: &'a TurnStatus) -> Self {
        status.set(TurnState::Answering);
        Self { status }
    }
}

impl Drop for Answering<'_> {
    fn drop(&mut self) {
        self.status.set(TurnState::Idle);
    }
}
