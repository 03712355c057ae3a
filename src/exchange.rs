use anyhow::Result;
use tracing::{info, warn};

use crate::conversation::Message;
use crate::llm::{ChatBackend, ChatSettings};
use crate::session::SessionManager;
use crate::storage::DocumentStore;

/// Where a turn currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingResponse,
    Completed,
    Failed,
}

/// Result of one finished turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// `Completed` or `Failed`
    pub state: TurnState,
    /// Text stored as the assistant message (reply or error description)
    pub content: String,
    /// Whether this turn gave the conversation its title
    pub renamed: bool,
}

impl TurnOutcome {
    pub fn is_failure(&self) -> bool {
        self.state == TurnState::Failed
    }
}

/// Drives one request/response turn against a backend.
///
/// `submit` borrows the controller mutably, so a second turn cannot start
/// while one is in flight.
pub struct ExchangeController<B: ChatBackend> {
    backend: B,
    state: TurnState,
}

impl<B: ChatBackend> ExchangeController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: TurnState::Idle,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run a full turn on `conversation_id`.
    ///
    /// The user message is persisted before the request goes out and the
    /// assistant message (reply or error text) after it resolves. Backend
    /// failures never escape; only persistence errors are returned.
    pub async fn submit<S: DocumentStore>(
        &mut self,
        session: &mut SessionManager<S>,
        conversation_id: &str,
        prompt: &str,
        settings: &ChatSettings,
    ) -> Result<TurnOutcome> {
        // A failed save leaves the conversation as it was and skips the request
        let renamed = session.record_prompt(conversation_id, prompt)?;

        self.state = TurnState::AwaitingResponse;
        info!(conversation = %conversation_id, workspace = %settings.workspace_slug, mode = %settings.mode, "awaiting response");

        let (state, content) = match self.backend.send(settings, prompt).await {
            Ok(text) => (TurnState::Completed, text),
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "chat request failed");
                (TurnState::Failed, e.to_string())
            }
        };
        self.state = state;

        let stored = session.append_message(conversation_id, Message::assistant(content.clone()));
        self.state = TurnState::Idle;
        stored?;

        info!(conversation = %conversation_id, ?state, "turn finished");
        Ok(TurnOutcome {
            state,
            content,
            renamed,
        })
    }
}
