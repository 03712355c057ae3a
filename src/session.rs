use anyhow::{Context, Result};
use tracing::debug;

use crate::conversation::{Conversation, Message};
use crate::storage::{Document, DocumentStore};

/// Pending deletion awaiting confirmation from the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub is_current: bool,
}

/// Session manager: the in-memory working set of conversations plus the
/// current-conversation pointer, mirrored to the store after every mutation.
///
/// Once constructed the set is never empty and `current_id` always names an
/// existing conversation.
pub struct SessionManager<S: DocumentStore> {
    store: S,
    document: Document,
    current_id: String,
}

impl<S: DocumentStore> SessionManager<S> {
    /// Load the store and make sure there is a current conversation
    pub fn initialize(store: S) -> Result<Self> {
        let mut document = store.load();

        let current_id = match document.first_id() {
            Some(id) => id.to_string(),
            None => {
                let id = Conversation::generate_id();
                document.insert(id.clone(), Conversation::new());
                store
                    .save(&document)
                    .context("Failed to persist initial conversation")?;
                debug!(%id, "created initial conversation");
                id
            }
        };

        debug!(conversations = document.len(), %current_id, "session initialized");
        Ok(Self {
            store,
            document,
            current_id,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn current_id(&self) -> &str {
        &self.current_id
    }

    pub fn current(&self) -> &Conversation {
        // current_id is reassigned on every removal, so it always resolves
        self.document
            .get(&self.current_id)
            .expect("current conversation always exists")
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.document.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.document.contains(id)
    }

    /// Conversations in insertion order
    pub fn conversations(&self) -> impl Iterator<Item = (&str, &Conversation)> {
        self.document.iter()
    }

    pub fn len(&self) -> usize {
        self.document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Position of the current conversation in insertion order
    pub fn current_index(&self) -> usize {
        self.document
            .ids()
            .position(|id| id == self.current_id)
            .unwrap_or(0)
    }

    /// UI policy: no new conversation while the current one is still empty
    pub fn can_create_conversation(&self) -> bool {
        !self.current().is_empty()
    }

    /// Create an empty conversation and make it current.
    ///
    /// The empty-current guard is left to callers; this always succeeds
    /// unless persistence fails.
    pub fn create_conversation(&mut self) -> Result<String> {
        let id = self.insert_fresh();
        self.persist()?;
        debug!(%id, "created conversation");
        Ok(id)
    }

    /// Point at `id`. Unknown ids leave the current conversation unchanged.
    pub fn select_conversation(&mut self, id: &str) -> bool {
        if !self.document.contains(id) {
            debug!(%id, "ignoring selection of unknown conversation");
            return false;
        }
        self.current_id = id.to_string();
        true
    }

    /// Describe a deletion without performing it
    pub fn request_delete(&self, id: &str) -> Option<DeleteRequest> {
        self.document.get(id).map(|conversation| DeleteRequest {
            id: id.to_string(),
            title: conversation.title.clone(),
            message_count: conversation.messages.len(),
            is_current: id == self.current_id,
        })
    }

    /// Perform a deletion previously described by `request_delete`
    pub fn confirm_delete(&mut self, request: &DeleteRequest) -> Result<()> {
        self.delete_conversation(&request.id)
    }

    /// Remove a conversation, reassigning the current pointer if needed
    pub fn delete_conversation(&mut self, id: &str) -> Result<()> {
        if self.document.remove(id).is_none() {
            debug!(%id, "delete of unknown conversation ignored");
            return Ok(());
        }

        if self.current_id == id {
            match self.document.first_id() {
                Some(next) => self.current_id = next.to_string(),
                None => {
                    self.insert_fresh();
                }
            }
        }

        self.persist()?;
        debug!(%id, current = %self.current_id, "deleted conversation");
        Ok(())
    }

    /// Drop every conversation and start over with a single empty one
    pub fn delete_all(&mut self) -> Result<String> {
        self.document.clear();
        let id = self.insert_fresh();
        self.persist()?;
        debug!(%id, "cleared all conversations");
        Ok(id)
    }

    /// Retitle `id` from its first prompt; call before appending the prompt
    pub fn rename_if_first_message(&mut self, id: &str, message: &str) -> bool {
        match self.document.get_mut(id) {
            Some(conversation) => conversation.rename_if_first_message(message),
            None => false,
        }
    }

    /// Append to `id` and persist. On a failed save the conversation is
    /// left as it was.
    pub fn append_message(&mut self, id: &str, message: Message) -> Result<()> {
        self.update_and_persist(id, |conversation| conversation.push(message))
    }

    /// Title `id` from `prompt` if it is the first message, append the prompt
    /// and persist, all or nothing. Returns whether the title changed.
    pub fn record_prompt(&mut self, id: &str, prompt: &str) -> Result<bool> {
        self.update_and_persist(id, |conversation| {
            let renamed = conversation.rename_if_first_message(prompt);
            conversation.push(Message::user(prompt));
            renamed
        })
    }

    /// Write the full document to the store
    pub fn persist(&self) -> Result<()> {
        self.store
            .save(&self.document)
            .context("Failed to save conversations")
    }

    /// Apply `change` to `id` and persist, restoring the previous
    /// conversation if the save fails
    fn update_and_persist<T>(&mut self, id: &str, change: impl FnOnce(&mut Conversation) -> T) -> Result<T> {
        let conversation = self
            .document
            .get_mut(id)
            .with_context(|| format!("Conversation '{}' not found", id))?;
        let snapshot = conversation.clone();
        let result = change(conversation);

        if let Err(e) = self.persist() {
            if let Some(conversation) = self.document.get_mut(id) {
                *conversation = snapshot;
            }
            debug!(%id, "save failed, conversation restored");
            return Err(e);
        }
        Ok(result)
    }

    fn insert_fresh(&mut self) -> String {
        let id = Conversation::generate_id();
        self.document.insert(id.clone(), Conversation::new());
        self.current_id = id.clone();
        id
    }
}
