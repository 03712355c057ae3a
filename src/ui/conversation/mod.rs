//! Conversation UI components for chat interface

pub mod commands;
pub mod composer;
pub mod history;

pub use commands::{get_help_text, ParsedCommand, SlashCommand};
pub use composer::{ComposerResult, ConversationComposer};
pub use history::ConversationHistory;
