use std::str::FromStr;

use crate::llm::ChatMode;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// Delete the current conversation
    Delete,
    /// Delete every conversation
    Clear,
    /// Switch between chat and query mode
    Mode,
    /// Switch to a different workspace
    Workspace,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Explicit target of `/mode`, if one was given
    pub fn mode_target(&self) -> Option<ChatMode> {
        if self.command != SlashCommand::Mode {
            return None;
        }

        let arg = self.argument()?.trim().to_lowercase();
        match arg.as_str() {
            "c" => Some(ChatMode::Chat),
            "q" => Some(ChatMode::Query),
            other => ChatMode::from_str(other).ok(),
        }
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new conversation",
            SlashCommand::Delete => "delete the current conversation",
            SlashCommand::Clear => "delete every conversation",
            SlashCommand::Mode => "switch mode (chat, query)",
            SlashCommand::Workspace => "switch workspace: /workspace <slug>",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head.to_lowercase())
        .ok()
        .or_else(|| match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "n" => Some(SlashCommand::New),
            "rm" | "del" => Some(SlashCommand::Delete),
            "m" => Some(SlashCommand::Mode),
            "ws" | "slug" => Some(SlashCommand::Workspace),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for entry in command_entries() {
        help.push_str(&format!("/{} - {}\n", entry.keyword, entry.description));
    }

    help.push_str("\nAliases: /q for /bye, /n for /new, /rm for /delete, /m for /mode, /ws for /workspace");
    help.push_str("\nKeys: Tab switches focus, n/d/D in the sidebar create, delete or clear, Ctrl+C quits.");

    help
}
