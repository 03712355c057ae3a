use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::config::{Config, API_KEY_ENV};
use crate::conversation::Role;
use crate::exchange::ExchangeController;
use crate::llm::{ChatBackend, ChatMode, LlmClient};
use crate::session::SessionManager;
use crate::storage::FileStore;
use crate::streaming::{paced, Pacing};

/// Which conversation `ask` should continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskTarget {
    /// Whatever the session opens on (the oldest conversation)
    Current,
    /// A fresh conversation, unless the current one is still empty
    New,
    /// A specific conversation id
    Conversation(String),
}

fn open_session(config: &Config) -> Result<SessionManager<FileStore>> {
    SessionManager::initialize(FileStore::new(config.store_path()))
}

pub fn list_conversations(config: &Config) -> Result<()> {
    let session = open_session(config)?;

    println!("💬 Your conversations:");
    println!("{}", "=".repeat(50));

    for (id, conversation) in session.conversations() {
        println!("📋 {}", conversation.title);
        println!("   🆔 {}", id);
        println!("   ✉️  {} messages", conversation.messages.len());
        println!(
            "   🕒 Updated: {}",
            conversation.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
        println!();
    }

    Ok(())
}

pub fn show_conversation(config: &Config, id: &str) -> Result<()> {
    let session = open_session(config)?;

    let Some(conversation) = session.get(id) else {
        println!("❌ Conversation '{}' not found.", id);
        println!("Run 'anychat list' to see available conversations.");
        return Ok(());
    };

    println!("💬 {}", conversation.title);
    println!("{}", "=".repeat(50));

    if conversation.is_empty() {
        println!("(no messages yet)");
    }
    for message in &conversation.messages {
        let label = match message.role {
            Role::User => "👤 You",
            Role::Assistant => "🤖 Assistant",
        };
        println!("{}:", label);
        println!("{}", message.content);
        println!();
    }

    Ok(())
}

/// Send one prompt and type the reply to stdout
pub async fn ask(config: &Config, prompt: &str, target: AskTarget) -> Result<()> {
    if !config.has_api_key() {
        bail!(
            "No API key configured. Run 'anychat config set-key <KEY>' or set {}.",
            API_KEY_ENV
        );
    }

    let client = LlmClient::new(config.request_timeout())?;
    let mut session = open_session(config)?;
    let reply = ask_with(config, &mut session, client, prompt, target).await?;

    let mut stdout = io::stdout();
    let mut chunks = Box::pin(paced(&reply, Pacing::from_millis(config.ui.typing_delay_ms)));
    while let Some(chunk) = chunks.next().await {
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;

    Ok(())
}

async fn ask_with<B: ChatBackend>(
    config: &Config,
    session: &mut SessionManager<FileStore>,
    backend: B,
    prompt: &str,
    target: AskTarget,
) -> Result<String> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        bail!("Prompt cannot be empty");
    }

    let id = match target {
        AskTarget::Current => session.current_id().to_string(),
        AskTarget::New if session.can_create_conversation() => session.create_conversation()?,
        AskTarget::New => session.current_id().to_string(),
        AskTarget::Conversation(id) => {
            if !session.select_conversation(&id) {
                bail!("Conversation '{}' not found", id);
            }
            id
        }
    };

    let mut exchange = ExchangeController::new(backend);
    let outcome = exchange
        .submit(session, &id, prompt, &config.chat_settings())
        .await?;

    if outcome.is_failure() {
        eprintln!("⚠️  The request failed; the error was saved to the conversation.");
    }
    Ok(outcome.content)
}

pub fn delete_conversation(config: &Config, id: &str, yes: bool) -> Result<()> {
    let mut session = open_session(config)?;

    let Some(request) = session.request_delete(id) else {
        println!("❌ Conversation '{}' not found.", id);
        return Ok(());
    };

    let question = format!(
        "🗑️  Delete '{}' ({} messages)?",
        request.title, request.message_count
    );
    if !yes && !confirm(&question)? {
        println!("👋 Nothing deleted.");
        return Ok(());
    }

    session.confirm_delete(&request)?;
    println!("✅ Deleted '{}'.", request.title);
    Ok(())
}

pub fn clear_conversations(config: &Config, yes: bool) -> Result<()> {
    let mut session = open_session(config)?;

    let question = format!("🗑️  Delete all {} conversations?", session.len());
    if !yes && !confirm(&question)? {
        println!("👋 Nothing deleted.");
        return Ok(());
    }

    session.delete_all()?;
    println!("✅ All conversations deleted.");
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub fn show_config(config: &Config) -> Result<()> {
    println!("⚙️  anychat configuration");
    println!("{}", "=".repeat(50));
    println!("📍 Config file: {}", config.config_path().display());
    println!("💾 Conversations: {}", config.store_path().display());
    println!("🌐 Base URL: {}", config.base_url);
    println!("📂 Workspace: {}", config.workspace_slug);
    println!("🎯 Mode: {} ({})", config.mode, config.mode.description());
    match config.request_timeout() {
        Some(timeout) => println!("⏱️  Timeout: {}s", timeout.as_secs()),
        None => println!("⏱️  Timeout: none"),
    }
    println!(
        "🔑 API key: {}",
        match config.get_api_key() {
            Some(key) => mask_key(&key),
            None => "not set".to_string(),
        }
    );
    Ok(())
}

fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    format!("****{}", key.chars().skip(count - 4).collect::<String>())
}

pub fn set_api_key(config: &mut Config, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        bail!("API key cannot be empty");
    }
    config.set_api_key(key.to_string());
    config.save()?;
    println!("✅ API key saved.");
    Ok(())
}

pub fn set_workspace(config: &mut Config, slug: &str) -> Result<()> {
    let slug = slug.trim();
    if slug.is_empty() {
        bail!("Workspace slug cannot be empty");
    }
    config.workspace_slug = slug.to_string();
    config.save()?;
    println!("✅ Workspace set to '{}'.", slug);
    Ok(())
}

pub fn set_base_url(config: &mut Config, url: &str) -> Result<()> {
    let url = url.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("Base URL must start with http:// or https://");
    }
    config.base_url = url.to_string();
    config.save()?;
    println!("✅ Base URL set to '{}'.", url);
    Ok(())
}

pub fn set_mode(config: &mut Config, mode: &str) -> Result<()> {
    let mode = ChatMode::from_str(mode.trim())
        .map_err(|_| anyhow::anyhow!("Unknown mode '{}'; expected 'chat' or 'query'", mode))?;
    config.mode = mode;
    config.save()?;
    println!("✅ Mode set to '{}'.", mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::llm::ChatSettings;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        async fn send(&self, _settings: &ChatSettings, message: &str) -> Result<String, BackendError> {
            Ok(format!("echo: {}", message))
        }
    }

    fn config_in(dir: &TempDir) -> Config {
        Config::load_from(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn ask_continues_current_conversation() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut session = open_session(&config).unwrap();
        let id = session.current_id().to_string();

        let reply = ask_with(&config, &mut session, EchoBackend, "Hello", AskTarget::Current)
            .await
            .unwrap();
        assert_eq!(reply, "echo: Hello");

        let reloaded = open_session(&config).unwrap();
        let conversation = reloaded.get(&id).unwrap();
        assert_eq!(conversation.title, "Hello");
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn ask_new_reuses_empty_current() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut session = open_session(&config).unwrap();

        ask_with(&config, &mut session, EchoBackend, "first", AskTarget::New)
            .await
            .unwrap();
        assert_eq!(session.len(), 1);

        ask_with(&config, &mut session, EchoBackend, "second", AskTarget::New)
            .await
            .unwrap();
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn ask_unknown_conversation_fails() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut session = open_session(&config).unwrap();

        let target = AskTarget::Conversation("missing".to_string());
        assert!(ask_with(&config, &mut session, EchoBackend, "hi", target).await.is_err());
    }

    #[test]
    fn delete_with_yes_skips_prompt() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let id = open_session(&config).unwrap().current_id().to_string();

        delete_conversation(&config, &id, true).unwrap();

        let reloaded = open_session(&config).unwrap();
        assert!(!reloaded.contains(&id));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn config_setters_persist() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);

        set_workspace(&mut config, "research").unwrap();
        set_base_url(&mut config, "https://llm.example.com/").unwrap();
        set_mode(&mut config, "Query").unwrap();

        let reloaded = config_in(&dir);
        assert_eq!(reloaded.workspace_slug, "research");
        assert_eq!(reloaded.base_url, "https://llm.example.com");
        assert_eq!(reloaded.mode, ChatMode::Query);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);

        assert!(set_mode(&mut config, "shout").is_err());
        assert!(set_base_url(&mut config, "localhost:3001").is_err());
        assert!(set_workspace(&mut config, "  ").is_err());
    }

    #[test]
    fn keys_are_masked() {
        assert_eq!(mask_key("abc"), "****");
        assert_eq!(mask_key("sk-12345678"), "****5678");
    }
}
