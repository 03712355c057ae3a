use anyhow::Result;
use clap::{Parser, Subcommand};
use std::str::FromStr;

use anychat::commands::{self, AskTarget};
use anychat::config::Config;
use anychat::llm::ChatMode;
use anychat::{logging, ui};

#[derive(Parser)]
#[command(name = "anychat")]
#[command(version)]
#[command(about = "Chat with your AnythingLLM workspaces from the terminal", long_about = None)]
struct Cli {
    /// Server root for this run, e.g. http://localhost:3001
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Workspace slug for this run
    #[arg(long, global = true)]
    workspace: Option<String>,

    /// Chat mode for this run (chat or query)
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<ChatMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// List all conversations
    List,
    /// Print one conversation
    Show { id: String },
    /// Send a single prompt and print the reply
    Ask {
        prompt: String,
        /// Start a new conversation
        #[arg(long, conflicts_with = "conversation")]
        new: bool,
        /// Continue a specific conversation
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Delete a conversation
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Delete every conversation
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Show or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Save the API key
    SetKey { key: String },
    /// Save the default workspace slug
    SetWorkspace { slug: String },
    /// Save the server root
    SetBaseUrl { url: String },
    /// Save the default chat mode
    SetMode { mode: String },
}

fn parse_mode(value: &str) -> Result<ChatMode, String> {
    ChatMode::from_str(value).map_err(|_| format!("unknown mode '{}'; expected chat or query", value))
}

impl Cli {
    /// Per-run overrides; never written back to the config file
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(workspace) = &self.workspace {
            config.workspace_slug = workspace.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    if let Some(Commands::Config { action }) = &cli.command {
        logging::init_stderr();
        return match action {
            ConfigAction::Show => commands::show_config(&config),
            ConfigAction::SetKey { key } => commands::set_api_key(&mut config, key),
            ConfigAction::SetWorkspace { slug } => commands::set_workspace(&mut config, slug),
            ConfigAction::SetBaseUrl { url } => commands::set_base_url(&mut config, url),
            ConfigAction::SetMode { mode } => commands::set_mode(&mut config, mode),
        };
    }

    cli.apply_overrides(&mut config);

    match cli.command {
        None | Some(Commands::Chat) => {
            logging::init_file(&config.log_path())?;
            ui::run(config).await
        }
        Some(command) => {
            logging::init_stderr();
            match command {
                Commands::List => commands::list_conversations(&config),
                Commands::Show { id } => commands::show_conversation(&config, &id),
                Commands::Ask {
                    prompt,
                    new,
                    conversation,
                } => {
                    let target = match (new, conversation) {
                        (_, Some(id)) => AskTarget::Conversation(id),
                        (true, None) => AskTarget::New,
                        (false, None) => AskTarget::Current,
                    };
                    commands::ask(&config, &prompt, target).await
                }
                Commands::Delete { id, yes } => commands::delete_conversation(&config, &id, yes),
                Commands::Clear { yes } => commands::clear_conversations(&config, yes),
                Commands::Chat | Commands::Config { .. } => Ok(()),
            }
        }
    }
}
