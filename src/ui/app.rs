use anyhow::Result;
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info};

use crate::config::Config;
use crate::events::{spawn_input_reader, AppEvent};
use crate::exchange::ExchangeController;
use crate::llm::{ChatSettings, LlmClient};
use crate::session::{DeleteRequest, SessionManager};
use crate::storage::FileStore;
use crate::streaming::{paced, Pacing, TypingBuffer};
use crate::ui::conversation::{
    get_help_text, ComposerResult, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
};
use crate::ui::sidebar::Sidebar;

/// Which pane receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Composer,
}

/// Modal overlay; while one is open it swallows all keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Popup {
    None,
    ConfirmDelete(DeleteRequest),
    ConfirmClearAll,
    Help,
}

pub struct App {
    session: SessionManager<FileStore>,
    exchange: ExchangeController<LlmClient>,
    settings: ChatSettings,
    has_api_key: bool,
    composer: ConversationComposer,
    focus: Focus,
    popup: Popup,
    status: Option<String>,
    pending_prompt: Option<String>,
    thinking: bool,
    typing: TypingBuffer,
    pacing: Pacing,
    show_timestamps: bool,
    scroll_back: u16,
    quit: bool,
}

impl App {
    pub fn new(config: &Config, session: SessionManager<FileStore>, client: LlmClient) -> Self {
        let settings = config.chat_settings();
        Self {
            composer: ConversationComposer::new(settings.mode, settings.workspace_slug.clone()),
            session,
            exchange: ExchangeController::new(client),
            has_api_key: config.has_api_key(),
            settings,
            focus: Focus::Composer,
            popup: Popup::None,
            status: None,
            pending_prompt: None,
            thinking: false,
            typing: TypingBuffer::new(),
            pacing: Pacing::from_millis(config.ui.typing_delay_ms),
            show_timestamps: config.ui.show_timestamps,
            scroll_back: 0,
            quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Handle one key press. Returns a prompt when the user submitted one.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<String> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return None;
        }

        if self.popup != Popup::None {
            self.handle_popup_key(key);
            return None;
        }

        match self.focus {
            Focus::Sidebar => {
                self.handle_sidebar_key(key);
                None
            }
            Focus::Composer => self.handle_composer_key(key),
        }
    }

    fn handle_popup_key(&mut self, key: KeyEvent) {
        let popup = std::mem::replace(&mut self.popup, Popup::None);
        let confirmed = matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter);

        match popup {
            Popup::ConfirmDelete(request) if confirmed => {
                let result = self.session.confirm_delete(&request);
                self.report(result, format!("🗑️ Deleted '{}'", request.title));
            }
            Popup::ConfirmClearAll if confirmed => {
                let result = self.session.delete_all().map(|_| ());
                self.report(result, "🗑️ Deleted every conversation");
            }
            Popup::ConfirmDelete(_) | Popup::ConfirmClearAll => {
                if !matches!(key.code, KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc) {
                    // Anything else keeps the question open
                    self.popup = popup;
                }
            }
            Popup::Help | Popup::None => {}
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.select_relative(-1),
            KeyCode::Down | KeyCode::Char('j') => self.select_relative(1),
            KeyCode::Tab | KeyCode::Enter | KeyCode::Esc => self.set_focus(Focus::Composer),
            KeyCode::Char('n') => self.new_conversation(),
            KeyCode::Char('d') | KeyCode::Delete => self.ask_delete_current(),
            KeyCode::Char('D') => self.popup = Popup::ConfirmClearAll,
            _ => {}
        }
    }

    fn handle_composer_key(&mut self, key: KeyEvent) -> Option<String> {
        match key.code {
            KeyCode::Tab if !self.composer.palette_open() => {
                self.set_focus(Focus::Sidebar);
                return None;
            }
            KeyCode::PageUp => {
                self.scroll_back = self.scroll_back.saturating_add(5);
                return None;
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                return None;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(prompt) => {
                if !self.has_api_key {
                    self.status = Some("❌ No API key configured. Run 'anychat config set-key <KEY>'.".to_string());
                    return None;
                }
                Some(prompt)
            }
            ComposerResult::Command(command) => {
                self.handle_slash_command(command);
                None
            }
            ComposerResult::None => None,
        }
    }

    fn handle_slash_command(&mut self, command: ParsedCommand) {
        match command.command {
            SlashCommand::New => self.new_conversation(),
            SlashCommand::Delete => self.ask_delete_current(),
            SlashCommand::Clear => self.popup = Popup::ConfirmClearAll,
            SlashCommand::Mode => {
                let mode = command.mode_target().unwrap_or_else(|| self.settings.mode.toggled());
                self.settings.mode = mode;
                self.composer.update_mode(mode);
                self.status = Some(format!("🎯 Mode: {} ({})", mode, mode.description()));
            }
            SlashCommand::Workspace => match command.argument() {
                Some(slug) => {
                    self.settings.workspace_slug = slug.to_string();
                    self.composer.update_workspace(slug);
                    self.status = Some(format!("📂 Workspace: {}", slug));
                }
                None => {
                    self.status = Some(format!(
                        "Current workspace: {} (use /workspace <slug> to switch)",
                        self.settings.workspace_slug
                    ));
                }
            },
            SlashCommand::Help => self.popup = Popup::Help,
            SlashCommand::Bye => self.quit = true,
        }
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.composer.set_focus(focus == Focus::Composer);
    }

    fn select_relative(&mut self, delta: isize) {
        let len = self.session.len() as isize;
        if len == 0 {
            return;
        }
        let next = (self.session.current_index() as isize + delta).clamp(0, len - 1) as usize;
        let id = self.session.conversations().nth(next).map(|(id, _)| id.to_string());
        if let Some(id) = id {
            self.session.select_conversation(&id);
            self.scroll_back = 0;
        }
    }

    fn new_conversation(&mut self) {
        if !self.session.can_create_conversation() {
            self.status = Some("💡 The current conversation is still empty".to_string());
            return;
        }
        let result = self.session.create_conversation().map(|_| ());
        self.report(result, "✨ Started a new conversation");
        self.scroll_back = 0;
    }

    fn ask_delete_current(&mut self) {
        let id = self.session.current_id().to_string();
        if let Some(request) = self.session.request_delete(&id) {
            self.popup = Popup::ConfirmDelete(request);
        }
    }

    fn report(&mut self, result: Result<()>, success: impl Into<String>) {
        self.status = Some(match result {
            Ok(()) => success.into(),
            Err(e) => {
                error!(error = %format!("{:#}", e), "persistence failed");
                format!("❌ {:#}", e)
            }
        });
    }

    /// Run one turn on the current conversation, then type the reply out
    async fn run_turn<B: Backend>(&mut self, terminal: &mut Terminal<B>, prompt: String) -> Result<()> {
        let id = self.session.current_id().to_string();
        self.pending_prompt = Some(prompt.clone());
        self.thinking = true;
        self.scroll_back = 0;
        self.status = None;
        terminal.draw(|frame| self.draw(frame))?;

        let result = self
            .exchange
            .submit(&mut self.session, &id, &prompt, &self.settings)
            .await;
        self.pending_prompt = None;
        self.thinking = false;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report(Err(e), "");
                return Ok(());
            }
        };
        if outcome.is_failure() {
            self.status = Some("⚠️ Request failed; the error was saved to the conversation".to_string());
        }

        // Don't animate into a conversation the user can no longer see
        if self.session.current_id() != id {
            return Ok(());
        }

        self.typing.start();
        let mut chunks = Box::pin(paced(&outcome.content, self.pacing));
        while let Some(chunk) = chunks.next().await {
            self.typing.push_chunk(&chunk);
            terminal.draw(|frame| self.draw(frame))?;
        }
        self.typing.finish();
        Ok(())
    }

    async fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let (tx, mut rx) = unbounded_channel();
        spawn_input_reader(tx);

        terminal.draw(|frame| self.draw(frame))?;

        while let Some(event) = rx.recv().await {
            if let AppEvent::Input(key) = event {
                if let Some(prompt) = self.handle_key(key) {
                    self.run_turn(terminal, prompt).await?;
                }
            }

            if self.quit {
                break;
            }
            terminal.draw(|frame| self.draw(frame))?;
        }

        Ok(())
    }

    pub fn draw(&self, frame: &mut Frame) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
            .split(frame.size());

        let entries: Vec<_> = self.session.conversations().collect();
        frame.render_widget(
            Sidebar::new(entries, self.session.current_index())
                .focused(self.focus == Focus::Sidebar)
                .show_timestamps(self.show_timestamps),
            columns[0],
        );

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3), Constraint::Length(1)])
            .split(columns[1]);

        let current = self.session.current();
        frame.render_widget(
            ConversationHistory::new(&current.title, &current.messages)
                .pending(self.pending_prompt.as_deref())
                .thinking(self.thinking)
                .typing(self.typing.visible())
                .scroll_back(self.scroll_back),
            rows[0],
        );
        frame.render_widget(&self.composer, rows[1]);
        frame.render_widget(self.status_line(), rows[2]);

        self.draw_popup(frame);
    }

    fn status_line(&self) -> Paragraph<'_> {
        let line = match &self.status {
            Some(status) => Line::from(Span::styled(status.as_str(), Style::default().fg(Color::Yellow))),
            None => Line::from(Span::styled(
                "Tab: switch pane · /help: commands · Ctrl+C: quit",
                Style::default().fg(Color::DarkGray),
            )),
        };
        Paragraph::new(line)
    }

    fn draw_popup(&self, frame: &mut Frame) {
        let (title, body, area) = match &self.popup {
            Popup::None => return,
            Popup::ConfirmDelete(request) => (
                " Delete conversation ",
                format!(
                    "Delete '{}' ({} messages)?\n\n[y] yes   [n] no",
                    request.title, request.message_count
                ),
                centered_rect(50, 25, frame.size()),
            ),
            Popup::ConfirmClearAll => (
                " Delete everything ",
                format!(
                    "Delete all {} conversations? This cannot be undone.\n\n[y] yes   [n] no",
                    self.session.len()
                ),
                centered_rect(50, 25, frame.size()),
            ),
            Popup::Help => (
                " Help ",
                format!("{}\n\nPress any key to close.", get_help_text()),
                centered_rect(70, 60, frame.size()),
            ),
        };

        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(body)
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Yellow))
                        .title(title),
                ),
            area,
        );
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Launch the terminal UI and block until the user quits
pub async fn run(config: Config) -> Result<()> {
    let session = SessionManager::initialize(FileStore::new(config.store_path()))?;
    let client = LlmClient::new(config.request_timeout())?;
    let mut app = App::new(&config, session, client);
    info!(
        conversations = app.session.len(),
        workspace = %app.settings.workspace_slug,
        "starting terminal ui"
    );

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = app.event_loop(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}
