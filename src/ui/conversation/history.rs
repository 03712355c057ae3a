//! Conversation history display component

use crate::conversation::{Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Read-only view over the current conversation, plus whatever is in flight
pub struct ConversationHistory<'a> {
    title: &'a str,
    messages: &'a [Message],
    /// Prompt sent but not yet stored
    pending: Option<&'a str>,
    /// Reply currently being typed out
    typing: Option<&'a str>,
    /// A request is awaiting its response
    thinking: bool,
    /// Lines scrolled up from the bottom
    scroll_back: u16,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(title: &'a str, messages: &'a [Message]) -> Self {
        Self {
            title,
            messages,
            pending: None,
            typing: None,
            thinking: false,
            scroll_back: 0,
        }
    }

    pub fn pending(mut self, prompt: Option<&'a str>) -> Self {
        self.pending = prompt;
        self
    }

    pub fn typing(mut self, typing: Option<&'a str>) -> Self {
        self.typing = typing;
        self
    }

    pub fn thinking(mut self, thinking: bool) -> Self {
        self.thinking = thinking;
        self
    }

    pub fn scroll_back(mut self, lines: u16) -> Self {
        self.scroll_back = lines;
        self
    }

    /// All lines for the given width, oldest first
    pub fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let mut all_lines = Vec::new();
        let content_width = width.saturating_sub(2) as usize;

        // The reply being typed is already stored as the last message; show
        // the typed prefix in its place until typing finishes.
        let stored = match (self.typing, self.messages.last()) {
            (Some(_), Some(last)) if last.role == Role::Assistant => &self.messages[..self.messages.len() - 1],
            _ => self.messages,
        };

        for message in stored {
            all_lines.extend(render_message(message.role, &message.content, content_width, false));
            all_lines.push(Line::from(""));
        }

        if let Some(prompt) = self.pending {
            all_lines.extend(render_message(Role::User, prompt, content_width, false));
            all_lines.push(Line::from(""));
        }

        if let Some(typing) = self.typing {
            all_lines.extend(render_message(Role::Assistant, typing, content_width, true));
        } else if self.thinking {
            all_lines.push(Line::from(vec![
                Span::styled("🤖 ", Style::default().fg(Color::Green)),
                Span::styled("Thinking...", Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC)),
            ]));
        }

        all_lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(format!(" 💬 {} ", self.title));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() && self.pending.is_none() && self.typing.is_none() {
            let welcome_lines = [
                Line::from(Span::styled("Welcome to anychat! 🤖", Style::default().fg(Color::Green))),
                Line::from(""),
                Line::from(Span::styled("Type a message below and press Enter.", Style::default().fg(Color::Gray))),
                Line::from(Span::styled("Type / for commands, Tab to reach the conversation list.", Style::default().fg(Color::DarkGray))),
            ];

            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let all_lines = self.lines(inner_area.width);

        // Show the window ending `scroll_back` lines above the bottom
        let height = inner_area.height as usize;
        let total = all_lines.len();
        let end = total.saturating_sub(self.scroll_back as usize).max(height.min(total));
        let start = end.saturating_sub(height);

        for (i, line) in all_lines[start..end].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Render a single message into lines
fn render_message(role: Role, content: &str, width: usize, typing: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let (icon, label) = match role {
        Role::User => ("👤", "You"),
        Role::Assistant => ("🤖", "Assistant"),
    };
    lines.push(Line::from(Span::styled(
        format!("{} {} {}", icon, label, "─".repeat(20)),
        Style::default().fg(Color::DarkGray),
    )));

    let content_lines = wrap_text(content, width);
    let last = content_lines.len().saturating_sub(1);
    for (i, content_line) in content_lines.into_iter().enumerate() {
        let mut spans = vec![
            Span::raw("  "),
            Span::styled(content_line, content_style(role)),
        ];
        if typing && i == last {
            spans.push(Span::styled("▌", Style::default().fg(Color::Yellow)));
        }
        lines.push(Line::from(spans));
    }

    lines
}

/// Wrap text to fit within the given width, keeping explicit line breaks
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_len > 0 && current_len + word_len + 1 > width {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            if current_len > 0 {
                current_line.push(' ');
                current_len += 1;
            }
            current_line.push_str(word);
            current_len += word_len;
        }

        lines.push(current_line);
    }

    lines
}

/// Get content style based on role
fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
    }
}
