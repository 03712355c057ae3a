use chrono::Local;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, StatefulWidget, Widget},
};

use crate::conversation::Conversation;

/// Conversation list; the current conversation is highlighted
pub struct Sidebar<'a> {
    entries: Vec<(&'a str, &'a Conversation)>,
    current: usize,
    has_focus: bool,
    show_timestamps: bool,
}

impl<'a> Sidebar<'a> {
    pub fn new(entries: Vec<(&'a str, &'a Conversation)>, current: usize) -> Self {
        Self {
            entries,
            current,
            has_focus: false,
            show_timestamps: true,
        }
    }

    pub fn focused(mut self, has_focus: bool) -> Self {
        self.has_focus = has_focus;
        self
    }

    pub fn show_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }
}

impl Widget for Sidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let items: Vec<ListItem> = self
            .entries
            .iter()
            .map(|(_, conversation)| {
                let mut spans = Vec::new();
                if self.show_timestamps {
                    let stamp = conversation
                        .updated_at
                        .with_timezone(&Local)
                        .format("%m-%d %H:%M")
                        .to_string();
                    spans.push(Span::styled(stamp, Style::default().fg(Color::DarkGray)));
                    spans.push(Span::raw(" "));
                }
                spans.push(Span::styled(conversation.title.clone(), Style::default().fg(Color::White)));
                if conversation.is_empty() {
                    spans.push(Span::styled(" (empty)", Style::default().fg(Color::DarkGray)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let highlight = if self.has_focus {
            Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::REVERSED)
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(if self.has_focus {
                        Style::default().fg(Color::Green)
                    } else {
                        Style::default().fg(Color::DarkGray)
                    })
                    .title(format!(" Chats ({}) ", self.entries.len())),
            )
            .highlight_style(highlight)
            .highlight_symbol("› ");

        let mut state = ListState::default().with_selected(Some(self.current));
        StatefulWidget::render(list, area, buf, &mut state);
    }
}
