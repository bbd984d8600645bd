//! Transcript widget: committed messages plus the live streaming bubble.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::chat::{ChatMessage, ChatSession, Role};

pub struct HistoryView<'a> {
    chat: &'a ChatSession,
}

impl<'a> HistoryView<'a> {
    pub fn new(chat: &'a ChatSession) -> Self {
        Self { chat }
    }

    fn lines(&self, width: u16) -> Vec<Line<'static>> {
        let width = width.saturating_sub(2) as usize;
        let mut lines = Vec::new();

        for message in self.chat.messages() {
            render_message(message, width, &mut lines);
            lines.push(Line::from(""));
        }

        if let Some(turn) = self.chat.pending() {
            lines.push(header_line(Role::Assistant, &chrono::Utc::now()));
            if turn.has_content() {
                let wrapped = wrap_text(turn.text(), width);
                let last = wrapped.len().saturating_sub(1);
                for (i, text) in wrapped.into_iter().enumerate() {
                    let cursor = if i == last { "▋" } else { "" };
                    lines.push(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(text, content_style(Role::Assistant)),
                        Span::styled(cursor, Style::default().fg(Color::Yellow)),
                    ]));
                }
            } else {
                lines.push(Line::from(vec![Span::styled(
                    "  Thinking...",
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )]));
            }
        }

        lines
    }
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("💬 Conversation");
        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.chat.messages().is_empty() && self.chat.pending().is_none() {
            let welcome = [
                Line::from(Span::styled(
                    "Ask anything covered by the audit FAQ documents.",
                    Style::default().fg(Color::Green),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Answers stream in as the agent writes them; cited documents are listed below each answer.",
                    Style::default().fg(Color::Gray),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Press Enter to send, Shift+Enter for a new line, / for commands.",
                    Style::default().fg(Color::DarkGray),
                )),
            ];
            for (i, line) in welcome.iter().take(inner_area.height as usize).enumerate() {
                buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
            }
            return;
        }

        // Stick to the bottom: show the last lines that fit.
        let all_lines = self.lines(inner_area.width);
        let start = all_lines.len().saturating_sub(inner_area.height as usize);
        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn render_message(message: &ChatMessage, width: usize, lines: &mut Vec<Line<'static>>) {
    lines.push(header_line(message.role, &message.timestamp));

    for text in wrap_text(&message.content, width) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(text, content_style(message.role)),
        ]));
    }

    if let Some(caption) = message.sources_caption() {
        for text in wrap_text(&caption, width) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(
                    text,
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
                ),
            ]));
        }
    }
}

fn header_line(role: Role, timestamp: &chrono::DateTime<chrono::Utc>) -> Line<'static> {
    let icon = match role {
        Role::User => "👤",
        Role::Assistant => "🤖",
        Role::System => "⚙️",
    };
    let header = format!(
        "{} {} {}",
        icon,
        timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
        "─".repeat(20)
    );
    Line::from(Span::styled(header, Style::default().fg(Color::DarkGray)))
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

/// Word-wrap `text` to `width` columns, keeping explicit line breaks.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = word.chars().count();
            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            if current_width > 0 {
                current.push(' ');
                current_width += 1;
            }
            current.push_str(word);
            current_width += word_width;
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
