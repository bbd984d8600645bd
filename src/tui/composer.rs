use crate::tui::commands::{CommandEntry, SlashCommand, command_entries, parse_slash_command};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};
use std::cell::{Cell, RefCell};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(SlashCommand),
    None,
}

/// Text being edited. `cursor` is a byte offset on a char boundary.
#[derive(Debug, Clone, Default)]
struct TextAreaState {
    content: String,
    cursor: usize,
}

impl TextAreaState {
    fn insert_char(&mut self, c: char) {
        self.content.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn backspace(&mut self) -> bool {
        match self.content[..self.cursor].chars().next_back() {
            Some(c) => {
                self.cursor -= c.len_utf8();
                self.content.remove(self.cursor);
                true
            }
            None => false,
        }
    }

    fn delete(&mut self) -> bool {
        if self.cursor < self.content.len() {
            self.content.remove(self.cursor);
            true
        } else {
            false
        }
    }

    fn left(&mut self) {
        if let Some(c) = self.content[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
        }
    }

    fn right(&mut self) {
        if let Some(c) = self.content[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.content)
    }
}

/// Question input with a `/` command palette
pub struct Composer {
    state: RefCell<TextAreaState>,
    placeholder: String,
    busy: bool,
    command_entries: Vec<CommandEntry>,
    filtered_commands: RefCell<Vec<CommandEntry>>,
    show_command_palette: Cell<bool>,
    selected_command: Cell<Option<usize>>,
}

impl Composer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: RefCell::new(TextAreaState::default()),
            placeholder: placeholder.into(),
            busy: false,
            command_entries: command_entries(),
            filtered_commands: RefCell::new(Vec::new()),
            show_command_palette: Cell::new(false),
            selected_command: Cell::new(None),
        }
    }

    /// Handle key input
    pub fn handle_key(&self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        let mut state = self.state.borrow_mut();

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    state.insert_char('\n');
                } else if self.show_command_palette.get() && self.apply_selected_command(&mut state) {
                    return ComposerResult::None;
                } else if !state.content.trim().is_empty() {
                    let command = parse_slash_command(&state.content);
                    // A question typed during a running turn waits in the box.
                    if self.busy && command.is_none_or(|c| !c.available_while_busy()) {
                        return ComposerResult::None;
                    }
                    let content = state.take();
                    self.close_command_palette();
                    return match command {
                        Some(command) => ComposerResult::Command(command),
                        None => ComposerResult::Submitted(content),
                    };
                }
            }
            KeyCode::Up if self.show_command_palette.get() => self.move_command_selection(-1),
            KeyCode::Down if self.show_command_palette.get() => self.move_command_selection(1),
            KeyCode::Esc if self.show_command_palette.get() => self.close_command_palette(),
            KeyCode::Tab if self.show_command_palette.get() => {
                self.apply_selected_command(&mut state);
            }
            KeyCode::Char(c) => {
                state.insert_char(c);
                if state.content == "/" {
                    self.open_command_palette(&state);
                } else if self.show_command_palette.get() {
                    self.sync_command_palette(&state, c.is_whitespace());
                }
            }
            KeyCode::Backspace => {
                if state.backspace() && self.show_command_palette.get() {
                    self.sync_command_palette(&state, false);
                }
            }
            KeyCode::Delete => {
                if state.delete() && self.show_command_palette.get() {
                    self.sync_command_palette(&state, false);
                }
            }
            KeyCode::Left => state.left(),
            KeyCode::Right => state.right(),
            KeyCode::Home => state.cursor = 0,
            KeyCode::End => state.cursor = state.content.len(),
            _ => {}
        }

        ComposerResult::None
    }

    /// Paste inserts text verbatim, newlines included.
    pub fn insert_str(&self, text: &str) {
        let mut state = self.state.borrow_mut();
        for c in text.chars() {
            state.insert_char(c);
        }
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    #[cfg(test)]
    pub(crate) fn content(&self) -> String {
        self.state.borrow().content.clone()
    }

    fn sync_command_palette(&self, state: &TextAreaState, typed_space: bool) {
        if state.content.starts_with('/') && !typed_space {
            self.refresh_command_palette(state);
        } else {
            self.close_command_palette();
        }
    }

    fn open_command_palette(&self, state: &TextAreaState) {
        self.show_command_palette.set(true);
        self.selected_command.set(Some(0));
        self.refresh_command_palette(state);
    }

    fn close_command_palette(&self) {
        self.show_command_palette.set(false);
        self.filtered_commands.borrow_mut().clear();
        self.selected_command.set(None);
    }

    fn refresh_command_palette(&self, state: &TextAreaState) {
        let query = state.content.trim_start_matches('/').to_lowercase();
        let mut filtered = self.filtered_commands.borrow_mut();
        filtered.clear();
        filtered.extend(
            self.command_entries
                .iter()
                .filter(|entry| query.is_empty() || entry.keyword.starts_with(&query))
                .copied(),
        );

        if filtered.is_empty() {
            self.selected_command.set(None);
        } else {
            let index = self.selected_command.get().unwrap_or(0);
            self.selected_command.set(Some(index.min(filtered.len() - 1)));
        }
    }

    fn move_command_selection(&self, delta: isize) {
        let len = self.filtered_commands.borrow().len() as isize;
        if len == 0 {
            self.selected_command.set(None);
            return;
        }

        let current = self.selected_command.get().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len);
        self.selected_command.set(Some(next as usize));
    }

    /// Fill the input with the highlighted command. Returns `false` when the
    /// input already names it, so Enter runs the command directly.
    fn apply_selected_command(&self, state: &mut TextAreaState) -> bool {
        let entry = {
            let filtered = self.filtered_commands.borrow();
            match self.selected_command.get().and_then(|index| filtered.get(index)) {
                Some(entry) => *entry,
                None => return false,
            }
        };

        let completed = format!("/{}", entry.keyword);
        self.close_command_palette();
        if state.content.trim_end() == completed {
            return false;
        }
        state.content = completed;
        state.cursor = state.content.len();
        true
    }
}

impl Widget for &Composer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let state = self.state.borrow();

        let (title, color) = if self.busy {
            ("⏳ Answering...", Color::DarkGray)
        } else {
            ("❓ Ask a question", Color::Green)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(color));

        let inner_area = block.inner(area);
        block.render(area, buf);

        if state.content.is_empty() {
            let placeholder = Line::from(vec![Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder, inner_area.width);
        } else {
            let mut content = state.content.clone();
            content.insert(state.cursor.min(content.len()), '▌');

            // Keep the last lines visible when the input grows past the box.
            let lines: Vec<&str> = content.split('\n').collect();
            let start = lines.len().saturating_sub(inner_area.height as usize);
            for (i, line_text) in lines[start..].iter().enumerate() {
                let line = Line::from(vec![Span::raw(*line_text)]);
                buf.set_line(inner_area.x, inner_area.y + i as u16, &line, inner_area.width);
            }
        }

        if self.show_command_palette.get() {
            let filtered = self.filtered_commands.borrow();
            let palette_height = (filtered.len().min(5) + 2) as u16;
            let palette_area = Rect {
                x: area.x,
                y: area.y.saturating_sub(palette_height),
                width: area.width,
                height: palette_height.min(area.y),
            };
            if palette_area.height == 0 {
                return;
            }

            let block = Block::default()
                .borders(Borders::ALL)
                .title("Commands")
                .style(Style::default().fg(Color::Blue));
            let inner = block.inner(palette_area);
            block.render(palette_area, buf);

            let selected = self.selected_command.get();
            for (index, entry) in filtered.iter().take(inner.height as usize).enumerate() {
                let style = if selected == Some(index) {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };

                let line = Line::from(vec![
                    Span::styled(format!("/{}", entry.keyword), style),
                    Span::styled("  ", Style::default()),
                    Span::styled(entry.description, Style::default().fg(Color::Gray)),
                ]);
                buf.set_line(inner.x, inner.y + index as u16, &line, inner.width);
            }
        }
    }
}
