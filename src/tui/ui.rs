use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::tui::app::ChatApp;
use crate::tui::history::HistoryView;

const TITLE: &str = "Auditing Smart FAQ Bot";
const SUBTITLE: &str = "Ask questions about policies, SOPs, donor rules, and audit reports";
const SIDEBAR_WIDTH: u16 = 46;

pub fn draw(frame: &mut Frame, app: &ChatApp) {
    let banner_height = app
        .error_banner
        .as_deref()
        .map(|text| (text.lines().count() as u16 + 2).min(10))
        .unwrap_or(0);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(banner_height),
            Constraint::Length(5),
        ])
        .split(frame.size());

    draw_header(frame, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(SIDEBAR_WIDTH)])
        .split(rows[1]);

    frame.render_widget(HistoryView::new(&app.chat), columns[0]);
    draw_sidebar(frame, columns[1], app);

    if let Some(text) = app.error_banner.as_deref() {
        let banner = Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::Red))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("❌ Error (Esc to dismiss)"),
            );
        frame.render_widget(banner, rows[2]);
    }

    frame.render_widget(&app.composer, rows[3]);
}

fn draw_header(frame: &mut Frame, area: Rect) {
    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            TITLE,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(SUBTITLE, Style::default().fg(Color::Gray))),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(header, area);
}

fn draw_sidebar(frame: &mut Frame, area: Rect, app: &ChatApp) {
    let label = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(Span::styled("Session", label)),
        Line::from(app.chat.id().to_string()),
        Line::from(""),
    ];

    for (name, value) in app.agent.settings() {
        lines.push(Line::from(Span::styled(name, label)));
        lines.push(match value {
            Some(value) => Line::from(value.to_string()),
            None => Line::from(Span::styled("not set", Style::default().fg(Color::Red))),
        });
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Trace events (last answer)", label)));
    lines.push(Line::from(
        app.chat
            .last_trace_events()
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ));

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Ctrl+N new session · /help",
        Style::default().fg(Color::DarkGray),
    )));

    let sidebar = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("⚙️ Settings"));
    frame.render_widget(sidebar, area);
}
