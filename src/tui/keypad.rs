//! Passcode keypad modal.

use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::passcode::PasscodeEntry;
use crate::tui::colors::{BRAND_YELLOW, INK, PRIMARY};
use crate::tui::utils::centered_rect;

const KEY_ROWS: [&str; 4] = ["1   2   3", "4   5   6", "7   8   9", "    0    "];

/// Draw a keypad prompt over `area`.
pub fn render_keypad(f: &mut Frame, area: Rect, title: &str, subtitle: &str, entry: &PasscodeEntry) {
    let area = centered_rect(40, 60, area);
    f.render_widget(Clear, area);

    let mut text = vec![
        Line::from(""),
        Line::from(Span::styled(subtitle, Style::default().fg(INK))),
        Line::from(""),
        Line::from(Span::styled(
            entry.masked(),
            Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    text.extend(
        KEY_ROWS
            .iter()
            .map(|row| Line::from(Span::styled(*row, Style::default().fg(INK).add_modifier(Modifier::BOLD)))),
    );
    text.push(Line::from(""));
    text.push(Line::from(Span::styled(
        "Enter submit  Backspace delete  Esc cancel",
        Style::default().fg(INK),
    )));

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().bg(BRAND_YELLOW).fg(INK)),
        )
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}
