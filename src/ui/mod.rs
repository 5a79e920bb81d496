pub mod components;
pub mod dashboard;
pub mod invoice_viewer;
pub mod invoice_wizard;
pub mod invoices;
pub mod logs;

use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::Spans,
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

fn render_popup<B: Backend>(frame: &mut Frame<B>, size: Rect, title: &str, text: &str, color: Color) {
    let popup_area = centered_rect(60, 25, size);

    let popup = Paragraph::new(vec![
        Spans::from(""),
        Spans::from(text.to_string()),
        Spans::from(""),
        Spans::from("Press any key to continue"),
    ])
    .block(Block::default().title(title.to_string()).borders(Borders::ALL))
    .style(Style::default().fg(color))
    .wrap(Wrap { trim: true });

    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

pub(crate) fn render_error<B: Backend>(frame: &mut Frame<B>, size: Rect, error: &str) {
    render_popup(frame, size, "Error", error, Color::Red);
}

pub(crate) fn render_message<B: Backend>(frame: &mut Frame<B>, size: Rect, message: &str) {
    render_popup(frame, size, "Done", message, Color::Green);
}

/// Move a list selection one step, wrapping at both ends
pub(crate) fn step_selection(selected: Option<usize>, len: usize, forward: bool) -> Option<usize> {
    if len == 0 {
        return None;
    }

    Some(match selected {
        Some(i) if forward => {
            if i >= len - 1 {
                0
            } else {
                i + 1
            }
        }
        Some(i) => {
            if i == 0 {
                len - 1
            } else {
                i - 1
            }
        }
        None => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_wraps() {
        assert_eq!(step_selection(Some(2), 3, true), Some(0));
        assert_eq!(step_selection(Some(0), 3, false), Some(2));
        assert_eq!(step_selection(None, 3, true), Some(0));
        assert_eq!(step_selection(Some(1), 0, true), None);
    }
}
