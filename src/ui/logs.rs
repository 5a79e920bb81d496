use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::{render_error, step_selection};
use crate::models::{LogEntry, LogOperation, LogStatus, NumericField};
use crate::service::{LogsPage, LogsRequest};

const LOGS_PER_PAGE: usize = 20;

pub struct LogsState {
    entries: Vec<LogEntry>,
    total: usize,
    page: usize,
    operation: Option<LogOperation>,
    invoice_id: Option<String>,
    list_state: ListState,
    pub error: Option<String>,
}

pub enum LogsAction {
    Back,
    Reload,
}

impl LogsState {
    /// Logs of every invoice, or of one invoice when `invoice_id` is set
    pub fn new(invoice_id: Option<String>) -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
            page: 1,
            operation: None,
            invoice_id,
            list_state: ListState::default(),
            error: None,
        }
    }

    pub fn request(&self) -> LogsRequest {
        LogsRequest {
            invoice_id: self.invoice_id.clone(),
            action: Some(self.operation.map_or("all", |op| op.as_str()).to_string()),
            page: NumericField::new(self.page as f64),
            limit: NumericField::new(LOGS_PER_PAGE as f64),
            ..LogsRequest::default()
        }
    }

    pub fn set_page(&mut self, page: LogsPage) {
        self.entries = page.logs;
        self.total = page.total;
        self.list_state
            .select(if self.entries.is_empty() { None } else { Some(0) });
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(LOGS_PER_PAGE).max(1)
    }

    pub fn operation(&self) -> Option<LogOperation> {
        self.operation
    }

    /// all → each operation in turn → all
    pub fn cycle_operation(&mut self) {
        self.operation = match self.operation {
            None => Some(LogOperation::ALL[0]),
            Some(op) => LogOperation::ALL
                .iter()
                .position(|o| *o == op)
                .and_then(|i| LogOperation::ALL.get(i + 1))
                .copied(),
        };
        self.page = 1;
    }

    pub fn selected(&self) -> Option<&LogEntry> {
        self.list_state.selected().and_then(|i| self.entries.get(i))
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<LogsAction> {
        if self.error.take().is_some() {
            return None;
        }

        match key {
            KeyCode::Esc | KeyCode::Char('q') => return Some(LogsAction::Back),
            KeyCode::Down => {
                let i = step_selection(self.list_state.selected(), self.entries.len(), true);
                self.list_state.select(i);
            }
            KeyCode::Up => {
                let i = step_selection(self.list_state.selected(), self.entries.len(), false);
                self.list_state.select(i);
            }
            KeyCode::Right | KeyCode::PageDown if self.page < self.page_count() => {
                self.page += 1;
                return Some(LogsAction::Reload);
            }
            KeyCode::Left | KeyCode::PageUp if self.page > 1 => {
                self.page -= 1;
                return Some(LogsAction::Reload);
            }
            KeyCode::Char('o') => {
                self.cycle_operation();
                return Some(LogsAction::Reload);
            }
            _ => {}
        }
        None
    }
}

pub fn handle_input(state: &mut LogsState) -> Result<Option<LogsAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

fn status_style(status: LogStatus) -> Style {
    match status {
        LogStatus::Success => Style::default().fg(Color::Green),
        LogStatus::Failed => Style::default().fg(Color::Red),
        LogStatus::Pending => Style::default().fg(Color::Yellow),
    }
}

pub fn render_logs<B: Backend>(frame: &mut Frame<B>, state: &mut LogsState) {
    let size = frame.size();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(3)].as_ref())
        .split(size);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(rows[0]);

    let entries: Vec<ListItem> = state
        .entries
        .iter()
        .map(|entry| {
            ListItem::new(Spans::from(vec![
                Span::raw(format!("{} ", entry.timestamp.format("%Y-%m-%d %H:%M:%S"))),
                Span::styled(format!("{:<8}", entry.status.to_string()), status_style(entry.status)),
                Span::raw(format!("{} {}", entry.operation, entry.invoice_id)),
            ]))
        })
        .collect();

    let mut title = format!(
        "Logs [{}] ({} total, page {} of {})",
        state.operation.map_or("all", |op| op.as_str()),
        state.total,
        state.page,
        state.page_count()
    );
    if let Some(invoice_id) = &state.invoice_id {
        title.push_str(&format!(" for {invoice_id}"));
    }

    let list = List::new(entries)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_stateful_widget(list, columns[0], &mut state.list_state);

    let details = state
        .selected()
        .map(|entry| serde_json::to_string_pretty(&entry.details).unwrap_or_else(|_| entry.details.to_string()))
        .unwrap_or_default();
    let details = Paragraph::new(details)
        .wrap(Wrap { trim: false })
        .block(Block::default().title("Details").borders(Borders::ALL));
    frame.render_widget(details, columns[1]);

    let help = Paragraph::new("<↑/↓> Select | <←/→> Page | <O> Operation filter | <Esc> Back")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(help, rows[1]);

    if let Some(error) = &state.error {
        render_error(frame, size, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_filter_cycles_through_all_operations() {
        let mut state = LogsState::new(None);
        let mut seen = Vec::new();
        for _ in 0..5 {
            state.cycle_operation();
            seen.push(state.operation());
        }

        assert_eq!(
            seen,
            vec![
                Some(LogOperation::InvoiceGenerated),
                Some(LogOperation::InvoiceSent),
                Some(LogOperation::InvoiceResent),
                Some(LogOperation::InvoiceStatusChanged),
                None,
            ]
        );
    }

    #[test]
    fn request_resolves_to_the_current_page() {
        let mut state = LogsState::new(Some("inv-1".to_string()));
        state.set_page(LogsPage {
            logs: Vec::new(),
            total: 45,
            page: 1,
            limit: LOGS_PER_PAGE,
        });
        assert!(matches!(state.handle_key(KeyCode::Right), Some(LogsAction::Reload)));
        state.handle_key(KeyCode::Char('o'));
        assert!(matches!(state.handle_key(KeyCode::Right), Some(LogsAction::Reload)));

        let (query, page, limit) = state.request().to_query().unwrap();
        assert_eq!((page, limit), (2, LOGS_PER_PAGE));
        assert_eq!(query.offset, 20);
        assert_eq!(query.operation, Some(LogOperation::InvoiceGenerated));
        assert_eq!(query.invoice_id.as_deref(), Some("inv-1"));
    }

    #[test]
    fn paging_stops_at_the_last_page() {
        let mut state = LogsState::new(None);
        state.set_page(LogsPage {
            logs: Vec::new(),
            total: 5,
            page: 1,
            limit: LOGS_PER_PAGE,
        });

        assert!(state.handle_key(KeyCode::Right).is_none());
        assert!(state.handle_key(KeyCode::Left).is_none());
    }
}
