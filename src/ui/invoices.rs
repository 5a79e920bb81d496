use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use super::{render_error, render_message, step_selection};
use crate::db::{InvoiceQuery, Page};
use crate::models::{Invoice, InvoiceStatus};
use crate::security::permissions::{self, Permission, Role};

pub const PAGE_SIZE: usize = 20;

/// State of the invoice list screen
pub struct InvoicesState {
    role: Role,
    invoices: Vec<Invoice>,
    total: usize,
    page: usize,
    status_filter: Option<InvoiceStatus>,
    search: String,
    searching: bool,
    table_state: TableState,
    pub message: Option<String>,
    pub error: Option<String>,
}

pub enum InvoiceAction {
    Quit,
    Reload,
    NewInvoice,
    View(String),
    Resend(String),
    ChangeStatus(String, InvoiceStatus),
    Logs,
    Dashboard,
}

impl InvoicesState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            invoices: Vec::new(),
            total: 0,
            page: 1,
            status_filter: None,
            search: String::new(),
            searching: false,
            table_state: TableState::default(),
            message: None,
            error: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Query for the current page, filter and search
    pub fn query(&self) -> InvoiceQuery {
        InvoiceQuery {
            status: self.status_filter,
            search: Some(self.search.trim().to_string()).filter(|s| !s.is_empty()),
            page: self.page,
            limit: PAGE_SIZE,
        }
    }

    pub fn set_page(&mut self, page: Page<Invoice>) {
        self.invoices = page.items;
        self.total = page.total;

        let selected = self.table_state.selected().unwrap_or(0);
        if self.invoices.is_empty() {
            self.table_state.select(None);
        } else {
            self.table_state.select(Some(selected.min(self.invoices.len() - 1)));
        }
    }

    pub fn invoices(&self) -> &[Invoice] {
        &self.invoices
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(PAGE_SIZE).max(1)
    }

    pub fn status_filter(&self) -> Option<InvoiceStatus> {
        self.status_filter
    }

    /// all → generated → sent → paid → overdue → cancelled → all
    pub fn cycle_status_filter(&mut self) {
        self.status_filter = match self.status_filter {
            None => Some(InvoiceStatus::ALL[0]),
            Some(InvoiceStatus::Cancelled) => None,
            Some(status) => Some(status.next()),
        };
        self.reset_paging();
    }

    pub fn next_page(&mut self) -> bool {
        if self.page < self.page_count() {
            self.page += 1;
            self.table_state.select(Some(0));
            true
        } else {
            false
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.page > 1 {
            self.page -= 1;
            self.table_state.select(Some(0));
            true
        } else {
            false
        }
    }

    fn reset_paging(&mut self) {
        self.page = 1;
        self.table_state.select(Some(0));
    }

    pub fn next(&mut self) {
        let i = step_selection(self.table_state.selected(), self.invoices.len(), true);
        self.table_state.select(i);
    }

    pub fn previous(&mut self) {
        let i = step_selection(self.table_state.selected(), self.invoices.len(), false);
        self.table_state.select(i);
    }

    pub fn selected_invoice(&self) -> Option<&Invoice> {
        self.table_state.selected().and_then(|i| self.invoices.get(i))
    }

    fn allowed(&mut self, permission: Permission) -> bool {
        match permissions::require(self.role, permission) {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(e.to_string());
                false
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<InvoiceAction> {
        if self.error.take().is_some() || self.message.take().is_some() {
            return None;
        }

        if self.searching {
            match key {
                KeyCode::Enter => {
                    self.searching = false;
                    self.reset_paging();
                    return Some(InvoiceAction::Reload);
                }
                KeyCode::Esc => {
                    self.searching = false;
                    self.search.clear();
                    self.reset_paging();
                    return Some(InvoiceAction::Reload);
                }
                KeyCode::Backspace => {
                    self.search.pop();
                }
                KeyCode::Char(c) => self.search.push(c),
                _ => {}
            }
            return None;
        }

        match key {
            KeyCode::Char('q') | KeyCode::Esc => return Some(InvoiceAction::Quit),
            KeyCode::Down => self.next(),
            KeyCode::Up => self.previous(),
            KeyCode::Right | KeyCode::PageDown => {
                if self.next_page() {
                    return Some(InvoiceAction::Reload);
                }
            }
            KeyCode::Left | KeyCode::PageUp => {
                if self.previous_page() {
                    return Some(InvoiceAction::Reload);
                }
            }
            KeyCode::Char('f') => {
                self.cycle_status_filter();
                return Some(InvoiceAction::Reload);
            }
            KeyCode::Char('/') => self.searching = true,
            KeyCode::Char('n') => {
                if self.allowed(Permission::InvoiceCreate) {
                    return Some(InvoiceAction::NewInvoice);
                }
            }
            KeyCode::Char('l') => {
                if self.allowed(Permission::LogsRead) {
                    return Some(InvoiceAction::Logs);
                }
            }
            KeyCode::Char('d') => {
                if self.allowed(Permission::InvoiceRead) {
                    return Some(InvoiceAction::Dashboard);
                }
            }
            KeyCode::Enter => {
                let id = self.selected_invoice().map(|i| i.id.clone())?;
                if self.allowed(Permission::InvoiceRead) {
                    return Some(InvoiceAction::View(id));
                }
            }
            KeyCode::Char('r') => {
                let id = self.selected_invoice().map(|i| i.id.clone())?;
                if self.allowed(Permission::InvoiceResend) {
                    return Some(InvoiceAction::Resend(id));
                }
            }
            KeyCode::Char('s') => {
                let (id, status) = self.selected_invoice().map(|i| (i.id.clone(), i.status))?;
                if self.allowed(Permission::InvoiceUpdate) {
                    return Some(InvoiceAction::ChangeStatus(id, status.next()));
                }
            }
            _ => {}
        }
        None
    }
}

pub fn handle_input(state: &mut InvoicesState) -> Result<Option<InvoiceAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

fn status_color(status: InvoiceStatus) -> Color {
    match status {
        InvoiceStatus::Generated => Color::Cyan,
        InvoiceStatus::Sent => Color::Blue,
        InvoiceStatus::Paid => Color::Green,
        InvoiceStatus::Overdue => Color::Red,
        InvoiceStatus::Cancelled => Color::DarkGray,
    }
}

pub fn render_invoices<B: Backend>(frame: &mut Frame<B>, state: &mut InvoicesState) {
    let size = frame.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(3)].as_ref())
        .split(size);

    let filter = state.status_filter.map_or("all", |s| s.as_str());
    let search = if state.searching {
        format!("{}_", state.search)
    } else if state.search.is_empty() {
        "-".to_string()
    } else {
        state.search.clone()
    };
    let filters = Paragraph::new(Spans::from(vec![
        Span::styled("Status: ", Style::default().fg(Color::Yellow)),
        Span::raw(filter),
        Span::raw("   "),
        Span::styled("Client search: ", Style::default().fg(Color::Yellow)),
        Span::raw(search),
        Span::raw("   "),
        Span::styled("Role: ", Style::default().fg(Color::Yellow)),
        Span::raw(state.role.as_str()),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(filters, chunks[0]);

    let header_cells = ["Number", "Client", "Total", "Status", "Due Date"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow)));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = state.invoices.iter().map(|invoice| {
        Row::new(vec![
            Cell::from(invoice.invoice_number.clone()),
            Cell::from(invoice.client_name.clone()),
            Cell::from(invoice.currency.format_amount(invoice.totals.final_total)),
            Cell::from(invoice.status.as_str()).style(Style::default().fg(status_color(invoice.status))),
            Cell::from(invoice.due_date.clone().unwrap_or_else(|| "-".to_string())),
        ])
    });

    let title = format!(
        "Invoices ({} total, page {} of {})",
        state.total,
        state.page,
        state.page_count()
    );
    let table = Table::new(rows)
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL))
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .widths(&[
            Constraint::Percentage(22),
            Constraint::Percentage(30),
            Constraint::Percentage(18),
            Constraint::Percentage(12),
            Constraint::Percentage(18),
        ]);
    frame.render_stateful_widget(table, chunks[1], &mut state.table_state);

    let help = if state.searching {
        "Type to search | <Enter> Apply | <Esc> Clear".to_string()
    } else {
        "<N> New | <Enter> View | <R> Resend | <S> Status | <F> Filter | </> Search | <L> Logs | <D> Dashboard | <←/→> Page | <Q> Quit"
            .to_string()
    };
    let help = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(help, chunks[2]);

    if let Some(error) = &state.error {
        render_error(frame, size, error);
    } else if let Some(message) = &state.message {
        render_message(frame, size, message);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::Currency;
    use crate::totals::TotalsResult;

    fn invoice(id: &str, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: id.to_string(),
            invoice_number: format!("INV-{id}"),
            source_system: None,
            source_id: None,
            client_name: "Acme Corp".to_string(),
            client_email: None,
            client_address: None,
            client_tax_id: None,
            items: Vec::new(),
            totals: TotalsResult::default(),
            currency: Currency::Usd,
            due_date: None,
            notes: None,
            email_recipients: Vec::new(),
            pdf_file_id: "doc".to_string(),
            status,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    fn loaded(role: Role, total: usize) -> InvoicesState {
        let mut state = InvoicesState::new(role);
        state.set_page(Page {
            items: vec![invoice("a", InvoiceStatus::Generated), invoice("b", InvoiceStatus::Sent)],
            total,
        });
        state
    }

    #[test]
    fn status_filter_cycles_back_to_all() {
        let mut state = InvoicesState::new(Role::Admin);
        let mut seen = Vec::new();
        for _ in 0..6 {
            state.cycle_status_filter();
            seen.push(state.status_filter());
        }

        assert_eq!(
            seen,
            vec![
                Some(InvoiceStatus::Generated),
                Some(InvoiceStatus::Sent),
                Some(InvoiceStatus::Paid),
                Some(InvoiceStatus::Overdue),
                Some(InvoiceStatus::Cancelled),
                None,
            ]
        );
    }

    #[test]
    fn paging_stays_in_range() {
        let mut state = loaded(Role::Admin, 45);
        assert_eq!(state.page_count(), 3);

        assert!(state.next_page());
        assert!(state.next_page());
        assert!(!state.next_page());
        assert_eq!(state.query().page, 3);
        assert_eq!(state.query().offset(), 40);

        state.cycle_status_filter();
        assert_eq!(state.page(), 1);
        assert!(!state.previous_page());
    }

    #[test]
    fn search_is_applied_on_enter() {
        let mut state = loaded(Role::Admin, 2);
        state.handle_key(KeyCode::Char('/'));
        for c in " acme ".chars() {
            state.handle_key(KeyCode::Char(c));
        }

        assert!(matches!(state.handle_key(KeyCode::Enter), Some(InvoiceAction::Reload)));
        assert_eq!(state.query().search.as_deref(), Some("acme"));
    }

    #[test]
    fn viewer_role_cannot_create_or_resend() {
        let mut state = loaded(Role::Viewer, 2);

        assert!(state.handle_key(KeyCode::Char('n')).is_none());
        assert_eq!(
            state.error.as_deref(),
            Some("Insufficient permissions. Required: invoice:create")
        );

        // the first key only dismisses the popup
        assert!(state.handle_key(KeyCode::Char('r')).is_none());
        assert!(state.handle_key(KeyCode::Char('r')).is_none());
        assert!(state.error.is_some());

        state.error = None;
        assert!(matches!(state.handle_key(KeyCode::Enter), Some(InvoiceAction::View(id)) if id == "a"));
    }

    #[test]
    fn dashboard_needs_read_access() {
        let mut state = loaded(Role::ApiUser, 2);
        assert!(state.handle_key(KeyCode::Char('d')).is_none());
        assert_eq!(
            state.error.as_deref(),
            Some("Insufficient permissions. Required: invoice:read")
        );

        let mut state = loaded(Role::Viewer, 2);
        assert!(matches!(state.handle_key(KeyCode::Char('d')), Some(InvoiceAction::Dashboard)));
    }

    #[test]
    fn status_key_proposes_the_next_status() {
        let mut state = loaded(Role::BillingManager, 2);
        state.next();

        assert!(matches!(
            state.handle_key(KeyCode::Char('s')),
            Some(InvoiceAction::ChangeStatus(id, InvoiceStatus::Paid)) if id == "b"
        ));
    }
}
