use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use super::{render_error, step_selection};
use crate::security::permissions::{self, Permission, Role};
use crate::service::DashboardStats;

pub struct DashboardState {
    role: Role,
    stats: DashboardStats,
    table_state: TableState,
    pub error: Option<String>,
}

pub enum DashboardAction {
    Back,
    Reload,
    View(String),
}

/// Short form for the summary cards: 1.5K, 2.3M
pub fn compact_amount(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("{:.1}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("{:.1}K", amount / 1_000.0)
    } else {
        format!("{amount:.2}")
    }
}

impl DashboardState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            stats: DashboardStats::default(),
            table_state: TableState::default(),
            error: None,
        }
    }

    pub fn stats(&self) -> &DashboardStats {
        &self.stats
    }

    pub fn set_stats(&mut self, stats: DashboardStats) {
        self.table_state
            .select(if stats.recent.is_empty() { None } else { Some(0) });
        self.stats = stats;
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<DashboardAction> {
        if self.error.take().is_some() {
            return None;
        }

        match key {
            KeyCode::Esc | KeyCode::Char('q') => return Some(DashboardAction::Back),
            KeyCode::Char('g') => return Some(DashboardAction::Reload),
            KeyCode::Down => {
                let i = step_selection(self.table_state.selected(), self.stats.recent.len(), true);
                self.table_state.select(i);
            }
            KeyCode::Up => {
                let i = step_selection(self.table_state.selected(), self.stats.recent.len(), false);
                self.table_state.select(i);
            }
            KeyCode::Enter => {
                let id = self
                    .table_state
                    .selected()
                    .and_then(|i| self.stats.recent.get(i))
                    .map(|invoice| invoice.id.clone())?;
                match permissions::require(self.role, Permission::InvoiceRead) {
                    Ok(()) => return Some(DashboardAction::View(id)),
                    Err(e) => self.error = Some(e.to_string()),
                }
            }
            _ => {}
        }
        None
    }
}

pub fn handle_input(state: &mut DashboardState) -> Result<Option<DashboardAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

fn stat_card<'a>(title: &'a str, value: String, detail: Option<String>, color: Color) -> Paragraph<'a> {
    let mut lines = vec![Spans::from(Span::styled(
        value,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    if let Some(detail) = detail {
        lines.push(Spans::from(Span::raw(detail)));
    }
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().title(title).borders(Borders::ALL))
}

pub fn render_dashboard<B: Backend>(frame: &mut Frame<B>, state: &mut DashboardState) {
    let size = frame.size();
    let stats = &state.stats;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(5), Constraint::Length(3)].as_ref())
        .split(size);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4].as_ref())
        .split(chunks[0]);

    frame.render_widget(
        stat_card("Total Invoices", stats.total_invoices.to_string(), None, Color::Cyan),
        cards[0],
    );
    frame.render_widget(
        stat_card("Total Revenue", compact_amount(stats.total_revenue), None, Color::Green),
        cards[1],
    );
    frame.render_widget(
        stat_card(
            "Pending",
            stats.pending_invoices.to_string(),
            Some(compact_amount(stats.pending_amount)),
            Color::Yellow,
        ),
        cards[2],
    );
    frame.render_widget(
        stat_card("Paid", stats.paid_invoices.to_string(), None, Color::Green),
        cards[3],
    );

    let header = Row::new(
        ["Number", "Client", "Total", "Status", "Created"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow))),
    )
    .bottom_margin(1);

    let rows = stats.recent.iter().map(|invoice| {
        Row::new(vec![
            Cell::from(invoice.invoice_number.clone()),
            Cell::from(invoice.client_name.clone()),
            Cell::from(invoice.currency.format_amount(invoice.totals.final_total)),
            Cell::from(invoice.status.as_str()),
            Cell::from(invoice.created_at.format("%Y-%m-%d").to_string()),
        ])
    });

    let recent = Table::new(rows)
        .header(header)
        .block(Block::default().title("Recent Invoices").borders(Borders::ALL))
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
    frame.render_stateful_widget(recent, chunks[1], &mut state.table_state);

    let help = Paragraph::new("<↑/↓> Select | <Enter> View | <G> Refresh | <Esc> Back")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(help, chunks[2]);

    if let Some(error) = &state.error {
        render_error(frame, size, error);
    }
}
