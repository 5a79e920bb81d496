use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};

use super::invoice_wizard::totals_lines;
use super::{render_error, render_message};
use crate::models::{Invoice, InvoiceStatus};
use crate::security::permissions::{self, Permission, Role};
use crate::totals::{LineBreakdown, TaxRateTable};

pub struct InvoiceViewerState {
    invoice: Invoice,
    rates: TaxRateTable,
    role: Role,
    pub message: Option<String>,
    pub error: Option<String>,
}

pub enum ViewerAction {
    Back,
    Resend(String),
    ChangeStatus(String, InvoiceStatus),
    Logs(String),
    Download(String),
}

impl InvoiceViewerState {
    pub fn new(invoice: Invoice, rates: TaxRateTable, role: Role) -> Self {
        Self {
            invoice,
            rates,
            role,
            message: None,
            error: None,
        }
    }

    pub fn invoice(&self) -> &Invoice {
        &self.invoice
    }

    pub fn set_invoice(&mut self, invoice: Invoice) {
        self.invoice = invoice;
    }

    /// Per-line figures for the stored items
    pub fn breakdown(&self) -> Vec<LineBreakdown> {
        self.invoice
            .items
            .iter()
            .map(|item| LineBreakdown::for_item(item, &self.rates))
            .collect()
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<ViewerAction> {
        if self.error.take().is_some() || self.message.take().is_some() {
            return None;
        }

        match key {
            KeyCode::Esc | KeyCode::Char('q') => Some(ViewerAction::Back),
            KeyCode::Char('r') => match permissions::require(self.role, Permission::InvoiceResend) {
                Ok(()) => Some(ViewerAction::Resend(self.invoice.id.clone())),
                Err(e) => {
                    self.error = Some(e.to_string());
                    None
                }
            },
            KeyCode::Char('s') => match permissions::require(self.role, Permission::InvoiceUpdate) {
                Ok(()) => Some(ViewerAction::ChangeStatus(
                    self.invoice.id.clone(),
                    self.invoice.status.next(),
                )),
                Err(e) => {
                    self.error = Some(e.to_string());
                    None
                }
            },
            KeyCode::Char('l') => match permissions::require(self.role, Permission::LogsRead) {
                Ok(()) => Some(ViewerAction::Logs(self.invoice.id.clone())),
                Err(e) => {
                    self.error = Some(e.to_string());
                    None
                }
            },
            KeyCode::Char('d') => match permissions::require(self.role, Permission::InvoiceRead) {
                Ok(()) => Some(ViewerAction::Download(self.invoice.id.clone())),
                Err(e) => {
                    self.error = Some(e.to_string());
                    None
                }
            },
            _ => None,
        }
    }
}

pub fn handle_input(state: &mut InvoiceViewerState) -> Result<Option<ViewerAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

fn field<'a>(label: &'a str, value: String) -> Spans<'a> {
    Spans::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Yellow)),
        Span::raw(value),
    ])
}

fn or_dash(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

pub fn render_invoice_viewer<B: Backend>(frame: &mut Frame<B>, state: &InvoiceViewerState) {
    let size = frame.size();
    let invoice = &state.invoice;
    let currency = invoice.currency;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(9),
                Constraint::Min(5),
                Constraint::Length(8),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(size);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(chunks[0]);

    let client = Paragraph::new(vec![
        field("Name", invoice.client_name.clone()),
        field("Email", or_dash(&invoice.client_email)),
        field("Address", or_dash(&invoice.client_address)),
        field("Tax ID", or_dash(&invoice.client_tax_id)),
        field("Recipients", invoice.email_recipients.join(", ")),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().title("Client").borders(Borders::ALL));
    frame.render_widget(client, top[0]);

    let source = match (&invoice.source_system, &invoice.source_id) {
        (Some(system), Some(id)) => format!("{system} / {id}"),
        (Some(system), None) => system.clone(),
        _ => "-".to_string(),
    };
    let details = Paragraph::new(vec![
        field("Status", invoice.status.to_string()),
        field("Currency", currency.code().to_string()),
        field("Created", invoice.created_at.format("%Y-%m-%d %H:%M").to_string()),
        field("Due", or_dash(&invoice.due_date)),
        field("Source", source),
        field("Document", invoice.pdf_file_id.clone()),
        field("Notes", or_dash(&invoice.notes)),
    ])
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .title(format!("Invoice {}", invoice.invoice_number))
            .borders(Borders::ALL),
    );
    frame.render_widget(details, top[1]);

    let header = Row::new(
        ["Description", "Qty", "Unit Price", "Category", "Line Total", "Tax"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow))),
    )
    .bottom_margin(1);

    let rows = invoice.items.iter().zip(state.breakdown()).map(|(item, line)| {
        let number = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        Row::new(vec![
            Cell::from(item.description.clone()),
            Cell::from(number(item.qty.value())),
            Cell::from(item.unit_price.value().map_or_else(|| "-".to_string(), |v| currency.format_amount(v))),
            Cell::from(format!("{} ({:.0}%)", item.tax_category, line.tax_rate * 100.0)),
            Cell::from(currency.format_amount(line.line_total)),
            Cell::from(currency.format_amount(line.tax)),
        ])
    });

    let items = Table::new(rows)
        .header(header)
        .block(Block::default().title("Line Items").borders(Borders::ALL))
        .widths(&[
            Constraint::Percentage(30),
            Constraint::Percentage(10),
            Constraint::Percentage(15),
            Constraint::Percentage(15),
            Constraint::Percentage(15),
            Constraint::Percentage(15),
        ]);
    frame.render_widget(items, chunks[1]);

    let totals = Paragraph::new(totals_lines(&invoice.totals, currency))
        .block(Block::default().title("Totals").borders(Borders::ALL));
    frame.render_widget(totals, chunks[2]);

    let help = Paragraph::new("<R> Resend | <S> Next status | <D> Download | <L> Logs | <Esc> Back")
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(help, chunks[3]);

    if let Some(error) = &state.error {
        render_error(frame, size, error);
    } else if let Some(message) = &state.message {
        render_message(frame, size, message);
    }
}
