use anyhow::Result;
use chrono::{Duration, Local};
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::components::{render_date_input, DateInput};
use super::{centered_rect, render_error, step_selection};
use crate::models::{
    Adjustment, AdjustmentKind, ClientInfo, Currency, DraftMetadata, InvoiceDraft, LineItem, NumericField, TaxCategory,
};
use crate::totals::{compute_totals, LineBreakdown, TaxRateTable, TotalsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardField {
    ClientName,
    ClientEmail,
    ClientAddress,
    ClientTaxId,
    Currency,
    DueDate,
    ProjectCode,
    Notes,
    Recipients,
    LineItems,
    Markups,
    Discounts,
}

impl WizardField {
    const ORDER: [WizardField; 12] = [
        WizardField::ClientName,
        WizardField::ClientEmail,
        WizardField::ClientAddress,
        WizardField::ClientTaxId,
        WizardField::Currency,
        WizardField::DueDate,
        WizardField::ProjectCode,
        WizardField::Notes,
        WizardField::Recipients,
        WizardField::LineItems,
        WizardField::Markups,
        WizardField::Discounts,
    ];

    fn label(&self) -> &'static str {
        match self {
            WizardField::ClientName => "Client Name*",
            WizardField::ClientEmail => "Client Email",
            WizardField::ClientAddress => "Client Address",
            WizardField::ClientTaxId => "Client Tax ID",
            WizardField::Currency => "Currency",
            WizardField::DueDate => "Due Date",
            WizardField::ProjectCode => "Project Code",
            WizardField::Notes => "Notes",
            WizardField::Recipients => "Recipients",
            WizardField::LineItems => "Line Items*",
            WizardField::Markups => "Markups",
            WizardField::Discounts => "Discounts",
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, WizardField::LineItems | WizardField::Markups | WizardField::Discounts)
    }

    fn offset(&self, forward: bool) -> WizardField {
        let len = Self::ORDER.len();
        let idx = Self::ORDER.iter().position(|f| f == self).unwrap_or(0);
        let idx = if forward { (idx + 1) % len } else { (idx + len - 1) % len };
        Self::ORDER[idx]
    }
}

/// Line item as typed; numbers stay text until the draft is built
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemInput {
    pub description: String,
    pub qty: String,
    pub unit_price: String,
    pub tax_category: TaxCategory,
}

impl ItemInput {
    fn to_line_item(&self) -> LineItem {
        LineItem {
            description: self.description.trim().to_string(),
            qty: NumericField::parse(&self.qty),
            unit_price: NumericField::parse(&self.unit_price),
            tax_category: self.tax_category,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentInput {
    pub kind: AdjustmentKind,
    pub value: String,
}

impl AdjustmentInput {
    fn to_adjustment(&self) -> Adjustment {
        Adjustment {
            kind: self.kind.clone(),
            value: NumericField::parse(&self.value),
        }
    }

    fn describe(&self, currency: Currency) -> String {
        let value = NumericField::parse(&self.value).value().unwrap_or(0.0);
        match self.kind {
            AdjustmentKind::Percentage => format!("{value}%"),
            AdjustmentKind::Amount => currency.format_amount(value),
            AdjustmentKind::Other(_) => format!("{} ({})", self.value, self.kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryField {
    Description,
    Qty,
    UnitPrice,
    Value,
}

impl EntryField {
    fn label(&self) -> &'static str {
        match self {
            EntryField::Description => "Description",
            EntryField::Qty => "Quantity",
            EntryField::UnitPrice => "Unit Price",
            EntryField::Value => "Value",
        }
    }
}

/// An open editor on one row of the focused list
#[derive(Debug, Clone)]
struct RowEditor {
    index: usize,
    field: EntryField,
    value: String,
}

pub enum InvoiceWizardAction {
    Cancel,
    Generate(InvoiceDraft),
}

pub struct InvoiceWizardState {
    rates: TaxRateTable,
    client_name: String,
    client_email: String,
    client_address: String,
    client_tax_id: String,
    currency: Currency,
    due_date: DateInput,
    project_code: String,
    notes: String,
    recipients: String,
    items: Vec<ItemInput>,
    markups: Vec<AdjustmentInput>,
    discounts: Vec<AdjustmentInput>,
    current_field: WizardField,
    editing: bool,
    active_input: String,
    row_editor: Option<RowEditor>,
    items_state: ListState,
    markups_state: ListState,
    discounts_state: ListState,
    pub show_error: Option<String>,
}

impl InvoiceWizardState {
    pub fn new(rates: TaxRateTable) -> Self {
        let fallback = Local::now().date_naive() + Duration::days(30);

        Self {
            rates,
            client_name: String::new(),
            client_email: String::new(),
            client_address: String::new(),
            client_tax_id: String::new(),
            currency: Currency::default(),
            due_date: DateInput::new(None, fallback),
            project_code: String::new(),
            notes: String::new(),
            recipients: String::new(),
            items: Vec::new(),
            markups: Vec::new(),
            discounts: Vec::new(),
            current_field: WizardField::ClientName,
            editing: false,
            active_input: String::new(),
            row_editor: None,
            items_state: ListState::default(),
            markups_state: ListState::default(),
            discounts_state: ListState::default(),
            show_error: None,
        }
    }

    fn text_mut(&mut self, field: WizardField) -> Option<&mut String> {
        match field {
            WizardField::ClientName => Some(&mut self.client_name),
            WizardField::ClientEmail => Some(&mut self.client_email),
            WizardField::ClientAddress => Some(&mut self.client_address),
            WizardField::ClientTaxId => Some(&mut self.client_tax_id),
            WizardField::ProjectCode => Some(&mut self.project_code),
            WizardField::Notes => Some(&mut self.notes),
            WizardField::Recipients => Some(&mut self.recipients),
            _ => None,
        }
    }

    fn text(&self, field: WizardField) -> Option<&str> {
        match field {
            WizardField::ClientName => Some(self.client_name.as_str()),
            WizardField::ClientEmail => Some(self.client_email.as_str()),
            WizardField::ClientAddress => Some(self.client_address.as_str()),
            WizardField::ClientTaxId => Some(self.client_tax_id.as_str()),
            WizardField::ProjectCode => Some(self.project_code.as_str()),
            WizardField::Notes => Some(self.notes.as_str()),
            WizardField::Recipients => Some(self.recipients.as_str()),
            _ => None,
        }
    }

    /// Set a free-text field; other fields are left alone
    pub fn set_text(&mut self, field: WizardField, value: &str) {
        if let Some(text) = self.text_mut(field) {
            *text = value.to_string();
        }
    }

    pub fn set_currency(&mut self, currency: Currency) {
        self.currency = currency;
    }

    pub fn push_item(&mut self, description: &str, qty: &str, unit_price: &str, tax_category: TaxCategory) {
        self.items.push(ItemInput {
            description: description.to_string(),
            qty: qty.to_string(),
            unit_price: unit_price.to_string(),
            tax_category,
        });
        self.items_state.select(Some(self.items.len() - 1));
    }

    pub fn push_markup(&mut self, kind: AdjustmentKind, value: &str) {
        self.markups.push(AdjustmentInput {
            kind,
            value: value.to_string(),
        });
        self.markups_state.select(Some(self.markups.len() - 1));
    }

    pub fn push_discount(&mut self, kind: AdjustmentKind, value: &str) {
        self.discounts.push(AdjustmentInput {
            kind,
            value: value.to_string(),
        });
        self.discounts_state.select(Some(self.discounts.len() - 1));
    }

    pub fn current_field(&self) -> WizardField {
        self.current_field
    }

    /// The draft the form currently describes
    pub fn to_draft(&self) -> InvoiceDraft {
        let optional = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());

        let recipients: Vec<String> = self
            .recipients
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        InvoiceDraft {
            client: Some(ClientInfo {
                name: self.client_name.trim().to_string(),
                email: optional(&self.client_email),
                address: optional(&self.client_address),
                tax_id: optional(&self.client_tax_id),
            }),
            items: self.items.iter().map(ItemInput::to_line_item).collect(),
            markups: self.markups.iter().map(AdjustmentInput::to_adjustment).collect(),
            discounts: self.discounts.iter().map(AdjustmentInput::to_adjustment).collect(),
            currency: self.currency,
            due_date: self.due_date.value(),
            notes: optional(&self.notes),
            metadata: DraftMetadata {
                project_code: optional(&self.project_code),
                ..DraftMetadata::default()
            },
            email_recipients: Some(recipients).filter(|r| !r.is_empty()),
            ..InvoiceDraft::default()
        }
    }

    /// Totals exactly as generation will compute them
    pub fn preview(&self) -> TotalsResult {
        compute_totals(&self.to_draft(), &self.rates)
    }

    pub fn is_valid(&self) -> bool {
        !self.client_name.trim().is_empty() && !self.items.is_empty()
    }

    fn list_len(&self, field: WizardField) -> usize {
        match field {
            WizardField::LineItems => self.items.len(),
            WizardField::Markups => self.markups.len(),
            WizardField::Discounts => self.discounts.len(),
            _ => 0,
        }
    }

    fn list_state_mut(&mut self, field: WizardField) -> Option<&mut ListState> {
        match field {
            WizardField::LineItems => Some(&mut self.items_state),
            WizardField::Markups => Some(&mut self.markups_state),
            WizardField::Discounts => Some(&mut self.discounts_state),
            _ => None,
        }
    }

    fn selected_row(&mut self) -> Option<usize> {
        let len = self.list_len(self.current_field);
        self.list_state_mut(self.current_field)
            .and_then(|s| s.selected())
            .filter(|i| *i < len)
    }

    fn move_selection(&mut self, forward: bool) {
        let len = self.list_len(self.current_field);
        if let Some(list_state) = self.list_state_mut(self.current_field) {
            list_state.select(step_selection(list_state.selected(), len, forward));
        }
    }

    fn start_editing(&mut self) {
        match self.current_field {
            WizardField::Currency => self.currency = self.currency.next(),
            WizardField::DueDate => {
                self.due_date.start_editing();
                self.editing = true;
            }
            field if field.is_list() => self.editing = true,
            field => {
                self.active_input = self.text(field).unwrap_or_default().to_string();
                self.editing = true;
            }
        }
    }

    fn stop_editing(&mut self, keep: bool) {
        if keep {
            let value = std::mem::take(&mut self.active_input);
            let field = self.current_field;
            if let Some(text) = self.text_mut(field) {
                *text = value;
            }
        }
        self.active_input.clear();
        self.due_date.stop_editing();
        self.row_editor = None;
        self.editing = false;
    }

    fn add_row(&mut self) {
        let field = match self.current_field {
            WizardField::LineItems => {
                self.push_item("", "", "", TaxCategory::Standard);
                EntryField::Description
            }
            WizardField::Markups => {
                self.push_markup(AdjustmentKind::Percentage, "");
                EntryField::Value
            }
            WizardField::Discounts => {
                self.push_discount(AdjustmentKind::Percentage, "");
                EntryField::Value
            }
            _ => return,
        };

        self.row_editor = Some(RowEditor {
            index: self.list_len(self.current_field) - 1,
            field,
            value: String::new(),
        });
    }

    fn edit_row(&mut self) {
        let Some(index) = self.selected_row() else {
            return;
        };
        let (field, value) = match self.current_field {
            WizardField::LineItems => (EntryField::Description, self.items[index].description.clone()),
            WizardField::Markups => (EntryField::Value, self.markups[index].value.clone()),
            WizardField::Discounts => (EntryField::Value, self.discounts[index].value.clone()),
            _ => return,
        };
        self.row_editor = Some(RowEditor { index, field, value });
    }

    fn delete_row(&mut self) {
        let Some(index) = self.selected_row() else {
            return;
        };
        match self.current_field {
            WizardField::LineItems => {
                self.items.remove(index);
            }
            WizardField::Markups => {
                self.markups.remove(index);
            }
            WizardField::Discounts => {
                self.discounts.remove(index);
            }
            _ => return,
        }

        let len = self.list_len(self.current_field);
        if let Some(list_state) = self.list_state_mut(self.current_field) {
            list_state.select(if len == 0 { None } else { Some(index.min(len - 1)) });
        }
    }

    /// Cycle the tax category of a line item or the kind of an adjustment
    fn toggle_row(&mut self) {
        let Some(index) = self.selected_row() else {
            return;
        };
        match self.current_field {
            WizardField::LineItems => {
                let item = &mut self.items[index];
                item.tax_category = item.tax_category.next();
            }
            WizardField::Markups => self.markups[index].kind = self.markups[index].kind.toggle(),
            WizardField::Discounts => self.discounts[index].kind = self.discounts[index].kind.toggle(),
            _ => {}
        }
    }

    /// Store the open editor's value and move on to the row's next field
    fn advance_row_editor(&mut self) {
        let Some(editor) = self.row_editor.take() else {
            return;
        };
        let RowEditor { index, field, value } = editor;

        let next = match (self.current_field, field) {
            (WizardField::LineItems, EntryField::Description) => {
                self.items[index].description = value;
                Some((EntryField::Qty, self.items[index].qty.clone()))
            }
            (WizardField::LineItems, EntryField::Qty) => {
                self.items[index].qty = value;
                Some((EntryField::UnitPrice, self.items[index].unit_price.clone()))
            }
            (WizardField::LineItems, _) => {
                self.items[index].unit_price = value;
                None
            }
            (WizardField::Markups, _) => {
                self.markups[index].value = value;
                None
            }
            (WizardField::Discounts, _) => {
                self.discounts[index].value = value;
                None
            }
            _ => None,
        };

        self.row_editor = next.map(|(field, value)| RowEditor { index, field, value });
    }

    pub fn handle_key(&mut self, key: KeyCode) -> Option<InvoiceWizardAction> {
        if self.show_error.take().is_some() {
            return None;
        }

        if !self.editing {
            match key {
                KeyCode::Esc => return Some(InvoiceWizardAction::Cancel),
                KeyCode::Up | KeyCode::BackTab => self.current_field = self.current_field.offset(false),
                KeyCode::Down | KeyCode::Tab => self.current_field = self.current_field.offset(true),
                KeyCode::Left if self.current_field == WizardField::Currency => {
                    self.currency = self.currency.previous()
                }
                KeyCode::Right if self.current_field == WizardField::Currency => self.currency = self.currency.next(),
                KeyCode::Delete if self.current_field == WizardField::DueDate => self.due_date.clear(),
                KeyCode::Enter => self.start_editing(),
                KeyCode::Char('g') => {
                    if self.is_valid() {
                        return Some(InvoiceWizardAction::Generate(self.to_draft()));
                    }
                    self.show_error = Some("A client name and at least one line item are required.".to_string());
                }
                _ => {}
            }
            return None;
        }

        if self.current_field == WizardField::DueDate {
            match key {
                KeyCode::Enter | KeyCode::Esc => self.stop_editing(false),
                KeyCode::Delete => {
                    self.due_date.clear();
                    self.editing = false;
                }
                other => self.due_date.handle_key(other),
            }
            return None;
        }

        if self.current_field.is_list() {
            if let Some(editor) = &mut self.row_editor {
                match key {
                    KeyCode::Enter | KeyCode::Tab => self.advance_row_editor(),
                    KeyCode::Esc => self.row_editor = None,
                    KeyCode::Backspace => {
                        editor.value.pop();
                    }
                    KeyCode::Char(c) => editor.value.push(c),
                    _ => {}
                }
                return None;
            }

            match key {
                KeyCode::Esc | KeyCode::Enter => self.stop_editing(false),
                KeyCode::Up => self.move_selection(false),
                KeyCode::Down => self.move_selection(true),
                KeyCode::Char('a') => self.add_row(),
                KeyCode::Char('e') => self.edit_row(),
                KeyCode::Char('d') => self.delete_row(),
                KeyCode::Char('t') => self.toggle_row(),
                _ => {}
            }
            return None;
        }

        match key {
            KeyCode::Enter => self.stop_editing(true),
            KeyCode::Esc => self.stop_editing(false),
            KeyCode::Backspace => {
                self.active_input.pop();
            }
            KeyCode::Char(c) => self.active_input.push(c),
            _ => {}
        }
        None
    }
}

pub fn handle_input(state: &mut InvoiceWizardState) -> Result<Option<InvoiceWizardAction>> {
    if let Event::Key(key) = event::read()? {
        return Ok(state.handle_key(key.code));
    }
    Ok(None)
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

pub fn render_invoice_wizard<B: Backend>(frame: &mut Frame<B>, state: &mut InvoiceWizardState) {
    let size = frame.size();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(3)].as_ref())
        .split(size);

    let title = Paragraph::new("New Invoice")
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(title, rows[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(rows[1]);

    render_details(frame, state, columns[0]);
    render_lists(frame, state, columns[1]);

    let help = if state.row_editor.is_some() {
        "Type value | <Enter/Tab> Next field | <Esc> Close editor"
    } else if state.editing && state.current_field.is_list() {
        "<A> Add | <E> Edit | <D> Delete | <T> Tax category / type | <↑/↓> Select | <Esc> Done"
    } else if state.editing {
        "Type value | <Enter> Save | <Esc> Discard"
    } else {
        "<↑/↓> Field | <Enter> Edit | <←/→> Currency | <Del> Clear date | <G> Generate | <Esc> Cancel"
    };
    let help = Paragraph::new(help)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(help, rows[2]);

    if let Some(editor) = &state.row_editor {
        render_row_editor(frame, state, editor, size);
    }

    if let Some(error) = &state.show_error {
        render_error(frame, size, error);
    }
}

fn render_details<B: Backend>(frame: &mut Frame<B>, state: &InvoiceWizardState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)].as_ref())
        .split(area);

    let mut lines = Vec::new();
    for field in WizardField::ORDER {
        let focused = state.current_field == field;
        let value = match field {
            WizardField::Currency => format!("{} ({})", state.currency.code(), state.currency.symbol()),
            WizardField::DueDate | WizardField::LineItems | WizardField::Markups | WizardField::Discounts => continue,
            _ if focused && state.editing => format!("{}|", state.active_input),
            _ => state.text(field).unwrap_or_default().to_string(),
        };

        let marker = if focused { "> " } else { "  " };
        lines.push(Spans::from(vec![
            Span::styled(format!("{marker}{}: ", field.label()), focus_style(focused)),
            Span::raw(value),
        ]));
    }

    let details = Paragraph::new(lines).block(Block::default().title("Client & Details").borders(Borders::ALL));
    frame.render_widget(details, chunks[0]);

    render_date_input(
        frame,
        chunks[1],
        &state.due_date,
        "Due Date",
        state.current_field == WizardField::DueDate,
    );
}

fn list_block(field: WizardField, state: &InvoiceWizardState) -> Block<'static> {
    let focused = state.current_field == field;
    let title = if focused && state.editing {
        format!("{} (editing)", field.label())
    } else {
        field.label().to_string()
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(focus_style(focused))
}

fn render_lists<B: Backend>(frame: &mut Frame<B>, state: &mut InvoiceWizardState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Min(5),
                Constraint::Length(5),
                Constraint::Length(5),
                Constraint::Length(9),
            ]
            .as_ref(),
        )
        .split(area);

    let currency = state.currency;
    let highlight = Style::default().bg(Color::Blue).fg(Color::White);

    let items: Vec<ListItem> = state
        .items
        .iter()
        .map(|input| {
            let line = input.to_line_item();
            let breakdown = LineBreakdown::for_item(&line, &state.rates);
            ListItem::new(format!(
                "{} | {} x {} | {} | {} + tax {}",
                if input.description.is_empty() { "(no description)" } else { &input.description },
                input.qty,
                input.unit_price,
                input.tax_category,
                currency.format_amount(breakdown.line_total),
                currency.format_amount(breakdown.tax),
            ))
        })
        .collect();
    let list = List::new(items)
        .block(list_block(WizardField::LineItems, state))
        .highlight_style(highlight);
    frame.render_stateful_widget(list, chunks[0], &mut state.items_state);

    let markups: Vec<ListItem> = state
        .markups
        .iter()
        .map(|m| ListItem::new(format!("+ {}", m.describe(currency))))
        .collect();
    let list = List::new(markups)
        .block(list_block(WizardField::Markups, state))
        .highlight_style(highlight);
    frame.render_stateful_widget(list, chunks[1], &mut state.markups_state);

    let discounts: Vec<ListItem> = state
        .discounts
        .iter()
        .map(|d| ListItem::new(format!("- {}", d.describe(currency))))
        .collect();
    let list = List::new(discounts)
        .block(list_block(WizardField::Discounts, state))
        .highlight_style(highlight);
    frame.render_stateful_widget(list, chunks[2], &mut state.discounts_state);

    render_preview(frame, &state.preview(), currency, chunks[3]);
}

pub(crate) fn totals_lines(totals: &TotalsResult, currency: Currency) -> Vec<Spans<'static>> {
    let row = |label: &str, amount: f64| {
        Spans::from(vec![
            Span::styled(format!("{label:<18}"), Style::default().fg(Color::Yellow)),
            Span::raw(currency.format_amount(amount)),
        ])
    };

    vec![
        row("Subtotal", totals.subtotal),
        row("Markups", totals.markup_total),
        row("Discounts", -totals.discount_total),
        row("Adjusted subtotal", totals.adjusted_subtotal()),
        row("Tax", totals.total_tax),
        Spans::from(vec![
            Span::styled(format!("{:<18}", "Total"), Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                currency.format_amount(totals.final_total),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
    ]
}

fn render_preview<B: Backend>(frame: &mut Frame<B>, totals: &TotalsResult, currency: Currency, area: Rect) {
    let preview = Paragraph::new(totals_lines(totals, currency))
        .block(Block::default().title("Preview").borders(Borders::ALL));
    frame.render_widget(preview, area);
}

fn render_row_editor<B: Backend>(frame: &mut Frame<B>, state: &InvoiceWizardState, editor: &RowEditor, size: Rect) {
    let fields: &[EntryField] = if state.current_field == WizardField::LineItems {
        &[EntryField::Description, EntryField::Qty, EntryField::UnitPrice]
    } else {
        &[EntryField::Value]
    };

    let popup = centered_rect(60, 40, size);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(format!("{} #{}", state.current_field.label(), editor.index + 1))
        .borders(Borders::ALL);
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(fields.iter().map(|_| Constraint::Length(3)).collect::<Vec<_>>())
        .split(inner);

    for (field, area) in fields.iter().zip(chunks.iter()) {
        let active = *field == editor.field;
        let value = if active {
            format!("{}|", editor.value)
        } else {
            stored_value(state, editor.index, *field)
        };
        let style = if active {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let paragraph = Paragraph::new(Spans::from(vec![
            Span::raw(format!("{}: ", field.label())),
            Span::styled(value, style),
        ]))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(paragraph, *area);
    }
}

fn stored_value(state: &InvoiceWizardState, index: usize, field: EntryField) -> String {
    match (state.current_field, field) {
        (WizardField::LineItems, EntryField::Description) => state.items.get(index).map(|i| i.description.clone()),
        (WizardField::LineItems, EntryField::Qty) => state.items.get(index).map(|i| i.qty.clone()),
        (WizardField::LineItems, EntryField::UnitPrice) => state.items.get(index).map(|i| i.unit_price.clone()),
        (WizardField::Markups, _) => state.markups.get(index).map(|m| m.value.clone()),
        (WizardField::Discounts, _) => state.discounts.get(index).map(|d| d.value.clone()),
        _ => None,
    }
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(state: &mut InvoiceWizardState, text: &str) {
        for c in text.chars() {
            state.handle_key(KeyCode::Char(c));
        }
    }

    fn focus(state: &mut InvoiceWizardState, field: WizardField) {
        while state.current_field() != field {
            state.handle_key(KeyCode::Down);
        }
    }

    #[test]
    fn typing_into_a_field_commits_on_enter() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        state.handle_key(KeyCode::Enter);
        typed(&mut state, "Acme Corp");
        state.handle_key(KeyCode::Enter);

        focus(&mut state, WizardField::ClientEmail);
        state.handle_key(KeyCode::Enter);
        typed(&mut state, "nobody");
        state.handle_key(KeyCode::Esc);

        let client = state.to_draft().client.unwrap();
        assert_eq!(client.name, "Acme Corp");
        assert_eq!(client.email, None);
    }

    #[test]
    fn line_item_editor_walks_through_fields() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        focus(&mut state, WizardField::LineItems);
        state.handle_key(KeyCode::Enter);
        state.handle_key(KeyCode::Char('a'));
        typed(&mut state, "Design");
        state.handle_key(KeyCode::Enter);
        typed(&mut state, "40");
        state.handle_key(KeyCode::Tab);
        typed(&mut state, "1250");
        state.handle_key(KeyCode::Enter);
        state.handle_key(KeyCode::Char('t'));

        let draft = state.to_draft();
        assert_eq!(draft.items, vec![LineItem::new("Design", 40.0, 1250.0, TaxCategory::Reduced)]);
    }

    #[test]
    fn preview_tracks_the_form() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        state.push_item("Design", "40", "1250", TaxCategory::Standard);
        assert_eq!(state.preview().final_total, 60500.0);

        state.push_markup(AdjustmentKind::Percentage, "5");
        assert_eq!(state.preview().final_total, 63000.0);

        state.push_discount(AdjustmentKind::Amount, "2000");
        assert_eq!(state.preview().final_total, 61000.0);
    }

    #[test]
    fn unparsable_numbers_contribute_nothing() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        state.push_item("Design", "40", "", TaxCategory::Standard);
        state.push_item("Support", "abc", "100", TaxCategory::Standard);

        assert_eq!(state.preview(), TotalsResult::default());
    }

    #[test]
    fn recipients_are_split_on_commas() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        state.set_text(WizardField::Recipients, "a@acme.example, ,b@acme.example");
        assert_eq!(
            state.to_draft().email_recipients,
            Some(vec!["a@acme.example".to_string(), "b@acme.example".to_string()])
        );

        state.set_text(WizardField::Recipients, " ");
        assert_eq!(state.to_draft().email_recipients, None);
    }

    #[test]
    fn generate_requires_client_and_items() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        assert!(state.handle_key(KeyCode::Char('g')).is_none());
        assert!(state.show_error.is_some());

        state.handle_key(KeyCode::Esc);
        state.set_text(WizardField::ClientName, "Acme Corp");
        state.push_item("Design", "1", "10", TaxCategory::Zero);

        match state.handle_key(KeyCode::Char('g')) {
            Some(InvoiceWizardAction::Generate(draft)) => {
                assert_eq!(draft.client.unwrap().name, "Acme Corp");
                assert_eq!(draft.due_date, None);
            }
            _ => panic!("expected a draft"),
        }
    }

    #[test]
    fn deleting_rows_keeps_selection_in_range() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        state.push_discount(AdjustmentKind::Amount, "10");
        state.push_discount(AdjustmentKind::Amount, "20");
        focus(&mut state, WizardField::Discounts);
        state.handle_key(KeyCode::Enter);
        state.handle_key(KeyCode::Char('d'));
        state.handle_key(KeyCode::Char('d'));
        state.handle_key(KeyCode::Char('d'));

        assert!(state.to_draft().discounts.is_empty());
    }

    #[test]
    fn due_date_is_set_through_the_date_input() {
        let mut state = InvoiceWizardState::new(TaxRateTable::default());
        focus(&mut state, WizardField::DueDate);
        state.handle_key(KeyCode::Enter);
        typed(&mut state, "20261115");
        state.handle_key(KeyCode::Enter);

        assert_eq!(state.to_draft().due_date.as_deref(), Some("2026-11-15"));

        state.handle_key(KeyCode::Delete);
        assert_eq!(state.to_draft().due_date, None);
    }
}
