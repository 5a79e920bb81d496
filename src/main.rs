use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tracing::{error, info};
use tui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};

use invoice_billing::config::{self, Config};
use invoice_billing::logging;
use invoice_billing::models::{InvoiceDraft, InvoiceStatus};
use invoice_billing::security::hmac::sign_payload;
use invoice_billing::security::{ApiKeyValidator, Role};
use invoice_billing::server::start_server;
use invoice_billing::service::Services;
use invoice_billing::totals::compute_totals;
use invoice_billing::ui::{
    dashboard::{handle_input as handle_dashboard_input, render_dashboard, DashboardAction, DashboardState},
    invoice_viewer::{handle_input as handle_viewer_input, render_invoice_viewer, InvoiceViewerState, ViewerAction},
    invoice_wizard::{
        handle_input as handle_invoice_wizard_input, render_invoice_wizard, InvoiceWizardAction, InvoiceWizardState,
    },
    invoices::{handle_input as handle_invoices_input, render_invoices, InvoiceAction, InvoicesState},
    logs::{handle_input as handle_logs_input, render_logs, LogsAction, LogsState},
};

#[derive(Parser)]
#[command(name = "invoice_billing", version, about = "Invoice generation and billing")]
struct Cli {
    /// Keep invoices and logs in memory and mail in an outbox
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal UI (default)
    Tui,
    /// Serve the billing functions over HTTP
    Serve,
    /// Print the totals of a draft invoice as JSON
    Totals {
        /// Path to a draft invoice JSON file
        draft: PathBuf,
    },
    /// Print request signatures for a payload using HMAC_SECRET
    Sign {
        /// Path to the exact request body to sign
        payload: PathBuf,
    },
    /// Write the stored document of an invoice to OUTPUT_DIR
    Export {
        invoice_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => {
            logging::init_file(&config.log_file)?;
            run_tui(&config, cli.in_memory).await
        }
        Command::Serve => {
            logging::init_stdout();
            let services = Services::connect(&config, cli.in_memory).await?;
            start_server(&config, services).await
        }
        Command::Totals { draft } => print_totals(&config, &draft),
        Command::Sign { payload } => print_signatures(&config, &payload),
        Command::Export { invoice_id } => {
            logging::init_stdout();
            let services = Services::connect(&config, cli.in_memory).await?;
            let path = services.export_document(&invoice_id, &config.output_dir).await?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn print_totals(config: &Config, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let draft: InvoiceDraft =
        serde_json::from_str(&text).with_context(|| format!("{} is not a draft invoice", path.display()))?;

    let totals = compute_totals(&draft, &config.tax_rates());
    println!("{}", serde_json::to_string_pretty(&totals)?);
    Ok(())
}

fn print_signatures(config: &Config, path: &Path) -> Result<()> {
    let secret = config
        .hmac_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .context("HMAC_SECRET must be set to sign payloads")?;
    let payload = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let timestamp = Utc::now().timestamp();
    let validator = ApiKeyValidator::new(secret, Duration::from_secs(config.signature_tolerance_secs));

    println!("X-Invoice-Signature: {}", sign_payload(&payload, secret));
    println!("X-Timestamp: {timestamp}");
    println!("X-Signature: {}", validator.signature(&payload, timestamp));
    Ok(())
}

enum AppScreen {
    Invoices,
    Dashboard,
    InvoiceWizard,
    InvoiceViewer,
    Logs,
}

struct AppState {
    services: Services,
    role: Role,
    /// Where downloaded documents are written
    output_dir: PathBuf,
    screen: AppScreen,
    invoices_state: InvoicesState,
    dashboard_state: Option<DashboardState>,
    invoice_wizard_state: Option<InvoiceWizardState>,
    viewer_state: Option<InvoiceViewerState>,
    logs_state: Option<LogsState>,
    /// Screen to go back to from the logs
    logs_return: Option<AppScreen>,
}

impl AppState {
    fn new(services: Services, role: Role, output_dir: PathBuf) -> Self {
        Self {
            services,
            role,
            output_dir,
            screen: AppScreen::Invoices,
            invoices_state: InvoicesState::new(role),
            dashboard_state: None,
            invoice_wizard_state: None,
            viewer_state: None,
            logs_state: None,
            logs_return: None,
        }
    }
}

async fn run_tui(config: &Config, in_memory: bool) -> Result<()> {
    let role = config.operator_role()?;
    let services = Services::connect(config, in_memory).await?;
    info!(%role, "starting terminal UI");

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app_state = AppState::new(services, role, config.output_dir.clone());
    reload_invoices(&mut app_state).await;

    let result = run_app(&mut terminal, &mut app_state).await;

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(err) = &result {
        error!(error = %err, "terminal UI stopped");
    }
    result
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app_state: &mut AppState) -> Result<()> {
    loop {
        terminal.draw(|f| match app_state.screen {
            AppScreen::Invoices => render_invoices(f, &mut app_state.invoices_state),
            AppScreen::Dashboard => {
                if let Some(state) = &mut app_state.dashboard_state {
                    render_dashboard(f, state);
                }
            }
            AppScreen::InvoiceWizard => {
                if let Some(state) = &mut app_state.invoice_wizard_state {
                    render_invoice_wizard(f, state);
                }
            }
            AppScreen::InvoiceViewer => {
                if let Some(state) = &app_state.viewer_state {
                    render_invoice_viewer(f, state);
                }
            }
            AppScreen::Logs => {
                if let Some(state) = &mut app_state.logs_state {
                    render_logs(f, state);
                }
            }
        })?;

        let should_quit = match app_state.screen {
            AppScreen::Invoices => handle_invoices_screen(app_state).await?,
            AppScreen::Dashboard => handle_dashboard_screen(app_state).await?,
            AppScreen::InvoiceWizard => handle_invoice_wizard_screen(app_state).await?,
            AppScreen::InvoiceViewer => handle_viewer_screen(app_state).await?,
            AppScreen::Logs => handle_logs_screen(app_state).await?,
        };

        if should_quit {
            break;
        }
    }

    Ok(())
}

async fn reload_invoices(app_state: &mut AppState) {
    let query = app_state.invoices_state.query();
    match app_state.services.list_invoices(&query).await {
        Ok(page) => app_state.invoices_state.set_page(page),
        Err(e) => app_state.invoices_state.error = Some(e.to_string()),
    }
}

async fn reload_logs(app_state: &mut AppState) {
    let Some(state) = &mut app_state.logs_state else {
        return;
    };
    match app_state.services.get_logs(&state.request()).await {
        Ok(page) => state.set_page(page),
        Err(e) => state.error = Some(e.to_string()),
    }
}

async fn reload_dashboard(app_state: &mut AppState) {
    let Some(state) = &mut app_state.dashboard_state else {
        return;
    };
    match app_state.services.dashboard_stats().await {
        Ok(stats) => state.set_stats(stats),
        Err(e) => state.error = Some(e.to_string()),
    }
}

async fn open_invoice(app_state: &mut AppState, id: &str) -> Result<(), String> {
    let invoice = app_state.services.get_invoice(id).await.map_err(|e| e.to_string())?;
    app_state.viewer_state = Some(InvoiceViewerState::new(
        invoice,
        app_state.services.rates,
        app_state.role,
    ));
    app_state.screen = AppScreen::InvoiceViewer;
    Ok(())
}

async fn open_logs(app_state: &mut AppState, invoice_id: Option<String>, from: AppScreen) {
    app_state.logs_state = Some(LogsState::new(invoice_id));
    app_state.logs_return = Some(from);
    app_state.screen = AppScreen::Logs;
    reload_logs(app_state).await;
}

async fn change_status(services: &Services, id: &str, status: InvoiceStatus) -> Result<String, String> {
    services
        .update_status(id, status)
        .await
        .map(|invoice| format!("Invoice {} is now {}", invoice.invoice_number, invoice.status))
        .map_err(|e| e.to_string())
}

async fn resend(services: &Services, id: &str) -> Result<String, String> {
    services
        .resend_invoice(id, None)
        .await
        .map(|outcome| format!("Invoice resent to {}", outcome.recipients.join(", ")))
        .map_err(|e| e.to_string())
}

async fn handle_invoices_screen(app_state: &mut AppState) -> Result<bool> {
    match handle_invoices_input(&mut app_state.invoices_state)? {
        Some(InvoiceAction::Quit) => return Ok(true),
        Some(InvoiceAction::Reload) => reload_invoices(app_state).await,
        Some(InvoiceAction::NewInvoice) => {
            app_state.invoice_wizard_state = Some(InvoiceWizardState::new(app_state.services.rates));
            app_state.screen = AppScreen::InvoiceWizard;
        }
        Some(InvoiceAction::View(id)) => {
            if let Err(e) = open_invoice(app_state, &id).await {
                app_state.invoices_state.error = Some(e);
            }
        }
        Some(InvoiceAction::Resend(id)) => match resend(&app_state.services, &id).await {
            Ok(message) => app_state.invoices_state.message = Some(message),
            Err(e) => app_state.invoices_state.error = Some(e),
        },
        Some(InvoiceAction::ChangeStatus(id, status)) => {
            match change_status(&app_state.services, &id, status).await {
                Ok(message) => app_state.invoices_state.message = Some(message),
                Err(e) => app_state.invoices_state.error = Some(e),
            }
            reload_invoices(app_state).await;
        }
        Some(InvoiceAction::Logs) => open_logs(app_state, None, AppScreen::Invoices).await,
        Some(InvoiceAction::Dashboard) => {
            app_state.dashboard_state = Some(DashboardState::new(app_state.role));
            app_state.screen = AppScreen::Dashboard;
            reload_dashboard(app_state).await;
        }
        None => {}
    }
    Ok(false)
}

async fn handle_dashboard_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(state) = &mut app_state.dashboard_state else {
        app_state.screen = AppScreen::Invoices;
        return Ok(false);
    };

    match handle_dashboard_input(state)? {
        Some(DashboardAction::Back) => {
            app_state.dashboard_state = None;
            app_state.screen = AppScreen::Invoices;
        }
        Some(DashboardAction::Reload) => reload_dashboard(app_state).await,
        Some(DashboardAction::View(id)) => {
            if let Err(e) = open_invoice(app_state, &id).await {
                if let Some(state) = &mut app_state.dashboard_state {
                    state.error = Some(e);
                }
            }
        }
        None => {}
    }
    Ok(false)
}

async fn handle_invoice_wizard_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(state) = &mut app_state.invoice_wizard_state else {
        app_state.screen = AppScreen::Invoices;
        return Ok(false);
    };

    match handle_invoice_wizard_input(state)? {
        Some(InvoiceWizardAction::Cancel) => {
            app_state.invoice_wizard_state = None;
            app_state.screen = AppScreen::Invoices;
        }
        Some(InvoiceWizardAction::Generate(draft)) => match app_state.services.generate_invoice(draft).await {
            Ok(generated) => {
                let mut message = format!(
                    "Invoice {} generated, total {:.2}",
                    generated.invoice_number, generated.totals.final_total
                );
                if generated.emailed {
                    message.push_str(" and emailed");
                }
                app_state.invoices_state.message = Some(message);
                app_state.invoice_wizard_state = None;
                app_state.screen = AppScreen::Invoices;
                reload_invoices(app_state).await;
            }
            Err(e) => {
                if let Some(state) = &mut app_state.invoice_wizard_state {
                    state.show_error = Some(e.to_string());
                }
            }
        },
        None => {}
    }
    Ok(false)
}

async fn handle_viewer_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(state) = &mut app_state.viewer_state else {
        app_state.screen = AppScreen::Invoices;
        return Ok(false);
    };

    match handle_viewer_input(state)? {
        Some(ViewerAction::Back) => {
            app_state.viewer_state = None;
            app_state.screen = AppScreen::Invoices;
            reload_invoices(app_state).await;
        }
        Some(ViewerAction::Resend(id)) => {
            let result = resend(&app_state.services, &id).await;
            if let Some(state) = &mut app_state.viewer_state {
                match result {
                    Ok(message) => state.message = Some(message),
                    Err(e) => state.error = Some(e),
                }
            }
        }
        Some(ViewerAction::ChangeStatus(id, status)) => {
            let result = app_state.services.update_status(&id, status).await;
            if let Some(state) = &mut app_state.viewer_state {
                match result {
                    Ok(invoice) => state.set_invoice(invoice),
                    Err(e) => state.error = Some(e.to_string()),
                }
            }
        }
        Some(ViewerAction::Logs(id)) => open_logs(app_state, Some(id), AppScreen::InvoiceViewer).await,
        Some(ViewerAction::Download(id)) => {
            let result = app_state.services.export_document(&id, &app_state.output_dir).await;
            if let Some(state) = &mut app_state.viewer_state {
                match result {
                    Ok(path) => state.message = Some(format!("Saved to {}", path.display())),
                    Err(e) => state.error = Some(e.to_string()),
                }
            }
        }
        None => {}
    }
    Ok(false)
}

async fn handle_logs_screen(app_state: &mut AppState) -> Result<bool> {
    let Some(state) = &mut app_state.logs_state else {
        app_state.screen = AppScreen::Invoices;
        return Ok(false);
    };

    match handle_logs_input(state)? {
        Some(LogsAction::Back) => {
            app_state.logs_state = None;
            app_state.screen = app_state.logs_return.take().unwrap_or(AppScreen::Invoices);
        }
        Some(LogsAction::Reload) => reload_logs(app_state).await,
        None => {}
    }
    Ok(false)
}
