mod currency;
mod draft;
mod invoice;
mod log_entry;
mod numeric;

pub use currency::Currency;
pub use draft::{Adjustment, AdjustmentKind, ClientInfo, DraftMetadata, InvoiceDraft, LineItem, TaxCategory};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice};
pub use log_entry::{LogEntry, LogOperation, LogStatus, NewLogEntry};
pub use numeric::NumericField;
