pub mod date_input;

pub use date_input::{render_date_input, DateInput};
