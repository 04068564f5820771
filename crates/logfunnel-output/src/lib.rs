//! logfunnel output
//!
//! Writers for visible messages: stdout (pretty, json, raw) and the
//! column-ordered export file.

pub mod export;
pub mod stdout;

pub use export::ExportWriter;
pub use stdout::{OutputFormat, StdoutWriter};
