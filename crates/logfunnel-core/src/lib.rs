//! logfunnel core
//!
//! Message model, receiver and sink traits, configuration and the filter
//! registry shared by every logfunnel crate.

pub mod config;
pub mod error;
pub mod filter;
pub mod message;
pub mod traits;

// Re-export commonly used types
pub use config::Config;
pub use error::{IngestionError, LogFunnelError, OutputError, ParseError, Result, SinkError};
pub use filter::{
    CombinePolicy, EffectiveFilter, FilterPredicate, FilterRegistry, FilterSource,
    SelectionFilter,
};
pub use message::{LogMessage, ParsedMessage, Severity, LOGGER_PATH_SEPARATOR};
pub use traits::{
    Column, MessageParser, MessageSink, Receiver, ReceiverState, SYSLOG_COLUMNS,
};
