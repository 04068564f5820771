use thiserror::Error;

/// Top-level error type for logfunnel
#[derive(Debug, Error)]
pub enum LogFunnelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while setting up or running a receiver
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to join multicast group {group}: {message}")]
    MulticastJoin { group: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A payload that could not be turned into a message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("payload is empty")]
    Empty,

    #[error("syslog priority {0} is out of range (0-191)")]
    InvalidPriority(u32),
}

/// Failure reported by a message sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink is full, message dropped")]
    Full,

    #[error("sink is closed")]
    Closed,

    #[error("sink rejected message: {0}")]
    Rejected(String),
}

/// Errors specific to output writers
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Stdout write error: {0}")]
    Stdout(String),

    #[error("Export write error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for logfunnel operations
pub type Result<T> = std::result::Result<T, LogFunnelError>;
