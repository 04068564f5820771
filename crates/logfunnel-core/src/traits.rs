use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{IngestionError, ParseError, SinkError};
use crate::message::{LogMessage, ParsedMessage, Severity};

/// Consumer of newly parsed messages.
///
/// A single receiver never calls `handle_message` concurrently with itself,
/// but different receivers may. Implementations must return promptly: a slow
/// sink stalls the receiver that called it.
pub trait MessageSink: Send + Sync {
    fn handle_message(&self, message: LogMessage) -> Result<(), SinkError>;
}

impl MessageSink for mpsc::Sender<LogMessage> {
    fn handle_message(&self, message: LogMessage) -> Result<(), SinkError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl MessageSink for mpsc::UnboundedSender<LogMessage> {
    fn handle_message(&self, message: LogMessage) -> Result<(), SinkError> {
        self.send(message).map_err(|_| SinkError::Closed)
    }
}

/// Strategy turning one decoded payload into message fields.
///
/// `sender` is the transport-level peer address text.
pub trait MessageParser: Send + Sync {
    /// Returns the name of the parser (for logging)
    fn name(&self) -> &'static str;

    fn parse(&self, payload: &[u8], sender: &str) -> Result<ParsedMessage, ParseError>;
}

/// Lifecycle state of a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Inactive,
    Active,
}

/// Display / export column a receiver declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Number,
    Severity,
    LocalTime,
    SourceTime,
    Facility,
    Sender,
    Message,
}

impl Column {
    pub fn header(&self) -> &'static str {
        match self {
            Column::Number => "Number",
            Column::Severity => "Severity",
            Column::LocalTime => "Local Time",
            Column::SourceTime => "Source Time",
            Column::Facility => "Facility",
            Column::Sender => "Sender",
            Column::Message => "Message",
        }
    }
}

/// Column set shared by the syslog receivers
pub const SYSLOG_COLUMNS: &[Column] = &[
    Column::Number,
    Column::Severity,
    Column::LocalTime,
    Column::SourceTime,
    Column::Facility,
    Column::Sender,
    Column::Message,
];

/// A transport/protocol-specific source of log messages with a start/stop lifecycle.
///
/// `start` performs the synchronous setup (bind, join) and reports its failure;
/// everything after that is reported through `tracing`. `stop` is idempotent and
/// resolves once the ingestion loop has exited, so the sink sees no message
/// after it returns.
#[async_trait]
pub trait Receiver: Send {
    /// Short human name, e.g. "UDP Syslog Receiver"
    fn name(&self) -> &str;

    /// Description embedding the live configuration
    fn description(&self) -> String;

    /// Base file name used when exporting this receiver's messages
    fn export_file_name(&self) -> String;

    fn supported_severities(&self) -> &'static [Severity];

    fn columns(&self) -> &'static [Column];

    fn state(&self) -> ReceiverState;

    fn is_active(&self) -> bool {
        self.state() == ReceiverState::Active
    }

    async fn start(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), IngestionError>;

    async fn stop(&mut self);

    /// Reset the sequence counter; the next message gets sequence 1
    fn clear(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_sender_reports_full() {
        let (sender, mut receiver) = mpsc::channel(1);
        let sink: &dyn MessageSink = &sender;

        sink.handle_message(ParsedMessage::opaque("a").into_message(1))
            .unwrap();
        let err = sink
            .handle_message(ParsedMessage::opaque("b").into_message(2))
            .unwrap_err();
        assert_eq!(err, SinkError::Full);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.raw_text(), "a");
    }

    #[test]
    fn test_closed_sender_reports_closed() {
        let (sender, receiver) = mpsc::unbounded_channel::<LogMessage>();
        drop(receiver);
        let err = sender
            .handle_message(ParsedMessage::opaque("a").into_message(1))
            .unwrap_err();
        assert_eq!(err, SinkError::Closed);
    }

    #[test]
    fn test_syslog_column_headers() {
        let headers: Vec<&str> = SYSLOG_COLUMNS.iter().map(|c| c.header()).collect();
        assert_eq!(
            headers,
            vec![
                "Number",
                "Severity",
                "Local Time",
                "Source Time",
                "Facility",
                "Sender",
                "Message"
            ]
        );
    }
}
