use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between segments of a logger path
pub const LOGGER_PATH_SEPARATOR: char = '.';

/// Severity of a log message, normalized across protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// Map an RFC 5424 / RFC 3164 severity code (0-7)
    pub fn from_syslog(code: u8) -> Self {
        match code {
            0..=2 => Severity::Fatal,
            3 => Severity::Error,
            4 => Severity::Warn,
            5 | 6 => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Trace => write!(f, "TRACE"),
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Protocol-level fields produced by a parser, before a sequence number exists.
///
/// A receiver turns this into a [`LogMessage`] once it has assigned the next
/// sequence number, so a payload that fails to parse never consumes one.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub raw_text: String,
    pub severity: Severity,
    pub timestamp_source: Option<NaiveDateTime>,
    pub sender: Option<String>,
    pub logger_path: Option<String>,
    pub facility: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl ParsedMessage {
    /// Opaque message carrying only its text
    pub fn opaque(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            severity: Severity::Info,
            timestamp_source: None,
            sender: None,
            logger_path: None,
            facility: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_logger_path(mut self, path: impl Into<String>) -> Self {
        self.logger_path = Some(path.into());
        self
    }

    pub fn with_facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = Some(facility.into());
        self
    }

    pub fn with_source_time(mut self, time: NaiveDateTime) -> Self {
        self.timestamp_source = Some(time);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Stamp the receipt time and sequence number, producing the final record.
    ///
    /// Called by a receiver's ingestion loop, which owns the sequence counter.
    #[doc(hidden)]
    pub fn into_message(self, sequence: u64) -> LogMessage {
        LogMessage {
            sequence,
            raw_text: self.raw_text,
            severity: self.severity,
            timestamp_local: Utc::now(),
            timestamp_source: self.timestamp_source,
            sender: self.sender,
            logger_path: self.logger_path,
            facility: self.facility,
            fields: self.fields,
        }
    }
}

/// One normalized log entry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogMessage {
    sequence: u64,
    raw_text: String,
    severity: Severity,
    timestamp_local: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp_source: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logger_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    facility: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, String>,
}

impl LogMessage {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp_local(&self) -> DateTime<Utc> {
        self.timestamp_local
    }

    pub fn timestamp_source(&self) -> Option<NaiveDateTime> {
        self.timestamp_source
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn logger_path(&self) -> Option<&str> {
        self.logger_path.as_deref()
    }

    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syslog_severity_mapping() {
        assert_eq!(Severity::from_syslog(0), Severity::Fatal);
        assert_eq!(Severity::from_syslog(2), Severity::Fatal);
        assert_eq!(Severity::from_syslog(3), Severity::Error);
        assert_eq!(Severity::from_syslog(4), Severity::Warn);
        assert_eq!(Severity::from_syslog(5), Severity::Info);
        assert_eq!(Severity::from_syslog(6), Severity::Info);
        assert_eq!(Severity::from_syslog(7), Severity::Debug);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Debug < Severity::Info);
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_into_message_keeps_fields() {
        let message = ParsedMessage::opaque("disk full")
            .with_severity(Severity::Error)
            .with_sender("10.0.0.1:514")
            .with_logger_path("host.kernel")
            .with_facility("kern")
            .with_field("pid", "42")
            .into_message(7);

        assert_eq!(message.sequence(), 7);
        assert_eq!(message.raw_text(), "disk full");
        assert_eq!(message.severity(), Severity::Error);
        assert_eq!(message.sender(), Some("10.0.0.1:514"));
        assert_eq!(message.logger_path(), Some("host.kernel"));
        assert_eq!(message.facility(), Some("kern"));
        assert_eq!(message.field("pid"), Some("42"));
        assert!(message.timestamp_source().is_none());
    }

    #[test]
    fn test_serialize_skips_absent_fields() {
        let message = ParsedMessage::opaque("hello").into_message(1);
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"raw_text\":\"hello\""));
        assert!(json.contains("\"severity\":\"INFO\""));
        assert!(!json.contains("logger_path"));
    }
}
