use logfunnel_core::{LogMessage, OutputError};
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::debug;

/// Output format for stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Pretty-printed, human-readable format
    #[default]
    Pretty,
    /// Compact JSON (one line per message)
    Json,
    /// Raw payload text only
    Raw,
}

impl OutputFormat {
    pub fn parse(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "raw" => OutputFormat::Raw,
            _ => OutputFormat::Pretty,
        }
    }
}

/// Writes visible messages to stdout
pub struct StdoutWriter {
    format: OutputFormat,
    stdout: Stdout,
}

impl StdoutWriter {
    /// Create a new stdout writer with default format
    pub fn new() -> Self {
        Self::with_format(OutputFormat::default())
    }

    /// Create a new stdout writer with a specific format
    pub fn with_format(format: OutputFormat) -> Self {
        Self {
            format,
            stdout: tokio::io::stdout(),
        }
    }

    /// Write a single message to stdout
    pub async fn write(&mut self, message: &LogMessage) -> Result<(), OutputError> {
        let mut output = self.format_message(message)?;
        output.push('\n');

        self.stdout
            .write_all(output.as_bytes())
            .await
            .map_err(|e| OutputError::Stdout(e.to_string()))?;

        self.stdout
            .flush()
            .await
            .map_err(|e| OutputError::Stdout(e.to_string()))?;

        debug!(format = ?self.format, sequence = message.sequence(), "Wrote message to stdout");
        Ok(())
    }

    /// Format a message according to the output format
    fn format_message(&self, message: &LogMessage) -> Result<String, OutputError> {
        match self.format {
            OutputFormat::Pretty => Ok(format_pretty(message)),
            OutputFormat::Json => serde_json::to_string(message)
                .map_err(|e| OutputError::Serialization(e.to_string())),
            OutputFormat::Raw => Ok(message.raw_text().to_string()),
        }
    }
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message in a human-readable way
fn format_pretty(message: &LogMessage) -> String {
    let mut parts = Vec::new();

    parts.push(format!("#{}", message.sequence()));
    parts.push(format!(
        "[{}]",
        message.timestamp_local().format("%Y-%m-%d %H:%M:%S%.3f")
    ));
    parts.push(format!("[{}]", message.severity()));

    if let Some(path) = message.logger_path() {
        parts.push(format!("[{}]", path));
    }
    if let Some(sender) = message.sender() {
        parts.push(format!("[{}]", sender));
    }

    parts.push(message.raw_text().to_string());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfunnel_core::{ParsedMessage, Severity};

    #[test]
    fn test_format_pretty() {
        let message = ParsedMessage::opaque("Test message")
            .with_severity(Severity::Error)
            .with_logger_path("host.app")
            .with_sender("127.0.0.1:5000")
            .into_message(12);

        let output = format_pretty(&message);
        assert!(output.starts_with("#12 "));
        assert!(output.contains("[ERROR]"));
        assert!(output.contains("[host.app]"));
        assert!(output.contains("[127.0.0.1:5000]"));
        assert!(output.ends_with("Test message"));
    }

    #[test]
    fn test_format_json() {
        let writer = StdoutWriter::with_format(OutputFormat::Json);
        let message = ParsedMessage::opaque("Test message").into_message(1);

        let output = writer.format_message(&message).unwrap();
        assert!(output.contains("\"raw_text\":\"Test message\""));
        assert!(output.contains("\"sequence\":1"));
    }

    #[test]
    fn test_format_raw() {
        let writer = StdoutWriter::with_format(OutputFormat::Raw);
        let message = ParsedMessage::opaque("<13>raw line").into_message(1);
        assert_eq!(writer.format_message(&message).unwrap(), "<13>raw line");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("raw"), OutputFormat::Raw);
        assert_eq!(OutputFormat::parse("whatever"), OutputFormat::Pretty);
    }
}
