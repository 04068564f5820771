use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use logfunnel_core::{Column, LogMessage, OutputError};
use tracing::info;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Writes a header line and one comma-separated row per message, in the
/// column order a receiver declares.
pub struct ExportWriter {
    columns: &'static [Column],
}

impl ExportWriter {
    pub fn new(columns: &'static [Column]) -> Self {
        Self { columns }
    }

    pub fn header(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.header())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn row(&self, message: &LogMessage) -> String {
        self.columns
            .iter()
            .map(|c| quote(&cell(*c, message)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Write the header and all rows to `out`
    pub fn write_to<W: Write>(&self, out: &mut W, messages: &[LogMessage]) -> Result<(), OutputError> {
        let export_err = |e: std::io::Error| OutputError::Export(e.to_string());
        writeln!(out, "{}", self.header()).map_err(export_err)?;
        for message in messages {
            writeln!(out, "{}", self.row(message)).map_err(export_err)?;
        }
        out.flush().map_err(export_err)
    }

    /// Write `<dir>/<file_name>.csv` and return its path
    pub fn export_to_dir(
        &self,
        dir: &Path,
        file_name: &str,
        messages: &[LogMessage],
    ) -> Result<PathBuf, OutputError> {
        std::fs::create_dir_all(dir).map_err(|e| OutputError::Export(e.to_string()))?;
        let path = dir.join(format!("{}.csv", file_name));
        let file = File::create(&path).map_err(|e| {
            OutputError::Export(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, messages)?;
        info!(path = %path.display(), rows = messages.len(), "Exported messages");
        Ok(path)
    }
}

fn cell(column: Column, message: &LogMessage) -> String {
    match column {
        Column::Number => message.sequence().to_string(),
        Column::Severity => message.severity().to_string(),
        Column::LocalTime => message.timestamp_local().format(TIME_FORMAT).to_string(),
        Column::SourceTime => message
            .timestamp_source()
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_default(),
        Column::Facility => message.facility().unwrap_or_default().to_string(),
        Column::Sender => message.sender().unwrap_or_default().to_string(),
        Column::Message => message.raw_text().to_string(),
    }
}

fn quote(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
