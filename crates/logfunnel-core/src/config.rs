use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::LogFunnelError;
use crate::filter::CombinePolicy;

/// Main configuration for logfunnel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Receivers to create at startup
    pub receivers: Vec<ReceiverConfig>,

    /// Filter combination settings
    pub filter: FilterConfig,

    /// Output targets
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, LogFunnelError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogFunnelError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, LogFunnelError> {
        toml::from_str(content)
            .map_err(|e| LogFunnelError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, LogFunnelError> {
        toml::to_string_pretty(self)
            .map_err(|e| LogFunnelError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Configuration printed by `--print-config`: one UDP receiver on the syslog port
    pub fn example() -> Self {
        Self {
            receivers: vec![ReceiverConfig::Udp(UdpConfig::default())],
            ..Default::default()
        }
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name for identification
    pub instance_name: String,

    /// Internal log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Maximum number of messages kept in memory
    pub store_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: "logfunnel".to_string(),
            log_level: "warn".to_string(),
            store_capacity: 10_000,
        }
    }
}

/// One receiver, tagged by transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReceiverConfig {
    Udp(UdpConfig),
    Tcp(TcpConfig),
}

/// UDP syslog receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpConfig {
    pub bind_address: String,
    pub port: u16,
    /// IPv4 multicast group to join; failure to join is not fatal
    pub multicast_group: Option<String>,
    pub max_packet_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 514,
            multicast_group: None,
            max_packet_size: 65535,
        }
    }
}

/// TCP line-oriented syslog receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_connections: usize,
    /// Longest accepted line in bytes; a connection sending more is closed
    pub max_line_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 1514,
            max_connections: 100,
            max_line_size: 65535,
        }
    }
}

/// Filter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// How predicates from several filter sources combine: all, any
    pub policy: CombinePolicy,
}

/// Output targets configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub stdout: StdoutConfig,
    pub export: ExportConfig,
}

/// Stdout output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StdoutConfig {
    pub enabled: bool,
    /// Format: pretty, json, raw
    pub format: String,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: "pretty".to_string(),
        }
    }
}

/// Export written on shutdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for the export file; no export when unset
    pub directory: Option<String>,
}
