//! logfunnel ingestion
//!
//! Network receivers and the syslog parser. Each receiver runs one ingestion
//! loop while active and delivers parsed messages to a `MessageSink`.

mod dispatch;
pub mod manager;
pub mod syslog;
pub mod tcp;
pub mod udp;

pub use manager::ReceiverManager;
pub use syslog::SyslogParser;
pub use tcp::TcpReceiver;
pub use udp::UdpReceiver;

use logfunnel_core::Severity;

/// Severities a syslog payload can map to
pub const SYSLOG_SEVERITIES: &[Severity] = &[
    Severity::Debug,
    Severity::Info,
    Severity::Warn,
    Severity::Error,
    Severity::Fatal,
];
