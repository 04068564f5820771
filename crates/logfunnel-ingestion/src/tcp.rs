use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use logfunnel_core::config::TcpConfig;
use logfunnel_core::{
    Column, IngestionError, MessageParser, MessageSink, Receiver, ReceiverState, Severity,
    SYSLOG_COLUMNS,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{ActiveLoop, Dispatcher};
use crate::syslog::SyslogParser;
use crate::SYSLOG_SEVERITIES;

const RECEIVER_NAME: &str = "TCP Syslog Receiver";

/// Capacity of the queue between connection readers and the dispatcher
const LINE_QUEUE_SIZE: usize = 1024;

/// One newline-terminated line and the peer that sent it
struct RawLine {
    payload: Vec<u8>,
    peer: String,
}

/// Line-oriented syslog receiver accepting TCP connections.
///
/// Connection readers only split lines; a single dispatcher task parses and
/// sequences them so messages keep one total order per receiver.
pub struct TcpReceiver {
    config: TcpConfig,
    parser: Arc<dyn MessageParser>,
    sequence: Arc<AtomicU64>,
    active: Option<ActiveLoop>,
}

impl TcpReceiver {
    /// Create a TCP receiver using the syslog parser
    pub fn new(config: TcpConfig) -> Self {
        Self::with_parser(config, Arc::new(SyslogParser::new()))
    }

    /// Create a TCP receiver with a custom payload parser
    pub fn with_parser(config: TcpConfig, parser: Arc<dyn MessageParser>) -> Self {
        Self {
            config,
            parser,
            sequence: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    /// Get the configured bind address (ip:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.bind_address, self.config.port)
    }

    /// Address the listener is actually bound to, while active
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(ActiveLoop::local_addr)
    }

    /// Last sequence number handed out
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Receiver for TcpReceiver {
    fn name(&self) -> &str {
        RECEIVER_NAME
    }

    fn description(&self) -> String {
        let addr = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.bind_addr());
        format!(
            "Syslog over TCP on {} (max {} connections)",
            addr, self.config.max_connections
        )
    }

    fn export_file_name(&self) -> String {
        format!("syslog_tcp_{}", self.config.port)
    }

    fn supported_severities(&self) -> &'static [Severity] {
        SYSLOG_SEVERITIES
    }

    fn columns(&self) -> &'static [Column] {
        SYSLOG_COLUMNS
    }

    fn state(&self) -> ReceiverState {
        if self.active.is_some() {
            ReceiverState::Active
        } else {
            ReceiverState::Inactive
        }
    }

    async fn start(&mut self, sink: Arc<dyn MessageSink>) -> Result<(), IngestionError> {
        self.stop().await;

        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            error!(address = %addr, error = %e, "Failed to bind TCP receiver");
            IngestionError::Bind {
                addr: addr.clone(),
                source: e,
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| IngestionError::Transport(e.to_string()))?;

        let cancel = CancellationToken::new();
        let (line_tx, line_rx) = mpsc::channel(LINE_QUEUE_SIZE);
        let dispatcher = Dispatcher::new(
            RECEIVER_NAME,
            self.parser.clone(),
            self.sequence.clone(),
            sink,
        );

        let accept = tokio::spawn(accept_loop(
            listener,
            cancel.clone(),
            line_tx,
            self.config.max_connections,
            self.config.max_line_size,
        ));
        let dispatch = tokio::spawn(dispatch_loop(line_rx, cancel.clone(), dispatcher));

        self.active = Some(ActiveLoop::new(cancel, vec![accept, dispatch], local_addr));
        info!(address = %local_addr, "TCP receiver started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            let addr = active.local_addr();
            active.shutdown().await;
            info!(address = %addr, "TCP receiver stopped");
        }
    }

    fn clear(&self) {
        self.sequence.store(0, Ordering::SeqCst);
    }
}

/// Accept connections until cancelled, then close every open connection
async fn accept_loop(
    listener: TcpListener,
    cancel: CancellationToken,
    line_tx: mpsc::Sender<RawLine>,
    max_connections: usize,
    max_line_size: usize,
) {
    let mut connections = JoinSet::new();

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        // reap finished readers so the limit counts live connections only
        while connections.try_join_next().is_some() {}

        match accepted {
            Ok((stream, peer_addr)) => {
                if connections.len() >= max_connections {
                    warn!(
                        peer = %peer_addr,
                        max = max_connections,
                        "Max connections reached, rejecting"
                    );
                    drop(stream);
                    continue;
                }

                info!(peer = %peer_addr, active = connections.len() + 1, "New TCP connection");
                connections.spawn(read_connection(
                    stream,
                    peer_addr.to_string(),
                    cancel.clone(),
                    line_tx.clone(),
                    max_line_size,
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }

    connections.shutdown().await;
    debug!("TCP accept loop terminated");
}

/// Split one connection into lines and queue them for the dispatcher.
///
/// A line longer than `max_line_size` closes the connection.
async fn read_connection(
    stream: TcpStream,
    peer: String,
    cancel: CancellationToken,
    line_tx: mpsc::Sender<RawLine>,
    max_line_size: usize,
) {
    let mut reader = BufReader::new(stream);
    let limit = max_line_size as u64 + 1;
    let mut count = 0;

    loop {
        let mut payload = Vec::new();
        let mut bounded = (&mut reader).take(limit);
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = bounded.read_until(b'\n', &mut payload) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                if payload.last() == Some(&b'\n') {
                    payload.pop();
                } else if payload.len() > max_line_size {
                    warn!(
                        peer = %peer,
                        max = max_line_size,
                        "Line exceeds maximum size, closing connection"
                    );
                    break;
                }
                if payload.last() == Some(&b'\r') {
                    payload.pop();
                }
                if payload.is_empty() {
                    continue;
                }
                let line = RawLine {
                    payload,
                    peer: peer.clone(),
                };
                if line_tx.send(line).await.is_err() {
                    break;
                }
                count += 1;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "TCP connection error");
                break;
            }
        }
    }

    debug!(peer = %peer, lines = count, "TCP connection closed");
}

/// Sole consumer of queued lines: parse, sequence, deliver
async fn dispatch_loop(
    mut line_rx: mpsc::Receiver<RawLine>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = line_rx.recv() => line,
        };
        match line {
            Some(line) => {
                dispatcher.dispatch(&line.payload, &line.peer);
            }
            None => break,
        }
    }
    debug!("TCP dispatch loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfunnel_core::LogMessage;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    fn loopback_config(max_connections: usize) -> TcpConfig {
        TcpConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            max_connections,
            ..Default::default()
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<LogMessage>) -> LogMessage {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("sink closed")
    }

    #[test]
    fn test_tcp_receiver_metadata() {
        let tcp = TcpReceiver::new(TcpConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 9514,
            ..Default::default()
        });
        assert_eq!(tcp.bind_addr(), "127.0.0.1:9514");
        assert_eq!(tcp.export_file_name(), "syslog_tcp_9514");
        assert!(tcp.description().contains("127.0.0.1:9514"));
        assert!(!tcp.is_active());
    }

    #[tokio::test]
    async fn test_lines_are_sequenced_across_connections() {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let mut tcp = TcpReceiver::new(loopback_config(10));
        tcp.start(Arc::new(sender)).await.unwrap();
        let addr = tcp.local_addr().unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        first
            .write_all(b"<11>Jan 1 00:00:00 host app: one\r\n\n<14>two\n")
            .await
            .unwrap();
        let a = next(&mut rx).await;
        let b = next(&mut rx).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"three\n").await.unwrap();
        let c = next(&mut rx).await;

        assert_eq!(
            (a.sequence(), b.sequence(), c.sequence()),
            (1, 2, 3)
        );
        assert_eq!(a.severity(), Severity::Error);
        assert_eq!(a.logger_path(), Some("host.app"));
        assert_eq!(b.raw_text(), "<14>two");
        assert_eq!(c.raw_text(), "three");

        tcp.stop().await;
        assert!(!tcp.is_active());
    }

    #[tokio::test]
    async fn test_invalid_line_is_dropped() {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let mut tcp = TcpReceiver::new(loopback_config(10));
        tcp.start(Arc::new(sender)).await.unwrap();

        let mut client = TcpStream::connect(tcp.local_addr().unwrap()).await.unwrap();
        client.write_all(b"\xff\xfe\n<999>bad\nok\n").await.unwrap();

        let message = next(&mut rx).await;
        assert_eq!(message.raw_text(), "ok");
        assert_eq!(message.sequence(), 1);
        assert_eq!(tcp.last_sequence(), 1);

        tcp.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_open_connections() {
        let (sender, _rx) = mpsc::unbounded_channel();
        let mut tcp = TcpReceiver::new(loopback_config(10));
        tcp.start(Arc::new(sender)).await.unwrap();
        let addr = tcp.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello\n").await.unwrap();

        timeout(Duration::from_secs(5), tcp.stop())
            .await
            .expect("stop did not finish");
        assert!(!tcp.is_active());

        // listener is gone after stop
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_overlong_line_closes_connection() {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let mut tcp = TcpReceiver::new(TcpConfig {
            max_line_size: 8,
            ..loopback_config(10)
        });
        tcp.start(Arc::new(sender)).await.unwrap();
        let addr = tcp.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"12345678\nthis line never ends").await.unwrap();
        assert_eq!(next(&mut rx).await.raw_text(), "12345678");

        // the receiver hangs up instead of buffering the rest
        let mut buf = [0u8; 16];
        let read = timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("connection was not closed");
        assert!(matches!(read, Ok(0) | Err(_)));
        assert_eq!(tcp.last_sequence(), 1);

        // other connections keep working
        let mut other = TcpStream::connect(addr).await.unwrap();
        other.write_all(b"short\n").await.unwrap();
        let message = next(&mut rx).await;
        assert_eq!(message.raw_text(), "short");
        assert_eq!(message.sequence(), 2);

        tcp.stop().await;
    }
}
