use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use logfunnel_core::config::UdpConfig;
use logfunnel_core::{
    Column, IngestionError, MessageParser, MessageSink, Receiver, ReceiverState, Severity,
    SYSLOG_COLUMNS,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::{ActiveLoop, Dispatcher};
use crate::syslog::SyslogParser;
use crate::SYSLOG_SEVERITIES;

const RECEIVER_NAME: &str = "UDP Syslog Receiver";

/// Outcome of one receive on the socket
enum Received {
    Datagram(usize, SocketAddr),
    /// The receiver was stopped; the loop must exit without re-arming
    Closed,
    Failed(std::io::Error),
}

/// Line-oriented syslog receiver on a UDP socket
pub struct UdpReceiver {
    config: UdpConfig,
    parser: Arc<dyn MessageParser>,
    sequence: Arc<AtomicU64>,
    active: Option<ActiveLoop>,
}

impl UdpReceiver {
    /// Create a UDP receiver using the syslog parser
    pub fn new(config: UdpConfig) -> Self {
        Self::with_parser(config, Arc::new(SyslogParser::new()))
    }

    /// Create a UDP receiver with a custom payload parser
    pub fn with_parser(config: UdpConfig, parser: Arc<dyn MessageParser>) -> Self {
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

    /// Address the socket is actually bound to, while active
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(ActiveLoop::local_addr)
    }

    /// Last sequence number handed out
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn join_multicast(&self, socket: &UdpSocket, group: &str) -> Result<(), IngestionError> {
        let join_error = |message: String| IngestionError::MulticastJoin {
            group: group.to_string(),
            message,
        };
        let group_addr: IpAddr = group
            .parse()
            .map_err(|_| join_error("not an IP address".to_string()))?;

        match group_addr {
            IpAddr::V4(group_v4) => {
                let interface = self
                    .config
                    .bind_address
                    .parse::<Ipv4Addr>()
                    .unwrap_or(Ipv4Addr::UNSPECIFIED);
                socket
                    .join_multicast_v4(group_v4, interface)
                    .map_err(|e| join_error(e.to_string()))
            }
            IpAddr::V6(group_v6) => socket
                .join_multicast_v6(&group_v6, 0)
                .map_err(|e| join_error(e.to_string())),
        }
    }
}

#[async_trait]
impl Receiver for UdpReceiver {
    fn name(&self) -> &str {
        RECEIVER_NAME
    }

    fn description(&self) -> String {
        let addr = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.bind_addr());
        match &self.config.multicast_group {
            Some(group) => format!("Syslog over UDP on {} (multicast {})", addr, group),
            None => format!("Syslog over UDP on {}", addr),
        }
    }

    fn export_file_name(&self) -> String {
        format!("syslog_udp_{}", self.config.port)
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
        // never leak the previous socket
        self.stop().await;

        let addr = self.bind_addr();
        let socket = UdpSocket::bind(&addr).await.map_err(|e| {
            error!(address = %addr, error = %e, "Failed to bind UDP receiver");
            IngestionError::Bind {
                addr: addr.clone(),
                source: e,
            }
        })?;

        if let Some(group) = &self.config.multicast_group {
            match self.join_multicast(&socket, group) {
                Ok(()) => info!(group = %group, "Joined multicast group"),
                Err(e) => warn!(error = %e, "Continuing unicast-only"),
            }
        }

        let local_addr = socket
            .local_addr()
            .map_err(|e| IngestionError::Transport(e.to_string()))?;

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            RECEIVER_NAME,
            self.parser.clone(),
            self.sequence.clone(),
            sink,
        );
        let task = tokio::spawn(receive_loop(
            socket,
            cancel.clone(),
            dispatcher,
            self.config.max_packet_size,
        ));

        self.active = Some(ActiveLoop::new(cancel, vec![task], local_addr));
        info!(address = %local_addr, "UDP receiver started");
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            let addr = active.local_addr();
            active.shutdown().await;
            info!(address = %addr, "UDP receiver stopped");
        }
    }

    fn clear(&self) {
        self.sequence.store(0, Ordering::SeqCst);
    }
}

/// Wait for the next datagram, or for the receiver to be closed
async fn receive(socket: &UdpSocket, buf: &mut [u8], cancel: &CancellationToken) -> Received {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Received::Closed,
        result = socket.recv_from(buf) => match result {
            Ok((len, peer)) => Received::Datagram(len, peer),
            Err(e) => Received::Failed(e),
        },
    }
}

/// Receive, parse, dispatch, then re-arm. One receive is in flight at a time.
async fn receive_loop(
    socket: UdpSocket,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
    max_packet_size: usize,
) {
    // one spare byte so an oversized datagram shows up as len > max_packet_size
    let mut buf = vec![0u8; max_packet_size + 1];
    let mut count: u64 = 0;

    loop {
        match receive(&socket, &mut buf, &cancel).await {
            Received::Datagram(len, peer) => {
                // completed right as the receiver was closed
                if cancel.is_cancelled() {
                    break;
                }
                if len > max_packet_size {
                    warn!(
                        peer = %peer,
                        max = max_packet_size,
                        "Dropping truncated UDP datagram"
                    );
                    continue;
                }
                if dispatcher.dispatch(&buf[..len], &peer.to_string()).is_some() {
                    count += 1;
                    if count % 10_000 == 0 {
                        debug!(total = count, "UDP messages processed");
                    }
                }
            }
            Received::Closed => break,
            Received::Failed(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                warn!(error = %e, "Failed to receive UDP datagram");
            }
        }
    }

    debug!(total = count, "UDP receive loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> UdpConfig {
        UdpConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_udp_receiver_metadata() {
        let receiver = UdpReceiver::new(UdpConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 9515,
            multicast_group: Some("239.0.0.1".to_string()),
            max_packet_size: 8192,
        });
        assert_eq!(receiver.bind_addr(), "127.0.0.1:9515");
        assert_eq!(receiver.name(), "UDP Syslog Receiver");
        assert_eq!(
            receiver.description(),
            "Syslog over UDP on 127.0.0.1:9515 (multicast 239.0.0.1)"
        );
        assert_eq!(receiver.export_file_name(), "syslog_udp_9515");
        assert_eq!(receiver.columns().len(), 7);
        assert!(!receiver.supported_severities().contains(&Severity::Trace));
        assert_eq!(receiver.state(), ReceiverState::Inactive);
    }

    #[tokio::test]
    async fn test_start_and_stop_toggle_state() {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let mut udp = UdpReceiver::new(loopback_config());

        udp.start(Arc::new(sender)).await.unwrap();
        assert!(udp.is_active());
        let addr = udp.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(udp.description().contains(&addr.to_string()));

        udp.stop().await;
        assert!(!udp.is_active());
        assert!(udp.local_addr().is_none());

        // second stop is a no-op
        udp.stop().await;
        assert_eq!(udp.state(), ReceiverState::Inactive);
    }

    #[tokio::test]
    async fn test_restart_rebinds() {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let sink: Arc<dyn MessageSink> = Arc::new(sender);
        let mut udp = UdpReceiver::new(loopback_config());

        udp.start(sink.clone()).await.unwrap();
        udp.start(sink.clone()).await.unwrap();
        assert!(udp.is_active());

        udp.stop().await;
        udp.start(sink).await.unwrap();
        assert!(udp.is_active());
        udp.stop().await;
    }

    #[test]
    fn test_clear_resets_counter() {
        let udp = UdpReceiver::new(loopback_config());
        udp.sequence.store(41, Ordering::SeqCst);
        assert_eq!(udp.last_sequence(), 41);
        udp.clear();
        assert_eq!(udp.last_sequence(), 0);
    }
}
