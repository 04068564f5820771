use std::sync::Arc;

use logfunnel_core::config::ReceiverConfig;
use logfunnel_core::{MessageSink, Receiver};
use tracing::{error, info};

use crate::{TcpReceiver, UdpReceiver};

/// Owns a set of receivers and drives their lifecycles as a group
pub struct ReceiverManager {
    receivers: Vec<Box<dyn Receiver>>,
    sink: Arc<dyn MessageSink>,
}

impl ReceiverManager {
    /// Create an empty manager delivering to `sink`
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            receivers: Vec::new(),
            sink,
        }
    }

    /// Build one receiver per configuration entry
    pub fn from_config(configs: &[ReceiverConfig], sink: Arc<dyn MessageSink>) -> Self {
        let mut manager = Self::new(sink);
        for config in configs {
            manager.add(build_receiver(config));
        }
        manager
    }

    pub fn add(&mut self, receiver: Box<dyn Receiver>) {
        self.receivers.push(receiver);
    }

    /// Start every receiver. A receiver that fails to start stays inactive
    /// and does not prevent the others from starting.
    ///
    /// Returns the number of receivers started
    pub async fn start_all(&mut self) -> usize {
        let mut count = 0;
        for receiver in &mut self.receivers {
            match receiver.start(self.sink.clone()).await {
                Ok(()) => {
                    info!(receiver = %receiver.description(), "Started receiver");
                    count += 1;
                }
                Err(e) => {
                    error!(receiver = %receiver.description(), error = %e, "Receiver failed to start");
                }
            }
        }
        count
    }

    /// Stop every receiver; returns once all ingestion loops have exited
    pub async fn stop_all(&mut self) {
        for receiver in &mut self.receivers {
            receiver.stop().await;
        }
    }

    /// Reset every receiver's sequence counter
    pub fn clear_all(&self) {
        for receiver in &self.receivers {
            receiver.clear();
        }
    }

    /// Get the number of active receivers
    pub fn active_count(&self) -> usize {
        self.receivers.iter().filter(|r| r.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    pub fn receivers(&self) -> impl Iterator<Item = &dyn Receiver> {
        self.receivers.iter().map(|r| r.as_ref())
    }
}

fn build_receiver(config: &ReceiverConfig) -> Box<dyn Receiver> {
    match config {
        ReceiverConfig::Udp(udp) => Box::new(UdpReceiver::new(udp.clone())),
        ReceiverConfig::Tcp(tcp) => Box::new(TcpReceiver::new(tcp.clone())),
    }
}
