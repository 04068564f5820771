use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use logfunnel_core::{MessageParser, MessageSink};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Parses payloads, stamps sequence numbers and hands messages to the sink.
///
/// Exactly one task per receiver owns a `Dispatcher`, which is what keeps
/// sequence assignment free of races without a lock.
pub(crate) struct Dispatcher {
    receiver: &'static str,
    parser: Arc<dyn MessageParser>,
    sequence: Arc<AtomicU64>,
    sink: Arc<dyn MessageSink>,
}

impl Dispatcher {
    pub(crate) fn new(
        receiver: &'static str,
        parser: Arc<dyn MessageParser>,
        sequence: Arc<AtomicU64>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            receiver,
            parser,
            sequence,
            sink,
        }
    }

    /// Handle one payload. Returns the assigned sequence number, or `None`
    /// when the payload was dropped as malformed.
    ///
    /// Panics from the parser or the sink are contained here so they never
    /// take the receive loop down.
    pub(crate) fn dispatch(&self, payload: &[u8], sender: &str) -> Option<u64> {
        let parsed = match catch_unwind(AssertUnwindSafe(|| self.parser.parse(payload, sender))) {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) => {
                warn!(
                    receiver = self.receiver,
                    parser = self.parser.name(),
                    peer = %sender,
                    error = %e,
                    "Dropping malformed payload"
                );
                return None;
            }
            Err(_) => {
                warn!(
                    receiver = self.receiver,
                    parser = self.parser.name(),
                    peer = %sender,
                    "Parser panicked, dropping payload"
                );
                return None;
            }
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let message = parsed.into_message(sequence);
        debug!(receiver = self.receiver, sequence, peer = %sender, "Dispatching message");

        match catch_unwind(AssertUnwindSafe(|| self.sink.handle_message(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(receiver = self.receiver, sequence, error = %e, "Message sink failed")
            }
            Err(_) => warn!(receiver = self.receiver, sequence, "Message sink panicked"),
        }
        Some(sequence)
    }
}

/// Transport state that exists only while a receiver is active
pub(crate) struct ActiveLoop {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl ActiveLoop {
    pub(crate) fn new(
        cancel: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            cancel,
            tasks,
            local_addr,
        }
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the transport and wait for every loop task to exit
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Receiver task panicked");
                }
            }
        }
    }
}

impl Drop for ActiveLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
