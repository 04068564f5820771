use std::collections::VecDeque;
use std::sync::Arc;

use logfunnel_core::{EffectiveFilter, FilterRegistry, LogMessage, MessageSink, SinkError};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::tree::LoggerTree;

struct StoreInner {
    messages: VecDeque<LogMessage>,
    filter: EffectiveFilter,
    visible_count: usize,
    tree: LoggerTree,
}

/// Bounded in-memory message store acting as the sink for every receiver.
///
/// Holds the current effective filter; when the filter changes, visibility of
/// all held messages is recomputed. Newly arriving visible messages are also
/// forwarded to an optional bounded live channel; when it is full the message
/// stays in the store and the sink reports `SinkError::Full`.
pub struct MessageStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
    live: Option<mpsc::Sender<LogMessage>>,
}

impl MessageStore {
    /// Create a store keeping at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                messages: VecDeque::with_capacity(capacity.min(1024)),
                filter: EffectiveFilter::pass_all(),
                visible_count: 0,
                tree: LoggerTree::new(),
            }),
            capacity: capacity.max(1),
            live: None,
        }
    }

    /// Forward newly arriving visible messages to `live`
    pub fn with_live_channel(mut self, live: mpsc::Sender<LogMessage>) -> Self {
        self.live = Some(live);
        self
    }

    /// Install a new effective filter and recompute visibility of every held
    /// message. Returns the number of visible messages.
    pub fn refresh(&self, filter: EffectiveFilter) -> usize {
        let mut inner = self.inner.write();
        let visible_count = inner
            .messages
            .iter()
            .filter(|m| filter.is_visible(m))
            .count();
        inner.visible_count = visible_count;
        inner.filter = filter;
        inner.visible_count
    }

    /// Keep visibility in sync with `registry` until the registry is dropped
    pub fn watch_filters(self: &Arc<Self>, registry: &Arc<FilterRegistry>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let weak = Arc::downgrade(registry);
        let mut changes = registry.subscribe();
        store.refresh(registry.effective_filter());

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                let visible = store.refresh(registry.effective_filter());
                debug!(visible, "Filter changed, visibility recomputed");
            }
        })
    }

    /// Visible messages in arrival order
    pub fn visible(&self) -> Vec<LogMessage> {
        let inner = self.inner.read();
        inner
            .messages
            .iter()
            .filter(|m| inner.filter.is_visible(m))
            .cloned()
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.inner.read().visible_count
    }

    /// All held messages, visible or not
    pub fn all(&self) -> Vec<LogMessage> {
        self.inner.read().messages.iter().cloned().collect()
    }

    pub fn filter(&self) -> EffectiveFilter {
        self.inner.read().filter.clone()
    }

    /// Snapshot of the logger hierarchy of the held messages
    pub fn logger_tree(&self) -> LoggerTree {
        self.inner.read().tree.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all held messages and the logger hierarchy
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.messages.clear();
        inner.tree.clear();
        inner.visible_count = 0;
    }
}

impl MessageSink for MessageStore {
    fn handle_message(&self, message: LogMessage) -> Result<(), SinkError> {
        let visible = {
            let mut inner = self.inner.write();
            if inner.messages.len() >= self.capacity {
                if let Some(evicted) = inner.messages.pop_front() {
                    if inner.filter.is_visible(&evicted) {
                        inner.visible_count -= 1;
                    }
                    if let Some(path) = evicted.logger_path() {
                        inner.tree.remove(path);
                    }
                }
            }
            if let Some(path) = message.logger_path() {
                inner.tree.insert(path);
            }
            let visible = inner.filter.is_visible(&message);
            if visible {
                inner.visible_count += 1;
            }
            inner.messages.push_back(message.clone());
            visible
        };

        if visible {
            if let Some(live) = &self.live {
                live.handle_message(message)?;
            }
        }
        Ok(())
    }
}
