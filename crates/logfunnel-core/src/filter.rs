//! Filter sources, predicates and the registry that combines them.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::message::{LogMessage, LOGGER_PATH_SEPARATOR};

/// Matching rule on a message's logger path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    logger_path_prefix: String,
    recursive: bool,
}

impl FilterPredicate {
    /// Build a predicate from a selected logger path.
    ///
    /// An empty (root) selection means "no filtering" and yields `None`.
    pub fn from_selection(path: &str, recursive: bool) -> Option<Self> {
        let path = path.trim().trim_matches(LOGGER_PATH_SEPARATOR);
        if path.is_empty() {
            return None;
        }
        Some(Self {
            logger_path_prefix: path.to_string(),
            recursive,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.logger_path_prefix
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Check a logger path against this predicate
    pub fn matches_path(&self, path: &str) -> bool {
        if path == self.logger_path_prefix {
            return true;
        }
        if !self.recursive {
            return false;
        }
        // descendants only on a separator boundary: `root.ab` is not under `root.a`
        path.strip_prefix(self.logger_path_prefix.as_str())
            .is_some_and(|rest| rest.starts_with(LOGGER_PATH_SEPARATOR))
    }

    /// Messages without a logger path never match
    pub fn matches(&self, message: &LogMessage) -> bool {
        message
            .logger_path()
            .is_some_and(|path| self.matches_path(path))
    }
}

/// How predicates from several sources combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// Visible only if every predicate matches
    #[default]
    All,
    /// Visible if any predicate matches
    Any,
}

/// Immutable snapshot of all contributed predicates
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectiveFilter {
    predicates: Vec<FilterPredicate>,
    policy: CombinePolicy,
}

impl EffectiveFilter {
    pub fn new(predicates: Vec<FilterPredicate>, policy: CombinePolicy) -> Self {
        Self { predicates, policy }
    }

    /// Filter that lets everything through
    pub fn pass_all() -> Self {
        Self::default()
    }

    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn is_visible(&self, message: &LogMessage) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        match self.policy {
            CombinePolicy::All => self.predicates.iter().all(|p| p.matches(message)),
            CombinePolicy::Any => self.predicates.iter().any(|p| p.matches(message)),
        }
    }
}

/// Party contributing zero or one predicate to the effective filter
pub trait FilterSource: Send + Sync {
    fn predicate(&self) -> Option<FilterPredicate>;
}

fn same_source(a: &Arc<dyn FilterSource>, b: &Arc<dyn FilterSource>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Tracks registered filter sources and signals subscribers when the
/// effective filter may have changed.
///
/// `register`, `unregister` and `notify_changed` are serialized on one lock.
/// Subscribers get a generation counter through a watch channel and are
/// expected to recompute visibility from scratch on every tick.
pub struct FilterRegistry {
    sources: Mutex<Vec<Arc<dyn FilterSource>>>,
    policy: CombinePolicy,
    changes: watch::Sender<u64>,
}

impl FilterRegistry {
    pub fn new(policy: CombinePolicy) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            sources: Mutex::new(Vec::new()),
            policy,
            changes,
        }
    }

    /// Register a source. Returns false if it was already registered.
    pub fn register(&self, source: Arc<dyn FilterSource>) -> bool {
        let mut sources = self.sources.lock();
        if sources.iter().any(|s| same_source(s, &source)) {
            return false;
        }
        sources.push(source);
        debug!(sources = sources.len(), "Filter source registered");
        self.bump();
        true
    }

    /// Unregister a source. Unknown sources are ignored.
    pub fn unregister(&self, source: &Arc<dyn FilterSource>) -> bool {
        let mut sources = self.sources.lock();
        let before = sources.len();
        sources.retain(|s| !same_source(s, source));
        if sources.len() == before {
            return false;
        }
        debug!(sources = sources.len(), "Filter source unregistered");
        self.bump();
        true
    }

    /// Signal that some source's predicate may have changed
    pub fn notify_changed(&self) {
        let _sources = self.sources.lock();
        self.bump();
    }

    fn bump(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Receive a tick whenever visibility must be recomputed
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current change generation
    pub fn generation(&self) -> u64 {
        *self.changes.borrow()
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    /// Query every registered source and combine the non-empty predicates
    pub fn effective_filter(&self) -> EffectiveFilter {
        let sources: Vec<Arc<dyn FilterSource>> = self.sources.lock().clone();
        let predicates = sources.iter().filter_map(|s| s.predicate()).collect();
        EffectiveFilter::new(predicates, self.policy)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(CombinePolicy::default())
    }
}

/// One selection context (e.g. a logger tree) acting as a filter source
pub struct SelectionFilter {
    name: String,
    selection: RwLock<Option<FilterPredicate>>,
    registry: Weak<FilterRegistry>,
}

impl SelectionFilter {
    /// Create a selection context and register it with `registry`
    pub fn attach(name: impl Into<String>, registry: &Arc<FilterRegistry>) -> Arc<Self> {
        let filter = Arc::new(Self {
            name: name.into(),
            selection: RwLock::new(None),
            registry: Arc::downgrade(registry),
        });
        registry.register(filter.clone());
        filter
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Select a logger path. The root path clears the selection.
    pub fn select(&self, path: &str, recursive: bool) {
        *self.selection.write() = FilterPredicate::from_selection(path, recursive);
        debug!(source = %self.name, path, recursive, "Selection changed");
        self.notify();
    }

    pub fn clear_selection(&self) {
        *self.selection.write() = None;
        self.notify();
    }

    /// Remove this source from its registry
    pub fn detach(self: &Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            let source: Arc<dyn FilterSource> = self.clone();
            registry.unregister(&source);
        }
    }

    fn notify(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.notify_changed();
        }
    }
}

impl FilterSource for SelectionFilter {
    fn predicate(&self) -> Option<FilterPredicate> {
        self.selection.read().clone()
    }
}
