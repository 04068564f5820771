use std::collections::BTreeMap;

use logfunnel_core::LOGGER_PATH_SEPARATOR;

/// Logger paths of the held messages, with all of their ancestors.
///
/// Each node counts the messages at or below it, so a path disappears once
/// the last message carrying it is removed. Selection contexts present this
/// hierarchy and turn a selected node into a filter predicate.
#[derive(Debug, Clone, Default)]
pub struct LoggerTree {
    nodes: BTreeMap<String, usize>,
}

fn normalize(path: &str) -> Option<&str> {
    let path = path.trim_matches(LOGGER_PATH_SEPARATOR);
    (!path.is_empty()).then_some(path)
}

/// `a`, `a.b`, `a.b.c` for `a.b.c`
fn lineage(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices(LOGGER_PATH_SEPARATOR)
        .map(move |(idx, _)| &path[..idx])
        .chain(std::iter::once(path))
}

impl LoggerTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one message at `path`. Returns true if the path was new.
    pub fn insert(&mut self, path: &str) -> bool {
        let Some(path) = normalize(path) else {
            return false;
        };
        let is_new = !self.nodes.contains_key(path);
        for node in lineage(path) {
            *self.nodes.entry(node.to_string()).or_insert(0) += 1;
        }
        is_new
    }

    /// Forget one message at `path`. Returns true if the path is now gone.
    pub fn remove(&mut self, path: &str) -> bool {
        let Some(path) = normalize(path) else {
            return false;
        };
        if !self.nodes.contains_key(path) {
            return false;
        }
        for node in lineage(path) {
            if let Some(count) = self.nodes.get_mut(node) {
                *count -= 1;
                if *count == 0 {
                    self.nodes.remove(node);
                }
            }
        }
        !self.nodes.contains_key(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Direct children of `parent`; the empty path lists the top level
    pub fn children(&self, parent: &str) -> Vec<&str> {
        self.nodes
            .keys()
            .map(String::as_str)
            .filter(|node| match parent {
                "" => !node.contains(LOGGER_PATH_SEPARATOR),
                _ => node
                    .strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix(LOGGER_PATH_SEPARATOR))
                    .is_some_and(|rest| !rest.contains(LOGGER_PATH_SEPARATOR)),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_adds_ancestors() {
        let mut tree = LoggerTree::new();
        assert!(tree.insert("root.a.b"));
        assert!(tree.contains("root"));
        assert!(tree.contains("root.a"));
        assert!(tree.contains("root.a.b"));
        assert_eq!(tree.len(), 3);
        assert!(!tree.insert("root.a.b"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_remove_prunes_unreferenced_paths() {
        let mut tree = LoggerTree::new();
        tree.insert("root.a.b");
        tree.insert("root.a.b");
        tree.insert("root.c");

        assert!(!tree.remove("root.a.b"));
        assert!(tree.contains("root.a.b"));

        assert!(tree.remove("root.a.b"));
        assert!(!tree.contains("root.a.b"));
        assert!(!tree.contains("root.a"));
        assert!(tree.contains("root"));
        assert_eq!(tree.children("root"), vec!["root.c"]);

        assert!(tree.remove("root.c"));
        assert!(tree.is_empty());
        assert!(!tree.remove("unknown"));
    }

    #[test]
    fn test_parent_path_survives_child_removal() {
        let mut tree = LoggerTree::new();
        tree.insert("root");
        tree.insert("root.a");

        assert!(tree.remove("root.a"));
        assert!(tree.contains("root"));
        assert!(tree.remove("root"));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_children() {
        let mut tree = LoggerTree::new();
        tree.insert("root.a.b");
        tree.insert("root.ab");
        tree.insert("other");

        assert_eq!(tree.children(""), vec!["other", "root"]);
        assert_eq!(tree.children("root"), vec!["root.a", "root.ab"]);
        assert_eq!(tree.children("root.a"), vec!["root.a.b"]);
        assert!(tree.children("root.a.b").is_empty());
    }

    #[test]
    fn test_empty_path_ignored() {
        let mut tree = LoggerTree::new();
        assert!(!tree.insert(""));
        assert!(!tree.insert("."));
        assert!(tree.is_empty());
    }
}
