//! Small, shared collaborators used across the edge/graph/call machinery: the metric
//! tag blocklist (spec.md §4.7) and a bundle tying a logger and metrics provider
//! together for construction convenience.

use crate::error::DROPPED_TAG;
use crate::observability::{Logger, MetricsProvider, NoopLogger, NoopMetrics};
use std::collections::HashSet;
use std::sync::Arc;

/// The set of identity-component names whose values are replaced with
/// [`DROPPED_TAG`] before being used as metric tag values. Never applied to the edge
/// fingerprint itself — only to tags, per spec.md §4.7/§9.
#[derive(Clone, Debug, Default)]
pub struct TagBlocklist {
    blocked: HashSet<String>,
}

impl TagBlocklist {
    pub fn new() -> Self {
        Self { blocked: HashSet::new() }
    }

    pub fn block(&mut self, tag_name: impl Into<String>) {
        self.blocked.insert(tag_name.into());
    }

    /// Returns `value` unchanged, or [`DROPPED_TAG`] if `tag_name` is blocked.
    pub fn apply<'a>(&self, tag_name: &str, value: &'a str) -> &'a str {
        if self.blocked.contains(tag_name) {
            DROPPED_TAG
        } else {
            value
        }
    }
}

/// The logger and metrics provider a middleware instance is constructed with, plus the
/// tag blocklist that governs how their tag values are derived from an edge identity
/// (spec.md §4.7: "{logger, metric scope, ..., metric-tag blocklist}").
#[derive(Clone)]
pub struct CoreServices {
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub tag_blocklist: TagBlocklist,
}

impl CoreServices {
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { logger, metrics, tag_blocklist: TagBlocklist::new() }
    }

    pub fn with_blocklist(mut self, tag_blocklist: TagBlocklist) -> Self {
        self.tag_blocklist = tag_blocklist;
        self
    }
}

impl Default for CoreServices {
    fn default() -> Self {
        Self::new(Arc::new(NoopLogger), Arc::new(NoopMetrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_passes_through_unblocked_tags() {
        let blocklist = TagBlocklist::new();
        assert_eq!(blocklist.apply("source", "caller-a"), "caller-a");
    }

    #[test]
    fn blocklist_replaces_blocked_tags_with_sentinel() {
        let mut blocklist = TagBlocklist::new();
        blocklist.block("source");
        assert_eq!(blocklist.apply("source", "caller-a"), DROPPED_TAG);
    }
}
