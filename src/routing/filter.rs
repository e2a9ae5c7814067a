use std::collections::BTreeSet;

/// A set of topic prefixes a node is interested in. Topics are hierarchical,
/// slash-delimited strings; a filter entry matches a topic iff it is a
/// leading path-component prefix of it. `"zeek/events"` matches
/// `"zeek/events"` and `"zeek/events/http"`, but not `"zeek/eventstream"`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubscriptionFilter {
    prefixes: BTreeSet<String>,
}

impl SubscriptionFilter {
    pub fn new() -> SubscriptionFilter {
        SubscriptionFilter::default()
    }

    pub fn from_prefixes(prefixes: impl IntoIterator<Item = impl Into<String>>) -> SubscriptionFilter {
        SubscriptionFilter {
            prefixes: prefixes.into_iter().map(|p| p.into()).collect(),
        }
    }

    /// returns true if the filter changed
    pub fn add(&mut self, prefix: impl Into<String>) -> bool {
        self.prefixes.insert(prefix.into())
    }

    /// returns true if the filter changed
    pub fn remove(&mut self, prefix: &str) -> bool {
        self.prefixes.remove(prefix)
    }

    /// union with another filter; returns true if this filter changed
    pub fn merge(&mut self, other: &SubscriptionFilter) -> bool {
        let mut changed = false;
        for prefix in &other.prefixes {
            changed |= self.prefixes.insert(prefix.clone());
        }
        changed
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.prefixes.iter().any(|p| Self::is_component_prefix(p, topic))
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(|p| p.as_str())
    }

    fn is_component_prefix(prefix: &str, topic: &str) -> bool {
        if !topic.starts_with(prefix) {
            return false;
        }
        // a prefix must end on a path component boundary
        topic.len() == prefix.len() || topic.as_bytes()[prefix.len()] == b'/'
    }
}
