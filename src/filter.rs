//! Sender allow-list.

use std::collections::HashSet;

/// Set of sender identifiers permitted to have their messages forwarded.
///
/// An empty set allows everyone; a non-empty set requires exact,
/// case-sensitive membership. Built once at startup, immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct AllowSet(HashSet<String>);

impl AllowSet {
    pub fn new<I>(senders: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self(senders.into_iter().collect())
    }

    pub fn is_allowed(&self, sender: &str) -> bool {
        self.0.is_empty() || self.0.contains(sender)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
