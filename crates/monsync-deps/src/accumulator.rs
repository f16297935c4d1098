use std::collections::BTreeMap;

/// Caller-owned accumulator for one object's (or one chunk's) relation
/// writes. Kept chunk-local by the writer — never shared across threads —
/// and merged into an outbound `MULTI…EXEC` batch once the chunk finishes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RelationAccumulator {
    /// hash name → flat (field, JSON value) pairs, matching `HMSET`'s shape.
    pub hmsets: BTreeMap<String, Vec<(String, String)>>,
    /// pub/sub channel → messages.
    pub publishes: BTreeMap<String, Vec<String>>,
}

impl RelationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hash: impl Into<String>, field: impl Into<String>, value: impl Into<String>) {
        self.hmsets.entry(hash.into()).or_default().push((field.into(), value.into()));
    }

    pub fn publish(&mut self, channel: impl Into<String>, message: impl Into<String>) {
        self.publishes.entry(channel.into()).or_default().push(message.into());
    }
}
