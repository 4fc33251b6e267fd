//! Configuration for the sync engine.

use fieldsync_core::{ConflictStrategy, RecordKind, RepairPolicy};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Fields the client may overwrite during a merge, per record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeAllowList {
    fields: HashMap<RecordKind, BTreeSet<String>>,
}

impl MergeAllowList {
    /// An allow-list that permits nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allows `field` for `kind`.
    #[must_use]
    pub fn allow(mut self, kind: RecordKind, field: impl Into<String>) -> Self {
        self.fields.entry(kind).or_default().insert(field.into());
        self
    }

    /// Allows every field in `fields` for `kind`.
    #[must_use]
    pub fn allow_all<I, F>(self, kind: RecordKind, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |list, field| list.allow(kind, field))
    }

    /// Whether the client may overwrite `field` on records of `kind`.
    #[must_use]
    pub fn is_allowed(&self, kind: RecordKind, field: &str) -> bool {
        self.fields
            .get(&kind)
            .is_some_and(|fields| fields.contains(field))
    }

    /// The allowed fields for `kind`.
    pub fn fields(&self, kind: RecordKind) -> impl Iterator<Item = &str> {
        self.fields
            .get(&kind)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// The field-update rights field workers have on each kind.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .allow_all(
                RecordKind::HouseholdRegistration,
                ["contactNumber", "address"],
            )
            .allow_all(
                RecordKind::HouseholdUpdate,
                ["contactNumber", "address", "remarks"],
            )
            .allow_all(
                RecordKind::MemberUpdate,
                ["contactNumber", "occupation", "civilStatus"],
            )
            .allow_all(RecordKind::Grievance, ["description", "contactNumber"])
            .allow_all(RecordKind::PaymentAcknowledgement, ["remarks"])
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum records processed by one background sync.
    pub background_batch_size: usize,
    /// Strategy for records that did not choose one.
    pub default_strategy: ConflictStrategy,
    /// What integrity repair may accept.
    pub repair_policy: RepairPolicy,
    /// Client-updatable fields for merges.
    pub merge_allow_list: MergeAllowList,
    /// Interval between scheduled sync attempts.
    pub tick_interval: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            background_batch_size: 5,
            default_strategy: ConflictStrategy::ServerWins,
            repair_policy: RepairPolicy::RealignChecksum,
            merge_allow_list: MergeAllowList::standard(),
            tick_interval: Duration::from_secs(15 * 60),
        }
    }

    /// Sets the background batch size.
    pub fn with_background_batch_size(mut self, size: usize) -> Self {
        self.background_batch_size = size;
        self
    }

    /// Sets the default conflict strategy.
    pub fn with_default_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Sets the repair policy.
    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.repair_policy = policy;
        self
    }

    /// Sets the merge allow-list.
    pub fn with_merge_allow_list(mut self, list: MergeAllowList) -> Self {
        self.merge_allow_list = list;
        self
    }

    /// Sets the scheduler tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.background_batch_size, 5);
        assert_eq!(config.default_strategy, ConflictStrategy::ServerWins);
        assert_eq!(config.repair_policy, RepairPolicy::RealignChecksum);
        assert!(config
            .merge_allow_list
            .is_allowed(RecordKind::MemberUpdate, "contactNumber"));
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_background_batch_size(2)
            .with_default_strategy(ConflictStrategy::Manual)
            .with_repair_policy(RepairPolicy::EscalateMismatch)
            .with_merge_allow_list(MergeAllowList::empty())
            .with_tick_interval(Duration::from_secs(1));
        assert_eq!(config.background_batch_size, 2);
        assert_eq!(config.default_strategy, ConflictStrategy::Manual);
        assert!(!config
            .merge_allow_list
            .is_allowed(RecordKind::MemberUpdate, "contactNumber"));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn allow_list_is_per_kind() {
        let list = MergeAllowList::empty().allow(RecordKind::Grievance, "description");
        assert!(list.is_allowed(RecordKind::Grievance, "description"));
        assert!(!list.is_allowed(RecordKind::HouseholdUpdate, "description"));
        assert_eq!(
            list.fields(RecordKind::Grievance).collect::<Vec<_>>(),
            vec!["description"]
        );
    }
}
