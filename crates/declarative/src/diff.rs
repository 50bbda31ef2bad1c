//! Diff computation for resources

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::resource::{Resource, ResourceId};
use crate::types::{Action, ResourceKind, ResourceState};

/// One attribute that differs between current and desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub key: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(none)".to_string());
        write!(f, "{}: {} -> {}", self.key, show(&self.from), show(&self.to))
    }
}

/// A diff between current and desired state of a resource for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDiff {
    pub resource_id: ResourceId,
    pub action: Action,
    /// Human-readable description
    pub description: String,
    pub current: ResourceState,
    pub desired: ResourceState,
    /// Attributes that differ, restricted to the desired attribute keys
    pub changes: Vec<AttributeChange>,
}

impl ResourceDiff {
    /// Compare `current` against `desired`
    ///
    /// Only keys present in the desired state are compared; attributes the
    /// provider observes but the resource never declared are ignored.
    pub fn compute(
        resource: &Resource,
        action: Action,
        current: &ResourceState,
        desired: &ResourceState,
    ) -> Self {
        let changes = match desired {
            ResourceState::Present { attributes: want } => want
                .iter()
                .filter_map(|(key, value)| {
                    let have = current.attribute(key);
                    (have != Some(value.as_str())).then(|| AttributeChange {
                        key: key.clone(),
                        from: have.map(str::to_string),
                        to: Some(value.clone()),
                    })
                })
                .collect(),
            ResourceState::Absent | ResourceState::Unknown => Vec::new(),
        };

        Self {
            resource_id: resource.id.clone(),
            action,
            description: resource.description(),
            current: current.clone(),
            desired: desired.clone(),
            changes,
        }
    }

    /// Whether the current state falls short of the desired state
    ///
    /// An unobservable state on either side always counts as a difference.
    pub fn has_changes(&self) -> bool {
        match (&self.current, &self.desired) {
            (ResourceState::Unknown, _) | (_, ResourceState::Unknown) => true,
            (ResourceState::Absent, ResourceState::Absent) => false,
            (ResourceState::Present { .. }, ResourceState::Present { .. }) => {
                !self.changes.is_empty()
            }
            _ => true,
        }
    }

    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Absent)
        )
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Present { .. })
        ) && !self.changes.is_empty()
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify
    pub modifications: usize,
    /// Commands and restarts whose effect cannot be predicted
    pub unconditional: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs, counting only those with changes
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a ResourceDiff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs.into_iter().filter(|d| d.has_changes()) {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else if diff.is_modification() {
                summary.modifications += 1;
            } else {
                summary.unconditional += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.unconditional
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind<'a>(
    diffs: impl IntoIterator<Item = &'a ResourceDiff>,
) -> BTreeMap<ResourceKind, Vec<&'a ResourceDiff>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.resource_id.kind).or_default().push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Attributes;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_diff_restricted_to_desired_keys() {
        let r = Resource::directory("/etc/rabbitmq").mode("0755");
        let current = ResourceState::with_attributes(attrs(&[("mode", "0755"), ("owner", "root")]));
        let desired = ResourceState::with_attributes(attrs(&[("mode", "0755")]));

        let diff = ResourceDiff::compute(&r, Action::Create, &current, &desired);
        assert!(!diff.has_changes());
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn test_diff_reports_changed_attribute() {
        let r = Resource::directory("/etc/rabbitmq").mode("0750");
        let current = ResourceState::with_attributes(attrs(&[("mode", "0755")]));
        let desired = ResourceState::with_attributes(attrs(&[("mode", "0750")]));

        let diff = ResourceDiff::compute(&r, Action::Create, &current, &desired);
        assert!(diff.has_changes());
        assert!(diff.is_modification());
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].to_string(), "mode: 0755 -> 0750");
    }

    #[test]
    fn test_addition_and_removal() {
        let r = Resource::package("erlang");
        let present = ResourceState::present();

        let add = ResourceDiff::compute(&r, Action::Install, &ResourceState::Absent, &present);
        assert!(add.has_changes());
        assert!(add.is_addition());

        let remove = ResourceDiff::compute(&r, Action::Remove, &present, &ResourceState::Absent);
        assert!(remove.has_changes());
        assert!(remove.is_removal());

        let gone = ResourceDiff::compute(
            &r,
            Action::Remove,
            &ResourceState::Absent,
            &ResourceState::Absent,
        );
        assert!(!gone.has_changes());
    }

    #[test]
    fn test_unknown_always_differs() {
        let r = Resource::execute("rabbitmqctl add_user");
        let diff = ResourceDiff::compute(
            &r,
            Action::Run,
            &ResourceState::Unknown,
            &ResourceState::Unknown,
        );
        assert!(diff.has_changes());
    }

    #[test]
    fn test_summary_and_grouping() {
        let dir = Resource::directory("/var/lib/rabbitmq");
        let pkg = Resource::package("rabbitmq-server");
        let cmd = Resource::execute("enable plugins");
        let present = ResourceState::present();

        let diffs = [
            ResourceDiff::compute(&dir, Action::Create, &ResourceState::Absent, &present),
            ResourceDiff::compute(&pkg, Action::Install, &present, &present),
            ResourceDiff::compute(&cmd, Action::Run, &ResourceState::Unknown, &ResourceState::Unknown),
        ];

        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 1);
        assert_eq!(summary.unconditional, 1);
        assert_eq!(summary.total(), 2);

        let groups = group_by_kind(&diffs);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&ResourceKind::Package].len(), 1);
    }
}
