//! Grouping of membership records into per-request partitions.
//!
//! A partition collects every record sharing the same audience and action. Inside a partition,
//! identifiers are deduplicated: the wire-level entry list is ordered by first appearance and
//! each entry remembers every original record index that resolved to it, which is what lets the
//! reconciler map response-local indices back to the caller's records.

use std::collections::HashMap;

use tracing::debug;

use crate::classify::classify;
use crate::error::{ErrorKind, SyncError};
use crate::normalize::normalize_record;
use crate::sync_error;
use crate::types::{Action, CanonicalIdentifier, IdentifierKind, MembershipRecord};

/// Key shared by every record that ends up in the same upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub audience_id: String,
    pub action: Action,
}

/// One wire-level identifier and the original record indices that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    identifier: CanonicalIdentifier,
    original_indices: Vec<usize>,
}

impl PartitionEntry {
    pub fn identifier(&self) -> &CanonicalIdentifier {
        &self.identifier
    }

    /// Original record indices, in input order.
    pub fn original_indices(&self) -> &[usize] {
        &self.original_indices
    }
}

/// Deduplicated identifiers sharing the same audience and action.
#[derive(Debug, Clone)]
pub struct Partition {
    key: PartitionKey,
    audience_name: String,
    entries: Vec<PartitionEntry>,
    positions: HashMap<CanonicalIdentifier, usize>,
    members: Vec<usize>,
}

impl Partition {
    fn new(key: PartitionKey, audience_name: String) -> Self {
        Self {
            key,
            audience_name,
            entries: Vec::new(),
            positions: HashMap::new(),
            members: Vec::new(),
        }
    }

    fn push(&mut self, original_index: usize, identifiers: Vec<CanonicalIdentifier>) {
        for identifier in identifiers {
            match self.positions.get(&identifier) {
                Some(&position) => {
                    debug!(
                        original_index,
                        position, "identifier already in partition, merging record"
                    );
                    self.entries[position].original_indices.push(original_index);
                }
                None => {
                    self.positions.insert(identifier.clone(), self.entries.len());
                    self.entries.push(PartitionEntry {
                        identifier,
                        original_indices: vec![original_index],
                    });
                }
            }
        }

        self.members.push(original_index);
    }

    pub fn audience_id(&self) -> &str {
        &self.key.audience_id
    }

    pub fn action(&self) -> Action {
        self.key.action
    }

    /// Name of the audience, taken from the first record that opened the partition.
    pub fn audience_name(&self) -> &str {
        &self.audience_name
    }

    /// Wire-level entries in the order they are sent upstream.
    pub fn entries(&self) -> &[PartitionEntry] {
        &self.entries
    }

    /// Returns the entry at a response-local index, if it exists.
    pub fn entry(&self, response_index: usize) -> Option<&PartitionEntry> {
        self.entries.get(response_index)
    }

    /// Distinct original record indices owned by this partition, in input order.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of partitioning a batch of records.
#[derive(Debug, Default)]
pub struct PartitionPlan {
    /// Partitions in order of first appearance in the input.
    pub partitions: Vec<Partition>,
    /// Records rejected before dispatch, with the reason.
    pub rejected: Vec<(usize, SyncError)>,
}

impl PartitionPlan {
    /// Total number of records the plan accounts for.
    pub fn record_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|partition| partition.members().len())
            .sum::<usize>()
            + self.rejected.len()
    }
}

/// Splits `records` into partitions keyed by audience and action.
///
/// Only identifiers whose kind satisfies `accepts` are considered. Every record index ends up
/// either in exactly one partition or in [`PartitionPlan::rejected`].
pub fn partition<F>(records: &[MembershipRecord], accepts: F) -> PartitionPlan
where
    F: Fn(IdentifierKind) -> bool,
{
    let mut plan = PartitionPlan::default();
    let mut key_to_partition: HashMap<PartitionKey, usize> = HashMap::new();

    for (original_index, record) in records.iter().enumerate() {
        if record.audience_id.trim().is_empty() {
            let error = sync_error!(
                ErrorKind::MissingAudience,
                "Record has no audience",
                "audience_id is blank"
            );
            plan.rejected.push((original_index, error));
            continue;
        }

        let identifiers = match normalize_record(record, &accepts) {
            Ok(identifiers) => identifiers,
            Err(error) => {
                plan.rejected.push((original_index, error));
                continue;
            }
        };

        let key = PartitionKey {
            audience_id: record.audience_id.clone(),
            action: classify(record),
        };

        let position = *key_to_partition.entry(key.clone()).or_insert_with(|| {
            plan.partitions.push(Partition::new(key, record.audience_name.clone()));
            plan.partitions.len() - 1
        });

        plan.partitions[position].push(original_index, identifiers);
    }

    plan
}
