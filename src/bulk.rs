//! Numbered-family suggestions after a manual assignment.
//!
//! Mapping `Mini Pumpkin 3` → `Mini Tree 3` suggests mapping every other
//! unmapped `Mini Pumpkin N` onto a free `Mini Tree N`.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::mapping::MappingState;

/// One proposed source → destination pair sharing a trailing number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkPair {
    pub source: String,
    pub dest: String,
    pub number: u32,
}

/// A batch of analogous assignments, sorted by number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BulkSuggestion {
    pub source_family: String,
    pub dest_family: String,
    pub pairs: Vec<BulkPair>,
}

/// Split `"Mini Pumpkin 3"` into `("Mini Pumpkin", 3)`. Names without a
/// trailing number, or with nothing before it, have no family.
pub fn split_family(name: &str) -> Option<(&str, u32)> {
    let trimmed = name.trim_end();
    let digits = trimmed.bytes().rev().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let split = trimmed.len() - digits;
    let number = trimmed.get(split..)?.parse().ok()?;
    let prefix = trimmed.get(..split)?.trim();
    (!prefix.is_empty()).then_some((prefix, number))
}

fn family_key(prefix: &str) -> String {
    prefix.to_lowercase()
}

fn dismiss_key(source_family: &str, dest_family: &str) -> String {
    format!("{}→{}", family_key(source_family), family_key(dest_family))
}

/// Watches manual assignments and proposes family batches.
#[derive(Debug, Clone, Default)]
pub struct BulkInference {
    dismissed: IndexSet<String>,
    pending: Option<BulkSuggestion>,
}

impl BulkInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called after a manual `source → dest` assignment. Replaces any pending
    /// suggestion with the new one (or with nothing). Only sources accepted by
    /// `in_phase` are offered as siblings.
    pub fn observe<F>(&mut self, state: &MappingState, source: &str, dest: &str, in_phase: F) -> Option<&BulkSuggestion>
    where
        F: Fn(&str) -> bool,
    {
        self.pending =
            suggest(state, source, dest, in_phase).filter(|s| !self.is_dismissed(&s.source_family, &s.dest_family));
        if let Some(s) = &self.pending {
            tracing::debug!(
                source_family = %s.source_family,
                dest_family = %s.dest_family,
                pairs = s.pairs.len(),
                "bulk suggestion"
            );
        }
        self.pending.as_ref()
    }

    pub fn pending(&self) -> Option<&BulkSuggestion> {
        self.pending.as_ref()
    }

    /// Hand the pending suggestion over for acceptance.
    pub fn take_pending(&mut self) -> Option<BulkSuggestion> {
        self.pending.take()
    }

    /// Suppress the pending suggestion's family pair for the rest of the session.
    pub fn dismiss(&mut self) -> bool {
        let Some(s) = self.pending.take() else {
            return false;
        };
        self.dismissed.insert(dismiss_key(&s.source_family, &s.dest_family));
        true
    }

    /// Drop a stale pending suggestion without suppressing its family.
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn is_dismissed(&self, source_family: &str, dest_family: &str) -> bool {
        self.dismissed.contains(&dismiss_key(source_family, dest_family))
    }

    pub fn dismissed_keys(&self) -> impl Iterator<Item = &str> {
        self.dismissed.iter().map(String::as_str)
    }

    pub fn restore_dismissed<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        self.dismissed.extend(keys);
    }
}

/// Pure suggestion detection, ignoring dismissals.
///
/// Siblings are unmapped, unskipped sources of the same family that
/// `in_phase` accepts; candidates are free destinations of the destination's
/// family anywhere in the layout. Pairs form only where both sides carry the
/// same number.
pub fn suggest<F>(state: &MappingState, source: &str, dest: &str, in_phase: F) -> Option<BulkSuggestion>
where
    F: Fn(&str) -> bool,
{
    let (source_prefix, source_number) = split_family(source)?;
    let (dest_prefix, dest_number) = split_family(dest)?;
    if source_number != dest_number {
        return None;
    }
    let source_family = family_key(source_prefix);
    let dest_family = family_key(dest_prefix);

    let mut free_dests: BTreeMap<u32, &str> = BTreeMap::new();
    for candidate in state.scores().dest_names() {
        if candidate == dest || state.is_dest_taken(candidate) {
            continue;
        }
        if let Some((prefix, n)) = split_family(candidate) {
            if family_key(prefix) == dest_family {
                free_dests.entry(n).or_insert(candidate);
            }
        }
    }

    let mut pairs: Vec<BulkPair> = Vec::new();
    for sibling in state.scores().source_names() {
        if sibling == source || state.is_resolved(sibling) || !in_phase(sibling) {
            continue;
        }
        let Some((prefix, n)) = split_family(sibling) else {
            continue;
        };
        if family_key(prefix) != source_family {
            continue;
        }
        if let Some(candidate) = free_dests.remove(&n) {
            pairs.push(BulkPair {
                source: sibling.to_string(),
                dest: candidate.to_string(),
                number: n,
            });
        }
    }
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by_key(|p| p.number);

    Some(BulkSuggestion {
        source_family: source_prefix.to_string(),
        dest_family: dest_prefix.to_string(),
        pairs,
    })
}
