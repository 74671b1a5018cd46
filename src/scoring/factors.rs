use std::collections::BTreeMap;

use serde::Serialize;
use ts_rs::TS;

use crate::model::Entity;

use super::name::{alias_match, member_suffix, name_similarity, trailing_index, ALIAS_BONUS};

// ── Weights ─────────────────────────────────────────────────────────

/// Relative weight of each factor. Each weight set sums to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub name: f64,
    pub nodes: f64,
    pub members: f64,
    pub type_fit: f64,
}

pub const LEAF_WEIGHTS: FactorWeights = FactorWeights {
    name: 0.60,
    nodes: 0.25,
    members: 0.0,
    type_fit: 0.15,
};

pub const GROUP_WEIGHTS: FactorWeights = FactorWeights {
    name: 0.40,
    nodes: 0.10,
    members: 0.40,
    type_fit: 0.10,
};

/// Node factor when either side has no node count.
const UNKNOWN_NODES: f64 = 0.5;
/// Type factor for two different types in the same bucket.
const SAME_BUCKET_TYPE: f64 = 0.6;
/// Weight of an index-only member match. At most 0.5, so a suffix match
/// that displaces two index pairs never lowers the overlap.
const INDEX_OVERLAP_WEIGHT: f64 = 0.5;

// ── Factors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ScoreFactor {
    Name,
    Nodes,
    Members,
    Type,
}

/// Raw factor values for one pair, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorScores {
    pub name: f64,
    pub alias: bool,
    pub nodes: f64,
    pub members: f64,
    pub type_fit: f64,
    pub grouped: bool,
}

impl FactorScores {
    pub fn weights(&self) -> FactorWeights {
        if self.grouped {
            GROUP_WEIGHTS
        } else {
            LEAF_WEIGHTS
        }
    }

    pub fn total(&self) -> f64 {
        let w = self.weights();
        (w.name * self.name + w.nodes * self.nodes + w.members * self.members + w.type_fit * self.type_fit)
            .clamp(0.0, 1.0)
    }
}

/// Factor values for a pair, or `None` when the buckets differ.
pub fn factor_scores(a: &Entity, b: &Entity) -> Option<FactorScores> {
    if a.phase_bucket() != b.phase_bucket() {
        return None;
    }
    let alias = alias_match(a.name(), a.aliases(), b.name(), b.aliases());
    let mut name = name_similarity(a.name(), b.name());
    if alias {
        name = (name + ALIAS_BONUS).min(1.0);
    }
    let grouped = a.is_group();
    Some(FactorScores {
        name,
        alias,
        nodes: node_closeness(a.node_count(), b.node_count()),
        members: if grouped {
            member_overlap(a.member_names(), b.member_names())
        } else {
            0.0
        },
        type_fit: if a.entity_type() == b.entity_type() {
            1.0
        } else {
            SAME_BUCKET_TYPE
        },
        grouped,
    })
}

/// `1 - |a - b| / max(a, b)`, neutral when a count is unknown.
pub fn node_closeness(a: u32, b: u32) -> f64 {
    if a == 0 || b == 0 {
        return UNKNOWN_NODES;
    }
    let (a, b) = (f64::from(a), f64::from(b));
    1.0 - (a - b).abs() / a.max(b)
}

/// Members keyed by normalized suffix, with their trailing index.
fn keyed_members(members: &[String]) -> BTreeMap<String, Option<u32>> {
    members
        .iter()
        .map(|m| (member_suffix(m), trailing_index(m)))
        .filter(|(suffix, _)| !suffix.is_empty())
        .collect()
}

/// Trailing-index counts of the members in `own` with no suffix match in `other`.
fn unmatched_indices(
    own: &BTreeMap<String, Option<u32>>,
    other: &BTreeMap<String, Option<u32>>,
) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for (suffix, index) in own {
        if let (false, Some(index)) = (other.contains_key(suffix), index) {
            *counts.entry(*index).or_insert(0) += 1;
        }
    }
    counts
}

/// Share of members matched across two groups. Members with the same
/// normalized suffix match fully; leftover members pair up by trailing
/// index at [`INDEX_OVERLAP_WEIGHT`]. Divided by the larger group size.
pub fn member_overlap(a: &[String], b: &[String]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return UNKNOWN_NODES,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }
    let (ka, kb) = (keyed_members(a), keyed_members(b));
    let size = ka.len().max(kb.len());
    if size == 0 {
        return 0.0;
    }
    let by_suffix = ka.keys().filter(|s| kb.contains_key(*s)).count();
    let (la, lb) = (unmatched_indices(&ka, &kb), unmatched_indices(&kb, &ka));
    let by_index: usize = la
        .iter()
        .map(|(index, n)| (*n).min(lb.get(index).copied().unwrap_or(0)))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let share = (by_suffix as f64 + INDEX_OVERLAP_WEIGHT * by_index as f64) / size as f64;
    share.min(1.0)
}

/// Compatibility of two entities in [0, 1]. Zero across buckets; the result
/// does not depend on argument order.
pub fn score(a: &Entity, b: &Entity) -> f64 {
    factor_scores(a, b).map_or(0.0, |f| f.total())
}
