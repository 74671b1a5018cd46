//! How much of the destination layout and of the sequence's effects the
//! current mapping reaches.
//!
//! Every figure is a pure function of the mapping state and the two entity
//! sets. Assignments that point at names missing from the entity sets are
//! ignored rather than reported as errors.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use ts_rs::TS;

use crate::mapping::MappingState;
use crate::model::{Entity, PhaseBucket};
use crate::phase::MappingPhase;

/// Effect types that carry a sequence's most recognizable moments.
pub const SIGNATURE_EFFECT_TYPES: &[&str] =
    &["Video", "Morph", "Faces", "Shader", "Fire", "Glediator", "Pictures"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export)]
pub struct CoverageSnapshot {
    pub covered_dest_count: usize,
    pub total_dest_count: usize,
    pub covered_effect_count: u64,
    pub total_effect_count: u64,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

impl CoverageSnapshot {
    /// Share of destination entities with an active assignment, in [0, 100].
    #[allow(clippy::cast_precision_loss)]
    pub fn display_percent(&self) -> f64 {
        percent(self.covered_dest_count as f64, self.total_dest_count as f64)
    }

    /// Share of source effects whose entity is mapped, in [0, 100].
    #[allow(clippy::cast_precision_loss)]
    pub fn effects_percent(&self) -> f64 {
        percent(self.covered_effect_count as f64, self.total_effect_count as f64)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn display_rounded(&self) -> u32 {
        self.display_percent().round() as u32
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn effects_rounded(&self) -> u32 {
        self.effects_percent().round() as u32
    }
}

/// Percentage-point change between two snapshots, at full precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, TS)]
#[ts(export)]
pub struct CoverageGain {
    pub display: f64,
    pub effects: f64,
}

impl CoverageGain {
    pub fn between(from: &CoverageSnapshot, to: &CoverageSnapshot) -> Self {
        Self {
            display: to.display_percent() - from.display_percent(),
            effects: to.effects_percent() - from.effects_percent(),
        }
    }
}

/// Names that survive the dangling-reference filter, plus the live pairs.
struct LiveMapping<'a> {
    mapped_sources: HashSet<&'a str>,
    covered_dests: HashSet<&'a str>,
}

fn live_mapping<'a>(state: &'a MappingState, sources: &'a [Entity], dests: &'a [Entity]) -> LiveMapping<'a> {
    let source_names: HashSet<&str> = sources.iter().map(Entity::name).collect();
    let dest_names: HashSet<&str> = dests.iter().map(Entity::name).collect();
    let mut mapped_sources = HashSet::new();
    let mut covered_dests = HashSet::new();
    for a in state.assignments() {
        if source_names.contains(a.source.as_str()) && dest_names.contains(a.dest.as_str()) {
            mapped_sources.insert(a.source.as_str());
            covered_dests.insert(a.dest.as_str());
        }
    }
    LiveMapping {
        mapped_sources,
        covered_dests,
    }
}

/// Compute both coverage figures. Entities repeating an earlier name count once.
pub fn compute(state: &MappingState, sources: &[Entity], dests: &[Entity]) -> CoverageSnapshot {
    let live = live_mapping(state, sources, dests);

    let mut seen = HashSet::new();
    let mut snapshot = CoverageSnapshot::default();
    for dest in dests {
        if !seen.insert(dest.name()) {
            continue;
        }
        snapshot.total_dest_count += 1;
        if live.covered_dests.contains(dest.name()) {
            snapshot.covered_dest_count += 1;
        }
    }

    seen.clear();
    for source in sources {
        if !seen.insert(source.name()) {
            continue;
        }
        let effects = u64::from(source.effect_count());
        snapshot.total_effect_count += effects;
        if live.mapped_sources.contains(source.name()) {
            snapshot.covered_effect_count += effects;
        }
    }
    snapshot
}

// ── Detailed report ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct BucketItems {
    pub bucket: PhaseBucket,
    pub mapped: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct EffectTypeCoverage {
    pub effect_type: String,
    pub covered: u64,
    pub total: u64,
    pub signature: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct CoverageReport {
    pub snapshot: CoverageSnapshot,
    pub display_percent: f64,
    pub effects_percent: f64,
    /// Change since the auto-match baseline.
    pub gain: CoverageGain,
    pub items: Vec<BucketItems>,
    /// Per effect type, signature types first, then by volume.
    pub effect_types: Vec<EffectTypeCoverage>,
}

fn bucket_items(state: &MappingState, sources: &[Entity], dests: &[Entity]) -> Vec<BucketItems> {
    let live = live_mapping(state, sources, dests);
    [PhaseBucket::Model, PhaseBucket::Group, PhaseBucket::Spinner]
        .into_iter()
        .map(|bucket| {
            let in_bucket: HashSet<&str> = sources
                .iter()
                .filter(|e| e.phase_bucket() == bucket)
                .map(Entity::name)
                .collect();
            BucketItems {
                bucket,
                mapped: in_bucket.iter().filter(|n| live.mapped_sources.contains(*n)).count(),
                total: in_bucket.len(),
            }
        })
        .collect()
}

fn effect_type_breakdown(state: &MappingState, sources: &[Entity], dests: &[Entity]) -> Vec<EffectTypeCoverage> {
    let live = live_mapping(state, sources, dests);
    let mut seen = HashSet::new();
    let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for source in sources {
        if !seen.insert(source.name()) {
            continue;
        }
        let mapped = live.mapped_sources.contains(source.name());
        for (effect_type, count) in source.effect_types() {
            let entry = totals.entry(effect_type.as_str()).or_default();
            entry.1 += u64::from(*count);
            if mapped {
                entry.0 += u64::from(*count);
            }
        }
    }
    let mut rows: Vec<EffectTypeCoverage> = totals
        .into_iter()
        .map(|(effect_type, (covered, total))| EffectTypeCoverage {
            effect_type: effect_type.to_string(),
            covered,
            total,
            signature: SIGNATURE_EFFECT_TYPES.contains(&effect_type),
        })
        .collect();
    rows.sort_by(|a, b| b.signature.cmp(&a.signature).then(b.total.cmp(&a.total)));
    rows
}

// ── Tracker ─────────────────────────────────────────────────────────

/// Caches the latest snapshot by state version and remembers baselines for
/// gain reporting. The cache assumes the entity sets stay fixed for the
/// tracker's lifetime.
#[derive(Debug, Clone, Default)]
pub struct CoverageTracker {
    cached: Option<(u64, CoverageSnapshot)>,
    baseline: Option<CoverageSnapshot>,
    phase_entries: IndexMap<MappingPhase, CoverageSnapshot>,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&mut self, state: &MappingState, sources: &[Entity], dests: &[Entity]) -> CoverageSnapshot {
        if let Some((version, snapshot)) = self.cached {
            if version == state.version() {
                return snapshot;
            }
        }
        let snapshot = compute(state, sources, dests);
        self.cached = Some((state.version(), snapshot));
        snapshot
    }

    /// Record the post-auto-match figures that gains are measured from.
    pub fn set_baseline(&mut self, snapshot: CoverageSnapshot) {
        self.baseline = Some(snapshot);
    }

    pub fn baseline(&self) -> Option<CoverageSnapshot> {
        self.baseline
    }

    pub fn gain(&self, current: &CoverageSnapshot) -> CoverageGain {
        self.baseline
            .map(|b| CoverageGain::between(&b, current))
            .unwrap_or_default()
    }

    /// Record the figures at the moment a phase is entered. The first entry wins.
    pub fn mark_phase_entry(&mut self, phase: MappingPhase, snapshot: CoverageSnapshot) {
        self.phase_entries.entry(phase).or_insert(snapshot);
    }

    /// Gain since `phase` was first entered.
    pub fn phase_gain(&self, phase: MappingPhase, current: &CoverageSnapshot) -> Option<CoverageGain> {
        self.phase_entries
            .get(&phase)
            .map(|entry| CoverageGain::between(entry, current))
    }

    pub fn report(&mut self, state: &MappingState, sources: &[Entity], dests: &[Entity]) -> CoverageReport {
        let snapshot = self.snapshot(state, sources, dests);
        CoverageReport {
            snapshot,
            display_percent: snapshot.display_percent(),
            effects_percent: snapshot.effects_percent(),
            gain: self.gain(&snapshot),
            items: bucket_items(state, sources, dests),
            effect_types: effect_type_breakdown(state, sources, dests),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::progress::ignore_progress;
    use crate::scoring::ScoreTable;

    fn layouts() -> (Vec<Entity>, Vec<Entity>) {
        let mut video = BTreeMap::new();
        video.insert("Video".to_string(), 4);
        video.insert("Bars".to_string(), 6);
        let sources = vec![
            Entity::model("Matrix", 2048).with_effect_types(video),
            Entity::model("Arch 1", 50).with_effects(30),
            Entity::model("Arch 2", 50).with_effects(0),
            Entity::group("Spinner Arms", ["Spinner/Arm 1", "Spinner/Arm 2"]).with_effects(60),
        ];
        let dests = vec![
            Entity::model("Matrix", 2048),
            Entity::model("Arch 1", 50),
            Entity::model("Arch 2", 50),
            Entity::model("Star", 40),
        ];
        (sources, dests)
    }

    fn empty_state(sources: &[Entity], dests: &[Entity]) -> MappingState {
        MappingState::new(Arc::new(ScoreTable::build(sources, dests, &mut ignore_progress)))
    }

    #[test]
    fn empty_mapping_has_zero_coverage() {
        let (sources, dests) = layouts();
        let state = empty_state(&sources, &dests);
        let snap = compute(&state, &sources, &dests);
        assert_eq!(snap.total_dest_count, 4);
        assert_eq!(snap.total_effect_count, 100);
        assert!(snap.display_percent().abs() < 1e-12);
        assert!(snap.effects_percent().abs() < 1e-12);
    }

    #[test]
    fn display_and_effects_move_independently() {
        let (sources, dests) = layouts();
        let mut state = empty_state(&sources, &dests);
        // Zero-effect source: display moves, effects do not.
        state.assign("Arch 2", "Arch 2");
        let snap = compute(&state, &sources, &dests);
        assert!((snap.display_percent() - 25.0).abs() < 1e-9);
        assert!(snap.effects_percent().abs() < 1e-12);

        state.assign("Arch 1", "Arch 1");
        let snap = compute(&state, &sources, &dests);
        assert!((snap.display_percent() - 50.0).abs() < 1e-9);
        assert!((snap.effects_percent() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn dangling_assignments_are_ignored() {
        let (sources, dests) = layouts();
        let mut state = empty_state(&sources, &dests);
        state.assign("Matrix", "Matrix");
        state.assign("Arch 1", "Star");
        // The host later hands over a destination set without the star.
        let shrunk: Vec<Entity> = dests.iter().filter(|d| d.name() != "Star").cloned().collect();
        let snap = compute(&state, &sources, &shrunk);
        assert_eq!(snap.covered_dest_count, 1);
        assert_eq!(snap.total_dest_count, 3);
        assert_eq!(snap.covered_effect_count, 10);
    }

    #[test]
    fn rounding_keeps_full_precision_underneath() {
        let snap = CoverageSnapshot {
            covered_dest_count: 1,
            total_dest_count: 3,
            covered_effect_count: 2,
            total_effect_count: 3,
        };
        assert_eq!(snap.display_rounded(), 33);
        assert_eq!(snap.effects_rounded(), 67);
        assert!((snap.display_percent() - 100.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn tracker_caches_by_version_and_reports_gain() {
        let (sources, dests) = layouts();
        let mut state = empty_state(&sources, &dests);
        let mut tracker = CoverageTracker::new();
        let base = tracker.snapshot(&state, &sources, &dests);
        tracker.set_baseline(base);
        tracker.mark_phase_entry(MappingPhase::Individuals, base);

        state.assign("Matrix", "Matrix");
        let report = tracker.report(&state, &sources, &dests);
        assert!((report.gain.display - 25.0).abs() < 1e-9);
        assert!((report.gain.effects - 10.0).abs() < 1e-9);
        let phase_gain = tracker.phase_gain(MappingPhase::Individuals, &report.snapshot).unwrap();
        assert!((phase_gain.display - 25.0).abs() < 1e-9);
        assert!(tracker.phase_gain(MappingPhase::Review, &report.snapshot).is_none());
    }

    #[test]
    fn report_breaks_down_buckets_and_effect_types() {
        let (sources, dests) = layouts();
        let mut state = empty_state(&sources, &dests);
        state.assign("Matrix", "Matrix");
        let report = CoverageTracker::new().report(&state, &sources, &dests);

        let models = report.items.iter().find(|i| i.bucket == PhaseBucket::Model).unwrap();
        assert_eq!((models.mapped, models.total), (1, 3));
        let spinners = report.items.iter().find(|i| i.bucket == PhaseBucket::Spinner).unwrap();
        assert_eq!((spinners.mapped, spinners.total), (0, 1));

        assert_eq!(report.effect_types[0].effect_type, "Video");
        assert!(report.effect_types[0].signature);
        assert_eq!(report.effect_types[0].covered, 4);
        assert_eq!(report.effect_types[1].effect_type, "Bars");
    }

    proptest! {
        #[test]
        fn coverage_is_monotonic_in_assignments(order in Just(vec![0usize, 1, 2]).prop_shuffle()) {
            let (sources, dests) = layouts();
            let mut state = empty_state(&sources, &dests);
            let pairs = [("Matrix", "Matrix"), ("Arch 1", "Arch 1"), ("Arch 2", "Arch 2")];
            let mut last = compute(&state, &sources, &dests);
            for i in &order {
                let (s, d) = pairs[*i];
                state.assign(s, d);
                let next = compute(&state, &sources, &dests);
                prop_assert!(next.display_percent() >= last.display_percent());
                prop_assert!(next.effects_percent() >= last.effects_percent());
                last = next;
            }
            for i in &order {
                state.unassign(pairs[*i].0);
                let next = compute(&state, &sources, &dests);
                prop_assert!(next.display_percent() <= last.display_percent());
                prop_assert!(next.effects_percent() <= last.effects_percent());
                last = next;
            }
        }
    }
}
