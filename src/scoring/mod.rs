//! Pairwise compatibility scoring between source and destination entities.

pub mod factors;
pub mod name;

use indexmap::IndexSet;
use serde::Serialize;
use ts_rs::TS;

use crate::model::Entity;
use crate::progress::{ProgressEvent, ProgressFn};

pub use factors::{factor_scores, score, FactorScores, ScoreFactor};

const SCORING_OP: &str = "scoring";

// ── ScoreMatrix ─────────────────────────────────────────────────────

/// Dense rows × cols table of scores in [0, 1]. Zero means incompatible.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl ScoreMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0.0; rows * cols],
        }
    }

    /// Build from nested rows. Short rows are padded with zeros.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut matrix = Self::new(rows.len(), cols);
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                matrix.set(r, c, *value);
            }
        }
        matrix
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Score at (row, col); zero when out of range.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        self.cells.get(row * self.cols + col).copied().unwrap_or(0.0)
    }

    /// Store a score, clamped to [0, 1]. NaN is stored as zero.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        if let Some(cell) = self.cells.get_mut(row * self.cols + col) {
            *cell = value;
        }
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let start = row.saturating_mul(self.cols);
        self.cells.get(start..start + self.cols).unwrap_or_default()
    }
}

// ── ScoreTable ──────────────────────────────────────────────────────

/// Score matrix plus the name indexes of both layouts.
#[derive(Debug, Clone, Default)]
pub struct ScoreTable {
    sources: IndexSet<String>,
    dests: IndexSet<String>,
    matrix: ScoreMatrix,
}

impl ScoreTable {
    /// Score every source against every destination. Later entities whose
    /// name repeats an earlier one on the same side are ignored.
    pub fn build(sources: &[Entity], dests: &[Entity], on_progress: ProgressFn<'_>) -> Self {
        let sources = unique_by_name(sources, "source");
        let dests = unique_by_name(dests, "destination");

        let mut matrix = ScoreMatrix::new(sources.len(), dests.len());
        let step = (sources.len() / 20).max(1);
        on_progress(ProgressEvent::new(SCORING_OP, "matrix", 0.0, None));
        for (r, source) in sources.iter().enumerate() {
            for (c, dest) in dests.iter().enumerate() {
                matrix.set(r, c, score(source, dest));
            }
            if (r + 1) % step == 0 {
                #[allow(clippy::cast_precision_loss)]
                let progress = (r + 1) as f64 / sources.len() as f64;
                on_progress(ProgressEvent::new(SCORING_OP, "matrix", progress, Some(source.name())));
            }
        }
        on_progress(ProgressEvent::new(SCORING_OP, "matrix", 1.0, None));

        Self {
            sources: sources.iter().map(|e| e.name().to_string()).collect(),
            dests: dests.iter().map(|e| e.name().to_string()).collect(),
            matrix,
        }
    }

    /// A table over precomputed scores, for exercising the solver-facing
    /// code with exact values.
    #[cfg(test)]
    pub(crate) fn from_scores(sources: &[&str], dests: &[&str], rows: &[Vec<f64>]) -> Self {
        Self {
            sources: sources.iter().map(ToString::to_string).collect(),
            dests: dests.iter().map(ToString::to_string).collect(),
            matrix: ScoreMatrix::from_rows(rows),
        }
    }

    pub fn matrix(&self) -> &ScoreMatrix {
        &self.matrix
    }

    pub fn source_index(&self, name: &str) -> Option<usize> {
        self.sources.get_index_of(name)
    }

    pub fn dest_index(&self, name: &str) -> Option<usize> {
        self.dests.get_index_of(name)
    }

    pub fn source_name(&self, index: usize) -> Option<&str> {
        self.sources.get_index(index).map(String::as_str)
    }

    pub fn dest_name(&self, index: usize) -> Option<&str> {
        self.dests.get_index(index).map(String::as_str)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    pub fn dest_names(&self) -> impl Iterator<Item = &str> {
        self.dests.iter().map(String::as_str)
    }

    pub fn has_source(&self, name: &str) -> bool {
        self.sources.contains(name)
    }

    pub fn has_dest(&self, name: &str) -> bool {
        self.dests.contains(name)
    }

    /// Score by name; zero when either name is unknown.
    pub fn score(&self, source: &str, dest: &str) -> f64 {
        match (self.source_index(source), self.dest_index(dest)) {
            (Some(r), Some(c)) => self.matrix.get(r, c),
            _ => 0.0,
        }
    }

    /// Destinations for a source with a positive score, best first. Ties keep
    /// layout order.
    pub fn ranked_dests(&self, source: &str) -> Vec<(&str, f64)> {
        let Some(r) = self.source_index(source) else {
            return Vec::new();
        };
        let mut ranked: Vec<(&str, f64)> = self
            .matrix
            .row(r)
            .iter()
            .enumerate()
            .filter(|(_, s)| **s > 0.0)
            .filter_map(|(c, s)| self.dest_name(c).map(|d| (d, *s)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Highest-scoring destination for a source, if any scores above zero.
    pub fn best_dest(&self, source: &str) -> Option<(&str, f64)> {
        self.ranked_dests(source).into_iter().next()
    }
}

fn unique_by_name<'a>(entities: &'a [Entity], side: &str) -> Vec<&'a Entity> {
    let mut seen: IndexSet<&str> = IndexSet::with_capacity(entities.len());
    let mut unique = Vec::with_capacity(entities.len());
    for entity in entities {
        if seen.insert(entity.name()) {
            unique.push(entity);
        } else {
            tracing::warn!(side, name = entity.name(), "duplicate entity name ignored");
        }
    }
    unique
}

// ── Explanations ────────────────────────────────────────────────────

/// Confidence tier of a score, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Confidence {
    Unlikely,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Confidence::High
        } else if score >= 0.55 {
            Confidence::Medium
        } else if score >= 0.35 {
            Confidence::Low
        } else {
            Confidence::Unlikely
        }
    }
}

/// How much one factor contributed to a pair's score.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct FactorContribution {
    pub factor: ScoreFactor,
    pub raw: f64,
    pub weight: f64,
    pub weighted: f64,
}

/// Human-readable account of one pair's score.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ScoreBreakdown {
    pub source: String,
    pub dest: String,
    pub score: f64,
    pub confidence: Confidence,
    pub factors: Vec<FactorContribution>,
    pub reason: String,
}

/// Breakdown of one pair, or `None` when their buckets differ.
pub fn explain(source: &Entity, dest: &Entity) -> Option<ScoreBreakdown> {
    let f = factor_scores(source, dest)?;
    let w = f.weights();
    let mut factors = vec![
        FactorContribution {
            factor: ScoreFactor::Name,
            raw: f.name,
            weight: w.name,
            weighted: f.name * w.name,
        },
        FactorContribution {
            factor: ScoreFactor::Nodes,
            raw: f.nodes,
            weight: w.nodes,
            weighted: f.nodes * w.nodes,
        },
    ];
    if f.grouped {
        factors.push(FactorContribution {
            factor: ScoreFactor::Members,
            raw: f.members,
            weight: w.members,
            weighted: f.members * w.members,
        });
    }
    factors.push(FactorContribution {
        factor: ScoreFactor::Type,
        raw: f.type_fit,
        weight: w.type_fit,
        weighted: f.type_fit * w.type_fit,
    });

    let total = f.total();
    Some(ScoreBreakdown {
        source: source.name().to_string(),
        dest: dest.name().to_string(),
        score: total,
        confidence: Confidence::from_score(total),
        factors,
        reason: reason_text(&f, source.node_count(), dest.node_count()),
    })
}

/// Breakdowns for every pair scoring at or above `floor`, best first per source.
pub fn explain_all(sources: &[Entity], dests: &[Entity], floor: f64) -> Vec<ScoreBreakdown> {
    let mut out = Vec::new();
    for source in sources {
        let mut rows: Vec<ScoreBreakdown> = dests
            .iter()
            .filter_map(|dest| explain(source, dest))
            .filter(|b| b.score > 0.0 && b.score >= floor)
            .collect();
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        out.extend(rows);
    }
    out
}

fn reason_text(f: &FactorScores, source_nodes: u32, dest_nodes: u32) -> String {
    let mut parts: Vec<String> = Vec::new();
    if f.name >= 0.999 {
        parts.push("Name match".into());
    } else if f.alias {
        parts.push("Alias match".into());
    } else if f.name >= 0.5 {
        parts.push("Fuzzy name match".into());
    }
    if f.grouped && f.members >= 0.5 {
        parts.push("Shared members".into());
    } else if f.grouped && f.members > 0.0 {
        parts.push("Some shared members".into());
    }
    if source_nodes > 0 && dest_nodes > 0 {
        if source_nodes == dest_nodes {
            parts.push("Same node count".into());
        } else if f.nodes >= 0.8 {
            parts.push("Similar node count".into());
        } else {
            parts.push(format!("Node count differs ({source_nodes} vs {dest_nodes})"));
        }
    }
    if f.type_fit >= 1.0 {
        parts.push("Same type".into());
    }
    if parts.is_empty() {
        parts.push("Best available match".into());
    }
    parts.join(" · ")
}
