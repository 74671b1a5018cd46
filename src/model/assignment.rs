use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How an assignment came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum AssignMethod {
    /// Seeded from the solver at or above the auto-accept threshold.
    Auto,
    /// Chosen by the user.
    Manual,
    /// Applied from an accepted bulk family suggestion.
    Bulk,
}

/// One active source → destination pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Assignment {
    pub source: String,
    pub dest: String,
    pub score: f64,
    pub method: AssignMethod,
}

/// A source that did not get its best-scoring destination because another
/// source holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SacrificeInfo {
    pub source: String,
    /// Where the source ended up, if anywhere.
    pub assigned_to: Option<String>,
    pub assigned_score: f64,
    pub best_match: String,
    pub best_score: f64,
    /// The source currently holding `best_match`.
    pub best_went_to: String,
    pub score_difference: f64,
}
