use serde::Serialize;
use ts_rs::TS;

/// Progress of a long-running computation, reported to whoever started it.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ProgressEvent {
    pub operation: String,
    pub phase: String,
    pub progress: f64,
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn new(op: &str, phase: &str, progress: f64, detail: Option<&str>) -> Self {
        Self {
            operation: op.to_string(),
            phase: phase.to_string(),
            progress: progress.clamp(0.0, 1.0),
            detail: detail.map(ToString::to_string),
        }
    }
}

/// Callback receiving progress events. `&mut` so callers can collect.
pub type ProgressFn<'a> = &'a mut dyn FnMut(ProgressEvent);

/// A sink that drops every event.
pub fn ignore_progress(_: ProgressEvent) {}
