//! xLights `.xmap` export.
//!
//! The file is plain text: `false`, the number of destination models, one
//! destination model name per line, then one tab-separated row per mapping.

use std::path::Path;

use indexmap::IndexSet;
use serde::Serialize;
use ts_rs::TS;

use crate::error::AppError;
use crate::mapping::MappingState;
use crate::model::Entity;

const ROW_COLOR: &str = "white";

/// One mapping row. `dest`/`sub_element` address the user's layout,
/// `source` the sequence element whose effects are copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct XmapRow {
    pub dest: String,
    pub sub_element: String,
    pub placeholder: String,
    pub source: String,
    pub color: String,
}

impl XmapRow {
    fn new(dest: &str, source: &str) -> Self {
        let (model, sub) = dest.split_once('/').unwrap_or((dest, ""));
        Self {
            dest: model.to_string(),
            sub_element: sub.to_string(),
            placeholder: String::new(),
            source: source.to_string(),
            color: ROW_COLOR.to_string(),
        }
    }

    fn to_line(&self) -> String {
        [
            self.dest.as_str(),
            self.sub_element.as_str(),
            self.placeholder.as_str(),
            self.source.as_str(),
            self.color.as_str(),
        ]
        .join("\t")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct MappingExport {
    /// Distinct destination models in first-use order.
    pub dest_models: Vec<String>,
    pub rows: Vec<XmapRow>,
    pub skipped: Vec<String>,
    /// Sources left without a destination and not skipped.
    pub unmapped: Vec<String>,
}

/// Collect export rows in source layout order. With `only_with_effects`,
/// sources that carry no effects are left out; their rows would only show as
/// empty in xLights.
pub fn build_export(state: &MappingState, sources: &[Entity], only_with_effects: bool) -> MappingExport {
    let mut dest_models = IndexSet::new();
    let mut export = MappingExport::default();
    let mut seen = IndexSet::new();
    for source in sources {
        if !seen.insert(source.name()) {
            continue;
        }
        if state.is_skipped(source.name()) {
            export.skipped.push(source.name().to_string());
            continue;
        }
        let Some(dest) = state.dest_of(source.name()) else {
            export.unmapped.push(source.name().to_string());
            continue;
        };
        if only_with_effects && source.effect_count() == 0 {
            continue;
        }
        let row = XmapRow::new(dest, source.name());
        dest_models.insert(row.dest.clone());
        export.rows.push(row);
    }
    export.dest_models = dest_models.into_iter().collect();
    export
}

pub fn to_xmap_string(export: &MappingExport) -> String {
    let mut lines = Vec::with_capacity(export.dest_models.len() + export.rows.len() + 3);
    lines.push("false".to_string());
    lines.push(export.dest_models.len().to_string());
    lines.extend(export.dest_models.iter().cloned());
    lines.extend(export.rows.iter().map(XmapRow::to_line));
    lines.push(String::new());
    lines.join("\n")
}

pub fn write_xmap(path: &Path, export: &MappingExport) -> Result<(), AppError> {
    crate::persist::atomic_write(path, to_xmap_string(export).as_bytes())?;
    tracing::info!(path = %path.display(), rows = export.rows.len(), "xmap written");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::progress::ignore_progress;
    use crate::scoring::ScoreTable;

    fn state_for(sources: &[Entity], dests: &[Entity]) -> MappingState {
        MappingState::new(Arc::new(ScoreTable::build(sources, dests, &mut ignore_progress)))
    }

    #[test]
    fn rows_split_submodel_destinations() {
        let sources = vec![
            Entity::model("Showstopper Spinner/Ring 1", 40).with_effects(3),
            Entity::model("Arch 1", 50).with_effects(2),
            Entity::model("Arch 2", 50).with_effects(2),
            Entity::model("Fog", 1),
        ];
        let dests = vec![
            Entity::model("My Spinner/Outer Ring", 40),
            Entity::model("Arch 1", 50),
        ];
        let mut state = state_for(&sources, &dests);
        state.assign("Showstopper Spinner/Ring 1", "My Spinner/Outer Ring");
        state.assign("Arch 1", "Arch 1");
        state.skip("Fog");

        let export = build_export(&state, &sources, false);
        assert_eq!(export.dest_models, vec!["My Spinner", "Arch 1"]);
        assert_eq!(export.rows[0].sub_element, "Outer Ring");
        assert_eq!(export.skipped, vec!["Fog"]);
        assert_eq!(export.unmapped, vec!["Arch 2"]);

        let text = to_xmap_string(&export);
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines[0], "false");
        assert_eq!(lines[1], "2");
        assert_eq!(lines[2], "My Spinner");
        assert_eq!(lines[4], "My Spinner\tOuter Ring\t\tShowstopper Spinner/Ring 1\twhite");
        assert_eq!(lines[5], "Arch 1\t\t\tArch 1\twhite");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn effectless_sources_can_be_left_out() {
        let sources = vec![Entity::model("Arch 1", 50), Entity::model("Arch 2", 50).with_effects(1)];
        let dests = vec![Entity::model("Arch 1", 50), Entity::model("Arch 2", 50)];
        let mut state = state_for(&sources, &dests);
        state.assign("Arch 1", "Arch 1");
        state.assign("Arch 2", "Arch 2");

        let export = build_export(&state, &sources, true);
        assert_eq!(export.rows.len(), 1);
        assert_eq!(export.rows[0].source, "Arch 2");
    }

    #[test]
    fn empty_mapping_still_has_header() {
        let export = MappingExport::default();
        assert_eq!(to_xmap_string(&export), "false\n0\n");
    }
}
