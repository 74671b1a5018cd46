use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{attr, attributes, LayoutError};
use crate::model::ParsedEntity;

/// Submodels list at most this many `lineN` range attributes.
const MAX_RANGE_LINES: usize = 20;

pub fn load_layout(path: &Path) -> Result<Vec<ParsedEntity>, LayoutError> {
    let data = std::fs::read(path)?;
    let entities = parse_layout(&data)?;
    tracing::info!(path = %path.display(), entities = entities.len(), "layout loaded");
    Ok(entities)
}

#[derive(Default)]
struct ModelBuilder {
    name: String,
    node_count: u32,
    aliases: Vec<String>,
    submodels: Vec<ParsedEntity>,
    is_group: bool,
    members: Vec<String>,
}

impl ModelBuilder {
    fn model(attrs: &[(String, String)]) -> Self {
        Self {
            name: attr(attrs, "name").unwrap_or_default().to_string(),
            node_count: model_node_count(attrs),
            ..Self::default()
        }
    }

    fn group(attrs: &[(String, String)]) -> Self {
        let members = attr(attrs, "models")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(ToString::to_string)
            .collect();
        Self {
            name: attr(attrs, "name").unwrap_or_default().to_string(),
            is_group: true,
            members,
            ..Self::default()
        }
    }

    fn add_submodel(&mut self, attrs: &[(String, String)]) {
        let Some(sub) = attr(attrs, "name").filter(|n| !n.is_empty()) else {
            return;
        };
        let ranges: Vec<&str> = (0..MAX_RANGE_LINES)
            .map_while(|i| attr(attrs, &format!("line{i}")))
            .collect();
        self.submodels.push(ParsedEntity {
            name: format!("{}/{sub}", self.name),
            node_count: range_node_count(&ranges.join(",")),
            ..ParsedEntity::default()
        });
    }

    fn finish(self, out: &mut Vec<ParsedEntity>) {
        if self.name.is_empty() {
            return;
        }
        out.push(ParsedEntity {
            name: self.name,
            is_group: self.is_group,
            member_names: self.members,
            node_count: self.node_count,
            aliases: self.aliases,
            ..ParsedEntity::default()
        });
        out.extend(self.submodels);
    }
}

/// Parse an `xlights_rgbeffects.xml` document into models, their submodels
/// (as `Model/Sub`) and model groups, in document order.
pub fn parse_layout(data: &[u8]) -> Result<Vec<ParsedEntity>, LayoutError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(8192);
    let mut entities = Vec::new();
    let mut current: Option<ModelBuilder> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                saw_root = true;
                let attrs = attributes(e);
                match e.name().as_ref() {
                    b"model" if current.is_none() => current = Some(ModelBuilder::model(&attrs)),
                    b"modelGroup" if current.is_none() => current = Some(ModelBuilder::group(&attrs)),
                    b"subModel" => {
                        if let Some(model) = current.as_mut().filter(|m| !m.is_group) {
                            model.add_submodel(&attrs);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                saw_root = true;
                let attrs = attributes(e);
                match e.name().as_ref() {
                    b"model" if current.is_none() => ModelBuilder::model(&attrs).finish(&mut entities),
                    b"modelGroup" if current.is_none() => ModelBuilder::group(&attrs).finish(&mut entities),
                    b"subModel" => {
                        if let Some(model) = current.as_mut().filter(|m| !m.is_group) {
                            model.add_submodel(&attrs);
                        }
                    }
                    b"alias" => {
                        if let (Some(model), Some(alias)) = (current.as_mut(), attr(&attrs, "name")) {
                            if !alias.is_empty() {
                                model.aliases.push(alias.to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if matches!(e.name().as_ref(), b"model" | b"modelGroup") {
                    if let Some(model) = current.take() {
                        model.finish(&mut entities);
                    }
                }
            }
            Err(e) => return Err(LayoutError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(LayoutError::Parse("document has no elements".into()));
    }
    Ok(entities)
}

fn int_attr(attrs: &[(String, String)], key: &str) -> u32 {
    attr(attrs, key).and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Node count from `PixelCount` when set, otherwise from the per-shape
/// meaning of `parm1..parm3`.
fn model_node_count(attrs: &[(String, String)]) -> u32 {
    let explicit = int_attr(attrs, "PixelCount");
    if explicit > 0 {
        return explicit;
    }
    let (p1, p2, p3) = (
        int_attr(attrs, "parm1"),
        int_attr(attrs, "parm2"),
        int_attr(attrs, "parm3"),
    );
    let display_as = attr(attrs, "DisplayAs").unwrap_or("Custom").to_lowercase();
    match display_as.as_str() {
        "arches" => p1.saturating_mul(p2).saturating_mul(p3.max(1)),
        "single line" | "poly line" | "circle" | "wreaths" | "icicles" => p2,
        "matrix" | "vert matrix" => p2.saturating_mul(p3),
        "window frame" => p1.saturating_add(p2.saturating_mul(2)).saturating_add(p3),
        "custom" => match attr(attrs, "CustomModel") {
            Some(grid) => {
                let cells = grid.split([';', ',']).filter(|c| !c.trim().is_empty()).count();
                u32::try_from(cells).unwrap_or(u32::MAX)
            }
            None => p1.saturating_mul(p2),
        },
        "tree 360" | "tree flat" | "star" | "spinner" | "candy cane" | "candy canes" => p1.saturating_mul(p2),
        _ => p1.saturating_mul(p2).max(p1).max(p2),
    }
}

/// Count the nodes addressed by range text like `1-20,25-40,50`.
fn range_node_count(ranges: &str) -> u32 {
    ranges
        .split(',')
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .map(|seg| match seg.split_once('-') {
            Some((start, end)) => match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
                (Ok(a), Ok(b)) => a.abs_diff(b) + 1,
                _ => 0,
            },
            None => u32::from(seg.parse::<u32>().is_ok()),
        })
        .fold(0u32, u32::saturating_add)
}
