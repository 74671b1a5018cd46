use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{attr, attributes, LayoutError};
use crate::model::ParsedEntity;

/// Utility entries in a sequence that are never mappable props.
const EXCLUDED_PREFIXES: [&str; 3] = ["FOLDER -", "Pixel2DMX", "Fog Machine"];

/// Effects authored directly on one sequence element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementEffects {
    pub effect_count: u32,
    pub effect_types: BTreeMap<String, u32>,
}

/// Per-element effect tallies of one `.xsq`, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceEffects {
    pub elements: IndexMap<String, ElementEffects>,
}

impl SequenceEffects {
    pub fn get(&self, name: &str) -> Option<&ElementEffects> {
        self.elements.get(name)
    }

    pub fn total_effects(&self) -> u64 {
        self.elements.values().map(|e| u64::from(e.effect_count)).sum()
    }

    /// Names of elements carrying at least one effect.
    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .filter(|(_, e)| e.effect_count > 0)
            .map(|(name, _)| name.as_str())
    }
}

pub fn load_sequence(path: &Path) -> Result<SequenceEffects, LayoutError> {
    let data = std::fs::read(path)?;
    let effects = parse_sequence(&data)?;
    tracing::info!(
        path = %path.display(),
        elements = effects.elements.len(),
        effects = effects.total_effects(),
        "sequence loaded"
    );
    Ok(effects)
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Where effects read right now are credited.
enum Frame {
    /// A model element (or submodel layer); `None` when excluded or not a model.
    Target(Option<String>),
    /// Any other open tag.
    Other,
}

/// Parse the `<ElementEffects>` section of an `.xsq` sequence. Effects are
/// counted per element from its direct `<EffectLayer>` children; submodel
/// layers are credited to `Model/Sub`. Nested model elements count on their own.
pub fn parse_sequence(data: &[u8]) -> Result<SequenceEffects, LayoutError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(8192);
    let mut out = SequenceEffects::default();
    let mut in_element_effects = false;
    let mut stack: Vec<Frame> = Vec::new();
    // Open EffectLayer tags; element tags inside a layer are effect payload.
    let mut layer_depth = 0u32;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) => {
                let frame = match e.name().as_ref() {
                    b"ElementEffects" => {
                        in_element_effects = true;
                        Frame::Other
                    }
                    b"Element" | b"SubModelEffectLayer" if in_element_effects && layer_depth == 0 => {
                        let target = frame_target(e, &stack);
                        if let Some(name) = &target {
                            out.elements.entry(name.clone()).or_default();
                        }
                        Frame::Target(target)
                    }
                    b"EffectLayer" if in_element_effects => {
                        layer_depth += 1;
                        Frame::Other
                    }
                    b"Effect" if in_element_effects && layer_depth > 0 => {
                        if let Some(Frame::Target(Some(name))) = owner(&stack) {
                            record_effect(&mut out, name, e);
                        }
                        Frame::Other
                    }
                    _ => Frame::Other,
                };
                stack.push(frame);
            }
            Ok(Event::Empty(ref e)) => {
                if in_element_effects && layer_depth > 0 && e.name().as_ref() == b"Effect" {
                    if let Some(Frame::Target(Some(name))) = owner(&stack) {
                        record_effect(&mut out, name, e);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"ElementEffects" => in_element_effects = false,
                    b"EffectLayer" if layer_depth > 0 => layer_depth -= 1,
                    _ => {}
                }
                stack.pop();
            }
            Err(e) => return Err(LayoutError::Xml(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// The innermost element frame, skipping layer and effect tags.
fn owner(stack: &[Frame]) -> Option<&Frame> {
    stack.iter().rev().find(|f| matches!(f, Frame::Target(_)))
}

fn frame_target(e: &BytesStart<'_>, stack: &[Frame]) -> Option<String> {
    let attrs = attributes(e);
    let name = attr(&attrs, "name").filter(|n| !n.is_empty())?;
    if e.name().as_ref() == b"SubModelEffectLayer" {
        let Some(Frame::Target(Some(parent))) = owner(stack) else {
            return None;
        };
        return Some(format!("{parent}/{name}"));
    }
    if attr(&attrs, "type") != Some("model") || is_excluded(name) {
        return None;
    }
    Some(name.to_string())
}

fn record_effect(out: &mut SequenceEffects, element: &str, e: &BytesStart<'_>) {
    let attrs = attributes(e);
    let effect_type = attr(&attrs, "name")
        .or_else(|| attr(&attrs, "ref").and_then(|r| r.split(',').next()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string);
    let entry = out.elements.entry(element.to_string()).or_default();
    entry.effect_count = entry.effect_count.saturating_add(1);
    if let Some(effect_type) = effect_type {
        *entry.effect_types.entry(effect_type).or_default() += 1;
    }
}

/// Copy sequence tallies onto layout entities by exact name. Entities the
/// sequence never mentions end up with zero effects.
pub fn apply_sequence(entities: &mut [ParsedEntity], sequence: &SequenceEffects) {
    for entity in entities.iter_mut() {
        match sequence.get(&entity.name) {
            Some(effects) => {
                entity.effect_count = effects.effect_count;
                entity.effect_types = effects.effect_types.clone();
            }
            None => {
                entity.effect_count = 0;
                entity.effect_types.clear();
            }
        }
    }
}
