use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::classify;

// ── Taxonomy ────────────────────────────────────────────────────────

/// What kind of layout node an entity is. Decided once when the entity is
/// built and never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum EntityType {
    Model,
    Submodel,
    ModelGroup,
    SubmodelGroup,
    MetaGroup,
    MixedGroup,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Model,
        EntityType::Submodel,
        EntityType::ModelGroup,
        EntityType::SubmodelGroup,
        EntityType::MetaGroup,
        EntityType::MixedGroup,
    ];

    pub const fn is_group(self) -> bool {
        !matches!(self, EntityType::Model | EntityType::Submodel)
    }

    /// Coarse bucket used to gate scoring and route entities to phases.
    pub const fn phase_bucket(self) -> PhaseBucket {
        match self {
            EntityType::Model | EntityType::Submodel => PhaseBucket::Model,
            EntityType::ModelGroup | EntityType::MetaGroup | EntityType::MixedGroup => {
                PhaseBucket::Group
            }
            EntityType::SubmodelGroup => PhaseBucket::Spinner,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EntityType::Model => "Model",
            EntityType::Submodel => "Submodel",
            EntityType::ModelGroup => "Model group",
            EntityType::SubmodelGroup => "Submodel group",
            EntityType::MetaGroup => "Group of groups",
            EntityType::MixedGroup => "Mixed group",
        }
    }
}

/// Three-way bucket derived from [`EntityType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum PhaseBucket {
    Model,
    Group,
    Spinner,
}

// ── Input record ────────────────────────────────────────────────────

/// One layout node as handed over by a layout loader, before classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ParsedEntity {
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub member_names: Vec<String>,
    #[serde(default)]
    pub node_count: u32,
    /// Effects authored against this node. Only meaningful on the source side.
    #[serde(default)]
    pub effect_count: u32,
    /// Effect count per effect type name ("Bars", "Video", ...).
    #[serde(default)]
    pub effect_types: BTreeMap<String, u32>,
    /// Alternate names the layout declares for this node.
    #[serde(default)]
    pub aliases: Vec<String>,
}

// ── Entity ──────────────────────────────────────────────────────────

/// A model, submodel or group from either layout.
///
/// The type is computed from the member list at construction, so the two can
/// never disagree. Build through [`Entity::from_parsed`], [`Entity::model`] or
/// [`Entity::group`].
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct Entity {
    name: String,
    entity_type: EntityType,
    node_count: u32,
    member_names: Vec<String>,
    effect_count: u32,
    effect_types: BTreeMap<String, u32>,
    aliases: Vec<String>,
}

impl From<ParsedEntity> for Entity {
    fn from(parsed: ParsedEntity) -> Self {
        Entity::from_parsed(parsed)
    }
}

impl Entity {
    pub fn from_parsed(parsed: ParsedEntity) -> Self {
        let entity_type = if parsed.is_group {
            classify::classify_group(&parsed.member_names)
        } else {
            classify::classify_leaf(&parsed.name)
        };
        // Non-groups never carry members.
        let member_names = if parsed.is_group {
            parsed.member_names
        } else {
            Vec::new()
        };
        Self {
            name: parsed.name,
            entity_type,
            node_count: parsed.node_count,
            member_names,
            effect_count: parsed.effect_count,
            effect_types: parsed.effect_types,
            aliases: parsed.aliases,
        }
    }

    /// A model or submodel (submodel when the name holds a `/`).
    pub fn model(name: impl Into<String>, node_count: u32) -> Self {
        Self::from_parsed(ParsedEntity {
            name: name.into(),
            node_count,
            ..ParsedEntity::default()
        })
    }

    pub fn group<S: Into<String>>(name: impl Into<String>, members: impl IntoIterator<Item = S>) -> Self {
        Self::from_parsed(ParsedEntity {
            name: name.into(),
            is_group: true,
            member_names: members.into_iter().map(Into::into).collect(),
            ..ParsedEntity::default()
        })
    }

    pub fn with_effects(mut self, effect_count: u32) -> Self {
        self.effect_count = effect_count;
        self
    }

    pub fn with_effect_types(mut self, effect_types: BTreeMap<String, u32>) -> Self {
        self.effect_count = self.effect_count.max(effect_types.values().sum());
        self.effect_types = effect_types;
        self
    }

    pub fn with_node_count(mut self, node_count: u32) -> Self {
        self.node_count = node_count;
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn phase_bucket(&self) -> PhaseBucket {
        self.entity_type.phase_bucket()
    }

    pub fn is_group(&self) -> bool {
        self.entity_type.is_group()
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn member_names(&self) -> &[String] {
        &self.member_names
    }

    pub fn effect_count(&self) -> u32 {
        self.effect_count
    }

    pub fn effect_types(&self) -> &BTreeMap<String, u32> {
        &self.effect_types
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Distinct parent models referenced by submodel members, in first-seen order.
    pub fn parent_models(&self) -> Vec<&str> {
        classify::parent_models(&self.member_names)
    }
}
