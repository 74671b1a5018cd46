//! Entity classification from the literal shape of names.
//!
//! Member references are never resolved against the layout: a member that
//! points at a missing or self-referencing node is classified by its name
//! alone, so classification is total.

use crate::model::EntityType;

const SUBMODEL_SEPARATOR: char = '/';
const GROUP_SUFFIX: &str = " grp";

/// Minimum share of submodel members for a mixed group to still count as a
/// submodel group.
const SUBMODEL_MAJORITY: f64 = 0.5;
/// Most distinct parent models a majority-submodel group may reference.
const MAX_SPINNER_PARENTS: usize = 2;

/// What a member name refers to, judged from the name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Model,
    Submodel,
    Group,
}

pub fn member_kind(name: &str) -> MemberKind {
    if name.contains(SUBMODEL_SEPARATOR) {
        MemberKind::Submodel
    } else if is_group_name(name) {
        MemberKind::Group
    } else {
        MemberKind::Model
    }
}

/// True when the name ends with ` GRP` in any case.
pub fn is_group_name(name: &str) -> bool {
    let len = name.len();
    len >= GROUP_SUFFIX.len()
        && name
            .get(len - GROUP_SUFFIX.len()..)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(GROUP_SUFFIX))
}

/// Parent model of a submodel reference (`"Spinner/Arm 1"` → `"Spinner"`).
pub fn submodel_parent(name: &str) -> Option<&str> {
    name.split_once(SUBMODEL_SEPARATOR).map(|(parent, _)| parent)
}

/// Non-group entities: SUBMODEL when the name holds a path separator.
pub fn classify_leaf(name: &str) -> EntityType {
    if name.contains(SUBMODEL_SEPARATOR) {
        EntityType::Submodel
    } else {
        EntityType::Model
    }
}

pub fn classify_group<S: AsRef<str>>(members: &[S]) -> EntityType {
    if members.is_empty() {
        return EntityType::ModelGroup;
    }

    let mut models = 0usize;
    let mut submodels = 0usize;
    let mut groups = 0usize;
    for member in members {
        match member_kind(member.as_ref()) {
            MemberKind::Model => models += 1,
            MemberKind::Submodel => submodels += 1,
            MemberKind::Group => groups += 1,
        }
    }
    let total = members.len();

    if submodels == total {
        return EntityType::SubmodelGroup;
    }
    if groups == total {
        return EntityType::MetaGroup;
    }
    if models == total {
        return EntityType::ModelGroup;
    }

    #[allow(clippy::cast_precision_loss)]
    let submodel_share = submodels as f64 / total as f64;
    if submodel_share >= SUBMODEL_MAJORITY && parent_models(members).len() <= MAX_SPINNER_PARENTS {
        return EntityType::SubmodelGroup;
    }
    EntityType::MixedGroup
}

/// Distinct parents of the submodel members, in first-seen order.
pub fn parent_models<S: AsRef<str>>(members: &[S]) -> Vec<&str> {
    let mut parents: Vec<&str> = Vec::new();
    for parent in members.iter().filter_map(|m| submodel_parent(m.as_ref())) {
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }
    parents
}
