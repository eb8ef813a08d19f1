use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::leaf::LeafValue;

/// A nested mapping of field names to nodes.
pub type Group = BTreeMap<String, Node>;

/// One position in a record tree: either a terminal leaf or a nested group.
///
/// Deserialization is shape-driven: a JSON object whose only keys are
/// `value` (and optionally `unit`) is a leaf; any other object is a group.
/// This is the typed form of the "has a `value` attribute" probe used by
/// the keyword navigator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(LeafValue),
    Group(Group),
}

impl Node {
    pub fn leaf(leaf: LeafValue) -> Self {
        Self::Leaf(leaf)
    }

    pub fn group() -> Self {
        Self::Group(Group::new())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafValue> {
        match self {
            Self::Leaf(l) => Some(l),
            Self::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::Leaf(_) => None,
        }
    }
}

impl From<LeafValue> for Node {
    fn from(leaf: LeafValue) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}
