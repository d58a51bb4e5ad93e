//! Data model shared by every pipeline stage.
//!
//! ## Field shapes
//!
//! The extraction engine gives no schema: the same field name may show up as
//! a bare value in one place and as a parent with children in another, and
//! the same key may arrive from several chunks. [`FieldValue`] makes every
//! shape a field can take explicit:
//!
//! ```text
//! Scalar("1,000")                       a single mention
//! Group { "Total-Assets": Scalar, … }   a parent and its children
//! Sequence [ Scalar, Group, … ]         one key reported by several chunks
//! ```
//!
//! Transitions only ever widen a value:
//!
//! * `Scalar → Group`: a parent with children claims the slot
//!   ([`crate::pipeline::normalize`]).
//! * `Scalar → Group { "value": Scalar }`: a scalar collides with a later
//!   parent of the same name and is kept under `"value"`.
//! * `any → Sequence`: chunks disagree on a key's shape
//!   ([`crate::pipeline::merge`]).
//!
//! Nothing ever narrows a Group back into a Scalar.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Child mapping of a [`FieldValue::Group`], in first-appearance order.
pub type FieldGroup = IndexMap<String, FieldValue>;

/// Document-level (or chunk-level) record: top-level field name → value.
pub type ExtractedRecord = IndexMap<String, FieldValue>;

/// Key under which a promoted scalar is kept inside a group.
pub const VALUE_KEY: &str = "value";

/// One node returned by the extraction engine.
///
/// Immutable once returned and scoped to the chunk that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEntity {
    /// Field name, e.g. `"Assets"` or `"Total-Assets"`.
    pub entity_type: String,
    /// The mention text exactly as the engine read it.
    pub text: String,
    /// Nested child entities, in engine order.
    pub children: Vec<RawEntity>,
}

impl RawEntity {
    /// A leaf entity.
    pub fn leaf(entity_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    /// A parent entity with children.
    pub fn parent(
        entity_type: impl Into<String>,
        text: impl Into<String>,
        children: Vec<RawEntity>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            text: text.into(),
            children,
        }
    }

    /// Number of entities in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(RawEntity::subtree_len).sum::<usize>()
    }
}

/// A field after normalization or merge.
///
/// Serialised untagged so the JSON artifact reads as plain JSON: strings,
/// objects and arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    Group(FieldGroup),
    Sequence(Vec<FieldValue>),
}

impl FieldValue {
    pub fn scalar(text: impl Into<String>) -> Self {
        FieldValue::Scalar(text.into())
    }

    pub fn empty_group() -> Self {
        FieldValue::Group(FieldGroup::new())
    }

    /// `{"value": <scalar>}`, the promoted form of a scalar.
    pub fn wrapped(text: String) -> Self {
        let mut group = FieldGroup::new();
        group.insert(VALUE_KEY.to_string(), FieldValue::Scalar(text));
        FieldValue::Group(group)
    }

    pub fn is_group(&self) -> bool {
        matches!(self, FieldValue::Group(_))
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&FieldGroup> {
        match self {
            FieldValue::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Look up a child field.
    ///
    /// A group answers directly; a sequence answers with the first group
    /// element that holds the child. Scalars have no children.
    pub fn child(&self, name: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Group(g) => g.get(name),
            FieldValue::Sequence(items) => items.iter().find_map(|item| item.as_group()?.get(name)),
            FieldValue::Scalar(_) => None,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Group(_) => "group",
            FieldValue::Sequence(_) => "sequence",
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Scalar(s) => write!(f, "{s}"),
            other => write!(f, "<{}>", other.shape()),
        }
    }
}

/// Look up `parent.child` in a record.
pub fn lookup<'a>(record: &'a ExtractedRecord, parent: &str, child: &str) -> Option<&'a FieldValue> {
    record.get(parent)?.child(child)
}
