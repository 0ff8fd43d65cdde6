//! Payload shaping utilities.
//!
//! This crate turns in-memory data into plain, encodable payloads. It provides
//! two independent transforms:
//!
//! - [`DictCleaner`] recursively prunes empty values (`null`, `""`, `[]`) from
//!   a JSON mapping and enforces required/optional field policies.
//! - [`ObjectSerializer`] walks an [`ObjectGraph`] and emits nested JSON
//!   mappings, skipping excluded attributes, applying declarative
//!   transformation [`Rule`]s and collapsing revisited nodes to `null`.
//!
//! Both are pure and synchronous; callers compose them as they see fit.

use thiserror::Error;

// Module declarations
pub mod cleaner;
pub mod config;
pub mod graph;
pub mod path;
pub mod rules;
pub mod serializer;

// Re-export key types
pub use cleaner::{is_empty, CleanOptions, DictCleaner, FieldPolicy};
pub use config::ShapingConfig;
pub use graph::{Attr, Introspect, NodeId, Object, ObjectGraph, Scalar};
pub use path::KeyPath;
pub use rules::{Predicate, Rule, RuleSet, Transform};
pub use serializer::{ObjectSerializer, VisitedSet, BOOKKEEPING_FIELD};

/// Default bound on traversal depth for both the cleaner and the serializer.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Errors emitted while shaping payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A required field is missing, or empty after cleaning, in strict mode.
    #[error("Required field '{path}' is missing or empty")]
    RequiredFieldEmpty { path: String },

    /// A transformation rule is malformed or cannot be evaluated.
    #[error("Invalid rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    /// Input nesting is deeper than the configured limit.
    #[error("Maximum shaping depth of {limit} exceeded at '{path}'")]
    MaxDepthExceeded { path: String, limit: usize },

    /// A node reference points outside the graph.
    #[error("Unknown node: {id}")]
    UnknownNode { id: NodeId },
}

/// Cleans `data` with an explicit field policy.
///
/// Passing `required: None` marks every key not listed in `optional` as
/// required. Passing `Some(&[])` marks every key optional. When `required` is
/// given, `optional` is ignored.
///
/// # Example
/// ```
/// use payload_shape::clean_dict;
/// use serde_json::json;
///
/// let data = json!({"name": "Alice", "email": ""});
/// let cleaned = clean_dict(data.as_object().unwrap(), None, None, false, true).unwrap();
/// assert_eq!(serde_json::Value::Object(cleaned), json!({"name": "Alice"}));
/// ```
pub fn clean_dict(
    data: &serde_json::Map<String, serde_json::Value>,
    required: Option<&[&str]>,
    optional: Option<&[&str]>,
    strict: bool,
    recurse: bool,
) -> Result<serde_json::Map<String, serde_json::Value>, ShapeError> {
    let mut policy = FieldPolicy::default();
    if let Some(required) = required {
        policy = policy.with_required(required.iter().copied());
    }
    if let Some(optional) = optional {
        policy = policy.with_optional(optional.iter().copied());
    }

    DictCleaner::new()
        .with_policy(policy)
        .strict(strict)
        .recurse(recurse)
        .clean(data)
}

/// Serializes the node `root` of `graph` with a fresh visited set.
pub fn object_to_value(
    graph: &ObjectGraph,
    root: NodeId,
    excluded: &[&str],
    rules: Vec<Rule>,
) -> Result<serde_json::Value, ShapeError> {
    ObjectSerializer::new(graph)
        .exclude(excluded.iter().copied())
        .with_rules(RuleSet::new(rules)?)
        .serialize(root)
}

/// Serializes every node in `roots`, each with its own visited set.
pub fn object_list_to_values(
    graph: &ObjectGraph,
    roots: &[NodeId],
    excluded: &[&str],
    rules: Vec<Rule>,
) -> Result<Vec<serde_json::Value>, ShapeError> {
    ObjectSerializer::new(graph)
        .exclude(excluded.iter().copied())
        .with_rules(RuleSet::new(rules)?)
        .serialize_all(roots)
}
