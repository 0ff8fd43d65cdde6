use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{path::KeyPath, ShapeError, DEFAULT_MAX_DEPTH};

/// Returns true for `null`, `""` and `[]`.
///
/// `0`, `false` and `{}` are not empty. A mapping only counts as empty once
/// cleaning has removed all of its children.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Partition of a mapping's keys into required and optional.
///
/// Resolution rules:
/// - no `required` set: every key not listed in `optional` is required;
/// - an empty `required` set: every key is optional;
/// - a key not in an explicit `required` set is optional, and `optional` is
///   ignored entirely.
///
/// Supplying only `optional` therefore inverts the policy. Existing callers
/// rely on this precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    required: Option<HashSet<String>>,
    optional: Option<HashSet<String>>,
}

impl FieldPolicy {
    /// Every key is required.
    pub fn all_required() -> Self {
        Self::default()
    }

    /// Every key is optional.
    pub fn all_optional() -> Self {
        Self {
            required: Some(HashSet::new()),
            optional: None,
        }
    }

    pub fn with_required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_optional<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_required(&self, key: &str) -> bool {
        match &self.required {
            Some(required) => required.contains(key),
            None => !self
                .optional
                .as_ref()
                .is_some_and(|optional| optional.contains(key)),
        }
    }

    /// First explicitly required key (in sorted order) that `data` lacks.
    fn first_missing<'p>(&'p self, data: &Map<String, Value>) -> Option<&'p str> {
        self.required
            .as_ref()?
            .iter()
            .filter(|key| !data.contains_key(key.as_str()))
            .map(String::as_str)
            .min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanOptions {
    /// Fail on empty required fields instead of dropping them.
    pub strict: bool,
    /// Descend into nested mappings and sequences.
    pub recurse: bool,
    pub max_depth: usize,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            strict: false,
            recurse: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Recursively removes empty values from a mapping.
///
/// The configured [`FieldPolicy`] applies to the top-level mapping only.
/// Nested mappings are always cleaned with [`FieldPolicy::all_required`], so
/// in strict mode an empty value anywhere below a required key fails.
/// Subtrees under optional keys never fail: they are cleaned leniently even
/// in strict mode, so `{"profile": {"bio": ""}}` with `profile` optional
/// yields `{}` rather than an error. Mark the key required to have its
/// subtree checked strictly.
#[derive(Debug, Clone, Default)]
pub struct DictCleaner {
    policy: FieldPolicy,
    options: CleanOptions,
}

impl DictCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_options(mut self, options: CleanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn recurse(mut self, recurse: bool) -> Self {
        self.options.recurse = recurse;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    pub fn options(&self) -> CleanOptions {
        self.options
    }

    /// Returns a cleaned copy of `data`. The input is never modified.
    pub fn clean(&self, data: &Map<String, Value>) -> Result<Map<String, Value>, ShapeError> {
        let root = KeyPath::root();
        let cleaned = self.clean_map(data, &self.policy, self.options.strict, &root)?;

        debug!(
            input_keys = data.len(),
            output_keys = cleaned.len(),
            "Cleaned mapping"
        );

        Ok(cleaned)
    }

    fn clean_map(
        &self,
        data: &Map<String, Value>,
        policy: &FieldPolicy,
        strict: bool,
        path: &KeyPath<'_>,
    ) -> Result<Map<String, Value>, ShapeError> {
        self.check_depth(path)?;

        if strict {
            if let Some(missing) = policy.first_missing(data) {
                return Err(ShapeError::RequiredFieldEmpty {
                    path: path.key(missing).to_string(),
                });
            }
        }

        let mut cleaned = Map::new();

        for (key, value) in data {
            let field_path = path.key(key);
            let required = policy.is_required(key);
            let strict_here = strict && required;

            match self.clean_value(value, strict_here, &field_path)? {
                Some(value) => {
                    cleaned.insert(key.clone(), value);
                }
                None if strict_here => {
                    return Err(ShapeError::RequiredFieldEmpty {
                        path: field_path.to_string(),
                    });
                }
                None => {
                    if required {
                        debug!(path = %field_path, "Dropped empty required field");
                    } else {
                        trace!(path = %field_path, "Dropped empty optional field");
                    }
                }
            }
        }

        Ok(cleaned)
    }

    /// Cleans a single value; `None` means the value is empty after cleaning.
    fn clean_value(
        &self,
        value: &Value,
        strict: bool,
        path: &KeyPath<'_>,
    ) -> Result<Option<Value>, ShapeError> {
        if !self.options.recurse {
            return Ok((!is_empty(value)).then(|| value.clone()));
        }

        match value {
            Value::Object(map) => {
                let nested = self.clean_map(map, &FieldPolicy::all_required(), strict, path)?;
                Ok((!nested.is_empty()).then_some(Value::Object(nested)))
            }
            Value::Array(items) => {
                let cleaned = self.clean_sequence(items, strict, path)?;
                Ok((!cleaned.is_empty()).then_some(Value::Array(cleaned)))
            }
            other if is_empty(other) => Ok(None),
            other => Ok(Some(other.clone())),
        }
    }

    /// Cleans sequence elements, dropping any that are or become empty.
    ///
    /// Element failures in strict mode propagate; an element that merely
    /// becomes empty is dropped rather than failing.
    fn clean_sequence(
        &self,
        items: &[Value],
        strict: bool,
        path: &KeyPath<'_>,
    ) -> Result<Vec<Value>, ShapeError> {
        self.check_depth(path)?;

        let mut cleaned = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let item_path = path.index(index);
            match item {
                Value::Object(map) => {
                    let nested =
                        self.clean_map(map, &FieldPolicy::all_required(), strict, &item_path)?;
                    if !nested.is_empty() {
                        cleaned.push(Value::Object(nested));
                    }
                }
                Value::Array(inner) => {
                    let nested = self.clean_sequence(inner, strict, &item_path)?;
                    if !nested.is_empty() {
                        cleaned.push(Value::Array(nested));
                    }
                }
                other if is_empty(other) => {}
                other => cleaned.push(other.clone()),
            }
        }

        Ok(cleaned)
    }

    fn check_depth(&self, path: &KeyPath<'_>) -> Result<(), ShapeError> {
        if path.depth() > self.options.max_depth {
            return Err(ShapeError::MaxDepthExceeded {
                path: path.to_string(),
                limit: self.options.max_depth,
            });
        }
        Ok(())
    }
}
