use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    cleaner::{CleanOptions, DictCleaner, FieldPolicy},
    graph::ObjectGraph,
    rules::{Rule, RuleSet},
    serializer::ObjectSerializer,
    ShapeError, DEFAULT_MAX_DEPTH,
};

/// Shaping settings shared by the cleaner and the serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapingConfig {
    /// Fail on empty required fields instead of dropping them
    pub strict: bool,

    /// Clean nested mappings and sequences
    pub recurse: bool,

    /// Maximum nesting depth for both traversals
    pub max_depth: usize,

    /// Required keys; `None` means every key not in `optional`
    pub required: Option<Vec<String>>,

    /// Optional keys, consulted only when `required` is unset
    pub optional: Option<Vec<String>>,

    /// Attribute names the serializer skips
    pub excluded: Vec<String>,

    /// Transformation rules, first match wins
    pub rules: Vec<Rule>,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            strict: false,
            recurse: true,
            max_depth: DEFAULT_MAX_DEPTH,
            required: None,
            optional: None,
            excluded: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl ShapingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let strict = std::env::var("SHAPING_STRICT")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("Invalid SHAPING_STRICT")?;

        let recurse = std::env::var("SHAPING_RECURSE")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .context("Invalid SHAPING_RECURSE")?;

        let max_depth = std::env::var("SHAPING_MAX_DEPTH")
            .unwrap_or_else(|_| DEFAULT_MAX_DEPTH.to_string())
            .parse()
            .context("Invalid SHAPING_MAX_DEPTH")?;

        let required = std::env::var("SHAPING_REQUIRED").ok().map(|raw| split_list(&raw));

        let optional = std::env::var("SHAPING_OPTIONAL").ok().map(|raw| split_list(&raw));

        let excluded = std::env::var("SHAPING_EXCLUDED")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let rules = match std::env::var("SHAPING_RULES") {
            Ok(raw) => serde_json::from_str(&raw).context("Invalid SHAPING_RULES")?,
            Err(_) => Vec::new(),
        };

        let config = Self {
            strict,
            recurse,
            max_depth,
            required,
            optional,
            excluded,
            rules,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("Invalid shaping config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read shaping config {:?}", path))?;
        Self::from_json_str(&raw).with_context(|| format!("Failed to load {:?}", path))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            anyhow::bail!("max_depth must be greater than zero");
        }

        self.rule_set().context("Invalid rules")?;

        Ok(())
    }

    pub fn field_policy(&self) -> FieldPolicy {
        let mut policy = FieldPolicy::default();
        if let Some(required) = &self.required {
            policy = policy.with_required(required.iter().cloned());
        }
        if let Some(optional) = &self.optional {
            policy = policy.with_optional(optional.iter().cloned());
        }
        policy
    }

    pub fn clean_options(&self) -> CleanOptions {
        CleanOptions {
            strict: self.strict,
            recurse: self.recurse,
            max_depth: self.max_depth,
        }
    }

    pub fn cleaner(&self) -> DictCleaner {
        DictCleaner::new()
            .with_policy(self.field_policy())
            .with_options(self.clean_options())
    }

    pub fn rule_set(&self) -> Result<RuleSet, ShapeError> {
        RuleSet::new(self.rules.clone())
    }

    pub fn serializer<'g>(
        &self,
        graph: &'g ObjectGraph,
    ) -> Result<ObjectSerializer<'g>, ShapeError> {
        Ok(ObjectSerializer::new(graph)
            .exclude(self.excluded.iter().cloned())
            .with_rules(self.rule_set()?)
            .max_depth(self.max_depth))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
