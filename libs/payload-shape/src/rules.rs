//! Declarative value transformations.
//!
//! A [`Rule`] pairs a [`Predicate`] with a [`Transform`]. Both are closed
//! enums, so rules can be loaded from configuration without evaluating any
//! caller-supplied code.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{graph::Scalar, ShapeError};

/// Largest `round_float` precision that still fits an `f64` mantissa.
pub const MAX_ROUND_DIGITS: u32 = 15;

fn default_round_digits() -> u32 {
    2
}

/// Decides whether a rule applies to a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    IsString,
    IsFloat,
    /// Matches both date-times and plain dates.
    IsDatetime,
    /// Matches the attribute by name, whatever its type.
    FieldIs { name: String },
}

impl Predicate {
    pub fn matches(&self, field: &str, value: &Scalar) -> bool {
        match self {
            Predicate::IsString => matches!(value, Scalar::Str(_)),
            Predicate::IsFloat => matches!(value, Scalar::Float(_)),
            Predicate::IsDatetime => matches!(value, Scalar::DateTime(_) | Scalar::Date(_)),
            Predicate::FieldIs { name } => name == field,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Predicate::IsString => "is_string",
            Predicate::IsFloat => "is_float",
            Predicate::IsDatetime => "is_datetime",
            Predicate::FieldIs { .. } => "field_is",
        }
    }
}

/// Replacement applied to a matching scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    StripWhitespace,
    ToUppercase,
    ToLowercase,
    RoundFloat {
        #[serde(default = "default_round_digits")]
        digits: u32,
    },
    /// Renders as RFC 3339 (dates as `YYYY-MM-DD`) unless a strftime
    /// `format` is given.
    DatetimeToString {
        #[serde(default)]
        format: Option<String>,
    },
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::StripWhitespace => "strip_whitespace",
            Transform::ToUppercase => "to_uppercase",
            Transform::ToLowercase => "to_lowercase",
            Transform::RoundFloat { .. } => "round_float",
            Transform::DatetimeToString { .. } => "datetime_to_string",
        }
    }

    /// Whether this transform is defined for the scalar's type.
    pub fn accepts(&self, value: &Scalar) -> bool {
        match self {
            Transform::StripWhitespace | Transform::ToUppercase | Transform::ToLowercase => {
                matches!(value, Scalar::Str(_))
            }
            Transform::RoundFloat { .. } => matches!(value, Scalar::Float(_)),
            Transform::DatetimeToString { .. } => {
                matches!(value, Scalar::DateTime(_) | Scalar::Date(_))
            }
        }
    }

    /// Applies the transform. Returns the reason on failure.
    pub fn apply(&self, value: Scalar) -> Result<Scalar, String> {
        match (self, value) {
            (Transform::StripWhitespace, Scalar::Str(s)) => Ok(Scalar::Str(s.trim().to_string())),
            (Transform::ToUppercase, Scalar::Str(s)) => Ok(Scalar::Str(s.to_uppercase())),
            (Transform::ToLowercase, Scalar::Str(s)) => Ok(Scalar::Str(s.to_lowercase())),
            (Transform::RoundFloat { digits }, Scalar::Float(f)) => {
                Ok(Scalar::Float(round_to(f, *digits)))
            }
            (Transform::DatetimeToString { format }, Scalar::DateTime(dt)) => match format {
                None => Ok(Scalar::Str(dt.to_rfc3339())),
                Some(format) => render(dt.format(format), format).map(Scalar::Str),
            },
            (Transform::DatetimeToString { format }, Scalar::Date(date)) => match format {
                None => Ok(Scalar::Str(date.to_string())),
                Some(format) => {
                    let midnight = NaiveDateTime::new(date, NaiveTime::MIN);
                    render(midnight.format(format), format).map(Scalar::Str)
                }
            },
            (transform, value) => Err(format!(
                "`{}` cannot be applied to a {} value",
                transform.as_str(),
                value.type_name()
            )),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Transform::RoundFloat { digits } if *digits > MAX_ROUND_DIGITS => Err(format!(
                "round_float digits must be at most {MAX_ROUND_DIGITS}, got {digits}"
            )),
            Transform::DatetimeToString {
                format: Some(format),
            } => {
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    Err(format!("invalid datetime format '{format}'"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Floats at or above 2^52 have no fractional part left to round.
const INTEGRAL_FLOAT_THRESHOLD: f64 = 4_503_599_627_370_496.0;

fn round_to(value: f64, digits: u32) -> f64 {
    if !value.is_finite() || value.abs() >= INTEGRAL_FLOAT_THRESHOLD {
        return value;
    }

    let factor = 10f64.powi(digits as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

// Formatting through `write!` surfaces items the value cannot render (e.g. a
// timezone on a plain date) as an error instead of a panic.
fn render(formatted: impl std::fmt::Display, format: &str) -> Result<String, String> {
    let mut out = String::new();
    write!(out, "{formatted}")
        .map_err(|_| format!("format '{format}' cannot be rendered for this value"))?;
    Ok(out)
}

/// A predicate/transform pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub when: Predicate,
    pub then: Transform,
}

impl Rule {
    pub fn new(when: Predicate, then: Transform) -> Self {
        Self { when, then }
    }

    pub fn datetime_to_string() -> Self {
        Self::new(
            Predicate::IsDatetime,
            Transform::DatetimeToString { format: None },
        )
    }

    pub fn strip_whitespace() -> Self {
        Self::new(Predicate::IsString, Transform::StripWhitespace)
    }

    pub fn to_uppercase() -> Self {
        Self::new(Predicate::IsString, Transform::ToUppercase)
    }

    pub fn to_lowercase() -> Self {
        Self::new(Predicate::IsString, Transform::ToLowercase)
    }

    pub fn round_float() -> Self {
        Self::new(
            Predicate::IsFloat,
            Transform::RoundFloat {
                digits: default_round_digits(),
            },
        )
    }

    /// Applies `then` to the field called `name`.
    pub fn for_field(name: impl Into<String>, then: Transform) -> Self {
        Self::new(Predicate::FieldIs { name: name.into() }, then)
    }

    /// Checks that the rule can ever succeed.
    pub fn validate(&self, index: usize) -> Result<(), ShapeError> {
        let invalid = |reason: String| ShapeError::InvalidRule { index, reason };

        let compatible = match (&self.when, &self.then) {
            (Predicate::FieldIs { name }, _) if name.is_empty() => {
                return Err(invalid("field_is requires a non-empty name".to_string()));
            }
            (Predicate::FieldIs { .. }, _) => true,
            (
                Predicate::IsString,
                Transform::StripWhitespace | Transform::ToUppercase | Transform::ToLowercase,
            ) => true,
            (Predicate::IsFloat, Transform::RoundFloat { .. }) => true,
            (Predicate::IsDatetime, Transform::DatetimeToString { .. }) => true,
            _ => false,
        };

        if !compatible {
            return Err(invalid(format!(
                "`{}` values cannot be handled by `{}`",
                self.when.as_str(),
                self.then.as_str()
            )));
        }

        self.then.validate().map_err(invalid)
    }
}

/// An ordered, validated list of rules. The first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self, ShapeError> {
        for (index, rule) in rules.iter().enumerate() {
            rule.validate(index)?;
        }
        Ok(Self { rules })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Transforms `value` with the first rule whose predicate matches.
    ///
    /// A `field_is` rule that matches a value its transform does not accept
    /// fails with [`ShapeError::InvalidRule`].
    pub fn apply(&self, field: &str, value: Scalar) -> Result<Scalar, ShapeError> {
        let Some((index, rule)) = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.when.matches(field, &value))
        else {
            return Ok(value);
        };

        trace!(field, rule = index, transform = rule.then.as_str(), "Applying rule");

        if !rule.then.accepts(&value) {
            return Err(ShapeError::InvalidRule {
                index,
                reason: format!(
                    "`{}` cannot be applied to {} field '{}'",
                    rule.then.as_str(),
                    value.type_name(),
                    field
                ),
            });
        }

        rule.then
            .apply(value)
            .map_err(|reason| ShapeError::InvalidRule { index, reason })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = RuleSet::new(vec![Rule::to_uppercase(), Rule::to_lowercase()]).unwrap();
        let value = rules.apply("name", Scalar::from("Alice")).unwrap();
        assert_eq!(value, Scalar::from("ALICE"));
    }

    #[test]
    fn test_non_matching_rule_leaves_value() {
        let rules = RuleSet::new(vec![Rule::round_float()]).unwrap();
        let value = rules.apply("name", Scalar::from("Alice")).unwrap();
        assert_eq!(value, Scalar::from("Alice"));
    }

    #[test]
    fn test_round_float() {
        let rules = RuleSet::new(vec![Rule::round_float()]).unwrap();
        let value = rules.apply("price", Scalar::from(3.14159)).unwrap();
        assert_eq!(value, Scalar::from(3.14));
    }

    #[test]
    fn test_round_float_keeps_large_values() {
        let rules = RuleSet::new(vec![Rule::round_float()]).unwrap();

        for large in [1.0e307, -1.0e307, f64::MAX, 4_503_599_627_370_497.0] {
            let value = rules.apply("total", Scalar::from(large)).unwrap();
            assert_eq!(value, Scalar::from(large));
        }
    }

    #[test]
    fn test_round_float_at_max_digits() {
        let rule = Rule::new(
            Predicate::IsFloat,
            Transform::RoundFloat {
                digits: MAX_ROUND_DIGITS,
            },
        );
        let rules = RuleSet::new(vec![rule]).unwrap();

        assert_eq!(
            rules.apply("ratio", Scalar::from(0.1)).unwrap(),
            Scalar::from(0.1)
        );
        assert_eq!(
            rules.apply("total", Scalar::from(1.0e300)).unwrap(),
            Scalar::from(1.0e300)
        );
    }

    #[test]
    fn test_datetime_defaults_to_rfc3339() {
        let rules = RuleSet::new(vec![Rule::datetime_to_string()]).unwrap();
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let value = rules.apply("created_at", Scalar::from(dt)).unwrap();
        assert_eq!(value, Scalar::from("2024-01-02T03:04:05+00:00"));
    }

    #[test]
    fn test_date_with_custom_format() {
        let rule = Rule::new(
            Predicate::IsDatetime,
            Transform::DatetimeToString {
                format: Some("%d/%m/%Y".to_string()),
            },
        );
        let rules = RuleSet::new(vec![rule]).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let value = rules.apply("birthday", Scalar::from(date)).unwrap();
        assert_eq!(value, Scalar::from("09/03/2024"));
    }

    #[test]
    fn test_date_with_timezone_format_fails() {
        let rule = Rule::new(
            Predicate::IsDatetime,
            Transform::DatetimeToString {
                format: Some("%Y %z".to_string()),
            },
        );
        let rules = RuleSet::new(vec![rule]).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let err = rules.apply("birthday", Scalar::from(date)).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidRule { index: 0, .. }));
    }

    #[test]
    fn test_field_rule_targets_one_field() {
        let rules = RuleSet::new(vec![Rule::for_field("name", Transform::ToUppercase)]).unwrap();

        assert_eq!(
            rules.apply("name", Scalar::from("alice")).unwrap(),
            Scalar::from("ALICE")
        );
        assert_eq!(
            rules.apply("city", Scalar::from("lisbon")).unwrap(),
            Scalar::from("lisbon")
        );
    }

    #[test]
    fn test_field_rule_on_wrong_type_fails_fast() {
        let rules = RuleSet::new(vec![Rule::for_field("age", Transform::ToUppercase)]).unwrap();
        let err = rules.apply("age", Scalar::from(42)).unwrap_err();

        assert_eq!(
            err,
            ShapeError::InvalidRule {
                index: 0,
                reason: "`to_uppercase` cannot be applied to int field 'age'".to_string()
            }
        );
    }

    #[test]
    fn test_incompatible_predicate_is_rejected() {
        let rule = Rule::new(Predicate::IsFloat, Transform::ToUppercase);
        let err = RuleSet::new(vec![Rule::strip_whitespace(), rule]).unwrap_err();
        assert!(matches!(err, ShapeError::InvalidRule { index: 1, .. }));
    }

    #[test]
    fn test_invalid_format_is_rejected() {
        let rule = Rule::new(
            Predicate::IsDatetime,
            Transform::DatetimeToString {
                format: Some("%Q".to_string()),
            },
        );
        assert!(RuleSet::new(vec![rule]).is_err());
    }

    #[test]
    fn test_round_digits_limit() {
        let rule = Rule::new(Predicate::IsFloat, Transform::RoundFloat { digits: 16 });
        assert!(RuleSet::new(vec![rule]).is_err());
    }

    #[test]
    fn test_empty_field_name_is_rejected() {
        let rule = Rule::for_field("", Transform::ToLowercase);
        assert!(RuleSet::new(vec![rule]).is_err());
    }

    #[test]
    fn test_rules_deserialize_from_json() {
        let raw = r#"[
            {"when": {"kind": "is_string"}, "then": {"kind": "strip_whitespace"}},
            {"when": {"kind": "is_float"}, "then": {"kind": "round_float"}},
            {"when": {"kind": "field_is", "name": "code"}, "then": {"kind": "to_uppercase"}}
        ]"#;

        let rules: Vec<Rule> = serde_json::from_str(raw).unwrap();
        assert_eq!(rules[0], Rule::strip_whitespace());
        assert_eq!(rules[1], Rule::round_float());
        assert_eq!(rules[2], Rule::for_field("code", Transform::ToUppercase));
    }
}
