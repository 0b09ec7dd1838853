//! Declarative tool schemas.
//!
//! A [`ToolSchema`] is an ordered list of [`ParameterSpec`]s. Each spec has a
//! closed [`ParamType`] with exactly one coercion routine, a constraint check
//! and a correction routine, plus a [`DefaultRule`] used when the
//! conversation does not state a value.
//!
//! Schemas deserialize from TOML catalogs:
//!
//! ```toml
//! [[tools]]
//! id = "flashcard_generator"
//! description = "Creates flashcards for a topic"
//!
//! [[tools.parameters]]
//! name = "count"
//! required = true
//! type = { kind = "int_range", min = 1, max = 20 }
//! default = { rule = "static", value = 5 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CoercionError, SchemaError};
use crate::invocation::Provenance;
use crate::personalization::{normalize_token, EmotionalState, PersonalizationContext, TeachingStyle};
use crate::value::ParamValue;

/// A tool's full parameter schema. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ToolSchema {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter (builder style).
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// Reject malformed schemas before they reach the registry.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidSchema {
            tool_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("tool id is empty".into()));
        }

        let mut seen = HashSet::new();
        for spec in &self.parameters {
            if spec.name.trim().is_empty() {
                return Err(invalid("parameter with empty name".into()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(invalid(format!("duplicate parameter '{}'", spec.name)));
            }
            spec.param_type
                .validate()
                .map_err(|reason| invalid(format!("parameter '{}': {reason}", spec.name)))?;

            match &spec.default {
                DefaultRule::None => {}
                DefaultRule::Static { value } => {
                    spec.param_type.check(value).map_err(|reason| {
                        invalid(format!("default for '{}' violates its constraint: {reason}", spec.name))
                    })?;
                }
                DefaultRule::Derived { derivation } => {
                    if !derivation.compatible_with(&spec.param_type) {
                        return Err(invalid(format!(
                            "derivation {derivation:?} cannot produce a {} for '{}'",
                            spec.param_type.type_name(),
                            spec.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// One parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: DefaultRule,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
            default: DefaultRule::None,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, description, param_type)
        }
    }

    pub fn with_static(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = DefaultRule::Static { value: value.into() };
        self
    }

    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.default = DefaultRule::Derived { derivation };
        self
    }
}

/// The closed set of semantic parameter types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamType {
    Text {
        #[serde(default = "default_min_len")]
        min_len: usize,
        #[serde(default)]
        max_len: Option<usize>,
    },
    Enum {
        values: Vec<String>,
    },
    IntRange {
        min: i64,
        max: i64,
    },
    StringList {
        #[serde(default)]
        allowed: Option<Vec<String>>,
        #[serde(default)]
        max_items: Option<usize>,
    },
    Boolean,
}

fn default_min_len() -> usize {
    1
}

const NUMBER_WORDS: [&str; 21] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

impl ParamType {
    pub fn text(min_len: usize, max_len: usize) -> Self {
        Self::Text {
            min_len,
            max_len: Some(max_len),
        }
    }

    pub fn one_of(values: &[&str]) -> Self {
        Self::Enum {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn int_range(min: i64, max: i64) -> Self {
        Self::IntRange { min, max }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "string",
            Self::Enum { .. } => "enum",
            Self::IntRange { .. } => "integer",
            Self::StringList { .. } => "list of strings",
            Self::Boolean => "boolean",
        }
    }

    /// Human-readable type and constraint, used in extraction prompts.
    pub fn describe(&self) -> String {
        match self {
            Self::Text { min_len, max_len } => match max_len {
                Some(max) => format!("string of {min_len} to {max} characters"),
                None => "string".to_string(),
            },
            Self::Enum { values } => format!("one of: {}", values.join(", ")),
            Self::IntRange { min, max } => format!("integer between {min} and {max}"),
            Self::StringList { allowed, max_items } => {
                let mut out = "list of strings".to_string();
                if let Some(allowed) = allowed {
                    out.push_str(&format!(" drawn from: {}", allowed.join(", ")));
                }
                if let Some(max) = max_items {
                    out.push_str(&format!(" (at most {max})"));
                }
                out
            }
            Self::Boolean => "boolean (true or false)".to_string(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Text { min_len, max_len: Some(max) } if min_len > max => {
                Err(format!("min_len {min_len} exceeds max_len {max}"))
            }
            Self::Enum { values } if values.is_empty() => Err("enum has no values".into()),
            Self::IntRange { min, max } if min > max => Err(format!("range {min}..{max} is inverted")),
            Self::StringList { allowed: Some(allowed), .. } if allowed.is_empty() => {
                Err("allowed list is empty".into())
            }
            Self::StringList { max_items: Some(0), .. } => Err("max_items is zero".into()),
            _ => Ok(()),
        }
    }

    /// Convert an untrusted raw value to this type.
    ///
    /// Coercion only establishes the shape. An enum string that is not a
    /// member still coerces; [`ParamType::check`] reports it.
    pub fn coerce(&self, raw: &serde_json::Value) -> Result<ParamValue, CoercionError> {
        use serde_json::Value;

        if raw.is_null() {
            return Err(CoercionError::Empty);
        }

        match self {
            Self::Text { .. } => {
                let text = scalar_text(raw, "string")?;
                Ok(ParamValue::Text(text))
            }
            Self::Enum { values } => {
                let token = normalize_token(&scalar_text(raw, "enum member")?);
                let canonical = values
                    .iter()
                    .find(|v| normalize_token(v) == token)
                    .cloned()
                    .unwrap_or(token);
                Ok(ParamValue::Text(canonical))
            }
            Self::IntRange { .. } => match raw {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(ParamValue::Int(i))
                    } else {
                        match n.as_f64() {
                            Some(f) if f.is_finite() => Ok(ParamValue::Int(f.round() as i64)),
                            _ => Err(CoercionError::NotAnInteger(n.to_string())),
                        }
                    }
                }
                Value::String(s) => int_from_text(s).map(ParamValue::Int),
                other => Err(CoercionError::WrongType {
                    expected: "integer",
                    found: json_kind(other).into(),
                }),
            },
            Self::StringList { allowed, .. } => {
                let items: Vec<String> = match raw {
                    Value::Array(items) => items
                        .iter()
                        .map(|item| scalar_text(item, "list item"))
                        .collect::<Result<_, _>>()?,
                    Value::String(s) => s
                        .split([',', ';'])
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect(),
                    other => {
                        return Err(CoercionError::WrongType {
                            expected: "list of strings",
                            found: json_kind(other).into(),
                        });
                    }
                };
                if items.is_empty() {
                    return Err(CoercionError::Empty);
                }
                let items = match allowed {
                    Some(allowed) => items
                        .into_iter()
                        .map(|item| {
                            let token = normalize_token(&item);
                            allowed
                                .iter()
                                .find(|a| normalize_token(a) == token)
                                .cloned()
                                .unwrap_or(token)
                        })
                        .collect(),
                    None => items,
                };
                Ok(ParamValue::List(items))
            }
            Self::Boolean => match raw {
                Value::Bool(b) => Ok(ParamValue::Bool(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(ParamValue::Bool(false)),
                    Some(1) => Ok(ParamValue::Bool(true)),
                    _ => Err(CoercionError::NotABoolean(n.to_string())),
                },
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "y" | "1" | "on" => Ok(ParamValue::Bool(true)),
                    "false" | "no" | "n" | "0" | "off" => Ok(ParamValue::Bool(false)),
                    "" => Err(CoercionError::Empty),
                    _ => Err(CoercionError::NotABoolean(s.clone())),
                },
                other => Err(CoercionError::WrongType {
                    expected: "boolean",
                    found: json_kind(other).into(),
                }),
            },
        }
    }

    /// Check a typed value against this type's constraint.
    /// Returns the reason on violation.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match (self, value) {
            (Self::Text { min_len, max_len }, ParamValue::Text(s)) => {
                let len = s.chars().count();
                if len < *min_len {
                    return Err(format!("must be at least {min_len} characters"));
                }
                if let Some(max) = max_len
                    && len > *max
                {
                    return Err(format!("must be at most {max} characters"));
                }
                Ok(())
            }
            (Self::Enum { values }, ParamValue::Text(s)) => {
                if values.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(format!("'{s}' is not one of: {}", values.join(", ")))
                }
            }
            (Self::IntRange { min, max }, ParamValue::Int(n)) => {
                if (*min..=*max).contains(n) {
                    Ok(())
                } else {
                    Err(format!("{n} is outside {min}..={max}"))
                }
            }
            (Self::StringList { allowed, max_items }, ParamValue::List(items)) => {
                if items.is_empty() {
                    return Err("list is empty".into());
                }
                if let Some(max) = max_items
                    && items.len() > *max
                {
                    return Err(format!("at most {max} items allowed"));
                }
                if let Some(allowed) = allowed
                    && let Some(bad) = items.iter().find(|i| !allowed.contains(i))
                {
                    return Err(format!("'{bad}' is not one of: {}", allowed.join(", ")));
                }
                Ok(())
            }
            (Self::Boolean, ParamValue::Bool(_)) => Ok(()),
            (ty, other) => Err(format!("expected {}, got {other:?}", ty.type_name())),
        }
    }

    /// Bring a violating value back inside the constraint where that is
    /// meaningful (clamp a number, truncate text, drop disallowed list items).
    /// Returns `None` when no correction exists.
    pub fn correct(&self, value: &ParamValue) -> Option<ParamValue> {
        let corrected = match (self, value) {
            (Self::IntRange { min, max }, ParamValue::Int(n)) => ParamValue::Int((*n).clamp(*min, *max)),
            (Self::Text { max_len: Some(max), .. }, ParamValue::Text(s)) => {
                ParamValue::Text(s.chars().take(*max).collect())
            }
            (Self::StringList { allowed, max_items }, ParamValue::List(items)) => {
                let mut kept: Vec<String> = items
                    .iter()
                    .filter(|i| allowed.as_ref().is_none_or(|a| a.contains(i)))
                    .cloned()
                    .collect();
                if let Some(max) = max_items {
                    kept.truncate(*max);
                }
                ParamValue::List(kept)
            }
            _ => return None,
        };
        self.check(&corrected).ok().map(|_| corrected)
    }
}

fn scalar_text(raw: &serde_json::Value, expected: &'static str) -> Result<String, CoercionError> {
    use serde_json::Value;
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(CoercionError::WrongType {
                expected,
                found: json_kind(other).into(),
            });
        }
    };
    if text.is_empty() {
        Err(CoercionError::Empty)
    } else {
        Ok(text)
    }
}

/// First integer or number word in free text ("10 cards", "ten please").
fn int_from_text(text: &str) -> Result<i64, CoercionError> {
    let tokens = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty());
    for token in tokens {
        if let Ok(n) = token.parse::<i64>() {
            return Ok(n);
        }
        let lower = token.to_lowercase();
        if let Some(pos) = NUMBER_WORDS.iter().position(|w| *w == lower) {
            return Ok(pos as i64);
        }
    }
    if text.trim().is_empty() {
        Err(CoercionError::Empty)
    } else {
        Err(CoercionError::NotAnInteger(text.to_string()))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// How a missing value is filled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DefaultRule {
    #[default]
    None,
    Static { value: ParamValue },
    Derived { derivation: Derivation },
}

impl DefaultRule {
    /// The fallback value and its provenance, if this rule yields one.
    pub fn resolve(&self, ctx: &PersonalizationContext) -> Option<(ParamValue, Provenance)> {
        match self {
            Self::None => None,
            Self::Static { value } => Some((value.clone(), Provenance::Default)),
            Self::Derived { derivation } => Some((derivation.derive(ctx), Provenance::Inferred)),
        }
    }
}

/// Personalization-driven value derivations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// easy / medium / hard
    DifficultyFromProfile,
    /// basic / intermediate / advanced / comprehensive
    DepthFromProfile,
    /// outline / bullet_points / narrative / structured
    NoteStyleFromLearningStyle,
    IncludeExamples,
    AnalogiesFromTeachingStyle,
    /// 5 / 10 / 15
    CountFromMastery,
}

impl Derivation {
    pub fn derive(&self, ctx: &PersonalizationContext) -> ParamValue {
        let mastery = ctx.mastery_level;
        match self {
            Self::DifficultyFromProfile => {
                let level = if ctx.emotional_state.needs_support() || mastery <= 3 {
                    "easy"
                } else if mastery <= 6 {
                    "medium"
                } else {
                    "hard"
                };
                ParamValue::from(level)
            }
            Self::DepthFromProfile => {
                let supported = matches!(
                    ctx.emotional_state,
                    EmotionalState::Confused | EmotionalState::Anxious
                );
                let depth = if supported || mastery <= 3 {
                    "basic"
                } else if mastery <= 6 {
                    "intermediate"
                } else if mastery <= 8 {
                    "advanced"
                } else {
                    "comprehensive"
                };
                ParamValue::from(depth)
            }
            Self::NoteStyleFromLearningStyle => {
                let summary = ctx.learning_style_summary.to_lowercase();
                let style = if summary.contains("outline") || summary.contains("structured") {
                    "outline"
                } else if summary.contains("bullet") || summary.contains("points") {
                    "bullet_points"
                } else if summary.contains("narrative") || summary.contains("story") {
                    "narrative"
                } else {
                    "structured"
                };
                ParamValue::from(style)
            }
            Self::IncludeExamples => ParamValue::Bool(true),
            Self::AnalogiesFromTeachingStyle => {
                ParamValue::Bool(ctx.teaching_style == TeachingStyle::Visual)
            }
            Self::CountFromMastery => {
                let count = if mastery <= 3 {
                    5
                } else if mastery <= 6 {
                    10
                } else {
                    15
                };
                ParamValue::Int(count)
            }
        }
    }

    /// Whether this derivation's output fits the given type's shape.
    pub fn compatible_with(&self, ty: &ParamType) -> bool {
        match self {
            Self::DifficultyFromProfile | Self::DepthFromProfile | Self::NoteStyleFromLearningStyle => {
                matches!(ty, ParamType::Enum { .. } | ParamType::Text { .. })
            }
            Self::IncludeExamples | Self::AnalogiesFromTeachingStyle => matches!(ty, ParamType::Boolean),
            Self::CountFromMastery => matches!(ty, ParamType::IntRange { .. }),
        }
    }
}
