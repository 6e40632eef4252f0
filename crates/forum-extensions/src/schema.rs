//! Configuration schema declared by extension manifests.
//!
//! A schema is a list of groups, each holding named property declarations.
//! Groups only affect how a settings form is laid out; property names are
//! unique across the whole schema.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON type a property must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// A single configurable property.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum length for strings (characters) and arrays (items).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Regular expression string values must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertySchema {
    /// Create a property of the given type with no constraints.
    pub fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            default: None,
            required: false,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            enum_values: None,
            pattern: None,
            label: None,
            description: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Check `value` against this declaration, returning the first violation.
    fn violation(&self, value: &Value) -> Option<String> {
        if !self.property_type.matches(value) {
            return Some(format!("expected {}", self.property_type.label()));
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum.filter(|min| n < *min) {
                return Some(format!("must be at least {min}"));
            }
            if let Some(max) = self.maximum.filter(|max| n > *max) {
                return Some(format!("must be at most {max}"));
            }
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = length {
            match (self.min_length, self.max_length) {
                (Some(min), _) if len < min => {
                    return Some(format!("length must be at least {min}"));
                }
                (_, Some(max)) if len > max => {
                    return Some(format!("length must be at most {max}"));
                }
                _ => {}
            }
        }

        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Some("is not one of the allowed values".to_string());
            }
        }

        if let (Some(pattern), Value::String(s)) = (&self.pattern, value) {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    return Some(format!("does not match pattern '{pattern}'"));
                }
                Ok(_) => {}
                Err(_) => return Some(format!("schema pattern '{pattern}' is invalid")),
            }
        }

        None
    }
}

/// A named group of properties rendered together.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaGroup {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
}

/// Grouped property declarations from a manifest's `configSchema`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConfigSchema {
    #[serde(default)]
    pub groups: Vec<SchemaGroup>,
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldError {
    pub key: String,
    pub message: String,
}

impl FieldError {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Outcome of validating a candidate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

impl ConfigSchema {
    /// Iterate over every property across all groups.
    pub fn properties(&self) -> impl Iterator<Item = (&String, &PropertySchema)> {
        self.groups.iter().flat_map(|g| g.properties.iter())
    }

    /// Default values for every property that declares one.
    pub fn defaults(&self) -> Map<String, Value> {
        self.properties()
            .filter_map(|(key, prop)| prop.default.clone().map(|v| (key.clone(), v)))
            .collect()
    }

    /// Check the schema itself: property names are unique, patterns compile,
    /// and declared defaults satisfy their own constraints.
    pub fn check(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for (key, prop) in self.properties() {
            if !seen.insert(key.as_str()) {
                return Err(format!("property '{key}' is declared in more than one group"));
            }
            if let Some(pattern) = &prop.pattern {
                Regex::new(pattern).map_err(|e| format!("property '{key}': {e}"))?;
            }
            if let Some(message) = prop.default.as_ref().and_then(|d| prop.violation(d)) {
                return Err(format!("default for '{key}' {message}"));
            }
        }
        Ok(())
    }

    /// Validate a candidate configuration object.
    ///
    /// Keys not declared in the schema are accepted. A `null` value counts
    /// as absent.
    pub fn validate(&self, candidate: &Value) -> ValidationReport {
        let Some(object) = candidate.as_object() else {
            return ValidationReport::from_errors(vec![FieldError::new(
                "",
                "configuration must be a JSON object",
            )]);
        };
        if object.is_empty() {
            return ValidationReport::from_errors(vec![FieldError::new(
                "",
                "configuration must not be empty",
            )]);
        }

        let mut errors = Vec::new();
        for (key, prop) in self.properties() {
            match object.get(key) {
                None | Some(Value::Null) => {
                    if prop.required {
                        errors.push(FieldError::new(key, "is required"));
                    }
                }
                Some(value) => {
                    if let Some(message) = prop.violation(value) {
                        errors.push(FieldError::new(key, message));
                    }
                }
            }
        }
        ValidationReport::from_errors(errors)
    }
}
