//! Argument validation gate.
//!
//! Every adapter invocation passes through [`Validator::validate`] before the
//! remote tool is contacted. Validation is a pure function of the manifest and
//! the payload, so anomaly classification downstream is reproducible.

use crate::error::ValidationError;
use crate::manifest::{Parameter, ToolManifest};
use crate::types::{json_kind, ValueType};
use serde_json::{Map, Number, Value};

/// Arguments that satisfied a manifest, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedArguments {
    values: Map<String, Value>,
    coercions: Vec<String>,
    dropped: Vec<String>,
}

impl ValidatedArguments {
    /// Validated payload, keys in parameter declaration order.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }

    /// Parameters whose numeric-string value was coerced to a number.
    pub fn coercions(&self) -> &[String] {
        &self.coercions
    }

    /// Undeclared keys removed in permissive mode.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }
}

/// Checks candidate arguments against a manifest's parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    strict_mode: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self::strict()
    }
}

impl Validator {
    /// `strict_mode = true` rejects undeclared keys, `false` drops them.
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn strict() -> Self {
        Self::new(true)
    }

    pub fn permissive() -> Self {
        Self::new(false)
    }

    pub fn is_strict(&self) -> bool {
        self.strict_mode
    }

    /// Validate `arguments` against `manifest`.
    ///
    /// Declared parameters are checked in declaration order, then undeclared
    /// keys in sorted order; the first violation is reported.
    pub fn validate(
        &self,
        manifest: &ToolManifest,
        arguments: &Map<String, Value>,
    ) -> Result<ValidatedArguments, ValidationError> {
        let mut values = Map::new();
        let mut coercions = Vec::new();

        for param in manifest.parameters() {
            let Some(value) = arguments.get(&param.name) else {
                if param.required {
                    return Err(ValidationError::missing(&param.name));
                }
                continue;
            };

            if value.is_null() {
                if param.required {
                    return Err(ValidationError::mismatch(
                        &param.name,
                        format!("expected {}, got null", param.param_type),
                    ));
                }
                values.insert(param.name.clone(), Value::Null);
                continue;
            }

            let (checked, coerced) = check_value(param, value)?;
            if coerced {
                coercions.push(param.name.clone());
            }
            values.insert(param.name.clone(), checked);
        }

        let mut extras: Vec<&String> = arguments
            .keys()
            .filter(|key| manifest.parameter(key).is_none())
            .collect();
        extras.sort();

        if self.strict_mode {
            if let Some(first) = extras.first() {
                return Err(ValidationError::unexpected(first));
            }
        }

        Ok(ValidatedArguments {
            values,
            coercions,
            dropped: extras.into_iter().cloned().collect(),
        })
    }

    /// Validate a raw JSON payload, which must be an object.
    pub fn validate_value(
        &self,
        manifest: &ToolManifest,
        arguments: &Value,
    ) -> Result<ValidatedArguments, ValidationError> {
        match arguments {
            Value::Object(map) => self.validate(manifest, map),
            other => Err(ValidationError::mismatch(
                "<arguments>",
                format!("expected object, got {}", json_kind(other)),
            )),
        }
    }
}

/// Check one non-null value; returns the value to dispatch and whether it was coerced.
fn check_value(param: &Parameter, value: &Value) -> Result<(Value, bool), ValidationError> {
    match param.param_type {
        ValueType::Number => match value {
            Value::Number(_) => Ok((value.clone(), false)),
            Value::String(s) => coerce_number(s)
                .map(|n| (Value::Number(n), true))
                .ok_or_else(|| {
                    ValidationError::mismatch(
                        &param.name,
                        format!("expected number, got non-numeric string {s:?}"),
                    )
                }),
            other => Err(ValidationError::mismatch(
                &param.name,
                format!("expected number, got {}", json_kind(other)),
            )),
        },
        ValueType::Enum => match value {
            Value::String(s) if param.enum_values.is_empty() || param.enum_values.contains(s) => {
                Ok((value.clone(), false))
            }
            Value::String(s) => Err(ValidationError::mismatch(
                &param.name,
                format!("{s:?} is not one of {:?}", param.enum_values),
            )),
            other => Err(ValidationError::mismatch(
                &param.name,
                format!("expected enum string, got {}", json_kind(other)),
            )),
        },
        expected if expected.matches(value) => Ok((value.clone(), false)),
        expected => Err(ValidationError::mismatch(
            &param.name,
            format!("expected {expected}, got {}", json_kind(value)),
        )),
    }
}

/// Numeric strings become integers when they fit, otherwise finite floats.
fn coerce_number(s: &str) -> Option<Number> {
    let trimmed = s.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Number::from(int));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}
