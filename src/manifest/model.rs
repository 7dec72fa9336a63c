//! Canonical, framework-agnostic tool manifest.
//!
//! Manifests are parsed once at discovery time from whatever the remote source
//! publishes (a declarative parameter list, an MCP `inputSchema`, or a
//! function-calling `parameters` schema). Everything downstream works on the
//! resulting static structure.

use crate::error::SchemaError;
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ValueType,
    pub required: bool,
    #[serde(default)]
    pub description: String,
    /// Allowed values when `param_type` is `enum`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, param_type: ValueType, required: bool) -> Self {
        Self {
            name: name.into(),
            param_type,
            required,
            description: String::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Immutable description of a remote tool's contract.
///
/// A changed contract is a new manifest (and a new fingerprint), never a
/// mutation of an existing one, so the type offers no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolManifest {
    source: String,
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    return_type: ValueType,
}

impl ToolManifest {
    /// Start building a manifest by hand.
    pub fn builder(name: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder {
            source: String::new(),
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            return_type: ValueType::String,
        }
    }

    /// Parse a raw manifest payload.
    pub fn parse(raw: &Value) -> Result<Self, SchemaError> {
        parse(raw)
    }

    /// Parse a raw manifest payload discovered from `source`.
    pub fn parse_with_source(raw: &Value, source: &str) -> Result<Self, SchemaError> {
        let mut manifest = parse(raw)?;
        if !source.is_empty() {
            manifest.source = source.to_string();
        }
        Ok(manifest)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn return_type(&self) -> ValueType {
        self.return_type
    }
}

/// Builder for hand-written manifests; `build` enforces the same invariants as `parse`.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    source: String,
    name: String,
    description: String,
    parameters: Vec<Parameter>,
    return_type: ValueType,
}

impl ManifestBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn returns(mut self, return_type: ValueType) -> Self {
        self.return_type = return_type;
        self
    }

    pub fn build(self) -> Result<ToolManifest, SchemaError> {
        let manifest = ToolManifest {
            source: self.source,
            name: self.name.trim().to_string(),
            description: self.description,
            parameters: self.parameters,
            return_type: self.return_type,
        };
        finish(manifest)
    }
}

/// Trim parameter names and enforce manifest invariants.
///
/// Names are compared after trimming, the same way `canonicalize` sees them.
fn finish(mut manifest: ToolManifest) -> Result<ToolManifest, SchemaError> {
    for param in &mut manifest.parameters {
        let trimmed = param.name.trim();
        if trimmed.len() != param.name.len() {
            param.name = trimmed.to_string();
        }
    }
    check_invariants(&manifest)?;
    Ok(manifest)
}

fn check_invariants(manifest: &ToolManifest) -> Result<(), SchemaError> {
    if manifest.name.is_empty() {
        return Err(SchemaError::new("<unknown>", "tool name is empty"));
    }

    let mut seen = HashSet::new();
    for param in &manifest.parameters {
        if param.name.is_empty() {
            return Err(SchemaError::new(&manifest.name, "parameter with empty name"));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(SchemaError::new(
                &manifest.name,
                format!("duplicate parameter '{}'", param.name),
            ));
        }
        if param.param_type != ValueType::Enum && !param.enum_values.is_empty() {
            return Err(SchemaError::new(
                &manifest.name,
                format!("parameter '{}' lists enum values but is {}", param.name, param.param_type),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a raw manifest payload into a [`ToolManifest`].
///
/// Accepted shapes:
/// - `{"name", "parameters": [{"name", "type", "required", "description"}], "return_type"}`
/// - `{"name", "description", "inputSchema": {"properties", "required"}, "outputSchema"}`
/// - `{"name", "description", "parameters": {"properties", "required"}}`
pub fn parse(raw: &Value) -> Result<ToolManifest, SchemaError> {
    let obj = raw
        .as_object()
        .ok_or_else(|| SchemaError::new("<unknown>", "manifest must be a JSON object"))?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SchemaError::new("<unknown>", "missing required field 'name'"))?
        .to_string();

    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let source = obj
        .get("source")
        .or_else(|| obj.get("server"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let parameters = match (
        obj.get("parameters"),
        obj.get("inputSchema").or_else(|| obj.get("input_schema")),
    ) {
        (Some(Value::Array(list)), _) => parse_parameter_list(&name, list)?,
        (_, Some(schema)) => parse_json_schema(&name, schema)?,
        (Some(schema), None) if schema.is_object() => parse_json_schema(&name, schema)?,
        (Some(_), None) => {
            return Err(SchemaError::new(
                &name,
                "'parameters' must be a list or an object schema",
            ))
        }
        (None, None) => {
            return Err(SchemaError::new(
                &name,
                "missing required field 'parameters' (or 'inputSchema')",
            ))
        }
    };

    let return_type = parse_return_type(&name, obj)?;

    let manifest = ToolManifest {
        source,
        name,
        description,
        parameters,
        return_type,
    };
    finish(manifest)
}

fn parse_parameter_list(tool: &str, list: &[Value]) -> Result<Vec<Parameter>, SchemaError> {
    list.iter()
        .enumerate()
        .map(|(idx, entry)| {
            let obj = entry.as_object().ok_or_else(|| {
                SchemaError::new(tool, format!("parameter #{idx} is not an object"))
            })?;

            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SchemaError::new(tool, format!("parameter #{idx} is missing 'name'"))
                })?
                .to_string();

            let enum_values = enum_values(tool, &name, obj)?;
            let param_type = match obj.get("type").and_then(Value::as_str) {
                Some(token) => ValueType::from_token(token).ok_or_else(|| {
                    SchemaError::new(
                        tool,
                        format!("parameter '{name}' has unsupported type '{token}'"),
                    )
                })?,
                None if enum_values.is_some() => ValueType::Enum,
                None => {
                    return Err(SchemaError::new(
                        tool,
                        format!("parameter '{name}' is missing 'type'"),
                    ))
                }
            };

            Ok(Parameter {
                param_type: promote_enum(param_type, &enum_values),
                required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
                description: obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                enum_values: enum_values.unwrap_or_default(),
                name,
            })
        })
        .collect()
}

fn parse_json_schema(tool: &str, schema: &Value) -> Result<Vec<Parameter>, SchemaError> {
    let empty = Map::new();
    let properties = match schema.get("properties") {
        Some(Value::Object(props)) => props,
        Some(_) => return Err(SchemaError::new(tool, "'properties' must be an object")),
        None => &empty,
    };

    let required: Vec<&str> = match schema.get("required") {
        Some(Value::Array(names)) => names
            .iter()
            .map(|n| {
                n.as_str()
                    .ok_or_else(|| SchemaError::new(tool, "'required' must list property names"))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(SchemaError::new(tool, "'required' must be a list")),
        None => Vec::new(),
    };

    if let Some(unknown) = required.iter().find(|r| !properties.contains_key(**r)) {
        return Err(SchemaError::new(
            tool,
            format!("'required' names undeclared property '{unknown}'"),
        ));
    }

    properties
        .iter()
        .map(|(name, prop)| {
            let prop_obj = prop.as_object().ok_or_else(|| {
                SchemaError::new(tool, format!("property '{name}' is not an object"))
            })?;
            let enum_values = enum_values(tool, name, prop_obj)?;
            let param_type = match prop_obj.get("type") {
                Some(Value::String(token)) => ValueType::from_token(token).ok_or_else(|| {
                    SchemaError::new(
                        tool,
                        format!("property '{name}' has unsupported type '{token}'"),
                    )
                })?,
                // Nullable unions such as ["string", "null"].
                Some(Value::Array(tokens)) => {
                    let concrete: Vec<&str> = tokens
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|t| *t != "null")
                        .collect();
                    match concrete.as_slice() {
                        [token] => ValueType::from_token(token).ok_or_else(|| {
                            SchemaError::new(
                                tool,
                                format!("property '{name}' has unsupported type '{token}'"),
                            )
                        })?,
                        _ => {
                            return Err(SchemaError::new(
                                tool,
                                format!("property '{name}' has an unsupported type union"),
                            ))
                        }
                    }
                }
                Some(_) => {
                    return Err(SchemaError::new(
                        tool,
                        format!("property '{name}' has a non-string type"),
                    ))
                }
                None if enum_values.is_some() => ValueType::Enum,
                None => ValueType::String,
            };

            Ok(Parameter {
                name: name.clone(),
                param_type: promote_enum(param_type, &enum_values),
                required: required.contains(&name.as_str()),
                description: prop_obj
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                enum_values: enum_values.unwrap_or_default(),
            })
        })
        .collect()
}

/// Read an `enum` / `values` list; enum members must be strings.
fn enum_values(
    tool: &str,
    param: &str,
    obj: &Map<String, Value>,
) -> Result<Option<Vec<String>>, SchemaError> {
    let Some(list) = obj.get("enum").or_else(|| obj.get("values")) else {
        return Ok(None);
    };
    let items = list.as_array().ok_or_else(|| {
        SchemaError::new(tool, format!("enum values of '{param}' must be a list"))
    })?;
    items
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                SchemaError::new(tool, format!("enum values of '{param}' must be strings"))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// A string-typed property with an `enum` list is an enum.
fn promote_enum(param_type: ValueType, enum_values: &Option<Vec<String>>) -> ValueType {
    match (param_type, enum_values) {
        (ValueType::String, Some(_)) => ValueType::Enum,
        (other, _) => other,
    }
}

fn parse_return_type(tool: &str, obj: &Map<String, Value>) -> Result<ValueType, SchemaError> {
    let token = obj
        .get("return_type")
        .or_else(|| obj.get("returnType"))
        .and_then(Value::as_str)
        .or_else(|| {
            obj.get("outputSchema")
                .or_else(|| obj.get("output_schema"))
                .and_then(|s| s.get("type"))
                .and_then(Value::as_str)
        });

    match token {
        Some(token) => ValueType::from_token(token).ok_or_else(|| {
            SchemaError::new(tool, format!("unsupported return type '{token}'"))
        }),
        None => Ok(ValueType::String),
    }
}

// ---------------------------------------------------------------------------
// Canonical form
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CanonicalManifest<'a> {
    source: &'a str,
    name: &'a str,
    description: String,
    parameters: Vec<CanonicalParameter<'a>>,
    return_type: &'static str,
}

#[derive(Serialize)]
struct CanonicalParameter<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    param_type: &'static str,
    required: bool,
    description: String,
    enum_values: Vec<&'a str>,
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Order-independent serialized form of a manifest; the sole input to fingerprinting.
pub fn canonicalize(manifest: &ToolManifest) -> Vec<u8> {
    let mut parameters: Vec<CanonicalParameter<'_>> = manifest
        .parameters
        .iter()
        .map(|p| {
            let mut enum_values: Vec<&str> = p.enum_values.iter().map(String::as_str).collect();
            enum_values.sort_unstable();
            enum_values.dedup();
            CanonicalParameter {
                name: p.name.trim(),
                param_type: p.param_type.as_str(),
                required: p.required,
                description: normalize_whitespace(&p.description),
                enum_values,
            }
        })
        .collect();
    parameters.sort_by(|a, b| a.name.cmp(b.name));

    let canonical = CanonicalManifest {
        source: manifest.source.trim(),
        name: manifest.name.trim(),
        description: normalize_whitespace(&manifest.description),
        parameters,
        return_type: manifest.return_type.as_str(),
    };

    // A struct of strings, bools and vectors always serializes.
    serde_json::to_vec(&canonical).unwrap_or_default()
}
