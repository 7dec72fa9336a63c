//! Framework-facing argument schemas and representability checks.

use crate::error::SchemaError;
use crate::manifest::{Parameter, ToolManifest};
use crate::types::{Framework, ValueType};
use serde_json::{json, Map, Value};

/// Words that cannot name a keyword argument in the Python-hosted frameworks.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Name of the generated input model: the tool name capitalized, plus `Input`.
pub fn input_model_name(tool_name: &str) -> String {
    let mut chars = tool_name.chars();
    let capitalized = match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    };
    format!("{capitalized}Input")
}

/// Description shown to the agent, with a fallback for undocumented tools.
pub fn tool_description(manifest: &ToolManifest) -> String {
    if manifest.description().trim().is_empty() {
        format!("Tool to execute {}", manifest.name())
    } else {
        manifest.description().to_string()
    }
}

/// Check that `framework` can express every parameter of `manifest`.
pub fn check_representable(manifest: &ToolManifest, framework: Framework) -> Result<(), SchemaError> {
    for param in manifest.parameters() {
        if param.param_type == ValueType::Enum && param.enum_values.is_empty() {
            return Err(SchemaError::new(
                manifest.name(),
                format!("enum parameter '{}' declares no values", param.name),
            ));
        }

        if uses_keyword_arguments(framework) {
            if !is_identifier(&param.name) {
                return Err(SchemaError::new(
                    manifest.name(),
                    format!(
                        "parameter '{}' is not a valid keyword argument for {}",
                        param.name, framework
                    ),
                ));
            }
            if RESERVED_WORDS.contains(&param.name.as_str()) {
                return Err(SchemaError::new(
                    manifest.name(),
                    format!("parameter '{}' is a reserved word in {}", param.name, framework),
                ));
            }
        }
    }
    Ok(())
}

/// CrewAI and LangChain spread arguments as keywords; AutoGen passes one object.
fn uses_keyword_arguments(framework: Framework) -> bool {
    matches!(framework, Framework::CrewAi | Framework::LangChain)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// JSON Schema of the adapter's input, as the frameworks consume it.
pub fn args_schema(manifest: &ToolManifest, strict_mode: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in manifest.parameters() {
        properties.insert(param.name.clone(), property_schema(param));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "title": input_model_name(manifest.name()),
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": !strict_mode,
    })
}

fn property_schema(param: &Parameter) -> Value {
    let mut schema = Map::new();
    match param.param_type {
        ValueType::Enum => {
            schema.insert("type".into(), json!("string"));
            schema.insert("enum".into(), json!(param.enum_values));
        }
        other => {
            schema.insert("type".into(), json!(other.as_str()));
        }
    }
    if !param.description.is_empty() {
        schema.insert("description".into(), json!(param.description));
    }
    if !param.required {
        schema.insert("default".into(), Value::Null);
    }
    Value::Object(schema)
}
