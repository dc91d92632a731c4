//! Schema adapter — declarative field maps to argument validators.
//!
//! A field map is the JSON shape units declare for their arguments:
//!
//! ```json
//! { "a": { "type": "number" }, "label": "string", "tags": { "type": "array", "optional": true } }
//! ```
//!
//! Conversion is lenient: an unrecognized or missing type tag yields a
//! validator that accepts anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{UnitError, UnitResult};

/// Declared argument fields, keyed by name.
pub type FieldMap = BTreeMap<String, FieldSpec>;

/// Declaration of a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldDecl")]
pub struct FieldSpec {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<FieldMap>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// Accepts either the bare tag (`"number"`) or the full object form.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldDecl {
    Tag(String),
    Full {
        #[serde(rename = "type", default)]
        type_tag: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        properties: Option<FieldMap>,
        #[serde(default)]
        optional: bool,
    },
}

impl From<FieldDecl> for FieldSpec {
    fn from(decl: FieldDecl) -> Self {
        match decl {
            FieldDecl::Tag(tag) => FieldSpec {
                type_tag: Some(tag),
                ..FieldSpec::default()
            },
            FieldDecl::Full {
                type_tag,
                description,
                properties,
                optional,
            } => FieldSpec {
                type_tag,
                description,
                properties,
                optional,
            },
        }
    }
}

impl FieldSpec {
    fn tagged(tag: &str) -> Self {
        Self {
            type_tag: Some(tag.to_string()),
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::tagged("string")
    }

    pub fn number() -> Self {
        Self::tagged("number")
    }

    pub fn boolean() -> Self {
        Self::tagged("boolean")
    }

    pub fn array() -> Self {
        Self::tagged("array")
    }

    pub fn object(properties: FieldMap) -> Self {
        Self {
            type_tag: Some("object".to_string()),
            properties: Some(properties),
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Build a field map from `(name, spec)` pairs.
pub fn fields<I, K>(entries: I) -> FieldMap
where
    I: IntoIterator<Item = (K, FieldSpec)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Validator for a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    String,
    Number,
    Boolean,
    List,
    Object(ObjectShape),
    Any,
}

/// A validated field inside an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeField {
    pub validator: Validator,
    pub optional: bool,
    pub description: Option<String>,
}

/// Validator for a JSON object with declared fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    fields: BTreeMap<String, ShapeField>,
}

/// Convert a declarative field map into an object validator.
pub fn to_validator(field_map: &FieldMap) -> ObjectShape {
    let fields = field_map
        .iter()
        .map(|(name, spec)| {
            (
                name.clone(),
                ShapeField {
                    validator: field_validator(spec),
                    optional: spec.optional,
                    description: spec.description.clone(),
                },
            )
        })
        .collect();
    ObjectShape { fields }
}

fn field_validator(spec: &FieldSpec) -> Validator {
    match spec.type_tag.as_deref() {
        Some("string") => Validator::String,
        Some("number") => Validator::Number,
        Some("boolean") => Validator::Boolean,
        Some("array") => Validator::List,
        Some("object") => match &spec.properties {
            Some(properties) => Validator::Object(to_validator(properties)),
            None => Validator::Any,
        },
        _ => Validator::Any,
    }
}

impl Validator {
    fn check(&self, path: &str, value: &Value, errors: &mut Vec<String>) {
        let expected = match self {
            Validator::String if !value.is_string() => "string",
            Validator::Number if !value.is_number() => "number",
            Validator::Boolean if !value.is_boolean() => "boolean",
            Validator::List if !value.is_array() => "array",
            Validator::Object(shape) => {
                match value.as_object() {
                    Some(map) => shape.check_map(&format!("{path}."), map, errors),
                    None => errors.push(format!("'{path}' must be an object")),
                }
                return;
            }
            _ => return,
        };
        errors.push(format!("'{path}' must be a {expected}"));
    }

    /// Render as a JSON Schema fragment.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Validator::String => json!({ "type": "string" }),
            Validator::Number => json!({ "type": "number" }),
            Validator::Boolean => json!({ "type": "boolean" }),
            Validator::List => json!({ "type": "array" }),
            Validator::Object(shape) => shape.to_json_schema(),
            Validator::Any => json!({}),
        }
    }
}

impl ObjectShape {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ShapeField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Validate raw call arguments. Missing or null arguments count as `{}`.
    pub fn validate(&self, args: Option<Value>) -> UnitResult<Map<String, Value>> {
        let map = match args {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(UnitError::Validation(
                    "arguments must be an object".to_string(),
                ))
            }
        };

        let mut errors = Vec::new();
        self.check_map("", &map, &mut errors);
        if errors.is_empty() {
            Ok(map)
        } else {
            Err(UnitError::Validation(errors.join("; ")))
        }
    }

    fn check_map(&self, prefix: &str, map: &Map<String, Value>, errors: &mut Vec<String>) {
        for (name, field) in &self.fields {
            let path = format!("{prefix}{name}");
            match map.get(name) {
                None | Some(Value::Null) if field.optional => {}
                None => errors.push(format!("'{path}' is required")),
                Some(value) => field.validator.check(&path, value, errors),
            }
        }
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for (name, field) in &self.fields {
            let mut schema = field.validator.to_json_schema();
            if let (Some(description), Some(obj)) = (&field.description, schema.as_object_mut()) {
                obj.insert("description".to_string(), json!(description));
            }
            properties.insert(name.clone(), schema);
            if !field.optional {
                required.push(json!(name));
            }
        }

        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        schema
    }
}
