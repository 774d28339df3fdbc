//! Declarative value schemas and the validator that checks stage boundaries.
//!
//! Schemas are plain data: they can be written in code with the builder
//! helpers, or loaded from YAML/JSON:
//!
//! ```yaml
//! type: object
//! fields:
//!   - name: input
//!     schema: { type: string }
//!   - name: products
//!     required: false
//!     schema:
//!       type: array
//!       items: { type: string }
//! ```
//!
//! Validation never coerces. A value either matches its schema and is handed
//! through unchanged, or the first mismatch is reported with its location.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The shape a JSON value must have.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    String,
    Number,
    Integer,
    Boolean,
    /// Matches every value, including `null`.
    Any,
    /// A string restricted to a fixed set of values.
    Enum { values: Vec<String> },
    Array { items: Box<Schema> },
    Object(ObjectSchema),
}

/// Field list of an object schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSchema {
    #[serde(default)]
    pub fields: Vec<Field>,

    /// When false, fields not listed in `fields` are rejected.
    #[serde(default)]
    pub allow_additional: bool,
}

/// A named field inside an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    pub schema: Schema,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

/// Why a value was rejected. `path` uses `$` for the root, `.field` for
/// object members and `[i]` for array elements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{path}: missing required field")]
    MissingField { path: String },

    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("{path}: unknown field")]
    UnknownField { path: String },

    #[error("{path}: {value:?} is not one of [{allowed}]")]
    NotInEnum {
        path: String,
        value: String,
        allowed: String,
    },
}

impl ValidationError {
    /// Location of the offending value.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::MissingField { path }
            | ValidationError::TypeMismatch { path, .. }
            | ValidationError::UnknownField { path }
            | ValidationError::NotInEnum { path, .. } => path,
        }
    }
}

/// Check `value` against `schema`, handing the value back untouched on success.
pub fn validate(schema: &Schema, value: Value) -> Result<Value, ValidationError> {
    check(schema, &value, "$")?;
    Ok(value)
}

fn check(schema: &Schema, value: &Value, path: &str) -> Result<(), ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: schema.kind().to_string(),
        found: json_kind(value),
    };

    match schema {
        Schema::Any => Ok(()),
        Schema::String => value.is_string().then_some(()).ok_or_else(mismatch),
        Schema::Number => value.is_number().then_some(()).ok_or_else(mismatch),
        Schema::Integer => is_integer(value).then_some(()).ok_or_else(mismatch),
        Schema::Boolean => value.is_boolean().then_some(()).ok_or_else(mismatch),
        Schema::Enum { values } => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if values.iter().any(|v| v == s) {
                Ok(())
            } else {
                Err(ValidationError::NotInEnum {
                    path: path.to_string(),
                    value: s.to_string(),
                    allowed: values.join(", "),
                })
            }
        }
        Schema::Array { items } => {
            let arr = value.as_array().ok_or_else(mismatch)?;
            for (i, item) in arr.iter().enumerate() {
                check(items, item, &format!("{}[{}]", path, i))?;
            }
            Ok(())
        }
        Schema::Object(object) => {
            let map = value.as_object().ok_or_else(mismatch)?;
            for field in &object.fields {
                let field_path = format!("{}.{}", path, field.name);
                match map.get(&field.name) {
                    None if field.required => {
                        return Err(ValidationError::MissingField { path: field_path })
                    }
                    None => {}
                    Some(Value::Null) if !field.required => {}
                    Some(v) => check(&field.schema, v, &field_path)?,
                }
            }
            if !object.allow_additional {
                if let Some(extra) = map.keys().find(|k| object.get(k).is_none()) {
                    return Err(ValidationError::UnknownField {
                        path: format!("{}.{}", path, extra),
                    });
                }
            }
            Ok(())
        }
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
        }
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Schema {
    /// Start building an object schema.
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    pub fn array(items: Schema) -> Self {
        Schema::Array {
            items: Box::new(items),
        }
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Schema::String => "string",
            Schema::Number => "number",
            Schema::Integer => "integer",
            Schema::Boolean => "boolean",
            Schema::Any => "any",
            Schema::Enum { .. } => "enum",
            Schema::Array { .. } => "array",
            Schema::Object(_) => "object",
        }
    }

    /// Whether every value valid under `produced` is also valid under `self`.
    ///
    /// Used when a workflow is committed to check that one step's output can
    /// feed the next step's input. `Any` on either side is accepted, since
    /// nothing more can be known statically.
    pub fn accepts(&self, produced: &Schema) -> bool {
        match (self, produced) {
            (Schema::Any, _) | (_, Schema::Any) => true,
            (Schema::String, Schema::String | Schema::Enum { .. }) => true,
            (Schema::Number, Schema::Number | Schema::Integer) => true,
            (Schema::Integer, Schema::Integer) => true,
            (Schema::Boolean, Schema::Boolean) => true,
            (Schema::Enum { values }, Schema::Enum { values: produced }) => {
                produced.iter().all(|p| values.contains(p))
            }
            (Schema::Array { items }, Schema::Array { items: produced }) => items.accepts(produced),
            (Schema::Object(consumer), Schema::Object(producer)) => {
                let fields_ok = consumer.fields.iter().all(|field| match producer.get(&field.name) {
                    Some(p) => (p.required || !field.required) && field.schema.accepts(&p.schema),
                    None => !field.required,
                });
                let extras_ok = consumer.allow_additional
                    || (!producer.allow_additional
                        && producer.fields.iter().all(|p| consumer.get(&p.name).is_some()));
                fields_ok && extras_ok
            }
            _ => false,
        }
    }

    /// Render as a JSON Schema document, for API discovery.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::String => serde_json::json!({ "type": "string" }),
            Schema::Number => serde_json::json!({ "type": "number" }),
            Schema::Integer => serde_json::json!({ "type": "integer" }),
            Schema::Boolean => serde_json::json!({ "type": "boolean" }),
            Schema::Any => serde_json::json!({}),
            Schema::Enum { values } => serde_json::json!({ "type": "string", "enum": values }),
            Schema::Array { items } => {
                serde_json::json!({ "type": "array", "items": items.to_json_schema() })
            }
            Schema::Object(object) => {
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for field in &object.fields {
                    let mut prop = field.schema.to_json_schema();
                    if let (Some(desc), Some(obj)) = (&field.description, prop.as_object_mut()) {
                        obj.insert("description".to_string(), Value::String(desc.clone()));
                    }
                    properties.insert(field.name.clone(), prop);
                    if field.required {
                        required.push(Value::String(field.name.clone()));
                    }
                }
                serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": object.allow_additional,
                })
            }
        }
    }
}

impl ObjectSchema {
    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema,
            required: true,
            description: None,
        });
        self
    }

    /// Add an optional field (absent or `null` are both accepted).
    pub fn optional(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema,
            required: false,
            description: None,
        });
        self
    }

    /// Attach a description to the most recently added field.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.description = Some(description.into());
        }
        self
    }

    pub fn allow_additional(mut self) -> Self {
        self.allow_additional = true;
        self
    }

    pub fn build(self) -> Schema {
        Schema::Object(self)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_schema() -> Schema {
        Schema::object()
            .field("input", Schema::String)
            .optional("limit", Schema::Integer)
            .build()
    }

    #[test]
    fn test_valid_value_passes_through_unchanged() {
        let value = json!({ "input": "ibuprofen", "limit": 3 });
        assert_eq!(validate(&query_schema(), value.clone()).unwrap(), value);
    }

    #[test]
    fn test_missing_required_field() {
        let err = validate(&query_schema(), json!({ "limit": 1 })).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                path: "$.input".to_string()
            }
        );
    }

    #[test]
    fn test_type_mismatch_reports_kinds() {
        let err = validate(&query_schema(), json!({ "input": 42 })).unwrap_err();
        match err {
            ValidationError::TypeMismatch {
                path,
                expected,
                found,
            } => {
                assert_eq!(path, "$.input");
                assert_eq!(expected, "string");
                assert_eq!(found, "number");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_optional_field_accepts_null_and_absence() {
        assert!(validate(&query_schema(), json!({ "input": "x", "limit": null })).is_ok());
        assert!(validate(&query_schema(), json!({ "input": "x" })).is_ok());
    }

    #[test]
    fn test_additional_fields_rejected_unless_allowed() {
        let value = json!({ "input": "x", "extra": true });
        let err = validate(&query_schema(), value.clone()).unwrap_err();
        assert_eq!(err.path(), "$.extra");

        let open = Schema::object()
            .field("input", Schema::String)
            .allow_additional()
            .build();
        assert!(validate(&open, value).is_ok());
    }

    #[test]
    fn test_nested_array_path() {
        let schema = Schema::object()
            .field("products", Schema::array(Schema::String))
            .build();
        let err = validate(&schema, json!({ "products": ["a", 1] })).unwrap_err();
        assert_eq!(err.path(), "$.products[1]");
    }

    #[test]
    fn test_enum_values() {
        let schema = Schema::one_of(["OTC", "Prescription"]);
        assert!(validate(&schema, json!("OTC")).is_ok());
        let err = validate(&schema, json!("Maybe")).unwrap_err();
        assert!(matches!(err, ValidationError::NotInEnum { .. }));
    }

    #[test]
    fn test_integer_accepts_whole_floats_only() {
        assert!(validate(&Schema::Integer, json!(2.0)).is_ok());
        assert!(validate(&Schema::Integer, json!(2.5)).is_err());
    }

    #[test]
    fn test_accepts_structural_compatibility() {
        let produced = Schema::object()
            .field("intent", Schema::String)
            .field("input", Schema::String)
            .build();
        let consumer = Schema::object()
            .field("intent", Schema::String)
            .field("input", Schema::String)
            .optional("note", Schema::String)
            .build();
        assert!(consumer.accepts(&produced));

        // Producer emits a field the consumer does not know about.
        assert!(!query_schema().accepts(&produced));
        assert!(Schema::Number.accepts(&Schema::Integer));
        assert!(!Schema::Integer.accepts(&Schema::Number));
    }

    #[test]
    fn test_schema_round_trips_through_yaml() {
        let yaml = r#"
type: object
fields:
  - name: drug
    schema: { type: string }
  - name: availability
    required: false
    schema:
      type: enum
      values: [OTC, Prescription]
"#;
        let schema: Schema = serde_yaml::from_str(yaml).unwrap();
        assert!(validate(&schema, json!({ "drug": "aspirin", "availability": "OTC" })).is_ok());
        assert!(validate(&schema, json!({ "drug": "aspirin", "availability": "?" })).is_err());
    }

    #[test]
    fn test_to_json_schema() {
        let schema = Schema::object()
            .field("query", Schema::String)
            .describe("Drug name")
            .build();
        let json = schema.to_json_schema();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["query"]["description"], "Drug name");
        assert_eq!(json["required"], json!(["query"]));
        assert_eq!(json["additionalProperties"], false);
    }
}
