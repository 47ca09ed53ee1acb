// Copyright 2025 Oxide Computer Company

//! Declared model schemas for structured request bodies
//!
//! Rust has no runtime type reflection, so model types declare their field
//! lists explicitly at registration time.  A [`ModelSchema`] plays the role
//! a model class plays in annotation-driven frameworks: the request body is
//! deserialized into a generic JSON value and then validated field by field
//! into a typed [`Value::Model`].
//!
//! Validation is deliberately tolerant in one direction: a JSON string in a
//! position where the field wants a richer scalar (UUID, date, IP address)
//! is run through the conversion table, which is also what makes
//! url-encoded bodies (all strings on the wire) validate cleanly.  Unknown
//! fields are ignored.

use crate::conversion::SemanticType;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// The declared type of a single model field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    /// A scalar converted via the conversion table.
    Scalar(SemanticType),
    /// A homogeneous array of the inner type.
    Sequence(Box<FieldType>),
    /// A nested model.
    Model(Arc<ModelSchema>),
}

impl FieldType {
    fn describe(&self) -> String {
        match self {
            FieldType::Scalar(ty) => ty.to_string(),
            FieldType::Sequence(inner) => {
                format!("sequence of {}", inner.describe())
            }
            FieldType::Model(schema) => format!("model {}", schema.name()),
        }
    }
}

/// One declared field of a model: its wire name, type, and whether a value
/// must be present.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldSpec {
    name: String,
    ty: FieldType,
    required: bool,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn required(&self) -> bool {
        self.required
    }
}

/// A registered structured-record type: a name plus an ordered field list.
///
/// Built once at registration time and shared read-only afterwards
/// (typically as an `Arc<ModelSchema>` referenced by several routes).
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

/// A validation failure, carrying the dotted path of the offending field
/// and the raw text that failed to convert.
#[derive(Debug, thiserror::Error)]
#[error("field {field:?}: expected {expected}, got {raw:?}")]
pub struct ValidationError {
    pub field: String,
    pub expected: String,
    pub raw: String,
}

impl ModelSchema {
    pub fn new<S: Into<String>>(name: S) -> ModelSchema {
        ModelSchema { name: name.into(), fields: Vec::new() }
    }

    /// Add a required field.
    pub fn field<S: Into<String>>(mut self, name: S, ty: FieldType) -> Self {
        self.fields.push(FieldSpec { name: name.into(), ty, required: true });
        self
    }

    /// Add an optional field.  A missing or null value validates to
    /// [`Value::Null`].
    pub fn optional<S: Into<String>>(
        mut self,
        name: S,
        ty: FieldType,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            ty,
            required: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validate a generic deserialized body against this schema, producing
    /// a typed model instance.  Fields are converted in declaration order;
    /// the first failure wins.
    pub fn validate(
        self: &Arc<Self>,
        raw: &serde_json::Value,
    ) -> Result<Value, ValidationError> {
        let Some(object) = raw.as_object() else {
            return Err(ValidationError {
                field: String::new(),
                expected: format!("model {}", self.name),
                raw: json_excerpt(raw),
            });
        };

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for spec in &self.fields {
            let value = match object.get(&spec.name) {
                None | Some(serde_json::Value::Null) => {
                    if spec.required {
                        return Err(ValidationError {
                            field: spec.name.clone(),
                            expected: spec.ty.describe(),
                            raw: String::new(),
                        });
                    }
                    Value::Null
                }
                Some(present) => {
                    convert_field(present, &spec.ty, &spec.name)?
                }
            };
            fields.insert(spec.name.clone(), value);
        }
        Ok(Value::Model(ModelInstance { schema: Arc::clone(self), fields }))
    }
}

/// A validated instance of a [`ModelSchema`]: the schema plus the typed
/// field values, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInstance {
    pub schema: Arc<ModelSchema>,
    pub fields: IndexMap<String, Value>,
}

impl ModelInstance {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

fn convert_field(
    raw: &serde_json::Value,
    ty: &FieldType,
    path: &str,
) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError {
        field: path.to_string(),
        expected: ty.describe(),
        raw: json_excerpt(raw),
    };

    match ty {
        FieldType::Scalar(semantic) => {
            convert_scalar(raw, *semantic).ok_or_else(mismatch)
        }
        FieldType::Sequence(inner) => {
            let Some(items) = raw.as_array() else {
                return Err(mismatch());
            };
            let mut converted = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, index);
                converted.push(convert_field(item, inner, &item_path)?);
            }
            Ok(Value::Sequence(converted))
        }
        FieldType::Model(schema) => {
            schema.validate(raw).map_err(|e| ValidationError {
                field: if e.field.is_empty() {
                    path.to_string()
                } else {
                    format!("{}.{}", path, e.field)
                },
                expected: e.expected,
                raw: e.raw,
            })
        }
    }
}

fn convert_scalar(
    raw: &serde_json::Value,
    semantic: SemanticType,
) -> Option<Value> {
    use serde_json::Value as Json;

    match (semantic, raw) {
        (SemanticType::Boolean, Json::Bool(b)) => Some(Value::Bool(*b)),
        // Numbers follow the same rule as decimal strings: zero is false,
        // anything else is true.
        (SemanticType::Boolean, Json::Number(n)) => {
            n.as_f64().map(|v| Value::Bool(v != 0.0))
        }
        (SemanticType::Integer, Json::Number(n)) => {
            n.as_i64().map(Value::Int)
        }
        (SemanticType::Float, Json::Number(n)) => {
            n.as_f64().map(Value::Float)
        }
        (SemanticType::String, Json::String(s)) => {
            Some(Value::String(s.clone()))
        }
        (SemanticType::Unit, Json::Null) => Some(Value::Null),
        // Strings in richer scalar positions go through the conversion
        // table.  This is also the path url-encoded bodies take.
        (_, Json::String(s)) => semantic.parse(s).ok(),
        _ => None,
    }
}

// The cut must land on a character boundary: the input is
// client-controlled and may put a multibyte character at the limit.
fn json_excerpt(raw: &serde_json::Value) -> String {
    const LIMIT: usize = 256;
    let mut text = raw.to_string();
    if text.len() > LIMIT {
        let mut cut = LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod test {
    use super::FieldType;
    use super::ModelSchema;
    use crate::conversion::SemanticType;
    use crate::value::Value;
    use std::sync::Arc;
    use uuid::Uuid;

    fn widget_schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new("Widget")
                .field("id", FieldType::Scalar(SemanticType::Uuid))
                .field("name", FieldType::Scalar(SemanticType::String))
                .optional("count", FieldType::Scalar(SemanticType::Integer)),
        )
    }

    #[test]
    fn test_validate_ok() {
        let schema = widget_schema();
        let body: serde_json::Value = serde_json::from_str(
            r#"{
                "id": "8c2cf754-3176-4a63-9f91-23ce1e38a0b9",
                "name": "doodad",
                "count": 3,
                "ignored": "extra fields are fine"
            }"#,
        )
        .unwrap();
        let Value::Model(instance) = schema.validate(&body).unwrap() else {
            panic!("expected a model instance");
        };
        assert_eq!(
            instance.get("id"),
            Some(&Value::Uuid(
                Uuid::parse_str("8c2cf754-3176-4a63-9f91-23ce1e38a0b9")
                    .unwrap()
            ))
        );
        assert_eq!(instance.get("count"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_validate_missing_and_optional() {
        let schema = widget_schema();
        let body = serde_json::json!({
            "id": "8c2cf754-3176-4a63-9f91-23ce1e38a0b9",
            "name": "doodad"
        });
        let Value::Model(instance) = schema.validate(&body).unwrap() else {
            panic!("expected a model instance");
        };
        assert_eq!(instance.get("count"), Some(&Value::Null));

        let body = serde_json::json!({ "name": "doodad" });
        let error = schema.validate(&body).unwrap_err();
        assert_eq!(error.field, "id");
    }

    #[test]
    fn test_validate_coerces_string_scalars() {
        let schema = Arc::new(ModelSchema::new("Event").field(
            "when",
            FieldType::Scalar(SemanticType::DateTime),
        ));
        let body = serde_json::json!({
            "when": "2024-03-03T20:25:50.286858+00:00"
        });
        let Value::Model(instance) = schema.validate(&body).unwrap() else {
            panic!("expected a model instance");
        };
        assert!(matches!(instance.get("when"), Some(Value::DateTime(_))));

        let body = serde_json::json!({ "when": "whenever" });
        assert!(schema.validate(&body).is_err());
    }

    #[test]
    fn test_validate_nested() {
        let inner = widget_schema();
        let schema = Arc::new(
            ModelSchema::new("Order")
                .field("widgets", FieldType::Sequence(Box::new(
                    FieldType::Model(inner),
                )))
                .field("total", FieldType::Scalar(SemanticType::Float)),
        );
        let body = serde_json::json!({
            "widgets": [{
                "id": "8c2cf754-3176-4a63-9f91-23ce1e38a0b9",
                "name": "doodad"
            }],
            "total": 9.75
        });
        assert!(schema.validate(&body).is_ok());

        let body = serde_json::json!({
            "widgets": [{ "id": "nope", "name": "doodad" }],
            "total": 9.75
        });
        let error = schema.validate(&body).unwrap_err();
        assert_eq!(error.field, "widgets[0].id");
    }

    #[test]
    fn test_validate_boolean_accepts_numbers() {
        let schema = Arc::new(ModelSchema::new("Toggle").field(
            "enabled",
            FieldType::Scalar(SemanticType::Boolean),
        ));
        for (body, expected) in [
            (serde_json::json!({ "enabled": 0 }), false),
            (serde_json::json!({ "enabled": 7 }), true),
            (serde_json::json!({ "enabled": true }), true),
            (serde_json::json!({ "enabled": "0" }), false),
        ] {
            let Value::Model(instance) = schema.validate(&body).unwrap()
            else {
                panic!("expected a model instance");
            };
            assert_eq!(
                instance.get("enabled"),
                Some(&Value::Bool(expected)),
                "body {}",
                body
            );
        }
    }

    // The error excerpt cuts long input at a character boundary, so a
    // multibyte character straddling the limit must not panic.
    #[test]
    fn test_validation_error_excerpt_cuts_on_char_boundary() {
        let schema = widget_schema();
        let body = serde_json::json!({
            "id": "é".repeat(200),
            "name": "doodad"
        });
        let error = schema.validate(&body).unwrap_err();
        assert_eq!(error.field, "id");
        assert!(error.raw.len() <= 256);
        assert!(error.raw.starts_with("\"é"));
    }

    #[test]
    fn test_validate_rejects_non_object() {
        let schema = widget_schema();
        let error =
            schema.validate(&serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(error.expected.contains("Widget"));
    }
}
