//! Runtime-checked payload shapes.

use std::fmt;

use serde_json::{Map, Value, json};

/// Description of an accepted or produced JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Any JSON value.
    Any,
    /// `null` only.
    Null,
    /// `true` or `false`.
    Boolean,
    /// Any JSON number.
    Number,
    /// A number without a fractional part.
    Integer,
    /// A JSON string.
    String,
    /// An array whose items all match the inner schema.
    Array(Box<Schema>),
    /// An object with declared fields.
    Object(ObjectSchema),
    /// The inner schema or `null`.
    Nullable(Box<Schema>),
}

/// Fields of an object schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    fields: Vec<Field>,
    additional: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    name: String,
    schema: Schema,
    required: bool,
}

impl ObjectSchema {
    /// Declares a field that must be present.
    #[must_use]
    pub fn required(self, name: impl Into<String>, schema: Schema) -> Self {
        self.field(name, schema, true)
    }

    /// Declares a field that may be absent or `null`.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, schema: Schema) -> Self {
        self.field(name, schema, false)
    }

    /// Accepts fields that are not declared.
    #[must_use]
    pub const fn allow_additional(mut self) -> Self {
        self.additional = true;
        self
    }

    fn field(mut self, name: impl Into<String>, schema: Schema, required: bool) -> Self {
        self.fields.push(Field {
            name: name.into(),
            schema,
            required,
        });
        self
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Self::Object(object)
    }
}

impl Schema {
    /// Starts an object schema with no fields.
    #[must_use]
    pub fn object() -> ObjectSchema {
        ObjectSchema::default()
    }

    /// Object schema that accepts only `{}`.
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(ObjectSchema::default())
    }

    /// Array of `items`.
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self::Array(Box::new(items))
    }

    /// `inner` or `null`.
    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// Checks `value` against the schema.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaViolation`] found, depth first.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        match (self, value) {
            (Self::Any, _)
            | (Self::Null, Value::Null)
            | (Self::Boolean, Value::Bool(_))
            | (Self::Number, Value::Number(_))
            | (Self::String, Value::String(_))
            | (Self::Nullable(_), Value::Null) => Ok(()),
            (Self::Integer, Value::Number(number)) if number.is_i64() || number.is_u64() => Ok(()),
            (Self::Nullable(inner), _) => inner.validate_at(value, path),
            (Self::Array(items), Value::Array(values)) => values
                .iter()
                .enumerate()
                .try_for_each(|(index, item)| items.validate_at(item, &format!("{path}[{index}]"))),
            (Self::Object(object), Value::Object(map)) => object.validate_map(map, path),
            _ => Err(SchemaViolation::TypeMismatch {
                path: path.to_owned(),
                expected: self.type_label(),
                found: value_label(value),
            }),
        }
    }

    fn type_label(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Nullable(inner) => inner.type_label(),
        }
    }

    /// Renders the schema as a JSON Schema document.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Any => json!({}),
            Self::Null => json!({"type": "null"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Number => json!({"type": "number"}),
            Self::Integer => json!({"type": "integer"}),
            Self::String => json!({"type": "string"}),
            Self::Array(items) => json!({"type": "array", "items": items.to_json()}),
            Self::Object(object) => object.to_json(),
            Self::Nullable(inner) => json!({"anyOf": [inner.to_json(), {"type": "null"}]}),
        }
    }
}

impl ObjectSchema {
    fn validate_map(&self, map: &Map<String, Value>, path: &str) -> Result<(), SchemaViolation> {
        for field in &self.fields {
            let field_path = format!("{path}.{}", field.name);
            match map.get(&field.name) {
                None if field.required => {
                    return Err(SchemaViolation::MissingField { path: field_path });
                }
                None => {}
                Some(Value::Null) if !field.required => {}
                Some(value) => field.schema.validate_at(value, &field_path)?,
            }
        }
        if !self.additional
            && let Some(unexpected) = map
                .keys()
                .find(|key| !self.fields.iter().any(|field| &field.name == *key))
        {
            return Err(SchemaViolation::UnexpectedField {
                path: format!("{path}.{unexpected}"),
            });
        }
        Ok(())
    }

    fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.schema.to_json()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.additional,
        })
    }
}

fn value_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A mismatch between a value and its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The value has the wrong JSON type.
    TypeMismatch {
        /// Location of the value, `$` being the root.
        path: String,
        /// Type required by the schema.
        expected: &'static str,
        /// Type actually found.
        found: &'static str,
    },
    /// A required field is absent.
    MissingField {
        /// Location of the missing field.
        path: String,
    },
    /// An undeclared field is present.
    UnexpectedField {
        /// Location of the extra field.
        path: String,
    },
}

impl SchemaViolation {
    /// Location of the violation.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::TypeMismatch { path, .. }
            | Self::MissingField { path }
            | Self::UnexpectedField { path } => path,
        }
    }

    /// Structured form attached to `error` envelopes.
    #[must_use]
    pub fn to_details(&self) -> Value {
        match self {
            Self::TypeMismatch {
                path,
                expected,
                found,
            } => json!({"path": path, "expected": expected, "found": found}),
            Self::MissingField { path } => json!({"path": path, "missing": true}),
            Self::UnexpectedField { path } => json!({"path": path, "unexpected": true}),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                path,
                expected,
                found,
            } => write!(formatter, "{path}: expected {expected}, found {found}"),
            Self::MissingField { path } => write!(formatter, "{path}: required field is missing"),
            Self::UnexpectedField { path } => write!(formatter, "{path}: field is not allowed"),
        }
    }
}

impl std::error::Error for SchemaViolation {}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn authenticate_input() -> Schema {
        Schema::object()
            .optional("token", Schema::String)
            .optional("client", Schema::String)
            .into()
    }

    #[rstest]
    #[case::empty(json!({}))]
    #[case::token(json!({"token": "secret"}))]
    #[case::null_token(json!({"token": null, "client": "cli"}))]
    fn accepts_valid_objects(#[case] value: Value) {
        assert!(authenticate_input().validate(&value).is_ok());
    }

    #[test]
    fn reports_type_mismatch_with_path() {
        let error = authenticate_input()
            .validate(&json!({"token": 7}))
            .expect_err("token must be a string");
        assert_eq!(
            error,
            SchemaViolation::TypeMismatch {
                path: "$.token".to_owned(),
                expected: "string",
                found: "integer",
            }
        );
    }

    #[test]
    fn reports_missing_required_field() {
        let schema: Schema = Schema::object().required("payload", Schema::Any).into();
        let error = schema.validate(&json!({})).expect_err("payload is required");
        assert_eq!(error.path(), "$.payload");
    }

    #[test]
    fn required_any_accepts_null() {
        let schema: Schema = Schema::object().required("payload", Schema::Any).into();
        assert!(schema.validate(&json!({"payload": null})).is_ok());
    }

    #[test]
    fn rejects_undeclared_fields() {
        let error = Schema::empty_object()
            .validate(&json!({"surprise": true}))
            .expect_err("closed object");
        assert!(matches!(error, SchemaViolation::UnexpectedField { .. }));
    }

    #[test]
    fn additional_fields_can_be_allowed() {
        let schema: Schema = Schema::object().allow_additional().into();
        assert!(schema.validate(&json!({"anything": [1, 2]})).is_ok());
    }

    #[test]
    fn validates_array_items() {
        let schema = Schema::array(Schema::Integer);
        let error = schema
            .validate(&json!([1, 2, 2.5]))
            .expect_err("fractional item");
        assert_eq!(error.path(), "$[2]");
    }

    #[test]
    fn renders_json_schema() {
        let schema: Schema = Schema::object()
            .required("payload", Schema::Any)
            .optional("note", Schema::nullable(Schema::String))
            .into();
        assert_eq!(
            schema.to_json(),
            json!({
                "type": "object",
                "properties": {
                    "payload": {},
                    "note": {"anyOf": [{"type": "string"}, {"type": "null"}]}
                },
                "required": ["payload"],
                "additionalProperties": false
            })
        );
    }
}
