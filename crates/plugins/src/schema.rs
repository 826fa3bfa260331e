//! Declarative plugin configuration schemas.

use serde_json::Value;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Bool,
    Object,
    Array,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
}

/// Object schema a plugin declares for its manifest `config` block.
/// Unknown keys are allowed; `null` counts as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSchema {
    fields: Vec<FieldSpec>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn validate(&self, config: &Value) -> Result<(), SchemaError> {
        let object = config.as_object().ok_or(SchemaError::NotAnObject {
            found: describe(config),
        })?;

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchemaError::MissingField(field.name.clone()));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.matches(value) => {
                    return Err(SchemaError::WrongType {
                        field: field.name.clone(),
                        expected: field.kind,
                        found: describe(value),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("plugin config must be an object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be {expected}, found {found}")]
    WrongType {
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
    #[error("config does not match plugin settings: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new()
            .required("configValue", FieldKind::String)
            .required("otherConfigValue", FieldKind::Number)
            .optional("retries", FieldKind::Integer)
    }

    #[test]
    fn accepts_matching_config_with_extra_keys() {
        let config = json!({
            "configValue": "x",
            "otherConfigValue": 1.5,
            "unrelated": true
        });
        assert_eq!(schema().validate(&config), Ok(()));
    }

    #[test]
    fn reports_missing_required_field() {
        let config = json!({"configValue": "x", "otherConfigValue": null});
        assert_eq!(
            schema().validate(&config),
            Err(SchemaError::MissingField("otherConfigValue".into()))
        );
    }

    #[test]
    fn reports_wrong_types() {
        let config = json!({"configValue": "x", "otherConfigValue": 2, "retries": 1.5});
        let err = schema().validate(&config).unwrap_err();
        assert_eq!(
            err,
            SchemaError::WrongType {
                field: "retries".into(),
                expected: FieldKind::Integer,
                found: "number",
            }
        );
        assert_eq!(err.to_string(), "field `retries` must be integer, found number");
    }

    #[test]
    fn rejects_non_object_config() {
        assert_eq!(
            schema().validate(&json!([1, 2])),
            Err(SchemaError::NotAnObject { found: "array" })
        );
    }
}
