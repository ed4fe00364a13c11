//! Structured text classification
//!
//! The model is offered a single `classification` tool whose parameters are
//! the schema; whatever comes back (tool-call arguments, or a JSON object in
//! the text) is coerced field by field. Enum fields always end up holding a
//! declared value, spelled the way the schema spells it.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::TaskerError;
use crate::extract;
use crate::llm::{LLMConfig, LLMProvider};
use crate::state::Message;
use crate::tools::ToolDefinition;

pub const CLASSIFICATION_TOOL: &str = "classification";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Allowed values; strings match case-insensitively
    Enum(Vec<Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

/// Named, typed fields the classifier must fill
///
/// ```
/// use rig_taskerbot::classifier::ClassificationSchema;
///
/// let schema = ClassificationSchema::new()
///     .string("intention", "What the user wants")
///     .enumeration("sentiment", ["happy", "neutral", "sad"], "Overall mood")
///     .integer("aggressiveness", "1 (calm) to 5 (hostile)");
/// assert_eq!(schema.fields().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationSchema {
    fields: Vec<FieldSpec>,
}

impl ClassificationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    fn required(self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.field(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        })
    }

    pub fn string(self, name: &str, description: &str) -> Self {
        self.required(name, FieldKind::String, description)
    }

    pub fn integer(self, name: &str, description: &str) -> Self {
        self.required(name, FieldKind::Integer, description)
    }

    pub fn number(self, name: &str, description: &str) -> Self {
        self.required(name, FieldKind::Number, description)
    }

    pub fn boolean(self, name: &str, description: &str) -> Self {
        self.required(name, FieldKind::Boolean, description)
    }

    pub fn enumeration<I, V>(self, name: &str, values: I, description: &str) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.required(name, FieldKind::Enum(values), description)
    }

    /// Mark an already declared field as optional
    pub fn optional(mut self, name: &str) -> Self {
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.required = false;
        }
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = Map::new();
            match &field.kind {
                FieldKind::String => {
                    property.insert("type".into(), "string".into());
                }
                FieldKind::Integer => {
                    property.insert("type".into(), "integer".into());
                }
                FieldKind::Number => {
                    property.insert("type".into(), "number".into());
                }
                FieldKind::Boolean => {
                    property.insert("type".into(), "boolean".into());
                }
                FieldKind::Enum(values) => {
                    let kind = if values.iter().all(Value::is_i64) {
                        "integer"
                    } else if values.iter().all(Value::is_number) {
                        "number"
                    } else {
                        "string"
                    };
                    property.insert("type".into(), kind.into());
                    property.insert("enum".into(), Value::Array(values.clone()));
                }
            }
            if !field.description.is_empty() {
                property.insert("description".into(), field.description.clone().into());
            }
            properties.insert(field.name.clone(), Value::Object(property));
        }

        let required: Vec<Value> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.clone().into())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Coerce raw model output to the schema.
    ///
    /// Unknown keys are dropped; optional fields that are absent or null are
    /// left out of the result.
    pub fn coerce(&self, raw: &Map<String, Value>) -> Result<Map<String, Value>, TaskerError> {
        let mut out = Map::new();
        for field in &self.fields {
            match raw.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(TaskerError::SchemaValidation(format!(
                        "missing required field '{}'",
                        field.name
                    )));
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    let coerced = coerce_value(&field.kind, value).ok_or_else(|| {
                        TaskerError::SchemaValidation(format!(
                            "field '{}' has invalid value {value}",
                            field.name
                        ))
                    })?;
                    out.insert(field.name.clone(), coerced);
                }
            }
        }
        Ok(out)
    }
}

fn coerce_value(kind: &FieldKind, value: &Value) -> Option<Value> {
    match (kind, value) {
        (FieldKind::String, Value::String(_)) => Some(value.clone()),
        (FieldKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

        (FieldKind::Integer, _) => as_i64(value).map(Value::from),

        (FieldKind::Number, Value::Number(_)) => Some(value.clone()),
        (FieldKind::Number, Value::String(s)) => {
            s.trim().parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
        }

        (FieldKind::Boolean, Value::Bool(_)) => Some(value.clone()),
        (FieldKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },

        (FieldKind::Enum(allowed), _) => allowed.iter().find(|v| enum_matches(v, value)).cloned(),

        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| fits_i64(*f)).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whole and inside the `i64` range, so the cast cannot saturate
fn fits_i64(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn enum_matches(declared: &Value, candidate: &Value) -> bool {
    match declared {
        Value::String(d) => candidate
            .as_str()
            .is_some_and(|c| c.trim().to_lowercase() == d.trim().to_lowercase()),
        Value::Number(_) => match (declared.as_i64(), as_i64(candidate)) {
            (Some(d), Some(c)) => d == c,
            _ => declared.as_f64().is_some_and(|d| candidate.as_f64() == Some(d)),
        },
        other => other == candidate,
    }
}

/// Classifies text against a [`ClassificationSchema`] in one model call
pub struct TextClassifier {
    llm: Arc<dyn LLMProvider>,
    config: LLMConfig,
    instructions: String,
}

impl TextClassifier {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        let config = LLMConfig::new(llm.default_model()).with_temperature(0.0);
        Self {
            llm,
            config,
            instructions: format!(
                "Extract the requested properties from the user's text. \
                 Respond only by calling the `{CLASSIFICATION_TOOL}` function; \
                 use exactly the allowed values for enumerated fields."
            ),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = config;
        self
    }

    /// # Errors
    ///
    /// [`TaskerError::SchemaValidation`] when the reply has no structured
    /// output or a field cannot be coerced; model errors as returned by the
    /// provider. Nothing is retried.
    pub async fn classify(
        &self,
        text: &str,
        schema: &ClassificationSchema,
    ) -> Result<Map<String, Value>, TaskerError> {
        let tool = ToolDefinition {
            name: CLASSIFICATION_TOOL.to_string(),
            description: "Record the classification of the text".to_string(),
            parameters: schema.to_json_schema(),
        };
        let messages = [Message::system(&self.instructions), Message::user(text)];

        let response = self.llm.complete(&messages, &[tool], Some(&self.config)).await?;
        let message = response.message;

        let calls = message.tool_calls.unwrap_or_default();
        let raw = match calls.iter().find(|c| c.name == CLASSIFICATION_TOOL).or(calls.first()) {
            Some(call) => match &call.arguments {
                Value::Object(map) => Some(map.clone()),
                Value::String(s) => extract::json_object(s),
                _ => None,
            },
            None => extract::json_object(&message.content),
        }
        .ok_or_else(|| {
            TaskerError::SchemaValidation(format!("no structured output in reply: {:?}", message.content))
        })?;

        let record = schema.coerce(&raw)?;
        debug!(fields = record.len(), "Text classified");
        Ok(record)
    }

    /// [`classify`](Self::classify), deserialised into `T`
    pub async fn classify_as<T: DeserializeOwned>(
        &self,
        text: &str,
        schema: &ClassificationSchema,
    ) -> Result<T, TaskerError> {
        let record = self.classify(text, schema).await?;
        serde_json::from_value(Value::Object(record))
            .map_err(|e| TaskerError::SchemaValidation(e.to_string()))
    }
}
