use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::GenerationError;

/// JSON kind expected for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Array,
    Object,
}

impl FieldKind {
    fn label(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Required fields of a structured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

/// A record type the service can be asked to produce.
pub trait StructuredOutput: DeserializeOwned {
    const SCHEMA: Schema;
}

impl Schema {
    /// Append output-format instructions to `prompt`.
    pub fn instruct(&self, prompt: &str) -> String {
        let mut out = String::with_capacity(prompt.len() + 256);
        out.push_str(prompt);
        out.push_str("\n\nRespond with ONLY a JSON object, no other text, with these fields:\n");
        for field in self.fields {
            out.push_str(&format!("- \"{}\" ({})\n", field.name, field.kind.label()));
        }
        out
    }

    /// Extract and conform a record from raw service output.
    pub fn parse(&self, text: &str) -> Result<Value, GenerationError> {
        let body = extract_json_object(text)
            .ok_or_else(|| GenerationError::malformed(self.name, "no JSON object in output"))?;
        let value: Value = serde_json::from_str(body)
            .map_err(|e| GenerationError::malformed(self.name, e.to_string()))?;
        match value {
            Value::Object(map) => self.conform(map).map(Value::Object),
            other => Err(GenerationError::malformed(
                self.name,
                format!("expected an object, got {other}"),
            )),
        }
    }

    fn conform(&self, mut map: Map<String, Value>) -> Result<Map<String, Value>, GenerationError> {
        for field in self.fields {
            let value = map.get_mut(field.name).ok_or_else(|| {
                GenerationError::malformed(self.name, format!("missing field `{}`", field.name))
            })?;
            // Lists and nested records sometimes arrive double-encoded as strings.
            if matches!(field.kind, FieldKind::Array | FieldKind::Object) {
                if let Some(decoded) = value.as_str().and_then(|s| serde_json::from_str::<Value>(s).ok()) {
                    *value = decoded;
                }
            }
            if !field.kind.matches(value) {
                return Err(GenerationError::malformed(
                    self.name,
                    format!("field `{}` is not a {}", field.name, field.kind.label()),
                ));
            }
        }
        Ok(map)
    }
}

/// Strip code fences and surrounding prose, returning the outermost `{...}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}
