//! Typed structured-output support for completion calls.
//!
//! Each structured call site in the workflow declares a small
//! `JsonSchema + Deserialize` struct; the schema is generated with
//! `schemars` and massaged into the strict form the OpenAI API expects:
//! `additionalProperties: false` on every object, every property listed in
//! `required`, and all `$ref`s inlined.

use anyhow::{Context, Result};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use super::traits::BaseCompletion;

/// Types usable as a schema-constrained completion response.
///
/// Blanket-implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// JSON schema in OpenAI strict-mode form.
    fn response_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = value.get("definitions").cloned();
        tighten(&mut value, definitions.as_ref());

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn schema_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Run a schema-constrained completion and deserialize the result.
pub async fn extract<T: StructuredOutput>(
    ai: &dyn BaseCompletion,
    instructions: &str,
    input: &str,
) -> Result<T> {
    let raw = ai
        .complete_structured(instructions, input, &<T as StructuredOutput>::schema_name(), T::response_schema())
        .await?;

    serde_json::from_str(&raw)
        .with_context(|| format!("Structured response did not match {}", <T as StructuredOutput>::schema_name()))
}

/// Recursively inline `$ref`s and put object schemas into strict form.
fn tighten(value: &mut serde_json::Value, definitions: Option<&serde_json::Value>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.and_then(|d| d.get(name)) {
                        *value = def.clone();
                        tighten(value, definitions);
                        return;
                    }
                }
            }

            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                // Strict mode wants every property required, nullable or not.
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let keys: Vec<serde_json::Value> = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(keys));
                }
            }

            for (_, v) in map.iter_mut() {
                tighten(v, definitions);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                tighten(item, definitions);
            }
        }
        _ => {}
    }
}
