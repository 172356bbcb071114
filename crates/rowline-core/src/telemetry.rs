//! Structured telemetry records over the `log` facade
//!
//! Downstream log tooling consumes one JSON object per line with an
//! `action` discriminator; everything else about formatting belongs to the
//! sink, not to emitters.

use serde_json::Value;

/// Emit one structured record. `fields` should be a JSON object; the
/// `action` key is added (and wins on collision).
pub fn emit(action: &str, fields: Value) {
    let mut fields = fields;
    match &mut fields {
        Value::Object(map) => {
            map.insert("action".to_string(), Value::String(action.to_string()));
            log::info!("{}", Value::Object(std::mem::take(map)));
        }
        other => {
            log::info!("{}", serde_json::json!({ "action": action, "detail": other }));
        }
    }
}

/// Field-name fragments whose values are masked in logs.
const SENSITIVE_NAMES: [&str; 6] = ["password", "ssn", "credit_card", "secret", "token", "key"];

const MASK: &str = "***REDACTED***";

/// Copy of `value` with sensitive fields masked, recursively through
/// objects and arrays. Row data passes through here before it is logged.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if SENSITIVE_NAMES.iter().any(|name| lower.contains(name)) {
                        (k.clone(), Value::String(MASK.to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
