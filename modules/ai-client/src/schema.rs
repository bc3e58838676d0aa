use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Nesting limit for `$ref` resolution. Recursive types stop expanding here.
const MAX_REF_DEPTH: usize = 16;

/// Types usable as a forced tool-call payload.
///
/// Automatically implemented for any type that implements `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Generate a self-contained JSON schema for this type.
    ///
    /// The schema is strict: `additionalProperties: false` on every object,
    /// every property listed in `required` (nullable ones included), and no
    /// `$ref` indirection left behind.
    fn tool_schema() -> Value {
        let Ok(Value::Object(mut root)) = serde_json::to_value(schema_for!(Self)) else {
            return Value::Null;
        };
        let definitions = match root.remove("definitions") {
            Some(Value::Object(defs)) => defs,
            _ => Map::new(),
        };
        root.remove("$schema");

        strict(Value::Object(root), &definitions, 0)
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Rebuilds `node` with references resolved and every object closed.
fn strict(node: Value, definitions: &Map<String, Value>, depth: usize) -> Value {
    match node {
        Value::Object(map) => {
            if depth < MAX_REF_DEPTH {
                if let Some(target) = referenced(&map, definitions) {
                    return strict(target, definitions, depth + 1);
                }
            }

            let mut map: Map<String, Value> = map
                .into_iter()
                .map(|(key, child)| (key, strict(child, definitions, depth)))
                .collect();

            if map.get("type").and_then(Value::as_str) == Some("object") {
                let required: Option<Vec<Value>> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect());
                if let Some(required) = required {
                    map.insert("required".to_string(), Value::Array(required));
                }
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            Value::Object(map)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| strict(item, definitions, depth))
                .collect(),
        ),
        leaf => leaf,
    }
}

/// The schema `map` stands in for: a `#/definitions/` target, or the sole
/// member of the `allOf` schemars wraps around documented refs.
fn referenced(map: &Map<String, Value>, definitions: &Map<String, Value>) -> Option<Value> {
    let target = map
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|path| path.strip_prefix("#/definitions/"))
        .and_then(|name| definitions.get(name));
    if let Some(target) = target {
        return Some(target.clone());
    }

    match map.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
        Some([only]) => Some(only.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Mention {
        email: String,
        display_name: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct ParsedMail {
        sender: Mention,
        recipients: Vec<Mention>,
        subject: String,
    }

    #[test]
    fn strict_objects_everywhere() {
        let schema = ParsedMail::tool_schema();
        let schema_str = serde_json::to_string(&schema).unwrap();
        assert!(schema_str.contains("\"additionalProperties\":false"));
        assert!(!schema_str.contains("$ref"));
    }

    #[test]
    fn nullable_properties_still_required() {
        let schema = Mention::tool_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"email"));
        assert!(required.contains(&"display_name"));
    }

    #[test]
    fn nested_struct_inlined() {
        let schema = ParsedMail::tool_schema();
        let schema_obj = schema.as_object().unwrap();

        assert!(!schema_obj.contains_key("definitions"));
        assert!(!schema_obj.contains_key("$schema"));

        let sender = &schema["properties"]["sender"];
        assert_eq!(sender["type"], "object");
        assert_eq!(sender["additionalProperties"], false);

        let item = &schema["properties"]["recipients"]["items"];
        assert_eq!(item["type"], "object");
    }

    #[derive(Deserialize, JsonSchema)]
    struct Thread {
        subject: String,
        /// Earlier message in the thread, if any.
        parent: Option<Box<Thread>>,
    }

    #[test]
    fn self_referencing_type_terminates() {
        let schema = Thread::tool_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["additionalProperties"], false);
        assert!(schema["properties"]["parent"].is_object());
    }
}
