use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types that can be requested as schema-constrained LLM output.
///
/// Automatically implemented for any `JsonSchema + DeserializeOwned` type.
/// The generated schema is the strict dialect both providers accept:
/// 1. `additionalProperties: false` on every object
/// 2. every property listed in `required`, nullable ones included
/// 3. no `$ref`s, all definitions inlined
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        require_all_properties(&mut value);
        inline_refs(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn require_all_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let keys: Vec<Value> = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".to_string(), Value::Array(keys));
                }
            }

            for v in map.values_mut() {
                require_all_properties(v);
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(require_all_properties),
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(def) = ref_path
                    .strip_prefix("#/definitions/")
                    .and_then(|name| definitions.get(name))
                {
                    *value = def.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            // schemars wraps documented nested structs in a single-element allOf
            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [only] = all_of.as_slice() {
                    *value = only.clone();
                    inline_refs_recursive(value, definitions);
                    return;
                }
            }

            for v in map.values_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Story {
        summary: String,
        sources: Vec<String>,
        headline: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct StoryList {
        items: Vec<Story>,
    }

    #[test]
    fn schema_is_an_object_without_definitions() {
        let schema = StoryList::strict_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));
        assert_eq!(obj.get("additionalProperties"), Some(&Value::Bool(false)));
    }

    #[test]
    fn nullable_fields_are_still_required() {
        let schema = Story::strict_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("should have required array")
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"summary"));
        assert!(required.contains(&"sources"));
        assert!(required.contains(&"headline"));
    }

    #[test]
    fn nested_item_schema_is_inlined() {
        let schema = StoryList::strict_schema();
        let items = &schema["properties"]["items"]["items"];

        assert!(items.get("$ref").is_none());
        assert_eq!(items["type"], Value::String("object".to_string()));
        assert_eq!(items["additionalProperties"], Value::Bool(false));
    }
}
