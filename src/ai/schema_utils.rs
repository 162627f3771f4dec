use schemars::{JsonSchema, schema_for};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::schema::{FieldKind, FieldSchema, RecordSchema};
use crate::error::DefinitionError;

/// Flattens a schemars document into the subset the model service accepts:
/// `$ref`s inlined, nullable type pairs collapsed, metadata stripped.
pub fn clean_schema<T: Serialize>(root: T) -> serde_json::Result<Value> {
    let mut root_val = serde_json::to_value(root)?;

    let definitions = root_val
        .get("definitions")
        .cloned()
        .or_else(|| root_val.get("$defs").cloned())
        .and_then(|d| d.as_object().cloned())
        .unwrap_or_default();

    process_schema_node(&mut root_val, &definitions, 0);

    if let Value::Object(ref mut map) = root_val {
        map.remove("$schema");
        map.remove("title");
        map.remove("definitions");
        map.remove("$defs");
        map.remove("$id");
    }

    Ok(root_val)
}

fn process_schema_node(node: &mut Value, definitions: &Map<String, Value>, depth: usize) {
    if depth > 20 {
        *node = json!({ "type": "object", "nullable": true });
        return;
    }

    // Resolve chains of $ref before borrowing the node as a map.
    let mut resolve_attempts = 0;
    loop {
        let ref_target = if let Value::Object(map) = node {
            map.get("$ref").and_then(|v| v.as_str()).map(|s| s.to_string())
        } else {
            None
        };

        let Some(def_name_full) = ref_target else { break };
        resolve_attempts += 1;
        if resolve_attempts > 10 {
            break;
        }

        let def_name = def_name_full.split('/').next_back().unwrap_or_default();
        match definitions.get(def_name) {
            Some(def) => *node = def.clone(),
            None => {
                *node = json!({ "type": "object", "description": "Unresolvable reference" });
                break;
            }
        }
    }

    // schemars emits `true` for "any"; the model service wants a typed node.
    if let Value::Bool(allow_all) = node {
        *node = if *allow_all {
            json!({ "type": ["string", "number", "boolean", "null"] })
        } else {
            json!({ "not": {} })
        };
    }

    match node {
        Value::Object(map) => {
            map.remove("$ref");
            map.remove("additionalProperties");
            map.remove("$schema");
            map.remove("$id");
            map.remove("title");
            map.remove("default");
            map.remove("examples");

            if let Some(Value::Array(types)) = map.get("type") {
                if types.len() == 2 && types.contains(&json!("null")) {
                    if let Some(real_type) = types.iter().find(|t| *t != &json!("null")) {
                        let real_type = real_type.clone();
                        map.insert("type".to_string(), real_type);
                        map.insert("nullable".to_string(), json!(true));
                    }
                } else if let Some(first) = types.first().cloned() {
                    map.insert("type".to_string(), first);
                }
            }

            if let Some(Value::Object(props)) = map.get_mut("properties") {
                for val in props.values_mut() {
                    process_schema_node(val, definitions, depth + 1);
                }
            }

            if let Some(val) = map.get_mut("items") {
                process_schema_node(val, definitions, depth + 1);
            }

            for key in ["allOf", "anyOf", "oneOf"] {
                if let Some(Value::Array(arr)) = map.get_mut(key) {
                    for item in arr.iter_mut() {
                        process_schema_node(item, definitions, depth + 1);
                    }
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                process_schema_node(item, definitions, depth + 1);
            }
        }
        _ => {}
    }
}

/// Derives the record contract of a Rust type from its JSON Schema.
/// Doc comments become field descriptions; declaration order is kept.
pub fn record_schema_for<T: JsonSchema>() -> Result<RecordSchema, DefinitionError> {
    let cleaned = clean_schema(schema_for!(T))?;
    record_schema_from_json(&cleaned, "")
}

fn record_schema_from_json(node: &Value, path: &str) -> Result<RecordSchema, DefinitionError> {
    let unsupported = |field: &str, detail: &str| DefinitionError::UnsupportedSchema {
        field: if field.is_empty() { "<root>".to_string() } else { field.to_string() },
        detail: detail.to_string(),
    };

    if node.get("type").and_then(Value::as_str) != Some("object") {
        return Err(unsupported(path, "expected an object schema"));
    }

    let required: Vec<&str> = node
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let empty = Map::new();
    let properties = node.get("properties").and_then(Value::as_object).unwrap_or(&empty);

    let mut fields = Vec::with_capacity(properties.len());
    for (name, prop) in properties {
        let field_path = if path.is_empty() { name.clone() } else { format!("{path}.{name}") };
        let kind = match prop.get("type").and_then(Value::as_str) {
            Some("string") => FieldKind::String,
            Some("boolean") => FieldKind::Boolean,
            Some("array") => match prop.pointer("/items/type").and_then(Value::as_str) {
                Some("string") => FieldKind::StringList,
                _ => return Err(unsupported(&field_path, "only arrays of strings are supported")),
            },
            Some("object") if prop.get("properties").is_some() => {
                FieldKind::Record(record_schema_from_json(prop, &field_path)?)
            }
            Some("object") => FieldKind::Mapping,
            other => {
                return Err(unsupported(&field_path, &format!("unsupported type {other:?}")));
            }
        };

        let mut field = if required.contains(&name.as_str()) {
            FieldSchema::required(name.clone(), kind)
        } else {
            FieldSchema::optional(name.clone(), kind)
        };
        if let Some(description) = prop.get("description").and_then(Value::as_str) {
            field = field.describe(description);
        }
        fields.push(field);
    }

    RecordSchema::new(fields)
}

/// Output-shape hint for the model service. Free-form mappings are left
/// out: the service rejects object schemas without properties.
pub fn response_schema(schema: &RecordSchema) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut ordering = Vec::new();

    for field in schema.fields() {
        let mut node = match &field.kind {
            FieldKind::String => json!({ "type": "string" }),
            FieldKind::Boolean => json!({ "type": "boolean" }),
            FieldKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldKind::Record(inner) => response_schema(inner),
            FieldKind::Mapping => continue,
        };
        if let Some(description) = &field.description {
            node["description"] = json!(description);
        }
        if field.optional {
            node["nullable"] = json!(true);
        } else {
            required.push(json!(field.name));
        }
        ordering.push(json!(field.name));
        properties.insert(field.name.clone(), node);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "propertyOrdering": ordering,
    })
}
