// formwork-server/src/request.rs
// ============================================================================
// Module: Request Parameters
// Description: Query, form, and JSON body parsing into request parameters.
// Purpose: Turn HTTP inputs into the merged parameter map of an AppRequest.
// Dependencies: serde_json, url
// ============================================================================

//! ## Overview
//! Query strings and urlencoded form bodies use bracket notation:
//! `a[b]=1` becomes `{"a": {"b": "1"}}` and `a[]=1&a[]=2` becomes
//! `{"a": ["1", "2"]}`. A JSON object body is merged over the query
//! parameters recursively. Later values win.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use url::form_urlencoded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bracket nesting depth of one parameter name.
const MAX_PARAM_DEPTH: usize = 16;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses urlencoded pairs into a nested parameter map.
#[must_use]
pub fn parse_urlencoded(input: &[u8]) -> Map<String, Value> {
    let mut params = Map::new();
    for (name, value) in form_urlencoded::parse(input) {
        let path = param_path(&name);
        if path.is_empty() {
            continue;
        }
        insert_path(&mut params, &path, Value::String(value.into_owned()));
    }
    params
}

/// Parses a JSON body; only objects carry parameters.
///
/// # Errors
///
/// Returns a message when the body is not valid JSON or not an object.
pub fn parse_json_body(input: &[u8]) -> Result<Map<String, Value>, String> {
    if input.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("request body must be a JSON object".to_string()),
        Err(err) => Err(format!("invalid JSON body: {err}")),
    }
}

/// Merges `overlay` into `base`; nested objects merge key by key.
pub fn merge_params(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_params(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits `a[b][]` into `["a", "b", ""]`.
fn param_path(name: &str) -> Vec<String> {
    let Some(open) = name.find('[') else {
        return if name.is_empty() { Vec::new() } else { vec![name.to_string()] };
    };
    let head = &name[.. open];
    if head.is_empty() {
        return vec![name.to_string()];
    }
    let mut path = vec![head.to_string()];
    let mut rest = &name[open ..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        if path.len() > MAX_PARAM_DEPTH {
            break;
        }
        path.push(stripped[.. close].to_string());
        rest = &stripped[close + 1 ..];
    }
    path
}

/// Inserts a value at a bracket path; empty segments append to arrays.
fn insert_path(target: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert(head.clone(), value);
        return;
    }
    let slot = target.entry(head.clone()).or_insert(Value::Null);
    insert_into_value(slot, rest, value);
}

/// Inserts below an existing slot, replacing scalars by containers.
fn insert_into_value(slot: &mut Value, path: &[String], value: Value) {
    let Some((segment, rest)) = path.split_first() else {
        *slot = value;
        return;
    };
    if segment.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            if rest.is_empty() {
                items.push(value);
            } else {
                let mut child = Value::Null;
                insert_into_value(&mut child, rest, value);
                items.push(child);
            }
        }
        return;
    }
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(map) = slot {
        insert_path(map, path, value);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;

    #[test]
    fn bracket_names_build_nested_params() {
        let params = parse_urlencoded(
            b"model=Crm%2FCustomer&data[name]=Ana+B&data[tags][]=a&data[tags][]=b&flag",
        );
        assert_eq!(
            Value::Object(params),
            json!({
                "model": "Crm/Customer",
                "data": {"name": "Ana B", "tags": ["a", "b"]},
                "flag": ""
            })
        );
    }

    #[test]
    fn unterminated_brackets_keep_the_prefix() {
        assert_eq!(param_path("a[b"), vec!["a".to_string()]);
        assert_eq!(param_path("[x]"), vec!["[x]".to_string()]);
    }

    #[test]
    fn json_bodies_merge_over_query_params() {
        let mut params = parse_urlencoded(b"page=1&data[a]=1");
        let body = parse_json_body(br#"{"page": 2, "data": {"b": 2}}"#).unwrap();
        merge_params(&mut params, body);
        assert_eq!(Value::Object(params), json!({"page": 2, "data": {"a": "1", "b": 2}}));
        assert!(parse_json_body(b"[1]").is_err());
        assert!(parse_json_body(b"{").is_err());
        assert!(parse_json_body(b"  ").unwrap().is_empty());
    }
}
