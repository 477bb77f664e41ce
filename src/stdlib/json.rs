//! json library - JSON parsing and stringification
//!
//! The converters are also used by the module loader for `.json` imports.

use super::{register, StdlibModule};
use crate::error::RuntimeError;
use crate::value::Value;
use indexmap::IndexMap;
use std::rc::Rc;

/// Convert JSON value to MyLang Value
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Nil
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(arr) => Value::array(arr.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let properties: IndexMap<String, Value> = obj
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect();
            Value::object(properties)
        }
    }
}

/// Convert MyLang Value to JSON value
///
/// Functions and tasks have no JSON form and become `null`; a container
/// that contains itself is an error.
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, RuntimeError> {
    to_json(value, &mut Vec::new())
}

/// `open` holds the containers on the current path
fn to_json(value: &Value, open: &mut Vec<usize>) -> Result<serde_json::Value, RuntimeError> {
    let json = match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Array(arr) => {
            enter(open, Rc::as_ptr(arr) as usize)?;
            let items = arr
                .borrow()
                .iter()
                .map(|item| to_json(item, open))
                .collect::<Result<Vec<_>, _>>()?;
            open.pop();
            serde_json::Value::Array(items)
        }
        Value::Object(obj) => {
            enter(open, Rc::as_ptr(obj) as usize)?;
            let mut map = serde_json::Map::new();
            for (key, item) in obj.borrow().properties.iter() {
                if !item.is_callable() {
                    map.insert(key.clone(), to_json(item, open)?);
                }
            }
            open.pop();
            serde_json::Value::Object(map)
        }
        Value::Function(_) | Value::Native(_) | Value::Task(_) => serde_json::Value::Null,
    };
    Ok(json)
}

fn enter(open: &mut Vec<usize>, container: usize) -> Result<(), RuntimeError> {
    if open.contains(&container) {
        return Err(
            RuntimeError::type_error("Converting circular structure to JSON").with_code("E_JSON"),
        );
    }
    open.push(container);
    Ok(())
}

/// Parse JSON text into a value
pub fn parse(text: &str) -> Result<Value, RuntimeError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|json| json_to_value(&json))
        .map_err(|e| RuntimeError::base(format!("Invalid JSON: {}", e)).with_code("E_JSON"))
}

/// Initialize the json library
pub fn init() -> StdlibModule {
    let mut module = StdlibModule::new();

    // parse(text) -> value
    register(&mut module, "parse", Some(1), |_, args, _| match &args[0] {
        Value::Str(text) => parse(text),
        other => Err(RuntimeError::type_error(format!(
            "parse() requires a JSON string, got {}",
            other.type_name()
        ))),
    });

    // stringify(value, pretty = false) -> string
    register(&mut module, "stringify", Some(1), |_, args, _| {
        let json = value_to_json(&args[0])?;
        let pretty = args.get(1).is_some_and(Value::is_truthy);
        let text = if pretty {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        text.map(Value::Str)
            .map_err(|e| RuntimeError::base(format!("Cannot stringify value: {}", e)))
    });

    module
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::deep_equal;

    #[test]
    fn test_parse_keeps_key_order() {
        let value = parse(r#"{"b": 1, "a": [true, null, 2.5, "s"]}"#).unwrap();
        assert_eq!(value.to_string(), r#"{ b: 1, a: [true, nil, 2.5, "s"] }"#);
    }

    #[test]
    fn test_invalid_json() {
        let err = parse("{nope").unwrap_err();
        assert_eq!(err.code.as_deref(), Some("E_JSON"));
    }

    #[test]
    fn test_value_to_json_round_trip() {
        let value = parse(r#"{"name": "x", "tags": ["a", "b"], "n": 3}"#).unwrap();
        let back = json_to_value(&value_to_json(&value).unwrap());
        assert!(deep_equal(&value, &back));
    }

    #[test]
    fn test_circular_values_are_rejected() {
        let shared = parse("[1]").unwrap();
        let outer = Value::array(vec![shared.clone(), shared.clone()]);
        assert!(value_to_json(&outer).is_ok());

        if let Value::Array(items) = &shared {
            items.borrow_mut().push(outer.clone());
        }
        let err = value_to_json(&outer).unwrap_err();
        assert_eq!(err.message, "Converting circular structure to JSON");
    }
}
