//! array and object libraries
//!
//! Unlike plain values, arrays are shared handles, so `push`/`pop` mutate the
//! array in place and every alias observes the change.

use super::{register, StdlibModule};
use crate::environment::Scope;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Initialize the array library
pub fn init_array() -> StdlibModule {
    let mut module = StdlibModule::new();

    // len(arr | str) -> int
    register(&mut module, "len", Some(1), |_, args, _| match &args[0] {
        Value::Array(items) => Ok(Value::Int(items.borrow().len() as i64)),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(RuntimeError::type_error(format!(
            "len() requires an array or string, got {}",
            other.type_name()
        ))),
    });

    // push(arr, ...items) -> int (new length)
    register(&mut module, "push", Some(2), |_, mut args, _| {
        let items = expect_array("push", &args[0])?;
        let mut items = items.borrow_mut();
        items.extend(args.drain(1..));
        Ok(Value::Int(items.len() as i64))
    });

    // pop(arr) -> last item or nil
    register(&mut module, "pop", Some(1), |_, args, _| {
        let items = expect_array("pop", &args[0])?;
        let popped = items.borrow_mut().pop();
        Ok(popped.unwrap_or(Value::Nil))
    });

    // map(arr, fn(item, index)) -> new array
    register(&mut module, "map", Some(2), map);

    // filter(arr, fn(item, index)) -> new array
    register(&mut module, "filter", Some(2), filter);

    module
}

/// Initialize the object library
pub fn init_object() -> StdlibModule {
    let mut module = StdlibModule::new();

    // keys(obj) -> array of strings
    register(&mut module, "keys", Some(1), |_, args, _| match &args[0] {
        Value::Object(obj) => Ok(Value::array(
            obj.borrow()
                .properties
                .keys()
                .map(|k| Value::str(k.clone()))
                .collect(),
        )),
        other => Err(RuntimeError::type_error(format!(
            "keys() requires an object, got {}",
            other.type_name()
        ))),
    });

    // values(obj) -> array
    register(&mut module, "values", Some(1), |_, args, _| match &args[0] {
        Value::Object(obj) => Ok(Value::array(
            obj.borrow().properties.values().cloned().collect(),
        )),
        other => Err(RuntimeError::type_error(format!(
            "values() requires an object, got {}",
            other.type_name()
        ))),
    });

    module
}

fn expect_array(func: &str, value: &Value) -> Result<Rc<RefCell<Vec<Value>>>, RuntimeError> {
    match value {
        Value::Array(items) => Ok(Rc::clone(items)),
        other => Err(RuntimeError::type_error(format!(
            "{}() requires an array, got {}",
            func,
            other.type_name()
        ))),
    }
}

fn expect_callable(func: &str, value: &Value) -> Result<(), RuntimeError> {
    if value.is_callable() {
        Ok(())
    } else {
        Err(RuntimeError::type_error(format!(
            "{}() requires a function, got {}",
            func,
            value.type_name()
        )))
    }
}

/// Snapshot so callbacks may mutate the source array
fn snapshot(items: &Rc<RefCell<Vec<Value>>>) -> Vec<Value> {
    items.borrow().clone()
}

fn map(interp: &mut Interpreter, args: Vec<Value>, scope: &Scope) -> Result<Value, RuntimeError> {
    let items = expect_array("map", &args[0])?;
    expect_callable("map", &args[1])?;

    let mut mapped = Vec::new();
    for (index, item) in snapshot(&items).into_iter().enumerate() {
        let result = interp.call_value(&args[1], vec![item, Value::Int(index as i64)], None, scope)?;
        mapped.push(result);
    }
    Ok(Value::array(mapped))
}

fn filter(interp: &mut Interpreter, args: Vec<Value>, scope: &Scope) -> Result<Value, RuntimeError> {
    let items = expect_array("filter", &args[0])?;
    expect_callable("filter", &args[1])?;

    let mut kept = Vec::new();
    for (index, item) in snapshot(&items).into_iter().enumerate() {
        let keep = interp.call_value(
            &args[1],
            vec![item.clone(), Value::Int(index as i64)],
            None,
            scope,
        )?;
        if keep.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Value::array(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;

    fn call(module: &StdlibModule, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let mut interp = Interpreter::new(RunOptions::new("/", "/main.ml"));
        let scope = interp.globals();
        let function = module.get(name).cloned().unwrap_or(Value::Nil);
        interp.call_value(&function, args, None, &scope)
    }

    #[test]
    fn test_push_and_pop_mutate_shared_array() {
        let array = init_array();
        let xs = Value::array(vec![Value::Int(1)]);
        let alias = xs.clone();

        let len = call(&array, "push", vec![xs.clone(), Value::Int(2), Value::Int(3)]).unwrap();
        assert!(matches!(len, Value::Int(3)));
        assert_eq!(alias.to_string(), "[1, 2, 3]");

        let last = call(&array, "pop", vec![xs.clone()]).unwrap();
        assert!(matches!(last, Value::Int(3)));
        let empty = call(&array, "pop", vec![Value::array(Vec::new())]).unwrap();
        assert!(matches!(empty, Value::Nil));
    }

    #[test]
    fn test_argument_checks() {
        let array = init_array();
        let err = call(&array, "map", vec![Value::array(Vec::new()), Value::Int(1)]).unwrap_err();
        assert_eq!(err.message, "map() requires a function, got int");

        let err = call(&array, "push", vec![Value::Nil]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ArgumentsError);
    }

    #[test]
    fn test_object_keys_keep_insertion_order() {
        let object = init_object();
        let mut properties = indexmap::IndexMap::new();
        properties.insert("b".to_string(), Value::Int(1));
        properties.insert("a".to_string(), Value::Int(2));

        let keys = call(&object, "keys", vec![Value::object(properties)]).unwrap();
        assert_eq!(keys.to_string(), r#"["b", "a"]"#);
    }
}
