//! Built-in library modules for MyLang
//!
//! Each library is a plain object of native functions, imported by name:
//! ```mylang
//! import "array"
//! import ("io", j: "json")
//! array.push(xs, 4)
//! ```
//!
//! Natives receive already-evaluated arguments and the calling scope, and
//! return a value or a [`RuntimeError`](crate::error::RuntimeError).
//! Callbacks go back through [`Interpreter::call_value`](crate::interpreter::Interpreter::call_value).

pub mod collections;
pub mod io;
pub mod json;

use crate::value::Value;
use indexmap::IndexMap;

/// Functions of one library, in definition order
pub type StdlibModule = IndexMap<String, Value>;

/// Names importable without a path
pub const LIBRARIES: &[&str] = &["io", "array", "object", "json"];

pub fn is_library(name: &str) -> bool {
    LIBRARIES.contains(&name)
}

/// Build the module object for a library name
pub fn load(name: &str) -> Option<Value> {
    let module = match name {
        "io" => io::init(),
        "array" => collections::init_array(),
        "object" => collections::init_object(),
        "json" => json::init(),
        _ => return None,
    };
    Some(Value::object(module))
}

/// Shorthand used by the library `init` functions
pub(crate) fn register(
    module: &mut StdlibModule,
    name: &str,
    arity: Option<usize>,
    func: crate::value::NativeFn,
) {
    module.insert(name.to_string(), Value::native(name, arity, func));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_library_loads() {
        for name in LIBRARIES {
            let module = load(name).unwrap_or_else(|| panic!("{} should load", name));
            assert_eq!(module.type_name(), "object");
        }
        assert!(load("missing").is_none());
        assert!(!is_library("./io.ml"));
    }
}
