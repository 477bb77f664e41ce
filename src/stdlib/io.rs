//! io library - console output

use super::{register, StdlibModule};
use crate::environment::Scope;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::value::Value;

pub fn init() -> StdlibModule {
    let mut module = StdlibModule::new();

    // print(...values) -> nil, space separated, no newline
    register(&mut module, "print", None, print);

    // println(...values) -> nil
    register(&mut module, "println", None, println);

    module
}

fn join(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print(interp: &mut Interpreter, args: Vec<Value>, _scope: &Scope) -> Result<Value, RuntimeError> {
    interp.write_output(&join(&args));
    Ok(Value::Nil)
}

fn println(interp: &mut Interpreter, args: Vec<Value>, _scope: &Scope) -> Result<Value, RuntimeError> {
    let mut line = join(&args);
    line.push('\n');
    interp.write_output(&line);
    Ok(Value::Nil)
}
