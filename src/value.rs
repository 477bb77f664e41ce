//! Runtime values
//!
//! Arrays and objects have reference semantics: copying a `Value` copies the
//! handle, not the contents.

use crate::ast::FunctionDecl;
use crate::environment::Scope;
use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::runtime::Task;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Signature of host functions exposed to scripts
pub type NativeFn = fn(&mut Interpreter, Vec<Value>, &Scope) -> Result<Value, RuntimeError>;

/// Property key scripts use to make an object iterable with `for .. in`
pub const ITERATOR_KEY: &str = "#iterator";

/// Nesting depth after which display output is elided
const MAX_DISPLAY_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<Object>>),
    Function(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Task(Rc<Task>),
}

/// Marker distinguishing enum objects from plain ones
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectTag {
    Plain,
    Enum {
        name: String,
        /// Forward member names in declaration order
        members: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Object {
    pub properties: IndexMap<String, Value>,
    pub tag: ObjectTag,
}

impl Object {
    pub fn new(properties: IndexMap<String, Value>) -> Self {
        Object {
            properties,
            tag: ObjectTag::Plain,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.tag, ObjectTag::Enum { .. })
    }
}

/// A function value: a declaration plus the scope it was evaluated in
pub struct Closure {
    pub declaration: Rc<FunctionDecl>,
    pub env: Scope,
    /// File the declaration came from, for error frames
    pub file: Rc<str>,
}

// The captured scope usually contains the closure itself
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.declaration.display_name())
            .field("id", &self.declaration.id)
            .field("file", &self.file)
            .finish()
    }
}

pub struct NativeFunction {
    pub name: String,
    /// Minimum number of arguments; `None` for variadic
    pub arity: Option<usize>,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native func {}>", self.name)
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(properties: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(Object::new(properties))))
    }

    pub fn native(name: &str, arity: Option<usize>, func: NativeFn) -> Self {
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            arity,
            func,
        }))
    }

    /// `nil`, `false`, `0`, `0.0` and `""` are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(obj) if obj.borrow().is_enum() => "enum",
            Value::Object(_) => "object",
            Value::Function(_) | Value::Native(_) => "function",
            Value::Task(_) => "task",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Values that get an enum reverse-mapping entry of their own
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    /// Property lookup on objects; `nil` for anything else
    pub fn get_property(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.borrow().properties.get(key).cloned(),
            _ => None,
        }
    }

    /// Display form used inside containers: strings are quoted
    pub fn repr(&self) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = write_value(&mut out, self, 0, true);
        out
    }
}

/// Structural equality used by `==` and `match`
///
/// Self-referencing containers compare equal when their shapes match.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    equal_within(a, b, &mut Vec::new())
}

/// `seen` holds the container pairs currently being compared
fn equal_within(a: &Value, b: &Value, seen: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_number() == b.as_number()
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if Rc::ptr_eq(x, y) || seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let equal = {
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(l, r)| equal_within(l, r, seen))
            };
            seen.pop();
            equal
        }
        (Value::Object(x), Value::Object(y)) => {
            let pair = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if Rc::ptr_eq(x, y) || seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            let equal = {
                let (x, y) = (x.borrow(), y.borrow());
                x.tag == y.tag
                    && x.properties.len() == y.properties.len()
                    && x.properties.iter().all(|(key, l)| {
                        y.properties
                            .get(key)
                            .is_some_and(|r| equal_within(l, r, seen))
                    })
            };
            seen.pop();
            equal
        }
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => Rc::ptr_eq(x, y),
        (Value::Task(x), Value::Task(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn write_value(
    out: &mut impl fmt::Write,
    value: &Value,
    depth: usize,
    quote_strings: bool,
) -> fmt::Result {
    if depth > MAX_DISPLAY_DEPTH {
        return write!(out, "...");
    }
    match value {
        Value::Nil => write!(out, "nil"),
        Value::Bool(b) => write!(out, "{}", b),
        Value::Int(n) => write!(out, "{}", n),
        Value::Float(n) => write!(out, "{}", n),
        Value::Str(s) if quote_strings => write!(out, "{:?}", s),
        Value::Str(s) => write!(out, "{}", s),
        Value::Array(items) => {
            write!(out, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                write_value(out, item, depth + 1, true)?;
            }
            write!(out, "]")
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            if let ObjectTag::Enum { name, .. } = &obj.tag {
                write!(out, "{} ", name)?;
            }
            write!(out, "{{")?;
            for (i, (key, item)) in obj.properties.iter().enumerate() {
                if i > 0 {
                    write!(out, ",")?;
                }
                write!(out, " {}: ", key)?;
                write_value(out, item, depth + 1, true)?;
            }
            if obj.properties.is_empty() {
                write!(out, "}}")
            } else {
                write!(out, " }}")
            }
        }
        Value::Function(closure) => {
            let decl = &closure.declaration;
            if decl.is_async {
                write!(out, "<async func {}>", decl.display_name())
            } else {
                write!(out, "<func {}>", decl.display_name())
            }
        }
        Value::Native(native) => write!(out, "<native func {}>", native.name),
        Value::Task(task) => write!(out, "<task {} {}>", task.name(), task.state_name()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0, false)
    }
}
