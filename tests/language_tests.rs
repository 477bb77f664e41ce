//! Language-level tests driven through the library API
//!
//! Each test builds a fresh interpreter with captured output and checks the
//! observable result of a whole program.

use mylang::config::RunOptions;
use mylang::error::{ErrorKind, MyLangError, RuntimeError};
use mylang::value::deep_equal;
use mylang::{Interpreter, Value};
use pretty_assertions::assert_eq;

fn interpreter() -> Interpreter {
    let mut interp = Interpreter::new(RunOptions::new("/work", "/work/main.ml"));
    interp.capture_output();
    interp
}

/// Run `source` and return the interpreter so globals and output can be inspected
fn run(source: &str) -> Interpreter {
    let mut interp = interpreter();
    if let Err(e) = interp.run_source(source) {
        panic!("program failed:\n{}\n---\n{}", source, e);
    }
    interp
}

fn global(interp: &Interpreter, name: &str) -> Value {
    interp
        .globals()
        .borrow()
        .get(name)
        .unwrap_or_else(|e| panic!("{}", e))
}

fn output(source: &str) -> String {
    run(source).take_output()
}

fn runtime_error(source: &str) -> RuntimeError {
    match interpreter().run_source(source) {
        Err(MyLangError::Runtime(err)) => err,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

// ============================================================================
// Scopes
// ============================================================================

#[test]
fn test_nested_blocks_write_through_to_outer_binding() {
    let interp = run(
        r#"
var x
{ x = 5 }
if true { x = x + 1 }
try { x = x + 1 } catch { }
"#,
    );
    assert!(matches!(global(&interp, "x"), Value::Int(7)));
}

#[test]
fn test_block_declarations_do_not_leak() {
    let err = runtime_error("{ var inner = 1 }\ninner");
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert_eq!(err.message, "inner is not defined");
}

#[test]
fn test_shadowing_in_inner_block() {
    let out = output(
        r#"
import "io"
var name = "outer"
{
  var name = "inner"
  io.println(name)
}
io.println(name)
"#,
    );
    assert_eq!(out, "inner\nouter\n");
}

// ============================================================================
// Defer
// ============================================================================

#[test]
fn test_defer_runs_in_place_and_stops_at_return() {
    let interp = run(
        r#"
var isEmit = false
var isEmit2 = false
func run() {
  defer { isEmit = true };
  return 1;
  defer { isEmit2 = true }
}
run()
"#,
    );
    assert!(matches!(global(&interp, "isEmit"), Value::Bool(true)));
    assert!(matches!(global(&interp, "isEmit2"), Value::Bool(false)));
}

#[test]
fn test_defer_keeps_statement_order() {
    let out = output(
        r#"
import "io"
io.println("a")
defer { io.println("b") }
io.println("c")
"#,
    );
    assert_eq!(out, "a\nb\nc\n");
}

// ============================================================================
// Enums
// ============================================================================

#[test]
fn test_enum_auto_increment() {
    let interp = run(
        r#"
enum Number { One = 1; Two; Three; }
var values = [Number.One, Number.Two, Number.Three]
"#,
    );
    assert_eq!(global(&interp, "values").to_string(), "[1, 2, 3]");
}

#[test]
fn test_enum_step_follows_first_two_members() {
    let interp = run(
        r#"
enum Even { A = 0; B = 2; C; D }
var values = [Even.A, Even.B, Even.C, Even.D]
"#,
    );
    assert_eq!(global(&interp, "values").to_string(), "[0, 2, 4, 6]");
}

#[test]
fn test_enum_float_members_count_as_numeric() {
    let interp = run(
        r#"
enum Half { A = 1.5; B; C }
enum Mixed { X = 1; Y = 1.5; Z }
var halves = [Half.A, Half.B, Half.C]
var mixed = [Mixed.X, Mixed.Y, Mixed.Z]
"#,
    );
    assert_eq!(global(&interp, "halves").to_string(), "[1.5, 2.5, 3.5]");
    assert_eq!(global(&interp, "mixed").to_string(), "[1, 1.5, 2]");
}

#[test]
fn test_enum_reverse_lookup() {
    let interp = run("enum Color { Red; Green; Blue }\nvar name = Color[1]");
    assert_eq!(global(&interp, "name").to_string(), "Green");
}

#[test]
fn test_enum_method_iterates_members() {
    let interp = run(
        r#"
enum Status {
  Online = {value: 0, description: "Online status user"};
  Offline = {value: 1, description: "Offline status user"};
  func getByName(name) {
    for (var item in this) {
      if item[0] == name { return item }
    }
    return nil
  }
}
var found = Status.getByName("Offline")
var missing = Status.getByName("Away")
var expected = ["Offline", {value: 1, description: "Offline status user"}]
"#,
    );
    assert!(deep_equal(
        &global(&interp, "found"),
        &global(&interp, "expected")
    ));
    assert!(matches!(global(&interp, "missing"), Value::Nil));
}

#[test]
fn test_enum_members_are_readonly() {
    let err = runtime_error("enum Number { One = 1 }\nNumber.One = 5");
    assert_eq!(err.kind, ErrorKind::AssignmentError);
}

// ============================================================================
// Readonly and constants
// ============================================================================

#[test]
fn test_readonly_propagates_through_aliases() {
    let err = runtime_error(
        r#"
var a = [1, 2, 3] as readonly
var b = a
var c = b
c[0] = 0
"#,
    );
    assert_eq!(err.kind, ErrorKind::AssignmentError);
}

#[test]
fn test_reassigning_alias_clears_readonly() {
    let interp = run(
        r#"
var a = [1, 2, 3] as readonly
var b = a
b = []
var c = b
c[0] = 0
"#,
    );
    assert_eq!(global(&interp, "a").to_string(), "[1, 2, 3]");
    assert_eq!(global(&interp, "b").to_string(), "[0]");
    assert_eq!(global(&interp, "c").to_string(), "[0]");
}

#[test]
fn test_readonly_array_can_still_grow() {
    let interp = run("var a = [1, 2] as readonly\na[2] = 3");
    assert_eq!(global(&interp, "a").to_string(), "[1, 2, 3]");
}

#[test]
fn test_const_rejects_reassignment() {
    let err = runtime_error("var limit = 10 as const\nlimit = 11");
    assert_eq!(err.kind, ErrorKind::AssignmentError);
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_falsy_argument_uses_default() {
    let interp = run(
        r#"
func f(n = 1000) { return n; }
var zero = f(0)
var none = f()
var five = f(5)
"#,
    );
    assert!(matches!(global(&interp, "zero"), Value::Int(1000)));
    assert!(matches!(global(&interp, "none"), Value::Int(1000)));
    assert!(matches!(global(&interp, "five"), Value::Int(5)));
}

#[test]
fn test_rest_parameter_and_multiple_returns() {
    let interp = run(
        r#"
func rest(a, ...rest) { return a, rest; }
var result = rest(1, 2, 3, 4)
"#,
    );
    assert_eq!(global(&interp, "result").to_string(), "[1, [2, 3, 4]]");
}

#[test]
fn test_closures_keep_their_scope() {
    let interp = run(
        r#"
func counter() {
  var count = 0
  return func() { count++; return count }
}
var next = counter()
next()
next()
var third = next()
"#,
    );
    assert!(matches!(global(&interp, "third"), Value::Int(3)));
}

#[test]
fn test_callee_does_not_see_caller_locals() {
    let err = runtime_error(
        r#"
func show() { return secret }
func caller() {
  var secret = 1
  return show()
}
caller()
"#,
    );
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert_eq!(err.message, "secret is not defined");
}

#[test]
fn test_self_containing_values() {
    let interp = run(
        r#"
import "json"
var a = []
a.push(a)
var b = []
b.push(b)
var same = a == b
var matched = false
match (a) {
  case (b): { matched = true }
}
var message
try { json.stringify(a) } catch (e) { message = e.message }
"#,
    );
    assert!(matches!(global(&interp, "same"), Value::Bool(true)));
    assert!(matches!(global(&interp, "matched"), Value::Bool(true)));
    assert_eq!(
        global(&interp, "message").to_string(),
        "Converting circular structure to JSON"
    );
}

#[test]
fn test_library_callbacks() {
    let interp = run(
        r#"
import "array"
var doubled = array.map([1, 2, 3], func(x) { return x * 2 })
var odd = array.filter([1, 2, 3, 4, 5], func(x) { return x % 2 == 1 })
"#,
    );
    assert_eq!(global(&interp, "doubled").to_string(), "[2, 4, 6]");
    assert_eq!(global(&interp, "odd").to_string(), "[1, 3, 5]");
}

// ============================================================================
// Match
// ============================================================================

#[test]
fn test_match_runs_every_matching_case() {
    let interp = run(
        r#"
var hits = []
match (2) {
  case (2): { hits.push("first") }
  case (1 + 1): { hits.push("second") }
  case (3): { hits.push("third") }
  default: { hits.push("default") }
}
"#,
    );
    assert_eq!(
        global(&interp, "hits").to_string(),
        r#"["first", "second"]"#
    );
}

#[test]
fn test_match_default_when_nothing_matches() {
    let interp = run(
        r#"
var hits = []
match (9) {
  case (1): case (2): { hits.push("small") }
  default: { hits.push("default") }
}
"#,
    );
    assert_eq!(global(&interp, "hits").to_string(), r#"["default"]"#);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_lex_errors_are_batched() {
    match interpreter().run_source("var a = 1 @ 2 # 3") {
        Err(MyLangError::Lex(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected lex errors, got {:?}", other),
    }
}

#[test]
fn test_parse_stops_at_first_error() {
    match interpreter().run_source("var = 1\nvar = 2") {
        Err(MyLangError::Syntax(err)) => assert_eq!(err.position.line, 1),
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn test_uncaught_error_lists_frames() {
    let err = runtime_error("func f() {\n  return missing\n}\nf()");
    assert_eq!(
        err.to_string(),
        "ReferenceError: missing is not defined\n \
         - ExpressionStatement (main.ml:4:1)\n \
         - FunctionCallExpression (main.ml:4:1)\n \
         - ReturnStatement (main.ml:2:3)\n \
         - Identifier (main.ml:2:10)"
    );
}

#[test]
fn test_catch_exposes_error_fields() {
    let interp = run(
        r#"
var name
var message
var traced
try {
  nothing()
} catch (e) {
  name = e.name
  message = e.message
  traced = e.files.length > 0
}
"#,
    );
    assert_eq!(global(&interp, "name").to_string(), "ReferenceError");
    assert_eq!(global(&interp, "message").to_string(), "nothing is not defined");
    assert!(matches!(global(&interp, "traced"), Value::Bool(true)));
}

#[test]
fn test_thrown_values_are_caught_unchanged() {
    let interp = run(
        r#"
var caught
try { throw {code: 42} } catch (e) { caught = e.code }
"#,
    );
    assert!(matches!(global(&interp, "caught"), Value::Int(42)));
}

// ============================================================================
// Async tasks
// ============================================================================

#[test]
fn test_tasks_run_on_await_then_in_fifo_order() {
    let out = output(
        r#"
import "io"
async func work(name) {
  io.println("run " + name)
  return name + "!"
}
var a = work("a")
var b = work("b")
var c = work("c")
io.println("sync")
io.println(await b)
"#,
    );
    assert_eq!(out, "sync\nrun b\nb!\nrun a\nrun c\n");
}

#[test]
fn test_awaiting_twice_reuses_result() {
    let out = output(
        r#"
import "io"
async func once() { io.println("ran"); return 7 }
var t = once()
var first = await t
var second = await t
io.println(first + second)
"#,
    );
    assert_eq!(out, "ran\n14\n");
}

#[test]
fn test_task_cannot_await_itself() {
    let err = runtime_error(
        r#"
var t
async func selfish() { return await t }
t = selfish()
await t
"#,
    );
    assert_eq!(err.kind, ErrorKind::FunctionCallError);
    assert!(err.message.contains("cannot await itself"), "{}", err.message);
}

#[test]
fn test_await_requires_task() {
    let err = runtime_error("await 5");
    assert_eq!(err.kind, ErrorKind::TypeError);
}

// ============================================================================
// Host options
// ============================================================================

#[test]
fn test_process_env_includes_run_options() {
    let mut options = RunOptions::new("/work", "/work/main.ml");
    options.env.insert("GREETING".to_string(), "hello".to_string());
    options.args = vec!["--fast".to_string()];

    let mut interp = Interpreter::new(options);
    interp.capture_output();
    interp
        .run_source(r#"var greeting = process.env.GREETING; var first = process.argv[0]"#)
        .unwrap();

    assert_eq!(global(&interp, "greeting").to_string(), "hello");
    assert_eq!(global(&interp, "first").to_string(), "--fast");
}

#[test]
fn test_default_call_depth_on_small_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(1024 * 1024)
        .spawn(|| {
            let mut interp = interpreter();
            let value = interp
                .run_source(
                    "func down(n) { if n == 0 { return 0 } return down(n - 1) }\ndown(990)",
                )
                .map_err(|e| e.to_string())?;
            let err = interp
                .run_source("down(5000)")
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            Ok::<_, String>((value.to_string(), err))
        })
        .unwrap();

    let (value, err) = handle.join().unwrap().unwrap();
    assert_eq!(value, "0");
    assert!(
        err.starts_with("FunctionCallError: Maximum call stack size exceeded"),
        "{}",
        err
    );
}
