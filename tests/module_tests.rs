//! Module loading against real files and a local HTTP server

use mylang::config::RunOptions;
use mylang::error::{ErrorKind, MyLangError, RuntimeError};
use mylang::{Interpreter, Value};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Run `main.ml` inside `dir` the way the CLI does
fn run_main(dir: &Path) -> mylang::Result<(Interpreter, Value)> {
    let main = dir.join("main.ml");
    let source = fs::read_to_string(&main).unwrap();
    let mut interp = Interpreter::new(RunOptions::for_file(&main)?);
    interp.capture_output();
    let value = interp.run_source(&source)?;
    Ok((interp, value))
}

fn runtime_error(result: mylang::Result<(Interpreter, Value)>) -> RuntimeError {
    match result {
        Err(MyLangError::Runtime(err)) => err,
        Err(other) => panic!("expected a runtime error, got {}", other),
        Ok((_, value)) => panic!("expected a runtime error, got {}", value),
    }
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_imports_relative_to_importing_file() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.ml",
        "import \"./lib/shapes\"\n[shapes.area(2, 3), shapes.unit]",
    );
    write(
        dir.path(),
        "lib/shapes.ml",
        "import (m: \"./math\")\nexport func area(w, h) { return m.mul(w, h) }\nexport (unit: \"cm\")",
    );
    write(dir.path(), "lib/math.ml", "export func mul(a, b) { return a * b }");

    let (_, value) = run_main(dir.path()).unwrap();
    assert_eq!(value.to_string(), r#"[6, "cm"]"#);
}

#[test]
fn test_json_file_import() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.ml", "import \"./settings.json\"\nsettings.servers[1].port");
    write(
        dir.path(),
        "settings.json",
        r#"{"servers": [{"port": 80}, {"port": 443}]}"#,
    );

    let (_, value) = run_main(dir.path()).unwrap();
    assert!(matches!(value, Value::Int(443)));
}

#[test]
fn test_error_frames_use_paths_relative_to_base() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.ml", "import \"./lib/bad\"\nbad.boom()");
    write(
        dir.path(),
        "lib/bad.ml",
        "export func boom() {\n  return missing\n}",
    );

    let err = runtime_error(run_main(dir.path()));
    assert_eq!(err.kind, ErrorKind::ReferenceError);
    assert!(
        err.files.iter().any(|f| f == "Identifier (lib/bad.ml:2:10)"),
        "{:?}",
        err.files
    );
    assert!(
        err.files.iter().any(|f| f.starts_with("ExpressionStatement (main.ml:2:")),
        "{:?}",
        err.files
    );
}

#[test]
fn test_missing_module_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.ml", "import \"./gone\"");

    let err = runtime_error(run_main(dir.path()));
    assert_eq!(err.kind, ErrorKind::FileReadFaild);
    assert!(err.message.contains("gone.ml"), "{}", err.message);
}

#[test]
fn test_import_main_points_at_entry_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.ml", "import.main");

    let (_, value) = run_main(dir.path()).unwrap();
    let expected = dir.path().join("main.ml").canonicalize().unwrap();
    assert_eq!(value.to_string(), expected.display().to_string());
}

// ============================================================================
// Project file
// ============================================================================

#[test]
fn test_project_file_env_and_limits() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "mylang.toml",
        "[run]\nmax_call_depth = 10\n\n[env]\nGREETING = \"hi\"\n",
    );
    write(dir.path(), "main.ml", "process.env.GREETING");

    let (interp, value) = run_main(dir.path()).unwrap();
    assert_eq!(value.to_string(), "hi");
    assert_eq!(interp.options().max_call_depth, 10);

    write(
        dir.path(),
        "main.ml",
        "func down(n) { if n == 0 { return 0 } return down(n - 1) }\ndown(20)",
    );
    let err = runtime_error(run_main(dir.path()));
    assert_eq!(err.kind, ErrorKind::FunctionCallError);
}

#[test]
fn test_invalid_project_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "mylang.toml", "[run\n");
    write(dir.path(), "main.ml", "1");

    assert!(matches!(run_main(dir.path()), Err(MyLangError::Config(_))));
}

// ============================================================================
// Remote modules
// ============================================================================

/// Serve `routes` on an ephemeral port for `requests` requests
fn serve(routes: Vec<(&'static str, &'static str)>, requests: usize) -> String {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();

    std::thread::spawn(move || {
        for _ in 0..requests {
            let Ok(request) = server.recv() else { break };
            let response = match routes.iter().find(|(path, _)| *path == request.url()) {
                Some((_, body)) => tiny_http::Response::from_string(*body),
                None => tiny_http::Response::from_string("not found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    });

    format!("http://127.0.0.1:{}", port)
}

#[test]
fn test_http_imports() {
    let base = serve(
        vec![
            ("/data", r#"{"items": [1, 2, 3]}"#),
            ("/lib.ml", "export func twice(x) { return x * 2 }"),
        ],
        2,
    );

    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.ml",
        &format!(
            "import (data: \"{base}/data\", lib: \"{base}/lib.ml\")\nlib.twice(data.items[2])"
        ),
    );

    let (_, value) = run_main(dir.path()).unwrap();
    assert!(matches!(value, Value::Int(6)));
}

#[test]
fn test_http_import_failure() {
    let base = serve(vec![], 1);

    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "main.ml",
        &format!("import (m: \"{base}/missing.ml\")"),
    );

    let err = runtime_error(run_main(dir.path()));
    assert_eq!(err.kind, ErrorKind::FileReadFaild);
    assert!(err.message.starts_with("Cannot fetch"), "{}", err.message);
}
