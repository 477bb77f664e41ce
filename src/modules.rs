//! Module resolution and loading
//!
//! An import specifier is resolved, in order, as:
//!
//! 1. a built-in library name (`"io"`, `"json"`, ...)
//! 2. an `http://` / `https://` URL, fetched and read as JSON if it parses,
//!    otherwise as MyLang source
//! 3. a path relative to the importing file; `.json` files are data, anything
//!    else is MyLang source (`.ml` is appended when there is no extension)
//!
//! Source modules run in a fresh root scope and evaluate to their `#exports`
//! object. Results are cached per absolute path or URL for the lifetime of
//! the interpreter unless caching is disabled.

use crate::error::RuntimeError;
use crate::interpreter::Interpreter;
use crate::parser::parse_source;
use crate::stdlib::{self, json::json_to_value};
use crate::value::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Where module text comes from
pub trait SourceResolver {
    fn read_file(&self, path: &Path) -> std::io::Result<String>;

    /// Fetch a remote module; the error is a human-readable reason
    fn fetch(&self, url: &str) -> Result<String, String>;
}

/// Filesystem plus blocking HTTP
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResolver;

impl SourceResolver for FsResolver {
    fn read_file(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn fetch(&self, url: &str) -> Result<String, String> {
        reqwest::blocking::get(url)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Library,
    Remote,
    Json,
    Script,
}

/// A resolved import specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    /// Library name, URL or absolute path; also the cache key
    pub key: String,
    pub kind: ModuleKind,
}

pub fn is_remote(spec: &str) -> bool {
    spec.starts_with("http://") || spec.starts_with("https://")
}

/// Resolve `spec` as written in a file living in `dir`
pub fn classify(spec: &str, dir: &Path) -> ModuleRequest {
    if stdlib::is_library(spec) {
        return ModuleRequest {
            key: spec.to_string(),
            kind: ModuleKind::Library,
        };
    }
    if is_remote(spec) {
        return ModuleRequest {
            key: spec.to_string(),
            kind: ModuleKind::Remote,
        };
    }

    let mut path = normalize(&dir.join(spec));
    if path.extension().is_none() {
        path.set_extension("ml");
    }
    let kind = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => ModuleKind::Json,
        _ => ModuleKind::Script,
    };
    ModuleRequest {
        key: path.display().to_string(),
        kind,
    }
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Default binding name for `import "path"`: the file stem as an identifier
pub fn binding_name(spec: &str) -> String {
    let last = spec.trim_end_matches('/').rsplit('/').next().unwrap_or(spec);
    let stem = Path::new(last)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(last);

    let mut name: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Cache and in-progress set shared by every import of one run
pub struct ModuleLoader {
    resolver: Box<dyn SourceResolver>,
    cache: HashMap<String, Value>,
    loading: Vec<String>,
    disable_cache: bool,
}

impl ModuleLoader {
    pub fn new(resolver: Box<dyn SourceResolver>, disable_cache: bool) -> Self {
        ModuleLoader {
            resolver,
            cache: HashMap::new(),
            loading: Vec::new(),
            disable_cache,
        }
    }

    pub fn cached(&self, key: &str) -> Option<Value> {
        if self.disable_cache {
            return None;
        }
        self.cache.get(key).cloned()
    }

    pub fn store(&mut self, key: &str, value: Value) {
        if !self.disable_cache {
            self.cache.insert(key.to_string(), value);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Interpreter {
    /// Load the module `spec` names, relative to the file being evaluated
    pub fn import_module(&mut self, spec: &str) -> Result<Value, RuntimeError> {
        let request = classify(spec, &self.current_dir());

        if let Some(value) = self.modules.cached(&request.key) {
            log::debug!("module cache hit: {}", request.key);
            return Ok(value);
        }
        if self.modules.loading.contains(&request.key) {
            return Err(RuntimeError::import(format!(
                "Circular import of '{}'",
                request.key
            )));
        }

        log::debug!("loading {:?} module {}", request.kind, request.key);
        self.modules.loading.push(request.key.clone());
        let result = self.load_module(&request);
        self.modules.loading.pop();

        let value = result?;
        self.modules.store(&request.key, value.clone());
        Ok(value)
    }

    /// What `spec` would resolve to from the current file
    pub fn resolve_path(&self, spec: &str) -> String {
        classify(spec, &self.current_dir()).key
    }

    fn load_module(&mut self, request: &ModuleRequest) -> Result<Value, RuntimeError> {
        match request.kind {
            ModuleKind::Library => stdlib::load(&request.key).ok_or_else(|| {
                RuntimeError::import(format!("Unknown library '{}'", request.key))
            }),
            ModuleKind::Json => {
                let text = self.read_module(&request.key)?;
                stdlib::json::parse(&text).map_err(|e| {
                    RuntimeError::import(format!("Cannot import '{}': {}", request.key, e.message))
                })
            }
            ModuleKind::Script => {
                let text = self.read_module(&request.key)?;
                self.eval_module(&text, &request.key)
            }
            ModuleKind::Remote => {
                let text = self.modules.resolver.fetch(&request.key).map_err(|reason| {
                    RuntimeError::file_read(format!("Cannot fetch '{}': {}", request.key, reason))
                })?;
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => Ok(json_to_value(&json)),
                    Err(_) => self.eval_module(&text, &request.key),
                }
            }
        }
    }

    fn read_module(&self, key: &str) -> Result<String, RuntimeError> {
        self.modules
            .resolver
            .read_file(Path::new(key))
            .map_err(|e| RuntimeError::file_read(format!("Cannot read '{}': {}", key, e)))
    }

    /// Run module source in its own root scope and return its exports
    fn eval_module(&mut self, source: &str, file: &str) -> Result<Value, RuntimeError> {
        let program = parse_source(source)
            .map_err(|e| RuntimeError::import(format!("Cannot import '{}':\n{}", file, e)))?;

        let root = self.eval_file(&program, file)?;
        let exports = root.borrow().get("#exports")?;
        Ok(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::error::{ErrorKind, MyLangError};
    use std::io;

    #[derive(Default)]
    struct MemoryResolver {
        files: HashMap<PathBuf, String>,
        urls: HashMap<String, String>,
    }

    impl MemoryResolver {
        fn file(mut self, path: &str, source: &str) -> Self {
            self.files.insert(PathBuf::from(path), source.to_string());
            self
        }

        fn url(mut self, url: &str, body: &str) -> Self {
            self.urls.insert(url.to_string(), body.to_string());
            self
        }
    }

    impl SourceResolver for MemoryResolver {
        fn read_file(&self, path: &Path) -> io::Result<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "not found"))
        }

        fn fetch(&self, url: &str) -> Result<String, String> {
            self.urls.get(url).cloned().ok_or_else(|| "404".to_string())
        }
    }

    fn interpreter(resolver: MemoryResolver) -> Interpreter {
        Interpreter::with_resolver(RunOptions::new("/app", "/app/main.ml"), Box::new(resolver))
    }

    fn runtime_error(result: crate::error::Result<Value>) -> crate::error::RuntimeError {
        match result {
            Err(MyLangError::Runtime(err)) => err,
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify() {
        let dir = Path::new("/app/src");
        assert_eq!(classify("json", dir).kind, ModuleKind::Library);
        assert_eq!(
            classify("https://example.com/m.ml", dir).kind,
            ModuleKind::Remote
        );

        let script = classify("../lib/./util", dir);
        assert_eq!(script.key, "/app/lib/util.ml");
        assert_eq!(script.kind, ModuleKind::Script);

        let data = classify("./data.json", dir);
        assert_eq!(data.key, "/app/src/data.json");
        assert_eq!(data.kind, ModuleKind::Json);
    }

    #[test]
    fn test_binding_name() {
        assert_eq!(binding_name("./lib/math.ml"), "math");
        assert_eq!(binding_name("data.json"), "data");
        assert_eq!(binding_name("my-utils"), "my_utils");
        assert_eq!(binding_name("https://example.com/x/2d.ml"), "_2d");
        assert_eq!(binding_name("io"), "io");
    }

    #[test]
    fn test_import_script_exports() {
        let resolver = MemoryResolver::default().file(
            "/app/lib/math.ml",
            "export func add(a, b) { return a + b }\nvar hidden = 1\nexport (pi: 3)",
        );
        let mut interp = interpreter(resolver);
        let value = interp
            .run_source("import \"./lib/math\"\n[math.add(1, 2), math.pi, math.hidden]")
            .unwrap();
        assert_eq!(value.to_string(), "[3, 3, nil]");
    }

    #[test]
    fn test_nested_imports_resolve_against_importing_file() {
        let resolver = MemoryResolver::default()
            .file("/app/lib/a.ml", "import b: \"./b\"\nexport (value: b.value + 1)")
            .file("/app/lib/b.ml", "export (value: 41)");
        let mut interp = interpreter(resolver);
        let value = interp.run_source("import \"lib/a\"\na.value").unwrap();
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn test_import_json() {
        let resolver = MemoryResolver::default().file("/app/config.json", r#"{"port": 8080}"#);
        let mut interp = interpreter(resolver);
        let value = interp
            .run_source("import (cfg: \"./config.json\")\ncfg.port")
            .unwrap();
        assert!(matches!(value, Value::Int(8080)));
    }

    #[test]
    fn test_modules_are_cached() {
        let source = "import (a: \"./m\", b: \"./m\")\na.x = 5\nb.x";
        let files = || MemoryResolver::default().file("/app/m.ml", "export (x: 1)");

        let mut cached = interpreter(files());
        assert!(matches!(cached.run_source(source).unwrap(), Value::Int(5)));
        assert_eq!(cached.modules.len(), 1);

        let mut options = RunOptions::new("/app", "/app/main.ml");
        options.disable_cache = true;
        let mut uncached = Interpreter::with_resolver(options, Box::new(files()));
        assert!(matches!(uncached.run_source(source).unwrap(), Value::Int(1)));
        assert!(uncached.modules.is_empty());
    }

    #[test]
    fn test_circular_import() {
        let resolver = MemoryResolver::default()
            .file("/app/a.ml", "import \"./b\"")
            .file("/app/b.ml", "import \"./a\"");
        let mut interp = interpreter(resolver);
        let err = runtime_error(interp.run_source("import \"./a\""));
        assert_eq!(err.kind, ErrorKind::ImportFaildError);
        assert_eq!(err.message, "Circular import of '/app/a.ml'");
        assert!(err.files.iter().any(|f| f.starts_with("ImportDeclaration (b.ml:")));
    }

    #[test]
    fn test_missing_file() {
        let mut interp = interpreter(MemoryResolver::default());
        let err = runtime_error(interp.run_source("import \"./nope\""));
        assert_eq!(err.kind, ErrorKind::FileReadFaild);
        assert!(err.message.starts_with("Cannot read '/app/nope.ml'"));
    }

    #[test]
    fn test_remote_json_and_source() {
        let resolver = MemoryResolver::default()
            .url("https://example.com/data", r#"[1, 2]"#)
            .url("https://example.com/lib.ml", "export (name: \"remote\")");
        let mut interp = interpreter(resolver);
        let value = interp
            .run_source(
                "import (d: \"https://example.com/data\", l: \"https://example.com/lib.ml\")\n[d, l.name]",
            )
            .unwrap();
        assert_eq!(value.to_string(), r#"[[1, 2], "remote"]"#);
    }

    #[test]
    fn test_syntax_error_in_module_is_import_error() {
        let resolver = MemoryResolver::default().file("/app/bad.ml", "var = 1");
        let mut interp = interpreter(resolver);
        let err = runtime_error(interp.run_source("import \"./bad\""));
        assert_eq!(err.kind, ErrorKind::ImportFaildError);
    }

    #[test]
    fn test_resolve_helper() {
        let mut interp = interpreter(MemoryResolver::default());
        let value = interp.run_source("import.resolve(\"./x/y\")").unwrap();
        assert_eq!(value.to_string(), "/app/x/y.ml");
    }
}
