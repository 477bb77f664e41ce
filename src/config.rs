//! Run configuration
//!
//! [`RunOptions`] is what a host hands the interpreter: where the main file
//! lives, whether modules are cached, and the environment scripts see through
//! `process.env`. An optional `mylang.toml` next to the main file (or in any
//! parent directory) supplies project defaults; CLI flags override it.

use crate::error::MyLangError;
use crate::runtime::DEFAULT_MAX_CALL_DEPTH;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the project file
pub const PROJECT_FILE: &str = "mylang.toml";

/// Host-supplied options for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory relative imports and frame paths are resolved against
    pub base: PathBuf,
    /// Entry file of the run
    pub main: PathBuf,
    pub disable_cache: bool,
    /// Files currently being evaluated, innermost last
    pub paths: Vec<String>,
    /// Extra variables merged over the host environment in `process.env`
    pub env: IndexMap<String, String>,
    /// Script arguments exposed as `process.argv`
    pub args: Vec<String>,
    pub max_call_depth: usize,
}

impl RunOptions {
    pub fn new(base: impl Into<PathBuf>, main: impl Into<PathBuf>) -> Self {
        RunOptions {
            base: base.into(),
            main: main.into(),
            disable_cache: false,
            paths: Vec::new(),
            env: IndexMap::new(),
            args: Vec::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Options for running `path`, with `mylang.toml` applied when present
    pub fn for_file(path: &Path) -> Result<Self, MyLangError> {
        let main = path.canonicalize()?;
        let base = main
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut options = RunOptions::new(&base, &main);
        if let Some(project) = ProjectConfig::find(&base)? {
            options.apply(&project);
        }
        Ok(options)
    }

    /// Options for an interactive session rooted at `dir`
    pub fn for_repl(dir: &Path) -> Self {
        RunOptions::new(dir, dir.join("<repl>"))
    }

    pub fn apply(&mut self, project: &ProjectConfig) {
        if let Some(disable_cache) = project.run.disable_cache {
            self.disable_cache = disable_cache;
        }
        if let Some(depth) = project.run.max_call_depth {
            self.max_call_depth = depth;
        }
        for (key, value) in &project.env {
            self.env.insert(key.clone(), value.clone());
        }
    }

    /// Path shown in error frames: relative to `base` when possible
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.base)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// `[run]` table of `mylang.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub disable_cache: Option<bool>,
    #[serde(default)]
    pub max_call_depth: Option<usize>,
}

/// Contents of `mylang.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl ProjectConfig {
    pub fn parse(content: &str) -> Result<Self, MyLangError> {
        toml::from_str(content).map_err(|e| MyLangError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, MyLangError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Search `start` and its parents for a project file
    pub fn find(start: &Path) -> Result<Option<Self>, MyLangError> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                log::debug!("using project file {}", candidate.display());
                return Self::load(&candidate).map(Some);
            }
            dir = current.parent();
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project_file() {
        let config = ProjectConfig::parse(
            r#"
            [run]
            disable_cache = true

            [env]
            MODE = "test"
            "#,
        )
        .unwrap();
        assert_eq!(config.run.disable_cache, Some(true));
        assert_eq!(config.env.get("MODE").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_empty_project_file_uses_defaults() {
        let config = ProjectConfig::parse("").unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn test_invalid_project_file() {
        assert!(matches!(
            ProjectConfig::parse("[run]\ndisable_cache = \"yes\""),
            Err(MyLangError::Config(_))
        ));
    }

    #[test]
    fn test_apply_overrides_defaults() {
        let mut options = RunOptions::new("/tmp", "/tmp/main.ml");
        let config = ProjectConfig::parse("[run]\nmax_call_depth = 50\n[env]\nA = \"1\"").unwrap();
        options.apply(&config);
        assert_eq!(options.max_call_depth, 50);
        assert!(!options.disable_cache);
        assert_eq!(options.env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_display_path_is_relative_to_base() {
        let options = RunOptions::new("/project", "/project/main.ml");
        assert_eq!(options.display_path(Path::new("/project/lib/a.ml")), "lib/a.ml");
        assert_eq!(options.display_path(Path::new("/elsewhere/b.ml")), "/elsewhere/b.ml");
    }

    #[test]
    fn test_for_file_finds_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PROJECT_FILE), "[run]\ndisable_cache = true").unwrap();
        let main = dir.path().join("main.ml");
        std::fs::write(&main, "var x = 1").unwrap();

        let options = RunOptions::for_file(&main).unwrap();
        assert!(options.disable_cache);
        assert_eq!(options.main, main.canonicalize().unwrap());
    }
}
