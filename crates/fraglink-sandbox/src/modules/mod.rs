//! The module allowlist.
//!
//! `require(name)` inside the sandbox succeeds only for names registered
//! here. Sources are CommonJS text evaluated once per context with `module`,
//! `exports`, `require` and `__sandbox` (the console formatter) in scope.
//! Loading from disk happens on the host before any execution; the sandbox
//! itself has no filesystem access.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::SandboxError;

const ASSERT_SOURCE: &str = include_str!("assert.js");
const UTIL_SOURCE: &str = include_str!("util.js");

/// Names of the modules shipped with the sandbox.
pub const BUILTIN_MODULES: [&str; 2] = ["assert", "util"];

/// Allowlisted modules by name.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<str>>,
}

impl ModuleRegistry {
    /// A registry that allows nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the built-in modules (`assert`, `util`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("assert", ASSERT_SOURCE);
        registry.register("util", UTIL_SOURCE);
        registry
    }

    /// Adds or replaces a module. A `node:` prefix on the name is dropped.
    pub fn register(&mut self, name: impl AsRef<str>, source: impl Into<Arc<str>>) -> &mut Self {
        let name = name.as_ref();
        let name = name.strip_prefix("node:").unwrap_or(name);
        self.modules.insert(name.to_string(), source.into());
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_module(mut self, name: impl AsRef<str>, source: impl Into<Arc<str>>) -> Self {
        self.register(name, source);
        self
    }

    /// Drops every module whose name is not in `allowed`.
    pub fn retain_only<S: AsRef<str>>(&mut self, allowed: &[S]) {
        self.modules
            .retain(|name, _| allowed.iter().any(|a| a.as_ref() == name));
    }

    /// Registers every `<name>.js` file in `dir` as module `<name>`.
    /// Returns the number of modules loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, SandboxError> {
        let mut loaded = 0;
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("js") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                return Err(SandboxError::Module(format!(
                    "module file name is not valid UTF-8: {}",
                    path.display()
                )));
            };
            let source = std::fs::read_to_string(&path)?;
            tracing::debug!(module = %name, path = %path.display(), "registered sandbox module");
            self.register(name, source);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Source of an allowlisted module.
    pub fn source(&self, name: &str) -> Option<&str> {
        let name = name.strip_prefix("node:").unwrap_or(name);
        self.modules.get(name).map(|source| &**source)
    }

    /// Whether `name` is allowlisted.
    pub fn contains(&self, name: &str) -> bool {
        self.source(name).is_some()
    }

    /// Allowlisted names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Number of allowlisted modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether nothing is allowlisted.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
