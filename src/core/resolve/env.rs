//! Purpose: Snapshot the process inputs that steer native module resolution.
//! Exports: `Environment`.
//! Role: Keeps the resolver a pure function of (filesystem, environment, target).
//! Invariants: `capture` is the only place that reads the real process environment.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    alpine: bool,
    exec_dir: Option<PathBuf>,
}

impl Environment {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn capture() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        let exec_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self {
            vars,
            alpine: cfg!(target_os = "linux") && Path::new("/etc/alpine-release").exists(),
            exec_dir,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_alpine(mut self, alpine: bool) -> Self {
        self.alpine = alpine;
        self
    }

    pub fn with_exec_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exec_dir = Some(dir.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Non-empty variable, the way shell flags like `PREBUILDS_ONLY=1` are meant.
    pub fn flag(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| !value.is_empty())
    }

    pub fn is_alpine(&self) -> bool {
        self.alpine
    }

    pub fn exec_dir(&self) -> Option<&Path> {
        self.exec_dir.as_deref()
    }
}
