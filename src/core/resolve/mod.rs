//! Purpose: Locate the native module file best suited to the running platform.
//! Exports: `Resolver`, `Environment`, `Target`.
//! Role: Pure path resolution; loading is done separately by `native::TdjsonLibrary`.
//! Invariants: Strategies run in a fixed order and the first hit wins:
//! package override, local `build/Release` + `build/Debug`, `prebuilds/`, executable dir.
//! Invariants: No caching; the same filesystem and environment give the same answer.
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::error::{Error, ErrorKind};

mod env;
mod tags;
mod target;
mod tuple;

pub use env::Environment;
pub use target::Target;

pub const DEFAULT_EXTENSION: &str = "node";
const PREBUILDS_DIR: &str = "prebuilds";
const LOCAL_BUILD_DIRS: [&str; 2] = ["Release", "Debug"];

#[derive(Clone, Debug)]
pub struct Resolver {
    target: Target,
    environment: Environment,
    extension: String,
}

impl Resolver {
    pub fn new(target: Target, environment: Environment) -> Self {
        Self {
            target,
            environment,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Resolver for the running process.
    pub fn detect() -> Self {
        let environment = Environment::capture();
        Self::new(Target::detect(&environment), environment)
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn resolve(&self, dir: &Path) -> Result<PathBuf, Error> {
        let dir = self.package_override(dir).unwrap_or_else(|| dir.to_path_buf());

        if !self.environment.flag("PREBUILDS_ONLY") {
            for flavor in LOCAL_BUILD_DIRS {
                if let Some(found) = self.first_module(&dir.join("build").join(flavor)) {
                    tracing::debug!(path = %found.display(), "using local build");
                    return Ok(found);
                }
            }
        }

        if let Some(found) = self.resolve_prebuild(&dir) {
            return Ok(found);
        }
        if let Some(exec_dir) = self.environment.exec_dir() {
            if let Some(found) = self.resolve_prebuild(exec_dir) {
                return Ok(found);
            }
        }

        Err(Error::new(ErrorKind::NotFound)
            .with_message(format!(
                "no native build was found for {}",
                self.target.describe()
            ))
            .with_path(&dir)
            .with_hint(format!(
                "Add {PREBUILDS_DIR}/{}-{}/<name>.{} or a build/Release artifact.",
                self.target.platform, self.target.arch, self.extension
            )))
    }

    /// Best match under `dir/prebuilds`, if any.
    pub fn resolve_prebuild(&self, dir: &Path) -> Option<PathBuf> {
        let prebuilds = dir.join(PREBUILDS_DIR);
        let tuple = tuple::select_tuple(
            list_names(&prebuilds),
            &self.target.platform,
            &self.target.arch,
        )?;
        let tuple_dir = prebuilds.join(&tuple.name);
        let winner = tags::select_candidate(list_names(&tuple_dir), &self.target, &self.extension)?;
        let found = tuple_dir.join(winner.file);
        tracing::debug!(path = %found.display(), "using prebuild");
        Some(found)
    }

    fn package_override(&self, dir: &Path) -> Option<PathBuf> {
        let manifest = std::fs::read_to_string(dir.join("package.json")).ok()?;
        let manifest: Value = serde_json::from_str(&manifest).ok()?;
        let name = manifest.get("name")?.as_str()?;
        let key = format!("{}_PREBUILD", name.to_uppercase().replace('-', "_"));
        self.environment
            .var(&key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    fn first_module(&self, dir: &Path) -> Option<PathBuf> {
        let suffix = format!(".{}", self.extension);
        list_names(dir)
            .into_iter()
            .find(|name| name.ends_with(&suffix))
            .map(|name| dir.join(name))
    }
}

/// Sorted entry names; unreadable directories read as empty.
fn list_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}
