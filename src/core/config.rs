//! Purpose: Model the process-wide binding configuration and its option overlay.
//! Exports: `Config`, `ConfigOptions`, `Verbosity`, `InterfaceMode`, `default_library_file`.
//! Role: Plain data; the set-once lifecycle is enforced by `api::Tdl`.
//! Invariants: Defaults mirror the stock tdjson install (verbosity 2, 10s receive, legacy).
//! Invariants: Applying options only overrides fields that are `Some`.
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_VERBOSITY_LEVEL: i32 = 2;

pub fn default_library_file() -> &'static str {
    if cfg!(windows) {
        "tdjson.dll"
    } else if cfg!(target_os = "macos") {
        "libtdjson.dylib"
    } else {
        "libtdjson.so"
    }
}

/// Engine log verbosity applied once at initialization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verbosity {
    /// Leave the engine's own default untouched.
    Default,
    Level(i32),
}

impl FromStr for Verbosity {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input == "default" {
            return Ok(Verbosity::Default);
        }
        input.parse::<i32>().map(Verbosity::Level).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid verbosity: {input}"))
                .with_hint("Use an integer level or `default`.")
                .with_source(err)
        })
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Default => write!(f, "default"),
            Verbosity::Level(level) => write!(f, "{level}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InterfaceMode {
    /// Per-client handles, each client polls its own receive.
    #[default]
    Legacy,
    /// Integer client ids and one shared receive loop.
    Multiplexed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub tdjson: String,
    pub libdir: Option<PathBuf>,
    pub prebuild_dir: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub receive_timeout: Duration,
    pub interface: InterfaceMode,
}

impl Config {
    pub fn new() -> Self {
        Self {
            tdjson: default_library_file().to_string(),
            libdir: None,
            prebuild_dir: None,
            verbosity: Verbosity::Level(DEFAULT_VERBOSITY_LEVEL),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            interface: InterfaceMode::Legacy,
        }
    }

    pub fn apply(&mut self, options: ConfigOptions) {
        if let Some(tdjson) = options.tdjson {
            self.tdjson = tdjson;
        }
        if let Some(libdir) = options.libdir {
            self.libdir = Some(libdir);
        }
        if let Some(prebuild_dir) = options.prebuild_dir {
            self.prebuild_dir = Some(prebuild_dir);
        }
        if let Some(verbosity) = options.verbosity {
            self.verbosity = verbosity;
        }
        if let Some(receive_timeout) = options.receive_timeout {
            self.receive_timeout = receive_timeout;
        }
        if let Some(interface) = options.interface {
            self.interface = interface;
        }
    }

    /// Path handed to the dynamic loader when no prebuild directory is set.
    ///
    /// A bare file name (no `libdir`) is left to the system search path.
    pub fn library_path(&self) -> PathBuf {
        match &self.libdir {
            Some(dir) => dir.join(&self.tdjson),
            None => Path::new(&self.tdjson).to_path_buf(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigOptions {
    pub tdjson: Option<String>,
    pub libdir: Option<PathBuf>,
    pub prebuild_dir: Option<PathBuf>,
    pub verbosity: Option<Verbosity>,
    pub receive_timeout: Option<Duration>,
    pub interface: Option<InterfaceMode>,
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tdjson(mut self, file: impl Into<String>) -> Self {
        self.tdjson = Some(file.into());
        self
    }

    pub fn libdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.libdir = Some(dir.into());
        self
    }

    pub fn prebuild_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prebuild_dir = Some(dir.into());
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = Some(verbosity);
        self
    }

    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub fn interface(mut self, interface: InterfaceMode) -> Self {
        self.interface = Some(interface);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_install() {
        let config = Config::new();
        assert_eq!(config.verbosity, Verbosity::Level(2));
        assert_eq!(config.receive_timeout, Duration::from_secs(10));
        assert_eq!(config.interface, InterfaceMode::Legacy);
        assert_eq!(config.library_path(), PathBuf::from(default_library_file()));
    }

    #[test]
    fn apply_only_overrides_present_fields() {
        let mut config = Config::new();
        config.apply(ConfigOptions::new().libdir("/opt/td/lib"));
        config.apply(ConfigOptions::new().interface(InterfaceMode::Multiplexed));

        assert_eq!(config.libdir, Some(PathBuf::from("/opt/td/lib")));
        assert_eq!(config.interface, InterfaceMode::Multiplexed);
        assert_eq!(config.tdjson, default_library_file());
        assert_eq!(
            config.library_path(),
            PathBuf::from("/opt/td/lib").join(default_library_file())
        );
    }

    #[test]
    fn verbosity_parses_default_and_levels() {
        assert_eq!("default".parse::<Verbosity>().expect("parse"), Verbosity::Default);
        assert_eq!("0".parse::<Verbosity>().expect("parse"), Verbosity::Level(0));
        let err = "loud".parse::<Verbosity>().expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
