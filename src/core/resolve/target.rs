//! Purpose: Describe the running platform in prebuild naming terms.
//! Exports: `Target`.
//! Role: Input to tuple and tag matching; printed by `tdlbind target`.
//! Invariants: Names follow the prebuild directory convention (`darwin`, `win32`, `x64`, `arm64`).
use serde::Serialize;

use super::env::Environment;

pub const DEFAULT_RUNTIME: &str = "node";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Target {
    pub platform: String,
    pub arch: String,
    pub runtime: String,
    pub abi: String,
    pub uv: String,
    pub armv: String,
    pub libc: String,
    pub host_version: String,
}

impl Target {
    pub fn detect(env: &Environment) -> Self {
        let platform = env
            .var("npm_config_platform")
            .map(str::to_string)
            .unwrap_or_else(|| prebuild_platform(std::env::consts::OS).to_string());
        let arch = env
            .var("npm_config_arch")
            .map(str::to_string)
            .unwrap_or_else(|| prebuild_arch(std::env::consts::ARCH).to_string());
        let libc = env.var("LIBC").map(str::to_string).unwrap_or_else(|| {
            let musl = cfg!(target_env = "musl") || (platform == "linux" && env.is_alpine());
            let libc = if musl { "musl" } else { "glibc" };
            libc.to_string()
        });
        let armv = env
            .var("ARM_VERSION")
            .map(str::to_string)
            .unwrap_or_else(|| default_armv(&arch).to_string());

        Self {
            platform,
            arch,
            runtime: env
                .var("TDLBIND_RUNTIME")
                .unwrap_or(DEFAULT_RUNTIME)
                .to_string(),
            abi: env.var("TDLBIND_ABI").unwrap_or_default().to_string(),
            uv: env.var("TDLBIND_UV").unwrap_or_default().to_string(),
            armv,
            libc,
            host_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("platform={}", self.platform),
            format!("arch={}", self.arch),
            format!("runtime={}", self.runtime),
            format!("abi={}", self.abi),
            format!("uv={}", self.uv),
        ];
        if !self.armv.is_empty() {
            parts.push(format!("armv={}", self.armv));
        }
        parts.push(format!("libc={}", self.libc));
        parts.push(format!("tdlbind={}", self.host_version));
        parts.join(" ")
    }
}

fn prebuild_platform(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn prebuild_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        "powerpc64" => "ppc64",
        other => other,
    }
}

fn default_armv(arch: &str) -> &'static str {
    match arch {
        "arm64" => "8",
        "arm" if cfg!(target_arch = "arm") => "7",
        _ => "",
    }
}
