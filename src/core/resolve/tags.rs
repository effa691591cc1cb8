//! Purpose: Parse prebuild file names into tags and pick the best candidate for a target.
//! Exports: `FileTags`, `parse_tags`, `select_candidate`.
//! Invariants: A present tag that disagrees with the target disqualifies the file,
//! except `napi` builds forgive abi mismatches and `node.napi` builds forgive runtime ones.
//! Invariants: Ranking is total: exact runtime, explicit abi, specificity, then file name.
use std::cmp::Reverse;

use super::target::Target;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct FileTags {
    pub file: String,
    pub specificity: usize,
    pub runtime: Option<String>,
    pub napi: bool,
    pub abi: Option<String>,
    pub uv: Option<String>,
    pub armv: Option<String>,
    pub libc: Option<String>,
}

impl FileTags {
    fn runtime_agnostic(&self) -> bool {
        self.runtime.as_deref() == Some("node") && self.napi
    }

    fn matches(&self, target: &Target) -> bool {
        if let Some(runtime) = &self.runtime {
            if *runtime != target.runtime && !self.runtime_agnostic() {
                return false;
            }
        }
        if let Some(abi) = &self.abi {
            if *abi != target.abi && !self.napi {
                return false;
            }
        }
        mismatch_free(&self.uv, &target.uv)
            && mismatch_free(&self.armv, &target.armv)
            && mismatch_free(&self.libc, &target.libc)
    }
}

fn mismatch_free(tag: &Option<String>, wanted: &str) -> bool {
    tag.as_deref().is_none_or(|value| value == wanted)
}

pub(crate) fn parse_tags(file: &str, extension: &str) -> Option<FileTags> {
    let (stem, ext) = file.rsplit_once('.')?;
    if ext != extension {
        return None;
    }
    let mut tags = FileTags {
        file: file.to_string(),
        ..FileTags::default()
    };
    for tag in stem.split('.') {
        match tag {
            "node" | "electron" | "node-webkit" => tags.runtime = Some(tag.to_string()),
            "napi" => tags.napi = true,
            "glibc" | "musl" => tags.libc = Some(tag.to_string()),
            _ => {
                if let Some(abi) = tag.strip_prefix("abi") {
                    tags.abi = Some(abi.to_string());
                } else if let Some(uv) = tag.strip_prefix("uv") {
                    tags.uv = Some(uv.to_string());
                } else if let Some(armv) = tag.strip_prefix("armv") {
                    tags.armv = Some(armv.to_string());
                } else {
                    continue;
                }
            }
        }
        tags.specificity += 1;
    }
    Some(tags)
}

pub(crate) fn select_candidate<I>(files: I, target: &Target, extension: &str) -> Option<FileTags>
where
    I: IntoIterator<Item = String>,
{
    files
        .into_iter()
        .filter_map(|file| parse_tags(&file, extension))
        .filter(|tags| tags.matches(target))
        .min_by_key(|tags| {
            (
                tags.runtime.as_deref() != Some(target.runtime.as_str()),
                tags.abi.is_none(),
                Reverse(tags.specificity),
                tags.file.clone(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            platform: "linux".to_string(),
            arch: "x64".to_string(),
            runtime: "node".to_string(),
            abi: "115".to_string(),
            uv: "1".to_string(),
            armv: String::new(),
            libc: "glibc".to_string(),
            host_version: "0.1.0".to_string(),
        }
    }

    fn files(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_known_tags_only() {
        let tags = parse_tags("addon.node.napi.abi115.uv1.armv7.musl.node", "node").expect("tags");
        assert_eq!(tags.runtime.as_deref(), Some("node"));
        assert!(tags.napi);
        assert_eq!(tags.abi.as_deref(), Some("115"));
        assert_eq!(tags.uv.as_deref(), Some("1"));
        assert_eq!(tags.armv.as_deref(), Some("7"));
        assert_eq!(tags.libc.as_deref(), Some("musl"));
        assert_eq!(tags.specificity, 6);

        assert!(parse_tags("addon.so", "node").is_none());
        assert_eq!(parse_tags("addon.node", "node").expect("tags").specificity, 0);
    }

    #[test]
    fn libc_tag_must_match_host() {
        let picked = select_candidate(
            files(&["addon.glibc.node", "addon.musl.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.glibc.node");

        let musl_only = select_candidate(files(&["addon.musl.node"]), &target(), "node");
        assert!(musl_only.is_none());
    }

    #[test]
    fn napi_forgives_abi_and_runtime_agnostic_forgives_runtime() {
        let mut electron = target();
        electron.runtime = "electron".to_string();

        let picked = select_candidate(
            files(&["addon.abi93.node", "addon.node.napi.node"]),
            &electron,
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.node.napi.node");

        assert!(select_candidate(files(&["addon.node.node"]), &electron, "node").is_none());
    }

    #[test]
    fn ranks_exact_runtime_then_abi_then_specificity() {
        let picked = select_candidate(
            files(&["addon.napi.node", "addon.abi115.node", "addon.node.napi.glibc.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.node.napi.glibc.node");

        let picked = select_candidate(
            files(&["addon.napi.glibc.node", "addon.abi115.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.abi115.node");

        let picked = select_candidate(
            files(&["addon.napi.node", "addon.napi.glibc.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.napi.glibc.node");
    }

    #[test]
    fn uv_and_armv_tags_must_match_host() {
        let mut arm = target();
        arm.arch = "arm64".to_string();
        arm.armv = "8".to_string();

        assert!(select_candidate(files(&["addon.armv7.node"]), &arm, "node").is_none());
        assert!(select_candidate(files(&["addon.uv2.node"]), &arm, "node").is_none());
        let picked = select_candidate(
            files(&["addon.armv7.node", "addon.uv2.node", "addon.armv8.uv1.node"]),
            &arm,
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.armv8.uv1.node");
    }

    #[test]
    fn napi_build_survives_abi_mismatch() {
        assert!(select_candidate(files(&["addon.abi93.node"]), &target(), "node").is_none());
        let picked = select_candidate(
            files(&["addon.abi93.node", "addon.napi.abi93.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "addon.napi.abi93.node");
    }

    #[test]
    fn equal_rank_falls_back_to_file_name() {
        let picked = select_candidate(
            files(&["b.glibc.node", "a.glibc.node"]),
            &target(),
            "node",
        )
        .expect("candidate");
        assert_eq!(picked.file, "a.glibc.node");
    }
}
