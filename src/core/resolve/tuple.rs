//! Purpose: Parse and rank `prebuilds/<platform>-<arch>[+<arch>...]` directory names.
//! Exports: `Tuple`, `parse_tuple`, `select_tuple`.
//! Invariants: Single-arch directories outrank multi-arch ones; ties go to the smaller name.

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Tuple {
    pub name: String,
    pub platform: String,
    pub architectures: Vec<String>,
}

impl Tuple {
    fn matches(&self, platform: &str, arch: &str) -> bool {
        self.platform == platform && self.architectures.iter().any(|item| item == arch)
    }
}

pub(crate) fn parse_tuple(name: &str) -> Option<Tuple> {
    let (platform, archs) = name.split_once('-')?;
    if platform.is_empty() || archs.contains('-') {
        return None;
    }
    let architectures: Vec<String> = archs.split('+').map(str::to_string).collect();
    if architectures.iter().any(String::is_empty) {
        return None;
    }
    Some(Tuple {
        name: name.to_string(),
        platform: platform.to_string(),
        architectures,
    })
}

pub(crate) fn select_tuple<I>(names: I, platform: &str, arch: &str) -> Option<Tuple>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .filter_map(|name| parse_tuple(&name))
        .filter(|tuple| tuple.matches(platform, arch))
        .min_by(|a, b| {
            a.architectures
                .len()
                .cmp(&b.architectures.len())
                .then_with(|| a.name.cmp(&b.name))
        })
}

#[cfg(test)]
mod tests {
    use super::{parse_tuple, select_tuple};

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_fat_tuples() {
        let tuple = parse_tuple("darwin-x64+arm64").expect("tuple");
        assert_eq!(tuple.platform, "darwin");
        assert_eq!(tuple.architectures, vec!["x64", "arm64"]);
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["darwin", "-x64", "darwin-", "darwin-x64+", "linux-x64-extra", ".DS_Store"] {
            assert!(parse_tuple(name).is_none(), "{name}");
        }
    }

    #[test]
    fn prefers_single_arch_directory() {
        let picked = select_tuple(
            names(&["darwin-x64+arm64", "linux-x64", "darwin-x64"]),
            "darwin",
            "x64",
        )
        .expect("tuple");
        assert_eq!(picked.name, "darwin-x64");
    }

    #[test]
    fn falls_back_to_fat_directory_and_breaks_ties_by_name() {
        let picked = select_tuple(
            names(&["darwin-x64+arm64", "darwin-arm64+x64", "linux-arm64"]),
            "darwin",
            "arm64",
        )
        .expect("tuple");
        assert_eq!(picked.name, "darwin-arm64+x64");
        assert!(select_tuple(names(&["darwin-x64"]), "linux", "x64").is_none());
    }
}
