//! Package version ordering (PEP 440).
//!
//! Ordering within a release: `dev < a < b < rc < final < post`, local
//! versions after their public version, trailing zero release components
//! insignificant. Anything that does not parse is a [`VersionKey::Unparsable`]
//! and sorts below every valid version.

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static PEP440: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)
        )?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("PEP 440 pattern compiles")
});

/// Pre-release phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    ReleaseCandidate,
}

/// One dot-separated piece of a local version label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Alpha(String),
    Numeric(u64),
}

/// A parsed, comparable package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageVersion {
    raw: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    /// `1.0.dev1` sorts before `1.0a1`.
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

impl PackageVersion {
    /// Parse a PEP 440 version string. Returns `None` when it does not conform
    /// or a component overflows `u64`.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = PEP440.captures(raw)?;
        let number = |name: &str| -> Option<Option<u64>> {
            caps.name(name).map_or(Some(None), |m| m.as_str().parse().ok().map(Some))
        };

        let epoch = number("epoch")?.unwrap_or(0);
        let release = caps
            .name("release")?
            .as_str()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let kind = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => PreKind::Alpha,
                    "b" | "beta" => PreKind::Beta,
                    _ => PreKind::ReleaseCandidate,
                };
                Some((kind, number("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        let post = if caps.name("post").is_some() {
            Some(number("post_n1")?.or(number("post_n2")?).unwrap_or(0))
        } else {
            None
        };
        let dev = if caps.name("dev").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|seg| {
                    seg.parse::<u64>().map_or_else(
                        |_| LocalSegment::Alpha(seg.to_ascii_lowercase()),
                        LocalSegment::Numeric,
                    )
                })
                .collect()
        });

        Some(Self {
            raw: raw.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn trimmed_release(&self) -> &[u64] {
        let len = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |idx| idx + 1);
        &self.release[..len]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, _, _) => PreKey::Final,
        }
    }

    fn dev_key(&self) -> (bool, u64) {
        // A missing dev segment sorts after every dev release.
        (self.dev.is_none(), self.dev.unwrap_or(0))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Sort key for a version string taken from a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VersionKey {
    /// Sorts below every valid version; ties broken by string comparison.
    Unparsable(String),
    Valid(PackageVersion),
}

impl VersionKey {
    pub fn parse(raw: &str) -> Self {
        PackageVersion::parse(raw).map_or_else(|| Self::Unparsable(raw.to_string()), Self::Valid)
    }

    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Unparsable(raw) => raw,
            Self::Valid(version) => version.as_str(),
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(raw: &str) -> PackageVersion {
        PackageVersion::parse(raw).unwrap_or_else(|| panic!("{raw} should parse"))
    }

    #[test]
    fn numeric_components_compare_as_numbers() {
        assert!(v("10.0") > v("9.0"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.1.0"));
    }

    #[test]
    fn trailing_zeros_are_insignificant_but_order_is_total() {
        assert_eq!(v("1.0").trimmed_release(), v("1.0.0").trimmed_release());
        assert_ne!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);
        assert!(v("1.0.0") < v("1.0.1"));
    }

    #[test]
    fn release_phases_follow_pep440() {
        let ordered = [
            "1.0.dev0", "1.0a1", "1.0a2.dev1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0+local.1",
            "1.0.post1.dev0", "1.0.post1", "1.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn spellings_are_normalized() {
        let alpha = v("1.0alpha2");
        assert_eq!(alpha.pre, Some((PreKind::Alpha, 2)));
        assert_eq!(v("1.0-preview1").pre, Some((PreKind::ReleaseCandidate, 1)));
        assert_eq!(v("1.0-3").post, Some(3));
        assert_eq!(v("1.0.rev").post, Some(0));
        assert_eq!(v("v2.1").release, vec![2, 1]);
        assert_eq!(v("1!0.5").epoch, 1);
        assert!(v("1!0.5") > v("99.0"));
    }

    #[test]
    fn local_segments_sort_alpha_before_numeric() {
        assert!(v("1.0+abc") < v("1.0+5"));
        assert!(v("1.0+1.2") < v("1.0+1.10"));
        assert!(v("1.0") < v("1.0+anything"));
    }

    #[test]
    fn unparsable_sorts_lowest() {
        let bad = VersionKey::parse("not.a.version");
        assert!(!bad.is_valid());
        assert!(bad < VersionKey::parse("0.0.1.dev0"));
        assert!(VersionKey::parse("aaa") < VersionKey::parse("bbb"));
        assert_eq!(bad.to_string(), "not.a.version");
    }

    proptest! {
        #[test]
        fn dotted_numeric_order_matches_tuple_order(
            a in prop::collection::vec(0u64..200, 1..4),
            b in prop::collection::vec(0u64..200, 1..4),
        ) {
            let join = |parts: &[u64]| parts.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            let (va, vb) = (v(&join(&a)), v(&join(&b)));
            let trim = |parts: &[u64]| {
                let mut p = parts.to_vec();
                while p.last() == Some(&0) {
                    p.pop();
                }
                p
            };
            let expected = trim(&a).cmp(&trim(&b));
            if expected != Ordering::Equal {
                prop_assert_eq!(va.cmp(&vb), expected);
            }
        }

        #[test]
        fn sorting_is_antisymmetric(
            a in "[0-9]{1,3}(\\.[0-9]{1,3}){0,2}(rc[0-9])?",
            b in "[0-9]{1,3}(\\.[0-9]{1,3}){0,2}(rc[0-9])?",
        ) {
            let (ka, kb) = (VersionKey::parse(&a), VersionKey::parse(&b));
            prop_assert_eq!(ka.cmp(&kb), kb.cmp(&ka).reverse());
        }
    }
}
