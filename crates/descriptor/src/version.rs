//! Version parsing, ordering and range matching
//!
//! Two version dialects live side by side:
//! - application and module versions are semantic versions (`1.4.2`,
//!   `2.0.0-SNAPSHOT.12`) matched against npm-style ranges (`^1.2.0`,
//!   `>=1.0.0 <2.0.0`, `1.x || 2.x`)
//! - interface versions are `major.minor[.patch]` and are matched by
//!   backward compatibility rather than by range

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A semantic version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release tag without the leading dash (`SNAPSHOT.12`)
    pub pre: Option<String>,
}

impl Version {
    /// Create a release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse `major[.minor[.patch]][-pre][+build]`
    ///
    /// Missing minor/patch components default to zero. Build metadata is
    /// accepted and discarded.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(input.to_string());
        let trimmed = input.trim();
        let without_build = trimmed.split('+').next().unwrap_or_default();
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (without_build, None),
        };

        let mut parts = core.split('.');
        let mut next = |required: bool| -> Result<u64> {
            match parts.next() {
                Some(part) => part.parse::<u64>().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let major = next(true)?;
        let minor = next(false)?;
        let patch = next(false)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    /// Whether this is a pre-release build
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| compare_pre(self.pre.as_deref(), other.pre.as_deref()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Release sorts after any of its pre-releases; identifiers compare
/// numerically when both are numeric
fn compare_pre(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let mut left = a.split('.');
            let mut right = b.split('.');
            loop {
                match (left.next(), right.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some(x), Some(y)) => {
                        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                            (Ok(x), Ok(y)) => x.cmp(&y),
                            (Ok(_), Err(_)) => Ordering::Less,
                            (Err(_), Ok(_)) => Ordering::Greater,
                            (Err(_), Err(_)) => x.cmp(y),
                        };
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Eq => version == &self.version,
            Op::Gt => version > &self.version,
            Op::Ge => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Le => version <= &self.version,
        }
    }
}

/// An npm-style version range
///
/// Supports `*`/`x` wildcards, exact versions, `=`, `>`, `>=`, `<`, `<=`,
/// caret and tilde ranges, whitespace-separated conjunctions and `||`
/// disjunctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// Parse a range expression
    pub fn parse(input: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for alternative in input.split("||") {
            let mut comparators = Vec::new();
            for token in alternative.split_whitespace() {
                comparators.extend(parse_comparator(input, token)?);
            }
            alternatives.push(comparators);
        }

        Ok(Self {
            raw: input.trim().to_string(),
            alternatives,
        })
    }

    /// A range that matches every version
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            alternatives: vec![Vec::new()],
        }
    }

    /// Check whether `version` satisfies this range
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|all| all.iter().all(|c| c.matches(version)))
    }

    /// The expression this range was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A possibly partial version such as `1`, `1.2`, `1.x`
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Option<String>,
}

impl Partial {
    fn parse(range: &str, text: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRange {
            range: range.to_string(),
            reason: reason.to_string(),
        };
        let (core, pre) = match text.split_once('-') {
            Some((core, pre)) => (core, Some(pre.to_string())),
            None => (text, None),
        };

        let mut components = [None; 3];
        let mut wildcard_seen = false;
        for (index, part) in core.split('.').enumerate() {
            if index >= 3 {
                return Err(invalid("too many version components"));
            }
            if matches!(part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(invalid("number after wildcard"));
            }
            let value = part
                .parse::<u64>()
                .map_err(|_| invalid("non-numeric version component"))?;
            components[index] = Some(value);
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
            pre,
        })
    }

    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
        }
    }

    fn is_full(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }
}

fn bounded(lower: Version, upper: Version) -> Vec<Comparator> {
    vec![
        Comparator {
            op: Op::Ge,
            version: lower,
        },
        Comparator {
            op: Op::Lt,
            version: upper,
        },
    ]
}

fn parse_comparator(range: &str, token: &str) -> Result<Vec<Comparator>> {
    let (op, rest) = [">=", "<=", ">", "<", "=", "^", "~"]
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token));
    let rest = rest.trim_start_matches('v');

    if matches!(rest, "" | "*" | "x" | "X") {
        return Ok(Vec::new());
    }
    let partial = Partial::parse(range, rest)?;
    let floor = partial.floor();

    let simple = |op: Op| {
        Ok(vec![Comparator {
            op,
            version: floor.clone(),
        }])
    };
    let bump = |component: u64| {
        component.checked_add(1).ok_or_else(|| Error::InvalidRange {
            range: range.to_string(),
            reason: "version component too large".to_string(),
        })
    };
    let next_minor_or_major = |major: u64, minor: Option<u64>| -> Result<Version> {
        Ok(match minor {
            Some(minor) => Version::new(major, bump(minor)?, 0),
            None => Version::new(bump(major)?, 0, 0),
        })
    };

    match op {
        ">=" => simple(Op::Ge),
        "<=" => simple(Op::Le),
        ">" => simple(Op::Gt),
        "<" => simple(Op::Lt),
        "^" => {
            let major = partial.major.unwrap_or(0);
            let upper = match (major, partial.minor, partial.patch) {
                (0, Some(0), Some(patch)) => Version::new(0, 0, bump(patch)?),
                (0, Some(minor), _) if minor > 0 || partial.patch.is_none() => {
                    Version::new(0, bump(minor)?, 0)
                }
                (0, None, _) => Version::new(1, 0, 0),
                _ => Version::new(bump(major)?, 0, 0),
            };
            Ok(bounded(floor.clone(), upper))
        }
        "~" => {
            let upper = next_minor_or_major(partial.major.unwrap_or(0), partial.minor)?;
            Ok(bounded(floor.clone(), upper))
        }
        _ if partial.is_full() => simple(Op::Eq),
        _ => {
            let upper = next_minor_or_major(partial.major.unwrap_or(0), partial.minor)?;
            Ok(bounded(floor.clone(), upper))
        }
    }
}

/// An interface version (`major.minor[.patch]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl InterfaceVersion {
    /// Parse `major.minor[.patch]`
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(input.to_string());
        let parts: Vec<&str> = input.trim().split('.').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        let number = |s: &str| s.parse::<u64>().map_err(|_| invalid());
        Ok(Self {
            major: number(parts[0])?,
            minor: number(parts[1])?,
            patch: parts.get(2).map_or(Ok(0), |p| number(p))?,
        })
    }

    /// Whether a provider at `self` can serve a consumer expecting `required`
    ///
    /// Same major, and either a newer minor or the same minor with an equal
    /// or newer patch.
    pub fn satisfies(&self, required: &Self) -> bool {
        self.major == required.major
            && (self.minor > required.minor
                || (self.minor == required.minor && self.patch >= required.patch))
    }
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

/// Check a provided interface version against a required version string
///
/// The required string may list several acceptable versions separated by
/// whitespace (`"1.2 2.0"`); any one of them being satisfied is enough.
/// Unparseable versions never match.
pub fn is_interface_compatible(required: &str, provided: &str) -> bool {
    let Ok(provided) = InterfaceVersion::parse(provided) else {
        return false;
    };
    required
        .split_whitespace()
        .filter_map(|candidate| InterfaceVersion::parse(candidate).ok())
        .any(|candidate| provided.satisfies(&candidate))
}

/// Split an application or module id into its name and version
///
/// Ids have the form `<name>-<version>` where the name itself may contain
/// dashes (`app-platform-full-1.2.0`); the version starts at the first dash
/// followed by a digit whose remainder parses as a version.
pub fn parse_id(id: &str) -> Result<(String, Version)> {
    id.char_indices()
        .filter(|(index, c)| {
            *c == '-'
                && *index > 0
                && id[index + 1..]
                    .chars()
                    .next()
                    .is_some_and(|next| next.is_ascii_digit())
        })
        .find_map(|(index, _)| {
            Version::parse(&id[index + 1..])
                .ok()
                .map(|version| (id[..index].to_string(), version))
        })
        .ok_or_else(|| Error::InvalidId(id.to_string()))
}

/// Name part of an id, falling back to the whole id when it has no version
pub fn name_of(id: &str) -> String {
    parse_id(id).map_or_else(|_| id.to_string(), |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_version_parse_and_display() {
        assert_eq!(v("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("2.0.0-SNAPSHOT.12").pre.as_deref(), Some("SNAPSHOT.12"));
        assert_eq!(v("1.0.0+build.5").to_string(), "1.0.0");
        assert!(Version::parse("1.a.0").is_err());
        assert!(Version::parse("1.0.0.0").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_version_ordering() {
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("1.0.0-SNAPSHOT") < v("1.0.0"));
        assert!(v("1.0.0-SNAPSHOT.2") < v("1.0.0-SNAPSHOT.10"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
    }

    #[test]
    fn test_range_caret_and_tilde() {
        assert!(range("^1.2.0").matches(&v("1.9.0")));
        assert!(!range("^1.2.0").matches(&v("2.0.0")));
        assert!(!range("^1.2.0").matches(&v("1.1.9")));
        assert!(range("^0.2.3").matches(&v("0.2.9")));
        assert!(!range("^0.2.3").matches(&v("0.3.0")));
        assert!(range("~1.2.0").matches(&v("1.2.7")));
        assert!(!range("~1.2.0").matches(&v("1.3.0")));
    }

    #[test]
    fn test_range_comparators_and_alternatives() {
        let r = range(">=1.0.0 <2.0.0");
        assert!(r.matches(&v("1.5.0")));
        assert!(!r.matches(&v("2.0.0")));

        let either = range("1.x || 3.x");
        assert!(either.matches(&v("1.4.0")));
        assert!(either.matches(&v("3.0.1")));
        assert!(!either.matches(&v("2.0.0")));

        assert!(range("*").matches(&v("42.0.0")));
        assert!(range("1.2.3").matches(&v("1.2.3")));
        assert!(!range("1.2.3").matches(&v("1.2.4")));
    }

    #[test]
    fn test_range_rejects_garbage() {
        assert!(VersionRange::parse("^1.a").is_err());
        assert!(VersionRange::parse("1.x.2").is_err());
    }

    #[test]
    fn test_range_rejects_unbounded_components() {
        let max = u64::MAX;
        for text in [
            format!("^{max}.0.0"),
            format!("~1.{max}"),
            format!("^0.0.{max}"),
            format!("{max}"),
        ] {
            let err = VersionRange::parse(&text).unwrap_err();
            assert!(err.to_string().contains("too large"), "{text}: {err}");
        }
        assert!(VersionRange::parse(&format!(">={max}.0.0")).is_ok());
    }

    #[test]
    fn test_interface_compatibility() {
        assert!(is_interface_compatible("1.0", "1.0"));
        assert!(is_interface_compatible("1.0", "1.3"));
        assert!(!is_interface_compatible("1.3", "1.0"));
        assert!(!is_interface_compatible("1.0", "2.0"));
        assert!(is_interface_compatible("1.0 2.0", "2.1"));
        assert!(is_interface_compatible("1.2.1", "1.2.4"));
        assert!(!is_interface_compatible("1.2.5", "1.2.4"));
        assert!(!is_interface_compatible("1.0", "bogus"));
    }

    #[test]
    fn test_parse_id() {
        let (name, version) = parse_id("app-platform-full-1.2.0").unwrap();
        assert_eq!(name, "app-platform-full");
        assert_eq!(version, Version::new(1, 2, 0));

        let (name, version) = parse_id("mod-users-2.0.0-SNAPSHOT.3").unwrap();
        assert_eq!(name, "mod-users");
        assert_eq!(version.pre.as_deref(), Some("SNAPSHOT.3"));

        assert!(parse_id("no-version-here").is_err());
        assert_eq!(name_of("no-version-here"), "no-version-here");
    }
}
