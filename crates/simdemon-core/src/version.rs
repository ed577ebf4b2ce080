//! Loose dotted-version matching used to pick toolchains and runtimes
//!
//! Versions are `major[.minor[.patch]]`; missing components compare as zero.
//! Constraints accept `*`, exact versions (`8.2`), wildcards (`9.x`, `9.*`),
//! comparator sets joined by whitespace (`>=8.2 <9.0`) and `||` alternatives.

use std::cmp::Ordering;
use std::fmt;

/// A parsed dotted version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    parts: Vec<u64>,
}

impl Version {
    /// Parse a version such as `17.2` or `Xcode 15.2.1`.
    ///
    /// Leading non-numeric text is skipped; parsing stops at the first
    /// component that is not a number. Returns `None` if no number is found.
    pub fn parse(s: &str) -> Option<Self> {
        let start = s.find(|c: char| c.is_ascii_digit())?;
        let parts: Vec<u64> = s[start..]
            .split(|c: char| c == '.' || c == '-')
            .map_while(|p| {
                let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().ok()
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(Self { parts })
        }
    }

    fn component(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }

    pub fn major(&self) -> u64 {
        self.component(0)
    }

    pub fn minor(&self) -> u64 {
        self.component(1)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        write!(f, "{}", joined.join("."))
    }
}

/// Compare two version strings. Unparseable strings sort first.
pub fn compare(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

pub fn gte(a: &str, b: &str) -> bool {
    compare(a, b) != Ordering::Less
}

pub fn lt(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Less
}

/// Format a version to between `min` and `max` components.
///
/// `format("9", 2, 2)` is `9.0`; `format("8.4.1", 2, 2)` is `8.4`.
pub fn format(version: &str, min: usize, max: usize) -> String {
    let Some(v) = Version::parse(version) else {
        return version.to_string();
    };

    let mut parts = v.parts;
    parts.truncate(max.max(1));
    while parts.len() < min {
        parts.push(0);
    }

    parts
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Check whether `version` satisfies `constraint`
pub fn satisfies(version: &str, constraint: &str) -> bool {
    let Some(v) = Version::parse(version) else {
        return false;
    };

    constraint
        .split("||")
        .any(|alternative| satisfies_all(&v, alternative))
}

fn satisfies_all(v: &Version, comparators: &str) -> bool {
    let mut any = false;
    for token in comparators.split_whitespace() {
        any = true;
        if !satisfies_one(v, token) {
            return false;
        }
    }
    any
}

fn satisfies_one(v: &Version, token: &str) -> bool {
    if token == "*" || token.eq_ignore_ascii_case("x") {
        return true;
    }

    for (op, check) in [
        (">=", Ordering::is_ge as fn(Ordering) -> bool),
        ("<=", Ordering::is_le),
        (">", Ordering::is_gt),
        ("<", Ordering::is_lt),
        ("=", Ordering::is_eq),
    ] {
        if let Some(rest) = token.strip_prefix(op) {
            return Version::parse(rest).is_some_and(|bound| check(v.cmp(&bound)));
        }
    }

    matches_prefix(v, token)
}

/// Exact or wildcard match: every given component must be equal,
/// `x`/`*` components and missing trailing components match anything.
fn matches_prefix(v: &Version, pattern: &str) -> bool {
    for (i, part) in pattern.split('.').enumerate() {
        if part == "x" || part == "X" || part == "*" {
            return true;
        }
        match part.parse::<u64>() {
            Ok(n) if n == v.component(i) => continue,
            _ => return false,
        }
    }
    true
}
