//! Dotted version parsing and client/server skew rules.
//!
//! Parsing is best-effort: a leading `v`, distribution suffixes such as
//! `+k3s1` or `-eks-4f9a`, and missing minor/patch components are all
//! tolerated (`"1.28"` parses as `1.28.0`).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extracts the first dotted numeric run from `text`.
    pub fn parse(text: &str) -> Option<Self> {
        let start = text.find(|c: char| c.is_ascii_digit())?;
        let mut components = [0u64; 3];
        let mut parsed = 0;

        for (slot, part) in components.iter_mut().zip(text[start..].split('.')) {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            if digits.is_empty() {
                break;
            }
            *slot = digits.parse().ok()?;
            parsed += 1;
            if digits.len() != part.len() {
                // A suffix ends the numeric run.
                break;
            }
        }

        (parsed > 0).then(|| Self::new(components[0], components[1], components[2]))
    }

    /// Client/server skew rule: same major, minor within one either way.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major && self.minor.abs_diff(other.minor) <= 1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a version: {s:?}"))
    }
}

/// Orders two version strings; `None` if either does not parse.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Whether a client at `client` may talk to a server at `server`.
/// Unparsable input is never compatible.
pub fn compatible(client: &str, server: &str) -> bool {
    match (Version::parse(client), Version::parse(server)) {
        (Some(c), Some(s)) => c.is_compatible_with(&s),
        _ => false,
    }
}
