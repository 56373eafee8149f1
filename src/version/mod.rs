// src/version/mod.rs

//! Debian package version parsing and ordering
//!
//! Versions follow the dpkg grammar `[epoch:]upstream_version[-debian_revision]`.
//! Ordering matches `dpkg --compare-versions`, so results can be compared
//! directly against versions published in Debian security advisories.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Symbols allowed in the upstream version besides ASCII alphanumerics
const UPSTREAM_SYMBOLS: &[char] = &['.', '+', '~', '-', ':', '_'];

/// Symbols allowed in the Debian revision besides ASCII alphanumerics
const REVISION_SYMBOLS: &[char] = &['.', '+', '~', '_'];

/// A parsed Debian version
///
/// Equality is dpkg equality: `1.0` and `1.00` compare equal even though
/// their stored components differ.
#[derive(Debug, Clone)]
pub struct DebVersion {
    pub epoch: u64,
    pub upstream: String,
    pub revision: String,
}

impl DebVersion {
    /// Parse a Debian version string
    ///
    /// Examples:
    /// - "1.2.3" → epoch=0, upstream="1.2.3", revision=""
    /// - "2:1.2.3" → epoch=2, upstream="1.2.3", revision=""
    /// - "1.2.3-4ubuntu1" → epoch=0, upstream="1.2.3", revision="4ubuntu1"
    /// - "1:2.3-rc1-2" → epoch=1, upstream="2.3-rc1", revision="2"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(invalid(s, "version string is empty"));
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((epoch_str, rest)) => {
                let epoch = epoch_str
                    .parse::<u64>()
                    .map_err(|_| invalid(s, "epoch is not a non-negative number"))?;
                (epoch, rest)
            }
            None => (0, s),
        };

        // The revision starts after the last hyphen, so upstream may contain hyphens
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, revision),
            None => (rest, ""),
        };

        if upstream.is_empty() {
            return Err(invalid(s, "upstream version is empty"));
        }
        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid(s, "upstream version does not start with a digit"));
        }
        if let Some(c) = upstream
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !UPSTREAM_SYMBOLS.contains(c))
        {
            return Err(invalid(s, &format!("invalid character '{}' in upstream version", c)));
        }
        if let Some(c) = revision
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && !REVISION_SYMBOLS.contains(c))
        {
            return Err(invalid(s, &format!("invalid character '{}' in revision", c)));
        }

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision: revision.to_string(),
        })
    }

    /// Compare two Debian versions using dpkg ordering
    pub fn compare(&self, other: &DebVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_fragment(&self.upstream, &other.upstream))
            .then_with(|| compare_fragment(&self.revision, &other.revision))
    }
}

fn invalid(version: &str, reason: &str) -> Error {
    Error::InvalidVersion {
        version: version.to_string(),
        reason: reason.to_string(),
    }
}

/// Sort weight of a single non-digit position
///
/// `~` sorts before everything, even the end of the string. Letters sort
/// before all other symbols.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(b'~') => -1,
        Some(c) => i32::from(c) + 256,
    }
}

fn is_digit(c: Option<&u8>) -> bool {
    c.is_some_and(u8::is_ascii_digit)
}

/// dpkg's `verrevcmp`: alternate non-digit and digit runs
fn compare_fragment(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit(a.get(i)) && is_digit(b.get(j)) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        // A longer run of significant digits is the larger number
        if is_digit(a.get(i)) {
            return Ordering::Greater;
        }
        if is_digit(b.get(j)) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl fmt::Display for DebVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if !self.revision.is_empty() {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for DebVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for DebVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for DebVersion {}

impl Ord for DebVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for DebVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for DebVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DebVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
