//! Semantic version triple and bump rules.

use crate::error::{ReleaseError, Result};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version.
///
/// Ordering is lexicographic over the triple, which the derived `Ord` gives
/// because of field order.
///
/// # Examples
///
/// ```
/// use extension_release::version::{BumpKind, SemanticVersion};
///
/// let current: SemanticVersion = "1.2.3".parse().expect("valid version");
/// assert_eq!(current.bump(BumpKind::Minor).expect("no overflow").to_string(), "1.3.0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
}

/// Which component of a [`SemanticVersion`] to increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BumpKind {
    /// `x.y.z` → `x.y.(z+1)`
    Patch,
    /// `x.y.z` → `x.(y+1).0`
    Minor,
    /// `x.y.z` → `(x+1).0.0`
    Major,
}

impl SemanticVersion {
    /// Create a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Return the major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Return the minor component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    /// Return the patch component.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.patch
    }

    /// Compute the next version for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidVersion`] if the incremented component
    /// would overflow.
    pub fn bump(self, kind: BumpKind) -> Result<Self> {
        let overflow = || ReleaseError::InvalidVersion {
            value: self.to_string(),
            reason: format!("{kind} component overflows"),
        };
        let next = match kind {
            BumpKind::Major => Self::new(self.major.checked_add(1).ok_or_else(overflow)?, 0, 0),
            BumpKind::Minor => Self::new(
                self.major,
                self.minor.checked_add(1).ok_or_else(overflow)?,
                0,
            ),
            BumpKind::Patch => Self::new(
                self.major,
                self.minor,
                self.patch.checked_add(1).ok_or_else(overflow)?,
            ),
        };
        Ok(next)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        })
    }
}

impl FromStr for SemanticVersion {
    type Err = ReleaseError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = |reason: &str| ReleaseError::InvalidVersion {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };

        let mut parts = value.split('.');
        let mut next_component = || -> Result<u64> {
            let part = parts
                .next()
                .ok_or_else(|| invalid("expected three dot-separated components"))?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("components must be non-negative integers"));
            }
            part.parse::<u64>()
                .map_err(|_| invalid("component does not fit in 64 bits"))
        };

        let major = next_component()?;
        let minor = next_component()?;
        let patch = next_component()?;
        if parts.next().is_some() {
            return Err(invalid("expected three dot-separated components"));
        }
        Ok(Self::new(major, minor, patch))
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = ReleaseError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SemanticVersion> for String {
    fn from(version: SemanticVersion) -> Self {
        version.to_string()
    }
}

impl serde::Serialize for SemanticVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SemanticVersion {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
