//! Dotted version values
//!
//! A version is the tuple of its dot-separated integer components. Ordering is
//! plain lexicographic tuple ordering: `8 < 8.1 < 8.1.0 < 9`. Missing trailing
//! components are never filled with zeros; use [`Version::truncate_pair`] for
//! the fuzzy view.

use std::fmt;
use std::str::FromStr;

use crate::version::error::ParseVersionError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn new(components: Vec<u64>) -> Self {
        Self(components)
    }

    /// Parse `"4.4.19"` into `Version([4, 4, 19])`.
    ///
    /// Every component must be a non-empty run of ASCII digits that fits into
    /// a `u64`. Signs, whitespace and empty components are rejected.
    pub fn parse(value: &str) -> Result<Self, ParseVersionError> {
        value
            .split('.')
            .map(|component| {
                if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid(value, component));
                }
                component.parse::<u64>().map_err(|_| invalid(value, component))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Both versions cut down to the length of the shorter one.
    pub fn truncate_pair<'a>(a: &'a Version, b: &'a Version) -> (&'a [u64], &'a [u64]) {
        let len = a.len().min(b.len());
        (&a.0[..len], &b.0[..len])
    }
}

fn invalid(value: &str, component: &str) -> ParseVersionError {
    ParseVersionError {
        value: value.to_string(),
        component: component.to_string(),
    }
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}
