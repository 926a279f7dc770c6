//! Marker grammar
//!
//! Recognizes `@<program><operator><version>@` markers, e.g. `@bash>=4.4@` or
//! `@python==?3@`. The operator alternatives come from an [`OperatorSet`] and
//! are tried longest first.

use std::collections::BTreeSet;
use std::ops::Range;

use regex::Regex;

use crate::version::error::FilterError;
use crate::version::operator::{Comparator, OperatorSet};
use crate::version::value::Version;

/// A marker found in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker<'a> {
    pub program: &'a str,
    pub symbol: &'a str,
    pub comparator: Comparator,
    pub version: Version,
    /// Byte range of the marker in the line, including trailing whitespace.
    pub span: Range<usize>,
}

impl Marker<'_> {
    pub fn fuzzy(&self) -> bool {
        self.comparator.fuzzy
    }
}

#[derive(Debug, Clone)]
pub struct MarkerGrammar {
    pattern: Regex,
    operators: OperatorSet,
}

impl MarkerGrammar {
    pub fn new(operators: OperatorSet) -> Result<Self, FilterError> {
        let alternatives = operators
            .symbols()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"@(?P<program>[A-Za-z0-9_]+)(?P<operator>{})(?P<version>[0-9]+(?:\.[0-9]+)*)@\s*",
            alternatives
        ))?;
        Ok(Self { pattern, operators })
    }

    /// Find the earliest marker in `line`.
    ///
    /// Returns `Ok(None)` when the line has no marker. Text that only looks
    /// like a marker (unknown operator, trailing dot, ...) is not a marker.
    pub fn find<'a>(&self, line: &'a str) -> Result<Option<Marker<'a>>, FilterError> {
        let Some(caps) = self.pattern.captures(line) else {
            return Ok(None);
        };

        // Every group is mandatory in the pattern.
        let (Some(whole), Some(program), Some(symbol), Some(version)) = (
            caps.get(0),
            caps.name("program"),
            caps.name("operator"),
            caps.name("version"),
        ) else {
            return Ok(None);
        };

        let comparator = self.operators.comparator(symbol.as_str())?;

        let version =
            Version::parse(version.as_str()).map_err(|source| FilterError::MalformedVersion {
                subject: whole.as_str().trim_end().to_string(),
                source,
            })?;

        Ok(Some(Marker {
            program: program.as_str(),
            symbol: symbol.as_str(),
            comparator,
            version,
            span: whole.range(),
        }))
    }

    /// Programs referenced by the markers of `text`, without resolving them.
    pub fn referenced_programs(&self, text: &str) -> Result<BTreeSet<String>, FilterError> {
        let mut programs = BTreeSet::new();
        for line in text.lines() {
            if let Some(marker) = self.find(line)? {
                programs.insert(marker.program.to_string());
            }
        }
        Ok(programs)
    }

    /// `line` with the given marker span cut out.
    pub fn strip(line: &str, marker: &Marker<'_>) -> String {
        let mut stripped = String::with_capacity(line.len() - marker.span.len());
        stripped.push_str(&line[..marker.span.start]);
        stripped.push_str(&line[marker.span.end..]);
        stripped
    }
}
