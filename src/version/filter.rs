//! Line filter
//!
//! Keeps lines whose marker comparison holds (with the marker cut out), drops
//! lines whose comparison fails, and passes unmarked lines through untouched.

use std::collections::BTreeSet;

use tracing::trace;

use crate::version::error::FilterError;
use crate::version::marker::MarkerGrammar;
use crate::version::resolver::Resolver;

/// Result of filtering one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filtered {
    pub lines: Vec<String>,
    /// Every program referenced by a marker, whether its line was kept or not
    pub programs: BTreeSet<String>,
}

impl Filtered {
    /// Output text: the kept lines joined by `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

pub struct LineFilter<'a> {
    grammar: &'a MarkerGrammar,
    resolver: &'a Resolver,
}

impl<'a> LineFilter<'a> {
    pub fn new(grammar: &'a MarkerGrammar, resolver: &'a Resolver) -> Self {
        Self { grammar, resolver }
    }

    /// Filter a sequence of lines.
    ///
    /// Any error aborts the whole input; nothing filtered so far is returned.
    pub fn process<I, S>(&self, lines: I) -> Result<Filtered, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filtered = Filtered::default();

        for (index, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            let Some(marker) = self.grammar.find(line)? else {
                filtered.lines.push(line.to_string());
                continue;
            };

            filtered.programs.insert(marker.program.to_string());
            let resolved = self.resolver.resolve(marker.program)?;

            if marker.comparator.evaluate(&resolved, &marker.version) {
                trace!(
                    "line {}: {} {} {} holds, keeping",
                    index + 1,
                    resolved,
                    marker.symbol,
                    marker.version
                );
                filtered.lines.push(MarkerGrammar::strip(line, &marker));
            } else {
                trace!(
                    "line {}: {} {} {} fails, dropping",
                    index + 1,
                    resolved,
                    marker.symbol,
                    marker.version
                );
            }
        }

        Ok(filtered)
    }

    /// Filter a whole text, splitting on `\n` or `\r\n`.
    pub fn process_text(&self, text: &str) -> Result<Filtered, FilterError> {
        self.process(text.lines())
    }
}
