//! Comparison operators and the operator registry
//!
//! Every operator exists in an exact and a fuzzy flavour. The fuzzy flavour
//! compares both versions only up to the length of the shorter one, which
//! makes `8 ==? 8.1` hold.

use std::cmp::Ordering;

use serde::Deserialize;

use crate::version::error::FilterError;
use crate::version::value::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::Eq,
        Operator::Ne,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }

    /// Whether `left OP right` holds given `left.cmp(right)`.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

/// An operator bound to its comparison flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparator {
    pub operator: Operator,
    pub fuzzy: bool,
}

impl Comparator {
    pub fn exact(operator: Operator) -> Self {
        Self {
            operator,
            fuzzy: false,
        }
    }

    pub fn fuzzy(operator: Operator) -> Self {
        Self {
            operator,
            fuzzy: true,
        }
    }

    /// Evaluate `resolved OP marker`.
    pub fn evaluate(&self, resolved: &Version, marker: &Version) -> bool {
        evaluate(self.operator, self.fuzzy, resolved, marker)
    }
}

pub fn evaluate(operator: Operator, fuzzy: bool, resolved: &Version, marker: &Version) -> bool {
    let ordering = if fuzzy {
        let (left, right) = Version::truncate_pair(resolved, marker);
        left.cmp(right)
    } else {
        resolved.cmp(marker)
    };
    operator.holds(ordering)
}

/// How fuzzy comparison is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only operators suffixed with `?` compare fuzzily.
    #[default]
    Marker,
    /// Every operator compares fuzzily; `?` suffixes are not recognized.
    Global,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Marker => "marker",
            Mode::Global => "global",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marker" => Ok(Mode::Marker),
            "global" => Ok(Mode::Global),
            _ => Err(()),
        }
    }
}

/// Registry mapping operator symbols to comparators.
///
/// [`OperatorSet::for_mode`] gives the built-in sets; [`OperatorSet::from_entries`]
/// accepts extra symbols such as `=` or `~=` bound to one of the comparators.
/// Entries are kept sorted by descending symbol length so that a grammar built
/// from [`OperatorSet::symbols`] tries `>=` before `>`.
#[derive(Debug, Clone)]
pub struct OperatorSet {
    entries: Vec<(String, Comparator)>,
}

impl OperatorSet {
    pub fn for_mode(mode: Mode) -> Self {
        let entries = match mode {
            Mode::Marker => Operator::ALL
                .iter()
                .map(|op| (op.symbol().to_string(), Comparator::exact(*op)))
                .chain(
                    Operator::ALL
                        .iter()
                        .map(|op| (format!("{}?", op.symbol()), Comparator::fuzzy(*op))),
                )
                .collect(),
            Mode::Global => Operator::ALL
                .iter()
                .map(|op| (op.symbol().to_string(), Comparator::fuzzy(*op)))
                .collect(),
        };
        Self::from_entries(entries)
    }

    pub fn from_entries(mut entries: Vec<(String, Comparator)>) -> Self {
        // Stable sort keeps the declaration order among equal lengths.
        entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        Self { entries }
    }

    pub fn lookup(&self, symbol: &str) -> Option<Comparator> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, comparator)| *comparator)
    }

    /// Like [`OperatorSet::lookup`], failing for symbols the set does not know.
    pub fn comparator(&self, symbol: &str) -> Result<Comparator, FilterError> {
        self.lookup(symbol)
            .ok_or_else(|| FilterError::UnknownOperator(symbol.to_string()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(s, _)| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[rstest]
    #[case(Operator::Eq, true, "8", "8.1", true)]
    #[case(Operator::Eq, false, "8", "8.1", false)]
    #[case(Operator::Lt, true, "8", "9.5", true)]
    #[case(Operator::Lt, false, "8", "9", true)]
    #[case(Operator::Lt, false, "8", "8.1", true)]
    #[case(Operator::Lt, true, "8", "8.1", false)]
    #[case(Operator::Ne, true, "8.2", "8", false)]
    #[case(Operator::Ne, false, "8.2", "8", true)]
    #[case(Operator::Ge, true, "4.4", "4.9.1", false)]
    #[case(Operator::Ge, true, "4.4", "4", true)]
    #[case(Operator::Le, false, "4.4", "4.4", true)]
    #[case(Operator::Gt, false, "4.4.1", "4.4", true)]
    #[case(Operator::Gt, true, "4.4.1", "4.4", false)]
    #[case(Operator::Gt, false, "10", "9.9", true)]
    fn evaluate_returns_expected(
        #[case] operator: Operator,
        #[case] fuzzy: bool,
        #[case] resolved: &str,
        #[case] marker: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(evaluate(operator, fuzzy, &v(resolved), &v(marker)), expected);
    }

    #[test]
    fn symbols_are_ordered_longest_first() {
        let set = OperatorSet::for_mode(Mode::Marker);
        let lengths: Vec<usize> = set.symbols().map(str::len).collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
        assert_eq!(set.symbols().count(), 12);
    }

    #[rstest]
    #[case(Mode::Marker, "<=", Some(Comparator::exact(Operator::Le)))]
    #[case(Mode::Marker, "<=?", Some(Comparator::fuzzy(Operator::Le)))]
    #[case(Mode::Marker, "!=?", Some(Comparator::fuzzy(Operator::Ne)))]
    #[case(Mode::Global, "==", Some(Comparator::fuzzy(Operator::Eq)))]
    #[case(Mode::Global, "==?", None)]
    #[case(Mode::Marker, "=<", None)]
    fn lookup_resolves_symbols_per_mode(
        #[case] mode: Mode,
        #[case] symbol: &str,
        #[case] expected: Option<Comparator>,
    ) {
        assert_eq!(OperatorSet::for_mode(mode).lookup(symbol), expected);
    }

    #[test]
    fn comparator_rejects_unknown_symbol() {
        let set = OperatorSet::for_mode(Mode::Global);

        let err = set.comparator("==?").unwrap_err();

        assert!(matches!(err, FilterError::UnknownOperator(ref s) if s == "==?"));
        assert_eq!(
            set.comparator("<").unwrap(),
            Comparator::fuzzy(Operator::Lt)
        );
    }

    #[test]
    fn from_entries_orders_custom_symbols_longest_first() {
        let set = OperatorSet::from_entries(vec![
            ("=".to_string(), Comparator::exact(Operator::Eq)),
            ("~=".to_string(), Comparator::fuzzy(Operator::Eq)),
            ("==".to_string(), Comparator::exact(Operator::Eq)),
        ]);

        assert_eq!(set.symbols().collect::<Vec<_>>(), vec!["~=", "==", "="]);
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in [Mode::Marker, Mode::Global] {
            assert_eq!(mode.as_str().parse::<Mode>(), Ok(mode));
        }
        assert!("subver".parse::<Mode>().is_err());
    }
}
