//! Version resolution
//!
//! The version of a program is looked up in an ordered chain of sources. The
//! default chain is:
//!
//! 1. explicit versions under the exact program name
//! 2. explicit versions under the uppercase program name
//! 3. the environment under `PROGRAM_VERSION`
//!
//! The first source that knows the program wins.

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::version::error::FilterError;
use crate::version::value::Version;

/// A single place a program version can come from.
#[cfg_attr(test, automock)]
pub trait VersionSource: Send + Sync {
    /// Short description used in logs
    fn describe(&self) -> String;

    /// Look up the version of `program`.
    ///
    /// `Ok(None)` means this source has no entry and the next one should be
    /// asked. An entry that exists but does not parse is an error.
    fn lookup(&self, program: &str) -> Result<Option<Version>, FilterError>;
}

/// Environment key holding the version of `program`, e.g. `BASH_VERSION`.
pub fn env_key(program: &str) -> String {
    format!("{}_VERSION", program.to_uppercase())
}

/// Parse configured `program -> "x.y.z"` pairs.
pub fn parse_versions(
    raw: &HashMap<String, String>,
) -> Result<HashMap<String, Version>, FilterError> {
    raw.iter()
        .map(|(program, value)| {
            Version::parse(value)
                .map(|version| (program.clone(), version))
                .map_err(|source| FilterError::MalformedVersion {
                    subject: program.clone(),
                    source,
                })
        })
        .collect()
}

/// Explicit versions keyed by the program name as written in the marker.
pub struct ExplicitVersions {
    versions: Arc<HashMap<String, Version>>,
}

impl ExplicitVersions {
    pub fn new(versions: Arc<HashMap<String, Version>>) -> Self {
        Self { versions }
    }
}

impl VersionSource for ExplicitVersions {
    fn describe(&self) -> String {
        "explicit versions".to_string()
    }

    fn lookup(&self, program: &str) -> Result<Option<Version>, FilterError> {
        Ok(self.versions.get(program).cloned())
    }
}

/// Explicit versions keyed by the uppercase program name.
pub struct UppercaseVersions {
    versions: Arc<HashMap<String, Version>>,
}

impl UppercaseVersions {
    pub fn new(versions: Arc<HashMap<String, Version>>) -> Self {
        Self { versions }
    }
}

impl VersionSource for UppercaseVersions {
    fn describe(&self) -> String {
        "explicit versions (uppercase)".to_string()
    }

    fn lookup(&self, program: &str) -> Result<Option<Version>, FilterError> {
        Ok(self.versions.get(&program.to_uppercase()).cloned())
    }
}

/// Snapshot of an environment-like key/value store.
pub struct EnvironmentVersions {
    vars: HashMap<String, String>,
}

impl EnvironmentVersions {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Snapshot of the current process environment.
    pub fn from_process_env() -> Self {
        Self::new(std::env::vars().collect())
    }

    /// Add or replace an entry, e.g. one found by a version probe.
    pub fn set(&mut self, key: String, value: String) {
        self.vars.insert(key, value);
    }
}

impl VersionSource for EnvironmentVersions {
    fn describe(&self) -> String {
        "environment".to_string()
    }

    fn lookup(&self, program: &str) -> Result<Option<Version>, FilterError> {
        let key = env_key(program);
        let Some(value) = self.vars.get(&key) else {
            return Ok(None);
        };
        Version::parse(value)
            .map(Some)
            .map_err(|source| FilterError::MalformedVersion {
                subject: key,
                source,
            })
    }
}

/// Ordered chain of version sources. Read-only once built.
pub struct Resolver {
    sources: Vec<Box<dyn VersionSource>>,
}

impl Resolver {
    pub fn new(sources: Vec<Box<dyn VersionSource>>) -> Self {
        Self { sources }
    }

    /// The default chain over explicit versions and an environment snapshot.
    pub fn with_defaults(explicit: HashMap<String, Version>, env: EnvironmentVersions) -> Self {
        let explicit = Arc::new(explicit);
        Self::new(vec![
            Box::new(ExplicitVersions::new(Arc::clone(&explicit))),
            Box::new(UppercaseVersions::new(explicit)),
            Box::new(env),
        ])
    }

    /// Resolve the version of `program`, failing with
    /// [`FilterError::MissingVersion`] when no source knows it.
    pub fn resolve(&self, program: &str) -> Result<Version, FilterError> {
        for source in &self.sources {
            if let Some(version) = source.lookup(program)? {
                debug!(
                    "Resolved {} to {} from {}",
                    program,
                    version,
                    source.describe()
                );
                return Ok(version);
            }
        }
        debug!("No version found for {}", program);
        Err(FilterError::MissingVersion(program.to_string()))
    }

    /// Like [`Resolver::resolve`] but swallowing every failure.
    pub fn try_resolve(&self, program: &str) -> Option<Version> {
        self.resolve(program).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn resolver(explicit: &[(&str, &str)], env: &[(&str, &str)]) -> Resolver {
        let explicit = explicit
            .iter()
            .map(|(k, val)| (k.to_string(), v(val)))
            .collect();
        let env = env
            .iter()
            .map(|(k, val)| (k.to_string(), val.to_string()))
            .collect();
        Resolver::with_defaults(explicit, EnvironmentVersions::new(env))
    }

    #[rstest]
    #[case(&[("prog", "1.0")], &[("PROG_VERSION", "2.0")], "1.0")]
    #[case(&[("PROG", "3")], &[("PROG_VERSION", "2.0")], "3")]
    #[case(&[("prog", "1.0"), ("PROG", "3")], &[], "1.0")]
    #[case(&[], &[("PROG_VERSION", "2.0")], "2.0")]
    #[case(&[("other", "9")], &[("PROG_VERSION", "2.0")], "2.0")]
    fn resolve_follows_source_order(
        #[case] explicit: &[(&str, &str)],
        #[case] env: &[(&str, &str)],
        #[case] expected: &str,
    ) {
        assert_eq!(resolver(explicit, env).resolve("prog").unwrap(), v(expected));
    }

    #[test]
    fn resolve_fails_with_missing_version_when_no_source_knows_program() {
        let err = resolver(&[("other", "1")], &[("OTHER_VERSION", "1")])
            .resolve("prog")
            .unwrap_err();

        assert!(matches!(err, FilterError::MissingVersion(ref p) if p == "prog"));
    }

    #[test]
    fn resolve_reports_malformed_environment_value() {
        let err = resolver(&[], &[("PROG_VERSION", "GNU bash 5")])
            .resolve("prog")
            .unwrap_err();

        assert!(
            matches!(err, FilterError::MalformedVersion { ref subject, .. } if subject == "PROG_VERSION")
        );
    }

    #[test]
    fn resolve_stops_at_first_source_with_entry() {
        let mut first = MockVersionSource::new();
        first
            .expect_lookup()
            .withf(|p| p == "bash")
            .times(1)
            .returning(|_| Ok(Some(Version::new(vec![5, 2]))));
        first.expect_describe().returning(|| "first".to_string());

        let mut second = MockVersionSource::new();
        second.expect_lookup().never();

        let resolver = Resolver::new(vec![Box::new(first), Box::new(second)]);

        assert_eq!(resolver.resolve("bash").unwrap(), v("5.2"));
    }

    #[test]
    fn resolve_propagates_source_errors_without_consulting_later_sources() {
        let mut first = MockVersionSource::new();
        first
            .expect_lookup()
            .returning(|p| Err(FilterError::MissingVersion(p.to_string())));

        let mut second = MockVersionSource::new();
        second.expect_lookup().never();

        let resolver = Resolver::new(vec![Box::new(first), Box::new(second)]);

        assert!(resolver.resolve("bash").is_err());
        assert_eq!(resolver.try_resolve("bash"), None);
    }

    #[test]
    fn parse_versions_names_program_on_failure() {
        let raw = HashMap::from([("bash".to_string(), "5.x".to_string())]);

        let err = parse_versions(&raw).unwrap_err();

        assert!(matches!(err, FilterError::MalformedVersion { ref subject, .. } if subject == "bash"));
    }

    #[test]
    fn env_key_uppercases_program() {
        assert_eq!(env_key("bash"), "BASH_VERSION");
        assert_eq!(env_key("gnu_make"), "GNU_MAKE_VERSION");
    }
}
