use std::path::PathBuf;

use thiserror::Error;

/// A dotted version string that is not a sequence of integers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version {value:?}: component {component:?} is not a non-negative integer")]
pub struct ParseVersionError {
    pub value: String,
    pub component: String,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("version missing for program {0}")]
    MissingVersion(String),

    #[error("malformed version for {subject}: {source}")]
    MalformedVersion {
        subject: String,
        #[source]
        source: ParseVersionError,
    },

    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    #[error("marker grammar failed to compile: {0}")]
    Grammar(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid processing mode stored in cache: {0}")]
    InvalidMode(String),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot derive an output name for {0}: expected a .ver extension")]
    NoOutput(PathBuf),

    #[error("an explicit output needs exactly one input, got {0}")]
    AmbiguousOutput(usize),

    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("program {program} not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no version string found in output of {program}")]
    NoVersion { program: String },

    #[error("unparsable version reported by {program}: {source}")]
    Malformed {
        program: String,
        #[source]
        source: ParseVersionError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid version pattern for {program}: {source}")]
    Pattern {
        program: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Version(#[from] FilterError),
}
