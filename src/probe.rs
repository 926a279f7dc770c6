//! Finding the installed version of a program by running it
//!
//! The program is looked up on `PATH` and run with a single argument
//! (`--version` by default). Its standard output is searched for a version
//! string; when the program exits unsuccessfully its standard error is
//! searched instead, which covers tools that only print their version as part
//! of a usage error.

use std::process::Command;

use regex::Regex;
use tracing::debug;

use crate::version::error::ProbeError;
use crate::version::resolver::env_key;
use crate::version::value::Version;

pub const DEFAULT_ARGUMENT: &str = "--version";

/// First run of dot-separated digits.
pub const DEFAULT_PATTERN: &str = r"[0-9]+(?:\.[0-9]+)*";

pub struct Probe {
    argument: String,
    pattern: Regex,
}

impl Default for Probe {
    fn default() -> Self {
        Self {
            argument: DEFAULT_ARGUMENT.to_string(),
            pattern: default_pattern(),
        }
    }
}

fn default_pattern() -> Regex {
    Regex::new(DEFAULT_PATTERN).unwrap()
}

impl Probe {
    pub fn new(argument: impl Into<String>, pattern: Regex) -> Self {
        Self {
            argument: argument.into(),
            pattern,
        }
    }

    pub fn with_argument(argument: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            pattern: default_pattern(),
        }
    }

    pub fn find_version(&self, program: &str) -> Result<Version, ProbeError> {
        let path = which::which(program).map_err(|source| ProbeError::NotFound {
            program: program.to_string(),
            source,
        })?;
        debug!("Probing {:?} with {}", path, self.argument);

        let output = Command::new(&path)
            .arg(&self.argument)
            .output()
            .map_err(|source| ProbeError::Io {
                program: program.to_string(),
                source,
            })?;

        let text = if output.status.success() {
            String::from_utf8_lossy(&output.stdout)
        } else {
            debug!("{} exited with {}, reading stderr", program, output.status);
            String::from_utf8_lossy(&output.stderr)
        };

        self.extract(program, &text)
    }

    /// Parse the first match of the pattern in `text`.
    pub fn extract(&self, program: &str, text: &str) -> Result<Version, ProbeError> {
        let found = self
            .pattern
            .find(text)
            .ok_or_else(|| ProbeError::NoVersion {
                program: program.to_string(),
            })?;
        Version::parse(found.as_str()).map_err(|source| ProbeError::Malformed {
            program: program.to_string(),
            source,
        })
    }
}

/// Environment entry a probe result is stored under.
///
/// `var` overrides the program name, so `find_version("python3", var = "python")`
/// yields `PYTHON_VERSION`.
pub fn env_entry(program: &str, var: Option<&str>, version: &Version) -> (String, String) {
    (env_key(var.unwrap_or(program)), version.to_string())
}
