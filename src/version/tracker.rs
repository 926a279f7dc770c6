//! Dependency tracking
//!
//! The output of a filtered file depends on the resolved versions of every
//! program its markers mention, not only on its own bytes. A
//! [`DependencyRecord`] captures that set together with a signature over the
//! versions, so a cache can tell when re-processing is needed even though the
//! input is unchanged.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::version::resolver::Resolver;

/// SHA-256 over the referenced programs and their current versions.
///
/// Programs are fed in sorted order: the name, then the dotted version. A
/// program that no longer resolves contributes an empty version instead of
/// failing, so the signature can always be computed.
pub fn signature(resolver: &Resolver, programs: &BTreeSet<String>) -> String {
    let mut hasher = Sha256::new();
    for program in programs {
        hasher.update(program.as_bytes());
        let version = resolver
            .try_resolve(program)
            .map(|v| v.to_string())
            .unwrap_or_default();
        hasher.update(version.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub programs: BTreeSet<String>,
    pub signature: String,
}

impl DependencyRecord {
    /// Record the given programs with their signature under `resolver`.
    pub fn capture(resolver: &Resolver, programs: BTreeSet<String>) -> Self {
        let signature = signature(resolver, &programs);
        Self {
            programs,
            signature,
        }
    }

    /// Whether every referenced program still resolves to what it did when
    /// the record was captured.
    pub fn is_current(&self, resolver: &Resolver) -> bool {
        signature(resolver, &self.programs) == self.signature
    }
}
