//! Version marker processing
//!
//! This module holds everything needed to filter a file by version markers
//! and to tell when a filtered file has to be regenerated.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Marker    │────▶│   Filter    │◀────│  Resolver   │
//! │  (grammar)  │     │ (keep/drop) │     │ (versions)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Operator   │     │   Tracker   │────▶│    Cache    │
//! │  (compare)  │     │ (signature) │     │  (records)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`value`]: Dotted version tuples
//! - [`operator`]: Comparison operators, fuzzy comparison and the operator registry
//! - [`marker`]: `@program op version@` marker grammar
//! - [`resolver`]: Version lookup in explicit versions and the environment
//! - [`filter`]: Line filtering
//! - [`tracker`]: Referenced programs and their signature
//! - [`cache`]: SQLite-based store of dependency records
//! - [`error`]: Error types

pub mod cache;
pub mod error;
pub mod filter;
pub mod marker;
pub mod operator;
pub mod resolver;
pub mod tracker;
pub mod value;
