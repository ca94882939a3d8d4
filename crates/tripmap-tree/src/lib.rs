#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # tripmap-tree
//!
//! Format-neutral helpers for navigating nested vendor payloads.
//!
//! Documents are plain [`serde_json::Value`] trees. This crate provides the
//! dotted-path model used by mapping specifications, typed read/write
//! navigation over those trees, and a few value helpers shared by the
//! mapping actions.

/// Dotted paths and read/write navigation.
pub mod path;
/// Scalar rendering, truthiness and type naming.
pub mod value;

/// Path model and navigation entry points.
pub use path::{DottedPath, read, write};
/// Value helpers.
pub use value::{is_truthy, render, type_name};

pub use serde_json::{Map, Value};

use thiserror::Error;

/// Reasons a dotted path could not be navigated.
///
/// The two variants are kept apart so callers can apply different
/// policies to "the document lacks this field" and "the document has the
/// wrong shape here".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("missing field '{segment}' while resolving '{path}'")]
    MissingField { path: String, segment: String },

    #[error("cannot step into {found} with '{segment}' while resolving '{path}'")]
    StructuralMismatch {
        path: String,
        segment: String,
        found: String,
    },
}

impl PathError {
    /// Build a missing-field error for `segment` of `path`.
    pub fn missing(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::MissingField {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Build a structural mismatch for `segment` of `path` that hit a `found` node.
    pub fn mismatch(
        path: impl Into<String>,
        segment: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::StructuralMismatch {
            path: path.into(),
            segment: segment.into(),
            found: found.into(),
        }
    }

    /// True for [`PathError::MissingField`].
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingField { .. })
    }

    /// The full path that failed.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::MissingField { path, .. } | Self::StructuralMismatch { path, .. } => path,
        }
    }
}

/// Crate-local result type for path operations.
pub type Result<T> = std::result::Result<T, PathError>;
