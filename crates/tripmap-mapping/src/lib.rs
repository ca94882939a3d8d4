//! # tripmap-mapping
//!
//! Declarative mapping of vendor payloads into canonical documents.
//!
//! A [`MappingSpec`] is static configuration: a tree of field rules,
//! `for_each` loops and nested `field_set` groups, loaded from YAML or JSON
//! through [`MappingDsl`]. The [`TransformEngine`] walks that tree depth
//! first against a source document, reading with dotted paths, applying
//! [`ActionSpec`] post-processors and writing into a fresh output tree.
//!
//! Every call gets its own [`TransformContext`] (cache store, seen unique
//! ids, diagnostics), so one engine can serve many documents concurrently.

pub mod actions;
pub mod cache;
pub mod config;
pub mod context;
pub mod dsl;
pub mod providers;
pub mod runtime;

mod numeric;

pub use actions::ActionError;
pub use cache::CacheStore;
pub use config::EngineConfig;
pub use context::{Diagnostic, DiagnosticKind, Severity, TransformContext};
pub use dsl::{ActionSpec, FieldRule, ForEachRule, MappingDsl, MappingRule, MappingSpec};
pub use providers::{CONFIG_SCOPE, FnProvider, INSTANCE_SCOPE, Providers, ValueProvider};
pub use runtime::{TransformEngine, TransformOutcome};

use thiserror::Error;

/// Errors that abort a mapping call
#[derive(Error, Debug)]
pub enum Error {
    #[error("Mapping parse error: {0}")]
    Parse(#[from] dsl::ParseError),

    #[error("No value provider registered for scope '{scope}'")]
    MissingProvider { scope: String },

    #[error("Value provider '{scope}' has no attribute '{name}'")]
    MissingAttribute { scope: String, name: String },

    #[error("Action failed for '{target}': {source}")]
    Action {
        target: String,
        #[source]
        source: ActionError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
