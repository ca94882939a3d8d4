//! Per-call transform context

use crate::cache::CacheStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// Severity of a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected miss (optional field)
    Debug,
    /// Unexpected miss or failure, downgraded to `null`
    Warning,
}

/// What the engine downgraded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingField,
    StructuralMismatch,
    ActionFailed,
    WriteFailed,
}

/// One downgrade performed during a transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// Destination path of the rule
    pub target: String,
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic
    pub fn new(
        severity: Severity,
        kind: DiagnosticKind,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Mutable state of one transform call
///
/// The engine creates a fresh context per call. Reusing one context for
/// several documents carries cached values forward: a cache key populated
/// by an earlier document shadows the value a later document would write.
#[derive(Debug, Default, Clone)]
pub struct TransformContext {
    pub cache: CacheStore,
    unique_ids: Vec<Value>,
    /// Compact JSON of every recorded id, for constant-time membership
    seen_ids: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl TransformContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unique id; returns false when it was already seen or is `null`.
    pub fn record_unique_id(&mut self, id: &Value) -> bool {
        if id.is_null() || !self.seen_ids.insert(id.to_string()) {
            return false;
        }
        self.unique_ids.push(id.clone());
        true
    }

    /// Seen unique ids, in first-seen order
    #[must_use]
    pub fn unique_ids(&self) -> &[Value] {
        &self.unique_ids
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Forget cached values, ids and diagnostics
    pub fn reset(&mut self) {
        self.cache.clear();
        self.unique_ids.clear();
        self.seen_ids.clear();
        self.diagnostics.clear();
    }

    /// Split into seen ids and diagnostics
    #[must_use]
    pub fn into_parts(self) -> (Vec<Value>, Vec<Diagnostic>) {
        (self.unique_ids, self.diagnostics)
    }
}
