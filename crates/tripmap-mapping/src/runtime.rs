//! Mapping runtime
//!
//! Recursive interpreter for [`MappingSpec`] trees.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};
use tripmap_tree::{DottedPath, PathError, path, type_name};

use crate::config::EngineConfig;
use crate::context::{Diagnostic, DiagnosticKind, Severity, TransformContext};
use crate::dsl::{ActionSpec, FieldRule, ForEachRule, MappingRule, MappingSpec};
use crate::providers::{CONFIG_SCOPE, INSTANCE_SCOPE, Providers};

/// Outcome of a lookup that may legitimately miss.
type Lookup = std::result::Result<Value, PathError>;

/// Result of a transform together with its side channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOutcome {
    pub document: Value,
    /// Values of `is_unique_id` fields, in first-seen order
    pub unique_ids: Vec<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Engine executing mapping specifications
///
/// The engine holds only immutable state; all per-document state lives in
/// a [`TransformContext`], so one engine can be shared across threads.
#[derive(Debug, Default, Clone)]
pub struct TransformEngine {
    providers: Providers,
    config: EngineConfig,
}

impl TransformEngine {
    /// Create an engine without value providers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine resolving reserved prefixes through `providers`
    #[must_use]
    pub fn with_providers(providers: Providers) -> Self {
        Self {
            providers,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Transform `source` into a fresh output document
    ///
    /// # Errors
    ///
    /// Returns an error when a reserved lookup names a missing provider or
    /// attribute, or when an action fails and
    /// [`EngineConfig::fail_on_action_error`] is set.
    pub fn transform(&self, source: &Value, spec: &MappingSpec) -> crate::Result<Value> {
        let mut context = TransformContext::new();
        self.run_with_context(source, spec, &mut context)
    }

    /// Transform `source` and also return the seen unique ids and diagnostics
    ///
    /// # Errors
    ///
    /// Same as [`TransformEngine::transform`].
    pub fn run(&self, source: &Value, spec: &MappingSpec) -> crate::Result<TransformOutcome> {
        let mut context = TransformContext::new();
        let document = self.run_with_context(source, spec, &mut context)?;
        let (unique_ids, diagnostics) = context.into_parts();
        Ok(TransformOutcome {
            document,
            unique_ids,
            diagnostics,
        })
    }

    /// Transform `source` against a caller-owned context
    ///
    /// Cached values in `context` survive into later calls made with the
    /// same context.
    ///
    /// # Errors
    ///
    /// Same as [`TransformEngine::transform`].
    pub fn run_with_context(
        &self,
        source: &Value,
        spec: &MappingSpec,
        context: &mut TransformContext,
    ) -> crate::Result<Value> {
        debug!(
            mapping = spec.name.as_deref().unwrap_or("<unnamed>"),
            rules = spec.field_set.len(),
            "starting transform"
        );
        self.execute_field_set(&spec.field_set, source, source, context)
    }

    /// Evaluate a rule set against `current`; always yields an object
    fn execute_field_set(
        &self,
        rules: &[MappingRule],
        current: &Value,
        parent: &Value,
        context: &mut TransformContext,
    ) -> crate::Result<Value> {
        let mut result = Value::Object(Map::new());

        for rule in rules {
            match rule {
                MappingRule::ForEach(for_each) => {
                    let produced = self.execute_for_each(for_each, current, context)?;
                    merge_shallow(&mut result, produced);
                }
                MappingRule::FieldSet(children) => {
                    let produced = self.execute_field_set(children, current, parent, context)?;
                    merge_shallow(&mut result, produced);
                }
                MappingRule::Field(field) => {
                    self.execute_field(field, current, parent, &mut result, context)?;
                }
            }
        }

        Ok(result)
    }

    /// Execute a for_each loop; yields `{to: [...]}`
    fn execute_for_each(
        &self,
        rule: &ForEachRule,
        current: &Value,
        context: &mut TransformContext,
    ) -> crate::Result<Value> {
        let target = rule.to.to_string();

        let collected = match path::read(current, &rule.from) {
            Ok(Value::Array(items)) => {
                trace!(from = %rule.from, to = %target, elements = items.len(), "for_each");
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.execute_field_set(&rule.field_set, item, current, context)?);
                }
                let collected = Value::Array(out);
                match &rule.action {
                    Some(action) => {
                        self.apply_action(action, &collected, current, &target, context)?
                    }
                    None => collected,
                }
            }
            Ok(Value::Null) => {
                debug!(from = %rule.from, to = %target, "for_each source is null, writing null");
                context.push_diagnostic(Diagnostic::new(
                    Severity::Debug,
                    DiagnosticKind::StructuralMismatch,
                    &target,
                    format!("for_each source '{}' is null", rule.from),
                ));
                Value::Null
            }
            Ok(other) => {
                let message = format!(
                    "for_each source '{}' is {}, expected array",
                    rule.from,
                    type_name(other)
                );
                warn!(to = %target, "{message}, writing null");
                context.push_diagnostic(Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::StructuralMismatch,
                    &target,
                    message,
                ));
                Value::Null
            }
            Err(err) => {
                downgrade(&target, &err, false, context);
                Value::Null
            }
        };

        let mut produced = Value::Object(Map::new());
        write_value(&mut produced, collected, &rule.to, context);
        Ok(produced)
    }

    /// Execute a leaf field rule, writing into `result`
    fn execute_field(
        &self,
        field: &FieldRule,
        current: &Value,
        parent: &Value,
        result: &mut Value,
        context: &mut TransformContext,
    ) -> crate::Result<()> {
        let target = field.to.to_string();

        let resolved = match &field.from {
            Some(from) => {
                let base = if field.from_parent { parent } else { current };
                self.resolve_source(from, base, context)?
            }
            None => Ok(field.default_value.clone().unwrap_or(Value::Null)),
        };

        let value = match resolved {
            Ok(value) => {
                let value = match &field.action {
                    Some(action) => self.apply_action(action, &value, current, &target, context)?,
                    None => value,
                };

                if field.is_unique_id && context.record_unique_id(&value) {
                    debug!(to = %target, id = %value, "recorded unique id");
                }
                if field.add_to_cache {
                    if let Some(key) = field.to.first() {
                        context.cache.insert_first(key, value.clone());
                    }
                }
                value
            }
            Err(err) => {
                downgrade(&target, &err, field.is_optional, context);
                Value::Null
            }
        };

        write_value(result, value, &field.to, context);
        Ok(())
    }

    /// Resolve `from` through the cache, a value provider, or `base`
    ///
    /// A first segment starting with the marker twice (`$$type`) names the
    /// payload key with one marker removed (`$type`).
    fn resolve_source(
        &self,
        from: &DottedPath,
        base: &Value,
        context: &TransformContext,
    ) -> crate::Result<Lookup> {
        let Some(head) = from.first() else {
            return Ok(Ok(base.clone()));
        };
        let marker = self.config.reserved_marker;
        if head.strip_prefix(marker).is_some_and(|scope| scope.starts_with(marker)) {
            let raw = from.to_string();
            let literal = DottedPath::parse(raw.strip_prefix(marker).unwrap_or(&raw));
            return Ok(path::read(base, &literal).cloned());
        }
        let rest = from.rest();

        if head == self.config.cache_prefix {
            let Some(key) = rest.first() else {
                return Ok(Err(PathError::missing(from.to_string(), "")));
            };
            let lookup = match context.cache.get(key) {
                Some(cached) => path::read(cached, &rest.rest()).cloned(),
                None => Err(PathError::missing(from.to_string(), key)),
            };
            return Ok(lookup);
        }

        let scope = if head == self.config.config_prefix {
            Some(CONFIG_SCOPE)
        } else {
            head.strip_prefix(marker).map(|scope| {
                if self.providers.has_scope(scope) {
                    scope
                } else {
                    INSTANCE_SCOPE
                }
            })
        };

        match scope {
            Some(scope) => {
                let name = rest.first().unwrap_or_default();
                let attribute = self.providers.attribute(scope, name)?;
                trace!(scope, name, "resolved provider attribute");
                Ok(path::read(&attribute, &rest.rest()).cloned())
            }
            None => Ok(path::read(base, from).cloned()),
        }
    }

    /// Apply `action`, downgrading failures to `null` unless configured to fail
    fn apply_action(
        &self,
        action: &ActionSpec,
        value: &Value,
        source: &Value,
        target: &str,
        context: &mut TransformContext,
    ) -> crate::Result<Value> {
        match action.apply(value, source) {
            Ok(result) => Ok(result),
            Err(error) if self.config.fail_on_action_error => Err(crate::Error::Action {
                target: target.to_string(),
                source: error,
            }),
            Err(error) => {
                warn!(to = target, action = action.name(), %error, "action failed, writing null");
                context.push_diagnostic(Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::ActionFailed,
                    target,
                    error.to_string(),
                ));
                Ok(Value::Null)
            }
        }
    }
}

/// Apply the optionality policy to a failed lookup
fn downgrade(target: &str, error: &PathError, optional: bool, context: &mut TransformContext) {
    let kind = if error.is_missing() {
        DiagnosticKind::MissingField
    } else {
        DiagnosticKind::StructuralMismatch
    };

    let severity = if optional {
        debug!(to = target, %error, "optional field unresolved, writing null");
        Severity::Debug
    } else {
        warn!(to = target, %error, "required field unresolved, writing null");
        Severity::Warning
    };

    context.push_diagnostic(Diagnostic::new(severity, kind, target, error.to_string()));
}

/// Write `value` at `to`; the empty path merges an object into `result`
fn write_value(result: &mut Value, value: Value, to: &DottedPath, context: &mut TransformContext) {
    if to.is_empty() {
        match value {
            Value::Object(_) => merge_shallow(result, value),
            other => {
                let message = format!("cannot merge {} into the output", type_name(&other));
                warn!("{message}");
                context.push_diagnostic(Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::WriteFailed,
                    "",
                    message,
                ));
            }
        }
        return;
    }

    if let Err(error) = path::write(result, value, to) {
        warn!(to = %to, %error, "write failed, value dropped");
        context.push_diagnostic(Diagnostic::new(
            Severity::Warning,
            DiagnosticKind::WriteFailed,
            to.to_string(),
            error.to_string(),
        ));
    }
}

/// Shallow merge of two objects; keys of `produced` win
fn merge_shallow(result: &mut Value, produced: Value) {
    if let (Value::Object(target), Value::Object(source)) = (result, produced) {
        target.extend(source);
    }
}
