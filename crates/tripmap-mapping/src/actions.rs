//! Action catalog
//!
//! Pure value post-processors referenced from mapping rules. Every action
//! receives the resolved value and the source subtree the rule is
//! evaluated against, and returns a new value or a typed [`ActionError`].

use crate::dsl::{ActionSpec, CastType, FlatStrategy, ValueType};
use crate::numeric::{Numeric, float_value, value_to_numeric};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use tripmap_tree::{DottedPath, PathError, read, render, type_name};

/// Tokens accepted as `true` by `type_cast` to `bool`.
pub const TRUTHY_TOKENS: [&str; 6] = ["true", "1", "yes", "y", "t", "on"];

/// Failure of a single action on a given input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("action '{0}' is not implemented")]
    NotImplemented(&'static str),

    #[error("{action}: expected {expected}, found {found}")]
    InvalidInput {
        action: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{action}: index {index} out of range for {len} elements")]
    IndexOutOfRange {
        action: &'static str,
        index: i64,
        len: usize,
    },

    #[error("{action}: {source}")]
    UnresolvedField {
        action: &'static str,
        #[source]
        source: PathError,
    },

    #[error("{action}: missing parameter '{parameter}'")]
    MissingParameter {
        action: &'static str,
        parameter: &'static str,
    },

    #[error("{action}: cannot read '{value}' as a number")]
    InvalidNumber { action: &'static str, value: String },
}

/// Result of applying an action.
pub type ActionResult = std::result::Result<Value, ActionError>;

impl ActionSpec {
    /// Apply this action to `value`, with `context` as the source subtree.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] when the action cannot process the input.
    pub fn apply(&self, value: &Value, context: &Value) -> ActionResult {
        apply_action(self, value, context)
    }
}

/// Dispatch `action` on `value`
///
/// # Errors
///
/// Returns an [`ActionError`] when the selected action cannot process the input.
pub fn apply_action(action: &ActionSpec, value: &Value, context: &Value) -> ActionResult {
    match action {
        ActionSpec::Append {
            value: part,
            value_type,
            separator,
        } => affix(
            Affix::Append,
            value,
            part,
            *value_type,
            separator.as_deref(),
            context,
        ),
        ActionSpec::Prepend {
            value: part,
            value_type,
            separator,
        } => affix(
            Affix::Prepend,
            value,
            part,
            *value_type,
            separator.as_deref(),
            context,
        ),
        ActionSpec::SumFieldInDictList { fields, key } => {
            sum_field_in_dict_list(fields, key, context)
        }
        ActionSpec::Capitalise => Ok(capitalise(value)),
        ActionSpec::ValueIn { values, fields } => {
            Ok(value_in(value, values, fields.as_deref(), context))
        }
        ActionSpec::ExtractIndexData { index } => extract_index_data(value, *index),
        ActionSpec::ListToDict { key } => list_to_dict(value, key),
        ActionSpec::Flat {
            strategy,
            key,
            join,
        } => flat(value, *strategy, key.as_deref(), join.as_deref()),
        ActionSpec::TypeCast { to } => type_cast(value, *to),
        ActionSpec::Uppercase => map_text("uppercase", value, str::to_uppercase),
        ActionSpec::Lowercase => map_text("lowercase", value, str::to_lowercase),
        ActionSpec::Trim => map_text("trim", value, |s| s.trim().to_string()),
        ActionSpec::Default { value: fallback } => Ok(default_value(value, fallback)),
        ActionSpec::Chain { actions } => chain(value, actions, context),
        ActionSpec::Divide | ActionSpec::Multiply | ActionSpec::CustomEval => {
            Err(ActionError::NotImplemented(action.name()))
        }
    }
}

/// Comma-separated field list, blanks ignored.
fn field_paths(fields: &str) -> impl Iterator<Item = DottedPath> + '_ {
    fields
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(DottedPath::parse)
}

#[derive(Clone, Copy)]
enum Affix {
    Append,
    Prepend,
}

fn affix(
    side: Affix,
    value: &Value,
    part: &str,
    value_type: ValueType,
    separator: Option<&str>,
    context: &Value,
) -> ActionResult {
    let action = match side {
        Affix::Append => "append",
        Affix::Prepend => "prepend",
    };
    let base = match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => render(value),
        other => {
            return Err(ActionError::InvalidInput {
                action,
                expected: "string, number or bool",
                found: type_name(other),
            });
        }
    };
    let separator = separator.unwrap_or("");

    let addition = match value_type {
        ValueType::Const => part.to_string(),
        ValueType::Var => field_paths(part)
            .map(|path| {
                read(context, &path)
                    .map(render)
                    .map_err(|source| ActionError::UnresolvedField { action, source })
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(separator),
    };

    let combined = match side {
        Affix::Append => format!("{base}{separator}{addition}"),
        Affix::Prepend => format!("{addition}{separator}{base}"),
    };
    Ok(Value::String(combined))
}

/// Sum `key` over the records found at each comma-separated path of `fields`
///
/// Paths that do not resolve and records without `key` contribute nothing.
/// The total stays an integer while every addend is one.
///
/// # Errors
///
/// Returns an error when a path resolves to something other than a list, or
/// when a summed field is not numeric.
pub fn sum_field_in_dict_list(fields: &str, key: &str, context: &Value) -> ActionResult {
    const ACTION: &str = "sum_field_in_dict_list";

    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;

    for path in field_paths(fields) {
        let records = match read(context, &path) {
            Ok(Value::Array(records)) => records,
            Ok(Value::Null) => continue,
            Ok(other) => {
                return Err(ActionError::InvalidInput {
                    action: ACTION,
                    expected: "list of records",
                    found: type_name(other),
                });
            }
            Err(err) => {
                debug!(path = %path, error = %err, "skipping unresolved list in sum");
                continue;
            }
        };

        for raw in records.iter().filter_map(|record| record.get(key)) {
            if raw.is_null() {
                continue;
            }
            let addend = value_to_numeric(raw, ACTION)?;
            float_total += addend.as_f64();
            int_total = match (int_total, addend) {
                (Some(total), Numeric::Int(i)) => total.checked_add(i),
                _ => None,
            };
        }
    }

    Ok(int_total.map_or_else(|| float_value(float_total), Value::from))
}

/// Title-case a string; other values pass through unchanged
pub fn capitalise(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(title_case(s)),
        other => {
            warn!(
                found = type_name(other),
                "capitalise expects a string, passing value through"
            );
            other.clone()
        }
    }
}

fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Membership of `value` in the literal `values` plus the values resolved from `fields`
///
/// Resolved lists contribute their elements. A list `value` matches when any
/// of its elements does.
pub fn value_in(value: &Value, values: &[Value], fields: Option<&str>, context: &Value) -> Value {
    let mut members: Vec<&Value> = values.iter().collect();
    for path in fields.into_iter().flat_map(field_paths) {
        match read(context, &path) {
            Ok(Value::Array(items)) => members.extend(items),
            Ok(other) => members.push(other),
            Err(err) => debug!(path = %path, error = %err, "value_in field not found"),
        }
    }

    let is_member = |candidate: &Value| members.iter().any(|member| *member == candidate);
    let found = match value {
        Value::Array(items) => items.iter().any(is_member),
        other => is_member(other),
    };
    Value::Bool(found)
}

/// Element `index` of a list; negative indices count from the end
///
/// # Errors
///
/// Returns an error when the input is not a list or the index is out of range.
pub fn extract_index_data(value: &Value, index: i64) -> ActionResult {
    const ACTION: &str = "extract_index_data";

    let Value::Array(items) = value else {
        return Err(ActionError::InvalidInput {
            action: ACTION,
            expected: "list",
            found: type_name(value),
        });
    };

    let len = items.len();
    let position = if index < 0 {
        i64::try_from(len)
            .ok()
            .and_then(|len| usize::try_from(len + index).ok())
    } else {
        usize::try_from(index).ok()
    };

    position
        .and_then(|position| items.get(position))
        .cloned()
        .ok_or(ActionError::IndexOutOfRange {
            action: ACTION,
            index,
            len,
        })
}

/// Key a list of records by their `key` field; later records win
///
/// # Errors
///
/// Returns an error when the input is not a list.
pub fn list_to_dict(value: &Value, key: &str) -> ActionResult {
    let Value::Array(records) = value else {
        return Err(ActionError::InvalidInput {
            action: "list_to_dict",
            expected: "list of records",
            found: type_name(value),
        });
    };

    let mut keyed = Map::new();
    for record in records {
        match record.get(key) {
            Some(id) if !id.is_null() => {
                keyed.insert(render(id), record.clone());
            }
            _ => warn!(key, "record without key skipped in list_to_dict"),
        }
    }
    Ok(Value::Object(keyed))
}

/// Flatten a list with one of the [`FlatStrategy`] variants, then optionally join
///
/// # Errors
///
/// Returns an error when the input shape does not fit the strategy or a
/// required `key` is missing.
pub fn flat(
    value: &Value,
    strategy: FlatStrategy,
    key: Option<&str>,
    join: Option<&str>,
) -> ActionResult {
    const ACTION: &str = "flat";

    let Value::Array(items) = value else {
        return Err(ActionError::InvalidInput {
            action: ACTION,
            expected: "list",
            found: type_name(value),
        });
    };
    let required_key = || {
        key.ok_or(ActionError::MissingParameter {
            action: ACTION,
            parameter: "key",
        })
    };
    let as_record = |item: &Value| match item {
        Value::Object(record) => Ok(record.clone()),
        other => Err(ActionError::InvalidInput {
            action: ACTION,
            expected: "list of records",
            found: type_name(other),
        }),
    };

    let mut flattened = Vec::new();
    match strategy {
        FlatStrategy::NestedList => {
            for item in items {
                match item {
                    Value::Array(inner) => flattened.extend(inner.iter().cloned()),
                    other => {
                        return Err(ActionError::InvalidInput {
                            action: ACTION,
                            expected: "list of lists",
                            found: type_name(other),
                        });
                    }
                }
            }
        }
        FlatStrategy::ListDict => {
            let key = required_key()?;
            for item in items {
                if let Some(field) = as_record(item)?.remove(key) {
                    flattened.push(field);
                }
            }
        }
        FlatStrategy::ListDictList => {
            let key = required_key()?;
            for item in items {
                match as_record(item)?.remove(key) {
                    Some(Value::Array(inner)) => flattened.extend(inner),
                    None | Some(Value::Null) => {}
                    Some(other) => {
                        return Err(ActionError::InvalidInput {
                            action: ACTION,
                            expected: "list-valued field",
                            found: type_name(&other),
                        });
                    }
                }
            }
        }
    }

    Ok(match join {
        Some(delimiter) => Value::String(
            flattened
                .iter()
                .map(render)
                .collect::<Vec<_>>()
                .join(delimiter),
        ),
        None => Value::Array(flattened),
    })
}

/// Explicit conversion to one of the [`CastType`] targets
///
/// Integer casts parse strings as floats and truncate toward zero.
///
/// # Errors
///
/// Returns an error when the input cannot be represented as the target type.
pub fn type_cast(value: &Value, to: CastType) -> ActionResult {
    const ACTION: &str = "type_cast";

    let invalid = |expected: &'static str| ActionError::InvalidInput {
        action: ACTION,
        expected,
        found: type_name(value),
    };

    match to {
        CastType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(_) | Value::String(_) => match value_to_numeric(value, ACTION)? {
                Numeric::Int(i) => Ok(Value::from(i)),
                Numeric::Float(f) => truncate(f, value),
            },
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(invalid("number, string or bool")),
        },
        CastType::Float => match value {
            Value::Number(_) | Value::String(_) => {
                Ok(float_value(value_to_numeric(value, ACTION)?.as_f64()))
            }
            Value::Bool(b) => Ok(float_value(if *b { 1.0 } else { 0.0 })),
            _ => Err(invalid("number, string or bool")),
        },
        CastType::Str => match value {
            Value::Null => Err(invalid("non-null value")),
            other => Ok(Value::String(render(other))),
        },
        CastType::List => match value {
            Value::Array(_) => Ok(value.clone()),
            Value::Object(map) => Ok(Value::Array(
                map.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            )),
            Value::Null => Err(invalid("non-null value")),
            scalar => Ok(Value::Array(vec![scalar.clone()])),
        },
        CastType::Bool => Ok(Value::Bool(match value {
            Value::String(s) => {
                let token = s.trim().to_lowercase();
                TRUTHY_TOKENS.contains(&token.as_str())
            }
            other => tripmap_tree::is_truthy(other),
        })),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(number: f64, original: &Value) -> ActionResult {
    let truncated = number.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Ok(Value::from(truncated as i64))
    } else {
        Err(ActionError::InvalidNumber {
            action: "type_cast",
            value: render(original),
        })
    }
}

fn map_text(action: &'static str, value: &Value, op: impl Fn(&str) -> String) -> ActionResult {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(op(s))),
        Value::Number(_) | Value::Bool(_) => Ok(Value::String(op(&render(value)))),
        other => Err(ActionError::InvalidInput {
            action,
            expected: "string",
            found: type_name(other),
        }),
    }
}

/// `fallback` when the input is `null` or an empty string, else the input
pub fn default_value(value: &Value, fallback: &Value) -> Value {
    match value {
        Value::Null => fallback.clone(),
        Value::String(s) if s.is_empty() => fallback.clone(),
        other => other.clone(),
    }
}

/// Apply `actions` in order, stopping at the first failure
///
/// # Errors
///
/// Returns the first error raised by an action in the chain.
pub fn chain(value: &Value, actions: &[ActionSpec], context: &Value) -> ActionResult {
    let mut result = value.clone();
    for action in actions {
        result = apply_action(action, &result, context)?;
    }
    Ok(result)
}
