use crate::actions::ActionError;
use serde_json::{Number, Value};
use tripmap_tree::type_name;

/// A number read from a payload, keeping integers exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

pub(crate) fn value_to_numeric(
    value: &Value,
    action: &'static str,
) -> Result<Numeric, ActionError> {
    match value {
        Value::Number(n) => Ok(number_to_numeric(n)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Numeric::Int(i))
            } else {
                trimmed
                    .parse::<f64>()
                    .map(Numeric::Float)
                    .map_err(|_| ActionError::InvalidNumber {
                        action,
                        value: s.clone(),
                    })
            }
        }
        other => Err(ActionError::InvalidInput {
            action,
            expected: "number or numeric string",
            found: type_name(other),
        }),
    }
}

fn number_to_numeric(n: &Number) -> Numeric {
    match n.as_i64() {
        Some(i) => Numeric::Int(i),
        None => Numeric::Float(n.as_f64().unwrap_or(f64::NAN)),
    }
}

/// JSON value for a float; non-finite results become `null`.
pub(crate) fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}
