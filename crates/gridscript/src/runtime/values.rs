use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::expr::{Expr, TemporalLiteral};
use crate::functions::FunctionDef;

use super::{EvalError, EvaluateState};

/// A runtime value. Units are a type-level notion; numbers are bare
/// decimals at runtime. Composite payloads share via `Arc` so persistent
/// states stay cheap to extend.
#[derive(Debug, Clone)]
pub enum Value {
    Number(Decimal),
    Text(String),
    Bool(bool),
    Temporal(TemporalLiteral),
    List(Arc<Vec<Value>>),
    Tuple(Vec<Value>),
    Record(Arc<BTreeMap<String, Value>>),
    Tagged {
        type_name: String,
        tag: String,
        argument: Option<Box<Value>>,
    },
    Function(Arc<FunctionValue>),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "a number",
            Value::Text(_) => "text",
            Value::Bool(_) => "a boolean",
            Value::Temporal(_) => "a temporal value",
            Value::List(_) => "a list",
            Value::Tuple(_) => "a tuple",
            Value::Record(_) => "a record",
            Value::Tagged { .. } => "a tagged value",
            Value::Function(_) => "a function",
        }
    }
}

#[derive(Debug)]
pub enum FunctionValue {
    Builtin(Arc<FunctionDef>),
    Closure {
        params: Vec<Expr>,
        body: Arc<Expr>,
        captured: EvaluateState,
    },
    /// A call with direct `?` arguments: applying it evaluates the call
    /// with the placeholders filled positionally.
    ImplicitCall {
        call: Arc<Expr>,
        captured: EvaluateState,
    },
    TagConstructor {
        type_name: String,
        tag: String,
    },
}

/// Structural equality. Functions are not equatable; comparing one is a
/// user-facing error, not a panic, because the need only becomes known at
/// match time.
pub fn values_equal(a: &Value, b: &Value) -> Result<bool, EvalError> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => Ok(a == b),
        (Value::Text(a), Value::Text(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Temporal(a), Value::Temporal(b)) => Ok(a == b),
        (Value::List(a), Value::List(b)) => sequences_equal(a.iter(), b.iter(), a.len(), b.len()),
        (Value::Tuple(a), Value::Tuple(b)) => sequences_equal(a.iter(), b.iter(), a.len(), b.len()),
        (Value::Record(a), Value::Record(b)) => {
            if a.len() != b.len() || a.keys().ne(b.keys()) {
                return Ok(false);
            }
            for (name, value) in a.iter() {
                if !values_equal(value, &b[name])? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (
            Value::Tagged {
                type_name: ta,
                tag: na,
                argument: aa,
            },
            Value::Tagged {
                type_name: tb,
                tag: nb,
                argument: ab,
            },
        ) => {
            if ta != tb || na != nb {
                return Ok(false);
            }
            match (aa, ab) {
                (Some(aa), Some(ab)) => values_equal(aa, ab),
                (None, None) => Ok(true),
                _ => Ok(false),
            }
        }
        (Value::Function(_), _) | (_, Value::Function(_)) => Err(EvalError::NotComparable),
        _ => Ok(false),
    }
}

fn sequences_equal<'v>(
    a: impl Iterator<Item = &'v Value>,
    b: impl Iterator<Item = &'v Value>,
    a_len: usize,
    b_len: usize,
) -> Result<bool, EvalError> {
    if a_len != b_len {
        return Ok(false);
    }
    for (a, b) in a.zip(b) {
        if !values_equal(a, b)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Ordering for comparison chains and minimum/maximum. Booleans, records,
/// tagged values and functions have no order.
pub fn values_compare(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => Ok(a.cmp(b)),
        (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
        (Value::Temporal(a), Value::Temporal(b)) => temporal_compare(a, b),
        (Value::List(a), Value::List(b)) => sequence_compare(a.iter(), b.iter()),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_compare(a.iter(), b.iter()),
        _ => Err(EvalError::InvalidCast {
            expected: "two values with an ordering",
            found: format!("{} and {}", a.kind_name(), b.kind_name()),
        }),
    }
}

fn temporal_compare(a: &TemporalLiteral, b: &TemporalLiteral) -> Result<Ordering, EvalError> {
    match (a, b) {
        (TemporalLiteral::Date(a), TemporalLiteral::Date(b)) => Ok(a.cmp(b)),
        (
            TemporalLiteral::YearMonth { year: ya, month: ma },
            TemporalLiteral::YearMonth { year: yb, month: mb },
        ) => Ok((ya, ma).cmp(&(yb, mb))),
        (TemporalLiteral::Time(a), TemporalLiteral::Time(b)) => Ok(a.cmp(b)),
        (TemporalLiteral::DateTime(a), TemporalLiteral::DateTime(b)) => Ok(a.cmp(b)),
        (TemporalLiteral::Zoned(a), TemporalLiteral::Zoned(b)) => Ok(a.cmp(b)),
        _ => Err(EvalError::InvalidCast {
            expected: "temporal values of the same kind",
            found: "mixed temporal kinds".to_string(),
        }),
    }
}

fn sequence_compare<'v>(
    a: impl Iterator<Item = &'v Value>,
    mut b: impl Iterator<Item = &'v Value>,
) -> Result<Ordering, EvalError> {
    for item_a in a {
        let Some(item_b) = b.next() else {
            return Ok(Ordering::Greater);
        };
        let ordering = values_compare(item_a, item_b)?;
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(if b.next().is_some() {
        Ordering::Less
    } else {
        Ordering::Equal
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Text(text) => write!(f, "{text:?}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Temporal(literal) => write!(f, "{literal}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
            Value::Record(fields) => {
                let rendered: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{name}: {value}"))
                    .collect();
                write!(f, "({})", rendered.join(", "))
            }
            Value::Tagged {
                type_name,
                tag,
                argument,
            } => match argument {
                Some(argument) => write!(f, "@tag {type_name}\\{tag}({argument})"),
                None => write!(f, "@tag {type_name}\\{tag}"),
            },
            Value::Function(_) => write!(f, "<function>"),
        }
    }
}
