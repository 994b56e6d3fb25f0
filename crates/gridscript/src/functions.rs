use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::runtime::{values_compare, EvalError, Value};
use crate::typeexp::{TypeArena, TypeExp};

/// A built-in function: its name, a signature instantiated with fresh
/// variables per use site, and its runtime behavior.
pub struct FunctionDef {
    pub name: &'static str,
    make_type: fn(&mut TypeArena) -> TypeExp,
    eval: fn(&[Value]) -> Result<Value, EvalError>,
}

impl FunctionDef {
    /// The signature with fresh inference variables, so independent call
    /// sites never share constraints.
    pub fn instantiate(&self, arena: &mut TypeArena) -> TypeExp {
        (self.make_type)(arena)
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.eval)(args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .finish()
    }
}

/// Resolution of built-in function names, consumed during checking and
/// evaluation.
pub trait FunctionLookup {
    fn lookup(&self, name: &str) -> Option<Arc<FunctionDef>>;
}

/// The standard catalogue.
#[derive(Debug, Clone)]
pub struct BuiltinFunctions {
    by_name: HashMap<&'static str, Arc<FunctionDef>>,
}

impl BuiltinFunctions {
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        for def in catalogue() {
            by_name.insert(def.name, Arc::new(def));
        }
        Self { by_name }
    }
}

impl Default for BuiltinFunctions {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionLookup for BuiltinFunctions {
    fn lookup(&self, name: &str) -> Option<Arc<FunctionDef>> {
        self.by_name.get(name).cloned()
    }
}

fn catalogue() -> Vec<FunctionDef> {
    vec![
        FunctionDef {
            name: "abs",
            make_type: |arena| {
                let num = arena.fresh_num();
                TypeExp::Function(vec![num.clone()], Box::new(num))
            },
            eval: |args| {
                let value = single_number("abs", args)?;
                Ok(Value::Number(value.abs()))
            },
        },
        FunctionDef {
            name: "round",
            make_type: |arena| {
                let num = arena.fresh_num();
                TypeExp::Function(vec![num.clone()], Box::new(num))
            },
            eval: |args| {
                let value = single_number("round", args)?;
                Ok(Value::Number(value.round()))
            },
        },
        FunctionDef {
            name: "sum",
            make_type: |arena| {
                let num = arena.fresh_num();
                TypeExp::Function(
                    vec![TypeExp::Array(Box::new(num.clone()))],
                    Box::new(num),
                )
            },
            eval: |args| {
                let items = single_list("sum", args)?;
                let mut total = Decimal::ZERO;
                for item in items.iter() {
                    match item {
                        Value::Number(value) => total += *value,
                        other => return Err(bad_argument("sum", other)),
                    }
                }
                Ok(Value::Number(total))
            },
        },
        FunctionDef {
            name: "length",
            make_type: |arena| {
                let element = arena.fresh_type_var();
                TypeExp::Function(
                    vec![TypeExp::Array(Box::new(element))],
                    Box::new(TypeExp::plain_num()),
                )
            },
            eval: |args| {
                let items = single_list("length", args)?;
                Ok(Value::Number(Decimal::from(items.len())))
            },
        },
        FunctionDef {
            name: "minimum",
            make_type: |arena| {
                let element = arena.fresh_type_var();
                TypeExp::Function(
                    vec![TypeExp::Array(Box::new(element.clone()))],
                    Box::new(element),
                )
            },
            eval: |args| extremum("minimum", args, std::cmp::Ordering::Less),
        },
        FunctionDef {
            name: "maximum",
            make_type: |arena| {
                let element = arena.fresh_type_var();
                TypeExp::Function(
                    vec![TypeExp::Array(Box::new(element.clone()))],
                    Box::new(element),
                )
            },
            eval: |args| extremum("maximum", args, std::cmp::Ordering::Greater),
        },
    ]
}

fn extremum(
    name: &'static str,
    args: &[Value],
    keep: std::cmp::Ordering,
) -> Result<Value, EvalError> {
    let items = single_list(name, args)?;
    let mut iter = items.iter();
    let Some(first) = iter.next() else {
        return Err(EvalError::InvalidArgument {
            function: name.to_string(),
            message: "empty list".to_string(),
        });
    };
    let mut best = first.clone();
    for item in iter {
        if values_compare(item, &best)? == keep {
            best = item.clone();
        }
    }
    Ok(best)
}

fn single_number(name: &'static str, args: &[Value]) -> Result<Decimal, EvalError> {
    match args {
        [Value::Number(value)] => Ok(*value),
        [other] => Err(bad_argument(name, other)),
        _ => Err(EvalError::InvalidArgument {
            function: name.to_string(),
            message: format!("expected 1 argument, got {}", args.len()),
        }),
    }
}

fn single_list<'a>(name: &'static str, args: &'a [Value]) -> Result<&'a [Value], EvalError> {
    match args {
        [Value::List(items)] => Ok(items.as_slice()),
        [other] => Err(bad_argument(name, other)),
        _ => Err(EvalError::InvalidArgument {
            function: name.to_string(),
            message: format!("expected 1 argument, got {}", args.len()),
        }),
    }
}

fn bad_argument(name: &'static str, value: &Value) -> EvalError {
    EvalError::InvalidArgument {
        function: name.to_string(),
        message: format!("unexpected value {value}"),
    }
}
