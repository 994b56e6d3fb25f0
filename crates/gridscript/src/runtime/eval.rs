use std::collections::BTreeMap;
use std::sync::Arc;

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, MathematicalOps};

use crate::columns::ColumnRefKind;
use crate::expr::{AddSubOp, ComparisonOp, Expr};
use crate::explain::{ExecutionKind, SourceLocation, Trace};
use crate::save::SaveMode;

use super::values::{values_compare, values_equal, FunctionValue, Value};
use super::{EvalContext, EvalError, EvalFrame, EvaluateState, ValueResult};

impl<'a> EvalContext<'a> {
    /// Evaluate a checked expression. Pure in its inputs: the resulting
    /// state equals the input state (pattern and definition bindings never
    /// escape their scope). Panics on trees that failed checking — that
    /// is an engine-misuse bug, not a user error.
    pub fn evaluate(
        &self,
        expr: &Expr,
        state: &EvaluateState,
    ) -> Result<ValueResult, EvalError> {
        match expr {
            Expr::Number { value, .. } => {
                Ok(self.leaf(expr, state, Value::Number(*value)))
            }
            Expr::Text(text) => Ok(self.leaf(expr, state, Value::Text(text.clone()))),
            Expr::Bool(value) => Ok(self.leaf(expr, state, Value::Bool(*value))),
            Expr::Temporal(literal) => {
                Ok(self.leaf(expr, state, Value::Temporal(literal.clone())))
            }
            Expr::Column(reference) => {
                let found = self
                    .columns
                    .get_column(reference)
                    .ok_or_else(|| EvalError::UnknownColumn(reference.to_string()))?;
                match reference.kind {
                    ColumnRefKind::SameRow => {
                        let row = state
                            .current_row()
                            .ok_or_else(|| EvalError::NoCurrentRow(reference.to_string()))?;
                        if row >= found.values.len() {
                            return Err(EvalError::RowOutOfRange {
                                column: reference.to_string(),
                                row,
                            });
                        }
                        let value = found.values.value_at(row)?;
                        let used = vec![SourceLocation {
                            column: reference.clone(),
                            row: Some(row),
                        }];
                        Ok(self.finish(expr, state, value, ExecutionKind::Value, Vec::new(), used))
                    }
                    ColumnRefKind::WholeColumn => {
                        let mut items = Vec::with_capacity(found.values.len());
                        for row in 0..found.values.len() {
                            items.push(found.values.value_at(row)?);
                        }
                        let used = vec![SourceLocation {
                            column: reference.clone(),
                            row: None,
                        }];
                        Ok(self.finish(
                            expr,
                            state,
                            Value::List(Arc::new(items)),
                            ExecutionKind::Value,
                            Vec::new(),
                            used,
                        ))
                    }
                }
            }
            Expr::Ident(name) => {
                if let Some(value) = state.lookup(name) {
                    let mut result = self.leaf(expr, state, value.clone());
                    // When the caller supplied typing metadata, narrate the
                    // binding with its declared type.
                    if let (Some(trace), Some(ty)) = (&result.trace, state.display_type(name)) {
                        let mut annotated = trace.as_ref().clone();
                        annotated.expression = format!("{name}: {ty}");
                        result.trace = Some(Arc::new(annotated));
                    }
                    return Ok(result);
                }
                if let Some(def) = self.functions.lookup(name) {
                    let value = Value::Function(Arc::new(FunctionValue::Builtin(def)));
                    return Ok(self.leaf(expr, state, value));
                }
                panic!("identifier '{name}' was not resolved during checking");
            }
            Expr::ImplicitArg => {
                panic!("a bare '?' survived checking; it is only valid as a call argument")
            }
            Expr::Call { function, args } => self.eval_call(expr, function, args, state),
            Expr::Lambda { params, body } => {
                let value = Value::Function(Arc::new(FunctionValue::Closure {
                    params: params.clone(),
                    body: Arc::new(body.as_ref().clone()),
                    captured: state.clone(),
                }));
                Ok(self.leaf(expr, state, value))
            }
            Expr::And(items) => {
                let mut children = Vec::new();
                for item in items {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    if !as_bool(&result.value)? {
                        // Short-circuit: later operands stay unevaluated.
                        return Ok(self.finish(
                            expr,
                            state,
                            Value::Bool(false),
                            ExecutionKind::Value,
                            children,
                            Vec::new(),
                        ));
                    }
                }
                Ok(self.finish(expr, state, Value::Bool(true), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::Or(items) => {
                let mut children = Vec::new();
                for item in items {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    if as_bool(&result.value)? {
                        return Ok(self.finish(
                            expr,
                            state,
                            Value::Bool(true),
                            ExecutionKind::Value,
                            children,
                            Vec::new(),
                        ));
                    }
                }
                Ok(self.finish(expr, state, Value::Bool(false), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::AddSubtract { items, ops } => {
                let mut children = Vec::new();
                let first = self.evaluate(&items[0], state)?;
                children.push(first.trace.clone());
                let mut total = as_number(&first.value)?;
                for (item, op) in items[1..].iter().zip(ops.iter()) {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    let operand = as_number(&result.value)?;
                    total = match op {
                        AddSubOp::Add => total.checked_add(operand),
                        AddSubOp::Subtract => total.checked_sub(operand),
                    }
                    .ok_or(EvalError::Overflow)?;
                }
                Ok(self.finish(expr, state, Value::Number(total), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::Times(items) => {
                let mut children = Vec::new();
                let mut product = Decimal::ONE;
                for item in items {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    product = product
                        .checked_mul(as_number(&result.value)?)
                        .ok_or(EvalError::Overflow)?;
                }
                Ok(self.finish(expr, state, Value::Number(product), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::Divide(left, right) => {
                let left_result = self.evaluate(left, state)?;
                let right_result = self.evaluate(right, state)?;
                let numerator = as_number(&left_result.value)?;
                let denominator = as_number(&right_result.value)?;
                let quotient = numerator.checked_div(denominator).ok_or({
                    if denominator.is_zero() {
                        EvalError::DivisionByZero
                    } else {
                        EvalError::Overflow
                    }
                })?;
                Ok(self.finish(
                    expr,
                    state,
                    Value::Number(quotient),
                    ExecutionKind::Value,
                    vec![left_result.trace, right_result.trace],
                    Vec::new(),
                ))
            }
            Expr::Raise { base, exponent } => {
                let base_result = self.evaluate(base, state)?;
                let exponent_result = self.evaluate(exponent, state)?;
                let base_value = as_number(&base_result.value)?;
                let exponent_value = as_number(&exponent_result.value)?;
                let raised = raise(base_value, exponent_value)?;
                Ok(self.finish(
                    expr,
                    state,
                    Value::Number(raised),
                    ExecutionKind::Value,
                    vec![base_result.trace, exponent_result.trace],
                    Vec::new(),
                ))
            }
            Expr::Comparison { items, ops } => {
                let mut children = Vec::new();
                let first = self.evaluate(&items[0], state)?;
                children.push(first.trace.clone());
                let mut previous = first.value;
                let mut holds = true;
                for (item, op) in items[1..].iter().zip(ops.iter()) {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    let ordering = values_compare(&previous, &result.value)?;
                    let pair_holds = match op {
                        ComparisonOp::Less => ordering == std::cmp::Ordering::Less,
                        ComparisonOp::LessEq => ordering != std::cmp::Ordering::Greater,
                        ComparisonOp::Greater => ordering == std::cmp::Ordering::Greater,
                        ComparisonOp::GreaterEq => ordering != std::cmp::Ordering::Less,
                    };
                    if !pair_holds {
                        // The chain stops at the first failing pair.
                        holds = false;
                        break;
                    }
                    previous = result.value;
                }
                Ok(self.finish(expr, state, Value::Bool(holds), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::Equal(items) => {
                let mut children = Vec::new();
                let first = self.evaluate(&items[0], state)?;
                children.push(first.trace.clone());
                let mut previous = first.value;
                let mut holds = true;
                for item in &items[1..] {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    if !values_equal(&previous, &result.value)? {
                        holds = false;
                        break;
                    }
                    previous = result.value;
                }
                Ok(self.finish(expr, state, Value::Bool(holds), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::NotEqual(left, right) => {
                let left_result = self.evaluate(left, state)?;
                let right_result = self.evaluate(right, state)?;
                let equal = values_equal(&left_result.value, &right_result.value)?;
                Ok(self.finish(
                    expr,
                    state,
                    Value::Bool(!equal),
                    ExecutionKind::Value,
                    vec![left_result.trace, right_result.trace],
                    Vec::new(),
                ))
            }
            Expr::Tolerance { .. } => {
                panic!("a tolerance pattern survived checking outside pattern position")
            }
            Expr::Tuple(items) => {
                let mut children = Vec::new();
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    values.push(result.value);
                }
                Ok(self.finish(expr, state, Value::Tuple(values), ExecutionKind::Value, children, Vec::new()))
            }
            Expr::Record(fields) => {
                let mut children = Vec::new();
                let mut values = BTreeMap::new();
                for (name, value) in fields {
                    let result = self.evaluate(value, state)?;
                    children.push(result.trace.clone());
                    values.insert(name.clone(), result.value);
                }
                Ok(self.finish(
                    expr,
                    state,
                    Value::Record(Arc::new(values)),
                    ExecutionKind::Value,
                    children,
                    Vec::new(),
                ))
            }
            Expr::Array(items) => {
                let mut children = Vec::new();
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let result = self.evaluate(item, state)?;
                    children.push(result.trace.clone());
                    values.push(result.value);
                }
                Ok(self.finish(
                    expr,
                    state,
                    Value::List(Arc::new(values)),
                    ExecutionKind::Value,
                    children,
                    Vec::new(),
                ))
            }
            Expr::FieldAccess { base, field } => {
                let base_result = self.evaluate(base, state)?;
                let Value::Record(fields) = &base_result.value else {
                    return Err(EvalError::InvalidCast {
                        expected: "a record",
                        found: base_result.value.kind_name().to_string(),
                    });
                };
                let Some(value) = fields.get(field) else {
                    return Err(EvalError::InvalidCast {
                        expected: "a record with this field",
                        found: format!("a record without '{field}'"),
                    });
                };
                let value = value.clone();
                Ok(self.finish(
                    expr,
                    state,
                    value,
                    ExecutionKind::Value,
                    vec![base_result.trace],
                    Vec::new(),
                ))
            }
            Expr::Tag {
                type_name,
                tag_name,
                argument,
            } => {
                if let Some(argument) = argument {
                    let result = self.evaluate(argument, state)?;
                    let value = Value::Tagged {
                        type_name: type_name.clone(),
                        tag: tag_name.clone(),
                        argument: Some(Box::new(result.value)),
                    };
                    return Ok(self.finish(
                        expr,
                        state,
                        value,
                        ExecutionKind::Value,
                        vec![result.trace],
                        Vec::new(),
                    ));
                }
                let def = self
                    .types
                    .lookup_tag(type_name)
                    .ok_or_else(|| EvalError::UnknownTag(type_name.clone()))?;
                let takes_argument = def
                    .variant(tag_name)
                    .is_some_and(|variant| variant.payload.is_some());
                let value = if takes_argument {
                    Value::Function(Arc::new(FunctionValue::TagConstructor {
                        type_name: type_name.clone(),
                        tag: tag_name.clone(),
                    }))
                } else {
                    Value::Tagged {
                        type_name: type_name.clone(),
                        tag: tag_name.clone(),
                        argument: None,
                    }
                };
                Ok(self.leaf(expr, state, value))
            }
            Expr::Define { definitions, body } => {
                let run = self.eval_define(expr, definitions, body, state);
                run.map_err(|err| {
                    err.in_frame(EvalFrame {
                        expression: expr.save(SaveMode::Storage),
                        kind: ExecutionKind::Value,
                        sub_values: Vec::new(),
                    })
                })
            }
            Expr::Match(match_expr) => {
                self.eval_match(expr, match_expr, state).map_err(|err| {
                    err.in_frame(EvalFrame {
                        expression: expr.save(SaveMode::Storage),
                        kind: ExecutionKind::MatchTest,
                        sub_values: Vec::new(),
                    })
                })
            }
            Expr::MatchAnything => {
                panic!("'@anything' survived checking outside pattern position")
            }
            Expr::InvalidOps(_) | Expr::Unfinished(_) => {
                panic!("evaluating an expression that failed type-checking")
            }
        }
    }

    fn eval_call(
        &self,
        expr: &Expr,
        function: &Expr,
        args: &[Expr],
        state: &EvaluateState,
    ) -> Result<ValueResult, EvalError> {
        if args.iter().any(|arg| matches!(arg, Expr::ImplicitArg)) {
            // The call itself becomes a function; nothing evaluates yet.
            let value = Value::Function(Arc::new(FunctionValue::ImplicitCall {
                call: Arc::new(expr.clone()),
                captured: state.clone(),
            }));
            return Ok(self.leaf(expr, state, value));
        }
        let function_result = self.evaluate(function, state)?;
        let mut children = vec![function_result.trace.clone()];
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            let result = self.evaluate(arg, state)?;
            children.push(result.trace.clone());
            arg_values.push(result.value);
        }
        let Value::Function(function_value) = &function_result.value else {
            return Err(EvalError::InvalidCast {
                expected: "a function",
                found: function_result.value.kind_name().to_string(),
            });
        };
        let sub_values = arg_values.clone();
        let value = self
            .apply_function(function_value, arg_values)
            .map_err(|err| {
                err.in_frame(EvalFrame {
                    expression: expr.save(SaveMode::Storage),
                    kind: ExecutionKind::Value,
                    sub_values,
                })
            })?;
        Ok(self.finish(expr, state, value, ExecutionKind::Value, children, Vec::new()))
    }

    pub(super) fn apply_function(
        &self,
        function: &FunctionValue,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        match function {
            FunctionValue::Builtin(def) => def.call(&args),
            FunctionValue::Closure {
                params,
                body,
                captured,
            } => {
                assert_eq!(
                    params.len(),
                    args.len(),
                    "function arity was settled during checking"
                );
                let mut env = captured.clone();
                for (param, arg) in params.iter().zip(args.into_iter()) {
                    let matched = self.match_pattern(param, &arg, &env)?;
                    if !matched.matched {
                        return Err(EvalError::ArgumentMismatch {
                            pattern: param.save(SaveMode::Storage),
                        });
                    }
                    env = matched.state;
                }
                Ok(self.evaluate(body, &env)?.value)
            }
            FunctionValue::ImplicitCall { call, captured } => {
                let Expr::Call {
                    function: callee,
                    args: arg_exprs,
                } = call.as_ref()
                else {
                    panic!("implicit call value must wrap a call expression");
                };
                let callee_result = self.evaluate(callee, captured)?;
                let mut provided = args.into_iter();
                let mut arg_values = Vec::with_capacity(arg_exprs.len());
                for arg in arg_exprs {
                    if matches!(arg, Expr::ImplicitArg) {
                        let value = provided
                            .next()
                            .expect("implicit call arity was settled during checking");
                        arg_values.push(value);
                    } else {
                        arg_values.push(self.evaluate(arg, captured)?.value);
                    }
                }
                let Value::Function(inner) = &callee_result.value else {
                    return Err(EvalError::InvalidCast {
                        expected: "a function",
                        found: callee_result.value.kind_name().to_string(),
                    });
                };
                self.apply_function(inner, arg_values)
            }
            FunctionValue::TagConstructor { type_name, tag } => {
                let mut args = args;
                assert_eq!(args.len(), 1, "tag constructors take one argument");
                Ok(Value::Tagged {
                    type_name: type_name.clone(),
                    tag: tag.clone(),
                    argument: Some(Box::new(args.remove(0))),
                })
            }
        }
    }

    fn eval_define(
        &self,
        expr: &Expr,
        definitions: &[crate::expr::Definition],
        body: &Expr,
        state: &EvaluateState,
    ) -> Result<ValueResult, EvalError> {
        let mut env = state.clone();
        let mut children = Vec::new();
        for definition in definitions {
            let value = self.evaluate(&definition.value, &env)?;
            children.push(value.trace.clone());
            let matched = self.match_pattern(&definition.pattern, &value.value, &env)?;
            if !matched.matched {
                return Err(EvalError::DefinitionMatchFailed {
                    pattern: definition.pattern.save(SaveMode::Storage),
                });
            }
            env = matched.state;
        }
        let body_result = self.evaluate(body, &env)?;
        children.push(body_result.trace.clone());
        Ok(self.finish(
            expr,
            state,
            body_result.value,
            ExecutionKind::Value,
            children,
            Vec::new(),
        ))
    }

    fn leaf(&self, expr: &Expr, state: &EvaluateState, value: Value) -> ValueResult {
        self.finish(expr, state, value, ExecutionKind::Value, Vec::new(), Vec::new())
    }

    /// Assemble the result; the trace materializes only when the state
    /// asks for explanations.
    pub(super) fn finish(
        &self,
        expr: &Expr,
        state: &EvaluateState,
        value: Value,
        kind: ExecutionKind,
        children: Vec<Option<Arc<Trace>>>,
        used: Vec<SourceLocation>,
    ) -> ValueResult {
        let trace = state.is_recording().then(|| {
            Arc::new(Trace {
                expression: expr.save(SaveMode::Editor),
                value: value.clone(),
                kind,
                used,
                children: children.into_iter().flatten().collect(),
            })
        });
        ValueResult {
            value,
            state: state.clone(),
            trace,
        }
    }
}

fn as_bool(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(value) => Ok(*value),
        other => Err(EvalError::InvalidCast {
            expected: "a boolean",
            found: other.kind_name().to_string(),
        }),
    }
}

pub(super) fn as_number(value: &Value) -> Result<Decimal, EvalError> {
    match value {
        Value::Number(value) => Ok(*value),
        other => Err(EvalError::InvalidCast {
            expected: "a number",
            found: other.kind_name().to_string(),
        }),
    }
}

/// Integer exponents stay exact; fractional exponents go through floats
/// and back, which is the best a decimal representation can do.
fn raise(base: Decimal, exponent: Decimal) -> Result<Decimal, EvalError> {
    if exponent.fract().is_zero() {
        let power = exponent.to_i64().ok_or(EvalError::Overflow)?;
        return base.checked_powi(power).ok_or(EvalError::Overflow);
    }
    let base_f = base.to_f64().ok_or(EvalError::Overflow)?;
    let exponent_f = exponent.to_f64().ok_or(EvalError::Overflow)?;
    let raised = base_f.powf(exponent_f);
    if !raised.is_finite() {
        return Err(EvalError::Overflow);
    }
    Decimal::from_f64(raised).ok_or(EvalError::Overflow)
}
