use crate::expr::{Expr, MatchExpr};
use crate::explain::ExecutionKind;
use crate::save::SaveMode;

use super::eval::as_number;
use super::values::{values_equal, Value};
use super::{EvalContext, EvalError, EvaluateState, ValueResult};

/// The outcome of trying one pattern against one value: whether it
/// matched, and the state extended with whatever the pattern bound.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    pub state: EvaluateState,
}

impl MatchResult {
    fn no(state: &EvaluateState) -> Self {
        Self {
            matched: false,
            state: state.clone(),
        }
    }

    fn yes(state: EvaluateState) -> Self {
        Self {
            matched: true,
            state,
        }
    }
}

impl<'a> EvalContext<'a> {
    /// Pattern semantics, distinct from plain evaluation: a bare unbound
    /// identifier always matches and binds; `@anything` matches without
    /// binding; tolerance matches by absolute difference; structural
    /// nodes recurse; anything else evaluates and compares for equality.
    pub fn match_pattern(
        &self,
        pattern: &Expr,
        value: &Value,
        state: &EvaluateState,
    ) -> Result<MatchResult, EvalError> {
        match pattern {
            Expr::MatchAnything => Ok(MatchResult::yes(state.clone())),
            Expr::Ident(name) => match state.lookup(name) {
                Some(bound) => {
                    let equal = values_equal(bound, value)?;
                    Ok(MatchResult {
                        matched: equal,
                        state: state.clone(),
                    })
                }
                None => Ok(MatchResult::yes(state.with_binding(name, value.clone()))),
            },
            Expr::Tolerance {
                value: center,
                epsilon,
            } => {
                let center = as_number(&self.evaluate(center, state)?.value)?;
                let epsilon = as_number(&self.evaluate(epsilon, state)?.value)?;
                let candidate = as_number(value)?;
                let difference = (candidate - center).abs();
                Ok(MatchResult {
                    matched: difference <= epsilon,
                    state: state.clone(),
                })
            }
            Expr::Tuple(patterns) => {
                let Value::Tuple(values) = value else {
                    return Ok(MatchResult::no(state));
                };
                self.match_all(patterns, values, state)
            }
            Expr::Array(patterns) => {
                let Value::List(values) = value else {
                    return Ok(MatchResult::no(state));
                };
                self.match_all(patterns, values, state)
            }
            Expr::Record(patterns) => {
                let Value::Record(values) = value else {
                    return Ok(MatchResult::no(state));
                };
                let mut current = state.clone();
                for (name, pattern) in patterns {
                    let Some(field) = values.get(name) else {
                        return Ok(MatchResult::no(state));
                    };
                    let result = self.match_pattern(pattern, field, &current)?;
                    if !result.matched {
                        return Ok(MatchResult::no(state));
                    }
                    current = result.state;
                }
                Ok(MatchResult::yes(current))
            }
            Expr::Tag {
                type_name,
                tag_name,
                argument,
            } => {
                let Value::Tagged {
                    type_name: value_type,
                    tag,
                    argument: value_argument,
                } = value
                else {
                    return Ok(MatchResult::no(state));
                };
                if type_name != value_type || tag_name != tag {
                    return Ok(MatchResult::no(state));
                }
                match (argument, value_argument) {
                    (Some(pattern), Some(inner)) => self.match_pattern(pattern, inner, state),
                    (None, None) => Ok(MatchResult::yes(state.clone())),
                    _ => Ok(MatchResult::no(state)),
                }
            }
            // Everything else is an expression: evaluate it and compare.
            _ => {
                let result = self.evaluate(pattern, state)?;
                let equal = values_equal(&result.value, value)?;
                Ok(MatchResult {
                    matched: equal,
                    state: state.clone(),
                })
            }
        }
    }

    fn match_all(
        &self,
        patterns: &[Expr],
        values: &[Value],
        state: &EvaluateState,
    ) -> Result<MatchResult, EvalError> {
        if patterns.len() != values.len() {
            return Ok(MatchResult::no(state));
        }
        let mut current = state.clone();
        for (pattern, value) in patterns.iter().zip(values.iter()) {
            let result = self.match_pattern(pattern, value, &current)?;
            if !result.matched {
                return Ok(MatchResult::no(state));
            }
            current = result.state;
        }
        Ok(MatchResult::yes(current))
    }

    /// Evaluate the subject once, then try clauses in declaration order;
    /// within a clause, patterns in order. The first pattern that matches
    /// and whose guard passes selects the outcome, evaluated with the
    /// pattern's bindings. Bindings never escape the clause.
    pub(super) fn eval_match(
        &self,
        expr: &Expr,
        match_expr: &MatchExpr,
        state: &EvaluateState,
    ) -> Result<ValueResult, EvalError> {
        let subject = self.evaluate(&match_expr.subject, state)?;
        for clause in &match_expr.clauses {
            for entry in &clause.patterns {
                let matched = self.match_pattern(&entry.pattern, &subject.value, state)?;
                if !matched.matched {
                    continue;
                }
                if let Some(guard) = &entry.guard {
                    let guard_result = self.evaluate(guard, &matched.state)?;
                    match guard_result.value {
                        Value::Bool(true) => {}
                        Value::Bool(false) => continue,
                        other => {
                            return Err(EvalError::InvalidCast {
                                expected: "a boolean guard",
                                found: other.kind_name().to_string(),
                            })
                        }
                    }
                }
                let outcome = self.evaluate(&clause.outcome, &matched.state)?;
                return Ok(self.finish(
                    expr,
                    state,
                    outcome.value,
                    ExecutionKind::MatchTest,
                    vec![subject.trace, outcome.trace],
                    Vec::new(),
                ));
            }
        }
        Err(EvalError::NoMatchingClause {
            subject: match_expr.subject.save(SaveMode::Storage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn match_result_constructors() {
        let state = EvaluateState::new();
        assert!(!MatchResult::no(&state).matched);
        let extended = state.with_binding("x", Value::Number(Decimal::ONE));
        assert!(MatchResult::yes(extended.clone()).matched);
        assert!(extended.lookup("x").is_some());
    }
}
