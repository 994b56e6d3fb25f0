use std::sync::Arc;

use thiserror::Error;

use crate::columns::ColumnLookup;
use crate::explain::{ExecutionKind, Trace};
use crate::functions::FunctionLookup;
use crate::tags::TypeLookup;
use crate::typeexp::TypeExp;

mod eval;
mod pattern;
#[cfg(test)]
mod tests;
mod values;

pub use self::pattern::MatchResult;
pub use self::values::{values_compare, values_equal, FunctionValue, Value};

/// Identifier-to-value bindings visible at one point of the tree during
/// evaluation, plus the current row (for same-row column references),
/// whether provenance is recorded, and typing metadata for rendering
/// bound values. Extension returns a new state; the parent is untouched.
#[derive(Debug, Clone, Default)]
pub struct EvaluateState {
    bindings: im::HashMap<String, Value>,
    display_types: im::HashMap<String, TypeExp>,
    current_row: Option<usize>,
    record_explanations: bool,
}

impl EvaluateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn with_binding(&self, name: &str, value: Value) -> EvaluateState {
        EvaluateState {
            bindings: self.bindings.update(name.to_string(), value),
            ..self.clone()
        }
    }

    pub fn current_row(&self) -> Option<usize> {
        self.current_row
    }

    pub fn with_row(&self, row: usize) -> EvaluateState {
        EvaluateState {
            current_row: Some(row),
            ..self.clone()
        }
    }

    pub fn is_recording(&self) -> bool {
        self.record_explanations
    }

    /// Turn provenance recording on or off; off keeps evaluation free of
    /// explanation costs.
    pub fn with_recording(&self, record: bool) -> EvaluateState {
        EvaluateState {
            record_explanations: record,
            ..self.clone()
        }
    }

    pub fn display_type(&self, name: &str) -> Option<&TypeExp> {
        self.display_types.get(name)
    }

    pub fn with_display_type(&self, name: &str, ty: TypeExp) -> EvaluateState {
        EvaluateState {
            display_types: self.display_types.update(name.to_string(), ty),
            ..self.clone()
        }
    }
}

/// One stack-like frame wrapped around an escaping evaluation error: the
/// serialized enclosing expression, how it was executing, and the
/// sub-results it had so far. The chain of frames is the dynamic call
/// chain, with no separate tracing machinery.
#[derive(Debug, Clone)]
pub struct EvalFrame {
    pub expression: String,
    pub kind: ExecutionKind,
    pub sub_values: Vec<Value>,
}

/// A user-facing evaluation failure. Engine misuse (evaluating a tree
/// that failed checking) is a panic, not a variant here.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("no clause matched the value of: {subject}")]
    NoMatchingClause { subject: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("number out of range")]
    Overflow,
    #[error("expected {expected}, found {found}")]
    InvalidCast { expected: &'static str, found: String },
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("no current row for column '{0}'")]
    NoCurrentRow(String),
    #[error("row {row} is out of range for column '{column}'")]
    RowOutOfRange { column: String, row: usize },
    #[error("unknown tagged type '{0}'")]
    UnknownTag(String),
    #[error("function values cannot be compared")]
    NotComparable,
    #[error("definition pattern did not match: {pattern}")]
    DefinitionMatchFailed { pattern: String },
    #[error("argument did not match parameter pattern: {pattern}")]
    ArgumentMismatch { pattern: String },
    #[error("invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },
    #[error("{source}")]
    Framed {
        frame: Box<EvalFrame>,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn in_frame(self, frame: EvalFrame) -> EvalError {
        EvalError::Framed {
            frame: Box::new(frame),
            source: Box::new(self),
        }
    }

    /// Outermost-first frames of the dynamic chain.
    pub fn frames(&self) -> Vec<&EvalFrame> {
        let mut out = Vec::new();
        let mut current = self;
        while let EvalError::Framed { frame, source } = current {
            out.push(frame.as_ref());
            current = source;
        }
        out
    }

    pub fn root_cause(&self) -> &EvalError {
        let mut current = self;
        while let EvalError::Framed { source, .. } = current {
            current = source;
        }
        current
    }
}

/// The value an evaluation produced, the resulting state, and — when the
/// state records explanations — the provenance trace behind it.
#[derive(Debug, Clone)]
pub struct ValueResult {
    pub value: Value,
    pub state: EvaluateState,
    pub trace: Option<Arc<Trace>>,
}

/// The external collaborators evaluation resolves through.
pub struct EvalContext<'a> {
    pub columns: &'a dyn ColumnLookup,
    pub functions: &'a dyn FunctionLookup,
    pub types: &'a dyn TypeLookup,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        columns: &'a dyn ColumnLookup,
        functions: &'a dyn FunctionLookup,
        types: &'a dyn TypeLookup,
    ) -> Self {
        Self {
            columns,
            functions,
            types,
        }
    }
}
