//! A typed formula language for tabular data: formulas reference table
//! columns, mix arithmetic with physical units, and branch with a
//! `@match` construct. The crate covers type inference (unification over
//! arena-allocated type and unit variables), pattern-matching evaluation
//! with provenance traces, and the keyword surface grammar; table
//! storage, unit registries, and function catalogues are consumed
//! through traits.

pub mod columns;
pub mod diagnostics;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod save;
pub mod tags;
pub mod typecheck;
pub mod typeexp;
pub mod units;

mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use columns::{
    ColumnId, ColumnLookup, ColumnRefKind, ColumnReference, ColumnValues, FoundColumn, TableId,
};
pub use explain::{explain, ExecutionKind, Explanation, ExplainOptions, SourceLocation, Trace};
pub use expr::{Clause, Definition, Expr, ExprPath, MatchExpr, PatternEntry, TemporalLiteral};
pub use functions::{BuiltinFunctions, FunctionDef, FunctionLookup};
pub use parser::parse_expression;
pub use runtime::{
    values_compare, values_equal, EvalContext, EvalError, EvalFrame, EvaluateState, FunctionValue,
    MatchResult, Value, ValueResult,
};
pub use save::SaveMode;
pub use tags::{TaggedTypeDef, TypeLookup, TypeRegistry};
pub use typecheck::{
    CheckContext, CheckKind, CheckLocation, Checked, ErrorRecorder, QuickFix, TypeProblem,
    TypeState,
};
pub use typeexp::{
    unify_all, unify_types, unify_units, DateKind, TagVariant, TypeArena, TypeExp, TypeMismatch,
    TypeVarId, UnitMismatch,
};
pub use units::{
    Unit, UnitExp, UnitLookupError, UnitManager, UnitRegistry, UnitResolveFailure, UnitSyntax,
    UnitVarId,
};
