use std::fmt;
use std::sync::Arc;

use crate::expr::ExprPath;
use crate::runtime::{EvalError, Value};
use crate::typecheck::QuickFix;
use crate::typeexp::TypeExp;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnId(pub String);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a reference means the cell on the current row or the whole
/// column as a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRefKind {
    SameRow,
    WholeColumn,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnReference {
    pub table: Option<TableId>,
    pub column: ColumnId,
    pub kind: ColumnRefKind,
}

impl fmt::Display for ColumnReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}\\{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Access to a column's values. Row access may block while the column is
/// still being produced; that is the caller's concern, not the engine's.
pub trait ColumnValues {
    fn len(&self) -> usize;
    fn value_at(&self, row: usize) -> Result<Value, EvalError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved column: its owner, its concrete type (no inference
/// variables, so it is safe to hold across check passes), and its values.
#[derive(Clone)]
pub struct FoundColumn {
    pub owner: TableId,
    pub column_type: TypeExp,
    pub values: Arc<dyn ColumnValues + Send + Sync>,
    pub advisory: Option<String>,
}

/// The surrounding table store, consumed by checking and evaluation.
pub trait ColumnLookup {
    fn get_column(&self, reference: &ColumnReference) -> Option<FoundColumn>;

    fn available_column_references(&self) -> Vec<ColumnReference>;

    /// References a click on `(table, column)` in the editor could mean.
    /// Interface only; the engine never calls it itself.
    fn possible_column_references(&self, table: &TableId, column: &ColumnId)
        -> Vec<ColumnReference>;

    /// A quick-fix turning an unresolved identifier into a column
    /// reference, when a column of that name exists.
    fn fix_for_ident(&self, name: &str, target: &ExprPath) -> Option<QuickFix>;
}
