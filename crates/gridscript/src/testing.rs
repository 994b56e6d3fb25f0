//! Shared fixtures for checker and runtime tests: an in-memory table,
//! unit registry, tagged-type registry, and the builtin function
//! catalogue, wired behind the collaborator traits.

use std::collections::HashMap;
use std::sync::Arc;

use crate::columns::{
    ColumnId, ColumnLookup, ColumnRefKind, ColumnReference, ColumnValues, FoundColumn, TableId,
};
use crate::expr::{Expr, ExprPath};
use crate::functions::BuiltinFunctions;
use crate::runtime::{EvalError, Value};
use crate::tags::{TaggedTypeDef, TypeRegistry};
use crate::typecheck::QuickFix;
use crate::typeexp::{TagVariant, TypeExp};
use crate::units::{Unit, UnitRegistry};

pub(crate) struct StoredColumn {
    values: Vec<Value>,
}

impl ColumnValues for StoredColumn {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, row: usize) -> Result<Value, EvalError> {
        self.values
            .get(row)
            .cloned()
            .ok_or(EvalError::RowOutOfRange {
                column: "<test>".to_string(),
                row,
            })
    }
}

pub(crate) struct TestWorld {
    table: TableId,
    columns: HashMap<String, (TypeExp, Arc<StoredColumn>)>,
    pub(crate) units: UnitRegistry,
    pub(crate) functions: BuiltinFunctions,
    pub(crate) types: TypeRegistry,
}

impl TestWorld {
    pub(crate) fn new() -> Self {
        let mut units = UnitRegistry::new();
        units.register_base("m");
        units.register_base("s");
        units.register_base("kg");
        units.register("metre", Unit::base("m"));

        let mut types = TypeRegistry::new();
        types.register(TaggedTypeDef {
            name: "Perhaps".to_string(),
            variants: vec![
                TagVariant {
                    name: "Missing".to_string(),
                    payload: None,
                },
                TagVariant {
                    name: "Is".to_string(),
                    payload: Some(TypeExp::plain_num()),
                },
            ],
        });

        Self {
            table: TableId("Data".to_string()),
            columns: HashMap::new(),
            units,
            functions: BuiltinFunctions::new(),
            types,
        }
    }

    pub(crate) fn add_column(&mut self, name: &str, column_type: TypeExp, values: Vec<Value>) {
        self.columns.insert(
            name.to_string(),
            (column_type, Arc::new(StoredColumn { values })),
        );
    }

    fn reference(&self, name: &str, kind: ColumnRefKind) -> ColumnReference {
        ColumnReference {
            table: Some(self.table.clone()),
            column: ColumnId(name.to_string()),
            kind,
        }
    }
}

impl ColumnLookup for TestWorld {
    fn get_column(&self, reference: &ColumnReference) -> Option<FoundColumn> {
        if let Some(table) = &reference.table {
            if *table != self.table {
                return None;
            }
        }
        let (column_type, values) = self.columns.get(&reference.column.0)?;
        Some(FoundColumn {
            owner: self.table.clone(),
            column_type: column_type.clone(),
            values: values.clone(),
            advisory: None,
        })
    }

    fn available_column_references(&self) -> Vec<ColumnReference> {
        let mut names: Vec<&String> = self.columns.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.reference(name, ColumnRefKind::SameRow))
            .collect()
    }

    fn possible_column_references(
        &self,
        table: &TableId,
        column: &ColumnId,
    ) -> Vec<ColumnReference> {
        if *table != self.table || !self.columns.contains_key(&column.0) {
            return Vec::new();
        }
        vec![
            self.reference(&column.0, ColumnRefKind::SameRow),
            self.reference(&column.0, ColumnRefKind::WholeColumn),
        ]
    }

    fn fix_for_ident(&self, name: &str, target: &ExprPath) -> Option<QuickFix> {
        if !self.columns.contains_key(name) {
            return None;
        }
        let reference = self.reference(name, ColumnRefKind::SameRow);
        Some(QuickFix::new(
            format!("use the column '{reference}'"),
            target.clone(),
            move || Expr::Column(reference.clone()),
        ))
    }
}
