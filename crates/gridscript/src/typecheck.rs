use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::columns::ColumnLookup;
use crate::expr::{Expr, ExprPath};
use crate::functions::FunctionLookup;
use crate::tags::TypeLookup;
use crate::typeexp::{TypeArena, TypeExp};
use crate::units::UnitManager;

mod infer;
#[cfg(test)]
mod tests;

/// Whether a node is being checked as a plain expression or in pattern
/// position. In pattern position an unbound identifier introduces a
/// binding instead of being looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Expression,
    Pattern,
}

/// The operator context a node is checked under. It only decides which
/// quick-fixes a unit mismatch offers; unification itself never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckLocation {
    Default,
    MultiplyDivide,
    Comparison,
}

/// Identifier-to-candidate-type bindings visible at one point of the
/// tree. Extending returns a new state and leaves the parent untouched,
/// which is what lets sibling match clauses diverge.
#[derive(Debug, Clone, Default)]
pub struct TypeState {
    bindings: im::HashMap<String, Vec<TypeExp>>,
    next_anonymous: u32,
}

impl TypeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Vec<TypeExp>> {
        self.bindings.get(name)
    }

    /// Bind `name` to exactly `ty`, shadowing any previous candidates.
    pub fn with(&self, name: &str, ty: TypeExp) -> TypeState {
        TypeState {
            bindings: self.bindings.update(name.to_string(), vec![ty]),
            next_anonymous: self.next_anonymous,
        }
    }

    /// Add a further candidate type for `name`; ambiguity is allowed until
    /// unification settles it.
    pub fn with_candidate(&self, name: &str, ty: TypeExp) -> TypeState {
        let mut candidates = self.bindings.get(name).cloned().unwrap_or_default();
        candidates.push(ty);
        TypeState {
            bindings: self.bindings.update(name.to_string(), candidates),
            next_anonymous: self.next_anonymous,
        }
    }

    /// Issue a fresh name for an anonymous lambda parameter. The `?` in
    /// source can never collide with these, nor can user identifiers.
    pub fn issue_anonymous(&self) -> (String, TypeState) {
        let name = format!("?arg{}", self.next_anonymous);
        let next = TypeState {
            bindings: self.bindings.clone(),
            next_anonymous: self.next_anonymous + 1,
        };
        (name, next)
    }
}

/// A successful check: the node's type and the (possibly extended) state.
#[derive(Debug, Clone)]
pub struct Checked {
    pub ty: TypeExp,
    pub state: TypeState,
}

/// A suggested, never automatic, replacement for the node at `target`.
#[derive(Clone)]
pub struct QuickFix {
    pub title: String,
    pub target: ExprPath,
    replacement: Arc<dyn Fn() -> Expr + Send + Sync>,
}

impl QuickFix {
    pub fn new(
        title: impl Into<String>,
        target: ExprPath,
        replacement: impl Fn() -> Expr + Send + Sync + 'static,
    ) -> Self {
        Self {
            title: title.into(),
            target,
            replacement: Arc::new(replacement),
        }
    }

    pub fn replacement(&self) -> Expr {
        (self.replacement)()
    }

    /// A copy of `root` with this fix applied, when the target path still
    /// addresses a node.
    pub fn apply(&self, root: &Expr) -> Option<Expr> {
        root.replace_at(&self.target, self.replacement())
    }
}

impl fmt::Debug for QuickFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickFix")
            .field("title", &self.title)
            .field("target", &self.target)
            .finish()
    }
}

/// One recorded type problem, keyed by the offending node's path.
#[derive(Debug)]
pub struct TypeProblem {
    pub path: ExprPath,
    pub message: String,
    pub quick_fixes: Vec<QuickFix>,
}

/// Accumulates problems and resolved per-node types across one check
/// pass. Recording never aborts the walk; only the failing node's
/// ancestors stop early.
#[derive(Debug, Default)]
pub struct ErrorRecorder {
    problems: Vec<TypeProblem>,
    types: HashMap<ExprPath, TypeExp>,
}

impl ErrorRecorder {
    pub fn record(&mut self, path: ExprPath, message: impl Into<String>, fixes: Vec<QuickFix>) {
        self.problems.push(TypeProblem {
            path,
            message: message.into(),
            quick_fixes: fixes,
        });
    }

    pub fn record_type(&mut self, path: ExprPath, ty: TypeExp) {
        self.types.insert(path, ty);
    }

    pub fn problems(&self) -> &[TypeProblem] {
        &self.problems
    }

    pub fn type_at(&self, path: &ExprPath) -> Option<&TypeExp> {
        self.types.get(path)
    }

    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstraintKind {
    Equatable,
    Orderable,
}

struct Constraint {
    path: ExprPath,
    ty: TypeExp,
    kind: ConstraintKind,
}

/// Everything one check pass needs: the variable arena, the recorder, and
/// the external collaborators. Build one per pass; arena cells do not
/// survive it.
pub struct CheckContext<'a> {
    pub arena: TypeArena,
    pub recorder: ErrorRecorder,
    columns: &'a dyn ColumnLookup,
    functions: &'a dyn FunctionLookup,
    units: &'a dyn UnitManager,
    types: &'a dyn TypeLookup,
    constraints: Vec<Constraint>,
    declared: Vec<Vec<String>>,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        columns: &'a dyn ColumnLookup,
        functions: &'a dyn FunctionLookup,
        units: &'a dyn UnitManager,
        types: &'a dyn TypeLookup,
    ) -> Self {
        Self {
            arena: TypeArena::new(),
            recorder: ErrorRecorder::default(),
            columns,
            functions,
            units,
            types,
            constraints: Vec::new(),
            declared: Vec::new(),
        }
    }

    /// Check a whole formula. `None` means at least the root failed; the
    /// tree must not be evaluated. Problems for this and sibling nodes are
    /// in the recorder either way.
    pub fn check_expression(&mut self, expr: &Expr, state: &TypeState) -> Option<Checked> {
        let checked = self.check(
            expr,
            state,
            CheckKind::Expression,
            CheckLocation::Default,
            &ExprPath::root(),
        );
        self.enforce_constraints();
        if self.recorder.is_clean() {
            checked
        } else {
            None
        }
    }

    /// Check a formula in pattern position: unbound identifiers become
    /// bindings in the returned state instead of errors.
    pub fn check_pattern(&mut self, expr: &Expr, state: &TypeState) -> Option<Checked> {
        self.declared.push(Vec::new());
        let checked = self.check(
            expr,
            state,
            CheckKind::Pattern,
            CheckLocation::Default,
            &ExprPath::root(),
        );
        self.declared.pop();
        self.enforce_constraints();
        if self.recorder.is_clean() {
            checked
        } else {
            None
        }
    }

    fn constrain(&mut self, path: &ExprPath, ty: TypeExp, kind: ConstraintKind) {
        self.constraints.push(Constraint {
            path: path.clone(),
            ty,
            kind,
        });
    }

    /// Deferred equality/ordering requirements, settled once the whole
    /// tree has been walked. Types still containing variables are left to
    /// evaluation-time comparison failure.
    fn enforce_constraints(&mut self) {
        let constraints = std::mem::take(&mut self.constraints);
        for constraint in constraints {
            let resolved = self.arena.resolve(&constraint.ty);
            let verdict = match constraint.kind {
                ConstraintKind::Equatable => type_is_equatable(&resolved),
                ConstraintKind::Orderable => type_is_orderable(&resolved),
            };
            if verdict == Some(false) {
                let requirement = match constraint.kind {
                    ConstraintKind::Equatable => "compared for equality",
                    ConstraintKind::Orderable => "ordered",
                };
                self.recorder.record(
                    constraint.path,
                    format!("values of type {resolved} cannot be {requirement}"),
                    Vec::new(),
                );
            }
        }
    }
}

/// `None` defers the decision: the type still contains variables.
fn type_is_equatable(ty: &TypeExp) -> Option<bool> {
    match ty {
        TypeExp::Var(_) => None,
        TypeExp::Function(_, _) => Some(false),
        TypeExp::Num(_) | TypeExp::Text | TypeExp::Bool | TypeExp::Date(_) => Some(true),
        TypeExp::Tuple(items) => all_of(items.iter(), type_is_equatable),
        TypeExp::Record(fields) => all_of(fields.values(), type_is_equatable),
        TypeExp::Tagged { variants, .. } => {
            all_of(variants.iter().filter_map(|v| v.payload.as_ref()), type_is_equatable)
        }
        TypeExp::Array(element) => type_is_equatable(element),
    }
}

fn type_is_orderable(ty: &TypeExp) -> Option<bool> {
    match ty {
        TypeExp::Var(_) => None,
        TypeExp::Num(_) | TypeExp::Text | TypeExp::Date(_) => Some(true),
        TypeExp::Bool | TypeExp::Function(_, _) | TypeExp::Record(_) | TypeExp::Tagged { .. } => {
            Some(false)
        }
        TypeExp::Tuple(items) => all_of(items.iter(), type_is_orderable),
        TypeExp::Array(element) => type_is_orderable(element),
    }
}

fn all_of<'t>(
    mut types: impl Iterator<Item = &'t TypeExp>,
    test: fn(&TypeExp) -> Option<bool>,
) -> Option<bool> {
    let mut verdict = Some(true);
    for ty in types.by_ref() {
        match test(ty) {
            Some(true) => {}
            Some(false) => return Some(false),
            None => verdict = None,
        }
    }
    verdict
}
