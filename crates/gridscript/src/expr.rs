use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::columns::ColumnReference;
use crate::typeexp::DateKind;
use crate::units::UnitSyntax;

/// A temporal literal. The payload shape matches the `DateKind` the checker
/// assigns, so equality and hashing stay structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemporalLiteral {
    Date(NaiveDate),
    YearMonth { year: i32, month: u32 },
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl TemporalLiteral {
    pub fn kind(&self) -> DateKind {
        match self {
            TemporalLiteral::Date(_) => DateKind::YearMonthDay,
            TemporalLiteral::YearMonth { .. } => DateKind::YearMonth,
            TemporalLiteral::Time(_) => DateKind::TimeOfDay,
            TemporalLiteral::DateTime(_) => DateKind::DateTime,
            TemporalLiteral::Zoned(_) => DateKind::DateTimeZoned,
        }
    }
}

impl fmt::Display for TemporalLiteral {
    /// The source form, e.g. `date{2024-01-15}`; the parser reads this
    /// back exactly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalLiteral::Date(date) => write!(f, "date{{{}}}", date.format("%Y-%m-%d")),
            TemporalLiteral::YearMonth { year, month } => {
                write!(f, "dateym{{{year:04}-{month:02}}}")
            }
            TemporalLiteral::Time(time) => write!(f, "time{{{}}}", time.format("%H:%M:%S")),
            TemporalLiteral::DateTime(datetime) => {
                write!(f, "datetime{{{}}}", datetime.format("%Y-%m-%d %H:%M:%S"))
            }
            TemporalLiteral::Zoned(zoned) => {
                write!(
                    f,
                    "datetimezoned{{{}}}",
                    zoned.format("%Y-%m-%d %H:%M:%S %:z")
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddSubOp {
    Add,
    Subtract,
}

impl AddSubOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            AddSubOp::Add => "+",
            AddSubOp::Subtract => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Less => "<",
            ComparisonOp::LessEq => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterEq => ">=",
        }
    }
}

/// One formula expression node. The enum is closed: every capability
/// (check, evaluate, save, explain, enumerate) is one function matching
/// exhaustively on it, so adding a kind is a compile-time sweep across all
/// of them.
///
/// Child ordering is canonical and shared by `children`, `children_mut`
/// and the checker's path assignment: fields in declaration order; for
/// match clauses, each pattern then its guard, then the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Number {
        value: Decimal,
        unit: Option<UnitSyntax>,
    },
    Text(String),
    Bool(bool),
    Temporal(TemporalLiteral),
    Column(ColumnReference),
    Ident(String),
    /// `?` — the implicit parameter of an implicit lambda argument.
    ImplicitArg,
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<Expr>,
        body: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    AddSubtract {
        items: Vec<Expr>,
        ops: Vec<AddSubOp>,
    },
    Times(Vec<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Raise {
        base: Box<Expr>,
        exponent: Box<Expr>,
    },
    Comparison {
        items: Vec<Expr>,
        ops: Vec<ComparisonOp>,
    },
    Equal(Vec<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
    /// `center ± epsilon` — only meaningful in pattern position.
    Tolerance {
        value: Box<Expr>,
        epsilon: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Record(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    Tag {
        type_name: String,
        tag_name: String,
        argument: Option<Box<Expr>>,
    },
    Define {
        definitions: Vec<Definition>,
        body: Box<Expr>,
    },
    Match(MatchExpr),
    /// `@anything` — matches without binding; only meaningful in patterns.
    MatchAnything,
    /// Operands and operators that could not be grouped (mixed families at
    /// one bracket level). Kept verbatim so malformed input round-trips.
    InvalidOps(Vec<InvalidItem>),
    /// Unparseable source kept as raw text.
    Unfinished(String),
}

/// One `pattern = value` equation inside a `@define` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Definition {
    pub pattern: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchExpr {
    pub subject: Box<Expr>,
    pub clauses: Vec<Clause>,
}

/// One or more patterns sharing an outcome. Clauses are built as plain
/// data first; the parent match is constructed from the finished list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Clause {
    pub patterns: Vec<PatternEntry>,
    pub outcome: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternEntry {
    pub pattern: Expr,
    pub guard: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidItem {
    Operand(Expr),
    Op(String),
}

/// Path from the root to a node: child indices in the canonical ordering.
/// Errors and quick-fixes are keyed by path, so recorders stay valid for
/// exactly one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ExprPath(Vec<u32>);

impl ExprPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, index: u32) -> ExprPath {
        let mut indices = self.0.clone();
        indices.push(index);
        ExprPath(indices)
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Display for ExprPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "root");
        }
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Expr {
    /// Direct children in canonical order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Number { .. }
            | Expr::Text(_)
            | Expr::Bool(_)
            | Expr::Temporal(_)
            | Expr::Column(_)
            | Expr::Ident(_)
            | Expr::ImplicitArg
            | Expr::MatchAnything
            | Expr::Unfinished(_) => Vec::new(),
            Expr::Call { function, args } => {
                let mut out = vec![function.as_ref()];
                out.extend(args.iter());
                out
            }
            Expr::Lambda { params, body } => {
                let mut out: Vec<&Expr> = params.iter().collect();
                out.push(body.as_ref());
                out
            }
            Expr::And(items) | Expr::Or(items) | Expr::Times(items) | Expr::Equal(items) => {
                items.iter().collect()
            }
            Expr::AddSubtract { items, .. } | Expr::Comparison { items, .. } => {
                items.iter().collect()
            }
            Expr::Divide(left, right) | Expr::NotEqual(left, right) => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::Raise { base, exponent } => vec![base.as_ref(), exponent.as_ref()],
            Expr::Tolerance { value, epsilon } => vec![value.as_ref(), epsilon.as_ref()],
            Expr::Tuple(items) | Expr::Array(items) => items.iter().collect(),
            Expr::Record(fields) => fields.iter().map(|(_, value)| value).collect(),
            Expr::FieldAccess { base, .. } => vec![base.as_ref()],
            Expr::Tag { argument, .. } => argument.iter().map(|a| a.as_ref()).collect(),
            Expr::Define { definitions, body } => {
                let mut out = Vec::new();
                for definition in definitions {
                    out.push(&definition.pattern);
                    out.push(&definition.value);
                }
                out.push(body.as_ref());
                out
            }
            Expr::Match(match_expr) => {
                let mut out = vec![match_expr.subject.as_ref()];
                for clause in &match_expr.clauses {
                    for entry in &clause.patterns {
                        out.push(&entry.pattern);
                        if let Some(guard) = &entry.guard {
                            out.push(guard);
                        }
                    }
                    out.push(&clause.outcome);
                }
                out
            }
            Expr::InvalidOps(items) => items
                .iter()
                .filter_map(|item| match item {
                    InvalidItem::Operand(expr) => Some(expr),
                    InvalidItem::Op(_) => None,
                })
                .collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Number { .. }
            | Expr::Text(_)
            | Expr::Bool(_)
            | Expr::Temporal(_)
            | Expr::Column(_)
            | Expr::Ident(_)
            | Expr::ImplicitArg
            | Expr::MatchAnything
            | Expr::Unfinished(_) => Vec::new(),
            Expr::Call { function, args } => {
                let mut out = vec![function.as_mut()];
                out.extend(args.iter_mut());
                out
            }
            Expr::Lambda { params, body } => {
                let mut out: Vec<&mut Expr> = params.iter_mut().collect();
                out.push(body.as_mut());
                out
            }
            Expr::And(items) | Expr::Or(items) | Expr::Times(items) | Expr::Equal(items) => {
                items.iter_mut().collect()
            }
            Expr::AddSubtract { items, .. } | Expr::Comparison { items, .. } => {
                items.iter_mut().collect()
            }
            Expr::Divide(left, right) | Expr::NotEqual(left, right) => {
                vec![left.as_mut(), right.as_mut()]
            }
            Expr::Raise { base, exponent } => vec![base.as_mut(), exponent.as_mut()],
            Expr::Tolerance { value, epsilon } => vec![value.as_mut(), epsilon.as_mut()],
            Expr::Tuple(items) | Expr::Array(items) => items.iter_mut().collect(),
            Expr::Record(fields) => fields.iter_mut().map(|(_, value)| value).collect(),
            Expr::FieldAccess { base, .. } => vec![base.as_mut()],
            Expr::Tag { argument, .. } => argument.iter_mut().map(|a| a.as_mut()).collect(),
            Expr::Define { definitions, body } => {
                let mut out = Vec::new();
                for definition in definitions {
                    out.push(&mut definition.pattern);
                    out.push(&mut definition.value);
                }
                out.push(body.as_mut());
                out
            }
            Expr::Match(match_expr) => {
                let mut out = vec![match_expr.subject.as_mut()];
                for clause in &mut match_expr.clauses {
                    for entry in &mut clause.patterns {
                        out.push(&mut entry.pattern);
                        if let Some(guard) = &mut entry.guard {
                            out.push(guard);
                        }
                    }
                    out.push(&mut clause.outcome);
                }
                out
            }
            Expr::InvalidOps(items) => items
                .iter_mut()
                .filter_map(|item| match item {
                    InvalidItem::Operand(expr) => Some(expr),
                    InvalidItem::Op(_) => None,
                })
                .collect(),
        }
    }

    /// The node at `path`, if the path is valid for this tree.
    pub fn descend(&self, path: &ExprPath) -> Option<&Expr> {
        let mut current = self;
        for &index in path.indices() {
            current = current.children().into_iter().nth(index as usize)?;
        }
        Some(current)
    }

    /// A copy of this tree with the node at `path` replaced. `None` when
    /// the path does not address a node.
    pub fn replace_at(&self, path: &ExprPath, replacement: Expr) -> Option<Expr> {
        let mut root = self.clone();
        {
            let mut current = &mut root;
            for &index in path.indices() {
                current = Expr::children_mut(current).into_iter().nth(index as usize)?;
            }
            *current = replacement;
        }
        Some(root)
    }

    /// Every column reference in the tree, in canonical order.
    pub fn column_references(&self) -> Vec<&ColumnReference> {
        let mut out = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Column(reference) = expr {
                out.push(reference);
            }
        });
        out
    }

    /// Every identifier use in the tree, in canonical order.
    pub fn idents(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.walk(&mut |expr| {
            if let Expr::Ident(name) = expr {
                out.push(name.as_str());
            }
        });
        out
    }

    fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn structural_equality_ignores_allocation() {
        let a = Expr::AddSubtract {
            items: vec![ident("x"), ident("y")],
            ops: vec![AddSubOp::Add],
        };
        let b = Expr::AddSubtract {
            items: vec![ident("x"), ident("y")],
            ops: vec![AddSubOp::Add],
        };
        assert_eq!(a, b);
        let c = Expr::AddSubtract {
            items: vec![ident("x"), ident("y")],
            ops: vec![AddSubOp::Subtract],
        };
        assert_ne!(a, c);
    }

    #[test]
    fn replace_at_rebuilds_one_node() {
        let tree = Expr::Times(vec![ident("a"), ident("b")]);
        let path = ExprPath::root().child(1);
        let replaced = tree.replace_at(&path, ident("c")).unwrap();
        assert_eq!(replaced, Expr::Times(vec![ident("a"), ident("c")]));
        // Original untouched.
        assert_eq!(tree, Expr::Times(vec![ident("a"), ident("b")]));
    }

    #[test]
    fn descend_and_children_agree() {
        let tree = Expr::Call {
            function: Box::new(ident("f")),
            args: vec![ident("a"), ident("b")],
        };
        assert_eq!(tree.descend(&ExprPath::root().child(0)), Some(&ident("f")));
        assert_eq!(tree.descend(&ExprPath::root().child(2)), Some(&ident("b")));
        assert_eq!(tree.descend(&ExprPath::root().child(3)), None);
    }

    #[test]
    fn ident_enumeration_walks_match_clauses() {
        let tree = Expr::Match(MatchExpr {
            subject: Box::new(ident("subject")),
            clauses: vec![Clause {
                patterns: vec![PatternEntry {
                    pattern: ident("p"),
                    guard: Some(ident("g")),
                }],
                outcome: ident("o"),
            }],
        });
        assert_eq!(tree.idents(), vec!["subject", "p", "g", "o"]);
    }
}
