use crate::expr::{Expr, InvalidItem};

/// Where serialized text is headed. `Storage` spells out every keyword so
/// the text stands alone; `Editor` omits keywords the structured editor
/// re-creates from its own structure (currently `@call`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Storage,
    Editor,
}

impl Expr {
    /// Serialize to the keyword grammar. `parse_expression` inverts the
    /// `Storage` form structurally.
    pub fn save(&self, mode: SaveMode) -> String {
        let mut out = String::new();
        self.save_into(mode, &mut out);
        out
    }

    fn save_into(&self, mode: SaveMode, out: &mut String) {
        match self {
            Expr::Number { value, unit } => {
                out.push_str(&value.to_string());
                if let Some(unit) = unit {
                    out.push('{');
                    out.push_str(&unit.to_string());
                    out.push('}');
                }
            }
            Expr::Text(text) => push_quoted(text, out),
            Expr::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
            Expr::Temporal(literal) => out.push_str(&literal.to_string()),
            Expr::Column(reference) => {
                out.push_str(match reference.kind {
                    crate::columns::ColumnRefKind::SameRow => "@column ",
                    crate::columns::ColumnRefKind::WholeColumn => "@wholecolumn ",
                });
                out.push_str(&reference.to_string());
            }
            Expr::Ident(name) => out.push_str(name),
            Expr::ImplicitArg => out.push('?'),
            Expr::Call { function, args } => {
                if mode == SaveMode::Storage {
                    out.push_str("@call ");
                }
                function.save_into(mode, out);
                out.push('(');
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    arg.save_into(mode, out);
                }
                out.push(')');
            }
            Expr::Lambda { params, body } => {
                out.push_str("@function ");
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    param.save_into(mode, out);
                }
                out.push_str(" @then ");
                body.save_into(mode, out);
                out.push_str(" @endfunction");
            }
            Expr::And(items) => push_group(items, &vec!["&"; items.len() - 1], mode, out),
            Expr::Or(items) => push_group(items, &vec!["|"; items.len() - 1], mode, out),
            Expr::AddSubtract { items, ops } => {
                let symbols: Vec<&str> = ops.iter().map(|op| op.symbol()).collect();
                push_group(items, &symbols, mode, out);
            }
            Expr::Times(items) => push_group(items, &vec!["*"; items.len() - 1], mode, out),
            Expr::Divide(left, right) => {
                out.push('(');
                left.save_into(mode, out);
                out.push_str(" / ");
                right.save_into(mode, out);
                out.push(')');
            }
            Expr::Raise { base, exponent } => {
                out.push('(');
                base.save_into(mode, out);
                out.push_str(" ^ ");
                exponent.save_into(mode, out);
                out.push(')');
            }
            Expr::Comparison { items, ops } => {
                let symbols: Vec<&str> = ops.iter().map(|op| op.symbol()).collect();
                push_group(items, &symbols, mode, out);
            }
            Expr::Equal(items) => push_group(items, &vec!["="; items.len() - 1], mode, out),
            Expr::NotEqual(left, right) => {
                out.push('(');
                left.save_into(mode, out);
                out.push_str(" <> ");
                right.save_into(mode, out);
                out.push(')');
            }
            Expr::Tolerance { value, epsilon } => {
                out.push('(');
                value.save_into(mode, out);
                out.push_str(" ± ");
                epsilon.save_into(mode, out);
                out.push(')');
            }
            Expr::Tuple(items) => {
                out.push('(');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.save_into(mode, out);
                }
                out.push(')');
            }
            Expr::Record(fields) => {
                out.push('(');
                for (index, (name, value)) in fields.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    value.save_into(mode, out);
                }
                out.push(')');
            }
            Expr::Array(items) => {
                out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    item.save_into(mode, out);
                }
                out.push(']');
            }
            Expr::FieldAccess { base, field } => {
                base.save_into(mode, out);
                out.push('#');
                out.push_str(field);
            }
            Expr::Tag {
                type_name,
                tag_name,
                argument,
            } => {
                out.push_str("@tag ");
                out.push_str(type_name);
                out.push('\\');
                out.push_str(tag_name);
                if let Some(argument) = argument {
                    out.push('(');
                    argument.save_into(mode, out);
                    out.push(')');
                }
            }
            Expr::Define { definitions, body } => {
                out.push_str("@define ");
                for (index, definition) in definitions.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    definition.pattern.save_into(mode, out);
                    out.push_str(" = ");
                    definition.value.save_into(mode, out);
                }
                out.push_str(" @then ");
                body.save_into(mode, out);
                out.push_str(" @enddefine");
            }
            Expr::Match(match_expr) => {
                out.push_str("@match ");
                match_expr.subject.save_into(mode, out);
                for clause in &match_expr.clauses {
                    for (index, entry) in clause.patterns.iter().enumerate() {
                        out.push_str(if index == 0 { " @case " } else { " @orcase " });
                        entry.pattern.save_into(mode, out);
                        if let Some(guard) = &entry.guard {
                            out.push_str(" @given ");
                            guard.save_into(mode, out);
                        }
                    }
                    out.push_str(" @then ");
                    clause.outcome.save_into(mode, out);
                }
                out.push_str(" @endmatch");
            }
            Expr::MatchAnything => out.push_str("@anything"),
            Expr::InvalidOps(items) => {
                out.push_str("@invalidops(");
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    match item {
                        InvalidItem::Operand(expr) => expr.save_into(mode, out),
                        InvalidItem::Op(op) => push_quoted(op, out),
                    }
                }
                out.push(')');
            }
            Expr::Unfinished(text) => {
                out.push_str("@unfinished ");
                push_quoted(text, out);
            }
        }
    }
}

fn push_group(items: &[Expr], symbols: &[&str], mode: SaveMode, out: &mut String) {
    out.push('(');
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(' ');
            out.push_str(symbols.get(index - 1).copied().unwrap_or(""));
            out.push(' ');
        }
        item.save_into(mode, out);
    }
    out.push(')');
}

fn push_quoted(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
}

