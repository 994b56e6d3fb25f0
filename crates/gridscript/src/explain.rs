use std::fmt;
use std::sync::Arc;

use crate::columns::ColumnReference;
use crate::runtime::Value;

/// How a traced result came to be: plain value computation, a
/// pattern-match test, or applying an implicit (`?`) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    Value,
    MatchTest,
    ImplicitCall,
}

/// A source cell or column that directly contributed to a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub column: ColumnReference,
    pub row: Option<usize>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} (row {row})", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// Provenance recorded during one evaluation, mirroring the evaluated
/// subtree. Only built when the evaluate state asks for it; rebuilt per
/// evaluation, never cached.
#[derive(Debug, Clone)]
pub struct Trace {
    /// The evaluated node in its editor serialization.
    pub expression: String,
    pub value: Value,
    pub kind: ExecutionKind,
    pub used: Vec<SourceLocation>,
    pub children: Vec<Arc<Trace>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainOptions {
    /// Drop leaf entries that contribute nothing (plain literals).
    pub skip_trivial: bool,
    /// Drop entries whose value is a function; they have no useful
    /// rendering.
    pub skip_functions: bool,
}

/// A human-readable account of how a value was derived.
#[derive(Debug, Clone)]
pub struct Explanation {
    pub description: String,
    pub kind: ExecutionKind,
    pub used: Vec<SourceLocation>,
    pub children: Vec<Explanation>,
}

/// Derive an explanation from a completed trace. Pure: the same trace and
/// options always give the same explanation, and nothing is mutated.
pub fn explain(trace: &Trace, options: &ExplainOptions) -> Option<Explanation> {
    if options.skip_functions && matches!(trace.value, Value::Function(_)) {
        return None;
    }
    if options.skip_trivial
        && trace.kind == ExecutionKind::Value
        && trace.children.is_empty()
        && trace.used.is_empty()
    {
        return None;
    }
    let children = trace
        .children
        .iter()
        .filter_map(|child| explain(child, options))
        .collect();
    let mut description = format!("{} = {}", trace.expression, trace.value);
    match trace.kind {
        ExecutionKind::Value => {}
        ExecutionKind::MatchTest => description.push_str(" (by matching)"),
        ExecutionKind::ImplicitCall => description.push_str(" (an implicit function)"),
    }
    Some(Explanation {
        description,
        kind: trace.kind,
        used: trace.used.clone(),
        children,
    })
}

impl Explanation {
    /// Indented narration, deepest contributions last.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out.trim_end().to_string()
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.description);
        if !self.used.is_empty() {
            let locations: Vec<String> = self.used.iter().map(|u| u.to_string()).collect();
            out.push_str(&format!(", using {}", locations.join(", ")));
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn leaf(expression: &str, value: Value) -> Arc<Trace> {
        Arc::new(Trace {
            expression: expression.to_string(),
            value,
            kind: ExecutionKind::Value,
            used: Vec::new(),
            children: Vec::new(),
        })
    }

    #[test]
    fn explanation_mirrors_trace() {
        let trace = Trace {
            expression: "(1 + 2)".to_string(),
            value: Value::Number(Decimal::from(3)),
            kind: ExecutionKind::Value,
            used: Vec::new(),
            children: vec![
                leaf("1", Value::Number(Decimal::ONE)),
                leaf("2", Value::Number(Decimal::TWO)),
            ],
        };
        let explanation = explain(&trace, &ExplainOptions::default()).unwrap();
        assert_eq!(explanation.children.len(), 2);
        assert!(explanation.description.starts_with("(1 + 2) = 3"));
    }

    #[test]
    fn skip_trivial_drops_plain_literals() {
        let trace = Trace {
            expression: "(1 + 2)".to_string(),
            value: Value::Number(Decimal::from(3)),
            kind: ExecutionKind::Value,
            used: Vec::new(),
            children: vec![leaf("1", Value::Number(Decimal::ONE))],
        };
        let options = ExplainOptions {
            skip_trivial: true,
            skip_functions: false,
        };
        // The root has children so it stays; the literal child goes.
        let explanation = explain(&trace, &options).unwrap();
        assert!(explanation.children.is_empty());
    }
}
