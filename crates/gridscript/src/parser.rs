use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::columns::{ColumnId, ColumnRefKind, ColumnReference, TableId};
use crate::diagnostics::{Diagnostic, Span};
use crate::expr::{
    AddSubOp, Clause, ComparisonOp, Definition, Expr, InvalidItem, MatchExpr, PatternEntry,
    TemporalLiteral,
};
use crate::lexer::{lex, Token, TokenKind};
use crate::units::UnitSyntax;

/// Parse one formula. Always returns a tree: malformed runs become
/// `InvalidOps` or `Unfinished` nodes with diagnostics alongside, so bad
/// input still round-trips through `save`.
pub fn parse_expression(source: &str) -> (Expr, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = lex(source);
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
    };
    let expr = parser.parse_until(&[]);
    if parser.pos < parser.tokens.len() {
        let token = parser.tokens[parser.pos].clone();
        parser.report(
            "GS010",
            format!("unexpected input starting at '{}'", token.text),
            token.span,
        );
    }
    diagnostics.append(&mut parser.diagnostics);
    (expr, diagnostics)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Keyword(&'static str),
    Comma,
    CloseRound,
    CloseSquare,
    /// The `=` of a `@define` equation.
    Equals,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn here(&self) -> Span {
        match self.peek() {
            Some(token) => token.span,
            None => self
                .tokens
                .last()
                .map(|t| t.span)
                .unwrap_or_else(|| Span::single(1, 1, 0)),
        }
    }

    fn report(&mut self, code: &str, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::new(code, message, span));
    }

    fn at_stop(&self, stops: &[Stop]) -> bool {
        let Some(token) = self.peek() else {
            return false;
        };
        stops.iter().any(|stop| match stop {
            Stop::Keyword(name) => token.kind == TokenKind::Keyword && token.text == *name,
            Stop::Comma => token.kind == TokenKind::Comma,
            Stop::CloseRound => token.kind == TokenKind::CloseRound,
            Stop::CloseSquare => token.kind == TokenKind::CloseSquare,
            Stop::Equals => token.kind == TokenKind::Operator && token.text == "=",
        })
    }

    fn eat_keyword(&mut self, name: &str) -> bool {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Keyword && token.text == name {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_keyword(&mut self, name: &str) -> bool {
        if self.eat_keyword(name) {
            return true;
        }
        let span = self.here();
        self.report("GS011", format!("expected '{name}'"), span);
        false
    }

    fn eat_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if let Some(token) = self.peek() {
            if token.kind == kind {
                return Some(self.bump());
            }
        }
        None
    }

    /// A run of operands separated by operators, grouped into one node.
    /// Operators have no precedence: mixed families become `InvalidOps`.
    fn parse_until(&mut self, stops: &[Stop]) -> Expr {
        let mut items = vec![self.parse_operand(stops)];
        let mut ops: Vec<String> = Vec::new();
        loop {
            if self.at_end() || self.at_stop(stops) {
                break;
            }
            match self.peek() {
                Some(token) if token.kind == TokenKind::Operator => {
                    let op = self.bump();
                    ops.push(op.text);
                    items.push(self.parse_operand(stops));
                }
                Some(token) => {
                    let token = token.clone();
                    self.report(
                        "GS012",
                        format!("expected an operator, found '{}'", token.text),
                        token.span,
                    );
                    self.bump();
                    items.push(Expr::Unfinished(token.text));
                    ops.push(String::new());
                }
                None => break,
            }
        }
        group_operands(items, ops)
    }

    fn parse_operand(&mut self, stops: &[Stop]) -> Expr {
        let mut expr = self.parse_atom(stops);
        loop {
            match self.peek().map(|t| t.kind) {
                Some(TokenKind::Hash) => {
                    self.bump();
                    match self.eat_kind(TokenKind::Ident) {
                        Some(field) => {
                            expr = Expr::FieldAccess {
                                base: Box::new(expr),
                                field: field.text,
                            };
                        }
                        None => {
                            let span = self.here();
                            self.report("GS013", "expected a field name after '#'", span);
                            break;
                        }
                    }
                }
                Some(TokenKind::OpenRound) => {
                    self.bump();
                    let args = self.parse_comma_separated(Stop::CloseRound);
                    self.expect_close_round();
                    expr = match expr {
                        // An applied tag keeps its argument inline rather
                        // than becoming a call node.
                        Expr::Tag {
                            type_name,
                            tag_name,
                            argument: None,
                        } => Expr::Tag {
                            type_name,
                            tag_name,
                            argument: Some(Box::new(if args.len() == 1 {
                                args.into_iter().next().unwrap()
                            } else {
                                Expr::Tuple(args)
                            })),
                        },
                        function => Expr::Call {
                            function: Box::new(function),
                            args,
                        },
                    };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_comma_separated(&mut self, close: Stop) -> Vec<Expr> {
        let mut items = Vec::new();
        if self.at_stop(&[close]) {
            return items;
        }
        loop {
            items.push(self.parse_until(&[Stop::Comma, close]));
            if self.eat_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        items
    }

    fn expect_close_round(&mut self) {
        if self.eat_kind(TokenKind::CloseRound).is_none() {
            let span = self.here();
            self.report("GS014", "expected ')'", span);
        }
    }

    fn parse_atom(&mut self, stops: &[Stop]) -> Expr {
        if self.at_end() || self.at_stop(stops) {
            let span = self.here();
            self.report("GS015", "expected an expression", span);
            return Expr::Unfinished(String::new());
        }
        let token = self.bump();
        match token.kind {
            TokenKind::Number => self.finish_number(token.text),
            TokenKind::Operator if token.text == "-" => {
                match self.eat_kind(TokenKind::Number) {
                    Some(number) => match self.finish_number(number.text) {
                        Expr::Number { value, unit } => Expr::Number {
                            value: -value,
                            unit,
                        },
                        other => other,
                    },
                    None => {
                        self.report("GS016", "expected a number after '-'", token.span);
                        Expr::Unfinished("-".to_string())
                    }
                }
            }
            TokenKind::String => Expr::Text(token.text),
            TokenKind::Temporal => self.parse_temporal(&token),
            TokenKind::Question => Expr::ImplicitArg,
            TokenKind::Ident if token.text == "true" => Expr::Bool(true),
            TokenKind::Ident if token.text == "false" => Expr::Bool(false),
            TokenKind::Ident => Expr::Ident(token.text),
            TokenKind::OpenRound => self.parse_bracketed(),
            TokenKind::OpenSquare => {
                let items = self.parse_comma_separated(Stop::CloseSquare);
                if self.eat_kind(TokenKind::CloseSquare).is_none() {
                    let span = self.here();
                    self.report("GS014", "expected ']'", span);
                }
                Expr::Array(items)
            }
            TokenKind::Keyword => self.parse_keyword(&token, stops),
            _ => {
                self.report(
                    "GS017",
                    format!("unexpected '{}'", token.text),
                    token.span,
                );
                Expr::Unfinished(token.text)
            }
        }
    }

    /// `(` already consumed: a record `(name: e, ...)`, a tuple
    /// `(a, b)`, or plain grouping `(e)`.
    fn parse_bracketed(&mut self) -> Expr {
        let is_record = matches!(
            (self.peek(), self.tokens.get(self.pos + 1)),
            (Some(first), Some(second))
                if first.kind == TokenKind::Ident && second.kind == TokenKind::Colon
        );
        if is_record {
            let mut fields = Vec::new();
            loop {
                let Some(name) = self.eat_kind(TokenKind::Ident) else {
                    let span = self.here();
                    self.report("GS018", "expected a field name", span);
                    break;
                };
                if self.eat_kind(TokenKind::Colon).is_none() {
                    let span = self.here();
                    self.report("GS018", "expected ':' after field name", span);
                }
                let value = self.parse_until(&[Stop::Comma, Stop::CloseRound]);
                fields.push((name.text, value));
                if self.eat_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect_close_round();
            return Expr::Record(fields);
        }
        let items = self.parse_comma_separated(Stop::CloseRound);
        self.expect_close_round();
        match items.len() {
            0 => {
                let span = self.here();
                self.report("GS015", "expected an expression inside '()'", span);
                Expr::Unfinished(String::new())
            }
            1 => items.into_iter().next().unwrap(),
            _ => Expr::Tuple(items),
        }
    }

    fn parse_keyword(&mut self, token: &Token, stops: &[Stop]) -> Expr {
        match token.text.as_str() {
            "@column" => self.parse_column(ColumnRefKind::SameRow),
            "@wholecolumn" => self.parse_column(ColumnRefKind::WholeColumn),
            "@match" => self.parse_match(),
            "@define" => self.parse_define(),
            "@function" => self.parse_lambda(),
            "@call" => {
                let inner = self.parse_operand(stops);
                if !matches!(
                    inner,
                    Expr::Call { .. }
                        | Expr::Tag {
                            argument: Some(_),
                            ..
                        }
                ) {
                    self.report("GS019", "'@call' must be applied to arguments", token.span);
                }
                inner
            }
            "@tag" => self.parse_tag(),
            "@anything" => Expr::MatchAnything,
            "@invalidops" => self.parse_invalid_ops(),
            "@unfinished" => match self.eat_kind(TokenKind::String) {
                Some(text) => Expr::Unfinished(text.text),
                None => {
                    self.report("GS020", "expected quoted text after '@unfinished'", token.span);
                    Expr::Unfinished(String::new())
                }
            },
            other => {
                self.report(
                    "GS021",
                    format!("unexpected keyword '{other}'"),
                    token.span,
                );
                Expr::Unfinished(other.to_string())
            }
        }
    }

    fn parse_column(&mut self, kind: ColumnRefKind) -> Expr {
        let Some(first) = self.eat_kind(TokenKind::Ident) else {
            let span = self.here();
            self.report("GS022", "expected a column name", span);
            return Expr::Unfinished(String::new());
        };
        let reference = if self.eat_kind(TokenKind::Backslash).is_some() {
            match self.eat_kind(TokenKind::Ident) {
                Some(column) => ColumnReference {
                    table: Some(TableId(first.text)),
                    column: ColumnId(column.text),
                    kind,
                },
                None => {
                    let span = self.here();
                    self.report("GS022", "expected a column name after '\\'", span);
                    ColumnReference {
                        table: None,
                        column: ColumnId(first.text),
                        kind,
                    }
                }
            }
        } else {
            ColumnReference {
                table: None,
                column: ColumnId(first.text),
                kind,
            }
        };
        Expr::Column(reference)
    }

    fn parse_tag(&mut self) -> Expr {
        let Some(type_name) = self.eat_kind(TokenKind::Ident) else {
            let span = self.here();
            self.report("GS023", "expected a type name after '@tag'", span);
            return Expr::Unfinished(String::new());
        };
        if self.eat_kind(TokenKind::Backslash).is_none() {
            let span = self.here();
            self.report("GS023", "expected '\\' between type and tag name", span);
        }
        let Some(tag_name) = self.eat_kind(TokenKind::Ident) else {
            let span = self.here();
            self.report("GS023", "expected a tag name", span);
            return Expr::Unfinished(type_name.text);
        };
        Expr::Tag {
            type_name: type_name.text,
            tag_name: tag_name.text,
            argument: None,
        }
    }

    fn parse_match(&mut self) -> Expr {
        let subject = self.parse_until(&[Stop::Keyword("@case"), Stop::Keyword("@endmatch")]);
        let mut clauses = Vec::new();
        while self.eat_keyword("@case") {
            let mut patterns = Vec::new();
            loop {
                let pattern = self.parse_until(&[
                    Stop::Keyword("@given"),
                    Stop::Keyword("@orcase"),
                    Stop::Keyword("@then"),
                ]);
                let guard = if self.eat_keyword("@given") {
                    Some(self.parse_until(&[Stop::Keyword("@orcase"), Stop::Keyword("@then")]))
                } else {
                    None
                };
                patterns.push(PatternEntry { pattern, guard });
                if !self.eat_keyword("@orcase") {
                    break;
                }
            }
            self.expect_keyword("@then");
            let outcome = self.parse_until(&[Stop::Keyword("@case"), Stop::Keyword("@endmatch")]);
            clauses.push(Clause { patterns, outcome });
        }
        self.expect_keyword("@endmatch");
        // Clauses are complete values before the match is assembled.
        Expr::Match(MatchExpr {
            subject: Box::new(subject),
            clauses,
        })
    }

    fn parse_define(&mut self) -> Expr {
        let mut definitions = Vec::new();
        loop {
            let pattern =
                self.parse_until(&[Stop::Equals, Stop::Comma, Stop::Keyword("@then")]);
            if self.eat_kind(TokenKind::Operator).is_none() {
                let span = self.here();
                self.report("GS024", "expected '=' in definition", span);
            }
            let value = self.parse_until(&[Stop::Comma, Stop::Keyword("@then")]);
            definitions.push(Definition { pattern, value });
            if self.eat_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_keyword("@then");
        let body = self.parse_until(&[Stop::Keyword("@enddefine")]);
        self.expect_keyword("@enddefine");
        Expr::Define {
            definitions,
            body: Box::new(body),
        }
    }

    fn parse_lambda(&mut self) -> Expr {
        let mut params = Vec::new();
        loop {
            params.push(self.parse_until(&[Stop::Comma, Stop::Keyword("@then")]));
            if self.eat_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_keyword("@then");
        let body = self.parse_until(&[Stop::Keyword("@endfunction")]);
        self.expect_keyword("@endfunction");
        Expr::Lambda {
            params,
            body: Box::new(body),
        }
    }

    fn parse_invalid_ops(&mut self) -> Expr {
        if self.eat_kind(TokenKind::OpenRound).is_none() {
            let span = self.here();
            self.report("GS025", "expected '(' after '@invalidops'", span);
            return Expr::InvalidOps(Vec::new());
        }
        let mut items = Vec::new();
        if !self.at_stop(&[Stop::CloseRound]) {
            loop {
                match self.peek() {
                    Some(token) if token.kind == TokenKind::String => {
                        let op = self.bump();
                        items.push(InvalidItem::Op(op.text));
                    }
                    _ => {
                        let operand =
                            self.parse_until(&[Stop::Comma, Stop::CloseRound]);
                        items.push(InvalidItem::Operand(operand));
                    }
                }
                if self.eat_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect_close_round();
        Expr::InvalidOps(items)
    }

    fn finish_number(&mut self, text: String) -> Expr {
        let value = match Decimal::from_str(&text) {
            Ok(value) => value,
            Err(_) => {
                let span = self.here();
                self.report("GS026", format!("invalid number '{text}'"), span);
                return Expr::Unfinished(text);
            }
        };
        let unit = if self.eat_kind(TokenKind::OpenCurly).is_some() {
            let unit = self.parse_unit_syntax();
            if self.eat_kind(TokenKind::CloseCurly).is_none() {
                let span = self.here();
                self.report("GS027", "expected '}' to close the unit", span);
            }
            unit
        } else {
            None
        };
        Expr::Number { value, unit }
    }

    /// `name (^ exponent)? (('*'|'/') name (^ exponent)?)*`
    fn parse_unit_syntax(&mut self) -> Option<UnitSyntax> {
        let mut acc = self.parse_unit_part()?;
        loop {
            let Some(token) = self.peek() else {
                break;
            };
            if token.kind != TokenKind::Operator || (token.text != "*" && token.text != "/") {
                break;
            }
            let op = self.bump();
            let part = self.parse_unit_part()?;
            acc = if op.text == "*" {
                match acc {
                    UnitSyntax::Product(mut parts) => {
                        parts.push(part);
                        UnitSyntax::Product(parts)
                    }
                    other => UnitSyntax::Product(vec![other, part]),
                }
            } else {
                UnitSyntax::Quotient(Box::new(acc), Box::new(part))
            };
        }
        Some(acc)
    }

    fn parse_unit_part(&mut self) -> Option<UnitSyntax> {
        let Some(name) = self.eat_kind(TokenKind::Ident) else {
            let span = self.here();
            self.report("GS028", "expected a unit name", span);
            return None;
        };
        let base = UnitSyntax::Name(name.text);
        let Some(token) = self.peek() else {
            return Some(base);
        };
        if token.kind == TokenKind::Operator && token.text == "^" {
            self.bump();
            let negative = matches!(
                self.peek(),
                Some(t) if t.kind == TokenKind::Operator && t.text == "-"
            );
            if negative {
                self.bump();
            }
            let Some(number) = self.eat_kind(TokenKind::Number) else {
                let span = self.here();
                self.report("GS028", "expected an integer exponent", span);
                return Some(base);
            };
            let Ok(exponent) = number.text.parse::<i32>() else {
                self.report("GS028", "unit exponents must be integers", number.span);
                return Some(base);
            };
            let exponent = if negative { -exponent } else { exponent };
            return Some(UnitSyntax::Power(Box::new(base), exponent));
        }
        Some(base)
    }

    fn parse_temporal(&mut self, token: &Token) -> Expr {
        let Some((kind, rest)) = token.text.split_once('{') else {
            return Expr::Unfinished(token.text.clone());
        };
        let content = rest.strip_suffix('}').unwrap_or(rest);
        let parsed = match kind {
            "date" => NaiveDate::parse_from_str(content, "%Y-%m-%d")
                .ok()
                .map(TemporalLiteral::Date),
            "dateym" => parse_year_month(content),
            "time" => NaiveTime::parse_from_str(content, "%H:%M:%S")
                .ok()
                .map(TemporalLiteral::Time),
            "datetime" => NaiveDateTime::parse_from_str(content, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(TemporalLiteral::DateTime),
            "datetimezoned" => DateTime::parse_from_str(content, "%Y-%m-%d %H:%M:%S %:z")
                .ok()
                .map(TemporalLiteral::Zoned),
            _ => None,
        };
        match parsed {
            Some(literal) => Expr::Temporal(literal),
            None => {
                self.report(
                    "GS029",
                    format!("invalid {kind} literal '{content}'"),
                    token.span,
                );
                Expr::Unfinished(token.text.clone())
            }
        }
    }
}

fn parse_year_month(content: &str) -> Option<TemporalLiteral> {
    let (year, month) = content.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    (1..=12).contains(&month).then_some(TemporalLiteral::YearMonth { year, month })
}

fn group_operands(items: Vec<Expr>, ops: Vec<String>) -> Expr {
    if ops.is_empty() {
        return items.into_iter().next().expect("at least one operand");
    }
    let all = |symbols: &[&str]| ops.iter().all(|op| symbols.contains(&op.as_str()));
    let binary = items.len() == 2 && ops.len() == 1;

    if all(&["+", "-"]) {
        let ops = ops
            .iter()
            .map(|op| {
                if op == "+" {
                    AddSubOp::Add
                } else {
                    AddSubOp::Subtract
                }
            })
            .collect();
        return Expr::AddSubtract { items, ops };
    }
    if all(&["*"]) {
        return Expr::Times(items);
    }
    if all(&["/"]) && binary {
        let mut iter = items.into_iter();
        return Expr::Divide(Box::new(iter.next().unwrap()), Box::new(iter.next().unwrap()));
    }
    if all(&["^"]) && binary {
        let mut iter = items.into_iter();
        return Expr::Raise {
            base: Box::new(iter.next().unwrap()),
            exponent: Box::new(iter.next().unwrap()),
        };
    }
    if all(&["&"]) {
        return Expr::And(items);
    }
    if all(&["|"]) {
        return Expr::Or(items);
    }
    if all(&["="]) {
        return Expr::Equal(items);
    }
    if all(&["<>"]) && binary {
        let mut iter = items.into_iter();
        return Expr::NotEqual(Box::new(iter.next().unwrap()), Box::new(iter.next().unwrap()));
    }
    if all(&["<", "<="]) || all(&[">", ">="]) {
        let ops = ops
            .iter()
            .map(|op| match op.as_str() {
                "<" => ComparisonOp::Less,
                "<=" => ComparisonOp::LessEq,
                ">" => ComparisonOp::Greater,
                _ => ComparisonOp::GreaterEq,
            })
            .collect();
        return Expr::Comparison { items, ops };
    }
    if all(&["±"]) && binary {
        let mut iter = items.into_iter();
        return Expr::Tolerance {
            value: Box::new(iter.next().unwrap()),
            epsilon: Box::new(iter.next().unwrap()),
        };
    }

    let mut invalid = Vec::with_capacity(items.len() + ops.len());
    let mut ops_iter = ops.into_iter();
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            if let Some(op) = ops_iter.next() {
                invalid.push(InvalidItem::Op(op));
            }
        }
        invalid.push(InvalidItem::Operand(item));
    }
    Expr::InvalidOps(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::SaveMode;

    fn parsed(source: &str) -> Expr {
        let (expr, diags) = parse_expression(source);
        assert!(diags.is_empty(), "diagnostics for '{source}': {diags:?}");
        expr
    }

    fn roundtrip(source: &str) -> Expr {
        let expr = parsed(source);
        let saved = expr.save(SaveMode::Storage);
        let (reparsed, diags) = parse_expression(&saved);
        assert!(diags.is_empty(), "diagnostics for saved '{saved}': {diags:?}");
        assert_eq!(reparsed, expr, "round-trip changed '{source}' (saved '{saved}')");
        expr
    }

    #[test]
    fn literals_roundtrip() {
        roundtrip("5");
        roundtrip("5.5{m/s^2}");
        roundtrip("-3{s}");
        roundtrip(r#""say \"hi\"""#);
        roundtrip("true");
        roundtrip("false");
        roundtrip("date{2024-01-15}");
        roundtrip("dateym{2024-01}");
        roundtrip("time{10:30:00}");
        roundtrip("datetime{2024-01-15 10:30:00}");
        roundtrip("datetimezoned{2024-01-15 10:30:00 +01:00}");
    }

    #[test]
    fn column_references_roundtrip() {
        let expr = roundtrip("@column Data\\price");
        assert!(matches!(expr, Expr::Column(ColumnReference { kind: ColumnRefKind::SameRow, .. })));
        let expr = roundtrip("@wholecolumn price");
        assert!(matches!(
            expr,
            Expr::Column(ColumnReference { kind: ColumnRefKind::WholeColumn, table: None, .. })
        ));
    }

    #[test]
    fn arithmetic_roundtrips() {
        roundtrip("(1 + 2 - 3)");
        roundtrip("(2 * 3 * 4)");
        roundtrip("(1 / 2)");
        roundtrip("(2 ^ 3)");
        roundtrip("(1 < 2 <= 3)");
        roundtrip("(1 = 2 = 3)");
        roundtrip("(1 <> 2)");
        roundtrip("((1 + 2) * 3)");
    }

    #[test]
    fn structures_roundtrip() {
        roundtrip("(1, 2)");
        roundtrip("(x: 1, y: 2)");
        roundtrip("[1, 2, 3]");
        roundtrip("@call abs(5)");
        roundtrip("@tag Perhaps\\Is(5)");
        roundtrip("@tag Perhaps\\Missing");
        roundtrip("@function x @then (x * 2) @endfunction");
        roundtrip("@define x = 5, y = (x + 1) @then (x + y) @enddefine");
        roundtrip("@unfinished \"foo +\"");
    }

    #[test]
    fn match_roundtrips() {
        roundtrip(
            "@match @column Data\\x @case 1 @then \"a\" @case v @given (v > 0) @orcase (5 ± 0.1) @then \"b\" @case @anything @then \"c\" @endmatch",
        );
    }

    #[test]
    fn field_access_parses() {
        let expr = parsed("r#total");
        assert!(matches!(expr, Expr::FieldAccess { .. }));
        roundtrip("r#total");
    }

    #[test]
    fn mixed_operators_become_invalid_ops() {
        // No precedence: mixing families at one level is preserved as-is,
        // not guessed at.
        let expr = parsed("1 + 2 * 3");
        let Expr::InvalidOps(items) = &expr else {
            panic!("expected invalid ops, got {expr:?}");
        };
        assert_eq!(items.len(), 5);
        let saved = expr.save(SaveMode::Storage);
        assert_eq!(saved, "@invalidops(1, \"+\", 2, \"*\", 3)");
        let (reparsed, diags) = parse_expression(&saved);
        assert!(diags.is_empty());
        assert_eq!(reparsed, expr);
    }

    #[test]
    fn three_way_divide_is_invalid() {
        assert!(matches!(parsed("1 / 2 / 3"), Expr::InvalidOps(_)));
    }

    #[test]
    fn editor_mode_omits_call_keyword() {
        let expr = parsed("@call abs(5)");
        assert_eq!(expr.save(SaveMode::Editor), "abs(5)");
        assert_eq!(expr.save(SaveMode::Storage), "@call abs(5)");
        // The editor form parses back to the same structure.
        assert_eq!(parsed("abs(5)"), expr);
    }

    #[test]
    fn implicit_arg_parses_in_calls() {
        let expr = roundtrip("@call abs(?)");
        let Expr::Call { args, .. } = &expr else {
            panic!("expected a call");
        };
        assert_eq!(args[0], Expr::ImplicitArg);
    }

    #[test]
    fn unterminated_match_reports_but_returns_tree() {
        let (expr, diags) = parse_expression("@match 1 @case 1 @then 2");
        assert!(!diags.is_empty());
        assert!(matches!(expr, Expr::Match(_)));
    }
}
