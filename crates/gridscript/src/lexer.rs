use crate::diagnostics::{Diagnostic, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// `@`-prefixed keyword, e.g. `@match`.
    Keyword,
    Number,
    /// Quoted text; `text` holds the unescaped content.
    String,
    /// A temporal literal such as `date{2024-01-15}`; `text` holds the
    /// whole lexeme.
    Temporal,
    Operator,
    OpenRound,
    CloseRound,
    OpenSquare,
    CloseSquare,
    OpenCurly,
    CloseCurly,
    Comma,
    Colon,
    Backslash,
    Hash,
    Question,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

const TEMPORAL_KINDS: [&str; 5] = ["date", "dateym", "time", "datetime", "datetimezoned"];

pub fn lex(content: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut index = 0usize;
    let mut line = 1usize;
    let mut col = 1usize;

    while index < chars.len() {
        let ch = chars[index];

        if ch == '\n' {
            index += 1;
            line += 1;
            col = 1;
            continue;
        }
        if ch == ' ' || ch == '\t' || ch == '\r' {
            index += 1;
            col += 1;
            continue;
        }

        if ch == '"' {
            let start_col = col;
            index += 1;
            col += 1;
            let mut text = String::new();
            let mut terminated = false;
            while index < chars.len() {
                let c = chars[index];
                if c == '\n' {
                    break;
                }
                index += 1;
                col += 1;
                if c == '"' {
                    terminated = true;
                    break;
                }
                if c == '\\' && index < chars.len() {
                    let escaped = chars[index];
                    index += 1;
                    col += 1;
                    match escaped {
                        '"' => text.push('"'),
                        '\\' => text.push('\\'),
                        'n' => text.push('\n'),
                        other => {
                            diagnostics.push(Diagnostic::new(
                                "GS001",
                                format!("unknown escape '\\{other}' in text"),
                                Span::single(line, col - 2, 2),
                            ));
                            text.push(other);
                        }
                    }
                    continue;
                }
                text.push(c);
            }
            if !terminated {
                diagnostics.push(Diagnostic::new(
                    "GS002",
                    "unterminated text literal",
                    Span::single(line, start_col, col - start_col),
                ));
            }
            tokens.push(Token {
                kind: TokenKind::String,
                text,
                span: Span::single(line, start_col, col - start_col),
            });
            continue;
        }

        if ch == '@' {
            let start = index;
            let start_col = col;
            index += 1;
            col += 1;
            while index < chars.len() && is_ident_char(chars[index]) {
                index += 1;
                col += 1;
            }
            let text: String = chars[start..index].iter().collect();
            if text.len() == 1 {
                diagnostics.push(Diagnostic::new(
                    "GS003",
                    "'@' must be followed by a keyword name",
                    Span::single(line, start_col, 1),
                ));
            }
            tokens.push(Token {
                kind: TokenKind::Keyword,
                text,
                span: Span::single(line, start_col, index - start),
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let start = index;
            let start_col = col;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
                col += 1;
            }
            if index + 1 < chars.len()
                && chars[index] == '.'
                && chars[index + 1].is_ascii_digit()
            {
                index += 1;
                col += 1;
                while index < chars.len() && chars[index].is_ascii_digit() {
                    index += 1;
                    col += 1;
                }
            }
            let text: String = chars[start..index].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Number,
                text,
                span: Span::single(line, start_col, index - start),
            });
            continue;
        }

        if is_ident_start(ch) {
            let start = index;
            let start_col = col;
            while index < chars.len() && is_ident_char(chars[index]) {
                index += 1;
                col += 1;
            }
            let text: String = chars[start..index].iter().collect();
            // Temporal literals carry raw content to the closing brace so
            // dashes and colons inside never reach the operator rules.
            if TEMPORAL_KINDS.contains(&text.as_str())
                && index < chars.len()
                && chars[index] == '{'
            {
                let mut terminated = false;
                while index < chars.len() {
                    let c = chars[index];
                    if c == '\n' {
                        break;
                    }
                    index += 1;
                    col += 1;
                    if c == '}' {
                        terminated = true;
                        break;
                    }
                }
                if !terminated {
                    diagnostics.push(Diagnostic::new(
                        "GS004",
                        "unterminated temporal literal",
                        Span::single(line, start_col, index - start),
                    ));
                }
                let text: String = chars[start..index].iter().collect();
                tokens.push(Token {
                    kind: TokenKind::Temporal,
                    text,
                    span: Span::single(line, start_col, index - start),
                });
                continue;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text,
                span: Span::single(line, start_col, index - start),
            });
            continue;
        }

        let simple = |kind: TokenKind| Token {
            kind,
            text: ch.to_string(),
            span: Span::single(line, col, 1),
        };
        let token = match ch {
            '(' => Some(simple(TokenKind::OpenRound)),
            ')' => Some(simple(TokenKind::CloseRound)),
            '[' => Some(simple(TokenKind::OpenSquare)),
            ']' => Some(simple(TokenKind::CloseSquare)),
            '{' => Some(simple(TokenKind::OpenCurly)),
            '}' => Some(simple(TokenKind::CloseCurly)),
            ',' => Some(simple(TokenKind::Comma)),
            ':' => Some(simple(TokenKind::Colon)),
            '\\' => Some(simple(TokenKind::Backslash)),
            '#' => Some(simple(TokenKind::Hash)),
            '?' => Some(simple(TokenKind::Question)),
            '+' | '-' | '*' | '/' | '^' | '&' | '|' | '=' | '±' => Some(simple(TokenKind::Operator)),
            '<' | '>' => {
                let mut text = ch.to_string();
                if index + 1 < chars.len()
                    && (chars[index + 1] == '=' || (ch == '<' && chars[index + 1] == '>'))
                {
                    text.push(chars[index + 1]);
                }
                let len = text.chars().count();
                let token = Token {
                    kind: TokenKind::Operator,
                    text,
                    span: Span::single(line, col, len),
                };
                index += len - 1;
                col += len - 1;
                Some(token)
            }
            _ => None,
        };
        match token {
            Some(token) => {
                tokens.push(token);
                index += 1;
                col += 1;
            }
            None => {
                diagnostics.push(Diagnostic::new(
                    "GS005",
                    format!("unexpected character '{ch}'"),
                    Span::single(line, col, 1),
                ));
                index += 1;
                col += 1;
            }
        }
    }

    (tokens, diagnostics)
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, diags) = lex(source);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_number_with_unit_suffix() {
        assert_eq!(
            kinds("5.5{m/s^2}"),
            vec![
                TokenKind::Number,
                TokenKind::OpenCurly,
                TokenKind::Ident,
                TokenKind::Operator,
                TokenKind::Ident,
                TokenKind::Operator,
                TokenKind::Number,
                TokenKind::CloseCurly,
            ]
        );
    }

    #[test]
    fn lexes_temporal_as_one_token() {
        let (tokens, diags) = lex("date{2024-01-15}");
        assert!(diags.is_empty());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Temporal);
        assert_eq!(tokens[0].text, "date{2024-01-15}");
    }

    #[test]
    fn lexes_keywords_and_two_char_operators() {
        assert_eq!(
            kinds("@match x <= y <> z"),
            vec![
                TokenKind::Keyword,
                TokenKind::Ident,
                TokenKind::Operator,
                TokenKind::Ident,
                TokenKind::Operator,
                TokenKind::Ident,
            ]
        );
        let (tokens, _) = lex("a <> b");
        assert_eq!(tokens[1].text, "<>");
    }

    #[test]
    fn string_escapes_resolve() {
        let (tokens, diags) = lex(r#""say \"hi\"\\""#);
        assert!(diags.is_empty());
        assert_eq!(tokens[0].text, "say \"hi\"\\");
    }

    #[test]
    fn unterminated_string_reports() {
        let (_, diags) = lex("\"oops");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, "GS002");
    }
}
