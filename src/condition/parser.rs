//! Tokenizer and recursive descent parser for row conditions.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Number, Value};

use super::ConditionError;

/// Maximum nesting of parentheses and negations
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Dotted path into the row, without the `row.` prefix
    Field(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\s*(?:",
            r"(?P<num>-?\d+(?:\.\d+)?)",
            r#"|"(?P<dq>(?:[^"\\]|\\.)*)""#,
            r"|'(?P<sq>(?:[^'\\]|\\.)*)'",
            r"|(?P<ident>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)",
            r"|(?P<op>===|!==|==|!=|<=|>=|&&|\|\||[<>!()])",
            r")"
        ))
        .expect("token pattern is valid")
    })
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn tokenize(src: &str) -> Result<Vec<Token>, ConditionError> {
    let re = token_regex();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < src.len() {
        let rest = &src[pos..];
        if rest.trim_start().is_empty() {
            break;
        }

        let caps = match re.captures(rest) {
            Some(c) if c.get(0).map(|m| m.start()) == Some(0) => c,
            _ => {
                let skipped = rest.len() - rest.trim_start().len();
                let offset = pos + skipped;
                let ch = src[offset..].chars().next().unwrap_or(' ');
                return Err(ConditionError::UnexpectedChar { ch, offset });
            }
        };

        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let (kind, start) = if let Some(m) = caps.name("num") {
            let n = m.as_str().parse().map_err(|_| ConditionError::UnexpectedToken {
                found: m.as_str().to_string(),
                offset: pos + m.start(),
            })?;
            (TokenKind::Number(n), m.start())
        } else if let Some(m) = caps.name("dq").or_else(|| caps.name("sq")) {
            (TokenKind::Str(unescape(m.as_str())), m.start() - 1)
        } else if let Some(m) = caps.name("ident") {
            (TokenKind::Ident(m.as_str().to_string()), m.start())
        } else if let Some(m) = caps.name("op") {
            let kind = match m.as_str() {
                "(" => TokenKind::LParen,
                ")" => TokenKind::RParen,
                "===" | "==" => TokenKind::Op("=="),
                "!==" | "!=" => TokenKind::Op("!="),
                "<=" => TokenKind::Op("<="),
                ">=" => TokenKind::Op(">="),
                "<" => TokenKind::Op("<"),
                ">" => TokenKind::Op(">"),
                "&&" => TokenKind::Op("&&"),
                "||" => TokenKind::Op("||"),
                _ => TokenKind::Op("!"),
            };
            (kind, m.start())
        } else {
            break;
        };

        tokens.push(Token {
            kind,
            offset: pos + start,
        });
        pos += whole;
    }

    Ok(tokens)
}

/// Parse source text into an expression tree.
pub fn parse(src: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;

    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.unexpected(tok)),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(o),
                ..
            }) if *o == op => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn unexpected(&self, tok: &Token) -> ConditionError {
        let found = match &tok.kind {
            TokenKind::Number(n) => n.to_string(),
            TokenKind::Str(s) => format!("{:?}", s),
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Op(o) => o.to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
        };
        ConditionError::UnexpectedToken {
            found,
            offset: tok.offset,
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.and()?;
        while self.eat_op("||") {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.unary()?;
        while self.eat_op("&&") {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.eat_op("!") {
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.operand()?;

        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op("==")) => CompareOp::Eq,
            Some(TokenKind::Op("!=")) => CompareOp::Ne,
            Some(TokenKind::Op("<")) => CompareOp::Lt,
            Some(TokenKind::Op("<=")) => CompareOp::Le,
            Some(TokenKind::Op(">")) => CompareOp::Gt,
            Some(TokenKind::Op(">=")) => CompareOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;

        let rhs = self.operand()?;
        Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)))
    }

    fn operand(&mut self) -> Result<Expr, ConditionError> {
        let tok = self.next().ok_or(ConditionError::UnexpectedEnd)?;

        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(
                Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Field(field_path(&name)),
            }),
            TokenKind::LParen => {
                self.enter()?;
                let inner = self.or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(self.unexpected(&other)),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            _ => Err(self.unexpected(&tok)),
        }
    }
}

fn field_path(name: &str) -> Vec<String> {
    let name = name.strip_prefix("row.").unwrap_or(name);
    name.split('.').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str) -> Box<Expr> {
        Box::new(Expr::Field(vec![name.to_string()]))
    }

    #[test]
    fn test_precedence_and_binds_tighter() {
        let expr = parse("a || b && c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(field("a"), Box::new(Expr::And(field("b"), field("c"))))
        );
    }

    #[test]
    fn test_row_prefix_and_strict_ops() {
        let expr = parse("row.status === 'running'").unwrap();
        assert_eq!(
            expr,
            Expr::Compare(
                field("status"),
                CompareOp::Eq,
                Box::new(Expr::Literal(json!("running")))
            )
        );
    }

    #[test]
    fn test_nested_path_and_numbers() {
        let expr = parse("row.metrics.cpu >= -1.5").unwrap();
        assert_eq!(
            expr,
            Expr::Compare(
                Box::new(Expr::Field(vec!["metrics".to_string(), "cpu".to_string()])),
                CompareOp::Ge,
                Box::new(Expr::Literal(json!(-1.5)))
            )
        );
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let expr = parse(r#"name == "say \"hi\"""#).unwrap();
        assert_eq!(
            expr,
            Expr::Compare(field("name"), CompareOp::Eq, Box::new(Expr::Literal(json!("say \"hi\""))))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("   "), Err(ConditionError::Empty));
        assert_eq!(parse("a =="), Err(ConditionError::UnexpectedEnd));
        assert_eq!(parse("(a"), Err(ConditionError::UnexpectedEnd));
        assert!(matches!(
            parse("a == ; drop()"),
            Err(ConditionError::UnexpectedChar { ch: ';', offset: 5 })
        ));
        assert!(matches!(
            parse("a b"),
            Err(ConditionError::UnexpectedToken { offset: 2, .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let src = format!("{}a{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&src), Err(ConditionError::TooDeep(MAX_DEPTH)));

        let negs = format!("{}a", "!".repeat(100));
        assert_eq!(parse(&negs), Err(ConditionError::TooDeep(MAX_DEPTH)));
    }
}
