//! Restricted filter expressions
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or         := and (("|" | "||" | "or") and)*
//! and        := unary (("&" | "&&" | "and") unary)*
//! unary      := ("!" | "~" | "not") unary | primary
//! primary    := "(" or ")" | comparison
//! comparison := operand (cmp operand)?
//! operand    := column method? | literal
//! cmp        := "==" | "!=" | "<" | "<=" | ">" | ">="
//! method     := ".str.contains(s)" | ".str.startswith(s)" | ".str.endswith(s)"
//!             | ".isnull()" | ".notnull()" | ".isna()" | ".notna()"
//! literal    := number | 'text' | "text" | True | False | None | null
//! ```
//!
//! Columns are bare identifiers (dots allowed, e.g. `Detail.en.Title`) or
//! backtick-quoted names. A bare column with no comparison tests a boolean
//! column for `true`. Expressions are parsed once, bound to column indices,
//! then evaluated per row.

use crate::error::{Error, Result};
use crate::tabular::dataset::{Scalar, TabularDataset};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator with its operands swapped
    fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand<C> {
    Column(C),
    Literal(Scalar),
}

/// Parsed filter expression over column references of type `C`
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<C> {
    Compare {
        column: C,
        op: CompareOp,
        value: Operand<C>,
    },
    Text {
        column: C,
        op: TextOp,
        pattern: String,
    },
    Null {
        column: C,
        negated: bool,
    },
    Truthy(C),
    Not(Box<Expr<C>>),
    And(Box<Expr<C>>, Box<Expr<C>>),
    Or(Box<Expr<C>>, Box<Expr<C>>),
}

/// A filter bound to one dataset's columns
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr<usize>,
}

impl Condition {
    /// Parse `input` and resolve its columns against `dataset`
    pub fn compile(input: &str, dataset: &TabularDataset) -> Result<Self> {
        let expr = parse(input)?;
        Ok(Self {
            expr: expr.bind(dataset)?,
        })
    }

    pub fn matches(&self, row: &[Scalar]) -> bool {
        self.expr.eval(row)
    }
}

/// Parse a condition string into an unbound expression
pub fn parse(input: &str) -> Result<Expr<String>> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.chars().count(),
    };
    if parser.tokens.is_empty() {
        return Err(Error::InvalidCondition {
            position: 0,
            message: "empty condition".to_string(),
        });
    }
    let (expr, _) = parser.parse_or(0)?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.error_at(token.position, format!("unexpected {}", token.kind))),
    }
}

impl Expr<String> {
    /// Resolve column names to indices; unknown columns are an error
    pub fn bind(&self, dataset: &TabularDataset) -> Result<Expr<usize>> {
        let resolve = |name: &String| {
            dataset.column_index(name).ok_or_else(|| Error::UnknownColumn {
                column: name.clone(),
                available: dataset.columns().to_vec(),
            })
        };

        Ok(match self {
            Expr::Compare { column, op, value } => Expr::Compare {
                column: resolve(column)?,
                op: *op,
                value: match value {
                    Operand::Column(other) => Operand::Column(resolve(other)?),
                    Operand::Literal(scalar) => Operand::Literal(scalar.clone()),
                },
            },
            Expr::Text {
                column,
                op,
                pattern,
            } => Expr::Text {
                column: resolve(column)?,
                op: *op,
                pattern: pattern.clone(),
            },
            Expr::Null { column, negated } => Expr::Null {
                column: resolve(column)?,
                negated: *negated,
            },
            Expr::Truthy(column) => Expr::Truthy(resolve(column)?),
            Expr::Not(inner) => Expr::Not(Box::new(inner.bind(dataset)?)),
            Expr::And(a, b) => Expr::And(Box::new(a.bind(dataset)?), Box::new(b.bind(dataset)?)),
            Expr::Or(a, b) => Expr::Or(Box::new(a.bind(dataset)?), Box::new(b.bind(dataset)?)),
        })
    }
}

impl Expr<usize> {
    pub fn eval(&self, row: &[Scalar]) -> bool {
        match self {
            Expr::Compare { column, op, value } => {
                let left = &row[*column];
                let right = match value {
                    Operand::Column(idx) => &row[*idx],
                    Operand::Literal(scalar) => scalar,
                };
                compare(left, *op, right)
            }
            Expr::Text {
                column,
                op,
                pattern,
            } => match row[*column].as_str() {
                Some(text) => match op {
                    TextOp::Contains => text.contains(pattern.as_str()),
                    TextOp::StartsWith => text.starts_with(pattern.as_str()),
                    TextOp::EndsWith => text.ends_with(pattern.as_str()),
                },
                None => false,
            },
            Expr::Null { column, negated } => row[*column].is_null() != *negated,
            Expr::Truthy(column) => matches!(row[*column], Scalar::Bool(true)),
            Expr::Not(inner) => !inner.eval(row),
            Expr::And(a, b) => a.eval(row) && b.eval(row),
            Expr::Or(a, b) => a.eval(row) || b.eval(row),
        }
    }
}

fn compare(left: &Scalar, op: CompareOp, right: &Scalar) -> bool {
    let ordering = || left.partial_cmp_strict(right);
    match op {
        CompareOp::Eq => left.loose_eq(right),
        CompareOp::Ne => !left.loose_eq(right),
        CompareOp::Lt => ordering() == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering() == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    /// Column reference plus any trailing `.method` chain
    Column { name: String, method: Option<String> },
    Literal(Scalar),
    Compare(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Column { name, .. } => write!(f, "column '{}'", name),
            TokenKind::Literal(value) => write!(f, "literal {}", value.to_json()),
            TokenKind::Compare(op) => write!(f, "operator {:?}", op),
            TokenKind::And => write!(f, "'&'"),
            TokenKind::Or => write!(f, "'|'"),
            TokenKind::Not => write!(f, "'!'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

/// Deepest expression tree a condition may build
pub const MAX_DEPTH: usize = 64;

const METHODS: &[&str] = &[
    "str.contains",
    "str.startswith",
    "str.endswith",
    "isnull",
    "notnull",
    "isna",
    "notna",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> Error {
        Error::InvalidCondition {
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let start = self.pos;
            let kind = match c {
                c if c.is_whitespace() => {
                    self.pos += 1;
                    continue;
                }
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '&' => self.doubled('&', TokenKind::And),
                '|' => self.doubled('|', TokenKind::Or),
                '~' => self.single(TokenKind::Not),
                '!' if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    TokenKind::Compare(CompareOp::Ne)
                }
                '!' => self.single(TokenKind::Not),
                '=' if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    TokenKind::Compare(CompareOp::Eq)
                }
                '=' => return Err(self.error(start, "use '==' for equality")),
                '<' | '>' => {
                    let or_equal = self.peek_at(1) == Some('=');
                    self.pos += if or_equal { 2 } else { 1 };
                    TokenKind::Compare(match (c, or_equal) {
                        ('<', false) => CompareOp::Lt,
                        ('<', true) => CompareOp::Le,
                        ('>', false) => CompareOp::Gt,
                        _ => CompareOp::Ge,
                    })
                }
                '\'' | '"' => TokenKind::Literal(Scalar::Str(self.quoted(c)?)),
                '`' => {
                    let name = self.quoted('`')?;
                    let method = self.method_suffix(start)?;
                    TokenKind::Column { name, method }
                }
                c if self.starts_number(c) => TokenKind::Literal(self.number()?),
                c if c.is_alphabetic() || c == '_' => self.word(start)?,
                other => return Err(self.error(start, format!("unexpected character '{}'", other))),
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }
        Ok(tokens)
    }

    fn starts_number(&self, c: char) -> bool {
        let next_is_digit = self.peek_at(1).is_some_and(|n| n.is_ascii_digit());
        c.is_ascii_digit() || ((c == '-' || c == '.') && next_is_digit)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    /// `&` and `&&` (likewise `|` and `||`) are the same operator
    fn doubled(&mut self, c: char, kind: TokenKind) -> TokenKind {
        self.pos += if self.peek_at(1) == Some(c) { 2 } else { 1 };
        kind
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => match self.peek() {
                    Some(escaped) => {
                        out.push(escaped);
                        self.pos += 1;
                    }
                    None => break,
                },
                c if c == quote => return Ok(out),
                c => out.push(c),
            }
        }
        Err(self.error(start, "unterminated quoted text"))
    }

    fn number(&mut self) -> Result<Scalar> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+')
                && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if let Ok(int) = text.parse::<i64>() {
            return Ok(Scalar::Int(int));
        }
        text.parse::<f64>()
            .map(Scalar::Float)
            .map_err(|_| self.error(start, format!("invalid number '{}'", text)))
    }

    fn word(&mut self, start: usize) -> Result<TokenKind> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        Ok(match word.as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "True" | "true" => TokenKind::Literal(Scalar::Bool(true)),
            "False" | "false" => TokenKind::Literal(Scalar::Bool(false)),
            "None" | "null" | "NULL" => TokenKind::Literal(Scalar::Null),
            _ => {
                if self.peek() == Some('(') {
                    if let Some(method) = METHODS
                        .iter()
                        .find(|m| word.len() > m.len() + 1 && word.ends_with(&format!(".{}", m)))
                    {
                        let name = word[..word.len() - method.len() - 1].to_string();
                        return Ok(TokenKind::Column {
                            name,
                            method: Some(method.to_string()),
                        });
                    }
                    return Err(self.error(start, format!("unsupported function call '{}'", word)));
                }
                TokenKind::Column {
                    name: word,
                    method: None,
                }
            }
        })
    }

    /// `.method` directly after a backtick-quoted column
    fn method_suffix(&mut self, start: usize) -> Result<Option<String>> {
        if self.peek() != Some('.') {
            return Ok(None);
        }
        self.pos += 1;
        let method_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let method: String = self.chars[method_start..self.pos].iter().collect();
        if METHODS.contains(&method.as_str()) && self.peek() == Some('(') {
            Ok(Some(method))
        } else {
            Err(self.error(start, format!("unsupported method '{}'", method)))
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> Error {
        Error::InvalidCondition {
            position,
            message: message.into(),
        }
    }

    fn here(&self) -> usize {
        self.peek().map(|t| t.position).unwrap_or(self.end)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Count one more nesting level at `position`
    fn nest(&self, depth: usize, position: usize) -> Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(self.error_at(position, "expression nested too deeply"));
        }
        Ok(depth + 1)
    }

    fn parse_or(&mut self, level: usize) -> Result<(Expr<String>, usize)> {
        let (mut left, mut depth) = self.parse_and(level)?;
        while let Some(position) = self.peek().map(|t| t.position) {
            if !self.eat(&TokenKind::Or) {
                break;
            }
            let (right, right_depth) = self.parse_and(level)?;
            depth = self.nest(depth.max(right_depth), position)?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok((left, depth))
    }

    fn parse_and(&mut self, level: usize) -> Result<(Expr<String>, usize)> {
        let (mut left, mut depth) = self.parse_unary(level)?;
        while let Some(position) = self.peek().map(|t| t.position) {
            if !self.eat(&TokenKind::And) {
                break;
            }
            let (right, right_depth) = self.parse_unary(level)?;
            depth = self.nest(depth.max(right_depth), position)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok((left, depth))
    }

    /// `level` counts open `!` and `(`; it bounds recursion before any node exists
    fn parse_unary(&mut self, level: usize) -> Result<(Expr<String>, usize)> {
        let position = self.here();
        if self.eat(&TokenKind::Not) {
            let level = self.nest(level, position)?;
            let (inner, depth) = self.parse_unary(level)?;
            return Ok((Expr::Not(Box::new(inner)), self.nest(depth, position)?));
        }
        self.parse_primary(level)
    }

    fn parse_primary(&mut self, level: usize) -> Result<(Expr<String>, usize)> {
        let position = self.here();
        if self.eat(&TokenKind::LParen) {
            let level = self.nest(level, position)?;
            let inner = self.parse_or(level)?;
            if !self.eat(&TokenKind::RParen) {
                return Err(self.error_at(self.here(), "expected ')'"));
            }
            return Ok(inner);
        }
        Ok((self.parse_comparison()?, 1))
    }

    fn parse_comparison(&mut self) -> Result<Expr<String>> {
        let position = self.here();
        let left = match self.next() {
            Some(Token {
                kind: TokenKind::Column { name, method: Some(method) },
                ..
            }) => return self.parse_method(name, &method),
            Some(Token {
                kind: TokenKind::Column { name, method: None },
                ..
            }) => Operand::Column(name),
            Some(Token {
                kind: TokenKind::Literal(value),
                ..
            }) => Operand::Literal(value),
            Some(token) => return Err(self.error_at(token.position, format!("unexpected {}", token.kind))),
            None => return Err(self.error_at(position, "expected a column or value")),
        };

        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Compare(op),
                ..
            }) => {
                let op = *op;
                self.pos += 1;
                op
            }
            _ => {
                return match left {
                    Operand::Column(name) => Ok(Expr::Truthy(name)),
                    Operand::Literal(_) => Err(self.error_at(position, "a value alone is not a condition")),
                };
            }
        };

        let right_position = self.here();
        let right = match self.next() {
            Some(Token {
                kind: TokenKind::Column { name, method: None },
                ..
            }) => Operand::Column(name),
            Some(Token {
                kind: TokenKind::Literal(value),
                ..
            }) => Operand::Literal(value),
            Some(token) => return Err(self.error_at(token.position, format!("unexpected {}", token.kind))),
            None => return Err(self.error_at(right_position, "expected a column or value after comparison")),
        };

        match (left, right) {
            (Operand::Column(column), value) => Ok(Self::comparison(column, op, value)),
            (Operand::Literal(value), Operand::Column(column)) => {
                Ok(Self::comparison(column, op.flipped(), Operand::Literal(value)))
            }
            (Operand::Literal(_), Operand::Literal(_)) => {
                Err(self.error_at(position, "comparison needs at least one column"))
            }
        }
    }

    /// `== null` and `!= null` test nullness
    fn comparison(column: String, op: CompareOp, value: Operand<String>) -> Expr<String> {
        match (&value, op) {
            (Operand::Literal(Scalar::Null), CompareOp::Eq) => Expr::Null {
                column,
                negated: false,
            },
            (Operand::Literal(Scalar::Null), CompareOp::Ne) => Expr::Null {
                column,
                negated: true,
            },
            _ => Expr::Compare { column, op, value },
        }
    }

    fn parse_method(&mut self, column: String, method: &str) -> Result<Expr<String>> {
        let open = self.here();
        if !self.eat(&TokenKind::LParen) {
            return Err(self.error_at(open, "expected '('"));
        }

        let expr = match method {
            "isnull" | "isna" => Expr::Null {
                column,
                negated: false,
            },
            "notnull" | "notna" => Expr::Null {
                column,
                negated: true,
            },
            _ => {
                let op = match method {
                    "str.contains" => TextOp::Contains,
                    "str.startswith" => TextOp::StartsWith,
                    _ => TextOp::EndsWith,
                };
                let pattern = match self.next() {
                    Some(Token {
                        kind: TokenKind::Literal(Scalar::Str(pattern)),
                        ..
                    }) => pattern,
                    _ => return Err(self.error_at(open, format!("{}() takes one quoted string", method))),
                };
                Expr::Text {
                    column,
                    op,
                    pattern,
                }
            }
        };

        if !self.eat(&TokenKind::RParen) {
            return Err(self.error_at(self.here(), "expected ')'"));
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> TabularDataset {
        TabularDataset::from_rows(
            vec!["name".into(), "active".into(), "score".into(), "Detail.en.Title".into()],
            vec![
                vec![Scalar::Str("A".into()), Scalar::Bool(true), Scalar::Int(10), Scalar::Str("Hotel Alpha".into())],
                vec![Scalar::Str("B".into()), Scalar::Bool(false), Scalar::Float(2.5), Scalar::Null],
                vec![Scalar::Str("C".into()), Scalar::Bool(true), Scalar::Null, Scalar::Str("Camping".into())],
            ],
        )
    }

    fn matching(condition: &str) -> Vec<String> {
        let ds = dataset();
        let cond = Condition::compile(condition, &ds).unwrap();
        ds.rows()
            .iter()
            .filter(|row| cond.matches(row))
            .map(|row| row[0].to_string())
            .collect()
    }

    #[test]
    fn test_boolean_equality() {
        assert_eq!(matching("active == True"), vec!["A", "C"]);
        assert_eq!(matching("active"), vec!["A", "C"]);
        assert_eq!(matching("~active"), vec!["B"]);
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(matching("score > 5"), vec!["A"]);
        assert_eq!(matching("score <= 10"), vec!["A", "B"]);
        assert_eq!(matching("score == 2.5"), vec!["B"]);
        assert_eq!(matching("score == 10.0"), vec!["A"]);
        assert_eq!(matching("5 < score"), vec!["A"]);
        // null never satisfies an ordering comparison
        assert_eq!(matching("score < 100 | score >= 100"), vec!["A", "B"]);
    }

    #[test]
    fn test_null_tests() {
        assert_eq!(matching("score == None"), vec!["C"]);
        assert_eq!(matching("score != null"), vec!["A", "B"]);
        assert_eq!(matching("`Detail.en.Title`.isnull()"), vec!["B"]);
        assert_eq!(matching("Detail.en.Title.notnull()"), vec!["A", "C"]);
    }

    #[test]
    fn test_combinators_and_precedence() {
        assert_eq!(matching("active == True & name != 'A'"), vec!["C"]);
        assert_eq!(matching("name == 'B' | name == 'C' & active"), vec!["B", "C"]);
        assert_eq!(matching("(name == 'B' or name == 'C') and active"), vec!["C"]);
        assert_eq!(matching("not (score > 5)"), vec!["B", "C"]);
        assert_eq!(matching("active && !(name == \"A\")"), vec!["C"]);
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(matching("Detail.en.Title.str.contains('Hotel')"), vec!["A"]);
        assert_eq!(matching("name.str.startswith(\"B\")"), vec!["B"]);
        assert_eq!(matching("Detail.en.Title.str.endswith('ing')"), vec!["C"]);
        assert_eq!(matching("name >= 'B'"), vec!["B", "C"]);
    }

    #[test]
    fn test_mismatched_types_are_false() {
        assert!(matching("name > 3").is_empty());
        assert!(matching("active == 1").is_empty());
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let err = Condition::compile("nme == 'A'", &dataset()).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "nme"));
    }

    #[test]
    fn test_parse_errors_carry_position() {
        for (input, position) in [
            ("name = 'A'", 5),
            ("name == 'A' &", 13),
            ("(active", 7),
            ("name == 'A", 8),
            ("__import__('os').system('x')", 0),
            ("", 0),
            ("3 == 3", 0),
            ("name == 'A' name", 12),
        ] {
            match parse(input) {
                Err(Error::InvalidCondition { position: p, .. }) => {
                    assert_eq!(p, position, "input: {}", input)
                }
                other => panic!("expected parse error for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn test_negative_numbers() {
        assert_eq!(
            parse("score > -1.5").unwrap(),
            Expr::Compare {
                column: "score".into(),
                op: CompareOp::Gt,
                value: Operand::Literal(Scalar::Float(-1.5)),
            }
        );
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        for input in [
            format!("{}active", "!".repeat(100_000)),
            format!("{}active", "not ".repeat(1_000)),
            format!("{}active{}", "(".repeat(100_000), ")".repeat(100_000)),
            vec!["active"; 10_000].join(" & "),
        ] {
            match parse(&input) {
                Err(Error::InvalidCondition { message, .. }) => {
                    assert_eq!(message, "expression nested too deeply")
                }
                other => panic!("expected nesting error, got {:?}", other.map(|_| ())),
            }
        }

        let shallow = format!("{}active", "~".repeat(MAX_DEPTH - 1));
        assert!(Condition::compile(&shallow, &dataset()).is_ok());
        assert_eq!(matching(&format!("(((({}))))", vec!["active"; 8].join(" & "))), vec!["A", "C"]);
    }
}
