//! Row-filter condition expressions (§9 "Expression evaluation").
//!
//! A `Table` may carry an optional filter condition that decides whether a
//! row belongs to the replicated stream. Conditions are written over a
//! closed set of session attributes (`os_user_name`, `machine_name`, ...)
//! and evaluated with no other input than those attributes — there is no
//! column-value access here, matching what the source actually evaluates
//! condition expressions against.

use std::fmt;

/// Recognized session-attribute keys a condition can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAttr {
    Version,
    OsUserName,
    MachineName,
    ClientInfo,
}

impl SessionAttr {
    fn from_ident(s: &str) -> Option<Self> {
        Some(match s {
            "version" => SessionAttr::Version,
            "os_user_name" => SessionAttr::OsUserName,
            "machine_name" => SessionAttr::MachineName,
            "client_info" => SessionAttr::ClientInfo,
            _ => return None,
        })
    }
}

/// The attribute values a condition is evaluated against, one per
/// recognized key. Absent values never match a literal (`None != anything`,
/// including the empty string).
#[derive(Debug, Clone, Default)]
pub struct SessionAttrs {
    pub version: Option<String>,
    pub os_user_name: Option<String>,
    pub machine_name: Option<String>,
    pub client_info: Option<String>,
}

impl SessionAttrs {
    fn get(&self, attr: SessionAttr) -> Option<&str> {
        match attr {
            SessionAttr::Version => self.version.as_deref(),
            SessionAttr::OsUserName => self.os_user_name.as_deref(),
            SessionAttr::MachineName => self.machine_name.as_deref(),
            SessionAttr::ClientInfo => self.client_info.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    SessionAttr(SessionAttr),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(Value, Value),
    Neq(Value, Value),
}

impl Expr {
    /// An input-free fold over the attribute set: no column data, just the
    /// session attributes a `5.19`/`5.20` vector populated.
    pub fn eval(&self, attrs: &SessionAttrs) -> bool {
        match self {
            Expr::And(l, r) => l.eval(attrs) && r.eval(attrs),
            Expr::Or(l, r) => l.eval(attrs) || r.eval(attrs),
            Expr::Not(e) => !e.eval(attrs),
            Expr::Eq(l, r) => Self::resolve(l, attrs) == Self::resolve(r, attrs),
            Expr::Neq(l, r) => Self::resolve(l, attrs) != Self::resolve(r, attrs),
        }
    }

    fn resolve<'a>(v: &'a Value, attrs: &'a SessionAttrs) -> Option<&'a str> {
        match v {
            Value::SessionAttr(attr) => attrs.get(*attr),
            Value::Literal(s) => Some(s.as_str()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token: {0:?}")]
    UnexpectedToken(String),
    #[error("unrecognised session attribute: {0:?}")]
    UnknownAttr(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("trailing input after a complete expression: {0:?}")]
    TrailingInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Neq,
    Ident(String),
    Str(String),
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

fn tokenize(input: &str) -> Result<Vec<Tok>, ExprError> {
    let mut toks = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                toks.push(Tok::LParen);
                chars.next();
            }
            ')' => {
                toks.push(Tok::RParen);
                chars.next();
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => toks.push(Tok::Neq),
                    _ => return Err(ExprError::UnexpectedToken("!".into())),
                }
            }
            '=' => {
                toks.push(Tok::Eq);
                chars.next();
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    s.push(c);
                }
                if !closed {
                    return Err(ExprError::UnterminatedString);
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                let mut end = i + c.len_utf8();
                chars.next();
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = j + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &input[start..end];
                toks.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    "NOT" => Tok::Not,
                    _ => Tok::Ident(word.to_string()),
                });
            }
            other => return Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(toks)
}

/// Recursive-descent parser over the precedence chain `OR > AND > NOT >
/// comparison`, equivalent to a shunting-yard reduction over the same
/// operator precedence but easier to read as straight-line code.
struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Tok> {
        let t = self.toks.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Tok::Or)) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek(), Some(Tok::And)) {
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Tok::Not)) {
            self.bump();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        match self.bump().ok_or(ExprError::UnexpectedEnd)?.clone() {
            Tok::LParen => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(other.to_string())),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Tok::Ident(name) => {
                let lhs = self.value_from_ident(&name)?;
                let op = self.bump().ok_or(ExprError::UnexpectedEnd)?.clone();
                let rhs_tok = self.bump().ok_or(ExprError::UnexpectedEnd)?.clone();
                let rhs = self.value_from_tok(rhs_tok)?;
                match op {
                    Tok::Eq => Ok(Expr::Eq(lhs, rhs)),
                    Tok::Neq => Ok(Expr::Neq(lhs, rhs)),
                    other => Err(ExprError::UnexpectedToken(other.to_string())),
                }
            }
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }

    fn value_from_ident(&self, name: &str) -> Result<Value, ExprError> {
        SessionAttr::from_ident(name)
            .map(Value::SessionAttr)
            .ok_or_else(|| ExprError::UnknownAttr(name.to_string()))
    }

    fn value_from_tok(&self, tok: Tok) -> Result<Value, ExprError> {
        match tok {
            Tok::Str(s) => Ok(Value::Literal(s)),
            Tok::Ident(name) => self.value_from_ident(&name),
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
}

/// Parses a filter condition, e.g. `os_user_name = 'APP' AND NOT (machine_name != 'box1')`.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let toks = tokenize(input)?;
    let mut parser = Parser { toks: &toks, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != toks.len() {
        let rest = toks[parser.pos..].iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" ");
        return Err(ExprError::TrailingInput(rest));
    }
    Ok(expr)
}
