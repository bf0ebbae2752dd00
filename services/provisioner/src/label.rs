//! Label expressions.
//!
//! Build requests ask for capacity by label expression; templates advertise a
//! whitespace-separated set of labels. Supported syntax, from lowest to
//! highest precedence:
//!
//! ```text
//! a <-> b     iff
//! a -> b      implies
//! a || b      or
//! a && b      and
//! !a          not
//! (a), "a b"  grouping, quoted atom
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("empty label expression")]
    Empty,

    #[error("unexpected {found} at offset {offset}")]
    Unexpected { found: String, offset: usize },

    #[error("unterminated quote at offset {0}")]
    UnterminatedQuote(usize),
}

/// A parsed label expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelExpr {
    Atom(String),
    Not(Box<LabelExpr>),
    And(Box<LabelExpr>, Box<LabelExpr>),
    Or(Box<LabelExpr>, Box<LabelExpr>),
    Implies(Box<LabelExpr>, Box<LabelExpr>),
    Iff(Box<LabelExpr>, Box<LabelExpr>),
}

impl LabelExpr {
    pub fn parse(source: &str) -> Result<Self, LabelError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(LabelError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.iff()?;
        match parser.peek() {
            None => Ok(expr),
            Some((token, offset)) => Err(LabelError::Unexpected {
                found: token.to_string(),
                offset: *offset,
            }),
        }
    }

    /// Evaluate against a set of labels.
    pub fn matches(&self, labels: &BTreeSet<String>) -> bool {
        match self {
            LabelExpr::Atom(name) => labels.contains(name),
            LabelExpr::Not(inner) => !inner.matches(labels),
            LabelExpr::And(a, b) => a.matches(labels) && b.matches(labels),
            LabelExpr::Or(a, b) => a.matches(labels) || b.matches(labels),
            LabelExpr::Implies(a, b) => !a.matches(labels) || b.matches(labels),
            LabelExpr::Iff(a, b) => a.matches(labels) == b.matches(labels),
        }
    }
}

impl FromStr for LabelExpr {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LabelExpr::parse(s)
    }
}

impl fmt::Display for LabelExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelExpr::Atom(name) if name.chars().any(is_reserved) => write!(f, "\"{name}\""),
            LabelExpr::Atom(name) => write!(f, "{name}"),
            LabelExpr::Not(inner) => write!(f, "!{inner}"),
            LabelExpr::And(a, b) => write!(f, "({a} && {b})"),
            LabelExpr::Or(a, b) => write!(f, "({a} || {b})"),
            LabelExpr::Implies(a, b) => write!(f, "({a} -> {b})"),
            LabelExpr::Iff(a, b) => write!(f, "({a} <-> {b})"),
        }
    }
}

/// Split a template's label string into its label set.
pub fn label_set(labels: &str) -> BTreeSet<String> {
    labels.split_whitespace().map(str::to_string).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Atom(String),
    Not,
    And,
    Or,
    Implies,
    Iff,
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Atom(name) => write!(f, "label '{name}'"),
            Token::Not => write!(f, "'!'"),
            Token::And => write!(f, "'&&'"),
            Token::Or => write!(f, "'||'"),
            Token::Implies => write!(f, "'->'"),
            Token::Iff => write!(f, "'<->'"),
            Token::Open => write!(f, "'('"),
            Token::Close => write!(f, "')'"),
        }
    }
}

fn is_reserved(c: char) -> bool {
    c.is_whitespace() || matches!(c, '!' | '&' | '|' | '(' | ')' | '<' | '>' | '"')
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, LabelError> {
    let mut tokens = Vec::new();
    let mut rest = source;

    while let Some(c) = rest.chars().next() {
        let offset = source.len() - rest.len();

        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        let (token, len) = if rest.starts_with("<->") {
            (Token::Iff, 3)
        } else if rest.starts_with("->") {
            (Token::Implies, 2)
        } else if rest.starts_with("&&") {
            (Token::And, 2)
        } else if rest.starts_with("||") {
            (Token::Or, 2)
        } else if c == '!' {
            (Token::Not, 1)
        } else if c == '(' {
            (Token::Open, 1)
        } else if c == ')' {
            (Token::Close, 1)
        } else if c == '"' {
            let end = rest[1..]
                .find('"')
                .ok_or(LabelError::UnterminatedQuote(offset))?;
            (Token::Atom(rest[1..=end].to_string()), end + 2)
        } else if is_reserved(c) {
            return Err(LabelError::Unexpected {
                found: format!("'{c}'"),
                offset,
            });
        } else {
            let len = atom_len(rest);
            (Token::Atom(rest[..len].to_string()), len)
        };

        tokens.push((token, offset));
        rest = &rest[len..];
    }

    Ok(tokens)
}

/// Length of a bare atom; a dash is part of the atom unless it starts `->`.
fn atom_len(rest: &str) -> usize {
    let mut len = 0;
    for (idx, c) in rest.char_indices() {
        if is_reserved(c) || rest[idx..].starts_with("->") {
            break;
        }
        len = idx + c.len_utf8();
    }
    len
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek().map(|(t, _)| t) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> LabelError {
        match self.peek() {
            Some((token, offset)) => LabelError::Unexpected {
                found: token.to_string(),
                offset: *offset,
            },
            None => LabelError::Unexpected {
                found: "end of expression".to_string(),
                offset: self.tokens.last().map(|(_, o)| *o + 1).unwrap_or(0),
            },
        }
    }

    fn iff(&mut self) -> Result<LabelExpr, LabelError> {
        let mut lhs = self.implies()?;
        while self.eat(&Token::Iff) {
            lhs = LabelExpr::Iff(Box::new(lhs), Box::new(self.implies()?));
        }
        Ok(lhs)
    }

    fn implies(&mut self) -> Result<LabelExpr, LabelError> {
        let mut lhs = self.or()?;
        while self.eat(&Token::Implies) {
            lhs = LabelExpr::Implies(Box::new(lhs), Box::new(self.or()?));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<LabelExpr, LabelError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            lhs = LabelExpr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<LabelExpr, LabelError> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            lhs = LabelExpr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<LabelExpr, LabelError> {
        if self.eat(&Token::Not) {
            return Ok(LabelExpr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Open) {
            let inner = self.iff()?;
            if !self.eat(&Token::Close) {
                return Err(self.unexpected());
            }
            return Ok(inner);
        }
        match self.peek() {
            Some((Token::Atom(name), _)) => {
                let atom = LabelExpr::Atom(name.clone());
                self.pos += 1;
                Ok(atom)
            }
            _ => Err(self.unexpected()),
        }
    }
}
