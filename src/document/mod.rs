//! S-expression flow documents.
//!
//! A document is a sequence of top-level forms, `(roles ...)` and
//! `(tree ...)`. The reader only checks well-formedness; meaning is given by
//! [`crate::flow::load`].

/// Byte level reader.
pub mod reader;

pub use reader::read_document;

use std::fmt;

/// Generic S-expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    /// A bare symbol.
    Symbol(String),
    /// Keyword token (leading colon).
    Keyword(String),
    /// String literal.
    String(String),
    /// Signed integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Nested list.
    List(Vec<Sexpr>),
}

impl Sexpr {
    /// Items of a list.
    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this is a list headed by the symbol `head`.
    pub fn is_form(&self, head: &str) -> bool {
        matches!(self.as_list().and_then(<[Sexpr]>::first), Some(Sexpr::Symbol(sym)) if sym == head)
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(sym) => write!(f, "{}", sym),
            Sexpr::Keyword(kw) => write!(f, ":{}", kw),
            Sexpr::String(s) => write!(f, "{:?}", s),
            Sexpr::Integer(i) => write!(f, "{}", i),
            Sexpr::Float(x) => write!(f, "{}", x),
            Sexpr::Boolean(b) => write!(f, "{}", b),
            Sexpr::List(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parsed document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Top-level forms in order.
    pub forms: Vec<Sexpr>,
    /// Original text, kept for diagnostics.
    pub source: String,
}
