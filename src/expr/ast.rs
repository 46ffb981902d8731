//! Untyped syntax tree.

use serde::{Deserialize, Serialize};

use super::Value;
use super::token::Operator;

/// Untyped expression tree produced by the parser, before name resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Syntax {
    /// Constant value.
    Literal {
        /// The value.
        value: Value,
        /// Byte offset in the source.
        position: usize,
    },
    /// `#name(args)` / `Owner#name(args)`, or a generator when `generator` is set.
    Reference {
        /// Static owner, if written.
        owner: Option<String>,
        /// Member name.
        name: String,
        /// Argument list; `None` when written without parentheses.
        args: Option<Vec<Syntax>>,
        /// `::name` rather than `#name`.
        generator: bool,
        /// Byte offset in the source.
        position: usize,
    },
    /// `IF g DO b (ELSE IF g DO b)* (ELSE e)?`
    Conditional {
        /// Guard/body pairs in source order.
        branches: Vec<(Syntax, Syntax)>,
        /// ELSE body.
        otherwise: Option<Box<Syntax>>,
        /// Byte offset of the first IF.
        position: usize,
    },
    /// Binary operation.
    Operation {
        /// Operator.
        op: Operator,
        /// Left operand.
        left: Box<Syntax>,
        /// Right operand.
        right: Box<Syntax>,
        /// Byte offset of the operator.
        position: usize,
    },
}

impl Syntax {
    /// Byte offset used for diagnostics.
    pub fn position(&self) -> usize {
        match self {
            Syntax::Literal { position, .. }
            | Syntax::Reference { position, .. }
            | Syntax::Conditional { position, .. }
            | Syntax::Operation { position, .. } => *position,
        }
    }
}
