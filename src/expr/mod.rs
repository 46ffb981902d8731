//! Inline expression engine.
//!
//! Expressions pass through four stages: [`token::tokenize`] splits the raw
//! text, [`parser::parse`] builds an untyped [`Syntax`] tree, the
//! [`Compiler`] resolves references against a [`Namespace`] and fixes static
//! types, and the resulting [`Expression`] is evaluated against a
//! [`RuntimeContext`] once per event.

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod compiler;
pub mod context;
pub mod expression;
pub mod namespace;
pub mod parser;
pub mod token;
pub mod value;

pub use ast::Syntax;
pub use cache::{CacheContext, CacheSlot, CachingStrategy, ReferenceCache, SessionCache};
pub use compiler::Compiler;
pub use context::{RuntimeContext, Variables};
pub use expression::{ExprNode, Expression, ReferenceCall, evaluate};
pub use namespace::{
    BUILTINS, Generated, GeneratorFn, HandlerFactory, Member, MemberKind, Namespace, ReferenceFn,
    ReferenceKind, Scope,
};
pub use parser::{parse, parse_str};
pub use token::{Operator, Token, TokenKind, tokenize};
pub use value::{Value, ValueType};
