//! Grove – a declarative runtime for conversational flows
//!
//! A flow document describes named trees, their branches and the
//! transitions between them, with inline expressions computing values from
//! the incoming event, session variables and handler objects. The crate
//! provides:
//! - An expression engine: tokenizer, parser, typed compiler and
//!   per-session reference caching
//! - A flow state machine: arena graph, transition resolution through the
//!   lowest common ancestor, and role gated access
//! - A document reader and loader that validates everything up front
//! - A session runtime driving the state machine one event at a time

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime configuration
pub mod config;
/// S-expression flow documents
pub mod document;
/// Error types
pub mod error;
/// Inline expression engine
pub mod expr;
/// Flow graph, transitions and sessions
pub mod flow;

pub use config::FlowConfig;
pub use error::{
    ConfigurationError, EvaluationError, FlowError, LexError, LoadError, ParseError,
    ParseErrorCode, Result,
};
pub use expr::{Expression, Namespace, RuntimeContext, Value, ValueType, evaluate};
pub use flow::{Event, FlowGraph, Outcome, Session, SessionRegistry, load};

/// Current version of the grove runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
