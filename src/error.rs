//! Error types for the grove runtime
//!
//! Lexing, parsing and configuration failures are load-time errors and abort
//! loading with the offending node attached. Evaluation and flow errors are
//! surfaced per event; the session stays usable afterwards.

use thiserror::Error;

use crate::expr::ValueType;

/// Why the tokenizer rejected an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorReason {
    /// A string literal was opened but never closed
    #[error("unterminated string literal")]
    UnterminatedString,

    /// A character that starts no token
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(char),

    /// Digits that do not form a valid integer or float
    #[error("malformed number '{0}'")]
    MalformedNumber(String),

    /// Reference argument list without a closing parenthesis
    #[error("unterminated argument list")]
    UnterminatedArguments,

    /// `#` or `::` not followed by a member name
    #[error("missing reference name")]
    MissingReferenceName,

    /// A bare word that is neither a keyword, an operator nor an owner
    #[error("unexpected identifier '{0}'")]
    UnexpectedIdentifier(String),

    /// Unsupported escape sequence inside a string literal
    #[error("unknown escape '\\{0}'")]
    InvalidEscape(char),
}

/// Tokenizer failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at byte {position}")]
pub struct LexError {
    /// Byte offset into the raw expression
    pub position: usize,
    /// What went wrong
    pub reason: LexErrorReason,
}

/// Error codes reported by the parser and the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorCode {
    /// Tokenizer failure surfaced through the parser
    #[error("{0}")]
    Lex(LexErrorReason),

    /// Token cannot appear at this position
    #[error("undefined token")]
    UndefinedToken,

    /// Expression ended while a term was expected
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// `(` without a matching `)`
    #[error("unclosed parenthesis")]
    UnclosedParenthesis,

    /// Keyword used where an IF operand was expected
    #[error("illegal argument for IF construction")]
    IllegalIfArgument,

    /// IF guard not followed by DO
    #[error("IF construction missing DO statement")]
    MissingDoStatement,

    /// Right-hand side of `->` is not a reference or generator
    #[error("chain target must be a reference or a generator")]
    IllegalChainTarget,

    /// No member with this name and arity is visible
    #[error("unknown reference '{reference}' with {arity} argument(s)")]
    UnknownReference {
        /// Reference as written (`Owner#name` or `#name`)
        reference: String,
        /// Arity that was looked up
        arity: usize,
    },

    /// More than one visible member matches
    #[error("ambiguous reference '{reference}': {candidates} candidates")]
    AmbiguousReference {
        /// Reference as written
        reference: String,
        /// Number of matching members
        candidates: usize,
    },

    /// An argument's static type does not fit the member's parameter
    #[error("argument {index} of '{reference}' expects {expected}, found {found}")]
    ArgumentMismatch {
        /// Reference as written
        reference: String,
        /// Zero-based argument index (piped values count as index 0)
        index: usize,
        /// Declared parameter type
        expected: ValueType,
        /// Static type of the supplied argument
        found: ValueType,
    },

    /// Static result type does not fit the expected type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type required by the consumer
        expected: ValueType,
        /// Static type of the expression
        found: ValueType,
    },
}

/// Parser or compiler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} at byte {position}")]
pub struct ParseError {
    /// What went wrong
    pub code: ParseErrorCode,
    /// Byte offset of the offending token
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(code: ParseErrorCode, position: usize) -> Self {
        Self { code, position }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            code: ParseErrorCode::Lex(err.reason),
            position: err.position,
        }
    }
}

/// Convenience result alias for parsing and compiling
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Failure while evaluating a compiled expression.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The invoked member returned an error
    #[error("reference '{member}' failed: {source}")]
    Invocation {
        /// Qualified member name
        member: String,
        /// Error raised by the member
        #[source]
        source: anyhow::Error,
    },

    /// A value did not fit the type fixed at compile time
    #[error("expected a value of type {expected}, got {found}")]
    ResultType {
        /// Static type
        expected: ValueType,
        /// Type of the produced value
        found: ValueType,
    },

    /// A conditional guard or boolean operand produced a non-boolean
    #[error("condition produced {found} instead of a boolean")]
    NonBooleanCondition {
        /// Type of the produced value
        found: ValueType,
    },

    /// No IF guard held and there was no ELSE
    #[error("no conditional branch matched and no ELSE was given")]
    NoBranchMatched,

    /// Ordering operator applied to values without an order
    #[error("cannot compare {left} with {right}")]
    Incomparable {
        /// Left operand type
        left: ValueType,
        /// Right operand type
        right: ValueType,
    },
}

/// Convenience result alias for evaluation
pub type EvalResult<T> = std::result::Result<T, EvaluationError>;

/// Invalid flow configuration, detected while loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Transition or fallback names a node that does not exist
    #[error("{node}: unable to find an element called '{target}'")]
    UnknownTarget {
        /// Path of the declaring node
        node: String,
        /// Name that failed to resolve
        target: String,
    },

    /// Role declaration is unusable
    #[error("role '{role}': {reason}")]
    MalformedRole {
        /// Role name
        role: String,
        /// Description of the problem
        reason: String,
    },

    /// Required attribute absent
    #[error("{node}: missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Path of the node
        node: String,
        /// Attribute name
        attribute: String,
    },

    /// Attribute present but unusable
    #[error("{node}: invalid attribute '{attribute}': {reason}")]
    InvalidAttribute {
        /// Path of the node
        node: String,
        /// Attribute name
        attribute: String,
        /// Description of the problem
        reason: String,
    },

    /// Two nodes share a name in the same scope
    #[error("{node}: name '{name}' is already used in this scope")]
    DuplicateName {
        /// Path of the node
        node: String,
        /// Duplicated name
        name: String,
    },

    /// Tree declares a handler that the namespace does not know
    #[error("{node}: no handler registered under '{handler}'")]
    UnknownHandler {
        /// Path of the tree
        node: String,
        /// Handler owner name
        handler: String,
    },

    /// Action calls an invocable that was never registered
    #[error("{node}: no action registered under '{action}'")]
    UnknownAction {
        /// Path of the node
        node: String,
        /// Action name
        action: String,
    },

    /// Automatic transitions loop back on themselves
    #[error("{node}: automatic transitions form a cycle")]
    CyclicTransition {
        /// Path of the node where the chain starts
        node: String,
    },

    /// Branch has no guard, key or callback and can never be selected
    #[error("{node}: branch is unreachable, missing 'when', 'keys' or 'callbacks'")]
    UnreachableBranch {
        /// Path of the branch
        node: String,
    },

    /// Document does not declare a single tree
    #[error("document must declare at least one tree")]
    NoTrees,
}

/// Anything that aborts loading a flow document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document is not well-formed
    #[error("invalid document syntax: {0}")]
    Syntax(String),

    /// An embedded expression failed to lex, parse or type-check
    #[error("{node}: attribute '{attribute}': {source}")]
    Expression {
        /// Path of the node carrying the expression
        node: String,
        /// Attribute holding the expression
        attribute: String,
        /// Underlying failure
        #[source]
        source: ParseError,
    },

    /// Semantic validation failed
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Convenience result alias for loading
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// Failure while processing a single event.
#[derive(Debug, Error)]
pub enum FlowError {
    /// An expression attached to a node failed
    #[error("{node}: {source}")]
    Evaluation {
        /// Path of the node whose expression failed
        node: String,
        /// Underlying failure
        #[source]
        source: EvaluationError,
    },

    /// A registered invocable failed
    #[error("{node}: action '{action}' failed: {source}")]
    Action {
        /// Path of the node owning the action
        node: String,
        /// Action name
        action: String,
        /// Error raised by the invocable
        #[source]
        source: anyhow::Error,
    },

    /// Chained transitions exceeded the configured bound
    #[error("transition chain exceeded {limit} hops")]
    TransitionChain {
        /// Configured limit
        limit: usize,
    },

    /// The graph does not contain what a navigation request refers to
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Result type using FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
