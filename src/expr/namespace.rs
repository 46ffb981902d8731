//! Name resolution table for expression references.
//!
//! Members are registered once, before any document is loaded, and looked up
//! by `(owner, name, arity)`. Instance members run against the active handler
//! object of the session; static members run without one.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use super::cache::CachingStrategy;
use super::context::RuntimeContext;
use super::token::{GENERATOR_START, REFERENCE_START};
use super::{Value, ValueType};
use crate::error::ParseErrorCode;

/// Owner under which the builtin members are registered.
pub const BUILTINS: &str = "Builtins";

/// Callable body of a plain member.
pub type ReferenceFn =
    Arc<dyn Fn(&mut RuntimeContext<'_>, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// Second stage of a generator: consumes the piped input.
pub type Generated =
    Box<dyn FnOnce(&mut RuntimeContext<'_>, Value) -> anyhow::Result<Value> + Send>;

/// Callable body of a generator member.
pub type GeneratorFn =
    Arc<dyn Fn(&mut RuntimeContext<'_>, &[Value]) -> anyhow::Result<Generated> + Send + Sync>;

/// Creates a fresh handler instance for a session.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Whether a member needs the active handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Runs against the active handler instance.
    Instance,
    /// Runs without a handler.
    Static,
}

/// Which reference syntax a lookup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `#name`
    Reference,
    /// `::name`
    Generator,
}

#[derive(Clone)]
pub(crate) enum MemberBody {
    Function(ReferenceFn),
    Generator(GeneratorFn),
}

/// Descriptor of a registered member.
#[derive(Clone)]
pub struct Member {
    owner: String,
    name: String,
    kind: MemberKind,
    params: Vec<ValueType>,
    returns: ValueType,
    input: ValueType,
    caching: CachingStrategy,
    pub(crate) body: MemberBody,
}

impl Member {
    /// Static member computing a value from its arguments.
    pub fn function<F>(owner: impl Into<String>, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut RuntimeContext<'_>, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::build(owner, name, MemberKind::Static, MemberBody::Function(Arc::new(body)))
    }

    /// Instance member of handler type `H`.
    pub fn method<H, F>(owner: impl Into<String>, name: impl Into<String>, body: F) -> Self
    where
        H: Any,
        F: Fn(&mut H, &mut RuntimeContext<'_>, &[Value]) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let function = move |ctx: &mut RuntimeContext<'_>, args: &[Value]| -> anyhow::Result<Value> {
            let handler = ctx
                .take_handler()
                .ok_or_else(|| anyhow!("no active handler for '{}'", label))?;
            let result = match handler.downcast_mut::<H>() {
                Some(instance) => body(instance, ctx, args),
                None => Err(anyhow!("active handler is not a {}", type_name::<H>())),
            };
            ctx.restore_handler(handler);
            result
        };
        Self::build(owner, name, MemberKind::Instance, MemberBody::Function(Arc::new(function)))
    }

    /// Static generator: the first stage receives the arguments, the
    /// returned closure receives the piped value.
    pub fn generator<F>(owner: impl Into<String>, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut RuntimeContext<'_>, &[Value]) -> anyhow::Result<Generated>
            + Send
            + Sync
            + 'static,
    {
        Self::build(owner, name, MemberKind::Static, MemberBody::Generator(Arc::new(body)))
    }

    fn build(
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: MemberKind,
        body: MemberBody,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            kind,
            params: Vec::new(),
            returns: ValueType::Any,
            input: ValueType::Any,
            caching: CachingStrategy::None,
            body,
        }
    }

    /// Declare parameter types; the arity is their count.
    pub fn params(mut self, params: &[ValueType]) -> Self {
        self.params = params.to_vec();
        self
    }

    /// Declare the result type.
    pub fn returns(mut self, ty: ValueType) -> Self {
        self.returns = ty;
        self
    }

    /// Declare the type of the value a generator receives through `->`.
    pub fn input(mut self, ty: ValueType) -> Self {
        self.input = ty;
        self
    }

    /// Declare how results may be cached.
    pub fn caching(mut self, strategy: CachingStrategy) -> Self {
        self.caching = strategy;
        self
    }

    /// Owner name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance or static.
    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Parameter types.
    pub fn parameters(&self) -> &[ValueType] {
        &self.params
    }

    /// Number of parameters.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Result type.
    pub fn return_type(&self) -> ValueType {
        self.returns
    }

    /// Piped input type of a generator.
    pub fn input_type(&self) -> ValueType {
        self.input
    }

    /// Caching strategy.
    pub fn caching_strategy(&self) -> CachingStrategy {
        self.caching
    }

    /// True for generator members.
    pub fn is_generator(&self) -> bool {
        matches!(self.body, MemberBody::Generator(_))
    }

    /// `Owner#name` or `Owner::name`.
    pub fn qualified_name(&self) -> String {
        let sep = if self.is_generator() {
            GENERATOR_START
        } else {
            REFERENCE_START
        };
        format!("{}{}{}", self.owner, sep, self.name)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("caching", &self.caching)
            .finish()
    }
}

/// Lookup scope of a compilation: the handler owner of the enclosing tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    /// Owner whose instance members are visible without qualification.
    pub handler: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// Scope without a handler; only builtins and static references resolve.
    pub fn global() -> Self {
        Self { handler: None }
    }

    /// Scope of a tree bound to `handler`.
    pub fn handler(handler: &'a str) -> Self {
        Self {
            handler: Some(handler),
        }
    }
}

/// Registered members and handler factories.
#[derive(Default)]
pub struct Namespace {
    members: HashMap<String, Vec<Arc<Member>>>,
    handlers: HashMap<String, HandlerFactory>,
}

impl Namespace {
    /// Empty namespace without builtins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace preloaded with the builtin members.
    pub fn with_builtins() -> Self {
        let mut namespace = Self::new();
        super::builtins::install(&mut namespace);
        namespace
    }

    /// Add a member.
    pub fn register(&mut self, member: Member) -> &mut Self {
        self.members
            .entry(member.name.clone())
            .or_default()
            .push(Arc::new(member));
        self
    }

    /// Register handler type `H` under `owner`, built with `Default`.
    pub fn handler<H>(&mut self, owner: impl Into<String>) -> &mut Self
    where
        H: Default + Any + Send,
    {
        self.handler_with(owner, H::default)
    }

    /// Register a handler factory under `owner`.
    pub fn handler_with<H, F>(&mut self, owner: impl Into<String>, factory: F) -> &mut Self
    where
        H: Any + Send,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.handlers.insert(
            owner.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn Any + Send>),
        );
        self
    }

    /// Whether a handler factory is registered under `owner`.
    pub fn has_handler(&self, owner: &str) -> bool {
        self.handlers.contains_key(owner)
    }

    /// Create a new handler instance.
    pub fn instantiate(&self, owner: &str) -> Option<Box<dyn Any + Send>> {
        self.handlers.get(owner).map(|factory| factory())
    }

    /// Number of registered members.
    pub fn len(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    /// True when no member is registered.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Find the single member a reference denotes.
    ///
    /// Unqualified references see the instance members of the scope's
    /// handler and the static builtins. Qualified references see only the
    /// named owner's static members.
    pub fn resolve(
        &self,
        scope: &Scope<'_>,
        owner: Option<&str>,
        name: &str,
        arity: usize,
        kind: ReferenceKind,
    ) -> Result<Arc<Member>, ParseErrorCode> {
        let visible = |member: &&Arc<Member>| match owner {
            Some(owner) => member.owner == owner && member.kind == MemberKind::Static,
            None => match member.kind {
                MemberKind::Instance => scope.handler == Some(member.owner.as_str()),
                MemberKind::Static => member.owner == BUILTINS,
            },
        };

        let candidates: Vec<&Arc<Member>> = self
            .members
            .get(name)
            .into_iter()
            .flatten()
            .filter(visible)
            .filter(|member| member.arity() == arity)
            .filter(|member| member.is_generator() == (kind == ReferenceKind::Generator))
            .collect();

        let reference = || {
            let sep = match kind {
                ReferenceKind::Reference => REFERENCE_START,
                ReferenceKind::Generator => GENERATOR_START,
            };
            format!("{}{}{}", owner.unwrap_or(""), sep, name)
        };

        match candidates.as_slice() {
            [single] => Ok(Arc::clone(single)),
            [] => Err(ParseErrorCode::UnknownReference {
                reference: reference(),
                arity,
            }),
            many => Err(ParseErrorCode::AmbiguousReference {
                reference: reference(),
                candidates: many.len(),
            }),
        }
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Namespace")
            .field("members", &self.len())
            .field("handlers", &handlers)
            .finish()
    }
}
