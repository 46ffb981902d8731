//! Side effects attached to nodes and transitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::node::NodeId;
use crate::expr::{Expression, RuntimeContext};

/// External side effect run along a jump point.
pub trait Invocable: Send + Sync {
    /// Perform the effect. The event being handled is `ctx.event`.
    fn run(&self, ctx: &mut RuntimeContext<'_>) -> anyhow::Result<()>;
}

impl<F> Invocable for F
where
    F: Fn(&mut RuntimeContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, ctx: &mut RuntimeContext<'_>) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Invocables addressable from documents by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Invocable>>,
}

impl ActionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `invocable` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, invocable: impl Invocable + 'static) -> &mut Self {
        self.actions.insert(name.into(), Arc::new(invocable));
        self
    }

    /// Invocable registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Invocable>> {
        self.actions.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

/// What an action does.
pub enum ActionKind {
    /// Evaluate an expression for its side effects.
    Invoke(Expression),
    /// Run a registered invocable.
    Call {
        /// Registered name.
        name: String,
        /// Resolved invocable.
        invocable: Arc<dyn Invocable>,
    },
    /// Drop every cached reference result of the session.
    ClearCache,
}

/// An action bound to the node that declares it.
pub struct Action {
    /// Effect.
    pub kind: ActionKind,
    /// Optional guard; the action is skipped when it is false.
    pub when: Option<Expression>,
    /// Declaring node.
    pub node: NodeId,
    /// Tree whose handler is active while the action runs.
    pub tree: NodeId,
}

impl Action {
    /// Short description, e.g. `call send` or `invoke #greet()`.
    pub fn label(&self) -> String {
        match &self.kind {
            ActionKind::Invoke(expr) => format!("invoke {}", expr.source().unwrap_or("<expr>")),
            ActionKind::Call { name, .. } => format!("call {}", name),
            ActionKind::ClearCache => "clear-cache".to_string(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("label", &self.label())
            .field("guarded", &self.when.is_some())
            .field("node", &self.node)
            .finish()
    }
}
