//! Per-conversation runtime.
//!
//! A [`Session`] owns everything mutable about one conversation: its
//! navigation, handler instances, variables and reference caches. The graph,
//! namespace and configuration are shared read-only through `Arc`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::access::{Access, AccessController, RoleProvider};
use super::action::{Action, ActionKind};
use super::event::{Event, UserId};
use super::node::{FlowGraph, NodeId};
use super::transition::{EditSource, EditTarget, JumpPoint, Navigation, Resolver};
use crate::config::FlowConfig;
use crate::error::{EvalResult, EvaluationError, FlowError, Result};
use crate::expr::{Expression, Namespace, RuntimeContext, SessionCache, Value, Variables};

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a handled event left the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing {
    /// Active node after every hop.
    pub at: NodeId,
    /// Edit directive of the last transition that declared one.
    pub edit: Option<EditTarget>,
    /// Source of the edited message.
    pub edit_source: Option<EditSource>,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A tree trigger matched and the tree was entered.
    Entered {
        /// Triggered tree.
        tree: NodeId,
        /// Final position.
        landing: Landing,
    },
    /// A child branch matched.
    Branched {
        /// Selected branch.
        branch: NodeId,
        /// Final position.
        landing: Landing,
    },
    /// No branch matched and the default branch ran.
    Defaulted {
        /// Default branch.
        branch: NodeId,
        /// Final position.
        landing: Landing,
    },
    /// A tree trigger matched but the role may not enter it.
    Denied {
        /// Requested tree.
        tree: NodeId,
        /// Fallback that was entered instead.
        fallback: Option<Landing>,
    },
    /// The first transition's `execute` guard was false; nothing changed.
    Cancelled {
        /// Node the session stayed at.
        at: Option<NodeId>,
    },
    /// Nothing matched.
    Ignored,
}

#[derive(Default)]
struct SessionState {
    navigation: Navigation,
    handlers: HashMap<NodeId, Box<dyn Any + Send>>,
    variables: Variables,
    cache: SessionCache,
}

/// State machine driver for one conversation.
pub struct Session {
    id: SessionId,
    graph: Arc<FlowGraph>,
    namespace: Arc<Namespace>,
    config: Arc<FlowConfig>,
    role: Option<String>,
    state: SessionState,
}

impl Session {
    /// Fresh session positioned nowhere.
    pub fn new(graph: Arc<FlowGraph>, namespace: Arc<Namespace>, config: Arc<FlowConfig>) -> Self {
        Self {
            id: SessionId::new(),
            graph,
            namespace,
            config,
            role: None,
            state: SessionState::default(),
        }
    }

    /// Set the role used for access checks.
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Role used for access checks.
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Change the role.
    pub fn set_role(&mut self, role: Option<String>) {
        self.role = role;
    }

    /// Active node.
    pub fn current(&self) -> Option<NodeId> {
        self.state.navigation.current
    }

    /// Navigation state.
    pub fn navigation(&self) -> &Navigation {
        &self.state.navigation
    }

    /// Path of the active node, e.g. `Main/Settings`.
    pub fn current_path(&self) -> Option<&str> {
        self.current().map(|id| self.graph.node(id).path.as_str())
    }

    /// Session variables.
    pub fn variables(&self) -> &Variables {
        &self.state.variables
    }

    /// Mutable session variables.
    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.state.variables
    }

    /// Reference caches.
    pub fn cache(&self) -> &SessionCache {
        &self.state.cache
    }

    /// Whether a handler instance is alive for `tree`.
    pub fn has_handler(&self, tree: NodeId) -> bool {
        self.state.handlers.contains_key(&tree)
    }

    /// Drop navigation, handlers, variables and caches.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
    }

    /// Process one event.
    pub fn handle(&mut self, event: &Event) -> Result<Outcome> {
        let graph = Arc::clone(&self.graph);
        let controller = AccessController::new(&graph, self.config.guest_level);
        let resolver = Resolver::new(&graph, self.config.max_transition_chain)
            .with_access(controller, self.role.as_deref());
        debug!(session = %self.id, update = event.update_id, "handling event");

        if let Some(tree) = self.triggered_tree(&graph, event)? {
            let access = controller.check(self.role.as_deref(), tree);
            return match access {
                Access::Granted => {
                    info!(session = %self.id, tree = %graph.node(tree).path, "entering tree");
                    let point = resolver.enter_tree(&self.state.navigation, tree)?;
                    Ok(match self.execute(&graph, event, &point)? {
                        Some(landing) => Outcome::Entered { tree, landing },
                        None => self.cancelled(),
                    })
                }
                Access::Denied {
                    fallback: Some(fallback),
                } => {
                    let point = resolver.enter_tree(&self.state.navigation, fallback)?;
                    let landing = self.execute(&graph, event, &point)?;
                    Ok(Outcome::Denied {
                        tree,
                        fallback: landing,
                    })
                }
                Access::Denied { fallback: None } => Ok(Outcome::Denied {
                    tree,
                    fallback: None,
                }),
            };
        }

        let Some(current) = self.state.navigation.current else {
            return Ok(Outcome::Ignored);
        };
        let Some(anchor) = graph.ancestors(current).into_iter().find(|id| {
            let node = graph.node(*id);
            !node.children.is_empty() || node.default.is_some()
        }) else {
            return Ok(Outcome::Ignored);
        };

        for &branch in &graph.node(anchor).children {
            if self.branch_matches(&graph, event, branch, false)? {
                debug!(session = %self.id, branch = %graph.node(branch).path, "branch matched");
                let point = resolver.resolve_to(&self.state.navigation, branch)?;
                return Ok(match self.execute(&graph, event, &point)? {
                    Some(landing) => Outcome::Branched { branch, landing },
                    None => self.cancelled(),
                });
            }
        }

        if let Some(branch) = graph.node(anchor).default {
            if self.branch_matches(&graph, event, branch, true)? {
                debug!(session = %self.id, branch = %graph.node(branch).path, "default branch");
                let point = resolver.resolve_to(&self.state.navigation, branch)?;
                return Ok(match self.execute(&graph, event, &point)? {
                    Some(landing) => Outcome::Defaulted { branch, landing },
                    None => self.cancelled(),
                });
            }
        }

        Ok(Outcome::Ignored)
    }

    fn cancelled(&self) -> Outcome {
        Outcome::Cancelled {
            at: self.state.navigation.current,
        }
    }

    /// First tree, in document order, whose trigger matches.
    fn triggered_tree(&mut self, graph: &FlowGraph, event: &Event) -> Result<Option<NodeId>> {
        let prefix = self.config.command_prefix.as_str();
        let bot = self.config.bot_username.as_deref();
        for &tree in graph.trees() {
            let Some(spec) = graph.node(tree).as_tree() else {
                continue;
            };
            if spec.triggers.matches(event, prefix, bot) {
                return Ok(Some(tree));
            }
            if let Some(predicate) = &spec.predicate {
                let path = self.active_path(graph);
                let hit = evaluate_in(&mut self.state, graph, &self.namespace, event, None, &path, predicate)
                    .and_then(as_flag)
                    .map_err(|source| FlowError::Evaluation {
                        node: graph.node(tree).path.clone(),
                        source,
                    })?;
                if hit {
                    return Ok(Some(tree));
                }
            }
        }
        Ok(None)
    }

    fn branch_matches(
        &mut self,
        graph: &FlowGraph,
        event: &Event,
        branch: NodeId,
        default: bool,
    ) -> Result<bool> {
        let node = graph.node(branch);
        let Some(spec) = node.as_branch() else {
            return Ok(false);
        };
        if spec
            .triggers
            .matches(event, &self.config.command_prefix, self.config.bot_username.as_deref())
        {
            return Ok(true);
        }
        match &spec.when {
            Some(when) => {
                let path = self.active_path(graph);
                evaluate_in(&mut self.state, graph, &self.namespace, event, Some(node.tree), &path, when)
                    .and_then(as_flag)
                    .map_err(|source| FlowError::Evaluation {
                        node: node.path.clone(),
                        source,
                    })
            }
            // A default branch without a guard always applies.
            None => Ok(default),
        }
    }

    fn active_path(&self, graph: &FlowGraph) -> Vec<NodeId> {
        self.state
            .navigation
            .current
            .map(|id| graph.path_to(id))
            .unwrap_or_default()
    }

    /// Run the hops of `point`; commit navigation when all succeeded.
    ///
    /// `execute` guards are evaluated before any action runs. The chain is
    /// cut before the first false guard; when that guard belongs to the
    /// first declared transition nothing runs and `None` is returned.
    fn execute(&mut self, graph: &FlowGraph, event: &Event, point: &JumpPoint<'_>) -> Result<Option<Landing>> {
        let hops = point.hops();
        let mut runnable = hops.len();
        for (index, hop) in hops.iter().enumerate() {
            let Some(execute) = hop.via.and_then(|via| via.options.execute.as_ref()) else {
                continue;
            };
            let origin = hop.from.unwrap_or(hop.target);
            let path = graph.path_to(origin);
            let tree = Some(graph.node(origin).tree);
            let go = evaluate_in(&mut self.state, graph, &self.namespace, event, tree, &path, execute)
                .and_then(as_flag)
                .map_err(|source| FlowError::Evaluation {
                    node: graph.node(origin).path.clone(),
                    source,
                })?;
            if !go {
                debug!(session = %self.id, target = %graph.node(hop.target).path, "transition not executed");
                runnable = index;
                break;
            }
        }
        if runnable < hops.len() && hops[..runnable].iter().all(|hop| hop.via.is_none()) {
            return Ok(None);
        }

        // Handlers of exited trees are parked until the event commits.
        let alive: Vec<NodeId> = self.state.handlers.keys().copied().collect();
        let mut parked = Vec::new();
        let result = self.run_hops(graph, event, &hops[..runnable], &mut parked);
        if result.is_err() {
            self.state.handlers.retain(|tree, _| alive.contains(tree));
            self.state.handlers.extend(parked);
        }
        result
    }

    fn run_hops(
        &mut self,
        graph: &FlowGraph,
        event: &Event,
        hops: &[&JumpPoint<'_>],
        parked: &mut Vec<(NodeId, Box<dyn Any + Send>)>,
    ) -> Result<Option<Landing>> {
        let mut navigation = self.state.navigation.clone();
        let mut landing: Option<Landing> = None;

        for &hop in hops {
            let ignore_error = hop.via.is_some_and(|via| via.options.ignore_error);
            for action in hop.exit_actions().iter().chain(hop.transition_actions()) {
                self.run_action(graph, event, action, ignore_error)?;
            }
            for id in &hop.exit {
                if graph.node(*id).is_tree() {
                    if let Some(handler) = self.state.handlers.remove(id) {
                        parked.push((*id, handler));
                    }
                }
            }
            for action in hop.entry_actions() {
                self.run_action(graph, event, action, ignore_error)?;
            }

            navigation.advance(graph, hop);
            debug!(
                session = %self.id,
                from = ?hop.from.map(|id| graph.node(id).path.as_str()),
                to = %graph.node(hop.target).path,
                "hop"
            );
            let previous = landing.take();
            let (edit, edit_source) = match hop.via.filter(|via| via.options.edit.is_some()) {
                Some(via) => (via.options.edit.clone(), via.options.edit_source),
                None => previous
                    .map(|l| (l.edit, l.edit_source))
                    .unwrap_or_default(),
            };
            landing = Some(Landing {
                at: hop.target,
                edit,
                edit_source,
            });
        }

        if landing.is_some() {
            self.state.navigation = navigation;
        }
        Ok(landing)
    }

    fn run_action(&mut self, graph: &FlowGraph, event: &Event, action: &Action, ignore_error: bool) -> Result<()> {
        let path = graph.path_to(action.node);
        let node_path = || graph.node(action.node).path.clone();

        let result = match &action.when {
            Some(when) => evaluate_in(&mut self.state, graph, &self.namespace, event, Some(action.tree), &path, when)
                .and_then(as_flag)
                .map_err(|source| FlowError::Evaluation {
                    node: node_path(),
                    source,
                }),
            None => Ok(true),
        }
        .and_then(|run| {
            if !run {
                return Ok(());
            }
            match &action.kind {
                ActionKind::Invoke(expr) => {
                    evaluate_in(&mut self.state, graph, &self.namespace, event, Some(action.tree), &path, expr)
                        .map(|_| ())
                        .map_err(|source| FlowError::Evaluation {
                            node: node_path(),
                            source,
                        })
                }
                ActionKind::Call { name, invocable } => {
                    let state = &mut self.state;
                    let handler = handler_slot(&mut state.handlers, graph, &self.namespace, action.tree);
                    let mut ctx = RuntimeContext::new(&mut state.variables, &mut state.cache)
                        .with_event(event)
                        .with_navigation(&path);
                    if let Some(handler) = handler {
                        ctx = ctx.with_handler(handler);
                    }
                    invocable.run(&mut ctx).map_err(|source| FlowError::Action {
                        node: node_path(),
                        action: name.clone(),
                        source,
                    })
                }
                ActionKind::ClearCache => {
                    self.state.cache.clear();
                    Ok(())
                }
            }
        });

        match result {
            Err(err) if ignore_error => {
                warn!(session = %self.id, action = %action.label(), error = %err, "ignoring failed action");
                Ok(())
            }
            other => other,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("navigation", &self.state.navigation)
            .field("handlers", &self.state.handlers.len())
            .finish()
    }
}

fn as_flag(value: Value) -> EvalResult<bool> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(EvaluationError::NonBooleanCondition {
            found: other.value_type(),
        }),
    }
}

fn handler_slot<'s>(
    handlers: &'s mut HashMap<NodeId, Box<dyn Any + Send>>,
    graph: &FlowGraph,
    namespace: &Namespace,
    tree: NodeId,
) -> Option<&'s mut (dyn Any + Send + 'static)> {
    let owner = graph.node(tree).handler()?;
    match handlers.entry(tree) {
        Entry::Occupied(entry) => Some(&mut **entry.into_mut()),
        Entry::Vacant(entry) => {
            let instance = namespace.instantiate(owner)?;
            Some(&mut **entry.insert(instance))
        }
    }
}

fn evaluate_in(
    state: &mut SessionState,
    graph: &FlowGraph,
    namespace: &Namespace,
    event: &Event,
    tree: Option<NodeId>,
    path: &[NodeId],
    expression: &Expression,
) -> EvalResult<Value> {
    let handler = match tree {
        Some(tree) => handler_slot(&mut state.handlers, graph, namespace, tree),
        None => None,
    };
    let mut ctx = RuntimeContext::new(&mut state.variables, &mut state.cache)
        .with_event(event)
        .with_navigation(path);
    if let Some(handler) = handler {
        ctx = ctx.with_handler(handler);
    }
    expression.evaluate(&mut ctx)
}

/// Sessions keyed by user, each behind its own lock so that different
/// users are served in parallel.
pub struct SessionRegistry {
    graph: Arc<FlowGraph>,
    namespace: Arc<Namespace>,
    config: Arc<FlowConfig>,
    roles: Option<Arc<dyn RoleProvider>>,
    sessions: Mutex<HashMap<UserId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    /// Registry creating sessions over the given graph.
    pub fn new(graph: Arc<FlowGraph>, namespace: Arc<Namespace>, config: Arc<FlowConfig>) -> Self {
        Self {
            graph,
            namespace,
            config,
            roles: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Use `provider` to assign roles to new sessions.
    pub fn with_roles(mut self, provider: impl RoleProvider + 'static) -> Self {
        self.roles = Some(Arc::new(provider));
        self
    }

    /// Session of `user`, created on first use.
    pub fn session(&self, user: UserId) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock();
        Arc::clone(sessions.entry(user).or_insert_with(|| {
            let role = self.roles.as_ref().and_then(|provider| provider.role_for(&user));
            debug!(user = %user, role = ?role, "creating session");
            let session = Session::new(
                Arc::clone(&self.graph),
                Arc::clone(&self.namespace),
                Arc::clone(&self.config),
            )
            .with_role(role);
            Arc::new(Mutex::new(session))
        }))
    }

    /// Route `event` to its user's session.
    pub fn dispatch(&self, event: &Event) -> Result<Outcome> {
        let session = self.session(event.user);
        let mut session = session.lock();
        session.handle(event)
    }

    /// Forget the session of `user`.
    pub fn remove(&self, user: UserId) -> bool {
        self.sessions.lock().remove(&user).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// True when no session exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}
