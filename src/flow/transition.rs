//! Transition resolution.
//!
//! Resolving a move from one node to another materialises a [`JumpPoint`]:
//! the nodes left and entered, their lowest common ancestor and the ordered
//! actions to run. Automatic follow-up transitions are resolved into the
//! `next` link of the same jump point instead of restarting from the top, so
//! exit actions are never repeated along a chain.

use serde::{Deserialize, Serialize};

use super::access::{Access, AccessController};
use super::action::Action;
use super::node::{FlowGraph, NodeId};
use crate::error::{ConfigurationError, FlowError};
use crate::expr::Expression;

/// How a transition picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Go to a named node.
    Jump,
    /// Return to an ancestor, the parent by default.
    Back,
    /// Return to the tree that jumped into the current one.
    Caller,
}

impl TransitionKind {
    /// Parse the document spelling.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "jump" => Some(TransitionKind::Jump),
            "back" => Some(TransitionKind::Back),
            "caller" => Some(TransitionKind::Caller),
            _ => None,
        }
    }
}

/// Message to edit instead of sending a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditTarget {
    /// The first message produced by the target.
    First,
    /// The message produced by a named action.
    Named(String),
}

/// Where the message being edited comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditSource {
    /// The last message sent in the chat.
    Last,
    /// The message carrying the pressed button.
    Callback,
}

/// Directives honoured while a transition is executed.
#[derive(Debug)]
pub struct ExecutionOptions {
    /// Boolean guard; a false result cancels the hop.
    pub execute: Option<Expression>,
    /// Edit an existing message rather than sending a new one.
    pub edit: Option<EditTarget>,
    /// Source of the edited message.
    pub edit_source: Option<EditSource>,
    /// Log action failures and keep navigating.
    pub ignore_error: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            execute: None,
            edit: None,
            edit_source: None,
            ignore_error: false,
        }
    }
}

/// Location of a declared transition: the node's own transition, followed
/// `depth` times through its nested follow-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionSite {
    /// Declaring node.
    pub node: NodeId,
    /// Nesting depth below the node's transition.
    pub depth: usize,
}

/// Declared move to another node.
#[derive(Debug)]
pub struct Transition {
    /// Target selection rule.
    pub kind: TransitionKind,
    /// Static target; `None` for parent-back and caller transitions.
    pub target: Option<NodeId>,
    /// Execution directives.
    pub options: ExecutionOptions,
    /// Run between the exit and entry actions of the hop. A jump into
    /// another tree keeps them until the caller is returned to.
    pub actions: Vec<Action>,
    /// Fired from the calling tree once the jumped-to tree returns.
    pub next: Option<Box<Transition>>,
    /// Where the transition is declared; `None` when built by hand.
    pub site: Option<TransitionSite>,
}

impl Transition {
    /// Transition of `kind` to `target` with default options.
    pub fn new(kind: TransitionKind, target: Option<NodeId>) -> Self {
        Self {
            kind,
            target,
            options: ExecutionOptions::default(),
            actions: Vec::new(),
            next: None,
            site: None,
        }
    }

    /// Human readable target, used in outlines.
    pub fn describe(&self, graph: &FlowGraph) -> String {
        let target = self.target.map(|id| graph.node(id).path.clone());
        match (self.kind, target) {
            (TransitionKind::Jump, Some(path)) => path,
            (TransitionKind::Back, Some(path)) => format!("back {}", path),
            (TransitionKind::Back, None) => "back".to_string(),
            (TransitionKind::Caller, _) | (TransitionKind::Jump, None) => "caller".to_string(),
        }
    }
}

/// A tree waiting for a jump to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerFrame {
    /// Tree the jump left.
    pub tree: NodeId,
    /// Jump whose actions and follow-up run on return.
    pub resume: Option<TransitionSite>,
}

/// Position of a session in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Active node.
    pub current: Option<NodeId>,
    /// Trees that jumped into other trees, most recent last.
    pub callers: Vec<CallerFrame>,
}

impl Navigation {
    /// Navigation positioned at `node`.
    pub fn at(node: NodeId) -> Self {
        Self {
            current: Some(node),
            callers: Vec::new(),
        }
    }

    /// Trees on the caller stack, oldest first.
    pub fn caller_trees(&self) -> Vec<NodeId> {
        self.callers.iter().map(|frame| frame.tree).collect()
    }

    /// Record that `hop` was taken.
    pub fn advance(&mut self, graph: &FlowGraph, hop: &JumpPoint<'_>) {
        let from_tree = self.current.map(|id| graph.node(id).tree);
        let to_tree = graph.node(hop.target).tree;
        match hop.via {
            Some(via) => match via.kind {
                TransitionKind::Caller => {
                    self.callers.pop();
                }
                TransitionKind::Back => {}
                TransitionKind::Jump => {
                    if let Some(from_tree) = from_tree.filter(|tree| *tree != to_tree) {
                        self.callers.push(CallerFrame {
                            tree: from_tree,
                            resume: via.site,
                        });
                    }
                }
            },
            // A tree entered from scratch interrupts every pending return.
            None if hop.lca.is_none() => self.callers.clear(),
            None => {}
        }
        // Returning into a tree already on the stack unwinds it.
        if let Some(index) = self.callers.iter().position(|frame| frame.tree == to_tree) {
            self.callers.truncate(index);
        }
        self.current = Some(hop.target);
    }
}

/// Materialised transition.
#[derive(Debug)]
pub struct JumpPoint<'g> {
    /// Node navigation leaves; `None` for a fresh session.
    pub from: Option<NodeId>,
    /// Nodes left, innermost first.
    pub exit: Vec<NodeId>,
    /// Lowest common ancestor of `from` and `target`.
    pub lca: Option<NodeId>,
    /// Nodes entered, outermost first.
    pub enter: Vec<NodeId>,
    /// Destination.
    pub target: NodeId,
    /// Transition that produced this hop.
    pub via: Option<&'g Transition>,
    /// Jump completed by this return hop.
    pub resumed: Option<&'g Transition>,
    /// Actions in execution order.
    pub actions: Vec<&'g Action>,
    /// Automatic follow-up hop.
    pub next: Option<Box<JumpPoint<'g>>>,
    exiting: usize,
    entering: usize,
}

impl<'g> JumpPoint<'g> {
    /// Actions of the nodes left by this hop.
    pub fn exit_actions(&self) -> &[&'g Action] {
        &self.actions[..self.exiting]
    }

    /// Actions declared on the transition itself, then those of the jump
    /// being returned from.
    pub fn transition_actions(&self) -> &[&'g Action] {
        &self.actions[self.exiting..self.entering]
    }

    /// Actions of the nodes entered, or the re-entry actions of the target.
    pub fn entry_actions(&self) -> &[&'g Action] {
        &self.actions[self.entering..]
    }

    /// This hop followed by every chained hop.
    pub fn hops(&self) -> Vec<&JumpPoint<'g>> {
        let mut hops = vec![self];
        let mut current = self;
        while let Some(next) = current.next.as_deref() {
            hops.push(next);
            current = next;
        }
        hops
    }

    /// Destination of the last hop.
    pub fn final_target(&self) -> NodeId {
        self.hops().last().map_or(self.target, |hop| hop.target)
    }

    /// Actions of the whole chain in execution order.
    pub fn all_actions(&self) -> Vec<&'g Action> {
        self.hops()
            .into_iter()
            .flat_map(|hop| hop.actions.iter().copied())
            .collect()
    }
}

/// Computes jump points over a graph.
#[derive(Debug, Clone)]
pub struct Resolver<'g> {
    graph: &'g FlowGraph,
    limit: usize,
    gate: Option<Gate<'g>>,
}

#[derive(Debug, Clone)]
struct Gate<'g> {
    controller: AccessController<'g>,
    role: Option<String>,
}

impl<'g> Resolver<'g> {
    /// Resolver following at most `limit` automatic transitions per move.
    pub fn new(graph: &'g FlowGraph, limit: usize) -> Self {
        Self {
            graph,
            limit,
            gate: None,
        }
    }

    /// Check every transition into another tree against `role`. A denied
    /// move goes to the role's fallback tree, or is dropped without one.
    pub fn with_access(mut self, controller: AccessController<'g>, role: Option<&str>) -> Self {
        self.gate = Some(Gate {
            controller,
            role: role.map(str::to_string),
        });
        self
    }

    /// Single hop from `from` to `target`, without follow-ups.
    pub fn jump(
        &self,
        from: Option<NodeId>,
        target: NodeId,
        via: Option<&'g Transition>,
    ) -> JumpPoint<'g> {
        let lca = from.and_then(|from| self.graph.lowest_common_ancestor(from, target));
        self.hop(from, target, lca, via, None)
    }

    /// Move to `target`, following automatic transitions.
    pub fn resolve_to(&self, navigation: &Navigation, target: NodeId) -> Result<JumpPoint<'g>, FlowError> {
        let point = self.jump(navigation.current, target, None);
        self.chain(navigation.clone(), point, 0)
    }

    /// Move to the node called `target_name` as seen from `current`.
    pub fn resolve_transition(
        &self,
        current: NodeId,
        target_name: &str,
    ) -> Result<JumpPoint<'g>, FlowError> {
        let target = self.graph.lookup(Some(current), target_name).ok_or_else(|| {
            FlowError::from(ConfigurationError::UnknownTarget {
                node: self.graph.node(current).path.clone(),
                target: target_name.to_string(),
            })
        })?;
        self.resolve_to(&Navigation::at(current), target)
    }

    /// Enter `tree` from scratch: every node of the current path is left and
    /// the tree itself is entered again, even when it is already active.
    pub fn enter_tree(&self, navigation: &Navigation, tree: NodeId) -> Result<JumpPoint<'g>, FlowError> {
        let point = self.hop(navigation.current, tree, None, None, None);
        self.chain(navigation.clone(), point, 0)
    }

    /// Fire `transition` from the active node.
    ///
    /// `None` when the target tree is denied and there is no fallback.
    pub fn follow(
        &self,
        navigation: &Navigation,
        transition: &'g Transition,
    ) -> Result<Option<JumpPoint<'g>>, FlowError> {
        match self.step(navigation, transition) {
            Some(point) => self.chain(navigation.clone(), point, 0).map(Some),
            None => Ok(None),
        }
    }

    /// Destination of `transition` fired at `navigation`.
    pub fn target_of(&self, transition: &Transition, navigation: &Navigation) -> NodeId {
        let fallback = || {
            navigation
                .current
                .or_else(|| self.graph.trees().first().copied())
                .unwrap_or(NodeId(0))
        };
        match (transition.kind, transition.target) {
            (TransitionKind::Jump | TransitionKind::Back, Some(target)) => target,
            (TransitionKind::Back, None) => navigation
                .current
                .and_then(|id| self.graph.node(id).parent)
                .unwrap_or_else(fallback),
            (TransitionKind::Caller, _) | (TransitionKind::Jump, None) => navigation
                .callers
                .last()
                .map(|frame| frame.tree)
                .or_else(|| self.graph.trees().first().copied())
                .unwrap_or_else(fallback),
        }
    }

    fn step(&self, navigation: &Navigation, transition: &'g Transition) -> Option<JumpPoint<'g>> {
        let target = self.admit(navigation.current, self.target_of(transition, navigation))?;
        let resumed = match transition.kind {
            TransitionKind::Caller => navigation
                .callers
                .last()
                .and_then(|frame| frame.resume)
                .and_then(|site| self.graph.transition_at(site)),
            TransitionKind::Jump | TransitionKind::Back => None,
        };
        let lca = navigation
            .current
            .and_then(|from| self.graph.lowest_common_ancestor(from, target));
        Some(self.hop(navigation.current, target, lca, Some(transition), resumed))
    }

    fn admit(&self, from: Option<NodeId>, target: NodeId) -> Option<NodeId> {
        let Some(gate) = &self.gate else {
            return Some(target);
        };
        let tree = self.graph.node(target).tree;
        if from.is_some_and(|from| self.graph.node(from).tree == tree) {
            return Some(target);
        }
        match gate.controller.check(gate.role.as_deref(), tree) {
            Access::Granted => Some(target),
            Access::Denied { fallback } => fallback,
        }
    }

    fn chain(
        &self,
        mut navigation: Navigation,
        mut point: JumpPoint<'g>,
        depth: usize,
    ) -> Result<JumpPoint<'g>, FlowError> {
        let follow_up = point
            .resumed
            .and_then(|jump| jump.next.as_deref())
            .or_else(|| self.graph.node(point.target).transition.as_ref());
        navigation.advance(self.graph, &point);

        if let Some(transition) = follow_up {
            if depth >= self.limit {
                return Err(FlowError::TransitionChain { limit: self.limit });
            }
            if let Some(next) = self.step(&navigation, transition) {
                point.next = Some(Box::new(self.chain(navigation, next, depth + 1)?));
            }
        }
        Ok(point)
    }

    fn hop(
        &self,
        from: Option<NodeId>,
        target: NodeId,
        lca: Option<NodeId>,
        via: Option<&'g Transition>,
        resumed: Option<&'g Transition>,
    ) -> JumpPoint<'g> {
        let graph = self.graph;
        let exit: Vec<NodeId> = match from {
            Some(from) => graph
                .ancestors(from)
                .into_iter()
                .take_while(|id| Some(*id) != lca)
                .collect(),
            None => Vec::new(),
        };
        let enter: Vec<NodeId> = {
            let mut down: Vec<NodeId> = graph
                .ancestors(target)
                .into_iter()
                .take_while(|id| Some(*id) != lca)
                .collect();
            down.reverse();
            down
        };

        let mut actions: Vec<&'g Action> = exit
            .iter()
            .flat_map(|id| graph.node(*id).exit_actions.iter())
            .collect();
        let exiting = actions.len();
        let crosses_trees = from.is_some_and(|from| graph.node(from).tree != graph.node(target).tree);
        if let Some(via) = via {
            // A jump into another tree runs its actions on return instead.
            if !(via.kind == TransitionKind::Jump && crosses_trees) {
                actions.extend(via.actions.iter());
            }
        }
        if let Some(jump) = resumed {
            actions.extend(jump.actions.iter());
        }
        let entering = actions.len();
        if enter.is_empty() {
            actions.extend(graph.node(target).reentry_actions.iter());
        } else {
            actions.extend(enter.iter().flat_map(|id| graph.node(*id).actions.iter()));
        }

        JumpPoint {
            from,
            exit,
            lca,
            enter,
            target,
            via,
            resumed,
            actions,
            next: None,
            exiting,
            entering,
        }
    }
}

/// Reject automatic transition chains that revisit a node.
pub(crate) fn check_cycles(graph: &FlowGraph) -> Result<(), ConfigurationError> {
    for start in graph.ids() {
        let Some(mut transition) = graph.node(start).transition.as_ref() else {
            continue;
        };
        let mut visited = vec![start];
        let mut current = start;
        loop {
            let target = match (transition.kind, transition.target) {
                (_, Some(target)) => target,
                (TransitionKind::Back, None) => match graph.node(current).parent {
                    Some(parent) => parent,
                    // A tree has no parent; back would land on itself.
                    None => current,
                },
                // Caller targets depend on the session.
                _ => break,
            };
            if visited.contains(&target) {
                return Err(ConfigurationError::CyclicTransition {
                    node: graph.node(start).path.clone(),
                });
            }
            visited.push(target);
            current = target;
            transition = match graph.node(target).transition.as_ref() {
                Some(next) => next,
                None => break,
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowNode, TreeSpec};

    #[test]
    fn hand_built_transitions_propagate_errors() {
        assert!(!Transition::new(TransitionKind::Jump, None).options.ignore_error);
    }

    #[test]
    fn back_from_a_tree_is_a_cycle() {
        let mut graph = FlowGraph::new();
        let main = graph.insert(FlowNode::tree("Main", TreeSpec::default()), None).unwrap();
        graph.node_mut(main).transition = Some(Transition::new(TransitionKind::Back, None));
        assert!(matches!(
            check_cycles(&graph),
            Err(ConfigurationError::CyclicTransition { .. })
        ));
    }

    #[test]
    fn tree_entry_forgets_callers() {
        let mut graph = FlowGraph::new();
        let a = graph.insert(FlowNode::tree("A", TreeSpec::default()), None).unwrap();
        let b = graph.insert(FlowNode::tree("B", TreeSpec::default()), None).unwrap();
        let resolver = Resolver::new(&graph, 4);
        let mut navigation = Navigation::at(a);
        navigation.callers.push(CallerFrame { tree: b, resume: None });

        let point = resolver.enter_tree(&navigation, b).unwrap();
        navigation.advance(&graph, &point);
        assert!(navigation.callers.is_empty());
        assert_eq!(navigation.current, Some(b));
    }
}
