//! Arena graph of trees and branches.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Write as _};

use super::access::RoleGrant;
use super::action::Action;
use super::event::Event;
use super::transition::{Transition, TransitionSite};
use crate::error::ConfigurationError;
use crate::expr::Expression;

/// Index of a node inside its [`FlowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Literal inputs that select a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Triggers {
    /// Command names, without the prefix.
    pub commands: Vec<String>,
    /// Exact message texts.
    pub keys: Vec<String>,
    /// Exact callback data.
    pub callbacks: Vec<String>,
}

impl Triggers {
    /// True when no literal trigger is declared.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.keys.is_empty() && self.callbacks.is_empty()
    }

    /// Whether `event` hits one of the declared triggers.
    pub fn matches(&self, event: &Event, prefix: &str, bot: Option<&str>) -> bool {
        let command = event
            .command(prefix, bot)
            .is_some_and(|name| self.commands.iter().any(|c| c == name));
        let key = event
            .text()
            .is_some_and(|text| self.keys.iter().any(|k| k == text));
        let callback = event
            .callback_data()
            .is_some_and(|data| self.callbacks.iter().any(|c| c == data));
        command || key || callback
    }
}

/// Top-level state.
#[derive(Debug, Default)]
pub struct TreeSpec {
    /// Literal entry triggers.
    pub triggers: Triggers,
    /// Entry predicate; compiled without a handler scope.
    pub predicate: Option<Expression>,
    /// Required access level; absent means 0.
    pub access_level: Option<u32>,
    /// Handler owner instantiated while the tree is active.
    pub handler: Option<String>,
}

/// Guarded sub-state.
#[derive(Debug, Default)]
pub struct BranchSpec {
    /// Keys and callbacks selecting the branch.
    pub triggers: Triggers,
    /// Boolean guard.
    pub when: Option<Expression>,
}

impl BranchSpec {
    /// Whether the branch can ever be selected.
    pub fn is_reachable(&self) -> bool {
        self.when.is_some() || !self.triggers.is_empty()
    }
}

/// Tree or branch payload.
#[derive(Debug)]
pub enum NodeKind {
    /// Top-level state.
    Tree(TreeSpec),
    /// Sub-state.
    Branch(BranchSpec),
}

/// A state of the flow.
#[derive(Debug)]
pub struct FlowNode {
    /// Name, unique within the enclosing tree.
    pub name: String,
    /// Slash separated path from the tree, e.g. `Main/Settings`.
    pub path: String,
    /// Enclosing node; `None` for trees.
    pub parent: Option<NodeId>,
    /// Tree this node belongs to (itself for trees).
    pub tree: NodeId,
    /// Distance from the tree.
    pub depth: usize,
    /// Selectable child branches in declaration order.
    pub children: Vec<NodeId>,
    /// Tree or branch payload.
    pub kind: NodeKind,
    /// Run when the node is entered.
    pub actions: Vec<Action>,
    /// Run when the node is left.
    pub exit_actions: Vec<Action>,
    /// Run when navigation lands on the node without entering it anew.
    pub reentry_actions: Vec<Action>,
    /// Fallback branch used when no child matches.
    pub default: Option<NodeId>,
    /// Transition fired right after the node is entered.
    pub transition: Option<Transition>,
}

impl FlowNode {
    /// Unattached tree node.
    pub fn tree(name: impl Into<String>, spec: TreeSpec) -> Self {
        Self::new(name, NodeKind::Tree(spec))
    }

    /// Unattached branch node.
    pub fn branch(name: impl Into<String>, spec: BranchSpec) -> Self {
        Self::new(name, NodeKind::Branch(spec))
    }

    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            parent: None,
            tree: NodeId(0),
            depth: 0,
            children: Vec::new(),
            kind,
            actions: Vec::new(),
            exit_actions: Vec::new(),
            reentry_actions: Vec::new(),
            default: None,
            transition: None,
        }
    }

    /// True for trees.
    pub fn is_tree(&self) -> bool {
        matches!(self.kind, NodeKind::Tree(_))
    }

    /// Tree payload.
    pub fn as_tree(&self) -> Option<&TreeSpec> {
        match &self.kind {
            NodeKind::Tree(spec) => Some(spec),
            NodeKind::Branch(_) => None,
        }
    }

    /// Branch payload.
    pub fn as_branch(&self) -> Option<&BranchSpec> {
        match &self.kind {
            NodeKind::Branch(spec) => Some(spec),
            NodeKind::Tree(_) => None,
        }
    }

    /// Handler owner of a tree.
    pub fn handler(&self) -> Option<&str> {
        self.as_tree().and_then(|spec| spec.handler.as_deref())
    }

    /// Required access level of a tree; 0 for branches.
    pub fn access_level(&self) -> u32 {
        self.as_tree()
            .and_then(|spec| spec.access_level)
            .unwrap_or(0)
    }
}

/// Immutable graph of every node of a document.
#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
    trees: Vec<NodeId>,
    tree_index: HashMap<String, NodeId>,
    scoped: HashMap<(NodeId, String), NodeId>,
    roles: HashMap<String, RoleGrant>,
}

impl FlowGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node by id.
    ///
    /// # Panics
    /// Panics on an id from another graph.
    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FlowNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a graph without nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Trees in document order.
    pub fn trees(&self) -> &[NodeId] {
        &self.trees
    }

    /// Tree by name.
    pub fn tree_named(&self, name: &str) -> Option<NodeId> {
        self.tree_index.get(name).copied()
    }

    /// Declared role.
    pub fn role(&self, name: &str) -> Option<&RoleGrant> {
        self.roles.get(name)
    }

    /// Declared roles.
    pub fn roles(&self) -> impl Iterator<Item = &RoleGrant> {
        self.roles.values()
    }

    pub(crate) fn add_role(&mut self, role: RoleGrant) -> Result<(), ConfigurationError> {
        if self.roles.contains_key(&role.name) {
            return Err(ConfigurationError::DuplicateName {
                node: "roles".into(),
                name: role.name,
            });
        }
        self.roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Attach `node` below `parent`, or as a new tree when `parent` is `None`.
    pub fn insert(
        &mut self,
        node: FlowNode,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ConfigurationError> {
        self.attach(node, parent, false)
    }

    /// Attach `node` as the default branch of `parent`.
    pub fn insert_default(
        &mut self,
        node: FlowNode,
        parent: NodeId,
    ) -> Result<NodeId, ConfigurationError> {
        if self.node(parent).default.is_some() {
            return Err(ConfigurationError::InvalidAttribute {
                node: self.node(parent).path.clone(),
                attribute: "default".into(),
                reason: "only one default branch is allowed".into(),
            });
        }
        self.attach(node, Some(parent), true)
    }

    fn attach(
        &mut self,
        mut node: FlowNode,
        parent: Option<NodeId>,
        default: bool,
    ) -> Result<NodeId, ConfigurationError> {
        let id = NodeId(self.nodes.len());
        match parent {
            None => {
                if self.tree_index.contains_key(&node.name) {
                    return Err(ConfigurationError::DuplicateName {
                        node: node.name.clone(),
                        name: node.name,
                    });
                }
                node.tree = id;
                node.depth = 0;
                node.path = node.name.clone();
                self.tree_index.insert(node.name.clone(), id);
                self.trees.push(id);
            }
            Some(parent_id) => {
                let parent = self.node(parent_id);
                node.tree = parent.tree;
                node.depth = parent.depth + 1;
                node.path = format!("{}/{}", parent.path, node.name);
                let key = (node.tree, node.name.clone());
                let tree_name = &self.node(node.tree).name;
                if self.scoped.contains_key(&key) || *tree_name == node.name {
                    return Err(ConfigurationError::DuplicateName {
                        node: node.path.clone(),
                        name: node.name,
                    });
                }
                self.scoped.insert(key, id);
            }
        }
        node.parent = parent;
        self.nodes.push(node);

        if let Some(parent_id) = parent {
            let parent = self.node_mut(parent_id);
            if default {
                parent.default = Some(id);
            } else {
                parent.children.push(id);
            }
        }
        Ok(id)
    }

    /// Find a node by name as seen from `scope`.
    ///
    /// Plain names are looked up in the tree of `scope` first, then among
    /// trees. Slash separated paths start at a tree.
    pub fn lookup(&self, scope: Option<NodeId>, name: &str) -> Option<NodeId> {
        if name.contains('/') {
            let mut segments = name.split('/');
            let mut current = self.tree_named(segments.next()?)?;
            for segment in segments {
                let node = self.node(current);
                current = node
                    .children
                    .iter()
                    .chain(node.default.iter())
                    .copied()
                    .find(|child| self.node(*child).name == segment)?;
            }
            return Some(current);
        }

        if let Some(scope) = scope {
            let tree = self.node(scope).tree;
            if let Some(id) = self.scoped.get(&(tree, name.to_string())) {
                return Some(*id);
            }
        }
        self.tree_named(name)
    }

    /// Transition declared at `site`.
    pub fn transition_at(&self, site: TransitionSite) -> Option<&Transition> {
        let mut transition = self.nodes.get(site.node.0)?.transition.as_ref()?;
        for _ in 0..site.depth {
            transition = transition.next.as_deref()?;
        }
        Some(transition)
    }

    /// `id` followed by its ancestors up to the tree.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.node(parent).parent;
        }
        chain
    }

    /// Path from the tree down to `id`, both included.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = self.ancestors(id);
        path.reverse();
        path
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Deepest node that is an ancestor-or-self of both; `None` across trees.
    pub fn lowest_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        if self.node(a).tree != self.node(b).tree {
            return None;
        }
        let seen: HashSet<NodeId> = self.ancestors(a).into_iter().collect();
        self.ancestors(b).into_iter().find(|id| seen.contains(id))
    }

    /// Indented listing of every tree, used by the CLI.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for tree in &self.trees {
            self.outline_node(*tree, &mut out, false);
        }
        out
    }

    fn outline_node(&self, id: NodeId, out: &mut String, default: bool) {
        let node = self.node(id);
        let indent = "  ".repeat(node.depth);
        let label = if node.is_tree() {
            "tree"
        } else if default {
            "default"
        } else {
            "branch"
        };
        let _ = write!(out, "{}{} {}", indent, label, node.name);
        if node.access_level() > 0 {
            let _ = write!(out, " [level {}]", node.access_level());
        }
        if let Some(handler) = node.handler() {
            let _ = write!(out, " <{}>", handler);
        }
        if let Some(transition) = &node.transition {
            let _ = write!(out, " -> {}", transition.describe(self));
        }
        out.push('\n');
        for child in &node.children {
            self.outline_node(*child, out, false);
        }
        if let Some(fallback) = node.default {
            self.outline_node(fallback, out, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Payload, UserId};

    fn branch(name: &str) -> FlowNode {
        FlowNode::branch(name, BranchSpec::default())
    }

    fn sample() -> (FlowGraph, [NodeId; 5]) {
        let mut graph = FlowGraph::new();
        let root = graph.insert(FlowNode::tree("Root", TreeSpec::default()), None).unwrap();
        let menu = graph.insert(branch("Menu"), Some(root)).unwrap();
        let settings = graph.insert(branch("Settings"), Some(menu)).unwrap();
        let profile = graph.insert(branch("Profile"), Some(menu)).unwrap();
        let other = graph.insert(FlowNode::tree("Other", TreeSpec::default()), None).unwrap();
        (graph, [root, menu, settings, profile, other])
    }

    #[test]
    fn paths_and_depths() {
        let (graph, [root, menu, settings, ..]) = sample();
        assert_eq!(graph.node(settings).path, "Root/Menu/Settings");
        assert_eq!(graph.node(settings).depth, 2);
        assert_eq!(graph.path_to(settings), vec![root, menu, settings]);
    }

    #[test]
    fn lowest_common_ancestor() {
        let (graph, [root, menu, settings, profile, other]) = sample();
        assert_eq!(graph.lowest_common_ancestor(settings, profile), Some(menu));
        assert_eq!(graph.lowest_common_ancestor(settings, menu), Some(menu));
        assert_eq!(graph.lowest_common_ancestor(root, profile), Some(root));
        assert_eq!(graph.lowest_common_ancestor(settings, other), None);
    }

    #[test]
    fn scoped_lookup() {
        let (graph, [_, menu, settings, profile, other]) = sample();
        assert_eq!(graph.lookup(Some(settings), "Profile"), Some(profile));
        assert_eq!(graph.lookup(Some(settings), "Other"), Some(other));
        assert_eq!(graph.lookup(Some(other), "Profile"), None);
        assert_eq!(graph.lookup(None, "Root/Menu"), Some(menu));
        assert_eq!(graph.lookup(None, "Root/Nope"), None);
    }

    #[test]
    fn names_are_unique_per_tree() {
        let (mut graph, [root, menu, ..]) = sample();
        let err = graph.insert(branch("Settings"), Some(root)).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateName { .. }));
        let err = graph.insert(branch("Root"), Some(menu)).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateName { .. }));
        let err = graph
            .insert(FlowNode::tree("Other", TreeSpec::default()), None)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateName { .. }));

        let other_tree = graph.tree_named("Other").unwrap();
        assert!(graph.insert(branch("Settings"), Some(other_tree)).is_ok());
    }

    #[test]
    fn default_branch_is_not_a_child() {
        let (mut graph, [root, ..]) = sample();
        let fallback = graph.insert_default(branch("Fallback"), root).unwrap();
        assert_eq!(graph.node(root).default, Some(fallback));
        assert!(!graph.node(root).children.contains(&fallback));
        assert!(graph.insert_default(branch("Again"), root).is_err());
        assert!(graph.outline().contains("  default Fallback"));
    }

    #[test]
    fn trigger_matching() {
        let triggers = Triggers {
            commands: vec!["start".into()],
            keys: vec!["Menu".into()],
            callbacks: vec!["open".into()],
        };
        let text = |raw: &str| Event::new(1, UserId(1), Payload::text(raw));
        assert!(triggers.matches(&text("/start"), "/", None));
        assert!(triggers.matches(&text("Menu"), "/", None));
        assert!(!triggers.matches(&text("menu"), "/", None));
        let press = Event::new(1, UserId(1), Payload::callback("open"));
        assert!(triggers.matches(&press, "/", None));
    }
}
