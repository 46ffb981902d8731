//! Role based visibility of trees.
//!
//! Denial is a navigational outcome: the caller is routed to the role's
//! fallback tree, or the event is dropped when there is none.

use serde::{Deserialize, Serialize};

use super::event::UserId;
use super::node::{FlowGraph, NodeId};
use crate::error::ConfigurationError;

/// Role as declared in a document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Role {
    /// Role name.
    pub name: String,
    /// Grants every tree whose level is at or below this one.
    pub level: Option<u32>,
    /// Grants exactly these trees.
    pub trees: Option<Vec<String>>,
    /// Tree shown instead of a denied one.
    pub on_denied: Option<String>,
}

impl Role {
    /// A role must grant something.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.level.is_none() && self.trees.is_none() {
            return Err(ConfigurationError::MalformedRole {
                role: self.name.clone(),
                reason: "either a level or a list of trees must be set".into(),
            });
        }
        Ok(())
    }

    /// Resolve tree names against `graph`.
    pub fn resolve(&self, graph: &FlowGraph) -> Result<RoleGrant, ConfigurationError> {
        self.validate()?;
        let tree = |name: &String| {
            graph
                .tree_named(name)
                .ok_or_else(|| ConfigurationError::MalformedRole {
                    role: self.name.clone(),
                    reason: format!("unknown tree '{}'", name),
                })
        };
        let trees = match &self.trees {
            Some(names) => Some(names.iter().map(tree).collect::<Result<Vec<_>, _>>()?),
            None => None,
        };
        let on_denied = self.on_denied.as_ref().map(tree).transpose()?;
        Ok(RoleGrant {
            name: self.name.clone(),
            level: self.level,
            trees,
            on_denied,
        })
    }
}

/// Role with tree names resolved to nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    /// Role name.
    pub name: String,
    /// Granted level.
    pub level: Option<u32>,
    /// Explicitly granted trees.
    pub trees: Option<Vec<NodeId>>,
    /// Fallback tree.
    pub on_denied: Option<NodeId>,
}

impl RoleGrant {
    /// Whether the grant covers a tree requiring `level`.
    ///
    /// An explicit list grants its trees regardless of level; the level
    /// check applies to everything else.
    pub fn allows(&self, tree: NodeId, level: u32) -> bool {
        if self.trees.as_ref().is_some_and(|trees| trees.contains(&tree)) {
            return true;
        }
        self.level.is_some_and(|granted| level <= granted)
    }
}

/// Result of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The tree may be entered.
    Granted,
    /// The tree is hidden; go to `fallback` if set.
    Denied {
        /// Role's fallback tree.
        fallback: Option<NodeId>,
    },
}

/// Supplies the role of a user.
pub trait RoleProvider: Send + Sync {
    /// Role name of `user`, or `None` for guests.
    fn role_for(&self, user: &UserId) -> Option<String>;
}

impl<F> RoleProvider for F
where
    F: Fn(&UserId) -> Option<String> + Send + Sync,
{
    fn role_for(&self, user: &UserId) -> Option<String> {
        self(user)
    }
}

/// Filters trees by role.
#[derive(Debug, Clone, Copy)]
pub struct AccessController<'g> {
    graph: &'g FlowGraph,
    guest_level: u32,
}

impl<'g> AccessController<'g> {
    /// Controller granting guests (no or unknown role) `guest_level`.
    pub fn new(graph: &'g FlowGraph, guest_level: u32) -> Self {
        Self { graph, guest_level }
    }

    /// Trees the role may enter, in document order.
    pub fn visible_trees(&self, role: Option<&str>) -> Vec<NodeId> {
        self.graph
            .trees()
            .iter()
            .copied()
            .filter(|tree| self.is_visible(role, *tree))
            .collect()
    }

    /// Decide whether `role` may enter `tree`.
    pub fn check(&self, role: Option<&str>, tree: NodeId) -> Access {
        if self.is_visible(role, tree) {
            return Access::Granted;
        }
        let fallback = role
            .and_then(|name| self.graph.role(name))
            .and_then(|grant| grant.on_denied)
            .filter(|fallback| *fallback != tree);
        tracing::warn!(
            role = role.unwrap_or("guest"),
            tree = %self.graph.node(tree).path,
            "access denied"
        );
        Access::Denied { fallback }
    }

    fn is_visible(&self, role: Option<&str>, tree: NodeId) -> bool {
        let level = self.graph.node(tree).access_level();
        match role.and_then(|name| self.graph.role(name)) {
            Some(grant) => grant.allows(tree, level),
            None => level <= self.guest_level,
        }
    }
}
