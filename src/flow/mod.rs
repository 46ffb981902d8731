//! Flow state machine.
//!
//! A loaded [`FlowGraph`] is immutable and shared between sessions. Each
//! [`Session`] walks it event by event: triggers select a tree, branches
//! select sub-states, and the [`Resolver`] turns every move into a
//! [`JumpPoint`] whose actions the session executes in order.

pub mod access;
pub mod action;
pub mod event;
pub mod loader;
pub mod node;
pub mod session;
pub mod transition;

pub use access::{Access, AccessController, Role, RoleGrant, RoleProvider};
pub use action::{Action, ActionKind, ActionRegistry, Invocable};
pub use event::{Event, Payload, UserId};
pub use loader::{load, load_document};
pub use node::{BranchSpec, FlowGraph, FlowNode, NodeId, NodeKind, TreeSpec, Triggers};
pub use session::{Landing, Outcome, Session, SessionId, SessionRegistry};
pub use transition::{
    CallerFrame, EditSource, EditTarget, ExecutionOptions, JumpPoint, Navigation, Resolver,
    Transition, TransitionKind, TransitionSite,
};
