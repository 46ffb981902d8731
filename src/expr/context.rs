//! Evaluation context handed to referenced members.

use std::any::Any;
use std::collections::HashMap;

use super::Value;
use super::cache::{CacheContext, SessionCache};
use crate::flow::{Event, NodeId};

/// Session-scoped variables readable and writable from expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables(HashMap<String, Value>);

impl Variables {
    /// Empty variable table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Bind `value` to `name`, returning the previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Remove a binding.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything an expression may observe while it is evaluated.
///
/// The active handler is passed explicitly by whoever dispatches the event;
/// members never discover it on their own.
pub struct RuntimeContext<'a> {
    /// Event being handled, if any.
    pub event: Option<&'a Event>,
    /// Navigation path, root first; the last entry is the active node.
    pub navigation: &'a [NodeId],
    /// Session variables.
    pub variables: &'a mut Variables,
    /// Session reference caches.
    pub cache: &'a mut SessionCache,
    pub(crate) handler: Option<&'a mut (dyn Any + Send + 'static)>,
}

impl<'a> RuntimeContext<'a> {
    /// Context with no event, no navigation and no handler.
    pub fn new(variables: &'a mut Variables, cache: &'a mut SessionCache) -> Self {
        Self {
            event: None,
            navigation: &[],
            variables,
            cache,
            handler: None,
        }
    }

    /// Attach the event being handled.
    pub fn with_event(mut self, event: &'a Event) -> Self {
        self.event = Some(event);
        self
    }

    /// Attach the session's navigation path.
    pub fn with_navigation(mut self, navigation: &'a [NodeId]) -> Self {
        self.navigation = navigation;
        self
    }

    /// Attach the active handler instance.
    pub fn with_handler(mut self, handler: &'a mut (dyn Any + Send + 'static)) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Whether a handler instance is active.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Active handler downcast to its concrete type.
    pub fn handler_mut<H: Any>(&mut self) -> Option<&mut H> {
        self.handler.as_deref_mut()?.downcast_mut::<H>()
    }

    /// Active navigation node.
    pub fn active_node(&self) -> Option<NodeId> {
        self.navigation.last().copied()
    }

    /// Cache identity for results produced right now.
    pub fn capture(&self) -> CacheContext {
        match (self.event, self.active_node()) {
            (Some(event), _) => CacheContext::Event(event.update_id),
            (None, Some(node)) => CacheContext::Node(node),
            (None, None) => CacheContext::Invalid,
        }
    }

    pub(crate) fn take_handler(&mut self) -> Option<&'a mut (dyn Any + Send + 'static)> {
        self.handler.take()
    }

    pub(crate) fn restore_handler(&mut self, handler: &'a mut (dyn Any + Send + 'static)) {
        self.handler = Some(handler);
    }
}
