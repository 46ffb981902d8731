//! Memoization of reference results within a session.
//!
//! A cached value is only reused while the stored [`CacheContext`] is
//! applicable to the current one: both must be derived from the same event.
//! Navigation-derived contexts can be captured but never validate a lookup,
//! so moving between states alone never revives a stale value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Value;
use crate::flow::NodeId;

/// How long a member's result may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CachingStrategy {
    /// Never cache.
    #[default]
    None,
    /// Reuse only while handling the same event.
    Update,
}

/// Identity under which a cached value was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheContext {
    /// Derived from the update id of the event being handled.
    Event(u64),
    /// Derived from the active navigation node (no event available).
    Node(NodeId),
    /// Nothing to derive from.
    Invalid,
}

impl CacheContext {
    /// Whether this context identifies anything at all.
    pub fn is_valid(&self) -> bool {
        !matches!(self, CacheContext::Invalid)
    }

    /// Whether a value captured under `self` may serve a lookup under `current`.
    pub fn applicable(&self, current: Option<&CacheContext>) -> bool {
        match (self, current) {
            (CacheContext::Event(stored), Some(CacheContext::Event(now))) => stored == now,
            _ => false,
        }
    }
}

/// Cached value and capture context for a single reference site.
#[derive(Debug, Clone)]
pub struct ReferenceCache {
    strategy: CachingStrategy,
    context: Option<CacheContext>,
    value: Option<Value>,
}

impl ReferenceCache {
    /// Empty cache with the given strategy.
    pub fn new(strategy: CachingStrategy) -> Self {
        Self {
            strategy,
            context: None,
            value: None,
        }
    }

    /// Strategy this cache was created with.
    pub fn strategy(&self) -> CachingStrategy {
        self.strategy
    }

    /// Context of the stored value.
    pub fn context(&self) -> Option<&CacheContext> {
        self.context.as_ref()
    }

    /// Drop the stored value and context.
    pub fn clear(&mut self) {
        self.context = None;
        self.value = None;
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.context.is_none()
    }

    /// Store `result` under `capture`. An invalid capture clears the cache.
    pub fn write(&mut self, result: Value, capture: CacheContext) {
        if self.strategy == CachingStrategy::None {
            return;
        }
        if capture.is_valid() {
            self.context = Some(capture);
            self.value = Some(result);
        } else {
            self.clear();
        }
    }

    /// Stored value if it may be reused under `current`.
    pub fn lookup(&self, current: Option<&CacheContext>) -> Option<&Value> {
        if self.strategy == CachingStrategy::None {
            return None;
        }
        match &self.context {
            Some(stored) if stored.applicable(current) => self.value.as_ref(),
            _ => None,
        }
    }
}

/// Identifier of a cacheable reference site, assigned at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheSlot(pub usize);

/// All reference caches owned by one session.
#[derive(Debug, Default)]
pub struct SessionCache {
    slots: HashMap<CacheSlot, ReferenceCache>,
}

impl SessionCache {
    /// Empty session cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `slot`, if applicable under `current`.
    pub fn lookup(
        &self,
        slot: CacheSlot,
        strategy: CachingStrategy,
        current: Option<&CacheContext>,
    ) -> Option<Value> {
        let cache = self.slots.get(&slot)?;
        if cache.strategy() != strategy {
            return None;
        }
        cache.lookup(current).cloned()
    }

    /// Record `result` for `slot` under `capture`.
    pub fn write(
        &mut self,
        slot: CacheSlot,
        strategy: CachingStrategy,
        result: Value,
        capture: CacheContext,
    ) {
        if strategy == CachingStrategy::None {
            return;
        }
        self.slots
            .entry(slot)
            .or_insert_with(|| ReferenceCache::new(strategy))
            .write(result, capture);
    }

    /// Cache for one slot.
    pub fn get(&self, slot: CacheSlot) -> Option<&ReferenceCache> {
        self.slots.get(&slot)
    }

    /// Drop every cached value.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of slots holding a value.
    pub fn len(&self) -> usize {
        self.slots.values().filter(|c| !c.is_empty()).count()
    }

    /// True when no slot holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_event_is_applicable() {
        let ctx = CacheContext::Event(7);
        assert!(ctx.applicable(Some(&CacheContext::Event(7))));
        assert!(!ctx.applicable(Some(&CacheContext::Event(8))));
        assert!(!ctx.applicable(None));
    }

    #[test]
    fn node_context_never_validates() {
        let ctx = CacheContext::Node(NodeId(1));
        assert!(ctx.is_valid());
        assert!(!ctx.applicable(Some(&CacheContext::Node(NodeId(1)))));
        assert!(!CacheContext::Event(1).applicable(Some(&CacheContext::Node(NodeId(1)))));
    }

    #[test]
    fn invalid_capture_clears() {
        let mut cache = ReferenceCache::new(CachingStrategy::Update);
        cache.write(Value::Int(1), CacheContext::Event(3));
        assert!(!cache.is_empty());
        cache.write(Value::Int(2), CacheContext::Invalid);
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(Some(&CacheContext::Event(3))), None);
    }

    #[test]
    fn none_strategy_never_stores() {
        let mut cache = ReferenceCache::new(CachingStrategy::None);
        cache.write(Value::Int(1), CacheContext::Event(3));
        assert!(cache.is_empty());
    }

    #[test]
    fn node_capture_is_stored_but_misses() {
        let mut cache = ReferenceCache::new(CachingStrategy::Update);
        cache.write(Value::Int(1), CacheContext::Node(NodeId(0)));
        assert!(!cache.is_empty());
        assert_eq!(cache.lookup(Some(&CacheContext::Node(NodeId(0)))), None);
        assert_eq!(cache.lookup(None), None);
    }

    #[test]
    fn session_cache_tracks_slots() {
        let mut cache = SessionCache::new();
        cache.write(CacheSlot(0), CachingStrategy::Update, Value::from("a"), CacheContext::Event(1));
        cache.write(CacheSlot(1), CachingStrategy::Update, Value::from("b"), CacheContext::Invalid);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup(CacheSlot(0), CachingStrategy::Update, Some(&CacheContext::Event(1))),
            Some(Value::from("a"))
        );
        cache.clear();
        assert!(cache.is_empty());
    }
}
