//! The two context channels threaded through every recursive call.
//!
//! The overlay channel is identity-keyed and copy-on-write: entering a
//! provider installs a new overlay without mutating the one held by siblings
//! or the caller. The legacy channel is a flat string-keyed mapping merged
//! on top of the inbound mapping wherever an instance derives a child
//! context. Both are persistent maps, so threading them as plain values is
//! cheap and concurrent branches can never observe each other's writes.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use archery::ArcK;
use rpds::HashTrieMap;

use super::node::{ConsumeFn, Node};

pub type ContextValue = Arc<dyn Any + Send + Sync>;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token shared by a provider/consumer pair, carrying the value
/// published when no enclosing provider exists.
#[derive(Clone)]
pub struct ContextSlot {
    inner: Arc<SlotInner>,
}

struct SlotInner {
    id: u64,
    name: String,
    default: ContextValue,
}

impl ContextSlot {
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, default: T) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                default: Arc::new(default),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// The statically published default, returned by lookups that find no
    /// enclosing provider.
    pub fn default_value(&self) -> ContextValue {
        self.inner.default.clone()
    }

    /// A provider node publishing `value` for this slot over `child`.
    pub fn provide<T: Any + Send + Sync>(&self, value: T, child: Node) -> Node {
        Node::Provide {
            slot: self.clone(),
            value: Arc::new(value),
            child: Arc::new(child),
        }
    }

    /// A consumer node rendering a subtree from this slot's resolved value.
    pub fn consume(
        &self,
        render: impl Fn(&ContextValue) -> anyhow::Result<Node> + Send + Sync + 'static,
    ) -> Node {
        let render: ConsumeFn = Arc::new(render);
        Node::Consume {
            slot: self.clone(),
            render,
        }
    }
}

impl fmt::Debug for ContextSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextSlot({}#{})", self.inner.name, self.inner.id)
    }
}

/// Identity-keyed overlay for provider/consumer pairs.
#[derive(Clone)]
pub struct Overlay {
    entries: HashTrieMap<u64, ContextValue, ArcK>,
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            entries: HashTrieMap::new_with_hasher_and_ptr_kind(Default::default()),
        }
    }

    /// Returns a new overlay that shadows any prior entry for `slot`. The
    /// receiver is left untouched.
    pub fn push(&self, slot: &ContextSlot, value: ContextValue) -> Overlay {
        Overlay {
            entries: self.entries.insert(slot.id(), value),
        }
    }

    /// Most recently pushed value for `slot`, falling back to the slot's
    /// static default.
    pub fn lookup(&self, slot: &ContextSlot) -> ContextValue {
        self.entries
            .get(&slot.id())
            .cloned()
            .unwrap_or_else(|| slot.default_value())
    }

    pub fn contains(&self, slot: &ContextSlot) -> bool {
        self.entries.contains_key(&slot.id())
    }

    pub fn size(&self) -> usize {
        self.entries.size()
    }
}

impl Default for Overlay {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Overlay(size={})", self.entries.size())
    }
}

/// Flat key/value legacy context, visible through simple key lookup.
#[derive(Clone)]
pub struct ContextMap {
    entries: HashTrieMap<String, ContextValue, ArcK>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self {
            entries: HashTrieMap::new_with_hasher_and_ptr_kind(Default::default()),
        }
    }

    pub fn with<T: Any + Send + Sync>(self, key: impl Into<String>, value: T) -> Self {
        Self {
            entries: self.entries.insert(key.into(), Arc::new(value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries.get(key)
    }

    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Merges `overrides` on top of this mapping, returning the merged copy.
    /// Neither input is mutated.
    pub fn merge(&self, overrides: &ContextMap) -> ContextMap {
        let mut merged = self.entries.clone();
        for (key, value) in overrides.entries.iter() {
            merged = merged.insert(key.clone(), value.clone());
        }
        ContextMap { entries: merged }
    }

    pub fn size(&self) -> usize {
        self.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContextMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.iter().map(|(key, _)| key.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("ContextMap").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_shadows_without_mutating_the_source() {
        let slot = ContextSlot::new("theme", "default".to_string());
        let base = Overlay::new();
        let outer = base.push(&slot, Arc::new("outer".to_string()));
        let inner = outer.push(&slot, Arc::new("inner".to_string()));

        assert!(!base.contains(&slot));
        assert_eq!(
            outer.lookup(&slot).downcast_ref::<String>().unwrap(),
            "outer"
        );
        assert_eq!(
            inner.lookup(&slot).downcast_ref::<String>().unwrap(),
            "inner"
        );
    }

    #[test]
    fn lookup_falls_back_to_the_slot_default() {
        let slot = ContextSlot::new("theme", "default".to_string());
        let overlay = Overlay::new();
        assert_eq!(
            overlay.lookup(&slot).downcast_ref::<String>().unwrap(),
            "default"
        );
    }

    #[test]
    fn slots_with_equal_names_keep_distinct_identities() {
        let first = ContextSlot::new("slot", 1_i64);
        let second = ContextSlot::new("slot", 2_i64);
        let overlay = Overlay::new().push(&first, Arc::new(10_i64));
        assert_eq!(overlay.lookup(&first).downcast_ref::<i64>(), Some(&10));
        assert_eq!(overlay.lookup(&second).downcast_ref::<i64>(), Some(&2));
    }

    #[test]
    fn merge_layers_overrides_on_top() {
        let base = ContextMap::new().with("a", 1_i64).with("b", 2_i64);
        let overrides = ContextMap::new().with("b", 20_i64).with("c", 3_i64);
        let merged = base.merge(&overrides);

        assert_eq!(merged.get_as::<i64>("a"), Some(&1));
        assert_eq!(merged.get_as::<i64>("b"), Some(&20));
        assert_eq!(merged.get_as::<i64>("c"), Some(&3));
        // Inputs stay intact.
        assert_eq!(base.get_as::<i64>("b"), Some(&2));
        assert_eq!(overrides.get("a"), None);
    }
}
