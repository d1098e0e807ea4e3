use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::node::NodeRef;

pub type PropValue = Arc<dyn Any + Send + Sync>;
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// Attribute bag bound to a composite node.
///
/// An ordered mapping with unique string keys and opaque values; consumers
/// read values back through typed downcasts. Already-resolved children ride
/// along in a dedicated slot rather than the keyed entries.
#[derive(Clone, Default)]
pub struct Props {
    entries: Vec<(String, PropValue)>,
    children: Option<NodeRef>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Replaces any existing entry for `key` in place,
    /// preserving its original position.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_children(mut self, child: impl Into<NodeRef>) -> Self {
        self.children = Some(child.into());
        self
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        let value: PropValue = Arc::new(value);
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn children(&self) -> Option<&NodeRef> {
        self.children.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binds these attributes over declared defaults: every entry of `self`
    /// overrides the matching default, defaults fill the rest.
    pub(crate) fn layered_over(&self, defaults: &Props) -> Props {
        let mut bound = defaults.clone();
        for (key, value) in &self.entries {
            match bound
                .entries
                .iter_mut()
                .find(|(existing, _)| existing == key)
            {
                Some(entry) => entry.1 = value.clone(),
                None => bound.entries.push((key.clone(), value.clone())),
            }
        }
        if self.children.is_some() {
            bound.children = self.children.clone();
        }
        bound
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.entries.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("Props")
            .field("keys", &keys)
            .field("has_children", &self.children.is_some())
            .finish()
    }
}

/// Mutable state record owned by an [`super::instance::Instance`].
///
/// Merges are shallow: every key of the partial replaces the matching key of
/// the current state, untouched keys survive.
#[derive(Clone, Default)]
pub struct State {
    entries: FxHashMap<String, StateValue>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.entries.get(key)
    }

    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// Shallow merge: entries of `partial` win, the rest are kept.
    pub fn merge(&mut self, partial: State) {
        self.entries.extend(partial.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("State").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_preserve_insertion_order_with_unique_keys() {
        let props = Props::new()
            .with("b", 2_i64)
            .with("a", 1_i64)
            .with("b", 20_i64);
        let keys: Vec<&str> = props.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(props.get_as::<i64>("b"), Some(&20));
    }

    #[test]
    fn layering_lets_node_attributes_override_defaults() {
        let defaults = Props::new().with("size", 10_i64).with("label", "default".to_string());
        let props = Props::new().with("label", "custom".to_string());
        let bound = props.layered_over(&defaults);
        assert_eq!(bound.get_as::<i64>("size"), Some(&10));
        assert_eq!(bound.get_as::<String>("label").map(String::as_str), Some("custom"));
    }

    #[test]
    fn state_merge_is_shallow() {
        let mut state = State::new().with("a", 1_i64).with("b", 2_i64);
        state.merge(State::new().with("b", 20_i64).with("c", 3_i64));
        assert_eq!(state.get_as::<i64>("a"), Some(&1));
        assert_eq!(state.get_as::<i64>("b"), Some(&20));
        assert_eq!(state.get_as::<i64>("c"), Some(&3));
    }
}
