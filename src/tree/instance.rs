use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use super::context::ContextMap;
use super::node::{NodeRef, Rendered, StatefulDef};
use super::props::{Props, State};

/// The ephemeral object backing one stateful producer node for the duration
/// of one walk. Never reused across nodes or across traversals.
///
/// Its lifetime is exactly the expansion of its node: created just before
/// the lifecycle hooks run, eligible for teardown only after the whole
/// subtree has settled.
pub struct Instance {
    def: Arc<StatefulDef>,
    props: Props,
    state: RwLock<State>,
    context: ContextMap,
    torn_down: AtomicBool,
}

impl Instance {
    /// Creates the instance for one node: binds attributes (declared
    /// defaults first, per-node attributes override), seeds the state,
    /// applies the derived-state computation, then runs the pre-expansion
    /// hook. All steps are synchronous.
    pub(crate) fn instantiate(
        def: Arc<StatefulDef>,
        props: Props,
        context: ContextMap,
    ) -> anyhow::Result<Arc<Instance>> {
        let props = props.layered_over(&def.defaults);
        let state = match &def.initial_state {
            Some(init) => (init.as_ref())(&props),
            None => State::new(),
        };
        let instance = Instance {
            props,
            state: RwLock::new(state),
            context,
            torn_down: AtomicBool::new(false),
            def,
        };

        if let Some(derive) = &instance.def.derive_state {
            let partial = {
                let state = instance.state.read();
                (derive.as_ref())(&instance.props, &state)?
            };
            // `None` is the explicit no-change marker.
            if let Some(partial) = partial {
                instance.state.write().merge(partial);
            }
        }

        // The newer hook name wins when both are registered.
        if let Some(prepare) = instance
            .def
            .prepare
            .as_ref()
            .or(instance.def.legacy_prepare.as_ref())
        {
            (prepare.as_ref())(&instance);
        }

        trace!("instantiated `{}`", instance.def.name);
        Ok(Arc::new(instance))
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Attributes bound at creation; fixed for the instance's lifetime.
    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> Option<&NodeRef> {
        self.props.children()
    }

    /// The inbound legacy context the instance was created with.
    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.state.read().clone()
    }

    /// Shallow-merges `partial` into the state immediately; the effect is
    /// visible to the very next read.
    pub fn merge_state(&self, partial: State) {
        self.state.write().merge(partial);
    }

    /// Like [`Instance::merge_state`], but computes the partial from the
    /// current state, the bound attributes, and the inbound context.
    pub fn merge_state_with(&self, update: impl FnOnce(&State, &Props, &ContextMap) -> State) {
        let snapshot = self.state.read().clone();
        let partial = update(&snapshot, &self.props, &self.context);
        self.state.write().merge(partial);
    }

    pub(crate) fn render(&self) -> anyhow::Result<Rendered> {
        (self.def.render.as_ref())(self)
    }

    /// Context passed to this instance's children: the child-context
    /// derivation merged over the inbound mapping, or the inbound mapping
    /// unchanged when no derivation is declared.
    pub(crate) fn child_context(&self) -> ContextMap {
        match &self.def.child_context {
            Some(derive) => self.context.merge(&(derive.as_ref())(self)),
            None => self.context.clone(),
        }
    }

    /// Runs the teardown hook at most once. A missing hook is a no-op.
    pub(crate) fn teardown(&self) -> anyhow::Result<()> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.def.teardown {
            Some(teardown) => (teardown.as_ref())(self),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("def", &self.def.name)
            .field("props", &self.props)
            .field("state", &*self.state.read())
            .finish()
    }
}
