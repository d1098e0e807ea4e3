//! The recursive traversal orchestrator.
//!
//! One walk is a single logical task: members of a collection are initiated
//! together in declaration order and awaited jointly, so sibling subtrees
//! make progress concurrently without thread parallelism. After a
//! composite's visitor answer resolves, the engine yields once before
//! producing children; sibling visitor invocations therefore always start
//! in declaration order before any sibling's subtree expands. Suspension
//! happens only while awaiting a visitor's answer or an already-initiated
//! branch. A failed branch never cancels siblings in flight; the walk
//! reports the first error and discards the rest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{self, BoxFuture, FutureExt};
use tracing::{debug, trace};

use super::classify::{Category, classify, flatten};
use super::context::{ContextMap, Overlay};
use super::error::{ErrorLatch, WalkError};
use super::instance::Instance;
use super::node::{Element, Node, NodeList, NodeRef, Producer};
use super::visitor::{Flow, Visitor};

/// Options for a single walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Invoke an instance's teardown hook once its subtree has settled.
    pub invoke_teardown: bool,
}

/// Walks `root`, calling `visitor` at every visited node, expanding
/// producers on demand and threading both context channels downward.
///
/// Completes successfully once every reachable branch has settled with no
/// latched error; fails with the first error raised by a visitor, a
/// producer invocation, or a teardown hook. `context` seeds the legacy
/// channel for the whole tree.
pub async fn walk(
    root: Node,
    visitor: &dyn Visitor,
    context: Option<ContextMap>,
    options: WalkOptions,
) -> Result<(), WalkError> {
    let traversal = TreeWalk {
        visitor,
        options,
        latch: ErrorLatch::new(),
        stats: WalkStats::default(),
    };
    let context = context.unwrap_or_default();
    traversal
        .walk_node(Arc::new(root), Overlay::new(), context)
        .await;

    let visited = traversal.stats.visited.load(Ordering::Relaxed);
    let expanded = traversal.stats.expanded.load(Ordering::Relaxed);
    let instances = traversal.stats.instances.load(Ordering::Relaxed);
    match traversal.latch.take() {
        Some(error) => {
            debug!("walk failed after {visited} visits: {error}");
            Err(error)
        }
        None => {
            debug!(
                "walk complete: {visited} nodes visited, {expanded} producers expanded, {instances} instances"
            );
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct WalkStats {
    visited: AtomicU64,
    expanded: AtomicU64,
    instances: AtomicU64,
}

/// One in-flight walk: the visitor, the options, the error latch, and the
/// per-walk counters. Context state lives in the arguments threaded through
/// the recursion, never in shared mutable storage.
struct TreeWalk<'w> {
    visitor: &'w dyn Visitor,
    options: WalkOptions,
    latch: ErrorLatch,
    stats: WalkStats,
}

impl TreeWalk<'_> {
    fn walk_node(
        &self,
        node: NodeRef,
        overlay: Overlay,
        context: ContextMap,
    ) -> BoxFuture<'_, ()> {
        async move {
            let category = classify(&node);
            trace!("walking {category} node {node:?}");
            match category {
                Category::Collection => {
                    let Node::Fragment(members) = &*node else { return };
                    self.walk_members(members, &overlay, &context).await;
                }
                Category::Empty => {}
                Category::Leaf => {
                    // Leaves are visited but never expanded; their answer
                    // carries no descent decision.
                    let _ = self.dispatch(&node, None, &overlay, &context, &context).await;
                }
                Category::Provider => {
                    // A provider is a passthrough: no visitor call, just a
                    // shadowing push visible to its descendants only.
                    let Node::Provide { slot, value, child } = &*node else { return };
                    let pushed = overlay.push(slot, value.clone());
                    self.walk_node(child.clone(), pushed, context).await;
                }
                Category::Consumer => {
                    let Node::Consume { slot, render } = &*node else { return };
                    let value = overlay.lookup(slot);
                    match (render.as_ref())(&value) {
                        Ok(next) => self.walk_node(Arc::new(next), overlay, context).await,
                        Err(error) => self.latch.trip(WalkError::Producer(error)),
                    }
                }
                Category::SideChannel => {
                    // The placement is out-of-band; children are walked as if
                    // the wrapper were transparent.
                    let Node::Portal { children, .. } = &*node else { return };
                    self.walk_members(children, &overlay, &context).await;
                }
                Category::RefForwarding
                | Category::FunctionProducer
                | Category::StatefulProducer
                | Category::PlainComposite => {
                    self.walk_element(&node, overlay, context).await;
                }
            }
        }
        .boxed()
    }

    /// Initiates every member in declaration order and awaits them jointly:
    /// the collection settles only once each member's subtree has settled.
    async fn walk_members(&self, members: &NodeList, overlay: &Overlay, context: &ContextMap) {
        let branches: Vec<_> = members
            .iter()
            .map(|member| self.walk_node(member.clone(), overlay.clone(), context.clone()))
            .collect();
        future::join_all(branches).await;
    }

    async fn walk_element(&self, node: &NodeRef, overlay: Overlay, context: ContextMap) {
        let Node::Element(element) = &**node else { return };

        let (instance, child_context) = match &element.producer {
            Producer::Stateful(def) => {
                match Instance::instantiate(def.clone(), element.props.clone(), context.clone()) {
                    Ok(instance) => {
                        self.stats.instances.fetch_add(1, Ordering::Relaxed);
                        let child_context = instance.child_context();
                        (Some(instance), child_context)
                    }
                    Err(error) => {
                        self.latch.trip(WalkError::Producer(error));
                        return;
                    }
                }
            }
            _ => (None, context.clone()),
        };

        let flow = self
            .dispatch(node, instance.as_ref(), &overlay, &context, &child_context)
            .await;

        if flow == Some(Flow::Continue) {
            // Let sibling visits initiate before this subtree expands.
            tokio::task::yield_now().await;
            self.expand(element, instance.as_ref(), &overlay, &child_context)
                .await;
        }

        if self.options.invoke_teardown {
            if let Some(instance) = &instance {
                trace!("tearing down instance of `{}`", instance.name());
                if let Err(error) = instance.teardown() {
                    self.latch.trip(WalkError::Teardown(error));
                }
            }
        }
    }

    /// Obtains the element's children from its producer and walks them with
    /// the child context. An empty production completes the branch.
    async fn expand(
        &self,
        element: &Element,
        instance: Option<&Arc<Instance>>,
        overlay: &Overlay,
        child_context: &ContextMap,
    ) {
        self.stats.expanded.fetch_add(1, Ordering::Relaxed);
        let produced = match (&element.producer, instance) {
            (Producer::Composite, _) => {
                if let Some(child) = element.props.children() {
                    self.walk_node(child.clone(), overlay.clone(), child_context.clone())
                        .await;
                }
                return;
            }
            (Producer::Function(produce), _) => (produce.as_ref())(&element.props, child_context),
            (Producer::ForwardRef(produce), _) => (produce.as_ref())(&element.props),
            (Producer::Stateful(_), Some(instance)) => instance.render(),
            (Producer::Stateful(_), None) => return,
        };
        match produced.and_then(flatten) {
            Ok(child) => {
                self.walk_node(Arc::new(child), overlay.clone(), child_context.clone())
                    .await;
            }
            Err(error) => self.latch.trip(WalkError::Producer(error)),
        }
    }

    /// Invokes the visitor and normalizes its answer. Once the error latch
    /// has tripped, no further visitor invocation is dispatched; branches
    /// already awaiting an answer still run to their own settlement.
    async fn dispatch(
        &self,
        node: &NodeRef,
        instance: Option<&Arc<Instance>>,
        overlay: &Overlay,
        context: &ContextMap,
        child_context: &ContextMap,
    ) -> Option<Flow> {
        if self.latch.is_tripped() {
            trace!("error latched; skipping visit of {node:?}");
            return None;
        }
        self.stats.visited.fetch_add(1, Ordering::Relaxed);
        match self
            .visitor
            .visit(node, instance, overlay, context, child_context)
            .await
        {
            Ok(flow) => Some(flow),
            Err(error) => {
                self.latch.trip(WalkError::Visitor(error));
                None
            }
        }
    }
}
