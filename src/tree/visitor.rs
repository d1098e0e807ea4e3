use std::sync::Arc;

use async_trait::async_trait;

use super::context::{ContextMap, Overlay};
use super::instance::Instance;
use super::node::Node;

/// A visitor's answer, normalized to a descent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Expand the node's children.
    Continue,
    /// Stop sentinel: the node itself is fully visited, but its children
    /// are not expanded. The rest of the walk is unaffected.
    Prune,
}

/// External visitor invoked at every visited node.
///
/// The positional contract is fixed: the node, its backing instance (for
/// stateful producers only), the overlay channel, the legacy context in
/// force at the node, and the legacy context its children will receive.
/// The answer may be produced asynchronously; the engine resolves it before
/// deciding whether to recurse. Returning an error latches the walk's
/// failure slot exactly as an asynchronous rejection would.
#[async_trait]
pub trait Visitor: Send + Sync {
    async fn visit(
        &self,
        node: &Node,
        instance: Option<&Arc<Instance>>,
        overlay: &Overlay,
        context: &ContextMap,
        child_context: &ContextMap,
    ) -> anyhow::Result<Flow>;
}
