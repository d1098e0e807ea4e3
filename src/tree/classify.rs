use std::fmt;

use tracing::trace;

use super::node::{Node, Producer, Rendered};

/// Traversal category of a node, decided once per node before expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Collection,
    Empty,
    Leaf,
    Provider,
    Consumer,
    RefForwarding,
    FunctionProducer,
    StatefulProducer,
    PlainComposite,
    SideChannel,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Collection => write!(f, "Collection"),
            Category::Empty => write!(f, "Empty"),
            Category::Leaf => write!(f, "Leaf"),
            Category::Provider => write!(f, "Provider"),
            Category::Consumer => write!(f, "Consumer"),
            Category::RefForwarding => write!(f, "RefForwarding"),
            Category::FunctionProducer => write!(f, "FunctionProducer"),
            Category::StatefulProducer => write!(f, "StatefulProducer"),
            Category::PlainComposite => write!(f, "PlainComposite"),
            Category::SideChannel => write!(f, "SideChannel"),
        }
    }
}

/// Maps a node to its traversal category. Deterministic and side-effect-free.
pub fn classify(node: &Node) -> Category {
    match node {
        Node::Fragment(_) => Category::Collection,
        Node::Empty => Category::Empty,
        Node::Text(_) | Node::Number(_) => Category::Leaf,
        Node::Provide { .. } => Category::Provider,
        Node::Consume { .. } => Category::Consumer,
        Node::Element(element) => match element.producer {
            Producer::ForwardRef(_) => Category::RefForwarding,
            Producer::Function(_) => Category::FunctionProducer,
            Producer::Stateful(_) => Category::StatefulProducer,
            Producer::Composite => Category::PlainComposite,
        },
        Node::Portal { .. } => Category::SideChannel,
    }
}

/// Unwraps an instance-shaped producer result by rendering it repeatedly
/// until a plain node remains. Render failures propagate to the caller.
pub fn flatten(rendered: Rendered) -> anyhow::Result<Node> {
    let mut current = rendered;
    loop {
        match current {
            Rendered::Node(node) => return Ok(node),
            Rendered::Renderable(renderable) => {
                trace!("unwrapping render-capable producer result");
                current = renderable.render()?;
            }
        }
    }
}
