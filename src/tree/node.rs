use std::any::Any;
use std::fmt;
use std::sync::Arc;

use archery::ArcK;
use rpds::Vector;

use super::context::{ContextMap, ContextSlot, ContextValue};
use super::instance::Instance;
use super::props::{Props, State};

pub type NodeRef = Arc<Node>;
pub type NodeList = Vector<NodeRef, ArcK>;

/// Children producer attached to a function element. Receives the element's
/// attribute bag and the inbound legacy context.
pub type ProducerFn = Arc<dyn Fn(&Props, &ContextMap) -> anyhow::Result<Rendered> + Send + Sync>;

/// Render half of a ref-forwarding element.
pub type ForwardFn = Arc<dyn Fn(&Props) -> anyhow::Result<Rendered> + Send + Sync>;

/// Consumer callback mapping the resolved slot value to a subtree.
pub type ConsumeFn = Arc<dyn Fn(&ContextValue) -> anyhow::Result<Node> + Send + Sync>;

pub type InitStateFn = Arc<dyn Fn(&Props) -> State + Send + Sync>;
pub type DeriveStateFn = Arc<dyn Fn(&Props, &State) -> anyhow::Result<Option<State>> + Send + Sync>;
pub type PrepareFn = Arc<dyn Fn(&Instance) + Send + Sync>;
pub type RenderFn = Arc<dyn Fn(&Instance) -> anyhow::Result<Rendered> + Send + Sync>;
pub type ChildContextFn = Arc<dyn Fn(&Instance) -> ContextMap + Send + Sync>;
pub type TeardownFn = Arc<dyn Fn(&Instance) -> anyhow::Result<()> + Send + Sync>;

/// Opaque placement for a side-channel subtree. The engine never inspects it.
pub type PortalTarget = Arc<dyn Any + Send + Sync>;

/// One addressable position in the declarative tree being walked.
///
/// Leaf variants carry a primitive and have no children. `Element` carries a
/// producer plus an attribute bag; its children are obtained by invoking the
/// producer during traversal. All payloads sit behind `Arc`, so cloning a
/// node is cheap and subtrees are freely shared.
#[derive(Clone)]
pub enum Node {
    /// Absence of a node. Completes immediately with no visitor call.
    Empty,
    /// Text leaf.
    Text(String),
    /// Numeric leaf.
    Number(f64),
    /// Ordered finite sequence of nodes.
    Fragment(NodeList),
    /// Side-channel subtree with an out-of-band placement.
    Portal {
        target: PortalTarget,
        children: NodeList,
    },
    /// Publishes `value` for `slot` to every descendant of `child`.
    Provide {
        slot: ContextSlot,
        value: ContextValue,
        child: NodeRef,
    },
    /// Resolves the value published for `slot` and renders a subtree from it.
    Consume {
        slot: ContextSlot,
        render: ConsumeFn,
    },
    /// Composite node backed by a producer.
    Element(Element),
}

/// A composite node: a producer plus the attribute bag bound to it.
#[derive(Clone)]
pub struct Element {
    pub producer: Producer,
    pub props: Props,
}

/// The function or descriptor that yields an element's children.
///
/// Decided once by the classifier; the engine never probes shapes at
/// expansion time.
#[derive(Clone)]
pub enum Producer {
    /// Plain composite: children come straight from the attribute bag.
    Composite,
    /// Invocable function producer.
    Function(ProducerFn),
    /// Ref-forwarding descriptor; rendered from props alone.
    ForwardRef(ForwardFn),
    /// Stateful producer descriptor, expanded through an [`Instance`].
    Stateful(Arc<StatefulDef>),
}

/// Result of invoking a producer.
///
/// A producer may yield a plain node, or an instance-shaped value that must
/// be rendered again before classification (see `classify::flatten`).
pub enum Rendered {
    Node(Node),
    Renderable(Arc<dyn Renderable>),
}

/// A render-capable value produced by a producer invocation.
pub trait Renderable: Send + Sync {
    fn render(&self) -> anyhow::Result<Rendered>;
}

impl From<Node> for Rendered {
    fn from(node: Node) -> Self {
        Rendered::Node(node)
    }
}

/// Descriptor for a stateful producer: declared defaults, lifecycle hooks,
/// and the render operation. One descriptor backs any number of nodes; each
/// node gets its own [`Instance`] per traversal.
pub struct StatefulDef {
    pub(crate) name: String,
    pub(crate) defaults: Props,
    pub(crate) initial_state: Option<InitStateFn>,
    pub(crate) derive_state: Option<DeriveStateFn>,
    pub(crate) prepare: Option<PrepareFn>,
    pub(crate) legacy_prepare: Option<PrepareFn>,
    pub(crate) render: RenderFn,
    pub(crate) child_context: Option<ChildContextFn>,
    pub(crate) teardown: Option<TeardownFn>,
}

impl StatefulDef {
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&Instance) -> anyhow::Result<Rendered> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            defaults: Props::new(),
            initial_state: None,
            derive_state: None,
            prepare: None,
            legacy_prepare: None,
            render: Arc::new(render),
            child_context: None,
            teardown: None,
        }
    }

    /// Declared attribute defaults; per-node attributes override them.
    pub fn with_defaults(mut self, defaults: Props) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_initial_state(
        mut self,
        init: impl Fn(&Props) -> State + Send + Sync + 'static,
    ) -> Self {
        self.initial_state = Some(Arc::new(init));
        self
    }

    /// Derived-state computation applied once after construction. Returning
    /// `None` means "no change".
    pub fn with_derive_state(
        mut self,
        derive: impl Fn(&Props, &State) -> anyhow::Result<Option<State>> + Send + Sync + 'static,
    ) -> Self {
        self.derive_state = Some(Arc::new(derive));
        self
    }

    /// Pre-expansion hook, run after state derivation and before the first
    /// render. May mutate instance state any number of times.
    pub fn with_prepare(mut self, prepare: impl Fn(&Instance) + Send + Sync + 'static) -> Self {
        self.prepare = Some(Arc::new(prepare));
        self
    }

    /// Older registration name for the pre-expansion hook. Ignored when
    /// [`StatefulDef::with_prepare`] is also declared.
    pub fn with_legacy_prepare(
        mut self,
        prepare: impl Fn(&Instance) + Send + Sync + 'static,
    ) -> Self {
        self.legacy_prepare = Some(Arc::new(prepare));
        self
    }

    /// Child-context derivation; its result is merged over the inbound
    /// legacy context for the instance's children only.
    pub fn with_child_context(
        mut self,
        child_context: impl Fn(&Instance) -> ContextMap + Send + Sync + 'static,
    ) -> Self {
        self.child_context = Some(Arc::new(child_context));
        self
    }

    /// Teardown hook, invoked after the instance's subtree has settled when
    /// the walk enables teardown.
    pub fn with_teardown(
        mut self,
        teardown: impl Fn(&Instance) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.teardown = Some(Arc::new(teardown));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Node {
    pub fn text(value: impl Into<String>) -> Node {
        Node::Text(value.into())
    }

    pub fn number(value: f64) -> Node {
        Node::Number(value)
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Node {
        Node::Fragment(
            children
                .into_iter()
                .map(Arc::new)
                .collect::<Vector<NodeRef, ArcK>>(),
        )
    }

    pub fn portal(target: PortalTarget, children: impl IntoIterator<Item = Node>) -> Node {
        Node::Portal {
            target,
            children: children
                .into_iter()
                .map(Arc::new)
                .collect::<Vector<NodeRef, ArcK>>(),
        }
    }

    /// Plain composite with children taken from the attribute bag.
    pub fn composite(props: Props) -> Node {
        Node::Element(Element {
            producer: Producer::Composite,
            props,
        })
    }

    pub fn function(
        produce: impl Fn(&Props, &ContextMap) -> anyhow::Result<Rendered> + Send + Sync + 'static,
        props: Props,
    ) -> Node {
        Node::Element(Element {
            producer: Producer::Function(Arc::new(produce)),
            props,
        })
    }

    pub fn forward_ref(
        produce: impl Fn(&Props) -> anyhow::Result<Rendered> + Send + Sync + 'static,
        props: Props,
    ) -> Node {
        Node::Element(Element {
            producer: Producer::ForwardRef(Arc::new(produce)),
            props,
        })
    }

    pub fn stateful(def: &Arc<StatefulDef>, props: Props) -> Node {
        Node::Element(Element {
            producer: Producer::Stateful(def.clone()),
            props,
        })
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => write!(f, "Empty"),
            Node::Text(value) => write!(f, "Text({value:?})"),
            Node::Number(value) => write!(f, "Number({value})"),
            Node::Fragment(members) => write!(f, "Fragment(len={})", members.len()),
            Node::Portal { children, .. } => write!(f, "Portal(len={})", children.len()),
            Node::Provide { slot, .. } => write!(f, "Provide({})", slot.name()),
            Node::Consume { slot, .. } => write!(f, "Consume({})", slot.name()),
            Node::Element(element) => element.fmt(f),
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.producer {
            Producer::Composite => write!(f, "Composite({:?})", self.props),
            Producer::Function(_) => write!(f, "Function({:?})", self.props),
            Producer::ForwardRef(_) => write!(f, "ForwardRef({:?})", self.props),
            Producer::Stateful(def) => write!(f, "Stateful({}, {:?})", def.name, self.props),
        }
    }
}
