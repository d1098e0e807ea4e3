//! Shared fixtures for the walker integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use tree_walker::tree::context::{ContextMap, Overlay};
use tree_walker::tree::instance::Instance;
use tree_walker::tree::node::{Node, Rendered, StatefulDef};
use tree_walker::tree::props::Props;
use tree_walker::tree::visitor::{Flow, Visitor};

pub fn init() {
    let _ = tree_walker::logging::init_logger(false, Some("warn"), false);
}

/// Deferred data fetch stored in a node's attribute bag.
pub type DataFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<i64>> + Send + Sync>;

pub fn deferred(value: i64) -> DataFn {
    Arc::new(move || {
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(value)
        }
        .boxed()
    })
}

/// Stateful descriptor carrying a `data` attribute and rendering a plain
/// wrapper around its children.
pub fn item_def() -> Arc<StatefulDef> {
    Arc::new(StatefulDef::new("Item", |instance: &Instance| {
        Ok(Rendered::Node(match instance.children() {
            Some(child) => Node::composite(Props::new().with_children(child.clone())),
            None => Node::composite(Props::new()),
        }))
    }))
}

/// Plain composite wrapping a single child.
pub fn wrap(child: Node) -> Node {
    Node::composite(Props::new().with_children(child))
}

/// Stateless function producer wrapping its children in a plain composite.
pub fn stateless_wrapper(child: Node) -> Node {
    Node::function(
        |props, _context| {
            Ok(Rendered::Node(match props.children() {
                Some(child) => Node::composite(Props::new().with_children(child.clone())),
                None => Node::Empty,
            }))
        },
        Props::new().with_children(child),
    )
}

/// The canonical fixture tree:
///
/// ```text
/// Root[ h1("Hello World!"), Item(1), Item(2)[ Wrapper[ Item(4)[Item(5), Item(6)] ], div("hi!") ], Item(3) ]
/// ```
///
/// With `defer` set, every `data` attribute is an asynchronous fetch that
/// resolves after a short delay.
pub fn sample_tree(defer: bool) -> Node {
    let item = item_def();
    let data = |value: i64| {
        if defer {
            Props::new().with("data", deferred(value))
        } else {
            Props::new().with("data", value)
        }
    };

    wrap(Node::fragment([
        wrap(Node::text("Hello World!")),
        Node::stateful(&item, data(1)),
        Node::stateful(
            &item,
            data(2).with_children(wrap(Node::fragment([
                stateless_wrapper(Node::stateful(
                    &item,
                    data(4).with_children(Node::fragment([
                        Node::stateful(&item, data(5)),
                        Node::stateful(&item, data(6)),
                    ])),
                )),
                wrap(Node::text("hi!")),
            ]))),
        ),
        Node::stateful(&item, data(3)),
    ]))
}

/// Collects the `data` attribute of every instance-backed node, awaiting
/// deferred fetches, and optionally fails or prunes at a chosen value.
#[derive(Default)]
pub struct DataCollector {
    pub seen: Mutex<Vec<i64>>,
    pub fail_at: Option<i64>,
    pub prune_at: Option<i64>,
}

impl DataCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(value: i64) -> Self {
        Self {
            fail_at: Some(value),
            ..Self::default()
        }
    }

    pub fn pruning_at(value: i64) -> Self {
        Self {
            prune_at: Some(value),
            ..Self::default()
        }
    }

    pub fn collected(&self) -> Vec<i64> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Visitor for DataCollector {
    async fn visit(
        &self,
        _node: &Node,
        instance: Option<&Arc<Instance>>,
        _overlay: &Overlay,
        _context: &ContextMap,
        _child_context: &ContextMap,
    ) -> anyhow::Result<Flow> {
        let Some(instance) = instance else {
            return Ok(Flow::Continue);
        };
        let value = if let Some(value) = instance.props().get_as::<i64>("data") {
            Some(*value)
        } else if let Some(fetch) = instance.props().get_as::<DataFn>("data") {
            Some((fetch.as_ref())().await?)
        } else {
            None
        };
        if let Some(value) = value {
            self.seen.lock().push(value);
            if self.fail_at == Some(value) {
                anyhow::bail!("visitor refused {value}");
            }
            if self.prune_at == Some(value) {
                return Ok(Flow::Prune);
            }
        }
        Ok(Flow::Continue)
    }
}

/// Collects every text leaf in visit order.
#[derive(Default)]
pub struct TextCollector {
    pub seen: Mutex<Vec<String>>,
}

impl TextCollector {
    pub fn collected(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Visitor for TextCollector {
    async fn visit(
        &self,
        node: &Node,
        _instance: Option<&Arc<Instance>>,
        _overlay: &Overlay,
        _context: &ContextMap,
        _child_context: &ContextMap,
    ) -> anyhow::Result<Flow> {
        if let Node::Text(value) = node {
            self.seen.lock().push(value.clone());
        }
        Ok(Flow::Continue)
    }
}

/// Collects every numeric leaf in visit order.
#[derive(Default)]
pub struct NumberCollector {
    pub seen: Mutex<Vec<f64>>,
}

impl NumberCollector {
    pub fn collected(&self) -> Vec<f64> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Visitor for NumberCollector {
    async fn visit(
        &self,
        node: &Node,
        _instance: Option<&Arc<Instance>>,
        _overlay: &Overlay,
        _context: &ContextMap,
        _child_context: &ContextMap,
    ) -> anyhow::Result<Flow> {
        if let Node::Number(value) = node {
            self.seen.lock().push(*value);
        }
        Ok(Flow::Continue)
    }
}
