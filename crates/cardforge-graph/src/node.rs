use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use cardforge_core::error::Result;

use crate::state::{State, StateUpdate};

/// A unit of work in a graph.
///
/// A step gets its own snapshot of the run state and returns only the keys
/// it computed. It never sees writes made by steps running beside it.
pub trait Step: Send + Sync + 'static {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>>;
}

/// Adapter turning an async closure into a [`Step`].
pub struct FnStep<F> {
    f: F,
}

impl<F, Fut> Step for FnStep<F>
where
    F: Fn(State) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
{
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin((self.f)(state))
    }
}

/// What a node does when it is reached.
#[derive(Clone)]
pub enum NodeKind {
    /// Run a step and merge its update.
    Step(Arc<dyn Step>),
    /// Pure fan-out marker: no step, no update, just schedules its children.
    Split,
}

/// A named node in the graph.
#[derive(Clone)]
pub struct Node {
    /// Unique name within the graph.
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    /// A node bound to a step.
    pub fn step(name: impl Into<String>, step: impl Step) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Step(Arc::new(step)),
        }
    }

    /// A node bound to an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(State) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StateUpdate>> + Send + 'static,
    {
        Self::step(name, FnStep { f })
    }

    /// A fan-out marker node.
    pub fn split(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Split,
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self.kind, NodeKind::Split)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            NodeKind::Step(_) => "step",
            NodeKind::Split => "split",
        };
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
