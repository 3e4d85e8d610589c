use std::sync::Arc;

use crate::state::State;

/// Name of the terminal marker. Edges pointing here end the run.
pub const END: &str = "__end__";

/// Branch label for "content already exists, stop here".
pub const SKIP: &str = "skip";
/// Branch label for "carry on with the pipeline".
pub const CONTINUE: &str = "continue";

/// Where an edge leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    End,
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Node(n) => n,
            Target::End => END,
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        if name == END {
            Target::End
        } else {
            Target::Node(name.to_string())
        }
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::from(name.as_str())
    }
}

/// An unconditional edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: Target,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<Target>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Picks the next edge from the state left by the node that owns it.
///
/// `labels` declares every label `route` may return; compilation checks
/// each of them has a route.
pub trait BranchPredicate: Send + Sync + 'static {
    fn labels(&self) -> &[&'static str];

    fn route(&self, state: &State) -> &'static str;
}

/// `continue` when the `exists` key is explicitly `false`, `skip` otherwise
/// (including when it is missing or null).
pub struct ExistsPredicate;

impl BranchPredicate for ExistsPredicate {
    fn labels(&self) -> &[&'static str] {
        &[SKIP, CONTINUE]
    }

    fn route(&self, state: &State) -> &'static str {
        if state.get_bool("exists") == Some(false) {
            CONTINUE
        } else {
            SKIP
        }
    }
}

/// Predicate built from a closure and its label set.
pub struct FnPredicate<F> {
    labels: Vec<&'static str>,
    f: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(&State) -> &'static str + Send + Sync + 'static,
{
    pub fn new(labels: &[&'static str], f: F) -> Self {
        Self {
            labels: labels.to_vec(),
            f,
        }
    }
}

impl<F> BranchPredicate for FnPredicate<F>
where
    F: Fn(&State) -> &'static str + Send + Sync + 'static,
{
    fn labels(&self) -> &[&'static str] {
        &self.labels
    }

    fn route(&self, state: &State) -> &'static str {
        (self.f)(state)
    }
}

/// A conditional edge table: predicate plus label → target routes.
#[derive(Clone)]
pub struct Branch {
    pub from: String,
    pub predicate: Arc<dyn BranchPredicate>,
    pub routes: Vec<(String, Target)>,
}

impl Branch {
    /// Target for a label, if one is declared.
    pub fn target(&self, label: &str) -> Option<&Target> {
        self.routes
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, t)| t)
    }
}

impl std::fmt::Debug for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("from", &self.from)
            .field("labels", &self.predicate.labels())
            .field("routes", &self.routes)
            .finish()
    }
}
