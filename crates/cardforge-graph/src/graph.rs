use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use cardforge_core::error::{CardforgeError, Result};

use crate::edge::{Branch, BranchPredicate, Edge, Target, END};
use crate::node::Node;

/// Where a compiled edge leads, by node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hop {
    Node(usize),
    End,
}

/// Outgoing edges of a compiled node.
#[derive(Clone)]
pub(crate) enum Outgoing {
    /// Unconditional edges; all of them fire. Two or more is a fan-out.
    Always(Vec<Hop>),
    /// One conditional table; exactly one label's targets fire.
    Branch {
        predicate: Arc<dyn BranchPredicate>,
        routes: Vec<(String, Hop)>,
    },
}

impl Outgoing {
    /// Every distinct target, in declaration order.
    pub(crate) fn targets(&self) -> Vec<Hop> {
        let mut out = Vec::new();
        let hops: Box<dyn Iterator<Item = Hop> + '_> = match self {
            Outgoing::Always(hops) => Box::new(hops.iter().copied()),
            Outgoing::Branch { routes, .. } => Box::new(routes.iter().map(|(_, h)| *h)),
        };
        for hop in hops {
            if !out.contains(&hop) {
                out.push(hop);
            }
        }
        out
    }
}

/// Static description of a workflow, validated by [`GraphBuilder::compile`].
///
/// Node declaration order matters: it is the order ready nodes are dispatched
/// in and the order their updates are merged in.
#[derive(Default)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    branches: Vec<Branch>,
    start: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a node.
    pub fn add_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an unconditional edge. Several edges out of one node fan out.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<Target>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    /// Attach a conditional edge table to `from`.
    pub fn add_conditional_edges<P: BranchPredicate>(
        mut self,
        from: impl Into<String>,
        predicate: P,
        routes: &[(&str, &str)],
    ) -> Self {
        self.branches.push(Branch {
            from: from.into(),
            predicate: Arc::new(predicate),
            routes: routes
                .iter()
                .map(|(label, to)| (label.to_string(), Target::from(*to)))
                .collect(),
        });
        self
    }

    /// Set the entry node.
    pub fn set_start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Fails with [`CardforgeError::GraphConfig`] on duplicate or unknown
    /// nodes, a node with no way out, a predicate label with no route,
    /// cycles, or nodes unreachable from the start.
    pub fn compile(self) -> Result<CompiledGraph> {
        let GraphBuilder {
            name,
            nodes,
            edges,
            branches,
            start,
        } = self;

        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if node.name == END {
                return Err(config_err(format!("'{}' is reserved for the terminal marker", END)));
            }
            if index.insert(node.name.clone(), i).is_some() {
                return Err(config_err(format!("duplicate node '{}'", node.name)));
            }
        }

        let start_name = start.ok_or_else(|| config_err("no start node set".to_string()))?;
        let start = *index
            .get(&start_name)
            .ok_or_else(|| config_err(format!("start node '{}' not found", start_name)))?;

        let resolve = |target: &Target, from: &str| -> Result<Hop> {
            match target {
                Target::End => Ok(Hop::End),
                Target::Node(n) => index.get(n).map(|&i| Hop::Node(i)).ok_or_else(|| {
                    config_err(format!("edge '{}' -> '{}': unknown target node", from, n))
                }),
            }
        };

        let mut always: Vec<Vec<Hop>> = vec![Vec::new(); nodes.len()];
        for edge in &edges {
            let from = *index.get(&edge.from).ok_or_else(|| {
                config_err(format!("edge from unknown node '{}'", edge.from))
            })?;
            let hop = resolve(&edge.to, &edge.from)?;
            if always[from].contains(&hop) {
                return Err(config_err(format!(
                    "duplicate edge '{}' -> '{}'",
                    edge.from,
                    edge.to.name()
                )));
            }
            always[from].push(hop);
        }

        let mut conditional: Vec<Option<Outgoing>> = vec![None; nodes.len()];
        for branch in &branches {
            let from = *index.get(&branch.from).ok_or_else(|| {
                config_err(format!("conditional edges from unknown node '{}'", branch.from))
            })?;
            if conditional[from].is_some() {
                return Err(config_err(format!(
                    "node '{}' has more than one conditional edge table",
                    branch.from
                )));
            }
            if !always[from].is_empty() {
                return Err(config_err(format!(
                    "node '{}' mixes conditional and unconditional edges",
                    branch.from
                )));
            }
            for label in branch.predicate.labels() {
                if branch.target(label).is_none() {
                    return Err(config_err(format!(
                        "node '{}': predicate label '{}' has no route",
                        branch.from, label
                    )));
                }
            }
            let routes = branch
                .routes
                .iter()
                .map(|(label, target)| Ok((label.clone(), resolve(target, &branch.from)?)))
                .collect::<Result<Vec<_>>>()?;
            conditional[from] = Some(Outgoing::Branch {
                predicate: branch.predicate.clone(),
                routes,
            });
        }

        let mut outgoing = Vec::with_capacity(nodes.len());
        for (i, hops) in always.into_iter().enumerate() {
            let out = match conditional[i].take() {
                Some(branch) => branch,
                None if hops.is_empty() => {
                    return Err(config_err(format!(
                        "node '{}' has no outgoing edge (route it to {})",
                        nodes[i].name, END
                    )));
                }
                None => Outgoing::Always(hops),
            };
            outgoing.push(out);
        }

        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, out) in outgoing.iter().enumerate() {
            for hop in out.targets() {
                if let Hop::Node(child) = hop {
                    parents[child].push(i);
                }
            }
        }

        check_acyclic(&nodes, &outgoing, &parents)?;
        check_reachable(&nodes, &outgoing, start)?;

        Ok(CompiledGraph {
            name,
            nodes,
            start,
            outgoing,
            parents,
        })
    }
}

fn config_err(message: String) -> CardforgeError {
    CardforgeError::GraphConfig(message)
}

/// Kahn's algorithm over node-to-node edges.
fn check_acyclic(nodes: &[Node], outgoing: &[Outgoing], parents: &[Vec<usize>]) -> Result<()> {
    let mut in_degree: Vec<usize> = parents.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0;

    while let Some(i) = queue.pop_front() {
        visited += 1;
        for hop in outgoing[i].targets() {
            if let Hop::Node(child) = hop {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    if visited == nodes.len() {
        return Ok(());
    }
    let cyclic: Vec<&str> = (0..nodes.len())
        .filter(|&i| in_degree[i] > 0)
        .map(|i| nodes[i].name.as_str())
        .collect();
    Err(config_err(format!("cycle through nodes: {}", cyclic.join(", "))))
}

fn check_reachable(nodes: &[Node], outgoing: &[Outgoing], start: usize) -> Result<()> {
    let mut seen: HashSet<usize> = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(i) = queue.pop_front() {
        for hop in outgoing[i].targets() {
            if let Hop::Node(child) = hop {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
    }

    match nodes.iter().enumerate().find(|(i, _)| !seen.contains(i)) {
        Some((_, node)) => Err(config_err(format!(
            "node '{}' is unreachable from the start node",
            node.name
        ))),
        None => Ok(()),
    }
}

/// A validated, immutable graph ready to run.
pub struct CompiledGraph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) start: usize,
    pub(crate) outgoing: Vec<Outgoing>,
    /// Distinct parents of each node, in parent declaration order.
    pub(crate) parents: Vec<Vec<usize>>,
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &str {
        &self.nodes[self.start].name
    }

    /// Node names in declaration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Names of the nodes feeding `name`, or `None` for an unknown node.
    pub fn parents_of(&self, name: &str) -> Option<Vec<&str>> {
        let i = self.nodes.iter().position(|n| n.name == name)?;
        Some(
            self.parents[i]
                .iter()
                .map(|&p| self.nodes[p].name.as_str())
                .collect(),
        )
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("start", &self.start())
            .field("nodes", &self.nodes)
            .finish()
    }
}
