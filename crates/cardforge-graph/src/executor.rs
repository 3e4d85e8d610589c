use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cardforge_core::error::{CardforgeError, Result};

use crate::edge::SKIP;
use crate::graph::{CompiledGraph, Hop, Outgoing};
use crate::node::NodeKind;
use crate::observer::{StepObserver, TracingObserver};
use crate::state::{State, StateUpdate};

/// Result of executing a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    /// Which node was executed.
    pub node: String,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
    /// Keys the node's partial update wrote.
    pub keys_written: Vec<String>,
}

/// How a run reached the terminal marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every scheduled node ran to the end of the pipeline.
    Completed,
    /// A conditional edge took its [`SKIP`] label to the terminal marker.
    /// Other labels that end the run leave it `Completed`.
    Skipped { node: String, label: String },
}

/// Result of executing an entire graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Final accumulated state.
    pub state: State,
    pub outcome: RunOutcome,
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// Total execution time in milliseconds.
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, RunOutcome::Skipped { .. })
    }

    /// Names of the nodes that ran, in execution order.
    pub fn executed(&self) -> Vec<&str> {
        self.node_results.iter().map(|r| r.node.as_str()).collect()
    }
}

/// Runs a compiled graph against an initial state.
///
/// Nodes run in waves. Every node in a wave sees the same state snapshot;
/// the wave's updates are then merged in node declaration order, so sibling
/// writes to one key resolve the same way on every run. A node with several
/// parents becomes ready once each parent has either fired an edge into it
/// or been ruled out by a branch not taken. Nodes that only a dead branch
/// leads to are never run.
///
/// The first failing step (in declaration order) aborts the run; its error
/// is returned wrapped in [`CardforgeError::StepExecution`] and the partial
/// state is dropped. Nothing is retried here.
pub struct GraphExecutor {
    graph: Arc<CompiledGraph>,
    observer: Arc<dyn StepObserver>,
}

impl GraphExecutor {
    pub fn new(graph: CompiledGraph) -> Self {
        Self::shared(Arc::new(graph))
    }

    pub fn shared(graph: Arc<CompiledGraph>) -> Self {
        Self {
            graph,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Execute the graph once.
    pub async fn execute(&self, initial: State) -> Result<ExecutionResult> {
        let graph = &self.graph;
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(run_id = %run_id, graph = %graph.name, "Graph run started");

        let mut run = RunTracker::new(graph);
        let mut ready: BTreeSet<usize> = BTreeSet::from([graph.start]);
        let mut state = initial;
        let mut node_results = Vec::new();
        let mut outcome = RunOutcome::Completed;

        while !ready.is_empty() {
            let wave: Vec<usize> = std::mem::take(&mut ready).into_iter().collect();
            let snapshot = state.clone();

            let finished = join_all(wave.iter().map(|&i| self.run_node(i, &snapshot))).await;

            let mut updates = Vec::with_capacity(wave.len());
            for (&i, result) in wave.iter().zip(finished) {
                match result {
                    Ok(done) => updates.push((i, done)),
                    Err(e) => {
                        warn!(
                            run_id = %run_id,
                            node = %graph.nodes[i].name,
                            error = %e,
                            "Graph run failed"
                        );
                        return Err(CardforgeError::in_step(graph.nodes[i].name.clone(), e));
                    }
                }
            }

            for (i, (update, elapsed)) in updates {
                let name = &graph.nodes[i].name;
                let taken = self.route(i, &snapshot, &update)?;

                for hop in taken.fired {
                    match hop {
                        Hop::Node(child) => run.fire(child, &mut ready),
                        Hop::End => {
                            if let Some(label) = taken.label.as_deref().filter(|l| *l == SKIP) {
                                debug!(node = %name, label = %label, "Branch skipped to end");
                                outcome = RunOutcome::Skipped {
                                    node: name.clone(),
                                    label: label.to_string(),
                                };
                            }
                        }
                    }
                }
                for child in taken.dead {
                    run.kill(child, &mut ready);
                }

                node_results.push(NodeResult {
                    node: name.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    keys_written: update.keys().map(str::to_string).collect(),
                });
                state.apply(&update);
            }
        }

        let total_elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            graph = %graph.name,
            nodes = node_results.len(),
            skipped = matches!(outcome, RunOutcome::Skipped { .. }),
            total_elapsed_ms,
            "Graph run finished"
        );

        Ok(ExecutionResult {
            state,
            outcome,
            node_results,
            total_elapsed_ms,
        })
    }

    async fn run_node(&self, i: usize, snapshot: &State) -> Result<(StateUpdate, Duration)> {
        let node = &self.graph.nodes[i];
        let step = match &node.kind {
            NodeKind::Split => return Ok((StateUpdate::new(), Duration::ZERO)),
            NodeKind::Step(step) => step,
        };

        self.observer.on_start(&node.name, snapshot);
        let node_start = Instant::now();
        match step.run(snapshot.clone()).await {
            Ok(update) => {
                let elapsed = node_start.elapsed();
                self.observer.on_finish(&node.name, snapshot, &update, elapsed);
                Ok((update, elapsed))
            }
            Err(e) => {
                self.observer.on_error(&node.name, &e, node_start.elapsed());
                Err(e)
            }
        }
    }

    /// Decide which outgoing edges of node `i` fire.
    fn route(&self, i: usize, snapshot: &State, update: &StateUpdate) -> Result<Taken> {
        let outgoing = &self.graph.outgoing[i];
        match outgoing {
            Outgoing::Always(hops) => Ok(Taken {
                fired: hops.clone(),
                dead: Vec::new(),
                label: None,
            }),
            Outgoing::Branch { predicate, routes } => {
                let view = snapshot.merged(update);
                let label = predicate.route(&view);

                let mut fired: Vec<Hop> = Vec::new();
                for (l, hop) in routes {
                    if l == label && !fired.contains(hop) {
                        fired.push(*hop);
                    }
                }
                if fired.is_empty() {
                    return Err(CardforgeError::GraphConfig(format!(
                        "node '{}': branch label '{}' has no route",
                        self.graph.nodes[i].name, label
                    )));
                }

                let dead = outgoing
                    .targets()
                    .into_iter()
                    .filter(|hop| !fired.contains(hop))
                    .filter_map(|hop| match hop {
                        Hop::Node(child) => Some(child),
                        Hop::End => None,
                    })
                    .collect();

                Ok(Taken {
                    fired,
                    dead,
                    label: Some(label.to_string()),
                })
            }
        }
    }
}

/// Outcome of routing one finished node.
struct Taken {
    fired: Vec<Hop>,
    /// Children on branches not taken.
    dead: Vec<usize>,
    /// Label chosen, for conditional nodes.
    label: Option<String>,
}

/// Per-run bookkeeping: how many parents each node still waits on and
/// whether any of them fired an edge into it.
struct RunTracker<'g> {
    graph: &'g CompiledGraph,
    waiting: Vec<usize>,
    fired: Vec<bool>,
}

impl<'g> RunTracker<'g> {
    fn new(graph: &'g CompiledGraph) -> Self {
        Self {
            graph,
            waiting: graph.parents.iter().map(Vec::len).collect(),
            fired: vec![false; graph.nodes.len()],
        }
    }

    fn fire(&mut self, child: usize, ready: &mut BTreeSet<usize>) {
        self.fired[child] = true;
        self.settle(child, ready);
    }

    fn kill(&mut self, child: usize, ready: &mut BTreeSet<usize>) {
        self.settle(child, ready);
    }

    /// One parent of `child` is done. Once all are, the child either becomes
    /// ready or, if nothing fired into it, is dead and passes that on.
    fn settle(&mut self, child: usize, ready: &mut BTreeSet<usize>) {
        let mut pending = vec![child];
        while let Some(n) = pending.pop() {
            self.waiting[n] -= 1;
            if self.waiting[n] > 0 {
                continue;
            }
            if self.fired[n] {
                ready.insert(n);
                continue;
            }
            debug!(node = %self.graph.nodes[n].name, "Node not reached, skipping");
            for hop in self.graph.outgoing[n].targets() {
                if let Hop::Node(next) = hop {
                    pending.push(next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::edge::{ExistsPredicate, FnPredicate, CONTINUE, END};
    use crate::graph::GraphBuilder;
    use crate::node::Node;
    use crate::state::Value;

    fn writes(name: &str, key: &'static str, value: &'static str) -> Node {
        Node::from_fn(name, move |_| async move {
            Ok::<_, CardforgeError>(StateUpdate::new().set(key, value))
        })
    }

    fn fan_in_graph(left_delay_ms: u64) -> CompiledGraph {
        GraphBuilder::new("fan_in")
            .add_node(Node::split("fanout"))
            .add_node(Node::from_fn("left", move |_| async move {
                tokio::time::sleep(Duration::from_millis(left_delay_ms)).await;
                Ok::<_, CardforgeError>(StateUpdate::new().set("left", "L"))
            }))
            .add_node(writes("right", "right", "R"))
            .add_node(Node::from_fn("join", |s: State| async move {
                let joined = format!("{}+{}", s.require_str("left")?, s.require_str("right")?);
                Ok::<_, CardforgeError>(StateUpdate::new().set("joined", joined))
            }))
            .set_start("fanout")
            .add_edge("fanout", "left")
            .add_edge("fanout", "right")
            .add_edge("left", "join")
            .add_edge("right", "join")
            .add_edge("join", END)
            .compile()
            .unwrap()
    }

    fn duplicate_check_graph() -> CompiledGraph {
        GraphBuilder::new("check")
            .add_node(Node::from_fn("check", |s: State| async move {
                let exists = s.get_bool("present").unwrap_or(false);
                Ok::<_, CardforgeError>(StateUpdate::new().set("exists", exists))
            }))
            .add_node(writes("work", "meaning", "學生"))
            .set_start("check")
            .add_conditional_edges("check", ExistsPredicate, &[(SKIP, END), (CONTINUE, "work")])
            .add_edge("work", END)
            .compile()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fan_in_sees_both_parents() {
        // The slow child finishes last either way; the join still sees both.
        for delay in [0, 20] {
            let result = GraphExecutor::new(fan_in_graph(delay))
                .execute(State::new())
                .await
                .unwrap();
            assert_eq!(result.state.get_str("joined"), Some("L+R"));
            assert_eq!(result.outcome, RunOutcome::Completed);
            assert_eq!(result.executed(), vec!["fanout", "left", "right", "join"]);
        }
    }

    #[tokio::test]
    async fn test_siblings_see_same_snapshot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a_seen, b_seen) = (seen.clone(), seen.clone());

        let graph = GraphBuilder::new("snapshot")
            .add_node(Node::split("fanout"))
            .add_node(Node::from_fn("a", move |s: State| {
                a_seen.lock().unwrap().push(("a", s.contains("b")));
                async { Ok::<_, CardforgeError>(StateUpdate::new().set("a", true)) }
            }))
            .add_node(Node::from_fn("b", move |s: State| {
                b_seen.lock().unwrap().push(("b", s.contains("a")));
                async { Ok::<_, CardforgeError>(StateUpdate::new().set("b", true)) }
            }))
            .set_start("fanout")
            .add_edge("fanout", "a")
            .add_edge("fanout", "b")
            .add_edge("a", END)
            .add_edge("b", END)
            .compile()
            .unwrap();

        let result = GraphExecutor::new(graph).execute(State::new()).await.unwrap();
        assert_eq!(result.state.get_bool("a"), Some(true));
        assert_eq!(result.state.get_bool("b"), Some(true));
        assert_eq!(*seen.lock().unwrap(), vec![("a", false), ("b", false)]);
    }

    #[tokio::test]
    async fn test_same_key_conflict_resolved_by_declaration_order() {
        let graph = GraphBuilder::new("conflict")
            .add_node(Node::split("fanout"))
            .add_node(Node::from_fn("first", |_| async {
                // Finishes last, still applied first.
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, CardforgeError>(StateUpdate::new().set("tag", "first"))
            }))
            .add_node(writes("second", "tag", "second"))
            .set_start("fanout")
            .add_edge("fanout", "first")
            .add_edge("fanout", "second")
            .add_edge("first", END)
            .add_edge("second", END)
            .compile()
            .unwrap();

        let executor = GraphExecutor::new(graph);
        for _ in 0..3 {
            let result = executor.execute(State::new()).await.unwrap();
            assert_eq!(result.state.get_str("tag"), Some("second"));
        }
    }

    #[tokio::test]
    async fn test_skip_branch_stops_run() {
        let executor = GraphExecutor::new(duplicate_check_graph());
        let result = executor
            .execute(State::new().with("present", true))
            .await
            .unwrap();

        assert!(result.is_skipped());
        assert_eq!(
            result.outcome,
            RunOutcome::Skipped {
                node: "check".into(),
                label: SKIP.into()
            }
        );
        assert_eq!(result.state.get_bool("exists"), Some(true));
        assert!(!result.state.contains("meaning"));
        assert_eq!(result.executed(), vec!["check"]);
    }

    #[tokio::test]
    async fn test_other_label_to_end_is_completed() {
        let graph = GraphBuilder::new("early_exit")
            .add_node(writes("check", "checked", "yes"))
            .add_node(writes("work", "meaning", "學生"))
            .set_start("check")
            .add_conditional_edges(
                "check",
                FnPredicate::new(&["done", "more"], |_| "done"),
                &[("done", END), ("more", "work")],
            )
            .add_edge("work", END)
            .compile()
            .unwrap();

        let result = GraphExecutor::new(graph).execute(State::new()).await.unwrap();
        assert_eq!(result.outcome, RunOutcome::Completed);
        assert!(!result.is_skipped());
        assert_eq!(result.executed(), vec!["check"]);
    }

    #[tokio::test]
    async fn test_continue_branch_runs_each_node_once() {
        let executor = GraphExecutor::new(duplicate_check_graph());
        let result = executor
            .execute(State::new().with("present", false))
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.state.get_str("meaning"), Some("學生"));
        assert_eq!(result.executed(), vec!["check", "work"]);
        assert_eq!(result.node_results[0].keys_written, vec!["exists"]);
    }

    #[tokio::test]
    async fn test_step_failure_aborts_run() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let graph = GraphBuilder::new("failing")
            .add_node(Node::from_fn("parse", |_| async {
                Err::<StateUpdate, _>(CardforgeError::LlmRequest("HTTP 500".into()))
            }))
            .add_node(Node::from_fn("store", move |_| {
                *counter.lock().unwrap() += 1;
                async { Ok::<_, CardforgeError>(StateUpdate::new()) }
            }))
            .set_start("parse")
            .add_edge("parse", "store")
            .add_edge("store", END)
            .compile()
            .unwrap();

        let err = GraphExecutor::new(graph)
            .execute(State::new())
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), Some("parse"));
        assert!(matches!(err.root_cause(), CardforgeError::LlmRequest(_)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_first_failure_in_declaration_order_wins() {
        let graph = GraphBuilder::new("two_failures")
            .add_node(Node::split("fanout"))
            .add_node(Node::from_fn("a", |_| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<StateUpdate, _>(CardforgeError::Speech("a".into()))
            }))
            .add_node(Node::from_fn("b", |_| async {
                Err::<StateUpdate, _>(CardforgeError::Store("b".into()))
            }))
            .set_start("fanout")
            .add_edge("fanout", "a")
            .add_edge("fanout", "b")
            .add_edge("a", END)
            .add_edge("b", END)
            .compile()
            .unwrap();

        let err = GraphExecutor::new(graph)
            .execute(State::new())
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), Some("a"));
    }

    #[tokio::test]
    async fn test_dead_branch_does_not_block_fan_in() {
        // route ─┬─(fast)→ quick ─┐
        //        └─(slow)→ heavy ─┴→ finish
        let graph = GraphBuilder::new("either")
            .add_node(Node::from_fn("route", |_| async {
                Ok::<_, CardforgeError>(StateUpdate::new().set("mode", "fast"))
            }))
            .add_node(writes("quick", "path", "quick"))
            .add_node(writes("heavy", "path", "heavy"))
            .add_node(writes("finish", "done", "yes"))
            .set_start("route")
            .add_conditional_edges(
                "route",
                FnPredicate::new(&["fast", "slow"], |s: &State| {
                    if s.get_str("mode") == Some("fast") {
                        "fast"
                    } else {
                        "slow"
                    }
                }),
                &[("fast", "quick"), ("slow", "heavy")],
            )
            .add_edge("quick", "finish")
            .add_edge("heavy", "finish")
            .add_edge("finish", END)
            .compile()
            .unwrap();

        let result = GraphExecutor::new(graph).execute(State::new()).await.unwrap();
        assert_eq!(result.executed(), vec!["route", "quick", "finish"]);
        assert_eq!(result.state.get_str("path"), Some("quick"));
        assert_eq!(result.state.get_str("done"), Some("yes"));
        assert_eq!(result.outcome, RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_unrouted_label_is_config_error() {
        let graph = GraphBuilder::new("liar")
            .add_node(writes("start", "x", "1"))
            .add_node(writes("next", "y", "2"))
            .set_start("start")
            .add_conditional_edges(
                "start",
                // Declares only "go" but answers something else.
                FnPredicate::new(&["go"], |_| "elsewhere"),
                &[("go", "next")],
            )
            .add_edge("next", END)
            .compile()
            .unwrap();

        let err = GraphExecutor::new(graph)
            .execute(State::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CardforgeError::GraphConfig(_)));
    }

    #[tokio::test]
    async fn test_runs_are_deterministic() {
        let executor = GraphExecutor::new(fan_in_graph(5));
        let initial = State::new().with("word", "학생");
        let first = executor.execute(initial.clone()).await.unwrap();
        let second = executor.execute(initial).await.unwrap();
        assert_eq!(first.state, second.state);
        assert_eq!(first.executed(), second.executed());
    }

    #[tokio::test]
    async fn test_observer_sees_every_step() {
        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<String>>,
        }

        impl StepObserver for Recorder {
            fn on_start(&self, node: &str, _state: &State) {
                self.events.lock().unwrap().push(format!("start:{}", node));
            }
            fn on_finish(&self, node: &str, _b: &State, u: &StateUpdate, _e: Duration) {
                self.events
                    .lock()
                    .unwrap()
                    .push(format!("finish:{}:{}", node, u.len()));
            }
        }

        let recorder = Arc::new(Recorder::default());
        let executor = GraphExecutor::new(duplicate_check_graph()).with_observer(recorder.clone());
        executor
            .execute(State::new().with("present", Value::Bool(false)))
            .await
            .unwrap();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start:check", "finish:check:1", "start:work", "finish:work:1"]
        );
    }
}
