//! DAG workflow engine.
//!
//! A graph is built with [`GraphBuilder`], validated once by
//! [`GraphBuilder::compile`], and run any number of times by a
//! [`GraphExecutor`]. Steps read a [`State`] snapshot and return a
//! [`StateUpdate`]; conditional edges pick a route from a
//! [`BranchPredicate`] label; split nodes fan out and nodes with several
//! parents fan back in.

pub mod edge;
pub mod executor;
pub mod graph;
pub mod node;
pub mod observer;
pub mod state;

pub use edge::{BranchPredicate, ExistsPredicate, FnPredicate, Target, CONTINUE, END, SKIP};
pub use executor::{ExecutionResult, GraphExecutor, NodeResult, RunOutcome};
pub use graph::{CompiledGraph, GraphBuilder};
pub use node::{FnStep, Node, NodeKind, Step};
pub use observer::{NoopObserver, StepObserver, TracingObserver};
pub use state::{State, StateUpdate, Value};
