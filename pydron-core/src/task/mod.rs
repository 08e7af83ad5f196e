//! The task contract (spec §3, §4.4) and the concrete catalog built on it.

pub mod catalog;

use std::collections::HashMap;
use std::fmt;

use serde_json::{json, Value as Json};

use crate::graph::Graph;
use crate::tick::Tick;
use crate::value::Value;

pub type Inputs = HashMap<String, Value>;
pub type Outputs = HashMap<String, Value>;

/// A task-level failure — the `evaluate`/`refine` contract's `Failure`
/// variant, as opposed to an infrastructure error. The worker and
/// traverser wrap this with the offending tick to produce a
/// [`crate::error::PydronError::Evaluation`] or `::Refinement`.
#[derive(Debug, Clone)]
pub struct TaskFailure(pub String);

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for TaskFailure {}

impl TaskFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskFailure>;

/// How a refiner port's gathered data is projected before being handed to
/// `refine` — e.g. `If`/`While` only need the test value's truthiness, not
/// the value itself (spec §4.4 `refiner_reducer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducerKind {
    Identity,
    Bool,
}

impl ReducerKind {
    pub fn apply(&self, v: &Value) -> Value {
        match self {
            ReducerKind::Identity => v.clone(),
            ReducerKind::Bool => Value::Bool(v.truthy()),
        }
    }
}

/// A unit of computation with declared input/output ports (spec §3).
///
/// Implementors are immutable once placed in a graph; the only state a
/// task carries is whatever constant payload it closed over at graph-build
/// time (e.g. `Const`'s value, `BinOp`'s opcode).
pub trait Task: Send + Sync + fmt::Debug {
    /// Stable name used in diagnostics, structural equality and scheduling
    /// hints' debug output.
    fn kind(&self) -> &'static str;

    fn input_ports(&self) -> Vec<String>;
    fn output_ports(&self) -> Vec<String>;

    /// The subset of input ports that gate refinement, if this task is
    /// refinable at all. `None` means the task goes straight to evaluation
    /// once its evaluation inputs are ready.
    fn refiner_ports(&self) -> Option<Vec<String>> {
        None
    }

    fn is_refinable(&self) -> bool {
        self.refiner_ports().is_some()
    }

    fn refiner_reducer(&self, _port: &str) -> ReducerKind {
        ReducerKind::Identity
    }

    /// Named subgraphs this task carries (`if`/`for`/`while`/function
    /// definitions). Cheap to clone — subgraphs share their task `Arc`s.
    fn subgraphs(&self) -> Vec<(&'static str, Graph)> {
        Vec::new()
    }

    /// Pure evaluation step. Never called unless the task is not
    /// refinable, or refinement has already marked it `refined = true`.
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs>;

    /// Mutates `graph` in place — typically splicing a subgraph in place
    /// of `tick` — using only the data gathered for `refiner_ports`
    /// (optionally projected by `refiner_reducer`). Default: not called,
    /// since `refiner_ports` is `None`.
    fn refine(&self, _graph: &mut Graph, _tick: &Tick, _known_inputs: &Inputs) -> TaskResult<()> {
        Ok(())
    }

    /// JSON description used for graph structural equality and debug
    /// rendering; override to fold in constant payloads (e.g. `Const`).
    fn structural_key(&self) -> Json {
        json!({ "kind": self.kind() })
    }

    /// Must run on the master worker (spec §4.9 fixed-worker constraints).
    fn masteronly(&self) -> bool {
        false
    }

    /// Strictly ordered with respect to every lower-tick task.
    fn syncpoint(&self) -> bool {
        false
    }

    /// Cheap enough to run on the master without reserving a worker.
    fn quick(&self) -> bool {
        false
    }

    /// Output ports whose values must never be serialized or leave the
    /// producing worker (e.g. `Iter`/`Next`'s iterator output).
    fn nosend_ports(&self) -> Vec<String> {
        Vec::new()
    }
}
