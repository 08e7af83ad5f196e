//! The traverser (spec §4.5, §5): drives a graph to completion by
//! alternating a refinement pass (splicing refinable tasks away) and an
//! evaluation pass (running ready tasks on a worker), propagating each
//! result along the graph's edges until `final` has collected every
//! declared output port.
//!
//! Every tick moves through five phases: `AwaitingRefine` (only if the
//! task is refinable), `Refining`, `AwaitingEval`, `Evaluating`, `Done`.
//! Non-refinable tasks skip straight from creation to `AwaitingEval`.
//!
//! This default execution path runs entirely against one local
//! [`crate::worker::Worker`] holding live [`Value`]s end to end — the
//! `ValueRef`/multi-worker transfer machinery in [`crate::worker`] is the
//! seam a [`crate::pool::Pool`] composes on top of for distributed
//! execution; driving it through here as well is out of scope for this
//! engine's default single-process path (see DESIGN.md).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::trace;

use crate::error::{PydronError, Result};
use crate::graph::{Endpoint, Graph};
use crate::ready::{EvalReady, ReadyTracker, RefineReady};
use crate::tick::Tick;
use crate::value::Value;
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickPhase {
    AwaitingRefine,
    Refining,
    AwaitingEval,
    Evaluating,
    Done,
}

/// Shared flag a running traversal polls between ticks; cheap to clone and
/// hand to a caller that wants to cancel a `spawn`ed traversal.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A traversal running on a background task. `cancel` asks it to stop at
/// the next tick boundary; `join` awaits its result.
pub struct Execution {
    handle: tokio::task::JoinHandle<Result<HashMap<String, Value>>>,
    cancellation: CancellationHandle,
}

impl Execution {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub async fn join(self) -> Result<HashMap<String, Value>> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(PydronError::invariant(format!("traversal task panicked: {e}"))),
        }
    }
}

/// Drives one graph to completion against a single local worker.
pub struct Traverser {
    worker: Arc<Worker>,
}

impl Traverser {
    pub fn new() -> Self {
        Self { worker: Arc::new(Worker::new("local")) }
    }

    pub fn with_worker(worker: Arc<Worker>) -> Self {
        Self { worker }
    }

    /// Runs `graph` to completion in the calling task, honoring
    /// `cancellation` between ticks. Returns the values collected at every
    /// `final` input port.
    pub async fn execute(
        &self,
        mut graph: Graph,
        initial_inputs: HashMap<String, Value>,
        cancellation: &CancellationHandle,
    ) -> Result<HashMap<String, Value>> {
        let mut refine_tracker = ReadyTracker::new(RefineReady);
        let mut eval_tracker = ReadyTracker::new(EvalReady);
        refine_tracker.resync(&graph);
        eval_tracker.resync(&graph);

        let mut phases: HashMap<Tick, TickPhase> = HashMap::new();
        for tick in graph.ticks() {
            if tick.is_start() || tick.is_final() {
                continue;
            }
            let task = graph.task(tick).unwrap();
            phases.insert(tick.clone(), if task.is_refinable() { TickPhase::AwaitingRefine } else { TickPhase::AwaitingEval });
        }

        let set_phase = |phases: &mut HashMap<Tick, TickPhase>, tick: &Tick, phase: TickPhase| {
            trace!(%tick, ?phase, "tick phase transition");
            phases.insert(tick.clone(), phase);
        };

        let mut final_outputs: HashMap<String, Value> = HashMap::new();
        let final_port_count = graph.connections_in(&Tick::final_tick()).len();

        for (port, dest) in graph.connections_out(&Tick::start()) {
            let Some(value) = initial_inputs.get(&port).cloned() else { continue };
            Self::propagate(&graph, &mut refine_tracker, &mut eval_tracker, &mut final_outputs, &dest, value);
        }

        loop {
            if cancellation.is_cancelled() {
                return Err(PydronError::Cancelled);
            }

            let mut progressed = false;

            while let Some(tick) = refine_tracker.next_ready(&graph) {
                progressed = true;
                set_phase(&mut phases, &tick, TickPhase::Refining);
                let task = graph.task(&tick).expect("ready tick must exist in graph");

                if task.is_refinable() {
                    let mut known = refine_tracker.collected(&tick);
                    for (port, value) in known.iter_mut() {
                        *value = task.refiner_reducer(port).apply(value);
                    }
                    task.refine(&mut graph, &tick, &known).map_err(|f| PydronError::refinement(tick.clone(), f.0))?;
                    refine_tracker.mark_done(&tick);
                    if graph.contains(&tick) {
                        graph.set_property(&tick, "refined", json!(true))?;
                        set_phase(&mut phases, &tick, TickPhase::AwaitingEval);
                    } else {
                        phases.remove(&tick);
                    }
                    refine_tracker.resync(&graph);
                    eval_tracker.resync(&graph);
                    for tick in graph.ticks() {
                        if tick.is_start() || tick.is_final() {
                            continue;
                        }
                        phases.entry(tick.clone()).or_insert_with(|| {
                            let task = graph.task(tick).unwrap();
                            if task.is_refinable() { TickPhase::AwaitingRefine } else { TickPhase::AwaitingEval }
                        });
                    }
                } else {
                    refine_tracker.mark_done(&tick);
                    set_phase(&mut phases, &tick, TickPhase::AwaitingEval);
                }
            }

            if let Some(tick) = eval_tracker.next_ready(&graph) {
                progressed = true;
                set_phase(&mut phases, &tick, TickPhase::Evaluating);
                let task = graph.task(&tick).expect("ready tick must exist in graph");
                let inputs = eval_tracker.collected(&tick);
                let nosend = task.nosend_ports();
                let result = self.worker.evaluate(&tick, task.as_ref(), inputs, &nosend, false);

                if let Some(failure) = result.failure {
                    return Err(PydronError::evaluation(tick.clone(), failure.0));
                }
                let outputs = result.outputs.expect("evaluate returns outputs or a failure");
                for (port, out) in outputs {
                    let value = self.worker.get_value(out.value_id)?;
                    for (_, dest) in graph.connections_out(&tick).into_iter().filter(|(p, _)| p == &port) {
                        Self::propagate(&graph, &mut refine_tracker, &mut eval_tracker, &mut final_outputs, &dest, value.clone());
                    }
                }
                eval_tracker.mark_done(&tick);
                set_phase(&mut phases, &tick, TickPhase::Done);
            }

            if final_outputs.len() >= final_port_count {
                return Ok(final_outputs);
            }
            if !progressed {
                return Err(PydronError::invariant("traversal stalled: no tick is ready but final is not fully collected"));
            }
        }
    }

    /// Feeds `value` into whatever tracker(s) `dest` concerns: the eval
    /// tracker always, the refine tracker too if `dest.port` is one of that
    /// task's refiner ports, or `final_outputs` directly if `dest` is the
    /// program's output.
    fn propagate(
        graph: &Graph,
        refine_tracker: &mut ReadyTracker<RefineReady>,
        eval_tracker: &mut ReadyTracker<EvalReady>,
        final_outputs: &mut HashMap<String, Value>,
        dest: &Endpoint,
        value: Value,
    ) {
        if dest.tick.is_final() {
            final_outputs.insert(dest.port.clone(), value);
            return;
        }
        eval_tracker.set_output_data(&dest.tick, &dest.port, value.clone());
        if let Some(task) = graph.task(&dest.tick) {
            if task.refiner_ports().map(|ports| ports.iter().any(|p| p == &dest.port)).unwrap_or(false) {
                refine_tracker.set_output_data(&dest.tick, &dest.port, value);
            }
        }
    }

    /// Runs `graph` on a background task, returning a handle that can
    /// cancel it or await its result.
    pub fn spawn(self: Arc<Self>, graph: Graph, initial_inputs: HashMap<String, Value>) -> Execution
    where
        Self: 'static,
    {
        let cancellation = CancellationHandle::new();
        let task_cancellation = cancellation.clone();
        let handle = tokio::spawn(async move { self.execute(graph, initial_inputs, &task_cancellation).await });
        Execution { handle, cancellation }
    }
}

impl Default for Traverser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Endpoint;
    use crate::task::catalog::const_task::Const;
    use crate::task::catalog::control_flow::If;
    use crate::task::catalog::ops::{BinOp, BinOpCode};

    fn const_retval_graph(value: Value) -> Graph {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Const::new(value))).unwrap();
        g.connect(Endpoint::new(t1, "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();
        g
    }

    #[tokio::test]
    async fn scenario_constant_return() {
        let g = const_retval_graph(Value::Int(42));
        let traverser = Traverser::new();
        let out = traverser.execute(g, HashMap::new(), &CancellationHandle::new()).await.unwrap();
        assert_eq!(out.get("retval"), Some(&Value::Int(42)));
    }

    #[tokio::test]
    async fn scenario_binary_op() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        let t2 = Tick::start().incremented(2);
        let t3 = Tick::start().incremented(3);
        g.add_task(t1.clone(), Arc::new(Const::new(Value::Int(40)))).unwrap();
        g.add_task(t2.clone(), Arc::new(Const::new(Value::Int(2)))).unwrap();
        g.add_task(t3.clone(), Arc::new(BinOp::new(BinOpCode::Add))).unwrap();
        g.connect(Endpoint::new(t1, "value"), Endpoint::new(t3.clone(), "left")).unwrap();
        g.connect(Endpoint::new(t2, "value"), Endpoint::new(t3.clone(), "right")).unwrap();
        g.connect(Endpoint::new(t3, "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let traverser = Traverser::new();
        let out = traverser.execute(g, HashMap::new(), &CancellationHandle::new()).await.unwrap();
        assert_eq!(out.get("retval"), Some(&Value::Int(42)));
    }

    #[tokio::test]
    async fn scenario_conditional_picks_branch_from_external_input() {
        let if_task = If::new(const_retval_graph(Value::Int(1)), const_retval_graph(Value::Int(2)));
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(if_task)).unwrap();
        g.connect(Endpoint::new(Tick::start(), "cond"), Endpoint::new(t1.clone(), "$test")).unwrap();
        g.connect(Endpoint::new(t1, "retval"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let mut inputs = HashMap::new();
        inputs.insert("cond".to_string(), Value::Bool(true));
        let traverser = Traverser::new();
        let out = traverser.execute(g, inputs, &CancellationHandle::new()).await.unwrap();
        assert_eq!(out.get("retval"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn cancelled_traversal_returns_cancelled_error() {
        let g = const_retval_graph(Value::Int(1));
        let cancellation = CancellationHandle::new();
        cancellation.cancel();
        let traverser = Traverser::new();
        let err = traverser.execute(g, HashMap::new(), &cancellation).await.unwrap_err();
        assert!(matches!(err, PydronError::Cancelled));
    }
}
