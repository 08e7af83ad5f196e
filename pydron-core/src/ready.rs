//! Ready trackers (spec §4.5): decide which tick is next to refine or
//! evaluate, honoring the two syncpoint ordering constraints every queue
//! policy obeys — a syncpoint never runs ahead of an unexecuted lower-tick
//! task, and a non-syncpoint never runs ahead of an unexecuted lower-tick
//! syncpoint.
//!
//! `RefineReady` and `EvalReady` are the two concrete policies the
//! traverser drives a graph with: refinement gates on incoming edges whose
//! destination port is one of the task's declared `refiner_ports`,
//! evaluation gates on every incoming edge plus the `refined` graph
//! property for tasks that needed refining first.

use std::collections::{HashMap, HashSet};

use crate::graph::Graph;
use crate::task::{Inputs, Task};
use crate::tick::Tick;
use crate::value::Value;

/// What makes a tick eligible for a given pass, and how syncpoints are
/// ordered within it.
pub trait ReadyPolicy: Send + Sync {
    /// Whether an incoming edge landing on `port` counts toward this pass's
    /// `required` set (spec §4.5: "count" is over incoming *edges*, not
    /// declared ports — a declared port a graph leaves unconnected must
    /// never block readiness).
    fn counts_port(&self, task: &dyn Task, port: &str) -> bool;

    /// Extra condition beyond "every counted port has data" — e.g.
    /// `EvalReady` also requires `refined = true` for refinable tasks.
    fn task_ready(&self, graph: &Graph, tick: &Tick, task: &dyn Task) -> bool;

    fn syncpoint_run_last(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RefineReady;

impl ReadyPolicy for RefineReady {
    fn counts_port(&self, task: &dyn Task, port: &str) -> bool {
        task.refiner_ports().unwrap_or_default().iter().any(|p| p == port)
    }

    fn task_ready(&self, _graph: &Graph, _tick: &Tick, _task: &dyn Task) -> bool {
        true
    }

    fn syncpoint_run_last(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EvalReady;

impl ReadyPolicy for EvalReady {
    fn counts_port(&self, _task: &dyn Task, _port: &str) -> bool {
        // every incoming edge is an evaluation input, declared or not
        true
    }

    fn task_ready(&self, graph: &Graph, tick: &Tick, task: &dyn Task) -> bool {
        if !task.is_refinable() {
            return true;
        }
        graph.get_property(tick, "refined").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    fn syncpoint_run_last(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct TickState {
    required: HashSet<String>,
    collected: HashMap<String, Value>,
    done: bool,
}

/// Per-tick bookkeeping (`count`/`ready`/`collected` in spec terms) plus the
/// lexicographic-with-syncpoints queue over a graph that mutates between
/// passes (refinement splices tasks in and out). Call [`ReadyTracker::resync`]
/// after any structural change to the wrapped graph — refinement in
/// particular replaces whole subtrees in one step, so this tracker rebuilds
/// its view from the graph rather than chasing individual edge events.
pub struct ReadyTracker<P: ReadyPolicy> {
    policy: P,
    state: HashMap<Tick, TickState>,
}

impl<P: ReadyPolicy> ReadyTracker<P> {
    pub fn new(policy: P) -> Self {
        Self { policy, state: HashMap::new() }
    }

    /// Rebuilds bookkeeping for every interior tick currently in `graph`,
    /// preserving already-collected data and `done` flags for ticks that
    /// survive, and dropping entries for ticks the graph no longer has.
    /// `required` is derived from the tick's actual incoming edges, not
    /// from the task's declared ports — a declared-but-unconnected port
    /// (e.g. `While`'s `$breaked` when `has_breaked_port` is false) must
    /// never hold a tick back from readiness.
    pub fn resync(&mut self, graph: &Graph) {
        let mut fresh = HashMap::new();
        for tick in graph.ticks() {
            if tick.is_start() || tick.is_final() {
                continue;
            }
            let Some(task) = graph.task(tick) else { continue };
            let required: HashSet<String> = graph
                .connections_in(tick)
                .into_iter()
                .map(|(port, _)| port)
                .filter(|port| self.policy.counts_port(task.as_ref(), port))
                .collect();
            let mut entry = TickState { required, collected: HashMap::new(), done: false };
            if let Some(mut old) = self.state.remove(tick) {
                old.collected.retain(|port, _| entry.required.contains(port));
                entry.collected = old.collected;
                entry.done = old.done;
            }
            fresh.insert(tick.clone(), entry);
        }
        self.state = fresh;
    }

    /// Records data arriving at `tick`'s `port` — the single moment that
    /// can move a tick from not-ready to ready (spec §4.5).
    pub fn set_output_data(&mut self, tick: &Tick, port: &str, value: Value) {
        if let Some(entry) = self.state.get_mut(tick) {
            if entry.required.contains(port) {
                entry.collected.insert(port.to_string(), value);
            }
        }
    }

    pub fn mark_done(&mut self, tick: &Tick) {
        if let Some(entry) = self.state.get_mut(tick) {
            entry.done = true;
        }
    }

    pub fn is_done(&self, tick: &Tick) -> bool {
        self.state.get(tick).map(|s| s.done).unwrap_or(false)
    }

    fn is_ready(&self, graph: &Graph, tick: &Tick) -> bool {
        let Some(entry) = self.state.get(tick) else { return false };
        if entry.done {
            return false;
        }
        if entry.collected.len() < entry.required.len() {
            return false;
        }
        let Some(task) = graph.task(tick) else { return false };
        self.policy.task_ready(graph, tick, task.as_ref())
    }

    /// The next tick this pass should run, in lexicographic order, subject
    /// to the syncpoint constraints (spec §4.5, §5). `None` if nothing is
    /// currently eligible.
    pub fn next_ready(&self, graph: &Graph) -> Option<Tick> {
        let frontier = self.state.iter().filter(|(_, s)| !s.done).map(|(t, _)| t.clone()).min();

        let mut candidates: Vec<Tick> = self.state.keys().filter(|t| self.is_ready(graph, t)).cloned().collect();
        candidates.sort();

        for tick in candidates {
            let Some(task) = graph.task(&tick) else { continue };
            if !self.policy.syncpoint_run_last() {
                return Some(tick);
            }
            if task.syncpoint() {
                if frontier.as_ref() == Some(&tick) {
                    return Some(tick);
                }
            } else {
                let blocked = self.state.iter().any(|(t, s)| {
                    !s.done && t < &tick && graph.task(t).map(|other| other.syncpoint()).unwrap_or(false)
                });
                if !blocked {
                    return Some(tick);
                }
            }
        }
        None
    }

    pub fn collected(&self, tick: &Tick) -> Inputs {
        self.state.get(tick).map(|s| s.collected.clone()).unwrap_or_default()
    }

    pub fn all_done(&self) -> bool {
        self.state.values().all(|s| s.done)
    }
}
