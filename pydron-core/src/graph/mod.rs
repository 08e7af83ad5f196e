//! The typed dataflow graph: tasks at ticks, typed ports, directed
//! port-to-port edges, and a synchronous observer surface (spec §3, §4.2).

pub mod literal;
pub mod splicer;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{PydronError, Result};
use crate::task::Task;
use crate::tick::Tick;

/// One end of an edge: a tick and a port name. Port names beginning with
/// `$` are internal/control ports; everything else is data-facing and
/// auto-exposed as graph I/O (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub tick: Tick,
    pub port: String,
}

impl Endpoint {
    pub fn new(tick: Tick, port: impl Into<String>) -> Self {
        Self { tick, port: port.into() }
    }

    pub fn is_internal(&self) -> bool {
        self.port.starts_with('$')
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tick, self.port)
    }
}

/// A task placed at a tick, with its engine-visible property map and the
/// two connection multimaps spec §3 describes: `in_edges` keyed by
/// destination port (at most one source each), `out_edges` as a set (a
/// source port may fan out to many destinations).
#[derive(Clone)]
pub struct TaskNode {
    pub task: Arc<dyn Task>,
    properties: HashMap<String, Json>,
    in_edges: HashMap<String, Endpoint>,
    out_edges: HashSet<(String, Endpoint)>,
}

impl TaskNode {
    fn new(task: Arc<dyn Task>) -> Self {
        Self { task, properties: HashMap::new(), in_edges: HashMap::new(), out_edges: HashSet::new() }
    }

    pub fn property(&self, key: &str) -> Option<&Json> {
        self.properties.get(key)
    }

    pub fn in_edges(&self) -> &HashMap<String, Endpoint> {
        &self.in_edges
    }

    pub fn out_edges(&self) -> &HashSet<(String, Endpoint)> {
        &self.out_edges
    }

    pub fn is_connected(&self) -> bool {
        !self.in_edges.is_empty() || !self.out_edges.is_empty()
    }
}

/// Notified synchronously, in registration order, after the corresponding
/// structural change (spec §4.2, §5 ordering guarantees). Observers must
/// not mutate graph structure from within a callback — only task
/// properties are permitted, and even that must not re-enter these
/// callbacks recursively.
pub trait GraphObserver: Send + Sync {
    fn task_added(&self, _tick: &Tick) {}
    fn task_removed(&self, _tick: &Tick) {}
    fn connected(&self, _source: &Endpoint, _dest: &Endpoint) {}
    fn disconnected(&self, _source: &Endpoint, _dest: &Endpoint) {}
    fn task_property_changed(&self, _tick: &Tick, _key: &str) {}
}

/// The dataflow graph itself: a mapping from tick to task node, always
/// containing `start` and `final` with null tasks that can never be
/// removed or directly connected against (spec §3 invariants).
#[derive(Clone)]
pub struct Graph {
    tasks: BTreeMap<Tick, TaskNode>,
    #[allow(clippy::type_complexity)]
    observers: Vec<Arc<dyn GraphObserver>>,
}

/// A task placeholder occupying `start`/`final` — it has no evaluation
/// behavior and is never scheduled.
#[derive(Debug)]
struct SentinelTask(&'static str);
impl Task for SentinelTask {
    fn kind(&self) -> &'static str {
        self.0
    }
    fn input_ports(&self) -> Vec<String> {
        Vec::new()
    }
    fn output_ports(&self) -> Vec<String> {
        Vec::new()
    }
    fn evaluate(&self, _inputs: &crate::task::Inputs) -> crate::task::TaskResult<crate::task::Outputs> {
        Ok(crate::task::Outputs::new())
    }
}

impl Graph {
    pub fn new() -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(Tick::start(), TaskNode::new(Arc::new(SentinelTask("start"))));
        tasks.insert(Tick::final_tick(), TaskNode::new(Arc::new(SentinelTask("final"))));
        Self { tasks, observers: Vec::new() }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn GraphObserver>) {
        self.observers.push(observer);
    }

    pub fn contains(&self, tick: &Tick) -> bool {
        self.tasks.contains_key(tick)
    }

    pub fn node(&self, tick: &Tick) -> Option<&TaskNode> {
        self.tasks.get(tick)
    }

    /// Ticks in lexicographic order, the iteration order the ready
    /// tracker and traverser rely on.
    pub fn ticks(&self) -> impl Iterator<Item = &Tick> {
        self.tasks.keys()
    }

    pub fn task(&self, tick: &Tick) -> Option<Arc<dyn Task>> {
        self.tasks.get(tick).map(|n| n.task.clone())
    }

    /// Add a task at `tick`. Rejected at `start`/`final` and if a task
    /// already occupies that tick (spec §3, §8 boundary behaviors).
    pub fn add_task(&mut self, tick: Tick, task: Arc<dyn Task>) -> Result<()> {
        if tick.is_start() || tick.is_final() {
            return Err(PydronError::invariant("cannot add a task at start or final"));
        }
        if self.tasks.contains_key(&tick) {
            return Err(PydronError::invariant(format!("tick {tick} already occupied")));
        }
        self.tasks.insert(tick.clone(), TaskNode::new(task));
        for obs in &self.observers {
            obs.task_added(&tick);
        }
        Ok(())
    }

    /// Remove an unconnected task. Start/final can never be removed.
    pub fn remove_task(&mut self, tick: &Tick) -> Result<()> {
        if tick.is_start() || tick.is_final() {
            return Err(PydronError::invariant("cannot remove start or final"));
        }
        let node = self
            .tasks
            .get(tick)
            .ok_or_else(|| PydronError::invariant(format!("no task at tick {tick}")))?;
        if node.is_connected() {
            return Err(PydronError::invariant(format!("task at {tick} is still connected")));
        }
        self.tasks.remove(tick);
        for obs in &self.observers {
            obs.task_removed(tick);
        }
        Ok(())
    }

    /// Connect `source -> dest`. Fails on a causality violation
    /// (`source.tick >= dest.tick`), a duplicate incoming edge at `dest`,
    /// or an exact duplicate of an already-existing edge (spec §4.2).
    pub fn connect(&mut self, source: Endpoint, dest: Endpoint) -> Result<()> {
        if !self.tasks.contains_key(&source.tick) {
            return Err(PydronError::invariant(format!("no task at source tick {}", source.tick)));
        }
        if !self.tasks.contains_key(&dest.tick) {
            return Err(PydronError::invariant(format!("no task at dest tick {}", dest.tick)));
        }
        if dest.tick.is_start() {
            return Err(PydronError::invariant("cannot connect into start"));
        }
        if source.tick.is_final() {
            return Err(PydronError::invariant("cannot connect out of final"));
        }
        if !(source.tick < dest.tick) {
            return Err(PydronError::invariant(format!(
                "causality violation: {} is not strictly before {}",
                source.tick, dest.tick
            )));
        }
        {
            let dest_node = self.tasks.get(&dest.tick).unwrap();
            if dest_node.in_edges.contains_key(&dest.port) {
                return Err(PydronError::invariant(format!(
                    "destination port {} already has an incoming edge",
                    dest
                )));
            }
        }
        {
            let src_node = self.tasks.get(&source.tick).unwrap();
            if src_node.out_edges.contains(&(source.port.clone(), dest.clone())) {
                return Err(PydronError::invariant(format!("edge {source} -> {dest} already exists")));
            }
        }
        self.tasks.get_mut(&source.tick).unwrap().out_edges.insert((source.port.clone(), dest.clone()));
        self.tasks.get_mut(&dest.tick).unwrap().in_edges.insert(dest.port.clone(), source.clone());
        for obs in &self.observers {
            obs.connected(&source, &dest);
        }
        Ok(())
    }

    pub fn disconnect(&mut self, source: &Endpoint, dest: &Endpoint) -> Result<()> {
        let removed_out = self
            .tasks
            .get_mut(&source.tick)
            .map(|n| n.out_edges.remove(&(source.port.clone(), dest.clone())))
            .unwrap_or(false);
        let removed_in = self
            .tasks
            .get_mut(&dest.tick)
            .and_then(|n| {
                if n.in_edges.get(&dest.port) == Some(source) {
                    n.in_edges.remove(&dest.port)
                } else {
                    None
                }
            })
            .is_some();
        if !removed_out || !removed_in {
            return Err(PydronError::invariant(format!("no edge {source} -> {dest}")));
        }
        for obs in &self.observers {
            obs.disconnected(source, dest);
        }
        Ok(())
    }

    pub fn get_property(&self, tick: &Tick, key: &str) -> Option<Json> {
        self.tasks.get(tick).and_then(|n| n.properties.get(key).cloned())
    }

    /// Property changes never invalidate existing edges (spec §3).
    pub fn set_property(&mut self, tick: &Tick, key: impl Into<String>, value: Json) -> Result<()> {
        let key = key.into();
        let node = self
            .tasks
            .get_mut(tick)
            .ok_or_else(|| PydronError::invariant(format!("no task at tick {tick}")))?;
        node.properties.insert(key.clone(), value);
        for obs in &self.observers {
            obs.task_property_changed(tick, &key);
        }
        Ok(())
    }

    pub fn connections_in(&self, tick: &Tick) -> Vec<(String, Endpoint)> {
        self.tasks
            .get(tick)
            .map(|n| n.in_edges.iter().map(|(p, e)| (p.clone(), e.clone())).collect())
            .unwrap_or_default()
    }

    pub fn connections_out(&self, tick: &Tick) -> Vec<(String, Endpoint)> {
        self.tasks
            .get(tick)
            .map(|n| n.out_edges.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("ticks", &self.tasks.len()).finish()
    }
}

/// Structural equality: same ticks, same task `structural_key`s, same
/// edges, and equal properties restricted to non-`_`-prefixed keys — `_`
/// keys are engine bookkeeping only (spec §4.2).
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        if self.tasks.len() != other.tasks.len() {
            return false;
        }
        for (tick, node) in &self.tasks {
            let Some(other_node) = other.tasks.get(tick) else { return false };
            if node.task.structural_key() != other_node.task.structural_key() {
                return false;
            }
            if node.in_edges != other_node.in_edges {
                return false;
            }
            let visible = |n: &TaskNode| -> HashMap<&String, &Json> {
                n.properties.iter().filter(|(k, _)| !k.starts_with('_')).collect()
            };
            if visible(node) != visible(other_node) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Inputs, Outputs, TaskResult};

    #[derive(Debug)]
    struct Stub;
    impl Task for Stub {
        fn kind(&self) -> &'static str {
            "stub"
        }
        fn input_ports(&self) -> Vec<String> {
            vec!["in".into()]
        }
        fn output_ports(&self) -> Vec<String> {
            vec!["out".into()]
        }
        fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
            Ok(Outputs::new())
        }
    }

    #[test]
    fn start_and_final_always_present_and_immutable() {
        let mut g = Graph::new();
        assert!(g.contains(&Tick::start()));
        assert!(g.contains(&Tick::final_tick()));
        assert!(g.add_task(Tick::start(), Arc::new(Stub)).is_err());
        assert!(g.remove_task(&Tick::final_tick()).is_err());
    }

    #[test]
    fn connect_rejects_causality_violation() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        let err = g.connect(Endpoint::new(Tick::final_tick(), "out"), Endpoint::new(t1, "in"));
        assert!(err.is_err());
    }

    #[test]
    fn connect_rejects_duplicate_incoming_edge() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        let t2 = Tick::start().incremented(2);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        g.add_task(t2.clone(), Arc::new(Stub)).unwrap();
        g.connect(Endpoint::new(Tick::start(), "x"), Endpoint::new(t2.clone(), "in")).unwrap();
        let dup = g.connect(Endpoint::new(t1, "out"), Endpoint::new(t2, "in"));
        assert!(dup.is_err());
    }

    #[test]
    fn connecting_into_start_or_out_of_final_is_rejected() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        assert!(g.connect(Endpoint::new(t1.clone(), "out"), Endpoint::new(Tick::start(), "x")).is_err());
        assert!(g.connect(Endpoint::new(Tick::final_tick(), "x"), Endpoint::new(t1, "in")).is_err());
    }

    #[test]
    fn removing_a_connected_task_is_rejected() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        g.connect(Endpoint::new(Tick::start(), "x"), Endpoint::new(t1.clone(), "in")).unwrap();
        assert!(g.remove_task(&t1).is_err());
    }

    #[test]
    fn property_changes_do_not_invalidate_edges() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        g.connect(Endpoint::new(Tick::start(), "x"), Endpoint::new(t1.clone(), "in")).unwrap();
        g.set_property(&t1, "refined", serde_json::json!(true)).unwrap();
        assert_eq!(g.connections_in(&t1).len(), 1);
    }

    #[derive(Default)]
    struct Recorder {
        events: parking_lot::Mutex<Vec<String>>,
    }
    impl GraphObserver for Recorder {
        fn task_added(&self, tick: &Tick) {
            self.events.lock().push(format!("added:{tick}"));
        }
        fn connected(&self, source: &Endpoint, dest: &Endpoint) {
            self.events.lock().push(format!("connected:{source}->{dest}"));
        }
    }

    #[test]
    fn observers_fire_after_the_change_in_registration_order() {
        let mut g = Graph::new();
        let recorder = Arc::new(Recorder::default());
        g.add_observer(recorder.clone());
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        g.connect(Endpoint::new(Tick::start(), "x"), Endpoint::new(t1, "in")).unwrap();
        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("added:"));
        assert!(events[1].starts_with("connected:"));
    }

    #[test]
    fn structural_equality_ignores_underscore_properties() {
        let mut a = Graph::new();
        let mut b = Graph::new();
        let t1 = Tick::start().incremented(1);
        a.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        b.add_task(t1.clone(), Arc::new(Stub)).unwrap();
        a.set_property(&t1, "_token", serde_json::json!(1)).unwrap();
        b.set_property(&t1, "_token", serde_json::json!(2)).unwrap();
        assert_eq!(a, b);
        a.set_property(&t1, "refined", serde_json::json!(true)).unwrap();
        assert_ne!(a, b);
    }
}
