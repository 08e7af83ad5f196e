//! `If`/`For`/`While` (spec §4.4): refinable control-flow tasks that never
//! reach `evaluate` themselves — `refine` always splices them out of the
//! graph in favor of a concrete branch, or a tail-recursive continuation of
//! themselves for loops.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::PydronError;
use crate::graph::splicer::{replace_task, splice_into};
use crate::graph::{Endpoint, Graph};
use crate::task::catalog::const_task::Const;
use crate::task::{Inputs, Outputs, ReducerKind, Task, TaskFailure, TaskResult};
use crate::tick::Tick;
use crate::value::{IterHandle, Value};

fn wrap(e: PydronError) -> TaskFailure {
    TaskFailure::new(e.to_string())
}

/// A subgraph that passes every carried variable from `start` straight to
/// `final` untouched — what a `for`/`while` splices in when the loop ends
/// without a dedicated `orelse` (a break, or a `while` whose test is
/// already false).
fn identity_subgraph(carried: &[String]) -> Graph {
    let mut g = Graph::new();
    for name in carried {
        g.connect(Endpoint::new(Tick::start(), name.clone()), Endpoint::new(Tick::final_tick(), name.clone()))
            .expect("start->final passthrough connect cannot violate graph invariants");
    }
    g
}

#[derive(Debug, Clone)]
pub struct If {
    pub body: Graph,
    pub orelse: Graph,
}

impl If {
    pub fn new(body: Graph, orelse: Graph) -> Self {
        Self { body, orelse }
    }

    fn declared_inputs(&self) -> Vec<String> {
        let mut ports: BTreeSet<String> = BTreeSet::new();
        for (port, _) in self.body.connections_out(&Tick::start()) {
            ports.insert(port);
        }
        for (port, _) in self.orelse.connections_out(&Tick::start()) {
            ports.insert(port);
        }
        ports.into_iter().collect()
    }

    fn declared_outputs(&self) -> Vec<String> {
        let mut ports: BTreeSet<String> = BTreeSet::new();
        for (port, _) in self.body.connections_in(&Tick::final_tick()) {
            ports.insert(port);
        }
        for (port, _) in self.orelse.connections_in(&Tick::final_tick()) {
            ports.insert(port);
        }
        ports.into_iter().collect()
    }
}

impl Task for If {
    fn kind(&self) -> &'static str {
        "If"
    }

    fn input_ports(&self) -> Vec<String> {
        let mut ports = self.declared_inputs();
        if !ports.iter().any(|p| p == "$test") {
            ports.push("$test".to_string());
        }
        ports
    }

    fn output_ports(&self) -> Vec<String> {
        self.declared_outputs()
    }

    fn refiner_ports(&self) -> Option<Vec<String>> {
        Some(vec!["$test".to_string()])
    }

    fn refiner_reducer(&self, _port: &str) -> ReducerKind {
        ReducerKind::Bool
    }

    fn subgraphs(&self) -> Vec<(&'static str, Graph)> {
        vec![("body", self.body.clone()), ("orelse", self.orelse.clone())]
    }

    fn refine(&self, graph: &mut Graph, tick: &Tick, known_inputs: &Inputs) -> TaskResult<()> {
        let test = known_inputs
            .get("$test")
            .ok_or_else(|| TaskFailure::new("missing refiner input '$test'"))?
            .truthy();
        let branch = if test { &self.body } else { &self.orelse };
        replace_task(graph, tick, branch, None, HashMap::new()).map_err(wrap)
    }

    fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
        Err(TaskFailure::new("If is always refined away before evaluation"))
    }
}

/// Builds the subgraph spliced in for one live loop iteration: a constant
/// holding the peeled element bound to `$target`, the body, and a
/// tail-recursive `For` continuing with the advanced iterator.
fn build_iteration_subgraph(
    carried: &[String],
    body: &Graph,
    orelse: &Graph,
    element: Value,
    advanced_iter: IterHandle,
    has_breaked_port: bool,
) -> TaskResult<Graph> {
    let mut sub = Graph::new();

    let const_tick = Tick::new(vec![0, 1]);
    sub.add_task(const_tick.clone(), Arc::new(Const::new(element))).map_err(wrap)?;

    let mut body_input_source: HashMap<String, Endpoint> = HashMap::new();
    for name in carried {
        body_input_source.insert(name.clone(), Endpoint::new(Tick::start(), name.clone()));
    }
    body_input_source.insert("$target".to_string(), Endpoint::new(const_tick.clone(), "value"));

    let body_anchor = Tick::new(vec![0, 2]);
    let body_outputs = splice_into(&mut sub, &body_anchor, body, &body_input_source).map_err(wrap)?;

    let iter_const_tick = Tick::new(vec![0, 3]);
    sub.add_task(iter_const_tick.clone(), Arc::new(Const::new(Value::Opaque(Arc::new(advanced_iter)))))
        .map_err(wrap)?;

    let tail_tick = Tick::new(vec![0, 4]);
    let tail_for = For {
        carried: carried.to_vec(),
        body: body.clone(),
        orelse: orelse.clone(),
        has_breaked_port,
        is_tail: true,
    };
    sub.add_task(tail_tick.clone(), Arc::new(tail_for)).map_err(wrap)?;
    sub.connect(Endpoint::new(iter_const_tick, "value"), Endpoint::new(tail_tick.clone(), "$iterator"))
        .map_err(wrap)?;

    for name in carried {
        let src = body_outputs
            .get(name)
            .cloned()
            .ok_or_else(|| TaskFailure::new(format!("loop body did not produce carried output '{name}'")))?;
        sub.connect(src, Endpoint::new(tail_tick.clone(), name.clone())).map_err(wrap)?;
    }
    if has_breaked_port {
        let brk = body_outputs
            .get("$break")
            .cloned()
            .ok_or_else(|| TaskFailure::new("loop body declares breaks but produced no '$break' output"))?;
        sub.connect(brk, Endpoint::new(tail_tick.clone(), "$breaked")).map_err(wrap)?;
    }
    for name in carried {
        sub.connect(Endpoint::new(tail_tick.clone(), name.clone()), Endpoint::new(Tick::final_tick(), name.clone()))
            .map_err(wrap)?;
    }

    Ok(sub)
}

/// `for $target in iterator: body else: orelse`, lowered into per-iteration
/// tail recursion (spec §4.4). `orelse` runs once the iterator is
/// exhausted without a break; a break is signaled by the body producing a
/// truthy `$break` output, which becomes the tail `For`'s `$breaked` input.
#[derive(Debug, Clone)]
pub struct For {
    pub carried: Vec<String>,
    pub body: Graph,
    pub orelse: Graph,
    pub has_breaked_port: bool,
    pub is_tail: bool,
}

impl For {
    pub fn new(carried: Vec<String>, body: Graph, orelse: Graph, has_breaked_port: bool) -> Self {
        Self { carried, body, orelse, has_breaked_port, is_tail: false }
    }
}

impl Task for For {
    fn kind(&self) -> &'static str {
        "For"
    }

    fn input_ports(&self) -> Vec<String> {
        let mut ports = vec!["$iterator".to_string()];
        ports.extend(self.carried.clone());
        if self.has_breaked_port {
            ports.push("$breaked".to_string());
        }
        ports
    }

    fn output_ports(&self) -> Vec<String> {
        self.carried.clone()
    }

    fn refiner_ports(&self) -> Option<Vec<String>> {
        let mut ports = vec!["$iterator".to_string()];
        if self.has_breaked_port {
            ports.push("$breaked".to_string());
        }
        Some(ports)
    }

    fn subgraphs(&self) -> Vec<(&'static str, Graph)> {
        vec![("body", self.body.clone()), ("orelse", self.orelse.clone())]
    }

    fn refine(&self, graph: &mut Graph, tick: &Tick, known_inputs: &Inputs) -> TaskResult<()> {
        if self.has_breaked_port {
            let breaked = known_inputs.get("$breaked").map(|v| v.truthy()).unwrap_or(false);
            if breaked {
                let identity = identity_subgraph(&self.carried);
                return replace_task(graph, tick, &identity, None, HashMap::new()).map_err(wrap);
            }
        }
        let iterator_value =
            known_inputs.get("$iterator").ok_or_else(|| TaskFailure::new("missing refiner input '$iterator'"))?;
        let handle = match iterator_value {
            Value::Opaque(h) => h
                .as_any()
                .downcast_ref::<IterHandle>()
                .ok_or_else(|| TaskFailure::new("'$iterator' is not an IterHandle"))?,
            other => return Err(TaskFailure::new(format!("{other:?} is not an iterator"))),
        };
        match handle.next() {
            Some((element, advanced)) => {
                let sub = build_iteration_subgraph(
                    &self.carried,
                    &self.body,
                    &self.orelse,
                    element,
                    advanced,
                    self.has_breaked_port,
                )?;
                replace_task(graph, tick, &sub, None, HashMap::new()).map_err(wrap)
            }
            None => replace_task(graph, tick, &self.orelse, None, HashMap::new()).map_err(wrap),
        }
    }

    fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
        Err(TaskFailure::new("For is always refined away before evaluation"))
    }
}

/// Builds the subgraph spliced in for one live `while` iteration: the body,
/// plus a tail-recursive `While` gated by the body's recomputed `$test`.
fn build_while_iteration_subgraph(carried: &[String], body: &Graph, has_breaked_port: bool) -> TaskResult<Graph> {
    let mut sub = Graph::new();

    let mut body_input_source: HashMap<String, Endpoint> = HashMap::new();
    for name in carried {
        body_input_source.insert(name.clone(), Endpoint::new(Tick::start(), name.clone()));
    }
    let body_anchor = Tick::new(vec![0, 1]);
    let body_outputs = splice_into(&mut sub, &body_anchor, body, &body_input_source).map_err(wrap)?;

    let tail_tick = Tick::new(vec![0, 2]);
    let tail_while = While { carried: carried.to_vec(), body: body.clone(), has_breaked_port, is_tail: true };
    sub.add_task(tail_tick.clone(), Arc::new(tail_while)).map_err(wrap)?;

    let test_src = body_outputs
        .get("$test")
        .cloned()
        .ok_or_else(|| TaskFailure::new("loop body did not produce a '$test' output"))?;
    sub.connect(test_src, Endpoint::new(tail_tick.clone(), "$test")).map_err(wrap)?;

    if has_breaked_port {
        let brk = body_outputs
            .get("$break")
            .cloned()
            .ok_or_else(|| TaskFailure::new("loop body declares breaks but produced no '$break' output"))?;
        sub.connect(brk, Endpoint::new(tail_tick.clone(), "$breaked")).map_err(wrap)?;
    }
    for name in carried {
        let src = body_outputs
            .get(name)
            .cloned()
            .ok_or_else(|| TaskFailure::new(format!("loop body did not produce carried output '{name}'")))?;
        sub.connect(src, Endpoint::new(tail_tick.clone(), name.clone())).map_err(wrap)?;
    }
    for name in carried {
        sub.connect(Endpoint::new(tail_tick.clone(), name.clone()), Endpoint::new(Tick::final_tick(), name.clone()))
            .map_err(wrap)?;
    }

    Ok(sub)
}

/// `while $test: body`, tail-recursive like `For` (spec §4.4). The very
/// first `$test` is computed upstream and wired directly into this task's
/// `$test` input; every subsequent round's `$test` comes from the body.
#[derive(Debug, Clone)]
pub struct While {
    pub carried: Vec<String>,
    pub body: Graph,
    pub has_breaked_port: bool,
    pub is_tail: bool,
}

impl While {
    pub fn new(carried: Vec<String>, body: Graph, has_breaked_port: bool) -> Self {
        Self { carried, body, has_breaked_port, is_tail: false }
    }
}

impl Task for While {
    fn kind(&self) -> &'static str {
        "While"
    }

    fn input_ports(&self) -> Vec<String> {
        let mut ports = vec!["$test".to_string()];
        ports.extend(self.carried.clone());
        if self.has_breaked_port {
            ports.push("$breaked".to_string());
        }
        ports
    }

    fn output_ports(&self) -> Vec<String> {
        self.carried.clone()
    }

    fn refiner_ports(&self) -> Option<Vec<String>> {
        let mut ports = vec!["$test".to_string()];
        if self.has_breaked_port {
            ports.push("$breaked".to_string());
        }
        Some(ports)
    }

    fn refiner_reducer(&self, port: &str) -> ReducerKind {
        if port == "$test" {
            ReducerKind::Bool
        } else {
            ReducerKind::Identity
        }
    }

    fn subgraphs(&self) -> Vec<(&'static str, Graph)> {
        vec![("body", self.body.clone())]
    }

    fn refine(&self, graph: &mut Graph, tick: &Tick, known_inputs: &Inputs) -> TaskResult<()> {
        if self.has_breaked_port {
            let breaked = known_inputs.get("$breaked").map(|v| v.truthy()).unwrap_or(false);
            if breaked {
                let identity = identity_subgraph(&self.carried);
                return replace_task(graph, tick, &identity, None, HashMap::new()).map_err(wrap);
            }
        }
        let test = known_inputs.get("$test").ok_or_else(|| TaskFailure::new("missing refiner input '$test'"))?.truthy();
        if !test {
            let identity = identity_subgraph(&self.carried);
            return replace_task(graph, tick, &identity, None, HashMap::new()).map_err(wrap);
        }
        let sub = build_while_iteration_subgraph(&self.carried, &self.body, self.has_breaked_port)?;
        replace_task(graph, tick, &sub, None, HashMap::new()).map_err(wrap)
    }

    fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
        Err(TaskFailure::new("While is always refined away before evaluation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_retval_graph(value: Value) -> Graph {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Const::new(value))).unwrap();
        g.connect(Endpoint::new(t1, "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();
        g
    }

    #[test]
    fn if_splices_body_when_test_is_true() {
        let if_task = If::new(const_retval_graph(Value::Int(1)), const_retval_graph(Value::Int(2)));
        let mut graph = Graph::new();
        let t1 = Tick::start().incremented(1);
        graph.add_task(t1.clone(), Arc::new(if_task.clone())).unwrap();
        graph.connect(Endpoint::new(t1.clone(), "retval"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let mut known = Inputs::new();
        known.insert("$test".into(), Value::Bool(true));
        if_task.refine(&mut graph, &t1, &known).unwrap();
        assert!(graph.node(&t1).is_none());
    }

    #[test]
    fn if_declares_test_and_branch_outputs() {
        let if_task = If::new(const_retval_graph(Value::Int(1)), const_retval_graph(Value::Int(2)));
        assert!(if_task.input_ports().contains(&"$test".to_string()));
        assert_eq!(if_task.output_ports(), vec!["retval".to_string()]);
    }

    fn sum_body_graph() -> Graph {
        // body: total = total + $target; $test unused (For doesn't need it)
        let mut g = Graph::new();
        let add_tick = Tick::start().incremented(1);
        g.add_task(
            add_tick.clone(),
            Arc::new(crate::task::catalog::ops::BinOp::new(crate::task::catalog::ops::BinOpCode::Add)),
        )
        .unwrap();
        g.connect(Endpoint::new(Tick::start(), "total"), Endpoint::new(add_tick.clone(), "left")).unwrap();
        g.connect(Endpoint::new(Tick::start(), "$target"), Endpoint::new(add_tick.clone(), "right")).unwrap();
        g.connect(Endpoint::new(add_tick, "value"), Endpoint::new(Tick::final_tick(), "total")).unwrap();
        g
    }

    #[test]
    fn for_refine_peels_one_element_and_tail_recurses() {
        let body = sum_body_graph();
        let orelse = identity_subgraph(&["total".to_string()]);
        let for_task = For::new(vec!["total".to_string()], body, orelse, false);

        let mut graph = Graph::new();
        let t1 = Tick::start().incremented(1);
        graph.add_task(t1.clone(), Arc::new(for_task.clone())).unwrap();
        graph.connect(Endpoint::new(t1.clone(), "total"), Endpoint::new(Tick::final_tick(), "total")).unwrap();

        let iter = IterHandle::over(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let mut known = Inputs::new();
        known.insert("$iterator".into(), Value::Opaque(Arc::new(iter)));
        for_task.refine(&mut graph, &t1, &known).unwrap();

        assert!(graph.node(&t1).is_none());
        // a tail For must now exist somewhere under the shifted coordinates
        let has_tail_for = graph.ticks().any(|t| {
            graph.task(t).map(|task| task.kind() == "For").unwrap_or(false) && !t.is_start() && !t.is_final()
        });
        assert!(has_tail_for);
    }

    #[test]
    fn for_refine_splices_orelse_when_iterator_exhausted() {
        let body = sum_body_graph();
        let orelse = const_retval_graph(Value::Int(0));
        let for_task = For::new(vec!["total".to_string()], body, orelse, false);

        let mut graph = Graph::new();
        let t1 = Tick::start().incremented(1);
        graph.add_task(t1.clone(), Arc::new(for_task.clone())).unwrap();
        graph.connect(Endpoint::new(t1.clone(), "total"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let iter = IterHandle::over(vec![]);
        let mut known = Inputs::new();
        known.insert("$iterator".into(), Value::Opaque(Arc::new(iter)));
        for_task.refine(&mut graph, &t1, &known).unwrap();

        assert!(graph.node(&t1).is_none());
        assert!(!graph.ticks().any(|t| graph.task(t).map(|task| task.kind() == "For").unwrap_or(false)));
    }

    #[test]
    fn while_refine_splices_identity_when_test_is_false() {
        let while_task = While::new(vec!["total".to_string()], sum_body_graph(), false);
        let mut graph = Graph::new();
        let t1 = Tick::start().incremented(1);
        graph.add_task(t1.clone(), Arc::new(while_task.clone())).unwrap();
        graph.connect(Endpoint::new(t1.clone(), "total"), Endpoint::new(Tick::final_tick(), "total")).unwrap();

        let mut known = Inputs::new();
        known.insert("$test".into(), Value::Bool(false));
        while_task.refine(&mut graph, &t1, &known).unwrap();
        assert!(graph.node(&t1).is_none());
        assert!(!graph.ticks().any(|t| graph.task(t).map(|task| task.kind() == "While").unwrap_or(false)));
    }
}
