//! Subgraph splicer (spec §4.3): replaces a task with a subgraph,
//! rewiring inputs/outputs and shifting ticks so the spliced-in interior
//! nests strictly inside the tick range the replaced task occupied.

use std::collections::HashMap;

use crate::error::{PydronError, Result};
use crate::graph::{Endpoint, Graph};
use crate::tick::Tick;

/// Replace the task at `tick` with `subgraph`, shifting every interior
/// tick of `subgraph` into `shift_tick` (defaults to `tick` itself).
/// `extra_inputs` overlays additional named inputs on top of whatever
/// `tick` was already receiving — used by `For`/`While` to wire a freshly
/// peeled loop element into the body's `$target` port.
pub fn replace_task(
    g: &mut Graph,
    tick: &Tick,
    subgraph: &Graph,
    shift_tick: Option<Tick>,
    extra_inputs: HashMap<String, Endpoint>,
) -> Result<()> {
    let shift_tick = shift_tick.unwrap_or_else(|| tick.clone());

    // Step 1: input source by destination port of the replaced task,
    // overlaid with extra_inputs.
    let mut input_source: HashMap<String, Endpoint> =
        g.connections_in(tick).into_iter().collect();
    for (port, src) in extra_inputs {
        input_source.insert(port, src);
    }

    // Step 2 (prep): start->X edges inside the subgraph (X != final),
    // resolved against input_source and shifted into the host graph.
    let mut pending_inputs = Vec::new();
    for (port, dest) in subgraph.connections_out(&Tick::start()) {
        if dest.tick.is_final() {
            continue;
        }
        let source = input_source
            .get(&port)
            .cloned()
            .ok_or_else(|| PydronError::invariant(format!("no input source for subgraph port {port}")))?;
        let shifted_dest = Endpoint::new(dest.tick.shift_into(&shift_tick), dest.port);
        pending_inputs.push((source, shifted_dest));
    }

    // Step 3: derive a replacement source for every outgoing edge of the
    // replaced task, resolving start->final passthrough recursively.
    let mut pending_outputs = Vec::new();
    for (port, dest) in g.connections_out(tick) {
        let replacement = resolve_subgraph_output(subgraph, &port, &shift_tick, &input_source)
            .or_else(|| input_source.get(&port).cloned())
            .ok_or_else(|| {
                PydronError::invariant(format!("no replacement source for output port {port} of {tick}"))
            })?;
        pending_outputs.push((replacement, dest));
    }

    // Step 4: disconnect and remove the replaced task.
    let in_edges: Vec<(String, Endpoint)> = g.connections_in(tick);
    let out_edges: Vec<(String, Endpoint)> = g.connections_out(tick);
    for (port, src) in &in_edges {
        g.disconnect(src, &Endpoint::new(tick.clone(), port.clone()))?;
    }
    for (port, dst) in &out_edges {
        g.disconnect(&Endpoint::new(tick.clone(), port.clone()), dst)?;
    }
    g.remove_task(tick)?;

    // Step 5: copy interior tasks and interior-to-interior edges.
    insert_subgraph(g, subgraph, &shift_tick)?;

    // Step 6: apply the collected input and output connections.
    for (source, dest) in pending_inputs {
        g.connect(source, dest)?;
    }
    for (source, dest) in pending_outputs {
        g.connect(source, dest)?;
    }

    Ok(())
}

/// Splice `subgraph`'s interior into `g` anchored at `anchor_tick`, without
/// removing any existing task — the caller supplies `input_source` mapping
/// `subgraph`'s `start`-fed port names directly instead of reading them off
/// a replaced task's incoming edges. Returns, for each port the subgraph's
/// `final` receives, the resolved endpoint in `g`'s coordinate space. Used
/// by `For`/`While` to assemble a fresh iteration subgraph (body plus a
/// tail-recursive continuation) before handing the whole thing to
/// [`replace_task`].
pub(crate) fn splice_into(
    g: &mut Graph,
    anchor_tick: &Tick,
    subgraph: &Graph,
    input_source: &HashMap<String, Endpoint>,
) -> Result<HashMap<String, Endpoint>> {
    insert_subgraph(g, subgraph, anchor_tick)?;

    // insert_subgraph only copies interior-to-interior edges; an interior
    // task fed directly from subgraph's own start (not just a start->final
    // passthrough) still needs wiring through input_source.
    for (port, dest) in subgraph.connections_out(&Tick::start()) {
        if dest.tick.is_final() {
            continue;
        }
        let source = input_source
            .get(&port)
            .cloned()
            .ok_or_else(|| PydronError::invariant(format!("no input source for subgraph port {port}")))?;
        let shifted_dest = Endpoint::new(dest.tick.shift_into(anchor_tick), dest.port);
        g.connect(source, shifted_dest)?;
    }

    let mut outputs = HashMap::new();
    for (port, _) in subgraph.connections_in(&Tick::final_tick()) {
        let resolved = resolve_subgraph_output(subgraph, &port, anchor_tick, input_source)
            .or_else(|| input_source.get(&port).cloned())
            .ok_or_else(|| PydronError::invariant(format!("no source for subgraph output port {port}")))?;
        outputs.insert(port, resolved);
    }
    Ok(outputs)
}

/// Resolve what should feed `dest` into the replaced task's former
/// destination for `port`, by reading the subgraph's `final` incoming
/// edge for that port. If `final` receives it directly from `start`
/// (passthrough), resolve through `input_source` instead of emitting a
/// reference to a `start` that no longer exists in the host graph.
fn resolve_subgraph_output(
    subgraph: &Graph,
    port: &str,
    shift_tick: &Tick,
    input_source: &HashMap<String, Endpoint>,
) -> Option<Endpoint> {
    let src = subgraph.node(&Tick::final_tick())?.in_edges().get(port)?.clone();
    if src.tick.is_start() {
        input_source.get(&src.port).cloned()
    } else {
        Some(Endpoint::new(src.tick.shift_into(shift_tick), src.port))
    }
}

/// Copy every interior task of `subgraph` (excluding `start`/`final`) into
/// `g`, ticks shifted by `shift_tick`, along with edges that connect two
/// interior tasks. Edges touching `start`/`final` are not copied — those
/// are handled by the input/output passes in `replace_task`.
fn insert_subgraph(g: &mut Graph, subgraph: &Graph, shift_tick: &Tick) -> Result<()> {
    for tick in subgraph.ticks() {
        if tick.is_start() || tick.is_final() {
            continue;
        }
        let node = subgraph.node(tick).expect("tick came from subgraph.ticks()");
        g.add_task(tick.shift_into(shift_tick), node.task.clone())?;
    }
    for tick in subgraph.ticks() {
        if tick.is_start() || tick.is_final() {
            continue;
        }
        let node = subgraph.node(tick).expect("tick came from subgraph.ticks()");
        for (port, source) in node.in_edges() {
            if source.tick.is_start() {
                continue;
            }
            let shifted_source = Endpoint::new(source.tick.shift_into(shift_tick), source.port.clone());
            let shifted_dest = Endpoint::new(tick.shift_into(shift_tick), port.clone());
            g.connect(shifted_source, shifted_dest)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::catalog::const_task::Const;
    use crate::value::Value;
    use std::sync::Arc;

    /// `G(T(1, Const(None)), C(1,"value", FINAL,"retval"))`: a graph that
    /// ignores its inputs and always returns `None` (spec §8 scenario 1).
    fn const_return_subgraph(value: Value) -> Graph {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Const::new(value))).unwrap();
        g.connect(Endpoint::new(t1, "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();
        g
    }

    #[test]
    fn splice_replaces_task_and_rewires_output() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Const::new(Value::Int(0)))).unwrap();
        g.connect(Endpoint::new(t1.clone(), "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let sub = const_return_subgraph(Value::Int(42));
        replace_task(&mut g, &t1, &sub, None, HashMap::new()).unwrap();

        // the replaced Const is gone; final still gets "retval" from a
        // spliced-in, tick-shifted Const(42).
        assert!(g.node(&t1).is_none());
        let final_in = g.connections_in(&Tick::final_tick());
        assert_eq!(final_in.len(), 1);
        let (port, source) = &final_in[0];
        assert_eq!(port, "retval");
        assert!(*source.tick.elements() != *t1.elements()); // it's the shifted interior tick
    }

    #[test]
    fn splice_into_wires_interior_task_reading_directly_from_start() {
        let mut g = Graph::new();
        let anchor = Tick::new(vec![0, 2]);

        let mut body = Graph::new();
        let add_tick = Tick::start().incremented(1);
        body.add_task(
            add_tick.clone(),
            Arc::new(crate::task::catalog::ops::BinOp::new(crate::task::catalog::ops::BinOpCode::Add)),
        )
        .unwrap();
        body.connect(Endpoint::new(Tick::start(), "total"), Endpoint::new(add_tick.clone(), "left")).unwrap();
        body.connect(Endpoint::new(Tick::start(), "delta"), Endpoint::new(add_tick.clone(), "right")).unwrap();
        body.connect(Endpoint::new(add_tick, "value"), Endpoint::new(Tick::final_tick(), "total")).unwrap();

        let source_tick = Tick::start().incremented(9);
        g.add_task(source_tick.clone(), Arc::new(Const::new(Value::Int(0)))).unwrap();
        let mut input_source = HashMap::new();
        input_source.insert("total".to_string(), Endpoint::new(source_tick.clone(), "value"));
        input_source.insert("delta".to_string(), Endpoint::new(source_tick, "value"));

        let outputs = splice_into(&mut g, &anchor, &body, &input_source).unwrap();

        let shifted_add = add_tick.shift_into(&anchor);
        let in_edges = g.connections_in(&shifted_add);
        assert_eq!(in_edges.len(), 2);
        assert!(outputs.contains_key("total"));
    }

    #[test]
    fn shift_into_embedding_is_associative_with_splicing() {
        let mut g = Graph::new();
        let t1 = Tick::start().incremented(1);
        g.add_task(t1.clone(), Arc::new(Const::new(Value::Int(0)))).unwrap();
        g.connect(Endpoint::new(t1.clone(), "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        let mut sub = Graph::new();
        let inner = Tick::new(vec![0, 3]);
        sub.add_task(inner.clone(), Arc::new(Const::new(Value::Int(7)))).unwrap();
        sub.connect(Endpoint::new(inner.clone(), "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();

        replace_task(&mut g, &t1, &sub, None, HashMap::new()).unwrap();

        let expected = inner.shift_into(&t1);
        assert!(g.node(&expected).is_some());
    }
}
