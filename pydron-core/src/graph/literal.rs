//! Graph literals: the JSON shape a front end (or `pydron-cli`) hands the
//! engine instead of building a [`Graph`] by hand (SPEC_FULL.md §0 — this
//! core only consumes pre-built graphs, it does not lower an AST itself).
//!
//! A literal names each task by [`Task::kind`] and a small JSON params
//! object; [`build_graph`] resolves those against the catalog. Not every
//! catalog task is reachable this way yet — `FunctionDef`/`ReadGlobal`/
//! `AssignGlobal` need a namespace registry a literal alone can't carry, so
//! they're left for a richer front end to construct directly against the
//! `Graph` API.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{PydronError, Result};
use crate::graph::{Endpoint, Graph};
use crate::task::catalog::access::{AttrAssign, AttrRead, SubscriptAssign, SubscriptRead, Unpack};
use crate::task::catalog::call::Call;
use crate::task::catalog::const_task::Const;
use crate::task::catalog::containers::{BuildDict, BuildSequence, SequenceKind};
use crate::task::catalog::control_flow::{For, If, While};
use crate::task::catalog::iterator::{Iter, Next};
use crate::task::catalog::misc::RaiseTask;
use crate::task::catalog::ops::{BinOp, BinOpCode, UnOp, UnOpCode};
use crate::task::Task;
use crate::tick::Tick;
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLiteral {
    pub tick: Vec<i64>,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeLiteral {
    pub source_tick: Vec<i64>,
    pub source_port: String,
    pub dest_tick: Vec<i64>,
    pub dest_port: String,
}

/// A whole graph in transit: tasks addressed by their tick's integer path,
/// plus the edges between them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphLiteral {
    #[serde(default)]
    pub tasks: Vec<TaskLiteral>,
    #[serde(default)]
    pub edges: Vec<EdgeLiteral>,
}

fn param<T: serde::de::DeserializeOwned>(params: &serde_json::Value, field: &str) -> Result<T> {
    params
        .get(field)
        .cloned()
        .ok_or_else(|| PydronError::Configuration(format!("missing graph literal param '{field}'")))
        .and_then(|v| serde_json::from_value(v).map_err(PydronError::from))
}

fn build_task(kind: &str, params: &serde_json::Value) -> Result<Arc<dyn Task>> {
    let task: Arc<dyn Task> = match kind {
        "Const" => Arc::new(Const::new(param::<Value>(params, "value")?)),
        "BinOp" => Arc::new(BinOp::new(param::<BinOpCode>(params, "op")?)),
        "UnOp" => Arc::new(UnOp::new(param::<UnOpCode>(params, "op")?)),
        "BuildList" => Arc::new(BuildSequence::new(SequenceKind::List, param::<usize>(params, "arity")?)),
        "BuildTuple" => Arc::new(BuildSequence::new(SequenceKind::Tuple, param::<usize>(params, "arity")?)),
        "BuildSet" => Arc::new(BuildSequence::new(SequenceKind::Set, param::<usize>(params, "arity")?)),
        "BuildDict" => Arc::new(BuildDict::new(param::<usize>(params, "arity")?)),
        "AttrRead" => Arc::new(AttrRead::new(param::<String>(params, "attr")?)),
        "AttrAssign" => Arc::new(AttrAssign::new(param::<String>(params, "attr")?)),
        "SubscriptRead" => Arc::new(SubscriptRead),
        "SubscriptAssign" => Arc::new(SubscriptAssign),
        "Unpack" => Arc::new(Unpack::new(param::<usize>(params, "arity")?)),
        "Call" => Arc::new(Call::new(param::<usize>(params, "positional_arity")?, param::<Vec<String>>(params, "keyword_names")?)),
        "Iter" => Arc::new(Iter),
        "Next" => Arc::new(Next),
        "Raise" => Arc::new(RaiseTask),
        "If" => {
            let body = build_graph(&param::<GraphLiteral>(params, "body")?)?;
            let orelse = build_graph(&param::<GraphLiteral>(params, "orelse")?)?;
            Arc::new(If::new(body, orelse))
        }
        "For" => {
            let carried = param::<Vec<String>>(params, "carried")?;
            let body = build_graph(&param::<GraphLiteral>(params, "body")?)?;
            let orelse = build_graph(&param::<GraphLiteral>(params, "orelse")?)?;
            let has_breaked_port = param::<bool>(params, "has_breaked_port")?;
            Arc::new(For::new(carried, body, orelse, has_breaked_port))
        }
        "While" => {
            let carried = param::<Vec<String>>(params, "carried")?;
            let body = build_graph(&param::<GraphLiteral>(params, "body")?)?;
            let has_breaked_port = param::<bool>(params, "has_breaked_port")?;
            Arc::new(While::new(carried, body, has_breaked_port))
        }
        other => return Err(PydronError::Configuration(format!("unknown task kind '{other}' in graph literal"))),
    };
    Ok(task)
}

/// Resolves a [`GraphLiteral`] into a live [`Graph`], adding every task at
/// its named tick and wiring every edge in the order given.
pub fn build_graph(literal: &GraphLiteral) -> Result<Graph> {
    let mut graph = Graph::new();
    for task_literal in &literal.tasks {
        let tick = Tick::new(task_literal.tick.clone());
        let task = build_task(&task_literal.kind, &task_literal.params)?;
        graph.add_task(tick, task)?;
    }
    for edge in &literal.edges {
        let source = Endpoint::new(Tick::new(edge.source_tick.clone()), edge.source_port.clone());
        let dest = Endpoint::new(Tick::new(edge.dest_tick.clone()), edge.dest_port.clone());
        graph.connect(source, dest)?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_a_constant_return_graph_from_json() {
        let literal: GraphLiteral = serde_json::from_value(json!({
            "tasks": [
                { "tick": [0, 1], "kind": "Const", "params": { "value": { "type": "Int", "value": 42 } } }
            ],
            "edges": [
                { "source_tick": [0, 1], "source_port": "value", "dest_tick": [1, 0], "dest_port": "retval" }
            ]
        }))
        .unwrap();

        let graph = build_graph(&literal).unwrap();
        assert!(graph.contains(&Tick::new(vec![0, 1])));
    }

    #[test]
    fn unknown_kind_is_a_configuration_error() {
        let literal = GraphLiteral {
            tasks: vec![TaskLiteral { tick: vec![0, 1], kind: "Nonsense".to_string(), params: serde_json::Value::Null }],
            edges: vec![],
        };
        let err = build_graph(&literal).unwrap_err();
        assert!(matches!(err, PydronError::Configuration(_)));
    }

    #[test]
    fn builds_nested_if_from_body_and_orelse_literals() {
        let branch = |value: i64| {
            json!({
                "tasks": [{ "tick": [0, 1], "kind": "Const", "params": { "value": { "type": "Int", "value": value } } }],
                "edges": [{ "source_tick": [0, 1], "source_port": "value", "dest_tick": [1, 0], "dest_port": "retval" }]
            })
        };
        let literal: GraphLiteral = serde_json::from_value(json!({
            "tasks": [
                { "tick": [0, 1], "kind": "If", "params": { "body": branch(1), "orelse": branch(2) } }
            ],
            "edges": []
        }))
        .unwrap();

        let graph = build_graph(&literal).unwrap();
        assert!(graph.contains(&Tick::new(vec![0, 1])));
    }
}
