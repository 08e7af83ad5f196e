//! `FunctionDef`: produces a [`Callable`] binding a closed-over body graph,
//! its parameter names, and defaults supplied via `default_i` inputs.
//!
//! The body graph itself cannot travel inside the `Callable` value — it
//! holds `Arc<dyn Task>` trait objects and isn't `Serialize` — so it is
//! registered in a process-local table keyed by a fresh id each time the
//! `FunctionDef` is evaluated, and looked up from there when `Call` splices
//! it in (spec §4.4, §9 "Closures/body graphs").

use std::sync::OnceLock;

use dashmap::DashMap;
use serde_json::json;
use uuid::Uuid;

use crate::graph::Graph;
use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::{Callable, Value};

static BODIES: OnceLock<DashMap<Uuid, Graph>> = OnceLock::new();

fn bodies() -> &'static DashMap<Uuid, Graph> {
    BODIES.get_or_init(DashMap::new)
}

pub fn register_body(body: Graph) -> Uuid {
    let id = Uuid::new_v4();
    bodies().insert(id, body);
    id
}

pub fn lookup_body(id: &Uuid) -> Option<Graph> {
    bodies().get(id).map(|entry| entry.clone())
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub vararg: Option<String>,
    pub kwarg: Option<String>,
    pub num_defaults: usize,
    pub body: Graph,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<String>,
        params: Vec<String>,
        vararg: Option<String>,
        kwarg: Option<String>,
        num_defaults: usize,
        body: Graph,
    ) -> Self {
        Self { name: name.into(), params, vararg, kwarg, num_defaults, body }
    }

    fn default_port(i: usize) -> String {
        format!("default_{i}")
    }
}

impl Task for FunctionDef {
    fn kind(&self) -> &'static str {
        "FunctionDef"
    }

    fn input_ports(&self) -> Vec<String> {
        (0..self.num_defaults).map(Self::default_port).collect()
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let mut defaults = Vec::with_capacity(self.num_defaults);
        for i in 0..self.num_defaults {
            let port = Self::default_port(i);
            let v = inputs.get(&port).ok_or_else(|| TaskFailure::new(format!("missing input '{port}'")))?;
            defaults.push(v.clone());
        }
        let graph_id = register_body(self.body.clone());
        let callable = Callable {
            graph_id,
            name: self.name.clone(),
            params: self.params.clone(),
            vararg: self.vararg.clone(),
            kwarg: self.kwarg.clone(),
            defaults,
        };
        let mut out = Outputs::new();
        out.insert("value".to_string(), Value::Callable(callable));
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({
            "kind": self.kind(),
            "name": self.name,
            "params": self.params,
            "vararg": self.vararg,
            "kwarg": self.kwarg,
        })
    }

    fn quick(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_registers_body_and_returns_callable() {
        let def = FunctionDef::new("f", vec!["x".to_string()], None, None, 0, Graph::new());
        let out = def.evaluate(&Inputs::new()).unwrap();
        match out.get("value") {
            Some(Value::Callable(c)) => {
                assert_eq!(c.name, "f");
                assert!(lookup_body(&c.graph_id).is_some());
            }
            other => panic!("expected Callable, got {other:?}"),
        }
    }

    #[test]
    fn missing_default_input_fails() {
        let def = FunctionDef::new("f", vec!["x".to_string()], None, None, 1, Graph::new());
        assert!(def.evaluate(&Inputs::new()).is_err());
    }
}
