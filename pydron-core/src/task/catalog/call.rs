//! `Call`: invokes either a graph-backed [`Callable`] (spliced in by
//! `refine`, like `If`/`For`) or a builtin from the [`FunctionalWhitelist`]
//! (evaluated directly, side-effecting unless the whitelist marks it pure).

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::json;

use crate::graph::splicer::replace_task;
use crate::graph::{Endpoint, Graph};
use crate::task::catalog::function_def::lookup_body;
use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::tick::Tick;
use crate::value::Value;

type BuiltinFn = fn(&[Value], &HashMap<String, Value>) -> TaskResult<Value>;

/// The set of builtins `Call` may invoke without splicing a body graph in.
/// `pure` controls whether an unrefined `Call` targeting this name may run
/// concurrently off the master (`quick`) rather than being treated as a
/// syncpoint (spec §4.4 "side-effecting unless known-functional").
pub struct FunctionalWhitelist {
    entries: HashMap<&'static str, (BuiltinFn, bool)>,
}

fn builtin_len(args: &[Value], _kwargs: &HashMap<String, Value>) -> TaskResult<Value> {
    let arg = args.first().ok_or_else(|| TaskFailure::new("len() takes exactly one argument"))?;
    let n = match arg {
        Value::List(v) | Value::Tuple(v) | Value::Set(v) => v.len(),
        Value::Map(m) => m.len(),
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        other => return Err(TaskFailure::new(format!("object of type {other:?} has no len()"))),
    };
    Ok(Value::Int(n as i64))
}

fn builtin_abs(args: &[Value], _kwargs: &HashMap<String, Value>) -> TaskResult<Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
        Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
        other => Err(TaskFailure::new(format!("bad operand for abs(): {other:?}"))),
    }
}

fn builtin_str(args: &[Value], _kwargs: &HashMap<String, Value>) -> TaskResult<Value> {
    let arg = args.first().ok_or_else(|| TaskFailure::new("str() takes exactly one argument"))?;
    Ok(Value::Str(match arg {
        Value::Str(s) => s.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "None".to_string(),
        other => format!("{other:?}"),
    }))
}

fn builtin_sum(args: &[Value], _kwargs: &HashMap<String, Value>) -> TaskResult<Value> {
    let items = match args.first() {
        Some(Value::List(v)) | Some(Value::Tuple(v)) => v,
        other => return Err(TaskFailure::new(format!("sum() expects an iterable, got {other:?}"))),
    };
    let mut total = 0.0f64;
    let mut all_int = true;
    for item in items {
        match item {
            Value::Int(i) => total += *i as f64,
            Value::Float(f) => {
                all_int = false;
                total += f;
            }
            other => return Err(TaskFailure::new(format!("unsupported operand in sum(): {other:?}"))),
        }
    }
    Ok(if all_int { Value::Int(total as i64) } else { Value::Float(total) })
}

impl FunctionalWhitelist {
    pub fn standard() -> Self {
        let mut entries: HashMap<&'static str, (BuiltinFn, bool)> = HashMap::new();
        entries.insert("len", (builtin_len as BuiltinFn, true));
        entries.insert("abs", (builtin_abs as BuiltinFn, true));
        entries.insert("str", (builtin_str as BuiltinFn, true));
        entries.insert("sum", (builtin_sum as BuiltinFn, true));
        Self { entries }
    }

    pub fn lookup(&self, name: &str) -> Option<(BuiltinFn, bool)> {
        self.entries.get(name).copied()
    }

    pub fn is_pure(&self, name: &str) -> bool {
        self.entries.get(name).map(|(_, pure)| *pure).unwrap_or(false)
    }
}

fn whitelist() -> &'static FunctionalWhitelist {
    static WHITELIST: OnceLock<FunctionalWhitelist> = OnceLock::new();
    WHITELIST.get_or_init(FunctionalWhitelist::standard)
}

/// A call site with a fixed positional arity and a fixed set of keyword
/// names, both decided at graph-build time by the front end.
#[derive(Debug, Clone)]
pub struct Call {
    pub positional_arity: usize,
    pub keyword_names: Vec<String>,
}

impl Call {
    pub fn new(positional_arity: usize, keyword_names: Vec<String>) -> Self {
        Self { positional_arity, keyword_names }
    }

    fn arg_port(i: usize) -> String {
        format!("arg_{i}")
    }

    fn karg_port(name: &str) -> String {
        format!("karg_{name}")
    }
}

impl Task for Call {
    fn kind(&self) -> &'static str {
        "Call"
    }

    fn input_ports(&self) -> Vec<String> {
        let mut ports = vec!["func".to_string()];
        ports.extend((0..self.positional_arity).map(Self::arg_port));
        ports.extend(self.keyword_names.iter().map(|n| Self::karg_port(n)));
        ports
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["retval".to_string()]
    }

    fn refiner_ports(&self) -> Option<Vec<String>> {
        Some(vec!["func".to_string()])
    }

    /// Splices the callable's registered body graph in place of this call,
    /// binding positional and keyword arguments onto the callable's
    /// parameter names. Non-`Callable` targets (builtins) are left for
    /// `evaluate` and this is a no-op beyond validating the target exists.
    fn refine(&self, graph: &mut Graph, tick: &Tick, known_inputs: &Inputs) -> TaskResult<()> {
        let func = known_inputs.get("func").ok_or_else(|| TaskFailure::new("missing refiner input 'func'"))?;
        let callable = match func {
            Value::Callable(c) => c.clone(),
            _ => return Ok(()),
        };
        let body = lookup_body(&callable.graph_id)
            .ok_or_else(|| TaskFailure::new(format!("no registered body for callable {}", callable.name)))?;

        if callable.params.len() != self.positional_arity + self.keyword_names.len() {
            return Err(TaskFailure::new(format!(
                "call site arity ({}, {:?}) does not match callable {} arity ({})",
                self.positional_arity,
                self.keyword_names,
                callable.name,
                callable.params.len(),
            )));
        }

        let existing = graph.connections_in(tick);
        let source_for = |port: &str| existing.iter().find(|(p, _)| p == port).map(|(_, e)| e.clone());

        let mut extra_inputs: HashMap<String, Endpoint> = HashMap::new();
        for (i, param) in callable.params.iter().take(self.positional_arity).enumerate() {
            let port = Self::arg_port(i);
            let src = source_for(&port)
                .ok_or_else(|| TaskFailure::new(format!("missing positional argument for '{param}'")))?;
            extra_inputs.insert(param.clone(), src);
        }
        for name in &self.keyword_names {
            let port = Self::karg_port(name);
            let src =
                source_for(&port).ok_or_else(|| TaskFailure::new(format!("missing keyword argument '{name}'")))?;
            extra_inputs.insert(name.clone(), src);
        }

        replace_task(graph, tick, &body, None, extra_inputs)
            .map_err(|e| TaskFailure::new(format!("failed to splice callable {}: {e}", callable.name)))
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let func = inputs.get("func").ok_or_else(|| TaskFailure::new("missing input 'func'"))?;
        let name = match func {
            Value::Str(name) => name.clone(),
            Value::Callable(c) => {
                return Err(TaskFailure::new(format!(
                    "callable '{}' reached evaluate() without being spliced by refine",
                    c.name
                )))
            }
            other => return Err(TaskFailure::new(format!("{other:?} is not callable"))),
        };
        let (builtin, _pure) = whitelist()
            .lookup(&name)
            .ok_or_else(|| TaskFailure::new(format!("unknown builtin '{name}'")))?;

        let mut args = Vec::with_capacity(self.positional_arity);
        for i in 0..self.positional_arity {
            let port = Self::arg_port(i);
            args.push(inputs.get(&port).cloned().ok_or_else(|| TaskFailure::new(format!("missing input '{port}'")))?);
        }
        let mut kwargs = HashMap::new();
        for kname in &self.keyword_names {
            let port = Self::karg_port(kname);
            let v = inputs.get(&port).cloned().ok_or_else(|| TaskFailure::new(format!("missing input '{port}'")))?;
            kwargs.insert(kname.clone(), v);
        }

        let mut out = Outputs::new();
        out.insert("retval".to_string(), builtin(&args, &kwargs)?);
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({
            "kind": self.kind(),
            "positional_arity": self.positional_arity,
            "keyword_names": self.keyword_names,
        })
    }

    fn syncpoint(&self) -> bool {
        true
    }
}
