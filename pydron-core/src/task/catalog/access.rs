//! Attribute/subscript read (pure) and assign (side-effecting syncpoint)
//! tasks, `Unpack`, and the read-modify-write `AugAssign` variants.
//!
//! Objects and mappings are represented uniformly as [`Value::Map`] keyed by
//! [`Value::Str`] attribute/subscript keys — there is no separate "object"
//! variant, matching how the front end lowers both attribute and item
//! access onto the same container shape.

use serde_json::json;

use crate::task::catalog::ops::BinOp;
use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::Value;

fn map_get(obj: &Value, key: &Value) -> TaskResult<Value> {
    match obj {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| TaskFailure::new(format!("key {key:?} not found"))),
        Value::List(items) | Value::Tuple(items) => {
            let idx = key.as_int().ok_or_else(|| TaskFailure::new("subscript index must be an int"))?;
            let idx = resolve_index(idx, items.len())?;
            Ok(items[idx].clone())
        }
        _ => Err(TaskFailure::new(format!("{obj:?} does not support subscript/attribute access"))),
    }
}

fn map_set(obj: &Value, key: &Value, value: Value) -> TaskResult<Value> {
    match obj {
        Value::Map(entries) => {
            let mut entries = entries.clone();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, v)) => *v = value,
                None => entries.push((key.clone(), value)),
            }
            Ok(Value::Map(entries))
        }
        Value::List(items) => {
            let idx = key.as_int().ok_or_else(|| TaskFailure::new("subscript index must be an int"))?;
            let idx = resolve_index(idx, items.len())?;
            let mut items = items.clone();
            items[idx] = value;
            Ok(Value::List(items))
        }
        _ => Err(TaskFailure::new(format!("{obj:?} does not support assignment"))),
    }
}

fn resolve_index(idx: i64, len: usize) -> TaskResult<usize> {
    let resolved = if idx < 0 { idx + len as i64 } else { idx };
    if resolved < 0 || resolved as usize >= len {
        return Err(TaskFailure::new(format!("index {idx} out of range for length {len}")));
    }
    Ok(resolved as usize)
}

/// Pure read of `obj.attr` (spec §4.4 "Attribute/subscript read").
#[derive(Debug, Clone)]
pub struct AttrRead {
    pub attr: String,
}

impl AttrRead {
    pub fn new(attr: impl Into<String>) -> Self {
        Self { attr: attr.into() }
    }
}

impl Task for AttrRead {
    fn kind(&self) -> &'static str {
        "AttrRead"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let mut out = Outputs::new();
        out.insert("value".to_string(), map_get(obj, &Value::Str(self.attr.clone()))?);
        Ok(out)
    }
    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "attr": self.attr })
    }
    fn quick(&self) -> bool {
        true
    }
}

/// `obj.attr = value`: side-effecting and ordered relative to every other
/// syncpoint (spec §4.4, §5).
#[derive(Debug, Clone)]
pub struct AttrAssign {
    pub attr: String,
}

impl AttrAssign {
    pub fn new(attr: impl Into<String>) -> Self {
        Self { attr: attr.into() }
    }
}

impl Task for AttrAssign {
    fn kind(&self) -> &'static str {
        "AttrAssign"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string(), "value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["obj".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let value = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let mut out = Outputs::new();
        out.insert("obj".to_string(), map_set(obj, &Value::Str(self.attr.clone()), value.clone())?);
        Ok(out)
    }
    fn syncpoint(&self) -> bool {
        true
    }
}

/// Pure read of `obj[slice]`.
#[derive(Debug, Clone, Default)]
pub struct SubscriptRead;

impl Task for SubscriptRead {
    fn kind(&self) -> &'static str {
        "SubscriptRead"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string(), "slice".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let slice = inputs.get("slice").ok_or_else(|| TaskFailure::new("missing input 'slice'"))?;
        let mut out = Outputs::new();
        out.insert("value".to_string(), map_get(obj, slice)?);
        Ok(out)
    }
    fn quick(&self) -> bool {
        true
    }
}

/// `obj[slice] = value`: side-effecting syncpoint.
#[derive(Debug, Clone, Default)]
pub struct SubscriptAssign;

impl Task for SubscriptAssign {
    fn kind(&self) -> &'static str {
        "SubscriptAssign"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string(), "slice".to_string(), "value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["obj".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let slice = inputs.get("slice").ok_or_else(|| TaskFailure::new("missing input 'slice'"))?;
        let value = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let mut out = Outputs::new();
        out.insert("obj".to_string(), map_set(obj, slice, value.clone())?);
        Ok(out)
    }
    fn syncpoint(&self) -> bool {
        true
    }
}

/// Unpacks a `list`/`tuple` of exactly `arity` elements onto `item_0`..`item_{n-1}`.
#[derive(Debug, Clone)]
pub struct Unpack {
    pub arity: usize,
}

impl Unpack {
    pub fn new(arity: usize) -> Self {
        Self { arity }
    }
}

impl Task for Unpack {
    fn kind(&self) -> &'static str {
        "Unpack"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        (0..self.arity).map(|i| format!("item_{i}")).collect()
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let value = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let items = match value {
            Value::List(v) | Value::Tuple(v) => v,
            other => return Err(TaskFailure::new(format!("cannot unpack {other:?}"))),
        };
        if items.len() != self.arity {
            return Err(TaskFailure::new(format!(
                "expected {} values to unpack, got {}",
                self.arity,
                items.len()
            )));
        }
        let mut out = Outputs::new();
        for (i, item) in items.iter().enumerate() {
            out.insert(format!("item_{i}"), item.clone());
        }
        Ok(out)
    }
    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "arity": self.arity })
    }
    fn quick(&self) -> bool {
        true
    }
}

/// `obj.attr OP= value`: reads the current attribute, applies `op`, writes
/// the result back. Side-effecting syncpoint like its non-augmented cousin.
#[derive(Debug, Clone)]
pub struct AugAttrAssignTask {
    pub attr: String,
    pub op: BinOp,
}

impl AugAttrAssignTask {
    pub fn new(attr: impl Into<String>, op: BinOp) -> Self {
        Self { attr: attr.into(), op }
    }
}

impl Task for AugAttrAssignTask {
    fn kind(&self) -> &'static str {
        "AugAttrAssign"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string(), "value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["obj".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let rhs = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let key = Value::Str(self.attr.clone());
        let current = map_get(obj, &key)?;
        let mut combined = Outputs::new();
        let mut op_inputs = Inputs::new();
        op_inputs.insert("left".to_string(), current);
        op_inputs.insert("right".to_string(), rhs.clone());
        let applied = self.op.evaluate(&op_inputs)?;
        let new_value = applied.get("value").cloned().ok_or_else(|| TaskFailure::new("operator produced no value"))?;
        combined.insert("obj".to_string(), map_set(obj, &key, new_value)?);
        Ok(combined)
    }
    fn syncpoint(&self) -> bool {
        true
    }
}

/// `obj[slice] OP= value`.
///
/// The original distillation this is grounded on read the slice from a
/// singular `input` map instead of the per-task `inputs` map passed to
/// `evaluate` — a bug that made augmented subscript assignment panic on
/// every call. Fixed here: `slice` is read from `inputs`, same as every
/// other port.
#[derive(Debug, Clone)]
pub struct AugSubscriptAssignTask {
    pub op: BinOp,
}

impl AugSubscriptAssignTask {
    pub fn new(op: BinOp) -> Self {
        Self { op }
    }
}

impl Task for AugSubscriptAssignTask {
    fn kind(&self) -> &'static str {
        "AugSubscriptAssign"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["obj".to_string(), "slice".to_string(), "value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["obj".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let obj = inputs.get("obj").ok_or_else(|| TaskFailure::new("missing input 'obj'"))?;
        let slice = inputs.get("slice").ok_or_else(|| TaskFailure::new("missing input 'slice'"))?;
        let rhs = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let current = map_get(obj, slice)?;
        let mut op_inputs = Inputs::new();
        op_inputs.insert("left".to_string(), current);
        op_inputs.insert("right".to_string(), rhs.clone());
        let applied = self.op.evaluate(&op_inputs)?;
        let new_value = applied.get("value").cloned().ok_or_else(|| TaskFailure::new("operator produced no value"))?;
        let mut out = Outputs::new();
        out.insert("obj".to_string(), map_set(obj, slice, new_value)?);
        Ok(out)
    }
    fn syncpoint(&self) -> bool {
        true
    }
}
