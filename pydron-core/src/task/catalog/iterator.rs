//! `Iter`/`Next` (spec §4.4): wraps a materialized sequence into an
//! [`IterHandle`] and steps it functionally. The iterator value itself is
//! nosend — never serialized, never shipped off the producing worker.

use std::sync::Arc;

use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::{IterHandle, OpaqueHandle, Value};

#[derive(Debug, Clone, Default)]
pub struct Iter;

impl Task for Iter {
    fn kind(&self) -> &'static str {
        "Iter"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["iterable".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["iterator".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let iterable = inputs.get("iterable").ok_or_else(|| TaskFailure::new("missing input 'iterable'"))?;
        let items = match iterable {
            Value::List(v) | Value::Tuple(v) | Value::Set(v) => v.clone(),
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            other => return Err(TaskFailure::new(format!("{other:?} is not iterable"))),
        };
        let handle: OpaqueHandle = Arc::new(IterHandle::over(items));
        let mut out = Outputs::new();
        out.insert("iterator".to_string(), Value::Opaque(handle));
        Ok(out)
    }
    fn nosend_ports(&self) -> Vec<String> {
        vec!["iterator".to_string()]
    }
    fn quick(&self) -> bool {
        true
    }
}

/// Peeks the current iterator: on success, outputs `value` and an
/// `iterator` advanced by one (same handle, new cursor); `has_next`
/// reports whether the peek actually produced a value (spec §4.4, used by
/// `For`'s refine to decide whether to splice the body or the `orelse`).
#[derive(Debug, Clone, Default)]
pub struct Next;

impl Task for Next {
    fn kind(&self) -> &'static str {
        "Next"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["iterator".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string(), "iterator".to_string(), "has_next".to_string()]
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let iterator = inputs.get("iterator").ok_or_else(|| TaskFailure::new("missing input 'iterator'"))?;
        let handle = match iterator {
            Value::Opaque(h) => h,
            other => return Err(TaskFailure::new(format!("{other:?} is not an iterator"))),
        };
        let iter_handle = handle
            .as_any()
            .downcast_ref::<IterHandle>()
            .ok_or_else(|| TaskFailure::new("opaque value is not an IterHandle"))?;

        let mut out = Outputs::new();
        match iter_handle.next() {
            Some((value, advanced)) => {
                out.insert("value".to_string(), value);
                out.insert("iterator".to_string(), Value::Opaque(Arc::new(advanced)));
                out.insert("has_next".to_string(), Value::Bool(true));
            }
            None => {
                out.insert("value".to_string(), Value::Null);
                out.insert("iterator".to_string(), iterator.clone());
                out.insert("has_next".to_string(), Value::Bool(false));
            }
        }
        Ok(out)
    }
    fn nosend_ports(&self) -> Vec<String> {
        vec!["iterator".to_string()]
    }
    fn quick(&self) -> bool {
        true
    }
}
