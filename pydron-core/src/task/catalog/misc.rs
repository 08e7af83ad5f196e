//! `Raise` (spec §4.4, §9 Open Questions).
//!
//! The original distillation this is grounded on read the exception
//! instance from a singular `input` map instead of the per-call `inputs`
//! map `evaluate` actually receives — a copy/paste artifact from an
//! earlier single-argument draft of the task trait. Fixed here: `inst` is
//! read from `inputs`, same as every other task.

use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct RaiseTask;

impl Task for RaiseTask {
    fn kind(&self) -> &'static str {
        "Raise"
    }

    fn input_ports(&self) -> Vec<String> {
        vec!["inst".to_string()]
    }

    fn output_ports(&self) -> Vec<String> {
        Vec::new()
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let inst = inputs.get("inst").ok_or_else(|| TaskFailure::new("missing input 'inst'"))?;
        let message = match inst {
            Value::Str(s) => s.clone(),
            other => format!("{other:?}"),
        };
        Err(TaskFailure::new(message))
    }

    fn syncpoint(&self) -> bool {
        true
    }
}
