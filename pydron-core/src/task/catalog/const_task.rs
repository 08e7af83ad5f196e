//! `Const`: no inputs, one `value` output holding a fixed constant.

use serde_json::json;

use crate::task::{Inputs, Outputs, ReducerKind, Task, TaskResult};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Const {
    value: Value,
}

impl Const {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Task for Const {
    fn kind(&self) -> &'static str {
        "Const"
    }

    fn input_ports(&self) -> Vec<String> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
        let mut out = Outputs::new();
        out.insert("value".to_string(), self.value.clone());
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "value": serde_json::to_value(&self.value).ok() })
    }

    fn quick(&self) -> bool {
        true
    }

    fn refiner_reducer(&self, _port: &str) -> ReducerKind {
        ReducerKind::Identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_ignores_inputs_and_returns_its_value() {
        let c = Const::new(Value::Int(42));
        let out = c.evaluate(&Inputs::new()).unwrap();
        assert_eq!(out.get("value"), Some(&Value::Int(42)));
    }
}
