//! Container builders (spec §4.4): fixed-arity, pure tasks that assemble a
//! `list`/`tuple`/`set`/`dict` from numbered input ports.

use serde_json::json;

use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    List,
    Tuple,
    Set,
}

impl SequenceKind {
    fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::List => "BuildList",
            SequenceKind::Tuple => "BuildTuple",
            SequenceKind::Set => "BuildSet",
        }
    }

    fn wrap(&self, items: Vec<Value>) -> Value {
        match self {
            SequenceKind::List => Value::List(items),
            SequenceKind::Tuple => Value::Tuple(items),
            SequenceKind::Set => Value::Set(items),
        }
    }
}

/// Builds a `list`/`tuple`/`set` from `arity` positional inputs named
/// `item_0`..`item_{arity-1}`.
#[derive(Debug, Clone)]
pub struct BuildSequence {
    pub kind: SequenceKind,
    pub arity: usize,
}

impl BuildSequence {
    pub fn new(kind: SequenceKind, arity: usize) -> Self {
        Self { kind, arity }
    }

    fn port(i: usize) -> String {
        format!("item_{i}")
    }
}

impl Task for BuildSequence {
    fn kind(&self) -> &'static str {
        self.kind.as_str()
    }

    fn input_ports(&self) -> Vec<String> {
        (0..self.arity).map(Self::port).collect()
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let mut items = Vec::with_capacity(self.arity);
        for i in 0..self.arity {
            let port = Self::port(i);
            let v = inputs
                .get(&port)
                .ok_or_else(|| TaskFailure::new(format!("missing input '{port}'")))?;
            items.push(v.clone());
        }
        let mut out = Outputs::new();
        out.insert("value".to_string(), self.kind.wrap(items));
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "arity": self.arity })
    }

    fn quick(&self) -> bool {
        true
    }
}

/// Builds a `dict` from `arity` key/value pairs named `key_i`/`val_i`.
#[derive(Debug, Clone)]
pub struct BuildDict {
    pub arity: usize,
}

impl BuildDict {
    pub fn new(arity: usize) -> Self {
        Self { arity }
    }

    fn key_port(i: usize) -> String {
        format!("key_{i}")
    }
    fn val_port(i: usize) -> String {
        format!("val_{i}")
    }
}

impl Task for BuildDict {
    fn kind(&self) -> &'static str {
        "BuildDict"
    }

    fn input_ports(&self) -> Vec<String> {
        (0..self.arity).flat_map(|i| vec![Self::key_port(i), Self::val_port(i)]).collect()
    }

    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }

    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let mut entries = Vec::with_capacity(self.arity);
        for i in 0..self.arity {
            let kp = Self::key_port(i);
            let vp = Self::val_port(i);
            let k = inputs.get(&kp).ok_or_else(|| TaskFailure::new(format!("missing input '{kp}'")))?;
            let v = inputs.get(&vp).ok_or_else(|| TaskFailure::new(format!("missing input '{vp}'")))?;
            entries.push((k.clone(), v.clone()));
        }
        let mut out = Outputs::new();
        out.insert("value".to_string(), Value::Map(entries));
        Ok(out)
    }

    fn structural_key(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "arity": self.arity })
    }

    fn quick(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_list_assembles_items_in_order() {
        let task = BuildSequence::new(SequenceKind::List, 3);
        let mut inputs = Inputs::new();
        inputs.insert("item_0".into(), Value::Int(1));
        inputs.insert("item_1".into(), Value::Int(2));
        inputs.insert("item_2".into(), Value::Int(3));
        let out = task.evaluate(&inputs).unwrap();
        assert_eq!(
            out.get("value"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
    }

    #[test]
    fn build_list_fails_on_missing_item() {
        let task = BuildSequence::new(SequenceKind::List, 2);
        let mut inputs = Inputs::new();
        inputs.insert("item_0".into(), Value::Int(1));
        assert!(task.evaluate(&inputs).is_err());
    }

    #[test]
    fn build_dict_pairs_keys_and_values() {
        let task = BuildDict::new(1);
        let mut inputs = Inputs::new();
        inputs.insert("key_0".into(), Value::Str("a".into()));
        inputs.insert("val_0".into(), Value::Int(1));
        let out = task.evaluate(&inputs).unwrap();
        assert_eq!(
            out.get("value"),
            Some(&Value::Map(vec![(Value::Str("a".into()), Value::Int(1))]))
        );
    }
}
