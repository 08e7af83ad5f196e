//! `ReadGlobal`/`AssignGlobal` (spec §4.4) and the per-module namespace
//! registry they share (spec §9 "Global mutable namespaces").
//!
//! A worker treats each front-end module as a syncpoint-guarded namespace:
//! reads and writes are ordered relative to every other syncpoint in the
//! graph (spec §5), never relative to each other directly. `NamespaceLoader`
//! is the seam a worker's import machinery hooks into to populate a module
//! before the first read reaches it.

use std::sync::OnceLock;

use dashmap::DashMap;

use crate::task::{Inputs, Outputs, Task, TaskFailure, TaskResult};
use crate::value::Value;

static NAMESPACES: OnceLock<DashMap<String, DashMap<String, Value>>> = OnceLock::new();

fn namespaces() -> &'static DashMap<String, DashMap<String, Value>> {
    NAMESPACES.get_or_init(DashMap::new)
}

/// Populates a module's namespace ahead of first use — the piece of a
/// worker's front-end-module import mechanism this engine depends on but
/// does not implement itself.
pub trait NamespaceLoader: Send + Sync {
    fn ensure_namespace(&self, module: &str) -> TaskResult<()>;
}

/// A `NamespaceLoader` that treats every module as already loaded and
/// empty — suitable for graphs that only assign globals before reading
/// them back, and for tests.
#[derive(Debug, Default)]
pub struct EmptyNamespaceLoader;

impl NamespaceLoader for EmptyNamespaceLoader {
    fn ensure_namespace(&self, module: &str) -> TaskResult<()> {
        namespaces().entry(module.to_string()).or_insert_with(DashMap::new);
        Ok(())
    }
}

fn module_table(module: &str) -> TaskResult<dashmap::mapref::one::Ref<'static, String, DashMap<String, Value>>> {
    namespaces()
        .get(module)
        .ok_or_else(|| TaskFailure::new(format!("module '{module}' has not been loaded")))
}

#[derive(Debug, Clone)]
pub struct ReadGlobal {
    pub module: String,
    pub name: String,
}

impl ReadGlobal {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { module: module.into(), name: name.into() }
    }
}

impl Task for ReadGlobal {
    fn kind(&self) -> &'static str {
        "ReadGlobal"
    }
    fn input_ports(&self) -> Vec<String> {
        Vec::new()
    }
    fn output_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }
    fn evaluate(&self, _inputs: &Inputs) -> TaskResult<Outputs> {
        let table = module_table(&self.module)?;
        let value = table
            .get(&self.name)
            .map(|v| v.clone())
            .ok_or_else(|| TaskFailure::new(format!("name '{}' is not defined in module '{}'", self.name, self.module)))?;
        let mut out = Outputs::new();
        out.insert("value".to_string(), value);
        Ok(out)
    }
    fn syncpoint(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct AssignGlobal {
    pub module: String,
    pub name: String,
}

impl AssignGlobal {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self { module: module.into(), name: name.into() }
    }
}

impl Task for AssignGlobal {
    fn kind(&self) -> &'static str {
        "AssignGlobal"
    }
    fn input_ports(&self) -> Vec<String> {
        vec!["value".to_string()]
    }
    fn output_ports(&self) -> Vec<String> {
        Vec::new()
    }
    fn evaluate(&self, inputs: &Inputs) -> TaskResult<Outputs> {
        let value = inputs.get("value").ok_or_else(|| TaskFailure::new("missing input 'value'"))?;
        let table = namespaces().entry(self.module.clone()).or_insert_with(DashMap::new);
        table.insert(self.name.clone(), value.clone());
        Ok(Outputs::new())
    }
    fn syncpoint(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_then_read_round_trips_through_the_module_namespace() {
        let module = "assign_then_read_round_trips_through_the_module_namespace";
        let assign = AssignGlobal::new(module, "x");
        let mut inputs = Inputs::new();
        inputs.insert("value".into(), Value::Int(7));
        assign.evaluate(&inputs).unwrap();

        let read = ReadGlobal::new(module, "x");
        let out = read.evaluate(&Inputs::new()).unwrap();
        assert_eq!(out.get("value"), Some(&Value::Int(7)));
    }

    #[test]
    fn reading_an_unknown_module_fails() {
        let read = ReadGlobal::new("never_loaded_module_xyz", "x");
        assert!(read.evaluate(&Inputs::new()).is_err());
    }

    #[test]
    fn reading_an_undefined_name_in_a_loaded_module_fails() {
        let module = "reading_an_undefined_name_in_a_loaded_module_fails";
        EmptyNamespaceLoader.ensure_namespace(module).unwrap();
        let read = ReadGlobal::new(module, "missing");
        assert!(read.evaluate(&Inputs::new()).is_err());
    }
}
