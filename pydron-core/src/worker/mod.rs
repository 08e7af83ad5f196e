//! Workers (spec §4.8): per-process value storage plus the evaluation and
//! transfer surface the pool dispatches onto.

pub mod holder;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{PydronError, Result};
use crate::task::{Inputs, Task, TaskFailure};
use crate::tick::Tick;
use crate::value::{Codec, JsonCodec, Value, ValueContainer};
use crate::worker::holder::ValueHolder;
use crate::worker::remote::RemoteWorker;

/// Stable worker identity, used as the key in `ValueRef::workers` and in
/// scheduling decisions (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A value the evaluation of one task produced, outside the worker's
/// internal holder bookkeeping: the id, where it landed, and its size.
#[derive(Debug, Clone)]
pub struct EvalOutput {
    pub value_id: Uuid,
    pub size: Option<u64>,
}

/// Everything `Worker::evaluate` hands back: the task's outputs (or its
/// `Failure`), how long evaluation ran on the worker thread, and telemetry
/// about any transfers performed to gather inputs (spec §4.8, §4.9 scheduling
/// feedback).
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub outputs: Option<HashMap<String, EvalOutput>>,
    pub failure: Option<TaskFailure>,
    pub duration: Duration,
    pub transfers: Vec<TransferTelemetry>,
}

#[derive(Debug, Clone)]
pub struct TransferTelemetry {
    pub value_id: Uuid,
    pub source: WorkerId,
    pub bytes: u64,
    pub duration: Duration,
}

/// One value fetched from a peer worker: the bytes and how long the
/// transfer took (spec §4.8 `fetch_from`).
#[derive(Debug, Clone)]
pub struct TransmissionResult {
    pub bytes: u64,
    pub duration: Duration,
}

/// Per-process value storage and the task runner. `values` is keyed by
/// opaque `Uuid`s assigned by whoever calls `set_value`/`fetch_from` — the
/// worker itself never invents a `ValueId` (that's the traverser/pool's
/// job); it only tracks holders by the raw id.
pub struct Worker {
    pub id: WorkerId,
    pub label: String,
    values: DashMap<Uuid, Mutex<ValueHolder>>,
    codec: Arc<dyn Codec>,
}

impl Worker {
    pub fn new(label: impl Into<String>) -> Self {
        Self { id: WorkerId::new(), label: label.into(), values: DashMap::new(), codec: Arc::new(JsonCodec) }
    }

    pub fn with_codec(label: impl Into<String>, codec: Arc<dyn Codec>) -> Self {
        Self { id: WorkerId::new(), label: label.into(), values: DashMap::new(), codec }
    }

    /// Stores a freshly produced value. `fail_if_pickle_unsupported` makes
    /// a serialization failure a synchronous error instead of silently
    /// pinning the value to this worker (spec §4.8).
    #[instrument(skip(self, value), fields(worker = %self.id))]
    pub fn set_value(&self, id: Uuid, value: Value, suppress_serialize: bool, fail_if_pickle_unsupported: bool) -> Result<()> {
        let container = ValueContainer::ingest(self.codec.as_ref(), value, suppress_serialize);
        if fail_if_pickle_unsupported && !container.pickle_supported() {
            return Err(PydronError::NotSerializable { value_id: id.to_string(), reason: "codec round-trip failed".into() });
        }
        self.values.insert(id, Mutex::new(ValueHolder::stored(container)));
        Ok(())
    }

    /// Ingests raw bytes received over the wire (`set_cucumber`).
    pub fn set_cucumber(&self, id: Uuid, bytes: Vec<u8>) {
        self.values.insert(id, Mutex::new(ValueHolder::stored(ValueContainer::from_bytes(bytes))));
    }

    pub fn get_value(&self, id: Uuid) -> Result<Value> {
        let entry = self.values.get(&id).ok_or_else(|| PydronError::invariant(format!("no value {id}")))?;
        let holder = entry.lock();
        holder.peek_stored().ok_or_else(|| PydronError::invariant(format!("value {id} is not yet stored")))?.value(self.codec.as_ref()).map_err(|e| PydronError::NotSerializable { value_id: id.to_string(), reason: e })
    }

    pub fn get_cucumber(&self, id: Uuid) -> Result<Vec<u8>> {
        let entry = self.values.get(&id).ok_or_else(|| PydronError::invariant(format!("no value {id}")))?;
        let holder = entry.lock();
        let container = holder.peek_stored().ok_or_else(|| PydronError::invariant(format!("value {id} is not yet stored")))?;
        match container.bytes() {
            Some(bytes) => Ok(bytes.to_vec()),
            None => {
                let value = container.value(self.codec.as_ref()).map_err(|e| PydronError::NotSerializable { value_id: id.to_string(), reason: e })?;
                self.codec.encode(&value).map_err(|e| PydronError::NotSerializable { value_id: id.to_string(), reason: e })
            }
        }
    }

    pub fn get_pickle_supported(&self, id: Uuid) -> Result<bool> {
        let entry = self.values.get(&id).ok_or_else(|| PydronError::invariant(format!("no value {id}")))?;
        Ok(entry.lock().peek_stored().map(|c| c.pickle_supported()).unwrap_or(false))
    }

    /// The size contract is the byte length of `get_cucumber(id)` — the
    /// worker has no cheaper way to learn an object's size than actually
    /// serializing it, so this is one explicit round-trip, not an estimate
    /// (spec §9 Open Question).
    pub fn get_size(&self, id: Uuid) -> Result<u64> {
        Ok(self.get_cucumber(id)?.len() as u64)
    }

    pub fn free(&self, id: Uuid) {
        self.values.remove(&id);
    }

    /// Duplicates a value locally under a new id; both holders own
    /// independent storage going forward (spec §4.8 `copy`).
    pub fn copy(&self, src_id: Uuid, dst_id: Uuid) -> Result<()> {
        if self.values.contains_key(&dst_id) {
            return Err(PydronError::invariant(format!("value {dst_id} already exists")));
        }
        let entry = self.values.get(&src_id).ok_or_else(|| PydronError::invariant(format!("no value {src_id}")))?;
        let container = entry
            .lock()
            .peek_stored()
            .cloned()
            .ok_or_else(|| PydronError::invariant(format!("value {src_id} is not yet stored")))?;
        self.values.insert(dst_id, Mutex::new(ValueHolder::stored(container)));
        Ok(())
    }

    /// Applies a reduction in place (e.g. a refiner reducer projecting a
    /// stored value down to its truthiness) without changing the value id.
    pub fn reduce(&self, id: Uuid, projection: impl FnOnce(&Value) -> Value) -> Result<()> {
        let entry = self.values.get(&id).ok_or_else(|| PydronError::invariant(format!("no value {id}")))?;
        let mut holder = entry.lock();
        let container = holder.peek_stored().ok_or_else(|| PydronError::invariant(format!("value {id} is not yet stored")))?;
        let reduced = projection(&container.value(self.codec.as_ref()).map_err(|e| PydronError::NotSerializable { value_id: id.to_string(), reason: e })?);
        *holder = ValueHolder::stored(ValueContainer::ingest(self.codec.as_ref(), reduced, false));
        Ok(())
    }

    /// Fetches a value from `source` into this worker under `id`, unless
    /// already present — a no-op in that case (spec §4.8 `fetch_from`).
    #[instrument(skip(self, source), fields(worker = %self.id, value = %id))]
    pub async fn fetch_from(&self, source: &dyn RemoteWorker, id: Uuid) -> Result<Option<TransmissionResult>> {
        if self.values.contains_key(&id) {
            debug!("value already resident, skipping fetch");
            return Ok(None);
        }
        let (holder, canceller_rx) = ValueHolder::transferring();
        self.values.insert(id, Mutex::new(holder));
        let started = Instant::now();

        tokio::select! {
            result = source.get_cucumber(id) => {
                match result {
                    Ok(bytes) => {
                        let size = bytes.len() as u64;
                        if let Some(entry) = self.values.get(&id) {
                            *entry.lock() = ValueHolder::stored(ValueContainer::from_bytes(bytes));
                        }
                        Ok(Some(TransmissionResult { bytes: size, duration: started.elapsed() }))
                    }
                    Err(e) => {
                        warn!(error = %e, "transfer failed");
                        self.values.remove(&id);
                        Err(PydronError::transport(source.label(), e.to_string()))
                    }
                }
            }
            _ = canceller_rx => {
                self.values.remove(&id);
                Err(PydronError::Cancelled)
            }
        }
    }

    /// Runs `task.evaluate` against gathered inputs, allocating a fresh
    /// value id per output port and honoring `nosend_ports` (spec §4.8).
    /// `fail_on_unexpected_nosend`: a produced value on a port the task did
    /// *not* declare `nosend` still turns out not to be serializable, the
    /// worker would otherwise silently pin it here; when set, that's
    /// instead reported as an evaluation failure (spec §4.8, §6 `evaluate`).
    #[instrument(skip(self, task, inputs), fields(worker = %self.id, tick = %tick))]
    pub fn evaluate(
        &self,
        tick: &Tick,
        task: &dyn Task,
        inputs: Inputs,
        nosend_ports: &[String],
        fail_on_unexpected_nosend: bool,
    ) -> EvalResult {
        let started = Instant::now();
        match task.evaluate(&inputs) {
            Ok(outputs) => {
                let mut recorded = HashMap::new();
                for (port, value) in outputs {
                    let suppress = nosend_ports.iter().any(|p| p == &port);
                    let container = ValueContainer::ingest(self.codec.as_ref(), value, suppress);
                    if fail_on_unexpected_nosend && !suppress && !container.pickle_supported() {
                        return EvalResult {
                            outputs: None,
                            failure: Some(TaskFailure::new(format!(
                                "output port {port} is not serializable but was not declared nosend"
                            ))),
                            duration: started.elapsed(),
                            transfers: Vec::new(),
                        };
                    }
                    let id = Uuid::new_v4();
                    let size = container.size();
                    self.values.insert(id, Mutex::new(ValueHolder::stored(container)));
                    recorded.insert(port, EvalOutput { value_id: id, size });
                }
                EvalResult { outputs: Some(recorded), failure: None, duration: started.elapsed(), transfers: Vec::new() }
            }
            Err(failure) => EvalResult { outputs: None, failure: Some(failure), duration: started.elapsed(), transfers: Vec::new() },
        }
    }

    /// Signals cancellation of a pending transfer into `id`, if one is in
    /// flight (used by a free on a `transferring_*` holder).
    pub fn cancel_transfer(&self, id: Uuid) {
        if let Some(entry) = self.values.get(&id) {
            entry.lock().cancel();
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker").field("id", &self.id).field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_value_round_trips() {
        let worker = Worker::new("w1");
        let id = Uuid::new_v4();
        worker.set_value(id, Value::Int(42), false, false).unwrap();
        assert_eq!(worker.get_value(id).unwrap(), Value::Int(42));
        assert!(worker.get_pickle_supported(id).unwrap());
    }

    #[test]
    fn copy_produces_an_independent_holder() {
        let worker = Worker::new("w1");
        let src = Uuid::new_v4();
        let dst = Uuid::new_v4();
        worker.set_value(src, Value::Int(1), false, false).unwrap();
        worker.copy(src, dst).unwrap();
        worker.free(src);
        assert_eq!(worker.get_value(dst).unwrap(), Value::Int(1));
    }

    #[test]
    fn copy_rejects_an_existing_destination() {
        let worker = Worker::new("w1");
        let src = Uuid::new_v4();
        let dst = Uuid::new_v4();
        worker.set_value(src, Value::Int(1), false, false).unwrap();
        worker.set_value(dst, Value::Int(2), false, false).unwrap();
        assert!(worker.copy(src, dst).is_err());
    }

    #[test]
    fn get_size_matches_cucumber_length() {
        let worker = Worker::new("w1");
        let id = Uuid::new_v4();
        worker.set_value(id, Value::Str("hello".into()), false, false).unwrap();
        let size = worker.get_size(id).unwrap();
        let bytes = worker.get_cucumber(id).unwrap();
        assert_eq!(size, bytes.len() as u64);
    }

    #[derive(Debug)]
    struct Echo;
    impl Task for Echo {
        fn kind(&self) -> &'static str {
            "echo"
        }
        fn input_ports(&self) -> Vec<String> {
            vec!["x".into()]
        }
        fn output_ports(&self) -> Vec<String> {
            vec!["x".into()]
        }
        fn evaluate(&self, inputs: &Inputs) -> crate::task::TaskResult<crate::task::Outputs> {
            let mut out = crate::task::Outputs::new();
            out.insert("x".into(), inputs.get("x").cloned().unwrap());
            Ok(out)
        }
    }

    #[test]
    fn evaluate_allocates_a_fresh_id_per_output_port() {
        let worker = Worker::new("w1");
        let mut inputs = Inputs::new();
        inputs.insert("x".into(), Value::Int(9));
        let result = worker.evaluate(&Tick::start().incremented(1), &Echo, inputs, &[], false);
        let outputs = result.outputs.unwrap();
        let id = outputs.get("x").unwrap().value_id;
        assert_eq!(worker.get_value(id).unwrap(), Value::Int(9));
    }

    #[test]
    fn reduce_replaces_stored_value_keeping_the_same_id() {
        let worker = Worker::new("w1");
        let id = Uuid::new_v4();
        worker.set_value(id, Value::Int(5), false, false).unwrap();
        worker.reduce(id, |v| Value::Bool(v.truthy())).unwrap();
        assert_eq!(worker.get_value(id).unwrap(), Value::Bool(true));
    }

    #[test]
    fn reduce_errors_on_an_unknown_value() {
        let worker = Worker::new("w1");
        assert!(worker.reduce(Uuid::new_v4(), |v| v.clone()).is_err());
    }

    #[derive(Debug)]
    struct ProducesIterator;
    impl Task for ProducesIterator {
        fn kind(&self) -> &'static str {
            "produces_iterator"
        }
        fn input_ports(&self) -> Vec<String> {
            Vec::new()
        }
        fn output_ports(&self) -> Vec<String> {
            vec!["it".into()]
        }
        fn evaluate(&self, _inputs: &Inputs) -> crate::task::TaskResult<crate::task::Outputs> {
            let mut out = crate::task::Outputs::new();
            out.insert("it".into(), Value::Opaque(Arc::new(crate::value::IterHandle::over(vec![Value::Int(1)]))));
            Ok(out)
        }
    }

    #[test]
    fn evaluate_tolerates_unexpected_nosend_by_default() {
        let worker = Worker::new("w1");
        let result = worker.evaluate(&Tick::start().incremented(1), &ProducesIterator, Inputs::new(), &[], false);
        assert!(result.outputs.is_some());
    }

    #[test]
    fn evaluate_fails_on_unexpected_nosend_when_requested() {
        let worker = Worker::new("w1");
        let result = worker.evaluate(&Tick::start().incremented(1), &ProducesIterator, Inputs::new(), &[], true);
        assert!(result.failure.is_some());
    }

    #[test]
    fn evaluate_allows_declared_nosend_port_even_with_the_flag_set() {
        let worker = Worker::new("w1");
        let result =
            worker.evaluate(&Tick::start().incremented(1), &ProducesIterator, Inputs::new(), &["it".to_string()], true);
        assert!(result.outputs.is_some());
    }
}
