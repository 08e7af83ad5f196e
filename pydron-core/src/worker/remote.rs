//! The surface a worker exposes to its peers and to the pool (spec §4.8,
//! §6 "Remote worker surface"): `fetch_from`, `free`, `copy`, `reduce`,
//! `evaluate`, plus enough identity to log and schedule against.
//!
//! `RemoteWorker` is the seam between this engine and whatever transport a
//! deployment actually uses — an in-process call for a `multicore` worker
//! group, or RPC framing for `ssh`/`cloud` workers (out of scope here; see
//! spec §1 external collaborators). [`LocalWorkerHandle`] is the in-process
//! implementation used by the single-process pool and by tests.

use std::sync::Arc;
use uuid::Uuid;

use async_trait::async_trait;

use crate::error::{PydronError, Result};
use crate::task::{Inputs, ReducerKind, Task};
use crate::tick::Tick;
use crate::worker::{EvalResult, Worker, WorkerId};

/// Async, transport-agnostic view of a peer worker. Every method maps
/// directly onto a `Worker` operation; implementations beyond
/// `LocalWorkerHandle` would marshal these calls over a wire.
#[async_trait]
pub trait RemoteWorker: Send + Sync {
    fn id(&self) -> WorkerId;
    fn label(&self) -> String;

    async fn get_cucumber(&self, id: Uuid) -> Result<Vec<u8>>;
    async fn free(&self, id: Uuid) -> Result<()>;
    async fn copy(&self, src_id: Uuid, dst_id: Uuid) -> Result<()>;
    /// Applies `projection` to the value stored under `id`, in place
    /// (spec §6 `reduce(value_id, projection) -> projected`). `ReducerKind`
    /// rather than a closure, since this crosses the same trait-object
    /// seam `evaluate` does with `Arc<dyn Task>`.
    async fn reduce(&self, id: Uuid, projection: ReducerKind) -> Result<()>;
    async fn evaluate(
        &self,
        tick: Tick,
        task: Arc<dyn Task>,
        inputs: Inputs,
        nosend_ports: Vec<String>,
        fail_on_unexpected_nosend: bool,
    ) -> Result<EvalResult>;

    /// Lifecycle (spec §6): `reset` recovers a worker back to a clean
    /// state (called on every fresh `add_worker` and periodically by the
    /// pool), `stop` shuts it down gracefully, `kill` is the forceful
    /// fallback a deployment reaches for when `stop` doesn't land.
    async fn reset(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn kill(&self) -> Result<()>;
}

/// An in-process worker reached by a direct call — what a `multicore`
/// worker group resolves to, and what tests exercise the transfer/eval
/// paths against without any real networking.
pub struct LocalWorkerHandle {
    pub worker: Arc<Worker>,
}

impl LocalWorkerHandle {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl RemoteWorker for LocalWorkerHandle {
    fn id(&self) -> WorkerId {
        self.worker.id
    }

    fn label(&self) -> String {
        self.worker.label.clone()
    }

    async fn get_cucumber(&self, id: Uuid) -> Result<Vec<u8>> {
        self.worker.get_cucumber(id)
    }

    async fn free(&self, id: Uuid) -> Result<()> {
        self.worker.free(id);
        Ok(())
    }

    async fn copy(&self, src_id: Uuid, dst_id: Uuid) -> Result<()> {
        self.worker.copy(src_id, dst_id)
    }

    async fn reduce(&self, id: Uuid, projection: ReducerKind) -> Result<()> {
        self.worker.reduce(id, |v| projection.apply(v))
    }

    async fn evaluate(
        &self,
        tick: Tick,
        task: Arc<dyn Task>,
        inputs: Inputs,
        nosend_ports: Vec<String>,
        fail_on_unexpected_nosend: bool,
    ) -> Result<EvalResult> {
        Ok(self.worker.evaluate(&tick, task.as_ref(), inputs, &nosend_ports, fail_on_unexpected_nosend))
    }

    /// In-process workers have nothing to recover or tear down beyond the
    /// pool's own bookkeeping; these are no-ops.
    async fn reset(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        Ok(())
    }
}

/// A `RemoteWorker` stub that always fails transport calls — grounds a
/// `PydronError::Transport` path in tests without standing up a second
/// worker.
pub struct UnreachableWorker {
    pub id: WorkerId,
}

#[async_trait]
impl RemoteWorker for UnreachableWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn label(&self) -> String {
        "unreachable".to_string()
    }

    async fn get_cucumber(&self, _id: Uuid) -> Result<Vec<u8>> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn free(&self, _id: Uuid) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn copy(&self, _src_id: Uuid, _dst_id: Uuid) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn reduce(&self, _id: Uuid, _projection: ReducerKind) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn evaluate(
        &self,
        _tick: Tick,
        _task: Arc<dyn Task>,
        _inputs: Inputs,
        _nosend_ports: Vec<String>,
        _fail_on_unexpected_nosend: bool,
    ) -> Result<EvalResult> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn reset(&self) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn stop(&self) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }

    async fn kill(&self) -> Result<()> {
        Err(PydronError::transport("unreachable", "connection refused"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[tokio::test]
    async fn local_handle_round_trips_through_get_cucumber() {
        let worker = Arc::new(Worker::new("w1"));
        let id = Uuid::new_v4();
        worker.set_value(id, Value::Int(3), false, false).unwrap();
        let handle = LocalWorkerHandle::new(worker);
        let bytes = handle.get_cucumber(id).await.unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn unreachable_worker_surfaces_transport_error() {
        let handle = UnreachableWorker { id: WorkerId::new() };
        assert!(handle.get_cucumber(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn local_handle_reduce_delegates_to_the_worker() {
        let worker = Arc::new(Worker::new("w1"));
        let id = Uuid::new_v4();
        worker.set_value(id, Value::Int(7), false, false).unwrap();
        let handle = LocalWorkerHandle::new(worker.clone());
        handle.reduce(id, crate::task::ReducerKind::Bool).await.unwrap();
        assert_eq!(worker.get_value(id).unwrap(), Value::Bool(true));
    }
}
