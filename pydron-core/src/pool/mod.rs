//! Worker pool (spec §4.9): owns worker handles, runs a periodic reset
//! loop, and holds the scheduling strategy jobs are dispatched through.

pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::pool::strategy::SchedulingStrategy;
use crate::worker::remote::RemoteWorker;
use crate::worker::WorkerId;

const RESET_INTERVAL: Duration = Duration::from_secs(60);

/// Notified of pool membership changes and per-transfer timing samples
/// (spec §4.9) — a scheduler tuning itself against observed transfer
/// cost would subscribe here.
pub trait PoolObserver: Send + Sync {
    fn worker_added(&self, _id: WorkerId) {}
    fn worker_removed(&self, _id: WorkerId) {}
    fn transmission_sample(&self, _id: WorkerId, _bytes: u64, _duration: Duration) {}
}

/// Owns the live set of worker handles a scheduling strategy dispatches
/// against. The first worker enrolled starts a best-effort periodic reset
/// loop (every ~60s); `stop` tears both down.
pub struct Pool {
    workers: Arc<Mutex<Vec<Arc<dyn RemoteWorker>>>>,
    strategy: Arc<dyn SchedulingStrategy>,
    observers: Mutex<Vec<Arc<dyn PoolObserver>>>,
    reset_loop: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Pool {
    pub fn new(strategy: Arc<dyn SchedulingStrategy>) -> Self {
        Self { workers: Arc::new(Mutex::new(Vec::new())), strategy, observers: Mutex::new(Vec::new()), reset_loop: Mutex::new(None) }
    }

    pub fn add_observer(&self, observer: Arc<dyn PoolObserver>) {
        self.observers.lock().push(observer);
    }

    pub fn strategy(&self) -> Arc<dyn SchedulingStrategy> {
        self.strategy.clone()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.lock().iter().map(|w| w.id()).collect()
    }

    /// The first enrolled worker, by convention the master everything
    /// `masteronly`/`syncpoint` work runs on.
    pub fn master(&self) -> Option<WorkerId> {
        self.workers.lock().first().map(|w| w.id())
    }

    /// Resets `worker` before enrolling it, then starts the reset loop if
    /// this is the pool's first member (spec §4.9).
    pub async fn add_worker(&self, worker: Arc<dyn RemoteWorker>) -> Result<()> {
        worker.reset().await?;
        let id = worker.id();
        let is_first = {
            let mut workers = self.workers.lock();
            workers.push(worker);
            workers.len() == 1
        };
        for obs in self.observers.lock().iter() {
            obs.worker_added(id);
        }
        if is_first {
            self.spawn_reset_loop();
        }
        Ok(())
    }

    fn spawn_reset_loop(&self) {
        let workers = self.workers.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RESET_INTERVAL);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let snapshot: Vec<Arc<dyn RemoteWorker>> = workers.lock().clone();
                for worker in snapshot {
                    if let Err(e) = worker.reset().await {
                        warn!(worker = %worker.id(), error = %e, "periodic worker reset failed");
                    }
                }
            }
        });
        *self.reset_loop.lock() = Some(handle);
    }

    /// Stops every worker in parallel, surfacing the first error but
    /// still attempting every stop call (spec §4.9).
    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.reset_loop.lock().take() {
            handle.abort();
        }
        let snapshot: Vec<Arc<dyn RemoteWorker>> = std::mem::take(&mut *self.workers.lock());
        let results = future::join_all(snapshot.iter().map(|w| w.stop())).await;
        let mut first_err = None;
        for (worker, result) in snapshot.iter().zip(results.into_iter()) {
            match result {
                Ok(()) => {
                    for obs in self.observers.lock().iter() {
                        obs.worker_removed(worker.id());
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
