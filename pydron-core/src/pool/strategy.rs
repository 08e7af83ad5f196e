//! Scheduling strategies (spec §4.9): where a job runs, and which holder
//! a value is fetched from.

use std::collections::HashSet;

use crate::tick::Tick;
use crate::value::ValueRef;
use crate::worker::WorkerId;

/// One unit of dispatchable work: enough about the task to apply the
/// fixed-worker constraints without the strategy needing the task object
/// itself.
#[derive(Debug, Clone)]
pub struct Job {
    pub tick: Tick,
    pub masteronly: bool,
    pub syncpoint: bool,
    pub quick: bool,
    /// Set when one of the job's inputs has `pickle_supported = false`:
    /// the job can only run on the worker already holding that value.
    pub pinned_worker: Option<WorkerId>,
}

impl Job {
    pub fn new(tick: Tick, masteronly: bool, syncpoint: bool, quick: bool, pinned_worker: Option<WorkerId>) -> Self {
        Self { tick, masteronly, syncpoint, quick, pinned_worker }
    }

    /// Must run on a specific worker rather than any idle one (spec §4.9
    /// "fixed-worker constraints").
    pub fn is_pinned(&self) -> bool {
        self.masteronly || self.syncpoint || self.pinned_worker.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub worker: WorkerId,
    pub job: Job,
}

/// A read-only snapshot of pool membership a strategy decides against —
/// who the master is, which workers exist, and which are currently busy.
pub struct PoolView<'a> {
    pub master: WorkerId,
    pub workers: &'a [WorkerId],
    pub busy: &'a HashSet<WorkerId>,
}

/// The two decisions a scheduling strategy makes (spec §4.9): how to
/// place jobs onto workers, and which holder to fetch a multiply-held
/// value from. Not every job need be assigned — unassigned jobs are
/// expected to re-enter the pool on the strategy's next invocation.
pub trait SchedulingStrategy: Send + Sync {
    fn assign_jobs_to_workers(&self, jobs: Vec<Job>, pool: &PoolView<'_>) -> Vec<Assignment>;

    fn choose_source_worker(&self, value_ref: &ValueRef, destination: WorkerId) -> Option<WorkerId>;

    /// Invoked once a dispatched job completes, so the strategy can
    /// recycle the worker's capacity (or retire it if it died).
    fn on_completion(&self, _assignment: &Assignment, _worker_is_dead: bool) {}
}

/// Partitions workers into idle/busy. `masteronly`/`syncpoint`/pinned jobs
/// go to their required worker; `quick` jobs run on the master
/// concurrently with whatever else is there; everything else claims an
/// idle worker exclusively until it completes (spec §4.9).
#[derive(Debug, Default)]
pub struct TrivialStrategy;

impl SchedulingStrategy for TrivialStrategy {
    fn assign_jobs_to_workers(&self, jobs: Vec<Job>, pool: &PoolView<'_>) -> Vec<Assignment> {
        let mut claimed: HashSet<WorkerId> = pool.busy.clone();
        let mut assignments = Vec::new();

        for job in jobs {
            if job.masteronly || job.syncpoint {
                assignments.push(Assignment { worker: pool.master, job });
                continue;
            }
            if let Some(pinned) = job.pinned_worker {
                assignments.push(Assignment { worker: pinned, job });
                continue;
            }
            if job.quick {
                assignments.push(Assignment { worker: pool.master, job });
                continue;
            }
            if let Some(&idle) = pool.workers.iter().find(|w| !claimed.contains(w)) {
                claimed.insert(idle);
                assignments.push(Assignment { worker: idle, job });
            }
            // else: no idle worker right now, leave unassigned.
        }
        assignments
    }

    /// Single-holder values have exactly one answer; multiply-held values
    /// return an arbitrary holder (spec §4.9).
    fn choose_source_worker(&self, value_ref: &ValueRef, _destination: WorkerId) -> Option<WorkerId> {
        value_ref.workers.iter().next().copied()
    }
}

/// Wraps another strategy and drops any assignment that violates the
/// fixed-worker constraints (spec §4.9) — a conflicting constraint (e.g. a
/// `masteronly` job the inner strategy sent elsewhere) is filtered out
/// rather than silently executed in the wrong place.
pub struct VerifierStrategy<S> {
    inner: S,
}

impl<S: SchedulingStrategy> VerifierStrategy<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn satisfies(&self, assignment: &Assignment, pool: &PoolView<'_>) -> bool {
        if (assignment.job.masteronly || assignment.job.syncpoint) && assignment.worker != pool.master {
            return false;
        }
        if let Some(pinned) = assignment.job.pinned_worker {
            if assignment.worker != pinned {
                return false;
            }
        }
        true
    }
}

impl<S: SchedulingStrategy> SchedulingStrategy for VerifierStrategy<S> {
    fn assign_jobs_to_workers(&self, jobs: Vec<Job>, pool: &PoolView<'_>) -> Vec<Assignment> {
        self.inner
            .assign_jobs_to_workers(jobs, pool)
            .into_iter()
            .filter(|a| self.satisfies(a, pool))
            .collect()
    }

    fn choose_source_worker(&self, value_ref: &ValueRef, destination: WorkerId) -> Option<WorkerId> {
        self.inner.choose_source_worker(value_ref, destination)
    }

    fn on_completion(&self, assignment: &Assignment, worker_is_dead: bool) {
        self.inner.on_completion(assignment, worker_is_dead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueId;
    use crate::graph::Endpoint;

    fn view<'a>(master: WorkerId, workers: &'a [WorkerId], busy: &'a HashSet<WorkerId>) -> PoolView<'a> {
        PoolView { master, workers, busy }
    }

    #[test]
    fn quick_jobs_run_on_master_even_when_busy() {
        let master = WorkerId::new();
        let workers = vec![master];
        let busy: HashSet<WorkerId> = [master].into_iter().collect();
        let job = Job::new(Tick::start().incremented(1), false, false, true, None);
        let assignments = TrivialStrategy.assign_jobs_to_workers(vec![job], &view(master, &workers, &busy));
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].worker, master);
    }

    #[test]
    fn non_quick_job_claims_an_idle_worker_exclusively() {
        let master = WorkerId::new();
        let idle = WorkerId::new();
        let workers = vec![master, idle];
        let busy: HashSet<WorkerId> = [master].into_iter().collect();
        let job = Job::new(Tick::start().incremented(1), false, false, false, None);
        let assignments = TrivialStrategy.assign_jobs_to_workers(vec![job], &view(master, &workers, &busy));
        assert_eq!(assignments[0].worker, idle);
    }

    #[test]
    fn non_quick_job_left_unassigned_when_nothing_is_idle() {
        let master = WorkerId::new();
        let workers = vec![master];
        let busy: HashSet<WorkerId> = [master].into_iter().collect();
        let job = Job::new(Tick::start().incremented(1), false, false, false, None);
        let assignments = TrivialStrategy.assign_jobs_to_workers(vec![job], &view(master, &workers, &busy));
        assert!(assignments.is_empty());
    }

    #[test]
    fn verifier_rejects_masteronly_job_sent_elsewhere() {
        struct Misbehaving;
        impl SchedulingStrategy for Misbehaving {
            fn assign_jobs_to_workers(&self, jobs: Vec<Job>, pool: &PoolView<'_>) -> Vec<Assignment> {
                jobs.into_iter().map(|job| Assignment { worker: pool.workers[1], job }).collect()
            }
            fn choose_source_worker(&self, _value_ref: &ValueRef, _destination: WorkerId) -> Option<WorkerId> {
                None
            }
        }
        let master = WorkerId::new();
        let other = WorkerId::new();
        let workers = vec![master, other];
        let busy = HashSet::new();
        let job = Job::new(Tick::start().incremented(1), true, false, false, None);
        let verifier = VerifierStrategy::new(Misbehaving);
        let assignments = verifier.assign_jobs_to_workers(vec![job], &view(master, &workers, &busy));
        assert!(assignments.is_empty());
    }

    #[test]
    fn choose_source_worker_returns_the_single_holder() {
        let holder = WorkerId::new();
        let value_ref = ValueRef::new(ValueId::new(Endpoint::new(Tick::start().incremented(1), "value"), None), true, holder);
        let chosen = TrivialStrategy.choose_source_worker(&value_ref, WorkerId::new());
        assert_eq!(chosen, Some(holder));
    }
}
