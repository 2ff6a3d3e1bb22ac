use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use tracing::{debug, error};

use crate::error::{BeamconError, Result};

use super::{WorkerContext, WorkerKind};

/// Run `f` over `tasks` on a dedicated pool of `workers` threads.
///
/// Results come back in task order. A task that panics yields a
/// [`BeamconError::Worker`] in its slot; its siblings still run.
pub fn run_pool<T, R, F>(workers: usize, tasks: Vec<T>, f: F) -> Result<Vec<Result<R>>>
where
    T: Send,
    R: Send,
    F: Fn(&WorkerContext, T) -> Result<R> + Sync,
{
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("beamcon-worker-{i}"))
        .build()
        .map_err(|e| BeamconError::Worker(e.to_string()))?;
    debug!(workers, tasks = tasks.len(), "Starting worker pool");

    Ok(pool.install(|| {
        tasks
            .into_par_iter()
            .enumerate()
            .map(|(index, task)| {
                let ctx = WorkerContext {
                    kind: WorkerKind::Pool,
                    id: rayon::current_thread_index().unwrap_or(0),
                };
                let _span = ctx.span().entered();
                panic::catch_unwind(AssertUnwindSafe(|| f(&ctx, task))).unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref());
                    error!(task = index, %reason, "Task panicked");
                    Err(BeamconError::Worker(format!("task {index} panicked: {reason}")))
                })
            })
            .collect()
    }))
}

pub(super) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
