//! A fixed group of cooperating ranks inside one process.

use std::any::Any;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier};
use std::thread;

use tracing::debug;

use crate::error::{BeamconError, Result};

use super::pool::panic_message;
use super::{WorkerContext, WorkerKind};

/// Collective operations a rank can take part in.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank has arrived.
    fn barrier(&self);

    /// Rank 0 passes `Some(value)`; every rank gets a copy back.
    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T>;
}

type Message = Box<dyn Any + Send>;

/// One member of an in-process rank group backed by threads.
pub struct LocalGroup {
    rank: usize,
    size: usize,
    barrier: Arc<Barrier>,
    /// Only rank 0 holds senders, one per follower.
    followers: Vec<Sender<Message>>,
    inbox: Option<Receiver<Message>>,
}

impl LocalGroup {
    /// Handles for ranks `0..size`, to be moved into one thread each.
    pub fn create(size: usize) -> Vec<LocalGroup> {
        let size = size.max(1);
        let barrier = Arc::new(Barrier::new(size));
        let (senders, receivers): (Vec<_>, Vec<_>) = (1..size).map(|_| mpsc::channel()).unzip();

        let mut group = vec![LocalGroup {
            rank: 0,
            size,
            barrier: Arc::clone(&barrier),
            followers: senders,
            inbox: None,
        }];
        for (i, inbox) in receivers.into_iter().enumerate() {
            group.push(LocalGroup {
                rank: i + 1,
                size,
                barrier: Arc::clone(&barrier),
                followers: Vec::new(),
                inbox: Some(inbox),
            });
        }
        group
    }
}

impl Communicator for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.barrier.wait();
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T> {
        match &self.inbox {
            None => {
                let value = value.ok_or_else(|| {
                    BeamconError::Worker("rank 0 has nothing to broadcast".into())
                })?;
                for tx in &self.followers {
                    tx.send(Box::new(value.clone()))
                        .map_err(|_| BeamconError::Worker("a rank hung up".into()))?;
                }
                Ok(value)
            }
            Some(rx) => {
                let message = rx.recv().map_err(|_| {
                    BeamconError::Worker(format!("rank {} lost the leader", self.rank))
                })?;
                message.downcast::<T>().map(|v| *v).map_err(|_| {
                    BeamconError::Worker(format!("rank {} got an unexpected message", self.rank))
                })
            }
        }
    }
}

/// Run a job over `ranks` threads.
///
/// Rank 0 runs `setup` and broadcasts its result. If setup fails every
/// rank stops and the setup error is returned. Otherwise all ranks meet at
/// a barrier and then call `work`; results are returned in rank order
/// together with the shared setup value.
pub fn run_ranked<P, S, W, R>(ranks: usize, setup: S, work: W) -> Result<(Arc<P>, Vec<R>)>
where
    P: Send + Sync + 'static,
    S: FnOnce() -> Result<P> + Send,
    W: Fn(&WorkerContext, &LocalGroup, &P) -> R + Sync,
    R: Send,
{
    let group = LocalGroup::create(ranks);
    debug!(ranks = group.len(), "Starting rank group");

    let outcomes: Vec<thread::Result<Result<Option<(Arc<P>, R)>>>> = thread::scope(|s| {
        let mut setup = Some(setup);
        let handles: Vec<_> = group
            .into_iter()
            .map(|comm| {
                let setup = if comm.rank() == 0 { setup.take() } else { None };
                let work = &work;
                s.spawn(move || rank_main(comm, setup, work))
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut shared = None;
    let mut results = Vec::with_capacity(outcomes.len());
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                return Err(BeamconError::Worker(format!("rank {rank} panicked: {reason}")));
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Some((plan, result)))) => {
                shared.get_or_insert(plan);
                results.push(result);
            }
            Ok(Ok(None)) => {}
        }
    }
    let shared =
        shared.ok_or_else(|| BeamconError::Worker("rank group produced no setup".into()))?;
    Ok((shared, results))
}

fn rank_main<P, S, W, R>(comm: LocalGroup, setup: Option<S>, work: &W) -> Result<Option<(Arc<P>, R)>>
where
    P: Send + Sync + 'static,
    S: FnOnce() -> Result<P>,
    W: Fn(&WorkerContext, &LocalGroup, &P) -> R,
{
    let ctx = WorkerContext {
        kind: WorkerKind::Rank,
        id: comm.rank(),
    };
    let _span = ctx.span().entered();

    let (message, setup_error) = match setup {
        Some(setup) => match setup() {
            Ok(plan) => (Some(Some(Arc::new(plan))), None),
            Err(e) => (Some(None), Some(e)),
        },
        None => (None, None),
    };
    let plan: Option<Arc<P>> = comm.broadcast(message)?;
    if let Some(e) = setup_error {
        return Err(e);
    }
    let Some(plan) = plan else {
        return Ok(None);
    };

    comm.barrier();
    let result = work(&ctx, &comm, &plan);
    Ok(Some((plan, result)))
}
