//! How units of work are spread over threads: a rayon pool for
//! independent images, or a fixed rank group over contiguous slices.

pub mod partition;
pub mod pool;
pub mod ranks;

use std::fmt;

pub use partition::{partition, rank_range};
pub use pool::run_pool;
pub use ranks::{run_ranked, Communicator, LocalGroup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerKind {
    Pool,
    Rank,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool => write!(f, "worker"),
            Self::Rank => write!(f, "rank"),
        }
    }
}

/// Identity of the thread running a task, attached to its log output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerContext {
    pub kind: WorkerKind,
    pub id: usize,
}

impl WorkerContext {
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("task", kind = %self.kind, id = self.id)
    }
}
