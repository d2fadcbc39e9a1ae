//! Task identity and the caller-side completion handle

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::core::error::{Result, SimError};
use crate::kernels::{TaskOutput, TaskRequest};

/// Monotonic per-pool task id; the only link between a submission and its
/// eventual result
pub type TaskId = u64;

/// A queued unit of work
pub(crate) struct Task {
    pub id: TaskId,
    pub request: TaskRequest,
    pub reply: Sender<Result<TaskOutput>>,
}

/// Pending-completion handle returned by `queue` / `execute_on_worker`
///
/// Resolved exactly once: with the kernel's output, the kernel's error, or
/// a pool-level error (cancelled, terminated, worker lost). Completion
/// order across handles is unspecified; only the id match is guaranteed.
#[derive(Debug)]
pub struct TaskHandle {
    pub(crate) id: TaskId,
    pub(crate) rx: Receiver<Result<TaskOutput>>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task resolves
    pub fn wait(&self) -> Result<TaskOutput> {
        self.rx
            .recv()
            .unwrap_or(Err(SimError::PoolTerminated))
    }

    /// Block up to `timeout`; None if still in flight
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<TaskOutput>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Some(Err(SimError::PoolTerminated))
            }
        }
    }

    /// Non-blocking poll; None if still in flight
    pub fn try_result(&self) -> Option<Result<TaskOutput>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(crossbeam_channel::TryRecvError::Empty) => None,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                Some(Err(SimError::PoolTerminated))
            }
        }
    }
}
