//! Worker thread: a resident kernel draining its message channel

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::core::error::{Result, SimError};
use crate::kernels::{ControlRequest, KernelKind, KernelState, TaskOutput, TaskRequest};

use super::task::TaskId;

/// Messages a worker consumes
pub(crate) enum WorkerMessage {
    Run { task: TaskId, request: TaskRequest },
    Control(ControlRequest),
    Shutdown,
}

/// What workers and the terminator feed the router
pub(crate) enum RouterMessage {
    Reply {
        worker: usize,
        task: TaskId,
        result: Result<TaskOutput>,
    },
    Shutdown,
}

pub(crate) fn spawn_worker(
    id: usize,
    kind: KernelKind,
    results: Sender<RouterMessage>,
) -> (Sender<WorkerMessage>, JoinHandle<()>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = std::thread::Builder::new()
        .name(format!("simpulse-worker-{}", id))
        .spawn(move || worker_main(id, kind, rx, results))
        .expect("failed to spawn worker thread");
    (tx, handle)
}

fn worker_main(
    id: usize,
    kind: KernelKind,
    rx: Receiver<WorkerMessage>,
    results: Sender<RouterMessage>,
) {
    let mut kernel = KernelState::new(kind);

    while let Ok(message) = rx.recv() {
        match message {
            WorkerMessage::Run { task, request } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel.handle(request)));
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        // The kernel may hold broken invariants after a
                        // panic; rebuild it and fail just this task.
                        tracing::error!("worker {} kernel panicked; rebuilding state", id);
                        kernel = KernelState::new(kind);
                        Err(SimError::WorkerLost(id))
                    }
                };

                if results
                    .send(RouterMessage::Reply { worker: id, task, result })
                    .is_err()
                {
                    break; // Router is gone; nothing left to report to
                }
            }
            WorkerMessage::Control(request) => kernel.control(request),
            WorkerMessage::Shutdown => break,
        }
    }
}
