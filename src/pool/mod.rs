//! Worker pool: fixed worker set, FIFO queue, completion routing
//!
//! Each worker thread hosts one resident kernel. Tasks are dispatched to
//! the first idle worker in FIFO submission order; there are no priorities
//! and no work stealing. Completions come back over a single channel owned
//! by a router thread, which is the only code that touches the
//! pending-task table, so the dispatch and completion paths never race.
//!
//! Completion order across tasks is unspecified. Callers hold a
//! [`TaskHandle`] and rely solely on the task-id match.

pub mod task;
mod worker;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use ahash::AHashMap;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::config::config;
use crate::core::error::{Result, SimError};
use crate::kernels::{ControlRequest, KernelKind, TaskOutput, TaskOutputKind, TaskRequest};

use task::{Task, TaskHandle, TaskId};
use worker::{spawn_worker, RouterMessage, WorkerMessage};

/// Per-worker snapshot
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub id: usize,
    pub busy: bool,
    pub current_task: Option<TaskId>,
    pub tasks_completed: u64,
}

/// Pool snapshot for external dashboards
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub busy_workers: usize,
    pub queued_tasks: usize,
    pub active_tasks: usize,
    pub tasks_completed: u64,
    pub tasks_queued: u64,
    pub worker_stats: Vec<WorkerStats>,
}

type ResultHandler = Box<dyn Fn(&TaskOutput, usize) + Send>;

struct WorkerSlot {
    sender: Sender<WorkerMessage>,
    join: Option<JoinHandle<()>>,
    busy: bool,
    current: Option<TaskId>,
    completed: u64,
}

struct PendingTask {
    reply: Sender<Result<TaskOutput>>,
}

struct PoolState {
    queue: VecDeque<Task>,
    pending: AHashMap<TaskId, PendingTask>,
    slots: Vec<WorkerSlot>,
    next_task: TaskId,
    tasks_completed: u64,
    tasks_queued: u64,
    shutdown: bool,
}

struct PoolShared {
    kind: KernelKind,
    state: Mutex<PoolState>,
    handlers: Mutex<AHashMap<TaskOutputKind, ResultHandler>>,
    router_tx: Sender<RouterMessage>,
}

/// Fixed set of worker threads plus queue and completion routing
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    router: Option<JoinHandle<()>>,
}

impl WorkerPool {
    /// Pool sized to the host's reported parallelism (see [`config`])
    pub fn new(kind: KernelKind) -> Self {
        Self::with_workers(kind, config().effective_worker_count())
    }

    pub fn with_workers(kind: KernelKind, count: usize) -> Self {
        let count = count.max(1);
        let (router_tx, router_rx) = crossbeam_channel::unbounded();

        let slots = (0..count)
            .map(|id| {
                let (sender, join) = spawn_worker(id, kind, router_tx.clone());
                WorkerSlot {
                    sender,
                    join: Some(join),
                    busy: false,
                    current: None,
                    completed: 0,
                }
            })
            .collect();

        let shared = Arc::new(PoolShared {
            kind,
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                pending: AHashMap::new(),
                slots,
                next_task: 0,
                tasks_completed: 0,
                tasks_queued: 0,
                shutdown: false,
            }),
            handlers: Mutex::new(AHashMap::new()),
            router_tx,
        });

        let router = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("simpulse-router".into())
                .spawn(move || router_main(shared, router_rx))
                .expect("failed to spawn router thread")
        };

        tracing::debug!("worker pool initialized with {} {:?} workers", count, kind);
        Self {
            shared,
            router: Some(router),
        }
    }

    pub fn kind(&self) -> KernelKind {
        self.shared.kind
    }

    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    /// Submit a task; FIFO order, dispatched as soon as a worker is idle
    pub fn queue(&self, request: TaskRequest) -> TaskHandle {
        let (tx, rx) = bounded(1);
        let mut state = self.shared.state.lock();

        state.next_task += 1;
        let id = state.next_task;

        if state.shutdown {
            let _ = tx.send(Err(SimError::PoolTerminated));
            return TaskHandle { id, rx };
        }

        state.tasks_queued += 1;
        state.queue.push_back(Task { id, request, reply: tx });
        dispatch(&mut state, &self.shared);

        TaskHandle { id, rx }
    }

    /// Bypass the queue and target one specific worker
    ///
    /// For stateful kernels (a worker owning a flock across frames). If
    /// the worker is mid-task the request lines up behind it in that
    /// worker's own mailbox.
    pub fn execute_on_worker(&self, worker: usize, request: TaskRequest) -> Result<TaskHandle> {
        let mut state = self.shared.state.lock();

        if state.shutdown {
            return Err(SimError::PoolTerminated);
        }
        if worker >= state.slots.len() {
            return Err(SimError::InvalidWorker(worker));
        }

        let (tx, rx) = bounded(1);
        state.next_task += 1;
        let id = state.next_task;
        state.tasks_queued += 1;

        send_to_worker(
            &mut state,
            &self.shared,
            worker,
            Task { id, request, reply: tx },
        );
        Ok(TaskHandle { id, rx })
    }

    /// Send the same configuration push to every worker, busy or not
    ///
    /// No reply, no completion entry; intended for tuning updates.
    pub fn broadcast(&self, request: ControlRequest) {
        let state = self.shared.state.lock();
        for (id, slot) in state.slots.iter().enumerate() {
            if slot
                .sender
                .send(WorkerMessage::Control(request.clone()))
                .is_err()
            {
                tracing::warn!("broadcast skipped unreachable worker {}", id);
            }
        }
    }

    /// Register a handler invoked (on the router thread) for every
    /// successful result of the given kind, before the handle resolves
    ///
    /// Handlers must not register further handlers from inside the call.
    pub fn on<F>(&self, kind: TaskOutputKind, handler: F)
    where
        F: Fn(&TaskOutput, usize) + Send + 'static,
    {
        self.shared.handlers.lock().insert(kind, Box::new(handler));
    }

    /// Drop a task that has not been dispatched yet
    ///
    /// Returns true if the task was still queued; its handle resolves to
    /// `Cancelled`. Tasks already on a worker run to completion.
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        let mut state = self.shared.state.lock();
        if let Some(idx) = state.queue.iter().position(|t| t.id == handle.id) {
            if let Some(task) = state.queue.remove(idx) {
                let _ = task.reply.send(Err(SimError::Cancelled));
                return true;
            }
        }
        false
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            workers: state.slots.len(),
            busy_workers: state.slots.iter().filter(|s| s.busy).count(),
            queued_tasks: state.queue.len(),
            active_tasks: state.pending.len(),
            tasks_completed: state.tasks_completed,
            tasks_queued: state.tasks_queued,
            worker_stats: state
                .slots
                .iter()
                .enumerate()
                .map(|(id, s)| WorkerStats {
                    id,
                    busy: s.busy,
                    current_task: s.current,
                    tasks_completed: s.completed,
                })
                .collect(),
        }
    }

    /// Shut down workers and the router
    ///
    /// In-flight tasks finish and resolve; queued and pending tasks left
    /// over resolve to `PoolTerminated`. Idempotent.
    pub fn terminate(&mut self) {
        let Some(router) = self.router.take() else {
            return;
        };

        let joins: Vec<JoinHandle<()>> = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            for slot in &state.slots {
                let _ = slot.sender.send(WorkerMessage::Shutdown);
            }
            state.slots.iter_mut().filter_map(|s| s.join.take()).collect()
        };

        for join in joins {
            let _ = join.join();
        }

        // All worker replies are now in the router channel ahead of this
        let _ = self.shared.router_tx.send(RouterMessage::Shutdown);
        let _ = router.join();

        tracing::debug!("worker pool terminated");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Move queued tasks onto idle workers, FIFO, first idle worker wins
fn dispatch(state: &mut PoolState, shared: &PoolShared) {
    if state.shutdown {
        return;
    }
    while !state.queue.is_empty() {
        let Some(idx) = state.slots.iter().position(|s| !s.busy) else {
            break;
        };
        let task = state.queue.pop_front().expect("queue checked non-empty");
        send_to_worker(state, shared, idx, task);
    }
}

/// Hand one task to one worker, respawning the worker once if its channel
/// is dead (a worker thread that vanished mid-life)
fn send_to_worker(state: &mut PoolState, shared: &PoolShared, idx: usize, task: Task) {
    let Task { id, request, reply } = task;

    let message = WorkerMessage::Run { task: id, request };
    let message = match state.slots[idx].sender.send(message) {
        Ok(()) => {
            state.slots[idx].busy = true;
            state.slots[idx].current = Some(id);
            state.pending.insert(id, PendingTask { reply });
            return;
        }
        Err(crossbeam_channel::SendError(message)) => message,
    };

    tracing::error!("worker {} unreachable; respawning", idx);
    let (sender, join) = spawn_worker(idx, shared.kind, shared.router_tx.clone());
    if let Some(old) = state.slots[idx].join.take() {
        let _ = old.join(); // Already exited; returns immediately
    }
    state.slots[idx].sender = sender;
    state.slots[idx].join = Some(join);
    state.slots[idx].busy = false;
    state.slots[idx].current = None;

    match state.slots[idx].sender.send(message) {
        Ok(()) => {
            state.slots[idx].busy = true;
            state.slots[idx].current = Some(id);
            state.pending.insert(id, PendingTask { reply });
        }
        Err(_) => {
            // Replacement died instantly; fail the task rather than loop
            let _ = reply.send(Err(SimError::WorkerLost(idx)));
        }
    }
}

/// Single consumer of worker replies: marks workers idle, resolves
/// handles, fires handlers, then refills the freed worker
fn router_main(shared: Arc<PoolShared>, rx: Receiver<RouterMessage>) {
    while let Ok(message) = rx.recv() {
        match message {
            RouterMessage::Reply { worker, task, result } => {
                let pending = {
                    let mut state = shared.state.lock();
                    if let Some(slot) = state.slots.get_mut(worker) {
                        slot.busy = false;
                        slot.current = None;
                    }

                    let pending = state.pending.remove(&task);
                    if pending.is_some() {
                        state.tasks_completed += 1;
                        if let Some(slot) = state.slots.get_mut(worker) {
                            slot.completed += 1;
                        }
                    }

                    dispatch(&mut state, &shared);
                    pending
                };

                let Some(pending) = pending else {
                    continue;
                };

                // Handlers run before the caller's handle resolves, so a
                // resolved wait() implies its handler already fired
                if let Ok(output) = &result {
                    let handlers = shared.handlers.lock();
                    if let Some(handler) = handlers.get(&output.kind()) {
                        // A panicking handler must not take down routing
                        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                            || handler(output, worker),
                        ));
                        if caught.is_err() {
                            tracing::error!("result handler for task {} panicked", task);
                        }
                    }
                }

                let _ = pending.reply.send(result);
            }
            RouterMessage::Shutdown => {
                let mut state = shared.state.lock();
                for (_, pending) in state.pending.drain() {
                    let _ = pending.reply.send(Err(SimError::PoolTerminated));
                }
                while let Some(task) = state.queue.pop_front() {
                    let _ = task.reply.send(Err(SimError::PoolTerminated));
                }
                break;
            }
        }
    }
}
