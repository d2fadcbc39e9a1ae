use thiserror::Error;

use crate::memory::shared::ElementType;

#[derive(Error, Debug, Clone)]
pub enum SimError {
    #[error("buffer not found: {0}")]
    BufferNotFound(String),

    #[error("view out of range: {offset}+{len} exceeds {capacity} bytes")]
    ViewOutOfRange {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("element type mismatch: view holds {expected:?}, access is {actual} bytes wide")]
    ElementTypeMismatch {
        expected: ElementType,
        actual: usize,
    },

    #[error("invalid worker id: {0}")]
    InvalidWorker(usize),

    #[error("worker {0} lost its kernel state")]
    WorkerLost(usize),

    #[error("kernel error: {0}")]
    Kernel(String),

    #[error("task cancelled before dispatch")]
    Cancelled,

    #[error("worker pool terminated")]
    PoolTerminated,
}

pub type Result<T> = std::result::Result<T, SimError>;
