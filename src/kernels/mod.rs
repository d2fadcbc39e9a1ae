//! Task kernels and the request/response protocol they speak
//!
//! A kernel is a self-contained, synchronous, CPU-bound algorithm resident
//! on one worker thread. Kernels communicate only through these messages
//! and through shared typed views; they never touch the orchestrating
//! thread's state.

pub mod flocking;
pub mod pathfinding;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::memory::shared::TypedView;

use flocking::{Boid, Flock, FlockingParams};
use pathfinding::{GridCell, PathGrid, PathOptions, PathfindingKernel};

/// Which kernel a pool's workers host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelKind {
    Pathfinding,
    Flocking,
}

/// A unit of work submitted to a pool
#[derive(Debug, Clone)]
pub enum TaskRequest {
    /// Install a grid on the receiving worker (acknowledged)
    LoadGrid { grid: PathGrid },
    /// Path between two cells on the worker's resident grid
    FindPath {
        start: GridCell,
        goal: GridCell,
        options: PathOptions,
    },
    /// Replace the receiving worker's flock (acknowledged)
    InitFlock {
        boids: Vec<Boid>,
        params: Option<FlockingParams>,
    },
    /// Advance the resident flock; with `output` set, positions go into
    /// the shared view instead of the reply (zero-copy)
    StepFlock {
        dt: f32,
        output: Option<TypedView>,
    },
}

/// Fire-and-forget configuration push, delivered to every worker
#[derive(Debug, Clone)]
pub enum ControlRequest {
    SetFlockParams(FlockingParams),
    /// Install the same grid on every worker
    LoadGrid(PathGrid),
}

/// Successful task result
#[derive(Debug, Clone)]
pub enum TaskOutput {
    GridLoaded { cells: usize },
    Path { waypoints: Vec<GridCell> },
    FlockReady { count: usize },
    /// Copy path: positions travel in the reply
    FlockPositions { positions: Vec<f32> },
    /// Zero-copy path: positions were written to the shared view
    FlockStepped { count: usize },
}

/// Discriminant used for completion-handler routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOutputKind {
    GridLoaded,
    Path,
    FlockReady,
    FlockPositions,
    FlockStepped,
}

impl TaskOutput {
    pub fn kind(&self) -> TaskOutputKind {
        match self {
            TaskOutput::GridLoaded { .. } => TaskOutputKind::GridLoaded,
            TaskOutput::Path { .. } => TaskOutputKind::Path,
            TaskOutput::FlockReady { .. } => TaskOutputKind::FlockReady,
            TaskOutput::FlockPositions { .. } => TaskOutputKind::FlockPositions,
            TaskOutput::FlockStepped { .. } => TaskOutputKind::FlockStepped,
        }
    }
}

/// Per-worker kernel state; rebuilt from its kind if a task panics
pub enum KernelState {
    Pathfinding(PathfindingKernel),
    Flocking(Flock),
}

impl KernelState {
    pub fn new(kind: KernelKind) -> Self {
        match kind {
            KernelKind::Pathfinding => KernelState::Pathfinding(PathfindingKernel::new()),
            KernelKind::Flocking => KernelState::Flocking(Flock::new(FlockingParams::default())),
        }
    }

    pub fn kind(&self) -> KernelKind {
        match self {
            KernelState::Pathfinding(_) => KernelKind::Pathfinding,
            KernelState::Flocking(_) => KernelKind::Flocking,
        }
    }

    /// Run one request to completion
    pub fn handle(&mut self, request: TaskRequest) -> Result<TaskOutput> {
        match (self, request) {
            (KernelState::Pathfinding(kernel), TaskRequest::LoadGrid { grid }) => {
                let cells = kernel.load_grid(grid);
                Ok(TaskOutput::GridLoaded { cells })
            }
            (KernelState::Pathfinding(kernel), TaskRequest::FindPath { start, goal, options }) => {
                let waypoints = kernel.find(start, goal, options).map_err(SimError::Kernel)?;
                Ok(TaskOutput::Path { waypoints })
            }
            (KernelState::Flocking(flock), TaskRequest::InitFlock { boids, params }) => {
                if let Some(params) = params {
                    flock.set_params(params);
                }
                flock.set_boids(boids);
                Ok(TaskOutput::FlockReady { count: flock.len() })
            }
            (KernelState::Flocking(flock), TaskRequest::StepFlock { dt, output }) => {
                flock.step(dt);
                match output {
                    Some(view) => {
                        let count = flock.write_positions(&view)?;
                        Ok(TaskOutput::FlockStepped { count })
                    }
                    None => Ok(TaskOutput::FlockPositions {
                        positions: flock.positions_interleaved(),
                    }),
                }
            }
            (state, request) => Err(SimError::Kernel(format!(
                "{:?} kernel cannot serve {} requests",
                state.kind(),
                request_name(&request)
            ))),
        }
    }

    /// Apply a broadcast configuration push; unknown combinations are
    /// ignored rather than failed, since broadcasts have no reply channel
    pub fn control(&mut self, request: ControlRequest) {
        match (self, request) {
            (KernelState::Flocking(flock), ControlRequest::SetFlockParams(params)) => {
                flock.set_params(params);
            }
            (KernelState::Pathfinding(kernel), ControlRequest::LoadGrid(grid)) => {
                kernel.load_grid(grid);
            }
            _ => {}
        }
    }
}

fn request_name(request: &TaskRequest) -> &'static str {
    match request {
        TaskRequest::LoadGrid { .. } => "LoadGrid",
        TaskRequest::FindPath { .. } => "FindPath",
        TaskRequest::InitFlock { .. } => "InitFlock",
        TaskRequest::StepFlock { .. } => "StepFlock",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    #[test]
    fn test_pathfinding_kernel_roundtrip() {
        let mut state = KernelState::new(KernelKind::Pathfinding);

        let loaded = state
            .handle(TaskRequest::LoadGrid { grid: PathGrid::new(8, 8) })
            .unwrap();
        assert!(matches!(loaded, TaskOutput::GridLoaded { cells: 64 }));

        let out = state
            .handle(TaskRequest::FindPath {
                start: GridCell::new(0, 0),
                goal: GridCell::new(7, 0),
                options: PathOptions::default(),
            })
            .unwrap();
        let TaskOutput::Path { waypoints } = out else {
            panic!("expected a path");
        };
        assert_eq!(waypoints.len(), 8);
    }

    #[test]
    fn test_mismatched_request_is_kernel_error() {
        let mut state = KernelState::new(KernelKind::Pathfinding);
        let err = state.handle(TaskRequest::StepFlock { dt: 0.1, output: None });
        assert!(matches!(err, Err(SimError::Kernel(_))));
    }

    #[test]
    fn test_flocking_kernel_roundtrip() {
        let mut state = KernelState::new(KernelKind::Flocking);

        let ready = state
            .handle(TaskRequest::InitFlock {
                boids: vec![Boid::at(Vec3::ZERO), Boid::at(Vec3::new(4.0, 0.0, 0.0))],
                params: None,
            })
            .unwrap();
        assert!(matches!(ready, TaskOutput::FlockReady { count: 2 }));

        let stepped = state
            .handle(TaskRequest::StepFlock { dt: 0.016, output: None })
            .unwrap();
        let TaskOutput::FlockPositions { positions } = stepped else {
            panic!("expected positions");
        };
        assert_eq!(positions.len(), 8);
    }

    #[test]
    fn test_control_sets_params() {
        let mut state = KernelState::new(KernelKind::Flocking);
        let params = FlockingParams {
            max_speed: 3.0,
            ..FlockingParams::default()
        };
        state.control(ControlRequest::SetFlockParams(params));

        let KernelState::Flocking(flock) = &state else {
            panic!("wrong kernel");
        };
        assert_eq!(flock.params().max_speed, 3.0);

        // Mismatched control is silently ignored
        let mut path_state = KernelState::new(KernelKind::Pathfinding);
        path_state.control(ControlRequest::SetFlockParams(params));
    }

    #[test]
    fn test_output_kinds() {
        assert_eq!(
            TaskOutput::Path { waypoints: vec![] }.kind(),
            TaskOutputKind::Path
        );
        assert_eq!(
            TaskOutput::FlockStepped { count: 0 }.kind(),
            TaskOutputKind::FlockStepped
        );
    }
}
