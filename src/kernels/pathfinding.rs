//! A* pathfinding over a uniform grid
//!
//! 8-connected, orthogonal steps cost 1.0 and diagonal steps sqrt(2),
//! Manhattan-distance heuristic. Runs entirely inside a worker; the grid
//! is loaded once and reused across requests.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Cell coordinate on a path grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Uniform grid of walkable/blocked cells (0 = walkable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathGrid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl PathGrid {
    /// Fully walkable grid
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    /// Build from raw cell data; length must be `width * height`
    pub fn from_cells(width: usize, height: usize, cells: Vec<u8>) -> Option<Self> {
        if cells.len() != width * height {
            return None;
        }
        Some(Self { width, height, cells })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, cell: GridCell) -> bool {
        cell.x >= 0 && cell.y >= 0 && (cell.x as usize) < self.width && (cell.y as usize) < self.height
    }

    pub fn is_walkable(&self, cell: GridCell) -> bool {
        self.in_bounds(cell) && self.cells[cell.y as usize * self.width + cell.x as usize] == 0
    }

    pub fn set_blocked(&mut self, cell: GridCell, blocked: bool) {
        if self.in_bounds(cell) {
            self.cells[cell.y as usize * self.width + cell.x as usize] = u8::from(blocked);
        }
    }
}

/// Per-request knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PathOptions {
    /// Abort the search after this many expansions and report no path
    pub max_iterations: usize,
    /// Collapse the waypoint list to line-of-sight corners
    pub smooth: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            smooth: false,
        }
    }
}

/// Node in the A* open set
#[derive(Debug, Clone)]
struct PathNode {
    cell: GridCell,
    f_cost: f32, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .f_cost
            .partial_cmp(&self.f_cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const NEIGHBOR_DIRS: [(i32, i32); 8] = [
    (0, -1),
    (1, 0),
    (0, 1),
    (-1, 0),
    (1, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
];

/// Find a path from `start` to `goal`
///
/// Returns the ordered waypoint sequence including both endpoints, or an
/// empty vec when no path exists. "No path" is a result, not an error.
pub fn find_path(grid: &PathGrid, start: GridCell, goal: GridCell, options: PathOptions) -> Vec<GridCell> {
    if !grid.is_walkable(start) || !grid.is_walkable(goal) {
        return Vec::new();
    }
    if start == goal {
        return vec![start];
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<GridCell, GridCell> = AHashMap::new();
    let mut g_scores: AHashMap<GridCell, f32> = AHashMap::new();

    g_scores.insert(start, 0.0);
    open_set.push(PathNode {
        cell: start,
        f_cost: start.manhattan(&goal) as f32,
    });

    let mut iterations = 0;
    while let Some(current) = open_set.pop() {
        if current.cell == goal {
            let path = reconstruct_path(&came_from, current.cell);
            return if options.smooth {
                smooth_path(grid, &path)
            } else {
                path
            };
        }

        iterations += 1;
        if iterations > options.max_iterations {
            tracing::debug!(
                "pathfinding gave up after {} iterations ({:?} -> {:?})",
                options.max_iterations,
                start,
                goal
            );
            return Vec::new();
        }

        let current_g = *g_scores.get(&current.cell).unwrap_or(&f32::INFINITY);

        for (dx, dy) in NEIGHBOR_DIRS {
            let neighbor = GridCell::new(current.cell.x + dx, current.cell.y + dy);
            if !grid.is_walkable(neighbor) {
                continue;
            }

            let step_cost = if dx != 0 && dy != 0 {
                std::f32::consts::SQRT_2
            } else {
                1.0
            };

            let tentative_g = current_g + step_cost;
            let neighbor_g = *g_scores.get(&neighbor).unwrap_or(&f32::INFINITY);

            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.cell);
                g_scores.insert(neighbor, tentative_g);

                open_set.push(PathNode {
                    cell: neighbor,
                    f_cost: tentative_g + neighbor.manhattan(&goal) as f32,
                });
            }
        }
    }

    Vec::new() // No path
}

/// Reconstruct path from came_from map
fn reconstruct_path(came_from: &AHashMap<GridCell, GridCell>, mut current: GridCell) -> Vec<GridCell> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Sum of step costs along a path
pub fn path_cost(path: &[GridCell]) -> f32 {
    path.windows(2)
        .map(|pair| {
            let dx = (pair[1].x - pair[0].x).abs();
            let dy = (pair[1].y - pair[0].y).abs();
            if dx != 0 && dy != 0 {
                std::f32::consts::SQRT_2 * dx.max(dy) as f32
            } else {
                (dx + dy) as f32
            }
        })
        .sum()
}

/// Every cell on the rasterized line between `a` and `b` is walkable
fn line_walkable(grid: &PathGrid, a: GridCell, b: GridCell) -> bool {
    let mut x = a.x;
    let mut y = a.y;
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if !grid.is_walkable(GridCell::new(x, y)) {
            return false;
        }
        if x == b.x && y == b.y {
            return true;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Greedy corner-cutting: keep only waypoints the previous kept waypoint
/// cannot see past
fn smooth_path(grid: &PathGrid, path: &[GridCell]) -> Vec<GridCell> {
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut smoothed = vec![path[0]];
    let mut anchor = 0;

    while anchor < path.len() - 1 {
        let mut furthest = anchor + 1;
        for candidate in (anchor + 1)..path.len() {
            if line_walkable(grid, path[anchor], path[candidate]) {
                furthest = candidate;
            }
        }
        smoothed.push(path[furthest]);
        anchor = furthest;
    }

    smoothed
}

/// Resident pathfinding kernel: holds the grid across requests
#[derive(Debug, Default)]
pub struct PathfindingKernel {
    grid: Option<PathGrid>,
}

impl PathfindingKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_grid(&mut self, grid: PathGrid) -> usize {
        let cells = grid.width() * grid.height();
        self.grid = Some(grid);
        cells
    }

    pub fn has_grid(&self) -> bool {
        self.grid.is_some()
    }

    /// Run one request against the resident grid
    ///
    /// Errors only on malformed requests (no grid loaded, endpoints off
    /// the grid); an unreachable goal is an empty path.
    pub fn find(&self, start: GridCell, goal: GridCell, options: PathOptions) -> Result<Vec<GridCell>, String> {
        let grid = self.grid.as_ref().ok_or("no grid loaded")?;
        if !grid.in_bounds(start) {
            return Err(format!("start {:?} outside {}x{} grid", start, grid.width(), grid.height()));
        }
        if !grid.in_bounds(goal) {
            return Err(format!("goal {:?} outside {}x{} grid", goal, grid.width(), grid.height()));
        }
        Ok(find_path(grid, start, goal, options))
    }
}
