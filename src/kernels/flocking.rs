//! Boid flocking step kernel
//!
//! Classic three-force steering: separation, alignment, cohesion, plus a
//! boundary-avoidance push near the configured bounds. The neighbor scan
//! is O(n²) by design; pre-filtering neighbors through a spatial index is
//! the intended production upgrade for large flocks.

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::Vec3;
use crate::memory::shared::TypedView;

/// Flocking tuning parameters
///
/// Broadcast to workers as a configuration push; no reply expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlockingParams {
    /// Repel from neighbors closer than this
    pub separation_dist: f32,
    /// Match average heading of neighbors within this range
    pub alignment_dist: f32,
    /// Steer toward the centroid of neighbors within this range
    pub cohesion_dist: f32,
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    /// Velocity is clamped to this every step
    pub max_speed: f32,
    /// Half-extent of the containment cube around the origin
    pub bounds_size: f32,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self {
            separation_dist: 2.0,
            alignment_dist: 5.0,
            cohesion_dist: 5.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            max_speed: 10.0,
            bounds_size: 50.0,
        }
    }
}

/// One flocking agent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boid {
    pub pos: Vec3,
    pub vel: Vec3,
}

impl Boid {
    pub fn at(pos: Vec3) -> Self {
        Self { pos, vel: Vec3::ZERO }
    }
}

/// Resident flock state: boids persist on their worker across frames
#[derive(Debug, Clone)]
pub struct Flock {
    boids: Vec<Boid>,
    params: FlockingParams,
}

impl Flock {
    pub fn new(params: FlockingParams) -> Self {
        Self {
            boids: Vec::new(),
            params,
        }
    }

    pub fn set_boids(&mut self, boids: Vec<Boid>) {
        self.boids = boids;
    }

    pub fn set_params(&mut self, params: FlockingParams) {
        self.params = params;
    }

    pub fn params(&self) -> &FlockingParams {
        &self.params
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    /// Advance the flock by `dt` seconds
    ///
    /// Steering is computed for every boid against the pre-step state,
    /// then velocities and positions are committed together.
    pub fn step(&mut self, dt: f32) {
        let p = self.params;
        let margin = p.bounds_size * 0.9;

        let accels: Vec<Vec3> = (0..self.boids.len())
            .map(|i| {
                let boid = self.boids[i];

                let mut sep = Vec3::ZERO;
                let mut avg_vel = Vec3::ZERO;
                let mut centroid = Vec3::ZERO;
                let mut sep_count = 0u32;
                let mut ali_count = 0u32;
                let mut coh_count = 0u32;

                for (j, other) in self.boids.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let delta = other.pos - boid.pos;
                    let dist = delta.length();

                    if dist < p.separation_dist && dist > 0.0 {
                        sep = sep - delta * (1.0 / dist);
                        sep_count += 1;
                    }
                    if dist < p.alignment_dist {
                        avg_vel += other.vel;
                        ali_count += 1;
                    }
                    if dist < p.cohesion_dist {
                        centroid += other.pos;
                        coh_count += 1;
                    }
                }

                let mut accel = Vec3::ZERO;
                if sep_count > 0 {
                    accel += sep * (1.0 / sep_count as f32) * p.separation_weight;
                }
                if ali_count > 0 {
                    let avg = avg_vel * (1.0 / ali_count as f32);
                    accel += (avg - boid.vel) * p.alignment_weight;
                }
                if coh_count > 0 {
                    let center = centroid * (1.0 / coh_count as f32);
                    accel += (center - boid.pos) * p.cohesion_weight;
                }

                // Boundary avoidance: constant push once past the margin
                if boid.pos.x < -margin {
                    accel.x += 1.0;
                }
                if boid.pos.x > margin {
                    accel.x -= 1.0;
                }
                if boid.pos.y < -margin {
                    accel.y += 1.0;
                }
                if boid.pos.y > margin {
                    accel.y -= 1.0;
                }
                if boid.pos.z < -margin {
                    accel.z += 1.0;
                }
                if boid.pos.z > margin {
                    accel.z -= 1.0;
                }

                accel
            })
            .collect();

        for (boid, accel) in self.boids.iter_mut().zip(accels) {
            boid.vel = (boid.vel + accel * dt).clamp_length(p.max_speed);
            boid.pos += boid.vel * dt;
        }
    }

    /// Interleaved `[x, y, z, active]` snapshot, 4 floats per boid
    pub fn positions_interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.boids.len() * 4);
        for boid in &self.boids {
            out.push(boid.pos.x);
            out.push(boid.pos.y);
            out.push(boid.pos.z);
            out.push(1.0); // active flag
        }
        out
    }

    /// Write the interleaved snapshot into a shared view (zero-copy path)
    ///
    /// The view must be f32 with room for `4 * len` elements. Returns the
    /// number of boids written.
    pub fn write_positions(&self, view: &TypedView) -> Result<usize> {
        view.write_slice(0, &self.positions_interleaved())?;
        Ok(self.boids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(dist: f32) -> Flock {
        let mut flock = Flock::new(FlockingParams::default());
        flock.set_boids(vec![
            Boid::at(Vec3::ZERO),
            Boid::at(Vec3::new(dist, 0.0, 0.0)),
        ]);
        flock
    }

    #[test]
    fn test_separation_pushes_apart() {
        // Inside separation range: net force is apart despite cohesion
        let mut flock = pair(1.0);
        let before = flock.boids()[0].pos.distance(&flock.boids()[1].pos);
        for _ in 0..5 {
            flock.step(0.1);
        }
        let after = flock.boids()[0].pos.distance(&flock.boids()[1].pos);
        assert!(after > before, "expected {} > {}", after, before);
    }

    #[test]
    fn test_cohesion_pulls_together() {
        // Outside separation range but inside cohesion range
        let mut flock = pair(4.0);
        let before = flock.boids()[0].pos.distance(&flock.boids()[1].pos);
        flock.step(0.1);
        let after = flock.boids()[0].pos.distance(&flock.boids()[1].pos);
        assert!(after < before, "expected {} < {}", after, before);
    }

    #[test]
    fn test_isolated_boid_drifts_unaccelerated() {
        let mut flock = Flock::new(FlockingParams::default());
        flock.set_boids(vec![Boid {
            pos: Vec3::ZERO,
            vel: Vec3::new(1.0, 0.0, 0.0),
        }]);

        flock.step(1.0);
        let boid = flock.boids()[0];
        assert_eq!(boid.pos, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(boid.vel, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_speed_clamped() {
        let mut flock = Flock::new(FlockingParams::default());
        flock.set_boids(vec![Boid {
            pos: Vec3::ZERO,
            vel: Vec3::new(100.0, 0.0, 0.0),
        }]);

        flock.step(0.016);
        assert!(flock.boids()[0].vel.length() <= 10.0 + 1e-4);
    }

    #[test]
    fn test_zero_max_speed_freezes_flock() {
        let params = FlockingParams {
            max_speed: 0.0,
            ..FlockingParams::default()
        };
        let mut flock = Flock::new(params);
        flock.set_boids(vec![Boid {
            pos: Vec3::new(1.0, 2.0, 3.0),
            vel: Vec3::new(5.0, 0.0, 0.0),
        }]);

        flock.step(0.1);
        assert_eq!(flock.boids()[0].pos, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_boundary_avoidance() {
        let mut flock = Flock::new(FlockingParams::default());
        // Past the 45-unit margin on +x
        flock.set_boids(vec![Boid::at(Vec3::new(48.0, 0.0, 0.0))]);

        flock.step(0.1);
        assert!(flock.boids()[0].vel.x < 0.0);
    }

    #[test]
    fn test_positions_interleaved_layout() {
        let mut flock = Flock::new(FlockingParams::default());
        flock.set_boids(vec![
            Boid::at(Vec3::new(1.0, 2.0, 3.0)),
            Boid::at(Vec3::new(4.0, 5.0, 6.0)),
        ]);

        let data = flock.positions_interleaved();
        assert_eq!(data, vec![1.0, 2.0, 3.0, 1.0, 4.0, 5.0, 6.0, 1.0]);
    }

    #[test]
    fn test_write_positions_into_view() {
        use crate::memory::shared::{ElementType, SharedMemoryManager};

        let mut mgr = SharedMemoryManager::with_budget(1024);
        let view = mgr.create_buffer("flock", 8, ElementType::F32).unwrap();

        let mut flock = Flock::new(FlockingParams::default());
        flock.set_boids(vec![
            Boid::at(Vec3::new(1.0, 2.0, 3.0)),
            Boid::at(Vec3::new(4.0, 5.0, 6.0)),
        ]);

        assert_eq!(flock.write_positions(&view).unwrap(), 2);
        assert_eq!(view.to_vec::<f32>().unwrap(), flock.positions_interleaved());

        // Undersized view reports the range error instead of writing
        let small = mgr.create_buffer("small", 4, ElementType::F32).unwrap();
        assert!(flock.write_positions(&small).is_err());
    }
}
