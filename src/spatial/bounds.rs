//! Axis-aligned bounds shared by the spatial indexes

use serde::{Deserialize, Serialize};

use crate::core::types::Vec3;

/// Axis-aligned box: origin plus size per axis
///
/// 2D regions carry `size.z = 0`. Size components are expected to be >= 0;
/// constructors clamp negatives to zero rather than propagating them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub size: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, size: Vec3) -> Self {
        Self {
            min,
            size: Vec3::new(size.x.max(0.0), size.y.max(0.0), size.z.max(0.0)),
        }
    }

    /// 2D rectangle at z = 0
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Vec3::planar(x, y), Vec3::planar(width, height))
    }

    /// 3D box
    pub fn cuboid(x: f32, y: f32, z: f32, width: f32, height: f32, depth: f32) -> Self {
        Self::new(Vec3::new(x, y, z), Vec3::new(width, height, depth))
    }

    /// Box centered on `center` with full extents `size`
    pub fn centered(center: Vec3, size: Vec3) -> Self {
        Self::new(center - size * 0.5, size)
    }

    pub fn max(&self) -> Vec3 {
        self.min + self.size
    }

    pub fn center(&self) -> Vec3 {
        self.min + self.size * 0.5
    }

    /// Half-open containment test: `>= min, < max` on every axis
    ///
    /// Half-open cells tile a region without overlap, so a point on a
    /// split line belongs to exactly one child.
    pub fn contains_point(&self, p: Vec3) -> bool {
        let max = self.max();
        p.x >= self.min.x
            && p.x < max.x
            && p.y >= self.min.y
            && p.y < max.y
            && p.z >= self.min.z
            && p.z < max.z
    }

    /// Planar variant of [`contains_point`](Self::contains_point), ignoring z
    pub fn contains_point_xy(&self, p: Vec3) -> bool {
        let max = self.max();
        p.x >= self.min.x && p.x < max.x && p.y >= self.min.y && p.y < max.y
    }

    /// Full containment of another box (closed on both ends)
    pub fn contains(&self, other: &Aabb) -> bool {
        let max = self.max();
        let omax = other.max();
        other.min.x >= self.min.x
            && omax.x <= max.x
            && other.min.y >= self.min.y
            && omax.y <= max.y
            && other.min.z >= self.min.z
            && omax.z <= max.z
    }

    /// Planar full containment, ignoring z
    pub fn contains_xy(&self, other: &Aabb) -> bool {
        let max = self.max();
        let omax = other.max();
        other.min.x >= self.min.x
            && omax.x <= max.x
            && other.min.y >= self.min.y
            && omax.y <= max.y
    }

    /// Closed overlap test: touching boxes intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        let max = self.max();
        let omax = other.max();
        self.min.x <= omax.x
            && other.min.x <= max.x
            && self.min.y <= omax.y
            && other.min.y <= max.y
            && self.min.z <= omax.z
            && other.min.z <= max.z
    }

    /// Planar overlap test, ignoring z
    pub fn intersects_xy(&self, other: &Aabb) -> bool {
        let max = self.max();
        let omax = other.max();
        self.min.x <= omax.x
            && other.min.x <= max.x
            && self.min.y <= omax.y
            && other.min.y <= max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_point_half_open() {
        let b = Aabb::rect(0.0, 0.0, 10.0, 10.0);
        assert!(b.contains_point_xy(Vec3::planar(0.0, 0.0)));
        assert!(b.contains_point_xy(Vec3::planar(9.999, 9.999)));
        // Max edge is exclusive
        assert!(!b.contains_point_xy(Vec3::planar(10.0, 5.0)));
        assert!(!b.contains_point_xy(Vec3::planar(5.0, 10.0)));
    }

    #[test]
    fn test_contains_point_3d_needs_z_range() {
        let flat = Aabb::rect(0.0, 0.0, 10.0, 10.0);
        // Zero-depth box cannot contain any point in 3D (half-open z)
        assert!(!flat.contains_point(Vec3::planar(5.0, 5.0)));

        let b = Aabb::cuboid(0.0, 0.0, 0.0, 10.0, 10.0, 10.0);
        assert!(b.contains_point(Vec3::new(5.0, 5.0, 5.0)));
        assert!(!b.contains_point(Vec3::new(5.0, 5.0, 10.0)));
    }

    #[test]
    fn test_intersects_touching_counts() {
        let a = Aabb::rect(0.0, 0.0, 10.0, 10.0);
        let b = Aabb::rect(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersects_xy(&b));

        let c = Aabb::rect(10.001, 0.0, 10.0, 10.0);
        assert!(!a.intersects_xy(&c));
    }

    #[test]
    fn test_containment_of_box() {
        let outer = Aabb::rect(0.0, 0.0, 100.0, 100.0);
        let inner = Aabb::rect(10.0, 10.0, 20.0, 20.0);
        let straddling = Aabb::rect(90.0, 10.0, 20.0, 20.0);
        assert!(outer.contains_xy(&inner));
        assert!(!outer.contains_xy(&straddling));
    }

    #[test]
    fn test_centered() {
        let b = Aabb::centered(Vec3::planar(50.0, 50.0), Vec3::planar(10.0, 20.0));
        assert_eq!(b.min.x, 45.0);
        assert_eq!(b.min.y, 40.0);
        assert_eq!(b.max().x, 55.0);
        assert_eq!(b.max().y, 60.0);
    }

    #[test]
    fn test_negative_size_clamped() {
        let b = Aabb::rect(0.0, 0.0, -5.0, 10.0);
        assert_eq!(b.size.x, 0.0);
    }
}
