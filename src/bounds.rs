//! Axis-aligned bounding boxes, the bounding volume used throughout the BVH.

use crate::math::{Mat4, Point3, Ray};

/// An axis-aligned box `{min, max}`. The empty box has `min = +inf`,
/// `max = -inf`, which acts as the identity element for `union`.
#[derive(Debug, Clone, Copy)]
pub struct Bounds3 {
    pub min: Point3,
    pub max: Point3,
}

impl Bounds3 {
    pub const fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    pub fn from_point(p: Point3) -> Self {
        Self { min: p, max: p }
    }

    pub fn union_point(self, p: Point3) -> Self {
        Self {
            min: Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// The AABB of the 8 transformed corners.
    pub fn transform(self, m: &Mat4) -> Self {
        let mut out = Bounds3::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out = out.union_point(m.transform_point(corner));
        }
        out
    }

    pub fn diagonal(self) -> crate::math::Vec3 {
        self.max - self.min
    }

    pub fn centroid(self) -> Point3 {
        (self.min + self.max) * 0.5
    }

    pub fn surface_area(self) -> f32 {
        let d = self.diagonal();
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.x * d.z + d.y * d.z)
    }

    /// 0/1/2 for x/y/z, ties broken x > y > z.
    pub fn max_axis(self) -> usize {
        let d = self.diagonal();
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Fraction of `p` along `axis` within `[min, max]`, used by the SAH
    /// bucketing scheme. Returns 0 if the box has zero extent on that axis.
    pub fn offset(self, p: Point3, axis: usize) -> f32 {
        let extent = self.max[axis] - self.min[axis];
        if extent <= 0.0 {
            0.0
        } else {
            (p[axis] - self.min[axis]) / extent
        }
    }

    /// Slab-method ray-box test returning `(t_min, t_max)`. Division by a
    /// zero direction component is intentional: it propagates `+-inf`
    /// through the subsequent min/max and is handled correctly by callers.
    pub fn intersect(self, ray: &Ray) -> (f32, f32) {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let inv_d = 1.0 / ray.direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
        }
        (t_min, t_max)
    }

    /// Whether the ray hits the box within distance `t_cap`. An origin
    /// inside the box counts as a hit.
    pub fn hit(self, ray: &Ray, t_cap: f32) -> bool {
        let (t_min, t_max) = self.intersect(ray);
        t_max > 0.0 && t_min < t_cap
    }
}

impl std::ops::Index<usize> for Bounds3 {
    type Output = Point3;
    fn index(&self, i: usize) -> &Point3 {
        match i {
            0 => &self.min,
            1 => &self.max,
            _ => panic!("Bounds3 index out of bounds: {i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn empty_is_union_identity() {
        let b = Bounds3::from_point(Point3::new(1.0, 2.0, 3.0));
        let u = Bounds3::empty().union(b);
        assert_eq!(u.min, b.min);
        assert_eq!(u.max, b.max);
    }

    #[test]
    fn surface_area_unit_cube() {
        let b = Bounds3::new(Point3::zero(), Point3::ones());
        assert!((b.surface_area() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn max_axis_ties_prefer_x_then_y() {
        let b = Bounds3::new(Point3::zero(), Point3::ones());
        assert_eq!(b.max_axis(), 0);
        let b = Bounds3::new(Point3::zero(), Point3::new(0.0, 1.0, 1.0));
        assert_eq!(b.max_axis(), 1);
    }

    #[test]
    fn zero_direction_axis_propagates_infinity() {
        let b = Bounds3::new(Point3::new(-1.0, -1.0, -1.0), Point3::ones());
        let ray = crate::math::Ray::new(Point3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(b.hit(&ray, f32::INFINITY));
    }
}
