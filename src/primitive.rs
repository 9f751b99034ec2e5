//! Geometric primitives (sphere, triangle) and their intersection tests.

use crate::bounds::Bounds3;
use crate::math::{Mat4, Point3, Ray, Vec3};

const EPSILON: f32 = 1e-6;

/// A transform entry in the scene's transform arena: the forward matrix plus
/// its inverse and inverse-transpose, precomputed once at scene-build time
/// since geometry becomes immutable before rendering begins.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub matrix: Mat4,
    pub inverse: Mat4,
    pub inverse_transpose: Mat4,
}

impl Transform {
    pub fn new(matrix: Mat4) -> Self {
        let inverse = matrix.inverse();
        let inverse_transpose = inverse.transpose();
        Self {
            matrix,
            inverse,
            inverse_transpose,
        }
    }
}

/// A hit record in world space.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub distance: f32,
    pub position: Point3,
    pub normal: Vec3,
    pub primitive: u32,
}

/// An intersection found in object space, prior to transforming back to
/// world space in `Primitive::intersect`.
struct ObjectHit {
    t: f32,
    normal: Vec3,
}

/// The shape-specific data of a primitive, stored in object space.
#[derive(Debug, Clone, Copy)]
pub enum PrimitiveShape {
    Sphere {
        center: Point3,
        radius: f32,
    },
    Triangle {
        v0: Point3,
        v1: Point3,
        v2: Point3,
        /// Cached, *not* normalized: `(v1-v0) x (v2-v0)`.
        face_normal: Vec3,
        /// Per-vertex normals, used when `use_vertex_normals` is set.
        vertex_normals: [Vec3; 3],
        use_vertex_normals: bool,
    },
}

impl PrimitiveShape {
    pub fn new_triangle(v0: Point3, v1: Point3, v2: Point3) -> Self {
        let face_normal = (v1 - v0).cross(v2 - v0);
        PrimitiveShape::Triangle {
            v0,
            v1,
            v2,
            face_normal,
            vertex_normals: [Vec3::zero(); 3],
            use_vertex_normals: false,
        }
    }

    pub fn with_vertex_normals(self, normals: [Vec3; 3]) -> Self {
        match self {
            PrimitiveShape::Triangle {
                v0,
                v1,
                v2,
                face_normal,
                ..
            } => PrimitiveShape::Triangle {
                v0,
                v1,
                v2,
                face_normal,
                vertex_normals: normals,
                use_vertex_normals: true,
            },
            other => other,
        }
    }

    /// Object-space bounding box.
    pub fn object_bounds(&self) -> Bounds3 {
        match *self {
            PrimitiveShape::Sphere { center, radius } => {
                let r = Vec3::new(radius, radius, radius);
                Bounds3::new(center - r, center + r)
            }
            PrimitiveShape::Triangle { v0, v1, v2, .. } => Bounds3::from_point(v0)
                .union_point(v1)
                .union_point(v2),
        }
    }

    fn intersect_object_space(&self, ray: &Ray) -> Option<ObjectHit> {
        match *self {
            PrimitiveShape::Sphere { center, radius } => {
                let oc = ray.origin - center;
                let b = ray.direction.dot(oc);
                let c = oc.dot(oc) - radius * radius;
                let discriminant = b * b - c;
                if discriminant < 0.0 {
                    return None;
                }
                let sqrt_d = discriminant.sqrt();
                let mut t = -b - sqrt_d;
                if t < 0.0 {
                    // Origin may be inside the sphere; use the larger root.
                    t = -b + sqrt_d;
                }
                if t < 0.0 {
                    return None;
                }
                let p = ray.at(t);
                let normal = (p - center) / radius;
                Some(ObjectHit { t, normal })
            }
            PrimitiveShape::Triangle {
                v0,
                v1,
                v2,
                face_normal,
                vertex_normals,
                use_vertex_normals,
            } => {
                let n = face_normal;
                let denom = ray.direction.dot(n);
                if denom.abs() < EPSILON {
                    return None;
                }
                let t = (v0.dot(n) - ray.origin.dot(n)) / denom;
                if t < 0.0 {
                    return None;
                }
                let p = ray.at(t);

                // Edge tests: a negative sub-triangle scalar means the point
                // lies outside that edge.
                let c0 = (v1 - v0).cross(p - v0).dot(n);
                if c0 < 0.0 {
                    return None;
                }
                let c1 = (v2 - v1).cross(p - v1).dot(n);
                if c1 < 0.0 {
                    return None;
                }
                let c2 = (v0 - v2).cross(p - v2).dot(n);
                if c2 < 0.0 {
                    return None;
                }

                let normal = if use_vertex_normals {
                    let total = c0 + c1 + c2;
                    // Barycentric weights from the same three sub-triangle
                    // scalars used for the inside test. c1 corresponds to
                    // the sub-triangle opposite v0, so it weights n0, etc.
                    let (w0, w1, w2) = if total.abs() > EPSILON {
                        (c1 / total, c2 / total, c0 / total)
                    } else {
                        (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
                    };
                    (vertex_normals[0] * w0 + vertex_normals[1] * w1 + vertex_normals[2] * w2)
                        .normalized()
                } else {
                    n.normalized()
                };

                Some(ObjectHit { t, normal })
            }
        }
    }
}

/// A primitive in the scene: shape data plus indices into the scene's
/// transform, material, and (optionally) light arenas.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    pub shape: PrimitiveShape,
    pub transform_id: u32,
    pub material_id: u32,
    pub light_id: Option<u32>,
}

impl Primitive {
    pub fn object_bounds(&self) -> Bounds3 {
        self.shape.object_bounds()
    }

    /// World bounds: the transformed object bounds by default. Triangles
    /// override this by transforming each vertex individually for a
    /// tighter box, which materially improves SAH quality.
    pub fn world_bounds(&self, transforms: &[Transform]) -> Bounds3 {
        let t = &transforms[self.transform_id as usize];
        match self.shape {
            PrimitiveShape::Triangle { v0, v1, v2, .. } => {
                Bounds3::from_point(t.matrix.transform_point(v0))
                    .union_point(t.matrix.transform_point(v1))
                    .union_point(t.matrix.transform_point(v2))
            }
            _ => self.object_bounds().transform(&t.matrix),
        }
    }

    pub fn intersect(&self, ray: &Ray, transforms: &[Transform], index: u32) -> Option<Hit> {
        let t = &transforms[self.transform_id as usize];
        let object_ray = ray.transform(&t.inverse);
        let object_hit = self.shape.intersect_object_space(&object_ray)?;

        let object_position = object_ray.at(object_hit.t);
        let position = t.matrix.transform_point(object_position);
        let normal = t.inverse_transpose.transform_vector(object_hit.normal).normalized();
        let distance = (position - ray.origin).length();

        Some(Hit {
            distance,
            position,
            normal,
            primitive: index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_transform() -> Vec<Transform> {
        vec![Transform::new(Mat4::identity())]
    }

    #[test]
    fn sphere_hit_from_outside() {
        let shape = PrimitiveShape::Sphere {
            center: Point3::zero(),
            radius: 1.0,
        };
        let prim = Primitive {
            shape,
            transform_id: 0,
            material_id: 0,
            light_id: None,
        };
        let transforms = identity_transform();
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = prim.intersect(&ray, &transforms, 0).expect("should hit");
        assert!((hit.distance - 4.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-4);
    }

    #[test]
    fn sphere_origin_inside_uses_larger_root() {
        let shape = PrimitiveShape::Sphere {
            center: Point3::zero(),
            radius: 1.0,
        };
        let prim = Primitive {
            shape,
            transform_id: 0,
            material_id: 0,
            light_id: None,
        };
        let transforms = identity_transform();
        let ray = Ray::new(Point3::zero(), Vec3::new(0.0, 0.0, 1.0));
        let hit = prim.intersect(&ray, &transforms, 0).expect("should hit");
        assert!((hit.distance - 1.0).abs() < 1e-4);
    }

    #[test]
    fn triangle_hit_center() {
        let shape = PrimitiveShape::new_triangle(
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let prim = Primitive {
            shape,
            transform_id: 0,
            material_id: 0,
            light_id: None,
        };
        let transforms = identity_transform();
        let ray = Ray::new(Point3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = prim.intersect(&ray, &transforms, 0).expect("should hit");
        assert!((hit.distance - 5.0).abs() < 1e-4);
    }

    #[test]
    fn triangle_miss_outside_edge() {
        let shape = PrimitiveShape::new_triangle(
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let prim = Primitive {
            shape,
            transform_id: 0,
            material_id: 0,
            light_id: None,
        };
        let transforms = identity_transform();
        let ray = Ray::new(Point3::new(5.0, 5.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(prim.intersect(&ray, &transforms, 0).is_none());
    }

    #[test]
    fn transformed_world_bounds_contains_hit_position() {
        let shape = PrimitiveShape::Sphere {
            center: Point3::zero(),
            radius: 1.0,
        };
        let matrix = Mat4::translation(Vec3::new(3.0, 0.0, 0.0));
        let transforms = vec![Transform::new(matrix)];
        let prim = Primitive {
            shape,
            transform_id: 0,
            material_id: 0,
            light_id: None,
        };
        let bounds = prim.world_bounds(&transforms);
        let ray = Ray::new(Point3::new(3.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = prim.intersect(&ray, &transforms, 0).expect("should hit");
        assert!(hit.position.x >= bounds.min.x - 1e-4 && hit.position.x <= bounds.max.x + 1e-4);
        assert!(hit.position.y >= bounds.min.y - 1e-4 && hit.position.y <= bounds.max.y + 1e-4);
        assert!(hit.position.z >= bounds.min.z - 1e-4 && hit.position.z <= bounds.max.z + 1e-4);
    }
}
