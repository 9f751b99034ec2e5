//! Light sources: directional, point, and quad area lights.

use crate::math::{Color, Point3, Ray, Vec3};

/// Attenuation coefficients `(constant, linear, quadratic)` applied to point
/// lights: `color / (c + l*r + q*r^2)`.
#[derive(Debug, Clone, Copy)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        }
    }
}

/// Lighting information reported by a light at a query position.
#[derive(Debug, Clone, Copy)]
pub struct ShadingInfo {
    pub color: Color,
    pub direction: Vec3,
    pub distance: f32,
    pub area: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub enum Light {
    Directional {
        direction: Vec3,
        color: Color,
    },
    Point {
        position: Point3,
        color: Color,
    },
    Quad {
        corner: Point3,
        edge0: Vec3,
        edge1: Vec3,
        color: Color,
        /// `edge1 x edge0`, unit-length.
        normal: Vec3,
        area: f32,
    },
}

impl Light {
    pub fn new_quad(corner: Point3, edge0: Vec3, edge1: Vec3, color: Color) -> Self {
        let cross = edge1.cross(edge0);
        let area = cross.length();
        let normal = if area > 0.0 {
            cross / area
        } else {
            Vec3::unit_y()
        };
        Light::Quad {
            corner,
            edge0,
            edge1,
            color,
            normal,
            area,
        }
    }

    /// Shading info used by the classic Raytracer integrator's direct
    /// lighting loop. Quad lights are approximated by their centroid —
    /// adequate for a non-Monte-Carlo shading pass; NEE sampling of quads
    /// for the path tracer uses stratified positions instead (see
    /// `Light::sample_quad`).
    pub fn shading_info_at(&self, pos: Point3, attenuation: Attenuation) -> ShadingInfo {
        match *self {
            Light::Directional { direction, color } => ShadingInfo {
                color,
                direction: -direction.normalized(),
                distance: f32::INFINITY,
                area: None,
            },
            Light::Point { position, color } => {
                let to_light = position - pos;
                let r = to_light.length();
                let attenuated = color
                    / (attenuation.constant + attenuation.linear * r + attenuation.quadratic * r * r);
                ShadingInfo {
                    color: attenuated,
                    direction: to_light / r,
                    distance: r,
                    area: None,
                }
            }
            Light::Quad {
                corner,
                edge0,
                edge1,
                color,
                area,
                ..
            } => {
                let centroid = corner + edge0 * 0.5 + edge1 * 0.5;
                let to_light = centroid - pos;
                let r = to_light.length();
                ShadingInfo {
                    color,
                    direction: to_light / r,
                    distance: r,
                    area: Some(area),
                }
            }
        }
    }

    /// Samples a point on a quad light. `(i, j)` identify the stratum out of
    /// a `strata x strata` grid (pass `(0, 0)` with `strata = 1` for
    /// unstratified sampling).
    pub fn sample_quad(&self, i: u32, j: u32, strata: u32, u: f32, v: f32) -> Point3 {
        match *self {
            Light::Quad {
                corner, edge0, edge1, ..
            } => {
                let n = strata as f32;
                corner + edge0 * ((i as f32 + u) / n) + edge1 * ((j as f32 + v) / n)
            }
            _ => panic!("sample_quad called on a non-area light"),
        }
    }

    /// Analytic plane intersection of a quad light, for MIS PDF lookups:
    /// does the ray actually hit this quad, and at what distance?
    pub fn intersect_quad(&self, ray: &Ray) -> Option<f32> {
        match *self {
            Light::Quad {
                corner,
                edge0,
                edge1,
                normal,
                ..
            } => {
                let denom = ray.direction.dot(normal);
                if denom.abs() < 1e-8 {
                    return None;
                }
                let t = (corner - ray.origin).dot(normal) / denom;
                if t <= 0.0 {
                    return None;
                }
                let p = ray.at(t) - corner;
                let e0_len = edge0.length();
                let e1_len = edge1.length();
                let u = p.dot(edge0) / e0_len;
                let v = p.dot(edge1) / e1_len;
                if u > 0.0 && u < e0_len && v > 0.0 && v < e1_len {
                    Some(t)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_area(&self) -> bool {
        matches!(self, Light::Quad { .. })
    }
}
