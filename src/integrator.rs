//! Light-transport integrators: debug (Normals/Depth/Albedo), Raytracer
//! (classic Blinn-Phong), AnalyticDirect (polygonal Lambert), and PathTracer
//! (Monte Carlo with NEE/MIS/Russian Roulette).

use std::f32::consts::PI;

use rand::Rng;

use crate::bvh::Workspace;
use crate::light::Light;
use crate::math::{Color, Ray, Vec3};
use crate::primitive::Hit;
use crate::scene::{ImportanceSampling, IntegratorKind, NeeMode, Scene};

const SHADOW_EPSILON: f32 = 1e-4;

/// Power heuristic MIS weight, beta=2. Returns 0 if both PDFs are 0.
fn power_heuristic(a: f32, b: f32) -> f32 {
    let a2 = a * a;
    let b2 = b * b;
    let denom = a2 + b2;
    if denom <= 0.0 {
        0.0
    } else {
        a2 / denom
    }
}

/// Per-thread integrator instance: holds a reference to the immutable
/// scene, its own RNG, and its own BVH traversal workspace.
pub struct Integrator<'scene, R: Rng> {
    scene: &'scene Scene,
    kind: IntegratorKind,
    rng: R,
    workspace: Workspace,
}

impl<'scene, R: Rng> Integrator<'scene, R> {
    pub fn new(scene: &'scene Scene, kind: IntegratorKind, rng: R) -> Self {
        Self {
            scene,
            kind,
            rng,
            workspace: Workspace::default(),
        }
    }

    pub fn stats(&self) -> &crate::stats::Stats {
        &self.workspace.stats
    }

    pub fn trace(&mut self, ray: Ray) -> Color {
        self.trace_depth(ray, Color::ones(), 0)
    }

    fn intersect(&mut self, ray: &Ray) -> Option<Hit> {
        self.scene
            .accel
            .intersect(ray, &self.scene.transforms, &mut self.workspace)
    }

    fn intersect_any(&mut self, ray: &Ray, max_distance: f32) -> bool {
        self.scene
            .accel
            .intersect_any(ray, max_distance, &self.scene.transforms, &mut self.workspace)
    }

    fn trace_depth(&mut self, ray: Ray, throughput: Color, depth: u32) -> Color {
        if depth == 0 {
            self.workspace.stats.primary_rays += 1;
        } else {
            self.workspace.stats.secondary_rays += 1;
        }

        let nee_active = matches!(self.kind, IntegratorKind::PathTracer)
            && self.scene.settings.nee != NeeMode::Off;
        if self.scene.settings.max_depth != -1 {
            let effective_cap = if nee_active {
                self.scene.settings.max_depth - 1
            } else {
                self.scene.settings.max_depth
            };
            if depth as i32 > effective_cap {
                return Color::zero();
            }
        }

        let Some(hit) = self.intersect(&ray) else {
            return Color::zero();
        };

        self.shade(&ray, &hit, throughput, depth)
    }

    fn shade(&mut self, ray: &Ray, hit: &Hit, throughput: Color, depth: u32) -> Color {
        match self.kind {
            IntegratorKind::Normals => hit.normal * 0.5 + Color::ones() * 0.5,
            IntegratorKind::Depth => {
                let v = 1.0 / (1.0 + hit.distance);
                Color::new(v, v, v)
            }
            IntegratorKind::Albedo => self.scene.material(self.primitive_material(hit)).diffuse,
            IntegratorKind::Raytracer => self.shade_raytracer(ray, hit, depth),
            IntegratorKind::AnalyticDirect => self.shade_analytic_direct(hit),
            IntegratorKind::PathTracer => self.shade_path_tracer(ray, hit, throughput, depth),
        }
    }

    fn primitive_material(&self, hit: &Hit) -> u32 {
        self.scene.accel.primitives()[hit.primitive as usize].material_id
    }

    // ─── Raytracer ──────────────────────────────────────────────────────

    fn shade_raytracer(&mut self, ray: &Ray, hit: &Hit, depth: u32) -> Color {
        let material_id = self.primitive_material(hit);
        let material = *self.scene.material(material_id);
        let mut color = material.ambient + material.emission;

        let bias_origin = hit.position + hit.normal * SHADOW_EPSILON;
        let attenuation = self.scene.settings.attenuation;

        for light in &self.scene.lights {
            let info = light.shading_info_at(hit.position, attenuation);
            let n_dot_l = hit.normal.dot(info.direction);
            if n_dot_l <= 0.0 {
                continue;
            }
            let shadow_ray = Ray::new(bias_origin, info.direction);
            let occluded = if info.distance.is_finite() {
                self.intersect_any(&shadow_ray, info.distance - SHADOW_EPSILON)
            } else {
                self.intersect_any(&shadow_ray, f32::INFINITY)
            };
            if occluded {
                continue;
            }
            let half = (info.direction - ray.direction).normalized();
            let n_dot_h = hit.normal.dot(half).max(0.0);
            let diffuse = material.diffuse * n_dot_l;
            let specular = material.specular * n_dot_h.powf(material.shininess);
            color += info.color.hadamard(diffuse + specular);
        }

        if material.specular.max_component() > 0.0 && depth < 16 {
            let reflected_dir = ray.direction.reflect(hit.normal);
            let reflected_ray = Ray::new(bias_origin, reflected_dir);
            let reflected_color = self.trace_depth(reflected_ray, Color::ones(), depth + 1);
            color += material.specular.hadamard(reflected_color);
        }

        color
    }

    // ─── AnalyticDirect ─────────────────────────────────────────────────

    fn shade_analytic_direct(&mut self, hit: &Hit) -> Color {
        let material_id = self.primitive_material(hit);
        let material = *self.scene.material(material_id);
        let mut color = material.emission;

        for light in &self.scene.lights {
            let Light::Quad {
                corner, edge0, edge1, color: light_color, ..
            } = *light
            else {
                continue;
            };
            let vertices = [
                corner,
                corner + edge0,
                corner + edge0 + edge1,
                corner + edge1,
            ];
            let mut directions = [Vec3::zero(); 4];
            for i in 0..4 {
                directions[i] = (vertices[i] - hit.position).normalized();
            }
            let mut phi = Vec3::zero();
            for i in 0..4 {
                let u_i = directions[i];
                let u_next = directions[(i + 1) % 4];
                let cos_theta = u_i.dot(u_next).clamp(-1.0, 1.0);
                let theta = cos_theta.acos();
                let cross = u_i.cross(u_next);
                let gamma = if cross.length() > 1e-8 {
                    cross.normalized()
                } else {
                    Vec3::zero()
                };
                phi += gamma * theta;
            }
            phi = phi * 0.5;
            let irradiance = phi.dot(hit.normal).max(0.0);
            color += material.diffuse / PI * light_color * irradiance;
        }

        color
    }

    // ─── PathTracer ─────────────────────────────────────────────────────

    fn shade_path_tracer(&mut self, ray: &Ray, hit: &Hit, throughput: Color, depth: u32) -> Color {
        let material_id = self.primitive_material(hit);
        let material = *self.scene.material(material_id);
        let nee = self.scene.settings.nee;

        let mut result = Color::zero();

        if depth >= self.scene.settings.min_depth {
            let back_facing = hit.normal.dot(-ray.direction) < 0.0;
            let emission_suppressed = (nee != NeeMode::Off && depth > 0) || back_facing;
            if !emission_suppressed {
                result += throughput.hadamard(material.emission);
            }

            let direct = match nee {
                NeeMode::Off => Color::zero(),
                NeeMode::On => self.direct_nee(ray, hit, &material, false),
                NeeMode::Mis => {
                    self.direct_nee(ray, hit, &material, true) + self.direct_brdf_sample(ray, hit, &material)
                }
            };
            result += throughput.hadamard(direct);
        }

        result += self.indirect(ray, hit, &material, throughput, depth);
        result
    }

    fn direct_nee(&mut self, ray: &Ray, hit: &Hit, material: &crate::material::Material, mis: bool) -> Color {
        let attenuation = self.scene.settings.attenuation;
        let light_samples = self.scene.settings.light_samples.max(1);
        let stratify = self.scene.settings.light_stratify;
        let strata = if stratify {
            (light_samples as f32).sqrt().round().max(1.0) as u32
        } else {
            1
        };

        let mut total = Color::zero();
        let scene = self.scene;

        for light in &scene.lights {
            match light {
                Light::Quad {
                    color,
                    normal: light_normal,
                    area,
                    ..
                } => {
                    let mut accum = Color::zero();
                    let samples = if stratify { strata * strata } else { light_samples };
                    for s in 0..samples {
                        let (i, j) = if stratify {
                            (s / strata, s % strata)
                        } else {
                            (0, 0)
                        };
                        let u: f32 = self.rng.gen();
                        let v: f32 = self.rng.gen();
                        let divisor = if stratify { strata } else { 1 };
                        let light_pos = light.sample_quad(i, j, divisor, u, v);
                        let to_light = light_pos - (hit.position + hit.normal * SHADOW_EPSILON);
                        let r2 = to_light.length_squared();
                        let r = r2.sqrt();
                        let w = to_light / r;

                        let n_dot_l = hit.normal.dot(w);
                        let nl_dot_w = (-*light_normal).dot(w);
                        if n_dot_l <= 0.0 || nl_dot_w <= 0.0 {
                            continue;
                        }

                        let shadow_origin = light_pos - *light_normal * SHADOW_EPSILON;
                        let shadow_dir = (hit.position + hit.normal * SHADOW_EPSILON) - shadow_origin;
                        let shadow_dist = shadow_dir.length();
                        let shadow_ray = Ray::new(shadow_origin, shadow_dir / shadow_dist);
                        if self.intersect_any(&shadow_ray, shadow_dist - SHADOW_EPSILON) {
                            continue;
                        }

                        let geometry_term = n_dot_l * nl_dot_w / r2;
                        let brdf_eval = material.eval(w, ray.direction, hit.normal);
                        let mut contribution = brdf_eval * geometry_term;

                        if mis {
                            let light_pdf = r2 / (*area * nl_dot_w);
                            let brdf_pdf = material.pdf(w, ray.direction, hit.normal);
                            contribution = contribution * power_heuristic(light_pdf, brdf_pdf);
                        }
                        accum += contribution;
                    }
                    total += accum * (*area / samples.max(1) as f32) * *color;
                }
                Light::Directional { .. } | Light::Point { .. } => {
                    let info = light.shading_info_at(hit.position, attenuation);
                    let n_dot_l = hit.normal.dot(info.direction);
                    if n_dot_l <= 0.0 {
                        continue;
                    }
                    let bias_origin = hit.position + hit.normal * SHADOW_EPSILON;
                    let occluded = if info.distance.is_finite() {
                        let shadow_ray = Ray::new(bias_origin, info.direction);
                        self.intersect_any(&shadow_ray, info.distance - SHADOW_EPSILON)
                    } else {
                        let shadow_ray = Ray::new(bias_origin, info.direction);
                        self.intersect_any(&shadow_ray, f32::INFINITY)
                    };
                    if occluded {
                        continue;
                    }
                    let brdf_eval = material.eval(info.direction, ray.direction, hit.normal);
                    let attenuation_factor = if info.distance.is_finite() {
                        1.0 / (info.distance * info.distance)
                    } else {
                        1.0
                    };
                    total += info.color.hadamard(brdf_eval) * n_dot_l * attenuation_factor;
                }
            }
        }

        total
    }

    /// BRDF-sampled direct contribution for MIS: one non-recursive ray; if
    /// it lands on a light-backed primitive, weight its emission by the
    /// power heuristic against the NEE PDF.
    fn direct_brdf_sample(&mut self, ray: &Ray, hit: &Hit, material: &crate::material::Material) -> Color {
        let w_i = material.sample(ray.direction, hit.normal, &mut self.rng);
        if hit.normal.dot(w_i) <= 0.0 {
            return Color::zero();
        }
        let origin = hit.position + hit.normal * SHADOW_EPSILON;
        let sample_ray = Ray::new(origin, w_i);
        let Some(sample_hit) = self.intersect(&sample_ray) else {
            return Color::zero();
        };
        let primitive = &self.scene.accel.primitives()[sample_hit.primitive as usize];
        let Some(light_id) = primitive.light_id else {
            return Color::zero();
        };
        let light = &self.scene.lights[light_id as usize];
        if !light.is_area() {
            return Color::zero();
        }
        let brdf_pdf = material.pdf(w_i, ray.direction, hit.normal);
        if brdf_pdf <= 0.0 {
            return Color::zero();
        }
        let nee_pdf = self.nee_pdf_at(&sample_ray, &sample_hit);
        if nee_pdf <= 0.0 {
            return Color::zero();
        }
        let weight = power_heuristic(brdf_pdf, nee_pdf);
        let emission = self.scene.material(primitive.material_id).emission;
        let brdf_eval = material.eval(w_i, ray.direction, hit.normal);
        let n_dot_i = hit.normal.dot(w_i);
        emission.hadamard(brdf_eval) * (n_dot_i / brdf_pdf * weight)
    }

    /// Average, over all area lights the ray actually intersects, of
    /// `r^2 / (area * |n_l . w|)`.
    fn nee_pdf_at(&self, ray: &Ray, hit: &Hit) -> f32 {
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for light in &self.scene.lights {
            if !light.is_area() {
                continue;
            }
            if let Light::Quad { normal, area, .. } = light {
                if let Some(t) = light.intersect_quad(ray) {
                    if (t - hit.distance).abs() < 1e-3 {
                        let n_dot_w = normal.dot(-ray.direction).abs().max(1e-6);
                        sum += hit.distance * hit.distance / (*area * n_dot_w);
                        count += 1;
                    }
                }
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    fn indirect(
        &mut self,
        ray: &Ray,
        hit: &Hit,
        material: &crate::material::Material,
        throughput: Color,
        depth: u32,
    ) -> Color {
        let (w_i, next_throughput) = match self.scene.settings.importance_sampling {
            ImportanceSampling::Hemisphere => {
                let w_i = crate::material::sample_uniform_hemisphere(hit.normal, &mut self.rng);
                if hit.normal.dot(w_i) <= 0.0 {
                    return Color::zero();
                }
                let eval = material.eval(w_i, ray.direction, hit.normal);
                let n_dot_i = hit.normal.dot(w_i).max(0.0);
                (w_i, throughput.hadamard(eval) * (2.0 * PI * n_dot_i))
            }
            ImportanceSampling::Cosine => {
                let w_i = crate::material::sample_cosine_hemisphere(hit.normal, &mut self.rng);
                if hit.normal.dot(w_i) <= 0.0 {
                    return Color::zero();
                }
                let eval = material.eval(w_i, ray.direction, hit.normal);
                (w_i, throughput.hadamard(eval) * PI)
            }
            ImportanceSampling::Brdf => {
                let w_i = material.sample(ray.direction, hit.normal, &mut self.rng);
                if hit.normal.dot(w_i) <= 0.0 {
                    return Color::zero();
                }
                let pdf = material.pdf(w_i, ray.direction, hit.normal);
                if pdf <= 0.0 {
                    return Color::zero();
                }
                let eval = material.eval(w_i, ray.direction, hit.normal);
                let n_dot_i = hit.normal.dot(w_i).max(0.0);
                (w_i, throughput.hadamard(eval) * (n_dot_i / pdf))
            }
        };

        let mut next_throughput = next_throughput;
        if self.scene.settings.russian_roulette {
            let p = next_throughput.max_component().min(1.0);
            if self.rng.gen::<f32>() >= p {
                return Color::zero();
            }
            if p > 0.0 {
                next_throughput = next_throughput / p;
            }
        }

        let origin = hit.position + hit.normal * SHADOW_EPSILON;
        self.trace_depth(Ray::new(origin, w_i), next_throughput, depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_heuristic_sums_to_one() {
        let w1 = power_heuristic(2.0, 3.0);
        let w2 = power_heuristic(3.0, 2.0);
        assert!((w1 + w2 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn power_heuristic_zero_denominator_is_zero() {
        assert_eq!(power_heuristic(0.0, 0.0), 0.0);
    }
}
