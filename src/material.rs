//! Materials and their BRDFs: Lambertian, modified Phong, and GGX microfacet.
//!
//! Convention (spec.md §9): `w_o = -ray_dir` (away from the surface, the
//! reversed incoming ray), `w_i` is the sampled incident direction, also
//! pointing away from the surface, above the horizon.

use std::f32::consts::PI;

use rand::Rng;

use crate::math::{Color, Vec3};

/// "Rotates" a z-axis-centered sample `s` so its z-axis aligns with `w`.
pub fn rotate_to_frame(s: Vec3, w: Vec3) -> Vec3 {
    let a = if w.y.abs() > 0.9 {
        Vec3::unit_x()
    } else {
        Vec3::unit_y()
    };
    let u = a.cross(w).normalized();
    let v = w.cross(u).normalized();
    s.x * u + s.y * v + s.z * w
}

/// Cosine-weighted hemisphere sample around `normal`.
pub fn sample_cosine_hemisphere(normal: Vec3, rng: &mut impl Rng) -> Vec3 {
    let r1: f32 = rng.gen();
    let r2: f32 = rng.gen();
    let r = r1.sqrt();
    let phi = 2.0 * PI * r2;
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - r1).sqrt());
    rotate_to_frame(local, normal)
}

/// Uniform hemisphere sample around `normal`.
pub fn sample_uniform_hemisphere(normal: Vec3, rng: &mut impl Rng) -> Vec3 {
    let r1: f32 = rng.gen();
    let r2: f32 = rng.gen();
    let sin_theta = (1.0 - r1 * r1).sqrt();
    let phi = 2.0 * PI * r2;
    let local = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), r1);
    rotate_to_frame(local, normal)
}

/// The BRDF variant carried by a material, with any cached state (e.g.
/// memoized reflectiveness) precomputed once at scene-build time rather than
/// lazily, since materials are immutable and shared across worker threads
/// once rendering begins.
#[derive(Debug, Clone, Copy)]
pub enum Brdf {
    Lambertian,
    /// Energy-conserving modified Phong. `reflectiveness` is the
    /// component-averaged specular/(specular+diffuse) mixture weight `t`.
    Phong { reflectiveness: f32 },
    /// GGX microfacet. `t` mirrors Phong's mixture weight, with a 0.25
    /// floor so the Fresnel effect is still sampled on matte materials.
    Ggx { t: f32 },
}

impl Brdf {
    /// Computes the reflectiveness/mixture weight from a material's diffuse
    /// and specular albedos. Shared by `Phong` and `Ggx` construction.
    fn reflectiveness(diffuse: Color, specular: Color) -> f32 {
        let d = diffuse.mean();
        let s = specular.mean();
        let denom = d + s;
        if denom > 0.0 {
            s / denom
        } else {
            0.0
        }
    }

    pub fn new_phong(diffuse: Color, specular: Color) -> Self {
        Brdf::Phong {
            reflectiveness: Self::reflectiveness(diffuse, specular),
        }
    }

    pub fn new_ggx(diffuse: Color, specular: Color) -> Self {
        let d = diffuse.mean();
        let s = specular.mean();
        let t = if d == 0.0 && s == 0.0 {
            1.0
        } else {
            Self::reflectiveness(diffuse, specular).max(0.25)
        };
        Brdf::Ggx { t }
    }
}

/// Surface material properties plus the BRDF variant that shades them.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub emission: Color,
    pub shininess: f32,
    pub roughness: f32,
    pub brdf: Brdf,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: Color::zero(),
            diffuse: Color::zero(),
            specular: Color::zero(),
            emission: Color::zero(),
            shininess: 0.0,
            roughness: 0.0,
            brdf: Brdf::Lambertian,
        }
    }
}

impl Material {
    /// Recomputes any BRDF-cached state (reflectiveness mixture weights)
    /// from the current diffuse/specular albedos. Called once when a
    /// material snapshot is pushed into the scene's material arena.
    pub fn finalize_brdf(&mut self) {
        self.brdf = match self.brdf {
            Brdf::Lambertian => Brdf::Lambertian,
            Brdf::Phong { .. } => Brdf::new_phong(self.diffuse, self.specular),
            Brdf::Ggx { .. } => Brdf::new_ggx(self.diffuse, self.specular),
        };
    }

    pub fn sample(&self, ray_dir: Vec3, normal: Vec3, rng: &mut impl Rng) -> Vec3 {
        match self.brdf {
            Brdf::Lambertian => sample_cosine_hemisphere(normal, rng),
            Brdf::Phong { reflectiveness } => {
                if rng.gen::<f32>() >= reflectiveness {
                    sample_cosine_hemisphere(normal, rng)
                } else {
                    let r1: f32 = rng.gen();
                    let r2: f32 = rng.gen();
                    let theta = r1.powf(1.0 / (self.shininess + 1.0)).acos();
                    let phi = 2.0 * PI * r2;
                    let local = Vec3::new(
                        phi.cos() * theta.sin(),
                        phi.sin() * theta.sin(),
                        theta.cos(),
                    );
                    let r = ray_dir.reflect(normal);
                    rotate_to_frame(local, r)
                }
            }
            Brdf::Ggx { t } => {
                if rng.gen::<f32>() >= t {
                    sample_cosine_hemisphere(normal, rng)
                } else {
                    let r1: f32 = rng.gen();
                    let r2: f32 = rng.gen();
                    let alpha = self.roughness;
                    let theta = (alpha * r1.sqrt() / (1.0 - r1).sqrt()).atan();
                    let phi = 2.0 * PI * r2;
                    let local = Vec3::new(
                        phi.cos() * theta.sin(),
                        phi.sin() * theta.sin(),
                        theta.cos(),
                    );
                    let h = rotate_to_frame(local, normal);
                    ray_dir.reflect(h)
                }
            }
        }
    }

    pub fn pdf(&self, w_i: Vec3, ray_dir: Vec3, normal: Vec3) -> f32 {
        match self.brdf {
            Brdf::Lambertian => normal.dot(w_i).max(0.0) / PI,
            Brdf::Phong { reflectiveness } => {
                let t = reflectiveness;
                let r = ray_dir.reflect(normal);
                let cos_term = normal.dot(w_i).max(0.0) / PI;
                let spec_term = (self.shininess + 1.0) / (2.0 * PI)
                    * r.dot(w_i).max(0.0).powf(self.shininess);
                (1.0 - t) * cos_term + t * spec_term
            }
            Brdf::Ggx { t } => {
                let h = (w_i + -ray_dir).normalized();
                let cos_term = normal.dot(w_i).max(0.0) / PI;
                let cos_theta_h = normal.dot(h).max(1e-6);
                let d = ggx_d(cos_theta_h, self.roughness);
                let denom = 4.0 * h.dot(w_i);
                let spec_term = if denom.abs() > 1e-8 {
                    d * normal.dot(h).max(0.0) / denom
                } else {
                    0.0
                };
                (1.0 - t) * cos_term + t * spec_term
            }
        }
    }

    pub fn eval(&self, w_i: Vec3, ray_dir: Vec3, normal: Vec3) -> Color {
        match self.brdf {
            Brdf::Lambertian => self.diffuse / PI,
            Brdf::Phong { .. } => {
                let r = ray_dir.reflect(normal);
                let diffuse = self.diffuse / PI;
                let specular = self.specular * (self.shininess + 2.0) / (2.0 * PI)
                    * r.dot(w_i).max(0.0).powf(self.shininess);
                diffuse + specular
            }
            Brdf::Ggx { .. } => {
                let w_o = -ray_dir;
                let n_dot_i = normal.dot(w_i);
                let n_dot_o = normal.dot(w_o);
                let diffuse = self.diffuse / PI;
                if n_dot_i <= 0.0 || n_dot_o <= 0.0 {
                    return diffuse;
                }
                let h = (w_i + w_o).normalized();
                let cos_theta_h = normal.dot(h).max(1e-6);
                let d = ggx_d(cos_theta_h, self.roughness);
                let g = ggx_g1(n_dot_i, self.roughness) * ggx_g1(n_dot_o, self.roughness);
                let cos_i_h = w_i.dot(h).max(0.0);
                let f = self.specular + (Color::ones() - self.specular) * (1.0 - cos_i_h).powi(5);
                let specular = f * (g * d) / (4.0 * n_dot_i * n_dot_o);
                diffuse + specular
            }
        }
    }
}

/// GGX normal distribution function, parameterized by `cos(theta_h)`.
fn ggx_d(cos_theta_h: f32, alpha: f32) -> f32 {
    let cos2 = cos_theta_h * cos_theta_h;
    let tan2 = (1.0 - cos2).max(0.0) / cos2;
    let alpha2 = alpha * alpha;
    let denom = PI * cos2 * cos2 * (alpha2 + tan2).powi(2);
    if denom.abs() < 1e-12 {
        0.0
    } else {
        alpha2 / denom
    }
}

/// GGX shadowing-masking term for a single direction (`w_i` or `w_o`),
/// given its cosine with the normal.
fn ggx_g1(n_dot_v: f32, alpha: f32) -> f32 {
    if n_dot_v <= 0.0 {
        return 0.0;
    }
    let tan2 = (1.0 - n_dot_v * n_dot_v).max(0.0) / (n_dot_v * n_dot_v);
    2.0 / (1.0 + (1.0 + alpha * alpha * tan2).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn lambertian_eval_nonnegative() {
        let m = Material {
            diffuse: Color::new(0.5, 0.3, 0.1),
            ..Default::default()
        };
        let normal = Vec3::unit_y();
        let w_i = Vec3::new(0.1, 0.9, 0.0).normalized();
        let eval = m.eval(w_i, Vec3::new(0.0, -1.0, 0.0), normal);
        assert!(eval.x >= 0.0 && eval.y >= 0.0 && eval.z >= 0.0);
    }

    #[test]
    fn cosine_hemisphere_mean_matches_expectation() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let normal = Vec3::unit_y();
        let mut sum = Vec3::zero();
        const N: u32 = 10_000;
        for _ in 0..N {
            sum += sample_cosine_hemisphere(normal, &mut rng);
        }
        let mean = sum / N as f32;
        // Cosine-weighted samples around +y should average toward +y with a
        // mean of 0 on the perpendicular axes and a positive y component.
        assert!(mean.x.abs() < 0.05);
        assert!(mean.z.abs() < 0.05);
        assert!(mean.y > 0.5 && mean.y < 0.9);
    }

    #[test]
    fn phong_energy_conserving() {
        let m = Material {
            diffuse: Color::new(0.5, 0.5, 0.5),
            specular: Color::new(0.3, 0.3, 0.3),
            shininess: 50.0,
            brdf: Brdf::new_phong(Color::new(0.5, 0.5, 0.5), Color::new(0.3, 0.3, 0.3)),
            ..Default::default()
        };
        let normal = Vec3::unit_y();
        let ray_dir = Vec3::new(0.0, -1.0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sum = Color::zero();
        const N: u32 = 20_000;
        for _ in 0..N {
            let w_i = sample_uniform_hemisphere(normal, &mut rng);
            let cos_theta = normal.dot(w_i).max(0.0);
            sum += m.eval(w_i, ray_dir, normal) * cos_theta;
        }
        // Uniform-hemisphere Monte Carlo estimate of the integral of
        // f*cos(theta) over the hemisphere: integral ~= 2*pi*mean(f*cos).
        let integral = sum / N as f32 * (2.0 * PI);
        assert!(integral.x <= 1.05 && integral.y <= 1.05 && integral.z <= 1.05);
    }

    #[test]
    fn ggx_matte_material_still_floors_t_at_quarter() {
        let brdf = Brdf::new_ggx(Color::new(0.5, 0.5, 0.5), Color::zero());
        match brdf {
            Brdf::Ggx { t } => assert!((t - 0.25).abs() < 1e-6),
            _ => panic!("expected ggx"),
        }
    }
}
