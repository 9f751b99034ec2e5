//! The scene graph: arenas for transforms, materials, lights, and primitives,
//! plus render configuration. Built once by the parser and immutable
//! thereafter.

use crate::bvh::{Bvh, PartitionStrategy};
use crate::camera::Camera;
use crate::light::{Attenuation, Light};
use crate::material::Material;
use crate::primitive::{Hit, Primitive, Transform};

/// Selects between the linear-scan and BVH acceleration structures. A
/// closed two-variant enum per spec.md §9 rather than a trait object, since
/// the variant set never grows.
pub enum Acceleration {
    Linear(Vec<Primitive>),
    Bvh {
        bvh: Bvh,
        primitives: Vec<Primitive>,
    },
}

impl Acceleration {
    pub fn build(mut primitives: Vec<Primitive>, transforms: &[Transform], strategy: PartitionStrategy) -> Self {
        let bvh = Bvh::build(&mut primitives, transforms, strategy);
        Acceleration::Bvh { bvh, primitives }
    }

    pub fn linear(primitives: Vec<Primitive>) -> Self {
        Acceleration::Linear(primitives)
    }

    pub fn primitives(&self) -> &[Primitive] {
        match self {
            Acceleration::Linear(p) => p,
            Acceleration::Bvh { primitives, .. } => primitives,
        }
    }

    pub fn intersect(
        &self,
        ray: &crate::math::Ray,
        transforms: &[Transform],
        workspace: &mut crate::bvh::Workspace,
    ) -> Option<Hit> {
        match self {
            Acceleration::Linear(primitives) => primitives
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.intersect(ray, transforms, i as u32))
                .min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap()),
            Acceleration::Bvh { bvh, primitives } => bvh.intersect(ray, primitives, transforms, workspace),
        }
    }

    pub fn intersect_any(
        &self,
        ray: &crate::math::Ray,
        max_distance: f32,
        transforms: &[Transform],
        workspace: &mut crate::bvh::Workspace,
    ) -> bool {
        match self {
            Acceleration::Linear(primitives) => primitives.iter().enumerate().any(|(i, p)| {
                p.intersect(ray, transforms, i as u32)
                    .map(|h| h.distance > 0.0 && h.distance < max_distance)
                    .unwrap_or(false)
            }),
            Acceleration::Bvh { bvh, primitives } => {
                bvh.intersect_any(ray, max_distance, primitives, transforms, workspace)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorKind {
    Normals,
    Depth,
    Albedo,
    Raytracer,
    AnalyticDirect,
    PathTracer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeeMode {
    Off,
    On,
    Mis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceSampling {
    Hemisphere,
    Cosine,
    Brdf,
}

/// Render-wide configuration, built up by the parser and overridable by CLI
/// flags (`--output`, `--parallelism`, `--acceleration`,
/// `--partition_strategy`).
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub output: std::path::PathBuf,
    pub gamma: f32,
    pub seed: u64,
    pub max_depth: i32,
    pub min_depth: u32,
    pub pixel_samples: u32,
    pub light_samples: u32,
    pub light_stratify: bool,
    pub nee: NeeMode,
    pub russian_roulette: bool,
    pub importance_sampling: ImportanceSampling,
    pub integrator_kind: IntegratorKind,
    pub attenuation: Attenuation,
    pub parallelism: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            output: std::path::PathBuf::from("output.png"),
            gamma: 1.0,
            seed: 0,
            max_depth: 5,
            min_depth: 0,
            pixel_samples: 1,
            light_samples: 1,
            light_stratify: false,
            nee: NeeMode::Off,
            russian_roulette: false,
            importance_sampling: ImportanceSampling::Cosine,
            integrator_kind: IntegratorKind::Raytracer,
            attenuation: Attenuation::default(),
            parallelism: 1,
        }
    }
}

/// The fully built, immutable scene graph handed to the driver: geometry,
/// arenas, camera, and render configuration.
pub struct Scene {
    pub accel: Acceleration,
    pub transforms: Vec<Transform>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    pub camera: Camera,
    pub settings: RenderSettings,
}

impl Scene {
    pub fn material(&self, id: u32) -> &Material {
        &self.materials[id as usize]
    }
}
