//! The scene-file parser: a line-oriented command language. Blank lines and
//! `#` comments are skipped; unknown commands and malformed argument lists
//! are logged as warnings and skipped, never fatal (spec.md §7).

use std::path::{Path, PathBuf};

use crate::bvh::PartitionStrategy;
use crate::camera::Camera;
use crate::light::{Attenuation, Light};
use crate::material::{Brdf, Material};
use crate::math::{Mat4, Point3, Vec3};
use crate::primitive::{Primitive, PrimitiveShape, Transform};
use crate::scene::{Acceleration, ImportanceSampling, IntegratorKind, NeeMode, RenderSettings, Scene};

const MAX_INCLUDE_DEPTH: u32 = 16;

struct VertexAccum {
    position: Point3,
    normal: Vec3,
    explicit_normal: bool,
}

/// A triangle whose vertex-normal interpolation can't be finalized until
/// its mesh's vertex normals finish accumulating.
struct PendingTriangle {
    v0: usize,
    v1: usize,
    v2: usize,
    transform_id: u32,
    material_id: u32,
}

/// Parse-time workspace: transform stack, current material (copy-on-write
/// per spec.md §6), arenas under construction, and the current mesh's
/// vertex buffer.
struct ParserState {
    transform_stack: Vec<Mat4>,
    material: Material,
    compute_vertex_normals: bool,

    transforms: Vec<Transform>,
    materials: Vec<Material>,
    lights: Vec<Light>,
    primitives: Vec<Primitive>,

    mesh_vertices: Vec<VertexAccum>,
    pending_triangles: Vec<PendingTriangle>,

    camera: Option<Camera>,
    settings: RenderSettings,
}

impl ParserState {
    fn new() -> Self {
        Self {
            transform_stack: vec![Mat4::identity()],
            material: Material::default(),
            compute_vertex_normals: false,
            transforms: Vec::new(),
            materials: Vec::new(),
            lights: Vec::new(),
            primitives: Vec::new(),
            mesh_vertices: Vec::new(),
            pending_triangles: Vec::new(),
            camera: None,
            settings: RenderSettings::default(),
        }
    }

    fn current_transform(&self) -> Mat4 {
        *self.transform_stack.last().expect("transform stack is never empty")
    }

    /// Snapshots the current transform and material into their arenas,
    /// returning the indices a new primitive should carry. Each call
    /// allocates a fresh arena entry, which is what makes later material
    /// edits copy-on-write: primitives already pushed keep referencing
    /// their own snapshot.
    fn snapshot_ids(&mut self) -> (u32, u32) {
        let transform_id = self.transforms.len() as u32;
        self.transforms.push(Transform::new(self.current_transform()));

        let mut material = self.material;
        material.finalize_brdf();
        let material_id = self.materials.len() as u32;
        self.materials.push(material);

        (transform_id, material_id)
    }

    /// Flushes the current mesh: normalizes accumulated (non-explicit)
    /// vertex normals, then materializes every pending triangle and clears
    /// mesh-local state. Safe to call on an empty mesh (no-op).
    fn flush_mesh(&mut self) {
        if self.compute_vertex_normals {
            for v in &mut self.mesh_vertices {
                if !v.explicit_normal && v.normal.length_squared() > 0.0 {
                    v.normal = v.normal.normalized();
                }
            }
        }
        for pending in self.pending_triangles.drain(..) {
            let v0 = &self.mesh_vertices[pending.v0];
            let v1 = &self.mesh_vertices[pending.v1];
            let v2 = &self.mesh_vertices[pending.v2];
            let shape = PrimitiveShape::new_triangle(v0.position, v1.position, v2.position)
                .with_vertex_normals([v0.normal, v1.normal, v2.normal]);
            self.primitives.push(Primitive {
                shape,
                transform_id: pending.transform_id,
                material_id: pending.material_id,
                light_id: None,
            });
        }
        self.mesh_vertices.clear();
    }

    fn add_triangle_immediate(&mut self, v0: Point3, v1: Point3, v2: Point3) {
        let (transform_id, material_id) = self.snapshot_ids();
        let shape = PrimitiveShape::new_triangle(v0, v1, v2);
        self.primitives.push(Primitive {
            shape,
            transform_id,
            material_id,
            light_id: None,
        });
    }
}

/// Pulls the next whitespace-separated token as an `f32`/`u32`/`&str`.
/// Returns `None` (and the caller logs + skips the line) on a short or
/// unparseable argument list, matching the original's "iss.fail()" guard.
struct Args<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn new(rest: &'a str) -> Self {
        Self {
            tokens: rest.split_whitespace(),
        }
    }

    fn f32(&mut self) -> Option<f32> {
        self.tokens.next()?.parse().ok()
    }

    fn u32(&mut self) -> Option<u32> {
        self.tokens.next()?.parse().ok()
    }

    fn usize(&mut self) -> Option<usize> {
        self.tokens.next()?.parse().ok()
    }

    fn i32(&mut self) -> Option<i32> {
        self.tokens.next()?.parse().ok()
    }

    fn str(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }

    fn vec3(&mut self) -> Option<Vec3> {
        Some(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }
}

/// Parses `path` into a fully built `Scene`. `acceleration`/`partition_strategy`
/// come from the CLI (spec.md §6); `output`/`parallelism` overrides, if any,
/// are applied by the caller directly on the returned `settings`.
pub fn parse_scene_file(
    path: &Path,
    use_bvh: bool,
    partition_strategy: PartitionStrategy,
) -> Result<Scene, crate::error::MuonError> {
    let mut state = ParserState::new();
    parse_file(&mut state, path, 0)?;
    state.flush_mesh();

    let camera = state.camera.unwrap_or_else(|| {
        log::warn!("scene file never set a camera; using a default pinhole at the origin");
        Camera::new(
            Point3::new(0.0, 0.0, 5.0),
            Point3::zero(),
            Vec3::unit_y(),
            45.0,
            state.settings.width,
            state.settings.height,
        )
    });

    let accel = if use_bvh {
        Acceleration::build(state.primitives, &state.transforms, partition_strategy)
    } else {
        Acceleration::linear(state.primitives)
    };

    Ok(Scene {
        accel,
        transforms: state.transforms,
        materials: state.materials,
        lights: state.lights,
        camera,
        settings: state.settings,
    })
}

fn parse_file(state: &mut ParserState, path: &Path, depth: u32) -> Result<(), crate::error::MuonError> {
    if depth > MAX_INCLUDE_DEPTH {
        log::warn!("include depth exceeded at {}; skipping", path.display());
        return Ok(());
    }
    if !path.exists() {
        return Err(crate::error::MuonError::SceneNotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| crate::error::MuonError::SceneUnreadable(path.to_path_buf(), e))?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut split = line.splitn(2, char::is_whitespace);
        let cmd = split.next().unwrap_or("");
        let rest = split.next().unwrap_or("");
        process_line(state, cmd, rest, &base_dir, depth, line);
    }
    Ok(())
}

fn process_line(state: &mut ParserState, cmd: &str, rest: &str, base_dir: &Path, depth: u32, line: &str) {
    let mut args = Args::new(rest);
    let ok = match cmd {
        "size" => (|| {
            state.settings.width = args.u32()?;
            state.settings.height = args.u32()?;
            Some(())
        })(),
        "maxdepth" => (|| {
            state.settings.max_depth = args.i32()?;
            Some(())
        })(),
        "mindepth" => (|| {
            state.settings.min_depth = args.u32()?;
            Some(())
        })(),
        "output" => (|| {
            state.settings.output = PathBuf::from(args.str()?);
            Some(())
        })(),
        "gamma" => (|| {
            state.settings.gamma = args.f32()?;
            Some(())
        })(),
        "seed" => (|| {
            state.settings.seed = args.u32()? as u64;
            Some(())
        })(),
        "pixelsamples" => (|| {
            state.settings.pixel_samples = args.u32()?.max(1);
            Some(())
        })(),
        "lightsamples" => (|| {
            state.settings.light_samples = args.u32()?.max(1);
            Some(())
        })(),
        "lightstratify" => (|| {
            state.settings.light_stratify = parse_on_off(args.str()?)?;
            Some(())
        })(),
        "nee" => (|| {
            state.settings.nee = match args.str()? {
                "off" => NeeMode::Off,
                "on" => NeeMode::On,
                "mis" => NeeMode::Mis,
                _ => return None,
            };
            Some(())
        })(),
        "russianroulette" => (|| {
            state.settings.russian_roulette = parse_on_off(args.str()?)?;
            Some(())
        })(),
        "importancesampling" => (|| {
            state.settings.importance_sampling = match args.str()? {
                "hemisphere" => ImportanceSampling::Hemisphere,
                "cosine" => ImportanceSampling::Cosine,
                "brdf" => ImportanceSampling::Brdf,
                _ => return None,
            };
            Some(())
        })(),
        "integrator" => (|| {
            state.settings.integrator_kind = match args.str()? {
                "normals" => IntegratorKind::Normals,
                "depth" => IntegratorKind::Depth,
                "albedo" => IntegratorKind::Albedo,
                "raytracer" => IntegratorKind::Raytracer,
                "analyticdirect" => IntegratorKind::AnalyticDirect,
                "pathtracer" => IntegratorKind::PathTracer,
                _ => return None,
            };
            Some(())
        })(),
        "camera" => (|| {
            let eye = args.vec3()?;
            let look_at = args.vec3()?;
            let up = args.vec3()?;
            let fov = args.f32()?;
            state.camera = Some(Camera::new(eye, look_at, up, fov, state.settings.width, state.settings.height));
            Some(())
        })(),
        "computevertexnormals" => (|| {
            state.compute_vertex_normals = parse_on_off(args.str()?)?;
            Some(())
        })(),
        "meshstart" => {
            state.flush_mesh();
            Some(())
        }
        "meshend" => {
            state.flush_mesh();
            Some(())
        }
        "sphere" => (|| {
            let center = args.vec3()?;
            let radius = args.f32()?;
            let (transform_id, material_id) = state.snapshot_ids();
            state.primitives.push(Primitive {
                shape: PrimitiveShape::Sphere { center, radius },
                transform_id,
                material_id,
                light_id: None,
            });
            Some(())
        })(),
        "vertex" => (|| {
            let position = args.vec3()?;
            state.mesh_vertices.push(VertexAccum {
                position,
                normal: Vec3::zero(),
                explicit_normal: false,
            });
            Some(())
        })(),
        "vertexnormal" => (|| {
            let normal = args.vec3()?.normalized();
            let last = state.mesh_vertices.last_mut()?;
            last.normal = normal;
            last.explicit_normal = true;
            Some(())
        })(),
        "tri" => (|| {
            let v0 = args.usize()?;
            let v1 = args.usize()?;
            let v2 = args.usize()?;
            if v0 >= state.mesh_vertices.len()
                || v1 >= state.mesh_vertices.len()
                || v2 >= state.mesh_vertices.len()
            {
                return None;
            }
            let use_vertex_normals = state.compute_vertex_normals
                || state.mesh_vertices[v0].explicit_normal
                || state.mesh_vertices[v1].explicit_normal
                || state.mesh_vertices[v2].explicit_normal;
            if use_vertex_normals {
                if state.compute_vertex_normals {
                    let p0 = state.mesh_vertices[v0].position;
                    let p1 = state.mesh_vertices[v1].position;
                    let p2 = state.mesh_vertices[v2].position;
                    let face_normal = (p1 - p0).cross(p2 - p0);
                    state.mesh_vertices[v0].normal += face_normal;
                    state.mesh_vertices[v1].normal += face_normal;
                    state.mesh_vertices[v2].normal += face_normal;
                }
                let (transform_id, material_id) = state.snapshot_ids();
                if state.compute_vertex_normals {
                    // Accumulation isn't final until the mesh flushes.
                    state.pending_triangles.push(PendingTriangle {
                        v0,
                        v1,
                        v2,
                        transform_id,
                        material_id,
                    });
                } else {
                    // All referenced normals are already explicit/final.
                    let a = &state.mesh_vertices[v0];
                    let b = &state.mesh_vertices[v1];
                    let c = &state.mesh_vertices[v2];
                    let shape = PrimitiveShape::new_triangle(a.position, b.position, c.position)
                        .with_vertex_normals([a.normal, b.normal, c.normal]);
                    state.primitives.push(Primitive {
                        shape,
                        transform_id,
                        material_id,
                        light_id: None,
                    });
                }
            } else {
                let v0p = state.mesh_vertices[v0].position;
                let v1p = state.mesh_vertices[v1].position;
                let v2p = state.mesh_vertices[v2].position;
                state.add_triangle_immediate(v0p, v1p, v2p);
            }
            Some(())
        })(),
        "trinormal" => (|| {
            let v0 = args.usize()?;
            let v1 = args.usize()?;
            let v2 = args.usize()?;
            if v0 >= state.mesh_vertices.len()
                || v1 >= state.mesh_vertices.len()
                || v2 >= state.mesh_vertices.len()
            {
                return None;
            }
            let a = &state.mesh_vertices[v0];
            let b = &state.mesh_vertices[v1];
            let c = &state.mesh_vertices[v2];
            let shape = PrimitiveShape::new_triangle(a.position, b.position, c.position)
                .with_vertex_normals([a.normal, b.normal, c.normal]);
            let (transform_id, material_id) = state.snapshot_ids();
            state.primitives.push(Primitive {
                shape,
                transform_id,
                material_id,
                light_id: None,
            });
            Some(())
        })(),
        "translate" => (|| {
            let t = args.vec3()?;
            let top = state.transform_stack.last_mut()?;
            *top = top.mul(&Mat4::translation(t));
            Some(())
        })(),
        "rotate" => (|| {
            let axis = args.vec3()?;
            let degrees = args.f32()?;
            let top = state.transform_stack.last_mut()?;
            *top = top.mul(&Mat4::rotation(axis, degrees));
            Some(())
        })(),
        "scale" => (|| {
            let s = args.vec3()?;
            let top = state.transform_stack.last_mut()?;
            *top = top.mul(&Mat4::scaling(s));
            Some(())
        })(),
        "pushtransform" => {
            let top = state.current_transform();
            state.transform_stack.push(top);
            Some(())
        }
        "poptransform" => {
            if state.transform_stack.len() > 1 {
                state.transform_stack.pop();
                Some(())
            } else {
                None
            }
        }
        "directional" => (|| {
            let direction = args.vec3()?;
            let color = args.vec3()?;
            state.lights.push(Light::Directional { direction, color });
            Some(())
        })(),
        "point" => (|| {
            let position = args.vec3()?;
            let color = args.vec3()?;
            state.lights.push(Light::Point { position, color });
            Some(())
        })(),
        "attenuation" => (|| {
            let constant = args.f32()?;
            let linear = args.f32()?;
            let quadratic = args.f32()?;
            state.settings.attenuation = Attenuation { constant, linear, quadratic };
            Some(())
        })(),
        "quadlight" => (|| {
            let corner = args.vec3()?;
            let edge0 = args.vec3()?;
            let edge1 = args.vec3()?;
            let color = args.vec3()?;
            add_quad_light(state, corner, edge0, edge1, color);
            Some(())
        })(),
        "ambient" => (|| {
            state.material.ambient = args.vec3()?;
            Some(())
        })(),
        "diffuse" => (|| {
            state.material.diffuse = args.vec3()?;
            Some(())
        })(),
        "specular" => (|| {
            state.material.specular = args.vec3()?;
            Some(())
        })(),
        "emission" => (|| {
            state.material.emission = args.vec3()?;
            Some(())
        })(),
        "shininess" => (|| {
            state.material.shininess = args.f32()?;
            Some(())
        })(),
        "roughness" => (|| {
            state.material.roughness = args.f32()?.max(0.0);
            Some(())
        })(),
        "brdf" => (|| {
            state.material.brdf = match args.str()? {
                "lambertian" => Brdf::Lambertian,
                "phong" => Brdf::new_phong(state.material.diffuse, state.material.specular),
                "ggx" => Brdf::new_ggx(state.material.diffuse, state.material.specular),
                _ => return None,
            };
            Some(())
        })(),
        "read" => (|| {
            let relative = args.str()?;
            let include_path = base_dir.join(relative);
            if let Err(e) = parse_file(state, &include_path, depth + 1) {
                log::warn!("failed to read included scene file {}: {e}", include_path.display());
            }
            Some(())
        })(),
        "" => Some(()),
        _ => {
            log::warn!("unknown command: {cmd}");
            return;
        }
    };

    if ok.is_none() {
        log::warn!("malformed input line: {line}");
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

fn add_quad_light(state: &mut ParserState, corner: Point3, edge0: Vec3, edge1: Vec3, color: Vec3) {
    let light = Light::new_quad(corner, edge0, edge1, color);
    let light_id = state.lights.len() as u32;

    let mut emissive_material = Material {
        emission: color,
        ..Material::default()
    };
    emissive_material.finalize_brdf();

    let identity_transform_id = state.transforms.len() as u32;
    state.transforms.push(Transform::new(Mat4::identity()));
    let material_id = state.materials.len() as u32;
    state.materials.push(emissive_material);

    let va = corner;
    let vb = corner + edge0;
    let vc = corner + edge1;
    let vd = corner + edge0 + edge1;

    // Winding chosen so each triangle's face normal (v1-v0)x(v2-v0) points the
    // same way as the light's own `normal` field (`edge1 x edge0`).
    state.primitives.push(Primitive {
        shape: PrimitiveShape::new_triangle(va, vc, vb),
        transform_id: identity_transform_id,
        material_id,
        light_id: Some(light_id),
    });
    state.primitives.push(Primitive {
        shape: PrimitiveShape::new_triangle(vb, vc, vd),
        transform_id: identity_transform_id,
        material_id,
        light_id: Some(light_id),
    });

    state.lights.push(light);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> tempfile_like::TempScene {
        tempfile_like::TempScene::new(contents)
    }

    /// A tiny scratch-file helper so tests don't need a `tempfile` dependency.
    mod tempfile_like {
        use std::io::Write;
        use std::sync::atomic::{AtomicU32, Ordering};

        static COUNTER: AtomicU32 = AtomicU32::new(0);

        pub struct TempScene {
            pub path: std::path::PathBuf,
        }

        impl TempScene {
            pub fn new(contents: &str) -> Self {
                let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
                let mut path = std::env::temp_dir();
                path.push(format!("muon_test_{}_{unique}.scene", std::process::id()));
                let mut file = std::fs::File::create(&path).unwrap();
                file.write_all(contents.as_bytes()).unwrap();
                Self { path }
            }
        }

        impl Drop for TempScene {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn parses_minimal_scene() {
        let scene_file = write_temp(
            "size 4 4\n\
             camera 0 0 5 0 0 0 0 1 0 45\n\
             sphere 0 0 0 1\n\
             directional 0 -1 0 1 1 1\n",
        );
        let scene = parse_scene_file(&scene_file.path, true, PartitionStrategy::Midpoint).expect("should parse");
        assert_eq!(scene.settings.width, 4);
        assert_eq!(scene.settings.height, 4);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.accel.primitives().len(), 1);
    }

    #[test]
    fn unknown_command_is_skipped_not_fatal() {
        let scene_file = write_temp("size 2 2\nbogus 1 2 3\nsphere 0 0 0 1\n");
        let scene = parse_scene_file(&scene_file.path, true, PartitionStrategy::Midpoint).expect("should parse despite unknown command");
        assert_eq!(scene.accel.primitives().len(), 1);
    }

    #[test]
    fn quad_light_adds_two_triangles_with_light_back_reference() {
        let scene_file = write_temp(
            "size 2 2\n\
             quadlight 0 5 0 1 0 0 0 0 1 1 1 1\n",
        );
        let scene = parse_scene_file(&scene_file.path, true, PartitionStrategy::Midpoint).expect("should parse");
        assert_eq!(scene.lights.len(), 1);
        let primitives = scene.accel.primitives();
        assert_eq!(primitives.len(), 2);
        assert!(primitives.iter().all(|p| p.light_id == Some(0)));
    }

    #[test]
    fn compute_vertex_normals_averages_shared_vertex() {
        let scene_file = write_temp(
            "size 2 2\n\
             computevertexnormals on\n\
             vertex 0 0 0\n\
             vertex 1 0 0\n\
             vertex 0 1 0\n\
             vertex 1 1 0\n\
             tri 0 1 2\n\
             tri 1 3 2\n",
        );
        let scene = parse_scene_file(&scene_file.path, true, PartitionStrategy::Midpoint).expect("should parse");
        assert_eq!(scene.accel.primitives().len(), 2);
    }

    #[test]
    fn material_edits_are_copy_on_write() {
        let scene_file = write_temp(
            "size 2 2\n\
             diffuse 1 0 0\n\
             sphere 0 0 0 1\n\
             diffuse 0 1 0\n\
             sphere 2 0 0 1\n",
        );
        let scene = parse_scene_file(&scene_file.path, true, PartitionStrategy::Midpoint).expect("should parse");
        let primitives = scene.accel.primitives();
        assert_eq!(primitives.len(), 2);
        let first_material = scene.material(primitives[0].material_id);
        let second_material = scene.material(primitives[1].material_id);
        assert_ne!(first_material.diffuse, second_material.diffuse);
    }
}
