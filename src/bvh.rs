//! Bounding-volume hierarchy: build (uniform / midpoint / SAH) and iterative
//! traversal (closest-hit and any-hit).

use crate::bounds::Bounds3;
use crate::math::{Point3, Ray};
use crate::primitive::{Hit, Primitive, Transform};
use crate::stats::Stats;

/// BVH construction strategy, selected by `--partition_strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    Uniform,
    Midpoint,
    Sah,
}

const SAH_BUCKETS: usize = 12;
const SAH_TRAVERSAL_COST: f32 = 0.125;

#[derive(Debug, Clone, Copy)]
enum BvhNode {
    Leaf {
        start: u32,
        count: u32,
        bounds: Bounds3,
    },
    Internal {
        axis: u8,
        left: u32,
        right: u32,
        bounds: Bounds3,
    },
}

impl BvhNode {
    fn bounds(&self) -> Bounds3 {
        match *self {
            BvhNode::Leaf { bounds, .. } => bounds,
            BvhNode::Internal { bounds, .. } => bounds,
        }
    }
}

struct PrimInfo {
    original_index: u32,
    bounds: Bounds3,
    centroid: Point3,
}

/// A binary BVH over a (possibly reordered) primitive array. The tree owns
/// the final primitive order: construction permutes the caller's `Vec` so
/// every leaf's range is contiguous.
pub struct Bvh {
    nodes: Vec<BvhNode>,
    root: u32,
}

impl Bvh {
    /// Builds the tree, reordering `primitives` in place.
    pub fn build(
        primitives: &mut Vec<Primitive>,
        transforms: &[Transform],
        strategy: PartitionStrategy,
    ) -> Self {
        let mut info: Vec<PrimInfo> = primitives
            .iter()
            .map(|p| {
                let bounds = p.world_bounds(transforms);
                PrimInfo {
                    original_index: 0, // filled below
                    bounds,
                    centroid: bounds.centroid(),
                }
            })
            .collect();
        for (i, pi) in info.iter_mut().enumerate() {
            pi.original_index = i as u32;
        }

        let mut nodes = Vec::new();
        let root = build_range(&mut info, 0, strategy, &mut nodes);

        let ordered: Vec<Primitive> = info
            .iter()
            .map(|pi| primitives[pi.original_index as usize])
            .collect();
        *primitives = ordered;

        Bvh { nodes, root }
    }

    pub fn intersect(
        &self,
        ray: &Ray,
        primitives: &[Primitive],
        transforms: &[Transform],
        workspace: &mut Workspace,
    ) -> Option<Hit> {
        workspace.stack_top = 0;
        let mut closest: Option<Hit> = None;
        let mut closest_t = f32::INFINITY;

        let first_child = [
            (ray.direction.x < 0.0) as usize,
            (ray.direction.y < 0.0) as usize,
            (ray.direction.z < 0.0) as usize,
        ];

        let mut current = self.root;
        loop {
            let node = &self.nodes[current as usize];
            workspace.stats.bvh_node_visits += 1;
            if node.bounds().hit(ray, closest_t) {
                match node {
                    BvhNode::Leaf { start, count, .. } => {
                        for i in *start..(*start + *count) {
                            workspace.stats.intersection_tests += 1;
                            if let Some(hit) = primitives[i as usize].intersect(ray, transforms, i)
                            {
                                if hit.distance < closest_t {
                                    closest_t = hit.distance;
                                    closest = Some(hit);
                                }
                            }
                        }
                    }
                    BvhNode::Internal { axis, left, right, .. } => {
                        let children = [*left, *right];
                        let near = children[first_child[*axis as usize]];
                        let far = children[1 - first_child[*axis as usize]];
                        workspace.push(far);
                        current = near;
                        continue;
                    }
                }
            }
            match workspace.pop() {
                Some(n) => current = n,
                None => break,
            }
        }
        closest
    }

    pub fn intersect_any(
        &self,
        ray: &Ray,
        max_distance: f32,
        primitives: &[Primitive],
        transforms: &[Transform],
        workspace: &mut Workspace,
    ) -> bool {
        workspace.stack_top = 0;
        let first_child = [
            (ray.direction.x < 0.0) as usize,
            (ray.direction.y < 0.0) as usize,
            (ray.direction.z < 0.0) as usize,
        ];

        let mut current = self.root;
        loop {
            let node = &self.nodes[current as usize];
            workspace.stats.bvh_node_visits += 1;
            if node.bounds().hit(ray, max_distance) {
                match node {
                    BvhNode::Leaf { start, count, .. } => {
                        for i in *start..(*start + *count) {
                            workspace.stats.intersection_tests += 1;
                            if let Some(hit) = primitives[i as usize].intersect(ray, transforms, i)
                            {
                                if hit.distance > 0.0 && hit.distance < max_distance {
                                    workspace.stack_top = 0;
                                    return true;
                                }
                            }
                        }
                    }
                    BvhNode::Internal { axis, left, right, .. } => {
                        let children = [*left, *right];
                        let near = children[first_child[*axis as usize]];
                        let far = children[1 - first_child[*axis as usize]];
                        workspace.push(far);
                        current = near;
                        continue;
                    }
                }
            }
            match workspace.pop() {
                Some(n) => current = n,
                None => break,
            }
        }
        false
    }
}

fn build_range(
    info: &mut [PrimInfo],
    base: u32,
    strategy: PartitionStrategy,
    nodes: &mut Vec<BvhNode>,
) -> u32 {
    let n = info.len();
    let bounds = info
        .iter()
        .fold(Bounds3::empty(), |acc, pi| acc.union(pi.bounds));

    if n == 1 {
        nodes.push(BvhNode::Leaf {
            start: base,
            count: 1,
            bounds,
        });
        return (nodes.len() - 1) as u32;
    }

    let centroid_bounds = info
        .iter()
        .fold(Bounds3::empty(), |acc, pi| acc.union_point(pi.centroid));
    let axis = centroid_bounds.max_axis();

    let split = match strategy {
        PartitionStrategy::Uniform => partition_uniform(info, axis),
        PartitionStrategy::Midpoint => {
            partition_midpoint(info, axis, centroid_bounds).unwrap_or_else(|| partition_uniform(info, axis))
        }
        PartitionStrategy::Sah => {
            match partition_sah(info, axis, centroid_bounds, bounds) {
                SahOutcome::Split(mid) => mid,
                SahOutcome::Leaf => {
                    nodes.push(BvhNode::Leaf {
                        start: base,
                        count: n as u32,
                        bounds,
                    });
                    return (nodes.len() - 1) as u32;
                }
            }
        }
    };

    if split == 0 || split == n {
        // Degenerate partition: everything landed on one side.
        nodes.push(BvhNode::Leaf {
            start: base,
            count: n as u32,
            bounds,
        });
        return (nodes.len() - 1) as u32;
    }

    let (left_info, right_info) = info.split_at_mut(split);
    let left = build_range(left_info, base, strategy, nodes);
    let right = build_range(right_info, base + split as u32, strategy, nodes);

    nodes.push(BvhNode::Internal {
        axis: axis as u8,
        left,
        right,
        bounds,
    });
    (nodes.len() - 1) as u32
}

/// Splits at the midpoint of the range via `select_nth_unstable_by`.
fn partition_uniform(info: &mut [PrimInfo], axis: usize) -> usize {
    let mid = info.len() / 2;
    info.select_nth_unstable_by(mid, |a, b| {
        a.centroid[axis].partial_cmp(&b.centroid[axis]).unwrap()
    });
    mid
}

/// Splits where `centroid[axis] < midpoint of the centroid bounds`. Returns
/// `None` if the partition would degenerate (all on one side).
fn partition_midpoint(info: &mut [PrimInfo], axis: usize, centroid_bounds: Bounds3) -> Option<usize> {
    let mid_value = (centroid_bounds.min[axis] + centroid_bounds.max[axis]) / 2.0;
    let split = itertools_partition(info, |pi| pi.centroid[axis] < mid_value);
    if split == 0 || split == info.len() {
        None
    } else {
        Some(split)
    }
}

/// Stable-enough partition helper: reorders `info` so all elements
/// satisfying `pred` come first, returning the split point. Equivalent to
/// `itertools::partition` without adding the dependency.
fn itertools_partition<T>(slice: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut split = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(i, split);
            split += 1;
        }
    }
    split
}

enum SahOutcome {
    Split(usize),
    Leaf,
}

/// Surface-area-heuristic partition into `SAH_BUCKETS` buckets. Falls back
/// to a leaf when the best split cost exceeds the make-a-leaf cost, or to
/// `Uniform` if the bucket partition itself degenerates.
fn partition_sah(
    info: &mut [PrimInfo],
    axis: usize,
    centroid_bounds: Bounds3,
    total_bounds: Bounds3,
) -> SahOutcome {
    let n = info.len();

    #[derive(Clone, Copy)]
    struct Bucket {
        count: usize,
        bounds: Bounds3,
    }
    let mut buckets = [Bucket {
        count: 0,
        bounds: Bounds3::empty(),
    }; SAH_BUCKETS];

    let extent = centroid_bounds.max[axis] - centroid_bounds.min[axis];
    let bucket_of = |centroid: Point3| -> usize {
        if extent <= 0.0 {
            0
        } else {
            let b = (SAH_BUCKETS as f32 * centroid_bounds.offset(centroid, axis)) as usize;
            b.min(SAH_BUCKETS - 1)
        }
    };

    for pi in info.iter() {
        let b = bucket_of(pi.centroid);
        buckets[b].count += 1;
        buckets[b].bounds = buckets[b].bounds.union(pi.bounds);
    }

    let total_sa = total_bounds.surface_area();
    if total_sa <= 0.0 {
        // All primitives at a single point: avoid a NaN cost divisor.
        return SahOutcome::Leaf;
    }

    let mut best_cost = f32::INFINITY;
    let mut best_split = 0usize;
    for split in 0..(SAH_BUCKETS - 1) {
        let mut left_count = 0usize;
        let mut left_bounds = Bounds3::empty();
        for b in &buckets[..=split] {
            if b.count > 0 {
                left_count += b.count;
                left_bounds = left_bounds.union(b.bounds);
            }
        }
        let mut right_count = 0usize;
        let mut right_bounds = Bounds3::empty();
        for b in &buckets[(split + 1)..] {
            if b.count > 0 {
                right_count += b.count;
                right_bounds = right_bounds.union(b.bounds);
            }
        }
        if left_count == 0 || right_count == 0 {
            continue;
        }
        let cost = SAH_TRAVERSAL_COST
            + (left_count as f32 * left_bounds.surface_area()
                + right_count as f32 * right_bounds.surface_area())
                / total_sa;
        if cost < best_cost {
            best_cost = cost;
            best_split = split;
        }
    }

    let leaf_cost = n as f32;
    if best_cost > leaf_cost {
        return SahOutcome::Leaf;
    }

    let split = itertools_partition(info, |pi| bucket_of(pi.centroid) <= best_split);
    if split == 0 || split == n {
        match partition_midpoint(info, axis, centroid_bounds) {
            Some(mid) => SahOutcome::Split(mid),
            None => SahOutcome::Split(partition_uniform(info, axis)),
        }
    } else {
        SahOutcome::Split(split)
    }
}

/// Per-thread scratch used during BVH traversal: an explicit traversal
/// stack (capacity 64) plus trace counters. Created once per worker thread
/// and reused for every ray.
pub struct Workspace {
    stack: [u32; 64],
    stack_top: usize,
    pub stats: Stats,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            stack: [0; 64],
            stack_top: 0,
            stats: Stats::default(),
        }
    }
}

impl Workspace {
    fn push(&mut self, node: u32) {
        assert!(
            self.stack_top < self.stack.len(),
            "BVH traversal stack overflow: scene exceeds supported depth"
        );
        self.stack[self.stack_top] = node;
        self.stack_top += 1;
    }

    fn pop(&mut self) -> Option<u32> {
        if self.stack_top == 0 {
            None
        } else {
            self.stack_top -= 1;
            Some(self.stack[self.stack_top])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::primitive::PrimitiveShape;

    fn make_spheres(centers: &[Point3]) -> (Vec<Primitive>, Vec<Transform>) {
        let transforms = vec![Transform::new(crate::math::Mat4::identity())];
        let primitives = centers
            .iter()
            .map(|&c| Primitive {
                shape: PrimitiveShape::Sphere { center: c, radius: 0.5 },
                transform_id: 0,
                material_id: 0,
                light_id: None,
            })
            .collect();
        (primitives, transforms)
    }

    fn check_invariants(bvh: &Bvh, primitives: &[Primitive], transforms: &[Transform]) {
        let mut seen = vec![false; primitives.len()];
        for node in &bvh.nodes {
            if let BvhNode::Internal { left, right, bounds, .. } = node {
                let lb = bvh.nodes[*left as usize].bounds();
                let rb = bvh.nodes[*right as usize].bounds();
                let union = lb.union(rb);
                assert!(bounds.min.x <= union.min.x + 1e-4 && bounds.max.x >= union.max.x - 1e-4);
            }
            if let BvhNode::Leaf { start, count, bounds } = node {
                assert!(*count > 0);
                for i in *start..(*start + *count) {
                    assert!(!seen[i as usize], "primitive {i} appears in two leaves");
                    seen[i as usize] = true;
                    let pb = primitives[i as usize].world_bounds(transforms);
                    assert!(bounds.min.x <= pb.min.x + 1e-3 && bounds.max.x >= pb.max.x - 1e-3);
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn bvh_invariants_hold_for_each_strategy() {
        let centers: Vec<Point3> = (0..20)
            .map(|i| Point3::new(i as f32 * 1.3, (i % 3) as f32, (i * 7 % 5) as f32))
            .collect();
        for strategy in [
            PartitionStrategy::Uniform,
            PartitionStrategy::Midpoint,
            PartitionStrategy::Sah,
        ] {
            let (mut primitives, transforms) = make_spheres(&centers);
            let bvh = Bvh::build(&mut primitives, &transforms, strategy);
            check_invariants(&bvh, &primitives, &transforms);
        }
    }

    #[test]
    fn bvh_matches_linear_closest_hit() {
        let centers: Vec<Point3> = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(-3.0, 0.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
        ];
        let (mut primitives, transforms) = make_spheres(&centers);
        let linear = primitives.clone();
        let bvh = Bvh::build(&mut primitives, &transforms, PartitionStrategy::Sah);

        let mut ws = Workspace::default();
        for dir in [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
        ] {
            let ray = Ray::new(Point3::new(dir.x * -10.0, dir.y * -10.0, dir.z * -10.0), dir);
            let bvh_hit = bvh.intersect(&ray, &primitives, &transforms, &mut ws);
            let linear_hit = linear
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.intersect(&ray, &transforms, i as u32))
                .min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
            match (bvh_hit, linear_hit) {
                (Some(a), Some(b)) => assert!((a.distance - b.distance).abs() < 1e-3),
                (None, None) => {}
                other => panic!("mismatch: {other:?}"),
            }
        }
    }
}
