//! Spatial queries over the mirror catalog.
//!
//! Tree building asks, per camera, which mirrors can overlap its frustum. The
//! answer only has to be conservative: reporting a mirror that turns out to be
//! invisible costs one clip, missing a visible mirror loses a reflection.

use glam::Vec3;

use crate::aabb::{Aabb, FrustumStatus};
use crate::mirror::MirrorPolygon;
use crate::plane::Frustum;

/// Answers which mirrors may overlap a frustum.
pub trait SpatialIndex {
    /// Sets `visible[id] = true` for every mirror that may intersect
    /// `frustum`. Entries for other mirrors are left untouched.
    fn query(&self, frustum: &Frustum, visible: &mut [bool]);
}

#[derive(Clone, Copy, Debug)]
struct Triangle {
    bounds: Aabb,
    center: Vec3,
    source: usize,
}

#[derive(Clone, Copy, Debug)]
enum BvhNode {
    /// Holds a single triangle of mirror `source`.
    Leaf { bounds: Aabb, source: usize },
    /// Children live at `left` and `left + 1`.
    Branch { bounds: Aabb, left: usize },
}

impl BvhNode {
    fn bounds(&self) -> &Aabb {
        match self {
            Self::Leaf { bounds, .. } | Self::Branch { bounds, .. } => bounds,
        }
    }
}

/// Bounding volume hierarchy over fan-triangulated mirror polygons.
///
/// Each leaf holds one triangle and remembers the mirror it came from.
/// Branches split their triangles at the middle of their widest axis.
#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
}

impl Bvh {
    /// Builds the hierarchy. Mirror ids are positions in `mirrors`.
    pub fn build(mirrors: &[MirrorPolygon]) -> Self {
        let triangles: Vec<Triangle> = mirrors
            .iter()
            .enumerate()
            .flat_map(|(source, mirror)| {
                let v = mirror.vertices();
                (1..v.len() - 1).map(move |i| {
                    let bounds = Aabb::from_points(&[v[0], v[i], v[i + 1]]);
                    Triangle {
                        bounds,
                        center: bounds.center(),
                        source,
                    }
                })
            })
            .collect();

        if triangles.is_empty() {
            return Self::default();
        }

        let mut ids: Vec<usize> = (0..triangles.len()).collect();
        let mut nodes = Vec::with_capacity(2 * triangles.len() - 1);
        nodes.push(BvhNode::Branch {
            bounds: bounds_of(&triangles, &ids),
            left: 0,
        });
        build_node(&triangles, &mut ids, 0, &mut nodes);

        log::debug!(
            "built mirror bvh: {} triangles, {} nodes",
            triangles.len(),
            nodes.len()
        );
        Self { nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounds of every mirror in the hierarchy, or `None` when it is empty.
    pub fn bounds(&self) -> Option<Aabb> {
        self.nodes.first().map(|n| *n.bounds())
    }
}

fn bounds_of(triangles: &[Triangle], ids: &[usize]) -> Aabb {
    ids.iter()
        .fold(Aabb::EMPTY, |b, &id| b.expand(triangles[id].bounds))
}

fn build_node(triangles: &[Triangle], ids: &mut [usize], node: usize, nodes: &mut Vec<BvhNode>) {
    let bounds = *nodes[node].bounds();
    if let [id] = ids {
        nodes[node] = BvhNode::Leaf {
            bounds,
            source: triangles[*id].source,
        };
        return;
    }

    let extents = bounds.extents();
    let axis = if extents.y > extents.x.max(extents.z) {
        1
    } else if extents.z > extents.x.max(extents.y) {
        2
    } else {
        0
    };
    let mid = bounds.center()[axis];

    let mut split = partition(ids, |id| triangles[id].center[axis] < mid);
    if split == 0 || split == ids.len() {
        // every center fell on one side: interleave into two halves instead
        split = halve(ids);
    }

    let (left_ids, right_ids) = ids.split_at_mut(split);
    let left = nodes.len();
    nodes.push(BvhNode::Branch {
        bounds: bounds_of(triangles, left_ids),
        left: 0,
    });
    nodes.push(BvhNode::Branch {
        bounds: bounds_of(triangles, right_ids),
        left: 0,
    });
    nodes[node] = BvhNode::Branch { bounds, left };

    build_node(triangles, left_ids, left, nodes);
    build_node(triangles, right_ids, left + 1, nodes);
}

/// Moves ids matching `pred` to the front. Returns how many matched.
fn partition(ids: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut split = 0;
    for i in 0..ids.len() {
        if pred(ids[i]) {
            ids.swap(i, split);
            split += 1;
        }
    }
    split
}

/// Swaps odd positions of the front half with their mirrored positions in
/// the back half, so both halves sample the whole range. Returns the size of
/// the front half.
fn halve(ids: &mut [usize]) -> usize {
    let (mut lo, mut hi) = (0, ids.len() - 1);
    while lo < hi {
        if lo & 1 != 0 {
            ids.swap(lo, hi);
        }
        lo += 1;
        hi -= 1;
    }
    lo
}

impl SpatialIndex for Bvh {
    fn query(&self, frustum: &Frustum, visible: &mut [bool]) {
        let Some(root) = self.nodes.first() else {
            return;
        };
        let status = root.bounds().classify(frustum);
        if status == FrustumStatus::Outside {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push((0usize, status));
        while let Some((index, status)) = stack.pop() {
            match self.nodes[index] {
                BvhNode::Leaf { source, .. } => {
                    if let Some(flag) = visible.get_mut(source) {
                        *flag = true;
                    }
                }
                BvhNode::Branch { left, .. } => {
                    for child in [left, left + 1] {
                        // a box fully inside keeps its children inside
                        let child_status = if status == FrustumStatus::Inside {
                            status
                        } else {
                            self.nodes[child].bounds().classify(frustum)
                        };
                        if child_status != FrustumStatus::Outside {
                            stack.push((child, child_status));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::Plane;

    /// Unit square mirror facing +z, centered at `x` on the x axis.
    fn mirror_at(x: f32) -> MirrorPolygon {
        MirrorPolygon::new(&[
            Vec3::new(x - 0.5, -0.5, 0.0),
            Vec3::new(x - 0.5, 0.5, 0.0),
            Vec3::new(x + 0.5, 0.5, 0.0),
            Vec3::new(x + 0.5, -0.5, 0.0),
        ])
        .unwrap()
    }

    fn x_range(lo: f32, hi: f32) -> Frustum {
        Frustum::from_planes(&[Plane::new(Vec3::X, -lo), Plane::new(-Vec3::X, hi)])
    }

    #[test]
    fn test_node_count() {
        let mirrors: Vec<_> = (0..5).map(|i| mirror_at(i as f32 * 3.0)).collect();
        let bvh = Bvh::build(&mirrors);
        // 10 triangles, one leaf each
        assert_eq!(bvh.node_count(), 2 * 10 - 1);
    }

    #[test]
    fn test_query_selects_overlapping_mirrors() {
        let mirrors: Vec<_> = (0..5).map(|i| mirror_at(i as f32 * 3.0)).collect();
        let bvh = Bvh::build(&mirrors);
        let mut visible = vec![false; mirrors.len()];
        bvh.query(&x_range(2.0, 7.0), &mut visible);
        assert_eq!(visible, vec![false, true, true, false, false]);
    }

    #[test]
    fn test_inside_query_marks_everything() {
        let mirrors: Vec<_> = (0..4).map(|i| mirror_at(i as f32 * 2.0)).collect();
        let bvh = Bvh::build(&mirrors);
        let mut visible = vec![false; mirrors.len()];
        bvh.query(&x_range(-100.0, 100.0), &mut visible);
        assert!(visible.iter().all(|v| *v));
    }

    #[test]
    fn test_coincident_centers_still_split() {
        // identical mirrors put every center on the same side of the split
        let mirrors = vec![mirror_at(0.0); 3];
        let bvh = Bvh::build(&mirrors);
        assert_eq!(bvh.node_count(), 2 * 6 - 1);

        let mut visible = vec![false; 3];
        bvh.query(&x_range(-1.0, 1.0), &mut visible);
        assert_eq!(visible, vec![true; 3]);
    }

    #[test]
    fn test_empty_bvh() {
        let bvh = Bvh::build(&[]);
        assert!(bvh.is_empty());
        assert!(bvh.bounds().is_none());
        let mut visible: Vec<bool> = Vec::new();
        bvh.query(&Frustum::new(), &mut visible);
    }

    #[test]
    fn test_halve_interleaves() {
        let mut ids = [0, 1, 2, 3, 4, 5];
        let split = halve(&mut ids);
        assert_eq!(split, 3);
        assert_eq!(ids, [0, 4, 2, 3, 1, 5]);
    }
}
