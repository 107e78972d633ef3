//! The per-frame tree of mirror cameras.
//!
//! Every visible mirror seen by a camera spawns a child camera that looks at
//! the world reflected across the mirror plane. Nodes are stored depth-first
//! in one flat array, and each node records `sibling_index`: the index one
//! past its last descendant. Node `i` therefore owns the half-open range
//! `i + 1..sibling_index`, and the ranges nest like brackets. Drawing relies
//! on this to balance stencil marks and unmarks.
//!
//! The tree is rebuilt from scratch every frame. Its storage, and the scratch
//! buffers used while building it, are kept between frames.
//!
//! # Example
//!
//! ```
//! use speculum::{CameraNode, Mat4, MirrorCatalog, MirrorConfig, MirrorTree, Vec3};
//!
//! let catalog = MirrorCatalog::from_polygons(&[[
//!     Vec3::new(-1.0, -1.0, 0.0),
//!     Vec3::new(-1.0, 1.0, 0.0),
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(1.0, -1.0, 0.0),
//! ]])?;
//!
//! let eye = Vec3::new(0.0, 0.0, 5.0);
//! let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
//! let proj = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
//!
//! let mut tree = MirrorTree::new();
//! tree.build(CameraNode::root(view, proj, eye), &catalog, &MirrorConfig::new().max_depth(1))?;
//! assert_eq!(tree.len(), 2);
//! assert!(tree.brackets_well_formed());
//! # Ok::<(), speculum::MirrorError>(())
//! ```

use glam::{Mat4, Vec3, Vec4};
use log::{debug, trace, warn};

use crate::clip::{ClipPolygon, Clipper, PolygonClipper};
use crate::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::frustum;
use crate::mirror::{MirrorCatalog, MirrorPolygon};
use crate::plane::Frustum;
use crate::projection::{eye_space_plane, oblique_near_plane, position_from_view, reflection_matrix};

/// One camera in the mirror tree.
#[derive(Clone, Copy, Debug)]
pub struct CameraNode {
    pub view: Mat4,
    pub projection: Mat4,
    /// `projection * view`.
    pub view_proj: Mat4,
    /// World-space eye position.
    pub position: Vec3,
    /// Planes bounding what this camera can see. Six canonical planes for the
    /// root, near and far plus one plane per clipped mirror edge otherwise.
    pub frustum: Frustum,
    /// Reflection depth. The root is 0.
    pub depth: u32,
    /// Index of the camera that sees this node's mirror.
    pub parent: Option<usize>,
    /// Catalog id of the mirror this camera looks through.
    pub source: Option<usize>,
    /// One past the index of this node's last descendant.
    pub sibling_index: usize,
    /// The mirror polygon clipped to the parent's frustum, in world space.
    /// Empty for the root.
    pub polygon: ClipPolygon,
    /// Tint of the source mirror.
    pub tint: Vec4,
}

impl CameraNode {
    /// Creates the root camera from the main view.
    pub fn root(view: Mat4, projection: Mat4, position: Vec3) -> Self {
        let view_proj = projection * view;
        Self {
            view,
            projection,
            view_proj,
            position,
            frustum: frustum::from_view_projection(view_proj),
            depth: 0,
            parent: None,
            source: None,
            sibling_index: 1,
            polygon: ClipPolygon::new(),
            tint: Vec4::ZERO,
        }
    }

    /// Creates the camera that sees `parent`'s world reflected in `mirror`.
    ///
    /// `polygon` is the mirror clipped against the parent's frustum. Returns
    /// the node and the number of degenerate edge planes in its frustum.
    fn reflected(
        parent: &CameraNode,
        parent_index: usize,
        source: usize,
        mirror: &MirrorPolygon,
        polygon: ClipPolygon,
    ) -> (Self, usize) {
        let plane = mirror.plane();
        let view = parent.view * reflection_matrix(plane);
        let clip_plane = eye_space_plane(view, plane, mirror.vertices()[0]);
        let projection = oblique_near_plane(parent.projection, clip_plane);
        let view_proj = projection * view;
        let position = position_from_view(view);
        let (frustum, degenerate) = frustum::from_polygon(view_proj, polygon.as_slice(), position);

        let node = Self {
            view,
            projection,
            view_proj,
            position,
            frustum,
            depth: parent.depth + 1,
            parent: Some(parent_index),
            source: Some(source),
            sibling_index: 0,
            polygon,
            tint: mirror.tint_color(),
        };
        (node, degenerate)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Flat, depth-first array of camera nodes.
#[derive(Clone, Debug, Default)]
pub struct MirrorTree {
    nodes: Vec<CameraNode>,
    /// Candidate flags per tree level, reused across frames.
    candidates: Vec<Vec<bool>>,
    degenerate_planes: usize,
}

struct Gather<'a> {
    catalog: &'a MirrorCatalog,
    clipper: Clipper,
    max_depth: u32,
    capacity: usize,
    nodes: &'a mut Vec<CameraNode>,
    candidates: &'a mut Vec<Vec<bool>>,
    degenerate_planes: usize,
}

impl Gather<'_> {
    /// Adds every mirror visible from `parent_index`, depth first.
    fn children_of(&mut self, parent_index: usize) -> Result<()> {
        let level = self.nodes[parent_index].depth as usize;
        if self.candidates.len() <= level {
            self.candidates.resize_with(level + 1, Vec::new);
        }
        let mut candidates = std::mem::take(&mut self.candidates[level]);
        candidates.resize(self.catalog.len(), false);
        self.catalog
            .candidates(&self.nodes[parent_index].frustum, &mut candidates);

        let result = self.visit_candidates(parent_index, &candidates);
        self.candidates[level] = candidates;
        result
    }

    fn visit_candidates(&mut self, parent_index: usize, candidates: &[bool]) -> Result<()> {
        let parent = self.nodes[parent_index];
        for (id, mirror) in self.catalog.iter().enumerate() {
            if !candidates[id] || parent.source == Some(id) {
                continue;
            }
            if !mirror.faces(parent.position) {
                continue;
            }

            let mut polygon = mirror.polygon();
            self.clipper.clip(&mut polygon, parent.frustum.planes());
            if !polygon.is_polygon() {
                continue;
            }

            if self.nodes.len() >= self.capacity {
                return Err(MirrorError::NodeCapacityExceeded {
                    capacity: self.capacity,
                });
            }

            let index = self.nodes.len();
            let (node, degenerate) =
                CameraNode::reflected(&parent, parent_index, id, mirror, polygon);
            self.degenerate_planes += degenerate;
            self.nodes.push(node);
            trace!(
                "camera {index}: depth {}, mirror {id}, parent {parent_index}, {} clipped vertices",
                node.depth,
                polygon.len()
            );

            if node.depth < self.max_depth {
                self.children_of(index)?;
            }
            self.nodes[index].sibling_index = self.nodes.len();
        }
        Ok(())
    }
}

impl MirrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the tree below `root` for the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NodeCapacityExceeded`] when more than
    /// `config.max_nodes` cameras would be needed, and
    /// [`MirrorError::InvalidConfig`] for an invalid `config`. On error the
    /// tree is left empty.
    pub fn build(
        &mut self,
        root: CameraNode,
        catalog: &MirrorCatalog,
        config: &MirrorConfig,
    ) -> Result<()> {
        self.nodes.clear();
        self.degenerate_planes = 0;
        config.validate()?;

        self.nodes.reserve(config.max_nodes);
        self.nodes.push(root);

        let mut gather = Gather {
            catalog,
            clipper: Clipper::new(config.clip_strategy, config.clip_epsilon),
            max_depth: config.max_depth,
            capacity: config.max_nodes,
            nodes: &mut self.nodes,
            candidates: &mut self.candidates,
            degenerate_planes: 0,
        };
        let result = gather.children_of(0);
        let degenerate = gather.degenerate_planes;

        if let Err(err) = result {
            self.nodes.clear();
            return Err(err);
        }

        let len = self.nodes.len();
        self.nodes[0].sibling_index = len;
        self.degenerate_planes = degenerate;

        if degenerate > 0 {
            warn!("mirror tree has {degenerate} degenerate edge planes, they will not cull");
        }
        debug!(
            "mirror tree: {len} cameras, deepest reflection {}",
            self.max_depth_reached()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[CameraNode] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&CameraNode> {
        self.nodes.get(index)
    }

    pub fn root(&self) -> Option<&CameraNode> {
        self.nodes.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraNode> {
        self.nodes.iter()
    }

    /// Degenerate edge planes produced by the last build.
    pub fn degenerate_planes(&self) -> usize {
        self.degenerate_planes
    }

    pub fn max_depth_reached(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Direct children of `index`, in build order.
    pub fn children(&self, index: usize) -> Children<'_> {
        let end = self.nodes.get(index).map_or(0, |n| n.sibling_index);
        Children {
            nodes: &self.nodes,
            next: index + 1,
            end,
        }
    }

    /// Returns true when `node` lies strictly below `ancestor`.
    pub fn is_descendant(&self, node: usize, ancestor: usize) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    /// Checks the depth-first layout the stencil walk depends on.
    ///
    /// For every node `i > 0`: the parent chain reaches the root in exactly
    /// `depth` steps, `i < sibling_index <= len`, and every node in
    /// `i + 1..sibling_index` is a descendant of `i`.
    pub fn brackets_well_formed(&self) -> bool {
        let len = self.nodes.len();
        if len == 0 {
            return true;
        }
        if self.nodes[0].sibling_index != len || !self.nodes[0].is_root() {
            return false;
        }
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            if node.sibling_index <= i || node.sibling_index > len {
                return false;
            }
            if self.chain_length(i) != Some(node.depth) {
                return false;
            }
            if !(i + 1..node.sibling_index).all(|j| self.is_descendant(j, i)) {
                return false;
            }
        }
        true
    }

    /// Steps from `index` to the root, or `None` if the chain is broken.
    fn chain_length(&self, index: usize) -> Option<u32> {
        let mut steps = 0;
        let mut current = index;
        while let Some(parent) = self.nodes[current].parent {
            if parent >= current {
                return None;
            }
            steps += 1;
            current = parent;
        }
        (current == 0).then_some(steps)
    }
}

/// Iterator over the direct children of a node.
pub struct Children<'a> {
    nodes: &'a [CameraNode],
    next: usize,
    end: usize,
}

impl Iterator for Children<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.next >= self.end {
            return None;
        }
        let index = self.next;
        self.next = self.nodes[index].sibling_index;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirror_facing(z: f32, facing: f32) -> [Vec3; 4] {
        // clockwise seen from the side `facing` points to
        let square = [
            Vec3::new(-1.0, -1.0, z),
            Vec3::new(-1.0, 1.0, z),
            Vec3::new(1.0, 1.0, z),
            Vec3::new(1.0, -1.0, z),
        ];
        if facing > 0.0 {
            square
        } else {
            [square[0], square[3], square[2], square[1]]
        }
    }

    fn root_at(eye: Vec3, target: Vec3) -> CameraNode {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(1.2, 1.0, 0.1, 100.0);
        CameraNode::root(view, proj, eye)
    }

    #[test]
    fn test_no_mirrors_gives_root_only() {
        let mut tree = MirrorTree::new();
        let catalog = MirrorCatalog::default();
        tree.build(root_at(Vec3::Z, Vec3::ZERO), &catalog, &MirrorConfig::default())
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().unwrap().sibling_index, 1);
    }

    #[test]
    fn test_child_sees_reflected_eye() {
        let catalog = MirrorCatalog::from_polygons(&[mirror_facing(0.0, 1.0)]).unwrap();
        let mut tree = MirrorTree::new();
        let eye = Vec3::new(0.0, 0.0, 4.0);
        tree.build(root_at(eye, Vec3::ZERO), &catalog, &MirrorConfig::new().max_depth(1))
            .unwrap();

        assert_eq!(tree.len(), 2);
        let child = tree.get(1).unwrap();
        assert!((child.position - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-4);
        assert_eq!(child.frustum.len(), 6);
        assert_eq!(child.source, Some(0));
        assert_eq!(child.sibling_index, 2);
    }

    #[test]
    fn test_backfacing_mirror_is_skipped() {
        let catalog = MirrorCatalog::from_polygons(&[mirror_facing(0.0, -1.0)]).unwrap();
        let mut tree = MirrorTree::new();
        tree.build(
            root_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO),
            &catalog,
            &MirrorConfig::default(),
        )
        .unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_capacity_error_leaves_tree_empty() {
        let catalog = MirrorCatalog::from_polygons(&[
            mirror_facing(-2.0, 1.0),
            mirror_facing(2.0, -1.0),
        ])
        .unwrap();
        let mut tree = MirrorTree::new();
        let err = tree
            .build(
                root_at(Vec3::new(0.2, 0.1, 0.0), Vec3::new(0.0, 0.0, -1.0)),
                &catalog,
                &MirrorConfig::new().max_depth(8).max_nodes(3),
            )
            .unwrap_err();
        assert!(matches!(err, MirrorError::NodeCapacityExceeded { capacity: 3 }));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_children_iterator() {
        let catalog = MirrorCatalog::from_polygons(&[
            mirror_facing(-2.0, 1.0),
            mirror_facing(2.0, -1.0),
        ])
        .unwrap();
        let mut tree = MirrorTree::new();
        // between two facing mirrors, looking along x so both are in view
        let eye = Vec3::new(0.0, 0.0, 0.0);
        let view = Mat4::look_at_rh(eye, Vec3::X, Vec3::Y);
        let proj = Mat4::perspective_rh(3.0, 1.0, 0.01, 100.0);
        tree.build(
            CameraNode::root(view, proj, eye),
            &catalog,
            &MirrorConfig::new().max_depth(2),
        )
        .unwrap();

        let top: Vec<usize> = tree.children(0).collect();
        assert_eq!(top.len(), 2);
        for &child in &top {
            assert_eq!(tree.get(child).unwrap().depth, 1);
            for grandchild in tree.children(child) {
                assert!(tree.is_descendant(grandchild, child));
            }
        }
        assert!(tree.brackets_well_formed());
    }

    #[test]
    fn test_broken_brackets_detected() {
        let catalog = MirrorCatalog::from_polygons(&[mirror_facing(0.0, 1.0)]).unwrap();
        let mut tree = MirrorTree::new();
        tree.build(
            root_at(Vec3::new(0.0, 0.0, 4.0), Vec3::ZERO),
            &catalog,
            &MirrorConfig::new().max_depth(1),
        )
        .unwrap();
        assert!(tree.brackets_well_formed());
        tree.nodes[1].sibling_index = 1;
        assert!(!tree.brackets_well_formed());
    }
}
