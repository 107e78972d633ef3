//! Sorted per-camera draw lists.
//!
//! Every visible (node, mesh) pair becomes a [`DrawItem`] with a 64-bit sort
//! key. From the least significant bit up, a key holds:
//!
//! | bits | content |
//! |---|---|
//! | 0..32 | node index |
//! | 32..35 | [`ShaderTechnique`] |
//! | 35.. | quantized squared distance to the camera |
//!
//! Opaque items use 10 ascending distance bits (front to back). Alpha items
//! use 14 inverted bits (back to front). Distances saturate at the configured
//! maximum, so far objects collapse into the last bucket.
//!
//! Items live in one buffer split into three contiguous ranges, opaque, then
//! instanced, then alpha, and each range is sorted on its own.

use glam::{Mat4, Vec3, Vec4};

use crate::backend::BlendMode;
use crate::cull::VisibleSet;
use crate::scene::{MeshHandle, SceneView};

/// Shader variants a mesh can be drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShaderTechnique {
    Color3D,
    Color3DSkinned,
    Textured3D,
    Textured3DAlphaClip,
    Textured3DSkinned,
    Textured3DAlphaClipSkinned,
    Instanced3D,
}

impl ShaderTechnique {
    /// Bits a technique occupies in a sort key.
    pub const BITS: u32 = 3;

    pub const ALL: [Self; 7] = [
        Self::Color3D,
        Self::Color3DSkinned,
        Self::Textured3D,
        Self::Textured3DAlphaClip,
        Self::Textured3DSkinned,
        Self::Textured3DAlphaClipSkinned,
        Self::Instanced3D,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Color3D => "Color3D",
            Self::Color3DSkinned => "Color3DSkinned",
            Self::Textured3D => "Textured3D",
            Self::Textured3DAlphaClip => "Textured3DAlphaClip",
            Self::Textured3DSkinned => "Textured3DSkinned",
            Self::Textured3DAlphaClipSkinned => "Textured3DAlphaClipSkinned",
            Self::Instanced3D => "Instanced3D",
        }
    }

    /// Alpha-tested techniques draw with blending even in the opaque bucket.
    pub fn is_alpha_clip(self) -> bool {
        matches!(
            self,
            Self::Textured3DAlphaClip | Self::Textured3DAlphaClipSkinned
        )
    }
}

/// Distance ordering for a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    FrontToBack,
    BackToFront,
}

const NODE_BITS: u32 = 32;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;
const TECHNIQUE_MASK: u64 = (1 << ShaderTechnique::BITS) - 1;
const DISTANCE_SHIFT: u32 = NODE_BITS + ShaderTechnique::BITS;

/// Distance quantization for one bucket.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortParams {
    pub order: SortOrder,
    pub distance_bits: u32,
    pub max_distance_sq: f32,
}

impl SortParams {
    pub fn new(order: SortOrder, max_distance: f32) -> Self {
        let distance_bits = match order {
            SortOrder::FrontToBack => 10,
            SortOrder::BackToFront => 14,
        };
        Self {
            order,
            distance_bits,
            max_distance_sq: max_distance * max_distance,
        }
    }

    fn distance_mask(&self) -> u64 {
        (1 << self.distance_bits) - 1
    }

    /// Quantizes a squared distance into the key's distance field.
    pub fn quantize(&self, distance_sq: f32) -> u64 {
        let max = self.distance_mask();
        let t = (distance_sq / self.max_distance_sq).clamp(0.0, 1.0);
        let q = (max as f32 * t) as u64;
        match self.order {
            SortOrder::FrontToBack => q,
            SortOrder::BackToFront => !q & max,
        }
    }
}

/// Packs a sort key from its fields.
pub fn make_sort_key(
    node: usize,
    technique: ShaderTechnique,
    distance_sq: f32,
    params: &SortParams,
) -> u64 {
    (node as u64 & NODE_MASK)
        | ((technique as u64 & TECHNIQUE_MASK) << NODE_BITS)
        | (params.quantize(distance_sq) << DISTANCE_SHIFT)
}

/// A sort key and the item it orders. Ties on `value` keep insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub value: u64,
    pub idx: u32,
}

impl SortKey {
    #[inline]
    fn rank(&self) -> (u64, u32) {
        (self.value, self.idx)
    }
}

/// Where a draw item's transforms come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawSource {
    /// Index into [`SceneView::draw_nodes`].
    Node(usize),
    /// Index into [`SceneView::instanced_nodes`].
    Instanced(usize),
}

/// One draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawItem {
    pub source: DrawSource,
    pub mesh: MeshHandle,
    pub technique: ShaderTechnique,
    pub blend: BlendMode,
    /// Node transform. Identity for instanced items.
    pub world: Mat4,
    pub color: Vec4,
    /// Instance count, 0 for plain draws.
    pub instances: u32,
}

/// Draw items for one camera, split into sorted ranges.
#[derive(Clone, Debug, Default)]
pub struct Drawlist {
    items: Vec<DrawItem>,
    keys: Vec<SortKey>,
    opaque: usize,
    instanced: usize,
}

impl Drawlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
        self.opaque = 0;
        self.instanced = 0;
    }

    /// Rebuilds the list from the nodes in `visible` and every instanced node
    /// of `scene`, as seen from `camera_pos`.
    pub fn build<S: SceneView + ?Sized>(
        &mut self,
        visible: &VisibleSet,
        camera_pos: Vec3,
        scene: &S,
        max_distance: f32,
    ) {
        self.clear();
        let nodes = scene.draw_nodes();

        let front_to_back = SortParams::new(SortOrder::FrontToBack, max_distance);
        for &n in &visible.nodes {
            let Some(node) = nodes.get(n) else { continue };
            if node.is_transparent() {
                continue;
            }
            let dist_sq = node.position().distance_squared(camera_pos);
            for mesh in &node.meshes {
                let blend = if mesh.technique.is_alpha_clip() {
                    BlendMode::Alpha
                } else {
                    BlendMode::Opaque
                };
                self.push(
                    make_sort_key(n, mesh.technique, dist_sq, &front_to_back),
                    DrawItem {
                        source: DrawSource::Node(n),
                        mesh: mesh.mesh,
                        technique: mesh.technique,
                        blend,
                        world: node.world,
                        color: node.color,
                        instances: 0,
                    },
                );
            }
        }
        self.opaque = self.keys.len();

        for (n, node) in scene.instanced_nodes().iter().enumerate() {
            let count = node.active_instances().len();
            if count == 0 {
                continue;
            }
            let blend = if node.is_transparent() {
                BlendMode::Alpha
            } else {
                BlendMode::Opaque
            };
            for mesh in &node.meshes {
                self.push(
                    make_sort_key(n, mesh.technique, 0.0, &front_to_back),
                    DrawItem {
                        source: DrawSource::Instanced(n),
                        mesh: mesh.mesh,
                        technique: mesh.technique,
                        blend,
                        world: Mat4::IDENTITY,
                        color: node.color,
                        instances: count as u32,
                    },
                );
            }
        }
        self.instanced = self.keys.len() - self.opaque;

        let back_to_front = SortParams::new(SortOrder::BackToFront, max_distance);
        for &n in &visible.nodes {
            let Some(node) = nodes.get(n) else { continue };
            if !node.is_transparent() {
                continue;
            }
            let dist_sq = node.position().distance_squared(camera_pos);
            for mesh in &node.meshes {
                self.push(
                    make_sort_key(n, mesh.technique, dist_sq, &back_to_front),
                    DrawItem {
                        source: DrawSource::Node(n),
                        mesh: mesh.mesh,
                        technique: mesh.technique,
                        blend: BlendMode::Alpha,
                        world: node.world,
                        color: node.color,
                        instances: 0,
                    },
                );
            }
        }

        let (opaque, rest) = self.keys.split_at_mut(self.opaque);
        let (instanced, alpha) = rest.split_at_mut(self.instanced);
        sort_keys(opaque);
        sort_keys(instanced);
        sort_keys(alpha);
    }

    fn push(&mut self, value: u64, item: DrawItem) {
        let idx = self.items.len() as u32;
        self.items.push(item);
        self.keys.push(SortKey { value, idx });
    }

    fn range(&self, start: usize, end: usize) -> impl Iterator<Item = &DrawItem> + '_ {
        self.keys[start..end]
            .iter()
            .map(|k| &self.items[k.idx as usize])
    }

    /// Opaque node items, front to back.
    pub fn opaque(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.range(0, self.opaque)
    }

    /// Instanced items.
    pub fn instanced(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.range(self.opaque, self.opaque + self.instanced)
    }

    /// Transparent node items, back to front.
    pub fn alpha(&self) -> impl Iterator<Item = &DrawItem> + '_ {
        self.range(self.opaque + self.instanced, self.keys.len())
    }

    pub fn opaque_len(&self) -> usize {
        self.opaque
    }

    pub fn instanced_len(&self) -> usize {
        self.instanced
    }

    pub fn alpha_len(&self) -> usize {
        self.keys.len() - self.opaque - self.instanced
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All keys in draw order.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }
}

/// Sorts keys ascending with an in-place quicksort.
///
/// Recurses into the smaller partition and loops on the larger, so stack
/// depth stays logarithmic on already sorted input.
pub fn sort_keys(mut keys: &mut [SortKey]) {
    while keys.len() > 1 {
        let pivot = partition(keys);
        let (left, right) = std::mem::take(&mut keys).split_at_mut(pivot);
        let right = &mut right[1..];
        if left.len() < right.len() {
            sort_keys(left);
            keys = right;
        } else {
            sort_keys(right);
            keys = left;
        }
    }
}

/// Partitions around the first key. Returns the pivot's final position.
fn partition(keys: &mut [SortKey]) -> usize {
    let pivot = keys[0].rank();
    let high = keys.len() - 1;
    let (mut i, mut j) = (0, high);
    while i < j {
        while keys[i].rank() <= pivot && i < high {
            i += 1;
        }
        while keys[j].rank() > pivot && j > 0 {
            j -= 1;
        }
        if i < j {
            keys.swap(i, j);
        }
    }
    keys.swap(0, j);
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{DrawNode, InstancedNode, Scene};

    #[test]
    fn test_key_layout() {
        let params = SortParams::new(SortOrder::FrontToBack, 1000.0);
        let key = make_sort_key(7, ShaderTechnique::Textured3D, 0.0, &params);
        assert_eq!(key & NODE_MASK, 7);
        assert_eq!((key >> NODE_BITS) & TECHNIQUE_MASK, ShaderTechnique::Textured3D as u64);
        assert_eq!(key >> DISTANCE_SHIFT, 0);
    }

    #[test]
    fn test_distance_saturates() {
        let params = SortParams::new(SortOrder::FrontToBack, 10.0);
        assert_eq!(params.quantize(1.0e9), 1023);
        assert_eq!(params.quantize(100.0), 1023);
        assert!(params.quantize(25.0) < 1023);
    }

    #[test]
    fn test_back_to_front_inverts() {
        let params = SortParams::new(SortOrder::BackToFront, 100.0);
        assert!(params.quantize(1.0) > params.quantize(50.0 * 50.0));
        assert_eq!(params.quantize(1.0e9), 0);
    }

    #[test]
    fn test_sort_keys_orders_and_breaks_ties() {
        let values = [5u64, 1, 5, 3, 9, 1, 0, 5];
        let mut keys: Vec<SortKey> = values
            .iter()
            .enumerate()
            .map(|(i, &value)| SortKey { value, idx: i as u32 })
            .collect();
        sort_keys(&mut keys);
        let order: Vec<(u64, u32)> = keys.iter().map(|k| k.rank()).collect();
        assert_eq!(
            order,
            vec![(0, 6), (1, 1), (1, 5), (3, 3), (5, 0), (5, 2), (5, 7), (9, 4)]
        );
    }

    #[test]
    fn test_sort_keys_sorted_input() {
        let mut keys: Vec<SortKey> = (0..500).map(|i| SortKey { value: i, idx: i as u32 }).collect();
        keys.reverse();
        sort_keys(&mut keys);
        assert!(keys.windows(2).all(|w| w[0].rank() < w[1].rank()));
    }

    #[test]
    fn test_buckets_are_contiguous_and_ordered() {
        let mut scene = Scene::new();
        let near = scene.add_node(DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D).at(Vec3::new(0.0, 0.0, -2.0)));
        let far = scene.add_node(DrawNode::new(MeshHandle(1), ShaderTechnique::Color3D).at(Vec3::new(0.0, 0.0, -50.0)));
        let glass_near = scene.add_node(
            DrawNode::new(MeshHandle(2), ShaderTechnique::Color3D)
                .at(Vec3::new(0.0, 0.0, -3.0))
                .color(Vec4::new(1.0, 1.0, 1.0, 0.5)),
        );
        let glass_far = scene.add_node(
            DrawNode::new(MeshHandle(3), ShaderTechnique::Color3D)
                .at(Vec3::new(0.0, 0.0, -40.0))
                .color(Vec4::new(1.0, 1.0, 1.0, 0.5)),
        );
        scene.add_instanced(InstancedNode::new(MeshHandle(4), vec![Mat4::IDENTITY; 2]));

        let visible = VisibleSet {
            nodes: vec![glass_near, far, glass_far, near],
        };
        let mut dl = Drawlist::new();
        dl.build(&visible, Vec3::ZERO, &scene, 1000.0);

        assert_eq!((dl.opaque_len(), dl.instanced_len(), dl.alpha_len()), (2, 1, 2));
        let opaque: Vec<_> = dl.opaque().map(|i| i.source).collect();
        assert_eq!(opaque, vec![DrawSource::Node(near), DrawSource::Node(far)]);
        let alpha: Vec<_> = dl.alpha().map(|i| i.source).collect();
        assert_eq!(alpha, vec![DrawSource::Node(glass_far), DrawSource::Node(glass_near)]);
        assert!(dl.alpha().all(|i| i.blend == BlendMode::Alpha));

        let inst: Vec<_> = dl.instanced().collect();
        assert_eq!(inst[0].instances, 2);
    }

    #[test]
    fn test_one_item_per_mesh() {
        let mut scene = Scene::new();
        let n = scene.add_node(
            DrawNode::new(MeshHandle(0), ShaderTechnique::Color3D)
                .with_mesh(MeshHandle(1), ShaderTechnique::Textured3DAlphaClip),
        );
        let mut dl = Drawlist::new();
        dl.build(&VisibleSet { nodes: vec![n] }, Vec3::new(0.0, 0.0, 5.0), &scene, 1000.0);
        assert_eq!(dl.opaque_len(), 2);
        let clip = dl
            .opaque()
            .find(|i| i.technique == ShaderTechnique::Textured3DAlphaClip)
            .unwrap();
        assert_eq!(clip.blend, BlendMode::Alpha);
    }
}
