//! Whole-polygon clipping with a transition lookup table.
//!
//! A convex polygon cut by one half-space has at most one contiguous run of
//! outside vertices (cyclically). Once the outside bitmask is known, the run's
//! first and last vertex identify the two edges that cross the plane, and the
//! surviving vertices are everything between them. [`ARC_TABLE`] stores the
//! run boundaries for every 8-bit mask so no per-edge scan is needed.
//!
//! Masks that are not a single run can only come from non-convex input or
//! numerical noise. Those planes, and cuts that would overflow the vertex
//! cap, fall back to the scalar scan so both strategies agree.

use glam::{Vec3, Vec4};

use super::scalar::clip_against_plane;
use super::{intersect, ClipPolygon, PolygonClipper, MAX_CLIP_VERTICES};
use crate::plane::Plane;

/// First and last set bit of a mask, its population, and whether the set
/// bits form one contiguous run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ArcEntry {
    first: u8,
    last: u8,
    count: u8,
    contiguous: bool,
}

const fn build_arc_table() -> [ArcEntry; 256] {
    let mut table = [ArcEntry {
        first: 0,
        last: 0,
        count: 0,
        contiguous: false,
    }; 256];
    let mut mask = 1u32;
    while mask < 256 {
        let first = mask.trailing_zeros();
        let last = 31 - mask.leading_zeros();
        let count = mask.count_ones();
        table[mask as usize] = ArcEntry {
            first: first as u8,
            last: last as u8,
            count: count as u8,
            contiguous: last - first + 1 == count,
        };
        mask += 1;
    }
    table
}

static ARC_TABLE: [ArcEntry; 256] = build_arc_table();

/// Clipper that classifies every vertex against a plane in one pass.
///
/// Distances are computed eight lanes at a time from a structure-of-arrays
/// copy of the polygon. The output is the same polygon [`ScalarClipper`]
/// produces, possibly starting from a different vertex.
///
/// [`ScalarClipper`]: super::ScalarClipper
#[derive(Clone, Copy, Debug)]
pub struct WideClipper {
    epsilon: f32,
}

impl WideClipper {
    pub fn new(epsilon: f32) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for WideClipper {
    fn default() -> Self {
        Self::new(super::DEFAULT_CLIP_EPSILON)
    }
}

/// Polygon coordinates split into lanes `0..4` and `4..8`.
struct Lanes {
    xs: [Vec4; 2],
    ys: [Vec4; 2],
    zs: [Vec4; 2],
}

impl Lanes {
    fn load(polygon: &ClipPolygon) -> Self {
        let v = polygon.lanes();
        let half = |i: usize, f: fn(&Vec3) -> f32| {
            Vec4::new(f(&v[i]), f(&v[i + 1]), f(&v[i + 2]), f(&v[i + 3]))
        };
        Self {
            xs: [half(0, |p| p.x), half(4, |p| p.x)],
            ys: [half(0, |p| p.y), half(4, |p| p.y)],
            zs: [half(0, |p| p.z), half(4, |p| p.z)],
        }
    }

    /// Signed distance of all eight lanes to `plane`.
    fn distances(&self, plane: &Plane) -> [Vec4; 2] {
        let n = plane.normal;
        let d = Vec4::splat(plane.d);
        let lane = |i: usize| self.xs[i] * n.x + self.ys[i] * n.y + self.zs[i] * n.z + d;
        [lane(0), lane(1)]
    }
}

/// Bitmasks of the vertices strictly outside and strictly inside a plane.
fn classify(distances: &[Vec4; 2], epsilon: f32, valid: u32) -> (u32, u32) {
    let lo = Vec4::splat(-epsilon);
    let hi = Vec4::splat(epsilon);
    let outside =
        distances[0].cmplt(lo).bitmask() | (distances[1].cmplt(lo).bitmask() << 4);
    let inside = distances[0].cmpgt(hi).bitmask() | (distances[1].cmpgt(hi).bitmask() << 4);
    (outside & valid, inside & valid)
}

/// Finds the cyclic run of outside vertices as `(first, last, count)`.
fn outside_arc(outside: u32, valid: u32, n: usize) -> Option<(usize, usize, usize)> {
    let entry = ARC_TABLE[outside as usize];
    if entry.contiguous {
        return Some((entry.first as usize, entry.last as usize, entry.count as usize));
    }
    // the run wraps past the last vertex, so the kept vertices are contiguous
    let kept = ARC_TABLE[(valid & !outside) as usize];
    if kept.contiguous {
        let first = (kept.last as usize + 1) % n;
        let last = (kept.first as usize + n - 1) % n;
        return Some((first, last, n - kept.count as usize));
    }
    None
}

impl WideClipper {
    fn clip_plane(&self, input: &ClipPolygon, plane: &Plane, output: &mut ClipPolygon) {
        let n = input.len();
        let valid = (1u32 << n) - 1;
        let wide = Lanes::load(input).distances(plane);
        let (outside, inside) = classify(&wide, self.epsilon, valid);

        if outside == 0 {
            *output = *input;
            return;
        }
        if outside == valid {
            output.clear();
            return;
        }

        let mut distances = [0.0f32; MAX_CLIP_VERTICES];
        distances[..4].copy_from_slice(&wide[0].to_array());
        distances[4..].copy_from_slice(&wide[1].to_array());

        let arc = outside_arc(outside, valid, n);
        let Some((first, last, count)) = arc else {
            clip_against_plane(input.as_slice(), &distances[..n], self.epsilon, output);
            return;
        };

        // kept vertices on either side of the outside run
        let exit_from = (first + n - 1) % n;
        let enter_to = (last + 1) % n;
        let exiting = inside & (1 << exit_from) != 0;
        let entering = inside & (1 << enter_to) != 0;

        let out_len = n - count + usize::from(exiting) + usize::from(entering);
        if out_len > MAX_CLIP_VERTICES {
            clip_against_plane(input.as_slice(), &distances[..n], self.epsilon, output);
            return;
        }

        let v = input.as_slice();
        output.clear();
        if entering {
            output.push(intersect(v[last], v[enter_to], distances[last], distances[enter_to]));
        }
        let mut i = enter_to;
        loop {
            output.push(v[i]);
            if i == exit_from {
                break;
            }
            i = (i + 1) % n;
        }
        if exiting {
            output.push(intersect(v[exit_from], v[first], distances[exit_from], distances[first]));
        }
    }
}

impl PolygonClipper for WideClipper {
    fn clip(&self, polygon: &mut ClipPolygon, planes: &[Plane]) {
        let mut output = ClipPolygon::new();
        for plane in planes {
            if !polygon.is_polygon() {
                break;
            }
            self.clip_plane(polygon, plane, &mut output);
            std::mem::swap(polygon, &mut output);
        }
    }
}
