//! Edge-by-edge Sutherland-Hodgman clipping.

use glam::Vec3;

use super::{intersect, ClipPolygon, PolygonClipper, MAX_CLIP_VERTICES};
use crate::plane::Plane;

/// Sutherland-Hodgman clipper that scans each edge in turn.
///
/// Per plane, with `prev` the vertex before `curr`:
///
/// - `curr` inside, `prev` outside: emit the crossing, then `curr`.
/// - `curr` outside, `prev` inside: emit only the crossing.
/// - `curr` on the plane (within epsilon): emit `curr`.
///
/// A convex polygon enters a half-space at most once. If numerical noise
/// makes it enter a second time, the second crossing replaces the last
/// emitted vertex instead of growing the polygon.
#[derive(Clone, Copy, Debug)]
pub struct ScalarClipper {
    epsilon: f32,
}

impl ScalarClipper {
    pub fn new(epsilon: f32) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for ScalarClipper {
    fn default() -> Self {
        Self::new(super::DEFAULT_CLIP_EPSILON)
    }
}

impl PolygonClipper for ScalarClipper {
    fn clip(&self, polygon: &mut ClipPolygon, planes: &[Plane]) {
        let mut distances = [0.0f32; MAX_CLIP_VERTICES];
        let mut output = ClipPolygon::new();

        for plane in planes {
            if !polygon.is_polygon() {
                break;
            }
            for (d, v) in distances.iter_mut().zip(polygon.iter()) {
                *d = plane.distance(*v);
            }
            clip_against_plane(
                polygon.as_slice(),
                &distances[..polygon.len()],
                self.epsilon,
                &mut output,
            );
            std::mem::swap(polygon, &mut output);
        }
    }
}

/// Clips `input` against a single plane into `output`, given each vertex's
/// signed distance to that plane.
pub(crate) fn clip_against_plane(
    input: &[Vec3],
    distances: &[f32],
    epsilon: f32,
    output: &mut ClipPolygon,
) {
    output.clear();
    let Some(mut prev) = input.len().checked_sub(1) else {
        return;
    };

    let mut entering_cuts = 0u32;
    for curr in 0..input.len() {
        let d_curr = distances[curr];
        let d_prev = distances[prev];

        if d_curr > epsilon {
            if d_prev < -epsilon {
                let crossing = intersect(input[prev], input[curr], d_prev, d_curr);
                entering_cuts += 1;
                if entering_cuts == 1 {
                    output.push(crossing);
                } else {
                    output.replace_last(crossing);
                }
            }
            output.push(input[curr]);
        } else if d_curr < -epsilon {
            if d_prev > epsilon {
                output.push(intersect(input[prev], input[curr], d_prev, d_curr));
            }
        } else {
            output.push(input[curr]);
        }

        prev = curr;
    }
}
