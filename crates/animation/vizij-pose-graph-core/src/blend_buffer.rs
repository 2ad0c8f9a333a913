//! Accumulation of per-bone pose contributions and layer compositing.
//!
//! Pose evaluators push weighted transforms while a layer is open. Closing the
//! layer folds its weighted average into the running result according to the
//! layer's blending mode. [`BlendBuffer::apply`] is the only place the skeleton
//! is written.

use crate::graph::LayerBlending;
use crate::math::{normalize_quat, Transform};
use crate::skeleton::Skeleton;

/// Weighted sums for one bone within the open layer.
/// Rotations are summed as raw quaternions (hemisphere-aligned) and normalized when folded.
#[derive(Clone, Debug)]
struct LayerAccum {
    t_sum: [f32; 3],
    r_sum: [f32; 4],
    s_sum: [f32; 3],
    w: f32,
}

impl LayerAccum {
    const EMPTY: LayerAccum = LayerAccum {
        t_sum: [0.0; 3],
        r_sum: [0.0; 4],
        s_sum: [0.0; 3],
        w: 0.0,
    };

    fn add(&mut self, value: &Transform, w: f32) {
        for i in 0..3 {
            self.t_sum[i] += value.translation[i] * w;
            self.s_sum[i] += value.scale[i] * w;
        }
        let q = value.rotation;
        let dot = self.r_sum[0] * q[0] + self.r_sum[1] * q[1] + self.r_sum[2] * q[2] + self.r_sum[3] * q[3];
        let sign = if dot < 0.0 { -1.0 } else { 1.0 };
        for i in 0..4 {
            self.r_sum[i] += q[i] * w * sign;
        }
        self.w += w;
    }

    fn average(&self) -> Option<Transform> {
        if self.w <= 0.0 {
            return None;
        }
        let w = self.w;
        Some(Transform {
            translation: [self.t_sum[0] / w, self.t_sum[1] / w, self.t_sum[2] / w],
            rotation: normalize_quat([
                self.r_sum[0] / w,
                self.r_sum[1] / w,
                self.r_sum[2] / w,
                self.r_sum[3] / w,
            ]),
            scale: [self.s_sum[0] / w, self.s_sum[1] / w, self.s_sum[2] / w],
        })
    }
}

/// Shared blend accumulator, sized to one skeleton.
#[derive(Clone, Debug)]
pub struct BlendBuffer {
    bind: Vec<Transform>,
    layer: Vec<LayerAccum>,
    touched_in_layer: Vec<usize>,
    result: Vec<Option<Transform>>,
    blending: LayerBlending,
    open: bool,
}

impl BlendBuffer {
    pub fn new(skeleton: &Skeleton) -> Self {
        let n = skeleton.len();
        Self {
            bind: skeleton.bones().iter().map(|b| b.bind).collect(),
            layer: vec![LayerAccum::EMPTY; n],
            touched_in_layer: Vec::new(),
            result: vec![None; n],
            blending: LayerBlending::Override,
            open: false,
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bind.len()
    }

    /// Start collecting contributions for a layer.
    pub fn begin_layer(&mut self, blending: LayerBlending) {
        if self.open {
            self.end_layer();
        }
        self.blending = blending;
        self.open = true;
    }

    /// Add a weighted contribution for `bone`. Non-positive weights are ignored.
    pub fn add(&mut self, bone: usize, value: &Transform, weight: f32) {
        if weight <= 0.0 || bone >= self.layer.len() {
            return;
        }
        let accum = &mut self.layer[bone];
        if accum.w <= 0.0 {
            self.touched_in_layer.push(bone);
        }
        accum.add(value, weight);
    }

    /// Fold the open layer into the running result.
    pub fn end_layer(&mut self) {
        for bone in self.touched_in_layer.drain(..) {
            let accum = std::mem::replace(&mut self.layer[bone], LayerAccum::EMPTY);
            let Some(average) = accum.average() else {
                continue;
            };
            let t = accum.w.min(1.0);
            let previous = self.result[bone].unwrap_or(self.bind[bone]);
            let next = match self.blending {
                LayerBlending::Override => previous.lerp(&average, t),
                LayerBlending::Additive => previous.add_delta(&average, &self.bind[bone], t),
            };
            self.result[bone] = Some(next);
        }
        self.open = false;
    }

    /// Composed value for `bone`, if any layer touched it since the last apply.
    pub fn pending(&self, bone: usize) -> Option<&Transform> {
        self.result.get(bone).and_then(Option::as_ref)
    }

    /// Write every touched bone into the skeleton and clear the buffer.
    pub fn apply(&mut self, skeleton: &mut Skeleton) {
        if self.open {
            self.end_layer();
        }
        for (bone, slot) in self.result.iter_mut().enumerate() {
            if let Some(value) = slot.take() {
                skeleton.set_local(bone, value);
            }
        }
    }
}
