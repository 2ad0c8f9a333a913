//! Poses and their runtime evaluators.
//!
//! [`Pose`] is the authored description held by pose nodes. Every variant
//! implements [`Poseable`], which builds the matching [`PoseEval`] for a target
//! skeleton. Pose evaluators own local playback time and write weighted
//! contributions into the shared [`BlendBuffer`] when sampled.

mod blend;
mod clip;

pub use blend::{PoseBlend1D, PoseBlendDirect};
pub use clip::ClipPose;

use std::fmt;

use crate::binding::{BindingHost, BindingPoint};
use crate::blend_buffer::BlendBuffer;
use crate::skeleton::{Skeleton, SkeletonMask};

/// Everything a pose evaluator needs at construction.
#[derive(Clone, Copy, Debug)]
pub struct PoseEvalContext<'a> {
    pub skeleton: &'a Skeleton,
    pub mask: Option<&'a SkeletonMask>,
    pub speed: f32,
    pub start_ratio: f32,
}

impl<'a> PoseEvalContext<'a> {
    pub fn new(skeleton: &'a Skeleton) -> Self {
        Self {
            skeleton,
            mask: None,
            speed: 1.0,
            start_ratio: 0.0,
        }
    }

    /// Context for nested poses: they inherit the skeleton, mask and start
    /// offset, while the playback rate is applied by the parent.
    pub fn child(&self) -> Self {
        Self {
            speed: 1.0,
            ..*self
        }
    }
}

/// Runtime state of one pose.
pub trait PoseEval: fmt::Debug + Send {
    /// Length of one playback cycle in seconds.
    fn duration(&self) -> f32;

    /// Normalized playback position in [0, 1].
    fn progress(&self) -> f32;

    /// The owning node became active; local time rewinds to the start offset.
    fn active(&mut self);

    /// The owning node was left.
    fn inactive(&mut self);

    fn set_base_weight(&mut self, weight: f32);

    fn base_weight(&self) -> f32;

    fn set_speed(&mut self, speed: f32);

    /// Advance local time by `dt * speed`.
    fn update(&mut self, dt: f32);

    /// Push the current pose into `buffer`, scaled by the base weight.
    fn sample(&self, buffer: &mut BlendBuffer);

    /// Route a bound parameter. `path` addresses nested children of blends.
    fn set_param(&mut self, _path: &[usize], _point: BindingPoint, _value: f32) {}
}

/// Capability of building a pose evaluator.
pub trait Poseable {
    /// `None` when there is nothing to play (e.g. a clip pose without a clip).
    fn create_eval(&self, ctx: &PoseEvalContext<'_>) -> Option<Box<dyn PoseEval>>;
}

/// Authored pose variants.
#[derive(Clone, Debug)]
pub enum Pose {
    Clip(ClipPose),
    BlendDirect(PoseBlendDirect),
    Blend1D(PoseBlend1D),
}

impl Pose {
    /// Visit every binding host in this pose tree with its child path.
    pub fn visit_binding_hosts<'a>(
        &'a self,
        path: &mut Vec<usize>,
        f: &mut dyn FnMut(&[usize], &'a dyn BindingHost),
    ) {
        match self {
            Pose::Clip(_) => {}
            Pose::BlendDirect(blend) => {
                f(path.as_slice(), blend);
                for (i, (child, _)) in blend.children.iter().enumerate() {
                    if let Some(child) = child {
                        path.push(i);
                        child.visit_binding_hosts(path, f);
                        path.pop();
                    }
                }
            }
            Pose::Blend1D(blend) => {
                f(path.as_slice(), blend);
                for (i, (child, _)) in blend.children.iter().enumerate() {
                    if let Some(child) = child {
                        path.push(i);
                        child.visit_binding_hosts(path, f);
                        path.pop();
                    }
                }
            }
        }
    }
}

impl Poseable for Pose {
    fn create_eval(&self, ctx: &PoseEvalContext<'_>) -> Option<Box<dyn PoseEval>> {
        match self {
            Pose::Clip(p) => p.create_eval(ctx),
            Pose::BlendDirect(p) => p.create_eval(ctx),
            Pose::Blend1D(p) => p.create_eval(ctx),
        }
    }
}

impl From<ClipPose> for Pose {
    fn from(p: ClipPose) -> Self {
        Pose::Clip(p)
    }
}

impl From<PoseBlendDirect> for Pose {
    fn from(p: PoseBlendDirect) -> Self {
        Pose::BlendDirect(p)
    }
}

impl From<PoseBlend1D> for Pose {
    fn from(p: PoseBlend1D) -> Self {
        Pose::Blend1D(p)
    }
}
