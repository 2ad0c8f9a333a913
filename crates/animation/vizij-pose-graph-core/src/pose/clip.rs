//! Single-clip pose.

use std::sync::Arc;

use log::warn;

use super::{PoseEval, PoseEvalContext, Poseable};
use crate::blend_buffer::BlendBuffer;
use crate::clip::ClipSampler;

/// Plays one clip.
#[derive(Clone, Debug, Default)]
pub struct ClipPose {
    pub clip: Option<Arc<dyn ClipSampler>>,
}

impl ClipPose {
    pub fn new(clip: Arc<dyn ClipSampler>) -> Self {
        Self { clip: Some(clip) }
    }
}

impl Poseable for ClipPose {
    fn create_eval(&self, ctx: &PoseEvalContext<'_>) -> Option<Box<dyn PoseEval>> {
        let clip = self.clip.as_ref()?;
        Some(Box::new(ClipPoseEval::new(ctx, Arc::clone(clip))))
    }
}

/// Runtime playback of a clip against one skeleton.
#[derive(Debug)]
pub(crate) struct ClipPoseEval {
    clip: Arc<dyn ClipSampler>,
    /// (clip channel, skeleton bone) pairs that survived resolution and masking.
    channels: Vec<(usize, usize)>,
    start_time: f32,
    time: f32,
    speed: f32,
    weight: f32,
}

impl ClipPoseEval {
    pub(crate) fn new(ctx: &PoseEvalContext<'_>, clip: Arc<dyn ClipSampler>) -> Self {
        let mut channels = Vec::new();
        for (ch, bone_name) in clip.channels().into_iter().enumerate() {
            if ctx.mask.map_or(false, |m| !m.is_enabled(bone_name)) {
                continue;
            }
            match ctx.skeleton.find(bone_name) {
                Some(bone) => channels.push((ch, bone)),
                None => warn!(
                    "clip '{}' channel '{}' has no matching bone; skipped",
                    clip.name(),
                    bone_name
                ),
            }
        }
        let start_time = ctx.start_ratio * clip.duration();
        Self {
            clip,
            channels,
            start_time,
            time: start_time,
            speed: ctx.speed,
            weight: 1.0,
        }
    }

    fn local_time(&self) -> f32 {
        self.clip.wrap_time(self.time)
    }
}

impl PoseEval for ClipPoseEval {
    fn duration(&self) -> f32 {
        self.clip.duration()
    }

    fn progress(&self) -> f32 {
        let duration = self.clip.duration();
        if duration <= 0.0 {
            return 1.0;
        }
        (self.local_time() / duration).clamp(0.0, 1.0)
    }

    fn active(&mut self) {
        self.time = self.start_time;
    }

    fn inactive(&mut self) {}

    fn set_base_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    fn base_weight(&self) -> f32 {
        self.weight
    }

    fn set_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!("clip '{}': ignoring non-finite speed {speed}", self.clip.name());
            return;
        }
        self.speed = speed;
    }

    fn update(&mut self, dt: f32) {
        let time = self.time + dt * self.speed;
        if time.is_finite() {
            self.time = time;
        }
    }

    fn sample(&self, buffer: &mut BlendBuffer) {
        if self.weight <= 0.0 {
            return;
        }
        let t = self.local_time();
        for &(ch, bone) in &self.channels {
            buffer.add(bone, &self.clip.sample(ch, t), self.weight);
        }
    }
}
