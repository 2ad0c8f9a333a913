//! Clip sampling: the primitive that turns a clip reference plus local time into
//! bone transforms.
//!
//! Model:
//! - A clip exposes a duration (seconds) and a list of channels, one per bone.
//! - [`TransformClip`] keys translation/rotation/scale per channel at absolute times.
//!   Sampling lerps translation/scale and slerps rotation between neighbours.
//! - Wrapping (loop vs. clamp) belongs to the clip via [`WrapMode`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Transform;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapMode {
    #[default]
    Loop,
    Once,
}

/// Clip contract consumed by clip pose evaluators.
pub trait ClipSampler: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Clip length in seconds.
    fn duration(&self) -> f32;

    fn wrap_mode(&self) -> WrapMode {
        WrapMode::Loop
    }

    /// Bone names animated by this clip; the position is the channel index.
    fn channels(&self) -> Vec<&str>;

    fn sample(&self, channel: usize, time: f32) -> Transform;

    /// Map unbounded local time into the clip domain.
    fn wrap_time(&self, time: f32) -> f32 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        match self.wrap_mode() {
            WrapMode::Once => time.clamp(0.0, duration),
            WrapMode::Loop => {
                let m = time % duration;
                if m < 0.0 {
                    m + duration
                } else {
                    m
                }
            }
        }
    }
}

/// One keyframe of a bone channel.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformKey {
    pub time: f32,
    #[serde(flatten)]
    pub transform: Transform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub bone: String,
    pub keys: Vec<TransformKey>,
}

/// Keyframed TRS clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformClip {
    pub name: String,
    pub duration: f32,
    #[serde(default)]
    pub wrap: WrapMode,
    #[serde(default)]
    pub tracks: Vec<BoneTrack>,
}

impl TransformClip {
    pub fn new(name: &str, duration: f32) -> Self {
        Self {
            name: name.to_string(),
            duration,
            wrap: WrapMode::Loop,
            tracks: Vec::new(),
        }
    }

    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    /// Add a track; keys are sorted by time.
    pub fn with_track(mut self, bone: &str, mut keys: Vec<TransformKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.tracks.push(BoneTrack {
            bone: bone.to_string(),
            keys,
        });
        self
    }

    /// Validate basic invariants (positive duration, non-decreasing key times).
    pub fn validate_basic(&self) -> Result<(), String> {
        if self.duration.is_nan() || self.duration <= 0.0 {
            return Err(format!("clip '{}' duration must be > 0", self.name));
        }
        for track in &self.tracks {
            let mut last = -f32::INFINITY;
            for key in &track.keys {
                if !key.time.is_finite() || key.time < last {
                    return Err(format!(
                        "clip '{}' keys for '{}' must be finite and non-decreasing",
                        self.name, track.bone
                    ));
                }
                last = key.time;
            }
        }
        Ok(())
    }
}

/// Find the keys around `time`: (i, i+1, local_t). Edges return (k, k, 0).
fn find_segment(keys: &[TransformKey], time: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n <= 1 || !time.is_finite() || time <= keys[0].time {
        return (0, 0, 0.0);
    }
    if time >= keys[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // First key strictly after `time`; the guard above keeps it in 1..n.
    let hi = keys.partition_point(|k| k.time <= time);
    let lo = hi - 1;
    let span = (keys[hi].time - keys[lo].time).max(f32::EPSILON);
    let lt = ((time - keys[lo].time) / span).clamp(0.0, 1.0);
    (lo, hi, lt)
}

impl ClipSampler for TransformClip {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration(&self) -> f32 {
        self.duration
    }

    fn wrap_mode(&self) -> WrapMode {
        self.wrap
    }

    fn channels(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.bone.as_str()).collect()
    }

    fn sample(&self, channel: usize, time: f32) -> Transform {
        let Some(track) = self.tracks.get(channel) else {
            return Transform::IDENTITY;
        };
        if track.keys.is_empty() {
            return Transform::IDENTITY;
        }
        let (i0, i1, lt) = find_segment(&track.keys, time);
        if i0 == i1 {
            return track.keys[i0].transform;
        }
        track.keys[i0].transform.lerp(&track.keys[i1].transform, lt)
    }
}
