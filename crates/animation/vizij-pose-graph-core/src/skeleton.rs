//! Skeleton targets and per-layer bone masks.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::math::Transform;

/// A named joint with its bind pose and current local pose.
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub bind: Transform,
    pub local: Transform,
}

/// The transform sink a pose graph evaluator drives. Bone indices are dense.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    index: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bone; its current pose starts at the bind pose.
    /// Re-adding an existing name replaces its bind pose and returns the old index.
    pub fn add_bone(&mut self, name: &str, parent: Option<usize>, bind: Transform) -> usize {
        if let Some(&idx) = self.index.get(name) {
            let bone = &mut self.bones[idx];
            bone.parent = parent;
            bone.bind = bind;
            bone.local = bind;
            return idx;
        }
        let idx = self.bones.len();
        self.bones.push(Bone {
            name: name.to_string(),
            parent,
            bind,
            local: bind,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Convenience builder used by tests and hosts with flat rigs.
    pub fn with_bones<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut skeleton = Self::new();
        for name in names {
            skeleton.add_bone(name, None, Transform::IDENTITY);
        }
        skeleton
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn bone(&self, idx: usize) -> Option<&Bone> {
        self.bones.get(idx)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// Current local transform of the named bone.
    pub fn local(&self, name: &str) -> Option<&Transform> {
        self.find(name).map(|i| &self.bones[i].local)
    }

    pub(crate) fn set_local(&mut self, idx: usize, transform: Transform) {
        if let Some(bone) = self.bones.get_mut(idx) {
            bone.local = transform;
        }
    }

    /// Snap every bone back to its bind pose.
    pub fn reset_to_bind(&mut self) {
        for bone in &mut self.bones {
            bone.local = bone.bind;
        }
    }
}

/// Per-bone enable flags. Bones not listed are enabled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SkeletonMask {
    #[serde(default)]
    pub joints: Vec<MaskJoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskJoint {
    pub path: String,
    pub enabled: bool,
}

impl SkeletonMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag for `path`, replacing an earlier entry.
    pub fn set(&mut self, path: &str, enabled: bool) -> &mut Self {
        match self.joints.iter_mut().find(|j| j.path == path) {
            Some(joint) => joint.enabled = enabled,
            None => self.joints.push(MaskJoint {
                path: path.to_string(),
                enabled,
            }),
        }
        self
    }

    pub fn is_enabled(&self, path: &str) -> bool {
        self.joints
            .iter()
            .find(|j| j.path == path)
            .map_or(true, |j| j.enabled)
    }
}
