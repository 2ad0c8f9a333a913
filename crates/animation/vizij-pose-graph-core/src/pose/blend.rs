//! Blend poses: several child poses mixed by weight.
//!
//! - [`PoseBlendDirect`]: author weights per child (each bindable), normalized by their sum.
//! - [`PoseBlend1D`]: a scalar parameter picks the two children whose thresholds
//!   bracket it and cross-fades linearly between them.

use log::warn;

use super::{Pose, PoseEval, PoseEvalContext, Poseable};
use crate::binding::{BindingHost, BindingPoint, Bindings};
use crate::blend_buffer::BlendBuffer;

/// Children mixed with explicit weights.
#[derive(Clone, Debug, Default)]
pub struct PoseBlendDirect {
    pub children: Vec<(Option<Pose>, f32)>,
    bindings: Bindings,
}

impl PoseBlendDirect {
    pub fn new(children: Vec<(Option<Pose>, f32)>) -> Self {
        Self {
            children,
            bindings: Bindings::new(),
        }
    }
}

impl BindingHost for PoseBlendDirect {
    fn host_name(&self) -> &'static str {
        "PoseBlendDirect"
    }

    fn accepts(&self, point: BindingPoint) -> bool {
        matches!(point, BindingPoint::Weight(i) if i < self.children.len())
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

impl Poseable for PoseBlendDirect {
    fn create_eval(&self, ctx: &PoseEvalContext<'_>) -> Option<Box<dyn PoseEval>> {
        let child_ctx = ctx.child();
        let children = self
            .children
            .iter()
            .map(|(pose, _)| pose.as_ref().and_then(|p| p.create_eval(&child_ctx)))
            .collect();
        let weights = self.children.iter().map(|(_, w)| *w).collect();
        let mut eval = BlendEval::new(children, BlendWeights::Direct(weights), ctx.speed);
        eval.refresh_weights();
        Some(Box::new(eval))
    }
}

/// Children placed on a 1D parameter line.
#[derive(Clone, Debug, Default)]
pub struct PoseBlend1D {
    /// (pose, threshold) pairs, in any order.
    pub children: Vec<(Option<Pose>, f32)>,
    pub param: f32,
    bindings: Bindings,
}

impl PoseBlend1D {
    pub fn new(children: Vec<(Option<Pose>, f32)>, param: f32) -> Self {
        Self {
            children,
            param,
            bindings: Bindings::new(),
        }
    }
}

impl BindingHost for PoseBlend1D {
    fn host_name(&self) -> &'static str {
        "PoseBlend1D"
    }

    fn accepts(&self, point: BindingPoint) -> bool {
        point == BindingPoint::Param
    }

    fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }
}

impl Poseable for PoseBlend1D {
    fn create_eval(&self, ctx: &PoseEvalContext<'_>) -> Option<Box<dyn PoseEval>> {
        let child_ctx = ctx.child();
        // Children are kept in authored order so binding paths stay valid;
        // `order` sorts them by threshold.
        let children = self
            .children
            .iter()
            .map(|(pose, _)| pose.as_ref().and_then(|p| p.create_eval(&child_ctx)))
            .collect();
        let thresholds: Vec<f32> = self.children.iter().map(|(_, t)| *t).collect();
        let mut order: Vec<usize> = (0..thresholds.len()).collect();
        order.sort_by(|&a, &b| thresholds[a].total_cmp(&thresholds[b]));
        let mut eval = BlendEval::new(
            children,
            BlendWeights::Linear1D {
                thresholds,
                order,
                param: self.param,
            },
            ctx.speed,
        );
        eval.refresh_weights();
        Some(Box::new(eval))
    }
}

#[derive(Clone, Debug)]
enum BlendWeights {
    Direct(Vec<f32>),
    Linear1D {
        thresholds: Vec<f32>,
        order: Vec<usize>,
        param: f32,
    },
}

impl BlendWeights {
    /// Normalized child weights (sum 1, or all zero).
    fn compute(&self, out: &mut [f32]) {
        out.iter_mut().for_each(|w| *w = 0.0);
        match self {
            BlendWeights::Direct(weights) => {
                let sum: f32 = weights.iter().map(|w| w.max(0.0)).sum();
                if sum <= 0.0 {
                    return;
                }
                for (o, w) in out.iter_mut().zip(weights) {
                    *o = w.max(0.0) / sum;
                }
            }
            BlendWeights::Linear1D {
                thresholds,
                order,
                param,
            } => {
                let (Some(&first), Some(&last)) = (order.first(), order.last()) else {
                    return;
                };
                if *param <= thresholds[first] {
                    out[first] = 1.0;
                    return;
                }
                if *param >= thresholds[last] {
                    out[last] = 1.0;
                    return;
                }
                for pair in order.windows(2) {
                    let (lo, hi) = (pair[0], pair[1]);
                    if *param >= thresholds[lo] && *param < thresholds[hi] {
                        let span = thresholds[hi] - thresholds[lo];
                        let r = if span <= 0.0 {
                            1.0
                        } else {
                            (*param - thresholds[lo]) / span
                        };
                        out[lo] = 1.0 - r;
                        out[hi] = r;
                        return;
                    }
                }
            }
        }
    }
}

/// Runtime blend of child evaluators.
#[derive(Debug)]
struct BlendEval {
    children: Vec<Option<Box<dyn PoseEval>>>,
    weights: BlendWeights,
    normalized: Vec<f32>,
    base_weight: f32,
    speed: f32,
}

impl BlendEval {
    fn new(children: Vec<Option<Box<dyn PoseEval>>>, weights: BlendWeights, speed: f32) -> Self {
        let n = children.len();
        Self {
            children,
            weights,
            normalized: vec![0.0; n],
            base_weight: 1.0,
            speed,
        }
    }

    fn refresh_weights(&mut self) {
        self.weights.compute(&mut self.normalized);
        for (child, w) in self.children.iter_mut().zip(&self.normalized) {
            if let Some(child) = child {
                child.set_base_weight(self.base_weight * w);
            }
        }
    }

    /// Weighted mean of a per-child quantity; uniform when no child carries weight.
    fn weighted_mean(&self, f: impl Fn(&dyn PoseEval) -> f32) -> f32 {
        let mut sum = 0.0;
        let mut total = 0.0;
        for (child, w) in self.children.iter().zip(&self.normalized) {
            if let Some(child) = child {
                sum += f(child.as_ref()) * w;
                total += w;
            }
        }
        if total > 0.0 {
            return sum / total;
        }
        let live: Vec<f32> = self.children.iter().flatten().map(|c| f(c.as_ref())).collect();
        if live.is_empty() {
            0.0
        } else {
            live.iter().sum::<f32>() / live.len() as f32
        }
    }
}

impl PoseEval for BlendEval {
    fn duration(&self) -> f32 {
        self.weighted_mean(|c| c.duration())
    }

    fn progress(&self) -> f32 {
        if self.children.iter().all(Option::is_none) {
            return 1.0;
        }
        self.weighted_mean(|c| c.progress())
    }

    fn active(&mut self) {
        for child in self.children.iter_mut().flatten() {
            child.active();
        }
    }

    fn inactive(&mut self) {
        for child in self.children.iter_mut().flatten() {
            child.inactive();
        }
    }

    fn set_base_weight(&mut self, weight: f32) {
        self.base_weight = weight;
        self.refresh_weights();
    }

    fn base_weight(&self) -> f32 {
        self.base_weight
    }

    fn set_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!("blend: ignoring non-finite speed {speed}");
            return;
        }
        self.speed = speed;
    }

    fn update(&mut self, dt: f32) {
        let scaled = dt * self.speed;
        for child in self.children.iter_mut().flatten() {
            child.update(scaled);
        }
    }

    fn sample(&self, buffer: &mut BlendBuffer) {
        if self.base_weight <= 0.0 {
            return;
        }
        for child in self.children.iter().flatten() {
            child.sample(buffer);
        }
    }

    fn set_param(&mut self, path: &[usize], point: BindingPoint, value: f32) {
        if let Some((&head, rest)) = path.split_first() {
            if let Some(Some(child)) = self.children.get_mut(head) {
                child.set_param(rest, point, value);
            }
            return;
        }
        match (&mut self.weights, point) {
            (BlendWeights::Direct(weights), BindingPoint::Weight(i)) => {
                if let Some(w) = weights.get_mut(i) {
                    *w = value;
                }
            }
            (BlendWeights::Linear1D { param, .. }, BindingPoint::Param) => *param = value,
            _ => return,
        }
        self.refresh_weights();
    }
}
