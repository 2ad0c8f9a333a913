//! Runtime evaluation tree: the per-subgraph state machines.
//!
//! All runtime objects live in flat arenas owned by [`EvalTree`] and refer to
//! each other by id. A subgraph evaluator stores its nodes in a vector; a node
//! that hosts a nested subgraph points at another subgraph slot.
//!
//! Per tick a subgraph consumes its delta time in a bounded loop. Each step
//! either advances the transition in flight, begins a new transition, or lets
//! the current node play for the remaining time. Beginning or finishing a
//! transition does not end the tick, so several transitions may complete in
//! one call. Runs of steps that consume no time are capped per subgraph (see
//! [`Config::step_cap`]) so that cycles of zero-duration transitions cannot
//! stall a frame.
//!
//! [`Config::step_cap`]: crate::config::Config::step_cap

use log::{debug, warn};

use crate::blend_buffer::BlendBuffer;
use crate::condition::ConditionEval;
use crate::ids::{ConditionId, PoseEvalId, SubgraphEvalId};
use crate::pose::PoseEval;
use crate::value::Value;

use super::variables::Subscriber;

/// Remaining transition time below which a cross-fade counts as finished.
pub(crate) const COMPLETION_EPSILON: f32 = 1e-5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum NodeEvalKind {
    Entry,
    Exit,
    Any,
    Pose(PoseEvalId),
    Subgraph(SubgraphEvalId),
}

#[derive(Debug)]
pub(crate) struct NodeEval {
    pub(crate) name: String,
    pub(crate) kind: NodeEvalKind,
    /// Outgoing transitions in declaration order.
    pub(crate) outgoing: Vec<TransitionEval>,
}

#[derive(Clone, Debug)]
pub(crate) struct TransitionEval {
    /// Target node index within the owning subgraph.
    pub(crate) to: usize,
    pub(crate) duration: f32,
    pub(crate) condition: Option<ConditionId>,
    pub(crate) exit_condition: Option<f32>,
    /// Time scale applied to the target while fading in.
    pub(crate) target_stretch: f32,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ActiveTransition {
    pub(crate) to: usize,
    pub(crate) duration: f32,
    pub(crate) target_stretch: f32,
    pub(crate) progress: f32,
}

impl ActiveTransition {
    pub(crate) fn ratio(&self) -> f32 {
        if self.duration - self.progress <= COMPLETION_EPSILON {
            1.0
        } else {
            (self.progress / self.duration).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug)]
pub(crate) struct SubgraphEval {
    pub(crate) name: String,
    pub(crate) nodes: Vec<NodeEval>,
    pub(crate) entry: usize,
    pub(crate) exit: usize,
    pub(crate) any: usize,
    pub(crate) current: usize,
    pub(crate) transition: Option<ActiveTransition>,
    /// Weight handed down by the layer or the enclosing subgraph node.
    pub(crate) weight: f32,
    pub(crate) step_cap: usize,
    starvation_reported: bool,
    clamp_reported: bool,
}

impl SubgraphEval {
    pub(crate) fn new(
        name: &str,
        nodes: Vec<NodeEval>,
        entry: usize,
        exit: usize,
        any: usize,
        weight: f32,
        step_cap: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            nodes,
            entry,
            exit,
            any,
            current: entry,
            transition: None,
            weight,
            step_cap,
            starvation_reported: false,
            clamp_reported: false,
        }
    }

    pub(crate) fn exited(&self) -> bool {
        self.current == self.exit
    }
}

#[derive(Debug)]
pub(crate) struct PoseNodeEval {
    pub(crate) pose: Option<Box<dyn PoseEval>>,
}

/// Outcome of one consume step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    /// The current node played for the whole remaining time.
    Idle,
    /// The transition in flight absorbed the whole remaining time.
    Transitioning,
    /// A transition completed; time may remain.
    Finished,
    /// A transition started; no time was consumed.
    Began,
}

#[derive(Debug, Default)]
pub(crate) struct EvalTree {
    subgraphs: Vec<SubgraphEval>,
    poses: Vec<PoseNodeEval>,
    conditions: Vec<ConditionEval>,
    trace: bool,
}

impl EvalTree {
    pub(crate) fn new(trace: bool) -> Self {
        Self {
            trace,
            ..Self::default()
        }
    }

    // --- arena plumbing ---

    pub(crate) fn next_pose_id(&self) -> PoseEvalId {
        PoseEvalId(self.poses.len() as u32)
    }

    pub(crate) fn next_condition_id(&self) -> ConditionId {
        ConditionId(self.conditions.len() as u32)
    }

    pub(crate) fn push_pose(&mut self, pose: PoseNodeEval) -> PoseEvalId {
        let id = self.next_pose_id();
        self.poses.push(pose);
        id
    }

    pub(crate) fn push_condition(&mut self, condition: ConditionEval) -> ConditionId {
        let id = self.next_condition_id();
        self.conditions.push(condition);
        id
    }

    pub(crate) fn push_subgraph(&mut self, subgraph: SubgraphEval) -> SubgraphEvalId {
        let id = SubgraphEvalId(self.subgraphs.len() as u32);
        self.subgraphs.push(subgraph);
        id
    }

    pub(crate) fn subgraph(&self, id: SubgraphEvalId) -> &SubgraphEval {
        &self.subgraphs[id.0 as usize]
    }

    fn subgraph_mut(&mut self, id: SubgraphEvalId) -> &mut SubgraphEval {
        &mut self.subgraphs[id.0 as usize]
    }

    pub(crate) fn pose(&self, id: PoseEvalId) -> &PoseNodeEval {
        &self.poses[id.0 as usize]
    }

    pub(crate) fn condition(&self, id: ConditionId) -> &ConditionEval {
        &self.conditions[id.0 as usize]
    }

    fn node_kind(&self, sg: SubgraphEvalId, node: usize) -> NodeEvalKind {
        self.subgraph(sg).nodes[node].kind
    }

    // --- variable notifications ---

    /// Forward a variable write to one subscriber.
    pub(crate) fn notify(&mut self, subscriber: &Subscriber, value: Value) {
        match subscriber {
            Subscriber::ConditionLhs(id) => self.conditions[id.0 as usize].set_lhs(value),
            Subscriber::ConditionRhs(id) => self.conditions[id.0 as usize].set_rhs(value),
            Subscriber::PoseSpeed(id) => {
                let Some(speed) = value.as_float() else {
                    return;
                };
                if let Some(pose) = self.poses[id.0 as usize].pose.as_mut() {
                    pose.set_speed(speed);
                }
            }
            Subscriber::PoseParam { pose, path, point } => {
                let Some(v) = value.as_float() else {
                    return;
                };
                if let Some(eval) = self.poses[pose.0 as usize].pose.as_mut() {
                    eval.set_param(path, *point, v);
                }
            }
        }
    }

    // --- per-tick update ---

    /// Consume `dt` seconds in subgraph `sg`.
    pub(crate) fn update_subgraph(&mut self, sg: SubgraphEvalId, dt: f32) {
        let cap = self.subgraph(sg).step_cap;
        let mut remaining = dt;
        // Consecutive steps that consumed no time.
        let mut idle_steps = 0;
        loop {
            let (step, consumed) = self.consume(sg, remaining);
            remaining = (remaining - consumed).max(0.0);
            if matches!(step, Step::Idle | Step::Transitioning) {
                return;
            }
            if consumed > 0.0 {
                idle_steps = 0;
                continue;
            }
            idle_steps += 1;
            if idle_steps >= cap {
                let s = self.subgraph_mut(sg);
                if !s.starvation_reported {
                    s.starvation_reported = true;
                    warn!(
                        "subgraph '{}' took {cap} steps without consuming time; dropping {remaining}s \
                         (cycle of zero-duration transitions?)",
                        s.name
                    );
                }
                return;
            }
        }
    }

    fn consume(&mut self, sg: SubgraphEvalId, dt: f32) -> (Step, f32) {
        if let Some(active) = self.subgraph(sg).transition {
            return self.advance_transition(sg, active, dt);
        }

        let current = self.subgraph(sg).current;
        match self.select_transition(sg) {
            Some(t) if t.to != current => {
                self.begin_transition(sg, &t);
                (Step::Began, 0.0)
            }
            Some(_) if self.is_exited_subgraph_node(sg, current) => {
                if self.trace {
                    debug!(
                        "[{}] re-entering '{}'",
                        self.subgraph(sg).name,
                        self.subgraph(sg).nodes[current].name
                    );
                }
                self.enter_node(sg, current);
                self.update_node(sg, current, dt);
                (Step::Idle, dt)
            }
            _ => {
                self.update_node(sg, current, dt);
                (Step::Idle, dt)
            }
        }
    }

    fn advance_transition(
        &mut self,
        sg: SubgraphEvalId,
        mut active: ActiveTransition,
        dt: f32,
    ) -> (Step, f32) {
        if active.progress > active.duration {
            let s = self.subgraph_mut(sg);
            if !s.clamp_reported {
                s.clamp_reported = true;
                warn!(
                    "subgraph '{}': transition progress {} exceeds duration {}; clamping",
                    s.name, active.progress, active.duration
                );
            }
            active.progress = active.duration;
        }
        let contrib = (active.duration - active.progress).min(dt).max(0.0);
        active.progress += contrib;
        let ratio = active.ratio();
        let finished = ratio >= 1.0;

        let (from, weight) = {
            let s = self.subgraph(sg);
            (s.current, s.weight)
        };
        self.set_node_weight(sg, from, weight * (1.0 - ratio));
        self.update_node(sg, from, contrib);
        self.set_node_weight(sg, active.to, weight * ratio);
        self.update_node(sg, active.to, contrib * active.target_stretch);

        if !finished {
            self.subgraph_mut(sg).transition = Some(active);
            return (Step::Transitioning, contrib);
        }

        self.leave_node(sg, from);
        let s = self.subgraph_mut(sg);
        s.current = active.to;
        s.transition = None;
        if self.trace {
            let s = self.subgraph(sg);
            debug!(
                "[{}] transition '{}' -> '{}' finished",
                s.name, s.nodes[from].name, s.nodes[active.to].name
            );
        }
        (Step::Finished, contrib)
    }

    fn begin_transition(&mut self, sg: SubgraphEvalId, t: &TransitionEval) {
        let weight = {
            let s = self.subgraph_mut(sg);
            s.transition = Some(ActiveTransition {
                to: t.to,
                duration: t.duration,
                target_stretch: t.target_stretch,
                progress: 0.0,
            });
            s.weight
        };
        self.enter_node(sg, t.to);
        self.set_node_weight(sg, t.to, weight);
        if self.trace {
            let s = self.subgraph(sg);
            debug!(
                "[{}] transition '{}' -> '{}' begins ({}s)",
                s.name, s.nodes[s.current].name, s.nodes[t.to].name, t.duration
            );
        }
    }

    /// First satisfied transition of the current node, then of the any node.
    fn select_transition(&self, sg: SubgraphEvalId) -> Option<TransitionEval> {
        let s = self.subgraph(sg);
        let progress = self.node_progress(sg, s.current);
        let current = &s.nodes[s.current];
        // A nested subgraph that has not exited holds the machine until it does.
        if matches!(current.kind, NodeEvalKind::Subgraph(inner) if !self.subgraph(inner).exited()) {
            return None;
        }
        if let Some(t) = self.first_satisfied(&current.outgoing, progress) {
            return Some(t.clone());
        }
        self.first_satisfied(&s.nodes[s.any].outgoing, progress)
            .cloned()
    }

    fn first_satisfied<'t>(
        &self,
        transitions: &'t [TransitionEval],
        progress: f32,
    ) -> Option<&'t TransitionEval> {
        transitions.iter().find(|t| {
            if t.exit_condition.map_or(false, |threshold| progress < threshold) {
                return false;
            }
            t.condition.map_or(true, |c| self.condition(c).eval())
        })
    }

    fn is_exited_subgraph_node(&self, sg: SubgraphEvalId, node: usize) -> bool {
        matches!(self.node_kind(sg, node), NodeEvalKind::Subgraph(inner) if self.subgraph(inner).exited())
    }

    /// Normalized progress used for exit-time gating. Non-pose nodes never gate.
    fn node_progress(&self, sg: SubgraphEvalId, node: usize) -> f32 {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => self.pose(id).pose.as_ref().map_or(1.0, |p| p.progress()),
            _ => 1.0,
        }
    }

    // --- node hooks ---

    fn update_node(&mut self, sg: SubgraphEvalId, node: usize, dt: f32) {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.poses[id.0 as usize].pose.as_mut() {
                    pose.update(dt);
                }
            }
            NodeEvalKind::Subgraph(inner) => {
                if !self.subgraph(inner).exited() {
                    self.update_subgraph(inner, dt);
                }
            }
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        }
    }

    fn set_node_weight(&mut self, sg: SubgraphEvalId, node: usize, weight: f32) {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.poses[id.0 as usize].pose.as_mut() {
                    pose.set_base_weight(weight);
                }
            }
            NodeEvalKind::Subgraph(inner) => self.set_subgraph_weight(inner, weight),
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        }
    }

    /// Set a subgraph's weight and push it down to whatever is currently playing inside.
    pub(crate) fn set_subgraph_weight(&mut self, sg: SubgraphEvalId, weight: f32) {
        let (current, transition) = {
            let s = self.subgraph_mut(sg);
            s.weight = weight;
            (s.current, s.transition)
        };
        match transition {
            Some(active) => {
                let ratio = active.ratio();
                self.set_node_weight(sg, current, weight * (1.0 - ratio));
                self.set_node_weight(sg, active.to, weight * ratio);
            }
            None => self.set_node_weight(sg, current, weight),
        }
    }

    fn enter_node(&mut self, sg: SubgraphEvalId, node: usize) {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.poses[id.0 as usize].pose.as_mut() {
                    pose.active();
                }
            }
            NodeEvalKind::Subgraph(inner) => self.reset_subgraph(inner),
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        }
    }

    fn leave_node(&mut self, sg: SubgraphEvalId, node: usize) {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.poses[id.0 as usize].pose.as_mut() {
                    pose.inactive();
                }
            }
            NodeEvalKind::Subgraph(inner) => self.reset_subgraph(inner),
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        }
    }

    /// Leave whatever is playing and rewind to the entry node.
    pub(crate) fn reset_subgraph(&mut self, sg: SubgraphEvalId) {
        let (current, transition) = {
            let s = self.subgraph(sg);
            (s.current, s.transition)
        };
        if let Some(active) = transition {
            self.leave_node(sg, active.to);
        }
        self.leave_node(sg, current);
        let s = self.subgraph_mut(sg);
        s.current = s.entry;
        s.transition = None;
    }

    // --- sampling ---

    /// Push the current node (and the node fading in, if any) into `buffer`.
    pub(crate) fn sample_subgraph(&self, sg: SubgraphEvalId, buffer: &mut BlendBuffer) {
        let s = self.subgraph(sg);
        self.sample_node(sg, s.current, buffer);
        if let Some(active) = s.transition {
            self.sample_node(sg, active.to, buffer);
        }
    }

    fn sample_node(&self, sg: SubgraphEvalId, node: usize, buffer: &mut BlendBuffer) {
        match self.node_kind(sg, node) {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.pose(id).pose.as_ref() {
                    pose.sample(buffer);
                }
            }
            NodeEvalKind::Subgraph(inner) => self.sample_subgraph(inner, buffer),
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        }
    }

    // --- inspection ---

    /// Pose nodes currently playing in `sg`, with their weights, depth first.
    pub(crate) fn collect_active_poses(&self, sg: SubgraphEvalId, out: &mut Vec<(String, f32)>) {
        let s = self.subgraph(sg);
        let visit = |node: usize, out: &mut Vec<(String, f32)>| match s.nodes[node].kind {
            NodeEvalKind::Pose(id) => {
                if let Some(pose) = self.pose(id).pose.as_ref() {
                    out.push((s.nodes[node].name.clone(), pose.base_weight()));
                }
            }
            NodeEvalKind::Subgraph(inner) => self.collect_active_poses(inner, out),
            NodeEvalKind::Entry | NodeEvalKind::Exit | NodeEvalKind::Any => {}
        };
        visit(s.current, out);
        if let Some(active) = s.transition {
            visit(active.to, out);
        }
    }
}
