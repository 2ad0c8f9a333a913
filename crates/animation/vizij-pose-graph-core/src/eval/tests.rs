//! Behavioural coverage for the runtime evaluator.

use std::sync::Arc;

use super::*;
use crate::binding::{BindingHost, BindingPoint};
use crate::clip::{ClipSampler, TransformClip, TransformKey, WrapMode};
use crate::condition::{Condition, Operator};
use crate::error::{BindError, GraphError};
use crate::graph::{LayerBlending, PoseSubgraph};
use crate::ids::{ConditionId, NodeId, PoseEvalId};
use crate::math::Transform;
use crate::pose::{ClipPose, Pose, PoseBlendDirect};
use crate::value::ValueKind;

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

/// Constant pose on `hip` at translation x.
fn still(name: &str, x: f32, duration: f32) -> Pose {
    let clip: Arc<dyn ClipSampler> = Arc::new(
        TransformClip::new(name, duration)
            .with_wrap(WrapMode::Once)
            .with_track(
                "hip",
                vec![TransformKey {
                    time: 0.0,
                    transform: Transform::from_translation([x, 0.0, 0.0]),
                }],
            ),
    );
    ClipPose::new(clip).into()
}

fn add_pose(g: &mut PoseSubgraph, name: &str, x: f32) -> NodeId {
    let id = g.add_pose_node(name);
    g.pose_node_mut(id).unwrap().pose = Some(still(name, x, 1.0));
    id
}

fn single_layer(build: impl FnOnce(&mut PoseSubgraph)) -> PoseGraph {
    let mut graph = PoseGraph::new();
    let idx = graph.add_layer("Base");
    let layer = graph.layer_mut(idx).unwrap();
    layer.blending = LayerBlending::Override;
    build(layer.graph_mut());
    graph
}

fn eval(graph: &PoseGraph) -> PoseGraphEval {
    PoseGraphEval::new(graph, Skeleton::with_bones(["hip"])).expect("graph should build")
}

fn current(ev: &PoseGraphEval) -> String {
    ev.current_node_info(0).unwrap().name
}

fn hip_x(ev: &PoseGraphEval) -> f32 {
    ev.skeleton().local("hip").unwrap().translation[0]
}

fn idle_run_graph() -> PoseGraph {
    let mut graph = single_layer(|g| {
        let idle = add_pose(g, "Idle", 0.0);
        let run = add_pose(g, "Run", 1.0);
        g.connect(g.entry_node(), idle, None).unwrap().with_duration(0.0);
        g.connect(
            idle,
            run,
            Some(Condition::compare("speed", Operator::GreaterThan, Value::Float(0.0))),
        )
        .unwrap()
        .with_duration(0.3);
    });
    graph.add_variable("speed", ValueKind::Float, None).unwrap();
    graph
}

// --- Special nodes ---------------------------------------------------------

#[test]
fn subgraph_without_transitions_stays_at_entry() {
    let graph = single_layer(|_| {});
    let mut ev = eval(&graph);
    for _ in 0..5 {
        ev.update(0.1);
    }
    assert_eq!(current(&ev), "Entry");
    assert!(!ev.exited(0).unwrap());
}

#[test]
fn entry_to_exit_fades_with_default_duration() {
    let graph = single_layer(|g| {
        g.connect(g.entry_node(), g.exit_node(), None).unwrap();
    });
    let mut ev = eval(&graph);
    assert!(!ev.exited(0).unwrap());
    ev.update(0.0);
    // Default duration is 0.3s; a zero tick only starts the fade.
    assert!(!ev.exited(0).unwrap());
    ev.update(0.3);
    assert!(ev.exited(0).unwrap());
    assert_eq!(current(&ev), "Exit");
}

#[test]
fn zero_duration_entry_to_exit_exits_without_time() {
    let graph = single_layer(|g| {
        g.connect(g.entry_node(), g.exit_node(), None)
            .unwrap()
            .with_duration(0.0);
    });
    let mut ev = eval(&graph);
    ev.update(0.0);
    assert!(ev.exited(0).unwrap());
}

// --- Transitions -----------------------------------------------------------

#[test]
fn zero_duration_transition_completes_within_one_update() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, b, Some(Condition::be_true("go")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("go", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    assert_eq!(current(&ev), "A");

    ev.set_value("go", true).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "B");
    assert!(ev.current_transition(0).unwrap().is_none());
    assert_eq!(ev.active_poses(0).unwrap(), vec![("B".to_string(), 1.0)]);
}

#[test]
fn cross_fade_weights_sum_to_layer_weight() {
    for layer_weight in [1.0, 0.5] {
        let mut graph = single_layer(|g| {
            let a = add_pose(g, "A", 0.0);
            let b = add_pose(g, "B", 1.0);
            g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
            g.connect(a, b, None).unwrap().with_duration(1.0);
        });
        graph.layer_mut(0).unwrap().weight = layer_weight;
        let mut ev = eval(&graph);

        for step in 1..=3 {
            ev.update(0.25);
            let t = 0.25 * step as f32;
            let poses = ev.active_poses(0).unwrap();
            assert_eq!(poses.len(), 2);
            approx(poses[0].1, layer_weight * (1.0 - t), 1e-5);
            approx(poses[1].1, layer_weight * t, 1e-5);
            approx(poses[0].1 + poses[1].1, layer_weight, 1e-5);
            let info = ev.current_transition(0).unwrap().expect("fading");
            assert_eq!((info.from.as_str(), info.to.as_str()), ("A", "B"));
            approx(info.ratio, t, 1e-5);
        }

        ev.update(0.25);
        assert_eq!(current(&ev), "B");
        assert_eq!(ev.active_poses(0).unwrap(), vec![("B".to_string(), layer_weight)]);
    }
}

#[test]
fn exit_condition_gates_on_source_progress() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, b, Some(Condition::be_true("always")))
            .unwrap()
            .with_duration(0.1)
            .set_exit_condition(0.5);
    });
    graph
        .add_variable("always", ValueKind::Bool, Some(Value::Bool(true)))
        .unwrap();
    let mut ev = eval(&graph);

    // Progress before each tick: 0.0, 0.2, 0.4.
    for _ in 0..3 {
        ev.update(0.2);
        assert_eq!(current(&ev), "A");
        assert!(ev.current_transition(0).unwrap().is_none());
    }
    // Progress is now 0.6.
    ev.update(0.05);
    let info = ev.current_transition(0).unwrap().expect("gate opened");
    assert_eq!(info.to, "B");
}

#[test]
fn current_node_transitions_take_precedence_over_any() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        let c = add_pose(g, "C", 2.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(g.any_node(), c, Some(Condition::be_true("go")))
            .unwrap()
            .with_duration(1.0);
        g.connect(a, b, Some(Condition::be_true("go")))
            .unwrap()
            .with_duration(1.0);
    });
    graph.add_variable("go", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    ev.set_value("go", true).unwrap();
    ev.update(0.1);
    let info = ev.current_transition(0).unwrap().expect("transition started");
    assert_eq!(info.to, "B");
}

#[test]
fn any_node_fires_when_current_node_has_none() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let c = add_pose(g, "C", 2.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(g.any_node(), c, Some(Condition::be_true("hit")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("hit", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    assert_eq!(current(&ev), "A");
    ev.set_value("hit", true).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "C");
    // any -> C while already in C is not a re-entry.
    ev.update(0.1);
    assert_eq!(current(&ev), "C");
    assert!(ev.current_transition(0).unwrap().is_none());
}

#[test]
fn first_declared_transition_wins() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        let c = add_pose(g, "C", 2.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, c, None).unwrap().with_duration(1.0);
        g.connect(a, b, None).unwrap().with_duration(1.0);
    });
    let mut ev = eval(&graph);
    ev.update(0.1);
    assert_eq!(ev.current_transition(0).unwrap().unwrap().to, "C");
}

#[test]
fn zero_duration_cycle_is_bounded() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, b, None).unwrap().with_duration(0.0);
        g.connect(b, a, None).unwrap().with_duration(0.0);
    });
    let mut ev = eval(&graph);
    ev.update(0.1);
    ev.update(0.1);
    let name = current(&ev);
    assert!(name == "A" || name == "B", "unexpected node {name}");
}

#[test]
fn timed_cycle_plays_the_whole_tick() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, b, None).unwrap().with_duration(0.1);
        g.connect(b, a, None).unwrap().with_duration(0.1);
    });
    let mut ev = eval(&graph);
    // Ten 0.1s fades fit in one second, well past the per-tick zero-time cap.
    ev.update(1.0);
    assert_eq!(current(&ev), "A");
    let info = ev.current_transition(0).unwrap().expect("next fade started");
    assert_eq!((info.from.as_str(), info.to.as_str()), ("A", "B"));
    assert!(info.ratio < 1e-3, "ratio {}", info.ratio);
}

// --- Variables -------------------------------------------------------------

#[test]
fn variable_writes_propagate_before_update() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let b = add_pose(g, "B", 1.0);
        g.pose_node_mut(a)
            .unwrap()
            .bind(BindingPoint::Speed, "speed")
            .unwrap();
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(
            a,
            b,
            Some(Condition::compare("speed", Operator::GreaterThan, Value::Float(1.5))),
        )
        .unwrap();
    });
    graph
        .add_variable("speed", ValueKind::Float, Some(Value::Float(1.0)))
        .unwrap();
    let mut ev = eval(&graph);
    assert_eq!(ev.variables.subscriber_count("speed"), 2);
    assert!(!ev.tree.condition(ConditionId(0)).eval());

    ev.set_value("speed", 2.0).unwrap();
    assert_eq!(ev.get_value("speed"), Some(Value::Float(2.0)));
    assert!(ev.tree.condition(ConditionId(0)).eval());

    // A -> B begins on this tick and A plays the tick at the new speed.
    ev.update(0.1);
    assert_eq!(ev.current_transition(0).unwrap().unwrap().to, "B");
    let progress = ev.tree.pose(PoseEvalId(0)).pose.as_ref().unwrap().progress();
    approx(progress, 0.2, 1e-6);
}

#[test]
fn bound_speed_scales_pose_time() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        g.pose_node_mut(a)
            .unwrap()
            .bind(BindingPoint::Speed, "rate")
            .unwrap();
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
    });
    graph
        .add_variable("rate", ValueKind::Float, Some(Value::Float(2.0)))
        .unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    let progress = ev.tree.pose(PoseEvalId(0)).pose.as_ref().unwrap().progress();
    approx(progress, 0.2, 1e-6);
}

#[test]
fn non_finite_speed_keeps_playback_finite() {
    let mut graph = single_layer(|g| {
        let ramp: Arc<dyn ClipSampler> = Arc::new(TransformClip::new("ramp", 1.0).with_track(
            "hip",
            vec![
                TransformKey {
                    time: 0.0,
                    transform: Transform::from_translation([0.0, 0.0, 0.0]),
                },
                TransformKey {
                    time: 1.0,
                    transform: Transform::from_translation([1.0, 0.0, 0.0]),
                },
            ],
        ));
        let a = g.add_pose_node("A");
        let node = g.pose_node_mut(a).unwrap();
        node.pose = Some(ClipPose::new(ramp).into());
        node.bind(BindingPoint::Speed, "speed").unwrap();
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
    });
    graph
        .add_variable("speed", ValueKind::Float, Some(Value::Float(1.0)))
        .unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    approx(hip_x(&ev), 0.1, 1e-5);

    // Non-finite speeds are ignored; the clip keeps its last good speed.
    ev.set_value("speed", f32::INFINITY).unwrap();
    ev.update(0.1);
    approx(hip_x(&ev), 0.2, 1e-5);
    ev.set_value("speed", f32::NAN).unwrap();
    ev.update(0.1);
    approx(hip_x(&ev), 0.3, 1e-5);

    ev.set_value("speed", 2.0).unwrap();
    ev.update(0.1);
    approx(hip_x(&ev), 0.5, 1e-5);
}

#[test]
fn set_value_checks_kind_and_ignores_unknown_names() {
    let graph = idle_run_graph();
    let mut ev = eval(&graph);
    assert!(ev.set_value("nope", 1.0).is_ok());
    assert_eq!(ev.get_value("nope"), None);
    let err = ev.set_value("speed", true).unwrap_err();
    assert!(matches!(err, EvalError::Bind(BindError::TypeMismatch { .. })));
    assert_eq!(ev.get_value("speed"), Some(Value::Float(0.0)));
}

// --- Construction errors ---------------------------------------------------

#[test]
fn undefined_variable_fails_construction() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        g.connect(g.entry_node(), a, Some(Condition::be_true("missing")))
            .unwrap();
    });
    let err = PoseGraphEval::new(&graph, Skeleton::new()).unwrap_err();
    assert_eq!(
        err,
        EvalError::Bind(BindError::VariableNotDefined("missing".into()))
    );
}

#[test]
fn bool_variable_cannot_drive_speed() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        g.pose_node_mut(a)
            .unwrap()
            .bind(BindingPoint::Speed, "grounded")
            .unwrap();
    });
    graph.add_variable("grounded", ValueKind::Bool, None).unwrap();
    let err = PoseGraphEval::new(&graph, Skeleton::new()).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Bind(BindError::TypeMismatch { ref variable, .. }) if variable == "grounded"
    ));
}

#[test]
fn equality_against_float_literal_rejects_bool_variable() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        g.connect(
            g.entry_node(),
            a,
            Some(Condition::compare("grounded", Operator::EqualTo, Value::Float(1.0))),
        )
        .unwrap();
    });
    graph.add_variable("grounded", ValueKind::Bool, None).unwrap();
    let err = PoseGraphEval::new(&graph, Skeleton::new()).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Bind(BindError::TypeMismatch { ref variable, .. }) if variable == "grounded"
    ));
}

#[test]
fn equality_between_variables_requires_matching_kinds() {
    let build = |rhs_kind: ValueKind| {
        let mut graph = single_layer(|g| {
            let a = add_pose(g, "A", 0.0);
            let mut cond = Condition::new(Operator::NotEqualTo, Value::Float(0.0), None);
            cond.bind(BindingPoint::Lhs, "left").unwrap();
            cond.bind(BindingPoint::Rhs, "right").unwrap();
            g.connect(g.entry_node(), a, Some(cond)).unwrap();
        });
        graph.add_variable("left", ValueKind::Float, None).unwrap();
        graph.add_variable("right", rhs_kind, None).unwrap();
        PoseGraphEval::new(&graph, Skeleton::new())
    };
    assert!(build(ValueKind::Float).is_ok());
    assert!(matches!(
        build(ValueKind::Bool).unwrap_err(),
        EvalError::Bind(BindError::TypeMismatch { ref variable, .. }) if variable == "right"
    ));
}

#[test]
fn binary_condition_without_rhs_fails_construction() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        g.connect(
            g.entry_node(),
            a,
            Some(Condition::new(Operator::EqualTo, Value::Float(1.0), None)),
        )
        .unwrap();
    });
    let err = PoseGraphEval::new(&graph, Skeleton::new()).unwrap_err();
    assert!(matches!(err, EvalError::Graph(GraphError::InvalidCondition(_))));
}

#[test]
fn layer_index_is_bounds_checked() {
    let graph = idle_run_graph();
    let ev = eval(&graph);
    assert_eq!(ev.layer_count(), 1);
    assert_eq!(
        ev.current_node_info(1).unwrap_err(),
        EvalError::LayerOutOfRange { index: 1, count: 1 }
    );
    assert!(ev.exited(3).is_err());
    assert!(ev.active_poses(1).is_err());
}

// --- Scenario --------------------------------------------------------------

#[test]
fn idle_to_run_after_three_ticks() {
    let graph = idle_run_graph();
    let mut ev = eval(&graph);
    ev.set_value("speed", 1.0).unwrap();

    ev.update(0.1);
    assert_eq!(current(&ev), "Idle");
    approx(hip_x(&ev), 1.0 / 3.0, 1e-4);
    ev.update(0.1);
    assert_eq!(current(&ev), "Idle");
    ev.update(0.1);
    assert_eq!(current(&ev), "Run");
    approx(hip_x(&ev), 1.0, 1e-5);
}

#[test]
fn evaluators_from_one_asset_are_independent() {
    let graph = idle_run_graph();
    let mut a = PoseGraphEval::new(&graph, Skeleton::with_bones(["hip"])).unwrap();
    let mut b = PoseGraphEval::new(&graph, Skeleton::with_bones(["root", "hip"])).unwrap();

    a.set_value("speed", 1.0).unwrap();
    for _ in 0..4 {
        a.update(0.1);
        b.update(0.1);
    }
    assert_eq!(a.current_node_info(0).unwrap().name, "Run");
    assert_eq!(b.current_node_info(0).unwrap().name, "Idle");
    assert_eq!(b.get_value("speed"), Some(Value::Float(0.0)));
    assert!(!b.tree.condition(ConditionId(0)).eval());
}

// --- Nested subgraphs ------------------------------------------------------

#[test]
fn subgraph_node_waits_for_inner_exit() {
    let mut graph = single_layer(|g| {
        let s = g.add_subgraph("S");
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), s, None).unwrap().with_duration(0.0);
        g.connect(s, b, None).unwrap();

        let inner = g.subgraph_mut(s).unwrap();
        let w = add_pose(inner, "W", 0.5);
        let (entry, exit) = (inner.entry_node(), inner.exit_node());
        inner.connect(entry, w, None).unwrap().with_duration(0.0);
        inner
            .connect(w, exit, Some(Condition::be_true("done")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("done", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);

    ev.update(0.1);
    assert_eq!(current(&ev), "S");
    assert_eq!(ev.active_poses(0).unwrap(), vec![("W".to_string(), 1.0)]);
    approx(hip_x(&ev), 0.5, 1e-5);
    assert!(ev.current_transition(0).unwrap().is_none());

    ev.set_value("done", true).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "S");
    assert!(ev.active_poses(0).unwrap().is_empty());

    ev.update(0.1);
    let info = ev.current_transition(0).unwrap().expect("leaving S");
    assert_eq!((info.from.as_str(), info.to.as_str()), ("S", "B"));
}

#[test]
fn any_node_waits_for_unexited_subgraph() {
    let mut graph = single_layer(|g| {
        let s = g.add_subgraph("S");
        let b = add_pose(g, "B", 1.0);
        g.connect(g.entry_node(), s, None).unwrap().with_duration(0.0);
        g.connect(g.any_node(), b, Some(Condition::be_true("hit")))
            .unwrap()
            .with_duration(0.0);

        let inner = g.subgraph_mut(s).unwrap();
        let w = add_pose(inner, "W", 0.5);
        let (entry, exit) = (inner.entry_node(), inner.exit_node());
        inner.connect(entry, w, None).unwrap().with_duration(0.0);
        inner
            .connect(w, exit, Some(Condition::be_true("done")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("hit", ValueKind::Bool, None).unwrap();
    graph.add_variable("done", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    assert_eq!(current(&ev), "S");

    ev.set_value("hit", true).unwrap();
    for _ in 0..3 {
        ev.update(0.1);
        assert_eq!(current(&ev), "S");
        assert!(ev.current_transition(0).unwrap().is_none());
        assert_eq!(ev.active_poses(0).unwrap(), vec![("W".to_string(), 1.0)]);
    }

    // The inner machine exits this tick; any -> B fires on the next one.
    ev.set_value("done", true).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "S");
    ev.update(0.1);
    assert_eq!(current(&ev), "B");
    assert_eq!(ev.active_poses(0).unwrap(), vec![("B".to_string(), 1.0)]);
}

#[test]
fn exited_subgraph_reenters_on_self_transition() {
    let mut graph = single_layer(|g| {
        let s = g.add_subgraph("S");
        g.connect(g.entry_node(), s, None).unwrap().with_duration(0.0);
        g.connect(s, s, None).unwrap().with_duration(0.0);

        let inner = g.subgraph_mut(s).unwrap();
        let w = add_pose(inner, "W", 0.5);
        let (entry, exit) = (inner.entry_node(), inner.exit_node());
        inner.connect(entry, w, None).unwrap().with_duration(0.0);
        inner
            .connect(w, exit, Some(Condition::be_true("done")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("done", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);

    ev.update(0.1);
    assert_eq!(ev.active_poses(0).unwrap(), vec![("W".to_string(), 1.0)]);

    ev.set_value("done", true).unwrap();
    ev.update(0.1);
    assert!(ev.active_poses(0).unwrap().is_empty());

    ev.set_value("done", false).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "S");
    assert_eq!(ev.active_poses(0).unwrap(), vec![("W".to_string(), 1.0)]);
}

#[test]
fn subgraph_weight_follows_outer_cross_fade() {
    let graph = single_layer(|g| {
        let a = add_pose(g, "A", 0.0);
        let s = g.add_subgraph("S");
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, s, None).unwrap().with_duration(1.0);

        let inner = g.subgraph_mut(s).unwrap();
        let w = add_pose(inner, "W", 1.0);
        let entry = inner.entry_node();
        inner.connect(entry, w, None).unwrap().with_duration(0.0);
    });
    let mut ev = eval(&graph);
    ev.update(0.5);
    let poses = ev.active_poses(0).unwrap();
    assert_eq!(poses.len(), 2);
    assert_eq!(poses[0].0, "A");
    approx(poses[0].1, 0.5, 1e-5);
    assert_eq!(poses[1].0, "W");
    approx(poses[1].1, 0.5, 1e-5);
}

// --- Layers ----------------------------------------------------------------

#[test]
fn exited_layer_freezes() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 2.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
        g.connect(a, g.exit_node(), Some(Condition::be_true("stop")))
            .unwrap()
            .with_duration(0.0);
    });
    graph.add_variable("stop", ValueKind::Bool, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    approx(hip_x(&ev), 2.0, 1e-6);

    ev.set_value("stop", true).unwrap();
    ev.update(0.1);
    assert!(ev.exited(0).unwrap());
    ev.set_value("stop", false).unwrap();
    ev.update(0.1);
    assert_eq!(current(&ev), "Exit");
    approx(hip_x(&ev), 2.0, 1e-6);
}

#[test]
fn additive_layer_stacks_on_override() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 1.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
    });
    let top = graph.add_layer("Lean");
    let layer = graph.layer_mut(top).unwrap();
    layer.blending = LayerBlending::Additive;
    layer.weight = 0.5;
    let g = layer.graph_mut();
    let lean = add_pose(g, "Lean", 1.0);
    let entry = g.entry_node();
    g.connect(entry, lean, None).unwrap().with_duration(0.0);

    let mut ev = eval(&graph);
    ev.update(0.1);
    approx(hip_x(&ev), 1.5, 1e-5);
    assert_eq!(ev.layer_name(1).unwrap(), "Lean");
}

#[test]
fn masked_layer_leaves_bone_alone() {
    let mut graph = single_layer(|g| {
        let a = add_pose(g, "A", 3.0);
        g.connect(g.entry_node(), a, None).unwrap().with_duration(0.0);
    });
    let mut mask = crate::skeleton::SkeletonMask::new();
    mask.set("hip", false);
    graph.layer_mut(0).unwrap().mask = Some(mask);
    let mut ev = eval(&graph);
    ev.update(0.1);
    approx(hip_x(&ev), 0.0, 1e-6);
}

#[test]
fn bound_blend_weight_moves_the_pose() {
    let mut graph = single_layer(|g| {
        let mut blend = PoseBlendDirect::new(vec![
            (Some(still("left", 0.0, 1.0)), 1.0),
            (Some(still("right", 4.0, 1.0)), 0.0),
        ]);
        blend.bind(BindingPoint::Weight(1), "lean").unwrap();
        let n = g.add_pose_node("Blend");
        g.pose_node_mut(n).unwrap().pose = Some(blend.into());
        g.connect(g.entry_node(), n, None).unwrap().with_duration(0.0);
    });
    graph.add_variable("lean", ValueKind::Float, None).unwrap();
    let mut ev = eval(&graph);
    ev.update(0.1);
    approx(hip_x(&ev), 0.0, 1e-5);

    ev.set_value("lean", 1.0).unwrap();
    ev.update(0.1);
    approx(hip_x(&ev), 2.0, 1e-5);
}

#[test]
fn trace_config_is_kept() {
    let graph = idle_run_graph();
    let cfg = Config {
        trace_transitions: true,
        ..Config::default()
    };
    let mut ev = PoseGraphEval::with_config(&graph, Skeleton::with_bones(["hip"]), cfg).unwrap();
    ev.set_value("speed", 1.0).unwrap();
    ev.update(0.5);
    assert!(ev.config().trace_transitions);
    assert_eq!(current(&ev), "Run");
}
