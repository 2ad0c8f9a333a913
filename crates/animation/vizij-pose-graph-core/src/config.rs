//! Evaluator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a pose graph evaluator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit `debug!` records whenever a transition starts or finishes.
    pub trace_transitions: bool,

    /// Lower bound for consecutive zero-time steps a subgraph may take in one tick.
    /// The effective cap is `max(min_steps_per_tick, 2 * (transitions + 1))`.
    pub min_steps_per_tick: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace_transitions: false,
            min_steps_per_tick: 4,
        }
    }
}

impl Config {
    /// Step budget for a subgraph owning `transition_count` transitions.
    pub fn step_cap(&self, transition_count: usize) -> usize {
        self.min_steps_per_tick
            .max(2 * (transition_count + 1))
    }
}
