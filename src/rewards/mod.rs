//! Rewards Module
//!
//! Combines correctness, tool usage, uncertainty calibration and novelty
//! into a scalar plus a per-component breakdown. The total is always the
//! weighted sum of the components under the weights in effect at step
//! time.

use std::collections::VecDeque;

use crate::config::RewardsConfig;
use crate::tasks::{RewardBreakdown, Trajectory};

/// How many recent novelty signatures are remembered for the cheap
/// repetition check.
const SIGNATURE_WINDOW: usize = 100;

pub struct RewardEngine {
    weights: RewardsConfig,
    recent_signatures: VecDeque<String>,
}

impl RewardEngine {
    pub fn new(weights: RewardsConfig) -> Self {
        Self {
            weights,
            recent_signatures: VecDeque::with_capacity(SIGNATURE_WINDOW),
        }
    }

    /// Compute the reward for one trajectory. Deterministic in its inputs
    /// and the signature window state.
    pub fn compute(
        &mut self,
        trajectory: &Trajectory,
        success_prob: f64,
        novelty_sig: &str,
        max_similarity: f64,
    ) -> RewardBreakdown {
        let correctness = if trajectory.success { 1.0 } else { -0.5 };

        // Peak reward when the estimate sits on the target success rate.
        let uncertainty = 1.0 - (success_prob - self.weights.target_success_rate).abs();

        let ok_calls = trajectory.ok_call_count();
        let tool_use = if trajectory.tool_calls.is_empty() {
            -0.2
        } else {
            (0.25 * ok_calls as f64).min(1.0)
        };

        let mut novelty: f64 = 1.0;
        if self.recent_signatures.contains(&novelty_sig.to_string()) {
            novelty -= 0.5;
        }
        if max_similarity > self.weights.repetition_similarity_threshold {
            novelty -= 0.5;
        }
        let novelty = novelty.max(-1.0);
        self.remember(novelty_sig);

        let total = self.weights.weight_uncertainty * uncertainty
            + self.weights.weight_tool_use * tool_use
            + self.weights.weight_novelty * novelty
            + self.weights.weight_correctness * correctness;

        RewardBreakdown {
            uncertainty,
            tool_use,
            novelty,
            correctness,
            total,
        }
    }

    fn remember(&mut self, signature: &str) {
        if self.recent_signatures.len() >= SIGNATURE_WINDOW {
            self.recent_signatures.pop_front();
        }
        self.recent_signatures.push_back(signature.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Domain, Task, ToolCall, ToolStatus, Trajectory, VerifierSpec};
    use std::collections::{BTreeMap, BTreeSet};

    fn trajectory(success: bool, ok_calls: usize) -> Trajectory {
        let task = Task {
            task_id: "t".to_string(),
            domain: Domain::Math,
            difficulty: 0.5,
            prompt: "p".to_string(),
            constraints: Vec::new(),
            verifier: VerifierSpec::ExactString {
                expected: "x".to_string(),
            },
            metadata: BTreeMap::new(),
        };
        let calls = (0..ok_calls)
            .map(|i| ToolCall {
                step_id: format!("step_{i}"),
                tool: "math".to_string(),
                input: String::new(),
                depends_on: BTreeSet::new(),
                status: ToolStatus::Ok,
                result: String::new(),
                stdout: String::new(),
                stderr: String::new(),
                elapsed_ms: 1,
            })
            .collect();
        let mut trajectory = Trajectory::new(task, "x".to_string(), calls, String::new());
        trajectory.success = success;
        trajectory
    }

    fn engine() -> RewardEngine {
        RewardEngine::new(RewardsConfig::default())
    }

    #[test]
    fn total_is_the_weighted_component_sum() {
        let mut engine = engine();
        let reward = engine.compute(&trajectory(true, 2), 0.6, "math:1", 0.0);
        let weights = RewardsConfig::default();
        let expected = weights.weight_uncertainty * reward.uncertainty
            + weights.weight_tool_use * reward.tool_use
            + weights.weight_novelty * reward.novelty
            + weights.weight_correctness * reward.correctness;
        assert!((reward.total - expected).abs() < 1e-9);
    }

    #[test]
    fn correctness_component_values() {
        let mut engine = engine();
        assert_eq!(
            engine.compute(&trajectory(true, 0), 0.5, "a", 0.0).correctness,
            1.0
        );
        assert_eq!(
            engine.compute(&trajectory(false, 0), 0.5, "b", 0.0).correctness,
            -0.5
        );
    }

    #[test]
    fn no_tool_calls_is_penalized_and_ok_calls_cap_at_one() {
        let mut engine = engine();
        assert_eq!(engine.compute(&trajectory(true, 0), 0.5, "a", 0.0).tool_use, -0.2);
        assert_eq!(engine.compute(&trajectory(true, 2), 0.5, "b", 0.0).tool_use, 0.5);
        assert_eq!(engine.compute(&trajectory(true, 9), 0.5, "c", 0.0).tool_use, 1.0);
    }

    #[test]
    fn repeated_signature_and_high_similarity_each_cost_half() {
        let mut engine = engine();
        let first = engine.compute(&trajectory(true, 1), 0.5, "math:7", 0.0);
        assert_eq!(first.novelty, 1.0);
        let repeat = engine.compute(&trajectory(true, 1), 0.5, "math:7", 0.0);
        assert_eq!(repeat.novelty, 0.5);
        let near_dup = engine.compute(&trajectory(true, 1), 0.5, "math:7", 0.95);
        assert_eq!(near_dup.novelty, 0.0);
    }

    #[test]
    fn uncertainty_peaks_at_the_target() {
        let mut engine = engine();
        let on_target = engine.compute(&trajectory(true, 1), 0.5, "a", 0.0);
        assert!((on_target.uncertainty - 1.0).abs() < 1e-12);
        let off_target = engine.compute(&trajectory(true, 1), 1.0, "b", 0.0);
        assert!((off_target.uncertainty - 0.5).abs() < 1e-12);
    }

    #[test]
    fn compute_is_deterministic_in_its_inputs() {
        let mut a = engine();
        let mut b = engine();
        let ra = a.compute(&trajectory(true, 3), 0.7, "sig", 0.2);
        let rb = b.compute(&trajectory(true, 3), 0.7, "sig", 0.2);
        assert_eq!(ra, rb);
    }

    #[test]
    fn signature_window_is_bounded() {
        let mut engine = engine();
        for i in 0..150 {
            engine.compute(&trajectory(true, 1), 0.5, &format!("sig:{i}"), 0.0);
        }
        assert!(engine.recent_signatures.len() <= SIGNATURE_WINDOW);
        // sig:0 fell out of the window, so it reads as novel again.
        let reward = engine.compute(&trajectory(true, 1), 0.5, "sig:0", 0.0);
        assert_eq!(reward.novelty, 1.0);
    }
}
