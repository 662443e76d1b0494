//! Leaky Competing Accumulator
//!
//! Each stored trace owns one non-negative accumulator. Starting from zero,
//! every step applies:
//!
//! ```text
//! a_j ← max(0, a_j + dt·(−leak·a_j + κ·a_j + input_gate·s_j − competition·Σ_{l≠j} a_l))
//! ```
//!
//! - **leak** pulls every accumulator back toward zero
//! - **input_gate** scales the similarity-driven input `s_j`
//! - **competition** lets every trace suppress every other one
//!
//! With `dt = 1` and self-excitation `κ = 0` this is
//! `a_j ← max(0, a_j·(1 − leak) + input_gate·s_j − competition·Σ_{l≠j} a_l)`.
//!
//! Competition is what makes recall winner-take-some instead of a flat
//! similarity-weighted average. Every function here is pure: state goes
//! in, new state comes out.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Activation buffer; inline for typical store sizes.
pub type Activations = SmallVec<[f64; 16]>;

/// Per-call gating signals, supplied by the agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LcaGates {
	/// Scale on similarity input, in [0, 1]
	pub input_gate: f64,
	/// Decay toward zero, in [0, 1]
	pub leak: f64,
	/// Mutual inhibition, in [0, 1]
	pub competition: f64,
}

impl LcaGates {
	/// Build validated gates.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if any gate is outside `[0, 1]`.
	pub fn new(input_gate: f64, leak: f64, competition: f64) -> Result<Self> {
		let gates = Self {
			input_gate,
			leak,
			competition,
		};
		gates.validate()?;
		Ok(gates)
	}

	/// Check every gate is in `[0, 1]`.
	///
	/// Gates are contracts: out-of-range values are rejected, never
	/// clamped.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] naming the offending gate.
	pub fn validate(&self) -> Result<()> {
		for (field, value) in [
			("input_gate", self.input_gate),
			("leak", self.leak),
			("competition", self.competition),
		] {
			if !(0.0..=1.0).contains(&value) {
				return Err(Error::config(field, format!("{value} is not in [0, 1]")));
			}
		}
		Ok(())
	}
}

impl Default for LcaGates {
	fn default() -> Self {
		Self {
			input_gate: 1.0,
			leak: 0.0,
			competition: 0.8,
		}
	}
}

/// Fixed parameters of the accumulator dynamics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcaConfig {
	/// Update steps per recall
	pub n_steps: usize,
	/// Step size relative to the time constant
	pub dt_t_ratio: f64,
	/// Self-excitation `κ`
	pub self_excitation: f64,
}

impl Default for LcaConfig {
	fn default() -> Self {
		Self {
			n_steps: 10,
			dt_t_ratio: 1.0,
			self_excitation: 0.0,
		}
	}
}

impl LcaConfig {
	/// Check the dynamics parameters.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `n_steps` is zero, `dt_t_ratio`
	/// is not in `(0, 1]`, or `self_excitation` is negative or not finite.
	pub fn validate(&self) -> Result<()> {
		if self.n_steps == 0 {
			return Err(Error::config("n_steps", "must be positive"));
		}
		if !(self.dt_t_ratio > 0.0 && self.dt_t_ratio <= 1.0) {
			return Err(Error::config(
				"dt_t_ratio",
				format!("{} is not in (0, 1]", self.dt_t_ratio),
			));
		}
		if !(self.self_excitation.is_finite() && self.self_excitation >= 0.0) {
			return Err(Error::config("self_excitation", "must be finite and non-negative"));
		}
		Ok(())
	}
}

// ============================================================================
// Dynamics
// ============================================================================

/// One LCA update.
///
/// `previous` and `similarities` must have the same length.
#[must_use]
pub fn lca_step(
	previous: &[f64],
	similarities: &[f64],
	gates: &LcaGates,
	config: &LcaConfig,
) -> Activations {
	let total: f64 = previous.iter().sum();
	previous
		.iter()
		.zip(similarities)
		.map(|(&a, &s)| {
			let others = total - a;
			let drive = gates.input_gate.mul_add(
				s,
				(config.self_excitation - gates.leak).mul_add(a, -gates.competition * others),
			);
			config.dt_t_ratio.mul_add(drive, a).max(0.0)
		})
		.collect()
}

/// Run `n_steps` updates from all-zero activation.
#[must_use]
pub fn run_lca(similarities: &[f64], gates: &LcaGates, config: &LcaConfig) -> Activations {
	let mut activations: Activations = SmallVec::from_elem(0.0, similarities.len());
	for _ in 0..config.n_steps {
		activations = lca_step(&activations, similarities, gates, config);
	}
	activations
}

/// Run the dynamics and keep every intermediate state.
///
/// Entry 0 is the state after the first step; the last entry equals
/// [`run_lca`].
#[must_use]
pub fn run_lca_trajectory(
	similarities: &[f64],
	gates: &LcaGates,
	config: &LcaConfig,
) -> Vec<Activations> {
	let mut trajectory = Vec::with_capacity(config.n_steps);
	let mut activations: Activations = SmallVec::from_elem(0.0, similarities.len());
	for _ in 0..config.n_steps {
		activations = lca_step(&activations, similarities, gates, config);
		trajectory.push(activations.clone());
	}
	trajectory
}

/// Normalize final activations into weights.
///
/// `w_j = a_j / Σ a`. If the sum is zero every weight is zero (no recall).
#[must_use]
pub fn competitive_weights(activations: &[f64]) -> Vec<f64> {
	let total: f64 = activations.iter().sum();
	if total > 0.0 {
		activations.iter().map(|a| a / total).collect()
	} else {
		vec![0.0; activations.len()]
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
	use super::*;

	const EPS: f64 = 1e-12;

	#[test]
	fn test_gates_are_contracts() {
		assert!(LcaGates::new(0.5, 0.1, 0.3).is_ok());
		for (ig, leak, comp, field) in [
			(1.2, 0.0, 0.0, "input_gate"),
			(1.0, -0.1, 0.0, "leak"),
			(1.0, 0.0, 1.5, "competition"),
			(1.0, 0.0, f64::NAN, "competition"),
		] {
			let err = LcaGates::new(ig, leak, comp).unwrap_err();
			assert!(matches!(err, Error::InvalidConfig { field: f, .. } if f == field));
		}
	}

	#[test]
	fn test_config_validation() {
		assert!(LcaConfig::default().validate().is_ok());
		let bad = LcaConfig {
			n_steps: 0,
			..Default::default()
		};
		assert!(bad.validate().is_err());
		let bad = LcaConfig {
			dt_t_ratio: 0.0,
			..Default::default()
		};
		assert!(bad.validate().is_err());
	}

	#[test]
	fn test_single_step_closed_form() {
		let gates = LcaGates::new(0.7, 0.2, 0.5).unwrap();
		let config = LcaConfig {
			n_steps: 1,
			..Default::default()
		};
		let s = [0.9, 0.3, -0.4];
		let a = run_lca(&s, &gates, &config);
		// from zero: a_j = max(0, input_gate * s_j)
		assert!((a[0] - 0.63).abs() < EPS);
		assert!((a[1] - 0.21).abs() < EPS);
		assert_eq!(a[2], 0.0);
	}

	#[test]
	fn test_second_step_matches_formula() {
		let gates = LcaGates::new(1.0, 0.25, 0.5).unwrap();
		let config = LcaConfig::default();
		let s = [0.8, 0.4];
		let a1 = lca_step(&[0.0, 0.0], &s, &gates, &config);
		let a2 = lca_step(&a1, &s, &gates, &config);
		let expected_0 = (0.8f64 * 0.75 + 0.8 - 0.5 * 0.4).max(0.0);
		let expected_1 = (0.4f64 * 0.75 + 0.4 - 0.5 * 0.8).max(0.0);
		assert!((a2[0] - expected_0).abs() < EPS);
		assert!((a2[1] - expected_1).abs() < EPS);
	}

	#[test]
	fn test_no_competition_is_proportional() {
		let gates = LcaGates::new(0.6, 0.3, 0.0).unwrap();
		let config = LcaConfig::default();
		let s = [0.5, 0.25, 0.25, -0.3];
		let weights = competitive_weights(&run_lca(&s, &gates, &config));
		// no winner suppression: weights follow the positive similarities
		assert!((weights[0] - 0.5).abs() < EPS);
		assert!((weights[1] - 0.25).abs() < EPS);
		assert!((weights[2] - 0.25).abs() < EPS);
		assert_eq!(weights[3], 0.0);

		// and each accumulator is a leak-weighted geometric sum of its input
		let a = run_lca(&s, &gates, &config);
		let geometric: f64 = (0..10).map(|k| 0.7f64.powi(k)).sum();
		assert!((a[0] - 0.6 * 0.5 * geometric).abs() < 1e-9);
	}

	#[test]
	fn test_competition_sharpens() {
		let s = [0.9, 0.7];
		let config = LcaConfig::default();
		let flat = competitive_weights(&run_lca(&s, &LcaGates::new(1.0, 0.0, 0.0).unwrap(), &config));
		let sharp = competitive_weights(&run_lca(&s, &LcaGates::new(1.0, 0.0, 0.9).unwrap(), &config));
		assert!(sharp[0] > flat[0]);
		assert!(sharp[1] < flat[1]);
	}

	#[test]
	fn test_activations_never_negative() {
		let gates = LcaGates::new(1.0, 0.1, 1.0).unwrap();
		let s = [0.2, 0.9, 0.85, -1.0, 0.5];
		for state in run_lca_trajectory(&s, &gates, &LcaConfig::default()) {
			assert!(state.iter().all(|&a| a >= 0.0));
		}
	}

	#[test]
	fn test_trajectory_ends_at_run() {
		let gates = LcaGates::default();
		let s = [0.3, 0.6, 0.1];
		let config = LcaConfig::default();
		let trajectory = run_lca_trajectory(&s, &gates, &config);
		assert_eq!(trajectory.len(), config.n_steps);
		assert_eq!(trajectory.last().unwrap(), &run_lca(&s, &gates, &config));
	}

	#[test]
	fn test_zero_input_gives_zero_weights() {
		let gates = LcaGates::new(0.0, 0.5, 0.5).unwrap();
		let weights = competitive_weights(&run_lca(&[0.9, 0.1], &gates, &LcaConfig::default()));
		assert_eq!(weights, vec![0.0, 0.0]);
		assert!(competitive_weights(&[]).is_empty());
	}
}
