//! Task Configuration
//!
//! The read-only parameter object shared by the sampler and the memory
//! system. Every derived quantity (segment count, memory capacity, tensor
//! widths, event boundaries) is computed here so that callers never
//! re-derive it inconsistently.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retrieval::RecallFunction;
use crate::similarity::KernelKind;

// ============================================================================
// Observation Removal
// ============================================================================

/// How observations are removed within one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalMode {
	/// A random subset of positions is masked
	Partial,
	/// The whole part is masked or kept, as one unit
	All,
}

/// How many positions `RemovalMode::Partial` masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalCount {
	/// Each position is masked independently with probability `p`
	#[default]
	Probabilistic,
	/// Exactly `round(p * n_param)` positions are masked
	Fixed,
}

// ============================================================================
// Padding, Definitions, Context
// ============================================================================

/// Delay steps appended to every part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadLength {
	/// Same pad for every trial
	Fixed(usize),
	/// Drawn per trial from `0..=max`
	Random {
		/// Largest pad that can be drawn
		max: usize,
	},
}

impl PadLength {
	/// Largest pad this setting can produce.
	#[must_use]
	pub const fn max(self) -> usize {
		match self {
			Self::Fixed(n) | Self::Random { max: n } => n,
		}
	}
}

impl Default for PadLength {
	fn default() -> Self {
		Self::Fixed(0)
	}
}

/// Where definition paths come from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionSource {
	/// Every position drawn uniformly and independently
	#[default]
	Uniform,
	/// The same path for every trial
	Fixed(Vec<usize>),
	/// Each position keeps the default value with probability `prob`,
	/// otherwise takes one of the other values uniformly
	Biased {
		/// Backbone path
		default_path: Vec<usize>,
		/// Probability of keeping the backbone value
		prob: f64,
	},
}

/// Per-trial context appended to every observation row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
	/// Width of the context block
	pub dim: usize,
	/// One-hot context (otherwise standard-normal noise)
	pub onehot: bool,
}

/// Tensor widths implied by a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDims {
	/// Observation row width
	pub x_dim: usize,
	/// Target row width
	pub y_dim: usize,
	/// Action space width (one per branch, plus "don't know")
	pub a_dim: usize,
	/// Index of the "don't know" action
	pub dk_id: usize,
}

// ============================================================================
// TaskConfig
// ============================================================================

/// Parameters for event-sequence sampling and episodic memory sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
	/// Features per event (steps per part, before padding)
	pub n_param: usize,
	/// Values each feature can take
	pub n_branch: usize,
	/// Times the feature path is repeated within one trial
	pub n_parts: usize,
	/// Delay steps appended to each part
	pub pad_len: PadLength,
	/// Steps per memory segment (defaults to `n_param`)
	pub enc_size: Option<usize>,
	/// Events kept in episodic memory
	pub n_event_remember: usize,
	/// Removal probability in the encoding part
	pub p_rm_ob_enc: f64,
	/// Removal probability in the recall parts
	pub p_rm_ob_rcl: f64,
	/// Removal mode in the encoding part
	pub mode_rm_ob_enc: RemovalMode,
	/// Removal mode in the recall parts
	pub mode_rm_ob_rcl: RemovalMode,
	/// How partial removal counts positions
	pub removal: RemovalCount,
	/// Maximum normalized similarity to recent events
	pub similarity_cap: f64,
	/// Optional minimum normalized similarity to recent events
	pub similarity_floor: Option<f64>,
	/// How many previous events the similarity bounds apply to
	pub similarity_cap_lag: usize,
	/// Attempts per sample before giving up
	pub max_retries: usize,
	/// Definition path source
	pub definition: DefinitionSource,
	/// Optional context block
	pub context: Option<ContextConfig>,
	/// Recall function used by the agent
	pub recall_func: RecallFunction,
	/// Key similarity kernel used by recall
	pub kernel: KernelKind,
	/// Penalty for wrong answers (consumed by the reward function only)
	pub penalty: f64,
}

impl Default for TaskConfig {
	fn default() -> Self {
		Self {
			n_param: 10,
			n_branch: 3,
			n_parts: 2,
			pad_len: PadLength::default(),
			enc_size: None,
			n_event_remember: 4,
			p_rm_ob_enc: 0.0,
			p_rm_ob_rcl: 0.0,
			mode_rm_ob_enc: RemovalMode::Partial,
			mode_rm_ob_rcl: RemovalMode::All,
			removal: RemovalCount::default(),
			similarity_cap: 1.0,
			similarity_floor: None,
			similarity_cap_lag: 4,
			max_retries: 10_000,
			definition: DefinitionSource::default(),
			context: None,
			recall_func: RecallFunction::Lca,
			kernel: KernelKind::Cosine,
			penalty: 1.0,
		}
	}
}

fn check_probability(field: &'static str, value: f64) -> Result<()> {
	if (0.0..=1.0).contains(&value) {
		Ok(())
	} else {
		Err(Error::config(field, format!("{value} is not in [0, 1]")))
	}
}

pub(crate) fn check_path(
	field: &'static str,
	path: &[usize],
	n_param: usize,
	n_branch: usize,
) -> Result<()> {
	if path.len() != n_param {
		return Err(Error::config(
			field,
			format!("length {} does not match n_param {n_param}", path.len()),
		));
	}
	if let Some(&bad) = path.iter().find(|&&v| v >= n_branch) {
		return Err(Error::config(
			field,
			format!("value {bad} is out of [0, {n_branch})"),
		));
	}
	Ok(())
}

impl TaskConfig {
	/// Check every field against its domain.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] naming the first offending field.
	pub fn validate(&self) -> Result<()> {
		if self.n_param == 0 {
			return Err(Error::config("n_param", "must be positive"));
		}
		if self.n_branch < 2 {
			return Err(Error::config("n_branch", "needs at least 2 branches"));
		}
		if self.n_parts == 0 {
			return Err(Error::config("n_parts", "must be positive"));
		}
		let enc_size = self.enc_size();
		if enc_size == 0 || enc_size > self.n_param {
			return Err(Error::config(
				"enc_size",
				format!("{enc_size} is not in (0, {}]", self.n_param),
			));
		}
		if self.n_param % enc_size != 0 {
			return Err(Error::config(
				"enc_size",
				format!("{enc_size} does not divide n_param {}", self.n_param),
			));
		}
		if self.n_event_remember == 0 {
			return Err(Error::config("n_event_remember", "must be positive"));
		}
		check_probability("p_rm_ob_enc", self.p_rm_ob_enc)?;
		check_probability("p_rm_ob_rcl", self.p_rm_ob_rcl)?;
		check_probability("similarity_cap", self.similarity_cap)?;
		if let Some(floor) = self.similarity_floor {
			check_probability("similarity_floor", floor)?;
			if floor > self.similarity_cap {
				return Err(Error::config(
					"similarity_floor",
					format!("{floor} exceeds similarity_cap {}", self.similarity_cap),
				));
			}
		}
		if self.max_retries == 0 {
			return Err(Error::config("max_retries", "must be positive"));
		}
		match &self.definition {
			DefinitionSource::Uniform => {}
			DefinitionSource::Fixed(path) => {
				check_path("definition", path, self.n_param, self.n_branch)?;
			}
			DefinitionSource::Biased { default_path, prob } => {
				check_path("definition", default_path, self.n_param, self.n_branch)?;
				check_probability("definition.prob", *prob)?;
			}
		}
		if let Some(context) = self.context {
			if context.dim == 0 {
				return Err(Error::config("context.dim", "must be positive"));
			}
		}
		if !(self.penalty.is_finite() && self.penalty >= 0.0) {
			return Err(Error::config("penalty", "must be finite and non-negative"));
		}
		Ok(())
	}

	/// Steps per memory segment.
	#[must_use]
	pub fn enc_size(&self) -> usize {
		self.enc_size.unwrap_or(self.n_param)
	}

	/// Segments per event (`n_param / enc_size`).
	#[must_use]
	pub fn n_segments(&self) -> usize {
		self.n_param / self.enc_size().max(1)
	}

	/// Episodic memory capacity (`n_event_remember × n_segments`).
	#[must_use]
	pub fn memory_capacity(&self) -> usize {
		self.n_event_remember * self.n_segments()
	}

	/// Expected overlap between two independent uniform paths.
	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn chance(&self) -> f64 {
		1.0 / self.n_branch as f64
	}

	/// Width of the context block (0 when disabled).
	#[must_use]
	pub fn context_dim(&self) -> usize {
		self.context.map_or(0, |c| c.dim)
	}

	/// Tensor widths for observations, targets and actions.
	#[must_use]
	pub fn data_dims(&self) -> DataDims {
		let a_dim = self.n_branch + 1;
		DataDims {
			x_dim: self.n_param + self.n_branch + self.context_dim() + 1,
			y_dim: self.n_branch,
			a_dim,
			dk_id: a_dim - 1,
		}
	}

	/// Steps in one part for a given pad.
	#[must_use]
	pub const fn t_part(&self, pad: usize) -> usize {
		self.n_param + pad
	}

	/// Steps in one trial for a given pad.
	#[must_use]
	pub const fn t_total(&self, pad: usize) -> usize {
		self.t_part(pad) * self.n_parts
	}

	/// Last step of every part.
	///
	/// Nothing is predicted at these boundaries; they delimit events.
	#[must_use]
	pub fn event_ends(&self, pad: usize) -> Vec<usize> {
		let t_part = self.t_part(pad);
		(0..self.n_parts).map(|k| t_part * (k + 1) - 1).collect()
	}

	/// Steps of the first part at which a segment is written to memory.
	///
	/// One per segment; the last one falls on the end of the part so that
	/// the delay period is included.
	#[must_use]
	pub fn encoding_times(&self, pad: usize) -> Vec<usize> {
		let enc_size = self.enc_size();
		let n_segments = self.n_segments();
		(1..=n_segments)
			.map(|k| {
				if k == n_segments {
					self.t_part(pad) - 1
				} else {
					k * enc_size - 1
				}
			})
			.collect()
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_valid() {
		assert!(TaskConfig::default().validate().is_ok());
	}

	#[test]
	fn test_enc_size_must_divide() {
		let config = TaskConfig {
			n_param: 10,
			enc_size: Some(3),
			..Default::default()
		};
		let err = config.validate().unwrap_err();
		assert!(matches!(err, Error::InvalidConfig { field: "enc_size", .. }));
	}

	#[test]
	fn test_enc_size_range() {
		for bad in [0, 11] {
			let config = TaskConfig {
				n_param: 10,
				enc_size: Some(bad),
				..Default::default()
			};
			assert!(config.validate().unwrap_err().is_config());
		}
	}

	#[test]
	fn test_probabilities_checked() {
		let config = TaskConfig {
			p_rm_ob_enc: 1.5,
			..Default::default()
		};
		assert!(matches!(
			config.validate(),
			Err(Error::InvalidConfig { field: "p_rm_ob_enc", .. })
		));

		let config = TaskConfig {
			similarity_cap: 0.3,
			similarity_floor: Some(0.5),
			..Default::default()
		};
		assert!(matches!(
			config.validate(),
			Err(Error::InvalidConfig { field: "similarity_floor", .. })
		));
	}

	#[test]
	fn test_fixed_definition_checked() {
		let config = TaskConfig {
			n_param: 3,
			n_branch: 2,
			definition: DefinitionSource::Fixed(vec![0, 1, 2]),
			..Default::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_derived_sizes() {
		let config = TaskConfig {
			n_param: 16,
			n_branch: 4,
			enc_size: Some(8),
			n_event_remember: 2,
			context: Some(ContextConfig { dim: 5, onehot: true }),
			..Default::default()
		};
		assert_eq!(config.n_segments(), 2);
		assert_eq!(config.memory_capacity(), 4);
		assert_eq!(config.chance(), 0.25);

		let dims = config.data_dims();
		assert_eq!(dims.x_dim, 16 + 4 + 5 + 1);
		assert_eq!(dims.y_dim, 4);
		assert_eq!(dims.a_dim, 5);
		assert_eq!(dims.dk_id, 4);
	}

	#[test]
	fn test_event_ends_and_encoding_times() {
		let config = TaskConfig {
			n_param: 6,
			enc_size: Some(3),
			..Default::default()
		};
		assert_eq!(config.event_ends(2), vec![7, 15]);
		assert_eq!(config.encoding_times(0), vec![2, 5]);
		assert_eq!(config.encoding_times(2), vec![2, 7]);
	}

	#[test]
	fn test_load_from_json() {
		let json = r#"{
			"n_param": 4,
			"n_branch": 2,
			"pad_len": { "random": { "max": 3 } },
			"similarity_cap": 0.5,
			"similarity_cap_lag": 1,
			"mode_rm_ob_rcl": "partial",
			"kernel": "l2",
			"recall_func": "winner_take_all"
		}"#;
		let config: TaskConfig = serde_json::from_str(json).unwrap();
		assert!(config.validate().is_ok());
		assert_eq!(config.pad_len, PadLength::Random { max: 3 });
		assert_eq!(config.mode_rm_ob_rcl, RemovalMode::Partial);
		assert_eq!(config.kernel, KernelKind::L2);
		assert_eq!(config.recall_func, RecallFunction::WinnerTakeAll);
		// unspecified fields keep their defaults
		assert_eq!(config.n_parts, 2);
		assert_eq!(config.max_retries, 10_000);
	}
}
