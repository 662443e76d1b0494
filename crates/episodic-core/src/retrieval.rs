//! Retrieval Pipeline
//!
//! One recall against a read-only store snapshot:
//!
//! 1. Score the query against every stored key (batch)
//! 2. Run competitive dynamics over the scores
//! 3. Normalize activations into weights
//! 4. Blend stored values by weight
//!
//! The snapshot is never mutated; gates are reported back untouched for
//! analysis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TaskConfig;
use crate::error::{Error, Result};
use crate::lca::{competitive_weights, run_lca, LcaConfig, LcaGates};
use crate::memory::StoreSnapshot;
use crate::similarity::{KernelKind, SimilarityKernel};

/// How scores become weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallFunction {
	/// Leaky competing accumulator dynamics
	#[default]
	Lca,
	/// All weight on the most similar trace
	WinnerTakeAll,
}

impl RecallFunction {
	/// Configuration name.
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::Lca => "lca",
			Self::WinnerTakeAll => "winner_take_all",
		}
	}
}

impl fmt::Display for RecallFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for RecallFunction {
	type Err = Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"lca" => Ok(Self::Lca),
			"winner_take_all" | "wta" => Ok(Self::WinnerTakeAll),
			other => Err(Error::config("recall_func", format!("unknown recall function `{other}`"))),
		}
	}
}

/// Configuration for retrieval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
	/// Scores-to-weights rule
	pub function: RecallFunction,
	/// Query/key similarity
	pub kernel: KernelKind,
	/// Accumulator dynamics (ignored by winner-take-all)
	pub lca: LcaConfig,
}

impl From<&TaskConfig> for RecallConfig {
	fn from(config: &TaskConfig) -> Self {
		Self {
			function: config.recall_func,
			kernel: config.kernel,
			lca: LcaConfig::default(),
		}
	}
}

/// Result of one recall.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recall {
	/// Weighted blend of stored values
	pub recalled: Vec<f64>,
	/// Competitive weights, one per snapshot trace
	pub weights: Vec<f64>,
	/// Raw query/key similarities
	pub similarities: Vec<f64>,
	/// Final activations before normalization
	pub activations: Vec<f64>,
	/// Gates used for this recall
	pub gates: LcaGates,
	/// Trace ids in snapshot order
	pub trace_ids: Vec<u64>,
}

impl Recall {
	/// Snapshot index of the largest weight, if any weight is positive.
	///
	/// Ties go to the earliest (oldest) trace.
	#[must_use]
	pub fn winner(&self) -> Option<usize> {
		self.weights
			.iter()
			.enumerate()
			.filter(|(_, &w)| w > 0.0)
			.reduce(|best, next| if next.1 > best.1 { next } else { best })
			.map(|(i, _)| i)
	}

	/// Id of the winning trace.
	#[must_use]
	pub fn winner_id(&self) -> Option<u64> {
		self.winner().and_then(|i| self.trace_ids.get(i).copied())
	}

	/// Whether anything was recalled.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.weights.iter().all(|&w| w == 0.0)
	}

	/// Weight given to a trace id, if it was in the snapshot.
	#[must_use]
	pub fn weight_of(&self, id: u64) -> Option<f64> {
		self.trace_ids
			.iter()
			.position(|&t| t == id)
			.and_then(|i| self.weights.get(i).copied())
	}
}

/// Competitive retrieval front end.
#[derive(Clone, Debug, Default)]
pub struct LcaRetrieval {
	config: RecallConfig,
}

impl LcaRetrieval {
	/// Build a retriever.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if the accumulator parameters are
	/// invalid.
	pub fn new(config: RecallConfig) -> Result<Self> {
		config.lca.validate()?;
		Ok(Self { config })
	}

	/// Retriever for a task configuration.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if the accumulator parameters are
	/// invalid.
	pub fn for_task(config: &TaskConfig) -> Result<Self> {
		Self::new(RecallConfig::from(config))
	}

	/// Active configuration.
	#[must_use]
	pub const fn config(&self) -> &RecallConfig {
		&self.config
	}

	/// Recall from a snapshot.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] for out-of-range gates and
	/// [`Error::DimensionMismatch`] if the query width differs from the
	/// store's key width.
	pub fn recall(
		&self,
		query: &[f64],
		snapshot: &StoreSnapshot<'_>,
		gates: LcaGates,
	) -> Result<Recall> {
		recall_with(
			query,
			snapshot,
			gates,
			&self.config.kernel,
			self.config.function,
			&self.config.lca,
		)
	}
}

/// Recall with the built-in kernel and default dynamics.
///
/// # Errors
///
/// See [`LcaRetrieval::recall`].
pub fn recall(
	query: &[f64],
	snapshot: &StoreSnapshot<'_>,
	gates: LcaGates,
	kernel: KernelKind,
) -> Result<Recall> {
	recall_with(
		query,
		snapshot,
		gates,
		&kernel,
		RecallFunction::Lca,
		&LcaConfig::default(),
	)
}

/// Full retrieval pipeline with a caller-supplied kernel.
///
/// # Arguments
///
/// * `query` - Query key, `key_dim` wide
/// * `snapshot` - Read-only view of the store
/// * `gates` - Per-call gating signals
/// * `kernel` - Similarity function
/// * `function` - Scores-to-weights rule
/// * `lca` - Accumulator dynamics
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for out-of-range gates and
/// [`Error::DimensionMismatch`] if the query width differs from the
/// store's key width.
pub fn recall_with<K: SimilarityKernel + ?Sized>(
	query: &[f64],
	snapshot: &StoreSnapshot<'_>,
	gates: LcaGates,
	kernel: &K,
	function: RecallFunction,
	lca: &LcaConfig,
) -> Result<Recall> {
	gates.validate()?;
	if query.len() != snapshot.key_dim() {
		return Err(Error::DimensionMismatch {
			what: "query",
			expected: snapshot.key_dim(),
			actual: query.len(),
		});
	}

	if snapshot.is_empty() {
		debug!("recall on empty store");
		return Ok(Recall {
			recalled: vec![0.0; snapshot.value_dim()],
			weights: Vec::new(),
			similarities: Vec::new(),
			activations: Vec::new(),
			gates,
			trace_ids: Vec::new(),
		});
	}

	// 1. Score every key
	let similarities = kernel.score_all(query, &snapshot.keys());

	// 2-3. Scores to weights
	let (activations, weights) = match function {
		RecallFunction::Lca => {
			let activations = run_lca(&similarities, &gates, lca).into_vec();
			let weights = competitive_weights(&activations);
			(activations, weights)
		}
		RecallFunction::WinnerTakeAll => {
			let weights = winner_take_all(&similarities);
			(weights.clone(), weights)
		}
	};

	// 4. Blend values
	let mut recalled = vec![0.0; snapshot.value_dim()];
	for (trace, &w) in snapshot.iter().zip(&weights) {
		if w == 0.0 {
			continue;
		}
		for (r, v) in recalled.iter_mut().zip(&trace.value) {
			*r = w.mul_add(*v, *r);
		}
	}

	let recall = Recall {
		recalled,
		weights,
		similarities,
		activations,
		gates,
		trace_ids: snapshot.iter().map(|t| t.id).collect(),
	};
	debug!(
		n_traces = snapshot.len(),
		winner = ?recall.winner_id(),
		"recall complete"
	);
	Ok(recall)
}

/// One-hot on the first maximal positive score; all zero otherwise.
fn winner_take_all(similarities: &[f64]) -> Vec<f64> {
	let mut weights = vec![0.0; similarities.len()];
	let mut best: Option<(usize, f64)> = None;
	for (i, &s) in similarities.iter().enumerate() {
		if s > 0.0 && best.map_or(true, |(_, b)| s > b) {
			best = Some((i, s));
		}
	}
	if let Some((i, _)) = best {
		weights[i] = 1.0;
	}
	weights
}
