//! Similarity
//!
//! Two families of similarity live here:
//!
//! 1. **Path overlap** between definition paths: the count (or fraction)
//!    of positions holding the same value. This drives the sampler's
//!    similarity cap and the batch similarity matrix.
//! 2. **Vector kernels** between a query and stored memory keys. These
//!    feed the competitive recall dynamics.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// Path Overlap
// ============================================================================

/// Overlap between two definition paths.
///
/// Counts positions where `a[i] == b[i]`. With `normalize`, the count is
/// divided by the path length, giving a score in `[0, 1]`.
///
/// Paths of different lengths are compared over the shared prefix and
/// normalized by the longer length. Two empty paths score 0.
#[must_use]
pub fn path_similarity(a: &[usize], b: &[usize], normalize: bool) -> f64 {
	let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
	#[allow(clippy::cast_precision_loss)]
	let matches = matches as f64;
	if !normalize {
		return matches;
	}
	let len = a.len().max(b.len());
	if len == 0 {
		0.0
	} else {
		#[allow(clippy::cast_precision_loss)]
		let len = len as f64;
		matches / len
	}
}

/// Pairwise path similarity for a whole batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
	/// Number of rows (and columns)
	pub size: usize,
	/// Row-major values
	pub values: Vec<f64>,
}

/// Lower-triangle entries grouped by temporal distance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LagSplit {
	/// Pairs with `1 <= i - j <= lag`
	pub recent: Vec<f64>,
	/// Pairs with `i - j > lag`
	pub distant: Vec<f64>,
}

impl SimilarityMatrix {
	/// Entry at row `i`, column `j`.
	#[must_use]
	pub fn get(&self, i: usize, j: usize) -> Option<f64> {
		if i < self.size && j < self.size {
			Some(self.values[i * self.size + j])
		} else {
			None
		}
	}

	/// Row `i` as a slice.
	#[must_use]
	pub fn row(&self, i: usize) -> Option<&[f64]> {
		(i < self.size).then(|| &self.values[i * self.size..(i + 1) * self.size])
	}

	/// Split the strictly-lower triangle into recent and distant pairs.
	///
	/// "Recent" pairs are exactly those a sampler with the same `lag`
	/// constrains.
	#[must_use]
	pub fn lag_split(&self, lag: usize) -> LagSplit {
		let mut split = LagSplit::default();
		for i in 0..self.size {
			for j in 0..i {
				let value = self.values[i * self.size + j];
				if i - j <= lag {
					split.recent.push(value);
				} else {
					split.distant.push(value);
				}
			}
		}
		split
	}
}

/// Build the `[batch, batch]` path similarity matrix.
///
/// Rows are computed in parallel; the result is symmetric with the
/// reflexive value (1, or the path length) on the diagonal.
#[must_use]
pub fn similarity_matrix<P: AsRef<[usize]> + Sync>(paths: &[P], normalize: bool) -> SimilarityMatrix {
	let size = paths.len();
	let values: Vec<f64> = (0..size)
		.into_par_iter()
		.flat_map_iter(|i| {
			let row = paths[i].as_ref();
			paths
				.iter()
				.map(move |other| path_similarity(row, other.as_ref(), normalize))
		})
		.collect();
	SimilarityMatrix { size, values }
}

// ============================================================================
// Vector Kernels
// ============================================================================

/// Compute cosine similarity between two vectors.
///
/// # Returns
///
/// Cosine similarity in range [-1, 1], or 0 if vectors have different
/// lengths or either has zero norm.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
	if a.len() != b.len() {
		return 0.0;
	}

	let (dot_product, norm_a, norm_b) = a
		.iter()
		.zip(b.iter())
		.fold((0.0, 0.0, 0.0), |(dot, na, nb), (&ai, &bi)| {
			(ai.mul_add(bi, dot), ai.mul_add(ai, na), bi.mul_add(bi, nb))
		});

	let magnitude = norm_a.sqrt() * norm_b.sqrt();
	if magnitude == 0.0 {
		0.0
	} else {
		dot_product / magnitude
	}
}

/// Batch cosine similarity of a query against many keys.
///
/// Pre-computes the query norm once.
#[must_use]
pub fn cosine_similarity_batch(query: &[f64], keys: &[&[f64]]) -> Vec<f64> {
	let query_norm: f64 = query.iter().map(|x| x * x).sum::<f64>().sqrt();

	if query_norm == 0.0 {
		return vec![0.0; keys.len()];
	}

	keys.iter()
		.map(|key| {
			if key.len() != query.len() {
				return 0.0;
			}

			let (dot_product, key_norm_sq) = query
				.iter()
				.zip(key.iter())
				.fold((0.0, 0.0), |(dot, kn), (&qi, &ki)| {
					(qi.mul_add(ki, dot), ki.mul_add(ki, kn))
				});

			let key_norm = key_norm_sq.sqrt();
			if key_norm == 0.0 {
				0.0
			} else {
				dot_product / (query_norm * key_norm)
			}
		})
		.collect()
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
	a.iter().zip(b).fold(0.0, |acc, (&x, &y)| x.mul_add(y, acc))
}

#[inline]
fn inverse_l1(a: &[f64], b: &[f64]) -> f64 {
	let d: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum();
	1.0 / (1.0 + d)
}

#[inline]
fn inverse_l2(a: &[f64], b: &[f64]) -> f64 {
	let d = a
		.iter()
		.zip(b)
		.map(|(x, y)| (x - y) * (x - y))
		.sum::<f64>()
		.sqrt();
	1.0 / (1.0 + d)
}

/// A similarity function between a query and a memory key.
///
/// Larger means more similar. Implement this to plug a custom kernel into
/// [`crate::retrieval::recall_with`].
pub trait SimilarityKernel {
	/// Score one query/key pair.
	fn score(&self, query: &[f64], key: &[f64]) -> f64;

	/// Score a query against every key.
	fn score_all(&self, query: &[f64], keys: &[&[f64]]) -> Vec<f64> {
		keys.iter().map(|key| self.score(query, key)).collect()
	}
}

/// Built-in key similarity kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
	/// Cosine similarity, in [-1, 1]
	#[default]
	Cosine,
	/// Raw dot product
	Dot,
	/// `1 / (1 + d)` for Manhattan distance `d`, in (0, 1]
	L1,
	/// `1 / (1 + d)` for Euclidean distance `d`, in (0, 1]
	L2,
}

impl KernelKind {
	/// Configuration name of the kernel.
	#[must_use]
	pub const fn name(self) -> &'static str {
		match self {
			Self::Cosine => "cosine",
			Self::Dot => "dot",
			Self::L1 => "l1",
			Self::L2 => "l2",
		}
	}
}

impl SimilarityKernel for KernelKind {
	#[inline]
	fn score(&self, query: &[f64], key: &[f64]) -> f64 {
		match self {
			Self::Cosine => cosine_similarity(query, key),
			Self::Dot => dot(query, key),
			Self::L1 => inverse_l1(query, key),
			Self::L2 => inverse_l2(query, key),
		}
	}

	fn score_all(&self, query: &[f64], keys: &[&[f64]]) -> Vec<f64> {
		match self {
			Self::Cosine => cosine_similarity_batch(query, keys),
			_ => keys.iter().map(|key| self.score(query, key)).collect(),
		}
	}
}

impl fmt::Display for KernelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for KernelKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"cosine" => Ok(Self::Cosine),
			"dot" => Ok(Self::Dot),
			"l1" => Ok(Self::L1),
			"l2" => Ok(Self::L2),
			other => Err(Error::config("kernel", format!("unknown kernel `{other}`"))),
		}
	}
}
