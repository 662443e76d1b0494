//! Feature Paths
//!
//! A feature path is one instance of the branching structure: a
//! definition (one branch choice per feature) plus the per-step values the
//! agent actually observes once the path is repeated across parts and
//! partially masked.

use rand::seq::index;
use rand::Rng;
use serde::Serialize;

use crate::config::{check_path, DefinitionSource, RemovalCount, RemovalMode, TaskConfig};
use crate::error::{Error, Result};
use crate::similarity::path_similarity;

/// One sampled event: definition plus realized observations.
///
/// `observed` has `n_param × n_parts` entries; `None` marks a step whose
/// value was removed. Every `Some(v)` at step `t` equals
/// `definition[t % n_param]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeaturePath {
	definition: Vec<usize>,
	observed: Vec<Option<usize>>,
}

impl FeaturePath {
	/// Build a path, checking its invariants.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidPath`] if the definition is empty or holds a
	/// value `>= n_branch`, if `observed` is not a whole number of parts,
	/// or if an observed value disagrees with the definition.
	pub fn new(definition: Vec<usize>, observed: Vec<Option<usize>>, n_branch: usize) -> Result<Self> {
		let n_param = definition.len();
		if n_param == 0 {
			return Err(Error::InvalidPath {
				reason: "empty definition".into(),
			});
		}
		if let Some(&bad) = definition.iter().find(|&&v| v >= n_branch) {
			return Err(Error::InvalidPath {
				reason: format!("definition value {bad} is out of [0, {n_branch})"),
			});
		}
		if observed.is_empty() || observed.len() % n_param != 0 {
			return Err(Error::InvalidPath {
				reason: format!(
					"{} observations is not a whole number of {n_param}-step parts",
					observed.len()
				),
			});
		}
		for (t, value) in observed.iter().enumerate() {
			if let Some(v) = value {
				if *v != definition[t % n_param] {
					return Err(Error::InvalidPath {
						reason: format!(
							"step {t} observes {v} but the definition holds {}",
							definition[t % n_param]
						),
					});
				}
			}
		}
		Ok(Self {
			definition,
			observed,
		})
	}

	/// The branch chosen for every feature.
	#[must_use]
	pub fn definition(&self) -> &[usize] {
		&self.definition
	}

	/// Per-step observed values across all parts.
	#[must_use]
	pub fn observed(&self) -> &[Option<usize>] {
		&self.observed
	}

	/// Features per part.
	#[must_use]
	pub fn n_param(&self) -> usize {
		self.definition.len()
	}

	/// Number of parts.
	#[must_use]
	pub fn n_parts(&self) -> usize {
		self.observed.len() / self.n_param()
	}

	/// Observed values for part `k`.
	#[must_use]
	pub fn part(&self, k: usize) -> Option<&[Option<usize>]> {
		let n = self.n_param();
		self.observed.get(k * n..(k + 1) * n)
	}

	/// Number of masked steps across all parts.
	#[must_use]
	pub fn n_unobserved(&self) -> usize {
		self.observed.iter().filter(|v| v.is_none()).count()
	}

	/// Definition overlap with another path.
	#[must_use]
	pub fn similarity(&self, other: &Self, normalize: bool) -> f64 {
		path_similarity(&self.definition, &other.definition, normalize)
	}
}

impl AsRef<[usize]> for FeaturePath {
	fn as_ref(&self) -> &[usize] {
		&self.definition
	}
}

// ============================================================================
// Definition Sampling
// ============================================================================

/// Draw a definition with every position uniform over `[0, n_branch)`.
pub fn sample_definition<R: Rng + ?Sized>(n_param: usize, n_branch: usize, rng: &mut R) -> Vec<usize> {
	(0..n_param).map(|_| rng.gen_range(0..n_branch)).collect()
}

/// Draw a definition from a configured source.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if a fixed or default path does not
/// fit `(n_param, n_branch)` or the bias probability is outside `[0, 1]`.
pub fn draw_definition<R: Rng + ?Sized>(
	source: &DefinitionSource,
	n_param: usize,
	n_branch: usize,
	rng: &mut R,
) -> Result<Vec<usize>> {
	match source {
		DefinitionSource::Uniform => Ok(sample_definition(n_param, n_branch, rng)),
		DefinitionSource::Fixed(path) => {
			check_path("definition", path, n_param, n_branch)?;
			Ok(path.clone())
		}
		DefinitionSource::Biased { default_path, prob } => {
			check_path("definition", default_path, n_param, n_branch)?;
			if n_branch < 2 {
				return Err(Error::config("n_branch", "needs at least 2 branches"));
			}
			if !(0.0..=1.0).contains(prob) {
				return Err(Error::config("definition.prob", format!("{prob} is not in [0, 1]")));
			}
			Ok(default_path
				.iter()
				.map(|&d| {
					if rng.gen_bool(*prob) {
						d
					} else {
						// uniform over the other n_branch - 1 values
						let r = rng.gen_range(0..n_branch - 1);
						if r >= d {
							r + 1
						} else {
							r
						}
					}
				})
				.collect())
		}
	}
}

// ============================================================================
// Observation Masking
// ============================================================================

/// Masking settings for the encoding part and the recall parts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemovalPlan {
	/// Removal probability in part 0
	pub p_encode: f64,
	/// Removal probability in parts 1..
	pub p_recall: f64,
	/// Mode in part 0
	pub mode_encode: RemovalMode,
	/// Mode in parts 1..
	pub mode_recall: RemovalMode,
	/// How partial mode counts positions
	pub count: RemovalCount,
}

impl From<&TaskConfig> for RemovalPlan {
	fn from(config: &TaskConfig) -> Self {
		Self {
			p_encode: config.p_rm_ob_enc,
			p_recall: config.p_rm_ob_rcl,
			mode_encode: config.mode_rm_ob_enc,
			mode_recall: config.mode_rm_ob_rcl,
			count: config.removal,
		}
	}
}

impl RemovalPlan {
	/// Plan that never masks anything.
	#[must_use]
	pub const fn none() -> Self {
		Self {
			p_encode: 0.0,
			p_recall: 0.0,
			mode_encode: RemovalMode::Partial,
			mode_recall: RemovalMode::Partial,
			count: RemovalCount::Probabilistic,
		}
	}

	fn validate(&self) -> Result<()> {
		for (field, p) in [("p_rm_ob_enc", self.p_encode), ("p_rm_ob_rcl", self.p_recall)] {
			if !(0.0..=1.0).contains(&p) {
				return Err(Error::config(field, format!("{p} is not in [0, 1]")));
			}
		}
		Ok(())
	}
}

fn mask_part<R: Rng + ?Sized>(
	slice: &mut [Option<usize>],
	p: f64,
	mode: RemovalMode,
	count: RemovalCount,
	rng: &mut R,
) {
	match (mode, count) {
		(RemovalMode::All, _) => {
			if rng.gen_bool(p) {
				slice.fill(None);
			}
		}
		(RemovalMode::Partial, RemovalCount::Probabilistic) => {
			for value in slice.iter_mut() {
				if rng.gen_bool(p) {
					*value = None;
				}
			}
		}
		(RemovalMode::Partial, RemovalCount::Fixed) => {
			#[allow(
				clippy::cast_precision_loss,
				clippy::cast_possible_truncation,
				clippy::cast_sign_loss
			)]
			let k = ((p * slice.len() as f64).round() as usize).min(slice.len());
			for i in index::sample(rng, slice.len(), k) {
				slice[i] = None;
			}
		}
	}
}

/// Repeat a definition over `n_parts` parts and mask observations.
///
/// Part 0 is the encoding part and uses the `encode` settings; every later
/// part uses the `recall` settings. With both probabilities at 0 each part
/// reproduces the definition exactly; with probability 1 in `All` mode the
/// part is fully unobserved.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a probability outside `[0, 1]` or
/// `n_parts == 0`.
pub fn realize_observations<R: Rng + ?Sized>(
	definition: &[usize],
	n_parts: usize,
	plan: &RemovalPlan,
	rng: &mut R,
) -> Result<Vec<Option<usize>>> {
	if n_parts == 0 {
		return Err(Error::config("n_parts", "must be positive"));
	}
	plan.validate()?;

	let n_param = definition.len();
	let mut observed: Vec<Option<usize>> = Vec::with_capacity(n_param * n_parts);
	for k in 0..n_parts {
		let start = observed.len();
		observed.extend(definition.iter().copied().map(Some));
		let (p, mode) = if k == 0 {
			(plan.p_encode, plan.mode_encode)
		} else {
			(plan.p_recall, plan.mode_recall)
		};
		mask_part(&mut observed[start..], p, mode, plan.count, rng);
	}
	Ok(observed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	#[test]
	fn test_sample_definition_range() {
		let mut rng = StdRng::seed_from_u64(7);
		let def = sample_definition(50, 3, &mut rng);
		assert_eq!(def.len(), 50);
		assert!(def.iter().all(|&v| v < 3));
		// with 50 draws every branch should appear
		for b in 0..3 {
			assert!(def.contains(&b));
		}
	}

	#[test]
	fn test_fixed_definition_returned_verbatim() {
		let mut rng = StdRng::seed_from_u64(1);
		let source = DefinitionSource::Fixed(vec![2, 0, 1]);
		for _ in 0..5 {
			assert_eq!(draw_definition(&source, 3, 3, &mut rng).unwrap(), vec![2, 0, 1]);
		}
		assert!(draw_definition(&source, 4, 3, &mut rng).is_err());
	}

	#[test]
	fn test_biased_definition_extremes() {
		let mut rng = StdRng::seed_from_u64(3);
		let default_path = vec![1, 1, 0, 2];
		let always = DefinitionSource::Biased {
			default_path: default_path.clone(),
			prob: 1.0,
		};
		assert_eq!(draw_definition(&always, 4, 3, &mut rng).unwrap(), default_path);

		let never = DefinitionSource::Biased {
			default_path: default_path.clone(),
			prob: 0.0,
		};
		for _ in 0..20 {
			let def = draw_definition(&never, 4, 3, &mut rng).unwrap();
			assert!(def.iter().zip(&default_path).all(|(a, b)| a != b));
			assert!(def.iter().all(|&v| v < 3));
		}
	}

	#[test]
	fn test_no_removal_reproduces_definition() {
		let mut rng = StdRng::seed_from_u64(11);
		let def = vec![0, 2, 1, 1];
		let observed = realize_observations(&def, 3, &RemovalPlan::none(), &mut rng).unwrap();
		assert_eq!(observed.len(), 12);
		for (t, v) in observed.iter().enumerate() {
			assert_eq!(*v, Some(def[t % 4]));
		}
	}

	#[test]
	fn test_full_removal_all_mode() {
		let mut rng = StdRng::seed_from_u64(5);
		let def = vec![0, 1, 0];
		let plan = RemovalPlan {
			p_encode: 1.0,
			p_recall: 1.0,
			mode_encode: RemovalMode::All,
			mode_recall: RemovalMode::All,
			count: RemovalCount::Probabilistic,
		};
		let observed = realize_observations(&def, 2, &plan, &mut rng).unwrap();
		assert!(observed.iter().all(Option::is_none));
	}

	#[test]
	fn test_all_mode_is_all_or_nothing() {
		let mut rng = StdRng::seed_from_u64(9);
		let def = vec![0, 1, 0, 1, 1];
		let plan = RemovalPlan {
			p_recall: 0.5,
			mode_recall: RemovalMode::All,
			..RemovalPlan::none()
		};
		for _ in 0..30 {
			let observed = realize_observations(&def, 2, &plan, &mut rng).unwrap();
			let part = &observed[5..];
			let masked = part.iter().filter(|v| v.is_none()).count();
			assert!(masked == 0 || masked == 5);
			// encoding part untouched
			assert!(observed[..5].iter().all(Option::is_some));
		}
	}

	#[test]
	fn test_fixed_count_removal() {
		let mut rng = StdRng::seed_from_u64(13);
		let def = vec![0; 10];
		let plan = RemovalPlan {
			p_encode: 0.3,
			count: RemovalCount::Fixed,
			..RemovalPlan::none()
		};
		for _ in 0..10 {
			let observed = realize_observations(&def, 2, &plan, &mut rng).unwrap();
			assert_eq!(observed[..10].iter().filter(|v| v.is_none()).count(), 3);
			assert_eq!(observed[10..].iter().filter(|v| v.is_none()).count(), 0);
		}
	}

	#[test]
	fn test_bad_probability_rejected() {
		let mut rng = StdRng::seed_from_u64(0);
		let plan = RemovalPlan {
			p_recall: -0.1,
			..RemovalPlan::none()
		};
		let err = realize_observations(&[0, 1], 2, &plan, &mut rng).unwrap_err();
		assert!(err.is_config());
	}

	#[test]
	fn test_feature_path_invariants() {
		let path = FeaturePath::new(vec![0, 1], vec![Some(0), None, None, Some(1)], 2).unwrap();
		assert_eq!(path.n_param(), 2);
		assert_eq!(path.n_parts(), 2);
		assert_eq!(path.n_unobserved(), 2);
		assert_eq!(path.part(1), Some(&[None, Some(1)][..]));
		assert!(path.part(2).is_none());

		// inconsistent with definition
		assert!(FeaturePath::new(vec![0, 1], vec![Some(1), Some(1)], 2).is_err());
		// ragged parts
		assert!(FeaturePath::new(vec![0, 1], vec![Some(0), Some(1), None], 2).is_err());
		// value out of range
		assert!(FeaturePath::new(vec![0, 2], vec![None, None], 2).is_err());
	}
}
