//! Sequence Sampler
//!
//! Rejection sampling of event batches under a bounded-lookback similarity
//! constraint:
//!
//! 1. **Draft** a candidate definition
//! 2. **Check** it against the last `lag` accepted definitions
//! 3. **Accept** it (realize observations, encode tensors) or **Retry**
//!
//! The lookback window is an explicit value handed to a stateless checker,
//! so one batch never leaks state into another. Each sample gets at most
//! `max_retries` drafts; running out is reported as
//! [`Error::UnsatisfiableConstraint`] rather than looping forever.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::{ContextConfig, DataDims, PadLength, TaskConfig};
use crate::error::{Error, Result};
use crate::path::{draw_definition, realize_observations, FeaturePath, RemovalPlan};
use crate::similarity::path_similarity;

/// Slack allowed when comparing normalized similarity to its bounds.
const BOUND_TOLERANCE: f64 = 1e-9;

// ============================================================================
// Events
// ============================================================================

/// One sampled trial, ready to feed to the agent step by step.
#[derive(Clone, Debug, Serialize)]
pub struct Event {
	/// Observation rows, one per step (`t_total × x_dim`)
	pub x: Vec<Vec<f64>>,
	/// Target rows, one per step (`t_total × y_dim`)
	pub y: Vec<Vec<f64>>,
	/// Underlying path, kept for analysis
	pub path: FeaturePath,
	/// Delay steps appended to each part of this trial
	pub pad: usize,
	/// Context vector appended to every row, if enabled
	pub context: Option<Vec<f64>>,
}

impl Event {
	/// Steps in one part of this trial.
	#[must_use]
	pub fn t_part(&self) -> usize {
		self.path.n_param() + self.pad
	}

	/// Steps in the whole trial.
	#[must_use]
	pub fn t_total(&self) -> usize {
		self.x.len()
	}
}

impl AsRef<[usize]> for Event {
	fn as_ref(&self) -> &[usize] {
		self.path.definition()
	}
}

// ============================================================================
// Similarity Window
// ============================================================================

/// Normalized similarity bounds against recent events.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SimilarityBounds {
	/// Maximum allowed overlap
	pub cap: f64,
	/// Minimum required overlap
	pub floor: Option<f64>,
}

impl SimilarityBounds {
	/// Whether a normalized similarity is within bounds.
	#[inline]
	#[must_use]
	pub fn contains(&self, similarity: f64) -> bool {
		similarity <= self.cap + BOUND_TOLERANCE
			&& self
				.floor
				.map_or(true, |floor| similarity >= floor - BOUND_TOLERANCE)
	}
}

/// The last `lag` accepted definitions, oldest first.
#[derive(Clone, Debug, Default)]
pub struct RecentWindow {
	lag: usize,
	paths: VecDeque<Vec<usize>>,
}

impl RecentWindow {
	/// Empty window of size `lag`.
	#[must_use]
	pub fn new(lag: usize) -> Self {
		Self {
			lag,
			paths: VecDeque::with_capacity(lag),
		}
	}

	/// Record an accepted definition, dropping anything older than `lag`.
	pub fn push(&mut self, definition: Vec<usize>) {
		if self.lag == 0 {
			return;
		}
		if self.paths.len() == self.lag {
			let _ = self.paths.pop_front();
		}
		self.paths.push_back(definition);
	}

	/// Definitions currently in the window.
	pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
		self.paths.iter().map(Vec::as_slice)
	}

	/// Number of definitions held.
	#[must_use]
	pub fn len(&self) -> usize {
		self.paths.len()
	}

	/// True when nothing has been accepted yet (or `lag == 0`).
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.paths.is_empty()
	}
}

/// Check a candidate definition against every definition in `recent`.
///
/// Pure: the caller owns the window.
#[must_use]
pub fn admits<'a>(
	candidate: &[usize],
	recent: impl IntoIterator<Item = &'a [usize]>,
	bounds: &SimilarityBounds,
) -> bool {
	recent
		.into_iter()
		.all(|previous| bounds.contains(path_similarity(candidate, previous, true)))
}

/// States of the per-sample rejection loop.
enum SampleState {
	Draft,
	Check(Vec<usize>),
	Retry,
	Accept(Vec<usize>),
}

// ============================================================================
// SequenceSampler
// ============================================================================

/// Generates batches of events under the configured similarity bounds.
#[derive(Clone, Debug)]
pub struct SequenceSampler {
	config: TaskConfig,
	plan: RemovalPlan,
	bounds: SimilarityBounds,
	dims: DataDims,
}

impl SequenceSampler {
	/// Validate `config` and build a sampler.
	///
	/// Logs a warning when the cap is below chance overlap (`1/n_branch`),
	/// where batches can easily exhaust the retry budget.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `config` fails validation.
	pub fn new(config: TaskConfig) -> Result<Self> {
		config.validate()?;
		if config.similarity_cap_lag > 0 && config.similarity_cap < config.chance() {
			warn!(
				cap = config.similarity_cap,
				chance = config.chance(),
				lag = config.similarity_cap_lag,
				"similarity cap is below chance overlap; sampling may exhaust its retry budget"
			);
		}
		let plan = RemovalPlan::from(&config);
		let bounds = SimilarityBounds {
			cap: config.similarity_cap,
			floor: config.similarity_floor,
		};
		let dims = config.data_dims();
		Ok(Self {
			config,
			plan,
			bounds,
			dims,
		})
	}

	/// The validated configuration.
	#[must_use]
	pub const fn config(&self) -> &TaskConfig {
		&self.config
	}

	/// Tensor widths of sampled events.
	#[must_use]
	pub const fn dims(&self) -> DataDims {
		self.dims
	}

	/// Similarity bounds in force.
	#[must_use]
	pub const fn bounds(&self) -> SimilarityBounds {
		self.bounds
	}

	/// Sample `n_samples` events.
	///
	/// For every accepted event `i` and every `j` with `i - lag <= j < i`,
	/// `similarity(e_i, e_j)` is within the configured bounds.
	///
	/// # Errors
	///
	/// Returns [`Error::UnsatisfiableConstraint`] if some position could not
	/// be filled within `max_retries` drafts. No partial batch is returned.
	#[instrument(skip_all, fields(n_samples = n_samples))]
	pub fn sample<R: Rng + ?Sized>(&self, n_samples: usize, rng: &mut R) -> Result<Vec<Event>> {
		let mut window = RecentWindow::new(self.config.similarity_cap_lag);
		let mut events = Vec::with_capacity(n_samples);
		let mut total_attempts = 0;

		for index in 0..n_samples {
			let (definition, attempts) = self.draw_accepted(index, &window, rng)?;
			total_attempts += attempts;
			let event = self.build_event(definition.clone(), rng)?;
			window.push(definition);
			events.push(event);
		}

		debug!(n_samples, total_attempts, "batch sampled");
		Ok(events)
	}

	/// Run the draft/check loop for one position.
	fn draw_accepted<R: Rng + ?Sized>(
		&self,
		index: usize,
		window: &RecentWindow,
		rng: &mut R,
	) -> Result<(Vec<usize>, usize)> {
		let mut attempts = 0;
		let mut state = SampleState::Draft;
		loop {
			state = match state {
				SampleState::Draft => {
					if attempts == self.config.max_retries {
						return Err(Error::UnsatisfiableConstraint {
							index,
							attempts,
							cap: self.bounds.cap,
							lag: self.config.similarity_cap_lag,
						});
					}
					attempts += 1;
					SampleState::Check(draw_definition(
						&self.config.definition,
						self.config.n_param,
						self.config.n_branch,
						rng,
					)?)
				}
				SampleState::Check(candidate) => {
					if admits(&candidate, window.iter(), &self.bounds) {
						SampleState::Accept(candidate)
					} else {
						SampleState::Retry
					}
				}
				SampleState::Retry => SampleState::Draft,
				SampleState::Accept(candidate) => return Ok((candidate, attempts)),
			};
		}
	}

	/// Turn an accepted definition into a full event.
	///
	/// Realizes the masked observations, draws the pad and context, and
	/// encodes the observation and target rows.
	///
	/// # Errors
	///
	/// Returns an error if the definition does not fit the configuration.
	pub fn build_event<R: Rng + ?Sized>(&self, definition: Vec<usize>, rng: &mut R) -> Result<Event> {
		let observed = realize_observations(&definition, self.config.n_parts, &self.plan, rng)?;
		let path = FeaturePath::new(definition, observed, self.config.n_branch)?;
		let pad = match self.config.pad_len {
			PadLength::Fixed(n) => n,
			PadLength::Random { max } => rng.gen_range(0..=max),
		};
		let context = self.config.context.map(|c| draw_context(c, rng));
		let (x, y) = self.encode(&path, pad, context.as_deref())?;
		Ok(Event {
			x,
			y,
			path,
			pad,
			context,
		})
	}

	/// Encode a path as observation and target rows.
	///
	/// Row layout: `[key one-hot | value one-hot | context | unobserved]`.
	/// Masked steps set only the unobserved bit (plus context); delay steps
	/// carry only the context and an all-zero target.
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if the path length or the context
	/// width differs from the configuration, and [`Error::InvalidPath`] if a
	/// feature value is outside `0..n_branch`.
	pub fn encode(
		&self,
		path: &FeaturePath,
		pad: usize,
		context: Option<&[f64]>,
	) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>)> {
		let n_param = path.n_param();
		let n_branch = self.config.n_branch;
		if n_param != self.config.n_param {
			return Err(Error::DimensionMismatch {
				what: "path",
				expected: self.config.n_param,
				actual: n_param,
			});
		}
		if let Some(&value) = path.definition().iter().find(|&&v| v >= n_branch) {
			return Err(Error::InvalidPath {
				reason: format!("feature value {value} is out of range for {n_branch} branches"),
			});
		}
		if let Some(context) = context {
			if context.len() != self.config.context_dim() {
				return Err(Error::DimensionMismatch {
					what: "context",
					expected: self.config.context_dim(),
					actual: context.len(),
				});
			}
		}
		let t_part = n_param + pad;
		let t_total = t_part * path.n_parts();
		let context_start = n_param + n_branch;
		let unobserved_bit = self.dims.x_dim - 1;

		let mut x = Vec::with_capacity(t_total);
		let mut y = Vec::with_capacity(t_total);
		for t in 0..t_total {
			let (part, step) = (t / t_part, t % t_part);
			let mut x_t = vec![0.0; self.dims.x_dim];
			let mut y_t = vec![0.0; self.dims.y_dim];
			if let Some(context) = context {
				x_t[context_start..context_start + context.len()].copy_from_slice(context);
			}
			if step < n_param {
				match path.observed()[part * n_param + step] {
					Some(value) => {
						x_t[step] = 1.0;
						x_t[n_param + value] = 1.0;
					}
					None => x_t[unobserved_bit] = 1.0,
				}
				y_t[path.definition()[step]] = 1.0;
			}
			x.push(x_t);
			y.push(y_t);
		}
		Ok((x, y))
	}

	/// Sample independent batches in parallel.
	///
	/// Batch `b` uses its own `StdRng` seeded with `base_seed + b`, so the
	/// result does not depend on thread scheduling.
	///
	/// # Errors
	///
	/// Returns the first error raised by any batch.
	#[instrument(skip_all, fields(n_batches = n_batches, batch_size = batch_size))]
	pub fn sample_batches(
		&self,
		n_batches: usize,
		batch_size: usize,
		base_seed: u64,
	) -> Result<Vec<Vec<Event>>> {
		(0..n_batches)
			.into_par_iter()
			.map(|b| {
				let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(b as u64));
				self.sample(batch_size, &mut rng)
			})
			.collect()
	}
}

fn draw_context<R: Rng + ?Sized>(config: ContextConfig, rng: &mut R) -> Vec<f64> {
	if config.onehot {
		let mut context = vec![0.0; config.dim];
		context[rng.gen_range(0..config.dim)] = 1.0;
		context
	} else {
		(0..config.dim).map(|_| rng.sample(StandardNormal)).collect()
	}
}
