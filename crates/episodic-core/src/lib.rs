//! # Episodic Core
//!
//! Constrained event-sequence sampling and competitive episodic recall for
//! memory-augmented agents.
//!
//! ## Two Halves
//!
//! ### Sampling
//!
//! A trial is a walk through a small decision tree: `n_param` features, each
//! taking one of `n_branch` values. The same definition is shown in several
//! parts, with some observations hidden. Consecutive trials must not be too
//! alike, or the agent could solve the task by replaying the last trial:
//!
//! ```text
//! sim(e_i, e_j) = |{ k : path_i[k] = path_j[k] }| / n_param  ≤  cap   for i − lag ≤ j < i
//! ```
//!
//! The [`SequenceSampler`] enforces this by rejection, with an explicit retry
//! budget.
//!
//! ### Recall
//!
//! The [`MemoryStore`] keeps the most recent `(key, value)` traces in FIFO
//! order. Recall scores a query against every key, then lets the traces
//! compete through a leaky competing accumulator:
//!
//! ```text
//! a_j ← max(0, a_j·(1 − leak) + input_gate·s_j − competition·Σ_{l≠j} a_l)
//! ```
//!
//! Final activations are normalized into weights and the recalled vector is
//! the weighted blend of stored values.
//!
//! ## Example
//!
//! ```rust
//! use episodic_core::{
//!     lca::LcaGates,
//!     memory::MemoryStore,
//!     retrieval::recall,
//!     similarity::KernelKind,
//! };
//!
//! let mut store = MemoryStore::new(3, 3, 2).expect("valid sizes");
//! store.write(vec![1.0, 0.0, 0.0], vec![1.0, 0.0]).expect("key width");
//! store.write(vec![0.0, 1.0, 0.0], vec![0.0, 1.0]).expect("key width");
//!
//! let gates = LcaGates::new(1.0, 0.1, 0.5).expect("gates in range");
//! let result = recall(&[0.9, 0.1, 0.0], &store.snapshot(), gates, KernelKind::Cosine)
//!     .expect("query width");
//!
//! assert_eq!(result.winner(), Some(0));
//! println!("recalled {:?} with weights {:?}", result.recalled, result.weights);
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and never installs a subscriber. Warnings
//! flag configurations that are legal but likely to stall the sampler; debug
//! events cover batch statistics, evictions and recall outcomes.
//!
//! ## References
//!
//! - Usher, M., & McClelland, J. L. (2001). *The time course of perceptual
//!   choice: The leaky, competing accumulator model*
//! - Lu, Q., Hasson, U., & Norman, K. A. (2022). *A neural network model of
//!   when to retrieve and encode episodic memories*

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod condition;
pub mod config;
pub mod error;
pub mod lca;
pub mod memory;
pub mod path;
pub mod retrieval;
pub mod sampler;
pub mod similarity;

pub use condition::{pick_condition, BoundaryAction, Condition, ConditionProbabilities};
pub use config::{
	ContextConfig, DataDims, DefinitionSource, PadLength, RemovalCount, RemovalMode, TaskConfig,
};
pub use error::{Error, Result};
pub use lca::{competitive_weights, lca_step, run_lca, LcaConfig, LcaGates};
pub use memory::{DuplicatePolicy, MemoryStore, MemoryTrace, StoreSnapshot, WriteOutcome};
pub use path::{draw_definition, realize_observations, sample_definition, FeaturePath, RemovalPlan};
pub use retrieval::{recall, recall_with, LcaRetrieval, Recall, RecallConfig, RecallFunction};
pub use sampler::{admits, Event, RecentWindow, SequenceSampler, SimilarityBounds};
pub use similarity::{
	cosine_similarity, path_similarity, similarity_matrix, KernelKind, LagSplit, SimilarityKernel,
	SimilarityMatrix,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	use super::*;

	#[test]
	fn test_version() {
		assert!(!VERSION.is_empty());
	}

	#[test]
	fn test_trial_round_trip() {
		let config = TaskConfig {
			n_param: 6,
			n_branch: 3,
			similarity_cap: 0.5,
			similarity_cap_lag: 2,
			..Default::default()
		};
		let sampler = SequenceSampler::new(config.clone()).unwrap();
		let mut rng = StdRng::seed_from_u64(11);
		let events = sampler.sample(4, &mut rng).unwrap();
		let event = &events[3];

		// encode the first part: key = observation row, value = target row
		let dims = sampler.dims();
		let mut store = MemoryStore::for_task(&config, dims.x_dim, dims.y_dim).unwrap();
		for t in config.encoding_times(event.pad) {
			let _ = store.write(event.x[t].clone(), event.y[t].clone()).unwrap();
		}
		assert!(store.len() <= store.capacity());

		let condition = Condition::RecentMemory;
		let action = condition.apply(&mut store, 0, &mut rng);
		assert!(!action.reset_working_memory);

		// querying with the stored key itself takes all of the weight
		let last = *config.encoding_times(event.pad).last().unwrap();
		let retriever = LcaRetrieval::for_task(&config).unwrap();
		let gates = LcaGates::new(1.0, 0.0, 1.0).unwrap();
		let result = retriever.recall(&event.x[last], &store.snapshot(), gates).unwrap();
		let total: f64 = result.weights.iter().sum();
		assert!((total - 1.0).abs() < 1e-9);
		assert_eq!(result.recalled.len(), dims.y_dim);
	}

	#[test]
	fn test_no_memory_recall_is_lures_only() {
		let config = TaskConfig::default();
		let mut store = MemoryStore::for_task(&config, 4, 2).unwrap();
		let _ = store.write(vec![1.0, 0.0, 0.0, 0.0], vec![1.0, 0.0]).unwrap();

		let mut rng = StdRng::seed_from_u64(12);
		let action = Condition::NoMemory.apply(&mut store, 0, &mut rng);
		assert!(action.flushed);

		let result = recall(
			&[1.0, 0.0, 0.0, 0.0],
			&store.snapshot(),
			LcaGates::default(),
			KernelKind::Cosine,
		)
		.unwrap();
		assert_eq!(result.weights.len(), 1);
		assert_eq!(result.trace_ids, action.lure_ids);
	}
}
