//! Episodic Memory Store
//!
//! A fixed-capacity, insertion-ordered collection of `(key, value)` traces.
//! Writes past capacity evict the oldest trace (FIFO). Decoy traces
//! ("lures") live in their own FIFO of the same capacity so that adding
//! decoys never evicts genuine memories.
//!
//! The store is condition-agnostic: it only exposes `write`, `flush`,
//! `add_lures` and `snapshot`. Deciding *when* to call them belongs to the
//! caller (see [`crate::condition`]).

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TaskConfig;
use crate::error::{Error, Result};

/// One stored memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryTrace {
	/// Insertion sequence number, unique within a store
	pub id: u64,
	/// Retrieval key
	pub key: Vec<f64>,
	/// Recalled content
	pub value: Vec<f64>,
	/// Whether this is a decoy
	pub is_lure: bool,
}

/// What to do when a write repeats an existing genuine key exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
	/// Store another trace
	#[default]
	Keep,
	/// Ignore the write
	Skip,
	/// Overwrite the existing trace's value in place
	Refresh,
}

/// Result of a single write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
	/// A new trace was stored, possibly evicting the oldest one
	Inserted {
		/// Id of the new trace
		id: u64,
		/// Id of the evicted trace, if the store was full
		evicted: Option<u64>,
	},
	/// The write was a duplicate and was ignored
	Skipped {
		/// Id of the existing trace
		existing: u64,
	},
	/// The write was a duplicate and replaced the existing value
	Refreshed {
		/// Id of the refreshed trace
		id: u64,
	},
}

// ============================================================================
// Ring
// ============================================================================

/// FIFO ring with a runtime capacity.
#[derive(Clone, Debug)]
struct TraceRing {
	slots: Vec<MemoryTrace>,
	head: usize,
	capacity: usize,
}

impl TraceRing {
	fn new(capacity: usize) -> Self {
		Self {
			slots: Vec::with_capacity(capacity),
			head: 0,
			capacity,
		}
	}

	/// Push a trace, returning the evicted one when full.
	fn push(&mut self, trace: MemoryTrace) -> Option<MemoryTrace> {
		if self.slots.len() < self.capacity {
			self.slots.push(trace);
			return None;
		}
		let evicted = std::mem::replace(&mut self.slots[self.head], trace);
		self.head = (self.head + 1) % self.capacity;
		Some(evicted)
	}

	/// Oldest to newest.
	fn iter(&self) -> impl Iterator<Item = &MemoryTrace> {
		let (newer, older) = self.slots.split_at(self.head);
		older.iter().chain(newer)
	}

	fn iter_mut(&mut self) -> impl Iterator<Item = &mut MemoryTrace> {
		self.slots.iter_mut()
	}

	fn len(&self) -> usize {
		self.slots.len()
	}

	fn clear(&mut self) {
		self.slots.clear();
		self.head = 0;
	}
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Fixed-capacity episodic memory.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	genuine: TraceRing,
	lures: TraceRing,
	key_dim: usize,
	value_dim: usize,
	policy: DuplicatePolicy,
	next_id: u64,
}

impl MemoryStore {
	/// Create an empty store.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if any size is zero.
	pub fn new(capacity: usize, key_dim: usize, value_dim: usize) -> Result<Self> {
		if capacity == 0 {
			return Err(Error::config("capacity", "must be positive"));
		}
		if key_dim == 0 {
			return Err(Error::config("key_dim", "must be positive"));
		}
		if value_dim == 0 {
			return Err(Error::config("value_dim", "must be positive"));
		}
		Ok(Self {
			genuine: TraceRing::new(capacity),
			lures: TraceRing::new(capacity),
			key_dim,
			value_dim,
			policy: DuplicatePolicy::default(),
			next_id: 0,
		})
	}

	/// Create a store sized by `n_event_remember × n_segments`.
	///
	/// # Errors
	///
	/// Returns an error if the task config is invalid or a width is zero.
	pub fn for_task(config: &TaskConfig, key_dim: usize, value_dim: usize) -> Result<Self> {
		config.validate()?;
		Self::new(config.memory_capacity(), key_dim, value_dim)
	}

	/// Set the duplicate-key policy.
	#[must_use]
	pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
		self.policy = policy;
		self
	}

	/// Maximum number of genuine traces (and, separately, of lures).
	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.genuine.capacity
	}

	/// Key width.
	#[must_use]
	pub const fn key_dim(&self) -> usize {
		self.key_dim
	}

	/// Value width.
	#[must_use]
	pub const fn value_dim(&self) -> usize {
		self.value_dim
	}

	/// Total traces held, genuine plus lures.
	#[must_use]
	pub fn len(&self) -> usize {
		self.genuine.len() + self.lures.len()
	}

	/// True when no trace is held.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Genuine traces held.
	#[must_use]
	pub fn genuine_len(&self) -> usize {
		self.genuine.len()
	}

	/// Lures held.
	#[must_use]
	pub fn lure_len(&self) -> usize {
		self.lures.len()
	}

	/// True when the next genuine write will evict.
	#[must_use]
	pub fn is_full(&self) -> bool {
		self.genuine.len() == self.genuine.capacity
	}

	fn check_dims(&self, key: &[f64], value: &[f64]) -> Result<()> {
		if key.len() != self.key_dim {
			return Err(Error::DimensionMismatch {
				what: "key",
				expected: self.key_dim,
				actual: key.len(),
			});
		}
		if value.len() != self.value_dim {
			return Err(Error::DimensionMismatch {
				what: "value",
				expected: self.value_dim,
				actual: value.len(),
			});
		}
		Ok(())
	}

	fn take_id(&mut self) -> u64 {
		let id = self.next_id;
		self.next_id += 1;
		id
	}

	/// Store a genuine trace.
	///
	/// Inserts at the next free slot; when full, the oldest genuine trace
	/// is evicted first. O(1) under [`DuplicatePolicy::Keep`].
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if `key` or `value` has the
	/// wrong width.
	pub fn write(&mut self, key: Vec<f64>, value: Vec<f64>) -> Result<WriteOutcome> {
		self.check_dims(&key, &value)?;

		if self.policy != DuplicatePolicy::Keep {
			if let Some(existing) = self.genuine.iter_mut().find(|t| t.key == key) {
				return Ok(match self.policy {
					DuplicatePolicy::Refresh => {
						existing.value = value;
						WriteOutcome::Refreshed { id: existing.id }
					}
					_ => WriteOutcome::Skipped { existing: existing.id },
				});
			}
		}

		let id = self.take_id();
		let evicted = self
			.genuine
			.push(MemoryTrace {
				id,
				key,
				value,
				is_lure: false,
			})
			.map(|old| old.id);
		if let Some(evicted) = evicted {
			debug!(id, evicted, "memory full, evicted oldest trace");
		}
		Ok(WriteOutcome::Inserted { id, evicted })
	}

	/// Remove every trace, genuine and lure.
	pub fn flush(&mut self) {
		debug!(genuine = self.genuine.len(), lures = self.lures.len(), "memory flushed");
		self.genuine.clear();
		self.lures.clear();
	}

	/// Insert `count` decoy traces.
	///
	/// Lure keys are drawn around the genuine keys: per-dimension mean plus
	/// Gaussian noise scaled by the per-dimension standard deviation, so a
	/// lure is on average as similar to a query as a genuine trace. With no
	/// genuine traces the key is standard normal. Lure values are
	/// standard-normal vectors scaled to the mean genuine value norm, and
	/// carry no task content.
	///
	/// Returns the ids of the new lures.
	pub fn add_lures<R: Rng + ?Sized>(&mut self, count: usize, rng: &mut R) -> Vec<u64> {
		let (mean, std) = self.key_moments();
		let value_norm = self.mean_value_norm();

		(0..count)
			.map(|_| {
				let key: Vec<f64> = match (&mean, &std) {
					(Some(mean), Some(std)) => mean
						.iter()
						.zip(std)
						.map(|(&m, &s)| s.mul_add(rng.sample::<f64, _>(StandardNormal), m))
						.collect(),
					_ => (0..self.key_dim).map(|_| rng.sample(StandardNormal)).collect(),
				};
				let mut value: Vec<f64> =
					(0..self.value_dim).map(|_| rng.sample(StandardNormal)).collect();
				let norm = value.iter().map(|v| v * v).sum::<f64>().sqrt();
				if norm > 0.0 {
					for v in &mut value {
						*v *= value_norm / norm;
					}
				}

				let id = self.take_id();
				let _ = self.lures.push(MemoryTrace {
					id,
					key,
					value,
					is_lure: true,
				});
				id
			})
			.collect()
	}

	/// Per-dimension mean and standard deviation of genuine keys.
	fn key_moments(&self) -> (Option<Vec<f64>>, Option<Vec<f64>>) {
		let n = self.genuine.len();
		if n == 0 {
			return (None, None);
		}
		#[allow(clippy::cast_precision_loss)]
		let n = n as f64;
		let mut mean = vec![0.0; self.key_dim];
		for trace in self.genuine.iter() {
			for (m, k) in mean.iter_mut().zip(&trace.key) {
				*m += k / n;
			}
		}
		let mut var = vec![0.0; self.key_dim];
		for trace in self.genuine.iter() {
			for ((v, k), m) in var.iter_mut().zip(&trace.key).zip(&mean) {
				*v += (k - m) * (k - m) / n;
			}
		}
		let std = var.into_iter().map(f64::sqrt).collect();
		(Some(mean), Some(std))
	}

	fn mean_value_norm(&self) -> f64 {
		let n = self.genuine.len();
		if n == 0 {
			return 1.0;
		}
		let total: f64 = self
			.genuine
			.iter()
			.map(|t| t.value.iter().map(|v| v * v).sum::<f64>().sqrt())
			.sum();
		#[allow(clippy::cast_precision_loss)]
		let mean = total / n as f64;
		if mean > 0.0 {
			mean
		} else {
			1.0
		}
	}

	/// Read-only view: genuine traces oldest to newest, then lures.
	#[must_use]
	pub fn snapshot(&self) -> StoreSnapshot<'_> {
		StoreSnapshot {
			traces: self.genuine.iter().chain(self.lures.iter()).collect(),
			key_dim: self.key_dim,
			value_dim: self.value_dim,
		}
	}
}

// ============================================================================
// Snapshot
// ============================================================================

/// Ordered, read-only view of a store's traces.
#[derive(Clone, Debug)]
pub struct StoreSnapshot<'a> {
	traces: Vec<&'a MemoryTrace>,
	key_dim: usize,
	value_dim: usize,
}

impl<'a> StoreSnapshot<'a> {
	/// Build a snapshot over arbitrary traces.
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if a trace does not match the
	/// given widths.
	pub fn from_traces(
		traces: Vec<&'a MemoryTrace>,
		key_dim: usize,
		value_dim: usize,
	) -> Result<Self> {
		for trace in &traces {
			if trace.key.len() != key_dim {
				return Err(Error::DimensionMismatch {
					what: "key",
					expected: key_dim,
					actual: trace.key.len(),
				});
			}
			if trace.value.len() != value_dim {
				return Err(Error::DimensionMismatch {
					what: "value",
					expected: value_dim,
					actual: trace.value.len(),
				});
			}
		}
		Ok(Self {
			traces,
			key_dim,
			value_dim,
		})
	}

	/// Number of traces.
	#[must_use]
	pub fn len(&self) -> usize {
		self.traces.len()
	}

	/// True when there is nothing to recall.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.traces.is_empty()
	}

	/// Key width.
	#[must_use]
	pub const fn key_dim(&self) -> usize {
		self.key_dim
	}

	/// Value width.
	#[must_use]
	pub const fn value_dim(&self) -> usize {
		self.value_dim
	}

	/// Trace at position `i`.
	#[must_use]
	pub fn get(&self, i: usize) -> Option<&'a MemoryTrace> {
		self.traces.get(i).copied()
	}

	/// Traces in order.
	pub fn iter(&self) -> impl Iterator<Item = &'a MemoryTrace> + '_ {
		self.traces.iter().copied()
	}

	/// Keys in order.
	#[must_use]
	pub fn keys(&self) -> Vec<&'a [f64]> {
		self.traces.iter().map(|t| t.key.as_slice()).collect()
	}

	/// Position of the trace with `id`.
	#[must_use]
	pub fn position(&self, id: u64) -> Option<usize> {
		self.traces.iter().position(|t| t.id == id)
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn onehot(i: usize, dim: usize) -> Vec<f64> {
		let mut v = vec![0.0; dim];
		v[i] = 1.0;
		v
	}

	#[test]
	fn test_write_until_full() {
		let mut store = MemoryStore::new(3, 2, 2).unwrap();
		assert!(store.is_empty());
		for i in 0..3 {
			let outcome = store.write(vec![i as f64, 1.0], vec![0.0, 1.0]).unwrap();
			assert_eq!(outcome, WriteOutcome::Inserted { id: i, evicted: None });
		}
		assert!(store.is_full());
		assert_eq!(store.len(), 3);
	}

	#[test]
	fn test_fifo_eviction_keeps_most_recent() {
		let mut store = MemoryStore::new(3, 1, 1).unwrap();
		let k = 4;
		for i in 0..(3 + k) {
			let _ = store.write(vec![i as f64], vec![i as f64]).unwrap();
			assert!(store.len() <= store.capacity());
		}
		let snapshot = store.snapshot();
		let ids: Vec<u64> = snapshot.iter().map(|t| t.id).collect();
		assert_eq!(ids, vec![4, 5, 6]);
		let keys: Vec<f64> = snapshot.iter().map(|t| t.key[0]).collect();
		assert_eq!(keys, vec![4.0, 5.0, 6.0]);
	}

	#[test]
	fn test_eviction_reports_oldest() {
		let mut store = MemoryStore::new(2, 1, 1).unwrap();
		let _ = store.write(vec![0.0], vec![0.0]).unwrap();
		let _ = store.write(vec![1.0], vec![1.0]).unwrap();
		let outcome = store.write(vec![2.0], vec![2.0]).unwrap();
		assert_eq!(outcome, WriteOutcome::Inserted { id: 2, evicted: Some(0) });
	}

	#[test]
	fn test_flush_clears_everything() {
		let mut rng = StdRng::seed_from_u64(0);
		let mut store = MemoryStore::new(2, 2, 2).unwrap();
		let _ = store.write(onehot(0, 2), onehot(1, 2)).unwrap();
		let _ = store.add_lures(2, &mut rng);
		assert_eq!(store.len(), 3);
		store.flush();
		assert!(store.is_empty());
		assert!(store.snapshot().is_empty());
		// writes after a flush start from empty slots
		let outcome = store.write(onehot(1, 2), onehot(0, 2)).unwrap();
		assert!(matches!(outcome, WriteOutcome::Inserted { evicted: None, .. }));
	}

	#[test]
	fn test_dimension_checked() {
		let mut store = MemoryStore::new(2, 3, 2).unwrap();
		let err = store.write(vec![1.0, 0.0], vec![0.0, 1.0]).unwrap_err();
		assert_eq!(
			err,
			Error::DimensionMismatch {
				what: "key",
				expected: 3,
				actual: 2
			}
		);
		assert!(store.write(vec![1.0, 0.0, 0.0], vec![1.0]).is_err());
		assert!(MemoryStore::new(0, 1, 1).unwrap_err().is_config());
	}

	#[test]
	fn test_duplicate_policies() {
		let mut skip = MemoryStore::new(3, 2, 1)
			.unwrap()
			.with_duplicate_policy(DuplicatePolicy::Skip);
		let _ = skip.write(onehot(0, 2), vec![1.0]).unwrap();
		let outcome = skip.write(onehot(0, 2), vec![2.0]).unwrap();
		assert_eq!(outcome, WriteOutcome::Skipped { existing: 0 });
		assert_eq!(skip.genuine_len(), 1);
		assert_eq!(skip.snapshot().get(0).unwrap().value, vec![1.0]);

		let mut refresh = MemoryStore::new(3, 2, 1)
			.unwrap()
			.with_duplicate_policy(DuplicatePolicy::Refresh);
		let _ = refresh.write(onehot(0, 2), vec![1.0]).unwrap();
		let outcome = refresh.write(onehot(0, 2), vec![2.0]).unwrap();
		assert_eq!(outcome, WriteOutcome::Refreshed { id: 0 });
		assert_eq!(refresh.snapshot().get(0).unwrap().value, vec![2.0]);

		let mut keep = MemoryStore::new(3, 2, 1).unwrap();
		let _ = keep.write(onehot(0, 2), vec![1.0]).unwrap();
		let _ = keep.write(onehot(0, 2), vec![2.0]).unwrap();
		assert_eq!(keep.genuine_len(), 2);
	}

	#[test]
	fn test_lures_do_not_evict_genuine() {
		let mut rng = StdRng::seed_from_u64(9);
		let mut store = MemoryStore::new(2, 3, 3).unwrap();
		let _ = store.write(onehot(0, 3), onehot(0, 3)).unwrap();
		let _ = store.write(onehot(1, 3), onehot(1, 3)).unwrap();
		let lure_ids = store.add_lures(3, &mut rng);
		assert_eq!(lure_ids.len(), 3);
		assert_eq!(store.genuine_len(), 2);
		// the lure ring is bounded too
		assert_eq!(store.lure_len(), 2);

		let snapshot = store.snapshot();
		let flags: Vec<bool> = snapshot.iter().map(|t| t.is_lure).collect();
		assert_eq!(flags, vec![false, false, true, true]);
		assert!(snapshot.position(lure_ids[0]).is_none());
		assert_eq!(snapshot.position(lure_ids[2]), Some(3));
	}

	#[test]
	fn test_lure_statistics_follow_genuine_keys() {
		let mut rng = StdRng::seed_from_u64(21);
		let mut store = MemoryStore::new(4, 2, 2).unwrap();
		for _ in 0..4 {
			let _ = store.write(vec![5.0, -3.0], vec![3.0, 4.0]).unwrap();
		}
		let _ = store.add_lures(1, &mut rng);
		let lure = store.snapshot().get(4).unwrap().clone();
		assert!(lure.is_lure);
		// zero spread in the genuine keys pins the lure key to their mean
		assert_eq!(lure.key, vec![5.0, -3.0]);
		// value norm matches the genuine value norm
		let norm = lure.value.iter().map(|v| v * v).sum::<f64>().sqrt();
		assert!((norm - 5.0).abs() < 1e-9);
	}

	#[test]
	fn test_lures_on_empty_store() {
		let mut rng = StdRng::seed_from_u64(2);
		let mut store = MemoryStore::new(3, 4, 2).unwrap();
		let _ = store.add_lures(2, &mut rng);
		let snapshot = store.snapshot();
		assert_eq!(snapshot.len(), 2);
		assert!(snapshot.iter().all(|t| t.is_lure && t.key.len() == 4));
	}

	#[test]
	fn test_snapshot_from_traces_checks_dims() {
		let trace = MemoryTrace {
			id: 0,
			key: vec![1.0],
			value: vec![1.0, 2.0],
			is_lure: false,
		};
		assert!(StoreSnapshot::from_traces(vec![&trace], 1, 2).is_ok());
		assert!(StoreSnapshot::from_traces(vec![&trace], 1, 3).is_err());
	}

	#[test]
	fn test_for_task_capacity() {
		let config = TaskConfig {
			n_param: 8,
			enc_size: Some(4),
			n_event_remember: 3,
			..Default::default()
		};
		let store = MemoryStore::for_task(&config, 2, 2).unwrap();
		assert_eq!(store.capacity(), 6);
	}
}
