//! Trial conditions
//!
//! What happens to memory at the boundary between the study part and the
//! recall part of a trial:
//!
//! | Condition | Store | Lures | Working memory |
//! |-----------|-------|-------|----------------|
//! | RM (recent) | kept | `n` | kept |
//! | DM (distant) | kept | `n` | reset |
//! | NM (none) | flushed | `n + 1` | reset |
//!
//! The caller decides when the boundary is reached; this module only
//! composes the store primitives.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::MemoryStore;

/// Memory condition of one trial.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
	/// The studied event is the most recent one in memory
	#[serde(rename = "RM")]
	RecentMemory,
	/// The studied event is in memory, but working memory is reset
	#[serde(rename = "DM")]
	DistantMemory,
	/// Nothing relevant is in memory
	#[serde(rename = "NM")]
	NoMemory,
}

/// What the caller must do after a boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoundaryAction {
	/// Clear the agent's recurrent state
	pub reset_working_memory: bool,
	/// Whether the store was flushed
	pub flushed: bool,
	/// Ids of the lures added
	pub lure_ids: Vec<u64>,
}

impl Condition {
	/// All conditions in canonical order.
	pub const ALL: [Self; 3] = [Self::RecentMemory, Self::DistantMemory, Self::NoMemory];

	/// Short label.
	#[must_use]
	pub const fn abbreviation(self) -> &'static str {
		match self {
			Self::RecentMemory => "RM",
			Self::DistantMemory => "DM",
			Self::NoMemory => "NM",
		}
	}

	/// Whether the studied event is still retrievable.
	#[must_use]
	pub const fn has_memory(self) -> bool {
		!matches!(self, Self::NoMemory)
	}

	/// Apply the boundary to `store`.
	pub fn apply<R: Rng + ?Sized>(
		self,
		store: &mut MemoryStore,
		n_lures: usize,
		rng: &mut R,
	) -> BoundaryAction {
		let action = match self {
			Self::RecentMemory => BoundaryAction {
				reset_working_memory: false,
				flushed: false,
				lure_ids: store.add_lures(n_lures, rng),
			},
			Self::DistantMemory => BoundaryAction {
				reset_working_memory: true,
				flushed: false,
				lure_ids: store.add_lures(n_lures, rng),
			},
			Self::NoMemory => {
				store.flush();
				BoundaryAction {
					reset_working_memory: true,
					flushed: true,
					lure_ids: store.add_lures(n_lures + 1, rng),
				}
			}
		};
		debug!(
			condition = self.abbreviation(),
			n_lures = action.lure_ids.len(),
			reset = action.reset_working_memory,
			"applied boundary"
		);
		action
	}
}

impl fmt::Display for Condition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.abbreviation())
	}
}

impl FromStr for Condition {
	type Err = Error;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"RM" | "RECENT_MEMORY" => Ok(Self::RecentMemory),
			"DM" | "DISTANT_MEMORY" => Ok(Self::DistantMemory),
			"NM" | "NO_MEMORY" => Ok(Self::NoMemory),
			_ => Err(Error::config("condition", format!("unknown condition `{s}`"))),
		}
	}
}

/// Sampling weights over conditions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionProbabilities {
	/// P(RM)
	pub recent: f64,
	/// P(DM)
	pub distant: f64,
	/// P(NM)
	pub none: f64,
}

impl Default for ConditionProbabilities {
	fn default() -> Self {
		Self {
			recent: 1.0 / 3.0,
			distant: 1.0 / 3.0,
			none: 1.0 / 3.0,
		}
	}
}

impl ConditionProbabilities {
	/// Build validated probabilities.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if any entry is outside `[0, 1]` or
	/// the entries do not sum to one.
	pub fn new(recent: f64, distant: f64, none: f64) -> Result<Self> {
		let probs = Self {
			recent,
			distant,
			none,
		};
		probs.validate()?;
		Ok(probs)
	}

	/// Check the distribution.
	///
	/// # Errors
	///
	/// See [`ConditionProbabilities::new`].
	pub fn validate(&self) -> Result<()> {
		for (field, p) in [
			("p_recent", self.recent),
			("p_distant", self.distant),
			("p_none", self.none),
		] {
			if !(0.0..=1.0).contains(&p) {
				return Err(Error::config(field, format!("{p} is not a probability")));
			}
		}
		let total = self.recent + self.distant + self.none;
		if (total - 1.0).abs() > 1e-9 {
			return Err(Error::config(
				"condition_probabilities",
				format!("sum to {total}, expected 1"),
			));
		}
		Ok(())
	}

	/// All mass on one condition.
	///
	/// `only(Condition::RecentMemory)` runs recent-memory trials only, and any
	/// other argument fixes the condition for every trial.
	#[must_use]
	pub const fn only(condition: Condition) -> Self {
		let mut probs = Self {
			recent: 0.0,
			distant: 0.0,
			none: 0.0,
		};
		match condition {
			Condition::RecentMemory => probs.recent = 1.0,
			Condition::DistantMemory => probs.distant = 1.0,
			Condition::NoMemory => probs.none = 1.0,
		}
		probs
	}

	/// Probability of one condition.
	#[must_use]
	pub const fn of(&self, condition: Condition) -> f64 {
		match condition {
			Condition::RecentMemory => self.recent,
			Condition::DistantMemory => self.distant,
			Condition::NoMemory => self.none,
		}
	}
}

/// Draw a condition.
///
/// There are no separate switches for a recent-memory-only or fixed-condition
/// run: pass [`ConditionProbabilities::only`], or any distribution with zero
/// weight on the excluded conditions, and those are never drawn.
pub fn pick_condition<R: Rng + ?Sized>(probs: &ConditionProbabilities, rng: &mut R) -> Condition {
	let u: f64 = rng.gen();
	if u < probs.recent {
		Condition::RecentMemory
	} else if u < probs.recent + probs.distant {
		Condition::DistantMemory
	} else {
		Condition::NoMemory
	}
}
