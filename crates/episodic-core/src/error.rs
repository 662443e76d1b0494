//! Error types for sampling and recall.

/// Errors raised by the sampler, the memory store and the recall kernel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	/// A configuration value is out of its documented domain.
	#[error("invalid config `{field}`: {reason}")]
	InvalidConfig {
		/// Name of the offending field
		field: &'static str,
		/// Human-readable reason
		reason: String,
	},

	/// A vector does not have the width the store or kernel was built for.
	#[error("{what} has dimension {actual}, expected {expected}")]
	DimensionMismatch {
		/// Which vector was wrong (key, value, query)
		what: &'static str,
		/// Expected width
		expected: usize,
		/// Actual width
		actual: usize,
	},

	/// A hand-built feature path violates its own invariants.
	#[error("invalid feature path: {reason}")]
	InvalidPath {
		/// What was violated
		reason: String,
	},

	/// The sampler exhausted its retry budget for one sample.
	#[error(
		"sample {index}: no candidate met similarity bounds (cap {cap}, lag {lag}) after {attempts} attempts"
	)]
	UnsatisfiableConstraint {
		/// Position in the batch that could not be filled
		index: usize,
		/// Attempts made for that position
		attempts: usize,
		/// Normalized similarity cap in force
		cap: f64,
		/// Lookback window size in force
		lag: usize,
	},
}

impl Error {
	pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidConfig {
			field,
			reason: reason.into(),
		}
	}

	/// Check if this error comes from invalid configuration or input shape.
	///
	/// These are detected eagerly and never go away on retry.
	#[must_use]
	pub const fn is_config(&self) -> bool {
		matches!(
			self,
			Self::InvalidConfig { .. } | Self::DimensionMismatch { .. } | Self::InvalidPath { .. }
		)
	}

	/// Check if this error is a similarity-constraint failure.
	#[must_use]
	pub const fn is_constraint(&self) -> bool {
		matches!(self, Self::UnsatisfiableConstraint { .. })
	}
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_classification() {
		let err = Error::config("leak", "must be in [0, 1]");
		assert!(err.is_config());
		assert!(!err.is_constraint());

		let err = Error::UnsatisfiableConstraint {
			index: 3,
			attempts: 10,
			cap: 0.1,
			lag: 2,
		};
		assert!(err.is_constraint());
		assert!(!err.is_config());
	}

	#[test]
	fn test_error_display() {
		let err = Error::DimensionMismatch {
			what: "key",
			expected: 4,
			actual: 3,
		};
		assert_eq!(err.to_string(), "key has dimension 3, expected 4");
	}
}
