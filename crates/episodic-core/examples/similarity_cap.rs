//! Similarity Cap Example
//!
//! This example demonstrates constrained sampling:
//! 1. Sample a batch with and without a similarity cap
//! 2. Compare recent and distant pairwise overlap
//! 3. Show what happens when the cap cannot be met
//!
//! Run with: `RUST_LOG=debug cargo run --example similarity_cap`

use episodic_core::{
	config::{DefinitionSource, TaskConfig},
	sampler::SequenceSampler,
	similarity::similarity_matrix,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	println!("=== Similarity Cap ===\n");

	let lag = 4;
	for cap in [1.0, 0.5] {
		let config = TaskConfig {
			n_param: 8,
			n_branch: 3,
			similarity_cap: cap,
			similarity_cap_lag: lag,
			..Default::default()
		};
		let sampler = match SequenceSampler::new(config) {
			Ok(sampler) => sampler,
			Err(e) => {
				eprintln!("bad config: {e}");
				return;
			}
		};

		let mut rng = StdRng::seed_from_u64(2024);
		let events = match sampler.sample(200, &mut rng) {
			Ok(events) => events,
			Err(e) => {
				eprintln!("sampling failed: {e}");
				return;
			}
		};

		let matrix = similarity_matrix(&events, true);
		let split = matrix.lag_split(lag);
		let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len().max(1) as f64;
		let max = |v: &[f64]| v.iter().copied().fold(0.0, f64::max);

		println!("cap = {cap:.2}, lag = {lag}");
		println!(
			"  recent pairs:  mean {:.3}  max {:.3}",
			mean(&split.recent),
			max(&split.recent)
		);
		println!(
			"  distant pairs: mean {:.3}  max {:.3}",
			mean(&split.distant),
			max(&split.distant)
		);
		println!();
	}

	// A fixed definition always overlaps itself fully, so a cap below 1 with
	// a non-zero lag can never be met.
	let config = TaskConfig {
		n_param: 4,
		n_branch: 2,
		similarity_cap: 0.5,
		similarity_cap_lag: 1,
		max_retries: 100,
		definition: DefinitionSource::Fixed(vec![0, 1, 0, 1]),
		..Default::default()
	};
	println!("=== Unsatisfiable Cap ===\n");
	match SequenceSampler::new(config).and_then(|s| s.sample(3, &mut StdRng::seed_from_u64(1))) {
		Ok(events) => println!("unexpectedly sampled {} events", events.len()),
		Err(e) => println!("error: {e}"),
	}
}
