//! Competitive Recall Example
//!
//! This example demonstrates LCA recall under the three trial conditions:
//! 1. Store a few studied traces
//! 2. Apply the RM / DM / NM boundary
//! 3. Recall with low and high competition and compare the weights
//!
//! Run with: `cargo run --example lca_recall`

use episodic_core::{
	condition::Condition,
	lca::LcaGates,
	memory::MemoryStore,
	retrieval::{recall, Recall},
	similarity::KernelKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn show(label: &str, result: &Recall) {
	let weights: Vec<String> = result.weights.iter().map(|w| format!("{w:.3}")).collect();
	println!("  {label:<16} weights [{}]", weights.join(", "));
	match result.winner_id() {
		Some(id) => println!("  {:<16} winner id {id}, recalled {:.3?}", "", result.recalled),
		None => println!("  {:<16} nothing recalled", ""),
	}
}

fn main() {
	println!("=== Competitive Recall ===\n");

	// Studied traces: keys are cues, values are the remembered answers
	let studied = [
		(vec![1.0, 0.2, 0.0, 0.0], vec![1.0, 0.0, 0.0]),
		(vec![0.2, 1.0, 0.1, 0.0], vec![0.0, 1.0, 0.0]),
		(vec![0.0, 0.3, 1.0, 0.2], vec![0.0, 0.0, 1.0]),
	];

	// Probe close to the first trace
	let query = [0.9, 0.3, 0.0, 0.0];

	let soft = LcaGates {
		input_gate: 1.0,
		leak: 0.2,
		competition: 0.0,
	};
	let sharp = LcaGates {
		input_gate: 1.0,
		leak: 0.2,
		competition: 0.9,
	};

	for condition in Condition::ALL {
		let mut store = match MemoryStore::new(3, 4, 3) {
			Ok(store) => store,
			Err(e) => {
				eprintln!("bad store: {e}");
				return;
			}
		};
		for (key, value) in &studied {
			if let Err(e) = store.write(key.clone(), value.clone()) {
				eprintln!("write failed: {e}");
				return;
			}
		}

		let mut rng = StdRng::seed_from_u64(9);
		let action = condition.apply(&mut store, 1, &mut rng);
		println!(
			"{condition}: {} traces ({} lures), reset working memory: {}",
			store.len(),
			store.lure_len(),
			action.reset_working_memory
		);

		let snapshot = store.snapshot();
		for (label, gates) in [("no competition", soft), ("competition 0.9", sharp)] {
			match recall(&query, &snapshot, gates, KernelKind::Cosine) {
				Ok(result) => show(label, &result),
				Err(e) => eprintln!("recall failed: {e}"),
			}
		}
		println!();
	}
}
