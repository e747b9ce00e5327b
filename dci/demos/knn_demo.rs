//! Minimal end-to-end driver: builds a small index over random points,
//! queries it, and prints the neighbours found.
//!
//! Not part of the core: the command-line driver is an external collaborator
//! (see the crate's top-level docs), kept here purely as a runnable
//! demonstration the way the teacher crate ships `examples/colors.rs`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dci::{ConstructionConfig, DciIndex, QueryConfig};

fn main() {
    const D: usize = 8;
    const N: usize = 2000;

    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<f32> = (0..N * D).map(|_| rng.sample(rand_distr::StandardNormal)).collect();

    let mut index = DciIndex::with_seed(D, 2, 3, 42).expect("valid index shape");
    index
        .add(&data, N, ConstructionConfig::default())
        .expect("well-formed point data");

    let query: Vec<f32> = (0..D).map(|_| rng.sample(rand_distr::StandardNormal)).collect();
    let cfg = QueryConfig {
        prop_to_visit: 0.2,
        ..QueryConfig::default()
    };

    let outcome = index.query(&query, 5, &cfg).expect("valid query");
    println!(
        "visited {} / retrieved {} points before termination",
        outcome.visited, outcome.retrieved
    );
    for (id, distance) in outcome.ids.iter().zip(outcome.distances.iter()) {
        println!("point {id}: distance {distance:.4}");
    }
}
