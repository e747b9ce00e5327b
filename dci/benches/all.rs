use bencher::{benchmark_group, benchmark_main, Bencher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dci::{ConstructionConfig, DciIndex, QueryConfig};

benchmark_main!(benches);
benchmark_group!(benches, build_flat, query_flat, query_hierarchical);

const SEED: u64 = 123456789;
const D: usize = 32;
const N: usize = 4096;

fn random_points(seed: u64, n: usize, d: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * d).map(|_| rng.sample(rand_distr::StandardNormal)).collect()
}

fn build_flat(bench: &mut Bencher) {
    let data = random_points(SEED, N, D);
    bench.iter(|| {
        let mut index = DciIndex::with_seed(D, 2, 3, SEED).unwrap();
        index.add(&data, N, ConstructionConfig::default()).unwrap();
    })
}

fn query_flat(bench: &mut Bencher) {
    let data = random_points(SEED, N, D);
    let mut index = DciIndex::with_seed(D, 2, 3, SEED).unwrap();
    index.add(&data, N, ConstructionConfig::default()).unwrap();
    let query = random_points(SEED + 1, 1, D);
    let cfg = QueryConfig {
        prop_to_visit: 0.2,
        ..QueryConfig::default()
    };

    bench.iter(|| index.query(&query, 10, &cfg).unwrap())
}

fn query_hierarchical(bench: &mut Bencher) {
    let data = random_points(SEED, N, D);
    let mut index = DciIndex::with_seed(D, 3, 3, SEED).unwrap();
    let construction_cfg = ConstructionConfig {
        num_levels: 2,
        num_coarse_points: 256,
        ..ConstructionConfig::default()
    };
    index.add(&data, N, construction_cfg).unwrap();
    let query = random_points(SEED + 2, 1, D);
    let cfg = QueryConfig {
        prop_to_visit: 0.1,
        field_of_view: 50,
        ..QueryConfig::default()
    };

    bench.iter(|| index.query(&query, 10, &cfg).unwrap())
}
