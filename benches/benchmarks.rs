use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use marker_decon::{decompose, pca::PCA, DecompositionConfig, ExpressionTable, MarkerEntry, MarkerTable};
use ndarray::{Array2, Axis};
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generates a bulk mixture of `n_cell_types` cell types over `n_samples`
/// samples, with `markers_per_type` markers each plus `n_background` genes.
fn generate_mixture(
    n_cell_types: usize,
    markers_per_type: usize,
    n_background: usize,
    n_samples: usize,
    seed: u64,
) -> (ExpressionTable, MarkerTable) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let high = Uniform::new(50.0, 100.0);
    let low = Uniform::new(0.0, 1.0);

    let mut gene_ids = Vec::new();
    let mut entries = Vec::new();
    let mut profiles: Vec<Vec<f64>> = Vec::new();
    for k in 0..n_cell_types {
        let cell_type = format!("CT{}", k);
        for m in 0..markers_per_type {
            let gene = format!("{}_M{}", cell_type, m);
            profiles.push((0..n_cell_types).map(|j| if j == k { rng.sample(high) } else { rng.sample(low) }).collect());
            entries.push(MarkerEntry::new(cell_type.clone(), gene.clone(), Some(rng.gen_range(0.5..3.0))));
            gene_ids.push(gene);
        }
    }
    for b in 0..n_background {
        gene_ids.push(format!("BG{}", b));
        profiles.push((0..n_cell_types).map(|_| rng.gen_range(5.0..20.0)).collect());
    }

    let mut proportions = Array2::from_shape_fn((n_cell_types, n_samples), |_| rng.gen_range(0.05..1.0));
    for mut column in proportions.axis_iter_mut(Axis(1)) {
        let total = column.sum();
        column.mapv_inplace(|v| v / total);
    }
    let data = Array2::from_shape_fn((gene_ids.len(), n_samples), |(g, s)| {
        let clean: f64 = (0..n_cell_types).map(|k| profiles[g][k] * proportions[[k, s]]).sum();
        clean * (1.0 + rng.gen_range(-0.02..0.02))
    });
    let sample_ids = (0..n_samples).map(|s| format!("S{}", s)).collect();

    let table = ExpressionTable::new(data, gene_ids, sample_ids).expect("synthetic table is valid");
    (table, MarkerTable::from_entries(&entries))
}

fn criterion_benchmark_runner(c: &mut Criterion) {
    let current_backend_name = if cfg!(feature = "backend_faer") { "faer" } else { "lapack" };

    // (name, cell types, markers per type, background genes, samples)
    let scenarios = vec![
        ("Small", 3, 20, 500, 20),
        ("Medium", 8, 50, 5000, 100),
        ("ManySamples", 8, 50, 5000, 1000),
        ("WidePanels", 4, 200, 10000, 60),
    ];

    for (name, n_cell_types, markers_per_type, n_background, n_samples) in scenarios {
        let (table, markers) = generate_mixture(n_cell_types, markers_per_type, n_background, n_samples, 1234);
        let config = DecompositionConfig::default().with_gene_bounds(5, markers_per_type);

        let mut group = c.benchmark_group(format!("decompose/{}", name));
        group.sample_size(if n_samples >= 1000 { 10 } else { 50 });
        group.throughput(Throughput::Elements((n_cell_types * n_samples) as u64));
        let id = BenchmarkId::new(
            current_backend_name,
            format!("{}_ct{}_m{}_s{}", name, n_cell_types, markers_per_type, n_samples),
        );
        group.bench_with_input(id, &(table, markers), |b, (table, markers)| {
            b.iter(|| decompose(table, markers, &config).expect("decomposition succeeds"));
        });
        group.finish();
    }

    // PCA alone on one marker submatrix, covering both eigendecomposition paths.
    for (n_samples, n_genes) in [(500, 50), (50, 500)] {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let data = Array2::from_shape_fn((n_samples, n_genes), |_| rng.gen_range(0.0..10.0));
        let mut group = c.benchmark_group("pca_fit");
        group.bench_with_input(
            BenchmarkId::new(current_backend_name, format!("s{}_g{}", n_samples, n_genes)),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut pca = PCA::new();
                    pca.fit(data.clone()).expect("PCA fit succeeds");
                    pca
                });
            },
        );
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark_runner);
criterion_main!(benches);
