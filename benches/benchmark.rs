use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use desitarget::catalog::assemble;
use desitarget::{
    estimate_density, select_population, Bricks, MockPopulation, PopulationSpec, SkyPatch,
    TrueType,
};
use ndarray::Array1;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn mock(n: usize) -> MockPopulation {
    let ra = Array1::random(n, Uniform::new(0., 360.));
    let dec = Array1::random(n, Uniform::new(-10., 60.));
    let z = Array1::random(n, Uniform::new(0., 3.5));
    MockPopulation::new(ra, dec, z).unwrap()
}

fn selection_benchmark(c: &mut Criterion) {
    let mut selection = c.benchmark_group("selection");
    selection.sample_size(20);

    let population = mock(1_000_000);
    let patch = SkyPatch::reference();
    let spec = PopulationSpec::new("QSO Lya", TrueType::Qso, 50.).with_redshift(2.1, 1000.);

    selection.bench_function("density", |b| {
        b.iter(|| estimate_density(population.ra.view(), population.dec.view(), &patch))
    });

    selection.bench_function("select population", |b| {
        b.iter_batched(
            || StdRng::seed_from_u64(0),
            |mut rng| select_population(&population, &spec, &patch, &mut rng),
            BatchSize::SmallInput,
        )
    });
    selection.finish();

    let mut assembly = c.benchmark_group("assembly");
    assembly.sample_size(10);

    let bricks = Bricks::default();
    let mut rng = StdRng::seed_from_u64(1);
    let selected = select_population(
        &population,
        &PopulationSpec::new("ELG", TrueType::Galaxy, 1e6),
        &patch,
        &mut rng,
    );
    let selections = [selected];

    assembly.bench_function("assemble", |b| {
        b.iter_batched(
            || StdRng::seed_from_u64(2),
            |mut rng| assemble(&selections, &bricks, &mut rng),
            BatchSize::SmallInput,
        )
    });

    let ra = selections[0].objects.ra.to_vec();
    let dec = selections[0].objects.dec.to_vec();
    assembly.bench_function("bricknames blocking", |b| {
        b.iter(|| bricks.bricknames(&ra, &dec))
    });

    #[cfg(feature = "parallel")]
    assembly.bench_function("bricknames parallel", |b| {
        b.iter(|| bricks.bricknames_par(&ra, &dec))
    });
}

criterion_group!(benches, selection_benchmark);
criterion_main!(benches);
