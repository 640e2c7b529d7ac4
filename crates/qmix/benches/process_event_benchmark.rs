use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use qmix::{MixedHarmonics, MixedHarmonicsConfig, ParticleWeights, ToyEventGenerator};

fn process_event_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_event");
    for multiplicity in [10, 100, 1000] {
        let event = ToyEventGenerator::new(0)
            .multiplicity(multiplicity)
            .flow(2, 0.1)
            .generate();
        let config = MixedHarmonicsConfig::new().harmonic(2).print_results(false);
        let mut analysis = MixedHarmonics::new(config, ParticleWeights::none()).unwrap();
        group.bench_with_input(
            BenchmarkId::new("integrated", multiplicity),
            &event,
            |b, event| b.iter(|| analysis.process_event(black_box(event)).unwrap()),
        );
    }
    for multiplicity in [10, 100] {
        let event = ToyEventGenerator::new(0)
            .multiplicity(multiplicity)
            .flow(2, 0.1)
            .poi_fraction(0.3)
            .generate();
        let config = MixedHarmonicsConfig::new()
            .harmonic(2)
            .evaluate_differential(true)
            .print_results(false);
        let mut analysis = MixedHarmonics::new(config, ParticleWeights::none()).unwrap();
        group.bench_with_input(
            BenchmarkId::new("differential", multiplicity),
            &event,
            |b, event| b.iter(|| analysis.process_event(black_box(event)).unwrap()),
        );
    }
    group.finish();
}

fn process_events_benchmark(c: &mut Criterion) {
    let events = ToyEventGenerator::new(1)
        .multiplicity(200)
        .flow(1, 0.05)
        .flow(2, 0.1)
        .generate_many(1000);
    let config = MixedHarmonicsConfig::new().print_results(false);
    c.bench_function("process_events 1000x200", |b| {
        b.iter(|| {
            let mut analysis =
                MixedHarmonics::new(config.clone(), ParticleWeights::none()).unwrap();
            analysis.process_events(black_box(&events)).unwrap();
            black_box(analysis.finish().unwrap())
        })
    });
}

criterion_group!(benches, process_event_benchmark, process_events_benchmark);
criterion_main!(benches);
