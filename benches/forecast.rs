use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use cube_odds::distribution::curve;
use cube_odds::{
    Competitor, CurveKind, DateWindow, EventId, InMemorySource, NativeEngine, SimulationDataset, SimulationEngine,
    SimulationParams,
};

fn loaded_engine(competitors: usize) -> (NativeEngine<InMemorySource>, usize) {
    let source = Arc::new(InMemorySource::new());
    let competition_ids: Vec<String> = (0..8).map(|k| format!("Open{k}")).collect();
    for (k, id) in competition_ids.iter().enumerate() {
        let date = (Utc::now() - Duration::days(15 + 40 * k as i64)).format("%Y-%m-%d").to_string();
        source.insert_competition(id, &date);
    }

    let mut ids = Vec::with_capacity(competitors);
    for c in 0..competitors {
        let id = format!("BENCH{c:03}");
        let base = 600 + 15 * c as i32;
        let mut competitor = Competitor::new(id.clone(), format!("Competitor {c}"));
        for (k, competition) in competition_ids.iter().enumerate() {
            let k = k as i32;
            competitor = competitor.with_round(
                competition,
                EventId::Cube3,
                vec![base + k, base + 40, base - 20 + k, if k == 3 { -1 } else { base + 10 }, base + 90],
            );
        }
        source.insert_competitor(competitor);
        ids.push(id);
    }

    let mut engine = NativeEngine::new(source);
    engine.initialize().unwrap();
    engine
        .load(&SimulationDataset::new(ids, EventId::Cube3, DateWindow::months_back(12), 180.0))
        .unwrap();
    (engine, competitors)
}

fn bench_curves(c: &mut Criterion) {
    let mut group = c.benchmark_group("forecast/curve");
    for kind in [CurveKind::Density, CurveKind::Cumulative] {
        group.bench_function(format!("{kind:?}"), |b| {
            b.iter(|| curve(black_box(8.2), 0.6, 0.9, 5.0, 15.0, kind).unwrap());
        });
    }
    group.finish();
}

fn bench_native_run(c: &mut Criterion) {
    let (mut engine, competitors) = loaded_engine(16);
    let params = SimulationParams::new(1_000, true)
        .with_inputted_times(vec![vec![0; 5]; competitors])
        .with_seed(7);

    let mut group = c.benchmark_group("forecast/native");
    group.throughput(Throughput::Elements(u64::from(params.num_simulations)));
    group.bench_function("run_16x1000", |b| {
        b.iter(|| engine.run(black_box(&params)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_curves, bench_native_run);
criterion_main!(benches);
