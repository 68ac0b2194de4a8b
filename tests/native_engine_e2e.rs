use std::sync::Arc;

use chrono::{Duration, Utc};

use cube_odds::error::OrchestratorError;
use cube_odds::{
    Competitor, DateWindow, EventId, InMemorySource, NativeEngine, OddsError, OrchestratorConfig, SimulationDataset,
    SimulationEngine, SimulationOrchestrator, SimulationParams,
};

fn source() -> Arc<InMemorySource> {
    let source = Arc::new(InMemorySource::new());
    let mut fast = Competitor::new("FAST01", "Fast Solver");
    let mut slow = Competitor::new("SLOW01", "Slow Solver");
    let mut steady = Competitor::new("MID01", "Mid Solver");
    for k in 0..6_i32 {
        let id = format!("Open{k}");
        let date = (Utc::now() - Duration::days(20 + 45 * i64::from(k))).format("%Y-%m-%d").to_string();
        source.insert_competition(&id, &date);
        fast = fast.with_round(&id, EventId::Cube3, vec![500 + k, 520, 480 - k, 510, 530 + 3 * k]);
        steady = steady.with_round(&id, EventId::Cube3, vec![700, 720 + k, 690, 710 - k, 705]);
        slow = slow.with_round(&id, EventId::Cube3, vec![900, 940 - k, -1, 910 + 2 * k, 925]);
    }
    source.insert_competitor(fast);
    source.insert_competitor(slow);
    source.insert_competitor(steady);
    source
}

fn dataset(ids: &[&str]) -> SimulationDataset {
    SimulationDataset::new(
        ids.iter().map(|id| (*id).to_string()).collect(),
        EventId::Cube3,
        DateWindow::months_back(12),
        180.0,
    )
}

#[test]
fn clearly_faster_competitor_is_the_favourite() {
    let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source()), OrchestratorConfig::default());

    let results = orchestrator
        .run_simulation(&dataset(&["SLOW01", "FAST01", "MID01"]), SimulationParams::new(2_000, true).with_seed(11))
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].name, "Fast Solver");
    assert!(results[1].win_probability() > 95.0, "{}", results[1].win_probability());
    assert!(results[0].expected_rank() > results[2].expected_rank());
    for result in &results {
        assert_eq!(result.simulations(), 2_000);
        assert!((result.podium_probability() - 100.0).abs() < 1e-9);
        assert_eq!(result.sample_size, if result.name == "Slow Solver" { 24 } else { 30 });
        assert!(!result.histogram_single.is_empty());
    }
    let wins: u32 = results.iter().map(|r| r.win_count).sum();
    assert_eq!(wins, 2_000);
}

#[test]
fn seeded_runs_are_reproducible() {
    let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source()), OrchestratorConfig::default());
    let field = dataset(&["FAST01", "MID01"]);

    let first = orchestrator
        .run_simulation(&field, SimulationParams::new(500, true).with_seed(42))
        .unwrap();
    let second = orchestrator
        .recalculate(SimulationParams::new(500, true).with_seed(42))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn entered_results_decide_the_round() {
    let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source()), OrchestratorConfig::default());
    let field = dataset(&["FAST01", "SLOW01"]);
    orchestrator
        .run_simulation(&field, SimulationParams::new(10, true).with_seed(1))
        .unwrap();

    let entered = vec![vec![-1, -1, 0, 0, 0], vec![400, 410, 405, 420, 415]];
    let results = orchestrator
        .recalculate(SimulationParams::new(300, true).with_inputted_times(entered).with_seed(2))
        .unwrap();

    assert_eq!(results[1].win_count, 300);
    assert_eq!(results[0].rank_distribution, vec![0, 300]);
    assert!(results[0].histogram_average.is_empty());
}

#[test]
fn competitor_without_history_always_finishes_last() {
    let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source()), OrchestratorConfig::default());
    let results = orchestrator
        .run_simulation(&dataset(&["2099NOPE01", "MID01"]), SimulationParams::new(200, false).with_seed(5))
        .unwrap();

    assert_eq!(results[0].name, "2099NOPE01");
    assert_eq!(results[0].sample_size, 0);
    assert_eq!(results[0].rank_distribution, vec![0, 200]);
    assert_eq!(results[1].win_count, 200);
}

#[test]
fn field_with_no_reachable_history_fails_to_load() {
    let source = source();
    source.fail_competitor("FAST01");
    let orchestrator = SimulationOrchestrator::new(NativeEngine::factory(source), OrchestratorConfig::default());

    let err = orchestrator
        .run_simulation(&dataset(&["FAST01"]), SimulationParams::new(10, true))
        .unwrap_err();
    assert!(matches!(err, OddsError::Orchestrator(OrchestratorError::Load { .. })));
}

#[test]
fn engine_can_be_driven_directly() {
    let mut engine = NativeEngine::new(source());
    assert!(engine.run(&SimulationParams::new(1, true)).is_err());

    engine.initialize().unwrap();
    engine.load(&dataset(&["FAST01", "SLOW01"])).unwrap();
    let models = engine.models();
    assert_eq!(models.len(), 2);
    let fast = models[0].unwrap();
    let slow = models[1].unwrap();
    assert!(fast.mean < slow.mean);
    assert!(fast.dnf_rate.abs() < f64::EPSILON);
    assert!(slow.dnf_rate > 0.15 && slow.dnf_rate < 0.25);

    let params = SimulationParams::new(100, true).with_inputted_times(vec![vec![0; 5]; 2]);
    let results = engine.run(&params).unwrap();
    assert_eq!(results[0].simulations(), 100);
}
