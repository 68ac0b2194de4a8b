//! Bundled Monte Carlo engine.
//!
//! Loads histories through the [`ResultAggregator`], fits one
//! [`CompetitorModel`] per competitor and simulates whole rounds: every
//! contest draws each competitor's attempts, scores the round in the event's
//! format and ranks the field.

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::aggregate::ResultAggregator;
use crate::config::OddsConfig;
use crate::error::{OddsError, OddsResult, OrchestratorError};
use crate::event::{EventId, RoundFormat};
use crate::solve::DNF;
use crate::source::{HttpResultSource, ResultSource};

use super::stats::{weight_history, CompetitorModel, ModelSampler};
use super::{SimulationDataset, SimulationEngine, SimulationParams, SimulationResult};

/// Scores one round. Negative attempts count as DNF.
///
/// Average of 5 drops the best and worst attempt (a single DNF is the worst)
/// and is DNF with two or more DNFs. Mean of 3 is DNF with any DNF. Best of 3
/// is the best valid attempt.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_result(format: RoundFormat, attempts: &[i32]) -> i32 {
    let dnfs = attempts.iter().filter(|&&a| a < 0).count();
    let mean = |values: &[i32]| {
        let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = (sum as f64 / values.len() as f64).round();
        mean as i32
    };
    match format {
        RoundFormat::AverageOf5 => {
            if dnfs >= 2 || attempts.len() < 3 {
                return DNF;
            }
            let mut sorted: Vec<i32> = attempts
                .iter()
                .map(|&a| if a < 0 { i32::MAX } else { a })
                .collect();
            sorted.sort_unstable();
            mean(&sorted[1..sorted.len() - 1])
        }
        RoundFormat::MeanOf3 => {
            if dnfs > 0 || attempts.is_empty() {
                return DNF;
            }
            mean(attempts)
        }
        RoundFormat::BestOf3 => attempts.iter().copied().filter(|&a| a > 0).min().unwrap_or(DNF),
    }
}

fn sort_key(result: i32) -> i32 {
    if result > 0 {
        result
    } else {
        i32::MAX
    }
}

#[derive(Debug)]
struct LoadedCompetitor {
    name: String,
    model: Option<CompetitorModel>,
}

#[derive(Debug)]
struct LoadedField {
    event: EventId,
    competitors: Vec<LoadedCompetitor>,
}

/// [`SimulationEngine`] backed by a [`ResultSource`].
pub struct NativeEngine<S: ResultSource + ?Sized> {
    aggregator: ResultAggregator<S>,
    runtime: Option<Runtime>,
    loaded: Option<LoadedField>,
}

impl<S: ResultSource + ?Sized> std::fmt::Debug for NativeEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEngine")
            .field("initialized", &self.runtime.is_some())
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

impl NativeEngine<HttpResultSource> {
    /// Creates an engine reading the configured upstream providers.
    pub fn from_config(config: &OddsConfig) -> OddsResult<Self> {
        Ok(Self::new(Arc::new(HttpResultSource::from_config(config)?)))
    }
}

impl<S: ResultSource + ?Sized + 'static> NativeEngine<S> {
    /// Creates an engine over `source`.
    pub fn new(source: Arc<S>) -> Self {
        Self {
            aggregator: ResultAggregator::new(source),
            runtime: None,
            loaded: None,
        }
    }

    /// Factory suitable for [`super::SimulationOrchestrator::new`].
    pub fn factory(source: Arc<S>) -> impl Fn() -> Box<dyn SimulationEngine> + Send + Sync + 'static {
        move || Box::new(Self::new(Arc::clone(&source))) as Box<dyn SimulationEngine>
    }

    /// Models of the loaded field, `None` for competitors without valid history.
    #[must_use]
    pub fn models(&self) -> Vec<Option<CompetitorModel>> {
        self.loaded
            .as_ref()
            .map(|field| field.competitors.iter().map(|c| c.model).collect())
            .unwrap_or_default()
    }
}

impl<S: ResultSource + ?Sized + 'static> SimulationEngine for NativeEngine<S> {
    fn initialize(&mut self) -> OddsResult<()> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| OddsError::internal(format!("failed to start fetch runtime: {e}")))?;
            self.runtime = Some(runtime);
        }
        Ok(())
    }

    fn load(&mut self, dataset: &SimulationDataset) -> OddsResult<()> {
        dataset.validate()?;
        self.loaded = None;
        let runtime = self.runtime.as_ref().ok_or_else(|| OrchestratorError::Init {
            message: "engine used before initialize".to_string(),
        })?;

        let histories = runtime.block_on(self.aggregator.collect_histories(
            &dataset.competitor_ids,
            dataset.event,
            &dataset.window,
        ))?;
        if histories.is_empty() {
            return Err(OddsError::internal(format!(
                "no {} result history found for the requested competitors",
                dataset.event
            )));
        }

        let competitors: Vec<LoadedCompetitor> = histories
            .iter()
            .map(|history| {
                let samples = weight_history(&history.competitions, &dataset.window, dataset.decay_half_life);
                LoadedCompetitor {
                    name: history.name.clone(),
                    model: CompetitorModel::fit(&samples),
                }
            })
            .collect();

        info!(
            event = %dataset.event,
            competitors = competitors.len(),
            modelled = competitors.iter().filter(|c| c.model.is_some()).count(),
            "loaded simulation field"
        );
        self.loaded = Some(LoadedField {
            event: dataset.event,
            competitors,
        });
        Ok(())
    }

    fn run(&mut self, params: &SimulationParams) -> OddsResult<Vec<SimulationResult>> {
        let field = self.loaded.as_ref().ok_or(OrchestratorError::NotLoaded)?;
        let mut rng = match params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let results = simulate(field, params, &mut rng);
        debug!(simulations = params.num_simulations, competitors = results.len(), "simulation run complete");
        Ok(results)
    }
}

fn simulate(field: &LoadedField, params: &SimulationParams, rng: &mut ChaCha8Rng) -> Vec<SimulationResult> {
    let format = field.event.format();
    let attempts = field.event.attempts();
    let whole_moves = field.event.is_fewest_moves();
    let n = field.competitors.len();

    let samplers: Vec<Option<ModelSampler>> = field
        .competitors
        .iter()
        .map(|c| c.model.as_ref().map(CompetitorModel::sampler))
        .collect();
    let bounds: Vec<Option<(i32, i32)>> = field
        .competitors
        .iter()
        .map(|c| c.model.as_ref().map(CompetitorModel::histogram_bounds))
        .collect();
    let entered = |i: usize, a: usize| {
        params
            .inputted_times
            .get(i)
            .and_then(|row| row.get(a))
            .copied()
            .unwrap_or(0)
    };

    let mut results: Vec<SimulationResult> = field
        .competitors
        .iter()
        .map(|c| SimulationResult {
            name: c.name.clone(),
            sample_size: c.model.map_or(0, |m| m.sample_size),
            mean_excluding_dnf: c.model.map_or(0.0, |m| m.mean),
            rank_distribution: vec![0; n],
            ..SimulationResult::default()
        })
        .collect();

    let mut solves = vec![0; attempts];
    let mut round: Vec<(i32, i32, usize)> = Vec::with_capacity(n);
    for _ in 0..params.num_simulations {
        round.clear();
        for (i, result) in results.iter_mut().enumerate() {
            for (a, slot) in solves.iter_mut().enumerate() {
                *slot = match entered(i, a) {
                    0 => {
                        let mut value = samplers[i].map_or(DNF, |s| s.sample(rng, params.include_dnf));
                        if whole_moves && value > 0 {
                            value = truncate_to_move(value);
                        }
                        if value > 0 {
                            record(&mut result.histogram_single, value, bounds[i]);
                        }
                        value
                    }
                    t if t < 0 => DNF,
                    t => t,
                };
            }
            let score = round_result(format, &solves);
            if score > 0 {
                record(&mut result.histogram_average, score, bounds[i]);
            }
            let best = solves.iter().copied().map(sort_key).min().unwrap_or(i32::MAX);
            round.push((sort_key(score), best, i));
        }

        round.sort_unstable();
        for (rank, &(_, _, i)) in round.iter().enumerate() {
            let result = &mut results[i];
            result.rank_distribution[rank] += 1;
            result.total_rank += rank as u64 + 1;
            if rank == 0 {
                result.win_count += 1;
            }
            if rank < 3 {
                result.podium_count += 1;
            }
        }
    }
    results
}

/// Fewest moves singles are stored in hundredths of a move but are always whole.
fn truncate_to_move(value: i32) -> i32 {
    (value / 100 * 100).max(100)
}

fn record(histogram: &mut std::collections::BTreeMap<i32, u64>, value: i32, bounds: Option<(i32, i32)>) {
    let bucket = value / 10;
    let bucket = bounds.map_or(bucket, |(low, high)| bucket.clamp(low, high.max(low)));
    *histogram.entry(bucket).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WeightedSample;

    #[test]
    fn average_of_five_drops_best_and_worst() {
        assert_eq!(round_result(RoundFormat::AverageOf5, &[1000, 900, 1100, 950, 1050]), 1000);
        assert_eq!(round_result(RoundFormat::AverageOf5, &[1000, DNF, 1100, 950, 1050]), 1050);
        assert_eq!(round_result(RoundFormat::AverageOf5, &[1000, DNF, 1100, -2, 1050]), DNF);
    }

    #[test]
    fn mean_of_three_needs_every_attempt() {
        assert_eq!(round_result(RoundFormat::MeanOf3, &[3000, 3100, 3201]), 3100);
        assert_eq!(round_result(RoundFormat::MeanOf3, &[3000, DNF, 3200]), DNF);
    }

    #[test]
    fn best_of_three_takes_best_valid() {
        assert_eq!(round_result(RoundFormat::BestOf3, &[DNF, 2500, 2400]), 2400);
        assert_eq!(round_result(RoundFormat::BestOf3, &[DNF, DNF, -2]), DNF);
    }

    #[test]
    fn histogram_buckets_are_clamped_to_model_bounds() {
        let mut histogram = std::collections::BTreeMap::new();
        record(&mut histogram, 1234, Some((80, 110)));
        record(&mut histogram, 905, Some((80, 110)));
        record(&mut histogram, 2000, None);
        assert_eq!(histogram.get(&110), Some(&1));
        assert_eq!(histogram.get(&90), Some(&1));
        assert_eq!(histogram.get(&200), Some(&1));
    }

    fn field(event: EventId, values: &[i32]) -> LoadedField {
        let samples: Vec<_> = values
            .iter()
            .map(|&value| WeightedSample { value, weight: 1.0 })
            .collect();
        LoadedField {
            event,
            competitors: vec![LoadedCompetitor {
                name: "Solver".to_string(),
                model: CompetitorModel::fit(&samples),
            }],
        }
    }

    #[test]
    fn fewest_moves_singles_are_whole_moves() {
        let field = field(EventId::FewestMoves, &[2500, 2700, 2900, 3100, 2600, 2800, 3300, 2400]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let results = simulate(&field, &SimulationParams::new(500, false), &mut rng);

        let singles = &results[0].histogram_single;
        let (low, high) = field.competitors[0].model.unwrap().histogram_bounds();
        assert!(!singles.is_empty());
        assert!(
            singles.keys().all(|&bucket| bucket % 10 == 0 || bucket == low || bucket == high),
            "{singles:?}"
        );
        assert_eq!(singles.values().sum::<u64>(), 1_500);
    }

    #[test]
    fn timed_singles_keep_their_hundredths() {
        let field = field(EventId::Cube3, &[812, 845, 903, 877, 790, 951, 866, 822]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let results = simulate(&field, &SimulationParams::new(500, false), &mut rng);
        assert!(results[0].histogram_single.keys().any(|bucket| bucket % 10 != 0));
    }

    #[test]
    fn truncation_never_produces_a_placeholder() {
        assert_eq!(truncate_to_move(2799), 2700);
        assert_eq!(truncate_to_move(2800), 2800);
        assert_eq!(truncate_to_move(42), 100);
    }
}
