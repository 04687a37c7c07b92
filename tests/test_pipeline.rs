//! Integration tests for model selection: evaluation, tie-breaking, refit and the full pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bconnect::prelude::*;
use bconnect::training::{LinearRegression, ModelOutcome};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Fixtures
// ============================================================================

/// 100 students with a noisy linear relation to the 0-20 average
fn students(n: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let hours: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
    let attendance: Vec<f64> = (0..n).map(|_| rng.gen_range(0.5..1.0)).collect();
    let moyenne: Vec<f64> = hours
        .iter()
        .zip(&attendance)
        .map(|(h, a)| (3.0 + 1.1 * h + 6.0 * a + rng.gen_range(-1.0..1.0)).clamp(0.0, 20.0))
        .collect();

    let df = polars::df!(
        "hours_studied" => hours,
        "attendance" => attendance,
        "moyenne" => moyenne
    )
    .unwrap();
    Dataset::from_frame(df)
}

fn selection() -> Selection {
    Selection::new(
        vec!["hours_studied".to_string(), "attendance".to_string()],
        "moyenne",
    )
    .unwrap()
}

fn query() -> FeatureQuery {
    FeatureQuery::new(vec![5.0, 0.9])
}

/// Noise-free y = 1 + 2 x0 - x1
fn linear_split() -> TrainTestSplit {
    let x = Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { i as f64 } else { ((i * 7) % 11) as f64 });
    let y: Array1<f64> = x.rows().into_iter().map(|r| 1.0 + 2.0 * r[0] - r[1]).collect();
    train_test_split(&x, &y, &SplitConfig::default()).unwrap()
}

/// Always predicts the training mean
struct MeanRegressor {
    mean: f64,
}

impl Regressor for MeanRegressor {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.mean = y.mean().unwrap_or(0.0);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.nrows(), self.mean))
    }
}

/// Predicts the training mean shifted far off
struct OffsetRegressor {
    mean: f64,
}

impl Regressor for OffsetRegressor {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.mean = y.mean().unwrap_or(0.0);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.nrows(), self.mean + 50.0))
    }
}

struct BrokenRegressor;

impl Regressor for BrokenRegressor {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Err(BConnectError::ComputationError("singular system".to_string()))
    }

    fn predict(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(BConnectError::ModelNotFitted)
    }
}

fn registry_of(names: &[&str]) -> ModelRegistry {
    names.iter().fold(ModelRegistry::new(), |registry, &name| {
        let registry = match name {
            "linear" => registry.register(name, || Box::new(LinearRegression::new())),
            "mean" => registry.register(name, || Box::new(MeanRegressor { mean: 0.0 })),
            "offset" => registry.register(name, || Box::new(OffsetRegressor { mean: 0.0 })),
            _ => registry.register(name, || Box::new(BrokenRegressor)),
        };
        registry.unwrap()
    })
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_evaluation_is_deterministic() {
    let dataset = students(100);
    let split = SplitConfig::new(0.2, 32);
    let registry = ModelRegistry::default_catalog();

    let first = evaluate_selection(&dataset, &selection(), &split, &registry, &EvaluatorConfig::default()).unwrap();
    let second = evaluate_selection(&dataset, &selection(), &split, &registry, &EvaluatorConfig::default()).unwrap();

    assert_eq!(first.best_name, second.best_name);
    assert_eq!(first.best_score, second.best_score);
}

#[test]
fn test_parallel_and_sequential_agree() {
    let dataset = students(100);
    let split = SplitConfig::new(0.2, 32);
    let registry = ModelRegistry::default_catalog();

    let parallel = evaluate_selection(&dataset, &selection(), &split, &registry, &EvaluatorConfig::default()).unwrap();
    let sequential = evaluate_selection(&dataset, &selection(), &split, &registry, &EvaluatorConfig::sequential()).unwrap();

    assert_eq!(parallel.best_name, sequential.best_name);
    assert_eq!(parallel.best_score, sequential.best_score);
    let names: Vec<&str> = parallel.outcomes.iter().map(ModelOutcome::name).collect();
    assert_eq!(names, registry.names());
}

#[test]
fn test_tie_goes_to_earliest_registered() {
    let split = linear_split();
    let registry = ModelRegistry::new()
        .register("first", || Box::new(LinearRegression::new()))
        .unwrap()
        .register("second", || Box::new(LinearRegression::new()))
        .unwrap();

    let report = evaluate_all(&split, &registry).unwrap();
    assert_eq!(report.best_name, "first");

    let reversed = ModelRegistry::new()
        .register("second", || Box::new(LinearRegression::new()))
        .unwrap()
        .register("first", || Box::new(LinearRegression::new()))
        .unwrap();
    let report = evaluate_all(&split, &reversed).unwrap();
    assert_eq!(report.best_name, "second");
}

#[test]
fn test_best_is_argmax_for_every_order() {
    let split = linear_split();
    let orders: [[&str; 3]; 6] = [
        ["linear", "mean", "offset"],
        ["linear", "offset", "mean"],
        ["mean", "linear", "offset"],
        ["mean", "offset", "linear"],
        ["offset", "linear", "mean"],
        ["offset", "mean", "linear"],
    ];

    for order in orders {
        let report = evaluate_all(&split, &registry_of(&order)).unwrap();
        assert_eq!(report.best_name, "linear", "order {:?}", order);
        let max = report.ranking()[0].score();
        assert_eq!(report.best_score, max);
        assert!(report.ranking().iter().all(|s| s.score() <= report.best_score));
    }
}

#[test]
fn test_failing_model_is_excluded() {
    let split = linear_split();
    let report = evaluate_all(&split, &registry_of(&["broken", "linear", "mean"])).unwrap();

    assert_eq!(report.best_name, "linear");
    assert_eq!(report.outcomes.len(), 3);
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "broken");
    assert!(failures[0].1.contains("singular system"));
}

#[test]
fn test_all_models_failing_stops_the_run() {
    let dataset = students(50);
    let registry = registry_of(&["broken_a", "broken_b"]);

    let result = run_pipeline(
        &dataset,
        &selection(),
        &SplitConfig::default(),
        &query(),
        &registry,
        &EvaluatorConfig::default(),
    );

    match result {
        Err(BConnectError::NoModelTrained { failures }) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].0, "broken_a");
        }
        other => panic!("expected NoModelTrained, got {:?}", other.map(|o| o.prediction)),
    }
}

// ============================================================================
// Refit
// ============================================================================

#[test]
fn test_refit_builds_a_fresh_instance() {
    let dataset = students(60);
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let registry = ModelRegistry::new()
        .register("linear", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(LinearRegression::new())
        })
        .unwrap();

    let split = SplitConfig::default();
    let evaluator = EvaluatorConfig::sequential();
    let report = evaluate_selection(&dataset, &selection(), &split, &registry, &evaluator).unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let outcome = run_pipeline(&dataset, &selection(), &split, &query(), &registry, &evaluator).unwrap();
    // one instance for scoring, one for the refit
    assert_eq!(built.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.best_score, report.best_score);
    assert!(outcome.prediction.is_finite());
}

#[test]
fn test_refit_uses_every_row() {
    let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
    let y: Array1<f64> = x.column(0).mapv(|v| 3.0 * v + 1.0);
    let registry = registry_of(&["mean"]);

    let prediction = predict_for("mean", &registry, &x, &y, &FeatureQuery::new(vec![0.0])).unwrap();
    let full_mean = y.mean().unwrap();
    assert!((prediction - full_mean).abs() < 1e-12);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_end_to_end_student_prediction() {
    let dataset = students(100);
    let registry = ModelRegistry::default_catalog();

    let outcome = run_pipeline(
        &dataset,
        &selection(),
        &SplitConfig::new(0.2, 32),
        &query(),
        &registry,
        &EvaluatorConfig::default(),
    )
    .unwrap();

    assert!(registry.contains(&outcome.best_name));
    assert!(outcome.best_score <= 1.0);
    assert!(outcome.prediction.is_finite());
    assert_eq!(outcome.report.outcomes.len(), 12);
    // the relation is close to linear, so the winner explains most of the variance
    assert!(outcome.best_score > 0.5);
}

#[test]
fn test_pipeline_struct_matches_free_function() {
    let dataset = students(100);
    let pipeline = ModelSelectionPipeline::default();

    let outcome = pipeline.run(&dataset, &selection(), &query()).unwrap();
    let direct = run_pipeline(
        &dataset,
        &selection(),
        &SplitConfig::new(0.2, 32),
        &query(),
        pipeline.registry(),
        &EvaluatorConfig::default(),
    )
    .unwrap();

    assert_eq!(outcome.best_name, direct.best_name);
    assert_eq!(outcome.best_score, direct.best_score);
    assert_eq!(outcome.prediction, direct.prediction);
}

#[test]
fn test_split_boundaries_leave_both_partitions() {
    let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
    let y = Array1::from_iter((0..10).map(|i| i as f64));

    let low = train_test_split(&x, &y, &SplitConfig::new(0.1, 32)).unwrap();
    assert_eq!(low.n_test(), 1);
    assert_eq!(low.n_train(), 9);

    let high = train_test_split(&x, &y, &SplitConfig::new(0.5, 32)).unwrap();
    assert_eq!(high.n_test(), 5);
    assert_eq!(high.n_train(), 5);
}

#[test]
fn test_invalid_fraction_is_rejected_before_training() {
    let dataset = students(30);
    for fraction in [0.0, 1.0, -0.2, f64::NAN] {
        let result = evaluate_selection(
            &dataset,
            &selection(),
            &SplitConfig::new(fraction, 32),
            &ModelRegistry::default_catalog(),
            &EvaluatorConfig::default(),
        );
        assert!(matches!(result, Err(BConnectError::InvalidFraction(_))));
    }
}

#[test]
fn test_unknown_feature_is_reported() {
    let dataset = students(30);
    let selection = Selection::new(vec!["age".to_string()], "moyenne").unwrap();
    let result = evaluate_selection(
        &dataset,
        &selection,
        &SplitConfig::default(),
        &ModelRegistry::default_catalog(),
        &EvaluatorConfig::default(),
    );
    assert!(matches!(result, Err(BConnectError::FeatureNotFound(ref f)) if f == "age"));
}

#[test]
fn test_pipeline_split_override_is_used_by_rank() {
    let dataset = students(100);
    let pipeline = ModelSelectionPipeline::default().with_split(SplitConfig::new(0.3, 5));
    assert_eq!(pipeline.config().split_config(), SplitConfig::new(0.3, 5));

    let ranked = pipeline.rank(&dataset, &selection()).unwrap();
    let direct = evaluate_selection(
        &dataset,
        &selection(),
        &SplitConfig::new(0.3, 5),
        pipeline.registry(),
        &EvaluatorConfig::default(),
    )
    .unwrap();
    assert_eq!(ranked.best_name, direct.best_name);
    assert_eq!(ranked.best_score, direct.best_score);
}
