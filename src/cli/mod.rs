//! B-Connect CLI Module
//!
//! Command-line interface and interactive dashboard for model selection and prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{PipelineConfig, MAX_SEED, MAX_TEST_PERCENT, MIN_TEST_PERCENT};
use crate::data::{Dataset, LoadOptions};
use crate::pipeline::{FeatureQuery, ModelSelectionPipeline, PipelineOutcome, Selection};
use crate::training::{EvaluationReport, ModelRegistry};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bconnect")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predict student scores with the best of twelve regressors")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The first column holds row labels (e.g. an exported index) and is dropped
    #[arg(long, global = true)]
    pub index_col: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show dataset indicators and a preview
    Info {
        /// Input data file (CSV, JSON, Parquet or Excel)
        #[arg(short, long)]
        data: PathBuf,

        /// Column whose best and worst values are reported
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Compare every model on a holdout split
    Rank {
        /// Input data file (CSV, JSON, Parquet or Excel)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column
        #[arg(short, long)]
        target: Option<String>,

        /// Feature columns, in order
        #[arg(short, long, num_args = 1.., required = true)]
        features: Vec<String>,

        /// Percentage of rows held out for scoring
        #[arg(long, value_parser = clap::value_parser!(u32).range(MIN_TEST_PERCENT as i64..=MAX_TEST_PERCENT as i64))]
        test_size: Option<u32>,

        /// Shuffle seed
        #[arg(long, value_parser = clap::value_parser!(u64).range(0..=MAX_SEED))]
        seed: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pick the best model, refit it on all rows and predict one student
    Predict {
        /// Input data file (CSV, JSON, Parquet or Excel)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column
        #[arg(short, long)]
        target: Option<String>,

        /// Feature columns, in order
        #[arg(short, long, num_args = 1.., required = true)]
        features: Vec<String>,

        /// Feature values as name=value; missing features count as 0
        #[arg(short = 'v', long = "value", value_parser = parse_assignment)]
        values: Vec<(String, f64)>,

        /// Percentage of rows held out for scoring
        #[arg(long, value_parser = clap::value_parser!(u32).range(MIN_TEST_PERCENT as i64..=MAX_TEST_PERCENT as i64))]
        test_size: Option<u32>,

        /// Shuffle seed
        #[arg(long, value_parser = clap::value_parser!(u64).range(0..=MAX_SEED))]
        seed: Option<u64>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Parse a `name=value` pair
fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing feature name in '{}'", s));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.to_string(), value))
}

// ─── Shared setup ──────────────────────────────────────────────────────────────

/// Load `--config` or fall back to defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(p) => Ok(PipelineConfig::load(&p.to_string_lossy())?),
        None => Ok(PipelineConfig::default()),
    }
}

/// Apply command-line split overrides on top of the loaded configuration
fn with_overrides(config: PipelineConfig, test_size: Option<u32>, seed: Option<u64>) -> PipelineConfig {
    let mut config = config;
    if let Some(percent) = test_size {
        config = config.with_test_fraction(percent as f64 / 100.0);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    config
}

fn load_dataset(path: &Path, options: &LoadOptions) -> anyhow::Result<Dataset> {
    step_run("Loading data");
    let start = Instant::now();
    let dataset = Dataset::load_with(path, options)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.n_cols(),
        start.elapsed()
    ));
    Ok(dataset)
}

fn show_indicators(dataset: &Dataset, target: Option<&str>) -> anyhow::Result<()> {
    let summary = dataset.summary(target)?;

    section("Indicators");
    if let Some(source) = dataset.source() {
        println!("  {:<14} {}", muted("File"), source.display());
    }
    println!("  {:<14} {}", muted("Students"), summary.n_rows.to_string().white().bold());
    println!("  {:<14} {}", muted("Columns"), summary.n_cols);
    if let Some(stats) = &summary.target {
        println!("  {:<14} {}", muted("Best score"), format!("{}", stats.max).white().bold());
        println!("  {:<14} {}", muted("Worst score"), format!("{}", stats.min).white().bold());
    }
    let dtypes: Vec<String> = summary
        .dtype_counts
        .iter()
        .map(|(dtype, count)| format!("{} {}", count, dtype))
        .collect();
    println!("  {:<14} {}", muted("Types"), dtypes.join(", "));

    section("Preview");
    println!("{}", dataset.head(5));
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    section("Model comparison");
    println!(
        "  {:<28} {:>8} {:>9} {:>9} {:>9}",
        muted("Model"),
        muted("R²"),
        muted("RMSE"),
        muted("MAE"),
        muted("Time")
    );
    println!("  {}", dim(&"─".repeat(67)));

    for score in report.ranking() {
        let name = if score.name == report.best_name {
            score.name.white().bold()
        } else {
            score.name.normal()
        };
        println!(
            "  {:<28} {:>8.4} {:>9.4} {:>9.4} {:>8.3}s",
            name, score.metrics.r2, score.metrics.rmse, score.metrics.mae, score.fit_time_secs
        );
    }
    for (name, reason) in report.failures() {
        println!("  {:<28} {}", name, format!("err: {}", reason).red());
    }
    println!("  {}", dim(&"─".repeat(67)));

    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("best"),
        report.best_name.white().bold(),
        muted("R²:"),
        report.best_score
    );
}

fn print_prediction(outcome: &PipelineOutcome) {
    section("Prediction");
    println!("  {:<14} {}", muted("Model"), outcome.best_name.white().bold());
    println!("  {:<14} {:.4}", muted("R²"), outcome.best_score);
    println!(
        "  {:<14} {}",
        muted("Predicted"),
        format!("{:.4}", outcome.prediction).white().bold()
    );
    println!(
        "  {:<14} {}",
        muted("As percent"),
        format!("{:.2} %", outcome.prediction * 100.0).truecolor(120, 170, 255)
    );
    println!();
}

fn resolve_target(target: Option<String>, config: &PipelineConfig) -> String {
    target.unwrap_or_else(|| config.default_target.clone())
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_info(config: &PipelineConfig, data_path: &Path, target: Option<&str>) -> anyhow::Result<()> {
    section("Data Info");
    let dataset = load_dataset(data_path, &config.load_options())?;
    show_indicators(&dataset, target)?;

    println!();
    println!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(42)));
    for col in dataset.frame().get_columns() {
        println!(
            "  {:<20} {:<12} {:>6}",
            col.name(),
            format!("{}", col.dtype()).truecolor(140, 140, 140),
            col.null_count()
        );
    }
    println!();
    Ok(())
}

pub fn cmd_rank(
    config: PipelineConfig,
    data_path: &Path,
    target: Option<String>,
    features: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let target = resolve_target(target, &config);
    let selection = Selection::new(features, target)?;

    if !json {
        section("Rank");
    }
    let options = config.load_options();
    let dataset = if json { Dataset::load_with(data_path, &options)? } else { load_dataset(data_path, &options)? };
    let pipeline = ModelSelectionPipeline::new(ModelRegistry::default_catalog(), config);
    let report = pipeline.rank(&dataset, &selection)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        println!();
    }
    Ok(())
}

pub fn cmd_predict(
    config: PipelineConfig,
    data_path: &Path,
    target: Option<String>,
    features: Vec<String>,
    values: Vec<(String, f64)>,
    json: bool,
) -> anyhow::Result<()> {
    let target = resolve_target(target, &config);
    let selection = Selection::new(features, target)?;

    let values: HashMap<String, f64> = values.into_iter().collect();
    if let Some(unknown) = values.keys().find(|k| !selection.features().contains(*k)) {
        anyhow::bail!("'{}' is not a selected feature", unknown);
    }
    let query = FeatureQuery::from_map_or_default(&selection, &values);

    if !json {
        section("Predict");
    }
    let options = config.load_options();
    let dataset = if json { Dataset::load_with(data_path, &options)? } else { load_dataset(data_path, &options)? };
    let pipeline = ModelSelectionPipeline::new(ModelRegistry::default_catalog(), config);
    let outcome = pipeline.run(&dataset, &selection, &query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_report(&outcome.report);
        print_prediction(&outcome);
    }
    Ok(())
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let config = if cli.index_col { config.with_index_column(true) } else { config };

    match cli.command {
        Some(Commands::Info { data, target }) => cmd_info(&config, &data, target.as_deref()),
        Some(Commands::Rank { data, target, features, test_size, seed, json }) => {
            cmd_rank(with_overrides(config, test_size, seed), &data, target, features, json)
        }
        Some(Commands::Predict { data, target, features, values, test_size, seed, json }) => {
            cmd_predict(with_overrides(config, test_size, seed), &data, target, features, values, json)
        }
        None => cmd_interactive(config),
    }
}

// ─── Interactive mode ──────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("       {}", "┏┓    ┏━╸┏━┓┏┓╻┏┓╻┏━╸┏━╸╺┳╸".truecolor(120, 170, 255));
    println!("       {}", "┣┻┓╺━╸┃  ┃ ┃┃┗┫┃┗┫┣╸ ┃   ┃ ".truecolor(100, 150, 240));
    println!("       {}", "┗━┛   ┗━╸┗━┛╹ ╹╹ ╹┗━╸┗━╸ ╹ ".truecolor(80, 130, 220));
    println!();
    println!("       {}", dim(&format!("Student score prediction  ·  v{}", env!("CARGO_PKG_VERSION"))));
    println!();
}

fn dashboard_theme() -> dialoguer::theme::ColorfulTheme {
    use dialoguer::console::{style, Style};

    dialoguer::theme::ColorfulTheme {
        active_item_prefix: style("  ›".to_string()).for_stderr().cyan(),
        active_item_style: Style::new().for_stderr().white().bold(),
        inactive_item_prefix: style("   ".to_string()).for_stderr(),
        inactive_item_style: Style::new().for_stderr().color256(245),
        prompt_prefix: style("  ?".to_string()).for_stderr().color256(111),
        prompt_style: Style::new().for_stderr().white().bold(),
        ..dialoguer::theme::ColorfulTheme::default()
    }
}

/// One dashboard round: selection, split parameters and the query row
fn dashboard_round(
    theme: &dialoguer::theme::ColorfulTheme,
    dataset: &Dataset,
    config: &PipelineConfig,
) -> anyhow::Result<Option<PipelineOutcome>> {
    use dialoguer::{Input, MultiSelect, Select};

    let columns = dataset.numeric_columns();
    if columns.len() < 2 {
        anyhow::bail!("the dataset needs at least two numeric columns");
    }

    let picked = MultiSelect::with_theme(theme)
        .with_prompt("Features (space to toggle)")
        .items(&columns)
        .interact()?;
    if picked.is_empty() {
        println!("  {}", "Select at least one feature".yellow());
        return Ok(None);
    }
    let features: Vec<String> = picked.iter().map(|&i| columns[i].clone()).collect();

    let targets: Vec<&String> = columns.iter().filter(|c| !features.contains(c)).collect();
    if targets.is_empty() {
        println!("  {}", "Leave one column unselected for the target".yellow());
        return Ok(None);
    }
    let default_target = targets
        .iter()
        .position(|c| **c == config.default_target)
        .unwrap_or(0);
    let target_idx = Select::with_theme(theme)
        .with_prompt("Target")
        .items(&targets)
        .default(default_target)
        .interact()?;
    let target = targets[target_idx].clone();

    let percent: u32 = Input::with_theme(theme)
        .with_prompt(format!("Test size % ({}-{})", MIN_TEST_PERCENT, MAX_TEST_PERCENT))
        .default(config.test_percent().clamp(MIN_TEST_PERCENT, MAX_TEST_PERCENT))
        .validate_with(|v: &u32| {
            if (MIN_TEST_PERCENT..=MAX_TEST_PERCENT).contains(v) {
                Ok(())
            } else {
                Err(format!("must lie between {} and {}", MIN_TEST_PERCENT, MAX_TEST_PERCENT))
            }
        })
        .interact_text()?;

    let seed: u64 = Input::with_theme(theme)
        .with_prompt(format!("Seed (0-{})", MAX_SEED))
        .default(config.seed.min(MAX_SEED))
        .validate_with(|v: &u64| {
            if *v <= MAX_SEED {
                Ok(())
            } else {
                Err(format!("must not exceed {}", MAX_SEED))
            }
        })
        .interact_text()?;

    let mut values = HashMap::new();
    for feature in &features {
        let value: f64 = Input::with_theme(theme)
            .with_prompt(format!("Value for {}", feature))
            .default(0.0)
            .interact_text()?;
        values.insert(feature.clone(), value);
    }

    let selection = Selection::new(features, target)?;
    let query = FeatureQuery::from_map_or_default(&selection, &values);
    let config = config
        .clone()
        .with_test_fraction(percent as f64 / 100.0)
        .with_seed(seed);
    let pipeline = ModelSelectionPipeline::new(ModelRegistry::default_catalog(), config);

    step_run("Training models");
    let start = Instant::now();
    let outcome = pipeline.run(dataset, &selection, &query)?;
    step_done(&format!("{:?}", start.elapsed()));
    Ok(Some(outcome))
}

pub fn cmd_interactive(config: PipelineConfig) -> anyhow::Result<()> {
    use dialoguer::{Confirm, Input};

    print_banner();
    let theme = dashboard_theme();

    let path: String = Input::with_theme(&theme)
        .with_prompt("Dataset file (CSV, JSON, Parquet or Excel)")
        .interact_text()?;
    let index_column = Confirm::with_theme(&theme)
        .with_prompt("First column holds row labels")
        .default(config.index_column)
        .interact()?;
    let options = config.load_options().with_index_column(index_column);
    let dataset = load_dataset(Path::new(path.trim()), &options)?;

    let target = dataset
        .numeric_columns()
        .into_iter()
        .find(|c| *c == config.default_target);
    show_indicators(&dataset, target.as_deref())?;

    loop {
        println!();
        match dashboard_round(&theme, &dataset, &config) {
            Ok(Some(outcome)) => {
                print_report(&outcome.report);
                print_prediction(&outcome);
            }
            Ok(None) => {}
            Err(e) => println!("  {} {}", "error".red(), e),
        }

        let again = Confirm::with_theme(&theme)
            .with_prompt("Run another prediction")
            .default(true)
            .interact()?;
        if !again {
            println!();
            println!("  {}", dim("goodbye"));
            println!();
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("hours_studied=5").unwrap(),
            ("hours_studied".to_string(), 5.0)
        );
        assert_eq!(
            parse_assignment(" attendance = 0.9 ").unwrap(),
            ("attendance".to_string(), 0.9)
        );
        assert!(parse_assignment("hours").is_err());
        assert!(parse_assignment("=1").is_err());
        assert!(parse_assignment("hours=abc").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = with_overrides(PipelineConfig::default(), Some(30), Some(7));
        assert_eq!(config.test_percent(), 30);
        assert_eq!(config.seed, 7);

        let config = with_overrides(PipelineConfig::default(), None, None);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_cli_parses_predict() {
        let cli = Cli::try_parse_from([
            "bconnect", "predict", "-d", "scores.csv", "-f", "hours_studied", "attendance",
            "-v", "hours_studied=5", "-v", "attendance=0.9", "--seed", "10",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Predict { features, values, seed, test_size, target, .. }) => {
                assert_eq!(features, vec!["hours_studied", "attendance"]);
                assert_eq!(values.len(), 2);
                assert_eq!(seed, Some(10));
                assert_eq!(test_size, None);
                assert_eq!(target, None);
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn test_index_col_is_global() {
        let cli = Cli::try_parse_from(["bconnect", "info", "-d", "dataset.xlsx", "--index-col"]).unwrap();
        assert!(cli.index_col);
        let cli = Cli::try_parse_from(["bconnect", "info", "-d", "dataset.xlsx"]).unwrap();
        assert!(!cli.index_col);
    }

    #[test]
    fn test_cli_rejects_out_of_range_test_size() {
        assert!(Cli::try_parse_from([
            "bconnect", "rank", "-d", "scores.csv", "-f", "a", "--test-size", "60",
        ])
        .is_err());
    }
}
