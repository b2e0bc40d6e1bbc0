//! Command line interface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::data::loader::TabularParser;
use crate::data::model::{label_name, Record, SCHEMA};
use crate::inference::calibration::CalibrationStrategy;
use crate::inference::classifier::{EpochProgress, SoftmaxRegression};
use crate::session::{BatchResult, Session, TrainingData, TrainingSummary};

/// Classify febrile illness records as dengue, malaria or leptospirosis
#[derive(Parser, Debug, Clone)]
#[command(name = "febrile-dx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Verbosity level (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// JSON config file; flags below override its values
    #[arg(long, env = "FEBRILE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Calibration strategy
    #[arg(long, value_enum, env = "FEBRILE_CALIBRATION", global = true)]
    pub calibration: Option<CalibrationStrategy>,

    /// Synthetic cohort size used when no training file is given
    #[arg(long, env = "FEBRILE_SAMPLES", global = true)]
    pub samples: Option<usize>,

    /// Seed for the synthetic cohort
    #[arg(long, env = "FEBRILE_SEED", global = true)]
    pub seed: Option<u64>,

    /// Training epochs
    #[arg(long, env = "FEBRILE_EPOCHS", global = true)]
    pub epochs: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// `0` = quiet, `1` = normal, `2+` = more detail.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            1 + self.verbose
        }
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Config file (if any) with command-line overrides applied.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(c) = self.calibration {
            config.calibration = c;
        }
        if let Some(n) = self.samples {
            config.synthetic_samples = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(epochs) = self.epochs {
            config.classifier.epochs = epochs;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Train a fresh model and report how it went
    Train {
        /// Labelled file to train on instead of the synthetic cohort
        #[arg(long, value_name = "FILE")]
        train_data: Option<PathBuf>,
    },

    /// Train, then classify every row of a file (evaluates when a diagnosis column exists)
    Predict {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Labelled file to train on instead of the synthetic cohort
        #[arg(long, value_name = "FILE")]
        train_data: Option<PathBuf>,
    },

    /// Train, then classify a single record
    Classify {
        /// Field value as name=value; repeatable
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,

        /// Record as a flat JSON object
        #[arg(long, value_name = "JSON_FILE", conflicts_with = "fields")]
        record: Option<PathBuf>,
    },

    /// List the feature schema in vector order
    Schema,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

pub async fn run(args: Args) -> Result<()> {
    let parser = TabularParser::default();

    match &args.command {
        Command::Schema => print_schema(args.json)?,
        Command::Train { train_data } => {
            let mut session = new_session(&args)?;
            let summary = train(&mut session, &parser, train_data.as_deref()).await?;
            print_json_or(args.json, &summary, || print_summary(&summary))?;
        }
        Command::Predict { input, train_data } => {
            let mut session = new_session(&args)?;
            train(&mut session, &parser, train_data.as_deref()).await?;
            let result = session
                .predict_file(&parser, input)
                .with_context(|| format!("classifying {}", input.display()))?;
            print_json_or(args.json, &result, || print_batch(&result))?;
        }
        Command::Classify { fields, record } => {
            let record = match record {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    Record::from_json(&text)?
                }
                None => Record::from_pairs(fields.iter().map(String::as_str))?,
            };
            let mut session = new_session(&args)?;
            train(&mut session, &parser, None).await?;
            let decision = session.classify(&record)?;
            print_json_or(args.json, &decision, || {
                println!(
                    "{} (confidence {:.1}%)",
                    label_name(decision.label),
                    decision.confidence * 100.0
                );
                for (name, p) in &decision.probabilities {
                    println!("  {name:<14} {:.3}", p);
                }
            })?;
        }
    }
    Ok(())
}

fn new_session(args: &Args) -> Result<Session<SoftmaxRegression>> {
    let config = args.pipeline_config()?;
    Ok(Session::new(SoftmaxRegression::new(config.classifier.clone()), config))
}

async fn train(
    session: &mut Session<SoftmaxRegression>,
    parser: &TabularParser,
    train_data: Option<&Path>,
) -> Result<TrainingSummary> {
    let data = match train_data {
        Some(path) => {
            let (headers, rows) = parser
                .load_file(path)
                .with_context(|| format!("loading training data {}", path.display()))?;
            TrainingData::Dataset(session.encoder().encode(&headers, &rows)?)
        }
        None => {
            log::info!(
                "No training file given; fitting on {} synthetic patients",
                session.config().synthetic_samples
            );
            TrainingData::Synthetic
        }
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EpochProgress>();
    let reporter = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            let step = (p.epochs / 10).max(1);
            if p.epoch % step == 0 || p.epoch == p.epochs {
                log::info!(
                    "epoch {}/{} | loss={:.4} acc={:.3}",
                    p.epoch,
                    p.epochs,
                    p.loss,
                    p.accuracy
                );
            }
        }
    });

    let summary = session.train_async(data, Some(tx)).await?;
    reporter.await.context("progress reporter failed")?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json_or<T: serde::Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!(
        "Trained on {} {} samples for {} epochs: loss={:.4} accuracy={:.3}",
        summary.samples, summary.source, summary.epochs, summary.final_loss, summary.final_accuracy
    );
}

fn print_batch(result: &BatchResult) {
    println!("{:<12} {:<14} {:<14} {:>10}", "id", "predicted", "actual", "confidence");
    for p in &result.predictions {
        let actual = p.actual_label.map(label_name).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<14} {:<14} {:>9.1}%",
            p.id,
            p.predicted,
            actual,
            p.confidence * 100.0
        );
    }
    if let (Some(cm), Some(metrics)) = (&result.confusion_matrix, &result.metrics) {
        println!();
        print!("{cm}");
        println!();
        println!("{metrics}");
        for c in &metrics.per_class {
            println!(
                "  {:<14} precision={:.3} recall={:.3} f1={:.3} support={}",
                c.class, c.precision, c.recall, c.f1, c.support
            );
        }
    }
}

fn print_schema(json: bool) -> Result<()> {
    let fields: Vec<(usize, &str, String)> = SCHEMA
        .iter()
        .enumerate()
        .map(|(i, f)| (i, f.name, format!("{:?}", f.kind).to_lowercase()))
        .collect();
    print_json_or(json, &fields, || {
        for (i, name, kind) in &fields {
            println!("{i:>3}  {name:<30} {kind}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "febrile-dx",
            "--calibration",
            "demo",
            "--samples",
            "90",
            "predict",
            "patients.csv",
        ])
        .unwrap();
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.calibration, CalibrationStrategy::Demo);
        assert_eq!(config.synthetic_samples, 90);
        assert!(matches!(args.command, Command::Predict { .. }));
    }

    #[test]
    fn temperature_is_not_a_flag() {
        let res = Args::try_parse_from(["febrile-dx", "--temperature", "0.3", "schema"]);
        assert!(res.is_err());
    }

    #[test]
    fn verbosity_levels() {
        let quiet = Args::try_parse_from(["febrile-dx", "-q", "schema"]).unwrap();
        assert_eq!(quiet.log_filter(), "error");
        let loud = Args::try_parse_from(["febrile-dx", "-vv", "schema"]).unwrap();
        assert_eq!(loud.log_filter(), "trace");
    }

    #[test]
    fn classify_fields_and_record_conflict() {
        let res = Args::try_parse_from([
            "febrile-dx",
            "classify",
            "--field",
            "age=30",
            "--record",
            "r.json",
        ]);
        assert!(res.is_err());
    }
}
