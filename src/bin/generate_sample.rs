//! Write a synthetic patient cohort to `.csv` or `.parquet`.
//!
//! Usage: `generate_sample [OUTPUT] [--count N] [--seed S]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use febrile_dx::data::export::write_table;
use febrile_dx::data::synthetic::CohortGenerator;

#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Output file; the extension picks the format
    #[arg(default_value = "sample_patients.csv")]
    output: PathBuf,

    /// Number of patients
    #[arg(long, default_value_t = 300)]
    count: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let table = CohortGenerator::new(args.seed).generate_table(args.count);
    write_table(&args.output, &table)
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!(
        "Wrote {} patients ({} columns each) to {}",
        table.1.len(),
        table.0.len(),
        args.output.display()
    );
    Ok(())
}
