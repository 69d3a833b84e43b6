//! Conditional step navigator CLI.
//!
//! Validates task definitions and simulates committed runs from scripted
//! answers, printing the path taken, progress, and the final cohorts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use navigator::core::types::Direction;
use navigator::exit_codes;
use navigator::io::answers::{Answers, load_answers};
use navigator::io::config::load_config;
use navigator::io::task_store::load_navigator;
use navigator::logging;
use navigator::walk::{WalkOptions, WalkOutcome, WalkReport, walk};

#[derive(Parser)]
#[command(
    name = "navigator",
    version,
    about = "Conditional step navigator for surveys and assessments"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a task against the schema and invariants (resolvable targets, unique ids, etc.).
    Validate {
        /// Task definition (JSON).
        task: PathBuf,
        /// Navigator config (TOML). Defaults apply when the file is missing.
        #[arg(long, default_value = "navigator.toml")]
        config: PathBuf,
    },
    /// Simulate a committed run, answering steps from a JSON file.
    Walk {
        /// Task definition (JSON).
        task: PathBuf,
        /// JSON object mapping step identifiers to answers.
        #[arg(long)]
        answers: Option<PathBuf>,
        /// Navigator config (TOML). Defaults apply when the file is missing.
        #[arg(long, default_value = "navigator.toml")]
        config: PathBuf,
        /// Cohort the run starts in (repeatable).
        #[arg(long = "cohort", value_name = "TAG")]
        cohorts: Vec<String>,
        /// Print the walk report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Validate { task, config } => cmd_validate(&task, &config),
        Command::Walk {
            task,
            answers,
            config,
            cohorts,
            json,
        } => cmd_walk(&task, answers.as_deref(), &config, cohorts, json),
    }
}

fn cmd_validate(task_path: &Path, config_path: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let navigator = load_navigator(task_path, &cfg.navigation)?;
    println!(
        "{}: ok ({} steps)",
        navigator.task().identifier,
        navigator.leaf_count()
    );
    Ok(exit_codes::OK)
}

fn cmd_walk(
    task_path: &Path,
    answers_path: Option<&Path>,
    config_path: &Path,
    cohorts: Vec<String>,
    json: bool,
) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let navigator = Arc::new(load_navigator(task_path, &cfg.navigation)?);
    let answers = match answers_path {
        Some(path) => load_answers(path)?,
        None => Answers::default(),
    };
    let options = WalkOptions {
        max_steps: cfg.walk.max_steps,
        initial_cohorts: cohorts.into_iter().collect(),
    };
    let report = walk(navigator, &answers, &options)
        .with_context(|| format!("walk {}", task_path.display()))?;

    if json {
        let payload = serde_json::to_string_pretty(&report).context("serialize walk report")?;
        println!("{}", payload);
    } else {
        print_report(&report);
    }

    Ok(match report.outcome {
        WalkOutcome::Completed => exit_codes::OK,
        WalkOutcome::Exited => exit_codes::EXITED,
        WalkOutcome::StepLimit => exit_codes::STEP_LIMIT,
    })
}

fn print_report(report: &WalkReport) {
    for (idx, step) in report.path.iter().enumerate() {
        let progress = step
            .progress
            .map(|p| {
                let marker = if p.is_estimated { "~" } else { "" };
                format!("{}{}/{}", marker, p.current, p.total)
            })
            .unwrap_or_else(|| "-".to_string());
        let answer = step
            .answer
            .as_ref()
            .map(|value| format!(" = {}", value))
            .unwrap_or_default();
        let back = if step.direction == Direction::Backward {
            " (back)"
        } else {
            ""
        };
        println!(
            "{:>3}. {} [{}]{}{}",
            idx + 1,
            step.identifier,
            progress,
            answer,
            back
        );
    }
    let cohorts: Vec<&str> = report.cohorts.iter().collect();
    println!("cohorts: [{}]", cohorts.join(", "));
    println!("outcome: {}", outcome_label(report.outcome));
}

fn outcome_label(outcome: WalkOutcome) -> &'static str {
    match outcome {
        WalkOutcome::Completed => "completed",
        WalkOutcome::Exited => "exited",
        WalkOutcome::StepLimit => "step limit reached",
    }
}
