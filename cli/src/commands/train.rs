// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `praxis train`: run the training loop over a JSON-lines dataset

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::task::JoinHandle;

use praxis_core::application::TrainingReport;
use praxis_core::domain::config::ExecutionMode;
use praxis_core::domain::events::TrainingEvent;
use praxis_core::infrastructure::event_bus::{EventBus, EventBusError};

use crate::bootstrap::Bootstrap;
use crate::dataset::JsonlDataset;

#[derive(Args)]
pub struct TrainArgs {
    /// JSON-lines dataset of problems with ground truth
    #[arg(value_name = "DATASET")]
    pub dataset: PathBuf,

    /// Override the configured number of epochs
    #[arg(long)]
    pub epochs: Option<u32>,

    /// Only train on the first N problems
    #[arg(long)]
    pub limit: Option<usize>,

    /// Where to write the JSON report (default: training.report_path)
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Run generators and rollouts one at a time
    #[arg(long)]
    pub serial: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn handle_command(args: TrainArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut bootstrap = Bootstrap::load(config_path)?;
    {
        let training = &mut bootstrap.config.spec.training;
        if let Some(epochs) = args.epochs {
            training.epochs = epochs;
        }
        if args.serial {
            training.generator_execution = ExecutionMode::Serial;
            training.rollout_execution = ExecutionMode::Serial;
        }
    }
    bootstrap.config.validate().context("Invalid command line overrides")?;

    let (registry, roles) = bootstrap.providers()?;
    let (trainer, _) = bootstrap.trainer(&roles).await?;
    let dataset = JsonlDataset::new(&args.dataset).with_limit(args.limit);

    let epochs = bootstrap.spec().training.epochs;
    let progress = (!args.quiet).then(|| spawn_progress(&bootstrap.event_bus, epochs));
    let result = trainer.train(&dataset).await;
    if let Some((bar, handle)) = progress {
        handle.abort();
        bar.finish_and_clear();
    }
    let report = result?;

    print_summary(&report);

    println!();
    println!("{}", "Model usage:".bold());
    for (alias, usage) in registry.usage() {
        println!(
            "  {}: {} calls, {} failures, {} tokens",
            alias, usage.calls, usage.failures, usage.tokens.total_tokens
        );
    }

    if let Some(path) = args.report.or_else(|| bootstrap.spec().training.report_path.clone()) {
        report.write_json(&path)?;
        println!();
        println!("{}", format!("✓ Report written: {}", path.display()).green());
    }
    Ok(())
}

fn spawn_progress(event_bus: &EventBus, epochs: u32) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} epoch {msg} [{bar:30}] {pos}/{len} problems ({elapsed})")
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut events = event_bus.subscribe_training();
    let task_bar = bar.clone();
    let handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TrainingEvent::EpochStarted { epoch, problems, .. }) => {
                    task_bar.set_length(problems as u64);
                    task_bar.set_position(0);
                    task_bar.set_message(format!("{}/{}", epoch, epochs));
                }
                Ok(TrainingEvent::StepCompleted { .. }) | Ok(TrainingEvent::ProblemSkipped { .. }) => task_bar.inc(1),
                Ok(TrainingEvent::EpochCompleted { epoch, accuracy, .. }) => {
                    task_bar.println(format!("epoch {} done, accuracy {:.1}%", epoch, accuracy * 100.0));
                }
                Ok(_) | Err(EventBusError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
    });
    (bar, handle)
}

fn print_summary(report: &TrainingReport) {
    println!("{}", "Training summary:".bold());
    for epoch in &report.epochs {
        let accuracy = format!("{:.1}%", epoch.accuracy * 100.0);
        println!(
            "  Epoch {}: accuracy {} ({}/{} fused answers correct)",
            epoch.epoch,
            if epoch.accuracy >= 0.5 { accuracy.green() } else { accuracy.yellow() },
            epoch.fused_correct,
            epoch.fused_total
        );
        println!(
            "    distillations: {} applied, {} skipped, {} rejected",
            epoch.distillations_applied, epoch.distillations_skipped, epoch.distillations_rejected
        );
        for skipped in &epoch.skipped {
            println!("    {} {}: {}", "skipped".yellow(), skipped.problem_id, skipped.reason);
        }
    }
    let elapsed = report.finished_at - report.started_at;
    println!("  Finished in {}s", elapsed.num_seconds());
}
