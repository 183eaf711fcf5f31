// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `praxis solve`: answer problems with the current libraries, without learning

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::warn;

use praxis_core::application::training::with_ids;
use praxis_core::domain::answer::{DatasetLoader, Problem};

use crate::bootstrap::Bootstrap;
use crate::dataset::JsonlDataset;

#[derive(Args)]
pub struct SolveArgs {
    /// Problem text
    #[arg(value_name = "PROBLEM", required_unless_present = "dataset")]
    pub problem: Option<String>,

    /// Expected answer; the result is scored against it
    #[arg(long, requires = "problem")]
    pub answer: Option<String>,

    /// Solve every problem in a JSON-lines file instead
    #[arg(long, value_name = "FILE", conflicts_with = "problem")]
    pub dataset: Option<PathBuf>,

    /// Print one JSON object per problem
    #[arg(long)]
    pub json: bool,
}

pub async fn handle_command(args: SolveArgs, config_path: Option<PathBuf>) -> Result<()> {
    let problems = match (&args.problem, &args.dataset) {
        (Some(text), _) => vec![Problem::new("problem", text.as_str(), args.answer.clone())],
        (None, Some(path)) => with_ids(JsonlDataset::new(path).load().await?),
        (None, None) => anyhow::bail!("Provide a problem or --dataset"),
    };

    let bootstrap = Bootstrap::load(config_path)?;
    let (_, roles) = bootstrap.providers()?;
    let (trainer, _) = bootstrap.trainer(&roles).await?;

    let mut scored = 0usize;
    let mut correct = 0usize;
    for problem in &problems {
        let outcome = match trainer.solve(problem).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(problem_id = %problem.id, "{:#}", e);
                if !args.json {
                    println!("{} {}: {:#}", "✗".red(), problem.id, e);
                }
                continue;
            }
        };

        if let Some(reward) = outcome.reward {
            scored += 1;
            if reward >= 1.0 {
                correct += 1;
            }
        }

        if args.json {
            println!("{}", serde_json::to_string(&outcome).context("Failed to serialize result")?);
            continue;
        }

        let answer = outcome.answer.as_deref().unwrap_or("(no answer)");
        let mark = match outcome.reward {
            Some(r) if r >= 1.0 => " ✓".green().to_string(),
            Some(_) => " ✗".red().to_string(),
            None => String::new(),
        };
        println!(
            "{}: {} ({}/{} votes){}",
            problem.id.bold(),
            answer,
            outcome.votes,
            outcome.fused.len(),
            mark
        );
    }

    if scored > 1 && !args.json {
        println!();
        println!("Accuracy: {}/{} ({:.1}%)", correct, scored, correct as f64 * 100.0 / scored as f64);
    }
    Ok(())
}
