// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Experience library commands
//!
//! Commands: show, restore

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use praxis_cortex::application::ExperienceService;
use praxis_cortex::{ExperienceLibrary, ExperienceOwner};

use crate::bootstrap::Bootstrap;

#[derive(Subcommand)]
pub enum LibraryCommand {
    /// Print experience libraries
    Show {
        /// Only this library (shared, generator_<k>, critic)
        #[arg(long)]
        owner: Option<String>,

        /// Print the libraries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the live libraries with an epoch checkpoint
    Restore {
        #[arg(value_name = "EPOCH")]
        epoch: u32,
    },
}

pub async fn handle_command(command: LibraryCommand, config_path: Option<PathBuf>) -> Result<()> {
    let bootstrap = Bootstrap::load(config_path)?;
    match command {
        LibraryCommand::Show { owner, json } => show(&bootstrap, owner, json).await,
        LibraryCommand::Restore { epoch } => restore(&bootstrap, epoch).await,
    }
}

async fn show(bootstrap: &Bootstrap, owner: Option<String>, json: bool) -> Result<()> {
    let owners = match owner {
        Some(raw) => vec![raw
            .parse::<ExperienceOwner>()
            .map_err(|e| anyhow::anyhow!("Invalid owner '{}': {}", raw, e))?],
        None => bootstrap.owners(),
    };

    let experience = bootstrap.experience().await?;
    let libraries: Vec<ExperienceLibrary> = owners.into_iter().map(|o| experience.snapshot(o)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&libraries).context("Failed to serialize libraries")?);
        return Ok(());
    }

    for library in &libraries {
        print_library(library);
    }
    Ok(())
}

fn print_library(library: &ExperienceLibrary) {
    println!("{} ({} experiences)", library.owner().key().bold(), library.len());
    if library.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    for experience in library.experiences() {
        println!(
            "  [{}] {} {}",
            experience.id,
            experience.content,
            format!(
                "({}; {}/{} successful uses)",
                experience.category, experience.success_count, experience.usage_count
            )
            .dimmed()
        );
    }
    println!();
}

async fn restore(bootstrap: &Bootstrap, epoch: u32) -> Result<()> {
    let experience = bootstrap.experience().await?;
    let restored = experience
        .restore_checkpoint(epoch)
        .await
        .with_context(|| format!("Failed to restore epoch {} checkpoint", epoch))?;
    if restored == 0 {
        anyhow::bail!("No checkpoint found for epoch {}", epoch);
    }
    println!("{}", format!("✓ Restored {} libraries from epoch {}", restored, epoch).green());
    Ok(())
}
