// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge base commands
//!
//! Commands: add, search

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use praxis_cortex::KnowledgeEntry;

use crate::bootstrap::Bootstrap;

#[derive(Subcommand)]
pub enum KnowledgeCommand {
    /// Append rules to the knowledge base (duplicates are skipped)
    Add {
        /// Rule text, e.g. "F = m * a"
        #[arg(value_name = "RULE", required_unless_present = "file")]
        rules: Vec<String>,

        /// Category for rules given on the command line
        #[arg(long, default_value = "general")]
        category: String,

        /// JSON-lines file of {"rule", "category"} objects
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Show the rules retrieval would inject for a problem
    Search {
        #[arg(value_name = "PROBLEM")]
        problem: String,

        /// Override the configured top_k
        #[arg(long)]
        top_k: Option<usize>,
    },
}

pub async fn handle_command(command: KnowledgeCommand, config_path: Option<PathBuf>) -> Result<()> {
    let bootstrap = Bootstrap::load(config_path)?;
    match command {
        KnowledgeCommand::Add { rules, category, file } => add(&bootstrap, rules, category, file).await,
        KnowledgeCommand::Search { problem, top_k } => search(&bootstrap, &problem, top_k).await,
    }
}

async fn add(bootstrap: &Bootstrap, rules: Vec<String>, category: String, file: Option<PathBuf>) -> Result<()> {
    let mut entries: Vec<KnowledgeEntry> = rules
        .into_iter()
        .map(|rule| KnowledgeEntry {
            rule,
            category: category.clone(),
        })
        .collect();

    if let Some(path) = file {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        for (i, line) in content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let entry: KnowledgeEntry =
                serde_json::from_str(line).with_context(|| format!("Invalid rule on line {} of {:?}", i + 1, path))?;
            entries.push(entry);
        }
    }

    let proposed = entries.len();
    let retriever = bootstrap.open_retriever().await?;
    let appended = retriever.append_rules(entries).await?;
    println!(
        "{}",
        format!(
            "✓ Added {} of {} rules to {}",
            appended,
            proposed,
            bootstrap.spec().retrieval.knowledge_path.display()
        )
        .green()
    );
    Ok(())
}

async fn search(bootstrap: &Bootstrap, problem: &str, top_k: Option<usize>) -> Result<()> {
    let retrieval = &bootstrap.spec().retrieval;
    let retriever = bootstrap.open_retriever().await?;
    let outcome = retriever
        .retrieve(problem, top_k.unwrap_or(retrieval.top_k), retrieval.similarity_threshold)
        .await;

    println!("{} ({:?} retrieval)", "Matching rules:".bold(), outcome.mode);
    if outcome.is_empty() {
        println!("  {}", "(nothing above the similarity threshold)".dimmed());
    }
    for rule in &outcome.rules {
        println!("  {:.3}  [{}] {}", rule.score, rule.entry.category, rule.entry.rule);
    }
    Ok(())
}
