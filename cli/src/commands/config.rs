// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use praxis_core::domain::config::{ExecutionMode, PraxisConfigManifest};
use praxis_core::domain::llm::ModelRole;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./praxis-config.yaml)
        #[arg(short, long, default_value = "./praxis-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples, force } => generate(output, examples, force).await,
    }
}

fn describe_mode(mode: ExecutionMode) -> String {
    match mode {
        ExecutionMode::Serial => "serial".to_string(),
        ExecutionMode::Parallel { max_concurrency } => format!("parallel (up to {})", max_concurrency),
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = PraxisConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to serialize configuration")?);
        return Ok(());
    }

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PRAXIS_CONFIG_PATH: {}",
            std::env::var("PRAXIS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./praxis-config.yaml");
        println!("  4. ~/.praxis/config.yaml");
        println!("  5. /etc/praxis/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;

    // LLM providers
    println!("{}", "LLM Providers:".bold());
    for provider in &spec.llm_providers {
        let state = if provider.enabled { "" } else { " [disabled]" };
        println!("  {} ({}){}", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!();

    println!("{}", "Roles:".bold());
    for role in ModelRole::all() {
        println!("  {}: {}", role, spec.roles.alias_for(role));
    }
    println!();

    let training = &spec.training;
    println!("{}", "Training:".bold());
    println!("  Epochs: {}", training.epochs);
    println!(
        "  Generators: {} × {} rollouts",
        training.num_generators, training.rollouts_per_generator
    );
    println!("  Generator execution: {}", describe_mode(training.generator_execution));
    println!("  Rollout execution: {}", describe_mode(training.rollout_execution));
    println!(
        "  Distillation: {:?}, τ = {}, up to {} operations",
        training.distillation.policy, training.distillation.variance_threshold, training.distillation.max_operations
    );
    println!();

    let retrieval = &spec.retrieval;
    println!("{}", "Retrieval:".bold());
    if retrieval.enabled {
        println!("  Knowledge base: {}", retrieval.knowledge_path.display());
        println!("  Top k: {} (threshold {})", retrieval.top_k, retrieval.similarity_threshold);
        match &retrieval.embedding {
            Some(embedding) => println!("  Embeddings: {} at {}", embedding.model, embedding.endpoint),
            None => println!("  Embeddings: hashed features ({} dimensions)", retrieval.hashing_dimension),
        }
    } else {
        println!("  {}", "(disabled)".dimmed());
    }
    println!();

    println!("{}", "Storage:".bold());
    println!("  Experience libraries: {}", spec.storage.experience_dir.display());

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PraxisConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_are_valid() {
        for sample in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = praxis_core::domain::config::PraxisConfigManifest::from_yaml_str(sample).unwrap();
            config.validate().unwrap();
        }
    }
}
