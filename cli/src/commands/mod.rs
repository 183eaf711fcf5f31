// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Praxis CLI

pub mod config;
pub mod knowledge;
pub mod library;
pub mod solve;
pub mod train;

pub use self::config::ConfigCommand;
pub use self::knowledge::KnowledgeCommand;
pub use self::library::LibraryCommand;
pub use self::solve::SolveArgs;
pub use self::train::TrainArgs;
