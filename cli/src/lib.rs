// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Praxis CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Wires configuration into the training services and
//!   implements the `praxis` subcommands

pub mod bootstrap;
pub mod commands;
pub mod dataset;
