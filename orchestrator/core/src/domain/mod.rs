// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Plans, rollouts, rewards and the ports the training loop depends on

pub mod answer;
pub mod comparison;
pub mod config;
pub mod events;
pub mod expression;
pub mod llm;
pub mod plan;
pub mod rational;
pub mod reward;
pub mod rollout;
