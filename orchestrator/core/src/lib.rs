// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Praxis Core
//!
//! Training-free experience learning over causal plans.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Plan generation, critic fusion, reward evaluation,
//!   variance-gated distillation and the training loop that drives them
//!
//! Experience libraries and rule retrieval live in `praxis-cortex`; this
//! crate owns everything that talks to a model.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
