// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mod
//!
//! Provides mod functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements mod

pub mod experience;
pub mod library;
pub mod knowledge;
pub mod events;

pub use experience::*;
pub use library::*;
pub use knowledge::*;
pub use events::*;
