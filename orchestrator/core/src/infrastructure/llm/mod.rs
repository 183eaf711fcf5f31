// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Model provider adapters and the alias registry that routes agent roles to
// them. Each adapter translates between the LLMProvider port and one
// vendor's HTTP API.

mod http;

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::{AliasUsage, ProviderRegistry, RoleProviders, RoutedProvider};
