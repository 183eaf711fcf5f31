// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod answer_computer;
pub mod event_bus;
pub mod llm;
pub mod plan_parser;
pub mod prompt_template_engine;

pub use answer_computer::{FormulaAnswerComputer, ModelAnswerComputer};
pub use event_bus::EventBus;
