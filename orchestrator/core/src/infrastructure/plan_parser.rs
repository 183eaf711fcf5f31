// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Plan Parser
//!
//! Turns free-form model output into typed values.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse boundary between model text and validated domain types
//!
//! Models wrap JSON in code fences, surround it with prose, leave trailing
//! commas and write exact fractions as bare `1/3`. The repair steps here
//! handle exactly those cases and nothing more; anything still invalid is
//! rejected rather than guessed at.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::domain::plan::{CausalPlan, PlanError, RawPlan};

static BARE_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+\s*/\s*\d+").expect("Invalid fraction regex"));

/// Pull the JSON payload out of a model response.
///
/// Preference order: a ```json fence, any fence, then the first balanced
/// `{...}` or `[...]` span.
pub fn extract_json(text: &str) -> Option<String> {
    // Find start of markdown code block
    let start_marker = "```json";
    if let Some(start) = text.find(start_marker) {
        let content_start = start + start_marker.len();
        // Find end marker AFTER the content start
        if let Some(end_offset) = text[content_start..].find("```") {
            let content_end = content_start + end_offset;
            return Some(text[content_start..content_end].trim().to_string());
        }
    }

    // Try generic code block if json specific one not found
    let generic_marker = "```";
    if let Some(start) = text.find(generic_marker) {
        let content_start = start + generic_marker.len();
        if let Some(end_offset) = text[content_start..].find("```") {
            let block = text[content_start..content_start + end_offset].trim();
            // Skip a language tag on the fence line
            let block = match block.find(['{', '[']) {
                Some(pos) => &block[pos..],
                None => block,
            };
            if !block.is_empty() {
                return Some(block.to_string());
            }
        }
    }

    balanced_span(text)
}

/// First balanced object or array, honouring string literals
fn balanced_span(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Quote bare fractions in value position: `"m": 1/3` becomes `"m": "1/3"`.
pub fn quote_fractions(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant = ' ';
    let mut i = 0;

    while i < json.len() {
        let rest = &json[i..];
        let Some(ch) = rest.chars().next() else { break };

        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }

        if matches!(last_significant, ':' | '[' | ',') && (ch == '-' || ch.is_ascii_digit()) {
            if let Some(m) = BARE_FRACTION.find(rest) {
                let after = rest[m.end()..].trim_start();
                if after.is_empty() || after.starts_with([',', '}', ']']) {
                    let compact: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
                    out.push('"');
                    out.push_str(&compact);
                    out.push('"');
                    i += m.end();
                    last_significant = '"';
                    continue;
                }
            }
        }

        if ch == '"' {
            in_string = true;
        }
        if !ch.is_whitespace() {
            last_significant = ch;
        }
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Drop commas directly before a closing bracket
pub fn strip_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = json.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Extract and repair the JSON in a model response
pub fn parse_json_value(text: &str) -> Result<serde_json::Value, PlanError> {
    let raw = extract_json(text).ok_or(PlanError::NoJson)?;
    let repaired = strip_trailing_commas(&quote_fractions(&raw));
    serde_json::from_str(&repaired).map_err(|e| PlanError::Malformed(e.to_string()))
}

/// Parse any response type through the same repair pipeline
pub fn parse_typed<T: DeserializeOwned>(text: &str) -> Result<T, PlanError> {
    let value = parse_json_value(text)?;
    serde_json::from_value(value).map_err(|e| PlanError::Malformed(e.to_string()))
}

/// Validate a JSON value as a plan, keeping the structural error
pub fn plan_from_value(value: serde_json::Value) -> Result<CausalPlan, PlanError> {
    let raw: RawPlan = serde_json::from_value(value).map_err(|e| PlanError::Malformed(e.to_string()))?;
    CausalPlan::try_from(raw)
}

/// Parse a generator response into a validated plan
pub fn parse_plan(text: &str) -> Result<CausalPlan, PlanError> {
    let mut value = parse_json_value(text)?;
    // Some models wrap the plan: {"plan": {...}}
    if let Some(inner) = value.get_mut("plan").filter(|p| p.is_object()) {
        value = inner.take();
    }
    plan_from_value(value)
}
