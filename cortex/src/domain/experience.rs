// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the number of words an experience may hold.
pub const MAX_EXPERIENCE_WORDS: usize = 32;

/// Identifier of an [`Experience`], unique within its owning library.
///
/// Ids are allocated from a monotonically increasing counter stored with the
/// library, so a deleted id is never handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExperienceId(pub u64);

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExperienceId {
    type Err = String;

    /// Accepts `7`, `"7"`, `E7` and `[7]`, which is how models tend to echo
    /// ids back from a rendered library.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim_start_matches(['E', 'e', '#']);
        trimmed
            .parse::<u64>()
            .map(ExperienceId)
            .map_err(|_| format!("invalid experience id: '{}'", s))
    }
}

impl<'de> Deserialize<'de> for ExperienceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(ExperienceId(n)),
            RawId::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Which agent a library (and every experience in it) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExperienceOwner {
    /// Cross-cutting lessons visible to every agent.
    Shared,
    /// A single generator agent, numbered from 1.
    Generator(u32),
    /// The critic fusion agent.
    Critic,
}

impl ExperienceOwner {
    /// Stable key used for file names and prompt labels.
    pub fn key(&self) -> String {
        match self {
            ExperienceOwner::Shared => "shared".to_string(),
            ExperienceOwner::Generator(k) => format!("generator_{}", k),
            ExperienceOwner::Critic => "critic".to_string(),
        }
    }

    /// Every owner a training run with `num_generators` generators maintains.
    pub fn all(num_generators: u32) -> Vec<ExperienceOwner> {
        let mut owners = vec![ExperienceOwner::Shared];
        owners.extend((1..=num_generators).map(ExperienceOwner::Generator));
        owners.push(ExperienceOwner::Critic);
        owners
    }
}

impl fmt::Display for ExperienceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for ExperienceOwner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "shared" => Ok(ExperienceOwner::Shared),
            "critic" => Ok(ExperienceOwner::Critic),
            other => other
                .strip_prefix("generator_")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(ExperienceOwner::Generator)
                .ok_or_else(|| format!("unknown experience owner: '{}'", s)),
        }
    }
}

impl Serialize for ExperienceOwner {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for ExperienceOwner {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A short, reusable natural-language heuristic injected into future prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub owner: ExperienceOwner,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experience {
    pub fn new(id: ExperienceId, owner: ExperienceOwner, content: &str, category: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id,
            content: cap_words(content, MAX_EXPERIENCE_WORDS),
            category: category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(default_category),
            owner,
            usage_count: 0,
            success_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction of uses that ended in a rewarded answer; unused experiences
    /// rank as neutral.
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.5
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }
}

fn default_category() -> String {
    "general".to_string()
}

/// A single edit proposed by distillation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ExperienceOperation {
    Add {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    Modify {
        id: ExperienceId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    Delete {
        id: ExperienceId,
    },
    Keep {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ExperienceId>,
    },
}

impl ExperienceOperation {
    pub fn action(&self) -> &'static str {
        match self {
            ExperienceOperation::Add { .. } => "add",
            ExperienceOperation::Modify { .. } => "modify",
            ExperienceOperation::Delete { .. } => "delete",
            ExperienceOperation::Keep { .. } => "keep",
        }
    }

    /// Content carried by add/modify, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            ExperienceOperation::Add { content, .. } | ExperienceOperation::Modify { content, .. } => {
                Some(content.as_str())
            }
            _ => None,
        }
    }
}

/// Collapse whitespace and truncate to at most `max_words` words.
pub fn cap_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_key_roundtrip() {
        for owner in ExperienceOwner::all(3) {
            let parsed: ExperienceOwner = owner.key().parse().unwrap();
            assert_eq!(parsed, owner);
        }
        assert!("generator_0".parse::<ExperienceOwner>().is_err());
        assert!("judge".parse::<ExperienceOwner>().is_err());
    }

    #[test]
    fn test_experience_id_lenient_parsing() {
        assert_eq!("E12".parse::<ExperienceId>().unwrap(), ExperienceId(12));
        assert_eq!("[4]".parse::<ExperienceId>().unwrap(), ExperienceId(4));
        let id: ExperienceId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(id, ExperienceId(7));
        let id: ExperienceId = serde_json::from_str("9").unwrap();
        assert_eq!(id, ExperienceId(9));
    }

    #[test]
    fn test_content_is_word_capped() {
        let long = (0..50).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let exp = Experience::new(ExperienceId(1), ExperienceOwner::Shared, &long, None);
        assert_eq!(exp.content.split_whitespace().count(), MAX_EXPERIENCE_WORDS);
        assert_eq!(exp.category, "general");
    }

    #[test]
    fn test_operation_parsing() {
        let ops: Vec<ExperienceOperation> = serde_json::from_str(
            r#"[
                {"action": "add", "content": "Convert units first", "category": "units"},
                {"action": "modify", "id": "E2", "content": "Check signs"},
                {"action": "delete", "id": 3},
                {"action": "keep"}
            ]"#,
        )
        .unwrap();

        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0].action(), "add");
        assert_eq!(ops[1], ExperienceOperation::Modify {
            id: ExperienceId(2),
            content: "Check signs".to_string(),
            category: None,
        });
        assert_eq!(ops[3], ExperienceOperation::Keep { id: None });
    }
}
