// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON-lines dataset loader: one `{"question": ..., "answer": ...}` object
//! per line. Blank lines and lines starting with `#` are ignored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use praxis_core::domain::answer::{DatasetLoader, Problem};

pub struct JsonlDataset {
    path: PathBuf,
    limit: Option<usize>,
}

impl JsonlDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
        }
    }

    /// Only read the first `limit` problems
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn parse(content: &str) -> Result<Vec<Problem>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(i, line)| {
                serde_json::from_str::<Problem>(line).with_context(|| format!("Invalid problem on line {}", i + 1))
            })
            .collect()
    }
}

#[async_trait]
impl DatasetLoader for JsonlDataset {
    async fn load(&self) -> Result<Vec<Problem>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read dataset {:?}", self.path))?;
        let mut problems = Self::parse(&content).with_context(|| format!("Failed to parse dataset {:?}", self.path))?;
        if let Some(limit) = self.limit {
            problems.truncate(limit);
        }
        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let content = r#"
# physics warm-up
{"id": "p1", "question": "A 10 kg object starts at rest...", "answer": 25}
{"problem": "How long does the fall take?", "ground_truth": "2.5 s"}
"#;
        let problems = JsonlDataset::parse(content).unwrap();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].id, "p1");
        assert_eq!(problems[0].ground_truth.as_deref(), Some("25"));
        assert_eq!(problems[1].id, "");
        assert_eq!(problems[1].text, "How long does the fall take?");
    }

    #[test]
    fn test_bad_line_is_reported() {
        let err = JsonlDataset::parse("{\"question\": \"ok\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_load_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        std::fs::write(&path, "{\"question\": \"a\", \"answer\": 1}\n{\"question\": \"b\", \"answer\": 2}\n").unwrap();

        let problems = JsonlDataset::new(&path).with_limit(Some(1)).load().await.unwrap();
        assert_eq!(problems.len(), 1);
        assert!(JsonlDataset::new(dir.path().join("missing.jsonl")).load().await.is_err());
    }
}
