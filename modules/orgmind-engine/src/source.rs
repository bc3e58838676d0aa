//! JSON Lines record source.
//!
//! One record per line: `{"sourceId": "...", "text": "..."}`. The Enron-style
//! column names `file` / `message` are accepted too. Reading stops as soon as
//! `limit` records are collected, so the rest of the file is never touched.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use orgmind_common::Record;

use crate::traits::RecordSource;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlSource;

#[async_trait]
impl RecordSource for JsonlSource {
    async fn read_first_n(&self, path: &Path, limit: usize) -> Result<Vec<Record>> {
        let file = File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let mut records = Vec::with_capacity(limit.min(1024));
        let mut line_no = 0usize;
        let mut skipped = 0usize;

        while records.len() < limit {
            let Some(line) = lines
                .next_line()
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?
            else {
                break;
            };
            line_no += 1;

            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(line = line_no, error = %e, "Skipping malformed record");
                }
            }
        }

        info!(
            path = %path.display(),
            loaded = records.len(),
            skipped,
            limit,
            "Records loaded"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[tokio::test]
    async fn stops_at_limit() {
        let file = write_lines(&[
            r#"{"sourceId":"a","text":"one"}"#,
            r#"{"sourceId":"b","text":"two"}"#,
            r#"{"sourceId":"c","text":"three"}"#,
        ]);
        let records = JsonlSource.read_first_n(file.path(), 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Record::new("b", "two"));
    }

    #[tokio::test]
    async fn skips_blank_and_malformed_lines() {
        let file = write_lines(&[
            r#"{"file":"allen-p/1.","message":"one"}"#,
            "",
            "not json",
            r#"{"file":"allen-p/2.","message":"two"}"#,
        ]);
        let records = JsonlSource.read_first_n(file.path(), 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id, "allen-p/1.");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = JsonlSource
            .read_first_n(Path::new("/definitely/not/here.jsonl"), 5)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to open"));
    }
}
