// Append-only CSV log of classified turns, shared across sessions. Each row
// is written with a single append so concurrent sessions may interleave rows
// but never corrupt one. Offline consumers read this file; the column set is
// stable: timestamp, user_input, emotion_label, trait_label.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::AsyncWriteExt;

use crate::classifier::Classification;

const HEADER: &str = "timestamp,user_input,emotion_label,trait_label\n";

#[derive(Debug, Clone)]
pub struct InteractionLog {
    path: PathBuf,
}

impl InteractionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        InteractionLog { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one row for a classified turn. The header is written exactly
    /// once, when the file is first created.
    pub async fn append(&self, user_input: &str, labels: &Classification) -> Result<()> {
        self.ensure_header().await?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let row = format!(
            "{},{},{},{}\n",
            csv_field(&timestamp),
            csv_field(user_input),
            csv_field(&labels.emotion),
            csv_field(&labels.personality_trait),
        );

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("could not open log file {}", self.path.display()))?;
        file.write_all(row.as_bytes())
            .await
            .with_context(|| format!("could not append to log file {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    // Create the file with the header row. Exactly one concurrent creator
    // wins `create_new`; everyone else sees AlreadyExists and moves on, so
    // the header can never be duplicated mid-file.
    async fn ensure_header(&self) -> Result<()> {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(mut file) => {
                file.write_all(HEADER.as_bytes())
                    .await
                    .with_context(|| format!("could not write log header {}", self.path.display()))?;
                file.flush().await?;
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("could not create log file {}", self.path.display())),
        }
    }
}

/// Quote a CSV field when it contains a comma, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
