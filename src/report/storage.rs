//! File storage for run reports.
//!
//! Layout under the base directory:
//!
//! ```text
//! round_<n>.json            one RoundRecord per round
//! generated/round_<n>.json  scenarios accepted in round n (only when any)
//! history.json              the full RoundHistory
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::pipeline::{RoundHistory, RoundRecord};

/// Errors that can occur during report storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read or write to the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize report data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No record stored for the round.
    #[error("Round not found: {0}")]
    RoundNotFound(u32),

    /// The storage directory could not be created.
    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    /// The stored file does not match what was asked for.
    #[error("Invalid report data: {0}")]
    InvalidData(String),
}

/// Local JSON storage for round records.
#[derive(Debug, Clone)]
pub struct RunReportStorage {
    base_path: PathBuf,
}

impl RunReportStorage {
    /// Creates a new report storage rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of a round's record file.
    pub fn round_path(&self, round: u32) -> PathBuf {
        self.base_path.join(format!("round_{}.json", round))
    }

    /// Path of a round's generated scenarios file.
    pub fn generated_path(&self, round: u32) -> PathBuf {
        self.base_path
            .join("generated")
            .join(format!("round_{}.json", round))
    }

    pub fn history_path(&self) -> PathBuf {
        self.base_path.join("history.json")
    }

    /// Saves a round record, plus its generated scenarios when there are any.
    ///
    /// # Returns
    ///
    /// The path of the round record.
    pub async fn save_round(&self, record: &RoundRecord) -> Result<PathBuf, StorageError> {
        let path = self.round_path(record.round);
        write_json(&path, record).await?;

        if !record.generated.is_empty() {
            write_json(&self.generated_path(record.round), &record.generated).await?;
        }
        Ok(path)
    }

    /// Saves the full history.
    pub async fn save_history(&self, history: &RoundHistory) -> Result<PathBuf, StorageError> {
        let path = self.history_path();
        write_json(&path, history).await?;
        Ok(path)
    }

    /// Loads one round record.
    pub async fn load_round(&self, round: u32) -> Result<RoundRecord, StorageError> {
        let path = self.round_path(round);
        if !fs::try_exists(&path).await? {
            return Err(StorageError::RoundNotFound(round));
        }

        let contents = fs::read_to_string(&path).await?;
        let record: RoundRecord = serde_json::from_str(&contents)?;
        if record.round != round {
            return Err(StorageError::InvalidData(format!(
                "Round mismatch in {}: expected {}, got {}",
                path.display(),
                round,
                record.round
            )));
        }
        Ok(record)
    }

    /// Loads the saved history.
    pub async fn load_history(&self) -> Result<Vec<RoundRecord>, StorageError> {
        let contents = fs::read_to_string(self.history_path()).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Rounds with a stored record, ascending.
    pub async fn list_rounds(&self) -> Result<Vec<u32>, StorageError> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut rounds = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(round) = name
                .strip_prefix("round_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                rounds.push(round);
            }
        }
        rounds.sort_unstable();
        Ok(rounds)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !fs::try_exists(parent).await? {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::DirectoryCreationFailed(format!(
                    "Failed to create directory {:?}: {}",
                    parent, e
                ))
            })?;
        }
    }
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    ensure_parent(path).await?;

    // Pretty JSON for readability
    let json = serde_json::to_string_pretty(value)?;

    let mut file = fs::File::create(path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::DifficultyLevel;
    use crate::domain::{Scenario, ScenarioOrigin};
    use crate::pipeline::RewardStats;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(round: u32, generated: Vec<Scenario>) -> RoundRecord {
        let now = Utc::now();
        RoundRecord {
            round,
            scenario_ids: vec!["a".to_string()],
            stats: RewardStats::default(),
            results: Vec::new(),
            failure_report: None,
            generated,
            drafts_rejected: 0,
            degradations: Vec::new(),
            next_scenario_ids: vec!["a".to_string()],
            started_at: now,
            finished_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = RunReportStorage::new(temp_dir.path().join("run"));

        let path = storage.save_round(&record(1, Vec::new())).await.unwrap();
        assert!(path.ends_with("round_1.json"));
        assert!(!storage.generated_path(1).exists());

        let loaded = storage.load_round(1).await.unwrap();
        assert_eq!(loaded.round, 1);
        assert_eq!(loaded.scenario_ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_generated_scenarios_written() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = RunReportStorage::new(temp_dir.path());
        let scenario = Scenario::new("gen_r2_reasoning_1", "Cancel order 4", DifficultyLevel::Hard)
            .with_origin(ScenarioOrigin::Generated {
                round: 2,
                target_weakness: "reasoning".to_string(),
            });

        storage.save_round(&record(2, vec![scenario])).await.unwrap();

        let contents = std::fs::read_to_string(storage.generated_path(2)).unwrap();
        let scenarios: Vec<Scenario> = serde_json::from_str(&contents).unwrap();
        assert_eq!(scenarios[0].id, "gen_r2_reasoning_1");
    }

    #[tokio::test]
    async fn test_load_missing_round() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = RunReportStorage::new(temp_dir.path());
        assert!(matches!(
            storage.load_round(7).await,
            Err(StorageError::RoundNotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_list_rounds_and_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = RunReportStorage::new(temp_dir.path());
        assert!(storage.list_rounds().await.unwrap().is_empty());

        let mut history = RoundHistory::new();
        for round in [2, 1, 10] {
            let record = record(round, Vec::new());
            storage.save_round(&record).await.unwrap();
            history.push(record);
        }
        storage.save_history(&history).await.unwrap();

        assert_eq!(storage.list_rounds().await.unwrap(), vec![1, 2, 10]);
        assert_eq!(storage.load_history().await.unwrap().len(), 3);
    }
}
