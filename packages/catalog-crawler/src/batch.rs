//! Downstream-publisher batch handoff (§6): writes a JSON file describing
//! newly-discovered URLs to a known output directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CrawlError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct BatchUrlEntry {
    pub url: String,
    pub retailer: String,
    pub discovered_date: NaiveDate,
    pub catalog_source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub batch_name: String,
    pub created_date: NaiveDate,
    pub total_urls: usize,
    pub source: &'static str,
    pub urls: Vec<BatchUrlEntry>,
}

impl Batch {
    pub fn new(run_id: Uuid, retailer: &str, category: &str, created_date: NaiveDate, urls: Vec<BatchUrlEntry>) -> Self {
        Self {
            batch_name: batch_file_name(run_id, retailer, category),
            created_date,
            total_urls: urls.len(),
            source: "catalog_monitoring",
            urls,
        }
    }
}

/// Deterministic file name from run id, retailer and category (§6).
pub fn batch_file_name(run_id: Uuid, retailer: &str, category: &str) -> String {
    format!("{run_id}-{retailer}-{category}.json")
}

/// Writes a batch file into `output_dir`, creating the directory if absent.
/// Returns the path written, used by the caller for the completion
/// notification and the backpressure-retry loop (§5).
pub async fn write_batch(output_dir: &Path, batch: &Batch) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| CrawlError::Fatal(format!("could not create batch output dir: {e}")))?;

    let path = output_dir.join(&batch.batch_name);
    let body = serde_json::to_vec_pretty(batch).map_err(|e| CrawlError::Fatal(format!("batch serialization failed: {e}")))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| CrawlError::Fatal(format!("could not write batch file {}: {e}", path.display())))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_file_name_is_deterministic_from_its_inputs() {
        let run_id = Uuid::nil();
        assert_eq!(batch_file_name(run_id, "revolve", "dresses"), format!("{run_id}-revolve-dresses.json"));
    }

    #[tokio::test]
    async fn write_batch_creates_the_output_directory_and_the_file() {
        let dir = std::env::temp_dir().join(format!("catalog-batch-test-{}", Uuid::now_v7()));
        let batch = Batch::new(
            Uuid::now_v7(),
            "revolve",
            "dresses",
            chrono::Utc::now().date_naive(),
            vec![BatchUrlEntry {
                url: "https://revolve.com/p/x.html".to_string(),
                retailer: "revolve".to_string(),
                discovered_date: chrono::Utc::now().date_naive(),
                catalog_source: "dresses".to_string(),
            }],
        );

        let path = write_batch(&dir, &batch).await.unwrap();
        assert!(path.exists());
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("catalog_monitoring"));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
