//! `Baseline`: one active row per (retailer, category) at a time.

use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Baseline {
    pub id: Uuid,
    pub retailer: String,
    pub category: String,
    pub captured_date: chrono::NaiveDate,
    pub pages_walked: u32,
    pub observation_count: u32,
    pub crawler_config_metadata: serde_json::Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
