//! `MonitoringRun`: one row per invocation of the Orchestrator.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ErrorLogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunType {
    Baseline,
    Monitoring,
    Recheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunState {
    Running,
    Completed,
    Failed,
    Partial,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MonitoringRun {
    pub id: Uuid,
    pub run_type: RunType,
    pub retailers: Vec<String>,
    pub categories: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub products_crawled: u64,
    pub new_products_found: u64,
    pub products_queued_for_review: u64,
    pub state: RunState,
    pub cancelled: bool,
    pub error_log: Vec<ErrorLogEntry>,
}

impl MonitoringRun {
    pub fn new(run_type: RunType, retailers: Vec<String>, categories: Vec<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_type,
            retailers,
            categories,
            started_at,
            ended_at: None,
            products_crawled: 0,
            new_products_found: 0,
            products_queued_for_review: 0,
            state: RunState::Running,
            cancelled: false,
            error_log: Vec::new(),
        }
    }

    pub fn record_error(&mut self, entry: ErrorLogEntry) {
        self.error_log.push(entry);
    }

    pub fn finish(&mut self, ended_at: DateTime<Utc>, any_partial: bool) {
        self.ended_at = Some(ended_at);
        self.state = if self.cancelled || any_partial {
            RunState::Partial
        } else {
            RunState::Completed
        };
    }

    pub fn fail(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = Some(ended_at);
        self.state = RunState::Failed;
    }
}
