//! Per-job process report.
//!
//! One report is created when a pipeline starts, mutated throughout, and
//! serialized to storage as `{entityId}-report.json` on pipeline exit -
//! both on success and on error. Downstream tooling keys on that contract.

use crate::entity::EntityType;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};
use uuid::Uuid;

/// Counters for the per-asset fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualAssets {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Final outcome section of a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportResult {
    pub success: bool,
    #[serde(rename = "batchId", skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(rename = "individualZips")]
    pub individual_zips: Vec<String>,
}

/// Record of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessReport {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "contentServerUrl")]
    pub content_server_url: String,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    #[serde(rename = "individualAssets")]
    pub individual_assets: IndividualAssets,
    pub result: ReportResult,
}

impl ProcessReport {
    /// Start a report for one job.
    pub fn new(
        entity_id: impl Into<String>,
        entity_type: EntityType,
        content_server_url: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            content_server_url: content_server_url.into(),
            started_at: Utc::now(),
            finished_at: None,
            errors: Vec::new(),
            individual_assets: IndividualAssets::default(),
            result: ReportResult::default(),
        }
    }

    /// Append one error without ending the job.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.errors.push(message);
    }

    /// Remember the metadata batch id.
    pub fn set_batch_id(&mut self, batch_id: impl Into<String>) {
        self.result.batch_id = Some(batch_id.into());
    }

    /// Record one uploaded artifact key.
    pub fn add_zip_key(&mut self, key: impl Into<String>) {
        self.result.individual_zips.push(key.into());
    }

    /// Declare the size of the per-asset fan-out.
    pub fn set_asset_total(&mut self, total: usize) {
        self.individual_assets.total = total;
    }

    /// Count one per-asset success.
    pub fn mark_asset_success(&mut self) {
        self.individual_assets.successful += 1;
    }

    /// Count one per-asset failure.
    pub fn mark_asset_failure(&mut self) {
        self.individual_assets.failed += 1;
    }

    /// Close the report with the final outcome.
    pub fn finish(&mut self, success: bool) {
        self.finished_at = Some(Utc::now());
        self.result.success = success;
    }

    /// Storage key this report is persisted under.
    pub fn storage_key(&self) -> String {
        format!("{}-report.json", self.entity_id)
    }

    /// Serialize and upload the report.
    ///
    /// Best-effort by contract: a report that cannot be written is logged
    /// and dropped rather than turning a finished job into a failure.
    pub async fn write_to_storage<S: Storage>(&self, storage: &S, tmp_dir: &Path) {
        let key = self.storage_key();
        let scratch = tmp_dir.join(format!("{}-{}.json", Uuid::new_v4(), "report"));

        let body = match serde_json::to_vec_pretty(self) {
            Ok(body) => body,
            Err(e) => {
                error!(key, error = %e, "report serialization failed");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&scratch, &body).await {
            error!(key, error = %e, "report scratch write failed");
            return;
        }

        match storage.store(&key, &scratch).await {
            Ok(()) => info!(key, success = self.result.success, "report stored"),
            Err(e) => error!(key, error = %e, "report upload failed"),
        }

        let _ = tokio::fs::remove_file(&scratch).await;
    }
}
