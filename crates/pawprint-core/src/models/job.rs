use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::owner::{OwnerEntityType, OwnerRef};
use crate::models::rendition::RenditionSet;
use crate::PipelineError;

/// Queue that carries upload jobs unless `QUEUE_NAME` overrides it.
pub const DEFAULT_QUEUE_NAME: &str = "imageQueue";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// What intake hands to the queue for one staged original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJobPayload {
    pub owner_entity_type: OwnerEntityType,
    pub owner_entity_id: String,
    pub source_key: String,
    pub original_filename: String,
}

impl UploadJobPayload {
    pub fn new(owner: &OwnerRef, source_key: String, original_filename: String) -> Self {
        Self {
            owner_entity_type: owner.entity_type(),
            owner_entity_id: owner.entity_id().to_string(),
            source_key,
            original_filename,
        }
    }
}

/// A queued upload and its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadJob {
    pub id: Uuid,
    pub queue_name: String,
    pub owner_entity_type: OwnerEntityType,
    pub owner_entity_id: String,
    pub source_key: String,
    pub original_filename: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    /// Token of the current delivery; acks carrying an older token are rejected.
    #[serde(skip)]
    pub lease_id: Option<Uuid>,
    pub visible_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub rendition_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for UploadJob {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(UploadJob {
            id: row.try_get("id")?,
            queue_name: row.try_get("queue_name")?,
            owner_entity_type: row
                .try_get::<String, _>("owner_entity_type")?
                .parse()
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse owner_entity_type: {}", e).into())
                })?,
            owner_entity_id: row.try_get("owner_entity_id")?,
            source_key: row.try_get("source_key")?,
            original_filename: row.try_get("original_filename")?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            attempts: row.try_get("attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            lease_id: row.try_get("lease_id")?,
            visible_at: row.try_get("visible_at")?,
            last_error: row.try_get("last_error")?,
            rendition_keys: row
                .try_get::<Option<Vec<String>>, _>("rendition_keys")?
                .unwrap_or_default(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl UploadJob {
    /// Whether a recoverable failure on the current delivery may be retried.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn owner(&self) -> Result<OwnerRef, PipelineError> {
        OwnerRef::new(self.owner_entity_type, self.owner_entity_id.clone())
    }

    pub fn payload(&self) -> UploadJobPayload {
        UploadJobPayload {
            owner_entity_type: self.owner_entity_type,
            owner_entity_id: self.owner_entity_id.clone(),
            source_key: self.source_key.clone(),
            original_filename: self.original_filename.clone(),
        }
    }

    pub fn renditions(&self) -> Option<RenditionSet> {
        RenditionSet::from_keys(&self.rendition_keys)
    }
}
