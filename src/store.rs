//! Durable store contract
//!
//! The bridge never talks to a database directly; callers inject an
//! implementation of [`StatusStore`]. The trait is the full contract
//! the reconciliation engine needs: status upserts, open-job lookup,
//! job insertion with a uniqueness-violation signal, and job updates.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{DeviceStatus, JobStatus};

/// Errors surfaced by a store implementation
#[derive(Error, Debug, Clone)]
pub enum StoreError {
	/// An open job row already exists for this device
	#[error("open job already exists for device '{device_id}'")]
	UniqueViolation {
		/// Device whose open-job constraint was hit
		device_id: String,
	},

	/// Job row to update does not exist
	#[error("job '{job_id}' not found")]
	JobNotFound {
		/// Row id that was looked up
		job_id: String,
	},

	/// Any other backend failure
	#[error("store backend error: {0}")]
	Backend(String),
}

impl StoreError {
	/// Creates a new UniqueViolation error
	pub fn unique_violation(device_id: impl Into<String>) -> Self {
		Self::UniqueViolation {
			device_id: device_id.into(),
		}
	}

	/// Creates a new JobNotFound error
	pub fn job_not_found(job_id: impl Into<String>) -> Self {
		Self::JobNotFound {
			job_id: job_id.into(),
		}
	}

	/// Creates a new Backend error
	pub fn backend(details: impl Into<String>) -> Self {
		Self::Backend(details.into())
	}

	/// True for the duplicate open-job insert signal
	pub fn is_unique_violation(&self) -> bool {
		matches!(self, StoreError::UniqueViolation { .. })
	}
}

/// A persisted print job row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRow {
	/// Store-assigned row id
	pub id: String,
	/// The device's own job identifier, when available
	pub external_job_id: Option<String>,
	/// Device the job runs on
	pub device_id: String,
	/// Owning identity
	pub owner_id: String,
	/// Lifecycle status
	pub status: JobStatus,
	/// Printed file name
	pub file_name: Option<String>,
	/// Printed file size in bytes
	pub file_size: Option<u64>,
	/// When the job was opened
	pub started_at: DateTime<Utc>,
	/// When the job reached a terminal state
	pub completed_at: Option<DateTime<Utc>>,
	/// Error message for failed jobs
	pub error_message: Option<String>,
}

/// Metadata for a job row about to be created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJob {
	/// The device's own job identifier, when available
	pub external_job_id: Option<String>,
	/// Printed file name
	pub file_name: Option<String>,
	/// Printed file size in bytes
	pub file_size: Option<u64>,
}

/// Partial update applied to an existing job row.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
	/// New lifecycle status
	pub status: Option<JobStatus>,
	/// Terminal timestamp
	pub completed_at: Option<DateTime<Utc>>,
	/// Error message for failed jobs
	pub error_message: Option<String>,
}

impl JobUpdate {
	/// Update that only moves the lifecycle status
	pub fn status(status: JobStatus) -> Self {
		Self {
			status: Some(status),
			..Self::default()
		}
	}

	/// Update that closes the job with a terminal status
	pub fn close(
		status: JobStatus,
		completed_at: DateTime<Utc>,
		error_message: Option<String>,
	) -> Self {
		Self {
			status: Some(status),
			completed_at: Some(completed_at),
			error_message,
		}
	}
}

/// Durable record store consumed by the bridge.
///
/// Implementations must enforce at most one open (`printing`/`paused`)
/// job per device and signal a duplicate insert with
/// [`StoreError::UniqueViolation`].
#[async_trait]
pub trait StatusStore: Send + Sync {
	/// Writes the device's canonical status and transition timestamp
	async fn upsert_device_status(
		&self,
		device_id: &str,
		status: DeviceStatus,
		at: DateTime<Utc>,
	) -> Result<(), StoreError>;

	/// Returns the device's open job row, if one exists
	async fn find_open_job(
		&self,
		device_id: &str,
	) -> Result<Option<JobRow>, StoreError>;

	/// Creates an open job row with status `printing`
	async fn insert_job(
		&self,
		device_id: &str,
		owner_id: &str,
		job: NewJob,
	) -> Result<JobRow, StoreError>;

	/// Applies a partial update to a job row
	async fn update_job(
		&self,
		job_id: &str,
		update: JobUpdate,
	) -> Result<(), StoreError>;
}
