//! In-memory store implementation
//!
//! Backs tests and brokerless deployments. Enforces the same open-job
//! uniqueness constraint a real backend would carry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobRow, JobUpdate, NewJob, StatusStore, StoreError};
use crate::status::{DeviceStatus, JobStatus};

#[derive(Default)]
struct MemoryState {
	statuses: HashMap<String, (DeviceStatus, DateTime<Utc>)>,
	jobs: Vec<JobRow>,
	status_writes: u64,
}

/// Store keeping all rows in process memory
#[derive(Default)]
pub struct MemoryStatusStore {
	state: Mutex<MemoryState>,
}

impl MemoryStatusStore {
	/// Creates an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Last persisted status for a device
	pub async fn device_status(&self, device_id: &str) -> Option<DeviceStatus> {
		let state = self.state.lock().await;
		state.statuses.get(device_id).map(|(status, _)| *status)
	}

	/// Total number of status writes, for write-dedup assertions
	pub async fn status_write_count(&self) -> u64 {
		self.state.lock().await.status_writes
	}

	/// Snapshot of all job rows
	pub async fn jobs(&self) -> Vec<JobRow> {
		self.state.lock().await.jobs.clone()
	}
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
	async fn upsert_device_status(
		&self,
		device_id: &str,
		status: DeviceStatus,
		at: DateTime<Utc>,
	) -> Result<(), StoreError> {
		let mut state = self.state.lock().await;
		state.statuses.insert(device_id.to_string(), (status, at));
		state.status_writes += 1;
		Ok(())
	}

	async fn find_open_job(
		&self,
		device_id: &str,
	) -> Result<Option<JobRow>, StoreError> {
		let state = self.state.lock().await;
		Ok(state
			.jobs
			.iter()
			.find(|job| job.device_id == device_id && job.status.is_open())
			.cloned())
	}

	async fn insert_job(
		&self,
		device_id: &str,
		owner_id: &str,
		job: NewJob,
	) -> Result<JobRow, StoreError> {
		let mut state = self.state.lock().await;
		let duplicate = state
			.jobs
			.iter()
			.any(|existing| {
				existing.device_id == device_id && existing.status.is_open()
			});
		if duplicate {
			return Err(StoreError::unique_violation(device_id));
		}
		let row = JobRow {
			id: Uuid::new_v4().to_string(),
			external_job_id: job.external_job_id,
			device_id: device_id.to_string(),
			owner_id: owner_id.to_string(),
			status: JobStatus::Printing,
			file_name: job.file_name,
			file_size: job.file_size,
			started_at: Utc::now(),
			completed_at: None,
			error_message: None,
		};
		state.jobs.push(row.clone());
		Ok(row)
	}

	async fn update_job(
		&self,
		job_id: &str,
		update: JobUpdate,
	) -> Result<(), StoreError> {
		let mut state = self.state.lock().await;
		let job = state
			.jobs
			.iter_mut()
			.find(|job| job.id == job_id)
			.ok_or_else(|| StoreError::job_not_found(job_id))?;
		if let Some(status) = update.status {
			job.status = status;
		}
		if let Some(completed_at) = update.completed_at {
			job.completed_at = Some(completed_at);
		}
		if let Some(error_message) = update.error_message {
			job.error_message = Some(error_message);
		}
		Ok(())
	}
}
