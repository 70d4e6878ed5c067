//! Device status reconciliation
//!
//! [`PrinterStatusManager`] is the state machine between the raw
//! telemetry stream and the durable store. It derives the canonical
//! status for every telemetry payload, persists transitions behind a
//! differs-from-cache guard, drives the open/close lifecycle of print
//! job rows with duplicate-delivery safety, and demotes silent
//! devices to `disconnected` through a periodic liveness sweep.

use std::{collections::HashMap, sync::Arc, time::Duration};

use arcstr::ArcStr;
use bytes::Bytes;
use chrono::Utc;
use tokio::{
	sync::{oneshot, Mutex},
	task::JoinHandle,
	time::{interval, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
	listener::{BridgeEvent, ListenerBus, StatusListener, StatusSubscription},
	status::{derive_status, DeviceStatus, JobStatus},
	store::{JobUpdate, NewJob, StatusStore},
	telemetry::{normalize, TelemetrySnapshot},
};

/// In-memory reference to a device's open job row
#[derive(Debug, Clone)]
struct OpenJob {
	row_id: String,
	external_job_id: Option<String>,
	status: JobStatus,
}

#[derive(Default)]
struct ManagerState {
	/// Last successfully persisted status per device; the write guard
	status_cache: HashMap<ArcStr, DeviceStatus>,
	/// Last telemetry arrival per device; drained by the sweep
	last_seen: HashMap<ArcStr, Instant>,
	/// Open job per device; at most one by invariant
	open_jobs: HashMap<ArcStr, OpenJob>,
	/// Owning identity per tracked device, for job rows
	owners: HashMap<ArcStr, String>,
}

/// The status reconciliation state machine
pub struct PrinterStatusManager {
	store: Arc<dyn StatusStore>,
	bus: ListenerBus,
	liveness_timeout: Duration,
	state: Mutex<ManagerState>,
}

impl PrinterStatusManager {
	/// Creates a manager writing through to `store`
	pub fn new(store: Arc<dyn StatusStore>, liveness_timeout: Duration) -> Self {
		Self {
			store,
			bus: ListenerBus::new(),
			liveness_timeout,
			state: Mutex::new(ManagerState::default()),
		}
	}

	/// Registers a bridge event listener
	pub fn on_status(&self, listener: StatusListener) -> StatusSubscription {
		self.bus.subscribe(listener)
	}

	/// Records which identity owns a device; job rows opened for the
	/// device carry this owner.
	pub async fn track_device(&self, device_id: ArcStr, owner_id: &str) {
		let mut state = self.state.lock().await;
		state.owners.insert(device_id, owner_id.to_string());
	}

	/// Fans a raw command acknowledgement out to listeners
	pub fn emit_command_result(&self, device_id: ArcStr, payload: Bytes) {
		self.bus.emit(&BridgeEvent::CommandResult { device_id, payload });
	}

	/// Processes one inbound telemetry payload for a device.
	///
	/// Never errors toward the telemetry sender: malformed payloads
	/// and store failures are logged and absorbed, leaving the write
	/// guard stale so the next differing event retries.
	pub async fn handle_telemetry(&self, device_id: &ArcStr, payload: &[u8]) {
		let raw: serde_json::Value = match serde_json::from_slice(payload) {
			| Ok(value) => value,
			| Err(err) => {
				warn!(
					device_id = %device_id,
					error = %err,
					"Dropping unparseable telemetry payload"
				);
				return;
			}
		};
		let snapshot = normalize(&raw);
		let status = derive_status(&snapshot);
		debug!(
			device_id = %device_id,
			status = %status,
			progress = snapshot.progress,
			"Normalized telemetry"
		);

		let mut state = self.state.lock().await;
		state.last_seen.insert(device_id.clone(), Instant::now());
		self.reconcile_job(&mut state, device_id, status, &snapshot)
			.await;
		self.persist_status(&mut state, device_id, status).await;
		drop(state);

		self.bus.emit(&BridgeEvent::Status {
			device_id: device_id.clone(),
			status,
			snapshot: Some(Arc::new(snapshot)),
		});
	}

	/// Row id of the device's in-memory open-job reference, if any
	pub async fn open_job_id(&self, device_id: &str) -> Option<String> {
		let state = self.state.lock().await;
		state.open_jobs.get(device_id).map(|job| job.row_id.clone())
	}

	/// Last cached status for a device
	pub async fn cached_status(&self, device_id: &str) -> Option<DeviceStatus> {
		let state = self.state.lock().await;
		state.status_cache.get(device_id).copied()
	}

	/// Drives the job lifecycle for one derived status
	async fn reconcile_job(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		status: DeviceStatus,
		snapshot: &TelemetrySnapshot,
	) {
		let open = state.open_jobs.get(device_id).cloned();
		match (open, status) {
			| (None, DeviceStatus::Printing) => {
				self.open_job(state, device_id, snapshot).await;
			}
			| (None, DeviceStatus::Paused) => {
				// Open job may predate this process (restart mid-pause)
				self.adopt_open_job(state, device_id, JobStatus::Paused)
					.await;
			}
			| (Some(job), DeviceStatus::Printing)
				if job.status == JobStatus::Paused =>
			{
				self.move_job(state, device_id, &job, JobStatus::Printing)
					.await;
			}
			| (Some(job), DeviceStatus::Paused)
				if job.status == JobStatus::Printing =>
			{
				self.move_job(state, device_id, &job, JobStatus::Paused)
					.await;
			}
			| (Some(_), DeviceStatus::Printing)
			| (Some(_), DeviceStatus::Paused) => {
				// Duplicate delivery of the current state
			}
			| (
				Some(job),
				DeviceStatus::Idle | DeviceStatus::Error,
			) => {
				self.close_job(state, device_id, &job, status, snapshot)
					.await;
			}
			| (Some(_), DeviceStatus::Disconnected) => {
				// A device that drops offline mid-print keeps its job
				// open so a reconnect can resume it
			}
			| (None, _) => {}
		}
	}

	/// Opens a job row for a device that started printing, resolving
	/// duplicate starts to the existing row.
	async fn open_job(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		snapshot: &TelemetrySnapshot,
	) {
		// A row may already exist: duplicate delivery, or a start
		// observed by another session. Adopt before inserting.
		match self.store.find_open_job(device_id).await {
			| Ok(Some(row)) => {
				debug!(
					device_id = %device_id,
					job_id = %row.id,
					"Adopted existing open job"
				);
				state.open_jobs.insert(
					device_id.clone(),
					OpenJob {
						row_id: row.id,
						external_job_id: row.external_job_id,
						status: row.status,
					},
				);
				return;
			}
			| Ok(None) => {}
			| Err(err) => {
				warn!(
					device_id = %device_id,
					error = %err,
					"Open-job lookup failed, skipping job bookkeeping"
				);
				return;
			}
		}

		let owner_id =
			state.owners.get(device_id).cloned().unwrap_or_default();
		let new_job = NewJob {
			external_job_id: snapshot.external_job_id.clone(),
			file_name: snapshot
				.job_file
				.as_ref()
				.and_then(|file| file.name.clone()),
			file_size: snapshot.job_file.as_ref().and_then(|file| file.size),
		};
		match self.store.insert_job(device_id, &owner_id, new_job).await {
			| Ok(row) => {
				info!(
					device_id = %device_id,
					job_id = %row.id,
					external_job_id = ?row.external_job_id,
					"Opened print job"
				);
				state.open_jobs.insert(
					device_id.clone(),
					OpenJob {
						row_id: row.id,
						external_job_id: row.external_job_id,
						status: JobStatus::Printing,
					},
				);
			}
			| Err(err) if err.is_unique_violation() => {
				// Lost a duplicate-start race; the existing row wins
				self.adopt_open_job(state, device_id, JobStatus::Printing)
					.await;
			}
			| Err(err) => {
				error!(
					device_id = %device_id,
					error = %err,
					"Failed to insert print job"
				);
			}
		}
	}

	/// Re-queries the store for the device's open row and adopts it
	/// into memory, moving it to `target` when it differs.
	async fn adopt_open_job(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		target: JobStatus,
	) {
		match self.store.find_open_job(device_id).await {
			| Ok(Some(row)) => {
				debug!(
					device_id = %device_id,
					job_id = %row.id,
					"Adopted existing open job"
				);
				let mut job = OpenJob {
					row_id: row.id,
					external_job_id: row.external_job_id,
					status: row.status,
				};
				if job.status != target {
					self.move_job(state, device_id, &job, target).await;
					job.status = target;
				}
				state.open_jobs.insert(device_id.clone(), job);
			}
			| Ok(None) => {
				debug!(
					device_id = %device_id,
					"No open job to adopt"
				);
			}
			| Err(err) => {
				warn!(
					device_id = %device_id,
					error = %err,
					"Open-job lookup failed during adoption"
				);
			}
		}
	}

	/// Moves an open job between `printing` and `paused`
	async fn move_job(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		job: &OpenJob,
		target: JobStatus,
	) {
		match self
			.store
			.update_job(&job.row_id, JobUpdate::status(target))
			.await
		{
			| Ok(()) => {
				debug!(
					device_id = %device_id,
					job_id = %job.row_id,
					status = %target,
					"Print job moved"
				);
				if let Some(open) = state.open_jobs.get_mut(device_id) {
					open.status = target;
				}
			}
			| Err(err) => {
				warn!(
					device_id = %device_id,
					job_id = %job.row_id,
					error = %err,
					"Failed to update print job status"
				);
			}
		}
	}

	/// Closes an open job with the terminal status the telemetry
	/// implies. The in-memory reference is only dropped once the store
	/// accepted the close, so a failed write retries on the next
	/// event.
	async fn close_job(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		job: &OpenJob,
		status: DeviceStatus,
		snapshot: &TelemetrySnapshot,
	) {
		let (close_status, error_message) = job_close_status(status, snapshot);
		let update = JobUpdate::close(close_status, Utc::now(), error_message);
		match self.store.update_job(&job.row_id, update).await {
			| Ok(()) => {
				info!(
					device_id = %device_id,
					job_id = %job.row_id,
					external_job_id = ?job.external_job_id,
					status = %close_status,
					"Closed print job"
				);
				state.open_jobs.remove(device_id);
			}
			| Err(err) => {
				warn!(
					device_id = %device_id,
					job_id = %job.row_id,
					error = %err,
					"Failed to close print job, keeping it open for retry"
				);
			}
		}
	}

	/// Persists the canonical status behind the differs-from-cache
	/// guard. The cache only advances after a successful write; a
	/// failed write leaves it stale so the next differing event
	/// retries.
	async fn persist_status(
		&self,
		state: &mut ManagerState,
		device_id: &ArcStr,
		status: DeviceStatus,
	) {
		if state.status_cache.get(device_id) == Some(&status) {
			return;
		}
		match self
			.store
			.upsert_device_status(device_id, status, Utc::now())
			.await
		{
			| Ok(()) => {
				state.status_cache.insert(device_id.clone(), status);
				debug!(
					device_id = %device_id,
					status = %status,
					"Persisted device status"
				);
			}
			| Err(err) => {
				warn!(
					device_id = %device_id,
					status = %status,
					error = %err,
					"Failed to persist device status, cache left stale"
				);
			}
		}
	}

	/// One pass of the liveness sweep: every device silent for at
	/// least the timeout window is demoted to `disconnected` and
	/// dropped from the last-seen map, so it is not re-flagged until
	/// telemetry resumes. No job side effects.
	pub async fn sweep_once(&self) {
		let now = Instant::now();
		let mut demoted = Vec::new();
		let mut state = self.state.lock().await;
		let expired: Vec<ArcStr> = state
			.last_seen
			.iter()
			.filter(|(_, seen)| {
				now.duration_since(**seen) >= self.liveness_timeout
			})
			.map(|(device_id, _)| device_id.clone())
			.collect();
		for device_id in expired {
			state.last_seen.remove(&device_id);
			info!(
				device_id = %device_id,
				timeout = ?self.liveness_timeout,
				"Device silent past liveness timeout, marking disconnected"
			);
			self.persist_status(
				&mut state,
				&device_id,
				DeviceStatus::Disconnected,
			)
			.await;
			demoted.push(device_id);
		}
		drop(state);

		for device_id in demoted {
			self.bus.emit(&BridgeEvent::Status {
				device_id,
				status: DeviceStatus::Disconnected,
				snapshot: None,
			});
		}
	}

	/// Spawns the repeating liveness sweep. Independent of individual
	/// device subscriptions; stop it through the returned controller.
	pub fn start_sweep(
		self: &Arc<Self>,
		sweep_interval: Duration,
	) -> SweepController {
		let manager = Arc::clone(self);
		let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
		let join_handle = tokio::spawn(async move {
			let mut ticker = interval(sweep_interval);
			loop {
				tokio::select! {
					_ = &mut shutdown_rx => {
						debug!("Liveness sweep shutdown signal received");
						break;
					}
					_ = ticker.tick() => {
						manager.sweep_once().await;
					}
				}
			}
		});
		SweepController {
			shutdown_tx,
			join_handle,
		}
	}
}

/// Terminal job status implied by a close-triggering device status
fn job_close_status(
	status: DeviceStatus,
	snapshot: &TelemetrySnapshot,
) -> (JobStatus, Option<String>) {
	let cancelled = snapshot
		.state_text
		.as_deref()
		.is_some_and(|text| text.to_ascii_lowercase().contains("cancel"));
	if cancelled {
		return (JobStatus::Cancelled, None);
	}
	match status {
		| DeviceStatus::Error => {
			let message = snapshot
				.error
				.clone()
				.or_else(|| snapshot.state_text.clone());
			(JobStatus::Failed, message)
		}
		| _ => (JobStatus::Completed, None),
	}
}

/// Handle stopping a running liveness sweep
pub struct SweepController {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl SweepController {
	/// Signals the sweep task to stop and waits for it to finish
	pub async fn shutdown(self) {
		let _ = self.shutdown_tx.send(());
		if let Err(err) = self.join_handle.await {
			warn!(error = ?err, "Liveness sweep task failed");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;
	use chrono::{DateTime, Utc};
	use serde_json::json;

	use super::*;
	use crate::store::{
		memory::MemoryStatusStore, JobRow, StoreError,
	};

	fn device() -> ArcStr {
		ArcStr::from("p1")
	}

	async fn manager_with_store(
	) -> (Arc<PrinterStatusManager>, Arc<MemoryStatusStore>) {
		let store = Arc::new(MemoryStatusStore::new());
		let manager = Arc::new(PrinterStatusManager::new(
			store.clone(),
			Duration::from_secs(30),
		));
		manager.track_device(device(), "owner-1").await;
		(manager, store)
	}

	async fn send(manager: &PrinterStatusManager, payload: serde_json::Value) {
		let bytes = serde_json::to_vec(&payload).expect("serializable");
		manager.handle_telemetry(&device(), &bytes).await;
	}

	#[tokio::test]
	async fn test_status_write_dedup() {
		let (manager, store) = manager_with_store().await;

		send(&manager, json!({"state": {"text": "Operational"}})).await;
		assert_eq!(store.status_write_count().await, 1);
		// Identical derived status must not write again
		send(&manager, json!({"state": {"text": "Operational"}})).await;
		assert_eq!(store.status_write_count().await, 1);

		send(&manager, json!({"flags": {"printing": true}})).await;
		assert_eq!(store.status_write_count().await, 2);
		assert_eq!(
			store.device_status("p1").await,
			Some(DeviceStatus::Printing)
		);
	}

	#[tokio::test]
	async fn test_job_lifecycle_idempotence() {
		let (manager, store) = manager_with_store().await;
		let printing = json!({
			"flags": {"printing": true},
			"job": {"id": "J1", "file": {"name": "part.gcode"}}
		});

		send(&manager, printing.clone()).await;
		send(&manager, printing.clone()).await;
		let jobs = store.jobs().await;
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].status, JobStatus::Printing);
		assert_eq!(jobs[0].external_job_id.as_deref(), Some("J1"));
		assert_eq!(jobs[0].owner_id, "owner-1");

		// Pause and resume move the same row, never a second one
		send(&manager, json!({"flags": {"paused": true}})).await;
		assert_eq!(store.jobs().await[0].status, JobStatus::Paused);
		send(&manager, printing).await;
		let jobs = store.jobs().await;
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].status, JobStatus::Printing);
	}

	#[tokio::test]
	async fn test_idle_closes_job_as_completed() {
		let (manager, store) = manager_with_store().await;
		send(
			&manager,
			json!({
				"flags": {"printing": true},
				"job": {"id": "J1", "file": {"name": "part.gcode"}}
			}),
		)
		.await;
		assert!(manager.open_job_id("p1").await.is_some());

		send(
			&manager,
			json!({"flags": {"printing": false}, "state": {"text": "Operational"}}),
		)
		.await;
		let jobs = store.jobs().await;
		assert_eq!(jobs[0].status, JobStatus::Completed);
		assert!(jobs[0].completed_at.is_some());
		assert_eq!(manager.open_job_id("p1").await, None);
		assert_eq!(store.device_status("p1").await, Some(DeviceStatus::Idle));
	}

	#[tokio::test]
	async fn test_error_closes_job_as_failed_with_message() {
		let (manager, store) = manager_with_store().await;
		send(&manager, json!({"flags": {"printing": true}})).await;
		send(
			&manager,
			json!({
				"flags": {"error": true},
				"state": {"text": "Error", "error": "thermal runaway"}
			}),
		)
		.await;
		let jobs = store.jobs().await;
		assert_eq!(jobs[0].status, JobStatus::Failed);
		assert_eq!(jobs[0].error_message.as_deref(), Some("thermal runaway"));
	}

	#[tokio::test]
	async fn test_cancelling_state_closes_job_as_cancelled() {
		let (manager, store) = manager_with_store().await;
		send(&manager, json!({"flags": {"printing": true}})).await;
		send(&manager, json!({"state": {"text": "Cancelling"}})).await;
		assert_eq!(store.jobs().await[0].status, JobStatus::Cancelled);
	}

	#[tokio::test]
	async fn test_offline_mid_print_keeps_job_open() {
		let (manager, store) = manager_with_store().await;
		send(&manager, json!({"flags": {"printing": true}})).await;
		send(&manager, json!({"state": {"text": "Offline"}})).await;
		assert_eq!(store.jobs().await[0].status, JobStatus::Printing);
		assert!(manager.open_job_id("p1").await.is_some());
		assert_eq!(
			store.device_status("p1").await,
			Some(DeviceStatus::Disconnected)
		);
	}

	/// Store double whose open-job lookup misses a configured number
	/// of times, forcing the insert path into the unique-violation
	/// recovery.
	struct RacingStore {
		inner: MemoryStatusStore,
		blind_lookups: AtomicUsize,
	}

	#[async_trait]
	impl StatusStore for RacingStore {
		async fn upsert_device_status(
			&self,
			device_id: &str,
			status: DeviceStatus,
			at: DateTime<Utc>,
		) -> Result<(), StoreError> {
			self.inner.upsert_device_status(device_id, status, at).await
		}

		async fn find_open_job(
			&self,
			device_id: &str,
		) -> Result<Option<JobRow>, StoreError> {
			if self
				.blind_lookups
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
					(n > 0).then(|| n - 1)
				})
				.is_ok()
			{
				return Ok(None);
			}
			self.inner.find_open_job(device_id).await
		}

		async fn insert_job(
			&self,
			device_id: &str,
			owner_id: &str,
			job: NewJob,
		) -> Result<JobRow, StoreError> {
			self.inner.insert_job(device_id, owner_id, job).await
		}

		async fn update_job(
			&self,
			job_id: &str,
			update: JobUpdate,
		) -> Result<(), StoreError> {
			self.inner.update_job(job_id, update).await
		}
	}

	#[tokio::test]
	async fn test_unique_violation_adopts_existing_row() {
		let store = Arc::new(RacingStore {
			inner: MemoryStatusStore::new(),
			blind_lookups: AtomicUsize::new(1),
		});
		// Row created by a concurrent session
		let existing = store
			.inner
			.insert_job("p1", "owner-1", NewJob::default())
			.await
			.expect("insert succeeds");

		let manager = Arc::new(PrinterStatusManager::new(
			store.clone(),
			Duration::from_secs(30),
		));
		manager.track_device(device(), "owner-1").await;
		send(&manager, json!({"flags": {"printing": true}})).await;

		// The blind lookup missed, the insert hit the constraint, and
		// the re-query adopted the existing row
		assert_eq!(store.inner.jobs().await.len(), 1);
		assert_eq!(manager.open_job_id("p1").await, Some(existing.id));
	}

	#[tokio::test(start_paused = true)]
	async fn test_liveness_sweep_demotes_once() {
		let (manager, store) = manager_with_store().await;
		send(&manager, json!({"state": {"text": "Operational"}})).await;
		let writes_after_telemetry = store.status_write_count().await;

		// Within the window nothing happens
		tokio::time::advance(Duration::from_secs(10)).await;
		manager.sweep_once().await;
		assert_eq!(store.device_status("p1").await, Some(DeviceStatus::Idle));

		// Past the window the device is demoted, exactly once
		tokio::time::advance(Duration::from_secs(25)).await;
		manager.sweep_once().await;
		assert_eq!(
			store.device_status("p1").await,
			Some(DeviceStatus::Disconnected)
		);
		let writes_after_demotion = store.status_write_count().await;
		assert_eq!(writes_after_demotion, writes_after_telemetry + 1);

		manager.sweep_once().await;
		manager.sweep_once().await;
		assert_eq!(store.status_write_count().await, writes_after_demotion);

		// Telemetry resuming re-arms the sweep
		send(&manager, json!({"state": {"text": "Operational"}})).await;
		tokio::time::advance(Duration::from_secs(31)).await;
		manager.sweep_once().await;
		assert_eq!(
			store.device_status("p1").await,
			Some(DeviceStatus::Disconnected)
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sweep_controller_runs_and_stops() {
		let (manager, store) = manager_with_store().await;
		send(&manager, json!({"state": {"text": "Operational"}})).await;

		let controller = manager.start_sweep(Duration::from_secs(10));
		tokio::time::advance(Duration::from_secs(35)).await;
		// Let the sweep task drain its due ticks
		tokio::time::sleep(Duration::from_millis(1)).await;
		assert_eq!(
			store.device_status("p1").await,
			Some(DeviceStatus::Disconnected)
		);
		controller.shutdown().await;
	}

	/// Store double failing every status upsert
	struct FailingStatusStore {
		inner: MemoryStatusStore,
		fail_upserts: AtomicUsize,
	}

	#[async_trait]
	impl StatusStore for FailingStatusStore {
		async fn upsert_device_status(
			&self,
			device_id: &str,
			status: DeviceStatus,
			at: DateTime<Utc>,
		) -> Result<(), StoreError> {
			if self
				.fail_upserts
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
					(n > 0).then(|| n - 1)
				})
				.is_ok()
			{
				return Err(StoreError::backend("write refused"));
			}
			self.inner.upsert_device_status(device_id, status, at).await
		}

		async fn find_open_job(
			&self,
			device_id: &str,
		) -> Result<Option<JobRow>, StoreError> {
			self.inner.find_open_job(device_id).await
		}

		async fn insert_job(
			&self,
			device_id: &str,
			owner_id: &str,
			job: NewJob,
		) -> Result<JobRow, StoreError> {
			self.inner.insert_job(device_id, owner_id, job).await
		}

		async fn update_job(
			&self,
			job_id: &str,
			update: JobUpdate,
		) -> Result<(), StoreError> {
			self.inner.update_job(job_id, update).await
		}
	}

	#[tokio::test]
	async fn test_failed_write_leaves_cache_stale_for_retry() {
		let store = Arc::new(FailingStatusStore {
			inner: MemoryStatusStore::new(),
			fail_upserts: AtomicUsize::new(1),
		});
		let manager = Arc::new(PrinterStatusManager::new(
			store.clone(),
			Duration::from_secs(30),
		));

		// First write fails and must not advance the cache
		send(&manager, json!({"state": {"text": "Operational"}})).await;
		assert_eq!(manager.cached_status("p1").await, None);
		assert_eq!(store.inner.device_status("p1").await, None);

		// The next event with the same status retries the write
		send(&manager, json!({"state": {"text": "Operational"}})).await;
		assert_eq!(
			manager.cached_status("p1").await,
			Some(DeviceStatus::Idle)
		);
		assert_eq!(
			store.inner.device_status("p1").await,
			Some(DeviceStatus::Idle)
		);
	}
}
