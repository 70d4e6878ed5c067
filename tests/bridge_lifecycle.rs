//! End-to-end lifecycle of the bridge
//!
//! Drives a complete print session through a brokerless bridge: an
//! identity is resolved to its devices, telemetry of varying firmware
//! shapes is fed through the reconciliation engine, and the durable
//! rows and listener events are checked against the expected
//! lifecycle.

use std::{
	sync::{Arc, Mutex},
	time::Duration,
};

use printer_bridge::{
	BridgeConfig, BridgeEvent, DeviceStatus, JobStatus, MemoryStatusStore,
	PrinterBridge, StaticDeviceResolver, StatusSubscription,
};
use serde_json::json;

struct Harness {
	bridge: PrinterBridge,
	store: Arc<MemoryStatusStore>,
	events: Arc<Mutex<Vec<(String, DeviceStatus)>>>,
	_listener: StatusSubscription,
}

async fn harness(identity: &str, devices: &[&str]) -> Harness {
	let store = Arc::new(MemoryStatusStore::new());
	let resolver = Arc::new(
		StaticDeviceResolver::new().with_identity(identity, devices.to_vec()),
	);
	let bridge = PrinterBridge::new(
		BridgeConfig::inert().client_id_seed(identity),
		store.clone(),
		resolver,
	)
	.expect("inert config is valid");

	let events: Arc<Mutex<Vec<(String, DeviceStatus)>>> = Arc::default();
	let sink = Arc::clone(&events);
	let listener = bridge.on_status(Arc::new(move |event| {
		if let BridgeEvent::Status {
			device_id, status, ..
		} = event
		{
			sink.lock()
				.expect("event sink lock")
				.push((device_id.to_string(), *status));
		}
	}));

	bridge
		.start_for_identity(identity, false)
		.await
		.expect("identity resolves");
	Harness {
		bridge,
		store,
		events,
		_listener: listener,
	}
}

impl Harness {
	/// Feeds one telemetry payload as if it arrived on the device's
	/// status topic
	async fn telemetry(&self, device_id: &str, payload: serde_json::Value) {
		let bytes = serde_json::to_vec(&payload).expect("serializable");
		self.bridge
			.manager()
			.handle_telemetry(&arcstr::ArcStr::from(device_id), &bytes)
			.await;
	}

	fn statuses_of(&self, device_id: &str) -> Vec<DeviceStatus> {
		self.events
			.lock()
			.expect("event sink lock")
			.iter()
			.filter(|(id, _)| id == device_id)
			.map(|(_, status)| *status)
			.collect()
	}
}

#[tokio::test]
async fn test_full_print_session() {
	let h = harness("ident-1", &["p1", "p2"]).await;
	let mut tracked = h.bridge.tracked_devices().await;
	tracked.sort();
	assert_eq!(tracked, ["p1", "p2"]);

	// Device comes up idle, OctoPrint-style payload shape
	h.telemetry(
		"p1",
		json!({
			"state": {"text": "Operational", "flags": {"operational": true}},
			"temps": {"tool0": {"actual": 24.8, "target": 0.0}}
		}),
	)
	.await;
	assert_eq!(h.store.device_status("p1").await, Some(DeviceStatus::Idle));
	assert!(h.store.jobs().await.is_empty());

	// Print starts, flat-flags payload shape
	h.telemetry(
		"p1",
		json!({
			"flags": {"printing": true},
			"job": {"id": "job-77", "file": {"name": "bracket.gcode", "size": 40960}},
			"progress": {"completion": 3.1}
		}),
	)
	.await;
	let jobs = h.store.jobs().await;
	assert_eq!(jobs.len(), 1);
	assert_eq!(jobs[0].device_id, "p1");
	assert_eq!(jobs[0].owner_id, "ident-1");
	assert_eq!(jobs[0].external_job_id.as_deref(), Some("job-77"));
	assert_eq!(jobs[0].file_name.as_deref(), Some("bracket.gcode"));
	assert_eq!(jobs[0].status, JobStatus::Printing);

	// Mid-print pause and resume reuse the same row
	h.telemetry("p1", json!({"flags": {"paused": true}})).await;
	assert_eq!(h.store.jobs().await[0].status, JobStatus::Paused);
	h.telemetry("p1", json!({"flags": {"printing": true}})).await;
	let jobs = h.store.jobs().await;
	assert_eq!(jobs.len(), 1);
	assert_eq!(jobs[0].status, JobStatus::Printing);

	// Print finishes
	h.telemetry(
		"p1",
		json!({"state": "Operational", "progress": {"completion": 100}}),
	)
	.await;
	let jobs = h.store.jobs().await;
	assert_eq!(jobs.len(), 1);
	assert_eq!(jobs[0].status, JobStatus::Completed);
	assert!(jobs[0].completed_at.is_some());
	assert_eq!(h.store.device_status("p1").await, Some(DeviceStatus::Idle));

	// The listener saw the whole lifecycle in order
	assert_eq!(
		h.statuses_of("p1"),
		[
			DeviceStatus::Idle,
			DeviceStatus::Printing,
			DeviceStatus::Paused,
			DeviceStatus::Printing,
			DeviceStatus::Idle,
		]
	);
	// The second device never produced telemetry or events
	assert!(h.statuses_of("p2").is_empty());
	assert_eq!(h.store.device_status("p2").await, None);

	h.bridge.shutdown().await;
}

#[tokio::test]
async fn test_devices_reconcile_independently() {
	let h = harness("ident-1", &["p1", "p2"]).await;

	h.telemetry("p1", json!({"flags": {"printing": true}})).await;
	h.telemetry("p2", json!({"state": "Offline"})).await;

	assert_eq!(
		h.store.device_status("p1").await,
		Some(DeviceStatus::Printing)
	);
	assert_eq!(
		h.store.device_status("p2").await,
		Some(DeviceStatus::Disconnected)
	);
	// Only the printing device opened a job
	let jobs = h.store.jobs().await;
	assert_eq!(jobs.len(), 1);
	assert_eq!(jobs[0].device_id, "p1");

	h.bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweep_demotes_silent_device_end_to_end() {
	let h = harness("ident-1", &["p1"]).await;
	h.bridge.start_sweep().await;

	h.telemetry("p1", json!({"state": "Operational"})).await;
	assert_eq!(h.store.device_status("p1").await, Some(DeviceStatus::Idle));

	// Default liveness timeout is 30s, sweep interval 10s
	tokio::time::advance(Duration::from_secs(45)).await;
	// Let the sweep task drain its due ticks
	tokio::time::sleep(Duration::from_millis(1)).await;
	assert_eq!(
		h.store.device_status("p1").await,
		Some(DeviceStatus::Disconnected)
	);
	// The demotion event carries no snapshot
	let demoted = h
		.events
		.lock()
		.expect("event sink lock")
		.iter()
		.filter(|(_, status)| *status == DeviceStatus::Disconnected)
		.count();
	assert_eq!(demoted, 1);

	h.bridge.stop_sweep().await;
	h.bridge.shutdown().await;
}

#[tokio::test]
async fn test_malformed_telemetry_is_absorbed() {
	let h = harness("ident-1", &["p1"]).await;

	h.bridge
		.manager()
		.handle_telemetry(&arcstr::ArcStr::from("p1"), b"not json at all")
		.await;
	assert_eq!(h.store.status_write_count().await, 0);
	assert!(h.statuses_of("p1").is_empty());

	// The device recovers with the next valid payload
	h.telemetry("p1", json!({"state": "Operational"})).await;
	assert_eq!(h.store.device_status("p1").await, Some(DeviceStatus::Idle));

	h.bridge.shutdown().await;
}
