use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Boolean state flags reported by the device
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct StatusFlags {
	/// Device reports an active print
	pub printing: bool,
	/// Device reports a paused print
	pub paused: bool,
	/// Device reports an error condition
	pub error: bool,
	/// Device reports itself connected and operational
	pub operational: bool,
}

/// Actual/target temperature pair for one heater
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaterReading {
	pub actual: Option<f64>,
	pub target: Option<f64>,
}

/// Toolhead position, axes optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
	pub x: Option<f64>,
	pub y: Option<f64>,
	pub z: Option<f64>,
}

/// Serial connection details, present in either tuple or object form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
	pub state: Option<String>,
	pub port: Option<String>,
	pub baudrate: Option<u64>,
	pub profile: Option<String>,
	pub error: Option<String>,
}

/// File metadata of the job currently loaded on the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
	pub name: Option<String>,
	pub size: Option<u64>,
}

/// One entry of the on-device file listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
	pub name: String,
	pub size: Option<u64>,
}

/// Canonical normalized telemetry record.
///
/// Ephemeral: delivered to listeners, never persisted. Absent or
/// malformed payload sections surface as `None`/empty here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
	/// Device state flags
	pub flags: StatusFlags,
	/// Free-form connection-state text, e.g. "Operational"
	pub state_text: Option<String>,
	/// Device-reported error message
	pub error: Option<String>,
	/// Serial connection details
	pub connection: Option<ConnectionInfo>,
	/// Per-heater temperature readings, keyed by heater name
	pub temperatures: BTreeMap<String, HeaterReading>,
	/// Toolhead position
	pub position: Option<Position>,
	/// Print progress as a 0-1 ratio; 0 when unknown
	pub progress: f64,
	/// File metadata of the active job
	pub job_file: Option<JobFile>,
	/// The device's own job identifier, when it numbers jobs
	pub external_job_id: Option<String>,
	/// On-device file listing
	pub files: Vec<FileEntry>,
}
