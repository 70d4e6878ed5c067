//! Canonical device and job status types
//!
//! Raw telemetry arrives in many shapes; everything downstream (the
//! durable store, the listener bus) only ever sees these enums. The
//! string forms must stay in sync with the store's CHECK constraints.

use serde::{Deserialize, Serialize};

use crate::telemetry::TelemetrySnapshot;

/// Canonical device status derived from normalized telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
	/// Connected and ready, not printing
	Idle,
	/// Actively printing
	Printing,
	/// Print paused
	Paused,
	/// No connection to the device
	Disconnected,
	/// Device reported an error
	Error,
}

impl DeviceStatus {
	/// Store-compatible status string
	pub fn as_str(&self) -> &'static str {
		match self {
			| DeviceStatus::Idle => "idle",
			| DeviceStatus::Printing => "printing",
			| DeviceStatus::Paused => "paused",
			| DeviceStatus::Disconnected => "disconnected",
			| DeviceStatus::Error => "error",
		}
	}
}

impl std::fmt::Display for DeviceStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Lifecycle status of a persisted print job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	/// Job is running
	Printing,
	/// Job is paused
	Paused,
	/// Terminal: cancelled by the user or the device
	Cancelled,
	/// Terminal: finished successfully
	Completed,
	/// Terminal: aborted by a device error
	Failed,
}

impl JobStatus {
	/// Store-compatible status string
	pub fn as_str(&self) -> &'static str {
		match self {
			| JobStatus::Printing => "printing",
			| JobStatus::Paused => "paused",
			| JobStatus::Cancelled => "cancelled",
			| JobStatus::Completed => "completed",
			| JobStatus::Failed => "failed",
		}
	}

	/// True for `printing` and `paused`, the non-terminal states
	pub fn is_open(&self) -> bool {
		matches!(self, JobStatus::Printing | JobStatus::Paused)
	}
}

impl std::fmt::Display for JobStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// Derives the canonical status from a normalized snapshot.
///
/// Priority order, first match wins:
/// 1. explicit printing flag
/// 2. explicit paused flag
/// 3. explicit error flag
/// 4. connection-state text, case-insensitive
/// 5. default `Idle` ("connected, state unknown")
pub fn derive_status(snapshot: &TelemetrySnapshot) -> DeviceStatus {
	let flags = &snapshot.flags;
	if flags.printing {
		return DeviceStatus::Printing;
	}
	if flags.paused {
		return DeviceStatus::Paused;
	}
	if flags.error {
		return DeviceStatus::Error;
	}
	match &snapshot.state_text {
		| Some(text) => status_from_state_text(text),
		| None => DeviceStatus::Idle,
	}
}

/// Maps a free-form connection-state string to a canonical status
fn status_from_state_text(text: &str) -> DeviceStatus {
	let text = text.to_ascii_lowercase();
	if text.contains("printing") {
		DeviceStatus::Printing
	} else if text.contains("paus") {
		DeviceStatus::Paused
	} else if text.contains("operational") || text.contains("ready") {
		DeviceStatus::Idle
	} else if text.contains("offline") || text.contains("closed") {
		DeviceStatus::Disconnected
	} else if text.contains("error") {
		DeviceStatus::Error
	} else {
		// Unrecognized state on a live connection reads as Idle rather
		// than Error: a wrong Error here would fail open jobs.
		DeviceStatus::Idle
	}
}
