//! Telemetry normalization module
//!
//! Inbound device payloads are schemaless JSON whose sections vary by
//! firmware: temperatures arrive as a dict of heaters or a flat pair,
//! file listings as arrays or dicts, connection state as a tuple or an
//! object, progress as a percentage or a ratio. This module maps all
//! observed shapes into one canonical [`TelemetrySnapshot`], degrading
//! field-by-field instead of failing the whole payload.

pub mod normalizer;
pub mod snapshot;

#[cfg(test)]
mod normalizer_tests;

// Re-export commonly used types for convenience
pub use normalizer::normalize;
pub use snapshot::{
	ConnectionInfo, FileEntry, HeaterReading, JobFile, Position, StatusFlags,
	TelemetrySnapshot,
};
