use serde_json::Value;

use super::snapshot::{
	ConnectionInfo, FileEntry, HeaterReading, JobFile, Position, StatusFlags,
	TelemetrySnapshot,
};

/// Normalizes a raw telemetry payload into a canonical snapshot.
///
/// Every section is extracted defensively: a missing or malformed
/// field becomes `None`/empty and never aborts normalization of the
/// remaining payload. This function cannot fail.
pub fn normalize(raw: &Value) -> TelemetrySnapshot {
	TelemetrySnapshot {
		flags: extract_flags(raw),
		state_text: extract_state_text(raw),
		error: extract_error(raw),
		connection: extract_connection(raw),
		temperatures: extract_temperatures(raw),
		position: extract_position(raw),
		progress: extract_progress(raw),
		job_file: extract_job_file(raw),
		external_job_id: extract_external_job_id(raw),
		files: extract_files(raw),
	}
}

/// Number, or a string that parses as one. Booleans are not numbers.
fn value_as_f64(value: &Value) -> Option<f64> {
	match value {
		| Value::Number(n) => n.as_f64(),
		| Value::String(s) => s.trim().parse().ok(),
		| _ => None,
	}
}

fn value_as_u64(value: &Value) -> Option<u64> {
	match value {
		| Value::Number(n) => n.as_u64(),
		| Value::String(s) => s.trim().parse().ok(),
		| _ => None,
	}
}

/// Bool, or a nonzero number. Anything else reads as false.
fn value_as_bool(value: &Value) -> bool {
	match value {
		| Value::Bool(b) => *b,
		| Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
		| _ => false,
	}
}

fn value_as_string(value: &Value) -> Option<String> {
	match value {
		| Value::String(s) => Some(s.clone()),
		| Value::Number(n) => Some(n.to_string()),
		| _ => None,
	}
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
	value.as_object().and_then(|object| object.get(key))
}

/// Flags live under `state.flags` or at the payload root
fn extract_flags(raw: &Value) -> StatusFlags {
	let flags = field(raw, "flags")
		.or_else(|| field(raw, "state").and_then(|s| field(s, "flags")));
	let Some(flags) = flags else {
		return StatusFlags::default();
	};
	let get = |key: &str| field(flags, key).is_some_and(value_as_bool);
	StatusFlags {
		printing: get("printing"),
		paused: get("paused") || get("pausing"),
		error: get("error") || get("closedOrError"),
		operational: get("operational") || get("ready"),
	}
}

/// State text is `state.text`, or `state` itself when it is a string
fn extract_state_text(raw: &Value) -> Option<String> {
	let state = field(raw, "state")?;
	match state {
		| Value::String(s) => Some(s.clone()),
		| _ => field(state, "text").and_then(value_as_string),
	}
}

fn extract_error(raw: &Value) -> Option<String> {
	field(raw, "state")
		.and_then(|state| field(state, "error"))
		.or_else(|| field(raw, "error"))
		.and_then(value_as_string)
		.filter(|s| !s.is_empty())
}

/// Connection arrives either as a `[state, port, baudrate, profile]`
/// tuple (3 or 4 elements) or as a `{state, error, ...}` object, both
/// optionally nested under `connection.current`.
fn extract_connection(raw: &Value) -> Option<ConnectionInfo> {
	let connection = field(raw, "connection")?;
	let current = field(connection, "current").unwrap_or(connection);
	match current {
		| Value::Array(items) => Some(ConnectionInfo {
			state: items.first().and_then(value_as_string),
			port: items.get(1).and_then(value_as_string),
			baudrate: items.get(2).and_then(value_as_u64),
			profile: items.get(3).and_then(value_as_string),
			error: None,
		}),
		| Value::Object(_) => Some(ConnectionInfo {
			state: field(current, "state").and_then(value_as_string),
			port: field(current, "port").and_then(value_as_string),
			baudrate: field(current, "baudrate").and_then(value_as_u64),
			profile: field(current, "printerProfile")
				.or_else(|| field(current, "profile"))
				.and_then(value_as_string),
			error: field(current, "error").and_then(value_as_string),
		}),
		| _ => None,
	}
}

fn heater_reading(value: &Value) -> HeaterReading {
	match value {
		| Value::Object(_) => HeaterReading {
			actual: field(value, "actual").and_then(value_as_f64),
			target: field(value, "target").and_then(value_as_f64),
		},
		// A bare number is the actual reading
		| _ => HeaterReading {
			actual: value_as_f64(value),
			target: None,
		},
	}
}

/// Temperatures are a dict keyed by heater name, or one flat
/// `{actual, target}` pair which lands under `tool0`.
fn extract_temperatures(
	raw: &Value,
) -> std::collections::BTreeMap<String, HeaterReading> {
	let mut readings = std::collections::BTreeMap::new();
	let temps = field(raw, "temps")
		.or_else(|| field(raw, "temperature"))
		.or_else(|| field(raw, "temperatures"));
	let Some(temps) = temps.and_then(Value::as_object) else {
		return readings;
	};
	if temps.contains_key("actual") || temps.contains_key("target") {
		readings.insert(
			"tool0".to_string(),
			heater_reading(&Value::Object(temps.clone())),
		);
		return readings;
	}
	for (heater, value) in temps {
		// Timestamped history entries are not heater readings
		if heater == "time" {
			continue;
		}
		let reading = heater_reading(value);
		if reading.actual.is_some() || reading.target.is_some() {
			readings.insert(heater.clone(), reading);
		}
	}
	readings
}

fn extract_position(raw: &Value) -> Option<Position> {
	let position = field(raw, "position")?;
	let axis = |key: &str| field(position, key).and_then(value_as_f64);
	let (x, y, z) = (axis("x"), axis("y"), axis("z"));
	if x.is_none() && y.is_none() && z.is_none() {
		return None;
	}
	Some(Position { x, y, z })
}

/// Progress always lands as a 0-1 ratio. An explicit completion value
/// above 1 is a 0-100 percentage; otherwise it already is a ratio.
/// With no completion at all, fall back to bytes transferred / total
/// bytes, and finally to 0.
fn extract_progress(raw: &Value) -> f64 {
	let progress = field(raw, "progress");
	let completion = progress
		.and_then(|p| field(p, "completion"))
		.or_else(|| {
			// A bare number under `progress` counts as completion
			progress.filter(|p| p.is_number() || p.is_string())
		})
		.and_then(value_as_f64);
	if let Some(completion) = completion {
		return normalize_ratio(completion);
	}
	let transferred = progress
		.and_then(|p| field(p, "filepos").or_else(|| field(p, "bytes")))
		.and_then(value_as_f64);
	let total = progress
		.and_then(|p| field(p, "size").or_else(|| field(p, "total")))
		.and_then(value_as_f64)
		.or_else(|| {
			field(raw, "job")
				.and_then(|job| field(job, "file"))
				.and_then(|file| field(file, "size"))
				.and_then(value_as_f64)
		});
	match (transferred, total) {
		| (Some(transferred), Some(total)) if total > 0.0 => {
			normalize_ratio(transferred / total)
		}
		| _ => 0.0,
	}
}

fn normalize_ratio(value: f64) -> f64 {
	if !value.is_finite() || value < 0.0 {
		return 0.0;
	}
	let ratio = if value > 1.0 { value / 100.0 } else { value };
	ratio.clamp(0.0, 1.0)
}

fn extract_job_file(raw: &Value) -> Option<JobFile> {
	let file = field(raw, "job").and_then(|job| field(job, "file"))?;
	let job_file = match file {
		| Value::String(name) => JobFile {
			name: Some(name.clone()),
			size: None,
		},
		| Value::Object(_) => JobFile {
			name: field(file, "name")
				.or_else(|| field(file, "display"))
				.and_then(value_as_string),
			size: field(file, "size").and_then(value_as_u64),
		},
		| _ => return None,
	};
	if job_file.name.is_none() && job_file.size.is_none() {
		return None;
	}
	Some(job_file)
}

fn extract_external_job_id(raw: &Value) -> Option<String> {
	field(raw, "job")
		.and_then(|job| field(job, "id"))
		.and_then(value_as_string)
		.filter(|id| !id.is_empty())
}

fn file_entry(name: &str, value: &Value) -> FileEntry {
	let size = match value {
		| Value::Object(_) => field(value, "size").and_then(value_as_u64),
		| _ => value_as_u64(value),
	};
	FileEntry {
		name: name.to_string(),
		size,
	}
}

/// File listings are arrays of entries (objects or bare names) or a
/// dict keyed by filename.
fn extract_files(raw: &Value) -> Vec<FileEntry> {
	let Some(files) = field(raw, "files") else {
		return Vec::new();
	};
	match files {
		| Value::Array(items) => items
			.iter()
			.filter_map(|item| match item {
				| Value::String(name) => Some(FileEntry {
					name: name.clone(),
					size: None,
				}),
				| Value::Object(_) => field(item, "name")
					.or_else(|| field(item, "display"))
					.and_then(value_as_string)
					.map(|name| file_entry(&name, item)),
				| _ => None,
			})
			.collect(),
		| Value::Object(entries) => entries
			.iter()
			.map(|(name, value)| file_entry(name, value))
			.collect(),
		| _ => Vec::new(),
	}
}
