use serde_json::json;

use super::normalizer::normalize;

#[test]
fn test_flags_at_root_and_under_state() {
	let root = normalize(&json!({"flags": {"printing": true}}));
	assert!(root.flags.printing);

	let nested = normalize(&json!({
		"state": {"text": "Printing", "flags": {"printing": true, "operational": true}}
	}));
	assert!(nested.flags.printing);
	assert!(nested.flags.operational);
	assert_eq!(nested.state_text.as_deref(), Some("Printing"));
}

#[test]
fn test_state_as_plain_string() {
	let snapshot = normalize(&json!({"state": "Operational"}));
	assert_eq!(snapshot.state_text.as_deref(), Some("Operational"));
}

#[test]
fn test_temperatures_dict_of_heaters() {
	let snapshot = normalize(&json!({
		"temps": {
			"tool0": {"actual": 210.3, "target": 215.0},
			"bed": {"actual": 60.1, "target": 60.0},
			"time": 1700000000
		}
	}));
	assert_eq!(snapshot.temperatures.len(), 2);
	let tool = &snapshot.temperatures["tool0"];
	assert_eq!(tool.actual, Some(210.3));
	assert_eq!(tool.target, Some(215.0));
	assert_eq!(snapshot.temperatures["bed"].actual, Some(60.1));
}

#[test]
fn test_temperatures_flat_pair() {
	let snapshot =
		normalize(&json!({"temperature": {"actual": 199.0, "target": 200}}));
	assert_eq!(snapshot.temperatures.len(), 1);
	assert_eq!(snapshot.temperatures["tool0"].actual, Some(199.0));
	assert_eq!(snapshot.temperatures["tool0"].target, Some(200.0));
}

#[test]
fn test_temperatures_bare_numbers() {
	let snapshot = normalize(&json!({"temps": {"bed": 58.5}}));
	assert_eq!(snapshot.temperatures["bed"].actual, Some(58.5));
	assert_eq!(snapshot.temperatures["bed"].target, None);
}

#[test]
fn test_connection_tuple_form() {
	let snapshot = normalize(&json!({
		"connection": {"current": ["Operational", "/dev/ttyUSB0", 115200, "_default"]}
	}));
	let connection = snapshot.connection.expect("connection parsed");
	assert_eq!(connection.state.as_deref(), Some("Operational"));
	assert_eq!(connection.port.as_deref(), Some("/dev/ttyUSB0"));
	assert_eq!(connection.baudrate, Some(115200));
	assert_eq!(connection.profile.as_deref(), Some("_default"));
}

#[test]
fn test_connection_three_element_tuple() {
	let snapshot =
		normalize(&json!({"connection": ["Closed", "/dev/ttyACM0", 250000]}));
	let connection = snapshot.connection.expect("connection parsed");
	assert_eq!(connection.state.as_deref(), Some("Closed"));
	assert_eq!(connection.profile, None);
}

#[test]
fn test_connection_object_form() {
	let snapshot = normalize(&json!({
		"connection": {"state": "Error", "error": "serial port vanished"}
	}));
	let connection = snapshot.connection.expect("connection parsed");
	assert_eq!(connection.state.as_deref(), Some("Error"));
	assert_eq!(connection.error.as_deref(), Some("serial port vanished"));
}

#[test]
fn test_progress_percentage_becomes_ratio() {
	let snapshot = normalize(&json!({"progress": {"completion": 42.5}}));
	assert!((snapshot.progress - 0.425).abs() < 1e-9);
}

#[test]
fn test_progress_ratio_passes_through() {
	let snapshot = normalize(&json!({"progress": {"completion": 0.425}}));
	assert!((snapshot.progress - 0.425).abs() < 1e-9);
}

#[test]
fn test_progress_bytes_fallback() {
	let snapshot = normalize(&json!({
		"progress": {"filepos": 250},
		"job": {"file": {"name": "part.gcode", "size": 1000}}
	}));
	assert!((snapshot.progress - 0.25).abs() < 1e-9);
}

#[test]
fn test_progress_defaults_to_zero() {
	assert_eq!(normalize(&json!({})).progress, 0.0);
	assert_eq!(normalize(&json!({"progress": {}})).progress, 0.0);
	// Negative and non-finite values are discarded, not propagated
	assert_eq!(
		normalize(&json!({"progress": {"completion": -5.0}})).progress,
		0.0
	);
}

#[test]
fn test_files_array_and_dict_forms() {
	let array = normalize(&json!({
		"files": [
			{"name": "a.gcode", "size": 100},
			"b.gcode",
			42
		]
	}));
	assert_eq!(array.files.len(), 2);
	assert_eq!(array.files[0].name, "a.gcode");
	assert_eq!(array.files[0].size, Some(100));
	assert_eq!(array.files[1].name, "b.gcode");

	let dict = normalize(&json!({
		"files": {"a.gcode": {"size": 100}, "b.gcode": 200}
	}));
	assert_eq!(dict.files.len(), 2);
	let by_name = |name: &str| {
		dict.files
			.iter()
			.find(|f| f.name == name)
			.expect("entry present")
			.size
	};
	assert_eq!(by_name("a.gcode"), Some(100));
	assert_eq!(by_name("b.gcode"), Some(200));
}

#[test]
fn test_job_and_external_id() {
	let snapshot = normalize(&json!({
		"job": {"id": "J1", "file": {"name": "part.gcode", "size": 1000}}
	}));
	assert_eq!(snapshot.external_job_id.as_deref(), Some("J1"));
	let file = snapshot.job_file.expect("job file parsed");
	assert_eq!(file.name.as_deref(), Some("part.gcode"));
	assert_eq!(file.size, Some(1000));

	// Numeric ids are stringified
	let numeric = normalize(&json!({"job": {"id": 7}}));
	assert_eq!(numeric.external_job_id.as_deref(), Some("7"));
}

#[test]
fn test_malformed_section_does_not_abort_the_rest() {
	let snapshot = normalize(&json!({
		"temps": "garbage",
		"connection": 17,
		"progress": {"completion": "not a number"},
		"files": true,
		"state": {"text": "Operational"}
	}));
	assert!(snapshot.temperatures.is_empty());
	assert_eq!(snapshot.connection, None);
	assert_eq!(snapshot.progress, 0.0);
	assert!(snapshot.files.is_empty());
	// The well-formed section still came through
	assert_eq!(snapshot.state_text.as_deref(), Some("Operational"));
}

#[test]
fn test_position() {
	let snapshot =
		normalize(&json!({"position": {"x": 10.0, "y": 20.5, "z": 0.3}}));
	let position = snapshot.position.expect("position parsed");
	assert_eq!(position.x, Some(10.0));
	assert_eq!(position.y, Some(20.5));
	assert_eq!(position.z, Some(0.3));
	assert_eq!(normalize(&json!({"position": {}})).position, None);
}
