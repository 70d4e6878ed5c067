//! Topic handling module
//!
//! Parsing of MQTT-style topic patterns (`+` single-level and `#`
//! multi-level wildcards) and pure matching of patterns against
//! concrete topic strings.

pub mod pattern;


// Re-export commonly used types for convenience
pub use pattern::{matches, TopicPattern, TopicPatternError, TopicPatternItem};
