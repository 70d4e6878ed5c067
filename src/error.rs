//! Crate-level error type

use thiserror::Error;

use crate::{
	resolver::ResolveError, store::StoreError, topic::TopicPatternError,
};

/// Errors that can occur inside the bridge.
///
/// The public bridge surface swallows transport failures into boolean
/// returns per the reconciliation contract; this type covers
/// construction-time and store/resolver failures that callers do see.
#[derive(Error, Debug)]
pub enum BridgeError {
	/// Broker URL or option parsing failed
	#[error("Configuration error: {0}")]
	Configuration(#[from] rumqttc::OptionError),

	/// Transport-level client error
	#[error("Connection error: {0}")]
	Connection(#[from] rumqttc::ClientError),

	/// Invalid topic pattern
	#[error("Topic pattern error: {0}")]
	TopicPattern(#[from] TopicPatternError),

	/// Durable store failure
	#[error("Store error: {0}")]
	Store(#[from] StoreError),

	/// Device-set resolution failure
	#[error("Resolver error: {0}")]
	Resolve(#[from] ResolveError),

	/// Internal channel closed unexpectedly
	#[error("Channel error: {0}")]
	Channel(String),
}

/// Result type alias for operations that may fail with [`BridgeError`]
pub type Result<T> = std::result::Result<T, BridgeError>;
