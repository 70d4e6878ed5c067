//! Message routing and subscription bookkeeping
//!
//! Tracks which topic patterns the process is subscribed to and which
//! handlers receive messages for each pattern, so repeated subscribe
//! calls stay idempotent and broker subscriptions are deduplicated.

pub mod registry;

// Re-export commonly used types for convenience
pub use registry::{
	HandlerId, InboundMessage, MessageHandler, SubscriptionRegistry,
};
