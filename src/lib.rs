//! # Printer Bridge
//!
//! A device-telemetry bridge and status-reconciliation engine for 3D
//! printer fleets speaking MQTT.
//!
//! ## Features
//!
//! - **Pattern-based Routing**: MQTT wildcard patterns (`+`, `#`) with
//!   deduplicated, idempotent subscriptions
//! - **Telemetry Normalization**: heterogeneous firmware payloads
//!   mapped into one canonical snapshot, degrading field-by-field
//! - **Status Reconciliation**: canonical device status persisted
//!   behind a differs-from-cache write guard
//! - **Job Lifecycle Tracking**: at most one open print job per device,
//!   duplicate-delivery safe, with unique-violation adoption
//! - **Liveness Sweep**: silent devices demoted to `disconnected` on a
//!   periodic sweep
//! - **Inert Mode**: without a broker URL every transport operation
//!   logs and no-ops, so embedders run brokerless
//! - **Pluggable Persistence**: inject any [`StatusStore`]; an
//!   in-memory store ships for tests and demos
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use printer_bridge::{
//!     BridgeConfig, MemoryStatusStore, PrinterBridge, StaticDeviceResolver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BridgeConfig::with_broker("mqtt://broker.example.com:1883")
//!         .client_id_seed("ident-42");
//!     let store = Arc::new(MemoryStatusStore::new());
//!     let resolver = Arc::new(
//!         StaticDeviceResolver::new().with_identity("ident-42", ["printer-1"]),
//!     );
//!
//!     let bridge = PrinterBridge::new(config, store, resolver)?;
//!     let _listener = bridge.on_status(Arc::new(|event| {
//!         println!("bridge event: {event:?}");
//!     }));
//!
//!     bridge.start_for_identity("ident-42", false).await?;
//!     bridge.start_sweep().await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Topic Scheme
//!
//! Per device id the bridge uses three topics, prefixes configurable
//! through [`BridgeConfig`]:
//!
//! - `status/{device_id}` for inbound telemetry
//! - `control/{device_id}` for outbound commands
//! - `control-result/{device_id}` for command acknowledgements

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod manager;
pub mod resolver;
pub mod routing;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod topic;

pub use bridge::PrinterBridge;
pub use config::{BridgeConfig, Credentials};
pub use connection::ConnectionManager;
pub use error::{BridgeError, Result};
pub use listener::{BridgeEvent, StatusListener, StatusSubscription};
pub use manager::{PrinterStatusManager, SweepController};
pub use resolver::{
	CachedDeviceResolver, DeviceSetResolver, ResolveError,
	StaticDeviceResolver, DEFAULT_RESOLVER_TTL,
};
pub use routing::{HandlerId, InboundMessage, MessageHandler};
pub use status::{derive_status, DeviceStatus, JobStatus};
pub use store::{
	memory::MemoryStatusStore, JobRow, JobUpdate, NewJob, StatusStore,
	StoreError,
};
pub use telemetry::{normalize, TelemetrySnapshot};
pub use topic::{TopicPattern, TopicPatternError};

// Re-export the transport QoS so embedders need no direct rumqttc
// dependency
pub use rumqttc::QoS;
