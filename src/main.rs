//! Demo binary
//!
//! Runs the bridge against the broker named in `BROKER_URL`, or in
//! inert mode when the variable is unset. `IDENTITY` and a
//! comma-separated `DEVICES` list feed a static resolver; every bridge
//! event is printed until Ctrl-C.

use std::sync::Arc;

use printer_bridge::{
	BridgeConfig, MemoryStatusStore, PrinterBridge, StaticDeviceResolver,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let identity =
		std::env::var("IDENTITY").unwrap_or_else(|_| "demo".to_string());
	let devices: Vec<String> = std::env::var("DEVICES")
		.unwrap_or_else(|_| "printer-1".to_string())
		.split(',')
		.map(str::trim)
		.filter(|device| !device.is_empty())
		.map(str::to_string)
		.collect();

	let config = match std::env::var("BROKER_URL") {
		| Ok(url) => BridgeConfig::with_broker(url),
		| Err(_) => BridgeConfig::inert(),
	}
	.client_id_seed(identity.clone());

	let store = Arc::new(MemoryStatusStore::new());
	let resolver = Arc::new(
		StaticDeviceResolver::new().with_identity(identity.clone(), devices),
	);
	let bridge = PrinterBridge::new(config, store, resolver)?;

	let _listener = bridge.on_status(Arc::new(|event| {
		info!(event = ?event, "Bridge event");
	}));

	let tracked = bridge.start_for_identity(&identity, false).await?;
	info!(identity = %identity, devices = ?tracked, "Bridge started");
	bridge.start_sweep().await;

	tokio::signal::ctrl_c().await?;
	info!("Shutting down");
	bridge.shutdown().await;
	Ok(())
}
