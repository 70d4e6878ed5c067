//! Bridge facade
//!
//! [`PrinterBridge`] wires the transport, the reconciliation engine,
//! the device-set resolver and the listener bus into one handle an
//! application embeds. Inbound messages hop from the transport's
//! dispatch into an internal channel and are consumed by a single
//! ingestion task, so handlers stay synchronous and cheap while
//! normalization and store writes run off the polling loop.

use std::{collections::HashMap, sync::Arc};

use arcstr::ArcStr;
use rumqttc::QoS;
use tokio::{
	sync::{mpsc, Mutex},
	task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
	config::BridgeConfig,
	connection::ConnectionManager,
	error::BridgeError,
	listener::{StatusListener, StatusSubscription},
	manager::{PrinterStatusManager, SweepController},
	resolver::{CachedDeviceResolver, DeviceSetResolver, ResolveError},
	routing::{HandlerId, MessageHandler},
	store::StatusStore,
};

/// Capacity of the telemetry ingestion channel
const INGEST_CAPACITY: usize = 256;

enum IngestItem {
	Telemetry {
		device_id: ArcStr,
		payload: bytes::Bytes,
	},
	CommandResult {
		device_id: ArcStr,
		payload: bytes::Bytes,
	},
}

/// Broker subscriptions held for one tracked device
struct DeviceSubscription {
	status_topic: String,
	status_id: Option<HandlerId>,
	result_topic: String,
	result_id: Option<HandlerId>,
}

/// The embedding handle of the bridge
pub struct PrinterBridge {
	config: BridgeConfig,
	connection: ConnectionManager,
	manager: Arc<PrinterStatusManager>,
	resolver: CachedDeviceResolver,
	ingest_tx: mpsc::Sender<IngestItem>,
	ingest_handle: Mutex<Option<JoinHandle<()>>>,
	tracked: Mutex<HashMap<ArcStr, DeviceSubscription>>,
	sweep: Mutex<Option<SweepController>>,
}

impl PrinterBridge {
	/// Builds a bridge from config and the injected store and
	/// resolver. Does not connect; the first subscribe or an explicit
	/// `connect()` does.
	pub fn new(
		config: BridgeConfig,
		store: Arc<dyn StatusStore>,
		resolver: Arc<dyn DeviceSetResolver>,
	) -> Result<Self, BridgeError> {
		let connection = ConnectionManager::new(&config)?;
		let manager = Arc::new(PrinterStatusManager::new(
			store,
			config.liveness_timeout,
		));
		let resolver = CachedDeviceResolver::new(resolver, config.resolver_ttl);

		let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_CAPACITY);
		let ingest_manager = Arc::clone(&manager);
		let ingest_handle = tokio::spawn(async move {
			Self::ingest(ingest_rx, ingest_manager).await;
		});

		Ok(Self {
			config,
			connection,
			manager,
			resolver,
			ingest_tx,
			ingest_handle: Mutex::new(Some(ingest_handle)),
			tracked: Mutex::new(HashMap::new()),
			sweep: Mutex::new(None),
		})
	}

	/// The reconciliation engine behind this bridge
	pub fn manager(&self) -> Arc<PrinterStatusManager> {
		Arc::clone(&self.manager)
	}

	/// True when running without a configured broker
	pub fn is_inert(&self) -> bool {
		self.connection.is_inert()
	}

	/// Current broker connection state
	pub fn is_connected(&self) -> bool {
		self.connection.is_connected()
	}

	/// Brings the broker connection up; `false` on timeout or in
	/// inert mode
	pub async fn connect(&self) -> bool {
		self.connection.connect().await
	}

	/// Stops the broker connection; see
	/// [`ConnectionManager::disconnect`]
	pub async fn disconnect(&self, force: bool) {
		self.connection.disconnect(force).await;
	}

	/// Registers a bridge event listener
	pub fn on_status(&self, listener: StatusListener) -> StatusSubscription {
		self.manager.on_status(listener)
	}

	/// Raw subscribe passthrough for topics outside the device scheme
	pub async fn subscribe(
		&self,
		pattern: &str,
		qos: QoS,
		handler: MessageHandler,
	) -> Option<HandlerId> {
		self.connection.subscribe(pattern, qos, handler).await
	}

	/// Raw unsubscribe passthrough
	pub async fn unsubscribe(&self, pattern: &str, id: HandlerId) {
		self.connection.unsubscribe(pattern, id).await;
	}

	/// Raw publish passthrough
	pub async fn publish(
		&self,
		topic: &str,
		payload: impl Into<Vec<u8>>,
		qos: QoS,
		retain: bool,
	) {
		self.connection.publish(topic, payload, qos, retain).await;
	}

	/// Resolves the identity's device set and starts telemetry and
	/// command-result subscriptions for every device not yet tracked.
	///
	/// Safe to call repeatedly; already tracked devices are left
	/// untouched. `force_refresh` bypasses the resolver cache, for
	/// use right after the identity's device set changed. Returns the
	/// resolved device ids.
	pub async fn start_for_identity(
		&self,
		identity_id: &str,
		force_refresh: bool,
	) -> Result<Vec<String>, ResolveError> {
		let devices = self.resolver.resolve(identity_id, force_refresh).await?;
		for device in devices.iter() {
			self.start_device(ArcStr::from(device.as_str()), identity_id)
				.await;
		}
		info!(
			identity_id = %identity_id,
			device_count = devices.len(),
			"Started identity"
		);
		Ok(devices.as_ref().clone())
	}

	/// Tracks one device and opens its subscriptions
	async fn start_device(&self, device_id: ArcStr, owner_id: &str) {
		let mut tracked = self.tracked.lock().await;
		if tracked.contains_key(&device_id) {
			debug!(device_id = %device_id, "Device already tracked");
			return;
		}
		self.manager.track_device(device_id.clone(), owner_id).await;

		let status_topic = self.config.status_topic(&device_id);
		let result_topic = self.config.command_result_topic(&device_id);
		let status_id = self
			.connection
			.subscribe(
				&status_topic,
				QoS::AtLeastOnce,
				self.telemetry_handler(device_id.clone()),
			)
			.await;
		let result_id = self
			.connection
			.subscribe(
				&result_topic,
				QoS::AtLeastOnce,
				self.command_result_handler(device_id.clone()),
			)
			.await;
		debug!(
			device_id = %device_id,
			status_topic = %status_topic,
			subscribed = status_id.is_some(),
			"Tracking device"
		);
		tracked.insert(
			device_id,
			DeviceSubscription {
				status_topic,
				status_id,
				result_topic,
				result_id,
			},
		);
	}

	/// Stops tracking one device and drops its subscriptions
	pub async fn stop_device(&self, device_id: &str) {
		let Some(subscription) =
			self.tracked.lock().await.remove(device_id)
		else {
			return;
		};
		self.drop_subscription(subscription).await;
		info!(device_id = %device_id, "Stopped tracking device");
	}

	/// Stops tracking every device and drops all their subscriptions
	pub async fn stop_all(&self) {
		let drained: Vec<DeviceSubscription> = {
			let mut tracked = self.tracked.lock().await;
			tracked.drain().map(|(_, subscription)| subscription).collect()
		};
		let count = drained.len();
		for subscription in drained {
			self.drop_subscription(subscription).await;
		}
		if count > 0 {
			info!(device_count = count, "Stopped tracking all devices");
		}
	}

	async fn drop_subscription(&self, subscription: DeviceSubscription) {
		if let Some(id) = subscription.status_id {
			self.connection
				.unsubscribe(&subscription.status_topic, id)
				.await;
		}
		if let Some(id) = subscription.result_id {
			self.connection
				.unsubscribe(&subscription.result_topic, id)
				.await;
		}
	}

	/// Device ids currently tracked
	pub async fn tracked_devices(&self) -> Vec<ArcStr> {
		self.tracked.lock().await.keys().cloned().collect()
	}

	/// Publishes a command to a device's control topic
	pub async fn send_command(
		&self,
		device_id: &str,
		payload: impl Into<Vec<u8>>,
	) {
		let topic = self.config.command_topic(device_id);
		self.connection
			.publish(&topic, payload, QoS::AtLeastOnce, false)
			.await;
	}

	/// Starts the liveness sweep at the configured interval. Idempotent.
	pub async fn start_sweep(&self) {
		let mut sweep = self.sweep.lock().await;
		if sweep.is_none() {
			*sweep = Some(self.manager.start_sweep(self.config.sweep_interval));
			info!(
				interval = ?self.config.sweep_interval,
				"Liveness sweep started"
			);
		}
	}

	/// Stops the liveness sweep if it is running
	pub async fn stop_sweep(&self) {
		if let Some(controller) = self.sweep.lock().await.take() {
			controller.shutdown().await;
			info!("Liveness sweep stopped");
		}
	}

	/// Full teardown: sweep, subscriptions, connection, ingestion.
	/// The bridge is unusable afterwards.
	pub async fn shutdown(&self) {
		self.stop_sweep().await;
		self.stop_all().await;
		self.connection.disconnect(true).await;
		if let Some(handle) = self.ingest_handle.lock().await.take() {
			handle.abort();
		}
		info!("Bridge shut down");
	}

	/// Handler forwarding a device's telemetry into the ingestion
	/// channel. Runs inside transport dispatch, so it only enqueues.
	fn telemetry_handler(&self, device_id: ArcStr) -> MessageHandler {
		let tx = self.ingest_tx.clone();
		Arc::new(move |message| {
			let item = IngestItem::Telemetry {
				device_id: device_id.clone(),
				payload: message.payload.clone(),
			};
			if tx.try_send(item).is_err() {
				warn!(
					device_id = %device_id,
					topic = %message.topic,
					"Ingestion channel full, telemetry message dropped"
				);
			}
		})
	}

	/// Handler forwarding command acknowledgements into the ingestion
	/// channel
	fn command_result_handler(&self, device_id: ArcStr) -> MessageHandler {
		let tx = self.ingest_tx.clone();
		Arc::new(move |message| {
			let item = IngestItem::CommandResult {
				device_id: device_id.clone(),
				payload: message.payload.clone(),
			};
			if tx.try_send(item).is_err() {
				warn!(
					device_id = %device_id,
					topic = %message.topic,
					"Ingestion channel full, command result dropped"
				);
			}
		})
	}

	/// Single consumer of the ingestion channel
	async fn ingest(
		mut rx: mpsc::Receiver<IngestItem>,
		manager: Arc<PrinterStatusManager>,
	) {
		while let Some(item) = rx.recv().await {
			match item {
				| IngestItem::Telemetry { device_id, payload } => {
					manager.handle_telemetry(&device_id, &payload).await;
				}
				| IngestItem::CommandResult { device_id, payload } => {
					manager.emit_command_result(device_id, payload);
				}
			}
		}
		debug!("Ingestion channel closed");
	}
}

impl Drop for PrinterBridge {
	fn drop(&mut self) {
		// Without this a dropped bridge leaks the ingestion task
		if let Ok(mut handle) = self.ingest_handle.try_lock() {
			if let Some(handle) = handle.take() {
				handle.abort();
			}
		}
	}
}
