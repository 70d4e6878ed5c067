//! Broker connection management
//!
//! One [`ConnectionManager`] owns one physical MQTT connection: a
//! `rumqttc` client plus its polling task. Connect/close/offline/error
//! all converge into a single boolean connected signal published on a
//! `watch` channel, so `connect()` is idempotent and concurrent
//! callers await the same attempt. Without a configured broker the
//! manager is inert: every operation logs and no-ops instead of
//! failing the caller.

use std::{
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{Arc, Mutex, MutexGuard, Once, PoisonError},
	time::Duration,
};

use arcstr::ArcStr;
use rumqttc::{
	AsyncClient, Event::Incoming, Event::Outgoing, EventLoop, Packet, QoS,
};
use tokio::{sync::watch, task::JoinHandle, time};
use tracing::{debug, error, info, warn};

use crate::{
	config::BridgeConfig,
	error::BridgeError,
	routing::{HandlerId, InboundMessage, MessageHandler, SubscriptionRegistry},
	topic::TopicPattern,
};

/// Capacity of the rumqttc request channel
const EVENT_LOOP_CAPACITY: usize = 10;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

struct Transport {
	client: AsyncClient,
	/// True while callers want the connection up; gates polling
	desired_tx: watch::Sender<bool>,
	connected_rx: watch::Receiver<bool>,
	event_loop_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the single broker connection and the subscription registry
pub struct ConnectionManager {
	transport: Option<Transport>,
	registry: Arc<Mutex<SubscriptionRegistry>>,
	connect_timeout: Duration,
	inert_logged: Once,
}

impl ConnectionManager {
	/// Builds the manager from config. A missing broker URL selects
	/// inert mode; a malformed one is a construction error.
	pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
		let registry = Arc::new(Mutex::new(SubscriptionRegistry::new()));
		let Some(options) = config.mqtt_options()? else {
			return Ok(Self {
				transport: None,
				registry,
				connect_timeout: config.connect_timeout,
				inert_logged: Once::new(),
			});
		};

		let (client, event_loop) =
			AsyncClient::new(options, EVENT_LOOP_CAPACITY);
		let (desired_tx, desired_rx) = watch::channel(false);
		let (connected_tx, connected_rx) = watch::channel(false);

		let loop_client = client.clone();
		let loop_registry = Arc::clone(&registry);
		let event_loop_handle = tokio::spawn(async move {
			Self::run(
				event_loop,
				loop_client,
				desired_rx,
				connected_tx,
				loop_registry,
			)
			.await;
		});

		Ok(Self {
			transport: Some(Transport {
				client,
				desired_tx,
				connected_rx,
				event_loop_handle: Mutex::new(Some(event_loop_handle)),
			}),
			registry,
			connect_timeout: config.connect_timeout,
			inert_logged: Once::new(),
		})
	}

	/// True when running without a configured broker
	pub fn is_inert(&self) -> bool {
		self.transport.is_none()
	}

	/// Current connected signal, never blocking
	pub fn is_connected(&self) -> bool {
		self.transport
			.as_ref()
			.is_some_and(|transport| *transport.connected_rx.borrow())
	}

	fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
		self.registry.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Brings the connection up, resolving `true` once the broker
	/// acknowledged the session.
	///
	/// Idempotent: when already connected it returns immediately, and
	/// concurrent callers all await the same attempt through the
	/// shared connected signal. Resolves `false` on timeout, transport
	/// error, or inert mode; never errors.
	pub async fn connect(&self) -> bool {
		let Some(transport) = &self.transport else {
			self.inert_logged.call_once(|| {
				info!(
					"No broker endpoint configured, connection manager \
					 is inert"
				);
			});
			return false;
		};
		transport.desired_tx.send_replace(true);

		let mut connected_rx = transport.connected_rx.clone();
		if *connected_rx.borrow_and_update() {
			return true;
		}
		let wait_connected = async move {
			loop {
				if *connected_rx.borrow_and_update() {
					return true;
				}
				if connected_rx.changed().await.is_err() {
					return false;
				}
			}
		};
		match time::timeout(self.connect_timeout, wait_connected).await {
			| Ok(connected) => connected,
			| Err(_) => {
				warn!(
					timeout = ?self.connect_timeout,
					"Broker connect attempt timed out"
				);
				false
			}
		}
	}

	/// Stops the connection. With `force` the polling task is also
	/// aborted and the manager stays down for good; without it a later
	/// `connect()` resumes the session.
	pub async fn disconnect(&self, force: bool) {
		let Some(transport) = &self.transport else {
			return;
		};
		transport.desired_tx.send_replace(false);
		if let Err(err) = transport.client.disconnect().await {
			debug!(error = %err, "Disconnect request failed, link already down");
		}
		if force {
			let handle = transport
				.event_loop_handle
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.take();
			if let Some(handle) = handle {
				handle.abort();
				info!("Event loop task aborted");
			}
		}
	}

	/// Registers a handler for a topic pattern and subscribes it on
	/// the broker when the pattern is fresh.
	///
	/// Implicitly connects first; if no connection can be established
	/// (or the pattern is malformed) the call logs and returns `None`
	/// instead of erroring.
	pub async fn subscribe(
		&self,
		pattern: &str,
		qos: QoS,
		handler: MessageHandler,
	) -> Option<HandlerId> {
		let pattern = match TopicPattern::parse(pattern) {
			| Ok(pattern) => pattern,
			| Err(err) => {
				warn!(
					pattern = %pattern,
					error = %err,
					"Ignoring subscribe with invalid topic pattern"
				);
				return None;
			}
		};
		if !self.connect().await {
			debug!(
				pattern = %pattern,
				"Not connected, subscribe dropped"
			);
			return None;
		}
		let transport = self.transport.as_ref()?;

		let pattern_str = pattern.raw();
		let (fresh, id) = self.registry().add(pattern, qos, handler);
		if fresh {
			if let Err(err) = transport
				.client
				.subscribe(pattern_str.to_string(), qos)
				.await
			{
				// Roll back the registration so a retry starts clean
				self.registry().remove(&pattern_str, id);
				error!(
					topic = %pattern_str,
					error = ?err,
					"Failed to subscribe to MQTT topic"
				);
				return None;
			}
			debug!(topic = %pattern_str, "Subscribed to fresh topic pattern");
		}
		Some(id)
	}

	/// Removes one handler registration; unsubscribes on the broker
	/// when it was the pattern's last handler.
	pub async fn unsubscribe(&self, pattern: &str, id: HandlerId) {
		match self.registry().remove(pattern, id) {
			| None => {
				warn!(pattern = %pattern, id = ?id, "Unknown subscription");
			}
			| Some(false) => {}
			| Some(true) => self.broker_unsubscribe(pattern).await,
		}
	}

	/// Drops a pattern with all its handlers and unsubscribes it on
	/// the broker.
	pub async fn unsubscribe_pattern(&self, pattern: &str) {
		if self.registry().remove_pattern(pattern) {
			self.broker_unsubscribe(pattern).await;
		}
	}

	async fn broker_unsubscribe(&self, pattern: &str) {
		let Some(transport) = &self.transport else {
			return;
		};
		if !self.connect().await {
			debug!(
				pattern = %pattern,
				"Not connected, broker unsubscribe dropped"
			);
			return;
		}
		if let Err(err) =
			transport.client.unsubscribe(pattern.to_string()).await
		{
			error!(
				pattern = %pattern,
				error = ?err,
				"Failed to unsubscribe from MQTT topic pattern"
			);
		}
	}

	/// Publishes a message. Implicitly connects first and no-ops with
	/// a log when no connection is available; telemetry loss is
	/// acceptable, crashing the caller is not.
	pub async fn publish(
		&self,
		topic: &str,
		payload: impl Into<Vec<u8>>,
		qos: QoS,
		retain: bool,
	) {
		if !self.connect().await {
			debug!(topic = %topic, "Not connected, publish dropped");
			return;
		}
		let Some(transport) = &self.transport else {
			return;
		};
		if let Err(err) = transport
			.client
			.publish(topic.to_string(), qos, retain, payload.into())
			.await
		{
			error!(
				topic = %topic,
				error = ?err,
				"Failed to publish MQTT message"
			);
		}
	}

	/// Pattern strings currently subscribed
	pub fn active_patterns(&self) -> Vec<ArcStr> {
		self.registry().active_patterns()
	}

	/// Main polling loop. Publishes the connected signal, dispatches
	/// inbound messages, resubscribes after session loss, and backs
	/// off on transport errors. Parks while no caller wants the
	/// connection up.
	async fn run(
		mut event_loop: EventLoop,
		client: AsyncClient,
		mut desired_rx: watch::Receiver<bool>,
		connected_tx: watch::Sender<bool>,
		registry: Arc<Mutex<SubscriptionRegistry>>,
	) {
		let mut error_count: u32 = 0;
		loop {
			if !*desired_rx.borrow_and_update() {
				connected_tx.send_replace(false);
				if desired_rx.changed().await.is_err() {
					break;
				}
				continue;
			}
			tokio::select! {
				changed = desired_rx.changed() => {
					if changed.is_err() {
						break;
					}
				}
				event = event_loop.poll() => match event {
					| Ok(Incoming(Packet::ConnAck(ack))) => {
						error_count = 0;
						info!(
							session_present = ack.session_present,
							"Connected to broker"
						);
						connected_tx.send_replace(true);
						Self::resubscribe(&client, &registry).await;
					}
					| Ok(Incoming(Packet::Publish(publish))) => {
						error_count = 0;
						debug!(
							topic = %publish.topic,
							payload_size = publish.payload.len(),
							"Received MQTT message"
						);
						let message = InboundMessage {
							topic: ArcStr::from(publish.topic),
							payload: publish.payload,
						};
						Self::dispatch(&registry, &message);
					}
					| Ok(Incoming(Packet::Disconnect)) => {
						info!("Broker sent Disconnect");
						connected_tx.send_replace(false);
					}
					| Ok(Outgoing(rumqttc::Outgoing::Disconnect)) => {
						debug!("Sent Disconnect to broker");
						connected_tx.send_replace(false);
					}
					| Ok(notification) => {
						error_count = 0;
						debug!(
							notification = ?notification,
							"MQTT notification"
						);
					}
					| Err(err) => {
						connected_tx.send_replace(false);
						error_count = error_count.saturating_add(1);
						let delay = INITIAL_RETRY_DELAY
							* 2_u32.pow(error_count.saturating_sub(1).min(10));
						let delay = delay.min(MAX_RETRY_DELAY);
						warn!(
							error_count = error_count,
							delay = ?delay,
							error = %err,
							"MQTT event loop error, retrying"
						);
						time::sleep(delay).await;
					}
				}
			}
		}
		connected_tx.send_replace(false);
		info!("MQTT event loop terminated");
	}

	/// Replays active subscriptions after a fresh broker session
	async fn resubscribe(
		client: &AsyncClient,
		registry: &Arc<Mutex<SubscriptionRegistry>>,
	) {
		let subscriptions = registry
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.active_subscriptions();
		for (pattern, qos) in subscriptions {
			if let Err(err) =
				client.subscribe(pattern.to_string(), qos).await
			{
				error!(
					pattern = %pattern,
					error = ?err,
					"Failed to resubscribe after reconnect"
				);
			}
		}
	}

	/// Delivers a message to every handler whose pattern matches.
	/// A panicking handler is isolated and must not stop delivery to
	/// the rest.
	fn dispatch(
		registry: &Arc<Mutex<SubscriptionRegistry>>,
		message: &InboundMessage,
	) {
		let handlers = registry
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.handlers_matching(&message.topic);
		for handler in handlers {
			let result = catch_unwind(AssertUnwindSafe(|| handler(message)));
			if result.is_err() {
				error!(
					topic = %message.topic,
					"Message handler panicked, continuing dispatch"
				);
			}
		}
	}
}

impl Drop for ConnectionManager {
	fn drop(&mut self) {
		// The polling task holds no self-reference; aborting here
		// keeps dropped managers from leaking a reconnect loop.
		if let Some(transport) = &self.transport {
			let handle = transport
				.event_loop_handle
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.take();
			if let Some(handle) = handle {
				handle.abort();
			}
		}
	}
}
