//! Bridge configuration

use std::time::Duration;

use rand::{distributions::Alphanumeric, Rng};
use rumqttc::MqttOptions;

use crate::error::BridgeError;

/// Broker credentials
#[derive(Debug, Clone)]
pub struct Credentials {
	/// Username sent in CONNECT
	pub username: String,
	/// Password sent in CONNECT
	pub password: String,
}

/// Configuration for a [`crate::PrinterBridge`].
///
/// Everything is optional with documented defaults; a missing
/// `broker_url` puts the connection into inert mode instead of
/// failing startup.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
	/// Broker endpoint, e.g. `mqtt://broker.example.com:1883`.
	/// `None` selects inert mode.
	pub broker_url: Option<String>,
	/// Optional broker credentials
	pub credentials: Option<Credentials>,
	/// Stable client-identity seed, usually the owning identity.
	/// A random suffix is appended per session so concurrently open
	/// sessions of the same identity do not collide.
	pub client_id_seed: String,
	/// MQTT keep-alive period. Default 10s.
	pub keep_alive: Duration,
	/// How long `connect()` waits for the broker before resolving
	/// false. Default 10s.
	pub connect_timeout: Duration,
	/// Silence window after which a device is demoted to
	/// `disconnected`. Default 30s.
	pub liveness_timeout: Duration,
	/// Interval of the liveness sweep. Default 10s.
	pub sweep_interval: Duration,
	/// Lifetime of cached identity device sets. Default 60s.
	pub resolver_ttl: Duration,
	/// Topic prefix for inbound telemetry. Default `status`.
	pub status_topic_prefix: String,
	/// Topic prefix for outbound commands. Default `control`.
	pub command_topic_prefix: String,
	/// Topic prefix for command acknowledgements. Default
	/// `control-result`.
	pub command_result_topic_prefix: String,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			broker_url: None,
			credentials: None,
			client_id_seed: "printer-bridge".to_string(),
			keep_alive: Duration::from_secs(10),
			connect_timeout: Duration::from_secs(10),
			liveness_timeout: Duration::from_secs(30),
			sweep_interval: Duration::from_secs(10),
			resolver_ttl: Duration::from_secs(60),
			status_topic_prefix: "status".to_string(),
			command_topic_prefix: "control".to_string(),
			command_result_topic_prefix: "control-result".to_string(),
		}
	}
}

impl BridgeConfig {
	/// Config pointed at a broker URL
	pub fn with_broker(url: impl Into<String>) -> Self {
		Self {
			broker_url: Some(url.into()),
			..Self::default()
		}
	}

	/// Config without a broker; all connection operations no-op
	pub fn inert() -> Self {
		Self::default()
	}

	/// Sets the client-identity seed
	pub fn client_id_seed(mut self, seed: impl Into<String>) -> Self {
		self.client_id_seed = seed.into();
		self
	}

	/// Sets broker credentials
	pub fn credentials(
		mut self,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		self.credentials = Some(Credentials {
			username: username.into(),
			password: password.into(),
		});
		self
	}

	/// Unique-per-session client identity: seed plus random suffix
	pub fn session_client_id(&self) -> String {
		let suffix: String = rand::thread_rng()
			.sample_iter(&Alphanumeric)
			.take(8)
			.map(char::from)
			.collect();
		format!("{}-{}", self.client_id_seed, suffix)
	}

	/// Telemetry topic for one device
	pub fn status_topic(&self, device_id: &str) -> String {
		format!("{}/{}", self.status_topic_prefix, device_id)
	}

	/// Command topic for one device
	pub fn command_topic(&self, device_id: &str) -> String {
		format!("{}/{}", self.command_topic_prefix, device_id)
	}

	/// Command-acknowledgement topic for one device
	pub fn command_result_topic(&self, device_id: &str) -> String {
		format!("{}/{}", self.command_result_topic_prefix, device_id)
	}

	/// Builds transport options, or `None` in inert mode
	pub(crate) fn mqtt_options(
		&self,
	) -> Result<Option<MqttOptions>, BridgeError> {
		let Some(url) = &self.broker_url else {
			return Ok(None);
		};
		// rumqttc's URL parser requires the client id as a query
		// parameter; append the session identity unless the caller
		// pinned one explicitly.
		let url = if url.contains("client_id=") {
			url.clone()
		} else if url.contains('?') {
			format!("{}&client_id={}", url, self.session_client_id())
		} else {
			format!("{}?client_id={}", url, self.session_client_id())
		};
		let mut options = MqttOptions::parse_url(url.as_str())?;
		options.set_keep_alive(self.keep_alive);
		options.set_clean_session(false);
		if let Some(credentials) = &self.credentials {
			options.set_credentials(
				credentials.username.clone(),
				credentials.password.clone(),
			);
		}
		Ok(Some(options))
	}
}
