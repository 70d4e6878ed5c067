//! Identity to device-set resolution
//!
//! The bridge subscribes one status topic per device an identity owns.
//! Resolution is a caller-injected concern; [`CachedDeviceResolver`]
//! wraps any resolver with a short TTL cache and a force-refresh
//! escape hatch for "just registered a new device" flows.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Default cache lifetime for resolved device sets
pub const DEFAULT_RESOLVER_TTL: Duration = Duration::from_secs(60);

/// Errors that can occur while resolving an identity's devices
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
	/// The backing source could not produce a device set
	#[error("could not resolve devices for identity '{identity_id}': {reason}")]
	Unavailable {
		/// Identity being resolved
		identity_id: String,
		/// Backend-specific failure description
		reason: String,
	},
}

impl ResolveError {
	/// Creates a new Unavailable error
	pub fn unavailable(
		identity_id: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::Unavailable {
			identity_id: identity_id.into(),
			reason: reason.into(),
		}
	}
}

/// Resolves an owning identity to the set of device ids it owns
#[async_trait]
pub trait DeviceSetResolver: Send + Sync {
	/// Returns the device ids owned by `identity_id`
	async fn devices_for_identity(
		&self,
		identity_id: &str,
	) -> Result<Vec<String>, ResolveError>;
}

/// Fixed identity to device-set mapping, for tests and demos
#[derive(Default)]
pub struct StaticDeviceResolver {
	devices: HashMap<String, Vec<String>>,
}

impl StaticDeviceResolver {
	/// Creates an empty resolver
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces the device set for an identity
	pub fn with_identity(
		mut self,
		identity_id: impl Into<String>,
		devices: impl IntoIterator<Item = impl Into<String>>,
	) -> Self {
		self.devices.insert(
			identity_id.into(),
			devices.into_iter().map(Into::into).collect(),
		);
		self
	}
}

#[async_trait]
impl DeviceSetResolver for StaticDeviceResolver {
	async fn devices_for_identity(
		&self,
		identity_id: &str,
	) -> Result<Vec<String>, ResolveError> {
		self.devices.get(identity_id).cloned().ok_or_else(|| {
			ResolveError::unavailable(identity_id, "unknown identity")
		})
	}
}

struct CacheSlot {
	fetched_at: Instant,
	devices: Arc<Vec<String>>,
}

/// TTL cache in front of a [`DeviceSetResolver`]
pub struct CachedDeviceResolver {
	inner: Arc<dyn DeviceSetResolver>,
	ttl: Duration,
	cache: Mutex<HashMap<String, CacheSlot>>,
}

impl CachedDeviceResolver {
	/// Wraps `inner` with a cache of the given lifetime
	pub fn new(inner: Arc<dyn DeviceSetResolver>, ttl: Duration) -> Self {
		Self {
			inner,
			ttl,
			cache: Mutex::new(HashMap::new()),
		}
	}

	/// Resolves an identity's device set, served from cache while the
	/// TTL holds. `force_refresh` bypasses and replaces the cached
	/// entry. A failed refresh does not evict a previously cached set.
	pub async fn resolve(
		&self,
		identity_id: &str,
		force_refresh: bool,
	) -> Result<Arc<Vec<String>>, ResolveError> {
		if !force_refresh {
			let cache = self.cache.lock().await;
			if let Some(slot) = cache.get(identity_id) {
				if slot.fetched_at.elapsed() < self.ttl {
					return Ok(Arc::clone(&slot.devices));
				}
			}
		}
		let devices =
			Arc::new(self.inner.devices_for_identity(identity_id).await?);
		debug!(
			identity_id = %identity_id,
			device_count = devices.len(),
			force_refresh = force_refresh,
			"Resolved device set"
		);
		let mut cache = self.cache.lock().await;
		cache.insert(
			identity_id.to_string(),
			CacheSlot {
				fetched_at: Instant::now(),
				devices: Arc::clone(&devices),
			},
		);
		Ok(devices)
	}

	/// Drops the cached entry for an identity
	pub async fn invalidate(&self, identity_id: &str) {
		self.cache.lock().await.remove(identity_id);
	}
}
