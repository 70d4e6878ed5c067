//! In-process status fan-out
//!
//! Normalized status events are delivered to any number of in-process
//! listeners. Each registration returns a handle that owns its own
//! disposal; a panicking listener is isolated and never interrupts
//! delivery to the rest.

use std::{
	collections::HashMap,
	panic::{catch_unwind, AssertUnwindSafe},
	sync::{Arc, Mutex, PoisonError, Weak},
};

use arcstr::ArcStr;
use bytes::Bytes;
use tracing::{debug, error};

use crate::{status::DeviceStatus, telemetry::TelemetrySnapshot};

/// Event fanned out to bridge listeners
#[derive(Debug, Clone)]
pub enum BridgeEvent {
	/// A device's canonical status, with the normalized snapshot that
	/// produced it. Liveness-sweep demotions carry no snapshot.
	Status {
		/// Device the telemetry belongs to
		device_id: ArcStr,
		/// Canonical status derived from the snapshot
		status: DeviceStatus,
		/// Normalized telemetry, absent for sweep demotions
		snapshot: Option<Arc<TelemetrySnapshot>>,
	},
	/// Raw acknowledgement of an outbound command
	CommandResult {
		/// Device that acknowledged
		device_id: ArcStr,
		/// Raw acknowledgement payload
		payload: Bytes,
	},
}

/// Listener callback invoked for every bridge event
pub type StatusListener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
struct ListenerId(usize);

#[derive(Default)]
struct BusState {
	listeners: HashMap<ListenerId, StatusListener>,
	next_id: usize,
}

/// Fan-out bus for [`BridgeEvent`]s
#[derive(Default)]
pub struct ListenerBus {
	state: Arc<Mutex<BusState>>,
}

impl ListenerBus {
	/// Creates an empty bus
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a listener. The returned subscription removes it on
	/// drop or explicit [`StatusSubscription::cancel`].
	pub fn subscribe(&self, listener: StatusListener) -> StatusSubscription {
		let mut state =
			self.state.lock().unwrap_or_else(PoisonError::into_inner);
		let id = ListenerId(state.next_id);
		state.next_id = state.next_id.wrapping_add(1);
		state.listeners.insert(id, listener);
		StatusSubscription {
			bus: Arc::downgrade(&self.state),
			id,
		}
	}

	/// Number of registered listeners
	pub fn len(&self) -> usize {
		self.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.listeners
			.len()
	}

	/// True when no listener is registered
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Delivers an event to every listener. A panic in one listener
	/// is logged and must not prevent delivery to the others.
	pub fn emit(&self, event: &BridgeEvent) {
		// Snapshot the listener set so delivery runs without the lock;
		// a listener may register or cancel subscriptions itself.
		let listeners: Vec<StatusListener> = self
			.state
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.listeners
			.values()
			.cloned()
			.collect();
		for listener in listeners {
			let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
			if result.is_err() {
				error!("Status listener panicked, continuing fan-out");
			}
		}
	}
}

/// Handle owning one listener registration
#[derive(Debug)]
pub struct StatusSubscription {
	bus: Weak<Mutex<BusState>>,
	id: ListenerId,
}

impl StatusSubscription {
	/// Removes the listener now instead of at drop time
	pub fn cancel(self) {
		// Drop does the removal
	}

	fn remove(&self) {
		if let Some(state) = self.bus.upgrade() {
			let removed = state
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.listeners
				.remove(&self.id)
				.is_some();
			if removed {
				debug!(listener_id = ?self.id, "Status listener removed");
			}
		}
	}
}

impl Drop for StatusSubscription {
	fn drop(&mut self) {
		self.remove();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn status_event() -> BridgeEvent {
		BridgeEvent::Status {
			device_id: ArcStr::from("p1"),
			status: DeviceStatus::Idle,
			snapshot: None,
		}
	}

	fn counting_listener(hits: &Arc<AtomicUsize>) -> StatusListener {
		let hits = Arc::clone(hits);
		Arc::new(move |_| {
			hits.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[test]
	fn test_subscription_handle_disposal() {
		let bus = ListenerBus::new();
		let hits = Arc::new(AtomicUsize::new(0));

		let subscription = bus.subscribe(counting_listener(&hits));
		bus.emit(&status_event());
		assert_eq!(hits.load(Ordering::SeqCst), 1);

		subscription.cancel();
		bus.emit(&status_event());
		assert_eq!(hits.load(Ordering::SeqCst), 1);
		assert!(bus.is_empty());

		// Dropping the handle removes the listener too
		let dropped = bus.subscribe(counting_listener(&hits));
		drop(dropped);
		bus.emit(&status_event());
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_panicking_listener_is_isolated() {
		let bus = ListenerBus::new();
		let hits = Arc::new(AtomicUsize::new(0));

		let _panicking = bus.subscribe(Arc::new(|_| panic!("listener bug")));
		let _counting = bus.subscribe(counting_listener(&hits));
		bus.emit(&status_event());
		bus.emit(&status_event());
		assert_eq!(hits.load(Ordering::SeqCst), 2);
	}
}
