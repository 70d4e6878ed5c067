use std::{collections::HashMap, sync::Arc};

use arcstr::ArcStr;
use bytes::Bytes;
use rumqttc::QoS;

use crate::topic::TopicPattern;

/// A raw inbound broker message
#[derive(Debug, Clone)]
pub struct InboundMessage {
	/// Concrete topic the message arrived on
	pub topic: ArcStr,
	/// Raw payload bytes
	pub payload: Bytes,
}

/// Handler invoked for every message whose topic matches the
/// subscribed pattern. Must not block; heavy work belongs behind a
/// channel.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// A handler registration identifier
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub struct HandlerId(usize);

struct PatternEntry {
	pattern: TopicPattern,
	qos: QoS,
	handlers: HashMap<HandlerId, MessageHandler>,
}

/// Process-wide table of active pattern subscriptions and their
/// handlers.
///
/// `add` reports whether the pattern is fresh (needs a broker
/// SUBSCRIBE) and `remove` whether it became empty (needs a broker
/// UNSUBSCRIBE); the caller owns the broker side of both.
#[derive(Default)]
pub struct SubscriptionRegistry {
	entries: HashMap<ArcStr, PatternEntry>,
	next_id: usize,
}

impl SubscriptionRegistry {
	/// Creates an empty registry
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a handler for a pattern. Returns whether the pattern
	/// was not subscribed before, plus the handler's id. The QoS of
	/// the first registration wins for the broker subscription.
	pub fn add(
		&mut self,
		pattern: TopicPattern,
		qos: QoS,
		handler: MessageHandler,
	) -> (bool, HandlerId) {
		let id = HandlerId(self.next_id);
		self.next_id = self.next_id.wrapping_add(1);

		let key = pattern.raw();
		let fresh = !self.entries.contains_key(&key);
		let entry = self.entries.entry(key).or_insert_with(|| PatternEntry {
			pattern,
			qos,
			handlers: HashMap::new(),
		});
		entry.handlers.insert(id, handler);
		(fresh, id)
	}

	/// Removes one handler. Returns whether the pattern has no
	/// handlers left (and was dropped), or `None` if the registration
	/// was unknown.
	pub fn remove(&mut self, pattern: &str, id: HandlerId) -> Option<bool> {
		let entry = self.entries.get_mut(pattern)?;
		entry.handlers.remove(&id)?;
		if entry.handlers.is_empty() {
			self.entries.remove(pattern);
			return Some(true);
		}
		Some(false)
	}

	/// Drops a pattern and all its handlers. Returns true if it was
	/// present.
	pub fn remove_pattern(&mut self, pattern: &str) -> bool {
		self.entries.remove(pattern).is_some()
	}

	/// True if the pattern currently has at least one handler
	pub fn contains(&self, pattern: &str) -> bool {
		self.entries.contains_key(pattern)
	}

	/// All currently subscribed pattern strings
	pub fn active_patterns(&self) -> Vec<ArcStr> {
		self.entries.keys().cloned().collect()
	}

	/// Active patterns with the QoS to resubscribe them at
	pub fn active_subscriptions(&self) -> Vec<(ArcStr, QoS)> {
		self.entries
			.iter()
			.map(|(pattern, entry)| (pattern.clone(), entry.qos))
			.collect()
	}

	/// Number of active patterns
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// True when nothing is subscribed
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Handlers whose pattern matches the concrete topic. Clones the
	/// handler handles so the caller can dispatch without holding any
	/// registry lock.
	pub fn handlers_matching(&self, topic: &str) -> Vec<MessageHandler> {
		self.entries
			.values()
			.filter(|entry| entry.pattern.matches(topic))
			.flat_map(|entry| entry.handlers.values().cloned())
			.collect()
	}

	/// Removes every pattern, returning what was subscribed
	pub fn clear(&mut self) -> Vec<ArcStr> {
		let patterns = self.active_patterns();
		self.entries.clear();
		patterns
	}
}
