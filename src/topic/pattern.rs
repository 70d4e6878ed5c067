use std::fmt;

use arcstr::ArcStr;
use thiserror::Error;

/// Errors that can occur while parsing a topic pattern
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicPatternError {
	/// Pattern string is empty
	#[error("Topic pattern cannot be empty")]
	EmptyPattern,

	/// `#` wildcard appeared before the final segment
	#[error("Multi-level wildcard '#' must be the final segment in '{pattern}'")]
	HashNotLast { pattern: String },
}

impl TopicPatternError {
	/// Creates a new HashNotLast error
	pub fn hash_not_last(pattern: impl Into<String>) -> Self {
		Self::HashNotLast {
			pattern: pattern.into(),
		}
	}
}

/// One `/`-delimited segment of a parsed topic pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPatternItem {
	/// Literal segment, matched by string equality
	Str(String),
	/// `+` wildcard, matches exactly one non-empty segment
	Plus,
	/// `#` wildcard, matches the remainder of the topic (zero or more segments)
	Hash,
}

impl fmt::Display for TopicPatternItem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			| TopicPatternItem::Str(s) => write!(f, "{}", s),
			| TopicPatternItem::Plus => write!(f, "+"),
			| TopicPatternItem::Hash => write!(f, "#"),
		}
	}
}

/// A parsed topic pattern, e.g. `status/+` or `devices/#`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
	raw: ArcStr,
	items: Vec<TopicPatternItem>,
}

impl TopicPattern {
	/// Parses a `/`-delimited pattern string.
	///
	/// `+` and `#` are only recognized as whole segments; a segment like
	/// `a+b` is treated as a literal. `#` must be the final segment.
	pub fn parse(pattern: impl Into<ArcStr>) -> Result<Self, TopicPatternError> {
		let raw: ArcStr = pattern.into();
		if raw.is_empty() {
			return Err(TopicPatternError::EmptyPattern);
		}
		let segments: Vec<&str> = raw.split('/').collect();
		let last = segments.len() - 1;
		let mut items = Vec::with_capacity(segments.len());
		for (position, segment) in segments.iter().enumerate() {
			let item = match *segment {
				| "+" => TopicPatternItem::Plus,
				| "#" => {
					if position != last {
						return Err(TopicPatternError::hash_not_last(
							raw.as_str(),
						));
					}
					TopicPatternItem::Hash
				}
				| s => TopicPatternItem::Str(s.to_string()),
			};
			items.push(item);
		}
		Ok(Self { raw, items })
	}

	/// The original pattern string
	pub fn as_str(&self) -> &str {
		self.raw.as_str()
	}

	/// The original pattern as shared string
	pub fn raw(&self) -> ArcStr {
		self.raw.clone()
	}

	/// Parsed pattern segments
	pub fn items(&self) -> &[TopicPatternItem] {
		&self.items
	}

	/// Returns true if the pattern contains a `+` or `#` wildcard
	pub fn is_wildcard(&self) -> bool {
		self.items
			.iter()
			.any(|item| !matches!(item, TopicPatternItem::Str(_)))
	}

	/// Matches this pattern against a concrete topic string.
	///
	/// Without a trailing `#` the topic must have exactly as many segments
	/// as the pattern; a `+` segment requires one non-empty topic segment.
	pub fn matches(&self, topic: &str) -> bool {
		let mut segments = topic.split('/');
		for item in &self.items {
			match item {
				| TopicPatternItem::Hash => return true,
				| TopicPatternItem::Plus => match segments.next() {
					| Some(segment) if !segment.is_empty() => {}
					| _ => return false,
				},
				| TopicPatternItem::Str(expected) => match segments.next() {
					| Some(segment) if segment == expected => {}
					| _ => return false,
				},
			}
		}
		segments.next().is_none()
	}
}

impl fmt::Display for TopicPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.raw)
	}
}

/// Matches a pattern string against a concrete topic.
///
/// Pure and infallible: a malformed pattern simply fails to match.
pub fn matches(pattern: &str, topic: &str) -> bool {
	match TopicPattern::parse(pattern) {
		| Ok(pattern) => pattern.matches(topic),
		| Err(_) => false,
	}
}
