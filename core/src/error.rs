//! Repository error types

use folio_utils::error::FileIOError;
use thiserror::Error;

/// Every failure a repository, its index or its codec can surface
#[derive(Error, Debug)]
pub enum RepositoryError {
	/// The locator matches neither the suffix nor the segmented grammar
	#[error("malformed locator: {0}")]
	MalformedLocator(String),

	/// The locator has the right shape but carries a token we can't interpret
	#[error("unparsable locator '{locator}': {reason}")]
	UnparsableLocator { locator: String, reason: String },

	/// No such path, identifier or version
	#[error("not found: {0}")]
	NotFound(String),

	/// A resource document exists but can't be turned into a resource
	#[error("failed to (de)serialize {resource}: {reason}")]
	Serialization { resource: String, reason: String },

	/// The backing store can't be reached
	#[error("repository at '{root}' is unavailable: {reason}")]
	Unavailable { root: String, reason: String },

	/// Anything that went wrong while populating a store from its archive
	#[error("bootstrap from archive failed: {0}")]
	Bootstrap(#[source] Box<RepositoryError>),

	#[error("illegal state: {0}")]
	IllegalState(String),

	#[error("duplicate entry: {0}")]
	Duplicate(String),

	#[error("no serializer registered for resource type '{0}'")]
	NoSerializer(String),

	#[error("resource {uri} is locked by '{owner}'")]
	Locked { uri: String, owner: String },

	/// A head describing content the store holds no payload for, or leaving out one it does
	#[error("content of {uri} doesn't match its payloads: {reason}")]
	ContentMismatch { uri: String, reason: String },

	#[error("invalid configuration: {0}")]
	Config(String),

	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("failed to encode index: {0}")]
	IndexEncode(#[from] rmp_serde::encode::Error),
	#[error("failed to decode index: {0}")]
	IndexDecode(#[from] rmp_serde::decode::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl RepositoryError {
	/// Shorthand for a serialization failure about some resource
	pub fn serialization(resource: impl ToString, reason: impl ToString) -> Self {
		Self::Serialization {
			resource: resource.to_string(),
			reason: reason.to_string(),
		}
	}

	/// Whether this is the expected "nothing there" outcome rather than a fault
	#[must_use]
	pub const fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepositoryError>;
