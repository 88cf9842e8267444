//! Repository event bus

use tokio::sync::broadcast;

use crate::domain::{Language, ResourceUri};

/// Default number of events kept for slow subscribers
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
	/// The repository's index is ready
	Connected { site: String },

	/// Resources were copied from the archive into an empty store
	Bootstrapped { resources: usize, revisions: usize },

	/// The index was rebuilt from the store
	Indexed { resources: usize, revisions: usize },

	/// A resource was written
	Stored(ResourceUri),

	ContentStored(ResourceUri, Language),

	ContentDeleted(ResourceUri, Language),

	Moved { from: ResourceUri, to: ResourceUri },

	Deleted(ResourceUri),

	Locked { uri: ResourceUri, user: String },

	Unlocked(ResourceUri),

	Disconnected { site: String },
}

/// Broadcasts [`RepositoryEvent`]s to whoever subscribed
#[derive(Debug)]
pub struct EventBus {
	sender: broadcast::Sender<RepositoryEvent>,
}

impl EventBus {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn emit(&self, event: RepositoryEvent) {
		// No receivers is fine
		let _ = self.sender.send(event);
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
		self.sender.subscribe()
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
