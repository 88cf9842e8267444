//! Serializer registry
//!
//! Each resource type (`page`, `file`, `image`, ...) is backed by a [`Serializer`]:
//! a reader turning documents into resources, a content reader validating the
//! per-language content entries, and a metadata extractor feeding the search hook.
//!
//! Serializers come and go at runtime, so nothing may assume a type it knows about
//! now is still registered later. A missing serializer only ever means "this type
//! has no resources right now".

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
	domain::{Resource, ResourceContent, Site},
	error::Result,
	search::ResourceMetadata,
};

pub mod builtin;
pub mod document;

pub use builtin::register_builtins;
use document::ContentDocument;

/// Turns a stored document into a resource
pub trait ResourceReader: Send + Sync {
	fn read(&self, document: &[u8], site: &Site) -> Result<Resource>;
}

/// Validates and completes one `<content>` entry of a document
pub trait ResourceContentReader: Send + Sync {
	fn read(&self, content: ContentDocument, site: &Site) -> Result<ResourceContent>;
}

/// Derives the searchable fields of a resource
pub type MetadataExtractor = Arc<dyn Fn(&Resource) -> Vec<ResourceMetadata> + Send + Sync>;

/// Reader for documents in the common XML layout, delegating contents to a content reader
pub struct DocumentReader {
	resource_type: String,
	content_reader: Arc<dyn ResourceContentReader>,
}

impl DocumentReader {
	pub fn new(resource_type: impl Into<String>, content_reader: Arc<dyn ResourceContentReader>) -> Self {
		Self {
			resource_type: resource_type.into(),
			content_reader,
		}
	}
}

impl ResourceReader for DocumentReader {
	fn read(&self, bytes: &[u8], site: &Site) -> Result<Resource> {
		document::parse(bytes, &self.resource_type)?.into_resource(
			site,
			&self.resource_type,
			self.content_reader.as_ref(),
		)
	}
}

/// Everything needed to handle one resource type
pub struct Serializer {
	resource_type: String,
	reader: Arc<dyn ResourceReader>,
	content_reader: Arc<dyn ResourceContentReader>,
	metadata: MetadataExtractor,
}

impl fmt::Debug for Serializer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Serializer")
			.field("resource_type", &self.resource_type)
			.finish_non_exhaustive()
	}
}

impl Serializer {
	pub fn new(
		resource_type: impl Into<String>,
		reader: Arc<dyn ResourceReader>,
		content_reader: Arc<dyn ResourceContentReader>,
		metadata: MetadataExtractor,
	) -> Self {
		Self {
			resource_type: resource_type.into(),
			reader,
			content_reader,
			metadata,
		}
	}

	#[must_use]
	pub fn resource_type(&self) -> &str {
		&self.resource_type
	}

	/// Name of the directory holding this type's resources in a store
	#[must_use]
	pub fn directory(&self) -> String {
		format!("{}s", self.resource_type)
	}

	pub fn read(&self, document: &[u8], site: &Site) -> Result<Resource> {
		self.reader.read(document, site)
	}

	pub fn read_content(&self, content: ContentDocument, site: &Site) -> Result<ResourceContent> {
		self.content_reader.read(content, site)
	}

	pub fn write(&self, resource: &Resource) -> Result<String> {
		document::to_xml(resource)
	}

	#[must_use]
	pub fn metadata(&self, resource: &Resource) -> Vec<ResourceMetadata> {
		(self.metadata)(resource)
	}
}

/// Type keyed set of serializers, safe to change while others read from it
#[derive(Debug, Default)]
pub struct SerializerRegistry {
	serializers: RwLock<HashMap<String, Arc<Serializer>>>,
}

impl SerializerRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registry preloaded with the `page`, `file` and `image` serializers
	#[must_use]
	pub fn with_builtins() -> Self {
		let registry = Self::new();
		register_builtins(&registry);
		registry
	}

	/// Add a serializer, returning the one it replaced
	pub fn register(&self, serializer: Serializer) -> Option<Arc<Serializer>> {
		let resource_type = serializer.resource_type.clone();
		let replaced = self
			.serializers
			.write()
			.insert(resource_type.clone(), Arc::new(serializer));

		if replaced.is_some() {
			warn!(%resource_type, "Replaced an already registered serializer");
		} else {
			debug!(%resource_type, "Registered serializer");
		}

		replaced
	}

	pub fn deregister(&self, resource_type: &str) -> Option<Arc<Serializer>> {
		let removed = self.serializers.write().remove(resource_type);
		if removed.is_some() {
			debug!(%resource_type, "Deregistered serializer");
		}
		removed
	}

	#[must_use]
	pub fn get(&self, resource_type: &str) -> Option<Arc<Serializer>> {
		self.serializers.read().get(resource_type).cloned()
	}

	/// Registered type tags, sorted
	#[must_use]
	pub fn types(&self) -> Vec<String> {
		let mut types = self.serializers.read().keys().cloned().collect::<Vec<_>>();
		types.sort_unstable();
		types
	}

	/// Snapshot of the registered serializers, sorted by type
	#[must_use]
	pub fn serializers(&self) -> Vec<Arc<Serializer>> {
		let mut serializers = self.serializers.read().values().cloned().collect::<Vec<_>>();
		serializers.sort_unstable_by(|a, b| a.resource_type.cmp(&b.resource_type));
		serializers
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.serializers.read().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.serializers.read().is_empty()
	}
}
