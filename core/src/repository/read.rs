use std::{
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use folio_utils::error::FileIOError;
use parking_lot::Mutex as SyncMutex;
use tokio::{
	fs,
	sync::{RwLock, RwLockMappedWriteGuard, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, info, warn};

use super::RepositoryState;
use crate::{
	domain::{Language, Resource, ResourceUri, Site},
	error::{RepositoryError, Result},
	events::{EventBus, RepositoryEvent},
	index::{RepositoryIndex, ResourceEnumerator},
	search::{NoopSearchHook, SearchHook},
	serializer::{Serializer, SerializerRegistry},
	store::{BackingStore, StoredDocument},
};

/// Serves one site's resources out of a backing store, through its index
pub struct ReadRepository<S> {
	site: Site,
	store: S,
	registry: Arc<SerializerRegistry>,
	search: Arc<dyn SearchHook>,
	index_location: PathBuf,
	index: RwLock<Option<RepositoryIndex>>,
	state: SyncMutex<RepositoryState>,
	indexing: AtomicBool,
	events: EventBus,
}

impl<S: BackingStore> std::fmt::Debug for ReadRepository<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReadRepository")
			.field("site", &self.site.identifier)
			.field("store", &self.store)
			.field("state", &*self.state.lock())
			.finish_non_exhaustive()
	}
}

impl<S: BackingStore> ReadRepository<S> {
	pub fn new(
		site: Site,
		store: S,
		registry: Arc<SerializerRegistry>,
		index_location: impl Into<PathBuf>,
	) -> Self {
		Self {
			site,
			store,
			registry,
			search: Arc::new(NoopSearchHook),
			index_location: index_location.into(),
			index: RwLock::new(None),
			state: SyncMutex::new(RepositoryState::Disconnected),
			indexing: AtomicBool::new(false),
			events: EventBus::default(),
		}
	}

	#[must_use]
	pub fn with_search_hook(mut self, search: Arc<dyn SearchHook>) -> Self {
		self.search = search;
		self
	}

	#[must_use]
	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.events = EventBus::new(capacity);
		self
	}

	/// Open the store and get an index for it, loading the persisted one or building a new one
	///
	/// A failed build leaves no index behind, neither in memory nor on disk.
	pub async fn connect(&self) -> Result<()> {
		let state = self.state();
		if state != RepositoryState::Disconnected {
			return Err(RepositoryError::IllegalState(format!(
				"can't connect a repository that is {state}"
			)));
		}

		let root = self.store.root();
		match fs::metadata(root).await {
			Ok(metadata) if metadata.is_dir() => {}
			Ok(_) => {
				return Err(RepositoryError::Unavailable {
					root: root.display().to_string(),
					reason: "not a directory".to_string(),
				})
			}
			Err(e) => {
				return Err(RepositoryError::Unavailable {
					root: root.display().to_string(),
					reason: e.to_string(),
				})
			}
		}

		let index = match RepositoryIndex::load(
			&self.site.identifier,
			&self.index_location,
			Arc::clone(&self.registry),
			Arc::clone(&self.search),
		)
		.await?
		{
			Some(index) => index,
			None => {
				info!(site = %self.site.identifier, "Building index from store");
				let mut index = self.create_index(&self.index_location);
				index.build(self).await?;
				index
			}
		};

		let (resources, revisions) = (index.resource_count(), index.revision_count());
		*self.index.write().await = Some(index);
		self.set_state(RepositoryState::Connected);
		info!(
			site = %self.site.identifier,
			root = %root.display(),
			resources,
			revisions,
			"Connected repository"
		);
		self.events.emit(RepositoryEvent::Connected {
			site: self.site.identifier.clone(),
		});

		Ok(())
	}

	pub fn start(&self) -> Result<()> {
		let mut state = self.state.lock();
		match *state {
			RepositoryState::Connected | RepositoryState::Stopped => {
				*state = RepositoryState::Started;
				debug!(site = %self.site.identifier, "Started repository");
				Ok(())
			}
			other => Err(RepositoryError::IllegalState(format!(
				"can't start a repository that is {other}"
			))),
		}
	}

	pub fn stop(&self) -> Result<()> {
		let mut state = self.state.lock();
		match *state {
			RepositoryState::Started => {
				*state = RepositoryState::Stopped;
				debug!(site = %self.site.identifier, "Stopped repository");
				Ok(())
			}
			other => Err(RepositoryError::IllegalState(format!(
				"can't stop a repository that is {other}"
			))),
		}
	}

	/// Persist and let go of the index
	pub async fn disconnect(&self) -> Result<()> {
		let index = self.index.write().await.take();
		self.set_state(RepositoryState::Disconnected);

		if let Some(index) = index {
			index.close().await?;
			info!(site = %self.site.identifier, "Disconnected repository");
			self.events.emit(RepositoryEvent::Disconnected {
				site: self.site.identifier.clone(),
			});
		}

		Ok(())
	}

	#[must_use]
	pub fn state(&self) -> RepositoryState {
		*self.state.lock()
	}

	#[must_use]
	pub const fn site(&self) -> &Site {
		&self.site
	}

	#[must_use]
	pub fn registry(&self) -> &Arc<SerializerRegistry> {
		&self.registry
	}

	#[must_use]
	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RepositoryEvent> {
		self.events.subscribe()
	}

	/// Whether the repository refuses writes right now
	#[must_use]
	pub fn is_read_only(&self) -> bool {
		self.store.is_read_only() || self.is_indexing()
	}

	#[must_use]
	pub fn is_indexing(&self) -> bool {
		self.indexing.load(Ordering::Acquire)
	}

	pub async fn exists(&self, uri: &ResourceUri) -> Result<bool> {
		Ok(self.read_index().await?.exists(uri))
	}

	pub async fn exists_in_any_version(&self, uri: &ResourceUri) -> Result<bool> {
		Ok(self.read_index().await?.exists_in_any_version(uri))
	}

	/// The resource version `uri` points at
	///
	/// Looks the resource up by path first and falls back to its identifier.
	pub async fn get(&self, uri: &ResourceUri) -> Result<Option<Resource>> {
		let Some(resolved) = self.read_index().await?.resolve_uri(uri) else {
			debug!(%uri, "Resource not found");
			return Ok(None);
		};

		self.read_resource(&resolved).await
	}

	/// One URI per stored version of the resource, in version order
	pub async fn get_versions(&self, uri: &ResourceUri) -> Result<Vec<ResourceUri>> {
		let index = self.read_index().await?;
		let Some(identifier) = index.get_identifier(uri) else {
			return Ok(Vec::new());
		};

		Ok(index
			.entry(&identifier)
			.map(|entry| {
				entry
					.versions()
					.map(|version| entry.uri(&self.site.identifier, version))
					.collect()
			})
			.unwrap_or_default())
	}

	/// Current URI of the resource with `identifier`
	pub async fn get_resource_uri(&self, identifier: &str) -> Result<Option<ResourceUri>> {
		Ok(self.read_index().await?.to_uri(identifier))
	}

	/// URIs of every readable resource version in the store
	///
	/// Documents that fail to load are logged and left out.
	pub async fn list_resources(&self) -> Result<Vec<ResourceUri>> {
		Ok(load_resources(&self.store, &self.registry, &self.site)
			.await?
			.into_iter()
			.map(|resource| resource.uri)
			.collect())
	}

	/// Open the payload of `uri`'s content in `language`
	///
	/// The returned file is owned by the caller and closed when dropped.
	pub async fn load_resource_content(
		&self,
		uri: &ResourceUri,
		language: &Language,
	) -> Result<Option<fs::File>> {
		let Some(resolved) = self.read_index().await?.resolve_uri(uri) else {
			debug!(%uri, "Resource not found");
			return Ok(None);
		};

		self.store.open_content(&resolved, language).await
	}

	/// Current resources at most `level` path segments below `prefix`
	pub async fn list(&self, prefix: &str, level: usize) -> Result<Vec<ResourceUri>> {
		Ok(self.read_index().await?.list(prefix, level))
	}

	pub async fn resource_count(&self) -> Result<usize> {
		Ok(self.read_index().await?.resource_count())
	}

	pub async fn revision_count(&self) -> Result<usize> {
		Ok(self.read_index().await?.revision_count())
	}

	pub(crate) const fn store(&self) -> &S {
		&self.store
	}

	pub(crate) fn index_location(&self) -> &Path {
		&self.index_location
	}

	pub(crate) const fn events(&self) -> &EventBus {
		&self.events
	}

	pub(crate) fn set_state(&self, state: RepositoryState) {
		*self.state.lock() = state;
	}

	pub(crate) fn set_indexing(&self, indexing: bool) {
		self.indexing.store(indexing, Ordering::Release);
	}

	pub(crate) fn create_index(&self, location: &Path) -> RepositoryIndex {
		RepositoryIndex::create(
			&self.site.identifier,
			location,
			Arc::clone(&self.registry),
			Arc::clone(&self.search),
		)
	}

	pub(crate) async fn read_index(&self) -> Result<RwLockReadGuard<'_, RepositoryIndex>> {
		RwLockReadGuard::try_map(self.index.read().await, Option::as_ref)
			.map_err(|_| self.not_connected())
	}

	pub(crate) async fn write_index(&self) -> Result<RwLockMappedWriteGuard<'_, RepositoryIndex>> {
		RwLockWriteGuard::try_map(self.index.write().await, Option::as_mut)
			.map_err(|_| self.not_connected())
	}

	pub(crate) async fn take_index(&self) -> Option<RepositoryIndex> {
		self.index.write().await.take()
	}

	/// Load a resource from the store by its fully resolved URI
	pub(crate) async fn read_resource(&self, uri: &ResourceUri) -> Result<Option<Resource>> {
		let serializer = self.serializer_for(uri)?;
		let Some(serializer) = serializer else {
			return Ok(None);
		};

		let Some(bytes) = self.store.read_document(uri).await? else {
			warn!(%uri, "Indexed resource has no document in the store");
			return Ok(None);
		};

		let mut resource = serializer.read(&bytes, &self.site)?;
		complete_uri(&mut resource, uri);
		Ok(Some(resource))
	}

	fn serializer_for(&self, uri: &ResourceUri) -> Result<Option<Arc<Serializer>>> {
		let resource_type = uri.resource_type().ok_or_else(|| {
			RepositoryError::IllegalState(format!("{uri} has no type"))
		})?;

		let serializer = self.registry.get(resource_type);
		if serializer.is_none() {
			warn!(%uri, "No serializer for '{resource_type}', treating the resource as missing");
		}
		Ok(serializer)
	}

	fn not_connected(&self) -> RepositoryError {
		RepositoryError::IllegalState(format!(
			"repository for site '{}' is not connected",
			self.site.identifier
		))
	}
}

#[async_trait]
impl<S: BackingStore> ResourceEnumerator for ReadRepository<S> {
	async fn enumerate(&self) -> Result<Vec<Resource>> {
		load_resources(&self.store, &self.registry, &self.site).await
	}
}

/// Fill in what the document doesn't say about itself from where it was found
fn complete_uri(resource: &mut Resource, uri: &ResourceUri) {
	resource.uri.version = uri.version;
	if uri.identifier.is_some() {
		resource.uri.identifier.clone_from(&uri.identifier);
	}
	if resource.uri.path.is_none() {
		resource.uri.path.clone_from(&uri.path);
	}
	if resource.uri.resource_type.is_none() {
		resource.uri.resource_type.clone_from(&uri.resource_type);
	}
}

/// Every resource version `store` holds for a registered type, skipping broken documents
pub(crate) async fn load_resources<S>(
	store: &S,
	registry: &SerializerRegistry,
	site: &Site,
) -> Result<Vec<Resource>>
where
	S: BackingStore + ?Sized,
{
	let mut resources = Vec::new();

	for serializer in registry.serializers() {
		let documents = store.list_documents(&serializer.directory()).await?;
		let found = documents.len();

		for document in documents {
			match load_document(&serializer, &document, site).await {
				Ok(resource) => resources.push(resource),
				Err(e) => warn!(
					file = %document.file.display(),
					resource_type = serializer.resource_type(),
					"Skipping unreadable document: {e:#}"
				),
			}
		}

		debug!(
			site = %site.identifier,
			resource_type = serializer.resource_type(),
			documents = found,
			"Enumerated resources"
		);
	}

	Ok(resources)
}

async fn load_document(serializer: &Serializer, document: &StoredDocument, site: &Site) -> Result<Resource> {
	let bytes = fs::read(&document.file)
		.await
		.map_err(|e| FileIOError::from((&document.file, e, "reading resource document")))?;

	let mut resource = serializer.read(&bytes, site)?;
	if resource.version() != document.version {
		debug!(
			file = %document.file.display(),
			stated = %resource.version(),
			stored = %document.version,
			"Document version differs from its location, going with the location"
		);
	}
	resource.uri.version = document.version;
	if resource.uri.path.is_none() {
		resource.uri.path.clone_from(&document.path);
	}
	Ok(resource)
}
