use std::{ops::Deref, path::PathBuf, sync::Arc};

use chrono::Utc;
use folio_utils::error::report_error;
use futures::future::try_join_all;
use tokio::{io::AsyncRead, sync::Mutex};
use tracing::{debug, info, warn};

use super::ReadRepository;
use crate::{
	domain::{
		normalize_path, Language, Modification, Publication, Resource, ResourceContent,
		ResourceUri, Site, Version,
	},
	error::{RepositoryError, Result},
	events::RepositoryEvent,
	search::SearchHook,
	serializer::{builtin::PAGE, SerializerRegistry},
	store::{ArchiveStore, BackingStore, FilesystemStore},
};

const REBUILD_SUFFIX: &str = ".rebuild";

/// A repository taking writes, backed by a [`FilesystemStore`]
///
/// Every mutation runs under one lock, which a full reindex holds for its whole duration.
/// Reads go straight to the [`ReadRepository`] this derefs to.
#[derive(Debug)]
pub struct WritableRepository {
	pub(super) inner: ReadRepository<FilesystemStore>,
	pub(super) archive: Option<ArchiveStore>,
	pub(super) create_homepage: bool,
	pub(super) mutation: Mutex<()>,
}

impl Deref for WritableRepository {
	type Target = ReadRepository<FilesystemStore>;

	fn deref(&self) -> &Self::Target {
		&self.inner
	}
}

impl WritableRepository {
	pub fn new(
		site: Site,
		store: FilesystemStore,
		registry: Arc<SerializerRegistry>,
		index_location: impl Into<PathBuf>,
	) -> Self {
		Self {
			inner: ReadRepository::new(site, store, registry, index_location),
			archive: None,
			create_homepage: false,
			mutation: Mutex::new(()),
		}
	}

	/// Archive to populate an empty store from
	#[must_use]
	pub fn with_archive(mut self, archive: ArchiveStore) -> Self {
		self.archive = Some(archive);
		self
	}

	#[must_use]
	pub const fn with_homepage(mut self, create_homepage: bool) -> Self {
		self.create_homepage = create_homepage;
		self
	}

	#[must_use]
	pub fn with_search_hook(mut self, search: Arc<dyn SearchHook>) -> Self {
		self.inner = self.inner.with_search_hook(search);
		self
	}

	#[must_use]
	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.inner = self.inner.with_event_capacity(capacity);
		self
	}

	/// Connect the store, populate it from the archive when empty and make sure there's a homepage
	pub async fn connect(&self) -> Result<()> {
		self.store().ensure_root().await?;
		self.inner.connect().await?;

		let _mutation = self.mutation.lock().await;
		self.bootstrap_locked().await?;

		if self.create_homepage {
			self.create_homepage_locked().await?;
		}

		Ok(())
	}

	/// Store `resource`'s head at its path and version, handing it back with its identifier
	///
	/// A resource locked by someone other than its [editor](crate::domain::ResourceHead::editor)
	/// is refused. Content descriptions have to match the stored payloads; they change
	/// through [`put_content`](Self::put_content) and [`delete_content`](Self::delete_content).
	pub async fn put(&self, resource: Resource) -> Result<Resource> {
		let _mutation = self.mutation.lock().await;
		self.store_resource(resource).await
	}

	/// Attach the payload for one language to a stored resource
	pub async fn put_content<R>(&self, uri: &ResourceUri, content: ResourceContent, data: R) -> Result<Resource>
	where
		R: AsyncRead + Unpin + Send,
	{
		let _mutation = self.mutation.lock().await;
		self.store_content(uri, content, data).await
	}

	/// Remove the content for `language`, payload included
	pub async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<Resource> {
		let _mutation = self.mutation.lock().await;

		let resolved = self
			.read_index()
			.await?
			.resolve_uri(uri)
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;
		let mut resource = self
			.read_resource(&resolved)
			.await?
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;

		let described = resource.remove_content(language).is_some();
		let stored = self.store().delete_content(&resolved, language).await?;
		if !described && !stored {
			return Err(RepositoryError::NotFound(format!("{uri} has no '{language}' content")));
		}

		self.write_document(&resource).await?;
		let mut index = self.write_index().await?;
		index.update(&resource)?;
		index.flush().await?;
		drop(index);

		self.events()
			.emit(RepositoryEvent::ContentDeleted(resolved, language.clone()));
		Ok(resource)
	}

	/// Move the resource, along with everything below it, to `target`
	///
	/// Published and draft versions change path, archived revisions keep theirs. Returns
	/// `false` if there is nothing at `uri`.
	pub async fn move_to(&self, uri: &ResourceUri, target: &str) -> Result<bool> {
		let _mutation = self.mutation.lock().await;
		let mut index = self.write_index().await?;

		let Some(resolved) = index.resolve_uri(uri) else {
			debug!(%uri, "Nothing to move");
			return Ok(false);
		};
		let source = resolved
			.path
			.clone()
			.ok_or_else(|| RepositoryError::IllegalState(format!("{resolved} has no path")))?;
		let target = normalize_path(target);

		if source == target {
			return Ok(true);
		}
		if rebase(&target, &source, "/").is_some() {
			return Err(RepositoryError::IllegalState(format!(
				"can't move {source} below itself to {target}"
			)));
		}

		let site = &self.site().identifier;
		let mut identifiers = vec![resolved.identifier.clone().unwrap_or_default()];
		identifiers.extend(
			index
				.list(&source, usize::MAX)
				.into_iter()
				.filter_map(|child| child.identifier),
		);

		let mut moves = Vec::new();
		for identifier in identifiers {
			let Some(entry) = index.entry(&identifier) else {
				continue;
			};
			for version in entry.versions().filter(|v| !matches!(v, Version::Revision(_))) {
				let Some(moved) = entry
					.path_of(version)
					.and_then(|path| rebase(path, &source, &target))
				else {
					continue;
				};

				if let Some(owner) = index.path_owner(&moved, version) {
					if owner != identifier {
						return Err(RepositoryError::Duplicate(format!(
							"{moved} is already bound to {owner} in version {version}"
						)));
					}
				}
				moves.push((entry.uri(site, version), moved));
			}
		}

		// Nothing is written until every source has been read
		let originals = try_join_all(moves.iter().map(|(from, _)| self.read_resource(from)))
			.await?
			.into_iter()
			.zip(&moves)
			.map(|(original, (from, _))| {
				original.ok_or_else(|| RepositoryError::NotFound(from.to_string()))
			})
			.collect::<Result<Vec<_>>>()?;

		for (done, ((from, path), original)) in moves.iter().zip(&originals).enumerate() {
			let mut resource = original.clone();
			resource.uri.path = Some(path.clone());

			let moved = match self.write_document(&resource).await {
				Ok(()) => index.move_to(from, path),
				Err(e) => Err(e),
			};
			if let Err(e) = moved {
				warn!(%from, %path, "Move failed, restoring what was moved already: {e:#}");
				report_error(&self.write_document(original).await);
				for ((from, _), original) in moves.iter().zip(&originals).take(done) {
					report_error(&self.write_document(original).await);
					if let Some(path) = original.path() {
						report_error(&index.move_to(from, path));
					}
				}
				return Err(e);
			}
		}
		index.flush().await?;
		drop(index);

		let to = resolved.clone().with_path(&target);
		info!(from = %resolved, %to, moved = moves.len(), "Moved resource");
		self.events()
			.emit(RepositoryEvent::Moved { from: resolved, to });

		Ok(true)
	}

	/// Remove `uri`'s version, or every version of the resource
	///
	/// Returns `false` if there was nothing to remove.
	pub async fn delete(&self, uri: &ResourceUri, all_revisions: bool) -> Result<bool> {
		let _mutation = self.mutation.lock().await;
		let mut index = self.write_index().await?;

		let target = if all_revisions {
			index
				.exists_in_any_version(uri)
				.then(|| index.get_identifier(uri))
				.flatten()
				.and_then(|id| index.to_uri(&id))
		} else {
			index.resolve_uri(uri)
		};
		let Some(target) = target else {
			debug!(%uri, "Nothing to delete");
			return Ok(false);
		};

		let site = &self.site().identifier;
		let removed = index
			.entry(target.identifier().unwrap_or_default())
			.map(|entry| {
				entry
					.versions()
					.filter(|version| all_revisions || *version == target.version)
					.map(|version| entry.uri(site, version))
					.collect::<Vec<_>>()
			})
			.unwrap_or_default();

		let versions = removed.iter().map(|uri| uri.version).collect::<Vec<_>>();
		if let Err(e) = self.store().delete_revisions(&target, &versions).await {
			// Some revisions may be gone already, the index has to forget exactly those
			warn!(uri = %target, "Delete failed part way: {e:#}");
			for uri in &removed {
				if matches!(self.store().read_document(uri).await, Ok(None)) {
					report_error(&index.delete(uri));
				}
			}
			report_error(&index.flush().await);
			return Err(e);
		}

		for uri in &removed {
			index.delete(uri)?;
		}
		index.flush().await?;
		drop(index);

		for uri in removed {
			info!(%uri, "Deleted resource");
			self.events().emit(RepositoryEvent::Deleted(uri));
		}

		Ok(true)
	}

	/// Lock every version of the resource for `user`
	pub async fn lock(&self, uri: &ResourceUri, user: &str) -> Result<Resource> {
		let _mutation = self.mutation.lock().await;
		let mut versions = self.load_all_versions(uri).await?;
		if versions.is_empty() {
			return Err(RepositoryError::NotFound(uri.to_string()));
		}

		if let Some(owner) = versions
			.iter()
			.filter_map(|resource| resource.head.locked_by.as_deref())
			.find(|owner| *owner != user)
		{
			return Err(RepositoryError::Locked {
				uri: uri.to_string(),
				owner: owner.to_string(),
			});
		}

		for resource in &mut versions {
			resource.head.locked_by = Some(user.to_string());
			self.write_document(resource).await?;
		}

		let locked = pick_version(versions, uri.version)
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;
		self.events().emit(RepositoryEvent::Locked {
			uri: locked.uri.clone(),
			user: user.to_string(),
		});
		Ok(locked)
	}

	/// Release the lock on every version of the resource, telling whether there was one
	pub async fn unlock(&self, uri: &ResourceUri) -> Result<bool> {
		let _mutation = self.mutation.lock().await;
		let versions = self.load_all_versions(uri).await?;

		let mut unlocked = None;
		for mut resource in versions.into_iter().filter(Resource::is_locked) {
			resource.head.locked_by = None;
			self.write_document(&resource).await?;
			unlocked.get_or_insert(resource.uri);
		}

		match unlocked {
			Some(unlocked) => {
				self.events().emit(RepositoryEvent::Unlocked(unlocked));
				Ok(true)
			}
			None => Ok(false),
		}
	}

	pub async fn is_locked(&self, uri: &ResourceUri) -> Result<bool> {
		Ok(self.get(uri).await?.is_some_and(|resource| resource.is_locked()))
	}

	/// Rebuild the index from the store and swap it in
	///
	/// Writes wait until the rebuild is done; reads keep using the previous index meanwhile.
	pub async fn index(&self) -> Result<()> {
		let _mutation = self.mutation.lock().await;

		self.set_indexing(true);
		let rebuilt = self.rebuild_index().await;
		self.set_indexing(false);

		let (resources, revisions) = rebuilt?;
		self.events()
			.emit(RepositoryEvent::Indexed { resources, revisions });
		Ok(())
	}

	async fn rebuild_index(&self) -> Result<(usize, usize)> {
		let location = self.index_location().to_path_buf();
		let mut staging = location.clone().into_os_string();
		staging.push(REBUILD_SUFFIX);
		let staging = PathBuf::from(staging);
		info!(site = %self.site().identifier, "Rebuilding index");

		let mut index = self.create_index(&staging);
		index.build(&self.inner).await?;

		let mut current = self.write_index().await?;
		index.relocate(&location).await?;
		let counts = (index.resource_count(), index.revision_count());
		*current = index;

		info!(
			site = %self.site().identifier,
			resources = counts.0,
			revisions = counts.1,
			"Rebuilt index"
		);
		Ok(counts)
	}

	pub(super) async fn store_resource(&self, mut resource: Resource) -> Result<Resource> {
		let resource_type = resource
			.resource_type()
			.ok_or_else(|| RepositoryError::IllegalState(format!("{} has no type", resource.uri)))?
			.to_string();
		if self.registry().get(&resource_type).is_none() {
			return Err(RepositoryError::NoSerializer(resource_type));
		}

		let mut index = self.write_index().await?;

		// An identifier wins over a path, a path alone adopts whatever lives there
		let mut lookup = resource.uri.clone();
		if lookup.identifier.is_some() {
			lookup.path = None;
		}

		let added = match index.resolve_uri(&lookup) {
			Some(existing) => {
				let stored = self.read_resource(&existing).await?;
				if let Some(owner) = stored.as_ref().and_then(|s| s.head.locked_by.clone()) {
					if resource.head.editor() != Some(owner.as_str()) {
						return Err(RepositoryError::Locked {
							uri: existing.to_string(),
							owner,
						});
					}
					resource.head.locked_by = Some(owner);
				}
				keep_stored_contents(&mut resource, stored.as_ref())?;

				resource.uri.identifier = existing.identifier;
				index.update(&resource)?;
				false
			}
			None => {
				keep_stored_contents(&mut resource, None)?;
				resource.uri = index.add(&resource)?;
				true
			}
		};

		if let Err(e) = self.write_document(&resource).await {
			if added {
				report_error(&index.delete(&resource.uri));
			}
			return Err(e);
		}
		index.flush().await?;
		drop(index);

		debug!(uri = %resource.uri, "Stored resource");
		self.events()
			.emit(RepositoryEvent::Stored(resource.uri.clone()));
		Ok(resource)
	}

	pub(super) async fn store_content<R>(
		&self,
		uri: &ResourceUri,
		content: ResourceContent,
		data: R,
	) -> Result<Resource>
	where
		R: AsyncRead + Unpin + Send,
	{
		let resolved = self
			.read_index()
			.await?
			.resolve_uri(uri)
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;
		let mut resource = self
			.read_resource(&resolved)
			.await?
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;

		let resource_type = resolved.resource_type().unwrap_or_default();
		let serializer = self
			.registry()
			.get(resource_type)
			.ok_or_else(|| RepositoryError::NoSerializer(resource_type.to_string()))?;
		let mut content = serializer.read_content((&content).into(), self.site())?;

		let size = self.store().write_content(&resolved, &content, data).await?;
		content.size = Some(size);
		let language = content.language.clone();
		resource.add_content(content);

		self.write_document(&resource).await?;
		let mut index = self.write_index().await?;
		index.update(&resource)?;
		index.flush().await?;
		drop(index);

		debug!(uri = %resolved, %language, size, "Stored content");
		self.events()
			.emit(RepositoryEvent::ContentStored(resolved, language));
		Ok(resource)
	}

	async fn create_homepage_locked(&self) -> Result<bool> {
		let home = ResourceUri::for_path(&self.site().identifier, "/").with_type(PAGE);
		if self.exists_in_any_version(&home).await? {
			return Ok(false);
		}
		if self.registry().get(PAGE).is_none() {
			warn!(site = %self.site().identifier, "No page serializer, can't create a homepage");
			return Ok(false);
		}

		let administrator = self.site().administrator.clone();
		let mut homepage = Resource::new(home);
		homepage.head.owner = Some(administrator.clone());
		homepage.head.created = Some(Modification::now(&administrator));
		homepage.head.published = Some(Publication {
			user: administrator,
			from: Utc::now(),
			to: None,
		});

		let homepage = self.store_resource(homepage).await?;
		info!(uri = %homepage.uri, "Created homepage");
		Ok(true)
	}

	async fn write_document(&self, resource: &Resource) -> Result<()> {
		let resource_type = resource.resource_type().unwrap_or_default();
		let serializer = self
			.registry()
			.get(resource_type)
			.ok_or_else(|| RepositoryError::NoSerializer(resource_type.to_string()))?;

		self.store()
			.write_document(&resource.uri, &serializer.write(resource)?)
			.await?;
		Ok(())
	}

	async fn load_all_versions(&self, uri: &ResourceUri) -> Result<Vec<Resource>> {
		let uris = self.get_versions(uri).await?;
		let versions = try_join_all(uris.iter().map(|version| self.read_resource(version))).await?;
		Ok(versions.into_iter().flatten().collect())
	}
}

/// `path` moved from below `from` to below `to`, if it is `from` or one of its descendants
fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
	let rest = if from == "/" {
		path.strip_prefix('/')?
	} else {
		let rest = path.strip_prefix(from)?;
		if !rest.is_empty() && !rest.starts_with('/') {
			return None;
		}
		rest.trim_start_matches('/')
	};

	Some(normalize_path(&format!("{to}/{rest}")))
}

/// Checks `resource`'s content descriptions against the ones `stored` has payloads for
///
/// Sizes always come from the stored side.
fn keep_stored_contents(resource: &mut Resource, stored: Option<&Resource>) -> Result<()> {
	let mismatch = |reason: String| RepositoryError::ContentMismatch {
		uri: resource.uri.to_string(),
		reason,
	};

	let stored_contents = stored.map(|stored| &stored.contents);
	if let Some(language) = stored_contents
		.into_iter()
		.flat_map(|contents| contents.keys())
		.find(|language| !resource.contents.contains_key(*language))
	{
		return Err(mismatch(format!("'{language}' content is left out")));
	}

	let mut sizes = Vec::with_capacity(resource.contents.len());
	for (language, content) in &resource.contents {
		let Some(existing) = stored_contents.and_then(|contents| contents.get(language)) else {
			return Err(mismatch(format!("no payload for '{language}' content")));
		};
		if existing.storage_name() != content.storage_name() {
			return Err(mismatch(format!(
				"'{language}' payload is stored as {}, not {}",
				existing.storage_name(),
				content.storage_name()
			)));
		}
		sizes.push((language.clone(), existing.size));
	}

	for (language, size) in sizes {
		if let Some(content) = resource.contents.get_mut(&language) {
			content.size = size;
		}
	}
	Ok(())
}

/// The resource in `version`, else the first one
fn pick_version(versions: Vec<Resource>, version: Version) -> Option<Resource> {
	let mut fallback = None;
	for resource in versions {
		if resource.version() == version {
			return Some(resource);
		}
		fallback.get_or_insert(resource);
	}
	fallback
}
