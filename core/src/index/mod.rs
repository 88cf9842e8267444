//! Repository index
//!
//! Keeps the bookkeeping between paths, identifiers and stored revisions of a
//! site's resources, persisted next to a version file so that an index written by
//! an older layout is thrown away and rebuilt instead of being trusted.

use std::{
	collections::{BTreeSet, HashMap},
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use folio_utils::{error::FileIOError, new_identifier};
use serde::{Deserialize, Serialize};
use tokio::{fs, io};
use tracing::{debug, info, trace, warn};

use crate::{
	domain::{Resource, ResourceUri, Version},
	error::{RepositoryError, Result},
	search::SearchHook,
	serializer::SerializerRegistry,
};

mod entry;

pub use entry::IndexEntry;

/// Layout version of the persisted index; bump whenever [`IndexEntry`] changes shape
pub const INDEX_VERSION: u32 = 3;

const STRUCTURE_FILE: &str = "structure.idx";
const VERSION_FILE: &str = "index.version";

/// Source of every resource an index should contain
#[async_trait]
pub trait ResourceEnumerator: Send + Sync {
	async fn enumerate(&self) -> Result<Vec<Resource>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedIndex {
	entries: HashMap<String, IndexEntry>,
}

pub struct RepositoryIndex {
	site: String,
	location: PathBuf,
	entries: HashMap<String, IndexEntry>,
	/// Every path any revision of an entry lives at, to the entries' identifiers
	paths: HashMap<String, BTreeSet<String>>,
	registry: Arc<SerializerRegistry>,
	search: Arc<dyn SearchHook>,
}

impl std::fmt::Debug for RepositoryIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RepositoryIndex")
			.field("site", &self.site)
			.field("location", &self.location)
			.field("resources", &self.resource_count())
			.field("revisions", &self.revision_count())
			.finish_non_exhaustive()
	}
}

impl RepositoryIndex {
	/// An empty index that will persist itself into `location`
	pub fn create(
		site: impl Into<String>,
		location: impl Into<PathBuf>,
		registry: Arc<SerializerRegistry>,
		search: Arc<dyn SearchHook>,
	) -> Self {
		Self {
			site: site.into(),
			location: location.into(),
			entries: HashMap::new(),
			paths: HashMap::new(),
			registry,
			search,
		}
	}

	/// Read the index persisted at `location`
	///
	/// Returns `None` when there is nothing there, when it was written with another
	/// [`INDEX_VERSION`] or when it can't be decoded. Stale or broken state is removed
	/// from disk so a following build starts clean.
	pub async fn load(
		site: impl Into<String>,
		location: impl Into<PathBuf>,
		registry: Arc<SerializerRegistry>,
		search: Arc<dyn SearchHook>,
	) -> Result<Option<Self>> {
		let mut index = Self::create(site, location, registry, search);
		let version_path = index.location.join(VERSION_FILE);

		let stored_version = match fs::read_to_string(&version_path).await {
			Ok(contents) => contents.trim().parse::<u32>().ok(),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!(location = %index.location.display(), "No index found");
				return Ok(None);
			}
			Err(e) => return Err(FileIOError::from((&version_path, e)).into()),
		};

		if stored_version != Some(INDEX_VERSION) {
			info!(
				location = %index.location.display(),
				?stored_version,
				"Index version doesn't match {INDEX_VERSION}, discarding it"
			);
			index.discard().await?;
			return Ok(None);
		}

		let structure_path = index.location.join(STRUCTURE_FILE);
		let bytes = match fs::read(&structure_path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(location = %index.location.display(), "Index version file without structure, discarding it");
				index.discard().await?;
				return Ok(None);
			}
			Err(e) => return Err(FileIOError::from((&structure_path, e)).into()),
		};

		match rmp_serde::from_slice::<PersistedIndex>(&bytes) {
			Ok(PersistedIndex { entries }) => {
				for entry in entries.into_values() {
					index.insert_entry(entry);
				}
				info!(
					location = %index.location.display(),
					resources = index.resource_count(),
					revisions = index.revision_count(),
					"Loaded index"
				);
				Ok(Some(index))
			}
			Err(e) => {
				warn!(location = %index.location.display(), "Index can't be decoded, discarding it: {e:#}");
				index.discard().await?;
				Ok(None)
			}
		}
	}

	/// Throw away the current content and add every resource `enumerator` yields
	///
	/// On failure the index is left empty, both in memory and on disk.
	pub async fn build(&mut self, enumerator: &dyn ResourceEnumerator) -> Result<()> {
		self.clear();

		let outcome = match enumerator.enumerate().await {
			Ok(resources) => resources
				.into_iter()
				.try_for_each(|resource| self.add(&resource).map(|_| ())),
			Err(e) => Err(e),
		};

		if let Err(e) = outcome {
			warn!(site = %self.site, "Index population failed, rolling back: {e:#}");
			self.clear();
			folio_utils::error::report_error(&self.discard().await);
			return Err(e);
		}

		info!(
			site = %self.site,
			resources = self.resource_count(),
			revisions = self.revision_count(),
			"Built index"
		);

		self.flush().await
	}

	/// Record one resource version, returning its URI with the identifier filled in
	///
	/// A resource without identifier adopts the one bound to its path, or gets a new one.
	pub fn add(&mut self, resource: &Resource) -> Result<ResourceUri> {
		let resource_type = resource.resource_type().map(ToString::to_string).ok_or_else(|| {
			RepositoryError::IllegalState(format!("{} has no type", resource.uri))
		})?;
		let version = resource.version();
		let path = resource.path().map(ToString::to_string);

		let identifier = match resource.identifier() {
			Some(id) => id.to_string(),
			None => path
				.as_deref()
				.and_then(|path| self.lookup_path(path, version))
				.map_or_else(new_identifier, |entry| entry.identifier.clone()),
		};

		if let Some(path) = path.as_deref() {
			if let Some(other) = self.lookup_exact(path, version) {
				if other.identifier != identifier {
					return Err(RepositoryError::Duplicate(format!(
						"{path} is already bound to {} in version {version}",
						other.identifier
					)));
				}
			}
		}

		let entry = self
			.entries
			.entry(identifier.clone())
			.or_insert_with(|| IndexEntry::new(identifier.clone(), resource_type.clone()));

		if entry.resource_type != resource_type {
			return Err(RepositoryError::IllegalState(format!(
				"{identifier} is a {}, not a {resource_type}",
				entry.resource_type
			)));
		}

		if entry.revisions.contains_key(&version) {
			return Err(RepositoryError::Duplicate(format!(
				"{identifier} already has version {version}"
			)));
		}

		entry.revisions.insert(version, path.clone());
		if let Some(path) = path {
			self.paths.entry(path).or_default().insert(identifier.clone());
		}

		let mut uri = resource.uri.clone();
		uri.identifier = Some(identifier);
		self.index_metadata(&uri, resource);
		trace!(%uri, "Added to index");

		Ok(uri)
	}

	/// Refresh an already indexed version, rebinding its path if it changed
	pub fn update(&mut self, resource: &Resource) -> Result<()> {
		let version = resource.version();
		let identifier = self
			.resolve(&resource.uri)
			.filter(|entry| entry.revisions.contains_key(&version))
			.map(|entry| entry.identifier.clone())
			.ok_or_else(|| RepositoryError::NotFound(resource.uri.to_string()))?;

		let path = resource.path().map(ToString::to_string);
		if let Some(owner) = path.as_deref().and_then(|path| self.path_owner(path, version)) {
			if owner != identifier {
				return Err(RepositoryError::Duplicate(format!(
					"{} is already bound to {owner} in version {version}",
					resource.uri
				)));
			}
		}
		self.rebind(&identifier, version, path)?;

		let mut uri = resource.uri.clone();
		uri.identifier = Some(identifier);
		self.index_metadata(&uri, resource);
		Ok(())
	}

	/// Forget one version; the entry goes away with its last version
	pub fn delete(&mut self, uri: &ResourceUri) -> Result<bool> {
		let Some(identifier) = self.resolve(uri).map(|entry| entry.identifier.clone()) else {
			debug!(%uri, "Nothing to delete from index");
			return Ok(false);
		};

		let Some(entry) = self.entries.get_mut(&identifier) else {
			return Ok(false);
		};
		if !entry.revisions.contains_key(&uri.version) {
			return Ok(false);
		}

		let removed_uri = entry.uri(&self.site, uri.version);
		let path = entry.revisions.remove(&uri.version).flatten();
		let last_version = entry.revisions.is_empty();
		let path_still_used = path.as_deref().is_some_and(|p| entry.has_path(p));

		if last_version {
			self.entries.remove(&identifier);
		}
		if let Some(path) = path.filter(|_| !path_still_used) {
			self.unbind_path(&path, &identifier);
		}

		self.search.remove(&removed_uri);
		trace!(uri = %removed_uri, "Removed from index");

		Ok(true)
	}

	/// Bind `uri`'s version to a new path
	pub fn move_to(&mut self, uri: &ResourceUri, path: &str) -> Result<()> {
		let path = crate::domain::normalize_path(path);
		let identifier = self
			.resolve(uri)
			.filter(|entry| entry.revisions.contains_key(&uri.version))
			.map(|entry| entry.identifier.clone())
			.ok_or_else(|| RepositoryError::NotFound(uri.to_string()))?;

		if let Some(other) = self.lookup_exact(&path, uri.version) {
			if other.identifier != identifier {
				return Err(RepositoryError::Duplicate(format!(
					"{path} is already bound to {} in version {}",
					other.identifier, uri.version
				)));
			}
		}

		self.rebind(&identifier, uri.version, Some(path))
	}

	fn rebind(&mut self, identifier: &str, version: Version, path: Option<String>) -> Result<()> {
		let entry = self
			.entries
			.get_mut(identifier)
			.ok_or_else(|| RepositoryError::NotFound(identifier.to_string()))?;

		let previous = entry.revisions.insert(version, path.clone()).flatten();
		if previous == path {
			return Ok(());
		}

		if let Some(previous) = previous.filter(|p| !entry.has_path(p)) {
			self.unbind_path(&previous, identifier);
		}
		if let Some(path) = path {
			self.paths
				.entry(path)
				.or_default()
				.insert(identifier.to_string());
		}

		Ok(())
	}

	/// Stored versions of the resource `uri` points at, in version order
	#[must_use]
	pub fn get_revisions(&self, uri: &ResourceUri) -> Vec<Version> {
		self.resolve_any(uri)
			.map(|entry| entry.versions().collect())
			.unwrap_or_default()
	}

	/// Path of `uri`'s version, or of the resource's current version
	#[must_use]
	pub fn get_path(&self, uri: &ResourceUri) -> Option<String> {
		self.resolve_any(uri)
			.and_then(|entry| entry.path_of(uri.version).or_else(|| entry.current_path()))
			.map(ToString::to_string)
	}

	#[must_use]
	pub fn get_identifier(&self, uri: &ResourceUri) -> Option<String> {
		self.resolve_any(uri).map(|entry| entry.identifier.clone())
	}

	#[must_use]
	pub fn get_type(&self, uri: &ResourceUri) -> Option<String> {
		self.resolve_any(uri).map(|entry| entry.resource_type.clone())
	}

	/// Whether `uri`'s exact version is stored, honouring its type when it has one
	#[must_use]
	pub fn exists(&self, uri: &ResourceUri) -> bool {
		self.resolve(uri).is_some_and(|entry| {
			Self::type_matches(entry, uri) && entry.revisions.contains_key(&uri.version)
		})
	}

	#[must_use]
	pub fn exists_in_any_version(&self, uri: &ResourceUri) -> bool {
		self.resolve_any(uri)
			.is_some_and(|entry| Self::type_matches(entry, uri) && !entry.revisions.is_empty())
	}

	/// Identifier of the resource holding exactly `path` in `version`
	#[must_use]
	pub fn path_owner(&self, path: &str, version: Version) -> Option<&str> {
		self.lookup_exact(path, version)
			.map(|entry| entry.identifier.as_str())
	}

	#[must_use]
	pub fn entry(&self, identifier: &str) -> Option<&IndexEntry> {
		self.entries.get(identifier)
	}

	/// Full URI of the stored version `uri` points at, looked up by path first and by
	/// identifier second
	#[must_use]
	pub fn resolve_uri(&self, uri: &ResourceUri) -> Option<ResourceUri> {
		let stored = |entry: &&IndexEntry| {
			Self::type_matches(entry, uri) && entry.revisions.contains_key(&uri.version)
		};

		uri.path()
			.and_then(|path| self.lookup_path(path, uri.version))
			.filter(stored)
			.or_else(|| {
				uri.identifier()
					.and_then(|id| self.entries.get(id))
					.filter(stored)
			})
			.map(|entry| entry.uri(&self.site, uri.version))
	}

	/// Complete URI of the current version of the resource with `identifier`
	#[must_use]
	pub fn to_uri(&self, identifier: &str) -> Option<ResourceUri> {
		self.entries.get(identifier).map(|entry| {
			let version = entry
				.revisions
				.keys()
				.next()
				.copied()
				.unwrap_or_default();
			entry.uri(&self.site, version)
		})
	}

	/// Current versions of resources at most `level` segments below `prefix`, by path
	#[must_use]
	pub fn list(&self, prefix: &str, level: usize) -> Vec<ResourceUri> {
		let prefix = crate::domain::normalize_path(prefix);
		let base = if prefix == "/" { String::new() } else { prefix };

		let mut found = self
			.entries
			.values()
			.filter_map(|entry| {
				let path = entry.current_path()?;
				let rest = path
					.strip_prefix(&base)?
					.strip_prefix('/')
					.filter(|rest| !rest.is_empty())?;
				let depth = rest.split('/').count();
				(depth <= level).then(|| self.to_uri(&entry.identifier)).flatten()
			})
			.collect::<Vec<_>>();
		found.sort_by(|a, b| a.path.cmp(&b.path));
		found
	}

	/// Number of distinct resources
	#[must_use]
	pub fn resource_count(&self) -> usize {
		self.entries.len()
	}

	/// Number of stored versions over all resources, never less than the resource count
	#[must_use]
	pub fn revision_count(&self) -> usize {
		self.entries.values().map(|entry| entry.revisions.len()).sum()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[must_use]
	pub fn location(&self) -> &Path {
		&self.location
	}

	pub fn clear(&mut self) {
		self.entries.clear();
		self.paths.clear();
		self.search.clear();
	}

	/// Write the index and its version file to disk
	pub async fn flush(&self) -> Result<()> {
		fs::create_dir_all(&self.location)
			.await
			.map_err(|e| FileIOError::from((&self.location, e, "creating index directory")))?;

		let bytes = rmp_serde::to_vec_named(&PersistedIndex {
			entries: self.entries.clone(),
		})?;

		let structure_path = self.location.join(STRUCTURE_FILE);
		fs::write(&structure_path, bytes)
			.await
			.map_err(|e| FileIOError::from((&structure_path, e)))?;

		let version_path = self.location.join(VERSION_FILE);
		fs::write(&version_path, INDEX_VERSION.to_string())
			.await
			.map_err(|e| FileIOError::from((&version_path, e)))?;

		trace!(location = %self.location.display(), "Flushed index");
		Ok(())
	}

	/// Persist and let go of the index
	pub async fn close(self) -> Result<()> {
		self.flush().await?;
		debug!(location = %self.location.display(), "Closed index");
		Ok(())
	}

	/// Move the index's directory, replacing whatever lives at `location`
	pub async fn relocate(&mut self, location: impl Into<PathBuf>) -> Result<()> {
		let location = location.into();
		match fs::remove_dir_all(&location).await {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(e) => return Err(FileIOError::from((&location, e)).into()),
		}

		if fs::metadata(&self.location).await.is_ok() {
			fs::rename(&self.location, &location)
				.await
				.map_err(|e| FileIOError::from((&self.location, e, "moving index")))?;
		}

		self.location = location;
		self.flush().await
	}

	/// Remove the index's directory from disk
	pub async fn discard(&self) -> Result<()> {
		match fs::remove_dir_all(&self.location).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(FileIOError::from((&self.location, e, "discarding index")).into()),
		}
	}

	fn insert_entry(&mut self, entry: IndexEntry) {
		for path in entry.revisions.values().flatten() {
			self.paths
				.entry(path.clone())
				.or_default()
				.insert(entry.identifier.clone());
		}
		self.entries.insert(entry.identifier.clone(), entry);
	}

	fn unbind_path(&mut self, path: &str, identifier: &str) {
		if let Some(ids) = self.paths.get_mut(path) {
			ids.remove(identifier);
			if ids.is_empty() {
				self.paths.remove(path);
			}
		}
	}

	fn index_metadata(&self, uri: &ResourceUri, resource: &Resource) {
		let Some(resource_type) = uri.resource_type() else {
			return;
		};

		match self.registry.get(resource_type) {
			Some(serializer) => self.search.add(uri, &serializer.metadata(resource)),
			None => warn!(%uri, "No serializer for '{resource_type}', skipping its metadata"),
		}
	}

	fn type_matches(entry: &IndexEntry, uri: &ResourceUri) -> bool {
		uri.resource_type()
			.map_or(true, |resource_type| resource_type == entry.resource_type)
	}

	/// Entry holding exactly `path` in `version`
	fn lookup_exact(&self, path: &str, version: Version) -> Option<&IndexEntry> {
		self.paths
			.get(path)?
			.iter()
			.filter_map(|id| self.entries.get(id))
			.find(|entry| entry.path_of(version) == Some(path))
	}

	/// Entry for `path` in `version`, else the one whose current version lives there
	fn lookup_path(&self, path: &str, version: Version) -> Option<&IndexEntry> {
		self.lookup_exact(path, version).or_else(|| {
			self.paths
				.get(path)?
				.iter()
				.filter_map(|id| self.entries.get(id))
				.find(|entry| entry.current_path() == Some(path))
		})
	}

	/// Entry `uri` points at, by identifier or by its path in the URI's version
	fn resolve(&self, uri: &ResourceUri) -> Option<&IndexEntry> {
		match (uri.identifier(), uri.path()) {
			(Some(id), _) => self.entries.get(id),
			(None, Some(path)) => self.lookup_path(path, uri.version),
			(None, None) => None,
		}
	}

	/// Like [`Self::resolve`], but a path matches any version that ever lived there
	fn resolve_any(&self, uri: &ResourceUri) -> Option<&IndexEntry> {
		self.resolve(uri).or_else(|| {
			let path = uri.path().filter(|_| uri.identifier().is_none())?;
			self.paths
				.get(path)?
				.iter()
				.find_map(|id| self.entries.get(id))
		})
	}
}
