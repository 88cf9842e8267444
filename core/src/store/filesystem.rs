use std::path::{Path, PathBuf};

use async_trait::async_trait;
use folio_utils::{error::FileIOError, shard_directories};
use tokio::{
	fs,
	io::{self, AsyncRead},
};
use tracing::{debug, trace, warn};

use super::{find_content, require, walk_documents, BackingStore, StoredDocument};
use crate::{
	domain::{Language, ResourceContent, ResourceUri, Version},
	error::{RepositoryError, Result},
};

const DOCUMENT: &str = "index.xml";

/// Writable store laid out by identifier:
/// `<root>/<type>s/<shard>/<shard>/<id>/<version>/index.xml`
#[derive(Debug, Clone)]
pub struct FilesystemStore {
	root: PathBuf,
}

impl FilesystemStore {
	/// `root` is the site's own directory inside the store
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn type_directory(&self, uri: &ResourceUri) -> Result<PathBuf> {
		let resource_type = require(uri, uri.resource_type(), "type")?;
		Ok(self.root.join(format!("{resource_type}s")))
	}

	/// Directory holding every version of `uri`'s resource
	fn resource_location(&self, uri: &ResourceUri) -> Result<PathBuf> {
		let identifier = require(uri, uri.identifier(), "identifier")?;
		let (first, second) = shard_directories(identifier);
		Ok(self
			.type_directory(uri)?
			.join(first)
			.join(second)
			.join(identifier))
	}

	/// Write `uri`'s document, replacing what was there
	pub async fn write_document(&self, uri: &ResourceUri, document: &str) -> Result<PathBuf> {
		let dir = self.version_location(uri)?;
		fs::create_dir_all(&dir)
			.await
			.map_err(|e| FileIOError::from((&dir, e, "creating version directory")))?;

		let file = dir.join(DOCUMENT);
		fs::write(&file, document)
			.await
			.map_err(|e| FileIOError::from((&file, e, "writing resource document")))?;

		trace!(%uri, file = %file.display(), "Wrote document");
		Ok(file)
	}

	/// Store the payload for `content`, returning the number of bytes written
	///
	/// A previous payload for the same language goes away, even under another extension.
	pub async fn write_content<R>(&self, uri: &ResourceUri, content: &ResourceContent, mut data: R) -> Result<u64>
	where
		R: AsyncRead + Unpin + Send,
	{
		let dir = self.version_location(uri)?;
		fs::create_dir_all(&dir)
			.await
			.map_err(|e| FileIOError::from((&dir, e, "creating version directory")))?;

		self.delete_content(uri, &content.language).await?;

		let file = dir.join(content.storage_name());
		let mut target = fs::File::create(&file)
			.await
			.map_err(|e| FileIOError::from((&file, e, "creating content file")))?;

		match io::copy(&mut data, &mut target).await {
			Ok(size) => {
				trace!(%uri, file = %file.display(), size, "Wrote content");
				Ok(size)
			}
			Err(e) => {
				drop(target);
				if let Err(cleanup) = fs::remove_file(&file).await {
					warn!(file = %file.display(), "Failed to remove partial content: {cleanup:#}");
				}
				Err(FileIOError::from((&file, e, "writing content")).into())
			}
		}
	}

	/// Remove the payload for `language`, telling whether there was one
	pub async fn delete_content(&self, uri: &ResourceUri, language: &Language) -> Result<bool> {
		let Some(file) = find_content(&self.version_location(uri)?, language).await? else {
			return Ok(false);
		};

		match fs::remove_file(&file).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(FileIOError::from((&file, e, "deleting content")).into()),
		}
	}

	/// Remove the given versions of `uri`'s resource, then every directory left empty
	pub async fn delete_revisions(&self, uri: &ResourceUri, versions: &[Version]) -> Result<()> {
		let resource_dir = self.resource_location(uri)?;

		for version in versions {
			let dir = resource_dir.join(version.directory());
			match fs::remove_dir_all(&dir).await {
				Ok(()) => trace!(%uri, %version, "Removed revision directory"),
				Err(e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => return Err(FileIOError::from((&dir, e, "deleting revision")).into()),
			}
		}

		let type_dir = self.type_directory(uri)?;
		let mut current = Some(resource_dir.as_path());
		while let Some(dir) = current.filter(|dir| *dir != type_dir.as_path() && dir.starts_with(&type_dir)) {
			// Fails on directories that still have entries, which is where we stop
			if fs::remove_dir(dir).await.is_err() {
				break;
			}
			current = dir.parent();
		}

		Ok(())
	}

	/// Whether anything is stored for the type `directory`
	pub async fn has_entries(&self, directory: &str) -> Result<bool> {
		let dir = self.root.join(directory);
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(FileIOError::from((&dir, e)).into()),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| FileIOError::from((&dir, e)))?
		{
			if !folio_utils::is_hidden(&entry.path()) {
				return Ok(true);
			}
		}

		Ok(false)
	}

	/// Delete the whole store
	pub async fn remove_root(&self) -> Result<()> {
		match fs::remove_dir_all(&self.root).await {
			Ok(()) => {
				debug!(root = %self.root.display(), "Removed store");
				Ok(())
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(FileIOError::from((&self.root, e, "removing store")).into()),
		}
	}

	/// Make sure the store's root exists and is a directory
	pub async fn ensure_root(&self) -> Result<()> {
		fs::create_dir_all(&self.root).await.map_err(|e| RepositoryError::Unavailable {
			root: self.root.display().to_string(),
			reason: e.to_string(),
		})
	}
}

#[async_trait]
impl BackingStore for FilesystemStore {
	fn root(&self) -> &Path {
		&self.root
	}

	fn is_read_only(&self) -> bool {
		false
	}

	fn version_location(&self, uri: &ResourceUri) -> Result<PathBuf> {
		Ok(self.resource_location(uri)?.join(uri.version.directory()))
	}

	fn document_name(&self, _version: Version) -> String {
		DOCUMENT.to_string()
	}

	async fn list_documents(&self, directory: &str) -> Result<Vec<StoredDocument>> {
		let documents = walk_documents(&self.root.join(directory))
			.await?
			.into_iter()
			.filter(|file| file.file_name().is_some_and(|name| name == DOCUMENT))
			.filter_map(|file| {
				let version = file
					.parent()
					.and_then(Path::file_name)
					.and_then(|name| name.to_str())
					.and_then(|name| name.parse::<Version>().ok());

				match version {
					Some(version) => Some(StoredDocument {
						file,
						version,
						path: None,
					}),
					None => {
						warn!(file = %file.display(), "Document outside a version directory, skipping it");
						None
					}
				}
			})
			.collect::<Vec<_>>();

		debug!(
			store = %self.root.display(),
			%directory,
			documents = documents.len(),
			"Listed stored documents"
		);
		Ok(documents)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	fn uri(version: Version) -> ResourceUri {
		ResourceUri::for_identifier("demo", "4b000000-0000-0000-0000-000000000000")
			.with_type("file")
			.with_version(version)
	}

	#[tokio::test]
	async fn documents_are_sharded_by_identifier() {
		let dir = tempdir().unwrap();
		let store = FilesystemStore::new(dir.path());

		let file = store.write_document(&uri(Version::Work), "<file/>").await.unwrap();
		assert_eq!(
			file,
			dir.path()
				.join("files/4/1/4b000000-0000-0000-0000-000000000000/work/index.xml")
		);

		let listed = store.list_documents("files").await.unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].version, Version::Work);
		assert!(store.has_entries("files").await.unwrap());
		assert!(!store.has_entries("pages").await.unwrap());
	}

	#[tokio::test]
	async fn content_replaces_other_extensions() {
		let dir = tempdir().unwrap();
		let store = FilesystemStore::new(dir.path());
		let uri = uri(Version::Live);

		let pdf = ResourceContent::new("de".into()).with_filename("report.pdf");
		assert_eq!(store.write_content(&uri, &pdf, &b"%PDF"[..]).await.unwrap(), 4);

		let txt = ResourceContent::new("de".into()).with_filename("report.txt");
		store.write_content(&uri, &txt, &b"text"[..]).await.unwrap();

		let version_dir = store.version_location(&uri).unwrap();
		assert!(!version_dir.join("de.pdf").exists());
		assert!(version_dir.join("de.txt").exists());

		assert!(store.delete_content(&uri, &"de".into()).await.unwrap());
		assert!(!store.delete_content(&uri, &"de".into()).await.unwrap());
	}

	#[tokio::test]
	async fn deleting_revisions_prunes_empty_directories() {
		let dir = tempdir().unwrap();
		let store = FilesystemStore::new(dir.path());

		store.write_document(&uri(Version::Live), "<file/>").await.unwrap();
		store.write_document(&uri(Version::Work), "<file/>").await.unwrap();

		store.delete_revisions(&uri(Version::Live), &[Version::Work]).await.unwrap();
		assert!(store.read_document(&uri(Version::Live)).await.unwrap().is_some());

		store.delete_revisions(&uri(Version::Live), &[Version::Live]).await.unwrap();
		assert!(dir.path().join("files").exists());
		assert!(!dir.path().join("files/4").exists());
	}
}
