//! Backing stores
//!
//! A store knows where a resource version's document and content payloads live on
//! disk. The archive is addressed by path and never changes; the filesystem store is
//! addressed by identifier and takes writes.

use std::{
	fmt::Debug,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use folio_utils::error::FileIOError;
use globset::{Glob, GlobMatcher};
use once_cell::sync::Lazy;
use tokio::{fs, io};
use tracing::trace;

use crate::{
	domain::{Language, ResourceUri, Version},
	error::{RepositoryError, Result},
};

mod archive;
mod filesystem;

pub use archive::ArchiveStore;
pub use filesystem::FilesystemStore;

#[allow(clippy::unwrap_used)]
static DOCUMENT_PATTERN: Lazy<GlobMatcher> =
	Lazy::new(|| Glob::new("*.xml").unwrap().compile_matcher());

/// A resource document found while walking a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
	pub file: PathBuf,
	/// Version, as told by where the document is stored
	pub version: Version,
	/// Path, for stores that are laid out by path
	pub path: Option<String>,
}

#[async_trait]
pub trait BackingStore: Debug + Send + Sync {
	fn root(&self) -> &Path;

	fn is_read_only(&self) -> bool;

	/// Directory holding `uri`'s version: its document and content payloads
	fn version_location(&self, uri: &ResourceUri) -> Result<PathBuf>;

	/// File name of the document inside [`BackingStore::version_location`]
	fn document_name(&self, version: Version) -> String;

	/// Every document stored below the `directory` of one resource type
	async fn list_documents(&self, directory: &str) -> Result<Vec<StoredDocument>>;

	async fn read_document(&self, uri: &ResourceUri) -> Result<Option<Vec<u8>>> {
		let file = self
			.version_location(uri)?
			.join(self.document_name(uri.version));

		match fs::read(&file).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				trace!(%uri, file = %file.display(), "No document stored");
				Ok(None)
			}
			Err(e) => Err(FileIOError::from((&file, e, "reading resource document")).into()),
		}
	}

	/// Open the payload of `uri`'s content in `language`; the caller owns the handle
	async fn open_content(&self, uri: &ResourceUri, language: &Language) -> Result<Option<fs::File>> {
		let Some(file) = find_content(&self.version_location(uri)?, language).await? else {
			return Ok(None);
		};

		match fs::File::open(&file).await {
			Ok(handle) => Ok(Some(handle)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(FileIOError::from((&file, e, "opening resource content")).into()),
		}
	}
}

fn require<'a>(uri: &'a ResourceUri, value: Option<&'a str>, what: &str) -> Result<&'a str> {
	value.ok_or_else(|| RepositoryError::IllegalState(format!("{uri} has no {what}")))
}

/// Document files below `dir`, skipping dotfiles; a missing `dir` has none
async fn walk_documents(dir: &Path) -> Result<Vec<PathBuf>> {
	let mut found = Vec::new();
	let mut pending = vec![dir.to_path_buf()];

	while let Some(current) = pending.pop() {
		let mut entries = match fs::read_dir(&current).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
			Err(e) => return Err(FileIOError::from((&current, e, "listing documents")).into()),
		};

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| FileIOError::from((&current, e)))?
		{
			let path = entry.path();
			if folio_utils::is_hidden(&path) {
				continue;
			}

			let file_type = entry
				.file_type()
				.await
				.map_err(|e| FileIOError::from((&path, e)))?;

			if file_type.is_dir() {
				pending.push(path);
			} else if path.file_name().is_some_and(|name| DOCUMENT_PATTERN.is_match(name)) {
				found.push(path);
			}
		}
	}

	found.sort();
	Ok(found)
}

/// Payload file for `language` in a version directory: `<lang>` or `<lang>.<ext>`
async fn find_content(dir: &Path, language: &Language) -> Result<Option<PathBuf>> {
	let mut entries = match fs::read_dir(dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
		Err(e) => return Err(FileIOError::from((dir, e, "looking up content")).into()),
	};

	let language = language.identifier();
	let with_extension = format!("{language}.");

	while let Some(entry) = entries
		.next_entry()
		.await
		.map_err(|e| FileIOError::from((dir, e)))?
	{
		let name = entry.file_name();
		let Some(name) = name.to_str() else {
			continue;
		};
		if name == language || name.starts_with(&with_extension) {
			return Ok(Some(entry.path()));
		}
	}

	Ok(None)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[tokio::test]
	async fn walk_skips_hidden_and_foreign_files() {
		let dir = tempdir().unwrap();
		let about = dir.path().join("about");
		fs::create_dir_all(about.join(".svn")).await.unwrap();
		fs::write(about.join("index.xml"), "<page/>").await.unwrap();
		fs::write(about.join("de.pdf"), "pdf").await.unwrap();
		fs::write(about.join(".index.xml"), "<page/>").await.unwrap();
		fs::write(about.join(".svn").join("work.xml"), "<page/>").await.unwrap();

		assert_eq!(walk_documents(dir.path()).await.unwrap(), vec![about.join("index.xml")]);
		assert!(walk_documents(&dir.path().join("missing")).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn content_is_found_with_or_without_extension() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join("de.pdf"), "pdf").await.unwrap();
		fs::write(dir.path().join("en"), "raw").await.unwrap();

		assert_eq!(
			find_content(dir.path(), &Language::new("de")).await.unwrap(),
			Some(dir.path().join("de.pdf"))
		);
		assert_eq!(
			find_content(dir.path(), &Language::new("en")).await.unwrap(),
			Some(dir.path().join("en"))
		);
		assert_eq!(find_content(dir.path(), &Language::new("fr")).await.unwrap(), None);
	}
}
