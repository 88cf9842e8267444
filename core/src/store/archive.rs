use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{require, walk_documents, BackingStore, StoredDocument};
use crate::{
	domain::{ResourceUri, Version},
	error::Result,
};

/// Read-only store laid out by path: `<root>/<type>s<path>/<version>.xml`
#[derive(Debug, Clone)]
pub struct ArchiveStore {
	root: PathBuf,
}

impl ArchiveStore {
	/// `root` is the archive directory including its prefix
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	fn type_directory(&self, uri: &ResourceUri) -> Result<PathBuf> {
		let resource_type = require(uri, uri.resource_type(), "type")?;
		Ok(self.root.join(format!("{resource_type}s")))
	}
}

/// Site path of a directory below a type directory
fn site_path(type_dir: &Path, dir: &Path) -> Option<String> {
	let relative = dir.strip_prefix(type_dir).ok()?;
	let segments = relative
		.components()
		.map(|c| c.as_os_str().to_str())
		.collect::<Option<Vec<_>>>()?;
	Some(format!("/{}", segments.join("/")))
}

#[async_trait]
impl BackingStore for ArchiveStore {
	fn root(&self) -> &Path {
		&self.root
	}

	fn is_read_only(&self) -> bool {
		true
	}

	fn version_location(&self, uri: &ResourceUri) -> Result<PathBuf> {
		let path = require(uri, uri.path(), "path")?;
		Ok(self.type_directory(uri)?.join(path.trim_start_matches('/')))
	}

	fn document_name(&self, version: Version) -> String {
		version.document()
	}

	async fn list_documents(&self, directory: &str) -> Result<Vec<StoredDocument>> {
		let type_dir = self.root.join(directory);
		let mut documents = Vec::new();

		for file in walk_documents(&type_dir).await? {
			let Some(version) = file
				.file_name()
				.and_then(|name| name.to_str())
				.and_then(Version::from_document)
			else {
				// Content payloads that happen to be xml
				continue;
			};

			let Some(path) = file.parent().and_then(|dir| site_path(&type_dir, dir)) else {
				warn!(file = %file.display(), "Can't derive a site path for archived document, skipping it");
				continue;
			};

			documents.push(StoredDocument {
				file,
				version,
				path: Some(path),
			});
		}

		debug!(
			archive = %self.root.display(),
			%directory,
			documents = documents.len(),
			"Listed archived documents"
		);
		Ok(documents)
	}
}
