//! Shared setup for the repository integration tests

#![allow(dead_code)]

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use folio_core::{
	config::RepositoryConfig, ArchiveStore, FilesystemStore, Site, SerializerRegistry,
	WritableRepository,
};
use tokio::fs;

pub const SITE: &str = "demo";

/// Distinct resources in the archive written by [`write_archive`]
pub const ARCHIVED_RESOURCES: usize = 3;
/// Stored versions in the archive written by [`write_archive`]
pub const ARCHIVED_REVISIONS: usize = 5;

pub fn site() -> Site {
	Site::new(SITE, ["en".into(), "de".into()], "en".into()).unwrap()
}

pub fn registry() -> Arc<SerializerRegistry> {
	Arc::new(SerializerRegistry::with_builtins())
}

pub async fn write_file(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await.unwrap();
	}
	fs::write(path, contents).await.unwrap();
}

/// Config keeping everything below `dir`, with the homepage left alone
pub fn config(dir: &Path) -> RepositoryConfig {
	let mut config = RepositoryConfig::default_with_dir(dir);
	config.create_homepage = false;
	config
}

/// Lay out a small site archive under `config`'s archive location:
/// a homepage, an about page with a draft and an archived revision, and a
/// bilingual terms file
pub async fn write_archive(config: &RepositoryConfig) -> PathBuf {
	let root = config.archive_location();

	write_file(
		root.join("pages/index.xml"),
		r#"<page path="/">
	<head owner="admin"/>
	<properties><property name="template" value="home"/></properties>
</page>"#,
	)
	.await;

	for (file, title) in [("index.xml", "About us"), ("work.xml", "About us (draft)"), ("1.xml", "About")] {
		write_file(
			root.join("pages/about").join(file),
			format!(
				r#"<page path="/about">
	<head owner="editor">
		<created user="editor" date="2024-05-01T10:00:00Z"/>
		<tags><tag name="company"/></tags>
	</head>
	<properties><property name="title" value="{title}"/></properties>
</page>"#
			),
		)
		.await;
	}

	write_file(
		root.join("files/docs/terms/index.xml"),
		r#"<file path="/docs/terms">
	<head owner="legal"/>
	<contents>
		<content language="en" filename="terms.txt"/>
		<content language="de" filename="agb.txt"/>
	</contents>
</file>"#,
	)
	.await;
	write_file(root.join("files/docs/terms/en.txt"), "Terms and conditions").await;
	write_file(root.join("files/docs/terms/de.txt"), "Allgemeine Geschaeftsbedingungen").await;

	root
}

/// A writable repository on `config`'s store, bootstrapping from its archive
pub fn writable(config: &RepositoryConfig) -> WritableRepository {
	let site = site();
	let store_root = config.store_root.clone().unwrap().join(&site.identifier);
	let index_location = config.index_location(&site.identifier);

	WritableRepository::new(site, FilesystemStore::new(store_root), registry(), index_location)
		.with_archive(ArchiveStore::new(config.archive_location()))
		.with_homepage(config.create_homepage)
}

/// Where a writable store under `dir` keeps every version of a resource
pub fn stored_resource_dir(dir: &Path, type_directory: &str, identifier: &str) -> PathBuf {
	let (first, second) = folio_utils::shard_directories(identifier);
	dir.join("store")
		.join(SITE)
		.join(type_directory)
		.join(first)
		.join(second)
		.join(identifier)
}
