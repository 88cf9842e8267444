//! Content repositories
//!
//! A [`ReadRepository`] serves a site's resources out of any [`BackingStore`]; a
//! [`WritableRepository`] adds mutation on top of a filesystem store that gets
//! populated from the site's archive the first time it is connected.
//!
//! [`BackingStore`]: crate::store::BackingStore

use std::sync::Arc;

use strum::Display;
use tokio::fs::File;
use tracing::info;

use crate::{
	config::{RepositoryConfig, RepositoryKind},
	domain::{Language, Resource, ResourceUri, Site},
	error::Result,
	events::RepositoryEvent,
	serializer::SerializerRegistry,
	store::{ArchiveStore, FilesystemStore},
};

mod bootstrap;
mod read;
mod write;

pub use read::ReadRepository;
pub use write::WritableRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RepositoryState {
	Disconnected,
	Connected,
	Started,
	Stopped,
}

/// A connected repository of whichever kind the configuration asked for
#[derive(Debug)]
pub enum Repository {
	Archive(ReadRepository<ArchiveStore>),
	Filesystem(WritableRepository),
}

macro_rules! dispatch {
	($self:ident, $repository:ident => $body:expr) => {
		match $self {
			Self::Archive($repository) => $body,
			Self::Filesystem($repository) => $body,
		}
	};
}

impl Repository {
	#[must_use]
	pub fn kind(&self) -> RepositoryKind {
		match self {
			Self::Archive(_) => RepositoryKind::Archive,
			Self::Filesystem(_) => RepositoryKind::Filesystem,
		}
	}

	/// The writable repository, unless this one only serves an archive
	#[must_use]
	pub const fn as_writable(&self) -> Option<&WritableRepository> {
		match self {
			Self::Archive(_) => None,
			Self::Filesystem(repository) => Some(repository),
		}
	}

	#[must_use]
	pub fn is_read_only(&self) -> bool {
		dispatch!(self, repository => repository.is_read_only())
	}

	pub fn start(&self) -> Result<()> {
		dispatch!(self, repository => repository.start())
	}

	pub fn stop(&self) -> Result<()> {
		dispatch!(self, repository => repository.stop())
	}

	pub async fn exists(&self, uri: &ResourceUri) -> Result<bool> {
		dispatch!(self, repository => repository.exists(uri).await)
	}

	pub async fn get(&self, uri: &ResourceUri) -> Result<Option<Resource>> {
		dispatch!(self, repository => repository.get(uri).await)
	}

	pub async fn get_versions(&self, uri: &ResourceUri) -> Result<Vec<ResourceUri>> {
		dispatch!(self, repository => repository.get_versions(uri).await)
	}

	pub async fn list_resources(&self) -> Result<Vec<ResourceUri>> {
		dispatch!(self, repository => repository.list_resources().await)
	}

	pub async fn load_resource_content(&self, uri: &ResourceUri, language: &Language) -> Result<Option<File>> {
		dispatch!(self, repository => repository.load_resource_content(uri, language).await)
	}

	pub async fn resource_count(&self) -> Result<usize> {
		dispatch!(self, repository => repository.resource_count().await)
	}

	pub async fn revision_count(&self) -> Result<usize> {
		dispatch!(self, repository => repository.revision_count().await)
	}

	#[must_use]
	pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RepositoryEvent> {
		dispatch!(self, repository => repository.subscribe())
	}

	pub async fn disconnect(&self) -> Result<()> {
		dispatch!(self, repository => repository.disconnect().await)
	}
}

/// Build and connect the repository `config` describes for `site`
pub async fn open_repository(
	config: &RepositoryConfig,
	site: Site,
	registry: Arc<SerializerRegistry>,
) -> Result<Repository> {
	config.validate()?;
	let kind = config.repository_kind()?;
	let index_location = config.index_location(&site.identifier);
	info!(site = %site.identifier, %kind, "Opening repository");

	let repository = match kind {
		RepositoryKind::Archive => {
			let repository = ReadRepository::new(
				site,
				ArchiveStore::new(config.archive_location()),
				registry,
				index_location,
			)
			.with_event_capacity(config.event_capacity);
			repository.connect().await?;
			Repository::Archive(repository)
		}
		RepositoryKind::Filesystem => {
			// validate() made sure there is one
			let store_root = config.store_root.clone().unwrap_or_default();
			let store = FilesystemStore::new(store_root.join(&site.identifier));
			let repository = WritableRepository::new(site, store, registry, index_location)
				.with_archive(ArchiveStore::new(config.archive_location()))
				.with_homepage(config.create_homepage)
				.with_event_capacity(config.event_capacity);
			repository.connect().await?;
			Repository::Filesystem(repository)
		}
	};

	Ok(repository)
}
