//! First time population of a writable store from the site's archive

use folio_utils::error::report_error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::{read::load_resources, RepositoryState, WritableRepository};
use crate::{
	error::{RepositoryError, Result},
	events::RepositoryEvent,
	store::{ArchiveStore, BackingStore},
};

impl WritableRepository {
	/// Copy the archive into the store, unless the store already holds anything
	///
	/// Returns whether a copy took place. Any failure removes the whole store and the
	/// index, leaving things as if the repository had never been connected.
	pub async fn bootstrap(&self) -> Result<bool> {
		let _mutation = self.mutation.lock().await;
		self.bootstrap_locked().await
	}

	pub(super) async fn bootstrap_locked(&self) -> Result<bool> {
		let site = &self.site().identifier;
		let Some(archive) = &self.archive else {
			debug!(%site, "No archive to bootstrap from");
			return Ok(false);
		};

		for serializer in self.registry().serializers() {
			if self.store().has_entries(&serializer.directory()).await? {
				debug!(
					%site,
					resource_type = serializer.resource_type(),
					"Store already has content, skipping bootstrap"
				);
				return Ok(false);
			}
		}

		if fs::metadata(archive.root()).await.is_err() {
			warn!(%site, archive = %archive.root().display(), "Archive is missing, nothing to bootstrap from");
			return Ok(false);
		}

		info!(%site, archive = %archive.root().display(), "Bootstrapping store from archive");
		match self.copy_archive(archive).await {
			Ok((resources, revisions)) => {
				info!(%site, resources, revisions, "Bootstrapped store");
				self.events()
					.emit(RepositoryEvent::Bootstrapped { resources, revisions });
				Ok(true)
			}
			Err(e) => {
				error!(%site, "Bootstrap failed, removing store and index: {e:#}");
				if let Some(index) = self.take_index().await {
					report_error(&index.discard().await);
				}
				self.set_state(RepositoryState::Disconnected);
				report_error(&self.store().remove_root().await);
				Err(RepositoryError::Bootstrap(Box::new(e)))
			}
		}
	}

	async fn copy_archive(&self, archive: &ArchiveStore) -> Result<(usize, usize)> {
		let resources = load_resources(archive, self.registry(), self.site()).await?;

		for mut resource in resources {
			let source = resource.uri.clone();

			let languages = resource.contents.keys().cloned().collect::<Vec<_>>();
			let mut payloads = Vec::with_capacity(languages.len());
			for language in languages {
				let Some(content) = resource.remove_content(&language) else {
					continue;
				};
				match archive.open_content(&source, &language).await? {
					Some(file) => payloads.push((content, file)),
					None => warn!(
						uri = %source,
						%language,
						"Archived content has no payload, dropping its description"
					),
				}
			}

			let stored = self.store_resource(resource).await?;
			for (content, file) in payloads {
				self.store_content(&stored.uri, content, file).await?;
			}
		}

		let index = self.read_index().await?;
		Ok((index.resource_count(), index.revision_count()))
	}
}
