mod helpers;
use helpers::*;

use folio_core::{
	domain::Modification,
	serializer::builtin::{FILE, PAGE},
	Language, RepositoryError, RepositoryEvent, Resource, ResourceContent, ResourceUri, Version,
	WritableRepository,
};
use pretty_assertions::assert_eq;
use tempfile::{tempdir, TempDir};
use tokio::{fs, io::AsyncReadExt};

async fn bootstrapped() -> (TempDir, WritableRepository) {
	let _ = tracing_subscriber::fmt::try_init();
	let dir = tempdir().unwrap();
	let config = config(dir.path());
	write_archive(&config).await;

	let repository = writable(&config);
	repository.connect().await.unwrap();
	(dir, repository)
}

fn about() -> ResourceUri {
	ResourceUri::for_path(SITE, "/about")
}

fn terms() -> ResourceUri {
	ResourceUri::for_path(SITE, "/docs/terms")
}

#[tokio::test]
async fn stored_resources_read_back() {
	let (dir, repository) = bootstrapped().await;

	let mut news = Resource::new(
		ResourceUri::for_path(SITE, "/news")
			.with_type(PAGE)
			.with_version(Version::Work),
	);
	news.head.owner = Some("editor".to_string());
	news.head.created = Some(Modification::now("editor"));
	news.properties.insert("title".to_string(), "News & events".to_string());

	let stored = repository.put(news).await.unwrap();
	let identifier = stored.identifier().unwrap().to_string();

	let read = repository
		.get(&ResourceUri::for_path(SITE, "/news").with_version(Version::Work))
		.await
		.unwrap();
	assert_eq!(read.as_ref(), Some(&stored));
	assert!(!repository.exists(&ResourceUri::for_path(SITE, "/news")).await.unwrap());

	// Documents are spread by identifier, one directory per version
	let (first, second) = folio_utils::shard_directories(&identifier);
	let document = dir
		.path()
		.join("store")
		.join(SITE)
		.join("pages")
		.join(first)
		.join(second)
		.join(&identifier)
		.join("work")
		.join("index.xml");
	assert!(fs::metadata(&document).await.is_ok(), "{} is missing", document.display());

	// Storing the same path again updates rather than adds
	let mut changed = stored.clone();
	changed.properties.insert("title".to_string(), "News".to_string());
	let changed = repository.put(changed).await.unwrap();
	assert_eq!(changed.identifier(), Some(identifier.as_str()));
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES + 1);
}

#[tokio::test]
async fn paths_belong_to_one_resource() {
	let (_dir, repository) = bootstrapped().await;

	let live = repository.get(&about()).await.unwrap().unwrap();
	let mut other = Resource::new(
		ResourceUri::for_path(SITE, "/about")
			.with_identifier("someone-else")
			.with_type(PAGE),
	);
	other.head.owner = Some("intruder".to_string());

	assert!(matches!(
		repository.put(other).await,
		Err(RepositoryError::Duplicate(_))
	));
	assert!(!repository
		.exists(&ResourceUri::for_identifier(SITE, "someone-else"))
		.await
		.unwrap());
	assert_eq!(repository.get(&about()).await.unwrap(), Some(live));
}

#[tokio::test]
async fn payloads_are_attached_and_removed() {
	let (_dir, repository) = bootstrapped().await;

	let readme = repository
		.put(Resource::new(
			ResourceUri::for_path(SITE, "/docs/readme").with_type(FILE),
		))
		.await
		.unwrap();

	let stored = repository
		.put_content(
			&readme.uri,
			ResourceContent::new("en".into()).with_filename("readme.md"),
			&b"hello"[..],
		)
		.await
		.unwrap();
	let content = stored.content(&Language::new("en")).unwrap();
	assert_eq!(content.size, Some(5));
	assert_eq!(content.storage_name(), "en.md");

	let mut payload = String::new();
	repository
		.load_resource_content(&readme.uri, &Language::new("en"))
		.await
		.unwrap()
		.unwrap()
		.read_to_string(&mut payload)
		.await
		.unwrap();
	assert_eq!(payload, "hello");

	let german = Language::new("de");
	let remaining = repository.delete_content(&terms(), &german).await.unwrap();
	assert!(remaining.content(&german).is_none());
	assert!(remaining.content(&Language::new("en")).is_some());
	assert!(repository
		.load_resource_content(&terms(), &german)
		.await
		.unwrap()
		.is_none());
	assert!(repository
		.delete_content(&terms(), &german)
		.await
		.is_err_and(|e| e.is_not_found()));
}

#[tokio::test]
async fn deleted_resources_are_gone_everywhere() {
	let (dir, repository) = bootstrapped().await;
	let identifier = repository
		.get(&about())
		.await
		.unwrap()
		.unwrap()
		.identifier()
		.unwrap()
		.to_string();

	// Only the draft
	assert!(repository
		.delete(&about().with_version(Version::Work), false)
		.await
		.unwrap());
	assert!(!repository
		.exists(&about().with_version(Version::Work))
		.await
		.unwrap());
	assert!(repository.exists(&about()).await.unwrap());
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS - 1);

	// Everything else
	assert!(repository.delete(&about(), true).await.unwrap());
	for version in [Version::Live, Version::Work, Version::Revision(1)] {
		assert!(!repository.exists(&about().with_version(version)).await.unwrap());
	}
	assert!(!repository.exists_in_any_version(&about()).await.unwrap());
	assert!(repository.get(&about()).await.unwrap().is_none());
	assert!(repository.get_versions(&about()).await.unwrap().is_empty());
	assert!(repository.get_resource_uri(&identifier).await.unwrap().is_none());
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES - 1);
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS - 3);

	let (first, second) = folio_utils::shard_directories(&identifier);
	let shard = dir.path().join("store").join(SITE).join("pages").join(first).join(second);
	assert!(fs::metadata(shard.join(&identifier)).await.is_err());

	assert!(!repository.delete(&about(), true).await.unwrap());
}

#[tokio::test]
async fn moves_keep_identity_and_history() {
	let (_dir, repository) = bootstrapped().await;
	let mut events = repository.subscribe();
	let before = repository.get(&about()).await.unwrap().unwrap();

	assert!(repository.move_to(&about(), "/company/about").await.unwrap());

	let moved = ResourceUri::for_path(SITE, "/company/about");
	let after = repository.get(&moved).await.unwrap().unwrap();
	assert_eq!(after.identifier(), before.identifier());
	assert_eq!(after.properties, before.properties);
	assert!(repository.get(&about()).await.unwrap().is_none());

	let draft = repository
		.get(&moved.clone().with_version(Version::Work))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(draft.path(), Some("/company/about"));

	// Archived revisions stay where they were published
	let archived = repository
		.get_versions(&moved)
		.await
		.unwrap()
		.into_iter()
		.find(|uri| uri.version == Version::Revision(1))
		.unwrap();
	assert_eq!(archived.path.as_deref(), Some("/about"));

	assert!(matches!(
		events.try_recv(),
		Ok(RepositoryEvent::Moved { to, .. }) if to.path.as_deref() == Some("/company/about")
	));
}

#[tokio::test]
async fn moves_carry_children_and_payloads() {
	let (_dir, repository) = bootstrapped().await;

	assert!(!repository
		.move_to(&ResourceUri::for_path(SITE, "/docs"), "/x")
		.await
		.unwrap());
	repository
		.put(Resource::new(ResourceUri::for_path(SITE, "/docs").with_type(PAGE)))
		.await
		.unwrap();

	assert!(repository
		.move_to(&ResourceUri::for_path(SITE, "/docs"), "/legal")
		.await
		.unwrap());

	let terms = ResourceUri::for_path(SITE, "/legal/terms");
	assert!(repository.exists(&terms).await.unwrap());
	let mut payload = String::new();
	repository
		.load_resource_content(&terms, &Language::new("en"))
		.await
		.unwrap()
		.unwrap()
		.read_to_string(&mut payload)
		.await
		.unwrap();
	assert_eq!(payload, "Terms and conditions");
}

#[tokio::test]
async fn moves_refuse_taken_paths() {
	let (_dir, repository) = bootstrapped().await;

	assert!(matches!(
		repository.move_to(&terms(), "/about").await,
		Err(RepositoryError::Duplicate(_))
	));
	assert!(matches!(
		repository.move_to(&about(), "/about/inner").await,
		Err(RepositoryError::IllegalState(_))
	));
	assert!(repository.exists(&terms()).await.unwrap());
	assert!(repository.exists(&about()).await.unwrap());
}

#[tokio::test]
async fn locks_keep_other_editors_out() {
	let (_dir, repository) = bootstrapped().await;

	let locked = repository
		.lock(&about().with_version(Version::Work), "editor")
		.await
		.unwrap();
	assert_eq!(locked.version(), Version::Work);
	assert_eq!(locked.head.locked_by.as_deref(), Some("editor"));
	assert!(repository.is_locked(&about()).await.unwrap());

	assert!(matches!(
		repository.lock(&about(), "someone").await,
		Err(RepositoryError::Locked { owner, .. }) if owner == "editor"
	));

	// A head that names no editor can't be the lock holder's
	let anonymous = Resource::new(about().with_type(PAGE));
	assert!(matches!(
		repository.put(anonymous).await,
		Err(RepositoryError::Locked { owner, .. }) if owner == "editor"
	));

	let mut edit = repository.get(&about()).await.unwrap().unwrap();
	edit.head.modified = Some(Modification::now("someone"));
	assert!(matches!(
		repository.put(edit.clone()).await,
		Err(RepositoryError::Locked { .. })
	));

	edit.head.modified = Some(Modification::now("editor"));
	edit.head.locked_by = None;
	let stored = repository.put(edit.clone()).await.unwrap();
	assert_eq!(stored.head.locked_by.as_deref(), Some("editor"));

	// The archived head was created by the lock holder
	edit.head.modified = None;
	assert!(repository.put(edit).await.is_ok());

	assert!(repository.unlock(&about()).await.unwrap());
	assert!(!repository.is_locked(&about().with_version(Version::Work)).await.unwrap());
	assert!(!repository.unlock(&about()).await.unwrap());
}

#[tokio::test]
async fn reindexing_finds_the_same_resources() {
	let (_dir, repository) = bootstrapped().await;
	let identifier = repository
		.get(&about())
		.await
		.unwrap()
		.unwrap()
		.identifier()
		.map(ToString::to_string);
	let mut events = repository.subscribe();

	repository.index().await.unwrap();

	assert!(!repository.is_indexing());
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES);
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS);
	assert_eq!(
		repository
			.get(&about())
			.await
			.unwrap()
			.unwrap()
			.identifier()
			.map(ToString::to_string),
		identifier
	);
	assert_eq!(
		events.try_recv().ok(),
		Some(RepositoryEvent::Indexed {
			resources: ARCHIVED_RESOURCES,
			revisions: ARCHIVED_REVISIONS,
		})
	);
}

#[tokio::test]
async fn heads_must_match_stored_payloads() {
	let (_dir, repository) = bootstrapped().await;
	let english = Language::new("en");

	let ghost_uri = ResourceUri::for_path(SITE, "/docs/ghost");
	let mut ghost = Resource::new(ghost_uri.clone().with_type(FILE));
	ghost.add_content(ResourceContent::new(english.clone()).with_filename("ghost.txt"));
	assert!(matches!(
		repository.put(ghost).await,
		Err(RepositoryError::ContentMismatch { .. })
	));
	assert!(!repository.exists_in_any_version(&ghost_uri).await.unwrap());

	let stored = repository.get(&terms()).await.unwrap().unwrap();

	let mut stripped = stored.clone();
	stripped.contents.clear();
	assert!(matches!(
		repository.put(stripped).await,
		Err(RepositoryError::ContentMismatch { .. })
	));

	let mut renamed = stored.clone();
	if let Some(content) = renamed.contents.get_mut(&english) {
		content.filename = Some("terms.pdf".to_string());
	}
	assert!(matches!(
		repository.put(renamed).await,
		Err(RepositoryError::ContentMismatch { .. })
	));

	assert_eq!(repository.get(&terms()).await.unwrap().as_ref(), Some(&stored));
	assert!(repository
		.load_resource_content(&terms(), &english)
		.await
		.unwrap()
		.is_some());

	// Edits around the contents go through, sizes stay those of the payloads
	let mut edited = stored.clone();
	edited.properties.insert("title".to_string(), "Terms".to_string());
	if let Some(content) = edited.contents.get_mut(&english) {
		content.size = Some(1);
	}
	let edited = repository.put(edited).await.unwrap();
	assert_eq!(
		edited.content(&english).and_then(|content| content.size),
		Some("Terms and conditions".len() as u64)
	);
	assert_eq!(edited.properties.get("title").map(String::as_str), Some("Terms"));
}

#[tokio::test]
async fn failed_moves_change_nothing() {
	let (dir, repository) = bootstrapped().await;
	let docs = ResourceUri::for_path(SITE, "/docs");
	repository
		.put(Resource::new(docs.clone().with_type(PAGE)))
		.await
		.unwrap();
	let terms_id = repository
		.get(&terms())
		.await
		.unwrap()
		.unwrap()
		.identifier()
		.unwrap()
		.to_string();

	// The child's document can't be read, so the parent mustn't be touched either
	let document = stored_resource_dir(dir.path(), "files", &terms_id).join("live/index.xml");
	fs::remove_file(&document).await.unwrap();
	fs::create_dir(&document).await.unwrap();

	assert!(repository.move_to(&docs, "/legal").await.is_err());

	let parent = repository.get(&docs).await.unwrap().unwrap();
	assert_eq!(parent.path(), Some("/docs"));
	assert!(!repository
		.exists(&ResourceUri::for_path(SITE, "/legal"))
		.await
		.unwrap());
	assert!(repository.exists(&terms()).await.unwrap());
}

#[tokio::test]
async fn partial_deletes_keep_the_index_in_step() {
	let (dir, repository) = bootstrapped().await;
	let identifier = repository
		.get(&about())
		.await
		.unwrap()
		.unwrap()
		.identifier()
		.unwrap()
		.to_string();

	// A revision the store fails to remove
	let archived = stored_resource_dir(dir.path(), "pages", &identifier).join("1");
	fs::remove_dir_all(&archived).await.unwrap();
	fs::write(&archived, "not a directory").await.unwrap();

	assert!(repository.delete(&about(), true).await.is_err());

	assert!(!repository.exists(&about()).await.unwrap());
	assert!(!repository
		.exists(&about().with_version(Version::Work))
		.await
		.unwrap());
	assert_eq!(
		repository
			.get_versions(&ResourceUri::for_identifier(SITE, &identifier))
			.await
			.unwrap()
			.into_iter()
			.map(|uri| uri.version)
			.collect::<Vec<_>>(),
		vec![Version::Revision(1)]
	);
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES);
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS - 2);
}
