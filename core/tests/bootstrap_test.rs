mod helpers;
use helpers::*;

use folio_core::{
	serializer::builtin::PAGE, Language, RepositoryError, RepositoryEvent, RepositoryState,
	ResourceUri, Version,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use tokio::{fs, io::AsyncReadExt};

#[tokio::test]
async fn empty_store_is_filled_from_archive() {
	let _ = tracing_subscriber::fmt::try_init();
	let dir = tempdir().unwrap();
	let config = config(dir.path());
	write_archive(&config).await;

	let repository = writable(&config);
	let mut events = repository.subscribe();
	repository.connect().await.unwrap();

	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES);
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS);

	let about = ResourceUri::for_path(SITE, "/about");
	let versions = repository
		.get_versions(&about)
		.await
		.unwrap()
		.into_iter()
		.map(|uri| uri.version)
		.collect::<Vec<_>>();
	assert_eq!(versions, vec![Version::Live, Version::Work, Version::Revision(1)]);

	let terms = ResourceUri::for_path(SITE, "/docs/terms");
	let resource = repository.get(&terms).await.unwrap().unwrap();
	assert_eq!(
		resource.content(&Language::new("en")).and_then(|c| c.size),
		Some("Terms and conditions".len() as u64)
	);
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

	let mut stored = 0;
	let mut bootstrapped = None;
	while let Ok(event) = events.try_recv() {
		match event {
			RepositoryEvent::Stored(_) => stored += 1,
			RepositoryEvent::Bootstrapped { resources, revisions } => {
				bootstrapped = Some((resources, revisions));
			}
			_ => {}
		}
	}
	assert_eq!(stored, ARCHIVED_REVISIONS);
	assert_eq!(bootstrapped, Some((ARCHIVED_RESOURCES, ARCHIVED_REVISIONS)));
}

#[tokio::test]
async fn populated_store_is_left_alone() {
	let dir = tempdir().unwrap();
	let config = config(dir.path());
	let archive = write_archive(&config).await;

	let repository = writable(&config);
	repository.connect().await.unwrap();
	let about = repository
		.get(&ResourceUri::for_path(SITE, "/about"))
		.await
		.unwrap()
		.unwrap();
	repository.disconnect().await.unwrap();

	// Archive changes don't matter once the store has content
	write_file(archive.join("pages/contact/index.xml"), r#"<page path="/contact"/>"#).await;

	let repository = writable(&config);
	repository.connect().await.unwrap();
	assert!(!repository.bootstrap().await.unwrap());
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES);
	assert_eq!(repository.revision_count().await.unwrap(), ARCHIVED_REVISIONS);
	assert_eq!(
		repository
			.get(&ResourceUri::for_path(SITE, "/about"))
			.await
			.unwrap()
			.unwrap()
			.identifier(),
		about.identifier()
	);
	assert!(!repository
		.exists(&ResourceUri::for_path(SITE, "/contact"))
		.await
		.unwrap());
}

#[tokio::test]
async fn failed_bootstrap_leaves_nothing_behind() {
	let _ = tracing_subscriber::fmt::try_init();
	let dir = tempdir().unwrap();
	let config = config(dir.path());
	let archive = config.archive_location();

	// One identifier claimed by two resource types
	write_file(archive.join("files/a/index.xml"), r#"<file id="same" path="/a"/>"#).await;
	write_file(archive.join("pages/b/index.xml"), r#"<page id="same" path="/b"/>"#).await;

	let repository = writable(&config);
	let result = repository.connect().await;
	assert!(
		matches!(result, Err(RepositoryError::Bootstrap(_))),
		"unexpected outcome: {result:?}"
	);

	assert_eq!(repository.state(), RepositoryState::Disconnected);
	assert!(fs::metadata(config.store_root.as_ref().unwrap().join(SITE))
		.await
		.is_err());
	assert!(fs::metadata(config.index_location(SITE)).await.is_err());
	assert!(matches!(
		repository.resource_count().await,
		Err(RepositoryError::IllegalState(_))
	));
}

#[tokio::test]
async fn descriptions_without_payload_are_dropped() {
	let dir = tempdir().unwrap();
	let config = config(dir.path());
	let archive = write_archive(&config).await;
	write_file(
		archive.join("files/docs/manual/index.xml"),
		r#"<file path="/docs/manual">
	<contents>
		<content language="en" filename="manual.pdf"/>
		<content language="de" filename="handbuch.pdf"/>
	</contents>
</file>"#,
	)
	.await;
	write_file(archive.join("files/docs/manual/de.pdf"), "Handbuch").await;

	let repository = writable(&config);
	repository.connect().await.unwrap();

	let manual = repository
		.get(&ResourceUri::for_path(SITE, "/docs/manual"))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(
		manual.contents.keys().cloned().collect::<Vec<_>>(),
		vec![Language::new("de")]
	);
	assert_eq!(
		manual.content(&Language::new("de")).and_then(|c| c.size),
		Some("Handbuch".len() as u64)
	);
}

#[tokio::test]
async fn missing_archive_means_an_empty_store() {
	let dir = tempdir().unwrap();
	let config = config(dir.path());

	let repository = writable(&config);
	repository.connect().await.unwrap();

	assert_eq!(repository.resource_count().await.unwrap(), 0);
	assert!(!repository.is_read_only());
}

#[tokio::test]
async fn homepage_is_created_when_missing() {
	let dir = tempdir().unwrap();
	let mut config = config(dir.path());
	config.create_homepage = true;

	let repository = writable(&config);
	repository.connect().await.unwrap();

	let home = repository
		.get(&ResourceUri::for_path(SITE, "/").with_type(PAGE))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(home.head.owner.as_deref(), Some("admin"));
	assert!(home.head.created.is_some());
	assert!(home
		.head
		.published
		.as_ref()
		.is_some_and(|published| published.is_published_at(chrono::Utc::now())));
	assert_eq!(repository.resource_count().await.unwrap(), 1);
}

#[tokio::test]
async fn archived_homepage_is_kept() {
	let dir = tempdir().unwrap();
	let mut config = config(dir.path());
	config.create_homepage = true;
	write_archive(&config).await;

	let repository = writable(&config);
	repository.connect().await.unwrap();

	let home = repository
		.get(&ResourceUri::for_path(SITE, "/"))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(
		home.properties.get("template").map(String::as_str),
		Some("home")
	);
	assert_eq!(repository.resource_count().await.unwrap(), ARCHIVED_RESOURCES);
}
