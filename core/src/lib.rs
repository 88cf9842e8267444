#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::as_conversions,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

//! Versioned resource repository of a folio site: locators, serializers, the
//! repository index and the read and write repositories on top of them.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod index;
pub mod logging;
pub mod repository;
pub mod search;
pub mod serializer;
pub mod store;

pub use config::{RepositoryConfig, RepositoryKind};
pub use domain::{Language, Resource, ResourceContent, ResourceUri, Site, Version};
pub use error::{RepositoryError, Result};
pub use events::{EventBus, RepositoryEvent};
pub use index::RepositoryIndex;
pub use repository::{open_repository, ReadRepository, Repository, RepositoryState, WritableRepository};
pub use serializer::{Serializer, SerializerRegistry};
pub use store::{ArchiveStore, BackingStore, FilesystemStore};
