//! Resources are single versions of a logical content item: a version invariant
//! head plus at most one content entry per language.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Language, ResourceUri, Version};

/// Who touched a resource, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
	pub user: String,
	pub date: DateTime<Utc>,
}

impl Modification {
	pub fn now(user: impl Into<String>) -> Self {
		Self {
			user: user.into(),
			date: Utc::now(),
		}
	}
}

/// Publishing window, open ended when `to` is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
	pub user: String,
	pub from: DateTime<Utc>,
	pub to: Option<DateTime<Utc>>,
}

impl Publication {
	#[must_use]
	pub fn is_published_at(&self, at: DateTime<Utc>) -> bool {
		self.from <= at && self.to.map_or(true, |to| at < to)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHead {
	pub owner: Option<String>,
	pub created: Option<Modification>,
	pub modified: Option<Modification>,
	pub published: Option<Publication>,
	pub locked_by: Option<String>,
	pub tags: BTreeSet<String>,
}

impl ResourceHead {
	/// Who made the latest change: the last modifier, else the creator
	#[must_use]
	pub fn editor(&self) -> Option<&str> {
		self.modified
			.as_ref()
			.or(self.created.as_ref())
			.map(|change| change.user.as_str())
	}
}

/// Describes the payload stored for one language; the bytes themselves are streamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContent {
	pub language: Language,
	pub filename: Option<String>,
	pub mimetype: Option<String>,
	pub size: Option<u64>,
	pub properties: BTreeMap<String, String>,
}

impl ResourceContent {
	pub fn new(language: Language) -> Self {
		Self {
			language,
			filename: None,
			mimetype: None,
			size: None,
			properties: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
		self.filename = Some(filename.into());
		self
	}

	#[must_use]
	pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
		self.mimetype = Some(mimetype.into());
		self
	}

	/// Name the payload is stored under: the language, plus the filename's extension
	#[must_use]
	pub fn storage_name(&self) -> String {
		match self
			.filename
			.as_deref()
			.and_then(folio_utils::extension_of)
		{
			Some(ext) => format!("{}.{ext}", self.language),
			None => self.language.to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
	pub uri: ResourceUri,
	pub head: ResourceHead,
	/// Type specific attributes, such as a page's template
	pub properties: BTreeMap<String, String>,
	pub contents: BTreeMap<Language, ResourceContent>,
}

impl Resource {
	pub fn new(uri: ResourceUri) -> Self {
		Self {
			uri,
			head: ResourceHead::default(),
			properties: BTreeMap::new(),
			contents: BTreeMap::new(),
		}
	}

	#[must_use]
	pub fn identifier(&self) -> Option<&str> {
		self.uri.identifier()
	}

	#[must_use]
	pub fn path(&self) -> Option<&str> {
		self.uri.path()
	}

	#[must_use]
	pub fn resource_type(&self) -> Option<&str> {
		self.uri.resource_type()
	}

	#[must_use]
	pub const fn version(&self) -> Version {
		self.uri.version
	}

	/// Adds or replaces the content for the content's language
	pub fn add_content(&mut self, content: ResourceContent) -> Option<ResourceContent> {
		self.contents.insert(content.language.clone(), content)
	}

	pub fn remove_content(&mut self, language: &Language) -> Option<ResourceContent> {
		self.contents.remove(language)
	}

	#[must_use]
	pub fn content(&self, language: &Language) -> Option<&ResourceContent> {
		self.contents.get(language)
	}

	#[must_use]
	pub fn is_locked(&self) -> bool {
		self.head.locked_by.is_some()
	}
}
