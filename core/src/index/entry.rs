use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ResourceUri, Version};

/// Everything the index knows about one logical resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
	pub identifier: String,
	pub resource_type: String,
	/// Path each stored version lives at; archived revisions keep the path they had
	pub revisions: BTreeMap<Version, Option<String>>,
}

impl IndexEntry {
	pub(super) fn new(identifier: String, resource_type: String) -> Self {
		Self {
			identifier,
			resource_type,
			revisions: BTreeMap::new(),
		}
	}

	/// Path of the published version, falling back to the draft and then the newest revision
	#[must_use]
	pub fn current_path(&self) -> Option<&str> {
		self.revisions
			.get(&Version::Live)
			.or_else(|| self.revisions.get(&Version::Work))
			.or_else(|| self.revisions.values().next_back())
			.and_then(Option::as_deref)
	}

	#[must_use]
	pub fn path_of(&self, version: Version) -> Option<&str> {
		self.revisions.get(&version).and_then(Option::as_deref)
	}

	#[must_use]
	pub fn has_path(&self, path: &str) -> bool {
		self.revisions.values().any(|p| p.as_deref() == Some(path))
	}

	pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
		self.revisions.keys().copied()
	}

	/// Full URI of one of this entry's versions
	#[must_use]
	pub fn uri(&self, site: &str, version: Version) -> ResourceUri {
		let mut uri = ResourceUri::for_identifier(site, &self.identifier)
			.with_type(&self.resource_type)
			.with_version(version);
		uri.path = self
			.path_of(version)
			.or_else(|| self.current_path())
			.map(ToString::to_string);
		uri
	}
}
