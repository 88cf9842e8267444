use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::Version;

/// Points at one version of a resource inside a site
///
/// A URI may know only the identifier, only the path, or both; the index fills in
/// whatever is missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUri {
	pub site: String,
	pub identifier: Option<String>,
	pub path: Option<String>,
	pub resource_type: Option<String>,
	pub version: Version,
}

impl ResourceUri {
	pub fn new(site: impl Into<String>) -> Self {
		Self {
			site: site.into(),
			identifier: None,
			path: None,
			resource_type: None,
			version: Version::Live,
		}
	}

	/// URI of the live version of `path`
	pub fn for_path(site: impl Into<String>, path: impl Into<String>) -> Self {
		Self::new(site).with_path(path)
	}

	/// URI of the live version of the resource with `identifier`
	pub fn for_identifier(site: impl Into<String>, identifier: impl Into<String>) -> Self {
		Self::new(site).with_identifier(identifier)
	}

	#[must_use]
	pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
		self.identifier = Some(identifier.into());
		self
	}

	#[must_use]
	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(normalize_path(&path.into()));
		self
	}

	#[must_use]
	pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
		self.resource_type = Some(resource_type.into());
		self
	}

	#[must_use]
	pub const fn with_version(mut self, version: Version) -> Self {
		self.version = version;
		self
	}

	#[must_use]
	pub fn identifier(&self) -> Option<&str> {
		self.identifier.as_deref()
	}

	#[must_use]
	pub fn path(&self) -> Option<&str> {
		self.path.as_deref()
	}

	#[must_use]
	pub fn resource_type(&self) -> Option<&str> {
		self.resource_type.as_deref()
	}
}

impl fmt::Display for ResourceUri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:", self.site)?;
		if let Some(resource_type) = &self.resource_type {
			write!(f, "{resource_type}:")?;
		}
		match (&self.path, &self.identifier) {
			(Some(path), Some(id)) => write!(f, "{path} ({id})")?,
			(Some(path), None) => f.write_str(path)?,
			(None, Some(id)) => write!(f, "({id})")?,
			(None, None) => f.write_str("?")?,
		}
		write!(f, "@{}", self.version)
	}
}

/// Canonical form of a site relative path: absolute, no duplicate or trailing slashes
#[must_use]
pub fn normalize_path(path: &str) -> String {
	format!("/{}", path.split('/').filter(|s| !s.is_empty()).join("/"))
}
