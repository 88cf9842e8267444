//! Sites are the tenant boundary: every resource, index and store belongs to exactly one.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, Result};

/// A language identifier such as `de` or `fr`, always stored lower-cased
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
	pub fn new(identifier: impl AsRef<str>) -> Self {
		Self(identifier.as_ref().trim().to_ascii_lowercase())
	}

	#[must_use]
	pub fn identifier(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Language {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Language {
	fn from(identifier: &str) -> Self {
		Self::new(identifier)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
	pub identifier: String,
	languages: BTreeSet<Language>,
	default_language: Language,
	/// Login of the user new content is attributed to when nobody else is
	#[serde(default = "default_administrator")]
	pub administrator: String,
}

fn default_administrator() -> String {
	"admin".to_string()
}

impl Site {
	/// Create a site, making sure its default language is one of its languages
	pub fn new(
		identifier: impl Into<String>,
		languages: impl IntoIterator<Item = Language>,
		default_language: Language,
	) -> Result<Self> {
		let identifier = identifier.into();
		let languages = languages.into_iter().collect::<BTreeSet<_>>();

		if identifier.is_empty() || identifier.contains(['/', '\\']) {
			return Err(RepositoryError::Config(format!(
				"'{identifier}' is not a usable site identifier"
			)));
		}

		if !languages.contains(&default_language) {
			return Err(RepositoryError::Config(format!(
				"default language '{default_language}' of site '{identifier}' is not one of its languages"
			)));
		}

		Ok(Self {
			identifier,
			languages,
			default_language,
			administrator: default_administrator(),
		})
	}

	#[must_use]
	pub fn with_administrator(mut self, administrator: impl Into<String>) -> Self {
		self.administrator = administrator.into();
		self
	}

	/// Look up one of the site's languages, ignoring case
	#[must_use]
	pub fn language(&self, identifier: &str) -> Option<&Language> {
		let wanted = Language::new(identifier);
		self.languages.get(&wanted)
	}

	#[must_use]
	pub const fn default_language(&self) -> &Language {
		&self.default_language
	}

	pub fn languages(&self) -> impl Iterator<Item = &Language> {
		self.languages.iter()
	}
}
