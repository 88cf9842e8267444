//! External string form of resource locators
//!
//! Two grammars are understood when decoding:
//!
//! - the suffix form `/<path>/<version>[_<language>].<flavor>`, where the version is
//!   `work`, `live`, `index` or a revision number
//! - the segmented form `/<path>/[<language>|<flavor>]*`, scanned from the right
//!
//! Encoding always produces the suffix form, which makes it the canonical one.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::{uri::normalize_path, Language, ResourceUri, Site, Version};
use crate::error::{RepositoryError, Result};

#[allow(clippy::unwrap_used)]
static SUFFIX_FORM: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^(.*)/(work|index|live|[0-9]*)(_[a-zA-Z]+)?\.([a-zA-Z0-9]+)$").unwrap()
});

#[allow(clippy::unwrap_used)]
static SEGMENTED_FORM: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^/[a-zA-Z0-9\-,.:;()/_~!$&*'+=@%^#?]*$").unwrap()
});

/// Representation a caller asks for
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
	#[default]
	Any,
	Html,
	Xml,
	Json,
}

impl Flavor {
	/// Extension used when the flavor ends up in a link
	#[must_use]
	pub const fn extension(self) -> &'static str {
		match self {
			Self::Any | Self::Html => "html",
			Self::Xml => "xml",
			Self::Json => "json",
		}
	}
}

/// A decoded locator: the canonical path plus whatever was encoded around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
	pub path: String,
	pub version: Option<Version>,
	pub language: Option<Language>,
	pub flavor: Option<Flavor>,
	/// Whether the language was given as its own path segment
	pub language_in_path: bool,
}

/// Values that replace a locator's own when producing a link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOverrides {
	pub version: Option<Version>,
	pub language: Option<Language>,
	pub flavor: Option<Flavor>,
}

impl Locator {
	fn bare(path: &str) -> Self {
		Self {
			path: normalize_path(path),
			version: None,
			language: None,
			flavor: None,
			language_in_path: false,
		}
	}

	/// Suffix form link for this locator
	#[must_use]
	pub fn link(&self) -> String {
		self.link_with(&LinkOverrides::default())
	}

	#[must_use]
	pub fn link_with(&self, overrides: &LinkOverrides) -> String {
		render(
			&self.path,
			overrides.version.or(self.version),
			overrides.language.as_ref().or(self.language.as_ref()),
			overrides.flavor.or(self.flavor),
		)
	}

	/// Resource URI for the addressed version, live when no version was encoded
	#[must_use]
	pub fn to_uri(&self, site: &Site) -> ResourceUri {
		ResourceUri::for_path(&site.identifier, &self.path)
			.with_version(self.version.unwrap_or_default())
	}
}

/// Parse the external form of a locator for `site`
pub fn decode(site: &Site, raw: &str) -> Result<Locator> {
	let path = strip_origin(raw.trim());

	if !path.starts_with('/') {
		return Err(RepositoryError::MalformedLocator(format!(
			"'{raw}' is not an absolute path"
		)));
	}

	if let Some(captures) = SUFFIX_FORM.captures(path) {
		let mut locator = Locator::bare(captures.get(1).map_or("", |m| m.as_str()));

		let version_token = captures.get(2).map_or("", |m| m.as_str());
		if !version_token.is_empty() {
			let version = version_token.parse::<Version>().map_err(|e| {
				RepositoryError::UnparsableLocator {
					locator: raw.to_string(),
					reason: e.to_string(),
				}
			})?;
			locator.version = Some(version);
		}

		if let Some(language) = captures.get(3).map(|m| &m.as_str()[1..]) {
			locator.language = Some(site.language(language).cloned().unwrap_or_else(|| {
				debug!(
					"Switching unknown language '{language}' of {raw} to {}",
					site.default_language()
				);
				site.default_language().clone()
			}));
		}

		let flavor = captures.get(4).map_or("", |m| m.as_str());
		locator.flavor = Some(flavor.parse().map_err(|_| RepositoryError::UnparsableLocator {
			locator: raw.to_string(),
			reason: format!("unknown flavor '{flavor}'"),
		})?);

		return Ok(locator);
	}

	if SEGMENTED_FORM.is_match(path) {
		return Ok(decode_segments(site, path));
	}

	Err(RepositoryError::MalformedLocator(raw.to_string()))
}

fn decode_segments(site: &Site, path: &str) -> Locator {
	let mut segments = path.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>();
	let mut flavor = None;
	let mut language = None;

	while let Some(segment) = segments.last() {
		if flavor.is_none() {
			if let Ok(found) = segment.parse::<Flavor>() {
				flavor = Some(found);
				segments.pop();
				continue;
			}
		}

		if language.is_none() {
			if let Some(found) = site.language(segment) {
				language = Some(found.clone());
				segments.pop();
				continue;
			}
		}

		break;
	}

	let mut locator = Locator::bare(&segments.join("/"));
	locator.language_in_path = language.is_some();
	locator.language = language;
	locator.flavor = flavor;
	locator
}

/// Produce the suffix form link for `uri`
pub fn encode(uri: &ResourceUri, overrides: &LinkOverrides) -> Result<String> {
	let path = uri
		.path()
		.ok_or_else(|| RepositoryError::IllegalState(format!("{uri} has no path to link to")))?;

	Ok(render(
		path,
		Some(overrides.version.unwrap_or(uri.version)),
		overrides.language.as_ref(),
		overrides.flavor,
	))
}

fn render(
	path: &str,
	version: Option<Version>,
	language: Option<&Language>,
	flavor: Option<Flavor>,
) -> String {
	let path = normalize_path(path);
	let mut link = String::with_capacity(path.len() + 16);
	link.push_str(path.trim_end_matches('/'));
	link.push('/');
	link.push_str(&version.unwrap_or_default().token());
	if let Some(language) = language {
		link.push('_');
		link.push_str(language.identifier());
	}
	link.push('.');
	link.push_str(flavor.unwrap_or(Flavor::Html).extension());
	link
}

/// Drop `scheme://host[:port]` from absolute URLs
fn strip_origin(raw: &str) -> &str {
	raw.find("://").map_or(raw, |scheme_end| {
		let rest = &raw[scheme_end + 3..];
		rest.find('/').map_or("/", |path_start| &rest[path_start..])
	})
}
