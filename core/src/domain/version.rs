use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which incarnation of a resource a URI points to
///
/// Ordering puts the published version first, then the draft, then archived
/// revisions by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Version {
	/// The currently published version
	#[default]
	Live,
	/// The draft that is being edited
	Work,
	/// An archived revision
	Revision(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{0}' is not a version token")]
pub struct VersionParseError(pub String);

impl Version {
	/// Token used inside locators: `index`, `work` or the revision number
	#[must_use]
	pub fn token(&self) -> String {
		match self {
			Self::Live => "index".to_string(),
			Self::Work => "work".to_string(),
			Self::Revision(n) => n.to_string(),
		}
	}

	/// Directory name a writable store keeps this version's files in
	#[must_use]
	pub fn directory(&self) -> String {
		match self {
			Self::Live => "live".to_string(),
			Self::Work => "work".to_string(),
			Self::Revision(n) => n.to_string(),
		}
	}

	/// File name of the head document for this version
	#[must_use]
	pub fn document(&self) -> String {
		format!("{}.xml", self.token())
	}

	/// Inverse of [`Version::document`], for file names found while walking an archive
	#[must_use]
	pub fn from_document(file_name: &str) -> Option<Self> {
		file_name
			.strip_suffix(".xml")
			.and_then(|stem| stem.parse().ok())
	}
}

impl FromStr for Version {
	type Err = VersionParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"live" | "index" => Ok(Self::Live),
			"work" => Ok(Self::Work),
			digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => digits
				.parse()
				.map(Self::Revision)
				.map_err(|_| VersionParseError(s.to_string())),
			_ => Err(VersionParseError(s.to_string())),
		}
	}
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Live => f.write_str("live"),
			Self::Work => f.write_str("work"),
			Self::Revision(n) => write!(f, "{n}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_parse_to_versions() {
		assert_eq!("index".parse(), Ok(Version::Live));
		assert_eq!("live".parse(), Ok(Version::Live));
		assert_eq!("work".parse(), Ok(Version::Work));
		assert_eq!("17".parse(), Ok(Version::Revision(17)));
		assert!("".parse::<Version>().is_err());
		assert!("-3".parse::<Version>().is_err());
		assert!("draft".parse::<Version>().is_err());
	}

	#[test]
	fn published_sorts_before_drafts_and_revisions() {
		let mut versions = vec![Version::Revision(2), Version::Work, Version::Revision(0), Version::Live];
		versions.sort();
		assert_eq!(
			versions,
			vec![Version::Live, Version::Work, Version::Revision(0), Version::Revision(2)]
		);
	}

	#[test]
	fn document_names() {
		assert_eq!(Version::Live.document(), "index.xml");
		assert_eq!(Version::Work.document(), "work.xml");
		assert_eq!(Version::Revision(4).document(), "4.xml");
		assert_eq!(Version::from_document("work.xml"), Some(Version::Work));
		assert_eq!(Version::from_document("de.xml"), None);
	}
}
