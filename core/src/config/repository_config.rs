use std::{
	fs, io,
	path::{Path, PathBuf},
};

use folio_utils::error::FileIOError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, warn};

use super::Migrate;
use crate::{
	error::{RepositoryError, Result},
	events,
};

pub const CONFIG_FILE: &str = "repository.json";

const DEFAULT_ARCHIVE_PREFIX: &str = "repository";

/// Which backing store a repository is opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RepositoryKind {
	/// Read-only, serves the archive as it is
	Archive,
	/// Writable store, bootstrapped from the archive on first use
	Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
	/// Level for this crate's own events; everything else logs at `warn`
	pub level: String,
	/// Directory for daily log files, console only when missing
	#[serde(default)]
	pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			directory: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
	pub version: u32,

	/// Repository kind tag, see [`RepositoryKind`]
	pub kind: String,

	/// Directory holding the site archive
	pub archive_root: PathBuf,

	#[serde(default)]
	pub archive_prefix: String,

	/// Root of the mutable store, required for writable kinds
	#[serde(default)]
	pub store_root: Option<PathBuf>,

	/// Per-site index state goes into `<index_root>/<site>`
	pub index_root: PathBuf,

	#[serde(default = "default_true")]
	pub create_homepage: bool,

	#[serde(default)]
	pub event_capacity: usize,

	#[serde(default)]
	pub logging: LoggingConfig,
}

const fn default_true() -> bool {
	true
}

impl RepositoryConfig {
	/// Defaults keeping everything below `dir`
	pub fn default_with_dir(dir: impl AsRef<Path>) -> Self {
		let dir = dir.as_ref();
		Self {
			version: Self::target_version(),
			kind: RepositoryKind::Filesystem.to_string(),
			archive_root: dir.join("archive"),
			archive_prefix: DEFAULT_ARCHIVE_PREFIX.to_string(),
			store_root: Some(dir.join("store")),
			index_root: dir.join("index"),
			create_homepage: true,
			event_capacity: events::DEFAULT_CAPACITY,
			logging: LoggingConfig::default(),
		}
	}

	/// Read the config at `path`, writing defaults first when there is none
	///
	/// Older documents are migrated and written back.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();

		let json = match fs::read_to_string(path) {
			Ok(json) => json,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				warn!(path = %path.display(), "No repository config found, creating default");
				let config = Self::default_with_dir(path.parent().unwrap_or_else(|| Path::new(".")));
				config.save(path)?;
				return Ok(config);
			}
			Err(e) => return Err(FileIOError::from((path, e, "reading repository config")).into()),
		};

		let mut config = serde_json::from_str::<Self>(&json)?;

		if config.current_version() > Self::target_version() {
			return Err(RepositoryError::Config(format!(
				"config version {} is newer than supported version {}",
				config.version,
				Self::target_version()
			)));
		}

		if config.needs_migration() {
			info!(
				path = %path.display(),
				"Migrating repository config from v{} to v{}",
				config.version,
				Self::target_version()
			);
			config.migrate()?;
			config.save(path)?;
		}

		config.validate()?;
		Ok(config)
	}

	pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
		let path = path.as_ref();
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.map_err(|e| FileIOError::from((parent, e, "creating config directory")))?;
		}

		fs::write(path, serde_json::to_string_pretty(self)?)
			.map_err(|e| FileIOError::from((path, e, "writing repository config")))?;
		info!(path = %path.display(), "Saved repository config");
		Ok(())
	}

	/// Parsed repository kind
	pub fn repository_kind(&self) -> Result<RepositoryKind> {
		self.kind
			.parse()
			.map_err(|_| RepositoryError::Config(format!("unknown repository kind '{}'", self.kind)))
	}

	/// Reject settings that would only fail once the repository is in use
	pub fn validate(&self) -> Result<()> {
		let kind = self.repository_kind()?;

		if kind == RepositoryKind::Filesystem && self.store_root.is_none() {
			return Err(RepositoryError::Config(
				"a filesystem repository needs a store_root".to_string(),
			));
		}

		if self.archive_prefix.contains("..") {
			return Err(RepositoryError::Config(format!(
				"archive prefix '{}' escapes the archive",
				self.archive_prefix
			)));
		}

		if self.event_capacity == 0 {
			return Err(RepositoryError::Config(
				"event capacity must be positive".to_string(),
			));
		}

		Ok(())
	}

	/// Directory of the archive's resource tree
	#[must_use]
	pub fn archive_location(&self) -> PathBuf {
		self.archive_root.join(self.archive_prefix.trim_matches('/'))
	}

	/// Directory of one site's persisted index
	#[must_use]
	pub fn index_location(&self, site: &str) -> PathBuf {
		self.index_root.join(site)
	}
}

impl Migrate for RepositoryConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		3
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				self.version = 1;
				self.migrate()
			}
			1 => {
				// v2 made the archive prefix configurable
				if self.archive_prefix.is_empty() {
					self.archive_prefix = DEFAULT_ARCHIVE_PREFIX.to_string();
				}
				self.version = 2;
				self.migrate()
			}
			2 => {
				// v3 added events and file logging
				if self.event_capacity == 0 {
					self.event_capacity = events::DEFAULT_CAPACITY;
				}
				self.kind = self.kind.to_ascii_lowercase();
				self.version = 3;
				Ok(())
			}
			3 => Ok(()),
			v => Err(RepositoryError::Config(format!("unknown config version {v}"))),
		}
	}
}
