use crate::error::Result;

/// Versioned configuration documents that know how to bring themselves up to date
pub trait Migrate {
	fn current_version(&self) -> u32;

	fn target_version() -> u32;

	/// Upgrade one or more steps until [`Migrate::target_version`] is reached
	fn migrate(&mut self) -> Result<()>;

	fn needs_migration(&self) -> bool {
		self.current_version() < Self::target_version()
	}
}
