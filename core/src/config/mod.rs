//! Repository configuration

mod migration;
mod repository_config;

pub use migration::Migrate;
pub use repository_config::{LoggingConfig, RepositoryConfig, RepositoryKind, CONFIG_FILE};
