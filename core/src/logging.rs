//! Tracing setup for hosts embedding the repository

use tracing::warn;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::LevelFilter,
	fmt::{self, Layer},
	prelude::*,
	EnvFilter,
};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "folio.log";

/// Install the global subscriber: console output plus, with a log directory, daily files
///
/// `RUST_LOG` still wins over the configured level. Keep the returned guard alive for as
/// long as file logging should happen. Calling this again once a subscriber is set is a no-op.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
	let mut filter = EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into());
	match format!("folio_core={}", config.level).parse() {
		Ok(directive) => filter = filter.add_directive(directive),
		Err(e) => eprintln!("Ignoring invalid log level '{}': {e}", config.level),
	}

	let (file_layer, guard) = config
		.directory
		.as_ref()
		.map(|directory| {
			let (non_blocking, guard) =
				tracing_appender::non_blocking(rolling::daily(directory, LOG_FILE_PREFIX));
			let layer = Layer::default()
				.with_writer(non_blocking)
				.with_ansi(false)
				.with_filter(LevelFilter::DEBUG);
			(layer, guard)
		})
		.unzip();

	let installed = tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer())
		.with(file_layer)
		.try_init();

	if let Err(e) = installed {
		warn!("Tracing subscriber already installed: {e}");
		return None;
	}

	guard
}
