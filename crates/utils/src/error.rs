use std::{fmt::Display, io, path::Path};

use thiserror::Error;
use tracing::error;

/// Report an error with tracing
pub fn report_error<T>(res: &Result<T, impl Display>) {
	if let Err(e) = res {
		error!("{e:#}");
	}
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<String>,
}

impl Display for FileIOError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.maybe_context {
			Some(context) => write!(f, "{context} failed at '{}': {}", self.path.display(), self.source),
			None => write!(f, "I/O failed at '{}': {}", self.path.display(), self.source),
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>, C: Into<String>> From<(P, io::Error, C)> for FileIOError {
	fn from((path, source, context): (P, io::Error, C)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context.into()),
		}
	}
}
