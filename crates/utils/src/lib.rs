#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::as_conversions,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::path::Path;

use uuid::Uuid;

pub mod error;

/// Whether the last component of a path starts with a dot
#[must_use]
pub fn is_hidden(path: &Path) -> bool {
	path.file_name()
		.and_then(|name| name.to_str())
		.is_some_and(|name| name.starts_with('.'))
}

/// Extension of a file name without the leading dot, if there is a non empty one
#[must_use]
pub fn extension_of(filename: &str) -> Option<&str> {
	Path::new(filename)
		.extension()
		.and_then(|ext| ext.to_str())
		.filter(|ext| !ext.is_empty())
}

/// Two single digit directory names derived from the first bytes of an identifier,
/// used to spread stored items over a shallow directory tree
#[must_use]
pub fn shard_directories(id: &str) -> (String, String) {
	let mut digits = id.chars().filter_map(|c| c.to_digit(16));
	let first = digits.next().unwrap_or(0);
	let second = digits.next().unwrap_or(0);
	((first % 100).to_string(), (second % 10).to_string())
}

/// Identifiers handed out for new items
#[must_use]
pub fn new_identifier() -> String {
	Uuid::new_v4().to_string()
}
