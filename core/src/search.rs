//! Hook through which the index hands extracted metadata to a search backend.
//! Query execution lives elsewhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::ResourceUri;

/// One searchable field of a resource, possibly multi valued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
	pub name: String,
	pub values: Vec<String>,
}

impl ResourceMetadata {
	pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			name: name.into(),
			values: values.into_iter().map(Into::into).collect(),
		}
	}

	pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			values: vec![value.into()],
		}
	}
}

pub trait SearchHook: Send + Sync + fmt::Debug {
	/// Called for every resource version added to or updated in the index
	fn add(&self, uri: &ResourceUri, metadata: &[ResourceMetadata]);

	/// Called when a resource version leaves the index
	fn remove(&self, uri: &ResourceUri);

	fn clear(&self);
}

/// Used when nobody listens
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSearchHook;

impl SearchHook for NoopSearchHook {
	fn add(&self, _: &ResourceUri, _: &[ResourceMetadata]) {}

	fn remove(&self, _: &ResourceUri) {}

	fn clear(&self) {}
}
