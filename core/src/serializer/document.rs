//! On-disk XML form of a resource version
//!
//! Documents look like this, with the root element named after the resource type:
//!
//! ```xml
//! <page id="..." path="/about" version="work">
//!   <head owner="editor">
//!     <created user="editor" date="2024-05-01T10:00:00Z"/>
//!     <tags><tag name="company"/></tags>
//!   </head>
//!   <properties><property name="template" value="default"/></properties>
//!   <contents>
//!     <content language="de" filename="ueber.pdf"/>
//!   </contents>
//! </page>
//! ```
//!
//! Both directions go through serde, so escaping is always handled by the XML writer.
//! Free text only lives in attributes, since element text is trimmed when parsed.

use chrono::{DateTime, Utc};
use quick_xml::{events::Event, Reader};
use serde::{Deserialize, Serialize};

use crate::{
	domain::{Modification, Publication, Resource, ResourceContent, ResourceHead, ResourceUri, Site, Version},
	error::{RepositoryError, Result},
};

use super::ResourceContentReader;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResourceDocument {
	#[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(rename = "@path", default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default)]
	head: HeadDocument,
	#[serde(default, skip_serializing_if = "PropertyList::is_empty")]
	properties: PropertyList,
	#[serde(default, skip_serializing_if = "ContentList::is_empty")]
	contents: ContentList,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HeadDocument {
	#[serde(rename = "@owner", default, skip_serializing_if = "Option::is_none")]
	owner: Option<String>,
	#[serde(rename = "@locked", default, skip_serializing_if = "Option::is_none")]
	locked: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	created: Option<ModificationDocument>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	modified: Option<ModificationDocument>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	published: Option<PublicationDocument>,
	#[serde(default, skip_serializing_if = "TagList::is_empty")]
	tags: TagList,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModificationDocument {
	#[serde(rename = "@user")]
	user: String,
	#[serde(rename = "@date")]
	date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PublicationDocument {
	#[serde(rename = "@user")]
	user: String,
	#[serde(rename = "@from")]
	from: DateTime<Utc>,
	#[serde(rename = "@to", default, skip_serializing_if = "Option::is_none")]
	to: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagList {
	#[serde(rename = "tag", default)]
	tags: Vec<TagDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TagDocument {
	#[serde(rename = "@name")]
	name: String,
}

impl TagList {
	fn is_empty(&self) -> bool {
		self.tags.is_empty()
	}
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PropertyList {
	#[serde(rename = "property", default)]
	entries: Vec<PropertyDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PropertyDocument {
	#[serde(rename = "@name")]
	name: String,
	#[serde(rename = "@value", default)]
	value: String,
}

impl PropertyList {
	fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn from_map<'a>(map: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
		Self {
			entries: map
				.into_iter()
				.map(|(name, value)| PropertyDocument {
					name: name.clone(),
					value: value.clone(),
				})
				.collect(),
		}
	}

	pub fn into_map(self) -> std::collections::BTreeMap<String, String> {
		self.entries
			.into_iter()
			.map(|PropertyDocument { name, value }| (name, value))
			.collect()
	}
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContentList {
	#[serde(rename = "content", default)]
	entries: Vec<ContentDocument>,
}

impl ContentList {
	fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// The `<content>` element, as handed to a [`ResourceContentReader`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDocument {
	#[serde(rename = "@language")]
	pub language: String,
	#[serde(rename = "@filename", default, skip_serializing_if = "Option::is_none")]
	pub filename: Option<String>,
	#[serde(rename = "@mimetype", default, skip_serializing_if = "Option::is_none")]
	pub mimetype: Option<String>,
	#[serde(rename = "@size", default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
	#[serde(default, skip_serializing_if = "PropertyList::is_empty")]
	pub properties: PropertyList,
}

impl From<&ResourceContent> for ContentDocument {
	fn from(content: &ResourceContent) -> Self {
		Self {
			language: content.language.to_string(),
			filename: content.filename.clone(),
			mimetype: content.mimetype.clone(),
			size: content.size,
			properties: PropertyList::from_map(&content.properties),
		}
	}
}

impl From<ModificationDocument> for Modification {
	fn from(ModificationDocument { user, date }: ModificationDocument) -> Self {
		Self { user, date }
	}
}

impl From<&Modification> for ModificationDocument {
	fn from(Modification { user, date }: &Modification) -> Self {
		Self {
			user: user.clone(),
			date: *date,
		}
	}
}

/// Render a resource version as an XML document
pub fn to_xml(resource: &Resource) -> Result<String> {
	let resource_type = resource.resource_type().ok_or_else(|| {
		RepositoryError::serialization(&resource.uri, "resource has no type")
	})?;

	let head = &resource.head;
	let document = ResourceDocument {
		id: resource.uri.identifier.clone(),
		path: resource.uri.path.clone(),
		version: Some(resource.version().to_string()),
		head: HeadDocument {
			owner: head.owner.clone(),
			created: head.created.as_ref().map(Into::into),
			modified: head.modified.as_ref().map(Into::into),
			published: head.published.as_ref().map(|p| PublicationDocument {
				user: p.user.clone(),
				from: p.from,
				to: p.to,
			}),
			locked: head.locked_by.clone(),
			tags: TagList {
				tags: head
					.tags
					.iter()
					.map(|name| TagDocument { name: name.clone() })
					.collect(),
			},
		},
		properties: PropertyList::from_map(&resource.properties),
		contents: ContentList {
			entries: resource.contents.values().map(Into::into).collect(),
		},
	};

	quick_xml::se::to_string_with_root(resource_type, &document)
		.map_err(|e| RepositoryError::serialization(&resource.uri, e))
}

/// Parse a document, making sure its root element names `resource_type`
pub fn parse(bytes: &[u8], resource_type: &str) -> Result<ResourceDocument> {
	let text = std::str::from_utf8(bytes)
		.map_err(|e| RepositoryError::serialization(resource_type, e))?;

	match root_element(text)? {
		Some(root) if root == resource_type => {}
		Some(root) => {
			return Err(RepositoryError::serialization(
				resource_type,
				format!("document describes a '{root}', not a '{resource_type}'"),
			))
		}
		None => {
			return Err(RepositoryError::serialization(
				resource_type,
				"document is empty",
			))
		}
	}

	quick_xml::de::from_str(text).map_err(|e| RepositoryError::serialization(resource_type, e))
}

fn root_element(text: &str) -> Result<Option<String>> {
	let mut reader = Reader::from_str(text);
	loop {
		match reader.read_event() {
			Ok(Event::Start(element) | Event::Empty(element)) => {
				return Ok(Some(
					String::from_utf8_lossy(element.local_name().as_ref()).into_owned(),
				))
			}
			Ok(Event::Eof) => return Ok(None),
			Ok(_) => continue,
			Err(e) => return Err(RepositoryError::serialization("document", e)),
		}
	}
}

impl ResourceDocument {
	/// Turn a parsed document into a resource of `resource_type` belonging to `site`
	pub fn into_resource(
		self,
		site: &Site,
		resource_type: &str,
		content_reader: &dyn ResourceContentReader,
	) -> Result<Resource> {
		let version = match self.version.as_deref() {
			Some(token) => token
				.parse::<Version>()
				.map_err(|e| RepositoryError::serialization(resource_type, e))?,
			None => Version::Live,
		};

		let mut uri = ResourceUri::new(&site.identifier)
			.with_type(resource_type)
			.with_version(version);
		if let Some(id) = self.id.filter(|id| !id.is_empty()) {
			uri = uri.with_identifier(id);
		}
		if let Some(path) = self.path {
			uri = uri.with_path(path);
		}

		let HeadDocument {
			owner,
			created,
			modified,
			published,
			locked,
			tags,
		} = self.head;

		let mut resource = Resource::new(uri);
		resource.head = ResourceHead {
			owner,
			created: created.map(Into::into),
			modified: modified.map(Into::into),
			published: published.map(|p| Publication {
				user: p.user,
				from: p.from,
				to: p.to,
			}),
			locked_by: locked,
			tags: tags.tags.into_iter().map(|tag| tag.name).collect(),
		};
		resource.properties = self.properties.into_map();

		for content in self.contents.entries {
			let content = content_reader.read(content, site)?;
			if resource.add_content(content).is_some() {
				return Err(RepositoryError::serialization(
					&resource.uri,
					"document lists more than one content for a language",
				));
			}
		}

		Ok(resource)
	}
}
