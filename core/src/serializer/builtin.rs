//! Serializers for the resource types every site has: pages, files and images

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;

use super::{
	document::ContentDocument, DocumentReader, ResourceContentReader, Serializer,
	SerializerRegistry,
};
use crate::{
	domain::{Language, Resource, ResourceContent, Site},
	error::{RepositoryError, Result},
	search::ResourceMetadata,
};

pub const PAGE: &str = "page";
pub const FILE: &str = "file";
pub const IMAGE: &str = "image";

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

static MIMETYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
	HashMap::from([
		("css", "text/css"),
		("csv", "text/csv"),
		("doc", "application/msword"),
		("gif", "image/gif"),
		("htm", "text/html"),
		("html", "text/html"),
		("jpeg", "image/jpeg"),
		("jpg", "image/jpeg"),
		("js", "text/javascript"),
		("json", "application/json"),
		("mp3", "audio/mpeg"),
		("mp4", "video/mp4"),
		("pdf", "application/pdf"),
		("png", "image/png"),
		("svg", "image/svg+xml"),
		("txt", "text/plain"),
		("webp", "image/webp"),
		("xml", "application/xml"),
		("zip", "application/zip"),
	])
});

/// Mimetype for a file name, by its extension
#[must_use]
pub fn guess_mimetype(filename: &str) -> &'static str {
	folio_utils::extension_of(filename)
		.and_then(|ext| MIMETYPES.get(ext.to_ascii_lowercase().as_str()).copied())
		.unwrap_or(DEFAULT_MIMETYPE)
}

fn content_language(content: &ContentDocument, site: &Site) -> Language {
	site.language(&content.language)
		.cloned()
		.unwrap_or_else(|| Language::new(&content.language))
}

fn base_content(content: ContentDocument, site: &Site) -> ResourceContent {
	let language = content_language(&content, site);
	ResourceContent {
		language,
		filename: content.filename,
		mimetype: content.mimetype,
		size: content.size,
		properties: content.properties.into_map(),
	}
}

/// Page contents are attachments of arbitrary kind, taken as they are
#[derive(Debug, Default, Clone, Copy)]
pub struct PageContentReader;

impl ResourceContentReader for PageContentReader {
	fn read(&self, content: ContentDocument, site: &Site) -> Result<ResourceContent> {
		Ok(base_content(content, site))
	}
}

/// File contents always end up with a mimetype
#[derive(Debug, Default, Clone, Copy)]
pub struct FileContentReader;

impl ResourceContentReader for FileContentReader {
	fn read(&self, content: ContentDocument, site: &Site) -> Result<ResourceContent> {
		let mut content = base_content(content, site);
		if content.mimetype.is_none() {
			content.mimetype = Some(
				content
					.filename
					.as_deref()
					.map_or(DEFAULT_MIMETYPE, guess_mimetype)
					.to_string(),
			);
		}
		Ok(content)
	}
}

/// Like files, but the mimetype has to be an image one
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageContentReader;

impl ResourceContentReader for ImageContentReader {
	fn read(&self, content: ContentDocument, site: &Site) -> Result<ResourceContent> {
		let content = FileContentReader.read(content, site)?;
		match content.mimetype.as_deref() {
			Some(mimetype) if mimetype.starts_with("image/") => Ok(content),
			other => Err(RepositoryError::serialization(
				format!("image content '{}'", content.language),
				format!("'{}' is not an image mimetype", other.unwrap_or_default()),
			)),
		}
	}
}

fn common_metadata(resource: &Resource) -> Vec<ResourceMetadata> {
	let mut metadata = Vec::new();
	if let Some(path) = resource.path() {
		metadata.push(ResourceMetadata::single("path", path));
	}
	if let Some(owner) = &resource.head.owner {
		metadata.push(ResourceMetadata::single("owner", owner));
	}
	if !resource.head.tags.is_empty() {
		metadata.push(ResourceMetadata::new("tags", resource.head.tags.iter().cloned()));
	}
	metadata.extend(
		resource
			.properties
			.iter()
			.map(|(name, value)| ResourceMetadata::single(format!("property:{name}"), value)),
	);
	metadata
}

fn file_metadata(resource: &Resource) -> Vec<ResourceMetadata> {
	let mut metadata = common_metadata(resource);
	for content in resource.contents.values() {
		let field = |name: &str| format!("{name}:{}", content.language);
		if let Some(filename) = &content.filename {
			metadata.push(ResourceMetadata::single(field("filename"), filename));
		}
		if let Some(mimetype) = &content.mimetype {
			metadata.push(ResourceMetadata::single(field("mimetype"), mimetype));
		}
	}
	metadata
}

fn serializer(
	resource_type: &str,
	content_reader: Arc<dyn ResourceContentReader>,
	metadata: fn(&Resource) -> Vec<ResourceMetadata>,
) -> Serializer {
	Serializer::new(
		resource_type,
		Arc::new(DocumentReader::new(resource_type, Arc::clone(&content_reader))),
		content_reader,
		Arc::new(metadata),
	)
}

#[must_use]
pub fn page_serializer() -> Serializer {
	serializer(PAGE, Arc::new(PageContentReader), common_metadata)
}

#[must_use]
pub fn file_serializer() -> Serializer {
	serializer(FILE, Arc::new(FileContentReader), file_metadata)
}

#[must_use]
pub fn image_serializer() -> Serializer {
	serializer(IMAGE, Arc::new(ImageContentReader), file_metadata)
}

pub fn register_builtins(registry: &SerializerRegistry) {
	registry.register(page_serializer());
	registry.register(file_serializer());
	registry.register(image_serializer());
}
