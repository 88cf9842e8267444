//! Domain models of a site's content: languages, versions, URIs, resources, and
//! the locators that address them from the outside.

pub mod addressing;
pub mod resource;
pub mod site;
pub mod uri;
pub mod version;

// Re-export commonly used types
pub use addressing::{decode, encode, Flavor, LinkOverrides, Locator};
pub use resource::{Modification, Publication, Resource, ResourceContent, ResourceHead};
pub use site::{Language, Site};
pub use uri::{normalize_path, ResourceUri};
pub use version::{Version, VersionParseError};
