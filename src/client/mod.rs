/// HTTP clients for the remote metadata and identity services
pub mod identity;
pub mod metadata;

pub use identity::{IdentityClient, RemoteUser};
pub use metadata::MetadataClient;
