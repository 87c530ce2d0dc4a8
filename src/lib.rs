pub mod client;
pub mod config;
pub mod delete;
pub mod error;
pub mod size;
pub mod tags;

pub use client::{HttpRegistryClient, Layer, RegistryApi};
pub use config::AdminConfig;
pub use delete::{delete_range, delete_repository, delete_tag, delete_tags, RangeOutcome, StorageLayout};
pub use error::{RegistryError, Result};
pub use size::{group_sizes, readable_size, repository_size, repository_sizes, tag_sizes};
pub use tags::{group_tags_by_digest, resolve_digest, TagGroup};
