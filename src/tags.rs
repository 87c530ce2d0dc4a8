//! Tag to digest resolution and grouping.

use crate::client::RegistryApi;
use crate::error::Result;
use std::collections::HashMap;
use tracing::debug;

/// All tags of a repository that currently point at the same manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroup {
    pub digest: String,
    /// Sorted, never empty.
    pub tags: Vec<String>,
}

impl TagGroup {
    /// The lexicographically smallest tag, which also orders the groups.
    pub fn first_tag(&self) -> &str {
        &self.tags[0]
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Resolves a tag to its manifest digest. Every call hits the registry.
pub async fn resolve_digest(api: &dyn RegistryApi, repository: &str, tag: &str) -> Result<String> {
    api.content_digest(repository, tag).await
}

/// Partitions a repository's tags by the digest they resolve to.
///
/// Groups come back ordered by their smallest tag, and tags within a group
/// are sorted. A repository without tags yields no groups.
pub async fn group_tags_by_digest(api: &dyn RegistryApi, repository: &str) -> Result<Vec<TagGroup>> {
    let tags = api.list_tags(repository).await?;
    debug!("Resolving {} tags of {}", tags.len(), repository);

    let mut by_digest: HashMap<String, Vec<String>> = HashMap::new();
    for tag in tags {
        let digest = resolve_digest(api, repository, &tag).await?;
        by_digest.entry(digest).or_default().push(tag);
    }

    Ok(into_groups(by_digest))
}

fn into_groups(by_digest: HashMap<String, Vec<String>>) -> Vec<TagGroup> {
    let mut groups: Vec<TagGroup> = by_digest
        .into_iter()
        .map(|(digest, mut tags)| {
            tags.sort();
            tags.dedup();
            TagGroup { digest, tags }
        })
        .collect();
    groups.sort_by(|a, b| a.first_tag().cmp(b.first_tag()));
    groups
}
