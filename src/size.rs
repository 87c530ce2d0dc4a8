//! Storage accounting over manifest layers.
//!
//! Two different numbers are reported. A repository's size counts each
//! layer once no matter how many of its manifests share it. A tag's size is
//! the full layer cost of its own manifest, even when a sibling tag shares
//! some of those layers.

use crate::client::{Layer, RegistryApi};
use crate::error::Result;
use crate::tags::{group_tags_by_digest, TagGroup};
use std::collections::BTreeMap;
use tracing::debug;

const UNITS: [&str; 5] = ["K", "KB", "MB", "GB", "TB"];

fn merge_layers(sizes: &mut BTreeMap<String, u64>, layers: Vec<Layer>) {
    for layer in layers {
        sizes.insert(layer.digest, layer.size);
    }
}

/// Sum of the distinct layers of one manifest.
pub async fn manifest_size(api: &dyn RegistryApi, repository: &str, reference: &str) -> Result<u64> {
    let mut sizes = BTreeMap::new();
    merge_layers(&mut sizes, api.manifest_layers(repository, reference).await?);
    Ok(sizes.values().sum())
}

/// Sum of the distinct layers across every tagged manifest of a repository.
pub async fn repository_size(api: &dyn RegistryApi, repository: &str) -> Result<u64> {
    let groups = group_tags_by_digest(api, repository).await?;

    let mut sizes = BTreeMap::new();
    for group in &groups {
        merge_layers(&mut sizes, api.manifest_layers(repository, &group.digest).await?);
    }

    let total: u64 = sizes.values().sum();
    debug!("{}: {} distinct layers, {} bytes", repository, sizes.len(), total);
    Ok(total)
}

/// Manifest size of each group, in the same order as `groups`.
pub async fn group_sizes(
    api: &dyn RegistryApi,
    repository: &str,
    groups: &[TagGroup],
) -> Result<Vec<u64>> {
    let mut sizes = Vec::with_capacity(groups.len());
    for group in groups {
        sizes.push(manifest_size(api, repository, &group.digest).await?);
    }
    Ok(sizes)
}

/// Manifest size of every tag in a repository.
pub async fn tag_sizes(api: &dyn RegistryApi, repository: &str) -> Result<BTreeMap<String, u64>> {
    let groups = group_tags_by_digest(api, repository).await?;
    let sizes = group_sizes(api, repository, &groups).await?;

    let mut by_tag = BTreeMap::new();
    for (group, size) in groups.into_iter().zip(sizes) {
        for tag in group.tags {
            by_tag.insert(tag, size);
        }
    }
    Ok(by_tag)
}

/// Every repository in the catalog with its size, largest first.
pub async fn repository_sizes(api: &dyn RegistryApi) -> Result<Vec<(String, u64)>> {
    let mut sized = Vec::new();
    for repository in api.list_repositories().await? {
        let size = repository_size(api, &repository).await?;
        sized.push((repository, size));
    }
    sized.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    Ok(sized)
}

/// Formats a byte count the way the `list --size` output always has.
///
/// The unit ladder is `K, KB, MB, GB, TB`: the first rung is labelled `K`
/// although it holds plain bytes. The labels are kept for output
/// compatibility.
pub fn readable_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
