//! Deleting tags, tag ranges and whole repositories.

use crate::client::RegistryApi;
use crate::config::AdminConfig;
use crate::error::{RegistryError, Result};
use crate::tags::{group_tags_by_digest, resolve_digest, TagGroup};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Deletes the manifest a tag points at, which also drops every tag
/// aliasing that manifest.
pub async fn delete_tag(api: &dyn RegistryApi, repository: &str, tag: &str) -> Result<()> {
    let digest = resolve_digest(api, repository, tag).await?;
    api.delete_manifest(repository, &digest).await
}

/// Deletes tags in order, stopping at the first failure.
pub async fn delete_tags<S: AsRef<str>>(
    api: &dyn RegistryApi,
    repository: &str,
    tags: &[S],
) -> Result<()> {
    for tag in tags {
        delete_tag(api, repository, tag.as_ref()).await?;
    }
    Ok(())
}

/// What happened to one tag group during [`delete_range`].
#[derive(Debug)]
pub struct RangeOutcome {
    pub group: TagGroup,
    pub result: Result<()>,
}

impl RangeOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Deletes every tag group from the one holding `from_tag` through the one
/// holding `to_tag`, both inclusive.
///
/// The `from_tag` group must sort strictly before the `to_tag` group. A
/// failed group does not stop the remaining ones; each gets its own outcome.
pub async fn delete_range(
    api: &dyn RegistryApi,
    repository: &str,
    from_tag: &str,
    to_tag: &str,
) -> Result<Vec<RangeOutcome>> {
    let groups = group_tags_by_digest(api, repository).await?;

    let from = group_index(&groups, from_tag)?;
    let to = group_index(&groups, to_tag)?;
    if from >= to {
        return Err(RegistryError::Precondition(format!(
            "{} (group {}) must come before {} (group {})",
            from_tag, from, to_tag, to
        )));
    }

    let mut outcomes = Vec::with_capacity(to - from + 1);
    for group in groups.into_iter().skip(from).take(to - from + 1) {
        let result = api.delete_manifest(repository, &group.digest).await;
        if let Err(e) = &result {
            warn!("Failed to delete {} {:?}: {}", repository, group.tags, e);
        }
        outcomes.push(RangeOutcome { group, result });
    }
    Ok(outcomes)
}

fn group_index(groups: &[TagGroup], tag: &str) -> Result<usize> {
    groups
        .iter()
        .position(|g| g.contains(tag))
        .ok_or_else(|| RegistryError::InvalidTag(tag.to_string()))
}

/// On-disk layout of the registry's filesystem storage driver.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{root}/repositories/{name}`, for names that stay below that directory.
    pub fn repository_dir(&self, repository: &str) -> Result<PathBuf> {
        self.contained("repositories", repository)
    }

    /// `{root}/_deleted/{name}`, for names that stay below that directory.
    pub fn staging_dir(&self, repository: &str) -> Result<PathBuf> {
        self.contained("_deleted", repository)
    }

    fn contained(&self, area: &str, repository: &str) -> Result<PathBuf> {
        check_repository_name(repository)?;
        let base = self.root.join(area);
        let path = base.join(repository);
        if path == base || !path.starts_with(&base) {
            return Err(invalid_name(repository));
        }
        Ok(path)
    }
}

fn invalid_name(repository: &str) -> RegistryError {
    RegistryError::Precondition(format!("invalid repository name: {:?}", repository))
}

/// Repository names are `/`-separated plain segments: no empty, `.` or `..`
/// parts and no leading slash.
fn check_repository_name(repository: &str) -> Result<()> {
    let plain = |segment: &str| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment.contains('\\')
            && !segment.contains('\0')
    };
    if !repository.split('/').all(plain) || Path::new(repository).is_absolute() {
        return Err(invalid_name(repository));
    }
    Ok(())
}

async fn ensure_tagless(api: &dyn RegistryApi, repository: &str) -> Result<()> {
    if !group_tags_by_digest(api, repository).await?.is_empty() {
        return Err(RegistryError::Precondition(
            "only tagless repositories may be deleted".to_string(),
        ));
    }
    Ok(())
}

/// Removes a tagless repository's data from the registry's storage.
///
/// The directory is first renamed into `_deleted/`, which takes it out of
/// the live tree in one step, and only then removed recursively.
///
/// The registry is not locked: a tag pushed after the final check but
/// before the rename is lost with the rest of the repository.
pub async fn delete_repository(
    api: &dyn RegistryApi,
    config: &AdminConfig,
    repository: &str,
) -> Result<()> {
    let root = config.data_path.as_ref().ok_or_else(|| {
        RegistryError::Configuration(
            "a registry data path is required to delete repositories".to_string(),
        )
    })?;
    let layout = StorageLayout::new(root);
    let source = layout.repository_dir(repository)?;
    let staged = layout.staging_dir(repository)?;

    ensure_tagless(api, repository).await?;

    if !fs::metadata(&source).await.is_ok_and(|m| m.is_dir()) {
        return Err(RegistryError::NotFound(format!(
            "{} (is the data path pointing at the v2 directory?)",
            source.display()
        )));
    }

    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::symlink_metadata(&staged).await.is_ok() {
        warn!("Removing leftover {}", staged.display());
        fs::remove_dir_all(&staged).await?;
    }

    ensure_tagless(api, repository).await?;

    fs::rename(&source, &staged).await?;
    info!("Moved {} to {}", source.display(), staged.display());

    fs::remove_dir_all(&staged).await?;
    info!("Deleted repository data for {}", repository);
    Ok(())
}
