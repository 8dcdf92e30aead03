//! Persistence of artifacts and derived assets.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::artifacts::Artifacts;
use crate::config::RunOptions;
use crate::error::PersistError;
use crate::target::TargetUrl;

/// What a store knows about the run it is saving for.
///
/// `started_at` is fixed once per run so every file written for the run
/// shares one timestamp.
#[derive(Debug, Clone, Copy)]
pub struct SaveContext<'a> {
    pub url: &'a TargetUrl,
    pub options: &'a RunOptions,
    pub started_at: DateTime<Utc>,
}

impl<'a> SaveContext<'a> {
    pub fn new(url: &'a TargetUrl, options: &'a RunOptions) -> Self {
        Self {
            url,
            options,
            started_at: Utc::now(),
        }
    }
}

/// Stores artifacts and assets on behalf of a run.
///
/// Return values carry no data; the run only waits for completion and
/// aborts on error.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save_artifacts(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError>;

    async fn save_assets(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError>;
}

/// Store that accepts everything and keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopArtifactStore;

#[async_trait]
impl ArtifactStore for NoopArtifactStore {
    async fn save_artifacts(
        &self,
        _ctx: &SaveContext<'_>,
        _artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        Ok(())
    }

    async fn save_assets(
        &self,
        _ctx: &SaveContext<'_>,
        _artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        Ok(())
    }
}

/// Filesystem-backed store.
///
/// Layout under `root`, with `<prefix>` = `<host>_<run start, UTC>`:
/// - `<prefix>.artifacts.json`: the full artifact map
/// - `<prefix>-<artifact>.json`: one asset per artifact
///
/// File I/O runs on the blocking pool so the caller's timeout and
/// cancellation can abandon a slow write.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PersistError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts_path(&self, ctx: &SaveContext<'_>) -> PathBuf {
        self.root.join(format!("{}.artifacts.json", Self::prefix(ctx)))
    }

    pub fn asset_path(&self, ctx: &SaveContext<'_>, artifact: &str) -> PathBuf {
        self.root
            .join(format!("{}-{}.json", Self::prefix(ctx), Self::sanitize(artifact)))
    }

    fn prefix(ctx: &SaveContext<'_>) -> String {
        let host = Self::sanitize(ctx.url.host().unwrap_or("page"));
        format!("{}_{}", host, ctx.started_at.format("%Y-%m-%d_%H-%M-%S"))
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    /// Write every `(path, bytes)` pair on the blocking pool.
    async fn write_all(&self, files: Vec<(PathBuf, Vec<u8>)>) -> Result<(), PersistError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            for (path, bytes) in &files {
                write_atomic(&root, path, bytes)?;
            }
            Ok::<(), PersistError>(())
        })
        .await??;
        Ok(())
    }
}

/// Atomic write: temp file in the same directory, then rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save_artifacts(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec_pretty(artifacts)?;
        self.write_all(vec![(self.artifacts_path(ctx), bytes)]).await
    }

    async fn save_assets(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        let files = artifacts
            .iter()
            .map(|(name, value)| {
                let bytes = serde_json::to_vec_pretty(value)?;
                Ok((self.asset_path(ctx, name), bytes))
            })
            .collect::<Result<Vec<_>, PersistError>>()?;
        self.write_all(files).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("out")).unwrap();
        (dir, store)
    }

    fn list_files(store: &FsArtifactStore) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_save_artifacts_writes_full_map_under_run_prefix() {
        let (_dir, store) = make_store();
        let url = TargetUrl::parse("https://example.com/docs").unwrap();
        let options = RunOptions::new("https://example.com/docs");
        let ctx = SaveContext::new(&url, &options);
        let artifacts = Artifacts::new()
            .with("HTTPS", json!(true))
            .with("Title", json!("Example"));

        store.save_artifacts(&ctx, &artifacts).await.unwrap();

        let path = store.artifacts_path(&ctx);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("example_com_"));
        assert!(name.ends_with(".artifacts.json"));

        let raw = fs::read_to_string(path).unwrap();
        let back: Artifacts = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, artifacts);
    }

    #[tokio::test]
    async fn test_separate_runs_keep_separate_artifact_files() {
        let (_dir, store) = make_store();
        let url = TargetUrl::parse("https://example.com/").unwrap();
        let options = RunOptions::new("https://example.com/");
        let first = SaveContext::new(&url, &options);
        let second = SaveContext {
            started_at: first.started_at + chrono::Duration::seconds(1),
            ..first
        };

        store
            .save_artifacts(&first, &Artifacts::new().with("Title", json!("one")))
            .await
            .unwrap();
        store
            .save_artifacts(&second, &Artifacts::new().with("Title", json!("two")))
            .await
            .unwrap();

        assert_eq!(list_files(&store).len(), 2);
    }

    #[tokio::test]
    async fn test_save_assets_share_prefix_with_artifacts() {
        let (_dir, store) = make_store();
        let url = TargetUrl::parse("https://example.com/docs").unwrap();
        let options = RunOptions::new("https://example.com/docs");
        let ctx = SaveContext::new(&url, &options);
        let artifacts = Artifacts::new()
            .with("HTML", json!("<html></html>"))
            .with("Viewport", json!(true));

        store.save_artifacts(&ctx, &artifacts).await.unwrap();
        store.save_assets(&ctx, &artifacts).await.unwrap();

        let files = list_files(&store);
        assert_eq!(files.len(), 3);
        let prefix = FsArtifactStore::prefix(&ctx);
        assert!(files.iter().all(|f| f.starts_with(&prefix)));
        assert!(files.contains(&format!("{}-HTML.json", prefix)));
        assert!(files.contains(&format!("{}-Viewport.json", prefix)));
        assert!(files.contains(&format!("{}.artifacts.json", prefix)));
    }

    #[tokio::test]
    async fn test_noop_store() {
        let url = TargetUrl::parse("https://example.com").unwrap();
        let options = RunOptions::new("https://example.com");
        let ctx = SaveContext::new(&url, &options);
        NoopArtifactStore
            .save_assets(&ctx, &Artifacts::new())
            .await
            .unwrap();
    }
}
