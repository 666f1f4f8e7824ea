//! Per-submission workspace lifecycle.
//!
//! A workspace is a throwaway copy of the fixed judge template tree,
//! materialized under the OS temp directory and torn down once a verdict
//! has been emitted (unless `--keep` was passed). `WorkspaceManager` also
//! resolves the repo root the template lives under, and locates the test
//! report artifact once the sandboxed test phase has run.

use std::path::{Path, PathBuf};

use crate::error::JudgeError;

const WORKSPACE_ROOT_DIR_NAME: &str = "tracepoint-workspaces";
const TEMPLATE_DIR_NAME: &str = "judge-template";
const SERVER_DIR_NAME: &str = "server";
const PACKAGE_CACHE_DIR_NAME: &str = "_nuget-cache";

/// Immutable set of paths describing one submission's workspace.
///
/// Built once by [`WorkspaceManager::create_workspace`] and never
/// mutated afterwards; each pipeline phase reads from it but none of
/// them may change it.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub repo_root: PathBuf,
    pub template_dir: PathBuf,
    pub work_root: PathBuf,
    pub work_dir: PathBuf,
    pub package_cache_dir: PathBuf,
}

/// Creates, searches, and tears down per-submission workspaces.
pub struct WorkspaceManager {
    /// Root under which every submission gets its own subdirectory.
    /// Defaults to `<os-temp>/tracepoint-workspaces`.
    work_root: PathBuf,
}

impl WorkspaceManager {
    /// Creates a manager rooted at the OS temp directory.
    pub fn new() -> Self {
        Self {
            work_root: std::env::temp_dir().join(WORKSPACE_ROOT_DIR_NAME),
        }
    }

    /// Creates a manager rooted at an explicit directory (used by tests
    /// to avoid polluting the real OS temp dir).
    #[cfg(test)]
    pub fn with_work_root(work_root: PathBuf) -> Self {
        Self { work_root }
    }

    /// Walks upward from `start` looking for a directory that contains
    /// both a `judge-template` and a `server` subdirectory; that
    /// directory is the repo root.
    ///
    /// # Errors
    ///
    /// Returns [`JudgeError::WorkspaceInit`] if no such ancestor exists
    /// before reaching the filesystem root.
    pub fn find_repo_root(start: &Path) -> Result<PathBuf, JudgeError> {
        let mut current = Some(start.to_path_buf());
        while let Some(dir) = current {
            if dir.join(TEMPLATE_DIR_NAME).is_dir() && dir.join(SERVER_DIR_NAME).is_dir() {
                return Ok(dir);
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        Err(JudgeError::WorkspaceInit(format!(
            "no ancestor of {} contains both '{}' and '{}'",
            start.display(),
            TEMPLATE_DIR_NAME,
            SERVER_DIR_NAME
        )))
    }

    /// Materializes a fresh workspace for `submission_id`: resolves the
    /// repo root, copies the template tree into `<workRoot>/<id>`, and
    /// creates the package cache directory inside it.
    ///
    /// # Errors
    ///
    /// [`JudgeError::WorkspaceInit`] if the repo root (and therefore the
    /// template) cannot be found, or if copying the template fails.
    pub async fn create_workspace(
        &self,
        cwd: &Path,
        submission_id: &str,
    ) -> Result<WorkspacePaths, JudgeError> {
        let repo_root = Self::find_repo_root(cwd)?;
        let template_dir = repo_root.join(TEMPLATE_DIR_NAME);

        let work_dir = self.work_root.join(submission_id);
        tokio::fs::create_dir_all(&work_dir).await?;

        copy_dir_all(&template_dir, &work_dir)
            .await
            .map_err(|e| {
                JudgeError::WorkspaceInit(format!(
                    "failed to copy template {} -> {}: {e}",
                    template_dir.display(),
                    work_dir.display()
                ))
            })?;

        let package_cache_dir = work_dir.join(PACKAGE_CACHE_DIR_NAME);
        tokio::fs::create_dir_all(&package_cache_dir).await?;

        tracing::info!(
            submission_id,
            work_dir = %work_dir.display(),
            "workspace created"
        );

        Ok(WorkspacePaths {
            repo_root,
            template_dir,
            work_root: self.work_root.clone(),
            work_dir,
            package_cache_dir,
        })
    }

    /// Recursively searches `root` for the test report artifact.
    ///
    /// Prefers the most recently modified file named exactly
    /// `preferred_name`; failing that, the most recently modified file
    /// with a `.trx` extension anywhere beneath `root`. Ties are broken
    /// by shortest path then lexicographic order, for determinism.
    pub async fn find_artifact(root: &Path, preferred_name: &str) -> Option<PathBuf> {
        let mut exact_matches = Vec::new();
        let mut trx_matches = Vec::new();
        walk_collect(root, preferred_name, &mut exact_matches, &mut trx_matches).await;

        pick_newest(exact_matches).or_else(|| pick_newest(trx_matches))
    }

    /// Deletes the workspace unless `keep` is set. All failures are
    /// logged and swallowed — cleanup is always best-effort.
    pub async fn cleanup(work_dir: &Path, keep: bool) {
        if keep {
            tracing::info!(work_dir = %work_dir.display(), "keeping workspace (--keep)");
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
            tracing::warn!(
                work_dir = %work_dir.display(),
                error = %e,
                "failed to clean up workspace"
            );
        }
    }
}

impl Default for WorkspaceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively copies every entry under `src` into `dst`, creating
/// directories as needed.
fn copy_dir_all<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;

        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if file_type.is_dir() {
                copy_dir_all(&src_path, &dst_path).await?;
            } else {
                tokio::fs::copy(&src_path, &dst_path).await?;
            }
        }

        Ok(())
    })
}

/// Depth-first walk collecting matches into `exact` (filename equals
/// `preferred_name`) and `trx` (extension is `.trx`) buckets.
fn walk_collect<'a>(
    dir: &'a Path,
    preferred_name: &'a str,
    exact: &'a mut Vec<(PathBuf, std::time::SystemTime)>,
    trx: &'a mut Vec<(PathBuf, std::time::SystemTime)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to read directory while searching for artifact");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };

            if file_type.is_dir() {
                walk_collect(&path, preferred_name, exact, trx).await;
                continue;
            }

            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);

            if path.file_name().and_then(|n| n.to_str()) == Some(preferred_name) {
                exact.push((path.clone(), modified));
            }
            if path.extension().and_then(|e| e.to_str()) == Some("trx") {
                trx.push((path, modified));
            }
        }
    })
}

/// Picks the most recently modified entry, breaking ties by shortest
/// path then lexicographic order.
fn pick_newest(mut candidates: Vec<(PathBuf, std::time::SystemTime)>) -> Option<PathBuf> {
    candidates.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| a.0.as_os_str().len().cmp(&b.0.as_os_str().len()))
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.into_iter().next().map(|(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_repo(dir: &Path) {
        fs::create_dir_all(dir.join(TEMPLATE_DIR_NAME)).unwrap();
        fs::create_dir_all(dir.join(SERVER_DIR_NAME)).unwrap();
        fs::write(dir.join(TEMPLATE_DIR_NAME).join("Program.cs"), "// template").unwrap();
    }

    #[test]
    fn find_repo_root_walks_upward() {
        let tmp = tempfile::tempdir().unwrap();
        make_repo(tmp.path());

        let nested = tmp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let found = WorkspaceManager::find_repo_root(&nested).unwrap();
        assert_eq!(found, tmp.path());
    }

    #[test]
    fn find_repo_root_fails_without_template() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(SERVER_DIR_NAME)).unwrap();

        let err = WorkspaceManager::find_repo_root(tmp.path()).unwrap_err();
        assert!(matches!(err, JudgeError::WorkspaceInit(_)));
    }

    #[tokio::test]
    async fn create_workspace_copies_template_and_makes_cache_dir() {
        let repo = tempfile::tempdir().unwrap();
        make_repo(repo.path());

        let work_root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::with_work_root(work_root.path().to_path_buf());

        let paths = manager.create_workspace(repo.path(), "deadbeef").await.unwrap();

        assert!(paths.work_dir.join("Program.cs").exists());
        assert!(paths.package_cache_dir.is_dir());
        assert_eq!(paths.package_cache_dir, paths.work_dir.join(PACKAGE_CACHE_DIR_NAME));
    }

    #[tokio::test]
    async fn find_artifact_prefers_exact_name_match() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("TestResults/deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("other.trx"), "x").unwrap();
        fs::write(tmp.path().join("results.trx"), "y").unwrap();

        let found = WorkspaceManager::find_artifact(tmp.path(), "results.trx").await;
        assert_eq!(found, Some(tmp.path().join("results.trx")));
    }

    #[tokio::test]
    async fn find_artifact_falls_back_to_any_trx() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("TestResults")).unwrap();
        fs::write(tmp.path().join("TestResults/other.trx"), "x").unwrap();

        let found = WorkspaceManager::find_artifact(tmp.path(), "results.trx").await;
        assert_eq!(found, Some(tmp.path().join("TestResults/other.trx")));
    }

    #[tokio::test]
    async fn find_artifact_returns_none_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let found = WorkspaceManager::find_artifact(tmp.path(), "results.trx").await;
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn cleanup_removes_workspace_unless_keep() {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = tmp.path().join("ws");
        fs::create_dir_all(&work_dir).unwrap();

        WorkspaceManager::cleanup(&work_dir, true).await;
        assert!(work_dir.exists());

        WorkspaceManager::cleanup(&work_dir, false).await;
        assert!(!work_dir.exists());
    }
}
