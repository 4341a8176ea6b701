use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::errors::StageError;
use crate::jobs::models::JobId;
use crate::jobs::stages::ArtifactPublisher;
use crate::jobs::storage::ArtifactStore;

/// Directories never shipped in the downloadable archive.
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", "dist"];

/// Writes archives and previews into the artifact store.
#[derive(Debug, Clone)]
pub struct StorePublisher {
    store: ArtifactStore,
}

impl StorePublisher {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArtifactPublisher for StorePublisher {
    async fn package_archive(&self, workspace: &Path, archive_path: &Path) -> Result<PathBuf, StageError> {
        let workspace = workspace.to_path_buf();
        let archive_path = archive_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            write_archive(&workspace, &archive_path).map(|()| archive_path)
        })
        .await
        .map_err(|e| StageError::Package(e.to_string()))?
        .map_err(|e| StageError::Package(format!("{:#}", e)))
    }

    async fn publish_preview(&self, job_id: JobId, build_output: &Path) -> Result<String, StageError> {
        let source = build_output.to_path_buf();
        let target = self.store.preview_path(job_id);
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|e| StageError::Publish(e.to_string()))?
            .map_err(|e| StageError::Publish(format!("{:#}", e)))?;
        Ok(format!("/previews/{}/index.html", job_id))
    }
}

/// Zip `workspace` into `archive_path`, skipping [`EXCLUDED_DIRS`].
///
/// The archive is written beside its final path and renamed into place, so
/// a download never observes a partial file.
pub fn write_archive(workspace: &Path, archive_path: &Path) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let partial = archive_path.with_extension("zip.part");
    if let Err(e) = write_zip(workspace, &partial) {
        if let Err(cleanup) = std::fs::remove_file(&partial)
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!("failed to remove partial archive {}: {}", partial.display(), cleanup);
        }
        return Err(e);
    }
    std::fs::rename(&partial, archive_path)
        .with_context(|| format!("Failed to move archive into {}", archive_path.display()))?;
    Ok(())
}

fn write_zip(workspace: &Path, partial: &Path) -> Result<()> {
    let file = File::create(partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let walker = WalkDir::new(workspace)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| EXCLUDED_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry.context("Failed to walk workspace")?;
        let relative = entry
            .path()
            .strip_prefix(workspace)
            .context("Workspace entry outside workspace")?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let bytes = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            zip.write_all(&bytes)?;
        }
    }

    let mut writer = zip.finish().context("Failed to finish archive")?;
    writer.flush()?;
    Ok(())
}

/// Recursively copy `source` into `target`, creating `target` as needed.
pub fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)
        .with_context(|| format!("Failed to create {}", target.display()))?;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .context("Build entry outside build output")?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .with_context(|| format!("Failed to create {}", destination.display()))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &destination)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/app")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/@angular/core")).unwrap();
        std::fs::create_dir_all(root.join("dist/out")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("package.json"), "{}").unwrap();
        std::fs::write(root.join("src/app/app.component.html"), "<h1>Hi</h1>").unwrap();
        std::fs::write(root.join("node_modules/@angular/core/index.js"), "x").unwrap();
        std::fs::write(root.join("dist/out/index.html"), "<html>").unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref").unwrap();
        dir
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_archive_skips_excluded_dirs() {
        let ws = workspace();
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("downloads/job.zip");
        write_archive(ws.path(), &archive).unwrap();

        let names = entry_names(&archive);
        assert!(names.contains(&"package.json".to_string()));
        assert!(names.contains(&"src/app/app.component.html".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("node_modules")));
        assert!(!names.iter().any(|n| n.starts_with("dist")));
        assert!(!names.iter().any(|n| n.starts_with(".git")));
        assert!(!out.path().join("downloads/job.zip.part").exists());
    }

    #[test]
    fn test_failed_archive_leaves_no_partial_file() {
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("job.zip");
        let missing = out.path().join("workspace-already-removed");

        assert!(write_archive(&missing, &archive).is_err());
        assert!(!archive.exists());
        assert!(!out.path().join("job.zip.part").exists());
    }

    #[test]
    fn test_archive_contents_round_trip() {
        let ws = workspace();
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("job.zip");
        write_archive(ws.path(), &archive).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("src/app/app.component.html")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "<h1>Hi</h1>");
    }

    #[test]
    fn test_copy_tree_is_recursive() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("assets")).unwrap();
        std::fs::write(src.path().join("index.html"), "<html>").unwrap();
        std::fs::write(src.path().join("assets/logo.svg"), "<svg/>").unwrap();
        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("previews/abc");

        copy_tree(src.path(), &target).unwrap();
        assert_eq!(std::fs::read_to_string(target.join("index.html")).unwrap(), "<html>");
        assert!(target.join("assets/logo.svg").is_file());
    }

    #[tokio::test]
    async fn test_publisher_uses_store_layout() {
        let root = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(root.path());
        store.ensure_layout().unwrap();
        let publisher = StorePublisher::new(store.clone());
        let ws = workspace();
        let id = JobId::new();

        let url = publisher
            .publish_preview(id, &ws.path().join("dist/out"))
            .await
            .unwrap();
        assert_eq!(url, format!("/previews/{}/index.html", id));
        assert!(store.preview_path(id).join("index.html").is_file());

        let path = publisher
            .package_archive(ws.path(), &store.archive_path(id))
            .await
            .unwrap();
        assert_eq!(path, store.archive_path(id));
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn test_missing_build_output_is_publish_error() {
        let root = tempfile::tempdir().unwrap();
        let publisher = StorePublisher::new(ArtifactStore::new(root.path()));
        let err = publisher
            .publish_preview(JobId::new(), &root.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Publish(_)));
    }
}
