use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Scratch directory for uploaded PDFs. Files only live here while they are
/// being processed; the directory itself is never removed.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        let path = self.root.join(sanitize_file_name(file_name));
        fs::write(&path, bytes).await?;
        log::debug!("Saved upload to {}", path.display());
        Ok(path)
    }

    pub async fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Deletes everything inside the directory and returns how many entries
    /// were removed.
    pub async fn clear(&self) -> io::Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Blocking variant for the exit path, where no runtime may be left.
    pub fn clear_blocking(&self) -> io::Result<usize> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
            removed += 1;
        }
        Ok(removed)
    }
}

/// Keeps only the final path component so uploads cannot escape the directory.
fn sanitize_file_name(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.is_empty() || name == ".." {
        format!("upload-{}.pdf", uuid::Uuid::new_v4())
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_remove() {
        let temp = TempDir::new().unwrap();
        let uploads = UploadDir::new(temp.path().join("uploads"));

        let path = uploads.save("report.pdf", b"%PDF-1.4").await.unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        uploads.remove(&path).await.unwrap();
        assert!(!path.exists());
        // Removing twice is fine
        uploads.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_strips_directories() {
        let temp = TempDir::new().unwrap();
        let uploads = UploadDir::new(temp.path());

        let path = uploads.save("../../etc/evil.pdf", b"x").await.unwrap();
        assert_eq!(path, temp.path().join("evil.pdf"));

        let path = uploads.save("..", b"x").await.unwrap();
        assert!(path.starts_with(temp.path()));
    }

    #[tokio::test]
    async fn test_clear_keeps_directory() {
        let temp = TempDir::new().unwrap();
        let uploads = UploadDir::new(temp.path().join("uploads"));
        uploads.save("a.pdf", b"a").await.unwrap();
        uploads.save("b.pdf", b"b").await.unwrap();
        std::fs::create_dir(uploads.path().join("nested")).unwrap();

        assert_eq!(uploads.clear().await.unwrap(), 3);
        assert!(uploads.path().exists());
        assert_eq!(std::fs::read_dir(uploads.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_clear_blocking_missing_directory() {
        let temp = TempDir::new().unwrap();
        let uploads = UploadDir::new(temp.path().join("never-created"));
        assert_eq!(uploads.clear_blocking().unwrap(), 0);
    }
}
