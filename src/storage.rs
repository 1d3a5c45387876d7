//! Stored report files.
//!
//! Records keep only the `file_url` returned by [`FileStore::save`]; the
//! bytes live wherever the store puts them.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;

/// Prefix of every `file_url` handed out by [`DiskFileStore`].
const URL_PREFIX: &str = "uploads/";
const SHRED_CHUNK: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path outside upload root: {0}")]
    OutsideRoot(String),
}

/// Where a saved file ended up, plus the metadata recorded with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
}

pub trait FileStore: Send + Sync {
    fn save(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError>;

    /// Removing a file that is already gone is not an error.
    fn remove(&self, file_url: &str) -> Result<(), StorageError>;
}

/// Files under a single directory, named `{unix_millis}-{uuid}.{ext}`.
pub struct DiskFileStore {
    root: PathBuf,
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a `file_url` back to a path, refusing anything that could
    /// escape the root.
    fn resolve(&self, file_url: &str) -> Result<PathBuf, StorageError> {
        let name = file_url
            .strip_prefix(URL_PREFIX)
            .filter(|n| !n.is_empty() && !n.contains(['/', '\\']) && !n.starts_with('.'))
            .ok_or_else(|| StorageError::OutsideRoot(file_url.to_string()))?;
        Ok(self.root.join(name))
    }
}

/// Extension for the stored name: the original one if it has a sane
/// extension, otherwise one guessed from the content type.
fn extension_for(original_name: &str, content_type: &str) -> String {
    let from_name = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }
    mime_guess::get_mime_extensions_str(content_type)
        .and_then(|exts| exts.first())
        .map(|e| e.to_string())
        .unwrap_or_else(|| "bin".to_string())
}

impl FileStore for DiskFileStore {
    fn save(
        &self,
        original_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let stored_name = format!(
            "{}-{}.{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4(),
            extension_for(original_name, content_type)
        );
        fs::write(self.root.join(&stored_name), bytes)?;

        tracing::debug!(file = %stored_name, size = bytes.len(), "Stored upload");
        Ok(StoredFile {
            file_url: format!("{URL_PREFIX}{stored_name}"),
            file_name: original_name.to_string(),
            file_type: content_type.to_string(),
        })
    }

    fn remove(&self, file_url: &str) -> Result<(), StorageError> {
        let path = self.resolve(file_url)?;
        if shred(&path)? {
            tracing::debug!(file_url = %file_url, "Removed stored upload");
        }
        Ok(())
    }
}

/// Overwrite a stored upload with random bytes, then unlink it.
/// Returns `false` when there was nothing to remove.
fn shred(path: &Path) -> io::Result<bool> {
    let mut file = match fs::OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let len = file.metadata()?.len();
    if let Err(e) = overwrite_with_noise(&mut file, len) {
        tracing::warn!(path = %path.display(), "Overwrite before delete failed: {e}");
    }
    drop(file);
    fs::remove_file(path)?;
    Ok(true)
}

fn overwrite_with_noise(file: &mut fs::File, len: u64) -> io::Result<()> {
    let mut rng = rand::thread_rng();
    let mut noise = vec![0u8; SHRED_CHUNK];
    let mut left = len;
    while left > 0 {
        let n = left.min(SHRED_CHUNK as u64) as usize;
        rng.fill_bytes(&mut noise[..n]);
        file.write_all(&noise[..n])?;
        left -= n as u64;
    }
    file.sync_all()
}

/// Guess a MIME type from a file name when the client sent none.
pub fn guess_content_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DiskFileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskFileStore::new(dir.path().join("uploads")).unwrap();
        (dir, store)
    }

    #[test]
    fn save_writes_under_root_with_unique_name() {
        let (_dir, store) = store();
        let a = store.save("Blood Test.PDF", "application/pdf", b"%PDF-1.7").unwrap();
        let b = store.save("Blood Test.PDF", "application/pdf", b"%PDF-1.7").unwrap();

        assert_ne!(a.file_url, b.file_url);
        assert!(a.file_url.starts_with("uploads/"));
        assert!(a.file_url.ends_with(".pdf"));
        assert_eq!(a.file_name, "Blood Test.PDF");
        let path = store.resolve(&a.file_url).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn extension_falls_back_to_content_type() {
        assert_eq!(extension_for("scan", "image/png"), "png");
        assert_eq!(extension_for("scan.", "application/x-unknown"), "bin");
    }

    #[test]
    fn remove_deletes_and_tolerates_missing() {
        let (_dir, store) = store();
        let saved = store.save("x.png", "image/png", b"png").unwrap();
        store.remove(&saved.file_url).unwrap();
        assert!(!store.resolve(&saved.file_url).unwrap().exists());
        store.remove(&saved.file_url).unwrap();
    }

    #[test]
    fn remove_handles_large_and_empty_files() {
        let (_dir, store) = store();
        let large = store.save("mri.png", "image/png", &vec![7u8; 200 * 1024]).unwrap();
        let empty = store.save("blank.pdf", "application/pdf", b"").unwrap();

        for saved in [large, empty] {
            let path = store.resolve(&saved.file_url).unwrap();
            assert!(shred(&path).unwrap());
            assert!(!path.exists());
            assert!(!shred(&path).unwrap());
        }
    }

    #[test]
    fn remove_refuses_paths_outside_root() {
        let (_dir, store) = store();
        for url in ["../careconnect.db", "uploads/../x", "uploads/", "/etc/passwd", "uploads/.hidden"] {
            assert!(matches!(store.remove(url), Err(StorageError::OutsideRoot(_))));
        }
    }

    #[test]
    fn content_type_guess() {
        assert_eq!(guess_content_type("a.pdf"), "application/pdf");
        assert_eq!(guess_content_type("a.jpg"), "image/jpeg");
        assert_eq!(guess_content_type("a"), "application/octet-stream");
    }
}
