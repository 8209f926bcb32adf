//! Per-invocation scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_ID_LEN: usize = 64;

/// A directory owned by exactly one invocation.
///
/// Removed by [`InvocationWorkspace::release`], or on drop if release was
/// never reached.
#[derive(Debug)]
pub struct InvocationWorkspace {
    path: PathBuf,
    released: bool,
}

impl InvocationWorkspace {
    /// Creates `root/ocr-<id>`, where `id` is the sanitized request id or a
    /// fresh UUID. The directory is always new.
    pub fn create(root: &Path, request_id: Option<&str>) -> io::Result<Self> {
        fs::create_dir_all(root)?;

        let id = request_id
            .map(sanitize_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let path = root.join(format!("ocr-{id}"));
        let path = match fs::create_dir(&path) {
            Ok(()) => path,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let path = root.join(format!("ocr-{id}-{}", uuid::Uuid::new_v4().simple()));
                fs::create_dir(&path)?;
                path
            }
            Err(e) => return Err(e),
        };

        debug!(workspace = %path.display(), "workspace created");
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory and everything in it.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(workspace = %self.path.display(), "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for InvocationWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(workspace = %self.path.display(), error = %e, "workspace cleanup failed");
        }
    }
}

/// File name of a page raster. Derived only from the page number.
pub fn page_file_name(page_number: u32) -> String {
    format!("page{page_number:04}.png")
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(MAX_ID_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_from_request_id() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut ws = InvocationWorkspace::create(root.path(), Some("req-42/../x")).expect("create");
        assert_eq!(ws.path(), root.path().join("ocr-req-42x"));
        assert!(ws.path().is_dir());
        ws.release().expect("release");
        assert!(!root.path().join("ocr-req-42x").exists());
    }

    #[test]
    fn test_page_names_have_one_dot() {
        assert_eq!(page_file_name(3), "page0003.png");
        for page in [1, 12, 9999, 12345] {
            let name = page_file_name(page);
            assert_eq!(name.matches('.').count(), 1, "{name}");
            assert!(!name.contains('_'));
            assert!(!name.contains('-'));
        }
    }

    #[test]
    fn test_same_id_gets_separate_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = InvocationWorkspace::create(root.path(), Some("dup")).expect("first");
        let second = InvocationWorkspace::create(root.path(), Some("dup")).expect("second");
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = {
            let ws = InvocationWorkspace::create(root.path(), None).expect("create");
            std::fs::write(ws.path().join(page_file_name(1)), b"x").expect("write");
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_release_twice_is_ok() {
        let root = tempfile::tempdir().expect("tempdir");
        let mut ws = InvocationWorkspace::create(root.path(), None).expect("create");
        ws.release().expect("first");
        ws.release().expect("second");
    }
}
