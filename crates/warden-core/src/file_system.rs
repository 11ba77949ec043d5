use std::path::Path;

use anyhow::{Context, Result};

use crate::atomic_io::{write_bytes_atomic, write_text_atomic};

/// Filesystem capability consumed by the supervisor and the service ports.
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;
    fn copy_file(&self, source: &Path, destination: &Path) -> Result<()>;
    fn mkdir_all(&self, path: &Path) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
    /// Removes a file or a directory tree. Missing paths are not an error.
    fn remove_all(&self, path: &Path) -> Result<()>;
    fn read_dir_names(&self, path: &Path) -> Result<Vec<String>>;

    fn write_file_string(&self, path: &Path, content: &str) -> Result<()> {
        self.write_file(path, content.as_bytes())
    }

    fn read_file_string(&self, path: &Path) -> Result<String> {
        let raw = self.read_file(path)?;
        String::from_utf8(raw).with_context(|| format!("{} is not valid utf-8", path.display()))
    }
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        write_bytes_atomic(path, content)
    }

    fn write_file_string(&self, path: &Path, content: &str) -> Result<()> {
        write_text_atomic(path, content)
    }

    fn copy_file(&self, source: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            self.mkdir_all(parent)?;
        }
        std::fs::copy(source, destination).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                destination.display()
            )
        })?;
        Ok(())
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        let existed = path.is_dir();
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        #[cfg(unix)]
        if !existed {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o750))
                .with_context(|| format!("failed to set permissions on {}", path.display()))?;
        }
        #[cfg(not(unix))]
        let _ = existed;
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => {
                Err(error).with_context(|| format!("failed to remove {}", path.display()))
            }
        }
    }

    fn read_dir_names(&self, path: &Path) -> Result<Vec<String>> {
        if !path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)
            .with_context(|| format!("failed to list {}", path.display()))?
        {
            let entry = entry.with_context(|| format!("failed to list {}", path.display()))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
