//! File transfer into a machine's FXF drive
//!
//! Uploads land in `<root>/<machine>`, a host directory shared into the
//! guest. A file whose name is taken gets a `.0`, `.1`, ... suffix, and the
//! directory as a whole never grows past its capacity.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use vs_core::config::FxfConfig;

/// Upload failures
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("File transfer is not enabled for {0}")]
    Disabled(String),

    #[error("Attempted to access file outside file transfer directory: {0}")]
    OutsideDirectory(String),

    #[error("File exceeds maximum allowed size of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("File transfer directory exceeds maximum allowed size")]
    CapacityExceeded,

    #[error("File contents are not a binary string")]
    InvalidContents,

    #[error("File transfer failed: {0}")]
    Io(#[from] io::Error),
}

/// Per-machine transfer directories
pub struct FileTransfer {
    root: Option<PathBuf>,
    max_upload_bytes: u64,
    capacity_bytes: u64,
}

impl FileTransfer {
    /// Create from configuration
    pub fn new(config: &FxfConfig) -> Self {
        Self {
            root: config.root.clone(),
            max_upload_bytes: config.max_upload_bytes,
            capacity_bytes: config.capacity_bytes,
        }
    }

    /// Largest single upload in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Whether `name` has a transfer directory
    pub async fn is_enabled(&self, name: &str) -> bool {
        match self.machine_dir(name) {
            Ok(dir) => tokio::fs::metadata(&dir)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Store `contents` as `filename` in the machine's directory
    ///
    /// Returns the name the file was stored under.
    pub async fn upload(
        &self,
        name: &str,
        filename: &str,
        contents: &[u8],
    ) -> Result<String, TransferError> {
        let size = contents.len() as u64;
        if size > self.max_upload_bytes {
            return Err(TransferError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        if !self.is_enabled(name).await {
            return Err(TransferError::Disabled(name.to_string()));
        }
        let dir = self.machine_dir(name)?;
        let filename = plain_file_name(filename)?;

        if directory_size(&dir).await? + size >= self.capacity_bytes {
            return Err(TransferError::CapacityExceeded);
        }

        let mut suffix = String::new();
        let mut count = 0u64;
        loop {
            let stored = format!("{}{}", filename, suffix);
            let open = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&stored))
                .await;

            match open {
                Ok(mut file) => {
                    file.write_all(contents).await?;
                    file.flush().await?;
                    tracing::info!(machine = %name, file = %stored, size, "Stored upload");
                    return Ok(stored);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    suffix = format!(".{}", count);
                    count += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn machine_dir(&self, name: &str) -> Result<PathBuf, TransferError> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| TransferError::Disabled(name.to_string()))?;
        Ok(root.join(plain_file_name(name)?))
    }
}

/// Accept only a single normal path component
fn plain_file_name(name: &str) -> Result<&str, TransferError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(name),
        _ => Err(TransferError::OutsideDirectory(name.to_string())),
    }
}

/// Total size of regular files below `dir`, not following symlinks
async fn directory_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = tokio::fs::symlink_metadata(entry.path()).await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len();
            }
        }
    }

    Ok(total)
}

/// Decode a JavaScript binary string, one byte per character
pub fn binary_string_bytes(contents: &str) -> Result<Vec<u8>, TransferError> {
    contents
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| TransferError::InvalidContents))
        .collect()
}
