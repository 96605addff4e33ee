//! Context loading with memory mapping support.
//!
//! Small files are read directly; files at or above the threshold are
//! memory-mapped and validated as UTF-8 before copying out.

// Memory mapping requires unsafe but is sound for read-only access
#![allow(unsafe_code)]

use crate::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum context file size (1GB).
const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Path that means "read the context from stdin".
pub const STDIN_PATH: &str = "-";

/// Reader for a context file.
///
/// # Examples
///
/// ```no_run
/// use minions_rs::io::ContextReader;
///
/// let reader = ContextReader::open("record.txt").unwrap();
/// let context = reader.read_to_string().unwrap();
/// ```
pub struct ContextReader {
    file: File,
    size: u64,
    path: String,
}

impl ContextReader {
    /// Opens a context file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be opened, or is
    /// larger than 1GB.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        if !path_ref.exists() {
            return Err(IoError::FileNotFound { path: path_str }.into());
        }

        let file = File::open(path_ref).map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let size = file
            .metadata()
            .map_err(|e| IoError::ReadFailed {
                path: path_str.clone(),
                reason: e.to_string(),
            })?
            .len();

        if size > MAX_FILE_SIZE {
            return Err(IoError::ReadFailed {
                path: path_str,
                reason: format!("file too large: {size} bytes (max: {MAX_FILE_SIZE} bytes)"),
            }
            .into());
        }

        Ok(Self {
            file,
            size,
            path: path_str,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the whole file as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or mapping fails or the content is not
    /// valid UTF-8.
    pub fn read_to_string(&self) -> Result<String> {
        if self.size >= MMAP_THRESHOLD {
            self.read_mmap()
        } else {
            self.read_direct()
        }
    }

    fn read_mmap(&self) -> Result<String> {
        // Safety: the map is read-only and dropped before returning
        let mmap = unsafe {
            Mmap::map(&self.file).map_err(|e| IoError::MmapFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };

        let text = std::str::from_utf8(&mmap).map_err(|e| IoError::ReadFailed {
            path: self.path.clone(),
            reason: format!("invalid UTF-8: {e}"),
        })?;
        Ok(text.to_owned())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_direct(&self) -> Result<String> {
        let mut file = &self.file;
        let mut buffer = Vec::with_capacity(self.size as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| IoError::ReadFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        String::from_utf8(buffer).map_err(|e| {
            IoError::ReadFailed {
                path: self.path.clone(),
                reason: format!("invalid UTF-8: {e}"),
            }
            .into()
        })
    }
}

/// Reads a context from a file, or from stdin when `path` is `-`.
///
/// # Errors
///
/// Returns an error if the source cannot be read or is not valid UTF-8.
pub fn read_context<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    if path.as_os_str() == STDIN_PATH {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| IoError::ReadFailed {
                path: STDIN_PATH.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(buffer);
    }
    ContextReader::open(path)?.read_to_string()
}

/// Writes content to a file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directory creation or file writing fails.
pub fn write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path_ref = path.as_ref();

    if let Some(parent) = path_ref.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| IoError::WriteFailed {
            path: parent.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    }

    std::fs::write(path_ref, content).map_err(|e| IoError::WriteFailed {
        path: path_ref.to_string_lossy().to_string(),
        reason: e.to_string(),
    })?;

    Ok(())
}
