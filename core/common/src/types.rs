//! Request and listing types handed to storage drivers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::path;

/// Request to create a file or directory named `name` inside `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequest {
    /// Logical parent directory. May carry a leading separator.
    #[serde(default)]
    pub path: String,
    /// Leaf segment.
    pub name: String,
}

impl FileRequest {
    /// Create a new request.
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Key of the file this request names.
    pub fn file_key(&self) -> String {
        path::build_key(&self.path, &self.name)
    }

    /// Key of the directory marker this request names.
    pub fn directory_key(&self) -> String {
        path::build_directory_key(&self.path, &self.name)
    }

    /// Validate the request and return its file key.
    ///
    /// # Errors
    /// - `InvalidArgument` for a malformed name or parent path
    pub fn checked_file_key(&self) -> crate::Result<String> {
        path::validate_name(&self.name)?;
        let key = self.file_key();
        path::validate_key(&key)?;
        Ok(key)
    }

    /// Validate the request and return its directory key.
    ///
    /// # Errors
    /// - `InvalidArgument` for a malformed name or parent path
    pub fn checked_directory_key(&self) -> crate::Result<String> {
        path::validate_name(&self.name)?;
        let key = self.directory_key();
        path::validate_key(&key)?;
        Ok(key)
    }
}

impl fmt::Display for FileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_key())
    }
}

/// Request to delete a file or directory marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Full path of the target.
    pub path: String,
}

impl DeleteRequest {
    /// Create a new request.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Which entries a listing should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// Files and directories.
    #[default]
    All,
    /// Files only.
    File,
    /// Directories only.
    Dir,
}

impl ListKind {
    /// Check if an entry passes this filter.
    pub fn accepts(&self, is_dir: bool) -> bool {
        match self {
            ListKind::All => true,
            ListKind::File => !is_dir,
            ListKind::Dir => is_dir,
        }
    }
}

impl std::str::FromStr for ListKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "all" => Ok(ListKind::All),
            "file" => Ok(ListKind::File),
            "dir" => Ok(ListKind::Dir),
            other => Err(crate::Error::InvalidArgument(format!(
                "Unknown list kind: {}",
                other
            ))),
        }
    }
}

/// Request to list the direct children of a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Directory to list. Empty or `/` lists the backend root.
    #[serde(default)]
    pub path: String,
    /// Entry filter.
    #[serde(default)]
    pub kind: ListKind,
}

impl ListRequest {
    /// Create a new request.
    pub fn new(path: impl Into<String>, kind: ListKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Leaf name, without separators.
    pub name: String,
    /// Whether this is a directory.
    pub is_dir: bool,
    /// Size in bytes (None for directories).
    pub size: Option<u64>,
}

impl FileEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size: Some(size),
        }
    }

    /// Create a directory entry.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: None,
        }
    }
}
