//! Source documents.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};

/// A source file offered to the handlers.
///
/// Contents are read on first access and cached, so several handlers
/// probing the same document share a single read.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    contents: OnceCell<Vec<u8>>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            contents: OnceCell::new(),
        }
    }

    /// Filesystem path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the document, as stored on disk.
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// Base name for display and pattern matching. Invalid UTF-8 is
    /// replaced, so use [`Document::file_name`] to build paths.
    pub fn name(&self) -> Cow<'_, str> {
        self.file_name().to_string_lossy()
    }

    /// Lower-cased extension, empty when there is none.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
    }

    /// Size in bytes.
    pub fn size(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Full contents of the document.
    pub fn contents(&self) -> io::Result<&[u8]> {
        if let Some(data) = self.contents.get() {
            return Ok(data);
        }
        let data = fs::read(&self.path)?;
        Ok(self.contents.get_or_init(|| data))
    }

    /// Contents decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> io::Result<String> {
        Ok(String::from_utf8_lossy(self.contents()?).into_owned())
    }

    /// The first `num_bytes` bytes of the document.
    pub fn head(&self, num_bytes: usize) -> io::Result<&[u8]> {
        let data = self.contents()?;
        Ok(&data[..num_bytes.min(data.len())])
    }

    /// First line of the document, without the line terminator.
    pub fn first_line(&self) -> io::Result<String> {
        let text = self.text()?;
        Ok(text.lines().next().unwrap_or("").to_string())
    }

    /// Local date of the last modification.
    pub fn modified_date(&self) -> io::Result<NaiveDate> {
        let modified = fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Local>::from(modified).date_naive())
    }
}
