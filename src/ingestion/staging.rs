//! Staging of uploaded payloads.
//!
//! An upload arrives as an arbitrary reader. It is spooled to a uniquely named temporary file
//! (keeping the original extension) so the pipeline can read it as a plain file, and the file
//! is removed once the run is over.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// A payload spooled to a temporary file.
///
/// The file is deleted by [`StagedInput::cleanup`] or, failing that, on drop.
#[derive(Debug)]
pub struct StagedInput {
    file: Option<NamedTempFile>,
}

impl StagedInput {
    /// Spool `payload` into the system temp directory.
    pub fn stage(payload: impl Read, original_name: &str) -> io::Result<Self> {
        Self::stage_in(std::env::temp_dir(), payload, original_name)
    }

    /// Spool `payload` into `dir`, creating the directory if needed.
    pub fn stage_in(dir: impl AsRef<Path>, mut payload: impl Read, original_name: &str) -> io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let suffix = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        let bytes = io::copy(&mut payload, &mut file)?;
        file.flush()?;
        debug!(path = %file.path().display(), bytes, original_name, "staged upload");

        Ok(Self { file: Some(file) })
    }

    /// Path of the staged file, until it is cleaned up.
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(NamedTempFile::path)
    }

    /// A fresh read handle positioned at the start of the staged file.
    pub fn open(&self) -> io::Result<File> {
        match &self.file {
            Some(file) => file.reopen(),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "staged file already removed")),
        }
    }

    /// Remove the staged file now. Failures are logged, not returned.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = file.path().to_path_buf();
        match file.close() {
            Ok(()) => debug!(path = %path.display(), "temp file deleted"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete temp file"),
        }
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        self.remove();
    }
}
