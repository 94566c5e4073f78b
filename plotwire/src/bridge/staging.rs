//! Staging large arrays through `.dsr` files.
//!
//! Instead of inlining a big array in a frame, the sender writes it to a
//! self-describing binary file in a shared staging directory and sends only
//! the path. The receiver reads the file back and deletes it. The sender keeps
//! a [`StagedArray`] guard for the duration of the call, so the file is gone
//! afterwards whether the call succeeded or not.
//!
//! File layout (all integers little-endian):
//!
//! ```text
//! b"DSR1" | dtype code: u8 | ndim: u32 | dims: u64 * ndim | element data
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use tempfile::TempPath;

use super::dataset::{ArrayData, ArrayError, DType, Dataset};
use super::value::Value;

/// File extension of staged arrays.
pub const STAGED_EXTENSION: &str = "dsr";

const MAGIC: &[u8; 4] = b"DSR1";

/// Arrays at or above this many payload bytes are staged by default.
pub const DEFAULT_STAGING_THRESHOLD: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("staging I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed .dsr file: {0}")]
    Format(String),

    #[error("malformed .dsr payload: {0}")]
    Array(#[from] ArrayError),

    #[error("refusing to read staged file outside the staging directory: {0}")]
    OutsideStagingDir(PathBuf),
}

impl StagingError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serialize a dataset into `.dsr` bytes.
pub fn encode_dsr(ds: &Dataset) -> Vec<u8> {
    let payload = ds.data().to_le_bytes();
    let mut out = Vec::with_capacity(4 + 1 + 4 + 8 * ds.shape().len() + payload.len());
    out.put_slice(MAGIC);
    out.put_u8(ds.dtype().code());
    out.put_u32_le(ds.shape().len() as u32);
    for &dim in ds.shape() {
        out.put_u64_le(dim as u64);
    }
    out.put_slice(&payload);
    out
}

/// Parse `.dsr` bytes back into a dataset.
pub fn decode_dsr(mut buf: &[u8]) -> Result<Dataset, StagingError> {
    if buf.len() < 9 || &buf[..4] != MAGIC {
        return Err(StagingError::Format("missing DSR1 header".to_string()));
    }
    buf.advance(4);
    let code = buf.get_u8();
    let dtype = DType::from_code(code)
        .ok_or_else(|| StagingError::Format(format!("unknown dtype code {code}")))?;
    let ndim = buf.get_u32_le() as usize;
    if buf.remaining() < ndim.saturating_mul(8) {
        return Err(StagingError::Format(format!(
            "header declares {ndim} dimensions but file is truncated"
        )));
    }
    let shape: Vec<usize> = (0..ndim).map(|_| buf.get_u64_le() as usize).collect();
    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(ArrayError::TooLarge)?;
    let data = ArrayData::from_le_bytes(dtype, count, buf)?;
    Ok(Dataset::new(shape, data)?)
}

/// Sender-side handle on a staged file. Dropping it deletes the file.
#[derive(Debug)]
pub struct StagedArray {
    path: TempPath,
}

impl StagedArray {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Deletes a file when dropped, ignoring a file that is already gone.
struct RemoveOnDrop<'a>(&'a Path);

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(self.0) {
            Ok(()) => tracing::trace!(path = %self.0.display(), "Removed staged file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.0.display(), error = %e, "Failed to remove staged file")
            }
        }
    }
}

/// A staging directory plus the size above which arrays are spooled there.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
    threshold: usize,
}

impl Default for StagingArea {
    fn default() -> Self {
        Self::new(std::env::temp_dir(), DEFAULT_STAGING_THRESHOLD)
    }
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, threshold: usize) -> Self {
        Self {
            dir: dir.into(),
            threshold,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Write `ds` to a fresh, uniquely named `.dsr` file.
    pub fn stage(&self, ds: &Dataset) -> Result<StagedArray, StagingError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StagingError::io(&self.dir, e))?;
        let mut file = tempfile::Builder::new()
            .prefix("plotwire-")
            .suffix(&format!(".{STAGED_EXTENSION}"))
            .tempfile_in(&self.dir)
            .map_err(|e| StagingError::io(&self.dir, e))?;

        let bytes = encode_dsr(ds);
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .map_err(|e| StagingError::io(file.path(), e))?;

        let path = file.into_temp_path();
        tracing::debug!(
            path = %path.display(),
            dtype = ?ds.dtype(),
            shape = ?ds.shape(),
            bytes = bytes.len(),
            "Staged array"
        );
        Ok(StagedArray { path })
    }

    /// Replace every array at or above the threshold with a staged reference.
    ///
    /// The returned guards must outlive the call that ships `values`.
    pub fn stage_large(&self, values: &mut [Value]) -> Result<Vec<StagedArray>, StagingError> {
        let mut guards = Vec::new();
        for value in values.iter_mut() {
            value.walk_mut(&mut |v| {
                if let Value::Array(ds) = v
                    && ds.nbytes() >= self.threshold
                {
                    let staged = self.stage(ds)?;
                    *v = Value::Staged(staged.path().to_path_buf());
                    guards.push(staged);
                }
                Ok::<(), StagingError>(())
            })?;
        }
        Ok(guards)
    }

    /// Read a staged file back. The file is deleted on every path, including
    /// when it turns out to be malformed.
    pub fn unstage(&self, path: &Path) -> Result<Dataset, StagingError> {
        if !self.contains(path) {
            return Err(StagingError::OutsideStagingDir(path.to_path_buf()));
        }
        let _remove = RemoveOnDrop(path);
        let bytes = std::fs::read(path).map_err(|e| StagingError::io(path, e))?;
        decode_dsr(&bytes)
    }

    /// Resolve every staged reference inside `value` into an inline array.
    pub fn resolve(&self, value: &mut Value) -> Result<(), StagingError> {
        value.walk_mut(&mut |v| {
            if let Value::Staged(path) = v {
                let ds = self.unstage(path)?;
                *v = Value::Array(ds);
            }
            Ok(())
        })
    }

    fn contains(&self, path: &Path) -> bool {
        let has_ext = path
            .extension()
            .is_some_and(|ext| ext == STAGED_EXTENSION);
        let Some(parent) = path.parent() else {
            return false;
        };
        has_ext && same_dir(parent, &self.dir)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
