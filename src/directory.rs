//! Storage slot allocation. Every trial attempt gets a directory that no
//! earlier attempt has used. If the canonical name is taken, the allocator
//! falls back to `<name>_0`, `<name>_1`, ... up to a configured limit, and
//! fails rather than reuse a directory that already holds data.

use log::{info, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Default bound on the number of suffixed alternatives probed.
pub const DEFAULT_ALTERNATIVE_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum AllocationError {
    /// The desired name was empty or would escape the base directory.
    #[error("invalid directory name {0:?}")]
    InvalidName(String),

    /// The canonical name and every probed suffix already exist.
    #[error("{name:?} and all {limit} alternatives already exist in {base}")]
    AllocationExhausted {
        base: PathBuf,
        name: String,
        limit: usize,
    },

    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Hands out fresh directories below a base directory.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryAllocator {
    alternative_limit: usize,
}

impl Default for DirectoryAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ALTERNATIVE_LIMIT)
    }
}

impl DirectoryAllocator {
    pub fn new(alternative_limit: usize) -> Self {
        Self { alternative_limit }
    }

    pub fn alternative_limit(&self) -> usize {
        self.alternative_limit
    }

    /// Creates and returns `base/name`, or the first free `base/name_<i>`.
    ///
    /// `base` is created if missing. The directory is created with
    /// [`fs::create_dir`], which fails on an existing path, so a slot that
    /// appears concurrently counts as taken and is never handed out twice.
    pub fn allocate(&self, base: impl AsRef<Path>, name: &str) -> Result<PathBuf, AllocationError> {
        let base = base.as_ref();
        validate_name(name)?;

        if !base.is_dir() {
            fs::create_dir_all(base).map_err(|source| AllocationError::Io {
                path: base.to_path_buf(),
                source,
            })?;
            info!("Base directory {} created", base.display());
        }

        let target = base.join(name);
        if try_create(&target)? {
            info!("Directory {} created", target.display());
            return Ok(target);
        }

        for suffix in 0..self.alternative_limit {
            let alternative = base.join(format!("{name}_{suffix}"));
            if try_create(&alternative)? {
                warn!(
                    "Directory {} exists, using alternative {}",
                    target.display(),
                    alternative.display()
                );
                return Ok(alternative);
            }
        }

        Err(AllocationError::AllocationExhausted {
            base: base.to_path_buf(),
            name: name.to_owned(),
            limit: self.alternative_limit,
        })
    }
}

/// Returns `Ok(false)` if something already occupies `path`.
fn try_create(path: &Path) -> Result<bool, AllocationError> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(source) => Err(AllocationError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn validate_name(name: &str) -> Result<(), AllocationError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains(['/', '\\'])
    {
        return Err(AllocationError::InvalidName(name.to_owned()));
    }
    Ok(())
}
