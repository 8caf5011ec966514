//! Kernel source lookup relative to the running executable.

use crate::error::{OpenClError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kernel source text together with the file it came from.
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub path: PathBuf,
    pub text: String,
}

/// Searches an ordered list of directories for named resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocator {
    search_dirs: Vec<PathBuf>,
}

impl ResourceLocator {
    /// Locator over an explicit list of directories.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Locator for an installed binary.
    ///
    /// Order: the executable's directory, `../Resources` (bundle layout),
    /// `resources/` next to the executable, then this crate's own
    /// `resources/` directory.
    pub fn from_executable() -> Self {
        let mut dirs = Vec::new();
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir.clone());
            dirs.push(exe_dir.join("..").join("Resources"));
            dirs.push(exe_dir.join("resources"));
        }
        dirs.push(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources"));
        Self::new(dirs)
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// First existing file called `name` in the search order.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_dirs.iter().map(|dir| dir.join(name)).find(|candidate| candidate.is_file())
    }

    /// Find and read the resource called `name`.
    pub fn load(&self, name: &str) -> Result<KernelSource> {
        let path = self.locate(name).ok_or_else(|| OpenClError::ResourceNotFound {
            name: name.to_string(),
            searched: self.search_dirs.clone(),
        })?;
        read_source(&path)
    }
}

/// Read kernel source from an explicit path.
pub fn load_path(path: &Path) -> Result<KernelSource> {
    if !path.is_file() {
        return Err(OpenClError::ResourceNotFound {
            name: path.display().to_string(),
            searched: Vec::new(),
        });
    }
    read_source(path)
}

fn read_source(path: &Path) -> Result<KernelSource> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| OpenClError::ResourceRead { path: path.to_path_buf(), source })?;
    debug!(path = %path.display(), bytes = text.len(), "loaded kernel source");
    Ok(KernelSource { path: path.to_path_buf(), text })
}
