//! Project path normalization.
//!
//! Clients running on Windows may send `C:\Users\me\proj`; the server sees
//! the same tree under WSL at `/mnt/c/Users/me/proj`.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{RagError, Result};

fn drive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]):").unwrap())
}

/// Translate a Windows path to its WSL mount. Unix paths pass through.
pub fn to_wsl_path(raw: &str) -> String {
    if raw.starts_with('/') {
        return raw.to_string();
    }
    let path = raw.replace('\\', "/");
    match drive_re().captures(&path) {
        Some(caps) => {
            let drive = caps[1].to_lowercase();
            format!("/mnt/{drive}{}", &path[2..])
        }
        None => path,
    }
}

/// Normalize and check that `raw` names a readable directory.
///
/// Returns the canonical absolute path.
pub fn validate_project_path(raw: &str) -> Result<PathBuf> {
    let normalized = to_wsl_path(raw.trim());
    let path = PathBuf::from(&normalized);

    if !path.exists() {
        return Err(RagError::InvalidPath(format!("{normalized} does not exist")));
    }
    if !path.is_dir() {
        return Err(RagError::InvalidPath(format!("{normalized} is not a directory")));
    }
    if let Err(e) = std::fs::read_dir(&path) {
        return Err(RagError::InvalidPath(format!("{normalized} is not readable: {e}")));
    }

    path.canonicalize()
        .map_err(|e| RagError::InvalidPath(format!("{normalized}: {e}")))
}
