//! Change filtering and the debounce state machine behind file watching.
//!
//! Notifications for one project are recorded with [`DebounceState::note_change`].
//! A periodic [`DebounceState::tick`] decides when a burst has settled and
//! a reindex should run. Time is passed in by the caller so the state
//! machine stays deterministic under test.
//!
//! ```text
//! Idle ──note_change──▶ Pending ──tick (settled, guard open)──▶ Idle
//!                          ▲                │
//!                          └─ guard closed: re-queued with original times
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Directory names whose contents never trigger a reindex.
pub const IGNORED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    "bin",
    "obj",
    "build",
    "dist",
    ".vs",
    ".idea",
];

/// Decides which changed paths are relevant to a watched project.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    extensions: BTreeSet<String>,
}

impl WatchFilter {
    /// `extensions` may be given with or without the leading dot.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        Self { extensions }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if name.starts_with('.') || name.ends_with('~') {
            return false;
        }
        let in_ignored_dir = path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| IGNORED_DIRS.contains(&s))
        });
        if in_ignored_dir {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&normalize_extension(e)))
    }
}

/// Lowercase with a leading dot.
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())
}

/// Pending changes for one project plus the reindex rate guard.
#[derive(Debug)]
pub struct DebounceState {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
    last_trigger: Option<Instant>,
}

impl DebounceState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            last_trigger: None,
        }
    }

    /// Record or refresh the timestamp for `path`.
    pub fn note_change(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Collect changes older than the window. Returns the settled paths
    /// (sorted) when a reindex should run now, and records the trigger.
    ///
    /// If a reindex fired less than one window ago, settled paths are put
    /// back with their original timestamps and `None` is returned.
    pub fn tick(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let settled: Vec<(PathBuf, Instant)> = self
            .pending
            .iter()
            .filter(|(_, t)| now.saturating_duration_since(**t) >= self.window)
            .map(|(p, t)| (p.clone(), *t))
            .collect();
        if settled.is_empty() {
            return None;
        }
        for (p, _) in &settled {
            self.pending.remove(p);
        }

        let guard_open = self
            .last_trigger
            .map_or(true, |t| now.saturating_duration_since(t) >= self.window);
        if !guard_open {
            for (p, t) in settled {
                self.pending.insert(p, t);
            }
            return None;
        }

        self.last_trigger = Some(now);
        let mut paths: Vec<PathBuf> = settled.into_iter().map(|(p, _)| p).collect();
        paths.sort();
        Some(paths)
    }
}
