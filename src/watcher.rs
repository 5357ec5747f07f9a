//! Filesystem watching with debounced reindexing.
//!
//! Each watched project gets a `notify` watcher (polling by default) whose
//! callback feeds an [`EventRouter`]. Changed files land in the project's
//! [`DebounceState`]; deleted files are sent to a task that removes their
//! chunks right away. One ticker task drives every project's debounce
//! state and spawns a non-forced reindex when a burst has settled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, Result};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use code_context_core::debounce::{DebounceState, WatchFilter};

use crate::config::WatcherConfig;
use crate::project::Project;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

/// Map a raw notification to file events. Access and metadata-only
/// events are dropped.
pub fn classify(event: &Event) -> Vec<FileEvent> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(FileEvent::Changed).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(FileEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(FileEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push(FileEvent::Removed(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(FileEvent::Changed(to.clone()));
            }
            out
        }
        EventKind::Modify(_) => event.paths.iter().cloned().map(FileEvent::Changed).collect(),
        _ => Vec::new(),
    }
}

/// Per-project handler invoked from the watcher's callback thread.
pub struct EventRouter {
    root: PathBuf,
    filter: WatchFilter,
    pending: Arc<Mutex<DebounceState>>,
    removals: mpsc::UnboundedSender<PathBuf>,
}

impl EventRouter {
    pub fn new(
        root: PathBuf,
        filter: WatchFilter,
        pending: Arc<Mutex<DebounceState>>,
        removals: mpsc::UnboundedSender<PathBuf>,
    ) -> Self {
        Self {
            root,
            filter,
            pending,
            removals,
        }
    }

    fn relevant(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.filter.accepts(relative)
    }

    pub fn handle(&self, event: notify::Result<Event>, now: Instant) {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "watcher error");
                return;
            }
        };

        for file_event in classify(&event) {
            match file_event {
                FileEvent::Changed(path) if self.relevant(&path) => {
                    tracing::debug!(path = %path.display(), "file changed");
                    self.pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .note_change(path, now);
                }
                FileEvent::Removed(path) if self.relevant(&path) => {
                    tracing::debug!(path = %path.display(), "file removed");
                    if self.removals.send(path).is_err() {
                        tracing::warn!(root = %self.root.display(), "removal handler is gone");
                    }
                }
                _ => {}
            }
        }
    }
}

struct Watch {
    project: Arc<Project>,
    extensions: Vec<String>,
    pending: Arc<Mutex<DebounceState>>,
    _watcher: Box<dyn Watcher + Send>,
    removal_task: JoinHandle<()>,
}

/// Owns every active watcher and the shared debounce ticker.
pub struct WatcherManager {
    config: WatcherConfig,
    watches: Mutex<HashMap<PathBuf, Watch>>,
}

impl WatcherManager {
    pub fn new(config: WatcherConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            watches: Mutex::new(HashMap::new()),
        })
    }

    fn watches(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Watch>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_watching(&self, root: &Path) -> bool {
        self.watches().contains_key(root)
    }

    pub fn watch_count(&self) -> usize {
        self.watches().len()
    }

    /// Watch `project`'s root. An existing watch on the same root is
    /// replaced. Must be called inside a tokio runtime.
    pub fn start(&self, project: Arc<Project>, extensions: Vec<String>) -> Result<()> {
        let root = project.root().to_path_buf();
        let pending = Arc::new(Mutex::new(DebounceState::new(self.config.debounce())));
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let router = EventRouter::new(
            root.clone(),
            WatchFilter::new(&extensions),
            pending.clone(),
            tx,
        );
        let handler = move |res: notify::Result<Event>| router.handle(res, Instant::now());

        let mut watcher: Box<dyn Watcher + Send> = if self.config.polling {
            Box::new(
                PollWatcher::new(
                    handler,
                    NotifyConfig::default().with_poll_interval(self.config.tick_interval()),
                )
                .map_err(|e| anyhow!("watcher init failed: {e}"))?,
            )
        } else {
            Box::new(
                RecommendedWatcher::new(handler, NotifyConfig::default())
                    .map_err(|e| anyhow!("watcher init failed: {e}"))?,
            )
        };
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| anyhow!("failed to watch {}: {e}", root.display()))?;

        let remover = project.clone();
        let removal_task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                if let Err(e) = remover.indexer().remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %e, "failed to drop deleted file");
                }
            }
        });

        let watch = Watch {
            project,
            extensions,
            pending,
            _watcher: watcher,
            removal_task,
        };
        if let Some(old) = self.watches().insert(root.clone(), watch) {
            old.removal_task.abort();
        }
        tracing::info!(
            root = %root.display(),
            polling = self.config.polling,
            debounce_secs = self.config.debounce_secs,
            "watching project"
        );
        Ok(())
    }

    /// Stop watching `root`. Returns whether it was watched.
    pub fn stop(&self, root: &Path) -> bool {
        match self.watches().remove(root) {
            Some(watch) => {
                watch.removal_task.abort();
                tracing::info!(root = %root.display(), "stopped watching project");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let drained: Vec<(PathBuf, Watch)> = self.watches().drain().collect();
        for (_, watch) in drained {
            watch.removal_task.abort();
        }
    }

    /// Advance every project's debounce state. Returns the roots for
    /// which a reindex was started.
    pub fn tick(&self, now: Instant) -> Vec<PathBuf> {
        let mut triggered = Vec::new();
        for (root, watch) in self.watches().iter() {
            let settled = watch
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .tick(now);
            let Some(files) = settled else {
                continue;
            };

            tracing::info!(root = %root.display(), files = files.len(), "changes settled, reindexing");
            let project = watch.project.clone();
            let extensions = watch.extensions.clone();
            tokio::spawn(async move {
                if let Err(e) = project.index(&extensions, false).await {
                    tracing::error!(root = %project.root().display(), error = %e, "reindex failed");
                }
            });
            triggered.push(root.clone());
        }
        triggered
    }

    /// Spawn the task that calls [`WatcherManager::tick`] every
    /// `tick_interval_ms`.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.config.tick_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                manager.tick(Instant::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Services;
    use crate::indexer::IndexerSettings;
    use crate::project::ProjectRegistry;
    use code_context_core::budget::TokenBudgeter;
    use code_context_core::encoding::ApproxEncoding;
    use code_context_core::index::memory::MemoryIndex;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&event(EventKind::Create(CreateKind::File), &["/r/a.py"])),
            vec![FileEvent::Changed("/r/a.py".into())]
        );
        assert_eq!(
            classify(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/r/a.py"]
            )),
            vec![FileEvent::Changed("/r/a.py".into())]
        );
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::File), &["/r/a.py"])),
            vec![FileEvent::Removed("/r/a.py".into())]
        );
        assert_eq!(
            classify(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/r/a.py", "/r/b.py"]
            )),
            vec![
                FileEvent::Removed("/r/a.py".into()),
                FileEvent::Changed("/r/b.py".into())
            ]
        );
        assert!(classify(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/r/a.py"]
        ))
        .is_empty());
    }

    #[test]
    fn test_router_filters_and_routes() {
        let pending = Arc::new(Mutex::new(DebounceState::new(Duration::from_secs(2))));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(
            PathBuf::from("/work/build/proj"),
            WatchFilter::new([".py"]),
            pending.clone(),
            tx,
        );
        let now = Instant::now();

        let modify = || EventKind::Modify(ModifyKind::Data(DataChange::Any));
        router.handle(Ok(event(modify(), &["/work/build/proj/src/a.py"])), now);
        router.handle(Ok(event(modify(), &["/work/build/proj/src/a.py"])), now);
        router.handle(Ok(event(modify(), &["/work/build/proj/.hidden.py"])), now);
        router.handle(Ok(event(modify(), &["/work/build/proj/node_modules/x.py"])), now);
        router.handle(Ok(event(modify(), &["/work/build/proj/readme.md"])), now);
        assert_eq!(pending.lock().unwrap().pending_len(), 1);

        router.handle(
            Ok(event(EventKind::Remove(RemoveKind::File), &["/work/build/proj/old.py"])),
            now,
        );
        assert_eq!(rx.try_recv().unwrap(), PathBuf::from("/work/build/proj/old.py"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_replace_and_stop() {
        let state = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("a.py"), "def a():\n    pass\n").unwrap();

        let services = Services {
            settings: IndexerSettings {
                chunk_size: 1000,
                chunk_overlap: 200,
                state_dir: state.path().to_path_buf(),
                service_timeout: Duration::from_secs(5),
                upsert_timeout: Duration::from_secs(5),
            },
            index: Arc::new(MemoryIndex::new()),
            budgeter: TokenBudgeter::new(Arc::new(ApproxEncoding), 4000),
            cache: None,
            search_timeout: Duration::from_secs(5),
            embedding_model: "test".to_string(),
            default_extensions: vec![".py".to_string()],
        };
        let manager = WatcherManager::new(WatcherConfig::default());
        let registry = ProjectRegistry::new(services).with_watcher(manager.clone());
        let project = registry
            .open_project(&root.path().to_string_lossy())
            .await
            .unwrap();

        registry.watch(&project, &[".py".to_string()]);
        registry.watch(&project, &[".py".to_string()]);
        assert_eq!(manager.watch_count(), 1);
        assert!(manager.is_watching(project.root()));
        assert!(manager.tick(Instant::now()).is_empty());

        assert!(manager.stop(project.root()));
        assert!(!manager.stop(project.root()));
        manager.stop_all();
        assert_eq!(manager.watch_count(), 0);
    }
}
