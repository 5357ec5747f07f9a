//! Projects and the registry that owns them.
//!
//! A [`Project`] pairs the indexer and query engine for one root. The
//! [`ProjectRegistry`] maps canonical roots to projects, tracks the current
//! project, and (in the server) starts and stops file watchers. It is an
//! ordinary value handed to whoever needs it; there is no global registry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Result as AnyResult;
use serde::Serialize;

use code_context_core::models::IndexSummary;

use crate::app::Services;
use crate::error::{RagError, Result};
use crate::indexer::ProjectIndexer;
use crate::paths::{to_wsl_path, validate_project_path};
use crate::query::{QueryEngine, QueryOutcome};
use crate::state;
use crate::watcher::WatcherManager;

pub struct Project {
    indexer: ProjectIndexer,
    engine: QueryEngine,
}

impl Project {
    async fn open(root: PathBuf, services: &Services) -> AnyResult<Self> {
        let indexer =
            ProjectIndexer::open(root, services.settings.clone(), services.index.clone()).await?;
        let engine = QueryEngine::new(
            indexer.root().to_string_lossy().to_string(),
            indexer.collection_id().to_string(),
            services.index.clone(),
            services.budgeter.clone(),
            services.cache.clone(),
            services.search_timeout,
        );
        Ok(Self { indexer, engine })
    }

    pub fn root(&self) -> &Path {
        self.indexer.root()
    }

    pub fn indexer(&self) -> &ProjectIndexer {
        &self.indexer
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub async fn index(&self, extensions: &[String], force: bool) -> AnyResult<IndexSummary> {
        self.indexer.index(extensions, force).await
    }

    pub async fn query(&self, text: &str, max_results: usize) -> QueryOutcome {
        self.engine.query(text, max_results).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStats {
    pub project_root: String,
    pub collection_id: String,
    pub indexed_files: usize,
    pub total_chunks: usize,
    pub state_size: String,
    pub embedding_model: String,
    pub is_current: bool,
}

#[derive(Default)]
struct Inner {
    projects: BTreeMap<PathBuf, Arc<Project>>,
    current: Option<PathBuf>,
}

pub struct ProjectRegistry {
    services: Services,
    inner: RwLock<Inner>,
    watcher: Option<Arc<WatcherManager>>,
}

/// Registry key for a client-supplied path.
fn lookup_key(raw: &str) -> PathBuf {
    let path = PathBuf::from(to_wsl_path(raw.trim()));
    path.canonicalize().unwrap_or(path)
}

impl ProjectRegistry {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            inner: RwLock::new(Inner::default()),
            watcher: None,
        }
    }

    /// Start and stop file watchers as projects come and go.
    pub fn with_watcher(mut self, watcher: Arc<WatcherManager>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.read().projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().projects.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `raw`, then return its project, creating it if needed.
    /// The project becomes current.
    pub async fn open_project(&self, raw: &str) -> Result<Arc<Project>> {
        let root = validate_project_path(raw)?;
        let existing = self.read().projects.get(&root).cloned();
        if let Some(existing) = existing {
            self.write().current = Some(root);
            return Ok(existing);
        }

        let project = Arc::new(Project::open(root.clone(), &self.services).await?);
        let mut inner = self.write();
        let project = inner
            .projects
            .entry(root.clone())
            .or_insert(project)
            .clone();
        inner.current = Some(root);
        Ok(project)
    }

    /// Begin watching `project` for changes to files with `extensions`.
    pub fn watch(&self, project: &Arc<Project>, extensions: &[String]) {
        if let Some(watcher) = &self.watcher {
            if let Err(e) = watcher.start(project.clone(), extensions.to_vec()) {
                tracing::warn!(root = %project.root().display(), error = %e, "file watcher not started");
            }
        }
    }

    /// The named project, or the current one when `raw` is `None`.
    pub fn resolve(&self, raw: Option<&str>) -> Result<Arc<Project>> {
        let mut inner = self.write();
        if inner.projects.is_empty() {
            return Err(RagError::NoProjects);
        }

        if let Some(raw) = raw {
            let key = lookup_key(raw);
            return inner
                .projects
                .get(&key)
                .cloned()
                .ok_or_else(|| RagError::ProjectNotIndexed(key.display().to_string()));
        }

        let current = inner
            .current
            .clone()
            .filter(|c| inner.projects.contains_key(c));
        let key = match current {
            Some(c) => c,
            None => match inner.projects.keys().next() {
                Some(first) => first.clone(),
                None => return Err(RagError::NoProjects),
            },
        };
        inner.current = Some(key.clone());
        inner
            .projects
            .get(&key)
            .cloned()
            .ok_or(RagError::NoProjects)
    }

    pub fn projects(&self) -> Vec<Arc<Project>> {
        self.read().projects.values().cloned().collect()
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.read().current.clone()
    }

    /// Make the project at `raw` current.
    pub fn switch(&self, raw: &str) -> Result<PathBuf> {
        let key = lookup_key(raw);
        let mut inner = self.write();
        if !inner.projects.contains_key(&key) {
            return Err(RagError::ProjectNotIndexed(key.display().to_string()));
        }
        inner.current = Some(key.clone());
        tracing::info!(project = %key.display(), "switched current project");
        Ok(key)
    }

    /// Forget the project at `raw` and delete its chunks, cache entries,
    /// and persisted state.
    pub async fn remove(&self, raw: &str) -> Result<PathBuf> {
        let key = lookup_key(raw);
        let project = {
            let mut inner = self.write();
            let project = inner
                .projects
                .remove(&key)
                .ok_or_else(|| RagError::ProjectNotIndexed(key.display().to_string()))?;
            if inner.current.as_ref() == Some(&key) {
                inner.current = inner.projects.keys().next().cloned();
            }
            project
        };
        self.discard(&project).await?;
        Ok(key)
    }

    /// Remove every project. Returns how many there were.
    pub async fn clear_all(&self) -> Result<usize> {
        let projects: Vec<Arc<Project>> = {
            let mut inner = self.write();
            inner.current = None;
            std::mem::take(&mut inner.projects).into_values().collect()
        };
        for project in &projects {
            self.discard(project).await?;
        }
        Ok(projects.len())
    }

    async fn discard(&self, project: &Project) -> Result<()> {
        if let Some(watcher) = &self.watcher {
            watcher.stop(project.root());
        }
        let cleared = project.engine().clear_cache().await;
        let removed = project.indexer().clear().await?;
        tracing::info!(
            root = %project.root().display(),
            chunks = removed,
            cache_entries = cleared,
            "project cleared"
        );
        Ok(())
    }

    /// Write every project's state to disk.
    pub async fn persist_all(&self) {
        for project in self.projects() {
            if let Err(e) = project.indexer().persist().await {
                tracing::error!(root = %project.root().display(), error = %e, "failed to persist index state");
            }
        }
    }

    /// Recreate projects from persisted state. Roots that no longer exist
    /// are skipped. Returns how many projects were loaded.
    pub async fn load_existing(&self) -> Result<usize> {
        let states = state::list_states(&self.services.settings.state_dir).await?;
        let mut loaded = 0;
        for saved in states {
            let root = saved.project_root;
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "project path no longer exists");
                continue;
            }
            match self.open_project(&root.to_string_lossy()).await {
                Ok(project) => {
                    tracing::info!(
                        root = %root.display(),
                        files = project.indexer().indexed_file_count(),
                        "loaded project"
                    );
                    loaded += 1;
                }
                Err(e) => tracing::warn!(root = %root.display(), error = %e, "failed to load project"),
            }
        }

        // The first project loaded is current, matching a fresh start.
        let mut inner = self.write();
        if loaded > 0 {
            inner.current = inner.projects.keys().next().cloned();
        }
        Ok(loaded)
    }

    pub fn stats(&self, raw: Option<&str>) -> Result<ProjectStats> {
        let project = self.resolve(raw)?;
        let indexer = project.indexer();
        Ok(ProjectStats {
            project_root: indexer.root().display().to_string(),
            collection_id: indexer.collection_id().to_string(),
            indexed_files: indexer.indexed_file_count(),
            total_chunks: indexer.total_chunk_count(),
            state_size: state::state_size(indexer.state_dir(), indexer.collection_id()),
            embedding_model: self.services.embedding_model.clone(),
            is_current: self.current().as_deref() == Some(indexer.root()),
        })
    }
}
