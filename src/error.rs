use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Errors surfaced by the project registry and query boundary.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("No project indexed. Index a project first")]
    NoProjects,

    #[error("Project not indexed: {0}")]
    ProjectNotIndexed(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
