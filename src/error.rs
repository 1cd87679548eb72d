use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WpsError {
    #[error("Node not in allowed list {allowed:?}: {node}")]
    #[diagnostic(code(esgf_wps::invalid_node))]
    InvalidNode {
        node: String,
        allowed: &'static [&'static str],
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catalog record has no dataset identifiers")]
    MalformedRecord,

    #[error("orchestration of {dataset} failed: {diagnostics}")]
    #[diagnostic(help("the orchestrator response is attached verbatim"))]
    OrchestrationFailed { dataset: String, diagnostics: String },

    #[error("orchestration of {0} succeeded but produced no output files")]
    EmptyOutput(String),

    #[error("request folder already exists in shared collection: {0}")]
    FolderCollision(PathBuf),

    #[error("catalog index is not configured: {0}")]
    UnknownIndex(String),

    #[error("node profile enables no catalog index")]
    NoEnabledIndex,

    #[error("no orchestration endpoint configured for node {0}")]
    MissingEndpoint(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("orchestrator request failed: {0}")]
    OrchestratorHttp(String),

    #[error("orchestrator returned status {status}: {message}")]
    OrchestratorStatus { status: u16, message: String },

    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl WpsError {
    pub fn exit_code(&self) -> u8 {
        match self {
            WpsError::InvalidNode { .. }
            | WpsError::InvalidRequest(_)
            | WpsError::MalformedRecord
            | WpsError::MissingConfig(_)
            | WpsError::ConfigParse(_) => 2,
            WpsError::OrchestrationFailed { .. }
            | WpsError::EmptyOutput(_)
            | WpsError::CatalogHttp(_)
            | WpsError::CatalogStatus { .. }
            | WpsError::OrchestratorHttp(_)
            | WpsError::OrchestratorStatus { .. } => 3,
            _ => 1,
        }
    }
}
