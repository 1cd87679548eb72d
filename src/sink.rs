use std::fmt;
use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use uuid::Uuid;

use crate::access::build_url_with;
use crate::config::SharedCollectionConfig;
use crate::domain::NormalizedId;
use crate::error::WpsError;
use crate::orchestrator::{OrchestrationResponse, Orchestrator};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestToken(String);

impl RequestToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFolder {
    pub dir: Utf8PathBuf,
    pub token: RequestToken,
}

impl AsRef<Utf8Path> for SharedFolder {
    fn as_ref(&self) -> &Utf8Path {
        &self.dir
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum MaterializedOutput {
    Local {
        paths: Vec<Utf8PathBuf>,
    },
    Shared {
        token: RequestToken,
        folder: Utf8PathBuf,
        url: String,
    },
}

pub trait OutputSink {
    type Destination: AsRef<Utf8Path>;

    fn allocate_destination(&self) -> Result<Self::Destination, WpsError>;

    fn materialize(
        &self,
        orchestrator: &dyn Orchestrator,
        response: &OrchestrationResponse,
        destination: &Self::Destination,
        dataset: &NormalizedId,
    ) -> Result<Utf8PathBuf, WpsError> {
        orchestrator
            .download(response, destination.as_ref())?
            .into_iter()
            .next()
            .ok_or_else(|| WpsError::EmptyOutput(dataset.to_string()))
    }

    fn describe_for_caller(
        &self,
        destination: Self::Destination,
        paths: Vec<Utf8PathBuf>,
    ) -> MaterializedOutput;
}

#[derive(Debug, Clone, Default)]
pub struct LocalDirectorySink {
    dir: Option<Utf8PathBuf>,
}

impl LocalDirectorySink {
    pub fn new(dir: Option<Utf8PathBuf>) -> Self {
        Self { dir }
    }
}

impl OutputSink for LocalDirectorySink {
    type Destination = Utf8PathBuf;

    fn allocate_destination(&self) -> Result<Utf8PathBuf, WpsError> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|err| WpsError::Filesystem(err.to_string()))?;
                Utf8PathBuf::from_path_buf(cwd)
                    .map_err(|_| WpsError::Filesystem("non-utf8 working directory".to_string()))
            }
        }
    }

    fn describe_for_caller(
        &self,
        _destination: Utf8PathBuf,
        paths: Vec<Utf8PathBuf>,
    ) -> MaterializedOutput {
        MaterializedOutput::Local { paths }
    }
}

#[derive(Debug, Clone)]
pub struct SharedCollectionSink {
    collection: SharedCollectionConfig,
    fixed_token: Option<RequestToken>,
}

impl SharedCollectionSink {
    pub fn new(collection: SharedCollectionConfig) -> Self {
        Self {
            collection,
            fixed_token: None,
        }
    }

    pub fn with_token(collection: SharedCollectionConfig, token: RequestToken) -> Self {
        Self {
            collection,
            fixed_token: Some(token),
        }
    }

    pub fn base_path(&self) -> &Utf8Path {
        &self.collection.base_path
    }
}

impl OutputSink for SharedCollectionSink {
    type Destination = SharedFolder;

    fn allocate_destination(&self) -> Result<SharedFolder, WpsError> {
        let token = self
            .fixed_token
            .clone()
            .unwrap_or_else(RequestToken::generate);
        let dir = self.collection.base_path.join(token.as_str());
        fs::create_dir(dir.as_std_path()).map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => WpsError::FolderCollision(dir.clone().into_std_path_buf()),
            _ => WpsError::Filesystem(format!("create {dir}: {err}")),
        })?;
        Ok(SharedFolder { dir, token })
    }

    fn describe_for_caller(
        &self,
        destination: SharedFolder,
        _paths: Vec<Utf8PathBuf>,
    ) -> MaterializedOutput {
        let url = build_url_with(
            &self.collection.file_manager_url,
            &self.collection.collection_id,
            destination.token.as_str(),
        );
        MaterializedOutput::Shared {
            token: destination.token,
            folder: destination.dir,
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::config::ResolvedConfig;

    fn collection_in(base: &Utf8Path) -> SharedCollectionConfig {
        SharedCollectionConfig {
            base_path: base.to_path_buf(),
            ..ResolvedConfig::default().shared_collection
        }
    }

    #[test]
    fn generated_tokens_are_unique() {
        assert_ne!(RequestToken::generate(), RequestToken::generate());
    }

    #[test]
    fn shared_sink_refuses_existing_folder() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let sink =
            SharedCollectionSink::with_token(collection_in(&base), RequestToken::new("fixed"));

        let destination = sink.allocate_destination().unwrap();
        assert_eq!(destination.dir, base.join("fixed"));
        assert!(destination.dir.as_std_path().is_dir());

        assert_matches!(sink.allocate_destination(), Err(WpsError::FolderCollision(_)));
    }

    #[test]
    fn local_sink_defaults_to_working_directory() {
        let destination = LocalDirectorySink::default().allocate_destination().unwrap();
        assert_eq!(
            destination.as_std_path(),
            std::env::current_dir().unwrap().as_path()
        );
    }

    #[test]
    fn shared_link_names_the_allocated_folder() {
        let temp = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let sink = SharedCollectionSink::with_token(collection_in(&base), RequestToken::new("abc"));

        let allocated = sink.allocate_destination().unwrap();
        let output = sink.describe_for_caller(allocated, Vec::new());

        assert_matches!(
            output,
            MaterializedOutput::Shared { ref token, ref folder, ref url }
                if token.as_str() == "abc"
                    && *folder == base.join("abc")
                    && url.ends_with("&origin_path=abc&two_pane=true")
        );
    }
}
