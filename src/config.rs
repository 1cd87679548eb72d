use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::WpsError;
use crate::profile::{Node, profiles};

pub const DEFAULT_CONFIG_FILE: &str = "esgf-wps.json";
pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_ROOK_URL: &str = "http://rook.dkrz.de/wps";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: Option<CatalogSection>,
    #[serde(default)]
    pub orchestrator: Option<OrchestratorSection>,
    #[serde(default)]
    pub shared_collection: Option<SharedCollectionSection>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub indices: BTreeMap<String, String>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrchestratorSection {
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SharedCollectionSection {
    #[serde(default)]
    pub collection_id: Option<String>,
    #[serde(default)]
    pub base_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub file_manager_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub indices: BTreeMap<String, String>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub endpoints: BTreeMap<Node, String>,
    pub timeout: Option<Duration>,
}

impl OrchestratorConfig {
    pub fn endpoint(&self, node: Node) -> Result<&str, WpsError> {
        self.endpoints
            .get(&node)
            .map(String::as_str)
            .ok_or_else(|| WpsError::MissingEndpoint(node.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedCollectionConfig {
    pub collection_id: String,
    pub base_path: Utf8PathBuf,
    pub file_manager_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub catalog: CatalogConfig,
    pub orchestrator: OrchestratorConfig,
    pub shared_collection: SharedCollectionConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            catalog: CatalogConfig {
                indices: default_indices(),
                page_size: 500,
            },
            orchestrator: OrchestratorConfig {
                endpoints: default_endpoints(),
                timeout: None,
            },
            shared_collection: SharedCollectionConfig {
                collection_id: "9e5cf346-9d81-4d96-9eaa-9f07f8370478".to_string(),
                base_path: Utf8PathBuf::from(
                    "/eagle/projects/PortalDevelopment/esgf_collection_dev",
                ),
                file_manager_url: "https://app.globus.org/file-manager".to_string(),
            },
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, WpsError> {
        let config_path = match path {
            Some(path) => {
                let explicit = Utf8PathBuf::from(path);
                if !explicit.as_std_path().exists() {
                    return Err(WpsError::MissingConfig(explicit.into_std_path_buf()));
                }
                explicit
            }
            None => match Self::discover() {
                Some(found) => found,
                None => return Ok(ResolvedConfig::default()),
            },
        };

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| WpsError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| WpsError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    fn discover() -> Option<Utf8PathBuf> {
        let local = Utf8PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.as_std_path().exists() {
            return Some(local);
        }
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.config_dir().join("esgf-wps").join(DEFAULT_CONFIG_FILE),
                )
                .ok()
            })
            .filter(|path| path.as_std_path().exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, WpsError> {
        let mut resolved = ResolvedConfig::default();
        if let Some(version) = config.schema_version {
            if version != SCHEMA_VERSION {
                return Err(WpsError::ConfigParse(format!(
                    "unsupported schema_version {version}, expected {SCHEMA_VERSION}"
                )));
            }
            resolved.schema_version = version;
        }

        if let Some(catalog) = config.catalog {
            resolved.catalog.indices.extend(catalog.indices);
            if let Some(page_size) = catalog.page_size {
                if page_size == 0 {
                    return Err(WpsError::ConfigParse(
                        "catalog.page_size must be positive".to_string(),
                    ));
                }
                resolved.catalog.page_size = page_size;
            }
        }

        if let Some(orchestrator) = config.orchestrator {
            for (name, url) in orchestrator.endpoints {
                let node: Node = name.parse()?;
                resolved.orchestrator.endpoints.insert(node, url);
            }
            resolved.orchestrator.timeout = orchestrator.timeout_secs.map(Duration::from_secs);
        }

        if let Some(shared) = config.shared_collection {
            let target = &mut resolved.shared_collection;
            if let Some(id) = shared.collection_id {
                target.collection_id = id;
            }
            if let Some(base_path) = shared.base_path {
                target.base_path = base_path;
            }
            if let Some(url) = shared.file_manager_url {
                target.file_manager_url = url;
            }
        }

        Ok(resolved)
    }
}

fn default_indices() -> BTreeMap<String, String> {
    [
        ("anl-dev", "https://esgf-node.anl.gov/esg-search/search"),
        ("ornl-dev", "https://esgf-node.ornl.gov/esg-search/search"),
        (
            "esgf-node.llnl.gov",
            "https://esgf-node.llnl.gov/esg-search/search",
        ),
    ]
    .into_iter()
    .map(|(name, url)| (name.to_string(), url.to_string()))
    .collect()
}

// Every node shares one rook deployment unless the config routes it elsewhere.
fn default_endpoints() -> BTreeMap<Node, String> {
    profiles()
        .iter()
        .map(|profile| (profile.node, DEFAULT_ROOK_URL.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_profile_index() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        for profile in profiles() {
            for (index, _) in profile.indices {
                assert!(resolved.catalog.indices.contains_key(*index), "{index}");
            }
            assert!(resolved.orchestrator.endpoint(profile.node).is_ok());
        }
        assert_eq!(resolved.orchestrator.timeout, None);
    }
}
