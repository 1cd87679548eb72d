use std::collections::{BTreeMap, HashMap};
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::CatalogConfig;
use crate::domain::{DatasetIdentifierRecord, Facets};
use crate::error::WpsError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSelection(BTreeMap<String, bool>);

impl IndexSelection {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, bool)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(name, enabled)| (name.to_string(), enabled))
                .collect(),
        )
    }

    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }
}

pub trait CatalogClient: Send + Sync {
    fn search(
        &self,
        indices: &IndexSelection,
        facets: &Facets,
    ) -> Result<Vec<DatasetIdentifierRecord>, WpsError>;
}

#[derive(Debug, Deserialize)]
pub struct SearchPage {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(rename = "numFound")]
    num_found: usize,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    id: String,
    #[serde(default)]
    instance_id: Option<String>,
}

impl SearchPage {
    pub fn parse(body: &str) -> Result<Self, WpsError> {
        serde_json::from_str(body).map_err(|err| WpsError::CatalogHttp(err.to_string()))
    }

    pub fn num_found(&self) -> usize {
        self.response.num_found
    }

    pub fn len(&self) -> usize {
        self.response.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response.docs.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RecordGrouper {
    positions: HashMap<String, usize>,
    records: Vec<DatasetIdentifierRecord>,
}

impl RecordGrouper {
    pub fn push_page(&mut self, page: SearchPage) {
        for doc in page.response.docs {
            let instance = doc.instance_id.unwrap_or_else(|| {
                doc.id
                    .split_once('|')
                    .map(|(head, _)| head.to_string())
                    .unwrap_or_else(|| doc.id.clone())
            });
            match self.positions.get(&instance) {
                Some(&index) => self.records[index].ids.push(doc.id),
                None => {
                    self.positions.insert(instance, self.records.len());
                    self.records.push(DatasetIdentifierRecord::new(vec![doc.id]));
                }
            }
        }
    }

    pub fn finish(self) -> Vec<DatasetIdentifierRecord> {
        self.records
    }
}

#[derive(Clone)]
pub struct EsgfSearchClient {
    client: Client,
    endpoints: BTreeMap<String, String>,
    page_size: usize,
}

impl EsgfSearchClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, WpsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-wps/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WpsError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| WpsError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoints: config.indices.clone(),
            page_size: config.page_size.max(1),
        })
    }

    fn fetch_page(
        &self,
        endpoint: &str,
        facets: &Facets,
        offset: usize,
    ) -> Result<SearchPage, WpsError> {
        let mut params: Vec<(&str, String)> = vec![
            ("type", "Dataset".to_string()),
            ("format", "application/solr+json".to_string()),
            ("latest", "true".to_string()),
            ("fields", "id,instance_id".to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        for (facet, values) in facets.entries() {
            for value in values {
                params.push((facet, value.clone()));
            }
        }

        let response = self.send_with_retries(|| self.client.get(endpoint).query(&params))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "catalog request failed".to_string());
            return Err(WpsError::CatalogStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| WpsError::CatalogHttp(err.to_string()))?;
        SearchPage::parse(&body)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, WpsError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(WpsError::CatalogHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogClient for EsgfSearchClient {
    fn search(
        &self,
        indices: &IndexSelection,
        facets: &Facets,
    ) -> Result<Vec<DatasetIdentifierRecord>, WpsError> {
        let enabled = indices.enabled().collect::<Vec<_>>();
        if enabled.is_empty() {
            return Err(WpsError::NoEnabledIndex);
        }

        let mut grouper = RecordGrouper::default();
        for index in enabled {
            let endpoint = self
                .endpoints
                .get(index)
                .ok_or_else(|| WpsError::UnknownIndex(index.to_string()))?;
            let mut offset = 0usize;
            loop {
                let page = self.fetch_page(endpoint, facets, offset)?;
                let total = page.num_found();
                let fetched = page.len();
                debug!(index, offset, fetched, total, "catalog page");
                grouper.push_page(page);
                offset += fetched;
                if fetched == 0 || offset >= total {
                    break;
                }
            }
        }
        Ok(grouper.finish())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
