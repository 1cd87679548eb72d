use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::error::WpsError;
use crate::profile::Node;
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationResponse {
    pub ok: bool,
    pub status: String,
    pub diagnostics: String,
    pub outputs: Vec<String>,
}

impl OrchestrationResponse {
    // Reads either a status document (`status`, optional `outputs`) or a
    // synchronous results document, whose outputs sit at the top level
    // keyed by output id.
    pub fn parse(http_status: u16, body: &str) -> Self {
        let success = (200..300).contains(&http_status);
        let value = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        let reported = value.get("status").and_then(Value::as_str);
        let status = match reported {
            Some(status) => status.to_string(),
            None if success && value.is_object() => "successful".to_string(),
            None if success => "unknown".to_string(),
            None => "failed".to_string(),
        };

        let mut outputs = Vec::new();
        match (value.get("outputs"), reported) {
            (Some(section), _) => collect_hrefs(section, &mut outputs),
            (None, None) if success => collect_hrefs(&value, &mut outputs),
            _ => {}
        }
        Self {
            ok: success && status == "successful",
            status,
            diagnostics: format!("HTTP {http_status}: {body}"),
            outputs,
        }
    }
}

fn collect_hrefs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(href) = map.get("href").and_then(Value::as_str) {
                out.push(href.to_string());
                return;
            }
            for item in map.values() {
                collect_hrefs(item, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_hrefs(item, out);
            }
        }
        _ => {}
    }
}

pub trait Orchestrator: Send + Sync {
    fn orchestrate(
        &self,
        node: Node,
        workflow: &Workflow,
    ) -> Result<OrchestrationResponse, WpsError>;

    fn download(
        &self,
        response: &OrchestrationResponse,
        destination: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, WpsError>;
}

#[derive(Clone)]
pub struct HttpOrchestrator {
    client: Client,
    config: OrchestratorConfig,
}

impl HttpOrchestrator {
    pub fn new(config: &OrchestratorConfig) -> Result<Self, WpsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("esgf-wps/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn execution_url(endpoint: &str) -> String {
        format!(
            "{}/processes/orchestrate/execution",
            endpoint.trim_end_matches('/')
        )
    }

    fn fetch(&self, href: &str) -> Result<reqwest::blocking::Response, WpsError> {
        let response = self
            .client
            .get(href)
            .send()
            .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "output download failed".to_string());
            return Err(WpsError::OrchestratorStatus { status, message });
        }
        Ok(response)
    }

    // Replaces metalink references with the files they list.
    fn expand_outputs(&self, outputs: &[String]) -> Result<Vec<String>, WpsError> {
        let mut files = Vec::with_capacity(outputs.len());
        for href in outputs {
            if !is_metalink(href) {
                files.push(href.clone());
                continue;
            }
            let document = self
                .fetch(href)?
                .text()
                .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?;
            let listed = metalink_urls(&document)?;
            debug!(%href, files = listed.len(), "expanded metalink");
            files.extend(listed);
        }
        Ok(files)
    }

    fn download_one(
        &self,
        href: &str,
        position: usize,
        destination: &Utf8Path,
    ) -> Result<Utf8PathBuf, WpsError> {
        let mut response = self.fetch(href)?;

        let target = destination.join(output_file_name(href, position));
        let mut temp = tempfile::Builder::new()
            .prefix(".esgf-wps-download")
            .tempfile_in(destination.as_std_path())
            .map_err(|err| WpsError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, temp.as_file_mut())
            .map_err(|err| WpsError::Filesystem(err.to_string()))?;
        temp.persist(target.as_std_path())
            .map_err(|err| WpsError::Filesystem(err.to_string()))?;
        Ok(target)
    }
}

impl Orchestrator for HttpOrchestrator {
    fn orchestrate(
        &self,
        node: Node,
        workflow: &Workflow,
    ) -> Result<OrchestrationResponse, WpsError> {
        let url = Self::execution_url(self.config.endpoint(node)?);
        let body = json!({ "inputs": { "workflow": workflow } });
        debug!(%node, %url, "submitting workflow");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|err| WpsError::OrchestratorHttp(err.to_string()))?;
        Ok(OrchestrationResponse::parse(status, &text))
    }

    fn download(
        &self,
        response: &OrchestrationResponse,
        destination: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, WpsError> {
        fs::create_dir_all(destination.as_std_path())
            .map_err(|err| WpsError::Filesystem(err.to_string()))?;
        self.expand_outputs(&response.outputs)?
            .iter()
            .enumerate()
            .map(|(position, href)| self.download_one(href, position, destination))
            .collect()
    }
}

pub fn is_metalink(href: &str) -> bool {
    let path = Url::parse(href)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| href.to_string());
    path.ends_with(".meta4") || path.ends_with(".metalink")
}

pub fn metalink_urls(document: &str) -> Result<Vec<String>, WpsError> {
    let mut reader = Reader::from_str(document);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut urls = Vec::new();
    let mut in_file = false;
    let mut in_url = false;
    let mut file_has_url = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"file" => {
                    in_file = true;
                    file_has_url = false;
                }
                b"url" if in_file && !file_has_url => in_url = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_url => {
                let url = t
                    .unescape()
                    .map_err(|err| WpsError::OrchestratorHttp(format!("metalink: {err}")))?;
                urls.push(url.trim().to_string());
                file_has_url = true;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"file" => in_file = false,
                b"url" => in_url = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(WpsError::OrchestratorHttp(format!(
                    "metalink at position {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(urls)
}

pub fn output_file_name(href: &str, position: usize) -> String {
    Url::parse(href)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.last())
                .map(str::to_string)
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| format!("output-{position}.nc"))
}
