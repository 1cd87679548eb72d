use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use esgf_wps::app::{App, ProgressEvent, ProgressSink};
use esgf_wps::catalog::{CatalogClient, IndexSelection};
use esgf_wps::config::{ResolvedConfig, SharedCollectionConfig};
use esgf_wps::domain::{DatasetIdentifierRecord, Facets, SubsetRequest, Window};
use esgf_wps::error::WpsError;
use esgf_wps::orchestrator::{OrchestrationResponse, Orchestrator, output_file_name};
use esgf_wps::profile::Node;
use esgf_wps::sink::{LocalDirectorySink, MaterializedOutput, RequestToken, SharedCollectionSink};
use esgf_wps::workflow::{AVERAGE_STEP, SUBSET_STEP, Workflow};

const COLLECTION_ID: &str = "9e5cf346-9d81-4d96-9eaa-9f07f8370478";

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Clone, Default)]
struct MockCatalog {
    records: Vec<DatasetIdentifierRecord>,
    calls: Arc<Mutex<Vec<(IndexSelection, Facets)>>>,
}

impl MockCatalog {
    fn with_records(records: Vec<DatasetIdentifierRecord>) -> Self {
        Self {
            records,
            calls: Arc::default(),
        }
    }

    fn with_ids(ids: &[&str]) -> Self {
        Self::with_records(
            ids.iter()
                .map(|id| DatasetIdentifierRecord::new(vec![id.to_string()]))
                .collect(),
        )
    }

    fn calls(&self) -> Vec<(IndexSelection, Facets)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CatalogClient for MockCatalog {
    fn search(
        &self,
        indices: &IndexSelection,
        facets: &Facets,
    ) -> Result<Vec<DatasetIdentifierRecord>, WpsError> {
        self.calls
            .lock()
            .unwrap()
            .push((indices.clone(), facets.clone()));
        Ok(self.records.clone())
    }
}

#[derive(Clone, Default)]
struct MockOrchestrator {
    fail: bool,
    no_outputs: bool,
    submitted: Arc<Mutex<Vec<(Node, Workflow)>>>,
    downloads: Arc<Mutex<Vec<Utf8PathBuf>>>,
}

impl MockOrchestrator {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn without_outputs() -> Self {
        Self {
            no_outputs: true,
            ..Self::default()
        }
    }

    fn submitted(&self) -> Vec<(Node, Workflow)> {
        self.submitted.lock().unwrap().clone()
    }

    fn downloads(&self) -> Vec<Utf8PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

impl Orchestrator for MockOrchestrator {
    fn orchestrate(
        &self,
        node: Node,
        workflow: &Workflow,
    ) -> Result<OrchestrationResponse, WpsError> {
        self.submitted
            .lock()
            .unwrap()
            .push((node, workflow.clone()));
        if self.fail {
            return Ok(OrchestrationResponse {
                ok: false,
                status: "failed".to_string(),
                diagnostics: "ProcessError: no files found".to_string(),
                outputs: Vec::new(),
            });
        }
        let outputs = if self.no_outputs {
            Vec::new()
        } else {
            workflow
                .dataset_ids()
                .map(|id| format!("http://wps.test/outputs/{id}.nc"))
                .collect()
        };
        Ok(OrchestrationResponse {
            ok: true,
            status: "successful".to_string(),
            diagnostics: String::new(),
            outputs,
        })
    }

    fn download(
        &self,
        response: &OrchestrationResponse,
        destination: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, WpsError> {
        self.downloads
            .lock()
            .unwrap()
            .push(destination.to_path_buf());
        std::fs::create_dir_all(destination.as_std_path()).unwrap();
        Ok(response
            .outputs
            .iter()
            .enumerate()
            .map(|(position, href)| {
                let path = destination.join(output_file_name(href, position));
                std::fs::write(path.as_std_path(), b"netcdf").unwrap();
                path
            })
            .collect())
    }
}

fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

fn request_for(node: &str, odir: &Utf8Path) -> SubsetRequest {
    SubsetRequest {
        node: node.to_string(),
        odir: Some(odir.to_path_buf()),
        ..SubsetRequest::default()
    }
}

fn shared_collection(base: &Utf8Path) -> SharedCollectionConfig {
    SharedCollectionConfig {
        collection_id: COLLECTION_ID.to_string(),
        base_path: base.to_path_buf(),
        file_manager_url: "https://app.globus.org/file-manager".to_string(),
    }
}

#[test]
fn invalid_node_touches_no_collaborator() {
    let (_temp, dir) = utf8_tempdir();
    let catalog = MockCatalog::with_ids(&["AA.BB.CC|node"]);
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        catalog.clone(),
        orchestrator.clone(),
    );

    let sink =
        SharedCollectionSink::with_token(shared_collection(&dir), RequestToken::new("t"));
    let err = app
        .run(&request_for("ANL", &dir), &sink, &NoopSink)
        .unwrap_err();

    assert_matches!(err, WpsError::InvalidNode { .. });
    assert!(catalog.calls().is_empty());
    assert!(orchestrator.submitted().is_empty());
    assert!(!dir.join("t").as_std_path().exists());
}

#[test]
fn node_profile_selects_catalog_indices_per_call() {
    let (_temp, dir) = utf8_tempdir();
    let catalog = MockCatalog::default();
    let app = App::new(
        ResolvedConfig::default(),
        catalog.clone(),
        MockOrchestrator::default(),
    );
    let sink = LocalDirectorySink::new(Some(dir.clone()));

    app.run(&request_for("ORNL", &dir), &sink, &NoopSink).unwrap();
    app.run(&request_for("DKRZ", &dir), &sink, &NoopSink).unwrap();

    let calls = catalog.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0.enabled().collect::<Vec<_>>(), vec!["ornl-dev"]);
    assert_eq!(
        calls[1].0.enabled().collect::<Vec<_>>(),
        vec!["esgf-node.llnl.gov"]
    );
    assert_eq!(calls[1].1, SubsetRequest::default().facets);
}

#[test]
fn empty_catalog_runs_no_workflow() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::default(),
        orchestrator.clone(),
    );

    let result = app
        .run(
            &request_for("DKRZ", &dir),
            &LocalDirectorySink::new(Some(dir.clone())),
            &NoopSink,
        )
        .unwrap();

    assert_eq!(result, MaterializedOutput::Local { paths: Vec::new() });
    assert!(orchestrator.submitted().is_empty());
    assert!(orchestrator.downloads().is_empty());
}

#[test]
fn failed_orchestration_aborts_without_outputs() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::failing();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&[
            "CMIP6.CMIP.MIROC.MIROC6.historical.r1i1p1f1.Amon.tas.gn.v20181212|esgf-data02.diasjp.net",
        ]),
        orchestrator.clone(),
    );

    let err = app
        .run(
            &request_for("DKRZ", &dir),
            &LocalDirectorySink::new(Some(dir.clone())),
            &NoopSink,
        )
        .unwrap_err();

    assert_matches!(
        err,
        WpsError::OrchestrationFailed { ref dataset, ref diagnostics }
            if dataset == "CMIP6.CMIP.MIROC.MIROC6.historical.r1i1p1f1.Amon.tas.gn.v20181212"
                && diagnostics.contains("no files found")
    );
    assert_eq!(orchestrator.submitted().len(), 1);
    assert!(orchestrator.downloads().is_empty());
    assert_eq!(std::fs::read_dir(dir.as_std_path()).unwrap().count(), 0);
}

#[test]
fn malformed_record_fails_before_orchestration() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_records(vec![
            DatasetIdentifierRecord::new(vec!["AA.BB.CC|node".to_string()]),
            DatasetIdentifierRecord::new(Vec::new()),
        ]),
        orchestrator.clone(),
    );

    let err = app
        .run(
            &request_for("DKRZ", &dir),
            &LocalDirectorySink::new(Some(dir.clone())),
            &NoopSink,
        )
        .unwrap_err();

    assert_matches!(err, WpsError::MalformedRecord);
    assert!(orchestrator.submitted().is_empty());
}

#[test]
fn local_mode_returns_one_path_per_dataset_in_catalog_order() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&["ZZ.second|node-a", "AA.first|node-b"]),
        orchestrator.clone(),
    );

    let result = app
        .run(
            &request_for("DKRZ", &dir),
            &LocalDirectorySink::new(Some(dir.clone())),
            &NoopSink,
        )
        .unwrap();

    let MaterializedOutput::Local { paths } = result else {
        panic!("expected local output");
    };
    assert_eq!(
        paths,
        vec![dir.join("ZZ.second.nc"), dir.join("AA.first.nc")]
    );
    assert!(paths.iter().all(|path| path.starts_with(&dir)));
    assert!(paths.iter().all(|path| path.as_std_path().is_file()));

    let submitted = orchestrator.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted.iter().all(|(node, _)| *node == Node::Dkrz));
    assert_eq!(
        submitted[0].1.dataset_ids().collect::<Vec<_>>(),
        vec!["ZZ.second"]
    );
}

#[test]
fn ornl_workflows_use_namespaced_ids() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&["AA.BB.CC|v1.nc"]),
        orchestrator.clone(),
    );

    app.run(
        &request_for("ORNL", &dir),
        &LocalDirectorySink::new(Some(dir.clone())),
        &NoopSink,
    )
    .unwrap();

    let submitted = orchestrator.submitted();
    assert_eq!(submitted[0].0, Node::Ornl);
    assert_eq!(
        submitted[0].1.dataset_ids().collect::<Vec<_>>(),
        vec!["css03_data.AA.BB.CC"]
    );
}

#[test]
fn window_reaches_subset_step_unmodified() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&["AA.BB.CC|node"]),
        orchestrator.clone(),
    );
    let mut request = request_for("DKRZ", &dir);
    request.window = Window {
        start_date: "2010-06-01".to_string(),
        end_date: "2005-01-31".to_string(),
        lat_min: 45.0,
        lat_max: -30.5,
        lon_min: 350.0,
        lon_max: 20.0,
    };
    request.facets.variable_id = vec!["pr".to_string(), "tas".to_string()];

    app.run(
        &request,
        &LocalDirectorySink::new(Some(dir.clone())),
        &NoopSink,
    )
    .unwrap();

    let (_, workflow) = &orchestrator.submitted()[0];
    assert_eq!(
        workflow.step_input(SUBSET_STEP, "time"),
        Some("2010-06-01/2005-01-31")
    );
    assert_eq!(
        workflow.step_input(SUBSET_STEP, "area"),
        Some("350,45,20,-30.5")
    );
    assert_eq!(
        workflow.step_input(SUBSET_STEP, "collection"),
        Some("inputs/pr")
    );
    assert_eq!(workflow.step_input(AVERAGE_STEP, "freq"), Some("year"));
}

#[test]
fn sharing_mode_stages_into_token_folder_and_returns_link() {
    let (_temp, base) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&["AA.one|node", "BB.two|node"]),
        orchestrator.clone(),
    );
    let sink = SharedCollectionSink::with_token(
        shared_collection(&base),
        RequestToken::new("0b7f3c4e-request"),
    );

    let result = app.run(&SubsetRequest::default(), &sink, &NoopSink).unwrap();

    let MaterializedOutput::Shared { token, folder, url } = result else {
        panic!("expected shared output");
    };
    assert_eq!(token.as_str(), "0b7f3c4e-request");
    assert_eq!(folder, base.join("0b7f3c4e-request"));
    assert_eq!(
        url,
        format!(
            "https://app.globus.org/file-manager?origin_id={COLLECTION_ID}&origin_path=0b7f3c4e-request&two_pane=true"
        )
    );
    assert_eq!(orchestrator.downloads(), vec![folder.clone(), folder.clone()]);
    assert!(folder.join("AA.one.nc").as_std_path().is_file());
    assert!(folder.join("BB.two.nc").as_std_path().is_file());
}

#[test]
fn sharing_mode_refuses_existing_request_folder() {
    let (_temp, base) = utf8_tempdir();
    std::fs::create_dir(base.join("taken").as_std_path()).unwrap();
    let catalog = MockCatalog::with_ids(&["AA.one|node"]);
    let app = App::new(
        ResolvedConfig::default(),
        catalog.clone(),
        MockOrchestrator::default(),
    );
    let sink =
        SharedCollectionSink::with_token(shared_collection(&base), RequestToken::new("taken"));

    let err = app
        .run(&SubsetRequest::default(), &sink, &NoopSink)
        .unwrap_err();

    assert_matches!(err, WpsError::FolderCollision(_));
    assert!(catalog.calls().is_empty());
}

#[test]
fn sharing_mode_with_empty_catalog_links_empty_folder() {
    let (_temp, base) = utf8_tempdir();
    let orchestrator = MockOrchestrator::default();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::default(),
        orchestrator.clone(),
    );
    let sink =
        SharedCollectionSink::with_token(shared_collection(&base), RequestToken::new("empty-run"));

    let result = app.run(&SubsetRequest::default(), &sink, &NoopSink).unwrap();

    assert_eq!(
        result,
        MaterializedOutput::Shared {
            token: RequestToken::new("empty-run"),
            folder: base.join("empty-run"),
            url: format!(
                "https://app.globus.org/file-manager?origin_id={COLLECTION_ID}&origin_path=empty-run&two_pane=true"
            ),
        }
    );
    assert!(orchestrator.submitted().is_empty());
    assert!(orchestrator.downloads().is_empty());
    let folder = base.join("empty-run");
    assert_eq!(std::fs::read_dir(folder.as_std_path()).unwrap().count(), 0);
}

#[test]
fn successful_run_without_outputs_is_an_error() {
    let (_temp, dir) = utf8_tempdir();
    let orchestrator = MockOrchestrator::without_outputs();
    let app = App::new(
        ResolvedConfig::default(),
        MockCatalog::with_ids(&["AA.BB.CC|node", "DD.EE.FF|node"]),
        orchestrator.clone(),
    );

    let err = app
        .run(
            &request_for("DKRZ", &dir),
            &LocalDirectorySink::new(Some(dir.clone())),
            &NoopSink,
        )
        .unwrap_err();

    assert_matches!(err, WpsError::EmptyOutput(ref dataset) if dataset == "AA.BB.CC");
    assert_eq!(orchestrator.submitted().len(), 1);
    assert_eq!(orchestrator.downloads(), vec![dir.clone()]);
}
