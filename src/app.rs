use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::domain::{AverageFrequency, NormalizedId, SubsetRequest, Window};
use crate::error::WpsError;
use crate::orchestrator::Orchestrator;
use crate::profile::{self, Node};
use crate::sink::{MaterializedOutput, OutputSink};
use crate::workflow::Workflow;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<C: CatalogClient, O: Orchestrator> {
    config: ResolvedConfig,
    catalog: C,
    orchestrator: O,
}

impl<C: CatalogClient, O: Orchestrator> App<C, O> {
    pub fn new(config: ResolvedConfig, catalog: C, orchestrator: O) -> Self {
        Self {
            config,
            catalog,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run<S: OutputSink>(
        &self,
        request: &SubsetRequest,
        sink: &S,
        progress: &dyn ProgressSink,
    ) -> Result<MaterializedOutput, WpsError> {
        let profile = profile::resolve(&request.node)?;
        request.validate()?;
        let variable_id = request.primary_variable()?;
        if request.facets.variable_id.len() > 1 {
            warn!(
                requested = ?request.facets.variable_id,
                used = variable_id,
                "only the first variable_id is averaged"
            );
        }
        progress.event(ProgressEvent {
            message: format!("phase=Resolve; node {}", profile.node),
            elapsed: None,
        });

        let destination = sink.allocate_destination()?;
        let dir: &Utf8Path = destination.as_ref();
        info!(node = %profile.node, destination = %dir, "output destination ready");

        progress.event(ProgressEvent {
            message: "phase=Search; querying catalog".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let records = self
            .catalog
            .search(&profile.index_selection(), &request.facets)?;
        info!(
            datasets = records.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "catalog search finished"
        );

        let datasets = records
            .iter()
            .map(|record| profile.normalize(record))
            .collect::<Result<Vec<_>, WpsError>>()?;

        let mut paths = Vec::with_capacity(datasets.len());
        for dataset in &datasets {
            let path = self.run_workflow(
                profile.node,
                variable_id,
                dataset,
                &request.window,
                request.average_frequency,
                sink,
                &destination,
                progress,
            )?;
            paths.push(path);
        }

        Ok(sink.describe_for_caller(destination, paths))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run_workflow<S: OutputSink>(
        &self,
        node: Node,
        variable_id: &str,
        dataset: &NormalizedId,
        window: &Window,
        frequency: AverageFrequency,
        sink: &S,
        destination: &S::Destination,
        progress: &dyn ProgressSink,
    ) -> Result<Utf8PathBuf, WpsError> {
        let workflow = Workflow::subset_then_average(variable_id, dataset, window, frequency);
        progress.event(ProgressEvent {
            message: format!("phase=Orchestrate; {dataset}"),
            elapsed: None,
        });
        let start = Instant::now();
        let response = self.orchestrator.orchestrate(node, &workflow)?;
        let elapsed = start.elapsed();
        if !response.ok {
            warn!(%dataset, status = %response.status, "orchestration failed");
            return Err(WpsError::OrchestrationFailed {
                dataset: dataset.to_string(),
                diagnostics: response.diagnostics,
            });
        }
        info!(%dataset, latency_ms = elapsed.as_millis() as u64, "orchestration finished");

        progress.event(ProgressEvent {
            message: format!("phase=Stage; {}", destination.as_ref()),
            elapsed: Some(elapsed),
        });
        let path = sink.materialize(&self.orchestrator, &response, destination, dataset)?;
        info!(%dataset, path = %path, "output staged");
        Ok(path)
    }
}
