use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use esgf_wps::access::build_url_with;
use esgf_wps::app::{App, ProgressSink};
use esgf_wps::catalog::EsgfSearchClient;
use esgf_wps::config::{ConfigLoader, ResolvedConfig};
use esgf_wps::domain::{AverageFrequency, SubsetRequest};
use esgf_wps::error::WpsError;
use esgf_wps::orchestrator::HttpOrchestrator;
use esgf_wps::output::{JsonOutput, LogSink, OutputMode, print_human};
use esgf_wps::profile::profiles;
use esgf_wps::sink::{LocalDirectorySink, SharedCollectionSink};

#[derive(Parser)]
#[command(name = "esgf-wps")]
#[command(about = "Subset and time-average ESGF datasets through a remote WPS orchestrator")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Search the catalog, then subset and average every match")]
    Average(AverageArgs),
    #[command(about = "List supported nodes and their catalog index")]
    Nodes,
    #[command(about = "Print the file-manager link of a staged request")]
    Url(UrlArgs),
}

#[derive(Args)]
struct AverageArgs {
    #[arg(long, help = "JSON keyword payload; flags override its fields")]
    payload: Option<Utf8PathBuf>,

    #[arg(long)]
    node: Option<String>,

    #[arg(long)]
    start_date: Option<String>,

    #[arg(long)]
    end_date: Option<String>,

    #[arg(long, allow_negative_numbers = true)]
    lat_min: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    lat_max: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    lon_min: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    lon_max: Option<f64>,

    #[arg(long)]
    average_frequency: Option<AverageFrequency>,

    #[arg(long, value_delimiter = ',')]
    experiment_id: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    variable_id: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    member_id: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    table_id: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    institution_id: Vec<String>,

    #[arg(long, conflicts_with = "share")]
    odir: Option<Utf8PathBuf>,

    #[arg(long, help = "Stage results in the shared collection and print a link")]
    share: bool,
}

#[derive(Args)]
struct UrlArgs {
    #[arg(long)]
    token: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<WpsError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Average(args) => run_average(args, config, output_mode),
        Commands::Nodes => run_nodes(output_mode),
        Commands::Url(args) => {
            let shared = &config.shared_collection;
            println!(
                "{}",
                build_url_with(&shared.file_manager_url, &shared.collection_id, &args.token)
            );
            Ok(())
        }
    }
}

fn run_average(
    args: AverageArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let share = args.share;
    let request = build_request(args)?;
    if share {
        request.check_sharing()?;
    }

    let shared_collection = config.shared_collection.clone();
    let catalog = EsgfSearchClient::new(&config.catalog)?;
    let orchestrator = HttpOrchestrator::new(&config.orchestrator)?;
    let app = App::new(config, catalog, orchestrator);

    let progress: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    };
    let result = if share {
        app.run(&request, &SharedCollectionSink::new(shared_collection), progress)?
    } else {
        app.run(&request, &LocalDirectorySink::new(request.odir.clone()), progress)?
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_output(&result).into_diagnostic()?,
        OutputMode::Human => print_human(&result),
    }
    Ok(())
}

fn run_nodes(output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_profiles(profiles()).into_diagnostic()?,
        OutputMode::Human => {
            for profile in profiles() {
                println!(
                    "{:<6} index={:<20} namespace={}",
                    profile.node,
                    profile.enabled_index().unwrap_or("-"),
                    profile.namespace.unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn build_request(args: AverageArgs) -> Result<SubsetRequest, WpsError> {
    let mut request = match &args.payload {
        Some(path) => {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| WpsError::Filesystem(format!("read {path}: {err}")))?;
            serde_json::from_str::<SubsetRequest>(&content)
                .map_err(|err| WpsError::InvalidRequest(format!("payload {path}: {err}")))?
        }
        None => SubsetRequest::default(),
    };

    if let Some(node) = args.node {
        request.node = node;
    }
    let window = &mut request.window;
    if let Some(value) = args.start_date {
        window.start_date = value;
    }
    if let Some(value) = args.end_date {
        window.end_date = value;
    }
    for (target, value) in [
        (&mut window.lat_min, args.lat_min),
        (&mut window.lat_max, args.lat_max),
        (&mut window.lon_min, args.lon_min),
        (&mut window.lon_max, args.lon_max),
    ] {
        if let Some(value) = value {
            *target = value;
        }
    }
    if let Some(frequency) = args.average_frequency {
        request.average_frequency = frequency;
    }

    let facets = &mut request.facets;
    for (target, values) in [
        (&mut facets.experiment_id, args.experiment_id),
        (&mut facets.variable_id, args.variable_id),
        (&mut facets.member_id, args.member_id),
        (&mut facets.table_id, args.table_id),
        (&mut facets.institution_id, args.institution_id),
    ] {
        if !values.is_empty() {
            *target = values;
        }
    }
    if args.odir.is_some() {
        request.odir = args.odir;
    }
    Ok(request)
}
