use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagtidy_dataset::{
    DatasetManager, FilterCriteria, FsSidecarStore, RootedResolver, ScopeContext,
};
use tagtidy_protocol::{serialize_json, serialize_json_pretty, ServerInfo, API_VERSION};
use tagtidy_taxonomy::{HintEvaluator, Taxonomy, TaxonomyStats, TaxonomyVersions};

mod config;
mod http_api;
mod server_security;

use config::FileConfig;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "tagtidy")]
#[command(about = "Stage and review image dataset tags against a taxonomy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Directory holding config.toml and undesired_tags.json
    #[arg(long, global = true, default_value = ".tagtidy")]
    config_dir: PathBuf,

    /// Taxonomy document (defaults to the bundled v1 taxonomy)
    #[arg(long, global = true)]
    taxonomy: Option<PathBuf>,

    /// Applicability graph document (defaults to the bundled v1 graph)
    #[arg(long, global = true)]
    graph: Option<PathBuf>,

    /// Hint policy document (defaults to the bundled v1 policy)
    #[arg(long, global = true)]
    policy: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tag staging API over HTTP
    ServeHttp(ServeArgs),

    /// Load and validate the taxonomy, graph and policy documents
    #[command(name = "validate-taxonomy")]
    ValidateTaxonomy(ValidateArgs),

    /// Print hints for every image of a dataset (read-only)
    Hints(HintsArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:7860 (falls back to config.toml, then 127.0.0.1:7860)
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses
    #[arg(long)]
    public: bool,

    /// Folder that every dataset path is resolved against
    #[arg(long, env = "TAGTIDY_DATASET_ROOT")]
    dataset_root: Option<PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Args)]
struct HintsArgs {
    /// Dataset folder relative to the dataset root
    #[arg(default_value = "")]
    rel: String,

    /// Folder that every dataset path is resolved against
    #[arg(long, env = "TAGTIDY_DATASET_ROOT")]
    dataset_root: Option<PathBuf>,

    /// Only list images with missing required categories
    #[arg(long)]
    missing_only: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct ValidateOutput {
    ok: bool,
    versions: TaxonomyVersions,
    stats: TaxonomyStats,
    evaluation_order: Vec<String>,
}

struct DocumentPaths {
    taxonomy: Option<PathBuf>,
    graph: Option<PathBuf>,
    policy: Option<PathBuf>,
}

impl DocumentPaths {
    fn load(&self) -> Result<Taxonomy> {
        let taxonomy = Taxonomy::from_paths(
            self.taxonomy.as_deref(),
            self.graph.as_deref(),
            self.policy.as_deref(),
        )
        .context("Failed to load taxonomy documents")?;
        let versions = taxonomy.versions();
        log::info!(
            "Loaded taxonomy {} / graph {} / policy {}",
            versions.taxonomy,
            versions.graph,
            versions.policy
        );
        Ok(taxonomy)
    }
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let documents = DocumentPaths {
        taxonomy: cli.taxonomy,
        graph: cli.graph,
        policy: cli.policy,
    };

    match cli.command {
        Commands::ServeHttp(args) => serve_http(args, &cli.config_dir, &documents).await?,
        Commands::ValidateTaxonomy(args) => run_validate_taxonomy(args, &documents)?,
        Commands::Hints(args) => run_hints(args, &cli.config_dir, &documents)?,
    }

    Ok(())
}

fn run_validate_taxonomy(args: ValidateArgs, documents: &DocumentPaths) -> Result<()> {
    let taxonomy = documents.load()?;
    let output = ValidateOutput {
        ok: true,
        versions: taxonomy.versions().clone(),
        stats: taxonomy.stats(),
        evaluation_order: taxonomy
            .signal_graph()
            .evaluation_order()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    print_json(&output, args.pretty)
}

fn run_hints(args: HintsArgs, config_dir: &Path, documents: &DocumentPaths) -> Result<()> {
    let file_config = FileConfig::load(config_dir)?;
    let manager = build_manager(args.dataset_root, &file_config, config_dir, documents)?;

    let snapshot = manager
        .read_dataset(&args.rel)
        .with_context(|| format!("Failed to load dataset '{}'", args.rel))?;
    let filter = FilterCriteria {
        has_missing_required: args.missing_only.then_some(true),
        ..Default::default()
    };
    let ctx = ScopeContext {
        evaluator: manager.evaluator(),
        undesired: manager.undesired(),
    };
    print_json(&snapshot.summary(&filter, &ctx), args.pretty)
}

fn build_manager(
    dataset_root: Option<PathBuf>,
    file_config: &FileConfig,
    config_dir: &Path,
    documents: &DocumentPaths,
) -> Result<DatasetManager> {
    let root = config::resolve_dataset_root(dataset_root, file_config);
    let resolver = RootedResolver::new(&root)
        .with_context(|| format!("Invalid dataset root {}", root.display()))?;
    log::info!("Dataset root: {}", resolver.root().display());

    let evaluator = HintEvaluator::new(Arc::new(documents.load()?));
    Ok(
        DatasetManager::new(Arc::new(resolver), Arc::new(FsSidecarStore), evaluator)
            .with_undesired(config::load_undesired(config_dir)),
    )
}

async fn serve_http(args: ServeArgs, config_dir: &Path, documents: &DocumentPaths) -> Result<()> {
    let file_config = FileConfig::load(config_dir)?;
    let bind = config::resolve_bind(args.bind, &file_config);
    let target = server_security::guard_bind(&bind, args.public).await?;

    let manager = build_manager(args.dataset_root, &file_config, config_dir, documents)?;
    let versions = manager.evaluator().taxonomy().versions().clone();
    let state = Arc::new(http_api::AppState {
        manager: tokio::sync::Mutex::new(manager),
        info: ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            api_version: API_VERSION,
            taxonomy_version: versions.taxonomy,
            graph_version: versions.graph,
            policy_version: versions.policy,
        },
    });
    let app = http_api::router(state);

    let listener = tokio::net::TcpListener::bind(target.addrs.as_slice()).await?;
    let local_addr = listener.local_addr()?;
    let base_url = format!("http://{local_addr}");

    print_stdout(&format!("Serving tag staging API: {base_url}/api"))?;
    print_stdout(&format!("Health endpoint: {base_url}/health"))?;
    if !target.exposed.is_empty() {
        print_stdout(&format!(
            "Public bind enabled (--public). Reachable on: {}",
            server_security::join_addrs(&target.exposed)
        ))?;
    }
    print_stdout(&format!(
        "Try: curl -X POST {base_url}/api/dataset/load -H 'Content-Type: application/json' -d '{{\"rel\": \"\"}}'"
    ))?;

    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serialize_json_pretty(value)?
    } else {
        serialize_json(value)?
    };
    print_stdout(&text)
}
