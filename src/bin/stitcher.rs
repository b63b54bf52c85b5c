//! Stitcher CLI: register data sources and curate the stitched graph.
//!
//! Usage:
//!   stitcher register <path> --format <fmt> [--name n] [--key KIND:Prop]... [--db path]
//!   stitcher deprecate --kind N_Name [--threshold 2] [--scope source]
//!   stitcher cluster | metrics | export <file> | curate

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stitcher::curation::write_node_labels;
use stitcher::{
    cluster, compute_metrics, curate, deprecate, export_node_labels, ClusterOptions,
    CurationGraph, CurationPipeline, CurationPlan, CuratorConfig, DeprecationRequest, EntityId,
    IngestOutcome, IngestRequest, InputSet, KeyKind, KeyPolicy, Label, OpenStore, SqliteStore,
};

#[derive(Parser)]
#[command(
    name = "stitcher",
    version,
    about = "Entity resolution and graph curation for chemical and drug data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and ingest a data source
    Register {
        /// File or directory holding the raw inputs
        path: PathBuf,
        /// Extraction format (drugs-at-fda, sdf, json)
        #[arg(long)]
        format: String,
        /// Source name; defaults to the file name
        #[arg(long)]
        name: Option<String>,
        /// Key mapping such as I_CAS:CAS or id:ID (repeatable)
        #[arg(long = "key")]
        keys: Vec<String>,
        /// Expected SHA-1 digest (full or prefix)
        #[arg(long)]
        sha1: Option<String>,
    },
    /// List registered data sources
    Sources,
    /// Deprecate key values shared by too many entities
    Deprecate {
        /// Key kind, e.g. N_Name
        #[arg(long)]
        kind: KeyKind,
        /// Sharer count a value may reach; defaults to the configured value
        #[arg(long)]
        threshold: Option<usize>,
        /// Only count entities from this source (name or digest prefix)
        #[arg(long)]
        scope: Option<String>,
        /// Report without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Partition entities into connected components
    Cluster {
        /// Key kinds to follow; defaults to the configured set
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<KeyKind>,
        /// Only cluster entities from this source
        #[arg(long)]
        scope: Option<String>,
    },
    /// Print curation metrics as JSON
    Metrics,
    /// Write the node/label report
    Export {
        /// Output file; '-' for stdout
        path: PathBuf,
    },
    /// Exclude an entity from clustering
    Denylist {
        id: EntityId,
        /// Re-admit instead
        #[arg(long)]
        remove: bool,
    },
    /// Run deprecation, clustering and export in one pass
    Curate {
        /// Source the configured deprecation thresholds apply to
        #[arg(long)]
        scope: Option<String>,
        /// Where to write the node/label report
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

/// Get the default database path (~/.local/share/stitcher/stitcher.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let stitcher_dir = data_dir.join("stitcher");
    std::fs::create_dir_all(&stitcher_dir).ok();
    stitcher_dir.join("stitcher.db")
}

fn open_graph(db: Option<PathBuf>) -> Result<Arc<CurationGraph>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(CurationGraph::new(Arc::new(store))))
}

/// Resolve a source name or digest prefix to its label
fn scope_label(graph: &CurationGraph, scope: Option<&str>) -> Result<Option<Label>, String> {
    match scope {
        Some(scope) => graph
            .find_source(scope)
            .map(|source| Some(source.label()))
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_register(
    graph: Arc<CurationGraph>,
    config: CuratorConfig,
    path: &Path,
    format: &str,
    name: Option<String>,
    keys: &[String],
    sha1: Option<String>,
) -> i32 {
    let policy = match KeyPolicy::parse_mappings(keys) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let name = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    let mut request = IngestRequest::new(name, format, InputSet::from_path(path));
    if !policy.is_empty() {
        request = request.with_policy(policy);
    }
    if let Some(sha1) = sha1 {
        request = request.with_expected_digest(sha1);
    }

    let prefix = config.digest_prefix_len;
    let pipeline = CurationPipeline::new(graph, config);
    match pipeline.ingest(request) {
        Ok(report) => {
            let digest = report.source.id.short(prefix);
            match report.outcome {
                IngestOutcome::AlreadyRegistered => {
                    println!("Data source {} ({}) has already been registered", report.source.name, digest)
                }
                _ => println!(
                    "Registered {} ({}): {} entities, {} rejected, {} links",
                    report.source.name,
                    digest,
                    report.source.instances,
                    report.rejected,
                    report.links.links_created
                ),
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_sources(graph: &CurationGraph, config: &CuratorConfig) -> i32 {
    let sources = match graph.sources() {
        Ok(sources) => sources,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if sources.is_empty() {
        println!("No data sources registered.");
        return 0;
    }
    println!("{:<12}  {:<24}  {:<12}  {:>9}  {:<8}", "DIGEST", "NAME", "FORMAT", "INSTANCES", "STATE");
    println!("{}", "-".repeat(73));
    for source in sources {
        println!(
            "{:<12}  {:<24}  {:<12}  {:>9}  {:<8}",
            source.id.short(config.digest_prefix_len),
            source.name,
            source.format,
            source.instances,
            source.state.as_str()
        );
    }
    0
}

fn cmd_deprecate(
    graph: &CurationGraph,
    config: &CuratorConfig,
    kind: KeyKind,
    threshold: Option<usize>,
    scope: Option<&str>,
    dry_run: bool,
) -> i32 {
    let Some(threshold) = threshold.or_else(|| config.deprecation.thresholds.get(&kind).copied()) else {
        eprintln!("Error: no threshold configured for {}; pass --threshold", kind);
        return 1;
    };
    let scope = match scope_label(graph, scope) {
        Ok(scope) => scope,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let request = DeprecationRequest::new(kind, threshold)
        .with_scope(scope)
        .dry_run(dry_run);
    match deprecate(graph, &request) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_cluster(graph: &CurationGraph, config: &CuratorConfig, kinds: Vec<KeyKind>, scope: Option<&str>) -> i32 {
    let scope = match scope_label(graph, scope) {
        Ok(scope) => scope,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let options = if kinds.is_empty() {
        config.cluster_options()
    } else {
        ClusterOptions::new(kinds).with_priority(config.source_priority.clone())
    }
    .with_scope(scope);
    match cluster(graph, &options) {
        Ok(partition) => {
            println!(
                "{} clusters ({} singletons) over {} entities",
                partition.len(),
                partition.singleton_count(),
                partition.entity_count()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_metrics(graph: &CurationGraph) -> i32 {
    match graph.snapshot() {
        Ok(snapshot) => print_json(&compute_metrics(&snapshot)),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_export(graph: &CurationGraph, path: &Path) -> i32 {
    let written = if path == Path::new("-") {
        graph
            .snapshot()
            .map_err(|e| e.to_string())
            .and_then(|snapshot| write_node_labels(&snapshot, std::io::stdout().lock()).map_err(|e| e.to_string()))
    } else {
        export_node_labels(graph, path).map_err(|e| e.to_string())
    };
    match written {
        Ok(lines) => {
            eprintln!("Exported {} entities", lines);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_denylist(graph: &CurationGraph, id: EntityId, remove: bool) -> i32 {
    let result = if remove { graph.allow(id) } else { graph.denylist(id) };
    match result {
        Ok(true) => {
            println!("{} entity {}", if remove { "Re-admitted" } else { "Denylisted" }, id);
            0
        }
        Ok(false) => {
            println!("Entity {} unchanged", id);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_curate(graph: &CurationGraph, mut config: CuratorConfig, scope: Option<String>, export: Option<PathBuf>) -> i32 {
    if let Some(scope) = scope {
        match graph.find_source(&scope) {
            Ok(source) => config.deprecation.scope = Some(source.name),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    let plan = CurationPlan {
        deprecations: config.deprecation.requests(),
        cluster: config.cluster_options(),
        export,
    };
    match curate(graph, &plan) {
        Ok(outcome) => print_json(&outcome),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match CuratorConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let graph = match open_graph(cli.db) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Register {
            path,
            format,
            name,
            keys,
            sha1,
        } => cmd_register(graph, config, &path, &format, name, &keys, sha1),
        Commands::Sources => cmd_sources(&graph, &config),
        Commands::Deprecate {
            kind,
            threshold,
            scope,
            dry_run,
        } => cmd_deprecate(&graph, &config, kind, threshold, scope.as_deref(), dry_run),
        Commands::Cluster { kinds, scope } => cmd_cluster(&graph, &config, kinds, scope.as_deref()),
        Commands::Metrics => cmd_metrics(&graph),
        Commands::Export { path } => cmd_export(&graph, &path),
        Commands::Denylist { id, remove } => cmd_denylist(&graph, id, remove),
        Commands::Curate { scope, export } => cmd_curate(&graph, config, scope, export),
    };
    std::process::exit(code);
}
