//! CiteGraph CLI
//!
//! Builds a citation graph from seed publications and writes it out:
//! - Seeds from arguments or a seed file
//! - OpenAlex, or an offline JSON dump of raw records
//! - Graph snapshot, node-link JSON and GraphML output
//! - Run summary on stdout, PageRank top list on stderr

use anyhow::Context;
use citegraph_common::cache::{FetchCache, FetchCacheConfig};
use citegraph_common::config::{AppConfig, ObservabilityConfig};
use citegraph_common::provider::{create_provider, MetadataProvider, StaticProvider};
use citegraph_common::{metrics, VERSION};
use citegraph_engine::export::{write_graphml, write_node_link_json};
use citegraph_engine::frontier::{BuildOptions, BuildOutput, Direction, FrontierExpander};
use citegraph_engine::progress::TracingObserver;
use citegraph_engine::seeds::{parse_seeds, read_seed_file};
use citegraph_engine::PageRankScorer;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs::File;
use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "citegraph")]
#[command(author, version, about = "Build citation graphs from seed publications", long_about = None)]
struct Cli {
    /// Seeds: DOIs, OpenAlex ids, scheme:value ids or free-text queries
    seeds: Vec<String>,

    /// File with one seed per line, or a CSV export with an id column
    #[arg(short = 'f', long)]
    seed_file: Option<PathBuf>,

    /// Read at most this many seeds from the seed file
    #[arg(long)]
    seed_limit: Option<usize>,

    /// Configuration file (defaults to config/{default,$APP_ENV,local})
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short = 'd', long)]
    max_depth: Option<u32>,

    #[arg(short = 'n', long)]
    max_nodes: Option<usize>,

    /// Expansion direction; repeat for both
    #[arg(long = "direction")]
    directions: Vec<Direction>,

    /// Similarity threshold for merging records without shared ids
    #[arg(long)]
    threshold: Option<f64>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    max_duration: Option<u64>,

    /// Serve lookups from a JSON array of raw records instead of OpenAlex
    #[arg(long)]
    offline: Option<PathBuf>,

    /// Reloadable graph snapshot
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Node-link JSON for visualization
    #[arg(long)]
    node_link: Option<PathBuf>,

    #[arg(long)]
    graphml: Option<PathBuf>,

    /// Also write the run summary here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// How many top-ranked papers to list (0 to skip ranking)
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(depth) = self.max_depth {
            config.traversal.max_depth = depth;
        }
        if let Some(nodes) = self.max_nodes {
            config.traversal.max_nodes = nodes;
        }
        if !self.directions.is_empty() {
            config.traversal.directions = self.directions.iter().map(|d| d.to_string()).collect();
        }
        if let Some(threshold) = self.threshold {
            config.resolver.similarity_threshold = threshold;
        }
        if let Some(secs) = self.max_duration {
            config.traversal.max_duration_secs = secs;
        }
        if self.json_logs {
            config.observability.json_logging = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);

    init_tracing(&config.observability);
    info!("Starting CiteGraph v{}", VERSION);

    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        metrics::register_metrics();
        info!("Metrics exposed on {}", addr);
    }

    let mut seeds = parse_seeds(&cli.seeds);
    if let Some(path) = &cli.seed_file {
        seeds.extend(read_seed_file(path, cli.seed_limit)?);
    }

    let options = BuildOptions::from_config(&config)?;

    let provider: Arc<dyn MetadataProvider> = match &cli.offline {
        Some(path) => {
            let provider = StaticProvider::from_json_file(path)?;
            info!(records = provider.len(), path = %path.display(), "Using offline records");
            Arc::new(provider)
        }
        None => create_provider(&config.provider)?,
    };

    let mut cache_config = FetchCacheConfig::from(&config.fetch);
    cache_config.search_limit = options.seed_search_limit;
    let fetcher = Arc::new(FetchCache::new(provider, cache_config)?);

    let expander = FrontierExpander::new(fetcher, options)?.with_observer(Arc::new(TracingObserver));

    let stop = expander.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current round");
            stop.stop();
        }
    });

    let BuildOutput { graph, summary } = expander.build(seeds).await?;

    if let Some(path) = &cli.output {
        graph.save_json(path)?;
    }
    if let Some(path) = &cli.node_link {
        write_node_link_json(&graph, create(path)?)?;
        info!(path = %path.display(), "Wrote node-link JSON");
    }
    if let Some(path) = &cli.graphml {
        write_graphml(&graph, create(path)?)?;
        info!(path = %path.display(), "Wrote GraphML");
    }
    if let Some(path) = &cli.summary {
        serde_json::to_writer_pretty(create(path)?, &summary)?;
    }

    if cli.top > 0 {
        for (rank, paper) in PageRankScorer::default().rank(&graph, cli.top).iter().enumerate() {
            eprintln!(
                "{:>3}. {:.3}  {:<28} {}",
                rank + 1,
                paper.authority_score,
                paper.identifier.to_string(),
                paper.title
            );
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}
