//! kindcache CLI
//!
//! Loads records into a [`KindCache`] and runs queries against it.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kindcache_common::{CacheConfig, Error, Kind};
use kindcache_store::{FieldSelector, KindCache, LabelSelector, ListOptions, Object, Scheme};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kindcache-cli")]
#[command(about = "Kind-partitioned record cache")]
#[command(version)]
struct Args {
    /// Cache configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a Deployment, read it back and compare the two
    Demo,
    /// Load records from a JSON file and list the matching ones
    Query {
        /// JSON file holding an array of records
        #[arg(short, long)]
        records: PathBuf,
        /// apiVersion of the kind to list (e.g. apps/v1)
        #[arg(long)]
        api_version: String,
        /// Kind to list (e.g. Deployment or DeploymentList)
        #[arg(short, long)]
        kind: String,
        /// Field index to register, as name=path (e.g. app=metadata.labels.app)
        #[arg(short, long = "index")]
        indexes: Vec<String>,
        /// Namespace to list from; all namespaces when omitted
        #[arg(short, long)]
        namespace: Option<String>,
        /// Field selector (e.g. app=web,tier=front)
        #[arg(long)]
        fields: Option<String>,
        /// Label selector (e.g. env in (prod,staging),!canary)
        #[arg(long)]
        labels: Option<String>,
        /// Maximum number of records to return
        #[arg(long)]
        limit: Option<usize>,
        /// Print cache statistics after the query
        #[arg(long)]
        stats: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(args.config.as_deref())?;
    debug!("Loaded configuration: {:?}", config);

    match args.command {
        Commands::Demo => run_demo(&config),
        Commands::Query {
            records,
            api_version,
            kind,
            indexes,
            namespace,
            fields,
            labels,
            limit,
            stats,
        } => {
            let kind = Kind::from_api_version(&api_version, kind);
            let mut options = ListOptions::new();
            if let Some(namespace) = namespace {
                options = options.in_namespace(namespace);
            }
            if let Some(fields) = fields {
                options = options.matching_fields(FieldSelector::parse(&fields)?);
            }
            if let Some(labels) = labels {
                options = options.matching_labels(LabelSelector::parse(&labels)?);
            }
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            run_query(&config, &records, &kind, &indexes, &options, stats)
        }
    }
}

/// Load the cache configuration, or the default one when no file is given.
///
/// `KINDCACHE_*` environment variables override file values.
fn load_config(path: Option<&Path>) -> Result<CacheConfig> {
    let Some(path) = path else {
        return Ok(CacheConfig::default());
    };
    let config: CacheConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("KINDCACHE").try_parsing(true))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
    Ok(config)
}

fn run_demo(config: &CacheConfig) -> Result<()> {
    let deployment = Kind::new("apps", "v1", "Deployment");
    let mut scheme = Scheme::new();
    scheme.register_kind(deployment.clone());

    let mut config = config.clone();
    if !config.kinds.contains(&deployment) {
        config.kinds.push(deployment);
    }
    let cache = KindCache::new(&config, scheme);

    let deploy = Object::new("Deployment", "default", "deploy").with_spec(json!({
        "template": {
            "metadata": { "name": "somename" }
        }
    }));
    cache
        .add(deploy.clone())
        .context("failed to add deployment to the cache")?;

    let Some(cached) = cache
        .get(&deploy)
        .context("failed to get the deployment")?
    else {
        bail!("failed to find the deployment in the cache");
    };

    println!("these two records are equal? => {}", cached == deploy);
    Ok(())
}

fn run_query(
    config: &CacheConfig,
    records: &Path,
    kind: &Kind,
    indexes: &[String],
    options: &ListOptions,
    stats: bool,
) -> Result<()> {
    let data = std::fs::read_to_string(records)
        .with_context(|| format!("failed to read {}", records.display()))?;
    let objects: Vec<Object> = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", records.display()))?;

    let mut scheme = Scheme::new();
    for kind in &config.kinds {
        scheme.register_kind(kind.clone());
    }
    for object in &objects {
        if !scheme.recognizes(&object.kind) {
            scheme.register_kind(Kind::from_api_version(&object.api_version, object.kind.clone()));
        }
    }

    let cache = KindCache::new(config, scheme);
    let count = objects.len();
    for object in objects {
        cache.add(object)?;
    }
    info!("Loaded {} records across {} kinds", count, cache.kinds().len());

    let item_kind = kind.item_kind();
    for spec in indexes {
        let Some((name, path)) = spec.split_once('=') else {
            bail!("invalid index '{spec}': expected name=path");
        };
        let path = path.to_string();
        cache.index_field(&item_kind, name, move |o: &Object| o.field_values(&path))?;
    }

    let results = cache.list(kind, options).map_err(explain_list_error)?;
    println!("{}", serde_json::to_string_pretty(&results)?);

    if stats {
        let snapshot = cache.stats().snapshot();
        let report = json!({
            "counters": snapshot,
            "hit_ratio": snapshot.hit_ratio(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Point the user at the flags behind a failed list
fn explain_list_error(err: Error) -> anyhow::Error {
    let hint = if err.is_not_found() {
        "check --api-version, --kind and --index"
    } else if err.is_invalid_query() {
        "check --fields and --labels"
    } else {
        return err.into();
    };
    anyhow::Error::new(err).context(hint)
}
