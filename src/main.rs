use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use npm_mirror::artifact::ArtifactStore;
use npm_mirror::config::{MirrorConfig, log_path};
use npm_mirror::importer::{ImportOptions, ImportReport, Importer, SeedSpec};
use npm_mirror::logging::init_logging;
use npm_mirror::registry::NpmRegistry;
use npm_mirror::store::{PackageStore, Store};

#[derive(Parser)]
#[command(name = "npm-mirror")]
#[command(version, about = "Mirror npm packages and their dependencies into a local registry")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Upstream registry base URL
    #[arg(long, global = true)]
    upstream: Option<String>,

    /// Base URL the local registry serves artifacts from
    #[arg(long, global = true)]
    local_registry: Option<String>,

    #[arg(long, global = true)]
    package_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Sibling dependencies imported at the same time
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Also write JSON logs to the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import packages and everything they depend on
    Import {
        /// `name`, `name@spec` or `@scope/name@spec`
        #[arg(required = true)]
        packages: Vec<SeedSpec>,
    },
    /// Import the seeds listed in the configuration file
    Seed,
    /// Print a stored package document, or the version matching a spec
    Show {
        name: String,
        version: Option<String>,
    },
    /// List stored packages and their versions
    List,
}

impl Cli {
    fn mirror_config(&self) -> anyhow::Result<MirrorConfig> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::load(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => MirrorConfig::default(),
        };

        if let Some(upstream) = &self.upstream {
            config.upstream_registry = upstream.clone();
        }
        if let Some(local_registry) = &self.local_registry {
            config.local_registry = local_registry.clone();
        }
        if let Some(package_dir) = &self.package_dir {
            config.package_dir = Some(package_dir.clone());
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        Ok(config)
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.mirror_config()?;
    let _guard = init_logging(cli.log_file.then(log_path).as_deref())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, config))
}

async fn run(command: Command, config: MirrorConfig) -> anyhow::Result<ExitCode> {
    let database = config.database();
    if let Some(parent) = database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(
        Store::new(&database).with_context(|| format!("Failed to open {:?}", database))?,
    );

    match command {
        Command::Import { packages } => import(store, &config, &packages).await,
        Command::Seed => {
            if config.seeds.is_empty() {
                bail!("No seeds configured");
            }
            let seeds: Vec<SeedSpec> = config
                .seeds
                .iter()
                .map(|(name, spec)| SeedSpec::new(name, spec))
                .collect();
            import(store, &config, &seeds).await
        }
        Command::Show { name, version } => {
            let Some(package) = store.load_package(&name)? else {
                bail!("{} is not mirrored", name);
            };
            let document = match version {
                Some(spec) => match store.get_version(&name, &spec)? {
                    Some(document) => document,
                    None => match package.get_version(&spec)? {
                        Some(record) => record.metadata().clone(),
                        None => bail!("No mirrored version of {} satisfies {}", name, spec),
                    },
                },
                None => package.to_document(),
            };
            println!("{}", serde_json::to_string_pretty(&document)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            for name in store.list_packages()? {
                println!("{} {}", name, store.cached_versions(&name)?.join(" "));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn import(
    store: Arc<Store>,
    config: &MirrorConfig,
    seeds: &[SeedSpec],
) -> anyhow::Result<ExitCode> {
    let registry = NpmRegistry::new(&config.upstream_registry)?;
    let artifacts = ArtifactStore::new(config.package_dir(), &config.local_registry);
    let importer = Importer::new(
        store,
        Arc::new(registry),
        artifacts,
        ImportOptions::from(config),
    );

    info!(
        "Mirroring {} seeds from {}",
        seeds.len(),
        config.upstream_registry
    );
    let reports = importer.import_batch(seeds).await;
    for report in &reports {
        println!("{}", report);
    }

    Ok(if reports.iter().all(ImportReport::is_complete) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
