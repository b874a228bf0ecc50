//! testrail-reporter CLI - publish test run results to TestRail.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use testrail_reporter::api::TestRailApi;
use testrail_reporter::cache::{FileCache, RunCache, keys};
use testrail_reporter::config::{self, DEFAULT_CONFIG_FILE, Mode, ReporterOptions};
use testrail_reporter::events;
use testrail_reporter::report::TestRailReporter;

#[derive(Parser)]
#[command(name = "testrail-reporter")]
#[command(about = "Publish test run results to TestRail", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// TestRail username, overrides the configuration file
    #[arg(long, env = "TESTRAIL_USERNAME", global = true)]
    username: Option<String>,

    /// TestRail password or API key, overrides the configuration file
    #[arg(long, env = "TESTRAIL_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a JSON-lines event stream to TestRail
    Report {
        /// Event stream path, `-` for stdin
        #[arg(short, long, default_value = "-")]
        events: String,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init,

    /// Forget the cached plan and run
    PurgeCache,

    /// Delete the cached plan or run from TestRail
    Delete,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Report { events } => report(&cli, events).await,
        Commands::Validate => validate_config(&cli),
        Commands::Init => init_config(),
        Commands::PurgeCache => purge_cache(&cli),
        Commands::Delete => delete_report(&cli).await,
    }
}

/// Loads the `[testrail]` options and applies credential overrides.
fn load_options(cli: &Cli) -> Result<ReporterOptions> {
    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let mut options = config.testrail;
    if let Some(username) = &cli.username {
        options.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        options.password = Some(password.clone());
    }

    info!("Loaded configuration from {}", cli.config.display());
    Ok(options)
}

async fn report(cli: &Cli, source: &str) -> Result<()> {
    let options = load_options(cli)?;
    let reporter = TestRailReporter::new(&options)?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if source == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("Failed to open event stream {}", source))?;
        Box::new(BufReader::new(file))
    };

    let delivered = events::replay(reader, &reporter)
        .await
        .context("Failed to replay events")?;
    info!("Replayed {} events", delivered);

    if reporter.summary().await.is_none() {
        warn!("No results were published to TestRail");
    }

    Ok(())
}

fn validate_config(cli: &Cli) -> Result<()> {
    let options = load_options(cli)?;
    let config = options.validate()?;

    println!("Configuration is valid!");
    println!();
    println!("Host: {}", config.host);
    println!("Project: {}", config.project_id);
    match &config.mode {
        Mode::Run { suite_id } => println!("Mode: run (suite {})", suite_id),
        Mode::Plan {
            suite_ids,
            milestone_id,
            entry_suite_id,
        } => {
            println!("Mode: plan (suites {:?})", suite_ids);
            if let Some(milestone_id) = milestone_id {
                println!("Milestone: {}", milestone_id);
            }
            if let Some(suite_id) = entry_suite_id {
                println!("Plan entry suite: {}", suite_id);
            }
        }
    }
    println!("Failed status: {}", config.failed_status);
    match config.pending_status {
        Some(status) => println!("Pending status: {}", status),
        None => println!("Pending status: not reported"),
    }
    println!("Cache: {}", config.cache_dir.display());

    Ok(())
}

fn init_config() -> Result<()> {
    let config = r#"# testrail-reporter configuration file

[testrail]
host = "https://example.testrail.io"
# Prefer the TESTRAIL_USERNAME / TESTRAIL_PASSWORD environment variables
username = "ci@example.com"
password = "api-key"
project_id = 1
suite_id = 1

# Report into a plan of runs instead of a single run
# use_plan = true
# suite_ids = [1, 2]
# milestone_id = 3

# run_name = "Nightly"
# cache_dir = "."
# failed_status = "failed"
# pending_status = "blocked"
rate_limit_cooldown_secs = 60
"#;

    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if path.exists() {
        bail!(
            "{} already exists. Remove it first or edit manually.",
            DEFAULT_CONFIG_FILE
        );
    }

    std::fs::write(&path, config)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", DEFAULT_CONFIG_FILE);
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  testrail-reporter validate");

    Ok(())
}

fn open_cache(options: &ReporterOptions) -> FileCache {
    let dir = options.cache_dir.as_deref().unwrap_or(".");
    FileCache::open(Path::new(shellexpand::tilde(dir).as_ref()))
}

fn purge_cache(cli: &Cli) -> Result<()> {
    let options = load_options(cli)?;
    let cache = open_cache(&options);

    cache.purge().context("Failed to purge run cache")?;
    println!("Purged {}", cache.path().display());

    Ok(())
}

async fn delete_report(cli: &Cli) -> Result<()> {
    let options = load_options(cli)?;
    let config = Arc::new(options.validate()?);
    let cache: Arc<dyn RunCache> = Arc::new(FileCache::open(&config.cache_dir));

    let mut api = TestRailApi::connect(config.clone(), cache.clone())?;
    if config.mode.is_plan() {
        let Some(plan_id) = cache.retrieve_as::<u64>(keys::PLAN_ID) else {
            bail!("No cached TestRail plan to delete");
        };
        api.set_plan_id(plan_id);
    } else {
        let Some(run_id) = cache.retrieve_as::<u64>(keys::RUN_ID) else {
            bail!("No cached TestRail run to delete");
        };
        api.set_run_id(run_id);
    }

    api.delete_report()
        .await
        .context("Failed to delete TestRail report")?;
    cache.purge().context("Failed to purge run cache")?;
    println!("Deleted TestRail report and purged the run cache");

    Ok(())
}
