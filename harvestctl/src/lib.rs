use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_core::{
    load_harvest_config, BrowserLauncher, ExportError, HarvestConfig, HarvestContext, HarvestError,
    Harvester, RunPlan, RunReport,
};

pub const DEFAULT_CONFIG: &str = "configs/harvest.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] harvest_core::ConfigError),
    #[error("failed to prepare harvest: {0}")]
    Setup(#[from] ExportError),
    #[error("{0}")]
    Harvest(#[from] HarvestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "onsemi documentation and community harvester",
    long_about = None
)]
pub struct Cli {
    /// Path to harvest.toml; a missing default file means built-in defaults
    #[arg(long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
    /// Overrides output.root_dir
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Shows the browser window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
    /// Overrides run.max_attempts
    #[arg(long)]
    pub attempts: Option<usize>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs the document sweep and the whole forum traversal
    Run,
    /// Runs only the document sweep
    Documents,
    /// Runs only the forum traversal
    Forum(ForumArgs),
    /// Prints the effective configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct ForumArgs {
    /// Only visit category knowledge articles
    #[arg(long, conflicts_with = "topics_only")]
    pub categories_only: bool,
    /// Only visit community questions
    #[arg(long)]
    pub topics_only: bool,
}

impl Commands {
    fn plan(&self) -> Option<RunPlan> {
        match self {
            Commands::Run => Some(RunPlan::default()),
            Commands::Documents => Some(RunPlan::documents_only()),
            Commands::Forum(args) => Some(RunPlan::forum(!args.topics_only, !args.categories_only)),
            Commands::Config => None,
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level);
    let config = load_config(&cli)?;

    match cli.command.plan() {
        None => render(&config, cli.format)?,
        Some(plan) => {
            let report = harvest(config, plan)?;
            render(&report, cli.format)?;
        }
    }
    Ok(())
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Loads the config file and applies command-line overrides.
pub fn load_config(cli: &Cli) -> Result<HarvestConfig> {
    let mut config = if cli.config == Path::new(DEFAULT_CONFIG) && !cli.config.exists() {
        info!(path = %cli.config.display(), "no config file, using defaults");
        HarvestConfig::default()
    } else {
        load_harvest_config(&cli.config)?
    };
    if let Some(dir) = &cli.output_dir {
        config.output.root_dir = dir.to_string_lossy().to_string();
    }
    if cli.headed {
        config.browser.headless = false;
    }
    if let Some(attempts) = cli.attempts {
        config.run.max_attempts = attempts.max(1);
    }
    Ok(config)
}

fn harvest(config: HarvestConfig, plan: RunPlan) -> Result<RunReport> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let context = HarvestContext::new(config)?;
        let launcher = BrowserLauncher::new(context.config.browser.clone());
        let report = Harvester::new(context, launcher)
            .with_plan(plan)
            .run()
            .await?;
        Ok::<_, AppError>(report)
    })
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let elapsed = self.finished_at - self.started_at;
        let mut lines = vec![format!(
            "Harvest finished in {}s after {} attempt(s)",
            elapsed.num_seconds(),
            self.attempts
        )];
        if let Some(sweep) = &self.documents {
            lines.push(format!(
                "Documents: {}/{} parts exported, {} records, {} files written, {} abandoned",
                sweep.parts_exported,
                sweep.parts_seen,
                sweep.records,
                sweep.documents_written,
                sweep.documents_abandoned
            ));
            for failure in &sweep.failures {
                lines.push(format!("  - {}: {}", failure.part, failure.error));
            }
        }
        if let Some(forum) = &self.forum {
            lines.push(format!(
                "Forum: {} categories visited, {} articles, {} questions, {} load-more clicks",
                forum.categories_visited,
                forum.articles_extracted,
                forum.topics_extracted,
                forum.load_more_clicks
            ));
            lines.push(format!(
                "  images: {} written, {} abandoned",
                forum.images_written, forum.images_abandoned
            ));
            for skipped in &forum.categories_skipped {
                lines.push(format!("  - category {}: {}", skipped.category, skipped.error));
            }
            for failed in &forum.failed_posts {
                lines.push(format!("  - post {}: {}", failed.link, failed.error));
            }
        }
        lines.join("\n")
    }
}

impl DisplayFallback for HarvestConfig {
    fn display(&self) -> String {
        [
            format!("output root: {}", self.output.root_dir),
            format!(
                "browser: headless={} viewport={}x{}",
                self.browser.headless, self.browser.viewport[0], self.browser.viewport[1]
            ),
            format!("documents: {}", self.documentation.search_url),
            format!("document types: {}", self.documentation.document_types.join(", ")),
            format!("forum categories: {}", self.forum.categories.len()),
            format!("forum topics: {}", self.forum.topic_url),
            format!(
                "attempts: run={} download={}",
                self.run.max_attempts, self.download.max_attempts
            ),
        ]
        .join("\n")
    }
}
