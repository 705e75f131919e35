use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use catalog_curator_lib::application::{
    CurationSession, EnrichmentOrchestrator, ExportTransformer, ProgressCallback,
};
use catalog_curator_lib::domain::Dataset;
use catalog_curator_lib::domain::category_filter::search_categories;
use catalog_curator_lib::infrastructure::config::{AppConfig, ConfigManager};
use catalog_curator_lib::infrastructure::csv_store::{OutputEncoding, load_dataset, save_dataset};
use catalog_curator_lib::infrastructure::logging::{
    LoggingConfig, init_logging_with_config, log_system_info,
};

#[derive(Parser)]
#[command(name = "catalog-curator", version)]
#[command(
    about = "Catalog Curator - enrich, filter and export product catalogs",
    long_about = None
)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill descriptions and SEO fields of unprocessed products
    Enrich {
        /// Semicolon-delimited catalog file
        #[arg(short, long)]
        input: PathBuf,
        /// Output file (defaults to `<input>_enriched.csv`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the categories of a catalog file
    Categories {
        #[arg(short, long)]
        input: PathBuf,
        /// Case-insensitive substring filter
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Filter by category and write the e-shop import file
    Export {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Category to keep; repeat for several, omit for all
        #[arg(short, long = "category")]
        categories: Vec<String>,
        /// Also keep products that already have SEO content
        #[arg(long)]
        preserve_seo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await.context("Failed to load configuration")?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging_or_console(&config.logging);
    log_system_info();
    info!(config = %manager.config_path().display(), "Configuration loaded");

    match cli.command {
        Commands::Enrich { input, output } => enrich(&config, &input, output).await,
        Commands::Categories { input, search } => {
            categories(&config, &input, search.as_deref()).await
        }
        Commands::Export {
            input,
            output,
            categories,
            preserve_seo,
        } => export(&config, &input, &output, &categories, preserve_seo).await,
    }
}

/// Fall back to console-only logging when the log directory is unusable
fn init_logging_or_console(logging: &LoggingConfig) {
    if let Err(e) = init_logging_with_config(logging.clone()) {
        let console_only = LoggingConfig {
            file_output: false,
            console_output: true,
            ..logging.clone()
        };
        if init_logging_with_config(console_only).is_ok() {
            warn!("File logging unavailable, using console only: {e}");
        }
    }
}

fn default_enriched_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("catalog");
    input.with_file_name(format!("{stem}_enriched.csv"))
}

async fn enrich(config: &AppConfig, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let (dataset, encoding) = load_dataset(input)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let orchestrator = EnrichmentOrchestrator::from_config(config)?;
    let progress: ProgressCallback = Box::new(|done, total| {
        info!(done, total, "📈 Enrichment progress");
    });
    let run = orchestrator.run(dataset, Some(progress)).await?;

    let output = output.unwrap_or_else(|| default_enriched_path(input));
    let written = save_dataset(&output, &run.dataset, OutputEncoding::from(encoding))
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        output = %output.display(),
        encoding = ?written.encoding,
        substitutions = written.substitutions,
        stats = %serde_json::to_string(&run.stats)?,
        "✅ Enriched catalog written"
    );
    println!(
        "{} of {} products enriched -> {}",
        run.stats.processed,
        run.stats.should_process,
        output.display()
    );
    Ok(())
}

/// Session over `dataset`, filtering on the configured category column
fn curation_session(config: &AppConfig, dataset: Dataset) -> CurationSession {
    let mut session =
        CurationSession::new().with_category_column(config.export.category_source_column.clone());
    session.load_input(dataset);
    session
}

async fn categories(config: &AppConfig, input: &Path, search: Option<&str>) -> Result<()> {
    let (dataset, _) = load_dataset(input)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let session = curation_session(config, dataset);
    for category in search_categories(&session.categories(), search.unwrap_or_default()) {
        println!("{category}");
    }
    Ok(())
}

async fn export(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    categories: &[String],
    preserve_seo: bool,
) -> Result<()> {
    let (dataset, _) = load_dataset(input)
        .await
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let mut session = curation_session(config, dataset);
    let outcome = session.apply_filter(categories, preserve_seo);
    session.check_all_visible();
    session.add_checked_to_output();
    info!(
        visible = outcome.visible,
        preserved_by_seo = outcome.preserved_by_seo,
        "Rows selected for export"
    );

    let exported =
        ExportTransformer::new(config.export.clone()).transform(session.output_dataset());
    save_dataset(output, &exported, config.storage.export_encoding)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("{} products exported -> {}", exported.len(), output.display());
    Ok(())
}
