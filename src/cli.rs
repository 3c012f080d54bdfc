use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use brain_scrape::export::json_exporter::render_record;
use brain_scrape::logging::init_logging;
use brain_scrape::{AppConfig, BrainScrape, ScrapeError, Target};

const DEFAULT_QUERY: &str = "Apple iPhone 15 128GB Black";

#[derive(Parser)]
#[command(name = "brain-scrape")]
#[command(about = "Scrape one product from brain.com.ua into a JSON file and SQLite")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the site and print the first product page address
    Locate {
        #[arg(default_value = DEFAULT_QUERY, help = "Search query")]
        query: String,
    },

    /// Scrape a product page, write the results file and save it
    Extract {
        #[arg(long, help = "Product page address (skips the search)")]
        url: Option<String>,

        #[arg(long, default_value = DEFAULT_QUERY, help = "Search query used when no --url is given")]
        query: String,

        #[arg(long, help = "Per-step wait bound in seconds")]
        timeout: Option<u64>,

        #[arg(long, help = "Only write the results file, skip the database")]
        no_save: bool,
    },

    /// Save the record from the results file to the database
    Replay {
        #[arg(long, help = "Results file path (defaults to the configured one)")]
        path: Option<PathBuf>,
    },

    /// List products stored in the database
    Show {
        #[arg(long, help = "Only the product stored for this address")]
        url: Option<String>,

        #[arg(short, long, default_value_t = 20, help = "Number of products to show")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        let scrape_error = e.downcast_ref::<ScrapeError>();
        eprintln!("{}", diagnostic(&e, scrape_error));
        std::process::exit(scrape_error.map(ScrapeError::exit_code).unwrap_or(1));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (mut config, source) = match &cli.config {
        Some(path) => AppConfig::load_from_file(path).await?,
        None => AppConfig::load().await?,
    };

    if let Commands::Extract { timeout: Some(timeout), .. } = &cli.command {
        config.scraping.timeout_seconds = *timeout;
        config.validate()?;
    }

    init_logging(&config.logging, cli.verbose)?;
    info!("brain-scrape v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration {}", source);

    let app = BrainScrape::new(config)?;

    match cli.command {
        Commands::Locate { query } => {
            let url = app.locate(&query).await?;
            println!("{}", url);
        }
        Commands::Extract { url, query, no_save, .. } => {
            let target = match url {
                Some(url) => Target::Url(url),
                None => Target::Query(query),
            };
            execute_extract(&app, target, !no_save).await?;
        }
        Commands::Replay { path } => {
            let (record, row_id) = app.replay(path.as_deref()).await?;
            println!("Saved {} as row {}", record.label(), row_id);
        }
        Commands::Show { url, limit } => {
            show_products(&app, url.as_deref(), limit).await?;
        }
    }

    Ok(())
}

/// One-line report for a failed run
fn diagnostic(error: &anyhow::Error, scrape_error: Option<&ScrapeError>) -> String {
    match scrape_error {
        Some(e) if e.is_fatal() => format!("error [{}]: {:#} (no record written)", e.category(), error),
        Some(e) => format!("error [{}]: {:#}", e.category(), error),
        None => format!("error: {:#}", error),
    }
}

async fn execute_extract(app: &BrainScrape, target: Target, save: bool) -> Result<()> {
    let outcome = app.extract(target, save).await?;

    println!("{}", render_record(&outcome.record)?);

    eprintln!("Results written to {}", outcome.export.file_path);
    if let Some(row_id) = outcome.row_id {
        eprintln!("Saved to database as row {}", row_id);
    }
    if !outcome.record.missing_fields.is_empty() {
        let missing: Vec<&str> = outcome.record.missing_fields.iter().map(|f| f.as_str()).collect();
        eprintln!("Missing fields: {}", missing.join(", "));
    }

    Ok(())
}

async fn show_products(app: &BrainScrape, url: Option<&str>, limit: usize) -> Result<()> {
    let products = app.list_products(url, limit).await?;

    if products.is_empty() {
        println!("No stored products.");
        return Ok(());
    }

    println!("{:<6} {:<20} {:<12} {:<40} {:<8}", "ID", "Updated", "SKU", "Name", "Missing");
    println!("{}", "-".repeat(90));

    for product in products {
        let record = &product.record;
        println!(
            "{:<6} {:<20} {:<12} {:<40} {:<8}",
            product.id,
            product.updated_at.format("%Y-%m-%d %H:%M:%S"),
            record.sku.as_deref().unwrap_or("-"),
            record.name.as_deref().unwrap_or("-").chars().take(40).collect::<String>(),
            record.missing_fields.len()
        );
        println!("       {}", record.url);
    }

    Ok(())
}
