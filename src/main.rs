mod catalog;
mod db;
mod document;
mod embedded;
mod export;
mod extract;
mod fetcher;
mod process;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::export::OutputRecord;
use crate::extract::ComponentDescriptor;

#[derive(Parser)]
#[command(name = "bank_harvest", about = "Harvest component copy from bank product pages")]
struct Cli {
    /// Settings file (default: ./harvest.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load targets file into the queue
    Init,
    /// Fetch unvisited targets, one at a time
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract components from fetched pages
    Process {
        /// Max pages to process (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one go
    Run {
        /// Max pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch one URL and print its record without storing anything
    Extract {
        url: String,
        /// Component name, e.g. ModalV2
        #[arg(short = 'C', long)]
        component: String,
        /// Exact-match property filter, repeatable: --prop widthTab=equal
        #[arg(short, long = "prop")]
        props: Vec<String>,
        /// Free-text label stored with the record
        #[arg(short, long, default_value = "")]
        service_type: String,
    },
    /// Write all records to the output JSON file
    Export {
        /// Output path (default: export_path setting)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Aggregator catalog: list products, look up details, export summaries
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Put targets and products that failed back in the queue
    Requeue,
    /// Show queue and outcome counts
    Stats,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Fetch listing pages from the catalog file and queue their products
    Scan,
    /// Look up details for queued products
    Details {
        /// Max products to look up (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Write structured product summaries
    Export {
        /// Output path (default: catalog_export_path setting)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scan + details + export in one go
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let targets = settings::load_targets(&settings.targets_path)?;
            let inserted = db::insert_targets(&conn, &targets)?;
            println!("Queued {} new targets ({} in file)", inserted, targets.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let targets = db::fetch_unvisited(&conn, limit)?;
            if targets.is_empty() {
                println!("No unvisited targets. Run 'init' first or 'requeue' failed ones.");
                return Ok(());
            }
            let client = fetcher::build_client(&settings)?;
            println!("Fetching {} pages...", targets.len());
            let stats = fetcher::fetch_targets(&conn, &client, targets, settings.delay()).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No pending pages. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages, &settings.block_id)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let targets = db::fetch_unvisited(&conn, limit)?;
            if targets.is_empty() {
                println!("No unvisited targets. Run 'init' first.");
                return Ok(());
            }
            let client = fetcher::build_client(&settings)?;

            // Phase 1: fetch
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages...", targets.len());
            let stats = fetcher::fetch_targets(&conn, &client, targets, settings.delay()).await?;
            println!(
                "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: process
            let t_process = Instant::now();
            let pending = db::fetch_unprocessed(&conn, None)?;
            println!("Processing {} pages...", pending.len());
            let counts = process_pages(&conn, &pending, &settings.block_id)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Extract {
            url,
            component,
            props,
            service_type,
        } => {
            let descriptor = ComponentDescriptor::from_cli(&component, &props)?;
            let client = fetcher::build_client(&settings)?;
            let content = match fetcher::fetch_page(&client, &url).await {
                Ok(page) => process::extract_from_html(&page.html, &settings.block_id, &descriptor).content,
                Err(e) => format!("Fetch failed: {}", e),
            };
            let record = OutputRecord {
                url,
                service_type,
                content,
                timestamp: process::now_rfc3339(),
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Export { output } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let records: Vec<OutputRecord> = db::fetch_records(&conn)?
                .into_iter()
                .map(OutputRecord::from)
                .collect();
            let path = output.unwrap_or_else(|| settings.export_path.clone());
            export::write_records(&path, &records)?;
            println!("Wrote {} records to {}", records.len(), path.display());
            Ok(())
        }
        Commands::Catalog { action } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            run_catalog(&conn, &settings, action).await
        }
        Commands::Requeue => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let n = db::requeue_failed(&conn)?;
            let p = db::requeue_failed_products(&conn)?;
            println!("Re-queued {} targets and {} products.", n, p);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Targets:         {}", s.total);
            println!("Visited:         {}", s.visited);
            println!("Unvisited:       {}", s.unvisited);
            println!("Fetched:         {}", s.fetched);
            println!("Fetch errors:    {}", s.fetch_errors);
            println!("Found:           {}", s.found);
            println!("Not found:       {}", s.not_found);
            println!("Document errors: {}", s.document_errors);
            println!("Products:        {}", s.products);
            println!("With details:    {}", s.product_details);
            println!("Detail errors:   {}", s.product_errors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_catalog(
    conn: &rusqlite::Connection,
    settings: &settings::Settings,
    action: CatalogAction,
) -> anyhow::Result<()> {
    let (scan, details, export, limit, output) = match action {
        CatalogAction::Scan => (true, false, false, None, None),
        CatalogAction::Details { limit } => (false, true, false, limit, None),
        CatalogAction::Export { output } => (false, false, true, None, output),
        CatalogAction::Run => (true, true, true, None, None),
    };
    let client = fetcher::build_client(settings)?;

    if scan {
        let sources = settings::load_catalog_sources(&settings.catalog_path)?;
        println!("Scanning {} listing pages...", sources.len());
        let stats = catalog::scan_sources(conn, &client, &sources, settings.delay()).await?;
        println!(
            "Listed {} products ({} new) from {} pages, {} failed.",
            stats.listed, stats.new, stats.pages, stats.failed_pages
        );
    }

    if details {
        let pending = db::fetch_pending_products(conn, limit)?;
        if pending.is_empty() {
            println!("No products waiting for details.");
        } else {
            println!("Looking up {} products...", pending.len());
            let stats = catalog::fetch_details(conn, &client, settings, pending).await?;
            println!(
                "Done: {} looked up ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
        }
    }

    if export {
        let rows = db::fetch_product_details(conn)?;
        let summaries = catalog::build_summaries(&rows)?;
        let path = output.unwrap_or_else(|| settings.catalog_export_path.clone());
        export::write_json(&path, &summaries)?;
        println!("Wrote {} product summaries to {}", summaries.len(), path.display());
    }

    Ok(())
}

#[derive(Default)]
struct ProcessCounts {
    found: usize,
    not_found: usize,
    fetch_errors: usize,
    document_errors: usize,
}

impl ProcessCounts {
    fn add(&mut self, outcome: db::Outcome) {
        match outcome {
            db::Outcome::Found => self.found += 1,
            db::Outcome::NotFound => self.not_found += 1,
            db::Outcome::FetchError => self.fetch_errors += 1,
            db::Outcome::DocumentError => self.document_errors += 1,
        }
    }

    fn print(&self) {
        println!(
            "Saved {} found, {} not found, {} fetch errors, {} document errors.",
            self.found, self.not_found, self.fetch_errors, self.document_errors,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::FetchedPage],
    block_id: &str,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts::default();

    for chunk in pages.chunks(100) {
        let rows: Vec<_> = chunk
            .par_iter()
            .map(|page| process::process_page(page, block_id))
            .collect();
        for row in &rows {
            counts.add(row.outcome);
        }
        db::save_records(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
