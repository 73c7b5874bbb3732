use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use herd_census::{
    analyze, insert_extract, list_extracts, logging, setup_database, DashboardReport,
    MunicipalitySelection, PipelineConfig,
};

#[derive(Parser)]
#[command(name = "herd-census")]
#[command(about = "Livestock vaccination census: clean, aggregate and report")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean an extract and print the dashboard report
    Report {
        /// Extract to read (overrides config)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Restrict to a municipality; repeat for several
        #[arg(long = "municipio")]
        municipios: Vec<String>,
        /// Municipalities in the ranking
        #[arg(long)]
        top: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clean an extract and store it in SQLite
    Import {
        #[arg(long)]
        source: Option<PathBuf>,
        /// Database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List known extract releases
    Releases,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs);

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Report {
            source,
            municipios,
            top,
            json,
        } => run_report(&config, source, municipios, top, json),
        Commands::Import { source, db } => run_import(&config, source, db),
        Commands::Releases => run_releases(&config),
    }
}

fn run_report(
    config: &PipelineConfig,
    source: Option<PathBuf>,
    municipios: Vec<String>,
    top: Option<usize>,
    json: bool,
) -> Result<()> {
    let path = source.unwrap_or_else(|| config.source.path.clone());
    let pipeline = config.pipeline()?;
    let options = config.load_options()?;

    let extract = pipeline
        .run_file(&path, options)
        .with_context(|| format!("Failed to clean {}", path.display()))?;

    let selection = MunicipalitySelection::of(municipios);
    let view = analyze(&extract, &selection, top.unwrap_or(config.report.top_n));
    let report = DashboardReport::build(&extract, &view);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}

fn run_import(config: &PipelineConfig, source: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    println!("🗄️  Census import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = source.unwrap_or_else(|| config.source.path.clone());
    let db_path = db.unwrap_or_else(|| config.storage.database.clone());

    // 1. Clean extract
    println!("\n📂 Cleaning {}...", path.display());
    let extract = config
        .pipeline()?
        .run_file(&path, config.load_options()?)
        .with_context(|| format!("Failed to clean {}", path.display()))?;
    println!(
        "✓ {} rows read, {} holdings kept, {} dropped (release {})",
        extract.rows_read,
        extract.records.len(),
        extract.dropped_count(),
        extract.release_id
    );

    // 2. Setup database
    println!("\n🔧 Setting up database...");
    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    setup_database(&conn)?;
    println!("✓ Database initialized with WAL mode");

    // 3. Store
    println!("\n💾 Storing extract...");
    if insert_extract(&conn, &extract)? {
        println!("✓ Stored {} holdings", extract.records.len());
    } else {
        println!("✓ Extract already stored (fingerprint {}), nothing written", &extract.fingerprint[..12]);
    }

    let stored = list_extracts(&conn)?;
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Database contains {} extract(s)", stored.len());

    Ok(())
}

fn run_releases(config: &PipelineConfig) -> Result<()> {
    let catalog = config.catalog()?;

    println!("📚 {} known releases", catalog.count());
    for release in catalog.list_all() {
        let synonyms = release.buckets.iter().filter(|b| b.is_synonym_group()).count();
        println!(
            "  {:<14} v{:<3} {} bucket columns, {} synonym groups  {}",
            release.id,
            release.version,
            release.buckets.iter().map(|b| b.aliases.len()).sum::<usize>(),
            synonyms,
            release.description
        );
    }

    Ok(())
}
