// Dump Convert - CLI
//
//   dump-convert convert <dump> --shape legacy|final [-o out.json] [--seed N]
//   dump-convert load <dump> --shape legacy|final [--database P] [--backup-dir D] [--seed N]
//
// Flags override DUMP_CONVERT_* environment settings (.env is read too).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dump_convert::{
    convert_and_load, convert_file, init_tracing, pipeline::processing_time, seeded_rng,
    ConversionReport, Settings, ShapeKind,
};

#[derive(Parser)]
#[command(name = "dump-convert")]
#[command(version, about = "Convert panel database dumps into normalized snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a dump into a JSON snapshot
    Convert {
        /// Dump file (INSERT statements)
        dump: PathBuf,

        /// Output shape: legacy or final
        #[arg(short, long)]
        shape: ShapeKind,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for placeholder contacts and group keys
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Convert a dump, load it into the SQLite sink and write a backup
    Load {
        /// Dump file (INSERT statements)
        dump: PathBuf,

        /// Output shape: legacy or final
        #[arg(short, long)]
        shape: ShapeKind,

        /// SQLite database to load into
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Directory for the SQL backup
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,

        /// Seed for placeholder contacts and group keys
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            dump,
            shape,
            output,
            seed,
        } => run_convert(dump, shape, output, seed.or(settings.seed)),
        Commands::Load {
            dump,
            shape,
            database,
            backup_dir,
            seed,
        } => {
            let database = database.unwrap_or(settings.database);
            let backup_dir = backup_dir.unwrap_or(settings.backup_dir);
            run_load(dump, shape, database, backup_dir, seed.or(settings.seed))
        }
    }
}

fn run_convert(
    dump: PathBuf,
    shape: ShapeKind,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    let mut rng = seeded_rng(seed);
    let conversion = convert_file(&dump, shape, processing_time(), &mut rng)?;
    let json = serde_json::to_string_pretty(&conversion.snapshot)?;

    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
            eprintln!("✓ Snapshot written: {}", path.display());
            print_report(&conversion.report);
        }
        // Stdout carries the snapshot only
        None => println!("{}", json),
    }

    Ok(())
}

fn run_load(
    dump: PathBuf,
    shape: ShapeKind,
    database: PathBuf,
    backup_dir: PathBuf,
    seed: Option<u64>,
) -> Result<()> {
    println!("🗄️  Dump Convert - {} → SQLite", shape);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let bytes = std::fs::read(&dump)
        .with_context(|| format!("Failed to read dump file: {}", dump.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    println!("\n📂 Converting {}...", dump.display());
    let mut rng = seeded_rng(seed);
    let outcome = convert_and_load(&text, &dump, shape, &database, &backup_dir, &mut rng)?;
    print_report(&outcome.report);

    println!("\n💾 Loaded into {}", outcome.database.display());
    println!("✓ Categories: {}", outcome.loaded.categories);
    println!("✓ Accounts: {}", outcome.loaded.accounts);
    println!("✓ End users: {}", outcome.loaded.end_user_accounts);
    println!("✓ Assignments: {}", outcome.loaded.assignments);

    println!("\n📦 Backup: {}", outcome.backup.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Done: {} rows loaded", outcome.loaded.total());

    Ok(())
}

fn print_report(report: &ConversionReport) {
    eprintln!("✓ Input sha256: {}", report.input_sha256);
    for (table, rows) in &report.rows_per_table {
        eprintln!("✓ {}: {} rows", table, rows);
    }
    if report.header_rows_skipped > 0 {
        eprintln!("✓ Header rows skipped: {}", report.header_rows_skipped);
    }
    if report.unterminated_statements > 0 {
        eprintln!("⚠️  Unterminated statements: {}", report.unterminated_statements);
    }
    eprintln!("✓ Synthesized contacts: {}", report.synthesized_contacts);
    eprintln!(
        "✓ Defaulted expiries: {} ({} blank, {} unparseable)",
        report.defaulted_expiries(),
        report.blank_expiries,
        report.unparseable_expiries
    );
    if report.unknown_owners > 0 {
        eprintln!("⚠️  Unknown owners: {}", report.unknown_owners);
    }
    if report.missing_categories > 0 {
        eprintln!("⚠️  Missing categories: {}", report.missing_categories);
    }
}
