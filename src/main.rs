use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use claims_ledger::{
    copy_collections, Collection, CsvStore, Ledger, LedgerConfig, SqliteStore, StoreKind,
    VIEW_COLUMNS,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = LedgerConfig::load().context("Invalid configuration")?;

    match args.get(1).map(String::as_str) {
        Some("show") if args.len() == 3 => run_show(&config, &args[2]),
        Some("history") if args.len() == 4 => run_history(&config, &args[2], &args[3]),
        Some("import") if args.len() == 3 => run_import(&config, Path::new(&args[2])),
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    eprintln!("claims-ledger {}", claims_ledger::VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  claims-ledger show <account_id>       merged customer view");
    eprintln!("  claims-ledger history <kind> <id>     audit entries (kind: accounts|claims|policies)");
    eprintln!("  claims-ledger import <csv_dir>        copy CSV collections into the SQLite store");
}

fn run_show(config: &LedgerConfig, account_id: &str) -> Result<()> {
    let ledger = Ledger::from_config(config)?;
    let rows = ledger.get_customer_info(account_id)?;

    println!("👤 Customer {}", account_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for (idx, row) in rows.iter().enumerate() {
        println!("\n📄 Row {}", idx + 1);
        for (column, cell) in VIEW_COLUMNS.iter().zip(row.cells()) {
            println!("   {:<12} {}", column, cell);
        }
    }
    println!("\n✓ {} row(s)", rows.len());
    Ok(())
}

fn run_history(config: &LedgerConfig, kind: &str, id: &str) -> Result<()> {
    let kind: Collection = kind.parse().map_err(anyhow::Error::msg)?;
    let ledger = Ledger::from_config(config)?;
    let entries = ledger.audit_history(kind, id)?;

    println!("📜 {} {} - {} change(s)", kind, id, entries.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in &entries {
        println!(
            "{}  {:<12} {} → {}",
            entry.timestamp, entry.column, entry.old_value, entry.new_value
        );
    }
    Ok(())
}

fn run_import(config: &LedgerConfig, csv_dir: &Path) -> Result<()> {
    if config.store_kind != StoreKind::Sqlite {
        bail!("import needs CLAIMS_LEDGER_STORE=sqlite (the CSV directory is the source)");
    }

    println!("🗄️  Import: CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Opening CSV collections in {}...", csv_dir.display());
    let source = CsvStore::open(csv_dir)
        .with_context(|| format!("Failed to open CSV directory {}", csv_dir.display()))?;

    println!("\n🔧 Setting up database {}...", config.data_path.display());
    let target = SqliteStore::open(&config.data_path, config.busy_timeout())
        .with_context(|| format!("Failed to open database {}", config.data_path.display()))?;
    println!("✓ Database initialized with WAL mode");

    println!("\n💾 Copying collections...");
    let counts = copy_collections(&source, &target).context("Import failed")?;
    for (collection, rows) in &counts {
        println!("✓ {:<9} {} row(s)", collection.name(), rows);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Import complete");
    Ok(())
}
