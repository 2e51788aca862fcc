mod cli;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use cli::{Cli, Commands};
use receipt_insights::{
    compare_items, compare_transactions, delete_transaction, duplicate_groups, find_duplicates,
    format_change, format_period_label, get_all_transactions, get_duplicate_ids,
    get_merchant_mappings, get_previous_period, init_logging, insert_transactions, load_file,
    record_mapping_usage, save_merchant_mapping, setup_database, update_transaction,
    truncate, verify_count, Config, EnglishLabels, Granularity, MerchantMapping, MerchantMatcher,
    PeriodIdentifier,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env().with_db_path(cli.db.clone());

    match cli.command {
        Commands::Import { file, no_mappings } => run_import(&config, &file, no_mappings),
        Commands::List { limit } => run_list(&config, limit),
        Commands::Duplicates => run_duplicates(&config),
        Commands::Remove { id } => run_remove(&config, &id),
        Commands::Trends {
            granularity,
            year,
            month,
            quarter,
            week,
            items,
        } => {
            let today = Local::now().date_naive();
            let period = PeriodIdentifier::resolve(granularity, year, month, quarter, week, today);
            run_trends(&config, granularity, &period, items)
        }
        Commands::Match { merchant } => run_match(&config, &merchant),
        Commands::Learn {
            merchant,
            target,
            category,
        } => run_learn(&config, &merchant, &target, category.as_deref()),
        Commands::Ui => run_ui_mode(&config),
    }
}

fn open_database(config: &Config) -> Result<Connection> {
    config.ensure_db_dir()?;
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    setup_database(&conn)?;
    info!(path = %config.db_path.display(), "database ready");
    Ok(conn)
}

fn run_import(config: &Config, file: &Path, no_mappings: bool) -> Result<()> {
    println!("📥 Importing {}", file.display());

    let mut transactions = load_file(file)?;
    println!("✓ Loaded {} transactions", transactions.len());

    let conn = open_database(config)?;

    if !no_mappings {
        let matcher = MerchantMatcher::new(get_merchant_mappings(&conn)?);
        if !matcher.is_empty() {
            let mut applied = 0;
            for tx in transactions.iter_mut() {
                if let Some(mapping_id) = matcher.apply(tx) {
                    record_mapping_usage(&conn, &mapping_id)?;
                    applied += 1;
                }
            }
            println!("✓ Applied merchant mappings to {} transactions", applied);
        }
    }

    let inserted = insert_transactions(&conn, &transactions)?;
    let count = verify_count(&conn)?;
    println!(
        "✓ Inserted {} new, skipped {} already stored ({} total)",
        inserted,
        transactions.len() - inserted,
        count
    );

    let flagged = get_duplicate_ids(&get_all_transactions(&conn)?);
    if !flagged.is_empty() {
        println!(
            "⚠️  {} transactions look like double scans. Run `receipt-insights duplicates` to review.",
            flagged.len()
        );
    }

    Ok(())
}

fn run_list(config: &Config, limit: usize) -> Result<()> {
    let conn = open_database(config)?;
    let transactions = get_all_transactions(&conn)?;
    let flagged = get_duplicate_ids(&transactions);

    println!(
        "   {:<10} {:<5} {:<28} {:<18} {:>12}",
        "Date", "Time", "Merchant", "Category", "Total"
    );
    for tx in transactions.iter().take(limit) {
        let marker = match tx.id.as_deref() {
            Some(id) if flagged.contains(id) => "⚠ ",
            _ => "  ",
        };
        println!(
            "{} {:<10} {:<5} {:<28} {:<18} {:>12}",
            marker,
            tx.date,
            tx.time.as_deref().unwrap_or(""),
            truncate(tx.display_name(), 28),
            truncate(&tx.category, 18),
            tx.total
        );
    }

    println!(
        "\nShowing {} of {} transactions ({} flagged as possible duplicates)",
        transactions.len().min(limit),
        transactions.len(),
        flagged.len()
    );

    Ok(())
}

fn run_duplicates(config: &Config) -> Result<()> {
    let conn = open_database(config)?;
    let transactions = get_all_transactions(&conn)?;
    let map = find_duplicates(&transactions);
    let groups = duplicate_groups(&transactions);

    if groups.is_empty() {
        println!("✅ No duplicate receipts found");
        return Ok(());
    }

    println!("🔍 {} possible double scans\n", groups.len());
    for (n, group) in groups.iter().enumerate() {
        let first = group[0];
        println!(
            "{}. {} | {} | {} {}",
            n + 1,
            first.date,
            first.display_name(),
            first.total,
            first.currency.as_deref().unwrap_or("")
        );
        for tx in group {
            let id = tx.id.as_deref().unwrap_or("");
            let matches = map.get(id).map(|ids| ids.join(", ")).unwrap_or_default();
            println!(
                "   {} at {:<5} matches: {}",
                id,
                tx.time.as_deref().unwrap_or("--:--"),
                matches
            );
        }
    }

    Ok(())
}

fn run_remove(config: &Config, id: &str) -> Result<()> {
    let conn = open_database(config)?;
    if delete_transaction(&conn, id)? {
        println!("🗑️  Removed transaction {}", id);
    } else {
        println!("❌ No transaction with id {}", id);
    }
    Ok(())
}

fn run_trends(config: &Config, granularity: Granularity, period: &PeriodIdentifier, items: bool) -> Result<()> {
    let conn = open_database(config)?;
    let transactions = get_all_transactions(&conn)?;

    let previous = get_previous_period(period, granularity)?;
    let rows = if items {
        compare_items(&transactions, period, granularity)?
    } else {
        compare_transactions(&transactions, period, granularity)?
    };

    let en = EnglishLabels;
    println!(
        "📈 {} vs {}{}\n",
        format_period_label(period, granularity, &en),
        format_period_label(&previous, granularity, &en),
        if items { " (items)" } else { "" }
    );

    if rows.is_empty() {
        println!("No spending recorded in this period");
        return Ok(());
    }

    println!(
        "{:<24} {:>12} {:>12} {:>10} {:>6}",
        "Category", "Current", "Previous", "Change", "Count"
    );
    for row in &rows {
        println!(
            "{:<24} {:>12.0} {:>12.0} {:>10} {:>6}",
            truncate(&row.category, 24),
            row.value,
            row.previous_value,
            format_change(&row.change(), &en),
            row.count
        );
    }

    let total: f64 = rows.iter().map(|r| r.value).sum();
    println!("\nTotal: {:.0}", total);

    Ok(())
}

fn run_match(config: &Config, merchant: &str) -> Result<()> {
    let conn = open_database(config)?;
    let matcher = MerchantMatcher::new(get_merchant_mappings(&conn)?);

    match matcher.find_best(merchant) {
        Some(found) => println!(
            "✓ {} → {} [{}] (confidence {:.0}%)",
            merchant,
            found.mapping.target_merchant,
            found.mapping.target_category.as_deref().unwrap_or("-"),
            found.confidence * 100.0
        ),
        None => println!("No mapping matches {}", merchant),
    }

    Ok(())
}

fn run_learn(config: &Config, merchant: &str, target: &str, category: Option<&str>) -> Result<()> {
    let conn = open_database(config)?;

    let mapping = MerchantMapping::new(merchant, target, category);
    save_merchant_mapping(&conn, &mapping)?;
    println!("✓ Learned {} → {}", mapping.normalized_merchant, target);

    // Re-label stored receipts the new mapping covers
    let matcher = MerchantMatcher::new(vec![mapping]);
    let mut updated = 0;
    for mut tx in get_all_transactions(&conn)? {
        if matcher.apply(&mut tx).is_some() && update_transaction(&conn, &tx)? {
            updated += 1;
        }
    }
    println!("✓ Updated {} stored transactions", updated);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    use receipt_insights::ui;

    println!("🖥️  Loading Receipt Insights UI...\n");

    let conn = open_database(config)?;
    let transactions = get_all_transactions(&conn)?;
    println!("✓ Loaded {} transactions", transactions.len());

    let today = Local::now().date_naive();
    let mut app = ui::App::new(transactions, today);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin receipt-server --features server");
    std::process::exit(1);
}
