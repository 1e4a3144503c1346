//! Initialize command.

use console::style;

use crawlgate::clock::system_clock;
use crawlgate::config::Settings;
use crawlgate::repository::init_database;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let db_path = settings.database_path();
    let applied = init_database(&db_path, system_clock().now_ms())?;

    for name in &applied {
        println!("  {} Applied migration: {}", style("✓").green(), name);
    }
    if applied.is_empty() {
        println!("  {} Schema already up to date", style("→").dim());
    }

    println!(
        "{} Initialized crawlgate in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database: {}", db_path.display());

    Ok(())
}
