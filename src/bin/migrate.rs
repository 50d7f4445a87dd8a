use std::env;
use std::fs;
use std::path::Path;

use donation_tracker::db;

fn main() -> anyhow::Result<()> {
    // Load .env if it exists
    dotenvy::dotenv().ok();

    println!("Starting database migration...");

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "data/donations.db".to_string());
    if let Some(parent) = Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = rusqlite::Connection::open(&db_path)?;

    // MIGRATION_FILE overrides the embedded schema, e.g. in Docker where the
    // SQL ships at /app/migrations/init.sql.
    let sql = match env::var("MIGRATION_FILE") {
        Ok(path) => {
            println!("Applying migration file: {}", path);
            fs::read_to_string(path)?
        }
        Err(_) => db::SCHEMA.to_string(),
    };

    conn.execute_batch(&sql)
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    println!("Migration complete: {}", db_path);
    Ok(())
}
