// src/cache/schema.rs - Schema + migrations for the SQLite KV store

use rusqlite::{params, Connection};
use tracing::info;

/// A database migration with version, name, and SQL statements.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_entries",
    up: include_str!("migrations/001_kv_entries.up.sql"),
}];

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            "Applying migration {}: {}",
            migration.version, migration.name
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }
}
