//! Local SQLite settings database.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations and the
//! category/key/value helpers over `local_settings` that back the template
//! store and the print configuration.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{PrintError, Result};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// In-memory database with migrations applied. Used by hosts that keep
    /// settings for the lifetime of the process only, and by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{app_data_dir}/pos-settings.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once.
pub fn init(app_data_dir: &Path) -> Result<DbState> {
    fs::create_dir_all(app_data_dir)?;

    let db_path = app_data_dir.join("pos-settings.db");
    info!("Opening settings database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Settings database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)?
        }
    };

    run_migrations(&conn)?;

    info!("Settings database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

fn open_and_configure(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Settings schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating settings database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// Migration v1: the category/key/value settings table.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );
        CREATE INDEX IF NOT EXISTS idx_local_settings_cat_key ON local_settings(setting_category, setting_key);

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        PrintError::from(e)
    })?;

    info!("Applied migration v1");
    Ok(())
}

/// Migration v2: seed the print category with the default staging timings so
/// the settings screen has rows to edit.
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        INSERT OR IGNORE INTO local_settings (setting_category, setting_key, setting_value)
            VALUES ('print', 'load_timeout_ms', '1000');
        INSERT OR IGNORE INTO local_settings (setting_category, setting_key, setting_value)
            VALUES ('print', 'hard_timeout_ms', '5000');
        INSERT OR IGNORE INTO local_settings (setting_category, setting_key, setting_value)
            VALUES ('print', 'cleanup_fallback_ms', '5000');

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        PrintError::from(e)
    })?;

    info!("Applied migration v2");
    Ok(())
}

/// Read a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// All settings of one category as a JSON object (`key -> value`).
pub fn get_category_settings(conn: &Connection, category: &str) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT setting_key, setting_value FROM local_settings
         WHERE setting_category = ?1 ORDER BY setting_key",
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("get_category_settings prepare: {e}");
            return serde_json::json!({});
        }
    };

    let rows = match stmt.query_map(params![category], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    }) {
        Ok(rows) => rows,
        Err(e) => {
            error!("get_category_settings query: {e}");
            return serde_json::json!({});
        }
    };

    let mut out = serde_json::Map::new();
    for row in rows {
        match row {
            Ok((key, value)) => {
                out.insert(key, serde_json::Value::String(value));
            }
            Err(e) => warn!("skipping malformed settings row: {e}"),
        }
    }
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .expect("pragma setup");
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_create_settings_table() {
        let conn = test_db();
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        assert!(tables.contains(&"local_settings".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).expect("first run");
        run_migrations(&conn).expect("second run");

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, CURRENT_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_v2_seeds_print_timings() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(
            get_setting(&conn, "print", "load_timeout_ms").as_deref(),
            Some("1000")
        );
        assert_eq!(
            get_setting(&conn, "print", "hard_timeout_ms").as_deref(),
            Some("5000")
        );
    }

    #[test]
    fn test_set_setting_upserts() {
        let conn = test_db();
        run_migrations(&conn).unwrap();

        set_setting(&conn, "templates", "invoice_template", "{}").unwrap();
        set_setting(&conn, "templates", "invoice_template", "{\"enabled\":true}").unwrap();

        assert_eq!(
            get_setting(&conn, "templates", "invoice_template").as_deref(),
            Some("{\"enabled\":true}")
        );
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM local_settings WHERE setting_category = 'templates'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_get_setting_missing_returns_none() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert!(get_setting(&conn, "templates", "nope").is_none());
    }

    #[test]
    fn test_get_category_settings() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        set_setting(&conn, "print", "backend", "browser").unwrap();

        let all = get_category_settings(&conn, "print");
        assert_eq!(all["backend"], "browser");
        assert_eq!(all["load_timeout_ms"], "1000");
        assert!(all.get("invoice_template").is_none());
    }

    #[test]
    fn test_init_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = init(dir.path()).expect("init");
        assert!(state.db_path.exists());
        let conn = state.conn.lock().unwrap();
        assert!(get_setting(&conn, "print", "cleanup_fallback_ms").is_some());
    }
}
