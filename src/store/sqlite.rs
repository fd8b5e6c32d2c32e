use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{PackageRecord, PackageStore, VersionRecord};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Initializing package database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        debug!("Database connection established");

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.create_schema()?;
        info!("Package database initialized successfully");

        Ok(store)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating database schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package_name TEXT NOT NULL UNIQUE,
                json_data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                package_id INTEGER NOT NULL,
                version TEXT NOT NULL,
                json_data TEXT NOT NULL,
                imported_at INTEGER NOT NULL,
                FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE CASCADE,
                UNIQUE(package_id, version)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_package_id ON versions(package_id)",
            [],
        )?;

        debug!("Database schema created successfully");
        Ok(())
    }
}

impl PackageStore for Store {
    fn load_package(&self, package_name: &str) -> Result<Option<PackageRecord>, StoreError> {
        let conn = self.lock_conn()?;

        let package: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, json_data FROM packages WHERE package_name = ?1",
                [package_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((package_id, json_data)) = package else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT version, json_data FROM versions WHERE package_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([package_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let versions = rows
            .into_iter()
            .map(|(version, json_data)| {
                let metadata: Value = serde_json::from_str(&json_data)?;
                Ok(VersionRecord::new(version, metadata))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let metadata: Value = serde_json::from_str(&json_data)?;
        Ok(Some(PackageRecord::new(package_name, metadata, versions)))
    }

    fn cached_versions(&self, package_name: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT v.version FROM versions v
            JOIN packages p ON v.package_id = p.id
            WHERE p.package_name = ?1
            ORDER BY v.id
            "#,
        )?;

        let versions = stmt
            .query_map([package_name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(versions)
    }

    fn save_version(
        &self,
        package_name: &str,
        package_metadata: &Value,
        version: &VersionRecord,
    ) -> Result<bool, StoreError> {
        debug!("Saving {}@{}", package_name, version.version());

        let package_json = serde_json::to_string(package_metadata)?;
        let version_json = serde_json::to_string(version.metadata())?;
        let now = Self::current_timestamp_ms();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO packages (package_name, json_data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(package_name) DO UPDATE SET
                json_data = excluded.json_data,
                updated_at = excluded.updated_at
            "#,
            (package_name, &package_json, now),
        )?;

        let package_id: i64 = tx.query_row(
            "SELECT id FROM packages WHERE package_name = ?1",
            [package_name],
            |row| row.get(0),
        )?;

        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO versions (package_id, version, json_data, imported_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            (package_id, version.version(), &version_json, now),
        )?;

        if inserted == 0 {
            debug!(
                "{}@{} already recorded, leaving store untouched",
                package_name,
                version.version()
            );
            return Ok(false);
        }

        tx.commit()?;
        Ok(true)
    }

    fn get_version(&self, package_name: &str, version: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.lock_conn()?;
        let json_data: Option<String> = conn
            .query_row(
                r#"
                SELECT v.json_data FROM versions v
                JOIN packages p ON v.package_id = p.id
                WHERE p.package_name = ?1 AND v.version = ?2
                "#,
                (package_name, version),
                |row| row.get(0),
            )
            .optional()?;

        json_data
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn list_packages(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT package_name FROM packages ORDER BY package_name")?;

        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(names)
    }
}
