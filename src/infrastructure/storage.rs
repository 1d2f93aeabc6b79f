use crate::infrastructure::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

pub fn initialize_database(path: &Path) -> Result<(), StoreError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
