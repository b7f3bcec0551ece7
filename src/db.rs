use anyhow::{bail, Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::{self, Fixture, MapRecord};

/// Key-value store holding one JSON object per map key.
pub trait MapStore {
    /// All map keys, sorted.
    fn list_keys(&self) -> Result<Vec<String>>;

    fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Replace the whole value stored under `key`.
    fn write_whole(&mut self, key: &str, value: &Value) -> Result<()>;

    /// Set one field of the object under `key`, keeping every other field.
    fn write_field(&mut self, key: &str, field: &str, value: Value) -> Result<()>;

    /// Returns whether anything was removed.
    fn delete(&mut self, key: &str) -> Result<bool>;

    fn is_valid_key(&self, key: &str) -> bool {
        model::is_valid_key(key)
    }

    fn read_field(&self, key: &str, field: &str) -> Result<Option<Value>> {
        Ok(self.read(key)?.and_then(|v| v.get(field).cloned()))
    }

    fn load_map(&self, key: &str) -> Result<Option<MapRecord>> {
        self.read(key)?
            .map(|value| serde_json::from_value(value).with_context(|| format!("Malformed map record {}", key)))
            .transpose()
    }

    fn save_map(&mut self, key: &str, map: &MapRecord) -> Result<()> {
        self.write_whole(key, &serde_json::to_value(map)?)
    }

    /// Fixtures of a map, sorted by id. Unknown keys give an empty list.
    fn load_fixtures(&self, key: &str) -> Result<Vec<Fixture>> {
        let mut fixtures: Vec<Fixture> = match self.read_field(key, "fixtures")? {
            Some(value) => serde_json::from_value(value)
                .with_context(|| format!("Malformed fixture list in {}", key))?,
            None => Vec::new(),
        };
        fixtures.sort_by_key(|f| f.id);
        Ok(fixtures)
    }

    fn store_fixtures(&mut self, key: &str, fixtures: &[Fixture]) -> Result<()> {
        self.write_field(key, "fixtures", serde_json::to_value(fixtures)?)
    }

    /// Dump every map to a JSON object keyed by map key.
    fn export_to_json(&self) -> Result<String> {
        let mut all = BTreeMap::new();
        for key in self.list_keys()? {
            if let Some(value) = self.read(&key)? {
                all.insert(key, value);
            }
        }
        Ok(serde_json::to_string_pretty(&all)?)
    }

    /// Load maps from a backup made by [`MapStore::export_to_json`].
    ///
    /// In merge mode existing keys are kept and only new ones are added;
    /// otherwise the store is cleared first. Returns the number of maps written.
    fn import_from_json(&mut self, json: &str, merge: bool) -> Result<usize> {
        let incoming = parse_backup(json)?;

        if !merge {
            for key in self.list_keys()? {
                self.delete(&key)?;
            }
        }

        let mut written = 0;
        for (key, value) in incoming {
            if merge && self.read(&key)?.is_some() {
                continue;
            }
            self.write_whole(&key, &value)?;
            written += 1;
        }
        Ok(written)
    }
}

fn parse_backup(json: &str) -> Result<BTreeMap<String, Value>> {
    let incoming: BTreeMap<String, Value> = serde_json::from_str(json).context("Invalid JSON format")?;
    for (key, value) in &incoming {
        if !model::is_valid_key(key) {
            bail!("Invalid map key in backup: {}", key);
        }
        // Reject anything that isn't a map record before touching the store
        serde_json::from_value::<MapRecord>(value.clone())
            .with_context(|| format!("Invalid map record for {}", key))?;
    }
    Ok(incoming)
}

fn merge_field(current: Option<Value>, field: &str, value: Value) -> Value {
    let mut object = match current {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    };
    object.insert(field.to_string(), value);
    Value::Object(object)
}

/// SQLite-backed map store
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create a store at the specified path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn };
        store.init_schema()?;
        info!("[STORE] Opened map store at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self { conn: Connection::open_in_memory()? };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS maps (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1');
            "#,
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<u32> {
        let version: String = self.conn.query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        version.parse().context("Corrupt schema version")
    }

    fn ensure_key(&self, key: &str) -> Result<()> {
        if !self.is_valid_key(key) {
            bail!("Invalid map key: {}", key);
        }
        Ok(())
    }
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let text: Option<String> = conn
        .query_row("SELECT value FROM maps WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    text.map(|t| serde_json::from_str(&t).with_context(|| format!("Corrupt value stored under {}", key)))
        .transpose()
}

fn upsert_value(conn: &Connection, key: &str, value: &Value) -> Result<()> {
    conn.execute(
        "INSERT INTO maps (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

impl MapStore for SqliteStore {
    fn list_keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM maps ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys.into_iter().filter(|k| self.is_valid_key(k)).collect())
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        read_value(&self.conn, key)
    }

    fn write_whole(&mut self, key: &str, value: &Value) -> Result<()> {
        self.ensure_key(key)?;
        upsert_value(&self.conn, key, value)?;
        debug!("[STORE] Wrote {}", key);
        Ok(())
    }

    fn write_field(&mut self, key: &str, field: &str, value: Value) -> Result<()> {
        self.ensure_key(key)?;
        let tx = self.conn.transaction()?;
        let merged = merge_field(read_value(&tx, key)?, field, value);
        upsert_value(&tx, key, &merged)?;
        tx.commit()?;
        debug!("[STORE] Wrote {}.{}", key, field);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM maps WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    fn import_from_json(&mut self, json: &str, merge: bool) -> Result<usize> {
        let incoming = parse_backup(json)?;
        let tx = self.conn.transaction()?;

        if !merge {
            tx.execute("DELETE FROM maps", [])?;
        }

        let mut written = 0;
        for (key, value) in &incoming {
            if merge {
                let exists: bool = tx.query_row(
                    "SELECT COUNT(*) > 0 FROM maps WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )?;
                if exists {
                    continue;
                }
            }
            upsert_value(&tx, key, value)?;
            written += 1;
        }

        tx.commit()?;
        info!("[STORE] Imported {} map(s)", written);
        Ok(written)
    }
}

/// Store kept entirely in memory.
#[derive(Default, Debug, Clone)]
pub struct MemoryStore {
    maps: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MapStore for MemoryStore {
    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.maps.keys().filter(|k| self.is_valid_key(k)).cloned().collect())
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.maps.get(key).cloned())
    }

    fn write_whole(&mut self, key: &str, value: &Value) -> Result<()> {
        if !self.is_valid_key(key) {
            bail!("Invalid map key: {}", key);
        }
        self.maps.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn write_field(&mut self, key: &str, field: &str, value: Value) -> Result<()> {
        if !self.is_valid_key(key) {
            bail!("Invalid map key: {}", key);
        }
        let merged = merge_field(self.maps.remove(key), field, value);
        self.maps.insert(key.to_string(), merged);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.maps.remove(key).is_some())
    }
}
