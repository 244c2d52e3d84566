//! Database catalog: maps database names to SQLite engines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{EngineError, Result};
use crate::sqlite::SqliteEngine;
use crate::storage::StorageEngine;

/// The database that always exists.
pub const MASTER_DATABASE: &str = "master";

const DATABASE_EXTENSION: &str = "db";

#[allow(clippy::unwrap_used)]
static DATABASE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Database catalog.
///
/// With a data directory every database is a `<name>.db` file in it;
/// without one databases are in-memory and vanish with the process.
/// Engines are opened once and shared by all sessions. Names compare
/// case-insensitively.
#[derive(Debug)]
pub struct Catalog {
    data_dir: Option<PathBuf>,
    engines: RwLock<HashMap<String, Arc<SqliteEngine>>>,
}

impl Catalog {
    /// A catalog of in-memory databases containing only `master`.
    pub fn in_memory() -> Result<Self> {
        let catalog = Self {
            data_dir: None,
            engines: RwLock::new(HashMap::new()),
        };
        catalog.create_database(MASTER_DATABASE)?;
        Ok(catalog)
    }

    /// A catalog backed by files in `data_dir`, created if missing.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let catalog = Self {
            data_dir: Some(data_dir),
            engines: RwLock::new(HashMap::new()),
        };
        if !catalog.exists(MASTER_DATABASE) {
            catalog.create_database(MASTER_DATABASE)?;
        }
        tracing::info!(
            data_dir = %catalog.data_dir.as_deref().unwrap_or(Path::new("")).display(),
            "catalog opened"
        );
        Ok(catalog)
    }

    /// The data directory, if databases are file-backed.
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Whether a database exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        if self.engines.read().contains_key(&key) {
            return true;
        }
        self.file_path(&key).is_some_and(|path| path.is_file())
    }

    /// Create a database.
    pub fn create_database(&self, name: &str) -> Result<()> {
        let key = validate_name(name)?;
        let mut engines = self.engines.write();
        if engines.contains_key(&key) || self.file_path(&key).is_some_and(|p| p.is_file()) {
            return Err(EngineError::DatabaseExists(name.to_owned()));
        }
        let engine = match self.file_path(&key) {
            Some(path) => SqliteEngine::open(path)?,
            None => SqliteEngine::in_memory()?,
        };
        engines.insert(key, Arc::new(engine));
        tracing::info!(database = name, "database created");
        Ok(())
    }

    /// Drop a database. `master` cannot be dropped.
    pub fn drop_database(&self, name: &str) -> Result<()> {
        let key = validate_name(name)?;
        if key == MASTER_DATABASE {
            return Err(EngineError::CannotDropDatabase(name.to_owned()));
        }
        if !self.exists(&key) {
            return Err(EngineError::DatabaseNotFound(name.to_owned()));
        }
        self.engines.write().remove(&key);
        if let Some(path) = self.file_path(&key) {
            std::fs::remove_file(path)?;
        }
        tracing::info!(database = name, "database dropped");
        Ok(())
    }

    /// File backing a database, or `None` for in-memory catalogs.
    pub fn database_path(&self, name: &str) -> Result<Option<PathBuf>> {
        if !self.exists(name) {
            return Err(EngineError::DatabaseNotFound(name.to_owned()));
        }
        Ok(self.file_path(&name.to_ascii_lowercase()))
    }

    /// All database names, sorted.
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.engines.read().keys().cloned().collect();
        if let Some(dir) = &self.data_dir {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == DATABASE_EXTENSION) {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        let stem = stem.to_ascii_lowercase();
                        if DATABASE_NAME.is_match(&stem) && !names.contains(&stem) {
                            names.push(stem);
                        }
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// The engine of a database, opening it on first use.
    pub fn engine(&self, name: &str) -> Result<Arc<dyn StorageEngine>> {
        let key = name.to_ascii_lowercase();
        if let Some(engine) = self.engines.read().get(&key) {
            return Ok(engine.clone());
        }

        let path = self
            .file_path(&key)
            .filter(|p| p.is_file())
            .ok_or_else(|| EngineError::DatabaseNotFound(name.to_owned()))?;
        let mut engines = self.engines.write();
        let engine = match engines.get(&key) {
            Some(engine) => engine.clone(),
            None => {
                let engine = Arc::new(SqliteEngine::open(path)?);
                engines.insert(key, engine.clone());
                engine
            }
        };
        Ok(engine)
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{key}.{DATABASE_EXTENSION}")))
    }
}

fn validate_name(name: &str) -> Result<String> {
    if DATABASE_NAME.is_match(name) {
        Ok(name.to_ascii_lowercase())
    } else {
        Err(EngineError::InvalidDatabaseName(name.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tds-lite-catalog-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_in_memory_catalog() {
        let catalog = Catalog::in_memory().unwrap();
        assert!(catalog.exists("MASTER"));
        catalog.create_database("Sales").unwrap();
        assert!(matches!(
            catalog.create_database("sales"),
            Err(EngineError::DatabaseExists(_))
        ));
        assert_eq!(catalog.list_databases().unwrap(), vec!["master", "sales"]);
        assert_eq!(catalog.database_path("sales").unwrap(), None);

        let engine = catalog.engine("SALES").unwrap();
        engine.exec("CREATE TABLE t (id INTEGER)").unwrap();
        let again = catalog.engine("sales").unwrap();
        assert!(again.query("SELECT * FROM t").unwrap().rows.is_empty());

        catalog.drop_database("sales").unwrap();
        assert!(!catalog.exists("sales"));
        assert!(matches!(catalog.engine("sales"), Err(EngineError::DatabaseNotFound(_))));
    }

    #[test]
    fn test_name_validation_and_master() {
        let catalog = Catalog::in_memory().unwrap();
        assert!(matches!(
            catalog.create_database("bad name"),
            Err(EngineError::InvalidDatabaseName(_))
        ));
        assert!(matches!(
            catalog.create_database("../etc"),
            Err(EngineError::InvalidDatabaseName(_))
        ));
        assert!(matches!(
            catalog.drop_database("master"),
            Err(EngineError::CannotDropDatabase(_))
        ));
        assert!(matches!(
            catalog.drop_database("nope"),
            Err(EngineError::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_file_backed_catalog() {
        let dir = temp_dir("files");
        {
            let catalog = Catalog::open(&dir).unwrap();
            catalog.create_database("inventory").unwrap();
            let path = catalog.database_path("inventory").unwrap().unwrap();
            assert_eq!(path, dir.join("inventory.db"));
            catalog
                .engine("inventory")
                .unwrap()
                .exec("CREATE TABLE items (id INTEGER)")
                .unwrap();
        }

        let reopened = Catalog::open(&dir).unwrap();
        assert_eq!(reopened.list_databases().unwrap(), vec!["inventory", "master"]);
        let engine = reopened.engine("inventory").unwrap();
        assert!(engine.query("SELECT * FROM items").is_ok());

        reopened.drop_database("inventory").unwrap();
        assert!(!dir.join("inventory.db").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
