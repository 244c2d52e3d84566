//! Stored procedure persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mssql_batch::{Parameter, ProcedureDefinition};
use mssql_types::{SqlValue, quote};

use crate::error::{EngineError, Result};
use crate::storage::StorageEngine;

/// System table holding procedure definitions.
pub const PROCEDURES_TABLE: &str = "__tds_procedures";

/// A stored procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    /// Row id in the procedures table.
    pub id: i64,
    /// Unique, case-insensitive name.
    pub name: String,
    /// Body text with `@name` placeholders.
    pub body: String,
    /// Formal parameters in declaration order.
    pub parameters: Vec<Parameter>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Procedure {
    /// Look up a formal parameter by name (with or without `@`).
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        let key = mssql_batch::normalize_name(name);
        self.parameters.iter().find(|p| p.key() == key)
    }
}

/// Procedure store on top of one database's storage engine.
///
/// Definitions live in [`PROCEDURES_TABLE`] inside the database itself, so
/// they survive restarts for file-backed databases. Concurrent create/drop
/// is serialized by the engine.
#[derive(Clone)]
pub struct ProcedureStore {
    engine: Arc<dyn StorageEngine>,
}

impl std::fmt::Debug for ProcedureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureStore").finish_non_exhaustive()
    }
}

impl ProcedureStore {
    /// Open the store, creating the system table if needed.
    pub fn open(engine: Arc<dyn StorageEngine>) -> Result<Self> {
        engine.exec(&format!(
            "CREATE TABLE IF NOT EXISTS {PROCEDURES_TABLE} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             name TEXT NOT NULL UNIQUE COLLATE NOCASE, \
             body TEXT NOT NULL, \
             parameters TEXT NOT NULL, \
             created_at TEXT NOT NULL)"
        ))?;
        Ok(Self { engine })
    }

    /// Persist a new procedure.
    pub fn create(&self, definition: &ProcedureDefinition) -> Result<Procedure> {
        if self.exists(&definition.name)? {
            return Err(EngineError::DuplicateProcedure(definition.name.clone()));
        }
        let parameters = serde_json::to_string(&definition.parameters).map_err(|e| {
            EngineError::CorruptProcedure {
                name: definition.name.clone(),
                reason: e.to_string(),
            }
        })?;
        self.insert(definition, &parameters)?;
        tracing::debug!(procedure = %definition.name, parameters = definition.parameters.len(), "procedure created");
        self.get(&definition.name)
    }

    /// The existence check in [`create`](Self::create) can lose a race with
    /// another session; the UNIQUE name column settles it.
    fn insert(&self, definition: &ProcedureDefinition, parameters: &str) -> Result<()> {
        let created_at = Utc::now();
        let inserted = self.engine.exec(&format!(
            "INSERT INTO {PROCEDURES_TABLE} (name, body, parameters, created_at) VALUES ({}, {}, {}, {})",
            quote(&definition.name),
            quote(&definition.body),
            quote(parameters),
            quote(&created_at.to_rfc3339()),
        ));
        match inserted {
            Ok(_) => Ok(()),
            Err(EngineError::UniqueViolation { .. }) => {
                Err(EngineError::DuplicateProcedure(definition.name.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Load a procedure by name.
    pub fn get(&self, name: &str) -> Result<Procedure> {
        let result = self.engine.query(&format!(
            "SELECT id, name, body, parameters, created_at FROM {PROCEDURES_TABLE} WHERE name = {}",
            quote(name)
        ))?;
        match result.rows.into_iter().next() {
            Some(row) => decode_row(row),
            None => Err(EngineError::ProcedureNotFound(name.to_owned())),
        }
    }

    /// All procedures, ordered by name.
    pub fn list(&self) -> Result<Vec<Procedure>> {
        let result = self.engine.query(&format!(
            "SELECT id, name, body, parameters, created_at FROM {PROCEDURES_TABLE} ORDER BY name"
        ))?;
        result.rows.into_iter().map(decode_row).collect()
    }

    /// Remove a procedure.
    pub fn drop(&self, name: &str) -> Result<()> {
        let removed = self.engine.exec(&format!(
            "DELETE FROM {PROCEDURES_TABLE} WHERE name = {}",
            quote(name)
        ))?;
        if removed == 0 {
            return Err(EngineError::ProcedureNotFound(name.to_owned()));
        }
        tracing::debug!(procedure = name, "procedure dropped");
        Ok(())
    }

    /// Whether a procedure exists.
    pub fn exists(&self, name: &str) -> Result<bool> {
        let result = self.engine.query(&format!(
            "SELECT COUNT(*) FROM {PROCEDURES_TABLE} WHERE name = {}",
            quote(name)
        ))?;
        Ok(result.scalar().and_then(SqlValue::as_i64).unwrap_or(0) > 0)
    }
}

fn decode_row(row: Vec<SqlValue>) -> Result<Procedure> {
    let mut values = row.into_iter();
    let mut next = || values.next().unwrap_or_default();
    let id = next().as_i64().unwrap_or_default();
    let name = next().to_text().unwrap_or_default();
    let body = next().to_text().unwrap_or_default();
    let parameters_json = next().to_text().unwrap_or_default();
    let created_at_text = next().to_text().unwrap_or_default();

    let corrupt = |reason: String| EngineError::CorruptProcedure {
        name: name.clone(),
        reason,
    };
    let parameters = serde_json::from_str(&parameters_json).map_err(|e| corrupt(e.to_string()))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map_err(|e| corrupt(e.to_string()))?
        .with_timezone(&Utc);

    Ok(Procedure {
        id,
        name,
        body,
        parameters,
        created_at,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteEngine;
    use mssql_batch::parse_create_procedure;

    fn store() -> ProcedureStore {
        ProcedureStore::open(Arc::new(SqliteEngine::in_memory().unwrap())).unwrap()
    }

    #[test]
    fn test_create_get_roundtrip() {
        let store = store();
        let def = parse_create_procedure(
            "CREATE PROCEDURE GetUser @id INT, @name NVARCHAR(50) = N'it''s' AS SELECT @id, @name",
        )
        .unwrap();
        let created = store.create(&def).unwrap();
        assert!(created.id > 0);

        let loaded = store.get("getuser").unwrap();
        assert_eq!(loaded.name, "GetUser");
        assert_eq!(loaded.body, def.body);
        assert_eq!(loaded.parameters, def.parameters);
        assert!(loaded.parameter("@NAME").unwrap().has_default);
    }

    #[test]
    fn test_duplicate_and_missing() {
        let store = store();
        let def = parse_create_procedure("CREATE PROC p AS SELECT 1").unwrap();
        store.create(&def).unwrap();
        assert!(matches!(store.create(&def), Err(EngineError::DuplicateProcedure(_))));
        assert!(matches!(store.get("q"), Err(EngineError::ProcedureNotFound(_))));
        assert!(matches!(store.drop("q"), Err(EngineError::ProcedureNotFound(_))));
    }

    #[test]
    fn test_insert_after_lost_race_is_duplicate() {
        let engine: Arc<dyn StorageEngine> = Arc::new(SqliteEngine::in_memory().unwrap());
        let first = ProcedureStore::open(engine.clone()).unwrap();
        let second = ProcedureStore::open(engine).unwrap();

        let original = parse_create_procedure("CREATE PROC p AS SELECT 1").unwrap();
        first.create(&original).unwrap();
        // The second session passed its existence check before the first inserted.
        let def = parse_create_procedure("CREATE PROC P AS SELECT 2").unwrap();
        let err = second.insert(&def, "[]").unwrap_err();
        assert!(matches!(err, EngineError::DuplicateProcedure(ref name) if name == "P"));
        assert_eq!(err.number(), 2714);
        assert_eq!(first.get("p").unwrap().body, original.body);
    }

    #[test]
    fn test_list_exists_drop() {
        let store = store();
        for sql in ["CREATE PROC b AS SELECT 2", "CREATE PROC a AS SELECT 1"] {
            store.create(&parse_create_procedure(sql).unwrap()).unwrap();
        }
        let names: Vec<_> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(store.exists("A").unwrap());
        store.drop("a").unwrap();
        assert!(!store.exists("a").unwrap());
    }
}
