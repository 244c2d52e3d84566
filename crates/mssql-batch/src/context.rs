//! Batch-scoped variable storage.

use std::collections::HashMap;

use mssql_types::{SqlType, SqlValue, format_value};

use crate::error::{BatchError, Result};

/// Canonical variable key: sigil stripped, upper-cased.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('@').to_uppercase()
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Upper-cased name without the `@` sigil.
    pub name: String,
    /// Declared type, including length or precision/scale.
    pub sql_type: SqlType,
    /// Current value, already coerced to `sql_type`.
    pub value: SqlValue,
}

impl Variable {
    /// Whether the variable currently holds NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// The value rendered as SQL text.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format_value(&self.value, &self.sql_type)
    }
}

/// Variables visible to one batch or one procedure invocation.
///
/// Names are case-insensitive. System variables (`@@ROWCOUNT`, ...) live in
/// a separate namespace maintained by the executor.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: HashMap<String, Variable>,
    system: HashMap<String, SqlValue>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable, optionally with an initial value.
    ///
    /// Without an initial value the variable starts out NULL.
    pub fn declare(&mut self, name: &str, sql_type: SqlType, initial: Option<SqlValue>) -> Result<()> {
        let key = normalize_name(name);
        if self.variables.contains_key(&key) {
            return Err(BatchError::DuplicateVariable(key));
        }
        let value = match initial {
            Some(v) => sql_type.coerce(v)?,
            None => SqlValue::Null,
        };
        tracing::trace!(name = %key, sql_type = %sql_type, "declare variable");
        self.variables.insert(
            key.clone(),
            Variable {
                name: key,
                sql_type,
                value,
            },
        );
        Ok(())
    }

    /// Look up a declared variable.
    pub fn get(&self, name: &str) -> Result<&Variable> {
        let key = normalize_name(name);
        self.variables
            .get(&key)
            .ok_or(BatchError::VariableNotDeclared(key))
    }

    /// Current value of a declared variable.
    pub fn value(&self, name: &str) -> Result<SqlValue> {
        self.get(name).map(|v| v.value.clone())
    }

    /// Assign a value, coercing it to the declared type.
    ///
    /// Assigning NULL keeps the variable declared.
    pub fn set(&mut self, name: &str, value: SqlValue) -> Result<()> {
        let key = normalize_name(name);
        let var = self
            .variables
            .get_mut(&key)
            .ok_or_else(|| BatchError::VariableNotDeclared(key.clone()))?;
        var.value = var.sql_type.coerce(value)?;
        Ok(())
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(&normalize_name(name))
    }

    /// Remove every variable.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.system.clear();
    }

    /// All variables, ordered by name.
    #[must_use]
    pub fn get_all(&self) -> Vec<&Variable> {
        let mut all: Vec<_> = self.variables.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of declared variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether no variable is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Set a system variable such as `@@ROWCOUNT`.
    pub fn set_system(&mut self, name: &str, value: SqlValue) {
        self.system
            .insert(name.trim_start_matches('@').to_uppercase(), value);
    }

    /// Read a system variable; unknown ones are NULL.
    #[must_use]
    pub fn system(&self, name: &str) -> SqlValue {
        self.system
            .get(&name.trim_start_matches('@').to_uppercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ty(s: &str) -> SqlType {
        SqlType::parse(s).unwrap()
    }

    #[test]
    fn test_declare_get_set() {
        let mut ctx = Context::new();
        ctx.declare("@Count", ty("INT"), None).unwrap();
        assert!(ctx.get("@count").unwrap().is_null());

        ctx.set("COUNT", SqlValue::from("41")).unwrap();
        assert_eq!(ctx.value("@count").unwrap(), SqlValue::Int(41));
        assert_eq!(ctx.get("@COUNT").unwrap().name, "COUNT");
    }

    #[test]
    fn test_duplicate_and_undeclared() {
        let mut ctx = Context::new();
        ctx.declare("@a", ty("INT"), Some(SqlValue::Int(1))).unwrap();
        assert_eq!(
            ctx.declare("@A", ty("VARCHAR(5)"), None),
            Err(BatchError::DuplicateVariable("A".into()))
        );
        assert_eq!(
            ctx.get("@b").unwrap_err(),
            BatchError::VariableNotDeclared("B".into())
        );
        assert_eq!(
            ctx.set("@b", SqlValue::Int(1)),
            Err(BatchError::VariableNotDeclared("B".into()))
        );
    }

    #[test]
    fn test_set_null_keeps_variable() {
        let mut ctx = Context::new();
        ctx.declare("@s", ty("VARCHAR(10)"), Some("x".into())).unwrap();
        ctx.set("@s", SqlValue::Null).unwrap();
        assert!(ctx.contains("@s"));
        assert!(ctx.get("@s").unwrap().is_null());
        assert_eq!(ctx.get("@s").unwrap().to_sql(), "NULL");
    }

    #[test]
    fn test_assignment_coerces() {
        let mut ctx = Context::new();
        ctx.declare("@s", ty("VARCHAR(3)"), Some("abcdef".into())).unwrap();
        assert_eq!(ctx.value("@s").unwrap(), SqlValue::from("abc"));
        assert!(ctx.declare("@n", ty("INT"), Some("abc".into())).is_err());
    }

    #[test]
    fn test_get_all_and_clear() {
        let mut ctx = Context::new();
        ctx.declare("@b", ty("INT"), None).unwrap();
        ctx.declare("@a", ty("INT"), None).unwrap();
        let names: Vec<_> = ctx.get_all().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);

        ctx.clear();
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_system_variables() {
        let mut ctx = Context::new();
        assert!(ctx.system("@@ROWCOUNT").is_null());
        ctx.set_system("@@rowcount", SqlValue::Int(3));
        assert_eq!(ctx.system("ROWCOUNT"), SqlValue::Int(3));
        assert!(!ctx.contains("@@ROWCOUNT"));
    }
}
