//! Test fixture utilities.

/// A database with tables and procedures to set up before a test.
#[derive(Debug, Clone, Default)]
pub struct TestFixture {
    /// Database name.
    pub database: String,
    /// `CREATE TABLE` statements.
    pub tables: Vec<String>,
    /// `CREATE PROCEDURE` statements, one batch each.
    pub procedures: Vec<String>,
    /// Statements run after the tables exist.
    pub seed: Vec<String>,
}

impl TestFixture {
    /// Create a new test fixture.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Add a table definition.
    #[must_use]
    pub fn with_table(mut self, ddl: impl Into<String>) -> Self {
        self.tables.push(ddl.into());
        self
    }

    /// Add a procedure definition.
    #[must_use]
    pub fn with_procedure(mut self, ddl: impl Into<String>) -> Self {
        self.procedures.push(ddl.into());
        self
    }

    /// Add a data statement.
    #[must_use]
    pub fn with_seed(mut self, sql: impl Into<String>) -> Self {
        self.seed.push(sql.into());
        self
    }

    /// SQL to create the database.
    #[must_use]
    pub fn create_database_sql(&self) -> String {
        format!("CREATE DATABASE [{}]", self.database)
    }

    /// SQL to drop the database.
    #[must_use]
    pub fn drop_database_sql(&self) -> String {
        format!("DROP DATABASE [{}]", self.database)
    }

    /// SQL to switch to the database.
    #[must_use]
    pub fn use_sql(&self) -> String {
        format!("USE [{}]", self.database)
    }

    /// Batches to run, in order, once connected to the database.
    ///
    /// Procedure definitions take the whole batch, so each is its own entry.
    #[must_use]
    pub fn setup_batches(&self) -> Vec<String> {
        let mut batches = Vec::new();
        if !self.tables.is_empty() || !self.seed.is_empty() {
            let statements: Vec<&str> = self
                .tables
                .iter()
                .chain(&self.seed)
                .map(String::as_str)
                .collect();
            batches.push(statements.join(";\n"));
        }
        batches.extend(self.procedures.iter().cloned());
        batches
    }

    /// A small order-tracking schema with two procedures.
    #[must_use]
    pub fn orders(database: impl Into<String>) -> Self {
        Self::new(database)
            .with_table(
                "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT)",
            )
            .with_table(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL, total REAL)",
            )
            .with_seed(
                "INSERT INTO customers (id, name, city) VALUES (1, 'Ada', 'London'), (2, 'Linus', 'Helsinki'), (3, 'Grace', NULL)",
            )
            .with_seed(
                "INSERT INTO orders (id, customer_id, total) VALUES (1, 1, 10.5), (2, 1, 4.5), (3, 2, 99.0)",
            )
            .with_procedure(
                "CREATE PROCEDURE customer_orders @customer INT AS \
                 SELECT id, total FROM orders WHERE customer_id = @customer ORDER BY id",
            )
            .with_procedure(
                "CREATE PROCEDURE add_order @customer INT, @total FLOAT = 1.0 AS \
                 INSERT INTO orders (customer_id, total) VALUES (@customer, @total)",
            )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_database_sql() {
        let fixture = TestFixture::new("shop");
        assert_eq!(fixture.create_database_sql(), "CREATE DATABASE [shop]");
        assert_eq!(fixture.drop_database_sql(), "DROP DATABASE [shop]");
        assert_eq!(fixture.use_sql(), "USE [shop]");
        assert!(fixture.setup_batches().is_empty());
    }

    #[test]
    fn test_setup_batches_keep_procedures_separate() {
        let batches = TestFixture::orders("shop").setup_batches();
        assert_eq!(batches.len(), 3);
        assert!(batches[0].starts_with("CREATE TABLE customers"));
        assert!(batches[0].contains("INSERT INTO orders"));
        assert!(batches[1].starts_with("CREATE PROCEDURE customer_orders"));
        assert!(batches[2].starts_with("CREATE PROCEDURE add_order"));
    }
}
