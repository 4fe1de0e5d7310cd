//! The embedded database and its statement driver.
//!
//! [`Database`] owns the catalog, the table store, and the transaction
//! manager. A [`Session`] holds per-client state (an open transaction and
//! session variables) and drives statements end to end: parse, plan,
//! execute, and collapse errors into one user-facing type.
//!
//! Execution is auto-commit by default: each statement runs in its own
//! transaction. After BEGIN, statements share the session transaction; a
//! failing statement is undone to its savepoint and the transaction is
//! marked aborted until ROLLBACK (or COMMIT, which then rolls back).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::catalog::Catalog;
use crate::datum::Value;
use crate::executor::{
    execute_dml, explain_plan, ExecContext, ExecutorError, Plan, Planner, QueryNode,
};
use crate::heap::TableStore;
use crate::sql::{Parser, Statement, SyntaxError};
use crate::tx::{Transaction, TxManager};

/// Errors surfaced to the user of a session.
#[derive(Debug)]
pub enum DatabaseError {
    /// The statement did not parse.
    Syntax(SyntaxError),
    /// Binding or execution failed.
    Execute(ExecutorError),
    /// The session transaction failed earlier; only ROLLBACK (or COMMIT)
    /// is accepted.
    TransactionAborted,
    /// COMMIT/ROLLBACK without a transaction in progress.
    NoActiveTransaction,
    /// BEGIN while a transaction is already in progress.
    AlreadyInTransaction,
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseError::Syntax(e) => write!(f, "syntax error: {}", e),
            DatabaseError::Execute(e) => write!(f, "{}", e),
            DatabaseError::TransactionAborted => {
                write!(
                    f,
                    "current transaction is aborted, commands ignored until ROLLBACK"
                )
            }
            DatabaseError::NoActiveTransaction => {
                write!(f, "there is no transaction in progress")
            }
            DatabaseError::AlreadyInTransaction => {
                write!(f, "there is already a transaction in progress")
            }
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Syntax(e) => Some(e),
            DatabaseError::Execute(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyntaxError> for DatabaseError {
    fn from(e: SyntaxError) -> Self {
        DatabaseError::Syntax(e)
    }
}

impl From<ExecutorError> for DatabaseError {
    fn from(e: ExecutorError) -> Self {
        DatabaseError::Execute(e)
    }
}

impl From<crate::catalog::CatalogError> for DatabaseError {
    fn from(e: crate::catalog::CatalogError) -> Self {
        DatabaseError::Execute(ExecutorError::Catalog(e))
    }
}

impl From<crate::heap::HeapError> for DatabaseError {
    fn from(e: crate::heap::HeapError) -> Self {
        DatabaseError::Execute(ExecutorError::Heap(e))
    }
}

impl From<crate::tx::TxError> for DatabaseError {
    fn from(e: crate::tx::TxError) -> Self {
        DatabaseError::Execute(ExecutorError::Tx(e))
    }
}

/// A set of result rows with column headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    /// Column headers.
    pub columns: Vec<String>,
    /// Rows in output order.
    pub rows: Vec<Vec<Value>>,
}

/// Result of executing one SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Command completed without producing rows (DDL, DML, transaction
    /// control). The tag summarizes what happened, e.g. `INSERT 2`.
    Command {
        /// Completion tag.
        tag: String,
    },
    /// Query produced rows (SELECT, CALC, EXPLAIN, SHOW, DESC).
    Rows(RowSet),
}

impl QueryResult {
    /// Returns the row set, if this result carries rows.
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Command { .. } => None,
        }
    }
}

/// The embedded database.
pub struct Database {
    catalog: Arc<Catalog>,
    store: Arc<TableStore>,
    tx_manager: Arc<TxManager>,
}

impl Database {
    /// Creates an empty database.
    pub fn new() -> Arc<Database> {
        Arc::new(Database {
            catalog: Arc::new(Catalog::new()),
            store: Arc::new(TableStore::new()),
            tx_manager: TxManager::new(),
        })
    }

    /// Opens a new session.
    pub fn session(self: &Arc<Self>) -> Session {
        Session {
            database: Arc::clone(self),
            transaction: None,
            failed: false,
            variables: HashMap::new(),
        }
    }

    /// Executes one statement in a throwaway auto-commit session.
    pub fn execute(self: &Arc<Self>, sql: &str) -> Result<QueryResult, DatabaseError> {
        self.session().execute(sql)
    }

    /// Returns the schema catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}

/// A client session: transaction state plus session variables.
pub struct Session {
    database: Arc<Database>,
    transaction: Option<Arc<Transaction>>,
    failed: bool,
    variables: HashMap<String, Value>,
}

impl Session {
    /// Executes one SQL statement and returns its result.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult, DatabaseError> {
        debug!(sql, "executing statement");
        let Some(stmt) = Parser::new(sql).parse()? else {
            return Ok(QueryResult::Command { tag: String::new() });
        };

        // An aborted transaction only accepts being closed.
        if self.failed && !matches!(stmt, Statement::Commit | Statement::Rollback) {
            return Err(DatabaseError::TransactionAborted);
        }

        let plan = Planner::new(self.database.catalog.clone()).plan(&stmt)?;

        match plan {
            Plan::Begin => {
                if self.transaction.is_some() {
                    return Err(DatabaseError::AlreadyInTransaction);
                }
                self.transaction = Some(self.database.tx_manager.begin());
                self.failed = false;
                Ok(QueryResult::Command {
                    tag: "BEGIN".to_string(),
                })
            }
            Plan::Commit => {
                let tx = self
                    .transaction
                    .take()
                    .ok_or(DatabaseError::NoActiveTransaction)?;
                if self.failed {
                    // A failed transaction has nothing left to commit.
                    self.failed = false;
                    tx.rollback(&self.database.store)?;
                    Ok(QueryResult::Command {
                        tag: "ROLLBACK".to_string(),
                    })
                } else {
                    tx.commit()?;
                    Ok(QueryResult::Command {
                        tag: "COMMIT".to_string(),
                    })
                }
            }
            Plan::Rollback => {
                let tx = self
                    .transaction
                    .take()
                    .ok_or(DatabaseError::NoActiveTransaction)?;
                self.failed = false;
                tx.rollback(&self.database.store)?;
                Ok(QueryResult::Command {
                    tag: "ROLLBACK".to_string(),
                })
            }
            plan => {
                let (tx, auto_commit) = match &self.transaction {
                    Some(tx) => (Arc::clone(tx), false),
                    None => (self.database.tx_manager.begin(), true),
                };
                let savepoint = tx.savepoint();

                match self.run_plan(plan, &tx) {
                    Ok(result) => {
                        if auto_commit {
                            tx.commit()?;
                        }
                        Ok(result)
                    }
                    Err(e) => {
                        if auto_commit {
                            let _ = tx.rollback(&self.database.store);
                        } else {
                            let _ = tx.rollback_to(savepoint, &self.database.store);
                            self.failed = true;
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Returns a session variable set with SET.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn run_plan(
        &mut self,
        plan: Plan,
        tx: &Arc<Transaction>,
    ) -> Result<QueryResult, DatabaseError> {
        let db = &self.database;
        let ctx = ExecContext::new(db.catalog.clone(), db.store.clone(), Arc::clone(tx));

        match plan {
            Plan::Query(query) => {
                let columns: Vec<String> =
                    query.columns().iter().map(|c| c.header()).collect();
                let mut node = QueryNode::build(&query, &ctx);
                let mut rows = Vec::new();
                while let Some(tuple) = node.next()? {
                    rows.push(tuple.cells());
                }
                Ok(QueryResult::Rows(RowSet { columns, rows }))
            }

            Plan::Dml(dml) => {
                let result = execute_dml(dml, &ctx)?;
                Ok(QueryResult::Command {
                    tag: result.command_tag(),
                })
            }

            Plan::CreateTable { name, columns } => {
                let meta = db.catalog.create_table(&name, &columns)?;
                db.store.register_table(meta);
                Ok(QueryResult::Command {
                    tag: "CREATE TABLE".to_string(),
                })
            }

            Plan::DropTable { name } => {
                let meta = db.catalog.drop_table(&name)?;
                db.store.drop_table(&meta);
                Ok(QueryResult::Command {
                    tag: "DROP TABLE".to_string(),
                })
            }

            Plan::CreateIndex { index } => {
                let meta = db.catalog.table(&index.table)?;
                let field_index = meta.field_index(&index.field).ok_or_else(|| {
                    ExecutorError::FieldNotFound {
                        name: index.field.clone(),
                    }
                })?;
                let heap = db.store.table(meta.id)?;
                let registered = db.catalog.create_index(index)?;
                match db.store.register_index(registered.clone(), &heap, field_index) {
                    Ok(_) => Ok(QueryResult::Command {
                        tag: "CREATE INDEX".to_string(),
                    }),
                    Err(e) => {
                        // The build failed (e.g. unique violation over
                        // existing rows); keep catalog and store aligned.
                        let _ = db.catalog.drop_index(&registered.name);
                        Err(e.into())
                    }
                }
            }

            Plan::DropIndex { name } => {
                db.catalog.drop_index(&name)?;
                db.store.drop_index(&name)?;
                Ok(QueryResult::Command {
                    tag: "DROP INDEX".to_string(),
                })
            }

            Plan::ShowTables => {
                let rows = db
                    .catalog
                    .table_names()
                    .into_iter()
                    .map(|name| vec![Value::Chars(name)])
                    .collect();
                Ok(QueryResult::Rows(RowSet {
                    columns: vec!["table".to_string()],
                    rows,
                }))
            }

            Plan::DescTable { name } => {
                let meta = db.catalog.table(&name)?;
                let rows = meta
                    .fields
                    .iter()
                    .map(|field| {
                        let ty = match field.ty {
                            crate::datum::Type::Chars => format!("CHAR({})", field.len),
                            other => other.display_name().to_string(),
                        };
                        vec![
                            Value::Chars(field.name.clone()),
                            Value::Chars(ty),
                            Value::Chars(if field.nullable { "YES" } else { "NO" }.to_string()),
                        ]
                    })
                    .collect();
                Ok(QueryResult::Rows(RowSet {
                    columns: vec![
                        "field".to_string(),
                        "type".to_string(),
                        "nullable".to_string(),
                    ],
                    rows,
                }))
            }

            Plan::SetVariable { name, value } => {
                self.variables.insert(name, value);
                Ok(QueryResult::Command {
                    tag: "SET".to_string(),
                })
            }

            Plan::Explain(inner) => {
                let rows = explain_plan(&inner)
                    .lines()
                    .map(|line| vec![Value::Chars(line.to_string())])
                    .collect();
                Ok(QueryResult::Rows(RowSet {
                    columns: vec!["QUERY PLAN".to_string()],
                    rows,
                }))
            }

            Plan::Begin | Plan::Commit | Plan::Rollback => {
                unreachable!("transaction control handled by execute()")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(result: &QueryResult) -> &Vec<Vec<Value>> {
        &result.rows().expect("expected rows").rows
    }

    #[test]
    fn test_create_insert_select() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT, b CHAR(8))").unwrap();
        db.execute("INSERT INTO t VALUES (1,'x'), (2,'y')").unwrap();
        let result = db.execute("SELECT * FROM t").unwrap();
        assert_eq!(
            rows(&result),
            &vec![
                vec![Value::Int(1), Value::Chars("x".into())],
                vec![Value::Int(2), Value::Chars("y".into())],
            ]
        );
    }

    #[test]
    fn test_empty_statement() {
        let db = Database::new();
        assert_eq!(
            db.execute("  -- nothing here\n").unwrap(),
            QueryResult::Command { tag: String::new() }
        );
    }

    #[test]
    fn test_command_tags() {
        let db = Database::new();
        assert_eq!(
            db.execute("CREATE TABLE t(a INT)").unwrap(),
            QueryResult::Command {
                tag: "CREATE TABLE".into()
            }
        );
        assert_eq!(
            db.execute("INSERT INTO t VALUES (1), (2)").unwrap(),
            QueryResult::Command {
                tag: "INSERT 2".into()
            }
        );
        assert_eq!(
            db.execute("DELETE FROM t WHERE a = 1").unwrap(),
            QueryResult::Command {
                tag: "DELETE 1".into()
            }
        );
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();

        let mut session = db.session();
        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO t VALUES (1)").unwrap();
        session.execute("ROLLBACK").unwrap();
        assert!(rows(&db.execute("SELECT * FROM t").unwrap()).is_empty());

        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO t VALUES (2)").unwrap();
        session.execute("COMMIT").unwrap();
        assert_eq!(rows(&db.execute("SELECT * FROM t").unwrap()).len(), 1);
    }

    #[test]
    fn test_failed_transaction_is_latched() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        db.execute("CREATE UNIQUE INDEX t_a ON t(a)").unwrap();

        let mut session = db.session();
        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO t VALUES (1)").unwrap();
        // Runtime failure (unique violation) marks the transaction.
        assert!(session.execute("INSERT INTO t VALUES (1)").is_err());

        // Aborted: ordinary statements are refused until rollback.
        assert!(matches!(
            session.execute("SELECT * FROM t").unwrap_err(),
            DatabaseError::TransactionAborted
        ));
        session.execute("ROLLBACK").unwrap();
        assert!(rows(&db.execute("SELECT * FROM t").unwrap()).is_empty());
    }

    #[test]
    fn test_commit_of_failed_transaction_rolls_back() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        db.execute("CREATE UNIQUE INDEX t_a ON t(a)").unwrap();

        let mut session = db.session();
        session.execute("BEGIN").unwrap();
        session.execute("INSERT INTO t VALUES (1)").unwrap();
        assert!(session.execute("INSERT INTO t VALUES (1)").is_err());
        assert_eq!(
            session.execute("COMMIT").unwrap(),
            QueryResult::Command {
                tag: "ROLLBACK".into()
            }
        );
        assert!(rows(&db.execute("SELECT * FROM t").unwrap()).is_empty());
    }

    #[test]
    fn test_transaction_control_errors() {
        let db = Database::new();
        let mut session = db.session();
        assert!(matches!(
            session.execute("COMMIT").unwrap_err(),
            DatabaseError::NoActiveTransaction
        ));
        session.execute("BEGIN").unwrap();
        assert!(matches!(
            session.execute("BEGIN").unwrap_err(),
            DatabaseError::AlreadyInTransaction
        ));
        session.execute("ROLLBACK").unwrap();
    }

    #[test]
    fn test_multi_row_insert_is_atomic() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        db.execute("CREATE UNIQUE INDEX t_a ON t(a)").unwrap();
        // The second row collides with the first; nothing must remain.
        assert!(db.execute("INSERT INTO t VALUES (1), (1)").is_err());
        assert!(rows(&db.execute("SELECT * FROM t").unwrap()).is_empty());
    }

    #[test]
    fn test_show_and_desc() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT, b CHAR(8) NULLABLE)").unwrap();
        let result = db.execute("SHOW TABLES").unwrap();
        assert_eq!(rows(&result), &vec![vec![Value::Chars("t".into())]]);

        let result = db.execute("DESC t").unwrap();
        assert_eq!(
            rows(&result),
            &vec![
                vec![
                    Value::Chars("a".into()),
                    Value::Chars("INT".into()),
                    Value::Chars("NO".into())
                ],
                vec![
                    Value::Chars("b".into()),
                    Value::Chars("CHAR(8)".into()),
                    Value::Chars("YES".into())
                ],
            ]
        );
    }

    #[test]
    fn test_set_variable() {
        let db = Database::new();
        let mut session = db.session();
        session.execute("SET answer = 42").unwrap();
        assert_eq!(session.variable("answer"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_explain_returns_rows() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        let result = db.execute("EXPLAIN SELECT * FROM t").unwrap();
        let lines = rows(&result);
        assert!(!lines.is_empty());
        assert!(lines[0][0].to_text().starts_with("Projection"));
    }

    #[test]
    fn test_lock_conflict_between_sessions() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        db.execute("INSERT INTO t VALUES (1)").unwrap();

        let mut writer = db.session();
        writer.execute("BEGIN").unwrap();
        writer.execute("UPDATE t SET a = 2").unwrap();

        // Another session cannot read the locked record.
        let err = db.execute("SELECT * FROM t").unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Execute(ExecutorError::Tx(crate::tx::TxError::LockConflict { .. }))
        ));

        writer.execute("COMMIT").unwrap();
        assert_eq!(
            rows(&db.execute("SELECT * FROM t").unwrap()),
            &vec![vec![Value::Int(2)]]
        );
    }

    #[test]
    fn test_drop_table_removes_data() {
        let db = Database::new();
        db.execute("CREATE TABLE t(a INT)").unwrap();
        db.execute("DROP TABLE t").unwrap();
        assert!(db.execute("SELECT * FROM t").is_err());
        // Recreate under the same name works.
        db.execute("CREATE TABLE t(a INT)").unwrap();
    }
}
