//! Execution context threaded through operator trees.
//!
//! [`ExecContext`] bundles everything an operator needs at runtime: the
//! catalog, the table store, and the active transaction, all behind `Arc`s
//! so each node can own a clone. It also carries the outer-row scope for
//! correlated subqueries: when a subquery is re-executed for an outer
//! tuple, that tuple is materialized and pushed here, and bound
//! outer-field references resolve as indexed lookups into the stack.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::heap::TableStore;
use crate::tx::Transaction;

use super::tuple::Tuple;

/// Execution context for one statement.
#[derive(Clone)]
pub struct ExecContext {
    /// Schema catalog.
    pub catalog: Arc<Catalog>,
    /// Live heap tables and indexes.
    pub store: Arc<TableStore>,
    /// The statement's transaction.
    pub tx: Arc<Transaction>,
    /// Current rows of enclosing queries, outermost first.
    pub outer: Vec<Arc<Tuple>>,
}

impl ExecContext {
    /// Creates a context with an empty outer scope.
    pub fn new(catalog: Arc<Catalog>, store: Arc<TableStore>, tx: Arc<Transaction>) -> Self {
        ExecContext {
            catalog,
            store,
            tx,
            outer: Vec::new(),
        }
    }

    /// Returns a child context with `row` pushed as the innermost outer
    /// scope, for executing a correlated subquery against it.
    pub fn with_outer(&self, row: Arc<Tuple>) -> ExecContext {
        let mut child = self.clone();
        child.outer.push(row);
        child
    }
}
