//! Transactions: record locks and undo-based rollback.
//!
//! The [`TxManager`] hands out [`Transaction`]s and owns the shared lock
//! table. Locking is per record (table id + RID) with shared/exclusive
//! modes and a no-wait policy: a conflicting acquisition fails immediately
//! instead of blocking, so lock waits can never form a cycle. Locks are
//! held until commit or rollback, never released early by operators.
//!
//! Rollback is undo-based: every heap mutation appends a compensating
//! entry; rolling back replays the log in reverse, restoring records into
//! their original slots and repairing index entries. A savepoint (the undo
//! length at statement start) gives statement-level atomicity inside a
//! multi-statement transaction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::datum::Value;
use crate::heap::{HeapError, Rid, TableStore};

/// Errors from transaction operations.
#[derive(Debug)]
pub enum TxError {
    /// A conflicting lock is held by another live transaction.
    ///
    /// Under the no-wait policy this is how deadlocks surface: the losing
    /// statement aborts instead of waiting.
    LockConflict { table_id: u32, rid: Rid },

    /// The transaction has already committed or rolled back.
    Inactive,

    /// Undo replay hit a storage error.
    Undo(HeapError),
}

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxError::LockConflict { table_id, rid } => write!(
                f,
                "lock conflict on table {} record {}; statement aborted",
                table_id, rid
            ),
            TxError::Inactive => write!(f, "transaction is no longer active"),
            TxError::Undo(e) => write!(f, "rollback failed: {}", e),
        }
    }
}

impl std::error::Error for TxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TxError::Undo(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HeapError> for TxError {
    fn from(e: HeapError) -> Self {
        TxError::Undo(e)
    }
}

/// Lock mode for a record lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Shared (read) lock.
    Shared,
    /// Exclusive (write) lock.
    Exclusive,
}

#[derive(Default)]
struct LockEntry {
    exclusive: Option<u64>,
    shared: HashSet<u64>,
}

#[derive(Default)]
struct LockTable {
    entries: HashMap<(u32, Rid), LockEntry>,
    held: HashMap<u64, HashSet<(u32, Rid)>>,
}

impl LockTable {
    fn acquire(&mut self, txid: u64, key: (u32, Rid), mode: LockMode) -> Result<(), TxError> {
        let entry = self.entries.entry(key).or_default();
        match mode {
            LockMode::Shared => {
                if entry.exclusive.is_some_and(|holder| holder != txid) {
                    return Err(TxError::LockConflict {
                        table_id: key.0,
                        rid: key.1,
                    });
                }
                entry.shared.insert(txid);
            }
            LockMode::Exclusive => {
                if entry.exclusive.is_some_and(|holder| holder != txid)
                    || entry.shared.iter().any(|holder| *holder != txid)
                {
                    return Err(TxError::LockConflict {
                        table_id: key.0,
                        rid: key.1,
                    });
                }
                entry.exclusive = Some(txid);
            }
        }
        self.held.entry(txid).or_default().insert(key);
        Ok(())
    }

    fn release_all(&mut self, txid: u64) {
        let Some(keys) = self.held.remove(&txid) else {
            return;
        };
        for key in keys {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.shared.remove(&txid);
                if entry.exclusive == Some(txid) {
                    entry.exclusive = None;
                }
                if entry.exclusive.is_none() && entry.shared.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

/// The transaction manager: id allocation and the shared lock table.
pub struct TxManager {
    locks: Mutex<LockTable>,
    next_txid: Mutex<u64>,
}

impl TxManager {
    /// Creates a manager with an empty lock table.
    pub fn new() -> Arc<Self> {
        Arc::new(TxManager {
            locks: Mutex::new(LockTable::default()),
            next_txid: Mutex::new(1),
        })
    }

    /// Begins a new transaction.
    pub fn begin(self: &Arc<Self>) -> Arc<Transaction> {
        let id = {
            let mut next = self.next_txid.lock();
            let id = *next;
            *next += 1;
            id
        };
        Arc::new(Transaction {
            id,
            manager: Arc::clone(self),
            inner: Mutex::new(TxInner {
                undo: Vec::new(),
                finished: false,
            }),
        })
    }
}

/// One logged heap mutation, stored with enough state to compensate it.
enum UndoOp {
    Insert {
        table_id: u32,
        table_name: String,
        rid: Rid,
        values: Vec<Value>,
    },
    Update {
        table_id: u32,
        table_name: String,
        rid: Rid,
        old: Vec<Value>,
        new: Vec<Value>,
    },
    Delete {
        table_id: u32,
        table_name: String,
        rid: Rid,
        old: Vec<Value>,
    },
}

struct TxInner {
    undo: Vec<UndoOp>,
    finished: bool,
}

/// An active transaction.
///
/// Mutating operators log each change here before or after applying it to
/// the heap; the driver calls [`commit`](Transaction::commit) or
/// [`rollback`](Transaction::rollback) exactly once.
pub struct Transaction {
    id: u64,
    manager: Arc<TxManager>,
    inner: Mutex<TxInner>,
}

impl Transaction {
    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Acquires a shared lock on a record (no-wait).
    pub fn lock_shared(&self, table_id: u32, rid: Rid) -> Result<(), TxError> {
        self.manager
            .locks
            .lock()
            .acquire(self.id, (table_id, rid), LockMode::Shared)
    }

    /// Acquires an exclusive lock on a record (no-wait).
    pub fn lock_exclusive(&self, table_id: u32, rid: Rid) -> Result<(), TxError> {
        self.manager
            .locks
            .lock()
            .acquire(self.id, (table_id, rid), LockMode::Exclusive)
    }

    /// Logs an applied insert.
    pub fn log_insert(&self, table_id: u32, table_name: &str, rid: Rid, values: Vec<Value>) {
        self.inner.lock().undo.push(UndoOp::Insert {
            table_id,
            table_name: table_name.to_string(),
            rid,
            values,
        });
    }

    /// Logs an applied update.
    pub fn log_update(
        &self,
        table_id: u32,
        table_name: &str,
        rid: Rid,
        old: Vec<Value>,
        new: Vec<Value>,
    ) {
        self.inner.lock().undo.push(UndoOp::Update {
            table_id,
            table_name: table_name.to_string(),
            rid,
            old,
            new,
        });
    }

    /// Logs an applied delete.
    pub fn log_delete(&self, table_id: u32, table_name: &str, rid: Rid, old: Vec<Value>) {
        self.inner.lock().undo.push(UndoOp::Delete {
            table_id,
            table_name: table_name.to_string(),
            rid,
            old,
        });
    }

    /// Returns the current undo position, for statement-level rollback.
    pub fn savepoint(&self) -> usize {
        self.inner.lock().undo.len()
    }

    /// Undoes every change logged after `savepoint`, most recent first.
    ///
    /// Locks stay held; only the data changes are compensated.
    pub fn rollback_to(&self, savepoint: usize, store: &TableStore) -> Result<(), TxError> {
        let mut inner = self.inner.lock();
        if inner.finished {
            return Err(TxError::Inactive);
        }
        while inner.undo.len() > savepoint {
            let op = inner.undo.pop().expect("length checked above");
            apply_undo(op, store)?;
        }
        Ok(())
    }

    /// Commits: discards the undo log and releases all locks.
    pub fn commit(&self) -> Result<(), TxError> {
        let mut inner = self.inner.lock();
        if inner.finished {
            return Err(TxError::Inactive);
        }
        inner.finished = true;
        inner.undo.clear();
        self.manager.locks.lock().release_all(self.id);
        Ok(())
    }

    /// Rolls back every logged change and releases all locks.
    pub fn rollback(&self, store: &TableStore) -> Result<(), TxError> {
        let mut inner = self.inner.lock();
        if inner.finished {
            return Err(TxError::Inactive);
        }
        inner.finished = true;
        while let Some(op) = inner.undo.pop() {
            apply_undo(op, store)?;
        }
        self.manager.locks.lock().release_all(self.id);
        Ok(())
    }
}

fn apply_undo(op: UndoOp, store: &TableStore) -> Result<(), TxError> {
    match op {
        UndoOp::Insert {
            table_id,
            table_name,
            rid,
            values,
        } => {
            let table = store.table(table_id)?;
            table.delete(rid)?;
            for index in store.indexes_on(&table_name) {
                index.remove(&values[index.field_index()], rid);
            }
        }
        UndoOp::Update {
            table_id,
            table_name,
            rid,
            old,
            new,
        } => {
            let table = store.table(table_id)?;
            table.update(rid, &old)?;
            for index in store.indexes_on(&table_name) {
                index.remove(&new[index.field_index()], rid);
                index.insert(&old[index.field_index()], rid)?;
            }
        }
        UndoOp::Delete {
            table_id,
            table_name,
            rid,
            old,
        } => {
            let table = store.table(table_id)?;
            table.restore(rid, &old)?;
            for index in store.indexes_on(&table_name) {
                index.insert(&old[index.field_index()], rid)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSpec, TableMeta};
    use crate::datum::Type;

    fn setup() -> (TableStore, Arc<crate::heap::HeapTable>, Arc<TxManager>) {
        let store = TableStore::new();
        let meta = Arc::new(
            TableMeta::build(
                "t",
                1,
                &[ColumnSpec {
                    name: "a".into(),
                    ty: Type::Int,
                    len: 0,
                    nullable: false,
                }],
            )
            .unwrap(),
        );
        let table = store.register_table(meta);
        (store, table, TxManager::new())
    }

    #[test]
    fn test_shared_locks_coexist() {
        let (_, _, mgr) = setup();
        let t1 = mgr.begin();
        let t2 = mgr.begin();
        let rid = Rid { page: 0, slot: 0 };
        t1.lock_shared(1, rid).unwrap();
        t2.lock_shared(1, rid).unwrap();
    }

    #[test]
    fn test_exclusive_conflicts() {
        let (store, _, mgr) = setup();
        let t1 = mgr.begin();
        let t2 = mgr.begin();
        let rid = Rid { page: 0, slot: 0 };
        t1.lock_exclusive(1, rid).unwrap();
        assert!(matches!(
            t2.lock_shared(1, rid).unwrap_err(),
            TxError::LockConflict { .. }
        ));
        assert!(matches!(
            t2.lock_exclusive(1, rid).unwrap_err(),
            TxError::LockConflict { .. }
        ));

        // Conflict clears once the holder commits.
        t1.commit().unwrap();
        t2.lock_exclusive(1, rid).unwrap();
        t2.rollback(&store).unwrap();
    }

    #[test]
    fn test_lock_upgrade_when_sole_reader() {
        let (_, _, mgr) = setup();
        let t1 = mgr.begin();
        let rid = Rid { page: 0, slot: 0 };
        t1.lock_shared(1, rid).unwrap();
        t1.lock_exclusive(1, rid).unwrap();
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let (_, _, mgr) = setup();
        let t1 = mgr.begin();
        let t2 = mgr.begin();
        let rid = Rid { page: 0, slot: 0 };
        t1.lock_shared(1, rid).unwrap();
        t2.lock_shared(1, rid).unwrap();
        assert!(matches!(
            t1.lock_exclusive(1, rid).unwrap_err(),
            TxError::LockConflict { .. }
        ));
    }

    #[test]
    fn test_rollback_undoes_insert() {
        let (store, table, mgr) = setup();
        let tx = mgr.begin();
        let rid = table.insert(&[Value::Int(1)]).unwrap();
        tx.log_insert(1, "t", rid, vec![Value::Int(1)]);
        tx.rollback(&store).unwrap();
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_rollback_undoes_update_and_delete() {
        let (store, table, mgr) = setup();
        let rid = table.insert(&[Value::Int(1)]).unwrap();

        let tx = mgr.begin();
        let old = table.update(rid, &[Value::Int(2)]).unwrap();
        tx.log_update(1, "t", rid, old, vec![Value::Int(2)]);
        let old = table.delete(rid).unwrap();
        tx.log_delete(1, "t", rid, old);
        tx.rollback(&store).unwrap();

        assert_eq!(table.get(rid).unwrap(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_statement_savepoint() {
        let (store, table, mgr) = setup();
        let tx = mgr.begin();

        let rid1 = table.insert(&[Value::Int(1)]).unwrap();
        tx.log_insert(1, "t", rid1, vec![Value::Int(1)]);

        let sp = tx.savepoint();
        let rid2 = table.insert(&[Value::Int(2)]).unwrap();
        tx.log_insert(1, "t", rid2, vec![Value::Int(2)]);

        // Second statement fails: only its changes are undone.
        tx.rollback_to(sp, &store).unwrap();
        assert_eq!(table.len(), 1);

        tx.commit().unwrap();
        assert_eq!(table.get(rid1).unwrap(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_finished_transaction_rejected() {
        let (store, _, mgr) = setup();
        let tx = mgr.begin();
        tx.commit().unwrap();
        assert!(matches!(tx.commit().unwrap_err(), TxError::Inactive));
        assert!(matches!(tx.rollback(&store).unwrap_err(), TxError::Inactive));
    }
}
