//! Physical operators: the pull-based execution layer.
//!
//! [`QueryNode::build`] turns a [`QueryPlan`] into an operator tree;
//! no I/O happens during construction, so rebuilding a correlated
//! subquery's tree per outer row is cheap. Every node follows the same
//! contract: `next()` yields `Ok(Some(tuple))` per row, `Ok(None)` at end
//! of input (and keeps yielding it), and `Err` aborts the statement.
//!
//! DML runs through [`execute_dml`]: each plan drives an embedded scan
//! node and applies per-row effects through the transaction, which logs
//! undo entries and holds the record locks until commit or rollback.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::TableMeta;
use crate::datum::Value;
use crate::heap::{IndexRange, RecordScanner, Rid};

use super::aggregate::{Accumulator, AggregateOp, GroupKey, GroupTable};
use super::context::ExecContext;
use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::filter::FilterStmt;
use super::plan::{DmlPlan, QueryPlan, SortKey, SubqueryPlan, UpdateSource};
use super::tuple::Tuple;

/// A physical operator.
pub enum QueryNode {
    /// Sequential heap scan with an optional pushed-down predicate.
    TableScan(TableScanNode),
    /// Index point lookup plus record dereference.
    IndexScan(IndexScanNode),
    /// Row filter above a child.
    Filter(FilterNode),
    /// Nested-loop join with a materialized right side.
    NestedLoopJoin(JoinNode),
    /// Hash aggregation emitting groups in insertion order.
    Aggregate(AggregateNode),
    /// Full sort with stable ordering.
    Sort(SortNode),
    /// Expression projection.
    Projection(ProjectionNode),
    /// One-row expression evaluation without input.
    Calc(CalcNode),
}

impl QueryNode {
    /// Builds an operator tree from a plan. Performs no I/O.
    pub fn build(plan: &QueryPlan, ctx: &ExecContext) -> QueryNode {
        match plan {
            QueryPlan::TableScan {
                table, predicate, ..
            } => QueryNode::TableScan(TableScanNode {
                table: table.clone(),
                predicate: predicate.clone(),
                ctx: ctx.clone(),
                scanner: None,
                done: false,
            }),
            QueryPlan::IndexScan {
                table,
                index,
                key,
                predicate,
                ..
            } => QueryNode::IndexScan(IndexScanNode {
                table: table.clone(),
                index_name: index.name.clone(),
                key: key.clone(),
                predicate: predicate.clone(),
                ctx: ctx.clone(),
                rids: None,
            }),
            QueryPlan::Filter { input, predicate } => QueryNode::Filter(FilterNode {
                child: Box::new(QueryNode::build(input, ctx)),
                predicate: predicate.clone(),
                ctx: ctx.clone(),
            }),
            QueryPlan::NestedLoopJoin {
                left, right, on, ..
            } => QueryNode::NestedLoopJoin(JoinNode {
                left: Box::new(QueryNode::build(left, ctx)),
                right: Box::new(QueryNode::build(right, ctx)),
                on: on.clone(),
                ctx: ctx.clone(),
                right_rows: None,
                current_left: None,
                right_pos: 0,
            }),
            QueryPlan::Aggregate {
                input,
                group_exprs,
                aggregates,
                having,
                ..
            } => QueryNode::Aggregate(AggregateNode {
                child: Box::new(QueryNode::build(input, ctx)),
                group_exprs: group_exprs.clone(),
                aggregates: aggregates.clone(),
                having: having.clone(),
                ctx: ctx.clone(),
                output: None,
            }),
            QueryPlan::Sort { input, keys } => QueryNode::Sort(SortNode {
                child: Box::new(QueryNode::build(input, ctx)),
                keys: keys.clone(),
                ctx: ctx.clone(),
                output: None,
            }),
            QueryPlan::Projection { input, exprs, .. } => QueryNode::Projection(ProjectionNode {
                child: Box::new(QueryNode::build(input, ctx)),
                exprs: exprs.clone(),
                ctx: ctx.clone(),
            }),
            QueryPlan::Calc { exprs, .. } => QueryNode::Calc(CalcNode {
                exprs: exprs.clone(),
                ctx: ctx.clone(),
                done: false,
            }),
        }
    }

    /// Returns the next tuple, or `None` once the input is exhausted.
    ///
    /// After `None`, further calls keep returning `None`.
    pub fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        match self {
            QueryNode::TableScan(n) => n.next(),
            QueryNode::IndexScan(n) => n.next(),
            QueryNode::Filter(n) => n.next(),
            QueryNode::NestedLoopJoin(n) => n.next(),
            QueryNode::Aggregate(n) => n.next(),
            QueryNode::Sort(n) => n.next(),
            QueryNode::Projection(n) => n.next(),
            QueryNode::Calc(n) => n.next(),
        }
    }
}

/// Sequential scan over a table's live records.
///
/// Each emitted row is read under a shared record lock held by the
/// statement's transaction.
pub struct TableScanNode {
    table: Arc<TableMeta>,
    predicate: Option<FilterStmt>,
    ctx: ExecContext,
    scanner: Option<RecordScanner>,
    done: bool,
}

impl TableScanNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.done {
            return Ok(None);
        }
        if self.scanner.is_none() {
            let heap = self.ctx.store.table(self.table.id)?;
            self.scanner = Some(heap.scan());
        }
        let scanner = self.scanner.as_mut().expect("scanner initialized above");

        loop {
            let Some((rid, values)) = scanner.next()? else {
                self.done = true;
                return Ok(None);
            };
            self.ctx.tx.lock_shared(self.table.id, rid)?;
            let tuple = Tuple::Row {
                table_id: self.table.id,
                rid,
                values,
            };
            match &mut self.predicate {
                Some(predicate) => {
                    if predicate.evaluate(&tuple, &self.ctx)? {
                        return Ok(Some(tuple));
                    }
                }
                None => return Ok(Some(tuple)),
            }
        }
    }
}

/// Point lookup through an index, dereferencing RIDs to records.
pub struct IndexScanNode {
    table: Arc<TableMeta>,
    index_name: String,
    key: Value,
    predicate: Option<FilterStmt>,
    ctx: ExecContext,
    rids: Option<std::vec::IntoIter<Rid>>,
}

impl IndexScanNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.rids.is_none() {
            let index = self.ctx.store.index(&self.index_name)?;
            let rids = index.scan(&IndexRange::point(self.key.clone()));
            self.rids = Some(rids.into_iter());
        }
        let heap = self.ctx.store.table(self.table.id)?;
        let rids = self.rids.as_mut().expect("rids initialized above");

        for rid in rids.by_ref() {
            // The record may have been deleted after the RID list was
            // materialized; skip holes.
            let values = match heap.get(rid) {
                Ok(values) => values,
                Err(crate::heap::HeapError::RecordNotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            self.ctx.tx.lock_shared(self.table.id, rid)?;
            let tuple = Tuple::Row {
                table_id: self.table.id,
                rid,
                values,
            };
            match &mut self.predicate {
                Some(predicate) => {
                    if predicate.evaluate(&tuple, &self.ctx)? {
                        return Ok(Some(tuple));
                    }
                }
                None => return Ok(Some(tuple)),
            }
        }
        Ok(None)
    }
}

/// Filter above a child node.
pub struct FilterNode {
    child: Box<QueryNode>,
    predicate: FilterStmt,
    ctx: ExecContext,
}

impl FilterNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        while let Some(tuple) = self.child.next()? {
            if self.predicate.evaluate(&tuple, &self.ctx)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }
}

/// Nested-loop join.
///
/// The right side is materialized on first pull; each left tuple then
/// rewinds over the buffer. Without an ON condition this is the cartesian
/// product.
pub struct JoinNode {
    left: Box<QueryNode>,
    right: Box<QueryNode>,
    on: Option<FilterStmt>,
    ctx: ExecContext,
    right_rows: Option<Vec<Tuple>>,
    current_left: Option<Tuple>,
    right_pos: usize,
}

impl JoinNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.right_rows.is_none() {
            let mut rows = Vec::new();
            while let Some(tuple) = self.right.next()? {
                rows.push(tuple);
            }
            self.right_rows = Some(rows);
        }
        let right_rows = self.right_rows.as_ref().expect("materialized above");

        loop {
            if self.current_left.is_none() {
                match self.left.next()? {
                    Some(tuple) => {
                        self.current_left = Some(tuple);
                        self.right_pos = 0;
                    }
                    None => return Ok(None),
                }
            }
            let left = self.current_left.as_ref().expect("set above");

            while self.right_pos < right_rows.len() {
                let right = &right_rows[self.right_pos];
                self.right_pos += 1;
                let joined = Tuple::Joined {
                    left: Box::new(left.clone()),
                    right: Box::new(right.clone()),
                };
                match &mut self.on {
                    Some(on) => {
                        if on.evaluate(&joined, &self.ctx)? {
                            return Ok(Some(joined));
                        }
                    }
                    None => return Ok(Some(joined)),
                }
            }
            self.current_left = None;
        }
    }
}

/// Hash aggregation.
///
/// Consumes the whole child on first pull, then emits one tuple per
/// group in group-insertion order: group key values first, aggregate
/// results after. A grouped aggregation over empty input emits nothing;
/// an ungrouped one emits exactly one row (COUNT 0, others NULL).
pub struct AggregateNode {
    child: Box<QueryNode>,
    group_exprs: Vec<BoundExpr>,
    aggregates: Vec<AggregateOp>,
    having: Option<FilterStmt>,
    ctx: ExecContext,
    output: Option<std::vec::IntoIter<Tuple>>,
}

impl AggregateNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.output.is_none() {
            let tuples = self.consume()?;
            self.output = Some(tuples.into_iter());
        }
        Ok(self.output.as_mut().expect("filled above").next())
    }

    fn consume(&mut self) -> Result<Vec<Tuple>, ExecutorError> {
        let mut groups: GroupTable<Vec<Box<dyn Accumulator>>> = GroupTable::new();

        while let Some(tuple) = self.child.next()? {
            let mut key = Vec::with_capacity(self.group_exprs.len());
            for expr in &self.group_exprs {
                key.push(expr.evaluate(&tuple, &self.ctx.outer)?);
            }
            let aggregates = &self.aggregates;
            let accumulators = groups.entry_or_insert_with(GroupKey(key), || {
                aggregates.iter().map(|op| op.create_accumulator()).collect()
            });
            for (op, acc) in self.aggregates.iter().zip(accumulators.iter_mut()) {
                match &op.arg {
                    None => acc.feed(&Value::Null)?,
                    Some(arg) => {
                        let value = arg.evaluate(&tuple, &self.ctx.outer)?;
                        if !value.is_null() {
                            acc.feed(&value)?;
                        }
                    }
                }
            }
        }

        let mut tuples = Vec::with_capacity(groups.len().max(1));
        if groups.is_empty() && self.group_exprs.is_empty() {
            // Aggregates over no rows still produce one row.
            let values: Vec<Value> = self
                .aggregates
                .iter()
                .map(|op| op.create_accumulator().finish())
                .collect();
            tuples.push(Tuple::Values(values));
        } else {
            for (key, accumulators) in groups.into_entries() {
                let mut values = key.0;
                values.extend(accumulators.iter().map(|acc| acc.finish()));
                tuples.push(Tuple::Values(values));
            }
        }

        if let Some(having) = &mut self.having {
            let mut kept = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                if having.evaluate(&tuple, &self.ctx)? {
                    kept.push(tuple);
                }
            }
            tuples = kept;
        }
        Ok(tuples)
    }
}

/// Full materialization and stable sort.
///
/// NULL orders below every non-NULL value, so it comes first ascending
/// and last descending. Rows with equal keys keep their input order.
pub struct SortNode {
    child: Box<QueryNode>,
    keys: Vec<SortKey>,
    ctx: ExecContext,
    output: Option<std::vec::IntoIter<Tuple>>,
}

impl SortNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.output.is_none() {
            let mut rows: Vec<(Vec<Value>, Tuple)> = Vec::new();
            while let Some(tuple) = self.child.next()? {
                let mut key = Vec::with_capacity(self.keys.len());
                for sort_key in &self.keys {
                    key.push(sort_key.expr.evaluate(&tuple, &self.ctx.outer)?);
                }
                rows.push((key, tuple));
            }

            let keys = self.keys.clone();
            rows.sort_by(|(a, _), (b, _)| {
                for (i, sort_key) in keys.iter().enumerate() {
                    let ord = compare_for_sort(&a[i], &b[i]);
                    let ord = if sort_key.desc { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });

            self.output = Some(
                rows.into_iter()
                    .map(|(_, tuple)| tuple)
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        Ok(self.output.as_mut().expect("filled above").next())
    }
}

/// Sort comparison: NULL sorts below everything, incomparable pairs keep
/// their relative order.
fn compare_for_sort(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Expression projection.
pub struct ProjectionNode {
    child: Box<QueryNode>,
    exprs: Vec<BoundExpr>,
    ctx: ExecContext,
}

impl ProjectionNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        let Some(tuple) = self.child.next()? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.exprs.len());
        for expr in &self.exprs {
            values.push(expr.evaluate(&tuple, &self.ctx.outer)?);
        }
        Ok(Some(Tuple::Values(values)))
    }
}

/// One-row evaluation with no input (CALC, FROM-less SELECT).
pub struct CalcNode {
    exprs: Vec<BoundExpr>,
    ctx: ExecContext,
    done: bool,
}

impl CalcNode {
    fn next(&mut self) -> Result<Option<Tuple>, ExecutorError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let empty = Tuple::Values(vec![]);
        let mut values = Vec::with_capacity(self.exprs.len());
        for expr in &self.exprs {
            values.push(expr.evaluate(&empty, &self.ctx.outer)?);
        }
        Ok(Some(Tuple::Values(values)))
    }
}

// ----------------------------------------------------------------------
// Subquery execution
// ----------------------------------------------------------------------

/// Runs a subquery for one outer row, collecting first-column values up
/// to `limit`. The outer tuple is always pushed onto the scope so nested
/// correlated references stay aligned with execution depth. Uncorrelated
/// subqueries materialize once and serve from cache afterwards.
fn subquery_values(
    plan: &mut SubqueryPlan,
    outer_row: &Tuple,
    ctx: &ExecContext,
    limit: Option<usize>,
) -> Result<Vec<Value>, ExecutorError> {
    if !plan.correlated {
        if let Some(cache) = &plan.cache {
            return Ok(cache.clone());
        }
    }

    let child_ctx = ctx.with_outer(Arc::new(outer_row.clone()));
    let mut node = QueryNode::build(&plan.plan, &child_ctx);
    let mut values = Vec::new();
    while let Some(tuple) = node.next()? {
        values.push(tuple.cell_at(0).clone());
        if limit.is_some_and(|n| values.len() >= n) {
            break;
        }
    }

    if !plan.correlated {
        plan.cache = Some(values.clone());
    }
    Ok(values)
}

/// Scalar subquery: at most one row; `None` when it produced no rows.
pub(crate) fn subquery_scalar(
    plan: &mut SubqueryPlan,
    outer_row: &Tuple,
    ctx: &ExecContext,
) -> Result<Option<Value>, ExecutorError> {
    let values = subquery_values(plan, outer_row, ctx, Some(2))?;
    match values.len() {
        0 => Ok(None),
        1 => Ok(Some(values.into_iter().next().expect("one element"))),
        n => Err(ExecutorError::SubqueryRowCount { rows: n }),
    }
}

/// IN-subquery: the full first-column value list.
pub(crate) fn subquery_list(
    plan: &mut SubqueryPlan,
    outer_row: &Tuple,
    ctx: &ExecContext,
) -> Result<Vec<Value>, ExecutorError> {
    subquery_values(plan, outer_row, ctx, None)
}

/// EXISTS: stops at the first row.
pub(crate) fn subquery_exists(
    plan: &mut SubqueryPlan,
    outer_row: &Tuple,
    ctx: &ExecContext,
) -> Result<bool, ExecutorError> {
    Ok(!subquery_values(plan, outer_row, ctx, Some(1))?.is_empty())
}

// ----------------------------------------------------------------------
// DML execution
// ----------------------------------------------------------------------

/// Result of executing a DML plan.
#[derive(Debug, PartialEq, Eq)]
pub enum DmlResult {
    /// INSERT completed.
    Insert {
        /// Number of rows inserted.
        count: u64,
    },
    /// UPDATE completed.
    Update {
        /// Number of rows updated.
        count: u64,
    },
    /// DELETE completed.
    Delete {
        /// Number of rows deleted.
        count: u64,
    },
}

impl DmlResult {
    /// Formats the command completion tag.
    pub fn command_tag(&self) -> String {
        match self {
            DmlResult::Insert { count } => format!("INSERT {count}"),
            DmlResult::Update { count } => format!("UPDATE {count}"),
            DmlResult::Delete { count } => format!("DELETE {count}"),
        }
    }
}

/// Executes a DML plan. Effects go through the transaction; on error the
/// caller rolls the statement back via its savepoint.
pub fn execute_dml(plan: DmlPlan, ctx: &ExecContext) -> Result<DmlResult, ExecutorError> {
    match plan {
        DmlPlan::Insert { table, rows } => execute_insert(&table, rows, ctx),
        DmlPlan::Update {
            table,
            scan,
            assignments,
        } => execute_update(&table, &scan, assignments, ctx),
        DmlPlan::Delete { table, scan } => execute_delete(&table, &scan, ctx),
    }
}

fn execute_insert(
    table: &Arc<TableMeta>,
    rows: Vec<Vec<Value>>,
    ctx: &ExecContext,
) -> Result<DmlResult, ExecutorError> {
    let heap = ctx.store.table(table.id)?;
    let indexes = ctx.store.indexes_on(&table.name);

    let mut count = 0u64;
    for row in rows {
        let rid = heap.insert(&row)?;
        ctx.tx.lock_exclusive(table.id, rid)?;
        ctx.tx.log_insert(table.id, &table.name, rid, row.clone());
        for index in &indexes {
            index.insert(&row[index.field_index()], rid)?;
        }
        count += 1;
    }
    debug!(table = %table.name, count, "insert applied");
    Ok(DmlResult::Insert { count })
}

fn execute_update(
    table: &Arc<TableMeta>,
    scan: &QueryPlan,
    mut assignments: Vec<(usize, UpdateSource)>,
    ctx: &ExecContext,
) -> Result<DmlResult, ExecutorError> {
    let heap = ctx.store.table(table.id)?;
    let indexes = ctx.store.indexes_on(&table.name);
    let mut node = QueryNode::build(scan, ctx);

    let mut count = 0u64;
    while let Some(tuple) = node.next()? {
        let (table_id, rid) = tuple.base_rid().ok_or_else(|| {
            ExecutorError::InvalidArgument("update source lost its row identity".to_string())
        })?;
        ctx.tx.lock_exclusive(table_id, rid)?;

        let old = tuple.cells();
        let mut new = old.clone();
        for (index, source) in assignments.iter_mut() {
            let field = &table.fields[*index];
            let value = match source {
                UpdateSource::Expr(expr) => expr.evaluate(&tuple, &ctx.outer)?,
                UpdateSource::SubSelect(plan) => subquery_scalar(plan, &tuple, ctx)?
                    .ok_or(ExecutorError::SubqueryRowCount { rows: 0 })?,
            };
            let coerced =
                value
                    .coerce_to(field.ty)
                    .ok_or_else(|| ExecutorError::TypeMismatch {
                        expected: field.ty.display_name().to_string(),
                        found: value
                            .ty()
                            .map(|t| t.display_name().to_string())
                            .unwrap_or_else(|| "NULL".to_string()),
                    })?;
            if coerced.is_null() && !field.nullable {
                return Err(ExecutorError::NotNullViolation {
                    column: field.name.clone(),
                });
            }
            new[*index] = coerced;
        }

        let old = heap.update(rid, &new)?;
        ctx.tx
            .log_update(table.id, &table.name, rid, old.clone(), new.clone());
        for index in &indexes {
            let fi = index.field_index();
            if old[fi] != new[fi] {
                index.remove(&old[fi], rid);
                index.insert(&new[fi], rid)?;
            }
        }
        count += 1;
    }
    debug!(table = %table.name, count, "update applied");
    Ok(DmlResult::Update { count })
}

fn execute_delete(
    table: &Arc<TableMeta>,
    scan: &QueryPlan,
    ctx: &ExecContext,
) -> Result<DmlResult, ExecutorError> {
    let heap = ctx.store.table(table.id)?;
    let indexes = ctx.store.indexes_on(&table.name);
    let mut node = QueryNode::build(scan, ctx);

    let mut count = 0u64;
    while let Some(tuple) = node.next()? {
        let (table_id, rid) = tuple.base_rid().ok_or_else(|| {
            ExecutorError::InvalidArgument("delete source lost its row identity".to_string())
        })?;
        ctx.tx.lock_exclusive(table_id, rid)?;

        let old = heap.delete(rid)?;
        for index in &indexes {
            index.remove(&old[index.field_index()], rid);
        }
        ctx.tx.log_delete(table.id, &table.name, rid, old);
        count += 1;
    }
    debug!(table = %table.name, count, "delete applied");
    Ok(DmlResult::Delete { count })
}
