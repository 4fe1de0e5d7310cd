//! Statement binding and planning.
//!
//! The [`Planner`] turns a parsed [`Statement`] into a [`Plan`]: it
//! resolves table and column names against the catalog, expands
//! wildcards, compiles condition trees into [`FilterStmt`]s with
//! bind-time type checks, extracts aggregates, folds constant
//! expressions (including scalar function calls over literals), pushes
//! single-table predicates into scans, and selects an index scan for
//! indexed equality predicates.
//!
//! Subqueries are planned recursively with the enclosing scopes in
//! reach; a reference that only resolves in an enclosing scope becomes an
//! outer-field lookup and marks the subquery correlated.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{Catalog, ColumnSpec, IndexMeta, TableMeta};
use crate::datum::{Type, Value};
use crate::sql::{
    Assignment, BinaryOperator, CalcStmt, CreateIndexStmt, CreateTableStmt, DataType, DeleteStmt,
    Expr, InsertStmt, SelectItem, SelectStmt, SortDirection, Statement, TableRef, UpdateStmt,
};

use super::aggregate::{AggregateFunction, AggregateOp};
use super::error::ExecutorError;
use super::expr::{ArithOp, BoundExpr};
use super::filter::{CompOp, FilterOperand, FilterStmt, FilterUnit};
use super::func::ScalarFunc;
use super::plan::{DmlPlan, Plan, QueryPlan, SortKey, SubqueryPlan, UpdateSource};
use super::ColumnDesc;

/// One name scope: the tables a SELECT brings into view, in FROM order,
/// with the flattened column schema their scans produce.
#[derive(Debug, Clone, Default)]
struct Scope {
    /// `(exposed name, table)` pairs; the exposed name is the alias when
    /// one was given.
    tables: Vec<(String, Arc<TableMeta>)>,
    /// Flattened columns of all tables, in FROM order.
    columns: Vec<ColumnDesc>,
}

impl Scope {
    /// Finds a column, honoring an optional qualifier. Returns the flat
    /// index. Unqualified lookups error on multiple matches.
    fn find(&self, qualifier: Option<&str>, column: &str) -> Result<Option<usize>, ExecutorError> {
        let mut found = None;
        for (i, desc) in self.columns.iter().enumerate() {
            if desc.name != column {
                continue;
            }
            match qualifier {
                Some(q) => {
                    if desc.qualifier.as_deref() == Some(q) {
                        return Ok(Some(i));
                    }
                }
                None => {
                    if found.is_some() {
                        return Err(ExecutorError::AmbiguousReference {
                            name: column.to_string(),
                        });
                    }
                    found = Some(i);
                }
            }
        }
        Ok(found)
    }
}

/// The statement planner.
pub struct Planner {
    catalog: Arc<Catalog>,
}

impl Planner {
    /// Creates a planner over the given catalog.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Planner { catalog }
    }

    /// Plans a statement.
    pub fn plan(&self, stmt: &Statement) -> Result<Plan, ExecutorError> {
        let plan = match stmt {
            Statement::Select(select) => {
                let mut outer_seen = false;
                Plan::Query(self.plan_select(select, &[], &mut outer_seen)?)
            }
            Statement::Insert(insert) => self.plan_insert(insert)?,
            Statement::Update(update) => self.plan_update(update)?,
            Statement::Delete(delete) => self.plan_delete(delete)?,
            Statement::CreateTable(create) => self.plan_create_table(create)?,
            Statement::DropTable(drop) => Plan::DropTable {
                name: drop.name.clone(),
            },
            Statement::CreateIndex(create) => self.plan_create_index(create)?,
            Statement::DropIndex(drop) => Plan::DropIndex {
                name: drop.name.clone(),
            },
            Statement::Calc(calc) => Plan::Query(self.plan_calc(calc)?),
            Statement::Explain(inner) => Plan::Explain(Box::new(self.plan(inner)?)),
            Statement::Set(set) => {
                let bound = self.bind_scalar(&set.value, &Scope::default(), &[], &mut false, false)?;
                let folded = self.fold(bound)?;
                let BoundExpr::Value(value) = folded else {
                    return Err(ExecutorError::InvalidArgument(
                        "SET requires a literal value".to_string(),
                    ));
                };
                Plan::SetVariable {
                    name: set.name.clone(),
                    value,
                }
            }
            Statement::LoadData(_) => {
                return Err(ExecutorError::Unsupported(
                    "LOAD DATA is not implemented".to_string(),
                ))
            }
            Statement::ShowTables => Plan::ShowTables,
            Statement::DescTable(name) => Plan::DescTable { name: name.clone() },
            Statement::Begin => Plan::Begin,
            Statement::Commit => Plan::Commit,
            Statement::Rollback => Plan::Rollback,
        };
        debug!(statement = ?std::mem::discriminant(stmt), "planned statement");
        Ok(plan)
    }

    fn lookup_table(&self, name: &str) -> Result<Arc<TableMeta>, ExecutorError> {
        self.catalog
            .table(name)
            .map_err(|_| ExecutorError::TableNotFound {
                name: name.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn plan_select(
        &self,
        stmt: &SelectStmt,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<QueryPlan, ExecutorError> {
        if stmt.from.is_empty() {
            return self.plan_select_without_from(stmt, enclosing, outer_seen);
        }

        let scope = self.build_scope(&stmt.from, stmt.joins.iter().map(|j| &j.table))?;

        // Aggregates may not appear below the aggregation operator.
        if let Some(where_clause) = &stmt.where_clause {
            if contains_aggregate(where_clause) {
                return Err(ExecutorError::AggregateNotAllowed {
                    context: "the WHERE clause".to_string(),
                });
            }
        }
        let where_filter = stmt
            .where_clause
            .as_ref()
            .map(|w| self.compile_filter(w, &scope, enclosing, outer_seen, false))
            .transpose()?;

        let mut plan = self.build_scan_plan(stmt, &scope, where_filter, enclosing, outer_seen)?;

        let has_aggregation = !stmt.group_by.is_empty()
            || stmt.columns.iter().any(|item| match item {
                SelectItem::Expr { expr, .. } => contains_aggregate(expr),
                _ => false,
            })
            || stmt.having.as_ref().is_some_and(contains_aggregate)
            || stmt.order_by.iter().any(|o| contains_aggregate(&o.expr));

        if has_aggregation {
            plan = self.plan_aggregation(plan, stmt, &scope, enclosing, outer_seen)?;
        } else {
            if stmt.having.is_some() {
                return Err(ExecutorError::Unsupported(
                    "HAVING without GROUP BY or aggregates".to_string(),
                ));
            }

            if !stmt.order_by.is_empty() {
                let keys = self.bind_sort_keys(&stmt.order_by, &scope, enclosing, outer_seen)?;
                plan = QueryPlan::Sort {
                    input: Box::new(plan),
                    keys,
                };
            }

            plan = self.build_projection(plan, stmt, &scope, enclosing, outer_seen)?;
        }

        Ok(plan)
    }

    /// FROM-less SELECT behaves like CALC: one row of evaluated
    /// expressions.
    fn plan_select_without_from(
        &self,
        stmt: &SelectStmt,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<QueryPlan, ExecutorError> {
        if !stmt.group_by.is_empty()
            || stmt.having.is_some()
            || !stmt.order_by.is_empty()
            || stmt.where_clause.is_some()
        {
            return Err(ExecutorError::Unsupported(
                "clauses without a FROM table".to_string(),
            ));
        }
        let scope = Scope::default();
        let mut exprs = Vec::new();
        let mut columns = Vec::new();
        for item in &stmt.columns {
            let SelectItem::Expr { expr, alias } = item else {
                return Err(ExecutorError::InvalidArgument(
                    "* requires a FROM clause".to_string(),
                ));
            };
            let bound = self.bind_scalar(expr, &scope, enclosing, outer_seen, false)?;
            let bound = self.fold(bound)?;
            let name = alias.clone().unwrap_or_else(|| expr.display_text());
            columns.push(ColumnDesc::computed(name, bound.ty()));
            exprs.push(bound);
        }
        Ok(QueryPlan::Calc { exprs, columns })
    }

    fn build_scope<'a>(
        &self,
        from: &'a [TableRef],
        joined: impl Iterator<Item = &'a TableRef>,
    ) -> Result<Scope, ExecutorError> {
        let mut scope = Scope::default();
        for tref in from.iter().chain(joined) {
            let meta = self.lookup_table(&tref.name)?;
            let exposed = tref.alias.clone().unwrap_or_else(|| tref.name.clone());
            if scope.tables.iter().any(|(name, _)| *name == exposed) {
                return Err(ExecutorError::DuplicateAlias { alias: exposed });
            }
            for field in &meta.fields {
                scope.columns.push(ColumnDesc {
                    qualifier: Some(exposed.clone()),
                    name: field.name.clone(),
                    ty: Some(field.ty),
                    nullable: field.nullable,
                });
            }
            scope.tables.push((exposed, meta));
        }
        Ok(scope)
    }

    /// Builds the scan side of a SELECT: a single scan with predicate
    /// pushdown and index selection, or a left-deep join cascade with
    /// the WHERE filter above it.
    fn build_scan_plan(
        &self,
        stmt: &SelectStmt,
        scope: &Scope,
        where_filter: Option<FilterStmt>,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<QueryPlan, ExecutorError> {
        if scope.tables.len() == 1 {
            let (qualifier, meta) = &scope.tables[0];
            return Ok(self.plan_single_table_scan(
                meta.clone(),
                qualifier.clone(),
                scope.columns.clone(),
                where_filter,
            ));
        }

        let mut plan: Option<QueryPlan> = None;
        let mut seen_columns: Vec<ColumnDesc> = Vec::new();
        for (i, (qualifier, meta)) in scope.tables.iter().enumerate() {
            let table_columns: Vec<ColumnDesc> = scope.columns
                [seen_columns.len()..seen_columns.len() + meta.fields.len()]
                .to_vec();
            seen_columns.extend(table_columns.iter().cloned());
            let scan = QueryPlan::TableScan {
                table: meta.clone(),
                qualifier: qualifier.clone(),
                columns: table_columns,
                predicate: None,
            };
            plan = Some(match plan {
                None => scan,
                Some(left) => {
                    // Tables beyond the comma list come from JOIN clauses
                    // and may carry an ON condition.
                    let on = if i >= stmt.from.len() {
                        stmt.joins[i - stmt.from.len()]
                            .on
                            .as_ref()
                            .map(|e| self.compile_filter(e, scope, enclosing, outer_seen, false))
                            .transpose()?
                    } else {
                        None
                    };
                    QueryPlan::NestedLoopJoin {
                        left: Box::new(left),
                        right: Box::new(scan),
                        on,
                        columns: seen_columns.clone(),
                    }
                }
            });
        }
        let mut plan = plan.expect("at least one FROM table");

        if let Some(predicate) = where_filter {
            plan = QueryPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }
        Ok(plan)
    }

    /// Single-table scan with pushdown: simple conjunctive units go into
    /// the scan, the remainder stays in a Filter above it, and an indexed
    /// equality unit upgrades the scan to an IndexScan.
    fn plan_single_table_scan(
        &self,
        meta: Arc<TableMeta>,
        qualifier: String,
        columns: Vec<ColumnDesc>,
        filter: Option<FilterStmt>,
    ) -> QueryPlan {
        let (pushed, rest) = split_pushdown(filter);

        let mut plan = match self.pick_index(&meta, pushed.as_ref()) {
            Some((index, key)) => QueryPlan::IndexScan {
                table: meta,
                index,
                key,
                qualifier,
                columns,
                predicate: pushed,
            },
            None => QueryPlan::TableScan {
                table: meta,
                qualifier,
                columns,
                predicate: pushed,
            },
        };
        if let Some(predicate) = rest {
            plan = QueryPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }
        plan
    }

    /// Picks an index for an all-AND pushed predicate: the first
    /// `field = constant` unit whose field has an index.
    fn pick_index(
        &self,
        meta: &TableMeta,
        pushed: Option<&FilterStmt>,
    ) -> Option<(Arc<IndexMeta>, Value)> {
        let pushed = pushed?;
        if pushed.units.iter().any(|u| u.or_conj) {
            return None;
        }
        for unit in &pushed.units {
            if unit.op != CompOp::Eq {
                continue;
            }
            let sides = [(&unit.left, &unit.right), (&unit.right, &unit.left)];
            for (field_side, value_side) in sides {
                let (FilterOperand::Expr(BoundExpr::Field { index, .. }), FilterOperand::Expr(BoundExpr::Value(key))) =
                    (field_side, value_side)
                else {
                    continue;
                };
                let field = &meta.fields[*index];
                let Some(index_meta) = self.catalog.index_on_field(&meta.name, &field.name) else {
                    continue;
                };
                let Some(key) = key.coerce_to(field.ty) else {
                    continue;
                };
                return Some((index_meta, key));
            }
        }
        None
    }

    /// Plans the aggregation portion of a SELECT: GROUP BY binding,
    /// aggregate extraction, HAVING and ORDER BY rewrite, and the final
    /// projection.
    fn plan_aggregation(
        &self,
        input: QueryPlan,
        stmt: &SelectStmt,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<QueryPlan, ExecutorError> {
        let mut group_exprs = Vec::new();
        let mut agg_columns = Vec::new();
        for expr in &stmt.group_by {
            if contains_aggregate(expr) {
                return Err(ExecutorError::AggregateNotAllowed {
                    context: "the GROUP BY clause".to_string(),
                });
            }
            let bound = self.bind_scalar(expr, scope, enclosing, outer_seen, false)?;
            agg_columns.push(ColumnDesc::computed(bound.to_string(), bound.ty()));
            group_exprs.push(bound);
        }

        // Bind the SELECT list: expression items first, then wildcard
        // expansions, preserving the engine's output column order.
        let mut items: Vec<(BoundExpr, String)> = Vec::new();
        for item in &stmt.columns {
            if let SelectItem::Expr { expr, alias } = item {
                let bound = self.bind_scalar(expr, scope, enclosing, outer_seen, true)?;
                let name = alias.clone().unwrap_or_else(|| item_name(expr));
                items.push((bound, name));
            }
        }
        for item in &stmt.columns {
            match item {
                SelectItem::Expr { .. } => {}
                SelectItem::Wildcard => {
                    for (i, desc) in scope.columns.iter().enumerate() {
                        items.push((field_expr(i, desc), desc.name.clone()));
                    }
                }
                SelectItem::QualifiedWildcard(rel) => {
                    items.extend(self.expand_qualified(rel, scope)?);
                }
            }
        }

        let mut aggregates = Vec::new();
        let rewritten: Vec<(BoundExpr, String)> = items
            .into_iter()
            .map(|(expr, name)| {
                rewrite_for_aggregate(expr, &group_exprs, &mut aggregates).map(|e| (e, name))
            })
            .collect::<Result<_, _>>()?;

        let having = stmt
            .having
            .as_ref()
            .map(|h| {
                let mut filter = self.compile_filter(h, scope, enclosing, outer_seen, true)?;
                for unit in &mut filter.units {
                    for operand in [&mut unit.left, &mut unit.right] {
                        if let FilterOperand::Expr(expr) = operand {
                            *expr = rewrite_for_aggregate(
                                expr.clone(),
                                &group_exprs,
                                &mut aggregates,
                            )?;
                        }
                    }
                }
                Ok::<_, ExecutorError>(filter)
            })
            .transpose()?;

        let sort_keys = if stmt.order_by.is_empty() {
            Vec::new()
        } else {
            let mut keys = Vec::new();
            for item in &stmt.order_by {
                let bound = self.bind_scalar(&item.expr, scope, enclosing, outer_seen, true)?;
                let expr = rewrite_for_aggregate(bound, &group_exprs, &mut aggregates)?;
                keys.push(SortKey {
                    expr,
                    desc: item.direction == SortDirection::Desc,
                });
            }
            keys
        };

        for op in &aggregates {
            agg_columns.push(ColumnDesc::computed(op.to_string(), Some(op.output_type())));
        }

        let mut plan = QueryPlan::Aggregate {
            input: Box::new(input),
            group_exprs,
            aggregates,
            having,
            columns: agg_columns,
        };

        if !sort_keys.is_empty() {
            plan = QueryPlan::Sort {
                input: Box::new(plan),
                keys: sort_keys,
            };
        }

        let mut exprs = Vec::new();
        let mut columns = Vec::new();
        for (expr, name) in rewritten {
            columns.push(ColumnDesc::computed(name, expr.ty()));
            exprs.push(expr);
        }
        Ok(QueryPlan::Projection {
            input: Box::new(plan),
            exprs,
            columns,
        })
    }

    /// Builds the final projection of a non-aggregated SELECT:
    /// expression items first, then wildcard expansions.
    fn build_projection(
        &self,
        input: QueryPlan,
        stmt: &SelectStmt,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<QueryPlan, ExecutorError> {
        let mut exprs = Vec::new();
        let mut columns = Vec::new();

        let mut push = |expr: BoundExpr, name: String, desc: Option<&ColumnDesc>| {
            columns.push(match desc {
                Some(desc) => ColumnDesc {
                    qualifier: desc.qualifier.clone(),
                    name,
                    ty: desc.ty,
                    nullable: desc.nullable,
                },
                None => ColumnDesc::computed(name, expr.ty()),
            });
            exprs.push(expr);
        };

        for item in &stmt.columns {
            if let SelectItem::Expr { expr, alias } = item {
                let bound = self.bind_scalar(expr, scope, enclosing, outer_seen, false)?;
                let bound = self.fold(bound)?;
                let name = alias.clone().unwrap_or_else(|| item_name(expr));
                let desc = match &bound {
                    BoundExpr::Field { index, .. } => scope.columns.get(*index),
                    _ => None,
                };
                push(bound, name, desc);
            }
        }
        for item in &stmt.columns {
            match item {
                SelectItem::Expr { .. } => {}
                SelectItem::Wildcard => {
                    for (i, desc) in scope.columns.iter().enumerate() {
                        push(field_expr(i, desc), desc.name.clone(), Some(desc));
                    }
                }
                SelectItem::QualifiedWildcard(rel) => {
                    for (expr, name) in self.expand_qualified(rel, scope)? {
                        let desc = match &expr {
                            BoundExpr::Field { index, .. } => scope.columns.get(*index),
                            _ => None,
                        };
                        push(expr, name, desc);
                    }
                }
            }
        }

        Ok(QueryPlan::Projection {
            input: Box::new(input),
            exprs,
            columns,
        })
    }

    /// Expands `rel.*` against the scope.
    fn expand_qualified(
        &self,
        rel: &str,
        scope: &Scope,
    ) -> Result<Vec<(BoundExpr, String)>, ExecutorError> {
        if !scope.tables.iter().any(|(name, _)| name == rel) {
            return Err(ExecutorError::TableNotFound {
                name: rel.to_string(),
            });
        }
        Ok(scope
            .columns
            .iter()
            .enumerate()
            .filter(|(_, desc)| desc.qualifier.as_deref() == Some(rel))
            .map(|(i, desc)| (field_expr(i, desc), desc.name.clone()))
            .collect())
    }

    fn bind_sort_keys(
        &self,
        order_by: &[crate::sql::OrderByItem],
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<Vec<SortKey>, ExecutorError> {
        order_by
            .iter()
            .map(|item| {
                let expr = self.bind_scalar(&item.expr, scope, enclosing, outer_seen, false)?;
                Ok(SortKey {
                    expr,
                    desc: item.direction == SortDirection::Desc,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scalar expression binding
    // ------------------------------------------------------------------

    fn bind_scalar(
        &self,
        expr: &Expr,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<BoundExpr, ExecutorError> {
        match expr {
            Expr::Null => Ok(BoundExpr::Value(Value::Null)),
            Expr::Integer(n) => Ok(BoundExpr::Value(Value::Int(*n as i32))),
            Expr::Float(n) => Ok(BoundExpr::Value(Value::Float(*n as f32))),
            Expr::String(s) => Ok(BoundExpr::Value(Value::Chars(s.clone()))),

            Expr::ColumnRef { table, column } => {
                if column == "*" {
                    return Err(ExecutorError::InvalidArgument(
                        "* is only valid inside COUNT".to_string(),
                    ));
                }
                self.resolve_column(table.as_deref(), column, scope, enclosing, outer_seen)
            }

            Expr::BinaryOp { left, op, right } => {
                let arith = match op {
                    BinaryOperator::Add => ArithOp::Add,
                    BinaryOperator::Sub => ArithOp::Sub,
                    BinaryOperator::Mul => ArithOp::Mul,
                    BinaryOperator::Div => ArithOp::Div,
                    _ => {
                        return Err(ExecutorError::InvalidArgument(
                            "comparison in a scalar position".to_string(),
                        ))
                    }
                };
                Ok(BoundExpr::Arith {
                    op: arith,
                    left: Box::new(self.bind_scalar(
                        left,
                        scope,
                        enclosing,
                        outer_seen,
                        allow_aggregate,
                    )?),
                    right: Box::new(self.bind_scalar(
                        right,
                        scope,
                        enclosing,
                        outer_seen,
                        allow_aggregate,
                    )?),
                })
            }

            Expr::Neg(inner) => Ok(BoundExpr::Neg(Box::new(self.bind_scalar(
                inner,
                scope,
                enclosing,
                outer_seen,
                allow_aggregate,
            )?))),

            Expr::Function { name, args } => {
                self.bind_function(name, args, scope, enclosing, outer_seen, allow_aggregate)
            }

            Expr::Subquery(_) => Err(ExecutorError::Unsupported(
                "scalar subquery outside a condition or assignment".to_string(),
            )),

            _ => Err(ExecutorError::InvalidArgument(
                "condition in a scalar position".to_string(),
            )),
        }
    }

    fn resolve_column(
        &self,
        qualifier: Option<&str>,
        column: &str,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<BoundExpr, ExecutorError> {
        let display = match qualifier {
            Some(q) => format!("{}.{}", q, column),
            None => column.to_string(),
        };

        if let Some(index) = scope.find(qualifier, column)? {
            let desc = &scope.columns[index];
            return Ok(BoundExpr::Field {
                index,
                name: display,
                ty: desc.ty.unwrap_or(Type::Chars),
            });
        }

        // Walk the enclosing scopes, innermost first; a hit makes this
        // statement correlated.
        for (level, outer_scope) in enclosing.iter().rev().enumerate() {
            if let Some(index) = outer_scope.find(qualifier, column)? {
                let desc = &outer_scope.columns[index];
                *outer_seen = true;
                return Ok(BoundExpr::OuterField {
                    level,
                    index,
                    name: display,
                    ty: desc.ty.unwrap_or(Type::Chars),
                });
            }
        }

        Err(ExecutorError::FieldNotFound { name: display })
    }

    fn bind_function(
        &self,
        name: &str,
        args: &[Expr],
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<BoundExpr, ExecutorError> {
        if let Some(func) = AggregateFunction::from_name(name) {
            if !allow_aggregate {
                return Err(ExecutorError::AggregateNotAllowed {
                    context: "this clause".to_string(),
                });
            }
            if args.len() != 1 {
                return Err(ExecutorError::InvalidArgument(format!(
                    "{} takes exactly one argument",
                    name.to_uppercase()
                )));
            }
            if let Expr::ColumnRef { table: None, column } = &args[0] {
                if column == "*" {
                    if func != AggregateFunction::Count {
                        return Err(ExecutorError::InvalidArgument(format!(
                            "* is not a valid argument to {}",
                            name.to_uppercase()
                        )));
                    }
                    return Ok(BoundExpr::Aggregate { func, arg: None });
                }
            }
            // No aggregate nesting.
            let arg = self.bind_scalar(&args[0], scope, enclosing, outer_seen, false)?;
            return Ok(BoundExpr::Aggregate {
                func,
                arg: Some(Box::new(arg)),
            });
        }

        if let Some(func) = ScalarFunc::from_name(name) {
            func.check_arity(args.len())?;
            let args = args
                .iter()
                .map(|a| self.bind_scalar(a, scope, enclosing, outer_seen, allow_aggregate))
                .collect::<Result<Vec<_>, _>>()?;
            self.check_function_args(func, &args)?;
            return self.fold(BoundExpr::Func { func, args });
        }

        Err(ExecutorError::Unsupported(format!(
            "function \"{}\"",
            name
        )))
    }

    /// Bind-time argument type check for scalar functions, for arguments
    /// whose type is statically known.
    fn check_function_args(
        &self,
        func: ScalarFunc,
        args: &[BoundExpr],
    ) -> Result<(), ExecutorError> {
        let expect = |arg: &BoundExpr, ok: fn(Type) -> bool| -> Result<(), ExecutorError> {
            match arg.ty() {
                Some(ty) if !ok(ty) => Err(ExecutorError::FunctionArgument {
                    func: func.name().to_string(),
                    detail: format!("argument of type {} is not accepted", ty.display_name()),
                }),
                _ => Ok(()),
            }
        };
        match func {
            ScalarFunc::Length => expect(&args[0], Type::is_string),
            ScalarFunc::Round => {
                expect(&args[0], |t| t == Type::Float)?;
                if let Some(arg) = args.get(1) {
                    expect(arg, |t| t == Type::Int)?;
                }
                Ok(())
            }
            ScalarFunc::DateFormat => {
                expect(&args[0], |t| t == Type::Date)?;
                expect(&args[1], Type::is_string)
            }
        }
    }

    /// Folds a constant expression into a value literal.
    ///
    /// Integer division by a zero literal is the one constant expression
    /// that errors instead of folding (row evaluation yields NULL there,
    /// but a constant `1/0` fails the statement).
    fn fold(&self, expr: BoundExpr) -> Result<BoundExpr, ExecutorError> {
        if expr.has_field() || expr.has_outer() || expr.has_aggregate() {
            return Ok(expr);
        }
        check_const_int_division(&expr)?;
        Ok(BoundExpr::Value(expr.evaluate_const()?))
    }

    // ------------------------------------------------------------------
    // Filter compilation
    // ------------------------------------------------------------------

    fn compile_filter(
        &self,
        expr: &Expr,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<FilterStmt, ExecutorError> {
        let groups = self.compile_or(expr, scope, enclosing, outer_seen, allow_aggregate)?;
        let mut units = Vec::new();
        for (gi, group) in groups.into_iter().enumerate() {
            for (ui, mut unit) in group.into_iter().enumerate() {
                unit.or_conj = gi > 0 && ui == 0;
                units.push(unit);
            }
        }
        Ok(FilterStmt::new(units))
    }

    /// Splits a condition tree into OR-joined AND groups.
    fn compile_or(
        &self,
        expr: &Expr,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<Vec<Vec<FilterUnit>>, ExecutorError> {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => {
                let mut groups =
                    self.compile_or(left, scope, enclosing, outer_seen, allow_aggregate)?;
                groups.extend(self.compile_or(
                    right,
                    scope,
                    enclosing,
                    outer_seen,
                    allow_aggregate,
                )?);
                Ok(groups)
            }
            // NOT BETWEEN splits into two OR groups (x < lo OR x > hi),
            // which only the OR spine can host.
            Expr::Between {
                expr: probe,
                low,
                high,
                negated: true,
            } => {
                let probe_lo =
                    self.compile_operand(probe, scope, enclosing, outer_seen, allow_aggregate)?;
                let probe_hi = probe_lo.clone();
                let low =
                    self.compile_operand(low, scope, enclosing, outer_seen, allow_aggregate)?;
                let high =
                    self.compile_operand(high, scope, enclosing, outer_seen, allow_aggregate)?;
                self.check_comparison(&probe_lo, &low)?;
                self.check_comparison(&probe_hi, &high)?;
                Ok(vec![
                    vec![FilterUnit {
                        left: probe_lo,
                        op: CompOp::Lt,
                        right: low,
                        or_conj: false,
                    }],
                    vec![FilterUnit {
                        left: probe_hi,
                        op: CompOp::Gt,
                        right: high,
                        or_conj: false,
                    }],
                ])
            }
            _ => Ok(vec![self.compile_and(
                expr,
                scope,
                enclosing,
                outer_seen,
                allow_aggregate,
            )?]),
        }
    }

    /// Flattens an AND spine into units. OR below an AND operand has no
    /// flat representation and is rejected.
    fn compile_and(
        &self,
        expr: &Expr,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<Vec<FilterUnit>, ExecutorError> {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let mut units =
                    self.compile_and(left, scope, enclosing, outer_seen, allow_aggregate)?;
                units.extend(self.compile_and(
                    right,
                    scope,
                    enclosing,
                    outer_seen,
                    allow_aggregate,
                )?);
                Ok(units)
            }
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            } => Err(ExecutorError::Unsupported(
                "OR nested under AND".to_string(),
            )),
            Expr::Between {
                expr: probe,
                low,
                high,
                negated,
            } => {
                if *negated {
                    return Err(ExecutorError::Unsupported(
                        "NOT BETWEEN combined with AND".to_string(),
                    ));
                }
                // BETWEEN is two AND-combined bounds.
                let probe_lo =
                    self.compile_operand(probe, scope, enclosing, outer_seen, allow_aggregate)?;
                let probe_hi = probe_lo.clone();
                let low =
                    self.compile_operand(low, scope, enclosing, outer_seen, allow_aggregate)?;
                let high =
                    self.compile_operand(high, scope, enclosing, outer_seen, allow_aggregate)?;
                self.check_comparison(&probe_lo, &low)?;
                self.check_comparison(&probe_hi, &high)?;
                Ok(vec![
                    FilterUnit {
                        left: probe_lo,
                        op: CompOp::GtEq,
                        right: low,
                        or_conj: false,
                    },
                    FilterUnit {
                        left: probe_hi,
                        op: CompOp::LtEq,
                        right: high,
                        or_conj: false,
                    },
                ])
            }
            _ => Ok(vec![self.compile_unit(
                expr,
                false,
                scope,
                enclosing,
                outer_seen,
                allow_aggregate,
            )?]),
        }
    }

    /// Compiles one predicate atom.
    fn compile_unit(
        &self,
        expr: &Expr,
        negate: bool,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<FilterUnit, ExecutorError> {
        let apply = |op: CompOp| if negate { op.negated() } else { op };

        match expr {
            Expr::Not(inner) => self.compile_unit(
                inner,
                !negate,
                scope,
                enclosing,
                outer_seen,
                allow_aggregate,
            ),

            Expr::BinaryOp { left, op, right } if op.is_comparison() => {
                let left =
                    self.compile_operand(left, scope, enclosing, outer_seen, allow_aggregate)?;
                let right =
                    self.compile_operand(right, scope, enclosing, outer_seen, allow_aggregate)?;
                self.check_comparison(&left, &right)?;
                let comp = match op {
                    BinaryOperator::Eq => CompOp::Eq,
                    BinaryOperator::Neq => CompOp::Neq,
                    BinaryOperator::Lt => CompOp::Lt,
                    BinaryOperator::LtEq => CompOp::LtEq,
                    BinaryOperator::Gt => CompOp::Gt,
                    BinaryOperator::GtEq => CompOp::GtEq,
                    _ => unreachable!("is_comparison checked"),
                };
                Ok(FilterUnit {
                    left,
                    op: apply(comp),
                    right,
                    or_conj: false,
                })
            }

            Expr::IsNull { expr, negated } => {
                let left =
                    self.compile_operand(expr, scope, enclosing, outer_seen, allow_aggregate)?;
                let op = if *negated != negate {
                    CompOp::IsNotNull
                } else {
                    CompOp::IsNull
                };
                Ok(FilterUnit {
                    left,
                    op,
                    right: FilterOperand::Expr(BoundExpr::Value(Value::Null)),
                    or_conj: false,
                })
            }

            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let left =
                    self.compile_operand(expr, scope, enclosing, outer_seen, allow_aggregate)?;
                let mut values = Vec::with_capacity(list.len());
                for item in list {
                    let bound =
                        self.bind_scalar(item, scope, enclosing, outer_seen, allow_aggregate)?;
                    match self.fold(bound)? {
                        BoundExpr::Value(v) => values.push(v),
                        _ => {
                            return Err(ExecutorError::Unsupported(
                                "non-constant IN list element".to_string(),
                            ))
                        }
                    }
                }
                let op = if *negated != negate {
                    CompOp::NotIn
                } else {
                    CompOp::In
                };
                Ok(FilterUnit {
                    left,
                    op,
                    right: FilterOperand::ValueList(values),
                    or_conj: false,
                })
            }

            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let left =
                    self.compile_operand(expr, scope, enclosing, outer_seen, allow_aggregate)?;
                let plan = self.plan_subquery(subquery, scope, enclosing, outer_seen)?;
                let op = if *negated != negate {
                    CompOp::NotIn
                } else {
                    CompOp::In
                };
                Ok(FilterUnit {
                    left,
                    op,
                    right: FilterOperand::SubSelect(Box::new(plan)),
                    or_conj: false,
                })
            }

            Expr::Exists { subquery, negated } => {
                let plan = self.plan_subquery(subquery, scope, enclosing, outer_seen)?;
                let op = if *negated != negate {
                    CompOp::NotExists
                } else {
                    CompOp::Exists
                };
                Ok(FilterUnit {
                    left: FilterOperand::Expr(BoundExpr::Value(Value::Null)),
                    op,
                    right: FilterOperand::SubSelect(Box::new(plan)),
                    or_conj: false,
                })
            }

            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let left =
                    self.compile_operand(expr, scope, enclosing, outer_seen, allow_aggregate)?;
                let right =
                    self.compile_operand(pattern, scope, enclosing, outer_seen, allow_aggregate)?;
                for operand in [&left, &right] {
                    if let FilterOperand::Expr(e) = operand {
                        if let Some(ty) = e.ty() {
                            if !ty.is_string() {
                                return Err(ExecutorError::TypeMismatch {
                                    expected: "a string operand for LIKE".to_string(),
                                    found: ty.display_name().to_string(),
                                });
                            }
                        }
                    }
                }
                let op = if *negated != negate {
                    CompOp::NotLike
                } else {
                    CompOp::Like
                };
                Ok(FilterUnit {
                    left,
                    op,
                    right,
                    or_conj: false,
                })
            }

            _ => Err(ExecutorError::InvalidArgument(
                "expected a condition".to_string(),
            )),
        }
    }

    fn compile_operand(
        &self,
        expr: &Expr,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
        allow_aggregate: bool,
    ) -> Result<FilterOperand, ExecutorError> {
        if let Expr::Subquery(subquery) = expr {
            let plan = self.plan_subquery(subquery, scope, enclosing, outer_seen)?;
            return Ok(FilterOperand::SubSelect(Box::new(plan)));
        }
        let bound = self.bind_scalar(expr, scope, enclosing, outer_seen, allow_aggregate)?;
        Ok(FilterOperand::Expr(self.fold(bound)?))
    }

    /// Plans a subquery with the current scope reachable as an enclosing
    /// scope. Checks single-column output.
    fn plan_subquery(
        &self,
        stmt: &SelectStmt,
        scope: &Scope,
        enclosing: &[Scope],
        outer_seen: &mut bool,
    ) -> Result<SubqueryPlan, ExecutorError> {
        let mut scopes = enclosing.to_vec();
        scopes.push(scope.clone());
        let mut child_outer = false;
        let plan = self.plan_select(stmt, &scopes, &mut child_outer)?;
        let width = plan.columns().len();
        if width != 1 {
            return Err(ExecutorError::SubqueryArity { found: width });
        }
        if child_outer {
            *outer_seen = true;
        }
        Ok(SubqueryPlan::new(plan, child_outer))
    }

    /// Bind-time comparability check for the operand pair of an ordering
    /// comparison, following the engine's coercion lattice.
    fn check_comparison(
        &self,
        left: &FilterOperand,
        right: &FilterOperand,
    ) -> Result<(), ExecutorError> {
        let info = |operand: &FilterOperand| -> (Option<Type>, Option<Value>) {
            match operand {
                FilterOperand::Expr(BoundExpr::Value(v)) => (v.ty(), Some(v.clone())),
                FilterOperand::Expr(e) => (e.ty(), None),
                FilterOperand::SubSelect(plan) => (
                    plan.plan.columns().first().and_then(|c| c.ty),
                    None,
                ),
                FilterOperand::ValueList(_) => (None, None),
            }
        };
        let (lty, lval) = info(left);
        let (rty, rval) = info(right);
        let (Some(lty), Some(rty)) = (lty, rty) else {
            return Ok(());
        };

        let mismatch = || ExecutorError::TypeMismatch {
            expected: lty.display_name().to_string(),
            found: rty.display_name().to_string(),
        };

        if lty.is_numeric() && rty.is_numeric() {
            return Ok(());
        }
        if lty.is_string() && rty.is_string() {
            return Ok(());
        }
        if lty == Type::Date && rty == Type::Date {
            return Ok(());
        }
        // String against date is legal when the string side, if constant,
        // parses as a date literal.
        let string_date = |string_val: &Option<Value>| -> Result<(), ExecutorError> {
            match string_val {
                Some(v) => match v.as_str() {
                    Some(s) if crate::datum::parse_date(s).is_none() => Err(mismatch()),
                    _ => Ok(()),
                },
                None => Ok(()),
            }
        };
        if lty.is_string() && rty == Type::Date {
            return string_date(&lval);
        }
        if lty == Type::Date && rty.is_string() {
            return string_date(&rval);
        }

        Err(mismatch())
    }

    // ------------------------------------------------------------------
    // DML
    // ------------------------------------------------------------------

    fn plan_insert(&self, stmt: &InsertStmt) -> Result<Plan, ExecutorError> {
        let meta = self.lookup_table(&stmt.table)?;

        let positions: Vec<usize> = if stmt.columns.is_empty() {
            (0..meta.fields.len()).collect()
        } else {
            stmt.columns
                .iter()
                .map(|name| {
                    meta.field_index(name)
                        .ok_or_else(|| ExecutorError::FieldNotFound { name: name.clone() })
                })
                .collect::<Result<_, _>>()?
        };

        let mut rows = Vec::with_capacity(stmt.rows.len());
        for row in &stmt.rows {
            if row.len() != positions.len() {
                return Err(ExecutorError::InvalidArgument(format!(
                    "expected {} values, got {}",
                    positions.len(),
                    row.len()
                )));
            }
            let mut full = vec![Value::Null; meta.fields.len()];
            for (expr, &pos) in row.iter().zip(&positions) {
                let bound = self.bind_scalar(expr, &Scope::default(), &[], &mut false, false)?;
                let BoundExpr::Value(value) = self.fold(bound)? else {
                    return Err(ExecutorError::InvalidArgument(
                        "INSERT values must be constants".to_string(),
                    ));
                };
                full[pos] = coerce_for_field(value, &meta.fields[pos])?;
            }
            for (value, field) in full.iter().zip(&meta.fields) {
                if value.is_null() && !field.nullable {
                    return Err(ExecutorError::NotNullViolation {
                        column: field.name.clone(),
                    });
                }
            }
            rows.push(full);
        }

        Ok(Plan::Dml(DmlPlan::Insert { table: meta, rows }))
    }

    fn plan_update(&self, stmt: &UpdateStmt) -> Result<Plan, ExecutorError> {
        let meta = self.lookup_table(&stmt.table)?;
        let (scope, scan) = self.plan_dml_scan(&meta, stmt.where_clause.as_ref())?;

        let mut assignments = Vec::with_capacity(stmt.assignments.len());
        for Assignment { column, value } in &stmt.assignments {
            let index = meta
                .field_index(column)
                .ok_or_else(|| ExecutorError::FieldNotFound {
                    name: column.clone(),
                })?;
            let field = &meta.fields[index];

            let source = match value {
                Expr::Subquery(subquery) => {
                    let plan =
                        self.plan_subquery(subquery, &scope, &[], &mut false)?;
                    UpdateSource::SubSelect(plan)
                }
                _ => {
                    let bound =
                        self.bind_scalar(value, &scope, &[], &mut false, false)?;
                    let bound = self.fold(bound)?;
                    if let BoundExpr::Value(v) = &bound {
                        // Constants coerce now so bad literals fail at
                        // bind time.
                        let coerced = coerce_for_field(v.clone(), field)?;
                        if coerced.is_null() && !field.nullable {
                            return Err(ExecutorError::NotNullViolation {
                                column: field.name.clone(),
                            });
                        }
                        UpdateSource::Expr(BoundExpr::Value(coerced))
                    } else {
                        UpdateSource::Expr(bound)
                    }
                }
            };
            assignments.push((index, source));
        }

        Ok(Plan::Dml(DmlPlan::Update {
            table: meta,
            scan,
            assignments,
        }))
    }

    fn plan_delete(&self, stmt: &DeleteStmt) -> Result<Plan, ExecutorError> {
        let meta = self.lookup_table(&stmt.table)?;
        let (_, scan) = self.plan_dml_scan(&meta, stmt.where_clause.as_ref())?;
        Ok(Plan::Dml(DmlPlan::Delete { table: meta, scan }))
    }

    /// Builds the scan feeding an UPDATE or DELETE: the target table with
    /// the WHERE predicate pushed down.
    fn plan_dml_scan(
        &self,
        meta: &Arc<TableMeta>,
        where_clause: Option<&Expr>,
    ) -> Result<(Scope, QueryPlan), ExecutorError> {
        let mut scope = Scope::default();
        for field in &meta.fields {
            scope.columns.push(ColumnDesc {
                qualifier: Some(meta.name.clone()),
                name: field.name.clone(),
                ty: Some(field.ty),
                nullable: field.nullable,
            });
        }
        scope.tables.push((meta.name.clone(), meta.clone()));

        if let Some(w) = where_clause {
            if contains_aggregate(w) {
                return Err(ExecutorError::AggregateNotAllowed {
                    context: "the WHERE clause".to_string(),
                });
            }
        }
        let filter = where_clause
            .map(|w| self.compile_filter(w, &scope, &[], &mut false, false))
            .transpose()?;

        let scan = self.plan_single_table_scan(
            meta.clone(),
            meta.name.clone(),
            scope.columns.clone(),
            filter,
        );
        Ok((scope, scan))
    }

    // ------------------------------------------------------------------
    // DDL and utility
    // ------------------------------------------------------------------

    fn plan_create_table(&self, stmt: &CreateTableStmt) -> Result<Plan, ExecutorError> {
        let columns = stmt
            .columns
            .iter()
            .map(|col| {
                let (ty, len) = match col.data_type {
                    DataType::Int => (Type::Int, 0),
                    DataType::Float => (Type::Float, 0),
                    DataType::Char(n) => (Type::Chars, n as usize),
                    DataType::Date => (Type::Date, 0),
                    DataType::Text => (Type::Text, 0),
                };
                ColumnSpec {
                    name: col.name.clone(),
                    ty,
                    len,
                    nullable: col.nullable,
                }
            })
            .collect();
        Ok(Plan::CreateTable {
            name: stmt.name.clone(),
            columns,
        })
    }

    fn plan_create_index(&self, stmt: &CreateIndexStmt) -> Result<Plan, ExecutorError> {
        let meta = self.lookup_table(&stmt.table)?;
        if meta.field(&stmt.column).is_none() {
            return Err(ExecutorError::FieldNotFound {
                name: stmt.column.clone(),
            });
        }
        Ok(Plan::CreateIndex {
            index: IndexMeta {
                name: stmt.name.clone(),
                table: stmt.table.clone(),
                field: stmt.column.clone(),
                unique: stmt.unique,
            },
        })
    }

    fn plan_calc(&self, stmt: &CalcStmt) -> Result<QueryPlan, ExecutorError> {
        let scope = Scope::default();
        let mut exprs = Vec::new();
        let mut columns = Vec::new();
        for expr in &stmt.exprs {
            let bound = self.bind_scalar(expr, &scope, &[], &mut false, false)?;
            let bound = self.fold(bound)?;
            columns.push(ColumnDesc::computed(expr.display_text(), bound.ty()));
            exprs.push(bound);
        }
        Ok(QueryPlan::Calc { exprs, columns })
    }
}

/// Display name for a SELECT item without an alias.
fn item_name(expr: &Expr) -> String {
    match expr {
        Expr::ColumnRef { column, .. } => column.clone(),
        other => other.display_text(),
    }
}

fn field_expr(index: usize, desc: &ColumnDesc) -> BoundExpr {
    BoundExpr::Field {
        index,
        name: match &desc.qualifier {
            Some(q) => format!("{}.{}", q, desc.name),
            None => desc.name.clone(),
        },
        ty: desc.ty.unwrap_or(Type::Chars),
    }
}

/// Returns true if the AST expression contains an aggregate call
/// (subqueries excluded: their aggregates are their own).
fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function { name, args } => {
            AggregateFunction::from_name(name).is_some()
                || args.iter().any(contains_aggregate)
        }
        Expr::BinaryOp { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        Expr::Neg(e) | Expr::Not(e) => contains_aggregate(e),
        Expr::IsNull { expr, .. } => contains_aggregate(expr),
        Expr::InList { expr, list, .. } => {
            contains_aggregate(expr) || list.iter().any(contains_aggregate)
        }
        Expr::InSubquery { expr, .. } => contains_aggregate(expr),
        Expr::Between {
            expr, low, high, ..
        } => contains_aggregate(expr) || contains_aggregate(low) || contains_aggregate(high),
        Expr::Like { expr, pattern, .. } => {
            contains_aggregate(expr) || contains_aggregate(pattern)
        }
        _ => false,
    }
}

/// Splits a single-table WHERE into a part pushed into the scan and a
/// part kept in a Filter above it. Only all-AND unit lists can be
/// partitioned; an OR chain moves as a whole or not at all. Units with
/// subquery operands never push down.
fn split_pushdown(filter: Option<FilterStmt>) -> (Option<FilterStmt>, Option<FilterStmt>) {
    let Some(filter) = filter else {
        return (None, None);
    };
    let pushable = |u: &FilterUnit| {
        !matches!(u.left, FilterOperand::SubSelect(_))
            && !matches!(u.right, FilterOperand::SubSelect(_))
    };
    if filter.units.iter().any(|u| u.or_conj) {
        if filter.units.iter().all(pushable) {
            return (Some(filter), None);
        }
        return (None, Some(filter));
    }
    let (pushed, rest): (Vec<_>, Vec<_>) = filter.units.into_iter().partition(pushable);
    (
        (!pushed.is_empty()).then(|| FilterStmt::new(pushed)),
        (!rest.is_empty()).then(|| FilterStmt::new(rest)),
    )
}

/// Structural expression equivalence that ignores display names: a field
/// reference expanded from `*` (qualified name) still matches the same
/// column written bare in GROUP BY.
fn exprs_equivalent(a: &BoundExpr, b: &BoundExpr) -> bool {
    match (a, b) {
        (BoundExpr::Field { index: i, .. }, BoundExpr::Field { index: j, .. }) => i == j,
        (
            BoundExpr::OuterField {
                level: l1,
                index: i1,
                ..
            },
            BoundExpr::OuterField {
                level: l2,
                index: i2,
                ..
            },
        ) => l1 == l2 && i1 == i2,
        (BoundExpr::Value(x), BoundExpr::Value(y)) => x == y,
        (
            BoundExpr::Arith {
                op: o1,
                left: l1,
                right: r1,
            },
            BoundExpr::Arith {
                op: o2,
                left: l2,
                right: r2,
            },
        ) => o1 == o2 && exprs_equivalent(l1, l2) && exprs_equivalent(r1, r2),
        (BoundExpr::Neg(x), BoundExpr::Neg(y)) => exprs_equivalent(x, y),
        (
            BoundExpr::Func { func: f1, args: a1 },
            BoundExpr::Func { func: f2, args: a2 },
        ) => {
            f1 == f2
                && a1.len() == a2.len()
                && a1.iter().zip(a2).all(|(x, y)| exprs_equivalent(x, y))
        }
        (
            BoundExpr::Aggregate { func: f1, arg: a1 },
            BoundExpr::Aggregate { func: f2, arg: a2 },
        ) => {
            f1 == f2
                && match (a1, a2) {
                    (None, None) => true,
                    (Some(x), Some(y)) => exprs_equivalent(x, y),
                    _ => false,
                }
        }
        _ => false,
    }
}

/// Equivalence for aggregate ops (same function over an equivalent
/// argument), used to share one accumulator per distinct call.
fn aggregate_ops_equivalent(a: &AggregateOp, b: &AggregateOp) -> bool {
    a.func == b.func
        && match (&a.arg, &b.arg) {
            (None, None) => true,
            (Some(x), Some(y)) => exprs_equivalent(x, y),
            _ => false,
        }
}

/// Replaces group-key subexpressions and aggregate calls with field
/// references into the aggregation output (group keys first, then
/// aggregates). A leftover bare column is a GROUP BY violation.
fn rewrite_for_aggregate(
    expr: BoundExpr,
    group_exprs: &[BoundExpr],
    aggregates: &mut Vec<AggregateOp>,
) -> Result<BoundExpr, ExecutorError> {
    if let Some(pos) = group_exprs.iter().position(|g| exprs_equivalent(g, &expr)) {
        let ty = expr.ty().unwrap_or(Type::Chars);
        return Ok(BoundExpr::Field {
            index: pos,
            name: expr.to_string(),
            ty,
        });
    }

    match expr {
        BoundExpr::Aggregate { func, arg } => {
            let op = AggregateOp {
                func,
                arg: arg.map(|b| *b),
            };
            let pos = match aggregates.iter().position(|a| aggregate_ops_equivalent(a, &op)) {
                Some(pos) => pos,
                None => {
                    aggregates.push(op);
                    aggregates.len() - 1
                }
            };
            Ok(BoundExpr::Field {
                index: group_exprs.len() + pos,
                name: aggregates[pos].to_string(),
                ty: aggregates[pos].output_type(),
            })
        }
        BoundExpr::Field { name, .. } => Err(ExecutorError::GroupByMissing { column: name }),
        BoundExpr::Arith { op, left, right } => Ok(BoundExpr::Arith {
            op,
            left: Box::new(rewrite_for_aggregate(*left, group_exprs, aggregates)?),
            right: Box::new(rewrite_for_aggregate(*right, group_exprs, aggregates)?),
        }),
        BoundExpr::Neg(e) => Ok(BoundExpr::Neg(Box::new(rewrite_for_aggregate(
            *e,
            group_exprs,
            aggregates,
        )?))),
        BoundExpr::Func { func, args } => Ok(BoundExpr::Func {
            func,
            args: args
                .into_iter()
                .map(|a| rewrite_for_aggregate(a, group_exprs, aggregates))
                .collect::<Result<_, _>>()?,
        }),
        other => Ok(other),
    }
}

/// Errors on integer division by a constant zero, the statement-boundary
/// case of division by zero.
fn check_const_int_division(expr: &BoundExpr) -> Result<(), ExecutorError> {
    match expr {
        BoundExpr::Arith { op, left, right } => {
            check_const_int_division(left)?;
            check_const_int_division(right)?;
            if *op == ArithOp::Div
                && left.evaluate_const().ok().map(|v| v.ty()) == Some(Some(Type::Int))
                && right.evaluate_const().ok() == Some(Value::Int(0))
            {
                return Err(ExecutorError::DivisionByZero);
            }
            Ok(())
        }
        BoundExpr::Neg(e) => check_const_int_division(e),
        BoundExpr::Func { args, .. } => {
            for arg in args {
                check_const_int_division(arg)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Coerces a constant value to a column's type, distinguishing a bad
/// date literal from a plain type mismatch.
fn coerce_for_field(
    value: Value,
    field: &crate::catalog::FieldMeta,
) -> Result<Value, ExecutorError> {
    if let Some(coerced) = value.coerce_to(field.ty) {
        return Ok(coerced);
    }
    if field.ty == Type::Date && value.as_str().is_some() {
        return Err(ExecutorError::InvalidArgument(format!(
            "\"{}\" is not a valid date",
            value.to_text()
        )));
    }
    Err(ExecutorError::TypeMismatch {
        expected: field.ty.display_name().to_string(),
        found: value
            .ty()
            .map(|t| t.display_name().to_string())
            .unwrap_or_else(|| "NULL".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Parser;

    fn catalog() -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::new());
        catalog
            .create_table(
                "u",
                &[
                    ColumnSpec {
                        name: "id".into(),
                        ty: Type::Int,
                        len: 0,
                        nullable: false,
                    },
                    ColumnSpec {
                        name: "n".into(),
                        ty: Type::Chars,
                        len: 4,
                        nullable: false,
                    },
                ],
            )
            .unwrap();
        catalog
            .create_table(
                "v",
                &[
                    ColumnSpec {
                        name: "uid".into(),
                        ty: Type::Int,
                        len: 0,
                        nullable: false,
                    },
                    ColumnSpec {
                        name: "m".into(),
                        ty: Type::Int,
                        len: 0,
                        nullable: true,
                    },
                ],
            )
            .unwrap();
        catalog
    }

    fn plan(sql: &str) -> Result<Plan, ExecutorError> {
        let stmt = Parser::new(sql).parse().unwrap().unwrap();
        Planner::new(catalog()).plan(&stmt)
    }

    fn query_plan(sql: &str) -> QueryPlan {
        match plan(sql).unwrap() {
            Plan::Query(q) => q,
            other => panic!("expected query plan, got {:?}", other),
        }
    }

    #[test]
    fn test_select_star_plans_projection_over_scan() {
        let q = query_plan("SELECT * FROM u");
        let QueryPlan::Projection { input, columns, .. } = q else {
            panic!("expected Projection");
        };
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert!(matches!(*input, QueryPlan::TableScan { .. }));
    }

    #[test]
    fn test_where_pushdown_into_scan() {
        let q = query_plan("SELECT id FROM u WHERE id > 1");
        let QueryPlan::Projection { input, .. } = q else {
            panic!("expected Projection");
        };
        let QueryPlan::TableScan { predicate, .. } = *input else {
            panic!("expected TableScan, got {:?}", input);
        };
        assert_eq!(predicate.unwrap().units.len(), 1);
    }

    #[test]
    fn test_unknown_table_and_column() {
        assert!(matches!(
            plan("SELECT * FROM missing").unwrap_err(),
            ExecutorError::TableNotFound { .. }
        ));
        assert!(matches!(
            plan("SELECT nope FROM u").unwrap_err(),
            ExecutorError::FieldNotFound { .. }
        ));
    }

    #[test]
    fn test_ambiguous_column() {
        // "id" exists only in u, but joining u twice makes it ambiguous.
        let err = plan("SELECT id FROM u a, u b").unwrap_err();
        assert!(matches!(err, ExecutorError::AmbiguousReference { .. }));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        assert!(matches!(
            plan("SELECT * FROM u, u").unwrap_err(),
            ExecutorError::DuplicateAlias { .. }
        ));
        assert!(matches!(
            plan("SELECT * FROM u a, v a").unwrap_err(),
            ExecutorError::DuplicateAlias { .. }
        ));
    }

    #[test]
    fn test_join_produces_nested_loop() {
        let q = query_plan("SELECT u.n, v.m FROM u INNER JOIN v ON u.id = v.uid");
        let QueryPlan::Projection { input, .. } = q else {
            panic!("expected Projection");
        };
        let QueryPlan::NestedLoopJoin { on, columns, .. } = *input else {
            panic!("expected NestedLoopJoin, got {:?}", input);
        };
        assert!(on.is_some());
        assert_eq!(columns.len(), 4);
    }

    #[test]
    fn test_comma_join_is_cartesian() {
        let q = query_plan("SELECT u.n, v.m FROM u, v");
        let QueryPlan::Projection { input, .. } = q else {
            panic!("expected Projection");
        };
        assert!(matches!(
            *input,
            QueryPlan::NestedLoopJoin { on: None, .. }
        ));
    }

    #[test]
    fn test_aggregate_rewrite() {
        let q = query_plan("SELECT uid, COUNT(*) FROM v GROUP BY uid HAVING COUNT(*) > 1");
        let QueryPlan::Projection { input, exprs, .. } = q else {
            panic!("expected Projection");
        };
        // Both output expressions are fields over the aggregate output.
        assert!(matches!(exprs[0], BoundExpr::Field { index: 0, .. }));
        assert!(matches!(exprs[1], BoundExpr::Field { index: 1, .. }));
        let QueryPlan::Aggregate {
            group_exprs,
            aggregates,
            having,
            ..
        } = *input
        else {
            panic!("expected Aggregate, got {:?}", input);
        };
        assert_eq!(group_exprs.len(), 1);
        assert_eq!(aggregates.len(), 1);
        assert!(having.is_some());
    }

    #[test]
    fn test_group_by_missing_detected() {
        assert!(matches!(
            plan("SELECT m, COUNT(*) FROM v").unwrap_err(),
            ExecutorError::GroupByMissing { .. }
        ));
        assert!(matches!(
            plan("SELECT m, COUNT(*) FROM v GROUP BY uid").unwrap_err(),
            ExecutorError::GroupByMissing { .. }
        ));
    }

    #[test]
    fn test_aggregate_in_where_rejected() {
        assert!(matches!(
            plan("SELECT * FROM v WHERE COUNT(*) > 1").unwrap_err(),
            ExecutorError::AggregateNotAllowed { .. }
        ));
    }

    #[test]
    fn test_type_mismatch_int_vs_string() {
        assert!(matches!(
            plan("SELECT * FROM u WHERE id = 'x'").unwrap_err(),
            ExecutorError::TypeMismatch { .. }
        ));
    }

    /// Finds the first subquery operand anywhere in a plan tree.
    fn find_subquery(plan: &QueryPlan) -> Option<&SubqueryPlan> {
        fn in_filter(f: &FilterStmt) -> Option<&SubqueryPlan> {
            f.units.iter().find_map(|u| {
                for operand in [&u.left, &u.right] {
                    if let FilterOperand::SubSelect(p) = operand {
                        return Some(p.as_ref());
                    }
                }
                None
            })
        }
        match plan {
            QueryPlan::Projection { input, .. } | QueryPlan::Sort { input, .. } => {
                find_subquery(input)
            }
            QueryPlan::Filter { input, predicate } => {
                in_filter(predicate).or_else(|| find_subquery(input))
            }
            QueryPlan::TableScan { predicate, .. } | QueryPlan::IndexScan { predicate, .. } => {
                predicate.as_ref().and_then(in_filter)
            }
            _ => None,
        }
    }

    #[test]
    fn test_correlated_subquery_marked() {
        let q = query_plan(
            "SELECT n FROM u WHERE EXISTS (SELECT uid FROM v WHERE v.uid = u.id)",
        );
        let sub = find_subquery(&q).expect("subquery in plan");
        assert!(sub.correlated);
    }

    #[test]
    fn test_uncorrelated_subquery_not_marked() {
        let q = query_plan("SELECT n FROM u WHERE id IN (SELECT uid FROM v)");
        let sub = find_subquery(&q).expect("subquery in plan");
        assert!(!sub.correlated);
    }

    #[test]
    fn test_subquery_arity_checked() {
        assert!(matches!(
            plan("SELECT n FROM u WHERE id IN (SELECT uid, m FROM v)").unwrap_err(),
            ExecutorError::SubqueryArity { found: 2 }
        ));
    }

    #[test]
    fn test_between_compiles_to_two_units() {
        let q = query_plan("SELECT id FROM u WHERE id BETWEEN 1 AND 3");
        let QueryPlan::Projection { input, .. } = q else {
            panic!("expected Projection");
        };
        let QueryPlan::TableScan { predicate, .. } = *input else {
            panic!("expected TableScan");
        };
        let units = predicate.unwrap().units;
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].op, CompOp::GtEq);
        assert_eq!(units[1].op, CompOp::LtEq);
        assert!(!units[1].or_conj);
    }

    #[test]
    fn test_constant_folding_of_functions() {
        let Plan::Query(QueryPlan::Calc { exprs, .. }) = plan("CALC LENGTH('abc')").unwrap()
        else {
            panic!("expected Calc");
        };
        assert_eq!(exprs[0], BoundExpr::Value(Value::Int(3)));
    }

    #[test]
    fn test_constant_int_division_by_zero_errors() {
        assert!(matches!(
            plan("CALC 1/0").unwrap_err(),
            ExecutorError::DivisionByZero
        ));
        // Float division folds to NULL instead.
        assert!(plan("CALC 1.0/0.0").is_ok());
    }

    #[test]
    fn test_bad_function_argument_at_bind_time() {
        assert!(matches!(
            plan("CALC LENGTH(1)").unwrap_err(),
            ExecutorError::FunctionArgument { .. }
        ));
        assert!(matches!(
            plan("CALC ROUND('x')").unwrap_err(),
            ExecutorError::FunctionArgument { .. }
        ));
    }

    #[test]
    fn test_insert_validation() {
        let Plan::Dml(DmlPlan::Insert { rows, .. }) =
            plan("INSERT INTO u VALUES (1, 'ab'), (2, 'cd')").unwrap()
        else {
            panic!("expected Insert");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Value::Int(1), Value::Chars("ab".into())]);

        assert!(matches!(
            plan("INSERT INTO u VALUES (1)").unwrap_err(),
            ExecutorError::InvalidArgument(_)
        ));
        assert!(matches!(
            plan("INSERT INTO u VALUES ('x', 'y')").unwrap_err(),
            ExecutorError::TypeMismatch { .. }
        ));
        assert!(matches!(
            plan("INSERT INTO u (id) VALUES (1)").unwrap_err(),
            ExecutorError::NotNullViolation { .. }
        ));
    }

    #[test]
    fn test_insert_int_widens_to_float_column() {
        let catalog = Arc::new(Catalog::new());
        catalog
            .create_table(
                "f",
                &[ColumnSpec {
                    name: "x".into(),
                    ty: Type::Float,
                    len: 0,
                    nullable: false,
                }],
            )
            .unwrap();
        let stmt = Parser::new("INSERT INTO f VALUES (2)")
            .parse()
            .unwrap()
            .unwrap();
        let Plan::Dml(DmlPlan::Insert { rows, .. }) =
            Planner::new(catalog).plan(&stmt).unwrap()
        else {
            panic!("expected Insert");
        };
        assert_eq!(rows[0], vec![Value::Float(2.0)]);
    }

    #[test]
    fn test_update_plan() {
        let Plan::Dml(DmlPlan::Update { assignments, .. }) =
            plan("UPDATE v SET m = m + 1 WHERE uid = 1").unwrap()
        else {
            panic!("expected Update");
        };
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].0, 1);
        assert!(matches!(assignments[0].1, UpdateSource::Expr(_)));
    }

    #[test]
    fn test_update_with_subquery_source() {
        let Plan::Dml(DmlPlan::Update { assignments, .. }) =
            plan("UPDATE v SET m = (SELECT max(id) FROM u) WHERE uid = 1").unwrap()
        else {
            panic!("expected Update");
        };
        assert!(matches!(assignments[0].1, UpdateSource::SubSelect(_)));
    }

    #[test]
    fn test_set_requires_literal() {
        assert!(plan("SET x = 1").is_ok());
        assert!(plan("SET x = id").is_err());
    }

    #[test]
    fn test_load_data_unsupported() {
        assert!(matches!(
            plan("LOAD DATA INFILE 'f' INTO TABLE u").unwrap_err(),
            ExecutorError::Unsupported(_)
        ));
    }

    #[test]
    fn test_explain_wraps_plan() {
        assert!(matches!(
            plan("EXPLAIN SELECT * FROM u").unwrap(),
            Plan::Explain(_)
        ));
    }
}
