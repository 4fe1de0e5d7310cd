//! EXPLAIN formatting.
//!
//! Formats a [`Plan`] as an indented operator tree without executing it.

use super::plan::{DmlPlan, Plan, QueryPlan, UpdateSource};

/// Formats a plan as a human-readable tree, one node per line.
///
/// # Example output
///
/// ```text
/// Projection: n, m
///   Filter: u.id = v.uid
///     NestedLoopJoin
///       TableScan on u
///       TableScan on v
/// ```
pub fn explain_plan(plan: &Plan) -> String {
    let mut out = String::new();
    format_plan(plan, 0, &mut out);
    // Strip the trailing newline for a tidy single string.
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

fn format_plan(plan: &Plan, indent: usize, out: &mut String) {
    match plan {
        Plan::Query(query) => format_query(query, indent, out),
        Plan::Dml(dml) => format_dml(dml, indent, out),
        Plan::Explain(inner) => format_plan(inner, indent, out),
        Plan::CreateTable { name, columns } => {
            line(out, indent, &format!("CreateTable {} ({} columns)", name, columns.len()));
        }
        Plan::DropTable { name } => line(out, indent, &format!("DropTable {}", name)),
        Plan::CreateIndex { index } => {
            let unique = if index.unique { "unique " } else { "" };
            line(
                out,
                indent,
                &format!(
                    "CreateIndex {} ({}index on {}.{})",
                    index.name, unique, index.table, index.field
                ),
            );
        }
        Plan::DropIndex { name } => line(out, indent, &format!("DropIndex {}", name)),
        Plan::ShowTables => line(out, indent, "ShowTables"),
        Plan::DescTable { name } => line(out, indent, &format!("DescTable {}", name)),
        Plan::SetVariable { name, .. } => line(out, indent, &format!("SetVariable {}", name)),
        Plan::Begin => line(out, indent, "Begin"),
        Plan::Commit => line(out, indent, "Commit"),
        Plan::Rollback => line(out, indent, "Rollback"),
    }
}

fn format_query(plan: &QueryPlan, indent: usize, out: &mut String) {
    match plan {
        QueryPlan::TableScan {
            qualifier,
            predicate,
            ..
        } => {
            let mut text = format!("TableScan on {}", qualifier);
            if let Some(p) = predicate {
                text.push_str(&format!(" (filter: {})", p));
            }
            line(out, indent, &text);
        }
        QueryPlan::IndexScan {
            qualifier,
            index,
            key,
            predicate,
            ..
        } => {
            let mut text = format!(
                "IndexScan on {} using {} (key = {})",
                qualifier, index.name, key
            );
            if let Some(p) = predicate {
                text.push_str(&format!(" (filter: {})", p));
            }
            line(out, indent, &text);
        }
        QueryPlan::Filter { input, predicate } => {
            line(out, indent, &format!("Filter: {}", predicate));
            format_query(input, indent + 1, out);
        }
        QueryPlan::NestedLoopJoin {
            left, right, on, ..
        } => {
            match on {
                Some(on) => line(out, indent, &format!("NestedLoopJoin on {}", on)),
                None => line(out, indent, "NestedLoopJoin"),
            }
            format_query(left, indent + 1, out);
            format_query(right, indent + 1, out);
        }
        QueryPlan::Aggregate {
            input,
            group_exprs,
            aggregates,
            having,
            ..
        } => {
            let groups: Vec<String> = group_exprs.iter().map(|e| e.to_string()).collect();
            let aggs: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
            let mut text = String::from("Aggregate: ");
            if !groups.is_empty() {
                text.push_str(&format!("group by {} ", groups.join(", ")));
            }
            text.push_str(&aggs.join(", "));
            if let Some(h) = having {
                text.push_str(&format!(" having {}", h));
            }
            line(out, indent, text.trim_end());
            format_query(input, indent + 1, out);
        }
        QueryPlan::Sort { input, keys } => {
            let keys: Vec<String> = keys
                .iter()
                .map(|k| {
                    format!(
                        "{} {}",
                        k.expr,
                        if k.desc { "DESC" } else { "ASC" }
                    )
                })
                .collect();
            line(out, indent, &format!("Sort: {}", keys.join(", ")));
            format_query(input, indent + 1, out);
        }
        QueryPlan::Projection {
            input, columns, ..
        } => {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            line(out, indent, &format!("Projection: {}", names.join(", ")));
            format_query(input, indent + 1, out);
        }
        QueryPlan::Calc { exprs, .. } => {
            let exprs: Vec<String> = exprs.iter().map(|e| e.to_string()).collect();
            line(out, indent, &format!("Calc: {}", exprs.join(", ")));
        }
    }
}

fn format_dml(plan: &DmlPlan, indent: usize, out: &mut String) {
    match plan {
        DmlPlan::Insert { table, rows } => {
            line(
                out,
                indent,
                &format!("Insert into {} ({} rows)", table.name, rows.len()),
            );
        }
        DmlPlan::Update {
            table,
            scan,
            assignments,
        } => {
            let sets: Vec<String> = assignments
                .iter()
                .map(|(i, source)| {
                    let name = &table.fields[*i].name;
                    match source {
                        UpdateSource::Expr(e) => format!("{} = {}", name, e),
                        UpdateSource::SubSelect(_) => format!("{} = (SELECT ...)", name),
                    }
                })
                .collect();
            line(
                out,
                indent,
                &format!("Update {} set {}", table.name, sets.join(", ")),
            );
            format_query(scan, indent + 1, out);
        }
        DmlPlan::Delete { table, scan } => {
            line(out, indent, &format!("Delete from {}", table.name));
            format_query(scan, indent + 1, out);
        }
    }
}

fn line(out: &mut String, indent: usize, text: &str) {
    out.push_str(&"  ".repeat(indent));
    out.push_str(text);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, ColumnSpec};
    use crate::datum::Type;
    use crate::executor::Planner;
    use crate::sql::Parser;
    use std::sync::Arc;

    fn explain(sql: &str) -> String {
        let catalog = Arc::new(Catalog::new());
        catalog
            .create_table(
                "t",
                &[
                    ColumnSpec {
                        name: "a".into(),
                        ty: Type::Int,
                        len: 0,
                        nullable: false,
                    },
                    ColumnSpec {
                        name: "b".into(),
                        ty: Type::Chars,
                        len: 4,
                        nullable: true,
                    },
                ],
            )
            .unwrap();
        let stmt = Parser::new(sql).parse().unwrap().unwrap();
        let plan = Planner::new(catalog).plan(&stmt).unwrap();
        explain_plan(&plan)
    }

    #[test]
    fn test_explain_scan_with_filter() {
        let text = explain("SELECT a FROM t WHERE a > 1");
        assert_eq!(text, "Projection: a\n  TableScan on t (filter: a > 1)");
    }

    #[test]
    fn test_explain_sort() {
        let text = explain("SELECT * FROM t ORDER BY a DESC");
        assert_eq!(
            text,
            "Projection: a, b\n  Sort: a DESC\n    TableScan on t"
        );
    }

    #[test]
    fn test_explain_aggregate() {
        let text = explain("SELECT a, COUNT(*) FROM t GROUP BY a");
        assert_eq!(
            text,
            "Projection: a, COUNT(*)\n  Aggregate: group by a COUNT(*)\n    TableScan on t"
        );
    }

    #[test]
    fn test_explain_dml() {
        let text = explain("DELETE FROM t WHERE a = 1");
        assert_eq!(text, "Delete from t\n  TableScan on t (filter: a = 1)");
    }
}
