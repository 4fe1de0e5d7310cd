//! End-to-end SQL tests driving the public `Database::execute` API.

use rill::datum::Value;
use rill::db::{Database, QueryResult};

fn rows(result: &QueryResult) -> Vec<Vec<Value>> {
    result.rows().expect("expected rows").rows.clone()
}

fn ints(result: &QueryResult) -> Vec<Vec<i32>> {
    rows(result)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|v| match v {
                    Value::Int(n) => n,
                    other => panic!("expected INT, got {:?}", other),
                })
                .collect()
        })
        .collect()
}

fn setup_join_tables() -> std::sync::Arc<Database> {
    let db = Database::new();
    db.execute("CREATE TABLE u(id INT, n CHAR(4))").unwrap();
    db.execute("CREATE TABLE v(uid INT, m INT)").unwrap();
    db.execute("INSERT INTO u VALUES (1,'A'), (2,'B')").unwrap();
    db.execute("INSERT INTO v VALUES (1,10), (1,20), (2,30)")
        .unwrap();
    db
}

#[test]
fn schema_insert_select_order_by_desc() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b CHAR(8))").unwrap();
    db.execute("INSERT INTO t VALUES (1,'x'), (2,'y')").unwrap();

    let result = db.execute("SELECT * FROM t ORDER BY a DESC").unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Int(2), Value::Chars("y".into())],
            vec![Value::Int(1), Value::Chars("x".into())],
        ]
    );
}

#[test]
fn inner_join_with_on() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT u.n, v.m FROM u INNER JOIN v ON u.id = v.uid")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Chars("A".into()), Value::Int(10)],
            vec![Value::Chars("A".into()), Value::Int(20)],
            vec![Value::Chars("B".into()), Value::Int(30)],
        ]
    );
}

#[test]
fn comma_join_with_where_matches_inner_join() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT u.n, v.m FROM u, v WHERE u.id = v.uid")
        .unwrap();
    assert_eq!(rows(&result).len(), 3);
}

#[test]
fn group_by_having() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT uid, COUNT(*) FROM v GROUP BY uid HAVING COUNT(*) > 1")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![1, 2]]);
}

#[test]
fn aggregate_functions_over_groups() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT uid, SUM(m), MIN(m), MAX(m), AVG(m) FROM v GROUP BY uid")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![
                Value::Int(1),
                Value::Int(30),
                Value::Int(10),
                Value::Int(20),
                Value::Float(15.0)
            ],
            vec![
                Value::Int(2),
                Value::Int(30),
                Value::Int(30),
                Value::Int(30),
                Value::Float(30.0)
            ],
        ]
    );
}

#[test]
fn correlated_exists_subquery() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT n FROM u WHERE EXISTS (SELECT 1 FROM v WHERE v.uid = u.id AND v.m > 15)")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Chars("A".into())],
            vec![Value::Chars("B".into())],
        ]
    );

    let result = db
        .execute(
            "SELECT n FROM u WHERE EXISTS (SELECT uid FROM v WHERE v.uid = u.id AND v.m > 25)",
        )
        .unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("B".into())]]);
}

#[test]
fn not_exists_subquery() {
    let db = setup_join_tables();
    db.execute("INSERT INTO u VALUES (3,'C')").unwrap();
    let result = db
        .execute("SELECT n FROM u WHERE NOT EXISTS (SELECT uid FROM v WHERE v.uid = u.id)")
        .unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("C".into())]]);
}

#[test]
fn in_subquery_membership() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT n FROM u WHERE id IN (SELECT uid FROM v WHERE m > 15)")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Chars("A".into())],
            vec![Value::Chars("B".into())],
        ]
    );

    let result = db
        .execute("SELECT n FROM u WHERE id NOT IN (SELECT uid FROM v WHERE m > 25)")
        .unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("A".into())]]);
}

#[test]
fn scalar_subquery_comparison() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT n FROM u WHERE id = (SELECT MIN(uid) FROM v)")
        .unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("A".into())]]);
}

#[test]
fn null_semantics_in_where() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT NULLABLE)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (NULL), (3)").unwrap();

    // NULL never matches an ordering comparison.
    let result = db.execute("SELECT a FROM t WHERE a <> 1").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Int(3)]]);

    let result = db.execute("SELECT a FROM t WHERE a IS NULL").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Null]]);

    let result = db.execute("SELECT a FROM t WHERE a IS NOT NULL").unwrap();
    assert_eq!(ints(&result), vec![vec![1], vec![3]]);
}

#[test]
fn scalar_functions() {
    let db = Database::new();
    let result = db.execute("SELECT ROUND(3.14159, 2)").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Float(3.14)]]);

    let result = db.execute("SELECT LENGTH('abc')").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Int(3)]]);

    let result = db.execute("CALC ROUND(2.5), 1+2*3").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Int(3), Value::Int(7)]]);
}

#[test]
fn date_format_function() {
    let db = Database::new();
    db.execute("CREATE TABLE d(day DATE)").unwrap();
    db.execute("INSERT INTO d VALUES ('2024-03-01')").unwrap();
    let result = db
        .execute("SELECT DATE_FORMAT(day, '%M %D, %Y') FROM d")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![vec![Value::Chars("March 1st, 2024".into())]]
    );
}

#[test]
fn date_comparisons_and_validation() {
    let db = Database::new();
    db.execute("CREATE TABLE d(day DATE)").unwrap();
    db.execute("INSERT INTO d VALUES ('2024-01-15'), ('2024-06-01')")
        .unwrap();

    let result = db
        .execute("SELECT day FROM d WHERE day > '2024-02-01'")
        .unwrap();
    assert_eq!(rows(&result).len(), 1);

    // Invalid dates are rejected at bind time.
    assert!(db.execute("INSERT INTO d VALUES ('2024-02-30')").is_err());
    assert!(db
        .execute("SELECT day FROM d WHERE day > '2024-13-01'")
        .is_err());
}

#[test]
fn count_on_empty_input() {
    let db = Database::new();
    db.execute("CREATE TABLE t(x INT)").unwrap();

    let result = db.execute("SELECT COUNT(*) FROM t WHERE 1 = 0").unwrap();
    assert_eq!(ints(&result), vec![vec![0]]);

    let result = db.execute("SELECT SUM(x) FROM t WHERE 1 = 0").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Null]]);

    // Grouped aggregation over no rows emits no rows.
    let result = db
        .execute("SELECT x, COUNT(*) FROM t GROUP BY x")
        .unwrap();
    assert!(rows(&result).is_empty());
}

#[test]
fn aggregates_skip_nulls() {
    let db = Database::new();
    db.execute("CREATE TABLE t(x INT NULLABLE)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (NULL), (3)").unwrap();

    let result = db
        .execute("SELECT COUNT(*), COUNT(x), SUM(x), AVG(x) FROM t")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![vec![
            Value::Int(3),
            Value::Int(2),
            Value::Int(4),
            Value::Float(2.0)
        ]]
    );
}

#[test]
fn null_group_keys_form_one_group() {
    let db = Database::new();
    db.execute("CREATE TABLE t(k INT NULLABLE, x INT)").unwrap();
    db.execute("INSERT INTO t VALUES (NULL, 1), (NULL, 2), (7, 3)")
        .unwrap();
    let result = db
        .execute("SELECT k, COUNT(*) FROM t GROUP BY k")
        .unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Null, Value::Int(2)],
            vec![Value::Int(7), Value::Int(1)],
        ]
    );
}

#[test]
fn like_patterns() {
    let db = Database::new();
    db.execute("CREATE TABLE t(s CHAR(16))").unwrap();
    db.execute("INSERT INTO t VALUES ('sailing'), ('salt'), ('tide')")
        .unwrap();

    let result = db.execute("SELECT s FROM t WHERE s LIKE 'sa%'").unwrap();
    assert_eq!(rows(&result).len(), 2);

    let result = db.execute("SELECT s FROM t WHERE s LIKE '_ide'").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("tide".into())]]);

    let result = db
        .execute("SELECT s FROM t WHERE s NOT LIKE 'sa%'")
        .unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("tide".into())]]);
}

#[test]
fn between_and_in_lists() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (2), (3), (4), (5)")
        .unwrap();

    let result = db
        .execute("SELECT a FROM t WHERE a BETWEEN 2 AND 4")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![2], vec![3], vec![4]]);

    let result = db.execute("SELECT a FROM t WHERE a IN (1, 5, 9)").unwrap();
    assert_eq!(ints(&result), vec![vec![1], vec![5]]);

    let result = db
        .execute("SELECT a FROM t WHERE a NOT IN (1, 2, 3)")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![4], vec![5]]);

    let result = db
        .execute("SELECT a FROM t WHERE a NOT BETWEEN 2 AND 4")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![1], vec![5]]);
}

#[test]
fn and_or_precedence() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1, 1), (1, 2), (2, 1), (2, 2)")
        .unwrap();

    // a = 1 OR (a = 2 AND b = 2)
    let result = db
        .execute("SELECT a, b FROM t WHERE a = 1 OR a = 2 AND b = 2")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![1, 1], vec![1, 2], vec![2, 2]]);
}

#[test]
fn update_with_where_and_expression() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1, 10), (2, 20)").unwrap();

    db.execute("UPDATE t SET b = b + 1 WHERE a = 2").unwrap();
    let result = db.execute("SELECT b FROM t ORDER BY a").unwrap();
    assert_eq!(ints(&result), vec![vec![10], vec![21]]);
}

#[test]
fn update_from_scalar_subquery() {
    let db = setup_join_tables();
    db.execute("UPDATE u SET id = (SELECT MAX(m) FROM v) WHERE n = 'A'")
        .unwrap();
    let result = db.execute("SELECT id FROM u WHERE n = 'A'").unwrap();
    assert_eq!(ints(&result), vec![vec![30]]);
}

#[test]
fn update_scalar_subquery_row_count_errors() {
    let db = setup_join_tables();
    // Two rows from the subquery: statement error.
    assert!(db
        .execute("UPDATE u SET id = (SELECT m FROM v WHERE uid = 1)")
        .is_err());
    // Zero rows: also an error, not a NULL assignment.
    assert!(db
        .execute("UPDATE u SET id = (SELECT m FROM v WHERE uid = 99)")
        .is_err());
    // The failed statements changed nothing.
    let result = db.execute("SELECT id FROM u ORDER BY id").unwrap();
    assert_eq!(ints(&result), vec![vec![1], vec![2]]);
}

#[test]
fn delete_with_where() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (2), (3)").unwrap();

    db.execute("DELETE FROM t WHERE a <> 2").unwrap();
    let result = db.execute("SELECT a FROM t").unwrap();
    assert_eq!(ints(&result), vec![vec![2]]);
}

#[test]
fn index_scan_equality() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b CHAR(4))").unwrap();
    db.execute("CREATE INDEX t_a ON t(a)").unwrap();
    for i in 0..20 {
        db.execute(&format!("INSERT INTO t VALUES ({}, 'r{}')", i, i))
            .unwrap();
    }

    // The plan uses the index.
    let explain = db.execute("EXPLAIN SELECT * FROM t WHERE a = 7").unwrap();
    let text = rows(&explain)
        .iter()
        .map(|r| r[0].to_text())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(text.contains("IndexScan"), "plan was:\n{}", text);

    let result = db.execute("SELECT b FROM t WHERE a = 7").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Chars("r7".into())]]);
}

#[test]
fn unique_index_enforced_on_update() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT)").unwrap();
    db.execute("CREATE UNIQUE INDEX t_a ON t(a)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (2)").unwrap();

    assert!(db.execute("UPDATE t SET a = 1 WHERE a = 2").is_err());
    // Statement rolled back: both rows unchanged.
    let result = db.execute("SELECT a FROM t ORDER BY a").unwrap();
    assert_eq!(ints(&result), vec![vec![1], vec![2]]);
}

#[test]
fn table_alias_required_for_self_join() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1), (2)").unwrap();

    assert!(db.execute("SELECT * FROM t, t").is_err());
    let result = db
        .execute("SELECT x.a, y.a FROM t x, t y WHERE x.a < y.a")
        .unwrap();
    assert_eq!(ints(&result), vec![vec![1, 2]]);
}

#[test]
fn expressions_then_star_column_order() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b INT)").unwrap();
    db.execute("INSERT INTO t VALUES (1, 2)").unwrap();

    // Expression items come first in the output, then the * expansion.
    let result = db.execute("SELECT *, a + b AS s FROM t").unwrap();
    let set = result.rows().unwrap();
    assert_eq!(set.columns, vec!["s", "a", "b"]);
    assert_eq!(set.rows, vec![vec![Value::Int(3), Value::Int(1), Value::Int(2)]]);
}

#[test]
fn order_by_is_stable_and_nulls_sort_low() {
    let db = Database::new();
    db.execute("CREATE TABLE t(k INT NULLABLE, tag INT)").unwrap();
    db.execute("INSERT INTO t VALUES (2, 1), (1, 2), (2, 3), (NULL, 4), (1, 5)")
        .unwrap();

    let result = db.execute("SELECT k, tag FROM t ORDER BY k").unwrap();
    assert_eq!(
        rows(&result),
        vec![
            vec![Value::Null, Value::Int(4)],
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(1), Value::Int(5)],
            vec![Value::Int(2), Value::Int(1)],
            vec![Value::Int(2), Value::Int(3)],
        ]
    );

    let result = db.execute("SELECT k, tag FROM t ORDER BY k DESC").unwrap();
    let keys: Vec<Value> = rows(&result).into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(
        keys,
        vec![
            Value::Int(2),
            Value::Int(2),
            Value::Int(1),
            Value::Int(1),
            Value::Null
        ]
    );
}

#[test]
fn qualified_wildcard_expansion() {
    let db = setup_join_tables();
    let result = db
        .execute("SELECT v.*, u.n FROM u INNER JOIN v ON u.id = v.uid")
        .unwrap();
    let set = result.rows().unwrap();
    assert_eq!(set.columns, vec!["n", "uid", "m"]);
    assert_eq!(set.rows.len(), 3);
}

#[test]
fn cross_type_comparison_is_unmatched_or_error() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, s CHAR(8))").unwrap();
    db.execute("INSERT INTO t VALUES (1, 'x')").unwrap();

    // Statically-known illegal pairing fails at bind time.
    assert!(db.execute("SELECT * FROM t WHERE a = 'x'").is_err());
    // Legal pairing through coercion matches.
    let result = db.execute("SELECT * FROM t WHERE a = 1.0").unwrap();
    assert_eq!(rows(&result).len(), 1);
}

#[test]
fn text_columns_round_trip() {
    let db = Database::new();
    db.execute("CREATE TABLE t(id INT, body TEXT)").unwrap();
    let long = "long payload ".repeat(50);
    db.execute(&format!("INSERT INTO t VALUES (1, '{}')", long))
        .unwrap();
    let result = db.execute("SELECT body FROM t").unwrap();
    assert_eq!(rows(&result), vec![vec![Value::Text(long)]]);
}

#[test]
fn char_capacity_enforced() {
    let db = Database::new();
    db.execute("CREATE TABLE t(s CHAR(4))").unwrap();
    assert!(db.execute("INSERT INTO t VALUES ('too long')").is_err());
    assert!(db.execute("INSERT INTO t VALUES ('ok')").is_ok());
}

#[test]
fn uncorrelated_subquery_runs_once_per_statement() {
    // Observable only through correctness: the cached list still matches.
    let db = setup_join_tables();
    let result = db
        .execute("SELECT n FROM u WHERE id IN (SELECT uid FROM v)")
        .unwrap();
    assert_eq!(rows(&result).len(), 2);
}

#[test]
fn division_semantics() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT, b INT)").unwrap();
    db.execute("INSERT INTO t VALUES (6, 2), (5, 0)").unwrap();

    // Division by zero in a row expression yields NULL.
    let result = db.execute("SELECT a / b FROM t").unwrap();
    assert_eq!(
        rows(&result),
        vec![vec![Value::Int(3)], vec![Value::Null]]
    );

    // A constant integer division by zero fails the statement.
    assert!(db.execute("CALC 1/0").is_err());
}

#[test]
fn error_taxonomy_samples() {
    let db = Database::new();
    db.execute("CREATE TABLE t(a INT)").unwrap();

    assert!(db.execute("SELECT * FROM missing").is_err());
    assert!(db.execute("SELECT missing FROM t").is_err());
    assert!(db.execute("INSERT INTO t VALUES (1, 2)").is_err());
    assert!(db.execute("SELECT a, COUNT(*) FROM t").is_err());
    assert!(db.execute("SELECT * FROM t WHERE COUNT(*) > 0").is_err());
    assert!(db.execute("LOAD DATA INFILE 'x' INTO TABLE t").is_err());
    assert!(db.execute("CREATE TABLE t(a INT)").is_err());
    assert!(db.execute("DROP INDEX nothing").is_err());
}
