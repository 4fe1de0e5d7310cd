//! Abstract Syntax Tree (AST) for SQL statements.
//!
//! This module defines the data structures that represent parsed SQL
//! statements. The AST is produced by the parser and consumed by the
//! planner; every name in it is still unresolved text.

/// A SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT statement.
    Select(Box<SelectStmt>),
    /// INSERT statement.
    Insert(Box<InsertStmt>),
    /// UPDATE statement.
    Update(Box<UpdateStmt>),
    /// DELETE statement.
    Delete(Box<DeleteStmt>),
    /// CREATE TABLE statement.
    CreateTable(Box<CreateTableStmt>),
    /// DROP TABLE statement.
    DropTable(DropTableStmt),
    /// CREATE [UNIQUE] INDEX statement.
    CreateIndex(CreateIndexStmt),
    /// DROP INDEX statement.
    DropIndex(DropIndexStmt),
    /// CALC: evaluate expressions without reading a table.
    Calc(CalcStmt),
    /// EXPLAIN statement.
    Explain(Box<Statement>),
    /// SET statement (session variable).
    Set(SetStmt),
    /// LOAD DATA INFILE statement.
    LoadData(LoadDataStmt),
    /// SHOW TABLES.
    ShowTables,
    /// DESC <table>.
    DescTable(String),
    /// BEGIN [TRANSACTION].
    Begin,
    /// COMMIT.
    Commit,
    /// ROLLBACK.
    Rollback,
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    /// Selected columns/expressions.
    pub columns: Vec<SelectItem>,
    /// Comma-separated FROM tables, in join order. Empty for FROM-less
    /// selects (which behave like CALC).
    pub from: Vec<TableRef>,
    /// INNER JOIN clauses applied after the FROM list, in source order.
    pub joins: Vec<JoinClause>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr>,
    /// HAVING clause.
    pub having: Option<Expr>,
    /// ORDER BY clause.
    pub order_by: Vec<OrderByItem>,
}

/// An item in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// SELECT * - all columns of all in-scope tables.
    Wildcard,
    /// SELECT rel.* - all columns of one table or alias.
    QualifiedWildcard(String),
    /// An expression with optional alias.
    Expr { expr: Expr, alias: Option<String> },
}

/// A base table reference in FROM, with an optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Table name.
    pub name: String,
    /// Alias, if given. Required when the same table appears twice.
    pub alias: Option<String>,
}

/// An INNER JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Joined table.
    pub table: TableRef,
    /// ON condition; `None` yields a cartesian product.
    pub on: Option<Expr>,
}

/// ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Expression to order by.
    pub expr: Expr,
    /// Sort direction.
    pub direction: SortDirection,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending order (NULLs sort first).
    #[default]
    Asc,
    /// Descending order (NULLs sort last).
    Desc,
}

/// INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    /// Target table name.
    pub table: String,
    /// Column names (empty means all columns in schema order).
    pub columns: Vec<String>,
    /// Rows of value expressions.
    pub rows: Vec<Vec<Expr>>,
}

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    /// Target table name.
    pub table: String,
    /// SET assignments.
    pub assignments: Vec<Assignment>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
}

/// SET assignment (column = value or column = (SELECT ...)).
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Column name.
    pub column: String,
    /// Value expression; a scalar subquery is allowed here.
    pub value: Expr,
}

/// DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    /// Target table name.
    pub table: String,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
}

/// CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    /// Table name.
    pub name: String,
    /// Column definitions.
    pub columns: Vec<ColumnDef>,
}

/// Column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type.
    pub data_type: DataType,
    /// Whether NULL is allowed. Columns default to NOT NULL; the NULLABLE
    /// or NULL keyword opts in.
    pub nullable: bool,
}

/// SQL data type as written in DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// INT.
    Int,
    /// FLOAT.
    Float,
    /// CHAR(n); defaults to CHAR(1) when no length is given.
    Char(u32),
    /// DATE.
    Date,
    /// TEXT.
    Text,
}

/// DROP TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStmt {
    /// Table name to drop.
    pub name: String,
}

/// CREATE [UNIQUE] INDEX statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    /// Index name.
    pub name: String,
    /// Table to create the index on.
    pub table: String,
    /// Indexed column.
    pub column: String,
    /// If true, duplicate keys are rejected.
    pub unique: bool,
}

/// DROP INDEX statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexStmt {
    /// Index name to drop.
    pub name: String,
}

/// CALC statement: expressions evaluated against no table.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcStmt {
    /// Expressions to evaluate.
    pub exprs: Vec<Expr>,
}

/// SET statement (session variable assignment).
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    /// Variable name.
    pub name: String,
    /// Value expression (must be a literal).
    pub value: Expr,
}

/// LOAD DATA INFILE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadDataStmt {
    /// Source file path.
    pub file: String,
    /// Target table.
    pub table: String,
}

/// Expression in SQL.
///
/// One enum covers both scalar expressions (projections, assignments) and
/// condition trees (WHERE/ON/HAVING); the planner decides which variants
/// are legal in which position.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// NULL literal.
    Null,
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Column reference (optionally qualified with a table name or alias).
    ColumnRef {
        table: Option<String>,
        column: String,
    },
    /// Binary operation.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary negation.
    Neg(Box<Expr>),
    /// NOT <condition>.
    Not(Box<Expr>),
    /// IS NULL / IS NOT NULL.
    IsNull { expr: Box<Expr>, negated: bool },
    /// IN list: expr [NOT] IN (value1, value2, ...).
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// IN subquery: expr [NOT] IN (SELECT ...).
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<SelectStmt>,
        negated: bool,
    },
    /// BETWEEN: expr [NOT] BETWEEN low AND high.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// LIKE: expr [NOT] LIKE pattern.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// EXISTS (subquery).
    Exists {
        subquery: Box<SelectStmt>,
        negated: bool,
    },
    /// Function call (aggregate or scalar).
    Function { name: String, args: Vec<Expr> },
    /// Scalar subquery expression.
    Subquery(Box<SelectStmt>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,

    // Comparison
    /// =
    Eq,
    /// <> or !=
    Neq,
    /// <
    Lt,
    /// <=
    LtEq,
    /// >
    Gt,
    /// >=
    GtEq,

    // Logical
    /// AND
    And,
    /// OR
    Or,
}

impl BinaryOperator {
    /// Returns the display string for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }

    /// Returns true for the comparison operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Returns true for the arithmetic operators.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div
        )
    }
}

impl Expr {
    /// Renders the expression back to SQL-ish text.
    ///
    /// Used for result-set column headers and EXPLAIN output, so it aims
    /// for readability over round-trip fidelity.
    pub fn display_text(&self) -> String {
        match self {
            Expr::Null => "NULL".to_string(),
            Expr::Integer(n) => n.to_string(),
            Expr::Float(n) => n.to_string(),
            Expr::String(s) => format!("'{}'", s),
            Expr::ColumnRef { table, column } => match table {
                Some(t) => format!("{}.{}", t, column),
                None => column.clone(),
            },
            Expr::BinaryOp { left, op, right } => format!(
                "{}{}{}",
                left.display_text(),
                op.as_str(),
                right.display_text()
            ),
            Expr::Neg(e) => format!("-{}", e.display_text()),
            Expr::Not(e) => format!("NOT {}", e.display_text()),
            Expr::IsNull { expr, negated } => {
                if *negated {
                    format!("{} IS NOT NULL", expr.display_text())
                } else {
                    format!("{} IS NULL", expr.display_text())
                }
            }
            Expr::InList { expr, negated, .. } | Expr::InSubquery { expr, negated, .. } => {
                if *negated {
                    format!("{} NOT IN (...)", expr.display_text())
                } else {
                    format!("{} IN (...)", expr.display_text())
                }
            }
            Expr::Between { expr, low, high, negated } => {
                let neg = if *negated { " NOT" } else { "" };
                format!(
                    "{}{} BETWEEN {} AND {}",
                    expr.display_text(),
                    neg,
                    low.display_text(),
                    high.display_text()
                )
            }
            Expr::Like { expr, pattern, negated } => {
                let neg = if *negated { " NOT" } else { "" };
                format!("{}{} LIKE {}", expr.display_text(), neg, pattern.display_text())
            }
            Expr::Exists { negated, .. } => {
                if *negated {
                    "NOT EXISTS (...)".to_string()
                } else {
                    "EXISTS (...)".to_string()
                }
            }
            Expr::Function { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.display_text()).collect();
                format!("{}({})", name.to_uppercase(), args.join(","))
            }
            Expr::Subquery(_) => "(SELECT ...)".to_string(),
        }
    }
}
