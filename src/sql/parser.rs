//! SQL parser using recursive descent.
//!
//! The [`Parser`] converts a stream of tokens into an Abstract Syntax Tree
//! (AST). It uses recursive descent for statements and precedence climbing
//! for expressions (see `expr.rs`).

use super::ast::*;
use super::error::{Span, SyntaxError};
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};

/// SQL parser that converts tokens into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Error the lexer hit, reported on the first `parse` call.
    lex_error: Option<SyntaxError>,
}

impl Parser {
    /// Creates a new parser for the given SQL input.
    pub fn new(input: &str) -> Self {
        let (tokens, lex_error) = match Lexer::new(input).tokenize() {
            Ok(tokens) => (tokens, None),
            Err(e) => (vec![Token::new(TokenKind::Eof, Span::at(0))], Some(e)),
        };
        Self {
            tokens,
            pos: 0,
            lex_error,
        }
    }

    /// Parses the input and returns a statement.
    ///
    /// Returns `Ok(None)` for empty queries (whitespace/comments only).
    pub fn parse(&mut self) -> Result<Option<Statement>, SyntaxError> {
        if let Some(err) = &self.lex_error {
            return Err(err.clone());
        }
        if self.is_eof() {
            return Ok(None);
        }

        let stmt = self.parse_statement()?;

        // Optional trailing semicolon
        self.consume_token(TokenKind::Semicolon);

        if !self.is_eof() {
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "end of input",
                &self.current_token_name(),
                span,
            ));
        }

        Ok(Some(stmt))
    }

    /// Parses a single expression followed by end of input (test helper).
    #[cfg(test)]
    pub(crate) fn parse_standalone_expr(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_expr()?;
        if !self.is_eof() {
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "end of input",
                &self.current_token_name(),
                span,
            ));
        }
        Ok(expr)
    }

    /// Parses a single statement.
    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        if self.consume_keyword(Keyword::Explain) {
            let inner = self.parse_statement()?;
            return Ok(Statement::Explain(Box::new(inner)));
        }

        if self.consume_keyword(Keyword::Begin) {
            self.consume_keyword(Keyword::Transaction);
            return Ok(Statement::Begin);
        }
        if self.consume_keyword(Keyword::Commit) {
            return Ok(Statement::Commit);
        }
        if self.consume_keyword(Keyword::Rollback) {
            return Ok(Statement::Rollback);
        }

        if self.consume_keyword(Keyword::Set) {
            let name = self.expect_identifier()?;
            self.expect_token(TokenKind::Eq)?;
            let value = self.parse_expr()?;
            return Ok(Statement::Set(SetStmt { name, value }));
        }

        if self.consume_keyword(Keyword::Create) {
            if self.consume_keyword(Keyword::Table) {
                return self.parse_create_table_stmt();
            }
            let unique = self.consume_keyword(Keyword::Unique);
            if self.consume_keyword(Keyword::Index) {
                return self.parse_create_index_stmt(unique);
            }
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "TABLE or INDEX",
                &self.current_token_name(),
                span,
            ));
        }

        if self.consume_keyword(Keyword::Drop) {
            if self.consume_keyword(Keyword::Table) {
                let name = self.expect_identifier()?;
                return Ok(Statement::DropTable(DropTableStmt { name }));
            }
            if self.consume_keyword(Keyword::Index) {
                let name = self.expect_identifier()?;
                return Ok(Statement::DropIndex(DropIndexStmt { name }));
            }
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "TABLE or INDEX",
                &self.current_token_name(),
                span,
            ));
        }

        if self.consume_keyword(Keyword::Show) {
            self.expect_keyword(Keyword::Tables)?;
            return Ok(Statement::ShowTables);
        }

        if self.consume_keyword(Keyword::Desc) {
            let name = self.expect_identifier()?;
            return Ok(Statement::DescTable(name));
        }

        if self.consume_keyword(Keyword::Load) {
            self.expect_keyword(Keyword::Data)?;
            self.expect_keyword(Keyword::Infile)?;
            let file = self.expect_string()?;
            self.expect_keyword(Keyword::Into)?;
            self.expect_keyword(Keyword::Table)?;
            let table = self.expect_identifier()?;
            return Ok(Statement::LoadData(LoadDataStmt { file, table }));
        }

        if self.consume_keyword(Keyword::Calc) {
            let exprs = self.parse_expr_list()?;
            return Ok(Statement::Calc(CalcStmt { exprs }));
        }

        if self.check_keyword(Keyword::Select) {
            let select = self.parse_select_stmt()?;
            return Ok(Statement::Select(Box::new(select)));
        }

        if self.consume_keyword(Keyword::Insert) {
            return self.parse_insert_stmt();
        }
        if self.consume_keyword(Keyword::Update) {
            return self.parse_update_stmt();
        }
        if self.consume_keyword(Keyword::Delete) {
            return self.parse_delete_stmt();
        }

        let span = self.current_span();
        Err(SyntaxError::unexpected_token(
            "a statement",
            &self.current_token_name(),
            span,
        ))
    }

    /// Parses a SELECT statement; the SELECT keyword is still unconsumed.
    pub(crate) fn parse_select_stmt(&mut self) -> Result<SelectStmt, SyntaxError> {
        self.expect_keyword(Keyword::Select)?;

        let columns = self.parse_select_list()?;

        let mut from = Vec::new();
        let mut joins = Vec::new();
        if self.consume_keyword(Keyword::From) {
            from.push(self.parse_table_ref()?);
            while self.consume_token(TokenKind::Comma) {
                from.push(self.parse_table_ref()?);
            }
            loop {
                let inner = self.consume_keyword(Keyword::Inner);
                if self.consume_keyword(Keyword::Join) {
                    let table = self.parse_table_ref()?;
                    let on = if self.consume_keyword(Keyword::On) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    joins.push(JoinClause { table, on });
                } else if inner {
                    let span = self.current_span();
                    return Err(SyntaxError::unexpected_token(
                        "JOIN after INNER",
                        &self.current_token_name(),
                        span,
                    ));
                } else {
                    break;
                }
            }
        }

        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            group_by = self.parse_expr_list()?;
        }

        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            loop {
                let expr = self.parse_expr()?;
                let direction = if self.consume_keyword(Keyword::Desc) {
                    SortDirection::Desc
                } else {
                    self.consume_keyword(Keyword::Asc);
                    SortDirection::Asc
                };
                order_by.push(OrderByItem { expr, direction });
                if !self.consume_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        Ok(SelectStmt {
            columns,
            from,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
        })
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>, SyntaxError> {
        let mut items = vec![self.parse_select_item()?];
        while self.consume_token(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, SyntaxError> {
        if self.consume_token(TokenKind::Asterisk) {
            return Ok(SelectItem::Wildcard);
        }

        // rel.* needs a two-token lookahead before expression parsing.
        if let (Some(TokenKind::Identifier(rel)), Some(TokenKind::Dot), Some(TokenKind::Asterisk)) = (
            self.peek_kind().cloned(),
            self.peek_nth_kind(1),
            self.peek_nth_kind(2),
        ) {
            self.advance();
            self.advance();
            self.advance();
            return Ok(SelectItem::QualifiedWildcard(rel));
        }

        let expr = self.parse_expr()?;
        let alias = if self.consume_keyword(Keyword::As) {
            Some(self.expect_identifier()?)
        } else if let Some(TokenKind::Identifier(name)) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            Some(name)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        let name = self.expect_identifier()?;
        let alias = if self.consume_keyword(Keyword::As) {
            Some(self.expect_identifier()?)
        } else if let Some(TokenKind::Identifier(alias)) = self.peek_kind() {
            let alias = alias.clone();
            self.advance();
            Some(alias)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_insert_stmt(&mut self) -> Result<Statement, SyntaxError> {
        self.expect_keyword(Keyword::Into)?;
        let table = self.expect_identifier()?;

        let mut columns = Vec::new();
        if self.consume_token(TokenKind::LParen) {
            columns.push(self.expect_identifier()?);
            while self.consume_token(TokenKind::Comma) {
                columns.push(self.expect_identifier()?);
            }
            self.expect_token(TokenKind::RParen)?;
        }

        self.expect_keyword(Keyword::Values)?;

        let mut rows = Vec::new();
        loop {
            self.expect_token(TokenKind::LParen)?;
            rows.push(self.parse_expr_list()?);
            self.expect_token(TokenKind::RParen)?;
            if !self.consume_token(TokenKind::Comma) {
                break;
            }
        }

        Ok(Statement::Insert(Box::new(InsertStmt {
            table,
            columns,
            rows,
        })))
    }

    fn parse_update_stmt(&mut self) -> Result<Statement, SyntaxError> {
        let table = self.expect_identifier()?;
        self.expect_keyword(Keyword::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect_token(TokenKind::Eq)?;
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.consume_token(TokenKind::Comma) {
                break;
            }
        }

        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Statement::Update(Box::new(UpdateStmt {
            table,
            assignments,
            where_clause,
        })))
    }

    fn parse_delete_stmt(&mut self) -> Result<Statement, SyntaxError> {
        self.expect_keyword(Keyword::From)?;
        let table = self.expect_identifier()?;
        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(Box::new(DeleteStmt {
            table,
            where_clause,
        })))
    }

    fn parse_create_table_stmt(&mut self) -> Result<Statement, SyntaxError> {
        let name = self.expect_identifier()?;
        self.expect_token(TokenKind::LParen)?;

        let mut columns = vec![self.parse_column_def()?];
        while self.consume_token(TokenKind::Comma) {
            columns.push(self.parse_column_def()?);
        }
        self.expect_token(TokenKind::RParen)?;

        Ok(Statement::CreateTable(Box::new(CreateTableStmt {
            name,
            columns,
        })))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef, SyntaxError> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_data_type()?;

        // Columns default to NOT NULL; NULLABLE (or bare NULL) opts in.
        let mut nullable = false;
        if self.consume_keyword(Keyword::Nullable) || self.consume_keyword(Keyword::Null) {
            nullable = true;
        } else if self.consume_keyword(Keyword::Not) {
            self.expect_keyword(Keyword::Null)?;
        }

        Ok(ColumnDef {
            name,
            data_type,
            nullable,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType, SyntaxError> {
        if self.consume_keyword(Keyword::Int) {
            return Ok(DataType::Int);
        }
        if self.consume_keyword(Keyword::Float) {
            return Ok(DataType::Float);
        }
        if self.consume_keyword(Keyword::Date) {
            return Ok(DataType::Date);
        }
        if self.consume_keyword(Keyword::Text) {
            return Ok(DataType::Text);
        }
        if self.consume_keyword(Keyword::Char) {
            let mut len = 1;
            if self.consume_token(TokenKind::LParen) {
                len = self.expect_integer()?;
                self.expect_token(TokenKind::RParen)?;
            }
            return Ok(DataType::Char(len as u32));
        }
        let span = self.current_span();
        Err(SyntaxError::unexpected_token(
            "a data type",
            &self.current_token_name(),
            span,
        ))
    }

    fn parse_create_index_stmt(&mut self, unique: bool) -> Result<Statement, SyntaxError> {
        let name = self.expect_identifier()?;
        self.expect_keyword(Keyword::On)?;
        let table = self.expect_identifier()?;
        self.expect_token(TokenKind::LParen)?;
        let column = self.expect_identifier()?;
        self.expect_token(TokenKind::RParen)?;
        Ok(Statement::CreateIndex(CreateIndexStmt {
            name,
            table,
            column,
            unique,
        }))
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    pub(crate) fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::Eof))
    }

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_nth_kind(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    pub(crate) fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::at(0))
    }

    pub(crate) fn current_token_name(&self) -> String {
        self.peek_kind()
            .map(|k| k.display_name())
            .unwrap_or_else(|| "end of input".to_string())
    }

    pub(crate) fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    pub(crate) fn consume_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> Result<(), SyntaxError> {
        if self.consume_keyword(kw) {
            Ok(())
        } else {
            let span = self.current_span();
            Err(SyntaxError::unexpected_token(
                &format!("keyword '{}'", kw.as_str()),
                &self.current_token_name(),
                span,
            ))
        }
    }

    pub(crate) fn check_token(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(&kind)
    }

    pub(crate) fn consume_token(&mut self, kind: TokenKind) -> bool {
        if self.check_token(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_token(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.consume_token(kind.clone()) {
            Ok(())
        } else {
            let span = self.current_span();
            Err(SyntaxError::unexpected_token(
                &kind.display_name(),
                &self.current_token_name(),
                span,
            ))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => {
                let span = self.current_span();
                Err(SyntaxError::unexpected_token(
                    "an identifier",
                    &self.current_token_name(),
                    span,
                ))
            }
        }
    }

    fn expect_string(&mut self) -> Result<String, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::String(s)) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => {
                let span = self.current_span();
                Err(SyntaxError::unexpected_token(
                    "a string literal",
                    &self.current_token_name(),
                    span,
                ))
            }
        }
    }

    fn expect_integer(&mut self) -> Result<i64, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Integer(n)) => {
                let n = *n;
                self.advance();
                Ok(n)
            }
            _ => {
                let span = self.current_span();
                Err(SyntaxError::unexpected_token(
                    "an integer",
                    &self.current_token_name(),
                    span,
                ))
            }
        }
    }
}
