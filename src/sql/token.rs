//! SQL token types.
//!
//! [`Token`] pairs a [`TokenKind`] with its byte span in the source.
//! Keywords are matched case-insensitively through a single lookup table
//! that also provides their canonical spelling for error messages.

use super::error::Span;

/// A SQL token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The span of this token in the source.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns true if this is the end-of-input token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

/// The kind of a SQL token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Float(f64),
    /// Single-quoted string literal.
    String(String),
    /// Identifier, folded to lowercase.
    Identifier(String),
    /// Keyword (case-insensitive in the source).
    Keyword(Keyword),

    /// +
    Plus,
    /// -
    Minus,
    /// *
    Asterisk,
    /// /
    Slash,
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

    /// (
    LParen,
    /// )
    RParen,
    /// ,
    Comma,
    /// ;
    Semicolon,
    /// .
    Dot,

    /// End of input.
    Eof,
}

impl TokenKind {
    /// Renders this token for "expected X, found Y" error messages.
    pub fn display_name(&self) -> String {
        match self {
            TokenKind::Integer(n) => format!("integer '{n}'"),
            TokenKind::Float(n) => format!("float '{n}'"),
            TokenKind::String(s) => format!("string '{s}'"),
            TokenKind::Identifier(s) => format!("identifier '{s}'"),
            TokenKind::Keyword(kw) => format!("keyword '{}'", kw.as_str()),
            TokenKind::Eof => "end of input".to_string(),
            punct => format!("'{}'", punct.punct_str()),
        }
    }

    fn punct_str(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Asterisk => "*",
            TokenKind::Slash => "/",
            TokenKind::Eq => "=",
            TokenKind::Neq => "<>",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            _ => "?",
        }
    }
}

/// SQL keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    As,
    Asc,
    Begin,
    Between,
    By,
    Calc,
    Char,
    Commit,
    Create,
    Data,
    Date,
    Delete,
    Desc,
    Drop,
    Exists,
    Explain,
    Float,
    From,
    Group,
    Having,
    In,
    Index,
    Infile,
    Inner,
    Insert,
    Int,
    Into,
    Is,
    Join,
    Like,
    Load,
    Not,
    Null,
    Nullable,
    On,
    Or,
    Order,
    Rollback,
    Select,
    Set,
    Show,
    Table,
    Tables,
    Text,
    Transaction,
    Unique,
    Update,
    Values,
    Where,
}

/// Canonical spellings, plus accepted aliases for the type names.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("AND", Keyword::And),
    ("AS", Keyword::As),
    ("ASC", Keyword::Asc),
    ("BEGIN", Keyword::Begin),
    ("BETWEEN", Keyword::Between),
    ("BY", Keyword::By),
    ("CALC", Keyword::Calc),
    ("CHAR", Keyword::Char),
    ("CHARS", Keyword::Char),
    ("COMMIT", Keyword::Commit),
    ("CREATE", Keyword::Create),
    ("DATA", Keyword::Data),
    ("DATE", Keyword::Date),
    ("DELETE", Keyword::Delete),
    ("DESC", Keyword::Desc),
    ("DROP", Keyword::Drop),
    ("EXISTS", Keyword::Exists),
    ("EXPLAIN", Keyword::Explain),
    ("FLOAT", Keyword::Float),
    ("FROM", Keyword::From),
    ("GROUP", Keyword::Group),
    ("HAVING", Keyword::Having),
    ("IN", Keyword::In),
    ("INDEX", Keyword::Index),
    ("INFILE", Keyword::Infile),
    ("INNER", Keyword::Inner),
    ("INSERT", Keyword::Insert),
    ("INT", Keyword::Int),
    ("INTEGER", Keyword::Int),
    ("INTO", Keyword::Into),
    ("IS", Keyword::Is),
    ("JOIN", Keyword::Join),
    ("LIKE", Keyword::Like),
    ("LOAD", Keyword::Load),
    ("NOT", Keyword::Not),
    ("NULL", Keyword::Null),
    ("NULLABLE", Keyword::Nullable),
    ("ON", Keyword::On),
    ("OR", Keyword::Or),
    ("ORDER", Keyword::Order),
    ("ROLLBACK", Keyword::Rollback),
    ("SELECT", Keyword::Select),
    ("SET", Keyword::Set),
    ("SHOW", Keyword::Show),
    ("TABLE", Keyword::Table),
    ("TABLES", Keyword::Tables),
    ("TEXT", Keyword::Text),
    ("TRANSACTION", Keyword::Transaction),
    ("UNIQUE", Keyword::Unique),
    ("UPDATE", Keyword::Update),
    ("VALUES", Keyword::Values),
    ("WHERE", Keyword::Where),
];

impl Keyword {
    /// Attempts to match a word against the keyword table
    /// (case-insensitive).
    pub fn parse(word: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(spelling, _)| spelling.eq_ignore_ascii_case(word))
            .map(|(_, kw)| *kw)
    }

    /// Returns the canonical spelling of this keyword.
    pub fn as_str(&self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| kw == self)
            .map(|(spelling, _)| *spelling)
            .unwrap_or("?")
    }
}
