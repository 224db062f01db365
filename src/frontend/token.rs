#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Integer(i64),
    Float(f64),

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,

    // Delimiters
    LParen, // (
    RParen, // )
    LBrace, // {
    RBrace, // }
    Comma,

    // Separators
    Semicolon,
    Newline, // implicit semicolon

    // Binding and comparison
    Assign, // =
    Equal,  // ==

    // Keywords
    Func,

    // Identifier
    Ident(std::string::String),

    Eof,
}

impl Token {
    /// Returns true for `;` and the newline that stands in for it.
    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Semicolon | Token::Newline)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Integer(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Newline => write!(f, "\\n"),
            Token::Assign => write!(f, "="),
            Token::Equal => write!(f, "=="),
            Token::Func => write!(f, "func"),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Eof => write!(f, "EOF"),
        }
    }
}
