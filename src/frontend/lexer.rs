use crate::frontend::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

/// Character-level scanner producing one token at a time.
///
/// The parser pulls tokens through [`Lexer::read_token`] and may hand exactly
/// one back with [`Lexer::unread_token`]. Newlines are significant: they are
/// returned as [`Token::Newline`], which the grammar treats like `;`.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    pending: Option<Spanned>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            pending: None,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else if ch.is_some() {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    /// Current position, 1-based.
    pub fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn error(&self, message: impl Into<String>) -> LexerError {
        LexerError {
            message: message.into(),
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() && ch != '\n' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start_line = self.line;
        let start_col = self.col;

        let mut digits = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot && !digits.is_empty() {
                // Only treat '.' as a decimal point if followed by a digit
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    has_dot = true;
                    digits.push('.');
                    self.advance();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if digits.is_empty() {
            return Err(match self.current() {
                Some(ch) => self.error(format!("unexpected character: '{}'", ch)),
                None => self.error("expected digits"),
            });
        }

        if has_dot {
            let value: f64 = digits.parse().map_err(|_| LexerError {
                message: format!("invalid float: {}", digits),
                line: start_line,
                col: start_col,
            })?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = digits.parse().map_err(|_| LexerError {
                message: format!("integer literal out of range: {}", digits),
                line: start_line,
                col: start_col,
            })?;
            Ok(Token::Integer(value))
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "func" => Token::Func,
            _ => Token::Ident(ident),
        }
    }

    fn read_operator(&mut self) -> Option<Token> {
        let ch = self.current()?;
        let next = self.peek();

        let token = match (ch, next) {
            ('=', Some('=')) => {
                self.advance();
                self.advance();
                Token::Equal
            }
            ('=', _) => {
                self.advance();
                Token::Assign
            }
            ('+', _) => {
                self.advance();
                Token::Plus
            }
            ('-', _) => {
                self.advance();
                Token::Minus
            }
            ('*', _) => {
                self.advance();
                Token::Star
            }
            ('/', _) => {
                self.advance();
                Token::Slash
            }
            ('(', _) => {
                self.advance();
                Token::LParen
            }
            (')', _) => {
                self.advance();
                Token::RParen
            }
            ('{', _) => {
                self.advance();
                Token::LBrace
            }
            ('}', _) => {
                self.advance();
                Token::RBrace
            }
            (',', _) => {
                self.advance();
                Token::Comma
            }
            (';', _) => {
                self.advance();
                Token::Semicolon
            }
            _ => return None,
        };

        Some(token)
    }

    /// Returns the next token, or `Token::Eof` once the input is exhausted.
    ///
    /// A token handed back through `unread_token` is returned first.
    pub fn read_token(&mut self) -> Result<Spanned, LexerError> {
        if let Some(spanned) = self.pending.take() {
            return Ok(spanned);
        }

        self.skip_whitespace();
        let span = self.span();

        let token = match self.current() {
            None => Token::Eof,
            Some('\n') => {
                self.advance();
                Token::Newline
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) if ch.is_alphabetic() => self.read_identifier(),
            Some(ch) => match self.read_operator() {
                Some(token) => token,
                None => return Err(self.error(format!("unexpected character: '{}'", ch))),
            },
        };

        Ok(Spanned { token, span })
    }

    /// Pushes one token back so the next `read_token` returns it.
    pub fn unread_token(&mut self, spanned: Spanned) -> Result<(), LexerError> {
        if let Some(pending) = &self.pending {
            return Err(self.error(format!(
                "cannot unread token '{}': '{}' is already pending",
                spanned.token, pending.token
            )));
        }
        self.pending = Some(spanned);
        Ok(())
    }

    pub fn tokenize(&mut self) -> Result<Vec<Spanned>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let spanned = self.read_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}
