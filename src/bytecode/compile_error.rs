use crate::frontend::lexer::{LexerError, Span};

/// A grammar violation with source location.
///
/// `line` and `col` are 1-based and point at the offending token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{line}:{col}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("lexical error: {0}")]
    Lex(#[from] LexerError),

    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// No scope binds the identifier.
    #[error("compile error: {line}:{col}: unknown identifier '{name}'")]
    UnknownIdentifier { name: String, line: usize, col: usize },

    /// The identifier is bound in an enclosing function's scope, whose
    /// frame is not addressable from the current one.
    #[error(
        "compile error: {line}:{col}: '{name}' belongs to an enclosing scope and cannot be captured"
    )]
    Capture { name: String, line: usize, col: usize },
}

impl CompileError {
    pub(crate) fn unknown_identifier(name: &str, span: Span) -> Self {
        CompileError::UnknownIdentifier {
            name: name.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    pub(crate) fn capture(name: &str, span: Span) -> Self {
        CompileError::Capture {
            name: name.to_string(),
            line: span.line,
            col: span.col,
        }
    }

    /// Source position of the error.
    pub fn position(&self) -> (usize, usize) {
        match self {
            CompileError::Lex(e) => (e.line, e.col),
            CompileError::Syntax(e) => (e.line, e.col),
            CompileError::UnknownIdentifier { line, col, .. }
            | CompileError::Capture { line, col, .. } => (*line, *col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CompileError::unknown_identifier("z", Span { line: 2, col: 5 });
        assert_eq!(err.to_string(), "compile error: 2:5: unknown identifier 'z'");
        assert_eq!(err.position(), (2, 5));

        let err: CompileError = SyntaxError {
            message: "unexpected token ')', value expected".to_string(),
            line: 1,
            col: 3,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "syntax error: 1:3: unexpected token ')', value expected"
        );
    }
}
