use std::fmt::Write;

use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;

pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints the source spelling instead
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        for s in tokens {
            self.render_one(&mut out, s);
        }
        out
    }

    fn render_one(&self, out: &mut String, s: &Spanned) {
        let line = s.span.line;
        let col = s.span.col;

        let kind = self.kind(&s.token);
        let colr = if self.color { self.color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        // Writing into a String cannot fail.
        let _ = if self.show_debug_repr {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, colr, kind, s.token, reset
            )
        } else {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {}{}",
                line, col, colr, kind, s.token, reset
            )
        };
    }

    fn kind(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Newline => "NEWLINE",
            Semicolon => "SEP",
            Eof => "EOF",

            Integer(_) => "INT",
            Float(_) => "FLOAT",

            Ident(_) => "IDENT",
            Func => "KEYWORD",

            LParen | RParen => "PAREN",
            LBrace | RBrace => "BRACE",
            Comma => "COMMA",

            Plus | Minus | Star | Slash => "OP",
            Assign => "ASSIGN",
            Equal => "CMP",
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        use Token::*;
        match t {
            Newline | Semicolon | Eof => Self::DIM,
            Integer(_) | Float(_) => Self::CYN,
            Ident(_) => Self::YEL,
            Plus | Minus | Star | Slash | Assign | Equal => Self::MAG,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    #[test]
    fn test_render_plain() {
        let tokens = Lexer::new("x = 1").tokenize().unwrap();
        let out = TokenDumper::new().no_color().pretty().render(&tokens);
        assert_eq!(
            out,
            "[01:01] IDENT    x\n[01:03] ASSIGN   =\n[01:05] INT      1\n[01:06] EOF      EOF\n"
        );
    }

    #[test]
    fn test_render_debug_repr() {
        let tokens = Lexer::new("func").tokenize().unwrap();
        let out = TokenDumper::new().no_color().render(&tokens);
        assert!(out.starts_with("[01:01] KEYWORD  Func\n"));
    }
}
