use crate::error::{FramescriptError, FramescriptResult};

/// Unit suffix on a number literal. The lexer records it; conversion to
/// frames happens at evaluation time against the context's FPS/BPM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Frames,
    Seconds,
    Beats,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number { value: f64, unit: Option<Unit> },
    Str(String),
    Ident(String),

    // Keywords, reclassified from identifiers.
    If,
    Else,
    And,
    Or,
    True,
    False,

    // Comparison and logical operators.
    Le,
    Lt,
    Ge,
    Gt,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,

    // Arithmetic.
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Colon,

    // Punctuation.
    LParen,
    RParen,
    Comma,
    Eq,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    src: &'a [u8],
    i: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(s: &'a str) -> Self {
        Self {
            src: s.as_bytes(),
            i: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.i).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.i + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.src.get(self.i).copied();
        if let Some(c) = ch {
            self.i += 1;
            if c == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if c & 0xC0 != 0x80 {
                // Columns count characters, so UTF-8 continuation bytes
                // (inside string literals) do not advance.
                self.column += 1;
            }
        }
        ch
    }

    fn skip_ws_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.bump();
            } else if c == b'#' {
                // Line comment runs to end of line.
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn number(&mut self) -> TokenKind {
        let start = self.i;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        // Only safe because the scanned range is ASCII digits and '.'.
        let text = std::str::from_utf8(&self.src[start..self.i]).unwrap_or("0");
        let value: f64 = text.parse().unwrap_or(f64::NAN);

        // A unit suffix binds to the literal only when not followed by more
        // identifier characters ("2f" is a unit, "2fish" is an error).
        let unit = match self.peek() {
            Some(b'f') => Some(Unit::Frames),
            Some(b's') => Some(Unit::Seconds),
            Some(b'b') => Some(Unit::Beats),
            _ => None,
        };
        if unit.is_some() && !matches!(self.peek2(), Some(c) if c.is_ascii_alphanumeric() || c == b'_')
        {
            self.bump();
            return TokenKind::Number { value, unit };
        }
        TokenKind::Number { value, unit: None }
    }

    fn string(&mut self, line: usize, column: usize) -> FramescriptResult<TokenKind> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None => {
                    return Err(FramescriptError::lex(line, column, "unterminated string literal"));
                }
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(c) => bytes.push(c),
                    None => {
                        return Err(FramescriptError::lex(
                            line,
                            column,
                            "unterminated string literal",
                        ));
                    }
                },
                Some(c) => bytes.push(c),
            }
        }
        // Input came in as &str, so the collected bytes are valid UTF-8
        // unless an escape split a multi-byte sequence.
        String::from_utf8(bytes)
            .map(TokenKind::Str)
            .map_err(|_| FramescriptError::lex(line, column, "invalid UTF-8 in string literal"))
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.i;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.bump();
        }
        let text = std::str::from_utf8(&self.src[start..self.i]).unwrap_or("");
        match text {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Ident(text.to_string()),
        }
    }

    fn next_kind(&mut self, line: usize, column: usize) -> FramescriptResult<Option<TokenKind>> {
        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(None),
        };
        let kind = match c {
            b'0'..=b'9' => self.number(),
            b'"' => self.string(line, column)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident(),
            b'(' => {
                self.bump();
                TokenKind::LParen
            }
            b')' => {
                self.bump();
                TokenKind::RParen
            }
            b',' => {
                self.bump();
                TokenKind::Comma
            }
            b'+' => {
                self.bump();
                TokenKind::Plus
            }
            b'-' => {
                self.bump();
                TokenKind::Minus
            }
            b'*' => {
                self.bump();
                TokenKind::Star
            }
            b'/' => {
                self.bump();
                TokenKind::Slash
            }
            b'%' => {
                self.bump();
                TokenKind::Percent
            }
            b'^' => {
                self.bump();
                TokenKind::Caret
            }
            b':' => {
                self.bump();
                TokenKind::Colon
            }
            b'<' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            b'=' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    return Err(FramescriptError::lex(line, column, "expected '=' after '!'"));
                }
            }
            b'&' => {
                self.bump();
                if self.peek() == Some(b'&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    return Err(FramescriptError::lex(line, column, "expected '&' after '&'"));
                }
            }
            b'|' => {
                self.bump();
                if self.peek() == Some(b'|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    return Err(FramescriptError::lex(line, column, "expected '|' after '|'"));
                }
            }
            other => {
                return Err(FramescriptError::lex(
                    line,
                    column,
                    format!("unrecognized character '{}'", other as char),
                ));
            }
        };
        Ok(Some(kind))
    }
}

pub fn tokenize(text: &str) -> FramescriptResult<Vec<Token>> {
    let mut lex = Lexer::new(text);
    let mut out = Vec::new();
    loop {
        lex.skip_ws_and_comments();
        let (line, column) = (lex.line, lex.column);
        match lex.next_kind(line, column)? {
            None => break,
            Some(kind) => out.push(Token { kind, line, column }),
        }
    }
    Ok(out)
}
