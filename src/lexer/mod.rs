//! Lexical analysis for La source text.
//!
//! The lexer is a hand-written maximal-munch scanner over the raw bytes of
//! one source file. It produces a finite token sequence terminated by
//! [`TokenKind::Eof`]; failures are emitted in-band as
//! [`TokenKind::Invalid`] tokens (the lexeme carries the reason) so the
//! parser can report them with a precise location, and scanning continues.
//!
//! Two quirks worth knowing about:
//! - a bare `>>` is emitted as two `>` tokens so that nested generic
//!   argument lists (`Map<K, List<V>>`) close properly; the parser
//!   reassembles adjacent `>` pairs into a right-shift inside expressions.
//!   `>>=` is still a single token.
//! - `---` lexes as the `undefined` keyword.

mod token;

pub use token::*;

use crate::typechecker::types::NumberKind;

pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    line: usize,
    col: usize,
    file: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file: usize) -> Self {
        Lexer {
            input: input.as_bytes(),
            position: 0,
            line: 0,
            col: 0,
            file,
            tokens: vec![],
        }
    }

    /// Consumes the input and returns the token sequence, always ending
    /// with an `Eof` token.
    pub fn lex(mut self) -> Vec<Token> {
        loop {
            self.eat_trivia();
            if self.position >= self.input.len() {
                break;
            }
            self.scan_token();
        }

        let span = Span::new(self.file, self.line, self.col, self.col);
        self.tokens.push(Token::new(TokenKind::Eof, "", span));
        self.tokens
    }

    fn peek(&self) -> u8 {
        self.input.get(self.position).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.input.get(self.position + offset).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.peek();
        self.position += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        c
    }

    /// Skips whitespace and comments. Block comments are balanced only by
    /// their terminator; nesting is not supported.
    fn eat_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.position < self.input.len() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let (line, col) = (self.line, self.col);
                    self.advance();
                    self.advance();
                    loop {
                        if self.position >= self.input.len() {
                            let span = Span::new(self.file, line, col, col + 2);
                            self.tokens.push(Token::new(
                                TokenKind::Invalid,
                                "Unterminated block comment",
                                span,
                            ));
                            return;
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize, col: usize) {
        let lexeme = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        let span = Span::new(self.file, line, col, col + (self.position - start));
        self.tokens.push(Token::new(kind, lexeme, span));
    }

    fn invalid(&mut self, reason: &str, line: usize, col: usize) {
        let span = Span::new(self.file, line, col, self.col.max(col + 1));
        self.tokens
            .push(Token::new(TokenKind::Invalid, reason, span));
    }

    fn scan_token(&mut self) {
        let start = self.position;
        let (line, col) = (self.line, self.col);
        let c = self.advance();

        let two = |lexer: &mut Self, next: u8, long: TokenKind, short: TokenKind| {
            if lexer.peek() == next {
                lexer.advance();
                lexer.push(long, start, line, col);
            } else {
                lexer.push(short, start, line, col);
            }
        };

        match c {
            b'(' => self.push(TokenKind::LeftParen, start, line, col),
            b')' => self.push(TokenKind::RightParen, start, line, col),
            b'{' => self.push(TokenKind::LeftBrace, start, line, col),
            b'}' => self.push(TokenKind::RightBrace, start, line, col),
            b'[' => self.push(TokenKind::LeftBracket, start, line, col),
            b']' => self.push(TokenKind::RightBracket, start, line, col),
            b',' => self.push(TokenKind::Comma, start, line, col),
            b';' => self.push(TokenKind::Semicolon, start, line, col),
            b'@' => self.push(TokenKind::At, start, line, col),
            b'~' => self.push(TokenKind::Tilde, start, line, col),
            b':' => two(self, b':', TokenKind::ColonColon, TokenKind::Colon),
            b'.' => two(self, b'.', TokenKind::DotDot, TokenKind::Dot),
            b'=' => two(self, b'=', TokenKind::EqualEqual, TokenKind::Equal),
            b'!' => two(self, b'=', TokenKind::BangEqual, TokenKind::Bang),
            b'*' => two(self, b'=', TokenKind::StarEqual, TokenKind::Star),
            b'/' => two(self, b'=', TokenKind::SlashEqual, TokenKind::Slash),
            b'%' => two(self, b'=', TokenKind::PercentEqual, TokenKind::Percent),
            b'^' => two(self, b'=', TokenKind::CaretEqual, TokenKind::Caret),
            b'+' => match self.peek() {
                b'+' => {
                    self.advance();
                    self.push(TokenKind::PlusPlus, start, line, col);
                }
                b'=' => {
                    self.advance();
                    self.push(TokenKind::PlusEqual, start, line, col);
                }
                _ => self.push(TokenKind::Plus, start, line, col),
            },
            b'-' => match (self.peek(), self.peek_at(1)) {
                (b'-', b'-') => {
                    self.advance();
                    self.advance();
                    self.push(TokenKind::Undefined, start, line, col);
                }
                (b'-', _) => {
                    self.advance();
                    self.push(TokenKind::MinusMinus, start, line, col);
                }
                (b'=', _) => {
                    self.advance();
                    self.push(TokenKind::MinusEqual, start, line, col);
                }
                (b'>', _) => {
                    self.advance();
                    self.push(TokenKind::Arrow, start, line, col);
                }
                _ => self.push(TokenKind::Minus, start, line, col),
            },
            b'&' => match self.peek() {
                b'&' => {
                    self.advance();
                    self.push(TokenKind::AmpersandAmpersand, start, line, col);
                }
                b'=' => {
                    self.advance();
                    self.push(TokenKind::AmpersandEqual, start, line, col);
                }
                _ => self.push(TokenKind::Ampersand, start, line, col),
            },
            b'|' => match self.peek() {
                b'|' => {
                    self.advance();
                    self.push(TokenKind::PipePipe, start, line, col);
                }
                b'=' => {
                    self.advance();
                    self.push(TokenKind::PipeEqual, start, line, col);
                }
                _ => self.push(TokenKind::Pipe, start, line, col),
            },
            b'<' => match (self.peek(), self.peek_at(1)) {
                (b'<', b'=') => {
                    self.advance();
                    self.advance();
                    self.push(TokenKind::LeftShiftEqual, start, line, col);
                }
                (b'<', _) => {
                    self.advance();
                    self.push(TokenKind::LeftShift, start, line, col);
                }
                (b'=', _) => {
                    self.advance();
                    self.push(TokenKind::LessEqual, start, line, col);
                }
                _ => self.push(TokenKind::Less, start, line, col),
            },
            b'>' => match (self.peek(), self.peek_at(1)) {
                // `>>=` is one token; a bare `>>` stays two `>` tokens so
                // `Map<K, List<V>>` closes both lists.
                (b'>', b'=') => {
                    self.advance();
                    self.advance();
                    self.push(TokenKind::RightShiftEqual, start, line, col);
                }
                (b'=', _) => {
                    self.advance();
                    self.push(TokenKind::GreaterEqual, start, line, col);
                }
                _ => self.push(TokenKind::Greater, start, line, col),
            },
            b'"' => self.scan_string(start, line, col),
            b'\'' => self.scan_character(start, line, col),
            b'0'..=b'9' => self.scan_number(start, line, col),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(start, line, col),
            other => self.invalid(
                &format!("Unexpected character '{}'", other as char),
                line,
                col,
            ),
        }
    }

    fn scan_identifier(&mut self, start: usize, line: usize, col: usize) {
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let lexeme = &self.input[start..self.position];
        let kind = KEYWORDS
            .get(std::str::from_utf8(lexeme).unwrap_or(""))
            .copied()
            .unwrap_or(TokenKind::Identifier);
        self.push(kind, start, line, col);
    }

    fn scan_number(&mut self, start: usize, line: usize, col: usize) {
        let mut is_float = false;

        let radix_digits: Option<fn(u8) -> bool> =
            if self.input[start] == b'0' && matches!(self.peek(), b'x' | b'b' | b'o') {
                Some(match self.peek() {
                    b'x' => |c: u8| c.is_ascii_hexdigit(),
                    b'b' => |c: u8| c == b'0' || c == b'1',
                    _ => |c: u8| (b'0'..=b'7').contains(&c),
                })
            } else {
                None
            };

        if let Some(is_digit) = radix_digits {
            self.advance(); // radix marker
            let mut digits = 0usize;
            while is_digit(self.peek()) || self.peek() == b'_' {
                if self.peek() != b'_' {
                    digits += 1;
                }
                self.advance();
            }
            if digits == 0 {
                self.invalid("Number literal with radix prefix has no digits", line, col);
                return;
            }
            if self.peek().is_ascii_digit() {
                self.invalid("Invalid digit for this number radix", line, col);
                return;
            }
        } else {
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.advance();
            }
            // A fractional part needs a digit after the dot; `0..10` keeps
            // its range operator.
            if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
                is_float = true;
                self.advance();
                while self.peek().is_ascii_digit() || self.peek() == b'_' {
                    self.advance();
                }
            }
        }

        // Optional kind suffix: consume the trailing identifier run and
        // demand it names a number kind.
        if self.peek().is_ascii_alphabetic() {
            let suffix_start = self.position;
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.advance();
            }
            let suffix = std::str::from_utf8(&self.input[suffix_start..self.position])
                .unwrap_or("")
                .to_string();
            let Some(kind) = NumberKind::from_suffix(&suffix) else {
                self.invalid(&format!("Invalid number suffix '{suffix}'"), line, col);
                return;
            };
            if radix_digits.is_some() && kind.is_float() {
                self.invalid("Float suffix on a radix-prefixed integer literal", line, col);
                return;
            }
            if is_float && !kind.is_float() {
                self.invalid("Integer suffix on a float literal", line, col);
                return;
            }
            self.push(TokenKind::Number(kind), start, line, col);
            return;
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Int
        };
        self.push(kind, start, line, col);
    }

    fn scan_string(&mut self, start: usize, line: usize, col: usize) {
        loop {
            match self.peek() {
                0 if self.position >= self.input.len() => {
                    self.invalid("Unterminated string literal", line, col);
                    return;
                }
                b'"' => {
                    self.advance();
                    break;
                }
                b'\\' => {
                    self.advance();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }

        let raw = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        if let Err(reason) = unescape(&raw[1..raw.len() - 1]) {
            self.invalid(&reason, line, col);
            return;
        }
        self.push(TokenKind::String, start, line, col);
    }

    fn scan_character(&mut self, start: usize, line: usize, col: usize) {
        if self.peek() == b'\'' {
            self.advance();
            self.invalid("Empty character literal", line, col);
            return;
        }
        loop {
            match self.peek() {
                0 if self.position >= self.input.len() => {
                    self.invalid("Unterminated character literal", line, col);
                    return;
                }
                b'\n' => {
                    self.invalid("Unterminated character literal", line, col);
                    return;
                }
                b'\'' => {
                    self.advance();
                    break;
                }
                b'\\' => {
                    self.advance();
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }

        let raw = String::from_utf8_lossy(&self.input[start..self.position]).into_owned();
        match unescape(&raw[1..raw.len() - 1]) {
            Err(reason) => self.invalid(&reason, line, col),
            Ok(bytes) if bytes.len() != 1 => {
                self.invalid("Character literal must contain exactly one byte", line, col)
            }
            Ok(_) => self.push(TokenKind::Character, start, line, col),
        }
    }
}

/// Translates the escape sequences of a string or character literal body
/// into bytes. `\a \b \f \n \r \t \v \0 \' \" \\` and `\xHH` are accepted.
pub fn unescape(body: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(body.len());
    let bytes = body.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let Some(&escape) = bytes.get(i + 1) else {
            return Err("Dangling escape at end of literal".into());
        };
        let byte = match escape {
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'0' => 0,
            b'\'' => b'\'',
            b'"' => b'"',
            b'\\' => b'\\',
            b'x' => {
                let hex = bytes
                    .get(i + 2..i + 4)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                let Some(value) = hex else {
                    return Err("Invalid \\xHH escape sequence".into());
                };
                out.push(value);
                i += 4;
                continue;
            }
            other => return Err(format!("Unknown escape sequence '\\{}'", other as char)),
        };
        out.push(byte);
        i += 2;
    }

    Ok(out)
}

/// Value of an integer literal lexeme (prefixes, separators and a trailing
/// kind suffix are handled). Only called on tokens the lexer accepted.
pub fn integer_value(lexeme: &str) -> u64 {
    let body: String = lexeme.chars().filter(|c| *c != '_').collect();
    let (radix, rest) = match body.get(..2) {
        Some("0x") => (16, &body[2..]),
        Some("0b") => (2, &body[2..]),
        Some("0o") => (8, &body[2..]),
        _ => (10, body.as_str()),
    };
    let digits: String = rest.chars().take_while(|c| c.is_digit(radix)).collect();
    u64::from_str_radix(&digits, radix).unwrap_or(0)
}

pub fn float_value(lexeme: &str) -> f64 {
    let body: String = lexeme.chars().filter(|c| *c != '_').collect();
    let digits: String = body
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().unwrap_or(0.0)
}

/// Translated bytes of a string token (quotes stripped).
pub fn string_contents(lexeme: &str) -> Vec<u8> {
    unescape(&lexeme[1..lexeme.len() - 1]).unwrap_or_default()
}

/// Byte value of a character token.
pub fn character_value(lexeme: &str) -> u8 {
    unescape(&lexeme[1..lexeme.len() - 1])
        .ok()
        .and_then(|bytes| bytes.first().copied())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input, 0).lex().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_identifier_and_keyword() {
        assert_eq!(
            kinds("var letter"),
            vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn test_lex_hello_world_token_count() {
        let source = r#"@extern fun printf(format *char, varargs Any) int64;
fun main() int64 {
    printf("Hello, World!\n");
    return 0;
}
"#;
        let tokens = Lexer::new(source, 0).lex();
        // 29 source tokens plus the closing Eof.
        assert_eq!(tokens.len(), 30);
        assert_eq!(tokens[0].kind, TokenKind::At);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "extern");
        assert_eq!(tokens[8].kind, TokenKind::Comma);
        assert_eq!(tokens[9].kind, TokenKind::Varargs);
        assert_eq!(tokens[29].kind, TokenKind::Eof);
    }

    #[test]
    fn test_lexemes_reproduce_the_source() {
        // Re-concatenating lexemes at their span positions reproduces the
        // input (modulo comments).
        let source = "var x = a >> 3; // trailing";
        let tokens = Lexer::new(source, 0).lex();
        let mut rebuilt = vec![b' '; source.len()];
        for token in &tokens {
            if token.kind == TokenKind::Eof {
                continue;
            }
            rebuilt[token.span.start..token.span.start + token.lexeme.len()]
                .copy_from_slice(token.lexeme.as_bytes());
        }
        let rebuilt = String::from_utf8(rebuilt).unwrap();
        assert_eq!(rebuilt.trim_end(), "var x = a >> 3;");
    }

    #[test]
    fn test_right_shift_splits_into_two_greater() {
        assert_eq!(
            kinds("a >> b"),
            vec![
                TokenKind::Identifier,
                TokenKind::Greater,
                TokenKind::Greater,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("a >>= b"),
            vec![
                TokenKind::Identifier,
                TokenKind::RightShiftEqual,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_triple_minus_is_undefined() {
        assert_eq!(kinds("---"), vec![TokenKind::Undefined, TokenKind::Eof]);
        assert_eq!(
            kinds("a--"),
            vec![TokenKind::Identifier, TokenKind::MinusMinus, TokenKind::Eof]
        );
    }

    #[test]
    fn test_number_literals() {
        use crate::typechecker::types::NumberKind;

        let tokens = Lexer::new("42 1_000 0xff_u8 3.25 1.5f32 0b1010 0o777", 0).lex();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Number(NumberKind::U8),
                TokenKind::Float,
                TokenKind::Number(NumberKind::F32),
                TokenKind::Int,
                TokenKind::Int,
                TokenKind::Eof
            ]
        );
        assert_eq!(integer_value(&tokens[1].lexeme), 1000);
        assert_eq!(integer_value(&tokens[2].lexeme), 0xff);
        assert_eq!(integer_value(&tokens[5].lexeme), 10);
        assert_eq!(integer_value(&tokens[6].lexeme), 0o777);
        assert_eq!(float_value(&tokens[4].lexeme), 1.5);
    }

    #[test]
    fn test_radix_prefix_without_digits_is_invalid() {
        let tokens = Lexer::new("0x", 0).lex();
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn test_range_keeps_dotdot() {
        assert_eq!(
            kinds("0..10"),
            vec![TokenKind::Int, TokenKind::DotDot, TokenKind::Int, TokenKind::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Lexer::new(r#""a\tb\x41\0""#, 0).lex();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(
            string_contents(&tokens[0].lexeme),
            vec![b'a', b'\t', b'b', 0x41, 0]
        );
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        let tokens = Lexer::new("\"oh no", 0).lex();
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert!(tokens[0].lexeme.contains("Unterminated"));
    }

    #[test]
    fn test_character_literals() {
        let tokens = Lexer::new(r"'a' '\n' ''", 0).lex();
        assert_eq!(tokens[0].kind, TokenKind::Character);
        assert_eq!(character_value(&tokens[0].lexeme), b'a');
        assert_eq!(tokens[1].kind, TokenKind::Character);
        assert_eq!(character_value(&tokens[1].lexeme), b'\n');
        assert_eq!(tokens[2].kind, TokenKind::Invalid);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a // line\nb /* block\nstill */ c"),
            vec![
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_spans_track_lines_and_columns() {
        let tokens = Lexer::new("var x\n  = 1;", 0).lex();
        assert_eq!(tokens[0].span, Span::new(0, 0, 0, 3));
        assert_eq!(tokens[1].span, Span::new(0, 0, 4, 5));
        assert_eq!(tokens[2].span, Span::new(0, 1, 2, 3));
        assert_eq!(tokens[3].span, Span::new(0, 1, 4, 5));
    }
}
