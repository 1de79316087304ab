//! Tokenizer for expressions embedded in templates.
//!
//! The lexer works directly on the full prompt source so every token
//! keeps its absolute offset.

use crate::error::{CompileError, ErrorCode, Result};
use crate::token::{SpannedToken, Token, PUNCTUATORS};

pub struct Lexer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, cursor: usize) -> Self {
        Self { input, cursor }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.cursor += rest.len() - trimmed.len();
    }

    pub fn next_token(&mut self) -> Result<SpannedToken> {
        self.skip_whitespace();
        let start = self.cursor;

        let Some(c) = self.peek_char() else {
            return Ok(SpannedToken { token: Token::Eof, start, end: start });
        };

        let token = if c.is_ascii_digit()
            || (c == '.' && self.remaining()[1..].starts_with(|c: char| c.is_ascii_digit()))
        {
            self.number()?
        } else if c == '"' || c == '\'' {
            self.string(c)?
        } else if is_identifier_start(c) {
            self.identifier()
        } else {
            self.punctuator()?
        };

        Ok(SpannedToken { token, start, end: self.cursor })
    }

    fn identifier(&mut self) -> Token {
        let rest = self.remaining();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_identifier_part(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.cursor += len;
        Token::Identifier(rest[..len].to_string())
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.cursor;
        let rest = self.remaining();

        if rest.starts_with("0x") || rest.starts_with("0X") {
            let digits: String = rest[2..].chars().take_while(|c| c.is_ascii_hexdigit()).collect();
            self.cursor += 2 + digits.len();
            return u64::from_str_radix(&digits, 16)
                .map(|n| Token::Number(n as f64))
                .map_err(|_| self.error_at(start, "Invalid hexadecimal number"));
        }

        let bytes = rest.as_bytes();
        let mut len = 0;
        while len < bytes.len() && (bytes[len].is_ascii_digit() || bytes[len] == b'_') {
            len += 1;
        }
        if len < bytes.len() && bytes[len] == b'.' {
            len += 1;
            while len < bytes.len() && bytes[len].is_ascii_digit() {
                len += 1;
            }
        }
        if len < bytes.len() && (bytes[len] == b'e' || bytes[len] == b'E') {
            let mut exp = len + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                    exp += 1;
                }
                len = exp;
            }
        }

        let text = rest[..len].replace('_', "");
        self.cursor += len;
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error_at(start, format!("Invalid number `{}`", text)))
    }

    fn string(&mut self, quote: char) -> Result<Token> {
        let start = self.cursor;
        self.cursor += quote.len_utf8();
        let mut value = String::new();

        loop {
            let Some(c) = self.peek_char() else {
                return Err(CompileError::new(
                    ErrorCode::UnterminatedString,
                    "Unterminated string literal",
                    start,
                    self.cursor,
                ));
            };
            self.cursor += c.len_utf8();

            if c == quote {
                break;
            }
            if c != '\\' {
                value.push(c);
                continue;
            }

            let Some(escaped) = self.peek_char() else {
                continue;
            };
            self.cursor += escaped.len_utf8();
            match escaped {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                'b' => value.push('\u{8}'),
                'f' => value.push('\u{c}'),
                'v' => value.push('\u{b}'),
                '0' => value.push('\0'),
                'x' => value.push(self.code_point(2, start)?),
                'u' => value.push(self.code_point(4, start)?),
                // Line continuation
                '\n' => {}
                other => value.push(other),
            }
        }

        Ok(Token::String(value))
    }

    fn code_point(&mut self, digits: usize, start: usize) -> Result<char> {
        let hex = self
            .remaining()
            .get(..digits)
            .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error_at(start, "Invalid escape sequence"))?;
        self.cursor += digits;
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error_at(start, "Invalid escape sequence"))
    }

    fn punctuator(&mut self) -> Result<Token> {
        let rest = self.remaining();
        for punct in PUNCTUATORS {
            if !rest.starts_with(punct) {
                continue;
            }
            // `a?.5:b` is a conditional, not an optional chain
            if *punct == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            self.cursor += punct.len();
            return Ok(Token::Punct(punct));
        }

        let c = rest.chars().next().unwrap_or_default();
        Err(CompileError::new(
            ErrorCode::UnexpectedToken,
            format!("Unexpected character `{}`", c),
            self.cursor,
            self.cursor + c.len_utf8(),
        ))
    }

    fn error_at(&self, start: usize, message: impl Into<String>) -> CompileError {
        CompileError::new(ErrorCode::UnexpectedToken, message, start, self.cursor)
    }
}

pub fn is_identifier_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

pub fn is_identifier_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input, 0);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap().token;
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn test_lex_operators_greedily() {
        assert_eq!(
            lex_all("a >>>= b ?? c?.d"),
            vec![
                Token::Identifier("a".into()),
                Token::Punct(">>>="),
                Token::Identifier("b".into()),
                Token::Punct("??"),
                Token::Identifier("c".into()),
                Token::Punct("?."),
                Token::Identifier("d".into()),
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(lex_all("1 2.5 .5 1e3 0xff 1_000"), vec![
            Token::Number(1.0),
            Token::Number(2.5),
            Token::Number(0.5),
            Token::Number(1000.0),
            Token::Number(255.0),
            Token::Number(1000.0),
        ]);
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(
            lex_all(r#"'it\'s' "a\nb" "A""#),
            vec![
                Token::String("it's".into()),
                Token::String("a\nb".into()),
                Token::String("A".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("'abc", 0).next_token().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnterminatedString);
    }

    #[test]
    fn test_optional_chain_vs_conditional() {
        assert_eq!(
            lex_all("a?.5:1"),
            vec![
                Token::Identifier("a".into()),
                Token::Punct("?"),
                Token::Number(0.5),
                Token::Punct(":"),
                Token::Number(1.0),
            ]
        );
    }
}
