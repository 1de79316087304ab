/// Tokens of the embedded expression language
///
/// The lexer produces keywords as identifiers. The token stream fed to the
/// grammar turns the words in [`KEYWORDS`] into [`Token::Keyword`].

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    String(String),
    Identifier(String),
    /// A word from [`KEYWORDS`].
    Keyword(&'static str),
    /// Operators and punctuation, e.g. `===`, `?.`, `(`.
    Punct(&'static str),
    Eof,
}

impl Token {
    pub fn is_punct(&self, punct: &str) -> bool {
        matches!(self, Token::Punct(p) if *p == punct)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        matches!(self, Token::Identifier(n) if n == name)
    }

    /// Source-like rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::String(s) => format!("{:?}", s),
            Token::Identifier(name) => name.clone(),
            Token::Keyword(word) => word.to_string(),
            Token::Punct(p) => p.to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token with its absolute byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Punctuators, longest first so the lexer can match greedily.
pub const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "?.", "==",
    "!=", "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=",
    "^=", "**", "<<", ">>", "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&", "|", "^",
    "?", ":", ".", ",", "(", ")", "[", "]", "{", "}",
];

/// Identifiers with a reserved meaning in expression position.
pub const KEYWORDS: &[&str] = &[
    "true", "false", "null", "undefined", "in", "instanceof", "typeof", "void", "delete",
];

/// The keyword `name` spells, if any.
pub fn keyword(name: &str) -> Option<&'static str> {
    KEYWORDS.iter().copied().find(|word| *word == name)
}
