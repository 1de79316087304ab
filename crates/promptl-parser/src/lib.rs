pub mod token;
pub mod lexer;
pub mod error;
pub mod expression;
pub mod ast;
pub mod ast_dump;
pub mod parser;

#[allow(clippy::all)]
mod promptl {
    include!(concat!(env!("OUT_DIR"), "/promptl.rs"));
}

pub use ast::*;
pub use error::{CompileError, ErrorCode, Result};
pub use expression::*;
pub use parser::{parse_expression, Parser};

use std::sync::Arc;

/// Parse a PromptL template from a string
///
/// Errors carry the template text so their line and column can be reported.
pub fn parse(input: &str) -> Result<Template> {
    Parser::new(input)
        .parse()
        .map_err(|e| e.with_source(&Arc::from(input)))
}
