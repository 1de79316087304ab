//! Structured errors shared by the parser, the node compiler and the
//! metadata pass.
//!
//! Every failure carries a stable [`ErrorCode`] plus absolute character
//! offsets into the prompt source, so both passes can be cross-checked by
//! code alone.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type used across the PromptL crates.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Stable, machine-readable error identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    // Parsing
    UnexpectedEof,
    UnexpectedToken,
    UnexpectedBlockClose,
    UnexpectedElse,
    UnclosedBlock,
    UnclosedTag,
    InvalidClosingTag,
    DuplicateAttribute,
    UnclosedComment,
    UnterminatedString,
    InvalidConfig,

    // Scoping
    VariableNotDeclared,
    VariableAlreadyDeclared,

    // Tag placement and shape
    MessageTagInsideMessage,
    ContentTagInsideContent,
    ToolCallTagInsideContent,
    ToolCallTagWithoutId,
    ToolCallWithoutName,
    InvalidToolCallArguments,
    InvalidToolCallPlacement,
    ToolMessageWithoutId,
    MessageTagWithoutRole,
    InvalidMessageRole,
    UnknownTag,
    StepTagInsideStep,
    StepTagInsideMessage,
    InvalidStaticAttribute,
    ImageTagWithoutUrl,

    // References
    ReferenceTagWithoutPrompt,
    MissingReferenceFunction,
    ReferenceNotFound,
    ReferenceError,
    CircularReference,
    DidNotResolveReferences,

    // Expressions
    NotAFunction,
    FunctionCallError,
    UnsupportedOperator,
    InvalidUpdate,
    InvalidAssignment,
    PropertyOfNullish,
    InvalidObjectKey,
    InvalidSpread,
    InvalidOperand,
}

impl ErrorCode {
    /// The kebab-case identifier exposed to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnexpectedEof => "unexpected-eof",
            ErrorCode::UnexpectedToken => "unexpected-token",
            ErrorCode::UnexpectedBlockClose => "unexpected-block-close",
            ErrorCode::UnexpectedElse => "unexpected-else",
            ErrorCode::UnclosedBlock => "unclosed-block",
            ErrorCode::UnclosedTag => "unclosed-tag",
            ErrorCode::InvalidClosingTag => "invalid-closing-tag",
            ErrorCode::DuplicateAttribute => "duplicate-attribute",
            ErrorCode::UnclosedComment => "unclosed-comment",
            ErrorCode::UnterminatedString => "unterminated-string",
            ErrorCode::InvalidConfig => "invalid-config",
            ErrorCode::VariableNotDeclared => "variable-not-declared",
            ErrorCode::VariableAlreadyDeclared => "variable-already-declared",
            ErrorCode::MessageTagInsideMessage => "message-tag-inside-message",
            ErrorCode::ContentTagInsideContent => "content-tag-inside-content",
            ErrorCode::ToolCallTagInsideContent => "tool-call-tag-inside-content",
            ErrorCode::ToolCallTagWithoutId => "tool-call-tag-without-id",
            ErrorCode::ToolCallWithoutName => "tool-call-without-name",
            ErrorCode::InvalidToolCallArguments => "invalid-tool-call-arguments",
            ErrorCode::InvalidToolCallPlacement => "invalid-tool-call-placement",
            ErrorCode::ToolMessageWithoutId => "tool-message-without-id",
            ErrorCode::MessageTagWithoutRole => "message-tag-without-role",
            ErrorCode::InvalidMessageRole => "invalid-message-role",
            ErrorCode::UnknownTag => "unknown-tag",
            ErrorCode::StepTagInsideStep => "step-tag-inside-step",
            ErrorCode::StepTagInsideMessage => "step-tag-inside-message",
            ErrorCode::InvalidStaticAttribute => "invalid-static-attribute",
            ErrorCode::ImageTagWithoutUrl => "image-tag-without-url",
            ErrorCode::ReferenceTagWithoutPrompt => "reference-tag-without-prompt",
            ErrorCode::MissingReferenceFunction => "missing-reference-function",
            ErrorCode::ReferenceNotFound => "reference-not-found",
            ErrorCode::ReferenceError => "reference-error",
            ErrorCode::CircularReference => "circular-reference",
            ErrorCode::DidNotResolveReferences => "did-not-resolve-references",
            ErrorCode::NotAFunction => "not-a-function",
            ErrorCode::FunctionCallError => "function-call-error",
            ErrorCode::UnsupportedOperator => "unsupported-operator",
            ErrorCode::InvalidUpdate => "invalid-update",
            ErrorCode::InvalidAssignment => "invalid-assignment",
            ErrorCode::PropertyOfNullish => "property-of-nullish",
            ErrorCode::InvalidObjectKey => "invalid-object-key",
            ErrorCode::InvalidSpread => "invalid-spread",
            ErrorCode::InvalidOperand => "invalid-operand",
        }
    }

    /// Whether the error was raised while reading the raw text.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::UnexpectedEof
                | ErrorCode::UnexpectedToken
                | ErrorCode::UnexpectedBlockClose
                | ErrorCode::UnexpectedElse
                | ErrorCode::UnclosedBlock
                | ErrorCode::UnclosedTag
                | ErrorCode::InvalidClosingTag
                | ErrorCode::DuplicateAttribute
                | ErrorCode::UnclosedComment
                | ErrorCode::UnterminatedString
                | ErrorCode::InvalidConfig
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error anchored to a span of the prompt source.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} [{code}]")]
pub struct CompileError {
    pub code: ErrorCode,
    pub message: String,
    /// Absolute character offset where the offending node starts.
    pub start: usize,
    /// Absolute character offset where the offending node ends.
    pub end: usize,
    /// The prompt text the offsets point into, once known.
    pub source_text: Option<Arc<str>>,
    /// Path of the referenced prompt the error was raised in.
    pub prompt_path: Option<String>,
}

impl CompileError {
    pub fn new(code: ErrorCode, message: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            code,
            message: message.into(),
            start,
            end,
            source_text: None,
            prompt_path: None,
        }
    }

    /// Attach the source text, unless one is already attached.
    ///
    /// Errors bubbling up from a referenced prompt keep pointing into
    /// that prompt's own text.
    pub fn with_source(mut self, source: &Arc<str>) -> Self {
        if self.source_text.is_none() {
            self.source_text = Some(Arc::clone(source));
        }
        self
    }

    /// Record the prompt the error was raised in, unless a more deeply
    /// nested one was already recorded.
    pub fn in_prompt(mut self, path: &str) -> Self {
        if self.prompt_path.is_none() {
            self.prompt_path = Some(path.to_string());
        }
        self
    }

    /// Class name, kept for callers that dispatch on it.
    pub fn name(&self) -> &'static str {
        "CompileError"
    }

    /// One-based line and column of `start`, if the source is attached.
    pub fn line_column(&self) -> Option<(usize, usize)> {
        let source = self.source_text.as_deref()?;
        let line_starts = build_line_starts(source);
        Some(offset_to_position(source, &line_starts, self.start))
    }

    /// The full source line containing `start`, if the source is attached.
    pub fn source_line(&self) -> Option<&str> {
        let source = self.source_text.as_deref()?;
        let start = self.start.min(source.len());
        let line_start = source[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = source[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(source.len());
        Some(&source[line_start..line_end])
    }
}

/// Build a lookup table of line start byte offsets.
pub fn build_line_starts(input: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    for (i, ch) in input.char_indices() {
        if ch == '\n' {
            line_starts.push(i + 1);
        }
    }
    line_starts
}

/// Convert a byte offset into a one-based (line, column) pair.
pub fn offset_to_position(input: &str, line_starts: &[usize], offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let line = match line_starts.binary_search(&offset) {
        Ok(line) => line,
        Err(next) => next - 1,
    };
    let line_start = line_starts[line];
    let column = input
        .get(line_start..offset)
        .map(|s| s.chars().count())
        .unwrap_or(0);
    (line + 1, column + 1)
}

/// Convert a one-based (line, column) pair back into a byte offset.
pub fn position_to_offset(input: &str, line_starts: &[usize], line: usize, column: usize) -> usize {
    let Some(&line_start) = line.checked_sub(1).and_then(|l| line_starts.get(l)) else {
        return input.len();
    };

    // Walk forward by `column - 1` characters from the line start
    let wanted = column.saturating_sub(1);
    for (col, (offset, _)) in input[line_start..].char_indices().enumerate() {
        if col == wanted {
            return line_start + offset;
        }
    }
    input.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_kebab_case() {
        assert_eq!(ErrorCode::VariableNotDeclared.as_str(), "variable-not-declared");
        assert_eq!(ErrorCode::MessageTagInsideMessage.to_string(), "message-tag-inside-message");
        assert_eq!(ErrorCode::UnclosedBlock.as_str(), "unclosed-block");
    }

    #[test]
    fn test_line_column_lookup() {
        let source: Arc<str> = Arc::from("first\nsecond line\nthird");
        let err = CompileError::new(ErrorCode::UnknownTag, "boom", 13, 17).with_source(&source);
        assert_eq!(err.line_column(), Some((2, 8)));
        assert_eq!(err.source_line(), Some("second line"));
    }

    #[test]
    fn test_position_round_trip() {
        let input = "ab\ncd\nef";
        let starts = build_line_starts(input);
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(offset_to_position(input, &starts, 4), (2, 2));
        assert_eq!(position_to_offset(input, &starts, 2, 2), 4);
        assert_eq!(position_to_offset(input, &starts, 9, 1), input.len());
    }

    #[test]
    fn test_source_is_not_overwritten() {
        let child: Arc<str> = Arc::from("child");
        let parent: Arc<str> = Arc::from("parent");
        let err = CompileError::new(ErrorCode::UnknownTag, "x", 0, 1)
            .with_source(&child)
            .with_source(&parent);
        assert_eq!(err.source_text.as_deref(), Some("child"));
    }
}
