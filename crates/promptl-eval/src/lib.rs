//! PromptL interpreter.
//!
//! This crate turns a parsed PromptL template into a [`Conversation`].
//! [`compile`] renders a prompt in one go; [`Chain`] drives a prompt with
//! `<step>` tags one model turn at a time, pausing at each step until the
//! caller supplies the model's response. Failures are structured
//! [`CompileError`]s anchored to the prompt text.

mod builtins;
mod chain;
mod compile;
mod eval;
mod message;
mod scope;
mod status;
mod value;

pub use chain::{Chain, ChainError, StepResult};
pub use compile::{compile, compile_with_options, CompileOptions, Config, Parameters};
pub use eval::resolve;
pub use message::{Conversation, Message, MessageContent, ToolCall};
pub use promptl_parser::{CompileError, ErrorCode, MessageRole};
pub use scope::{Pointers, Scope};
pub use value::{Function, NativeFn, Value};

/// Result type for compile operations.
pub type Result<T> = std::result::Result<T, CompileError>;
