/// PromptL static analysis
///
/// Reads the metadata of a prompt without compiling it: the parameters it
/// expects, the prompts it references, a content hash that changes whenever
/// any referenced prompt changes, and its config checked against a schema.

pub mod analyze;
pub mod error;
pub mod metadata;
pub mod resolver;

pub use error::ResolveError;
pub use metadata::{
    read_metadata, validate_config, ConversationMetadata, MetadataOptions, SchemaError, SchemaValidation,
};
pub use resolver::{join_path, FsResolver, MapResolver, ReferenceResolver, ResolvedPrompt, PROMPT_EXTENSION};
