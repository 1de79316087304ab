/// Static metadata for a prompt: parameters, references, hash and config

use std::collections::BTreeSet;
use std::sync::Arc;

use promptl_parser::CompileError;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::analyze::Analyzer;
use crate::resolver::ReferenceResolver;

/// One reason the prompt config does not match the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaError {
    /// JSON pointer to the offending config value.
    pub path: String,
    pub message: String,
}

/// Outcome of validating the config against a JSON schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaValidation {
    Valid,
    Invalid(Vec<SchemaError>),
}

impl SchemaValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaValidation::Valid)
    }
}

// `true` when valid, the error list otherwise
impl Serialize for SchemaValidation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SchemaValidation::Valid => serializer.serialize_bool(true),
            SchemaValidation::Invalid(errors) => errors.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    /// SHA-256 of the source and of every referenced prompt, hex encoded.
    pub hash: String,
    pub parameters: BTreeSet<String>,
    pub referenced_prompts: BTreeSet<String>,
    pub config: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_validation: Option<SchemaValidation>,
    /// The prompt with its references inlined, ready to compile.
    pub resolved_prompt: String,
}

/// Options for [`read_metadata`].
#[derive(Clone, Default)]
pub struct MetadataOptions {
    resolver: Option<Arc<dyn ReferenceResolver>>,
    config_schema: Option<JsonValue>,
    path: Option<String>,
}

impl MetadataOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver used to load the prompts named by `<ref>` tags.
    pub fn resolver(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// JSON schema the prompt config must satisfy.
    pub fn config_schema(mut self, schema: JsonValue) -> Self {
        self.config_schema = Some(schema);
        self
    }

    /// Path of the prompt itself. References are resolved relative to it.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Analyze a prompt without evaluating it.
///
/// Fails with the same error code [`promptl_eval::compile`] would raise for
/// every problem that does not depend on parameter values.
pub async fn read_metadata(text: &str, options: &MetadataOptions) -> Result<ConversationMetadata, CompileError> {
    let mut analyzer = Analyzer::new(options.resolver.clone());
    let analysis = analyzer.analyze(options.path.clone(), text.to_string()).await?;
    debug!(
        hash = %analysis.hash,
        parameters = analysis.parameters.len(),
        references = analysis.referenced_prompts.len(),
        "read metadata"
    );

    let schema_validation = options
        .config_schema
        .as_ref()
        .map(|schema| validate_config(schema, &analysis.config));

    Ok(ConversationMetadata {
        hash: analysis.hash.clone(),
        parameters: analysis.parameters.clone(),
        referenced_prompts: analysis.referenced_prompts.clone(),
        config: analysis.config.clone(),
        schema_validation,
        resolved_prompt: analysis.resolved_prompt.clone(),
    })
}

/// Validate a prompt config against a JSON schema.
pub fn validate_config(schema: &JsonValue, config: &Map<String, JsonValue>) -> SchemaValidation {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(err) => {
            return SchemaValidation::Invalid(vec![SchemaError {
                path: String::new(),
                message: format!("Invalid schema: {}", err),
            }])
        }
    };

    let instance = JsonValue::Object(config.clone());
    let errors: Vec<SchemaError> = validator
        .iter_errors(&instance)
        .map(|err| SchemaError {
            path: err.instance_path.to_string(),
            message: err.to_string(),
        })
        .collect();

    if errors.is_empty() {
        SchemaValidation::Valid
    } else {
        SchemaValidation::Invalid(errors)
    }
}
