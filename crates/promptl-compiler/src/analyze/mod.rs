//! The metadata pass.
//!
//! Walks a template the way the node compiler does, but never evaluates an
//! expression. It discovers parameters, follows `<ref>` tags into the
//! referenced prompts, and raises the same error codes the compiler would
//! for every problem that can be seen without values.

mod scope;

use std::collections::{BTreeSet, HashMap};
use std::mem;
use std::sync::Arc;

use async_recursion::async_recursion;
use promptl_parser::{
    Attribute, AttributePart, AttributeValue, CompileError, ContentKind, ErrorCode, MessageRole,
    NodeKind, Result, TagKind, TemplateNode,
};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::resolver::{join_path, ReferenceResolver};

pub use scope::{update_scope_context, ScopeContext};

/// Everything the pass learned about one prompt.
#[derive(Debug, Clone)]
pub struct DocumentAnalysis {
    pub path: Option<String>,
    pub hash: String,
    pub parameters: BTreeSet<String>,
    /// Every prompt reachable through references, transitively.
    pub referenced_prompts: BTreeSet<String>,
    pub config: Map<String, JsonValue>,
    /// The source with every `<ref>` replaced by the referenced body.
    pub resolved_prompt: String,
    /// `resolved_prompt` without the config front-matter.
    pub resolved_body: String,
}

/// Text that replaces a span of the source in the resolved prompt.
#[derive(Debug)]
struct Replacement {
    start: usize,
    end: usize,
    text: String,
}

/// Per-prompt walk state.
#[derive(Debug)]
struct Document {
    path: Option<String>,
    source: Arc<str>,
    parameters: BTreeSet<String>,
    referenced_prompts: BTreeSet<String>,
    /// Hashes of distinct referenced prompts, in document order.
    child_hashes: Vec<String>,
    replacements: Vec<Replacement>,
    in_message: bool,
    /// Role of the open message, when it is known without evaluation.
    message_role: Option<MessageRole>,
    in_content: bool,
    in_step: bool,
    errors: Vec<CompileError>,
    /// Start of the `<ref>` whose prompt failed to analyze.
    failed_reference: Option<usize>,
}

impl Document {
    fn new(path: Option<String>, source: Arc<str>) -> Self {
        Self {
            path,
            source,
            parameters: BTreeSet::new(),
            referenced_prompts: BTreeSet::new(),
            child_hashes: Vec::new(),
            replacements: Vec::new(),
            in_message: false,
            message_role: None,
            in_content: false,
            in_step: false,
            errors: Vec::new(),
            failed_reference: None,
        }
    }
}

fn node_error(code: ErrorCode, message: impl Into<String>, node: &TemplateNode) -> CompileError {
    CompileError::new(code, message, node.start, node.end)
}

/// An attribute's value when it contains no expression.
fn static_value(attribute: &Attribute) -> Option<String> {
    match &attribute.value {
        AttributeValue::True => Some("true".to_string()),
        value => value.static_text(),
    }
}

/// The text of children made only of text and comments.
fn static_children_text(children: &[TemplateNode]) -> Option<String> {
    let mut text = String::new();
    for child in children {
        match &child.kind {
            NodeKind::Text { data } => text.push_str(data),
            NodeKind::Comment { .. } => {}
            _ => return None,
        }
    }
    Some(text)
}

fn walk_attributes(
    attributes: &[Attribute],
    scope: &mut ScopeContext,
    parameters: &mut BTreeSet<String>,
) -> Result<()> {
    for attribute in attributes {
        for expression in attribute.value.expressions() {
            update_scope_context(expression, scope, parameters)?;
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Inline a referenced body, binding the attributes passed to it first.
fn inline_reference(source: &str, passed: &[&Attribute], body: &str) -> String {
    let mut text = String::new();
    for attribute in passed.iter().filter(|attribute| is_identifier(&attribute.name)) {
        let value = match &attribute.value {
            AttributeValue::True => "true".to_string(),
            AttributeValue::Parts(parts) => match parts.as_slice() {
                [] => "''".to_string(),
                [AttributePart::Mustache { expression }] => source[expression.start..expression.end].to_string(),
                parts => parts
                    .iter()
                    .map(|part| match part {
                        AttributePart::Text { data, .. } => {
                            serde_json::to_string(data).unwrap_or_else(|_| "''".to_string())
                        }
                        AttributePart::Mustache { expression } => {
                            format!("({})", &source[expression.start..expression.end])
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" + "),
            },
        };
        text.push_str(&format!("{{{{ {} = {} }}}}", attribute.name, value));
    }
    text.push_str(body);
    text
}

fn apply_replacements(source: &str, replacements: &[Replacement]) -> String {
    let mut resolved = String::with_capacity(source.len());
    let mut cursor = 0;
    for replacement in replacements {
        resolved.push_str(&source[cursor..replacement.start]);
        resolved.push_str(&replacement.text);
        cursor = replacement.end;
    }
    resolved.push_str(&source[cursor..]);
    resolved
}

/// One analysis run: shared by a prompt and everything it references.
pub struct Analyzer {
    resolver: Option<Arc<dyn ReferenceResolver>>,
    /// Paths of the prompts currently being analyzed, outermost first.
    visiting: Vec<String>,
    cache: HashMap<String, Arc<DocumentAnalysis>>,
}

impl Analyzer {
    pub fn new(resolver: Option<Arc<dyn ReferenceResolver>>) -> Self {
        Self {
            resolver,
            visiting: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Analyze the prompt at `path` (if it has one) with the given text.
    pub async fn analyze(&mut self, path: Option<String>, source: String) -> Result<Arc<DocumentAnalysis>> {
        if let Some(path) = &path {
            self.visiting.push(path.clone());
        }
        let result = self.analyze_document(path.clone(), source).await;
        if path.is_some() {
            self.visiting.pop();
        }
        result
    }

    #[async_recursion]
    async fn analyze_document(&mut self, path: Option<String>, source: String) -> Result<Arc<DocumentAnalysis>> {
        let template = promptl_parser::parse(&source)?;
        let mut doc = Document::new(path.clone(), Arc::clone(&template.source));

        let mut scope = ScopeContext::new();
        if let Err(err) = self.walk_node(&mut doc, &template.root, &mut scope).await {
            match doc.failed_reference {
                // Errors from a referenced prompt point into that prompt
                Some(anchor) if doc.errors.iter().all(|collected| collected.start > anchor) => {
                    return Err(err);
                }
                Some(_) => {}
                None => doc.errors.push(err),
            }
        }
        if let Some(err) = mem::take(&mut doc.errors).into_iter().min_by_key(|err| err.start) {
            return Err(err.with_source(&template.source));
        }

        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        for child_hash in &doc.child_hashes {
            hasher.update(child_hash.as_bytes());
        }
        let hash = hex::encode(hasher.finalize());

        let resolved_prompt = apply_replacements(&source, &doc.replacements);
        let resolved_body = match template.config_node() {
            Some(config) => resolved_prompt[config.end..]
                .trim_start_matches(['\r', '\n'])
                .to_string(),
            None => resolved_prompt.clone(),
        };

        Ok(Arc::new(DocumentAnalysis {
            path,
            hash,
            parameters: doc.parameters,
            referenced_prompts: doc.referenced_prompts,
            config: template
                .config()
                .and_then(JsonValue::as_object)
                .cloned()
                .unwrap_or_default(),
            resolved_prompt,
            resolved_body,
        }))
    }

    #[async_recursion]
    async fn walk_node(&mut self, doc: &mut Document, node: &TemplateNode, scope: &mut ScopeContext) -> Result<()> {
        match &node.kind {
            NodeKind::Fragment { children } => {
                let mut inner = scope.copy();
                self.walk_children(doc, children, &mut inner).await
            }
            NodeKind::Config { .. } | NodeKind::Comment { .. } | NodeKind::Text { .. } => Ok(()),
            NodeKind::MustacheTag { expression } => {
                update_scope_context(expression, scope, &mut doc.parameters)
            }
            NodeKind::IfBlock {
                expression,
                children,
                else_branch,
                ..
            } => {
                update_scope_context(expression, scope, &mut doc.parameters)?;
                let mut inner = scope.copy();
                self.walk_children(doc, children, &mut inner).await?;
                if let Some(else_node) = else_branch {
                    self.walk_node(doc, else_node, scope).await?;
                }
                Ok(())
            }
            NodeKind::EachBlock {
                expression,
                context,
                index,
                key,
                children,
                else_branch,
            } => {
                for name in std::iter::once(context).chain(index) {
                    if scope.is_defined(name) {
                        return Err(node_error(
                            ErrorCode::VariableAlreadyDeclared,
                            format!("Variable '{}' is already declared", name),
                            node,
                        ));
                    }
                }
                update_scope_context(expression, scope, &mut doc.parameters)?;

                let mut inner = scope.copy();
                inner.define(context);
                if let Some(index) = index {
                    if let Some(key) = key {
                        update_scope_context(key, &mut inner, &mut doc.parameters)?;
                    }
                    inner.define(index);
                }
                self.walk_children(doc, children, &mut inner).await?;

                if let Some(else_node) = else_branch {
                    self.walk_node(doc, else_node, scope).await?;
                }
                Ok(())
            }
            NodeKind::ElementTag {
                name,
                attributes,
                children,
            } => self.walk_element(doc, node, name, attributes, children, scope).await,
        }
    }

    async fn walk_children(
        &mut self,
        doc: &mut Document,
        children: &[TemplateNode],
        scope: &mut ScopeContext,
    ) -> Result<()> {
        for child in children {
            self.walk_node(doc, child, scope).await?;
        }
        Ok(())
    }

    async fn walk_element(
        &mut self,
        doc: &mut Document,
        node: &TemplateNode,
        name: &str,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut ScopeContext,
    ) -> Result<()> {
        match TagKind::classify(name) {
            TagKind::Message(role) => {
                if doc.in_message {
                    return Err(node_error(
                        ErrorCode::MessageTagInsideMessage,
                        "Message tags cannot be inside of another message",
                        node,
                    ));
                }
                walk_attributes(attributes, scope, &mut doc.parameters)?;

                let role = match role {
                    Some(role) => Some(role),
                    None => {
                        let Some(attribute) = node.attribute("role") else {
                            return Err(node_error(
                                ErrorCode::MessageTagWithoutRole,
                                "Message tags must have a 'role' attribute",
                                node,
                            ));
                        };
                        match static_value(attribute) {
                            Some(name) => Some(MessageRole::parse(&name).ok_or_else(|| {
                                node_error(
                                    ErrorCode::InvalidMessageRole,
                                    format!("Invalid message role: '{}'", name),
                                    node,
                                )
                            })?),
                            None => None,
                        }
                    }
                };
                if role == Some(MessageRole::Tool) && node.attribute("id").is_none() {
                    return Err(node_error(
                        ErrorCode::ToolMessageWithoutId,
                        "Tool messages must have an 'id' attribute",
                        node,
                    ));
                }

                doc.in_message = true;
                doc.message_role = role;
                let result = self.walk_children(doc, children, scope).await;
                doc.in_message = false;
                doc.message_role = None;
                result
            }

            TagKind::Content(kind) => {
                if doc.in_content {
                    return Err(node_error(
                        ErrorCode::ContentTagInsideContent,
                        "Content tags cannot be inside of another content tag",
                        node,
                    ));
                }
                walk_attributes(attributes, scope, &mut doc.parameters)?;

                doc.in_content = true;
                let result = self.walk_children(doc, children, scope).await;
                doc.in_content = false;
                result?;

                let empty = static_children_text(children).is_some_and(|text| text.trim().is_empty());
                if kind == ContentKind::Image && empty {
                    return Err(node_error(
                        ErrorCode::ImageTagWithoutUrl,
                        "Image tags must contain an image url",
                        node,
                    ));
                }
                Ok(())
            }

            TagKind::ToolCall => {
                if doc.in_content {
                    return Err(node_error(
                        ErrorCode::ToolCallTagInsideContent,
                        "Tool call tags cannot be inside of a content tag",
                        node,
                    ));
                }
                walk_attributes(attributes, scope, &mut doc.parameters)?;
                if node.attribute("id").is_none() {
                    return Err(node_error(
                        ErrorCode::ToolCallTagWithoutId,
                        "Tool call tags must have an 'id' attribute",
                        node,
                    ));
                }
                if node.attribute("name").is_none() {
                    return Err(node_error(
                        ErrorCode::ToolCallWithoutName,
                        "Tool call tags must have a 'name' attribute",
                        node,
                    ));
                }
                self.walk_children(doc, children, scope).await?;

                if let Some(body) = static_children_text(children) {
                    let body = body.trim();
                    let parsed = if body.is_empty() {
                        Ok(JsonValue::Null)
                    } else {
                        serde_json::from_str::<JsonValue>(body)
                    };
                    if let Err(err) = parsed {
                        doc.errors.push(node_error(
                            ErrorCode::InvalidToolCallArguments,
                            format!("Invalid tool call arguments: {}", err),
                            node,
                        ));
                    }
                }

                let placement_ok = doc.in_message && doc.message_role.map_or(true, |role| role == MessageRole::Assistant);
                if !placement_ok {
                    let role = doc.message_role.unwrap_or(MessageRole::System);
                    doc.errors.push(node_error(
                        ErrorCode::InvalidToolCallPlacement,
                        format!("Tool calls are only allowed in assistant messages, not in {} messages", role),
                        node,
                    ));
                }
                Ok(())
            }

            TagKind::Reference => self.walk_reference(doc, node, attributes, scope).await,

            TagKind::Step => {
                if doc.in_step {
                    return Err(node_error(
                        ErrorCode::StepTagInsideStep,
                        "Step tags cannot be inside of another step",
                        node,
                    ));
                }
                if doc.in_message {
                    return Err(node_error(
                        ErrorCode::StepTagInsideMessage,
                        "Step tags cannot be inside of a message",
                        node,
                    ));
                }

                let as_name = match node.attribute("as") {
                    Some(attribute) => Some(attribute.value.static_text().ok_or_else(|| {
                        CompileError::new(
                            ErrorCode::InvalidStaticAttribute,
                            "The 'as' attribute must be a static value",
                            attribute.start,
                            attribute.end,
                        )
                    })?),
                    None => None,
                };
                let config_attributes: Vec<Attribute> = attributes
                    .iter()
                    .filter(|attribute| attribute.name != "as")
                    .cloned()
                    .collect();
                walk_attributes(&config_attributes, scope, &mut doc.parameters)?;

                doc.in_step = true;
                let result = self.walk_children(doc, children, scope).await;
                doc.in_step = false;
                result?;

                if let Some(name) = as_name {
                    scope.define(&name);
                }
                Ok(())
            }

            TagKind::Unknown => {
                doc.errors.push(node_error(
                    ErrorCode::UnknownTag,
                    format!("Unknown tag: '{}'", name),
                    node,
                ));
                walk_attributes(attributes, scope, &mut doc.parameters)?;
                self.walk_children(doc, children, scope).await
            }
        }
    }

    async fn walk_reference(
        &mut self,
        doc: &mut Document,
        node: &TemplateNode,
        attributes: &[Attribute],
        scope: &mut ScopeContext,
    ) -> Result<()> {
        let Some(prompt_attribute) = node.attribute("prompt") else {
            return Err(node_error(
                ErrorCode::ReferenceTagWithoutPrompt,
                "Reference tags must have a 'prompt' attribute",
                node,
            ));
        };
        let Some(prompt) = prompt_attribute.value.static_text() else {
            return Err(CompileError::new(
                ErrorCode::InvalidStaticAttribute,
                "The 'prompt' attribute must be a static value",
                prompt_attribute.start,
                prompt_attribute.end,
            ));
        };

        let passed: Vec<&Attribute> = attributes
            .iter()
            .filter(|attribute| attribute.name != "prompt")
            .collect();
        for attribute in &passed {
            for expression in attribute.value.expressions() {
                update_scope_context(expression, scope, &mut doc.parameters)?;
            }
        }

        let Some(resolver) = self.resolver.clone() else {
            return Err(node_error(
                ErrorCode::MissingReferenceFunction,
                "A reference function is required to resolve <ref> tags",
                node,
            ));
        };

        let child = match self.load_reference(&resolver, &prompt, doc.path.as_deref(), node).await {
            Ok(child) => child,
            Err(err) => {
                if err.source_text.is_some() {
                    doc.failed_reference = Some(node.start);
                }
                return Err(err);
            }
        };

        if let Some(path) = &child.path {
            doc.referenced_prompts.insert(path.clone());
        }
        doc.referenced_prompts.extend(child.referenced_prompts.iter().cloned());
        for parameter in &child.parameters {
            let passed_in = passed.iter().any(|attribute| &attribute.name == parameter);
            if !passed_in && !scope.is_defined(parameter) {
                doc.parameters.insert(parameter.clone());
            }
        }
        if !doc.child_hashes.contains(&child.hash) {
            doc.child_hashes.push(child.hash.clone());
        }
        doc.replacements.push(Replacement {
            start: node.start,
            end: node.end,
            text: inline_reference(&doc.source, &passed, &child.resolved_body),
        });
        Ok(())
    }

    /// Resolve and analyze a referenced prompt, at most once per run.
    async fn load_reference(
        &mut self,
        resolver: &Arc<dyn ReferenceResolver>,
        prompt: &str,
        from: Option<&str>,
        node: &TemplateNode,
    ) -> Result<Arc<DocumentAnalysis>> {
        let circular = |path: &str| {
            node_error(
                ErrorCode::CircularReference,
                format!("Circular reference to prompt '{}'", path),
                node,
            )
        };

        let key = join_path(prompt, from);
        if self.visiting.contains(&key) {
            return Err(circular(&key));
        }
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Arc::clone(cached));
        }

        debug!(prompt, from = ?from, "resolving reference");
        let resolved = match resolver.resolve(prompt, from).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                return Err(node_error(
                    ErrorCode::ReferenceNotFound,
                    format!("Prompt '{}' not found", prompt),
                    node,
                ))
            }
            Err(err) => {
                return Err(node_error(
                    ErrorCode::ReferenceError,
                    format!("Error resolving prompt '{}': {}", prompt, err),
                    node,
                ))
            }
        };

        if self.visiting.contains(&resolved.path) {
            return Err(circular(&resolved.path));
        }
        if let Some(cached) = self.cache.get(&resolved.path) {
            return Ok(Arc::clone(cached));
        }

        self.visiting.push(resolved.path.clone());
        let result = self
            .analyze_document(Some(resolved.path.clone()), resolved.content)
            .await
            .map_err(|err| err.in_prompt(&resolved.path));
        self.visiting.pop();

        let analysis = result?;
        self.cache.insert(resolved.path, Arc::clone(&analysis));
        if !self.cache.contains_key(&key) {
            self.cache.insert(key, Arc::clone(&analysis));
        }
        Ok(analysis)
    }
}
