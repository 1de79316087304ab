//! Element tag handlers.

use std::mem;

use indexmap::IndexMap;
use promptl_parser::{
    Attribute, AttributePart, AttributeValue, CompileError, ContentKind, ErrorCode, MessageRole,
    TagKind, TemplateNode,
};
use serde_json::json;
use tracing::debug;

use super::{Compile, Config, Flow, Interrupt, PendingToolCall};
use crate::eval::resolve;
use crate::message::{Message, MessageContent, ToolCall};
use crate::scope::Scope;
use crate::status::IterationPath;
use crate::value::Value;
use crate::Result;

fn node_error(code: ErrorCode, message: impl Into<String>, node: &TemplateNode) -> CompileError {
    CompileError::new(code, message, node.start, node.end)
}

/// Evaluate an attribute. A value made of a single mustache keeps its
/// type; anything else is concatenated into a string.
pub(crate) fn resolve_attribute(value: &AttributeValue, scope: &mut Scope) -> Result<Value> {
    let parts = match value {
        AttributeValue::True => return Ok(Value::Boolean(true)),
        AttributeValue::Parts(parts) => parts,
    };
    if let [AttributePart::Mustache { expression }] = parts.as_slice() {
        return resolve(expression, scope);
    }

    let mut text = String::new();
    for part in parts {
        match part {
            AttributePart::Text { data, .. } => text.push_str(data),
            AttributePart::Mustache { expression } => {
                text.push_str(&resolve(expression, scope)?.to_template_string())
            }
        }
    }
    Ok(Value::String(text))
}

fn resolve_attributes(attributes: &[Attribute], scope: &mut Scope) -> Result<IndexMap<String, Value>> {
    let mut resolved = IndexMap::new();
    for attribute in attributes {
        resolved.insert(attribute.name.clone(), resolve_attribute(&attribute.value, scope)?);
    }
    Ok(resolved)
}

/// A non-nullish attribute as a string.
fn attribute_string(attributes: &IndexMap<String, Value>, name: &str) -> Option<String> {
    attributes
        .get(name)
        .filter(|value| !value.is_nullish())
        .map(Value::to_js_string)
}

impl Compile<'_> {
    pub(super) fn resolve_element(
        &mut self,
        node: &TemplateNode,
        name: &str,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        match TagKind::classify(name) {
            TagKind::Message(role) => self.resolve_message(node, role, attributes, children, scope, path),
            TagKind::Content(kind) => self.resolve_content(node, kind, attributes, children, scope, path),
            TagKind::ToolCall => self.resolve_tool_call(node, attributes, children, scope, path),
            TagKind::Reference => {
                if node.attribute("prompt").is_none() {
                    return Err(node_error(
                        ErrorCode::ReferenceTagWithoutPrompt,
                        "Reference tags must have a 'prompt' attribute",
                        node,
                    )
                    .into());
                }
                Err(node_error(
                    ErrorCode::DidNotResolveReferences,
                    "References must be resolved before compiling the prompt",
                    node,
                )
                .into())
            }
            TagKind::Step => self.resolve_step(node, attributes, children, scope, path),
            TagKind::Unknown => {
                self.errors.push(node_error(
                    ErrorCode::UnknownTag,
                    format!("Unknown tag: '{}'", name),
                    node,
                ));
                self.resolve_children(children, scope, path)
            }
        }
    }

    fn resolve_message(
        &mut self,
        node: &TemplateNode,
        role: Option<MessageRole>,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        if self.in_message {
            return Err(node_error(
                ErrorCode::MessageTagInsideMessage,
                "Message tags cannot be inside of another message",
                node,
            )
            .into());
        }

        let attributes = resolve_attributes(attributes, scope)?;
        let role = match role {
            Some(role) => role,
            None => {
                let Some(name) = attribute_string(&attributes, "role") else {
                    return Err(node_error(
                        ErrorCode::MessageTagWithoutRole,
                        "Message tags must have a 'role' attribute",
                        node,
                    )
                    .into());
                };
                MessageRole::parse(&name).ok_or_else(|| {
                    node_error(
                        ErrorCode::InvalidMessageRole,
                        format!("Invalid message role: '{}'", name),
                        node,
                    )
                })?
            }
        };

        let tool_id = attribute_string(&attributes, "id");
        if role == MessageRole::Tool && tool_id.is_none() {
            return Err(node_error(
                ErrorCode::ToolMessageWithoutId,
                "Tool messages must have an 'id' attribute",
                node,
            )
            .into());
        }

        self.group_content();
        self.in_message = true;
        let result = self.resolve_children(children, scope, path);
        self.in_message = false;
        result?;

        let (content, tool_calls) = self.take_content();
        let mut message = Message::new(role, content);
        message.name = attribute_string(&attributes, "name");
        if role == MessageRole::Tool {
            message.tool_id = tool_id;
        }
        message.tool_calls = self.place_tool_calls(role, tool_calls);
        self.messages.push(message);
        Ok(())
    }

    fn resolve_content(
        &mut self,
        node: &TemplateNode,
        kind: ContentKind,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        if self.in_content {
            return Err(node_error(
                ErrorCode::ContentTagInsideContent,
                "Content tags cannot be inside of another content tag",
                node,
            )
            .into());
        }
        resolve_attributes(attributes, scope)?;

        self.group_stray_text();
        self.in_content = true;
        let result = self.resolve_children(children, scope, path);
        self.in_content = false;
        result?;

        let text = super::remove_common_indent(&mem::take(&mut self.stray_text));
        match kind {
            ContentKind::Text => self.content.push(MessageContent::Text { text }),
            ContentKind::Image => {
                if text.is_empty() {
                    return Err(node_error(
                        ErrorCode::ImageTagWithoutUrl,
                        "Image tags must contain an image url",
                        node,
                    )
                    .into());
                }
                self.content.push(MessageContent::Image { image: text });
            }
        }
        Ok(())
    }

    fn resolve_tool_call(
        &mut self,
        node: &TemplateNode,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        if self.in_content {
            return Err(node_error(
                ErrorCode::ToolCallTagInsideContent,
                "Tool call tags cannot be inside of a content tag",
                node,
            )
            .into());
        }

        let attributes = resolve_attributes(attributes, scope)?;
        let Some(id) = attribute_string(&attributes, "id") else {
            return Err(node_error(
                ErrorCode::ToolCallTagWithoutId,
                "Tool call tags must have an 'id' attribute",
                node,
            )
            .into());
        };
        let Some(name) = attribute_string(&attributes, "name") else {
            return Err(node_error(
                ErrorCode::ToolCallWithoutName,
                "Tool call tags must have a 'name' attribute",
                node,
            )
            .into());
        };

        let outer_text = mem::take(&mut self.stray_text);
        let result = self.resolve_children(children, scope, path);
        let body = mem::replace(&mut self.stray_text, outer_text);
        result?;

        let body = body.trim();
        let arguments = if body.is_empty() {
            json!({})
        } else {
            match serde_json::from_str(body) {
                Ok(arguments) => arguments,
                Err(err) => {
                    self.errors.push(node_error(
                        ErrorCode::InvalidToolCallArguments,
                        format!("Invalid tool call arguments: {}", err),
                        node,
                    ));
                    json!({})
                }
            }
        };

        self.tool_calls.push(PendingToolCall {
            call: ToolCall { id, name, arguments },
            start: node.start,
            end: node.end,
        });
        Ok(())
    }

    fn resolve_step(
        &mut self,
        node: &TemplateNode,
        attributes: &[Attribute],
        children: &[TemplateNode],
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        if self.in_step {
            return Err(node_error(
                ErrorCode::StepTagInsideStep,
                "Step tags cannot be inside of another step",
                node,
            )
            .into());
        }
        if self.in_message {
            return Err(node_error(
                ErrorCode::StepTagInsideMessage,
                "Step tags cannot be inside of a message",
                node,
            )
            .into());
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

        // Only the visit that pauses reports a config; the resumed visit
        // must not evaluate the attributes a second time.
        let mut config = Config::new();
        if self.statuses.paused_pointers(node.id, path).is_none() {
            for attribute in attributes.iter().filter(|attribute| attribute.name != "as") {
                let value = resolve_attribute(&attribute.value, scope)?;
                config.insert(attribute.name.clone(), value.to_json_value());
            }
        }

        self.in_step = true;
        let result = self.resolve_children(children, scope, path);
        self.in_step = false;
        result?;

        let Some(response) = self.response.take() else {
            self.group_content();
            debug!(node = node.id, "step is waiting for a response");
            return Err(Interrupt::Paused(config));
        };

        debug!(node = node.id, "step received its response");
        if let Some(name) = as_name {
            scope.set(&name, Value::String(response.clone()));
        }
        self.group_content();
        self.messages.push(Message::assistant(response));
        Ok(())
    }
}
