//! The node compiler.
//!
//! Walks a parsed template in document order, evaluating expressions
//! against a [`Scope`] and collecting messages. A `<step>` without a
//! response stops the walk with [`Interrupt::Paused`]; every node the pause
//! unwinds through records where it stood, so the next run picks up at the
//! same place without re-running anything that already completed.

mod tags;

use std::mem;

use indexmap::IndexMap;
use promptl_parser::{
    CompileError, ErrorCode, Expression, ExpressionKind, MessageRole, NodeId, NodeKind, Template,
    TemplateNode,
};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::eval::resolve;
use crate::message::{Conversation, Message, MessageContent, ToolCall};
use crate::scope::Scope;
use crate::status::{IterationPath, Resume, Statuses};
use crate::value::Value;
use crate::Result;

/// Input parameters of a prompt, in declaration order.
pub type Parameters = IndexMap<String, Value>;

/// JSON object holding prompt configuration.
pub type Config = Map<String, JsonValue>;

/// Options that shape the compiled conversation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    default_role: MessageRole,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_role: MessageRole::System,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role of the message that collects content written outside any
    /// message tag.
    pub fn default_role(mut self, role: MessageRole) -> Self {
        self.default_role = role;
        self
    }
}

/// Compile a prompt into a conversation.
///
/// A prompt with `<step>` tags compiles up to its first step; use
/// [`Chain`](crate::Chain) to drive it to the end.
pub fn compile(text: &str, parameters: Parameters) -> Result<Conversation> {
    compile_with_options(text, parameters, &CompileOptions::default())
}

pub fn compile_with_options(
    text: &str,
    parameters: Parameters,
    options: &CompileOptions,
) -> Result<Conversation> {
    let template = promptl_parser::parse(text)?;
    let mut statuses = Statuses::new(template.node_count);
    let mut scope = Scope::new(parameters);
    let outcome = Compile::new(&mut statuses, options, None).run(&template, &mut scope)?;

    let mut config = global_config(&template);
    config.extend(outcome.step_config);
    Ok(Conversation {
        config,
        messages: outcome.messages,
    })
}

/// The front-matter config of a template, or an empty object.
pub(crate) fn global_config(template: &Template) -> Config {
    template
        .config()
        .and_then(JsonValue::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Why a traversal stopped early.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A step is waiting for its response; carries the step's config.
    Paused(Config),
    Failed(CompileError),
}

impl From<CompileError> for Interrupt {
    fn from(err: CompileError) -> Self {
        Interrupt::Failed(err)
    }
}

type Flow = std::result::Result<(), Interrupt>;

/// The result of a single run.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub completed: bool,
    pub messages: Vec<Message>,
    pub step_config: Config,
}

/// A tool call waiting for its enclosing message.
#[derive(Debug)]
struct PendingToolCall {
    call: ToolCall,
    start: usize,
    end: usize,
}

pub(crate) struct Compile<'a> {
    statuses: &'a mut Statuses,
    options: &'a CompileOptions,
    response: Option<String>,
    messages: Vec<Message>,
    /// Text not yet attached to a content item.
    stray_text: String,
    /// Content not yet attached to a message.
    content: Vec<MessageContent>,
    tool_calls: Vec<PendingToolCall>,
    in_message: bool,
    in_content: bool,
    in_step: bool,
    /// Recoverable errors, reported once the run is over.
    errors: Vec<CompileError>,
}

impl<'a> Compile<'a> {
    pub fn new(statuses: &'a mut Statuses, options: &'a CompileOptions, response: Option<String>) -> Self {
        Self {
            statuses,
            options,
            response,
            messages: Vec::new(),
            stray_text: String::new(),
            content: Vec::new(),
            tool_calls: Vec::new(),
            in_message: false,
            in_content: false,
            in_step: false,
            errors: Vec::new(),
        }
    }

    pub fn run(mut self, template: &Template, scope: &mut Scope) -> Result<RunOutcome> {
        let (completed, step_config) = match self.resolve_node(&template.root, scope, &Vec::new()) {
            Ok(()) => {
                self.group_content();
                (true, Config::new())
            }
            Err(Interrupt::Paused(config)) => (false, config),
            Err(Interrupt::Failed(err)) => {
                self.errors.push(err);
                (false, Config::new())
            }
        };

        if let Some(err) = self.errors.into_iter().min_by_key(|err| err.start) {
            return Err(err.with_source(&template.source));
        }

        Ok(RunOutcome {
            completed,
            messages: self.messages,
            step_config,
        })
    }

    /// Visit a node unless it already completed at `path`, resuming from
    /// a saved pause point when there is one.
    fn resolve_node(&mut self, node: &TemplateNode, scope: &mut Scope, path: &IterationPath) -> Flow {
        if self.statuses.is_completed(node.id, path) {
            return Ok(());
        }

        match self.statuses.paused_pointers(node.id, path) {
            Some(pointers) => {
                debug!(node = node.id, kind = node.kind_name(), "resuming node");
                scope.set_pointers(pointers.clone());
            }
            None => self.statuses.get_mut(node.id).resume = Resume::None,
        }
        let entry = scope.pointers().clone();

        match self.resolve_kind(node, scope, path) {
            Ok(()) => {
                self.statuses.mark_completed(node.id, path);
                Ok(())
            }
            Err(Interrupt::Paused(config)) => {
                self.statuses.mark_paused(node.id, path, entry);
                Err(Interrupt::Paused(config))
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_kind(&mut self, node: &TemplateNode, scope: &mut Scope, path: &IterationPath) -> Flow {
        match &node.kind {
            NodeKind::Fragment { children } => {
                let mut inner = scope.copy();
                self.resolve_children(children, &mut inner, path)
            }
            NodeKind::Config { .. } | NodeKind::Comment { .. } => Ok(()),
            NodeKind::Text { data } => {
                self.stray_text.push_str(data);
                Ok(())
            }
            NodeKind::MustacheTag { expression } => self.resolve_mustache(expression, scope),
            NodeKind::IfBlock {
                expression,
                children,
                else_branch,
                ..
            } => self.resolve_if(node.id, expression, children, else_branch.as_deref(), scope, path),
            NodeKind::EachBlock { .. } => self.resolve_each(node, scope, path),
            NodeKind::ElementTag {
                name,
                attributes,
                children,
            } => self.resolve_element(node, name, attributes, children, scope, path),
        }
    }

    fn resolve_children(&mut self, children: &[TemplateNode], scope: &mut Scope, path: &IterationPath) -> Flow {
        for child in children {
            self.resolve_node(child, scope, path)?;
        }
        Ok(())
    }

    fn resolve_mustache(&mut self, expression: &Expression, scope: &mut Scope) -> Flow {
        let value = resolve(expression, scope)?;
        if matches!(expression.kind, ExpressionKind::Assignment { .. }) || matches!(value, Value::Undefined) {
            return Ok(());
        }
        self.stray_text.push_str(&value.to_template_string());
        Ok(())
    }

    fn resolve_if(
        &mut self,
        id: NodeId,
        expression: &Expression,
        children: &[TemplateNode],
        else_branch: Option<&TemplateNode>,
        scope: &mut Scope,
        path: &IterationPath,
    ) -> Flow {
        let branch = match &self.statuses.get(id).resume {
            Resume::Branch(branch) => *branch,
            _ => resolve(expression, scope)?.to_bool(),
        };

        let result = if branch {
            let mut inner = scope.copy();
            self.resolve_children(children, &mut inner, path)
        } else if let Some(else_node) = else_branch {
            self.resolve_node(else_node, scope, path)
        } else {
            Ok(())
        };

        if matches!(result, Err(Interrupt::Paused(_))) {
            self.statuses.get_mut(id).resume = Resume::Branch(branch);
        }
        result
    }

    fn resolve_each(&mut self, node: &TemplateNode, scope: &mut Scope, path: &IterationPath) -> Flow {
        let NodeKind::EachBlock {
            expression,
            context,
            index,
            key,
            children,
            else_branch,
        } = &node.kind
        else {
            return Ok(());
        };

        for name in std::iter::once(context).chain(index) {
            if scope.exists(name) {
                return Err(CompileError::new(
                    ErrorCode::VariableAlreadyDeclared,
                    format!("Variable '{}' is already declared", name),
                    node.start,
                    node.end,
                )
                .into());
            }
        }

        let (items, first, mut resumed_index) = match &self.statuses.get(node.id).resume {
            Resume::Iteration {
                items,
                index,
                index_value,
            } => (items.clone(), *index, index_value.clone()),
            _ => (iterable_items(resolve(expression, scope)?), 0, None),
        };

        if items.is_empty() {
            return match else_branch {
                Some(else_node) => self.resolve_node(else_node, scope, path),
                None => Ok(()),
            };
        }

        for (i, item) in items.iter().enumerate().skip(first) {
            let mut iteration_path = path.clone();
            iteration_path.push(i);

            let mut inner = scope.copy();
            inner.set(context, item.clone());
            let mut index_value = None;
            if let Some(index_name) = index {
                // A resumed iteration keeps the index it was entered with
                let value = match (resumed_index.take(), key) {
                    (Some(value), _) => value,
                    (None, Some(key)) => resolve(key, &mut inner)?,
                    (None, None) => Value::Number(i as f64),
                };
                inner.set(index_name, value.clone());
                index_value = Some(value);
            }

            let result = self.resolve_children(children, &mut inner, &iteration_path);
            if matches!(result, Err(Interrupt::Paused(_))) {
                self.statuses.get_mut(node.id).resume = Resume::Iteration {
                    items: items.clone(),
                    index: i,
                    index_value,
                };
            }
            result?;
        }
        Ok(())
    }

    /// Attach stray text to the pending content.
    fn group_stray_text(&mut self) {
        let text = remove_common_indent(&mem::take(&mut self.stray_text));
        if !text.is_empty() {
            self.content.push(MessageContent::text(text));
        }
    }

    fn take_content(&mut self) -> (Vec<MessageContent>, Vec<PendingToolCall>) {
        self.group_stray_text();
        (mem::take(&mut self.content), mem::take(&mut self.tool_calls))
    }

    /// Close pending content into a message with the default role.
    fn group_content(&mut self) {
        let (content, tool_calls) = self.take_content();
        if content.is_empty() && tool_calls.is_empty() {
            return;
        }
        let role = self.options.default_role;
        let mut message = Message::new(role, content);
        message.tool_calls = self.place_tool_calls(role, tool_calls);
        self.messages.push(message);
    }

    /// Only assistant messages carry tool calls; each misplaced call is
    /// reported on its own.
    fn place_tool_calls(&mut self, role: MessageRole, tool_calls: Vec<PendingToolCall>) -> Vec<ToolCall> {
        if role == MessageRole::Assistant {
            return tool_calls.into_iter().map(|pending| pending.call).collect();
        }
        for pending in tool_calls {
            self.errors.push(CompileError::new(
                ErrorCode::InvalidToolCallPlacement,
                format!("Tool calls are only allowed in assistant messages, not in {} messages", role),
                pending.start,
                pending.end,
            ));
        }
        Vec::new()
    }
}

/// The items a `for` block walks. Anything that is not an array or a
/// string has none.
fn iterable_items(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
        _ => Vec::new(),
    }
}

/// Strip the indentation shared by every non-blank line, then trim.
pub(crate) fn remove_common_indent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
