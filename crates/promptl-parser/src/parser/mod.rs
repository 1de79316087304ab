//! Cursor-driven template parser.
//!
//! The parser looks at the text under the cursor to pick a state (text,
//! mustache, tag, comment or config), lets that state consume input, and
//! keeps a stack of open frames for blocks and elements. Closing a frame
//! turns it into a [`TemplateNode`] appended to its parent.

pub(crate) mod expression;
mod mustache;
mod tag;
mod text;

use std::sync::Arc;

use crate::ast::{Attribute, NodeKind, Template, TemplateNode};
use crate::error::{CompileError, ErrorCode, Result};
use crate::expression::Expression;

pub use expression::parse_expression;

/// What the cursor is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Mustache,
    Tag,
    Comment,
    Config,
}

/// An open `if` block. `else_branch` holds the start offset and children of
/// the `else` part once it was reached.
#[derive(Debug)]
struct IfFrame {
    start: usize,
    expression: Expression,
    else_if: bool,
    children: Vec<TemplateNode>,
    else_branch: Option<(usize, Vec<TemplateNode>)>,
}

#[derive(Debug)]
struct EachFrame {
    start: usize,
    expression: Expression,
    context: String,
    index: Option<String>,
    key: Option<Expression>,
    children: Vec<TemplateNode>,
    else_branch: Option<(usize, Vec<TemplateNode>)>,
}

#[derive(Debug)]
struct ElementFrame {
    start: usize,
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<TemplateNode>,
}

#[derive(Debug)]
enum Frame {
    Root(Vec<TemplateNode>),
    If(IfFrame),
    Each(EachFrame),
    Element(ElementFrame),
}

impl Frame {
    /// The children list new nodes are appended to.
    fn children_mut(&mut self) -> &mut Vec<TemplateNode> {
        match self {
            Frame::Root(children) => children,
            Frame::If(frame) => match &mut frame.else_branch {
                Some((_, children)) => children,
                None => &mut frame.children,
            },
            Frame::Each(frame) => match &mut frame.else_branch {
                Some((_, children)) => children,
                None => &mut frame.children,
            },
            Frame::Element(frame) => &mut frame.children,
        }
    }
}

pub struct Parser<'a> {
    template: &'a str,
    index: usize,
    stack: Vec<Frame>,
}

impl<'a> Parser<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            index: 0,
            stack: vec![Frame::Root(Vec::new())],
        }
    }

    /// Run the state machine to the end of the input.
    pub fn parse(mut self) -> Result<Template> {
        while self.index < self.template.len() {
            match self.state() {
                State::Config => self.config()?,
                State::Comment => self.comment()?,
                State::Mustache => self.mustache()?,
                State::Tag => self.tag()?,
                State::Text => self.text()?,
            }
        }

        if self.stack.len() > 1 {
            return Err(self.unclosed_frame_error());
        }

        let children = match self.stack.pop() {
            Some(Frame::Root(children)) => children,
            _ => unreachable!("the root frame is never popped before the end"),
        };
        let mut root = TemplateNode::new(NodeKind::Fragment { children }, 0, self.template.len());
        let node_count = root.assign_ids(0);

        Ok(Template {
            root,
            node_count,
            source: Arc::from(self.template),
        })
    }

    fn state(&self) -> State {
        let rest = self.remaining();
        if self.config_starts_at(self.index) {
            State::Config
        } else if rest.starts_with("/*") {
            State::Comment
        } else if rest.starts_with("{{") {
            State::Mustache
        } else if self.tag_starts_at(self.index) {
            State::Tag
        } else {
            State::Text
        }
    }

    fn remaining(&self) -> &'a str {
        &self.template[self.index..]
    }

    fn remaining_at(&self, index: usize) -> &'a str {
        &self.template[index..]
    }

    /// `<` followed by a tag name or a closing slash and a tag name.
    fn tag_starts_at(&self, index: usize) -> bool {
        let rest = self.remaining_at(index);
        let Some(after) = rest.strip_prefix('<') else {
            return false;
        };
        let after = after.strip_prefix('/').unwrap_or(after);
        after.starts_with(|c: char| c.is_ascii_alphabetic())
    }

    /// A `---` line that opens the front-matter: only at the root, only
    /// when nothing but whitespace came before it.
    fn config_starts_at(&self, index: usize) -> bool {
        if self.stack.len() != 1 {
            return false;
        }
        let at_line_start = index == 0 || self.template[..index].ends_with('\n');
        if !at_line_start || !is_config_delimiter_line(self.remaining_at(index)) {
            return false;
        }
        self.template[..index].trim().is_empty() && self.config_close(index).is_some()
    }

    /// Span of the `---` line that closes the front-matter opened at `open`.
    fn config_close(&self, open: usize) -> Option<(usize, usize)> {
        let mut line_start = self.template[open..].find('\n').map(|i| open + i + 1)?;
        while line_start < self.template.len() {
            let rest = self.remaining_at(line_start);
            let line_len = rest.find('\n').unwrap_or(rest.len());
            if is_config_delimiter_line(rest) {
                return Some((line_start, line_start + line_len));
            }
            line_start += line_len + 1;
        }
        None
    }

    fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        self.index += rest.len() - rest.trim_start().len();
    }

    fn skip_whitespace_at(&self, index: usize) -> usize {
        let rest = self.remaining_at(index);
        index + rest.len() - rest.trim_start().len()
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.stack
            .last_mut()
            .expect("frame stack always holds the root")
    }

    fn append(&mut self, node: TemplateNode) {
        self.current_frame().children_mut().push(node);
    }

    fn error(&self, code: ErrorCode, message: impl Into<String>, start: usize, end: usize) -> CompileError {
        CompileError::new(code, message, start, end)
    }

    fn unexpected_here(&self, expected: &str) -> CompileError {
        let index = self.skip_whitespace_at(self.index);
        if index >= self.template.len() {
            self.error(
                ErrorCode::UnexpectedEof,
                format!("Unexpected end of input, expected {}", expected),
                index,
                index,
            )
        } else {
            let c = self.template[index..].chars().next().unwrap_or_default();
            self.error(
                ErrorCode::UnexpectedToken,
                format!("Unexpected `{}`, expected {}", c, expected),
                index,
                index + c.len_utf8(),
            )
        }
    }

    fn unclosed_frame_error(&self) -> CompileError {
        let end = self.template.len();
        match self.stack.last() {
            Some(Frame::If(frame)) => self.error(
                ErrorCode::UnclosedBlock,
                "Block was left open, expected {{ endif }}",
                frame.start,
                end,
            ),
            Some(Frame::Each(frame)) => self.error(
                ErrorCode::UnclosedBlock,
                "Block was left open, expected {{ endfor }}",
                frame.start,
                end,
            ),
            Some(Frame::Element(frame)) => self.error(
                ErrorCode::UnclosedTag,
                format!("<{}> was left open", frame.name),
                frame.start,
                end,
            ),
            _ => self.error(ErrorCode::UnexpectedEof, "Unexpected end of input", end, end),
        }
    }

    /// Pop the innermost `if` chain (including `else if` links) and append
    /// the resulting node to the enclosing frame.
    fn close_if(&mut self, close_start: usize, end: usize) -> Result<()> {
        loop {
            let frame = match self.stack.pop() {
                Some(Frame::If(frame)) => frame,
                Some(other) => {
                    self.stack.push(other);
                    return Err(self.error(
                        ErrorCode::UnexpectedBlockClose,
                        "Unexpected {{ endif }}",
                        close_start,
                        end,
                    ));
                }
                None => unreachable!("frame stack always holds the root"),
            };

            let else_if = frame.else_if;
            let mut node = TemplateNode::new(
                NodeKind::IfBlock {
                    expression: frame.expression,
                    children: frame.children,
                    else_branch: frame.else_branch.map(|(start, children)| {
                        Box::new(TemplateNode::new(NodeKind::Fragment { children }, start, close_start))
                    }),
                    else_if,
                },
                frame.start,
                end,
            );

            if !else_if {
                self.trim_block(&mut node, end);
                self.append(node);
                return Ok(());
            }
            self.append(node);
        }
    }

    fn close_each(&mut self, close_start: usize, end: usize) -> Result<()> {
        let frame = match self.stack.pop() {
            Some(Frame::Each(frame)) => frame,
            Some(other) => {
                self.stack.push(other);
                return Err(self.error(
                    ErrorCode::UnexpectedBlockClose,
                    "Unexpected {{ endfor }}",
                    close_start,
                    end,
                ));
            }
            None => unreachable!("frame stack always holds the root"),
        };

        let mut node = TemplateNode::new(
            NodeKind::EachBlock {
                expression: frame.expression,
                context: frame.context,
                index: frame.index,
                key: frame.key,
                children: frame.children,
                else_branch: frame.else_branch.map(|(start, children)| {
                    Box::new(TemplateNode::new(NodeKind::Fragment { children }, start, close_start))
                }),
            },
            frame.start,
            end,
        );
        self.trim_block(&mut node, end);
        self.append(node);
        Ok(())
    }

    /// Trim whitespace next to the block delimiters when the block itself
    /// is surrounded by whitespace.
    fn trim_block(&self, node: &mut TemplateNode, end: usize) {
        let trim_before = self.template[..node.start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let trim_after = self.template[end..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
        trim_whitespace(node, trim_before, trim_after);
    }
}

fn is_config_delimiter_line(rest: &str) -> bool {
    let Some(after) = rest.strip_prefix("---") else {
        return false;
    };
    let line = after.split('\n').next().unwrap_or("");
    line.trim().is_empty()
}

fn trim_whitespace(node: &mut TemplateNode, trim_before: bool, trim_after: bool) {
    let (children, else_branch) = match &mut node.kind {
        NodeKind::IfBlock { children, else_branch, .. }
        | NodeKind::EachBlock { children, else_branch, .. } => (children, else_branch.as_deref_mut()),
        NodeKind::Fragment { children } => (children, None),
        _ => return,
    };

    trim_children(children, trim_before, trim_after);

    // An `else if` lives as the only child of the else fragment
    if let Some(first) = children.first_mut() {
        if matches!(first.kind, NodeKind::IfBlock { else_if: true, .. }) {
            trim_whitespace(first, trim_before, trim_after);
        }
    }
    if let Some(else_node) = else_branch {
        trim_whitespace(else_node, trim_before, trim_after);
    }
}

fn trim_children(children: &mut Vec<TemplateNode>, trim_before: bool, trim_after: bool) {
    if trim_before {
        if let Some(NodeKind::Text { data }) = children.first_mut().map(|n| &mut n.kind) {
            *data = data.trim_start().to_string();
            if data.is_empty() {
                children.remove(0);
            }
        }
    }
    if trim_after {
        if let Some(NodeKind::Text { data }) = children.last_mut().map(|n| &mut n.kind) {
            *data = data.trim_end().to_string();
            if data.is_empty() {
                children.pop();
            }
        }
    }
}
