/// Abstract Syntax Tree types for PromptL templates
///
/// A parsed prompt is a tree of [`TemplateNode`]s rooted at a fragment.
/// Every node carries a dense [`NodeId`] (pre-order), so passes that need
/// per-node state can keep it in a side table instead of on the tree.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::expression::Expression;

/// Index of a node inside its template, assigned in pre-order.
pub type NodeId = usize;

/// A parsed template together with the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub root: TemplateNode,
    /// Number of ids handed out; every id is `< node_count`.
    pub node_count: usize,
    pub source: Arc<str>,
}

impl Template {
    /// The front-matter config node, only when it is the first meaningful
    /// top-level node. Config blocks anywhere else are ignored.
    pub fn config_node(&self) -> Option<&TemplateNode> {
        let NodeKind::Fragment { children } = &self.root.kind else {
            return None;
        };
        children
            .iter()
            .find(|node| !node.is_blank())
            .filter(|node| matches!(node.kind, NodeKind::Config { .. }))
    }

    /// Parsed config value, if the template declares one.
    pub fn config(&self) -> Option<&serde_json::Value> {
        match &self.config_node()?.kind {
            NodeKind::Config { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The source text with the leading config block removed.
    pub fn body_source(&self) -> &str {
        match self.config_node() {
            Some(node) => self.source[node.end..].trim_start_matches(['\r', '\n']),
            None => &self.source,
        }
    }
}

/// A node of the template tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub id: NodeId,
    pub start: usize,
    pub end: usize,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A sequence of nodes; also used for `else` branches.
    Fragment { children: Vec<TemplateNode> },
    /// YAML front-matter, parsed.
    Config { value: serde_json::Value, raw: String },
    Text { data: String },
    Comment { data: String },
    /// `{{ expression }}`
    MustacheTag { expression: Expression },
    /// `{{ if cond }} ... {{ else }} ... {{ endif }}`
    IfBlock {
        expression: Expression,
        children: Vec<TemplateNode>,
        else_branch: Option<Box<TemplateNode>>,
        /// Set on the `if` created by an `{{ else if }}` clause.
        else_if: bool,
    },
    /// `{{ for context, index (key) in expression }} ... {{ endfor }}`
    EachBlock {
        expression: Expression,
        context: String,
        index: Option<String>,
        key: Option<Expression>,
        children: Vec<TemplateNode>,
        else_branch: Option<Box<TemplateNode>>,
    },
    /// `<name attributes>children</name>`
    ElementTag {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<TemplateNode>,
    },
}

impl TemplateNode {
    pub fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self { id: 0, start, end, kind }
    }

    /// Short human-readable name of the node kind.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Fragment { .. } => "Fragment",
            NodeKind::Config { .. } => "Config",
            NodeKind::Text { .. } => "Text",
            NodeKind::Comment { .. } => "Comment",
            NodeKind::MustacheTag { .. } => "MustacheTag",
            NodeKind::IfBlock { .. } => "IfBlock",
            NodeKind::EachBlock { .. } => "EachBlock",
            NodeKind::ElementTag { .. } => "ElementTag",
        }
    }

    /// Whitespace-only text.
    pub fn is_blank(&self) -> bool {
        matches!(&self.kind, NodeKind::Text { data } if data.trim().is_empty())
    }

    /// Direct children, including `else` branches, in document order.
    pub fn child_nodes(&self) -> Vec<&TemplateNode> {
        match &self.kind {
            NodeKind::Fragment { children } | NodeKind::ElementTag { children, .. } => {
                children.iter().collect()
            }
            NodeKind::IfBlock {
                children,
                else_branch,
                ..
            }
            | NodeKind::EachBlock {
                children,
                else_branch,
                ..
            } => children
                .iter()
                .chain(else_branch.as_deref())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn child_nodes_mut(&mut self) -> Vec<&mut TemplateNode> {
        match &mut self.kind {
            NodeKind::Fragment { children } | NodeKind::ElementTag { children, .. } => {
                children.iter_mut().collect()
            }
            NodeKind::IfBlock {
                children,
                else_branch,
                ..
            }
            | NodeKind::EachBlock {
                children,
                else_branch,
                ..
            } => children
                .iter_mut()
                .chain(else_branch.as_deref_mut())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Hand out pre-order ids starting at `next`; returns the next free id.
    pub(crate) fn assign_ids(&mut self, next: NodeId) -> NodeId {
        self.id = next;
        let mut next = next + 1;
        for child in self.child_nodes_mut() {
            next = child.assign_ids(next);
        }
        next
    }

    /// Look up an attribute on an element tag.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        match &self.kind {
            NodeKind::ElementTag { attributes, .. } => attributes.iter().find(|a| a.name == name),
            _ => None,
        }
    }
}

/// An attribute of an element tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Presence-only attribute, e.g. `<step raw>`.
    True,
    /// Literal text and mustache parts, concatenated at resolution time.
    Parts(Vec<AttributePart>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributePart {
    Text { data: String, start: usize, end: usize },
    Mustache { expression: Expression },
}

impl AttributeValue {
    /// The literal value, when no part needs evaluation.
    pub fn static_text(&self) -> Option<String> {
        match self {
            AttributeValue::True => None,
            AttributeValue::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    AttributePart::Text { data, .. } => Some(data.as_str()),
                    AttributePart::Mustache { .. } => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(|texts| texts.concat()),
        }
    }

    /// Expressions embedded in the value, in order.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            AttributeValue::True => Vec::new(),
            AttributeValue::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    AttributePart::Mustache { expression } => Some(expression),
                    AttributePart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// Roles a message can be authored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn parse(name: &str) -> Option<MessageRole> {
        match name {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Image,
}

/// What an element tag means, decided by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `<system>`, `<user>`, ... or `<message role=...>` (role `None`).
    Message(Option<MessageRole>),
    Content(ContentKind),
    ToolCall,
    Reference,
    Step,
    Unknown,
}

pub const MESSAGE_TAG: &str = "message";
pub const TOOL_CALL_TAG: &str = "tool-call";
pub const REFERENCE_TAG: &str = "ref";
pub const STEP_TAG: &str = "step";

impl TagKind {
    pub fn classify(name: &str) -> TagKind {
        if let Some(role) = MessageRole::parse(name) {
            return TagKind::Message(Some(role));
        }
        match name {
            MESSAGE_TAG => TagKind::Message(None),
            "text" => TagKind::Content(ContentKind::Text),
            "image" => TagKind::Content(ContentKind::Image),
            TOOL_CALL_TAG => TagKind::ToolCall,
            REFERENCE_TAG => TagKind::Reference,
            STEP_TAG => TagKind::Step,
            _ => TagKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_tags() {
        assert_eq!(TagKind::classify("user"), TagKind::Message(Some(MessageRole::User)));
        assert_eq!(TagKind::classify("message"), TagKind::Message(None));
        assert_eq!(TagKind::classify("image"), TagKind::Content(ContentKind::Image));
        assert_eq!(TagKind::classify("tool-call"), TagKind::ToolCall);
        assert_eq!(TagKind::classify("ref"), TagKind::Reference);
        assert_eq!(TagKind::classify("step"), TagKind::Step);
        assert_eq!(TagKind::classify("div"), TagKind::Unknown);
    }

    #[test]
    fn test_static_attribute_text() {
        let value = AttributeValue::Parts(vec![
            AttributePart::Text { data: "a".into(), start: 0, end: 1 },
            AttributePart::Text { data: "b".into(), start: 1, end: 2 },
        ]);
        assert_eq!(value.static_text().as_deref(), Some("ab"));
        assert_eq!(AttributeValue::True.static_text(), None);
    }
}
