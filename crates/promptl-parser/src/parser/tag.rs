//! Element tags and their attribute lists.

use super::{ElementFrame, Frame, Parser};
use crate::ast::{Attribute, AttributePart, AttributeValue, NodeKind, TemplateNode};
use crate::error::{ErrorCode, Result};

impl<'a> Parser<'a> {
    pub(super) fn tag(&mut self) -> Result<()> {
        let start = self.index;
        self.index += 1;
        let closing = self.remaining().starts_with('/');
        if closing {
            self.index += 1;
        }
        let name = self.read_tag_name();

        if closing {
            self.skip_whitespace();
            if !self.remaining().starts_with('>') {
                return Err(self.unexpected_here("`>`"));
            }
            self.index += 1;
            return self.close_element(&name, start);
        }

        let attributes = self.attributes()?;
        self.skip_whitespace();

        if self.remaining().starts_with("/>") {
            self.index += 2;
            self.append(TemplateNode::new(
                NodeKind::ElementTag {
                    name,
                    attributes,
                    children: Vec::new(),
                },
                start,
                self.index,
            ));
        } else if self.remaining().starts_with('>') {
            self.index += 1;
            self.stack.push(Frame::Element(ElementFrame {
                start,
                name,
                attributes,
                children: Vec::new(),
            }));
        } else {
            return Err(self.unexpected_here("`>`"));
        }
        Ok(())
    }

    fn read_tag_name(&mut self) -> String {
        let rest = self.remaining();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.index += len;
        rest[..len].to_string()
    }

    fn close_element(&mut self, name: &str, close_start: usize) -> Result<()> {
        let frame = match self.stack.pop() {
            Some(Frame::Element(frame)) if frame.name == name => frame,
            Some(other) => {
                let message = match &other {
                    Frame::Element(open) => {
                        format!("</{}> does not match the open <{}>", name, open.name)
                    }
                    _ => format!("</{}> closes an element that is not open", name),
                };
                self.stack.push(other);
                return Err(self.error(
                    ErrorCode::InvalidClosingTag,
                    message,
                    close_start,
                    self.index,
                ));
            }
            None => unreachable!("frame stack always holds the root"),
        };

        self.append(TemplateNode::new(
            NodeKind::ElementTag {
                name: frame.name,
                attributes: frame.attributes,
                children: frame.children,
            },
            frame.start,
            self.index,
        ));
        Ok(())
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            self.skip_whitespace();
            let rest = self.remaining();
            if rest.is_empty() || rest.starts_with('>') || rest.starts_with("/>") {
                return Ok(attributes);
            }

            let start = self.index;
            let name = self.read_attribute_name();
            if name.is_empty() {
                return Err(self.unexpected_here("an attribute name"));
            }

            let value = if self.remaining().trim_start().starts_with('=') {
                self.skip_whitespace();
                self.index += 1;
                self.skip_whitespace();
                self.attribute_value()?
            } else {
                AttributeValue::True
            };

            if attributes.iter().any(|a| a.name == name) {
                return Err(self.error(
                    ErrorCode::DuplicateAttribute,
                    format!("Attributes can only be defined once: `{}`", name),
                    start,
                    self.index,
                ));
            }
            attributes.push(Attribute {
                name,
                value,
                start,
                end: self.index,
            });
        }
    }

    fn read_attribute_name(&mut self) -> String {
        let rest = self.remaining();
        let len = rest
            .char_indices()
            .find(|&(_, c)| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '"' | '\'' | '{' | '<'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.index += len;
        rest[..len].to_string()
    }

    fn attribute_value(&mut self) -> Result<AttributeValue> {
        let rest = self.remaining();

        if let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') {
            self.index += 1;
            let parts = self.attribute_parts(Some(quote))?;
            return Ok(AttributeValue::Parts(parts));
        }

        if rest.starts_with("{{") {
            let expression = self.attribute_mustache()?;
            return Ok(AttributeValue::Parts(vec![AttributePart::Mustache { expression }]));
        }

        let parts = self.attribute_parts(None)?;
        if parts.is_empty() {
            return Err(self.unexpected_here("an attribute value"));
        }
        Ok(AttributeValue::Parts(parts))
    }

    /// Text and mustache parts up to the closing quote, or up to whitespace
    /// or the tag end for unquoted values.
    fn attribute_parts(&mut self, quote: Option<char>) -> Result<Vec<AttributePart>> {
        let mut parts = Vec::new();
        let mut text_start = self.index;

        loop {
            let rest = self.remaining();
            let Some(c) = rest.chars().next() else {
                if quote.is_some() {
                    return Err(self.error(
                        ErrorCode::UnexpectedEof,
                        "Unexpected end of input, expected a closing quote",
                        self.index,
                        self.index,
                    ));
                }
                break;
            };

            let at_end = match quote {
                Some(q) => c == q,
                None => c.is_whitespace() || rest.starts_with('>') || rest.starts_with("/>"),
            };
            if at_end || rest.starts_with("{{") {
                if self.index > text_start {
                    parts.push(AttributePart::Text {
                        data: self.template[text_start..self.index].to_string(),
                        start: text_start,
                        end: self.index,
                    });
                }
                if at_end {
                    break;
                }
                let expression = self.attribute_mustache()?;
                parts.push(AttributePart::Mustache { expression });
                text_start = self.index;
                continue;
            }

            self.index += c.len_utf8();
        }

        if quote.is_some() {
            self.index += 1;
        }
        Ok(parts)
    }

    fn attribute_mustache(&mut self) -> Result<crate::expression::Expression> {
        self.index += 2;
        self.skip_whitespace();
        let expression = self.read_expression()?;
        self.close_mustache()?;
        Ok(expression)
    }
}
