//! Plain text, comments and config front-matter.

use super::Parser;
use crate::ast::{NodeKind, TemplateNode};
use crate::error::{build_line_starts, position_to_offset, ErrorCode, Result};

impl<'a> Parser<'a> {
    /// Consume text up to the next construct. `\{{` yields a literal `{{`.
    pub(super) fn text(&mut self) -> Result<()> {
        let start = self.index;
        let mut data = String::new();

        while self.index < self.template.len() {
            let rest = self.remaining();
            if rest.starts_with("\\{{") {
                data.push_str("{{");
                self.index += 3;
                continue;
            }
            if self.index > start
                && (rest.starts_with("{{")
                    || rest.starts_with("/*")
                    || self.tag_starts_at(self.index)
                    || self.config_starts_at(self.index))
            {
                break;
            }
            let c = rest.chars().next().unwrap_or_default();
            data.push(c);
            self.index += c.len_utf8();
        }

        self.append(TemplateNode::new(NodeKind::Text { data }, start, self.index));
        Ok(())
    }

    pub(super) fn comment(&mut self) -> Result<()> {
        let start = self.index;
        let body_start = start + 2;
        let Some(len) = self.template[body_start..].find("*/") else {
            return Err(self.error(
                ErrorCode::UnclosedComment,
                "Comment was left open, expected `*/`",
                start,
                self.template.len(),
            ));
        };

        self.index = body_start + len + 2;
        self.append(TemplateNode::new(
            NodeKind::Comment {
                data: self.template[body_start..body_start + len].to_string(),
            },
            start,
            self.index,
        ));
        Ok(())
    }

    /// YAML between two `---` lines, parsed into a JSON value.
    pub(super) fn config(&mut self) -> Result<()> {
        let start = self.index;
        let (close_start, close_end) = match self.config_close(start) {
            Some(span) => span,
            None => return Err(self.unexpected_here("a closing `---`")),
        };
        let body_start = self.template[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(close_start);
        let raw = &self.template[body_start..close_start];

        let value = if raw.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            match serde_yaml::from_str::<serde_json::Value>(raw) {
                Ok(value @ serde_json::Value::Object(_)) => value,
                Ok(_) => {
                    return Err(self.error(
                        ErrorCode::InvalidConfig,
                        "Config must be a mapping of keys to values",
                        body_start,
                        close_start,
                    ))
                }
                Err(err) => {
                    let offset = match err.location() {
                        Some(location) => {
                            let line_starts = build_line_starts(raw);
                            body_start
                                + position_to_offset(raw, &line_starts, location.line(), location.column())
                        }
                        None => body_start,
                    };
                    return Err(self.error(
                        ErrorCode::InvalidConfig,
                        format!("Invalid config: {}", err),
                        offset,
                        offset,
                    ));
                }
            }
        };

        self.index = close_end;
        self.append(TemplateNode::new(
            NodeKind::Config {
                value,
                raw: raw.to_string(),
            },
            start,
            self.index,
        ));
        Ok(())
    }
}
