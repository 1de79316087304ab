//! `{{ ... }}` handling: expression tags and block keywords.

use super::{EachFrame, Frame, IfFrame, Parser};
use crate::ast::{NodeKind, TemplateNode};
use crate::error::{ErrorCode, Result};
use crate::expression::Expression;
use crate::lexer::{is_identifier_part, is_identifier_start};
use crate::parser::expression::parse_embedded;

impl<'a> Parser<'a> {
    pub(super) fn mustache(&mut self) -> Result<()> {
        let start = self.index;
        self.index += 2;
        self.skip_whitespace();

        match self.peek_word() {
            "if" => self.if_open(start),
            "else" => self.else_clause(start),
            "endif" => {
                self.index += "endif".len();
                self.close_mustache()?;
                self.close_if(start, self.index)
            }
            "for" => self.each_open(start),
            "endfor" => {
                self.index += "endfor".len();
                self.close_mustache()?;
                self.close_each(start, self.index)
            }
            _ => {
                let expression = self.read_expression()?;
                self.close_mustache()?;
                self.append(TemplateNode::new(
                    NodeKind::MustacheTag { expression },
                    start,
                    self.index,
                ));
                Ok(())
            }
        }
    }

    /// The identifier-like word under the cursor, empty if there is none.
    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_identifier_part(c))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        &rest[..len]
    }

    pub(super) fn read_identifier(&mut self) -> Option<String> {
        let word = self.peek_word();
        if !word.starts_with(is_identifier_start) {
            return None;
        }
        self.index += word.len();
        Some(word.to_string())
    }

    /// Parse an expression starting at the cursor and move past it.
    pub(super) fn read_expression(&mut self) -> Result<Expression> {
        let (expression, end) = parse_embedded(self.template, self.index)?;
        self.index = end;
        Ok(expression)
    }

    pub(super) fn close_mustache(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.remaining().starts_with("}}") {
            self.index += 2;
            Ok(())
        } else {
            Err(self.unexpected_here("`}}`"))
        }
    }

    fn if_open(&mut self, start: usize) -> Result<()> {
        self.index += "if".len();
        let expression = self.read_expression()?;
        self.close_mustache()?;
        self.stack.push(Frame::If(IfFrame {
            start,
            expression,
            else_if: false,
            children: Vec::new(),
            else_branch: None,
        }));
        Ok(())
    }

    fn else_clause(&mut self, start: usize) -> Result<()> {
        self.index += "else".len();
        self.skip_whitespace();
        let else_if = self.peek_word() == "if";

        let accepts_else = match self.stack.last() {
            Some(Frame::If(frame)) => frame.else_branch.is_none(),
            Some(Frame::Each(frame)) => frame.else_branch.is_none() && !else_if,
            _ => false,
        };
        if !accepts_else {
            let message = if else_if {
                "Unexpected {{ else if }}"
            } else {
                "Unexpected {{ else }}"
            };
            return Err(self.error(ErrorCode::UnexpectedElse, message, start, self.index));
        }

        let condition = if else_if {
            self.index += "if".len();
            Some(self.read_expression()?)
        } else {
            None
        };
        self.close_mustache()?;

        match self.current_frame() {
            Frame::If(frame) => frame.else_branch = Some((start, Vec::new())),
            Frame::Each(frame) => frame.else_branch = Some((start, Vec::new())),
            _ => unreachable!("checked above"),
        }

        if let Some(expression) = condition {
            self.stack.push(Frame::If(IfFrame {
                start,
                expression,
                else_if: true,
                children: Vec::new(),
                else_branch: None,
            }));
        }
        Ok(())
    }

    /// `{{ for item, index (key) in expression }}`
    fn each_open(&mut self, start: usize) -> Result<()> {
        self.index += "for".len();
        self.skip_whitespace();
        let context = self
            .read_identifier()
            .ok_or_else(|| self.unexpected_here("a loop variable"))?;

        self.skip_whitespace();
        let mut index = None;
        if self.remaining().starts_with(',') {
            self.index += 1;
            self.skip_whitespace();
            index = Some(
                self.read_identifier()
                    .ok_or_else(|| self.unexpected_here("an index variable"))?,
            );
            self.skip_whitespace();
        }

        let mut key = None;
        if self.remaining().starts_with('(') {
            self.index += 1;
            key = Some(self.read_expression()?);
            self.skip_whitespace();
            if !self.remaining().starts_with(')') {
                return Err(self.unexpected_here("`)`"));
            }
            self.index += 1;
            self.skip_whitespace();
        }

        if self.peek_word() != "in" {
            return Err(self.unexpected_here("`in`"));
        }
        self.index += "in".len();

        let expression = self.read_expression()?;
        self.close_mustache()?;

        self.stack.push(Frame::Each(EachFrame {
            start,
            expression,
            context,
            index,
            key,
            children: Vec::new(),
            else_branch: None,
        }));
        Ok(())
    }
}
