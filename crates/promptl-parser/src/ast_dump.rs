/// AST dumping utilities for testing and debugging
///
/// Provides human-readable tree representations of parsed templates.

use crate::ast::*;
use crate::expression::*;
use std::fmt::Write as FmtWrite;

/// Dump a template AST as a pretty-printed tree
pub fn dump_template(template: &Template) -> String {
    let mut out = String::new();
    write_node(&mut out, &template.root, 0).unwrap();
    out
}

/// Dump a single expression tree
pub fn dump_expression(expression: &Expression) -> String {
    let mut out = String::new();
    write_expr(&mut out, expression, 0).unwrap();
    out
}

fn write_node(out: &mut String, node: &TemplateNode, indent: usize) -> std::fmt::Result {
    let prefix = "  ".repeat(indent);
    match &node.kind {
        NodeKind::Fragment { children } => {
            writeln!(out, "{}Fragment:", prefix)?;
            write_children(out, children, indent + 1)?;
        }
        NodeKind::Config { value, .. } => {
            writeln!(out, "{}Config: {}", prefix, value)?;
        }
        NodeKind::Text { data } => {
            writeln!(out, "{}Text: {:?}", prefix, data)?;
        }
        NodeKind::Comment { data } => {
            writeln!(out, "{}Comment: {:?}", prefix, data)?;
        }
        NodeKind::MustacheTag { expression } => {
            writeln!(out, "{}MustacheTag:", prefix)?;
            write_expr(out, expression, indent + 1)?;
        }
        NodeKind::IfBlock {
            expression,
            children,
            else_branch,
            else_if,
        } => {
            let label = if *else_if { "ElseIf" } else { "If" };
            writeln!(out, "{}{}:", prefix, label)?;
            writeln!(out, "{}  Condition:", prefix)?;
            write_expr(out, expression, indent + 2)?;
            writeln!(out, "{}  Then:", prefix)?;
            write_children(out, children, indent + 2)?;
            if let Some(else_node) = else_branch {
                writeln!(out, "{}  Else:", prefix)?;
                write_node(out, else_node, indent + 2)?;
            }
        }
        NodeKind::EachBlock {
            expression,
            context,
            index,
            key,
            children,
            else_branch,
        } => {
            match index {
                Some(index) => writeln!(out, "{}For: {}, {} in", prefix, context, index)?,
                None => writeln!(out, "{}For: {} in", prefix, context)?,
            }
            write_expr(out, expression, indent + 1)?;
            if let Some(key) = key {
                writeln!(out, "{}  Key:", prefix)?;
                write_expr(out, key, indent + 2)?;
            }
            writeln!(out, "{}  Body:", prefix)?;
            write_children(out, children, indent + 2)?;
            if let Some(else_node) = else_branch {
                writeln!(out, "{}  Else:", prefix)?;
                write_node(out, else_node, indent + 2)?;
            }
        }
        NodeKind::ElementTag {
            name,
            attributes,
            children,
        } => {
            writeln!(out, "{}Element: <{}>", prefix, name)?;
            for attribute in attributes {
                write_attribute(out, attribute, indent + 1)?;
            }
            write_children(out, children, indent + 1)?;
        }
    }
    Ok(())
}

fn write_children(out: &mut String, children: &[TemplateNode], indent: usize) -> std::fmt::Result {
    if children.is_empty() {
        writeln!(out, "{}(empty)", "  ".repeat(indent))?;
    }
    for child in children {
        write_node(out, child, indent)?;
    }
    Ok(())
}

fn write_attribute(out: &mut String, attribute: &Attribute, indent: usize) -> std::fmt::Result {
    let prefix = "  ".repeat(indent);
    match &attribute.value {
        AttributeValue::True => {
            writeln!(out, "{}Attribute: {}", prefix, attribute.name)?;
        }
        AttributeValue::Parts(parts) => {
            writeln!(out, "{}Attribute: {} =", prefix, attribute.name)?;
            for part in parts {
                match part {
                    AttributePart::Text { data, .. } => {
                        writeln!(out, "{}  Text: {:?}", prefix, data)?;
                    }
                    AttributePart::Mustache { expression } => {
                        write_expr(out, expression, indent + 1)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn write_expr(out: &mut String, expr: &Expression, indent: usize) -> std::fmt::Result {
    let prefix = "  ".repeat(indent);
    match &expr.kind {
        ExpressionKind::Literal(literal) => match literal {
            Literal::Undefined => writeln!(out, "{}Undefined", prefix)?,
            Literal::Null => writeln!(out, "{}Null", prefix)?,
            Literal::Boolean(b) => writeln!(out, "{}Boolean: {}", prefix, b)?,
            Literal::Number(n) => writeln!(out, "{}Number: {}", prefix, n)?,
            Literal::String(s) => writeln!(out, "{}String: {:?}", prefix, s)?,
        },
        ExpressionKind::Identifier(name) => {
            writeln!(out, "{}Identifier: {}", prefix, name)?;
        }
        ExpressionKind::Array(elements) => {
            writeln!(out, "{}Array:", prefix)?;
            for element in elements {
                write_element(out, element, indent + 1)?;
            }
        }
        ExpressionKind::Object(members) => {
            writeln!(out, "{}Object:", prefix)?;
            for member in members {
                match member {
                    ObjectMember::Property { key, value } => {
                        match key {
                            PropertyKey::Static(name) => writeln!(out, "{}  {}:", prefix, name)?,
                            PropertyKey::Computed(key) => {
                                writeln!(out, "{}  Computed:", prefix)?;
                                write_expr(out, key, indent + 2)?;
                            }
                        }
                        write_expr(out, value, indent + 2)?;
                    }
                    ObjectMember::Spread(value) => {
                        writeln!(out, "{}  Spread:", prefix)?;
                        write_expr(out, value, indent + 2)?;
                    }
                }
            }
        }
        ExpressionKind::Sequence(expressions) => {
            writeln!(out, "{}Sequence:", prefix)?;
            for expression in expressions {
                write_expr(out, expression, indent + 1)?;
            }
        }
        ExpressionKind::Binary { operator, left, right } => {
            writeln!(out, "{}Binary: {}", prefix, operator.as_str())?;
            write_expr(out, left, indent + 1)?;
            write_expr(out, right, indent + 1)?;
        }
        ExpressionKind::Logical { operator, left, right } => {
            writeln!(out, "{}Logical: {:?}", prefix, operator)?;
            write_expr(out, left, indent + 1)?;
            write_expr(out, right, indent + 1)?;
        }
        ExpressionKind::Unary { operator, argument } => {
            writeln!(out, "{}Unary: {:?}", prefix, operator)?;
            write_expr(out, argument, indent + 1)?;
        }
        ExpressionKind::Update {
            operator,
            prefix: is_prefix,
            argument,
        } => {
            let position = if *is_prefix { "prefix" } else { "postfix" };
            writeln!(out, "{}Update: {:?} ({})", prefix, operator, position)?;
            write_expr(out, argument, indent + 1)?;
        }
        ExpressionKind::Assignment { operator, target, value } => {
            writeln!(out, "{}Assignment: {:?}", prefix, operator)?;
            write_expr(out, target, indent + 1)?;
            write_expr(out, value, indent + 1)?;
        }
        ExpressionKind::Conditional {
            test,
            consequent,
            alternate,
        } => {
            writeln!(out, "{}Conditional:", prefix)?;
            write_expr(out, test, indent + 1)?;
            write_expr(out, consequent, indent + 1)?;
            write_expr(out, alternate, indent + 1)?;
        }
        ExpressionKind::Member {
            object,
            property,
            optional,
        } => {
            let op = if *optional { "?." } else { "." };
            match property {
                MemberProperty::Named(name) => {
                    writeln!(out, "{}Member: {}{}", prefix, op, name)?;
                    write_expr(out, object, indent + 1)?;
                }
                MemberProperty::Computed(property) => {
                    writeln!(out, "{}Member: {}[]", prefix, op)?;
                    write_expr(out, object, indent + 1)?;
                    write_expr(out, property, indent + 1)?;
                }
            }
        }
        ExpressionKind::Call {
            callee,
            arguments,
            optional,
        } => {
            let label = if *optional { "OptionalCall" } else { "Call" };
            writeln!(out, "{}{}:", prefix, label)?;
            write_expr(out, callee, indent + 1)?;
            if !arguments.is_empty() {
                writeln!(out, "{}  Args:", prefix)?;
                for argument in arguments {
                    write_element(out, argument, indent + 2)?;
                }
            }
        }
        ExpressionKind::Chain(inner) => {
            writeln!(out, "{}Chain:", prefix)?;
            write_expr(out, inner, indent + 1)?;
        }
    }
    Ok(())
}

fn write_element(out: &mut String, element: &ArrayElement, indent: usize) -> std::fmt::Result {
    match element {
        ArrayElement::Expression(expression) => write_expr(out, expression, indent),
        ArrayElement::Spread(expression) => {
            writeln!(out, "{}Spread:", "  ".repeat(indent))?;
            write_expr(out, expression, indent + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    #[test]
    fn test_dump_blocks() {
        let input = "{{ for item, i in list }}{{ item }}{{ else }}none{{ endfor }}";
        let template = parse(input).unwrap();
        let dump = dump_template(&template);

        assert!(dump.contains("Fragment:"));
        assert!(dump.contains("For: item, i in"));
        assert!(dump.contains("Identifier: list"));
        assert!(dump.contains("Else:"));
        assert!(dump.contains("Text: \"none\""));
    }

    #[test]
    fn test_dump_element_attributes() {
        let input = "<user name=\"a {{ b }}\" raw>hi</user>";
        let template = parse(input).unwrap();
        let dump = dump_template(&template);

        assert!(dump.contains("Element: <user>"));
        assert!(dump.contains("Attribute: name ="));
        assert!(dump.contains("Text: \"a \""));
        assert!(dump.contains("Identifier: b"));
        assert!(dump.contains("Attribute: raw"));
    }
}
