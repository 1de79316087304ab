//! Static scope tracking.
//!
//! A [`ScopeContext`] only knows which names are declared. Walking an
//! expression against it records every name that is read before being
//! declared: those are the prompt's parameters.

use std::collections::{BTreeSet, HashSet};

use promptl_parser::expression::*;
use promptl_parser::{CompileError, ErrorCode, Result};

#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    defined: HashSet<String>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope: sees everything declared here, declares on its own.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    pub fn define(&mut self, name: &str) {
        self.defined.insert(name.to_string());
    }
}

/// Read `name`; undeclared names become parameters.
fn use_variable(name: &str, scope: &mut ScopeContext, parameters: &mut BTreeSet<String>) {
    if !scope.is_defined(name) {
        parameters.insert(name.to_string());
        scope.define(name);
    }
}

fn unsupported(operator: &str, expr: &Expression) -> CompileError {
    CompileError::new(
        ErrorCode::UnsupportedOperator,
        format!("Unsupported operator: {}", operator),
        expr.start,
        expr.end,
    )
}

/// Record the reads and declarations of `expr` without evaluating it.
pub fn update_scope_context(
    expr: &Expression,
    scope: &mut ScopeContext,
    parameters: &mut BTreeSet<String>,
) -> Result<()> {
    match &expr.kind {
        ExpressionKind::Literal(_) => Ok(()),

        ExpressionKind::Identifier(name) => {
            use_variable(name, scope, parameters);
            Ok(())
        }

        ExpressionKind::Array(elements) => update_elements(elements, scope, parameters),

        ExpressionKind::Object(members) => {
            for member in members {
                match member {
                    ObjectMember::Property { key, value } => {
                        if let PropertyKey::Computed(key) = key {
                            update_scope_context(key, scope, parameters)?;
                        }
                        update_scope_context(value, scope, parameters)?;
                    }
                    ObjectMember::Spread(expression) => update_scope_context(expression, scope, parameters)?,
                }
            }
            Ok(())
        }

        ExpressionKind::Sequence(expressions) => {
            for expression in expressions {
                update_scope_context(expression, scope, parameters)?;
            }
            Ok(())
        }

        ExpressionKind::Binary { operator, left, right } => {
            if !operator.is_supported() {
                return Err(unsupported(operator.as_str(), expr));
            }
            update_scope_context(left, scope, parameters)?;
            update_scope_context(right, scope, parameters)
        }

        ExpressionKind::Logical { left, right, .. } => {
            update_scope_context(left, scope, parameters)?;
            update_scope_context(right, scope, parameters)
        }

        ExpressionKind::Unary { operator, argument } => {
            if !operator.is_supported() {
                return Err(unsupported(operator.as_str(), expr));
            }
            update_scope_context(argument, scope, parameters)
        }

        ExpressionKind::Update { argument, .. } => update_target(argument, scope, parameters),

        ExpressionKind::Assignment { operator, target, value } => {
            update_scope_context(value, scope, parameters)?;
            match (&target.kind, operator) {
                (ExpressionKind::Identifier(name), AssignmentOperator::Assign) => {
                    scope.define(name);
                    Ok(())
                }
                _ => update_target(target, scope, parameters),
            }
        }

        ExpressionKind::Conditional { test, consequent, alternate } => {
            update_scope_context(test, scope, parameters)?;
            update_scope_context(consequent, scope, parameters)?;
            update_scope_context(alternate, scope, parameters)
        }

        ExpressionKind::Member { object, property, .. } => {
            update_scope_context(object, scope, parameters)?;
            update_property(property, scope, parameters)
        }

        ExpressionKind::Call { callee, arguments, .. } => {
            update_scope_context(callee, scope, parameters)?;
            update_elements(arguments, scope, parameters)
        }

        ExpressionKind::Chain(inner) => update_scope_context(inner, scope, parameters),
    }
}

fn update_elements(
    elements: &[ArrayElement],
    scope: &mut ScopeContext,
    parameters: &mut BTreeSet<String>,
) -> Result<()> {
    for element in elements {
        match element {
            ArrayElement::Expression(expression) | ArrayElement::Spread(expression) => {
                update_scope_context(expression, scope, parameters)?
            }
        }
    }
    Ok(())
}

fn update_property(
    property: &MemberProperty,
    scope: &mut ScopeContext,
    parameters: &mut BTreeSet<String>,
) -> Result<()> {
    match property {
        MemberProperty::Named(_) => Ok(()),
        MemberProperty::Computed(expression) => update_scope_context(expression, scope, parameters),
    }
}

/// Targets of compound assignments and updates must already exist, so
/// their root counts as a read.
fn update_target(
    target: &Expression,
    scope: &mut ScopeContext,
    parameters: &mut BTreeSet<String>,
) -> Result<()> {
    match &target.kind {
        ExpressionKind::Identifier(name) => {
            use_variable(name, scope, parameters);
            Ok(())
        }
        ExpressionKind::Member { object, property, optional: false } => {
            update_target(object, scope, parameters)?;
            update_property(property, scope, parameters)
        }
        _ => Err(CompileError::new(
            ErrorCode::InvalidAssignment,
            "Invalid assignment target",
            target.start,
            target.end,
        )),
    }
}
