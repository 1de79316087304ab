//! Expression evaluation.
//!
//! `resolve` walks an expression tree against a [`Scope`], evaluating
//! operands strictly left to right. Every failure is a [`CompileError`]
//! anchored at the offending sub-expression.

use indexmap::IndexMap;
use promptl_parser::expression::*;
use promptl_parser::{CompileError, ErrorCode};

use crate::builtins;
use crate::scope::Scope;
use crate::value::{to_int32, to_uint32, Value};
use crate::Result;

/// Largest array an index write may grow to.
const MAX_ARRAY_LENGTH: usize = 1 << 20;

fn error(code: ErrorCode, message: impl Into<String>, expr: &Expression) -> CompileError {
    CompileError::new(code, message, expr.start, expr.end)
}

/// Evaluate an expression.
pub fn resolve(expr: &Expression, scope: &mut Scope) -> Result<Value> {
    match &expr.kind {
        ExpressionKind::Literal(literal) => Ok(match literal {
            Literal::Undefined => Value::Undefined,
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }),

        ExpressionKind::Identifier(name) => scope.get(name).ok_or_else(|| {
            error(
                ErrorCode::VariableNotDeclared,
                format!("Variable '{}' is not declared", name),
                expr,
            )
        }),

        ExpressionKind::Array(elements) => Ok(Value::Array(resolve_elements(elements, scope)?)),

        ExpressionKind::Object(members) => resolve_object(members, scope),

        ExpressionKind::Sequence(expressions) => {
            let mut last = Value::Undefined;
            for expression in expressions {
                last = resolve(expression, scope)?;
            }
            Ok(last)
        }

        ExpressionKind::Binary { operator, left, right } => {
            if !operator.is_supported() {
                return Err(unsupported(operator.as_str(), expr));
            }
            let left_val = resolve(left, scope)?;
            let right_val = resolve(right, scope)?;
            eval_binary(*operator, left_val, right_val, expr)
        }

        ExpressionKind::Logical { operator, left, right } => {
            let left_val = resolve(left, scope)?;
            let short_circuits = match operator {
                LogicalOperator::And => !left_val.to_bool(),
                LogicalOperator::Or => left_val.to_bool(),
                LogicalOperator::NullishCoalescing => !left_val.is_nullish(),
            };
            if short_circuits {
                Ok(left_val)
            } else {
                resolve(right, scope)
            }
        }

        ExpressionKind::Unary { operator, argument } => {
            if !operator.is_supported() {
                return Err(unsupported(operator.as_str(), expr));
            }
            let value = resolve(argument, scope)?;
            Ok(match operator {
                UnaryOperator::Not => Value::Boolean(!value.to_bool()),
                UnaryOperator::Minus => Value::Number(-value.to_number()),
                UnaryOperator::Plus => Value::Number(value.to_number()),
                UnaryOperator::BitNot => Value::Number(!to_int32(value.to_number()) as f64),
                UnaryOperator::TypeOf => Value::String(value.type_of().to_string()),
                UnaryOperator::Void | UnaryOperator::Delete => unreachable!("rejected above"),
            })
        }

        ExpressionKind::Update { operator, prefix, argument } => {
            let current = resolve(argument, scope)?;
            let Value::Number(old) = current else {
                return Err(error(
                    ErrorCode::InvalidUpdate,
                    format!(
                        "Cannot use '{}' on a value of type {}",
                        operator.as_str(),
                        current.type_name()
                    ),
                    expr,
                ));
            };
            let new = match operator {
                UpdateOperator::Increment => old + 1.0,
                UpdateOperator::Decrement => old - 1.0,
            };
            assign_to(argument, Value::Number(new), scope)?;
            Ok(Value::Number(if *prefix { new } else { old }))
        }

        ExpressionKind::Assignment { operator, target, value } => {
            resolve_assignment(*operator, target, value, expr, scope)
        }

        ExpressionKind::Conditional { test, consequent, alternate } => {
            if resolve(test, scope)?.to_bool() {
                resolve(consequent, scope)
            } else {
                resolve(alternate, scope)
            }
        }

        ExpressionKind::Member { .. } | ExpressionKind::Call { .. } => {
            Ok(resolve_chained(expr, scope)?.unwrap_or_default())
        }

        ExpressionKind::Chain(inner) => Ok(resolve_chained(inner, scope)?.unwrap_or_default()),
    }
}

fn unsupported(operator: &str, expr: &Expression) -> CompileError {
    error(
        ErrorCode::UnsupportedOperator,
        format!("Unsupported operator: {}", operator),
        expr,
    )
}

/// Members and calls inside an optional chain. `None` means the chain
/// short-circuited on a nullish value.
fn resolve_chained(expr: &Expression, scope: &mut Scope) -> Result<Option<Value>> {
    match &expr.kind {
        ExpressionKind::Member { object, property, optional } => {
            let Some(object_val) = resolve_chained(object, scope)? else {
                return Ok(None);
            };
            if *optional && object_val.is_nullish() {
                return Ok(None);
            }
            let key = resolve_property_key(property, scope)?;
            get_property(&object_val, &key, expr).map(Some)
        }

        ExpressionKind::Call { callee, arguments, optional } => {
            let Some(callee_val) = resolve_chained(callee, scope)? else {
                return Ok(None);
            };
            if *optional && callee_val.is_nullish() {
                return Ok(None);
            }
            let args = resolve_elements(arguments, scope)?;
            let Value::Function(function) = callee_val else {
                return Err(error(
                    ErrorCode::NotAFunction,
                    format!("Object '{}' is not a function", callee_description(callee)),
                    callee,
                ));
            };
            function.call(&args).map(Some).map_err(|message| {
                error(
                    ErrorCode::FunctionCallError,
                    format!(
                        "Error calling function '{}': {}",
                        callee_description(callee),
                        message
                    ),
                    expr,
                )
            })
        }

        _ => resolve(expr, scope).map(Some),
    }
}

fn callee_description(callee: &Expression) -> String {
    match &callee.kind {
        ExpressionKind::Identifier(name) => name.clone(),
        ExpressionKind::Member { property: MemberProperty::Named(name), object, .. } => {
            format!("{}.{}", callee_description(object), name)
        }
        _ => "expression".to_string(),
    }
}

fn resolve_property_key(property: &MemberProperty, scope: &mut Scope) -> Result<String> {
    match property {
        MemberProperty::Named(name) => Ok(name.clone()),
        MemberProperty::Computed(expression) => Ok(resolve(expression, scope)?.to_js_string()),
    }
}

/// Property read. Strings and arrays expose `length`, indices and the
/// built-in methods.
pub fn get_property(object: &Value, key: &str, expr: &Expression) -> Result<Value> {
    match object {
        Value::Undefined | Value::Null => Err(error(
            ErrorCode::PropertyOfNullish,
            format!("Cannot read property '{}' of {}", key, object.type_name()),
            expr,
        )),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or_default()),
        Value::Array(items) => {
            if key == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            if let Some(index) = array_index(key) {
                return Ok(items.get(index).cloned().unwrap_or_default());
            }
            Ok(builtins::array_method(items, key).unwrap_or_default())
        }
        Value::String(s) => {
            if key == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            if let Some(index) = array_index(key) {
                return Ok(s
                    .chars()
                    .nth(index)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default());
            }
            Ok(builtins::string_method(s, key).unwrap_or_default())
        }
        Value::Boolean(_) | Value::Number(_) | Value::Function(_) => Ok(Value::Undefined),
    }
}

/// Canonical non-negative integer keys address array slots.
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

fn resolve_elements(elements: &[ArrayElement], scope: &mut Scope) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            ArrayElement::Expression(expression) => values.push(resolve(expression, scope)?),
            ArrayElement::Spread(expression) => match resolve(expression, scope)? {
                Value::Array(items) => values.extend(items),
                Value::String(s) => values.extend(s.chars().map(|c| Value::String(c.to_string()))),
                other => {
                    return Err(error(
                        ErrorCode::InvalidSpread,
                        format!("Cannot spread a value of type {}", other.type_name()),
                        expression,
                    ))
                }
            },
        }
    }
    Ok(values)
}

fn resolve_object(members: &[ObjectMember], scope: &mut Scope) -> Result<Value> {
    let mut map = IndexMap::new();
    for member in members {
        match member {
            ObjectMember::Property { key, value } => {
                let key = match key {
                    PropertyKey::Static(name) => name.clone(),
                    PropertyKey::Computed(expression) => match resolve(expression, scope)? {
                        key @ (Value::String(_)
                        | Value::Number(_)
                        | Value::Boolean(_)
                        | Value::Null
                        | Value::Undefined) => key.to_js_string(),
                        other => {
                            return Err(error(
                                ErrorCode::InvalidObjectKey,
                                format!("A value of type {} cannot be used as a key", other.type_name()),
                                expression,
                            ))
                        }
                    },
                };
                let value = resolve(value, scope)?;
                map.insert(key, value);
            }
            ObjectMember::Spread(expression) => match resolve(expression, scope)? {
                Value::Object(entries) => map.extend(entries),
                Value::Array(items) => {
                    map.extend(items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)))
                }
                Value::String(s) => map.extend(
                    s.chars()
                        .enumerate()
                        .map(|(i, c)| (i.to_string(), Value::String(c.to_string()))),
                ),
                Value::Undefined | Value::Null | Value::Boolean(_) | Value::Number(_) => {}
                Value::Function(_) => {
                    return Err(error(
                        ErrorCode::InvalidSpread,
                        "Cannot spread a function into an object",
                        expression,
                    ))
                }
            },
        }
    }
    Ok(Value::Object(map))
}

fn eval_binary(operator: BinaryOperator, left: Value, right: Value, expr: &Expression) -> Result<Value> {
    let result = match operator {
        BinaryOperator::Equal => Value::Boolean(left.loose_equals(&right)),
        BinaryOperator::NotEqual => Value::Boolean(!left.loose_equals(&right)),
        BinaryOperator::StrictEqual => Value::Boolean(left.strict_equals(&right)),
        BinaryOperator::StrictNotEqual => Value::Boolean(!left.strict_equals(&right)),
        BinaryOperator::Less => compare(&left, &right, |o| o.is_lt()),
        BinaryOperator::LessEqual => compare(&left, &right, |o| o.is_le()),
        BinaryOperator::Greater => compare(&left, &right, |o| o.is_gt()),
        BinaryOperator::GreaterEqual => compare(&left, &right, |o| o.is_ge()),
        BinaryOperator::In => {
            let key = left.to_js_string();
            match &right {
                Value::Object(map) => Value::Boolean(map.contains_key(&key)),
                Value::Array(items) => Value::Boolean(
                    key == "length" || array_index(&key).is_some_and(|i| i < items.len()),
                ),
                other => {
                    return Err(error(
                        ErrorCode::InvalidOperand,
                        format!("Cannot use 'in' operator to search for '{}' in {}", key, other.type_name()),
                        expr,
                    ))
                }
            }
        }
        BinaryOperator::Add => {
            let (left, right) = (left.to_primitive(), right.to_primitive());
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::String(left.to_js_string() + &right.to_js_string())
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOperator::Subtract => num_op(&left, &right, |a, b| a - b),
        BinaryOperator::Multiply => num_op(&left, &right, |a, b| a * b),
        BinaryOperator::Divide => num_op(&left, &right, |a, b| a / b),
        BinaryOperator::Remainder => num_op(&left, &right, |a, b| a % b),
        BinaryOperator::Exponent => num_op(&left, &right, f64::powf),
        BinaryOperator::BitAnd => int_op(&left, &right, |a, b| a & b),
        BinaryOperator::BitOr => int_op(&left, &right, |a, b| a | b),
        BinaryOperator::BitXor => int_op(&left, &right, |a, b| a ^ b),
        BinaryOperator::ShiftLeft => int_op(&left, &right, |a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOperator::ShiftRight => int_op(&left, &right, |a, b| a >> (b as u32 & 31)),
        BinaryOperator::UnsignedShiftRight => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number((to_uint32(left.to_number()) >> shift) as f64)
        }
        BinaryOperator::InstanceOf => return Err(unsupported(operator.as_str(), expr)),
    };
    Ok(result)
}

fn num_op(left: &Value, right: &Value, op: fn(f64, f64) -> f64) -> Value {
    Value::Number(op(left.to_number(), right.to_number()))
}

fn int_op(left: &Value, right: &Value, op: fn(i32, i32) -> i32) -> Value {
    Value::Number(op(to_int32(left.to_number()), to_int32(right.to_number())) as f64)
}

/// Relational comparison: strings compare lexically, everything else as
/// numbers, and any NaN makes the comparison false.
fn compare(left: &Value, right: &Value, pred: fn(std::cmp::Ordering) -> bool) -> Value {
    let (left, right) = (left.to_primitive(), right.to_primitive());
    let ordering = match (&left, &right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Boolean(ordering.is_some_and(pred))
}

fn resolve_assignment(
    operator: AssignmentOperator,
    target: &Expression,
    value: &Expression,
    expr: &Expression,
    scope: &mut Scope,
) -> Result<Value> {
    // Plain `name = value` is the only way to declare a new variable
    if operator == AssignmentOperator::Assign {
        if let ExpressionKind::Identifier(name) = &target.kind {
            let value = resolve(value, scope)?;
            scope.set(name, value.clone());
            return Ok(value);
        }
    }

    let path = resolve_target_path(target, scope)?;

    let new_value = match operator.compound() {
        None => resolve(value, scope)?,
        Some(CompoundOperator::Binary(binary)) => {
            let current = read_path(&path, target, scope)?;
            let right = resolve(value, scope)?;
            eval_binary(binary, current, right, expr)?
        }
        Some(CompoundOperator::Logical(logical)) => {
            let current = read_path(&path, target, scope)?;
            let keep = match logical {
                LogicalOperator::And => !current.to_bool(),
                LogicalOperator::Or => current.to_bool(),
                LogicalOperator::NullishCoalescing => !current.is_nullish(),
            };
            if keep {
                return Ok(current);
            }
            resolve(value, scope)?
        }
    };

    write_path(&path, new_value.clone(), target, scope)?;
    Ok(new_value)
}

/// Root variable and property keys of an assignment target.
struct TargetPath {
    root: String,
    keys: Vec<String>,
}

fn resolve_target_path(target: &Expression, scope: &mut Scope) -> Result<TargetPath> {
    match &target.kind {
        ExpressionKind::Identifier(name) => {
            if !scope.exists(name) {
                return Err(error(
                    ErrorCode::VariableNotDeclared,
                    format!("Variable '{}' is not declared", name),
                    target,
                ));
            }
            Ok(TargetPath { root: name.clone(), keys: Vec::new() })
        }
        ExpressionKind::Member { object, property, optional: false } => {
            let mut path = resolve_target_path(object, scope)?;
            path.keys.push(resolve_property_key(property, scope)?);
            Ok(path)
        }
        _ => Err(error(
            ErrorCode::InvalidAssignment,
            "Invalid assignment target",
            target,
        )),
    }
}

fn read_path(path: &TargetPath, target: &Expression, scope: &Scope) -> Result<Value> {
    let mut current = scope.get(&path.root).unwrap_or_default();
    for key in &path.keys {
        current = get_property(&current, key, target)?;
    }
    Ok(current)
}

fn write_path(path: &TargetPath, value: Value, target: &Expression, scope: &mut Scope) -> Result<()> {
    if path.keys.is_empty() {
        scope.set(&path.root, value);
        return Ok(());
    }
    let mut root = scope.get(&path.root).unwrap_or_default();
    set_nested(&mut root, &path.keys, value, target)?;
    scope.set(&path.root, root);
    Ok(())
}

fn set_nested(container: &mut Value, keys: &[String], value: Value, target: &Expression) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        *container = value;
        return Ok(());
    };

    let slot = match container {
        Value::Object(map) => map.entry(key.clone()).or_default(),
        Value::Array(items) => {
            let Some(index) = array_index(key) else {
                return Err(error(
                    ErrorCode::InvalidAssignment,
                    format!("Cannot assign property '{}' of an array", key),
                    target,
                ));
            };
            if index >= MAX_ARRAY_LENGTH {
                return Err(error(
                    ErrorCode::InvalidAssignment,
                    format!("Array index {} is out of range", index),
                    target,
                ));
            }
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            &mut items[index]
        }
        nullish @ (Value::Undefined | Value::Null) => {
            return Err(error(
                ErrorCode::PropertyOfNullish,
                format!("Cannot set property '{}' of {}", key, nullish.type_name()),
                target,
            ))
        }
        other => {
            return Err(error(
                ErrorCode::InvalidAssignment,
                format!("Cannot assign property '{}' of a {}", key, other.type_name()),
                target,
            ))
        }
    };

    if rest.is_empty() {
        *slot = value;
        Ok(())
    } else {
        set_nested(slot, rest, value, target)
    }
}

/// Write `value` into an identifier or member target.
fn assign_to(target: &Expression, value: Value, scope: &mut Scope) -> Result<()> {
    let path = resolve_target_path(target, scope)?;
    write_path(&path, value, target, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptl_parser::parse_expression;

    fn eval_in(input: &str, scope: &mut Scope) -> Result<Value> {
        let expr = parse_expression(input).unwrap();
        resolve(&expr, scope)
    }

    fn eval(input: &str) -> Value {
        let mut scope = Scope::new(Vec::<(String, Value)>::new());
        eval_in(input, &mut scope).unwrap()
    }

    fn eval_err(input: &str) -> ErrorCode {
        let mut scope = Scope::new(Vec::<(String, Value)>::new());
        eval_in(input, &mut scope).unwrap_err().code
    }

    #[test]
    fn test_operator_table() {
        let cases: &[(&str, Value)] = &[
            ("2 == '2'", Value::Boolean(true)),
            ("2 === '2'", Value::Boolean(false)),
            ("null ?? true", Value::Boolean(true)),
            ("'a' + 'b' in {ab: 1}", Value::Boolean(true)),
            ("1 + 2 * 3", Value::Number(7.0)),
            ("'1' + 2", "12".into()),
            ("'3' * '4'", Value::Number(12.0)),
            ("2 ** 3 ** 2", Value::Number(512.0)),
            ("-7 % 3", Value::Number(-1.0)),
            ("5 & 3 | 8 ^ 1", Value::Number(9.0)),
            ("1 << 31", Value::Number(-2147483648.0)),
            ("-1 >>> 28", Value::Number(15.0)),
            ("~5", Value::Number(-6.0)),
            ("'b' > 'a'", Value::Boolean(true)),
            ("'10' < 9", Value::Boolean(false)),
            ("undefined < 1", Value::Boolean(false)),
            ("null == undefined", Value::Boolean(true)),
            ("null === undefined", Value::Boolean(false)),
            ("typeof null", "object".into()),
            ("typeof 'x'", "string".into()),
            ("!''", Value::Boolean(true)),
            ("0 || 'fallback'", "fallback".into()),
            ("1 && 2", Value::Number(2.0)),
            ("true ? 'y' : 'n'", "y".into()),
            ("[1, 2] + ''", "1,2".into()),
            ("1 in [5, 6]", Value::Boolean(true)),
        ];
        for (input, expected) in cases {
            assert_eq!(&eval(input), expected, "evaluating {}", input);
        }
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let mut scope = Scope::new([("x", Value::Number(0.0))]);
        eval_in("false && (x = 1)", &mut scope).unwrap();
        eval_in("true || (x = 2)", &mut scope).unwrap();
        eval_in("1 ?? (x = 3)", &mut scope).unwrap();
        assert_eq!(scope.get("x"), Some(Value::Number(0.0)));
    }

    #[test]
    fn test_unsupported_operators() {
        assert_eq!(eval_err("a instanceof b"), ErrorCode::UnsupportedOperator);
        assert_eq!(eval_err("void 0"), ErrorCode::UnsupportedOperator);
        assert_eq!(eval_err("delete a.b"), ErrorCode::UnsupportedOperator);
    }

    #[test]
    fn test_assignment_declares_only_with_plain_assign() {
        let mut scope = Scope::new(Vec::<(String, Value)>::new());
        assert_eq!(eval_in("foo = 5", &mut scope).unwrap(), Value::Number(5.0));
        assert_eq!(scope.get("foo"), Some(Value::Number(5.0)));

        assert_eq!(eval_in("bar += 1", &mut scope).unwrap_err().code, ErrorCode::VariableNotDeclared);
        assert_eq!(eval_in("baz.x = 1", &mut scope).unwrap_err().code, ErrorCode::VariableNotDeclared);
        assert_eq!(eval_in("missing", &mut scope).unwrap_err().code, ErrorCode::VariableNotDeclared);
    }

    #[test]
    fn test_member_assignment() {
        let mut scope = Scope::new([("obj", Value::from_json(r#"{"a": {"b": 1}, "list": [1]}"#).unwrap())]);
        eval_in("obj.a.b += 41", &mut scope).unwrap();
        eval_in("obj['list'][2] = 'x'", &mut scope).unwrap();
        eval_in("obj.c = obj.a.b", &mut scope).unwrap();
        assert_eq!(
            scope.get("obj").unwrap().to_template_string(),
            r#"{"a":{"b":42},"list":[1,null,"x"],"c":42}"#
        );
        assert_eq!(eval_in("obj.none.deep = 1", &mut scope).unwrap_err().code, ErrorCode::PropertyOfNullish);
    }

    #[test]
    fn test_array_index_write_is_bounded() {
        let mut scope = Scope::new([("a", Value::Array(Vec::new()))]);
        let err = eval_in("a[1000000000000000000] = 1", &mut scope).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAssignment);
        assert_eq!(eval_in("a[4294967295] = 1", &mut scope).unwrap_err().code, ErrorCode::InvalidAssignment);
        assert_eq!(scope.get("a"), Some(Value::Array(Vec::new())));

        eval_in("a[3] = 1", &mut scope).unwrap();
        assert_eq!(scope.get("a").unwrap().to_template_string(), "[null,null,null,1]");
    }

    #[test]
    fn test_logical_assignment() {
        let mut scope = Scope::new([("a", Value::Null), ("b", Value::Number(1.0))]);
        assert_eq!(eval_in("a ??= 'set'", &mut scope).unwrap(), "set".into());
        assert_eq!(eval_in("b ||= 'skipped'", &mut scope).unwrap(), Value::Number(1.0));
        assert_eq!(scope.get("b"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_update_expressions() {
        let mut scope = Scope::new([("i", Value::Number(1.0)), ("s", "a".into())]);
        assert_eq!(eval_in("i++", &mut scope).unwrap(), Value::Number(1.0));
        assert_eq!(eval_in("++i", &mut scope).unwrap(), Value::Number(3.0));
        assert_eq!(eval_in("i--", &mut scope).unwrap(), Value::Number(3.0));
        assert_eq!(scope.get("i"), Some(Value::Number(2.0)));
        assert_eq!(eval_in("s++", &mut scope).unwrap_err().code, ErrorCode::InvalidUpdate);
    }

    #[test]
    fn test_optional_chaining() {
        let mut scope = Scope::new([("user", Value::Null)]);
        assert_eq!(eval_in("user?.name.first", &mut scope).unwrap(), Value::Undefined);
        assert_eq!(eval_in("user?.[missing]", &mut scope).unwrap(), Value::Undefined);
        assert_eq!(eval_in("user.name", &mut scope).unwrap_err().code, ErrorCode::PropertyOfNullish);
    }

    #[test]
    fn test_function_calls() {
        let add = Value::function(|args| {
            Ok(Value::Number(args.iter().map(Value::to_number).sum()))
        });
        let fail = Value::function(|_| Err("boom".to_string()));
        let mut scope = Scope::new([("add", add), ("fail", fail), ("n", Value::Number(1.0))]);

        assert_eq!(eval_in("add(1, ...[2, 3])", &mut scope).unwrap(), Value::Number(6.0));
        assert_eq!(eval_in("n()", &mut scope).unwrap_err().code, ErrorCode::NotAFunction);
        let err = eval_in("fail()", &mut scope).unwrap_err();
        assert_eq!(err.code, ErrorCode::FunctionCallError);
        assert!(err.message.contains("boom"));
        assert_eq!(eval_in("nope?.()", &mut Scope::new([("nope", Value::Undefined)])).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_builtin_members() {
        assert_eq!(eval("'hello'.length"), Value::Number(5.0));
        assert_eq!(eval("'Hello'.toUpperCase()"), "HELLO".into());
        assert_eq!(eval("[1, 2, 3].join('-')"), "1-2-3".into());
        assert_eq!(eval("[1, 2, 3].length"), Value::Number(3.0));
        assert_eq!(eval("'abc'[1]"), "b".into());
    }

    #[test]
    fn test_objects_and_spread() {
        let value = eval("{ a: 1, ...{ b: 2 }, ['c' + 1]: 3 }");
        assert_eq!(value.to_template_string(), r#"{"a":1,"b":2,"c1":3}"#);
        assert_eq!(eval("[...'ab', 1]").to_template_string(), r#"["a","b",1]"#);
        assert_eq!(eval_err("[...5]"), ErrorCode::InvalidSpread);
        assert_eq!(eval_err("{ [[1]]: 1 }"), ErrorCode::InvalidObjectKey);
        assert_eq!(eval_err("'a' in 'abc'"), ErrorCode::InvalidOperand);
    }

    #[test]
    fn test_error_offsets_point_at_expression() {
        let expr = promptl_parser::parse("{{ 1 + missing }}").unwrap();
        let promptl_parser::NodeKind::Fragment { children } = &expr.root.kind else {
            panic!("Expected fragment");
        };
        let promptl_parser::NodeKind::MustacheTag { expression } = &children[0].kind else {
            panic!("Expected mustache");
        };
        let mut scope = Scope::new(Vec::<(String, Value)>::new());
        let err = resolve(expression, &mut scope).unwrap_err();
        assert_eq!((err.start, err.end), (7, 14));
    }
}
